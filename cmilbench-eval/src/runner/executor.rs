//! Bounded, retrying, cancellable judge calls

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use super::prompt::{build_judge_prompt, JudgeInput};
use crate::analysis::judge::{CALL_ABORTED, CALL_FAILED, PROMPT_FAILED};
use crate::config::Config;
use crate::providers::{CompletionRequest, LLMProvider, Message, ProviderError};

/// Configuration for the executor
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Concurrent judge calls
    pub max_workers: usize,
    /// Attempts per call, including the first
    pub max_attempts: u32,
    /// Base retry delay; attempt `n` waits `n * retry_delay_ms`
    pub retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
    /// Per-call timeout
    pub timeout_ms: u64,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for ExecutorConfig {
    fn from(config: &Config) -> Self {
        Self {
            max_workers: config.runner.max_workers.max(1),
            max_attempts: config.runner.retry_count.max(1),
            retry_delay_ms: config.runner.retry_delay_ms,
            max_retry_delay_ms: config.runner.max_retry_delay_ms,
            timeout_ms: config.runner.timeout_ms,
            temperature: config.judge.temperature,
            max_tokens: config.judge.max_tokens,
        }
    }
}

/// Runs judge calls through a shared worker pool.
///
/// Failures never surface as errors: the returned text is either the judge's
/// answer or one of the failure sentinels understood by the parser.
#[derive(Clone)]
pub struct JudgeExecutor {
    config: ExecutorConfig,
    provider: Arc<dyn LLMProvider + Send + Sync>,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl JudgeExecutor {
    pub fn new(
        provider: Arc<dyn LLMProvider + Send + Sync>,
        config: ExecutorConfig,
        cancel: CancellationToken,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_workers.max(1)));
        Self {
            config,
            provider,
            semaphore,
            cancel,
        }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Judge one sample, returning the trimmed judge text or a sentinel
    pub async fn evaluate(&self, input: &JudgeInput<'_>) -> String {
        if self.is_cancelled() {
            return CALL_ABORTED.to_string();
        }

        let prompt = match build_judge_prompt(input) {
            Ok(prompt) => prompt,
            Err(e) => return format!("{} {}", PROMPT_FAILED, e),
        };

        let _permit = tokio::select! {
            _ = self.cancel.cancelled() => return CALL_ABORTED.to_string(),
            permit = self.semaphore.acquire() => match permit {
                Ok(permit) => permit,
                Err(_) => return CALL_ABORTED.to_string(),
            },
        };

        let request = CompletionRequest::new(vec![Message::user(prompt)], self.config.max_tokens)
            .with_temperature(self.config.temperature);

        for attempt in 1..=self.config.max_attempts {
            if self.is_cancelled() {
                return CALL_ABORTED.to_string();
            }

            let result = tokio::select! {
                _ = self.cancel.cancelled() => return CALL_ABORTED.to_string(),
                result = self.try_complete(&request) => result,
            };

            let error = match result {
                Ok(text) => return text,
                Err(e) => e,
            };

            if self.is_cancelled() {
                return format!("{}: {}", CALL_ABORTED, error);
            }
            if attempt == self.config.max_attempts || error.is_permanent() {
                tracing::error!(
                    "Judge call failed on {} after {} attempt(s): {}",
                    self.provider.name(),
                    attempt,
                    error
                );
                return format!("{} {}", CALL_FAILED, error);
            }

            let mut delay = (self.config.retry_delay_ms * attempt as u64).min(self.config.max_retry_delay_ms);
            if let ProviderError::RateLimited { retry_after_ms } = &error {
                delay = delay.max(*retry_after_ms);
            }
            tracing::warn!(
                "Judge call attempt {}/{} failed ({}), retrying in {}ms",
                attempt,
                self.config.max_attempts,
                error,
                delay
            );

            tokio::select! {
                _ = self.cancel.cancelled() => return CALL_ABORTED.to_string(),
                _ = sleep(Duration::from_millis(delay)) => {}
            }
        }

        format!("{} 已达最大重试次数", CALL_FAILED)
    }

    /// Single attempt with timeout
    async fn try_complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        let timeout = Duration::from_millis(self.config.timeout_ms);

        match tokio::time::timeout(timeout, self.provider.complete(request)).await {
            Ok(result) => result.map(|response| response.content.trim().to_string()),
            Err(_) => Err(ProviderError::Timeout {
                timeout_ms: self.config.timeout_ms,
            }),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::providers::{CompletionResponse, ProviderResult};
    use crate::runner::rate_limiter::RateLimiter;
    use crate::tasks::TaskId;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Provider that fails a fixed number of times, then answers
    pub(crate) struct ScriptedProvider {
        pub calls: AtomicUsize,
        pub failures: usize,
        pub permanent: bool,
        pub delay_ms: u64,
        pub answer: String,
        limiter: Arc<RateLimiter>,
    }

    impl ScriptedProvider {
        pub(crate) fn new(failures: usize, answer: &str) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                failures,
                permanent: false,
                delay_ms: 0,
                answer: answer.to_string(),
                limiter: Arc::new(RateLimiter::new(10_000, 10_000_000)),
            }
        }
    }

    #[async_trait]
    impl LLMProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        fn default_model(&self) -> &str {
            "scripted-judge"
        }

        async fn complete(&self, _request: &CompletionRequest) -> ProviderResult<CompletionResponse> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.delay_ms > 0 {
                sleep(Duration::from_millis(self.delay_ms)).await;
            }
            if call < self.failures {
                return Err(if self.permanent {
                    ProviderError::Config("bad key".to_string())
                } else {
                    ProviderError::Api {
                        status: 500,
                        message: "boom".to_string(),
                    }
                });
            }
            Ok(CompletionResponse {
                content: self.answer.clone(),
                model: "scripted-judge".to_string(),
                input_tokens: 0,
                output_tokens: 0,
                latency_ms: 0,
            })
        }

        fn rate_limiter(&self) -> &Arc<RateLimiter> {
            &self.limiter
        }
    }

    pub(crate) fn fast_config() -> ExecutorConfig {
        ExecutorConfig {
            max_workers: 2,
            max_attempts: 3,
            retry_delay_ms: 1,
            max_retry_delay_ms: 5,
            timeout_ms: 1_000,
            temperature: 0.2,
            max_tokens: 256,
        }
    }

    fn input() -> JudgeInput<'static> {
        JudgeInput {
            task: TaskId::TraditionalCulture,
            language: "ug",
            question: "q",
            reference: "r",
            prediction: "p",
            subcategory: None,
        }
    }

    fn executor(provider: Arc<ScriptedProvider>, config: ExecutorConfig) -> JudgeExecutor {
        JudgeExecutor::new(provider, config, CancellationToken::new())
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let provider = Arc::new(ScriptedProvider::new(2, "  最终分数：4  "));
        let text = executor(provider.clone(), fast_config()).evaluate(&input()).await;
        assert_eq!(text, "最终分数：4");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let provider = Arc::new(ScriptedProvider::new(10, "unused"));
        let text = executor(provider.clone(), fast_config()).evaluate(&input()).await;
        assert!(text.starts_with(CALL_FAILED));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let mut scripted = ScriptedProvider::new(10, "unused");
        scripted.permanent = true;
        let provider = Arc::new(scripted);
        let text = executor(provider.clone(), fast_config()).evaluate(&input()).await;
        assert!(text.starts_with(CALL_FAILED));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        let mut scripted = ScriptedProvider::new(0, "late");
        scripted.delay_ms = 200;
        let provider = Arc::new(scripted);
        let config = ExecutorConfig {
            timeout_ms: 10,
            max_attempts: 1,
            ..fast_config()
        };
        let text = executor(provider, config).evaluate(&input()).await;
        assert!(text.starts_with(CALL_FAILED));
        assert!(text.contains("Timeout"));
    }

    #[tokio::test]
    async fn test_cancelled_before_call() {
        let provider = Arc::new(ScriptedProvider::new(0, "unused"));
        let exec = executor(provider.clone(), fast_config());
        exec.cancel_token().cancel();

        assert_eq!(exec.evaluate(&input()).await, CALL_ABORTED);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_prompt_failure_sentinel() {
        let provider = Arc::new(ScriptedProvider::new(0, "unused"));
        let bad = JudgeInput {
            task: TaskId::Translation,
            ..input()
        };
        let text = executor(provider.clone(), fast_config()).evaluate(&bad).await;
        assert!(text.starts_with(PROMPT_FAILED));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }
}
