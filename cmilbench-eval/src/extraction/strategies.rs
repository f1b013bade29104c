//! Ordered, named pattern strategies for choice-answer extraction

use std::sync::LazyLock;

use regex::Regex;

use super::normalize::join_letters;

/// Whether a strategy looks for one letter or several
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    MultiSelect,
    SingleSelect,
}

/// A single named extraction pattern
#[derive(Debug)]
pub struct ChoiceStrategy {
    pub name: &'static str,
    pub kind: StrategyKind,
    pattern: Regex,
}

impl ChoiceStrategy {
    fn new(name: &'static str, kind: StrategyKind, pattern: &str) -> Self {
        Self {
            name,
            kind,
            pattern: Regex::new(pattern).expect("Invalid choice strategy regex"),
        }
    }

    /// Apply the strategy to `text`, using the last match.
    ///
    /// Multi-select strategies only succeed when the match yields at least two
    /// distinct letters.
    pub fn apply(&self, text: &str) -> Option<String> {
        let captured = self
            .pattern
            .captures_iter(text)
            .filter_map(|c| c.get(1))
            .last()?
            .as_str();

        match self.kind {
            StrategyKind::MultiSelect => {
                let letters = distinct_letters(captured);
                (letters.len() > 1).then(|| join_letters(letters))
            }
            StrategyKind::SingleSelect => Some(captured.to_uppercase()),
        }
    }
}

const ANSWER_PREFIX: &str = r"(?:答案[是：]?\s*)?";

/// All strategies in evaluation order: multi-select families first, then single-select
pub static CHOICE_STRATEGIES: LazyLock<Vec<ChoiceStrategy>> = LazyLock::new(|| {
    use StrategyKind::*;

    let multi = |name, body: &str| {
        ChoiceStrategy::new(name, MultiSelect, &format!("{}({})", ANSWER_PREFIX, body))
    };

    vec![
        multi("multi_space", r"[A-Da-d](?:\s+[A-Da-d])+"),
        multi("multi_comma", r"[A-Da-d](?:[,，]\s*[A-Da-d])+"),
        multi("multi_enumeration_comma", r"[A-Da-d](?:、\s*[A-Da-d])+"),
        multi("multi_concatenated", r"[A-Da-d]{2,4}"),
        multi("multi_conjunction", r"[A-Da-d](?:[和与]\s*[A-Da-d])+"),
        ChoiceStrategy::new(
            "multi_xuanze_phrase",
            MultiSelect,
            r"选择?\s*([A-Da-d](?:[、，,和与]\s*[A-Da-d])+)",
        ),
        ChoiceStrategy::new(
            "multi_xuanxiang_phrase",
            MultiSelect,
            r"选项\s*([A-Da-d](?:[、，,和与]\s*[A-Da-d])+)",
        ),
        ChoiceStrategy::new("single_bare_letter", SingleSelect, r"\b([A-Da-d])\b"),
        ChoiceStrategy::new("single_answer_is", SingleSelect, r"答案[是：]?\s*([A-Da-d])"),
        ChoiceStrategy::new("single_choose", SingleSelect, r"选择\s*([A-Da-d])"),
        ChoiceStrategy::new("single_option", SingleSelect, r"选项\s*([A-Da-d])"),
        ChoiceStrategy::new("single_is_correct", SingleSelect, r"([A-Da-d])\s*[是为]正确"),
        ChoiceStrategy::new("single_correct_answer", SingleSelect, r"正确答案[是：]?\s*([A-Da-d])"),
        ChoiceStrategy::new("single_i_choose", SingleSelect, r"我选择\s*([A-Da-d])"),
        ChoiceStrategy::new("single_should_choose", SingleSelect, r"应该选\s*([A-Da-d])"),
        ChoiceStrategy::new("single_answer_should_be", SingleSelect, r"答案应该是\s*([A-Da-d])"),
        ChoiceStrategy::new("single_letter_option", SingleSelect, r"([A-Da-d])\s*选项"),
        ChoiceStrategy::new("single_pick", SingleSelect, r"选\s*([A-Da-d])"),
    ]
});

static ANY_CHOICE_LETTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Da-d]").expect("Invalid choice letter regex"));

/// Distinct upper-case A–D letters in order of first appearance
fn distinct_letters(text: &str) -> Vec<char> {
    let mut seen = Vec::new();
    for m in ANY_CHOICE_LETTER.find_iter(text) {
        if let Some(c) = m.as_str().chars().next() {
            let upper = c.to_ascii_uppercase();
            if !seen.contains(&upper) {
                seen.push(upper);
            }
        }
    }
    seen
}

/// Last-resort scan over every A–D letter in the text
pub fn bare_letter_scan(text: &str) -> Option<String> {
    let letters = distinct_letters(text);
    match letters.len() {
        1 => Some(letters[0].to_string()),
        2..=4 => Some(join_letters(letters)),
        _ => None,
    }
}

/// Run every strategy in order, then the bare-letter scan
pub fn extract_choice_from_text(text: &str) -> Option<String> {
    if text.is_empty() {
        return None;
    }

    for strategy in CHOICE_STRATEGIES.iter() {
        if let Some(answer) = strategy.apply(text) {
            tracing::trace!(strategy = strategy.name, answer = %answer, "choice strategy matched");
            return Some(answer);
        }
    }

    bare_letter_scan(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strategy(name: &str) -> &'static ChoiceStrategy {
        CHOICE_STRATEGIES
            .iter()
            .find(|s| s.name == name)
            .unwrap()
    }

    #[test]
    fn test_strategy_order() {
        let first_single = CHOICE_STRATEGIES
            .iter()
            .position(|s| s.kind == StrategyKind::SingleSelect)
            .unwrap();
        assert_eq!(first_single, 7);
        assert!(CHOICE_STRATEGIES[..first_single]
            .iter()
            .all(|s| s.kind == StrategyKind::MultiSelect));
    }

    #[test]
    fn test_multi_space_requires_two_letters() {
        let s = strategy("multi_space");
        assert_eq!(s.apply("答案是 C A"), Some("AC".to_string()));
        assert_eq!(s.apply("A A"), None);
    }

    #[test]
    fn test_multi_comma_uses_last_match() {
        let s = strategy("multi_comma");
        assert_eq!(s.apply("先想A,B，最后答案：C，D"), Some("CD".to_string()));
    }

    #[test]
    fn test_multi_enumeration_comma() {
        assert_eq!(
            strategy("multi_enumeration_comma").apply("正确的是B、D"),
            Some("BD".to_string())
        );
    }

    #[test]
    fn test_single_answer_is() {
        assert_eq!(strategy("single_answer_is").apply("答案是c"), Some("C".to_string()));
    }

    #[test]
    fn test_bare_letter_needs_word_boundary() {
        // CJK characters are word characters, so the letter is not isolated
        assert_eq!(strategy("single_bare_letter").apply("答案是A"), None);
        assert_eq!(strategy("single_bare_letter").apply("I pick B."), Some("B".to_string()));
    }

    #[test]
    fn test_extract_choice_full_chain() {
        assert_eq!(extract_choice_from_text("答案是A"), Some("A".to_string()));
        assert_eq!(extract_choice_from_text("A和C"), Some("AC".to_string()));
        // no space is allowed before the conjunction, so only single letters match
        assert_eq!(extract_choice_from_text("A 和 C"), Some("C".to_string()));
        assert_eq!(extract_choice_from_text("我认为应该选b"), Some("B".to_string()));
        assert_eq!(extract_choice_from_text("无法确定"), None);
        assert_eq!(extract_choice_from_text(""), None);
    }

    #[test]
    fn test_bare_letter_scan_limits() {
        assert_eq!(bare_letter_scan("xxBxx"), Some("B".to_string()));
        assert_eq!(bare_letter_scan("xDxAx"), Some("AD".to_string()));
        assert_eq!(bare_letter_scan("xyz"), None);
    }
}
