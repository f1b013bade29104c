//! Overlap metrics: ROUGE-L, corpus BLEU and corpus chrF++
//!
//! BLEU and chrF++ follow the sacrebleu definitions (BLEU with `13a`
//! tokenization and exponential smoothing, chrF++ with character order 6,
//! word order 2 and beta 2) and report on a 0–100 scale. ROUGE-L reports an
//! F-measure in [0, 1].

use std::collections::HashMap;
use std::hash::Hash;

use super::tokenize::tokenize_13a;

/// ROUGE-L F-measure over pre-tokenized text
pub fn rouge_l<T: PartialEq>(reference: &[T], hypothesis: &[T]) -> f64 {
    if reference.is_empty() || hypothesis.is_empty() {
        return 0.0;
    }

    let lcs = lcs_length(reference, hypothesis);
    let precision = lcs as f64 / hypothesis.len() as f64;
    let recall = lcs as f64 / reference.len() as f64;

    if precision + recall == 0.0 {
        return 0.0;
    }

    2.0 * precision * recall / (precision + recall)
}

/// Length of the longest common subsequence, two-row DP
fn lcs_length<T: PartialEq>(a: &[T], b: &[T]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];

    for x in a {
        for (j, y) in b.iter().enumerate() {
            curr[j + 1] = if x == y {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

fn count_ngrams<T: Hash + Eq + Clone>(tokens: &[T], n: usize) -> HashMap<Vec<T>, usize> {
    let mut counts = HashMap::new();
    if n > 0 && tokens.len() >= n {
        for window in tokens.windows(n) {
            *counts.entry(window.to_vec()).or_insert(0) += 1;
        }
    }
    counts
}

fn clipped_matches<K: Hash + Eq>(hyp: &HashMap<K, usize>, reference: &HashMap<K, usize>) -> usize {
    hyp.iter()
        .map(|(gram, &count)| count.min(reference.get(gram).copied().unwrap_or(0)))
        .sum()
}

const BLEU_MAX_ORDER: usize = 4;

/// Corpus BLEU with one reference per hypothesis.
///
/// Both sides are tokenized with `13a`; zero-match orders use exponential
/// smoothing.
pub fn corpus_bleu(hypotheses: &[String], references: &[String]) -> f64 {
    let mut correct = [0usize; BLEU_MAX_ORDER];
    let mut total = [0usize; BLEU_MAX_ORDER];
    let mut sys_len = 0usize;
    let mut ref_len = 0usize;

    for (hyp, reference) in hypotheses.iter().zip(references) {
        let hyp_tokens = tokenize_13a(hyp);
        let ref_tokens = tokenize_13a(reference);
        sys_len += hyp_tokens.len();
        ref_len += ref_tokens.len();

        for n in 1..=BLEU_MAX_ORDER {
            let hyp_grams = count_ngrams(&hyp_tokens, n);
            let ref_grams = count_ngrams(&ref_tokens, n);
            correct[n - 1] += clipped_matches(&hyp_grams, &ref_grams);
            total[n - 1] += hyp_tokens.len().saturating_sub(n - 1);
        }
    }

    bleu_from_counts(&correct, &total, sys_len, ref_len)
}

fn bleu_from_counts(correct: &[usize], total: &[usize], sys_len: usize, ref_len: usize) -> f64 {
    if total.first().copied().unwrap_or(0) == 0 {
        return 0.0;
    }
    // no unigram match means no smoothing either
    if correct.first().copied().unwrap_or(0) == 0 {
        return 0.0;
    }

    let brevity_penalty = if sys_len >= ref_len {
        1.0
    } else if sys_len == 0 {
        0.0
    } else {
        (1.0 - ref_len as f64 / sys_len as f64).exp()
    };

    let mut precisions = vec![0.0f64; correct.len()];
    let mut smooth = 1.0f64;
    for n in 0..correct.len() {
        if total[n] == 0 {
            break;
        }
        precisions[n] = if correct[n] == 0 {
            smooth *= 2.0;
            100.0 / (smooth * total[n] as f64)
        } else {
            100.0 * correct[n] as f64 / total[n] as f64
        };
    }

    let log_sum: f64 = precisions
        .iter()
        .map(|&p| if p == 0.0 { -9_999_999_999.0 } else { p.ln() })
        .sum();

    brevity_penalty * (log_sum / correct.len() as f64).exp()
}

const CHRF_CHAR_ORDER: usize = 6;
const CHRF_WORD_ORDER: usize = 2;
const CHRF_BETA: f64 = 2.0;
const CHRF_PUNCTUATION: &str = "!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~";

/// Split words on whitespace and peel a single leading or trailing punctuation mark
fn chrf_words(sentence: &str) -> Vec<String> {
    let is_punct = |c: char| CHRF_PUNCTUATION.contains(c);
    let mut words = Vec::new();

    for word in sentence.split_whitespace() {
        let first = word.chars().next();
        let last = word.chars().last();
        if word.chars().count() == 1 {
            words.push(word.to_string());
        } else if let Some(last) = last.filter(|&c| is_punct(c)) {
            words.push(word[..word.len() - last.len_utf8()].to_string());
            words.push(last.to_string());
        } else if let Some(first) = first.filter(|&c| is_punct(c)) {
            words.push(first.to_string());
            words.push(word[first.len_utf8()..].to_string());
        } else {
            words.push(word.to_string());
        }
    }

    words
}

/// Per-order `[hyp_total, ref_total, matches]`, character orders first
fn chrf_statistics(hypothesis: &str, reference: &str) -> Vec<[usize; 3]> {
    let hyp_chars: Vec<char> = hypothesis.chars().filter(|c| !c.is_whitespace()).collect();
    let ref_chars: Vec<char> = reference.chars().filter(|c| !c.is_whitespace()).collect();
    let hyp_words = chrf_words(hypothesis);
    let ref_words = chrf_words(reference);

    let mut stats = Vec::with_capacity(CHRF_CHAR_ORDER + CHRF_WORD_ORDER);

    for n in 1..=CHRF_CHAR_ORDER {
        let h = count_ngrams(&hyp_chars, n);
        let r = count_ngrams(&ref_chars, n);
        stats.push([h.values().sum(), r.values().sum(), clipped_matches(&h, &r)]);
    }
    for n in 1..=CHRF_WORD_ORDER {
        let h = count_ngrams(&hyp_words, n);
        let r = count_ngrams(&ref_words, n);
        stats.push([h.values().sum(), r.values().sum(), clipped_matches(&h, &r)]);
    }

    stats
}

fn chrf_from_statistics(stats: &[[usize; 3]]) -> f64 {
    let factor = CHRF_BETA * CHRF_BETA;
    let mut avg_precision = 0.0;
    let mut avg_recall = 0.0;
    let mut effective_order = 0usize;

    for &[n_hyp, n_ref, n_match] in stats {
        if n_hyp > 0 && n_ref > 0 {
            avg_precision += n_match as f64 / n_hyp as f64;
            avg_recall += n_match as f64 / n_ref as f64;
            effective_order += 1;
        }
    }

    if effective_order == 0 {
        return 0.0;
    }
    avg_precision /= effective_order as f64;
    avg_recall /= effective_order as f64;

    if avg_precision + avg_recall == 0.0 {
        return 0.0;
    }

    100.0 * (1.0 + factor) * avg_precision * avg_recall / (factor * avg_precision + avg_recall)
}

/// Corpus chrF++ with one reference per hypothesis
pub fn corpus_chrf(hypotheses: &[String], references: &[String]) -> f64 {
    let mut totals = vec![[0usize; 3]; CHRF_CHAR_ORDER + CHRF_WORD_ORDER];

    for (hyp, reference) in hypotheses.iter().zip(references) {
        for (acc, stat) in totals.iter_mut().zip(chrf_statistics(hyp, reference)) {
            for k in 0..3 {
                acc[k] += stat[k];
            }
        }
    }

    chrf_from_statistics(&totals)
}
