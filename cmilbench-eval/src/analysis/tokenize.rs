//! Language-aware tokenization for overlap metrics

use std::sync::LazyLock;

use jieba_rs::Jieba;
use regex::Regex;

/// Word segmentation failure
#[derive(Debug, thiserror::Error)]
pub enum SegmentError {
    #[error("no {0} script found in input")]
    WrongScript(&'static str),
}

/// A dedicated word segmenter for one language
pub trait Segmenter: Send + Sync {
    fn segment(&self, text: &str) -> Result<Vec<String>, SegmentError>;
}

/// Rule-based Tibetan syllable segmenter.
///
/// Splits on the tsheg (U+0F0B), shad marks (U+0F0D..U+0F12) and whitespace.
pub struct TibetanSegmenter;

const TSHEG: char = '\u{0F0B}';

fn is_tibetan(c: char) -> bool {
    ('\u{0F00}'..='\u{0FFF}').contains(&c)
}

fn is_tibetan_delimiter(c: char) -> bool {
    c == TSHEG || ('\u{0F0D}'..='\u{0F12}').contains(&c) || c.is_whitespace()
}

impl Segmenter for TibetanSegmenter {
    fn segment(&self, text: &str) -> Result<Vec<String>, SegmentError> {
        if !text.chars().any(is_tibetan) {
            return Err(SegmentError::WrongScript("Tibetan"));
        }

        Ok(text
            .split(is_tibetan_delimiter)
            .filter(|s| !s.trim().is_empty())
            .map(String::from)
            .collect())
    }
}

/// Every non-whitespace character as its own token
pub fn char_tokens(text: &str) -> Vec<String> {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .map(String::from)
        .collect()
}

/// Tokens for ROUGE-L, chosen by language code.
///
/// Tibetan uses the syllable segmenter and falls back to characters when it
/// fails; Mongolian and Uyghur split on whitespace; anything else is
/// character-level.
pub fn tokenize_for_rouge(text: &str, language: &str) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }

    match language {
        "bo" => match TibetanSegmenter.segment(text) {
            Ok(tokens) => tokens,
            Err(e) => {
                tracing::debug!("Tibetan segmentation failed ({}), using characters", e);
                char_tokens(text)
            }
        },
        "mn" | "ug" => text.split_whitespace().map(String::from).collect(),
        _ => char_tokens(text),
    }
}

static JIEBA: LazyLock<Jieba> = LazyLock::new(Jieba::new);

/// Chinese word segmentation, space-joined
pub fn segment_chinese(text: &str) -> String {
    JIEBA.cut(text, true).join(" ")
}

static PUNCT_13A: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"([\{-~\[-` -&\(-\+:-@/])", " $1 "),
        (r"([^0-9])([\.,])", "$1 $2 "),
        (r"([\.,])([^0-9])", " $1 $2"),
        (r"([0-9])(-)", "$1 $2 "),
    ]
    .into_iter()
    .map(|(pattern, replacement)| (Regex::new(pattern).expect("Invalid 13a regex"), replacement))
    .collect()
});

/// The `13a` tokenizer of the mteval-v13a script, as used for corpus BLEU
pub fn tokenize_13a(line: &str) -> Vec<String> {
    let mut text = line
        .replace("<skipped>", "")
        .replace("-\n", "")
        .replace('\n', " ");

    if text.contains('&') {
        text = text
            .replace("&quot;", "\"")
            .replace("&amp;", "&")
            .replace("&lt;", "<")
            .replace("&gt;", ">");
    }

    let mut text = format!(" {} ", text);
    for (re, replacement) in PUNCT_13A.iter() {
        text = re.replace_all(&text, *replacement).into_owned();
    }

    text.split_whitespace().map(String::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tibetan_syllables() {
        let tokens = tokenize_for_rouge("བཀྲ་ཤིས་བདེ་ལེགས།", "bo");
        assert_eq!(tokens, vec!["བཀྲ", "ཤིས", "བདེ", "ལེགས"]);
    }

    #[test]
    fn test_tibetan_fallback_to_chars() {
        assert!(TibetanSegmenter.segment("hello").is_err());
        assert_eq!(tokenize_for_rouge("ab c", "bo"), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_whitespace_languages() {
        assert_eq!(tokenize_for_rouge("  سالام   دۇنيا ", "ug"), vec!["سالام", "دۇنيا"]);
        assert_eq!(tokenize_for_rouge("ᠮᠣᠩᠭᠣᠯ ᠬᠡᠯᠡ", "mn").len(), 2);
    }

    #[test]
    fn test_char_level_default() {
        assert_eq!(tokenize_for_rouge("你 好", "zh"), vec!["你", "好"]);
        assert!(tokenize_for_rouge("", "zh").is_empty());
    }

    #[test]
    fn test_13a_splits_punctuation() {
        assert_eq!(tokenize_13a("Hello, world."), vec!["Hello", ",", "world", "."]);
        assert_eq!(tokenize_13a("3.14 (pi)"), vec!["3.14", "(", "pi", ")"]);
    }

    #[test]
    fn test_segment_chinese_keeps_all_text() {
        let segmented = segment_chinese("我们中出了一个叛徒");
        assert_eq!(segmented.replace(' ', ""), "我们中出了一个叛徒");
    }
}
