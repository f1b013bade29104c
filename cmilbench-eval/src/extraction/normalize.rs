//! Canonical form for choice answers

use std::collections::BTreeSet;

/// Reduce a choice answer to its sorted, deduplicated, upper-case letter set.
///
/// Every ASCII letter anywhere in the input counts, so `"B C"`, `"c,b"` and
/// `"答案：CB"` all normalize to `"BC"`.
pub fn normalize(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_uppercase())
        .collect::<BTreeSet<char>>()
        .into_iter()
        .collect()
}

/// Two choice answers are equal when their letter sets are identical
pub fn equal(a: &str, b: &str) -> bool {
    normalize(a) == normalize(b)
}

/// Sort and join already-extracted letters
pub(crate) fn join_letters<I: IntoIterator<Item = char>>(letters: I) -> String {
    letters
        .into_iter()
        .map(|c| c.to_ascii_uppercase())
        .collect::<BTreeSet<char>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_choice_equality_table() {
        let cases = [
            ("A", "A", true),
            ("A", "a", true),
            ("B C", "BC", true),
            ("B C", "CB", true),
            ("A,B,C", "ABC", true),
            ("A,B,C", "CBA", true),
            ("A、B、C", "CBA", true),
            ("A B C", "A C B", true),
            ("A", "B", false),
            ("AB", "AC", false),
            ("ABC", "AB", false),
            ("", "", true),
            ("A", "", false),
            ("", "A", false),
        ];

        for (a, b, expected) in cases {
            assert_eq!(equal(a, b), expected, "{:?} vs {:?}", a, b);
        }
    }

    #[test]
    fn test_normalize_ignores_non_latin() {
        assert_eq!(normalize("答案：c 和 a"), "AC");
        assert_eq!(normalize("１２３"), "");
    }

    proptest! {
        #[test]
        fn test_normalize_idempotent(s in "\\PC{0,40}") {
            let once = normalize(&s);
            prop_assert_eq!(normalize(&once), once.clone());
        }

        #[test]
        fn test_subset_never_equal(letters in "[A-D]{1,4}") {
            let full = normalize(&letters);
            if full.len() > 1 {
                let subset = &full[..full.len() - 1];
                prop_assert!(!equal(&full, subset));
            }
        }
    }
}
