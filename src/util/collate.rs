use icu::collator::{Collator, CollatorOptions, Strength};

/// Builds the collator used for every display-title ordering in the crate.
///
/// Secondary strength: diacritics are significant but sort next to their
/// base letter ("ą" lands between "a" and "b", "ć" between "b" and "d"),
/// and case differences do not dominate the ordering. Raw codepoint order
/// would push every accented title past "z".
pub(crate) fn collator() -> Collator {
    let mut options = CollatorOptions::new();
    options.strength = Some(Strength::Secondary);
    Collator::try_new(&Default::default(), options)
        .expect("compiled collation data for the root locale is always present")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Ordering;

    #[test]
    fn diacritics_sort_next_to_base_letter() {
        let collator = collator();
        assert_eq!(collator.compare("ą", "b"), Ordering::Less);
        assert_eq!(collator.compare("a", "ą"), Ordering::Less);
        assert_eq!(collator.compare("b", "ć"), Ordering::Less);
        assert_eq!(collator.compare("ć", "d"), Ordering::Less);
    }

    #[test]
    fn case_does_not_dominate() {
        let collator = collator();
        // "Third" sorts by t, not by uppercase-before-lowercase
        assert_eq!(collator.compare("Third Category", "d"), Ordering::Greater);
        assert_eq!(collator.compare("ć Second Category", "Third Category"), Ordering::Less);
    }
}
