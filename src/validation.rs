//! Input validation against the closed reference sets.
//!
//! Pure functions only. Raw user text goes in, canonical values come out
//! (or `None` when the value is not in the reference set). Profile fields
//! never hold raw input.

use std::collections::{BTreeSet, HashSet};
use std::sync::LazyLock;

/// Minimum accepted age, inclusive.
pub const MIN_AGE: u8 = 13;
/// Maximum accepted age, inclusive.
pub const MAX_AGE: u8 = 80;

static VALID_COUNTRIES: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    HashSet::from([
        "Россия",
        "Украина",
        "Беларусь",
        "Казахстан",
        "США",
        "Канада",
        "Великобритания",
        "Германия",
        "Франция",
        "Италия",
        "Испания",
        "Польша",
        "Китай",
        "Япония",
        "Южная Корея",
        "Австралия",
        "Бразилия",
        "Мексика",
        "Индия",
    ])
});

static VALID_LANGUAGES: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    HashSet::from([
        "русский",
        "английский",
        "немецкий",
        "французский",
        "испанский",
        "китайский",
        "японский",
        "корейский",
        "итальянский",
        "португальский",
        "хинди",
        "арабский",
    ])
});

static VALID_SUBJECTS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    HashSet::from([
        "математика",
        "физика",
        "химия",
        "биология",
        "информатика",
        "программирование",
        "история",
        "география",
        "литература",
        "английский язык",
        "русский язык",
        "обществознание",
        "экономика",
        "философия",
        "психология",
        "музыка",
        "искусство",
        "право",
        "медицина",
        "маркетинг",
        "менеджмент",
    ])
});

/// Title-case each whitespace-separated word ("южная корея" → "Южная Корея").
fn title_case(raw: &str) -> String {
    raw.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalize a country name to its canonical form.
///
/// Trims and title-cases the input, then checks membership in the fixed
/// country set. Returns `None` for unknown countries.
pub fn normalize_country(raw: &str) -> Option<String> {
    let normalized = title_case(raw.trim());
    VALID_COUNTRIES
        .contains(normalized.as_str())
        .then_some(normalized)
}

/// Normalize a language name to its canonical lowercase form.
pub fn normalize_language(raw: &str) -> Option<String> {
    let normalized = raw.trim().to_lowercase();
    VALID_LANGUAGES
        .contains(normalized.as_str())
        .then_some(normalized)
}

/// Normalize a list of subjects, all-or-nothing.
///
/// Each entry is trimmed and lowercased; duplicates collapse. A single
/// entry outside the subject set (or an empty entry, or an empty list)
/// invalidates the whole input — never a partial set.
pub fn normalize_subjects<'a, I>(items: I) -> Option<BTreeSet<String>>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut normalized = BTreeSet::new();
    for item in items {
        let subject = item.trim().to_lowercase();
        if !VALID_SUBJECTS.contains(subject.as_str()) {
            return None;
        }
        normalized.insert(subject);
    }
    if normalized.is_empty() {
        return None;
    }
    Some(normalized)
}

/// Normalize a comma-separated subject list, all-or-nothing.
pub fn normalize_subject_list(raw: &str) -> Option<BTreeSet<String>> {
    normalize_subjects(raw.split(','))
}

/// Whether an age lies within the accepted [`MIN_AGE`]..=[`MAX_AGE`] range.
pub fn age_in_range(age: u8) -> bool {
    (MIN_AGE..=MAX_AGE).contains(&age)
}

/// Parse free text into a valid age, if it is one.
pub fn parse_age(raw: &str) -> Option<u8> {
    let age: u8 = raw.trim().parse().ok()?;
    age_in_range(age).then_some(age)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn country_case_and_whitespace_insensitive() {
        for raw in ["Россия", "россия", "  РОССИЯ  ", "росСИя"] {
            assert_eq!(normalize_country(raw).as_deref(), Some("Россия"));
        }
    }

    #[test]
    fn country_multi_word() {
        assert_eq!(
            normalize_country("южная корея").as_deref(),
            Some("Южная Корея")
        );
    }

    #[test]
    fn country_unknown_rejected() {
        assert_eq!(normalize_country("Нарния"), None);
        assert_eq!(normalize_country(""), None);
    }

    #[test]
    fn language_lowercased() {
        assert_eq!(normalize_language(" РусСКИЙ ").as_deref(), Some("русский"));
        assert_eq!(normalize_language("клингонский"), None);
    }

    #[test]
    fn subjects_all_or_nothing() {
        // One bad entry among valid ones yields nothing, never a partial set.
        assert_eq!(normalize_subject_list("математика, физика, алхимия"), None);

        let subjects = normalize_subject_list("Математика,  ФИЗИКА ").unwrap();
        assert_eq!(
            subjects,
            BTreeSet::from(["математика".to_string(), "физика".to_string()])
        );
    }

    #[test]
    fn subjects_duplicates_collapse() {
        let subjects = normalize_subject_list("физика, физика, Физика").unwrap();
        assert_eq!(subjects.len(), 1);
    }

    #[test]
    fn subjects_empty_entry_rejected() {
        assert_eq!(normalize_subject_list("математика,"), None);
        assert_eq!(normalize_subject_list(""), None);
    }

    #[test]
    fn age_bounds_inclusive() {
        assert!(age_in_range(MIN_AGE));
        assert!(age_in_range(MAX_AGE));
        assert!(!age_in_range(MIN_AGE - 1));
        assert!(!age_in_range(MAX_AGE + 1));
    }

    #[test]
    fn parse_age_rejects_garbage() {
        assert_eq!(parse_age("25"), Some(25));
        assert_eq!(parse_age(" 30 "), Some(30));
        assert_eq!(parse_age("200"), None);
        assert_eq!(parse_age("-5"), None);
        assert_eq!(parse_age("двадцать"), None);
        assert_eq!(parse_age("25.5"), None);
    }
}
