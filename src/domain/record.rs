//! Rules for example records that hold regardless of transport.
//!
//! Validation mirrors the edit form: `name` is required and `age` must stay in
//! `AGE_MIN..=AGE_MAX`. Ordering is a client-side contract; the remote
//! collection returns records in whatever order it likes.

use std::cmp::Ordering;
use std::sync::OnceLock;

use fequery_api_types::{AGE_MAX, AGE_MIN, ExampleRecord};
use icu_collator::options::{CollatorOptions, Strength};
use icu_collator::{Collator, CollatorBorrowed};
use tracing::warn;

use super::error::ValidationError;

/// Check a record before it is submitted for creation or replacement.
pub fn validate_record(record: &ExampleRecord) -> Result<(), ValidationError> {
    if record.name.trim().is_empty() {
        return Err(ValidationError::required("name"));
    }

    if !(AGE_MIN..=AGE_MAX).contains(&record.age) {
        return Err(ValidationError::out_of_range(
            "age", AGE_MIN, AGE_MAX, record.age,
        ));
    }

    Ok(())
}

static COLLATOR: OnceLock<Option<CollatorBorrowed<'static>>> = OnceLock::new();

/// Root-locale collator at tertiary strength, built once.
fn collator() -> Option<&'static CollatorBorrowed<'static>> {
    COLLATOR
        .get_or_init(|| {
            let mut options = CollatorOptions::default();
            options.strength = Some(Strength::Tertiary);
            Collator::try_new(Default::default(), options)
                .map_err(|err| warn!(error = %err, "Collator unavailable, sorting by code point"))
                .ok()
        })
        .as_ref()
}

/// Locale-aware comparison of record names.
///
/// Uses the Unicode root collation: accents sort with their base letter and
/// lowercase precedes uppercase (`alice` < `Alice` < `bob`). Strings the
/// collator considers equal fall back to byte order so the order is total.
pub fn compare_names(left: &str, right: &str) -> Ordering {
    collator()
        .map_or(Ordering::Equal, |collator| collator.compare(left, right))
        .then_with(|| left.cmp(right))
}

/// Sort records by name ascending, in place.
pub fn sort_by_name(records: &mut [ExampleRecord]) {
    records.sort_by(|a, b| compare_names(&a.name, &b.name));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_record_within_bounds() {
        assert!(validate_record(&ExampleRecord::new("John", 30)).is_ok());
        assert!(validate_record(&ExampleRecord::new("Edge", AGE_MIN)).is_ok());
        assert!(validate_record(&ExampleRecord::new("Edge", AGE_MAX)).is_ok());
    }

    #[test]
    fn rejects_blank_name() {
        let err = validate_record(&ExampleRecord::new("   ", 30)).expect_err("blank name");
        assert_eq!(err, ValidationError::required("name"));
        assert_eq!(err.field(), "name");
    }

    #[test]
    fn rejects_age_out_of_range() {
        let err = validate_record(&ExampleRecord::new("Old", 201)).expect_err("too old");
        assert!(matches!(
            err,
            ValidationError::OutOfRange {
                field: "age",
                value: 201,
                ..
            }
        ));

        let err = validate_record(&ExampleRecord::new("Young", 0)).expect_err("too young");
        assert_eq!(err.field(), "age");
    }

    #[test]
    fn sorts_names_ascending() {
        let mut records = vec![
            ExampleRecord::new("John", 30),
            ExampleRecord::new("Jane", 25),
        ];
        sort_by_name(&mut records);
        assert_eq!(
            records,
            vec![
                ExampleRecord::new("Jane", 25),
                ExampleRecord::new("John", 30)
            ]
        );
    }

    #[test]
    fn accented_names_sort_with_their_base_letter() {
        let mut records = vec![
            ExampleRecord::new("Zoe", 1),
            ExampleRecord::new("Émile", 2),
            ExampleRecord::new("Ana", 3),
        ];
        sort_by_name(&mut records);
        let names: Vec<_> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["Ana", "Émile", "Zoe"]);
    }

    #[test]
    fn lowercase_precedes_uppercase_within_a_letter() {
        let mut records = vec![
            ExampleRecord::new("Bob", 1),
            ExampleRecord::new("alice", 2),
            ExampleRecord::new("Alice", 3),
            ExampleRecord::new("bob", 4),
        ];
        sort_by_name(&mut records);
        let names: Vec<_> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["alice", "Alice", "bob", "Bob"]);
    }

    #[test]
    fn identical_names_compare_equal() {
        assert_eq!(compare_names("Émile", "Émile"), Ordering::Equal);
        assert_eq!(compare_names("émile", "Émile"), Ordering::Less);
    }
}
