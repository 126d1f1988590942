//! Domain types — profiles, field updates, search criteria.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User gender, collected once at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
        }
    }

    /// Parse the storage representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "male" => Some(Self::Male),
            "female" => Some(Self::Female),
            _ => None,
        }
    }
}

impl std::fmt::Display for Gender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted user profile.
///
/// `location`, `language` and `subjects` always hold canonical reference-set
/// members, never raw input. `external_id` is the user's identity in the
/// transport's namespace and is immutable once the row exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Surrogate key, assigned by the store.
    pub id: i64,
    pub external_id: i64,
    /// Cosmetic handle (e.g. a messenger username); not unique.
    pub display_name: Option<String>,
    pub location: String,
    pub language: String,
    pub gender: Gender,
    pub age: u8,
    pub subjects: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Validated field bundle for creating a profile.
#[derive(Debug, Clone)]
pub struct NewProfile {
    pub external_id: i64,
    pub display_name: Option<String>,
    pub location: String,
    pub language: String,
    pub gender: Gender,
    pub age: u8,
    pub subjects: BTreeSet<String>,
}

/// A single-field profile mutation.
///
/// Closed set of updatable fields; dispatch is exhaustive pattern matching.
/// Gender is set at registration and is not updatable.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    Location(String),
    Language(String),
    Age(u8),
    Subjects(BTreeSet<String>),
}

impl FieldUpdate {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Location(_) => "location",
            Self::Language(_) => "language",
            Self::Age(_) => "age",
            Self::Subjects(_) => "subjects",
        }
    }
}

/// One search request, built from a single dialogue turn.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchCriterion {
    /// Age proximity around a target age.
    ByAge(u8),
    /// Case-insensitive substring match on location.
    ByLocation(String),
    /// Set-overlap match on subjects.
    BySubjects(BTreeSet<String>),
}

impl SearchCriterion {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::ByAge(_) => "age",
            Self::ByLocation(_) => "location",
            Self::BySubjects(_) => "subjects",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gender_roundtrip() {
        for gender in [Gender::Male, Gender::Female] {
            assert_eq!(Gender::parse(gender.as_str()), Some(gender));
        }
        assert_eq!(Gender::parse("other"), None);
    }

    #[test]
    fn gender_display_matches_serde() {
        for gender in [Gender::Male, Gender::Female] {
            let json = serde_json::to_string(&gender).unwrap();
            assert_eq!(json, format!("\"{gender}\""));
        }
    }

    #[test]
    fn field_update_labels() {
        assert_eq!(FieldUpdate::Location("Россия".into()).label(), "location");
        assert_eq!(FieldUpdate::Age(25).label(), "age");
        assert_eq!(FieldUpdate::Subjects(BTreeSet::new()).label(), "subjects");
    }
}
