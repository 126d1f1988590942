//! libSQL backend — async `ProfileStore` implementation.
//!
//! Supports local file and in-memory databases. Substring and set-overlap
//! matching is done in Rust after fetching candidate rows: SQLite's
//! `lower()` only folds ASCII, and the reference sets are Cyrillic.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::info;

use crate::dialogue::model::{FieldUpdate, Gender, NewProfile, UserProfile};
use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::ProfileStore;

/// libSQL database backend.
///
/// Holds a single connection reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    /// All profiles except the caller's, in natural row order.
    async fn all_other_profiles(
        &self,
        external_id: i64,
    ) -> Result<Vec<UserProfile>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE external_id != ?1"),
                params![external_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;

        let mut profiles = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?
        {
            profiles.push(row_to_profile(&row)?);
        }
        Ok(profiles)
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Defensive re-normalization of a subject set (trim + lowercase), applied
/// on every write even though callers already validated.
fn renormalize_subjects(subjects: &BTreeSet<String>) -> BTreeSet<String> {
    subjects.iter().map(|s| s.trim().to_lowercase()).collect()
}

fn subjects_to_json(subjects: &BTreeSet<String>) -> Result<String, DatabaseError> {
    serde_json::to_string(subjects).map_err(|e| DatabaseError::Serialization(e.to_string()))
}

const PROFILE_COLUMNS: &str =
    "id, external_id, display_name, location, language, gender, age, subjects, created_at, updated_at";

/// Map a libsql Row to a UserProfile.
///
/// Column order matches PROFILE_COLUMNS.
fn row_to_profile(row: &libsql::Row) -> Result<UserProfile, DatabaseError> {
    let get_err = |e: libsql::Error| DatabaseError::Query(e.to_string());

    let gender_str: String = row.get(5).map_err(get_err)?;
    let gender = Gender::parse(&gender_str)
        .ok_or_else(|| DatabaseError::Serialization(format!("Unknown gender: {gender_str}")))?;

    let subjects_json: String = row.get(7).map_err(get_err)?;
    let subjects: BTreeSet<String> = serde_json::from_str(&subjects_json)
        .map_err(|e| DatabaseError::Serialization(format!("Bad subjects column: {e}")))?;

    let age: i64 = row.get(6).map_err(get_err)?;
    let created_str: String = row.get(8).map_err(get_err)?;
    let updated_str: String = row.get(9).map_err(get_err)?;

    Ok(UserProfile {
        id: row.get(0).map_err(get_err)?,
        external_id: row.get(1).map_err(get_err)?,
        display_name: row.get::<String>(2).ok(),
        location: row.get(3).map_err(get_err)?,
        language: row.get(4).map_err(get_err)?,
        gender,
        age: age as u8,
        subjects,
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl ProfileStore for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run(self.conn()).await
    }

    async fn create(&self, profile: NewProfile) -> Result<UserProfile, DatabaseError> {
        let conn = self.conn();
        let now = Utc::now();
        let subjects = renormalize_subjects(&profile.subjects);
        let subjects_json = subjects_to_json(&subjects)?;

        conn.execute(
            "INSERT INTO profiles (external_id, display_name, location, language, gender, age, subjects, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                profile.external_id,
                profile.display_name.clone(),
                profile.location.clone(),
                profile.language.clone(),
                profile.gender.as_str(),
                profile.age as i64,
                subjects_json,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )
        .await
        .map_err(|e| {
            let msg = e.to_string();
            if msg.contains("UNIQUE") {
                DatabaseError::Duplicate {
                    external_id: profile.external_id,
                }
            } else {
                DatabaseError::Query(msg)
            }
        })?;

        Ok(UserProfile {
            id: conn.last_insert_rowid(),
            external_id: profile.external_id,
            display_name: profile.display_name,
            location: profile.location,
            language: profile.language,
            gender: profile.gender,
            age: profile.age,
            subjects,
            created_at: now,
            updated_at: now,
        })
    }

    async fn find_by_external_id(
        &self,
        external_id: i64,
    ) -> Result<Option<UserProfile>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE external_id = ?1"),
                params![external_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;

        match rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?
        {
            Some(row) => Ok(Some(row_to_profile(&row)?)),
            None => Ok(None),
        }
    }

    async fn update_field(
        &self,
        external_id: i64,
        update: FieldUpdate,
    ) -> Result<(), DatabaseError> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();

        let affected = match update {
            FieldUpdate::Location(location) => {
                conn.execute(
                    "UPDATE profiles SET location = ?1, updated_at = ?2 WHERE external_id = ?3",
                    params![location, now, external_id],
                )
                .await
            }
            FieldUpdate::Language(language) => {
                conn.execute(
                    "UPDATE profiles SET language = ?1, updated_at = ?2 WHERE external_id = ?3",
                    params![language, now, external_id],
                )
                .await
            }
            FieldUpdate::Age(age) => {
                conn.execute(
                    "UPDATE profiles SET age = ?1, updated_at = ?2 WHERE external_id = ?3",
                    params![age as i64, now, external_id],
                )
                .await
            }
            FieldUpdate::Subjects(subjects) => {
                let subjects_json = subjects_to_json(&renormalize_subjects(&subjects))?;
                conn.execute(
                    "UPDATE profiles SET subjects = ?1, updated_at = ?2 WHERE external_id = ?3",
                    params![subjects_json, now, external_id],
                )
                .await
            }
        }
        .map_err(|e| DatabaseError::Query(e.to_string()))?;

        if affected == 0 {
            return Err(DatabaseError::NotFound { external_id });
        }
        Ok(())
    }

    async fn find_matches_by_age(
        &self,
        external_id: i64,
        target: u8,
        tolerance: u8,
    ) -> Result<Vec<UserProfile>, DatabaseError> {
        let low = target as i64 - tolerance as i64;
        let high = target as i64 + tolerance as i64;

        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {PROFILE_COLUMNS} FROM profiles
                     WHERE age BETWEEN ?1 AND ?2 AND external_id != ?3"
                ),
                params![low, high, external_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?;

        let mut profiles = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?
        {
            profiles.push(row_to_profile(&row)?);
        }
        Ok(profiles)
    }

    async fn find_matches_by_location(
        &self,
        external_id: i64,
        query: &str,
    ) -> Result<Vec<UserProfile>, DatabaseError> {
        let needle = query.trim().to_lowercase();
        let profiles = self.all_other_profiles(external_id).await?;
        Ok(profiles
            .into_iter()
            .filter(|p| p.location.to_lowercase().contains(&needle))
            .collect())
    }

    async fn find_matches_by_subjects(
        &self,
        external_id: i64,
        subjects: &BTreeSet<String>,
    ) -> Result<Vec<UserProfile>, DatabaseError> {
        let wanted = renormalize_subjects(subjects);
        let profiles = self.all_other_profiles(external_id).await?;
        Ok(profiles
            .into_iter()
            .filter(|p| !p.subjects.is_disjoint(&wanted))
            .collect())
    }
}

// ── Tests ───────────────────────────────────────────────────────────
