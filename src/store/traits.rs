//! `ProfileStore` trait — backend-agnostic async interface for profiles.

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::dialogue::model::{FieldUpdate, NewProfile, UserProfile};
use crate::error::DatabaseError;

/// Default ± tolerance for age matching.
pub const DEFAULT_AGE_TOLERANCE: u8 = 3;

/// CRUD and match queries over persisted user profiles.
///
/// Every operation is a single atomic unit of work against the backing
/// store. Match queries always exclude the calling user and return rows in
/// the store's natural order.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    /// Insert a new profile. Fails with [`DatabaseError::Duplicate`] when a
    /// profile already exists for the external id (store-enforced
    /// uniqueness).
    async fn create(&self, profile: NewProfile) -> Result<UserProfile, DatabaseError>;

    /// Look up a profile by its external (transport-native) id.
    async fn find_by_external_id(
        &self,
        external_id: i64,
    ) -> Result<Option<UserProfile>, DatabaseError>;

    /// Apply a single-field update. Fails with [`DatabaseError::NotFound`]
    /// when no row matches the external id.
    async fn update_field(
        &self,
        external_id: i64,
        update: FieldUpdate,
    ) -> Result<(), DatabaseError>;

    /// Profiles whose age lies within `[target - tolerance, target + tolerance]`
    /// inclusive, excluding the caller.
    async fn find_matches_by_age(
        &self,
        external_id: i64,
        target: u8,
        tolerance: u8,
    ) -> Result<Vec<UserProfile>, DatabaseError>;

    /// Profiles whose location contains the query as a case-insensitive
    /// substring, excluding the caller.
    async fn find_matches_by_location(
        &self,
        external_id: i64,
        query: &str,
    ) -> Result<Vec<UserProfile>, DatabaseError>;

    /// Profiles whose subject set shares at least one element with the
    /// query set, excluding the caller.
    async fn find_matches_by_subjects(
        &self,
        external_id: i64,
        subjects: &BTreeSet<String>,
    ) -> Result<Vec<UserProfile>, DatabaseError>;
}
