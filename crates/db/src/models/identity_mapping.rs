//! Identity mapping model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use syncbridge_core::types::{DbId, Timestamp};

/// A row from the `identity_mappings` table.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct IdentityMapping {
    pub id: DbId,
    pub entity_type: String,
    pub legacy_id: String,
    pub new_id: String,
    pub created_at: Timestamp,
    pub last_synced_at: Timestamp,
}

/// DTO for creating an identity mapping.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateIdentityMapping {
    pub entity_type: String,
    pub legacy_id: String,
    pub new_id: String,
}
