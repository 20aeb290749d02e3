//! Transformation function model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use syncbridge_core::types::{DbId, Timestamp};

/// A row from the `transformation_functions` table.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TransformationFunction {
    pub id: DbId,
    pub name: String,
    pub description: Option<String>,
    pub code: String,
    /// Incremented whenever `code` changes.
    pub version: i32,
    pub is_active: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for creating a transformation function.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTransformationFunction {
    pub name: String,
    pub description: Option<String>,
    pub code: String,
    pub is_active: Option<bool>,
}

/// DTO for updating a transformation function.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTransformationFunction {
    pub description: Option<String>,
    pub code: Option<String>,
    pub is_active: Option<bool>,
}
