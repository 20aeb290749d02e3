//! Domain model structs and DTOs.
//!
//! Each submodule contains:
//! - A `FromRow` + `Serialize` entity struct matching the database row
//! - A `Deserialize` create DTO for inserts
//! - A `Deserialize` update DTO (all `Option` fields) for patches, where the
//!   table is editable

pub mod identity_mapping;
pub mod mapping_config;
pub mod sync_record_log;
pub mod sync_run_log;
pub mod transformation_function;
