//! Pure domain logic for the legacy entity synchronization engine.
//!
//! Nothing in this crate performs I/O. The database layer lives in
//! `syncbridge-db` and the orchestration in `syncbridge-pipeline`.

pub mod error;
pub mod field_mapping;
pub mod naming;
pub mod record;
pub mod search;
pub mod sync_status;
pub mod transform;
pub mod types;
