//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async CRUD methods.
//! Most accept `&PgPool`; [`IdentityMappingRepo`] accepts any executor so
//! its writes can join the caller's transaction.

pub mod identity_mapping_repo;
pub mod mapping_config_repo;
pub mod sync_record_log_repo;
pub mod sync_run_log_repo;
pub mod transformation_function_repo;

pub use identity_mapping_repo::IdentityMappingRepo;
pub use mapping_config_repo::MappingConfigRepo;
pub use sync_record_log_repo::SyncRecordLogRepo;
pub use sync_run_log_repo::SyncRunLogRepo;
pub use transformation_function_repo::TransformationFunctionRepo;
