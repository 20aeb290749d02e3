//! Entity synchronization pipeline: extraction, the synchronizer and its
//! storage backends.

pub mod catalog;
pub mod error;
pub mod extract;
pub mod hooks;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod store;
pub mod synchronizer;

pub use error::{CatalogError, ExtractionError, StoreError, SyncError};
pub use extract::{Extractor, HttpLegacySource, LegacySource, SourceExtractor, WatermarkSource};
pub use hooks::{EnrichmentHook, HookContext, HookError, HookRegistry};
pub use model::{builtin_models, ColumnKind, ColumnTableModel, ModelRegistry, PgTargetModel};
pub use postgres::PgSyncStore;
pub use store::{LoadBackend, LoadTransaction, SyncStore};
pub use synchronizer::{EntitySynchronizer, PreviewRecord};
