//! mikroscope server library.
//!
//! Exposes every subsystem for in-process testing; the `mikroscoped`
//! binary wires them together.

pub mod alerts;
pub mod config;
pub mod db;
pub mod health;
pub mod http;
pub mod indexer;
pub mod ingest;
pub mod maintenance;
pub mod openapi;
pub mod preflight;
pub mod query;

pub use alerts::{AlertManager, AlertPolicy, AlertState, PolicyPatch};
pub use config::{Protocol, ServerConfig};
pub use db::{Bucket, IndexStore, PruneReport, StoreError, StoreStats};
pub use http::{build_router, AppState, SharedState};
pub use indexer::{IndexMode, IndexReport, Indexer};
pub use ingest::{IngestQueue, QueueStats};
pub use maintenance::{MaintenanceLoop, MaintenanceReport, RetentionConfig};
pub use preflight::run_preflight;
pub use query::QueryService;
