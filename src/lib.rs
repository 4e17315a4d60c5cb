//! MegaRAID Exporter - Prometheus metrics for LSI/Broadcom RAID controllers
//!
//! Runs MegaCLI (key:value text) or StorCLI (`J` JSON) on every scrape,
//! normalizes both formats into one entity model and exposes a stable metric
//! set.
//!
//! # Architecture
//!
//! ```text
//! Invoker → Parser (text | json) → Entities → Mapper → Exposition
//!    ↑
//! Path Monitor (background probe)
//! ```
//!
//! # Modules
//!
//! - [`collector`] - Per-scrape orchestration with per-class isolation
//! - [`error`] - Error types
//! - [`hardware`] - Entity model, field normalizer and both parsers
//! - [`invoker`] - Subprocess execution with timeouts
//! - [`metrics`] - Metric mapping and Prometheus encoding
//! - [`monitoring`] - Diagnostic binary health probe
//! - [`server`] - HTTP endpoints

pub mod collector;
pub mod error;
pub mod hardware;
pub mod invoker;
pub mod metrics;
pub mod monitoring;
pub mod server;

// Re-export commonly used types
pub use collector::{CollectorConfig, MegaraidCollector, ScrapeReport};
pub use error::{Error, Result};
pub use hardware::{BatteryBackupUnit, Controller, EntityClass, Inventory, PhysicalDrive, VirtualDrive};
pub use invoker::{DiagnosticRunner, OutputFormat, SubprocessRunner};
pub use monitoring::PathMonitor;
