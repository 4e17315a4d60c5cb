//! Metrics module
//!
//! Maps entities to metric samples and encodes them for Prometheus.

pub mod exposition;
pub mod mapper;

pub use exposition::{DescriptorSet, MetricDescriptor};
pub use mapper::{inventory_samples, status_value, MetricKind, MetricSample};
