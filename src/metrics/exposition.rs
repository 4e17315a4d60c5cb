//! Prometheus Exposition
//!
//! The descriptor set is built once per collector instance. Each scrape gets
//! a fresh `Registry` filled from that set, so series from an earlier scrape
//! never leak into a later one.

use std::collections::HashMap;

use prometheus::{CounterVec, GaugeVec, Opts, Registry, TextEncoder};
use tracing::warn;

use super::mapper::*;
use crate::error::{Error, Result};

/// Static description of one metric family
#[derive(Debug, Clone)]
pub struct MetricDescriptor {
    pub name: &'static str,
    pub help: &'static str,
    pub kind: MetricKind,
    pub labels: &'static [&'static str],
}

const CONTROLLER_LABELS: &[&str] = &["controller", "model", "serial"];
const PD_LABELS: &[&str] = &["controller", "enclosure_slot", "model"];
const BBU_LABELS: &[&str] = &["controller", "type"];

fn descriptor(
    name: &'static str,
    help: &'static str,
    kind: MetricKind,
    labels: &'static [&'static str],
) -> MetricDescriptor {
    MetricDescriptor {
        name,
        help,
        kind,
        labels,
    }
}

/// Every family the exporter can emit
fn all_descriptors() -> Vec<MetricDescriptor> {
    use MetricKind::{Counter, Gauge};

    vec![
        descriptor(
            CONTROLLER_STATUS,
            "Status of MegaRAID controller (1=optimal, 0=not optimal)",
            Gauge,
            CONTROLLER_LABELS,
        ),
        descriptor(
            CONTROLLER_TEMPERATURE,
            "Temperature of MegaRAID controller in Celsius",
            Gauge,
            CONTROLLER_LABELS,
        ),
        descriptor(
            VD_STATUS,
            "Status of virtual drive (1=optimal, 0=not optimal)",
            Gauge,
            &["controller", "vd", "type", "access"],
        ),
        descriptor(
            VD_SIZE,
            "Size of virtual drive in bytes",
            Gauge,
            &["controller", "vd", "type"],
        ),
        descriptor(
            PD_STATUS,
            "Status of physical drive (1=online, 0=not online)",
            Gauge,
            &["controller", "enclosure_slot", "model", "type"],
        ),
        descriptor(
            PD_TEMPERATURE,
            "Temperature of physical drive in Celsius",
            Gauge,
            PD_LABELS,
        ),
        descriptor(
            PD_MEDIA_ERRORS,
            "Total media errors on physical drive",
            Counter,
            PD_LABELS,
        ),
        descriptor(
            PD_OTHER_ERRORS,
            "Total other errors on physical drive",
            Counter,
            PD_LABELS,
        ),
        descriptor(
            PD_PREDICTIVE_FAILURES,
            "Total predictive failures on physical drive",
            Counter,
            PD_LABELS,
        ),
        descriptor(
            BBU_STATUS,
            "Status of battery backup unit (1=optimal, 0=not optimal)",
            Gauge,
            BBU_LABELS,
        ),
        descriptor(
            BBU_TEMPERATURE,
            "Temperature of battery backup unit in Celsius",
            Gauge,
            BBU_LABELS,
        ),
        descriptor(
            BBU_CHARGE,
            "Charge level of battery backup unit in percent",
            Gauge,
            BBU_LABELS,
        ),
        descriptor(
            SCRAPE_SUCCESS,
            "Whether the entity class was collected successfully in this scrape",
            Gauge,
            &["collector"],
        ),
        descriptor(
            SCRAPE_DURATION,
            "Time spent collecting the entity class in this scrape",
            Gauge,
            &["collector"],
        ),
    ]
}

enum Family {
    Gauge(GaugeVec),
    Counter(CounterVec),
}

impl Family {
    fn build(desc: &MetricDescriptor) -> Result<Self> {
        let opts = Opts::new(desc.name, desc.help);
        Ok(match desc.kind {
            MetricKind::Gauge => Family::Gauge(GaugeVec::new(opts, desc.labels)?),
            MetricKind::Counter => Family::Counter(CounterVec::new(opts, desc.labels)?),
        })
    }

    fn register(&self, registry: &Registry) -> Result<()> {
        match self {
            Family::Gauge(v) => registry.register(Box::new(v.clone()))?,
            Family::Counter(v) => registry.register(Box::new(v.clone()))?,
        }
        Ok(())
    }

    fn record(&self, values: &[&str], value: f64) -> Result<()> {
        match self {
            Family::Gauge(v) => v.get_metric_with_label_values(values)?.set(value),
            Family::Counter(v) => v.get_metric_with_label_values(values)?.inc_by(value),
        }
        Ok(())
    }
}

/// Metric descriptors owned by one collector instance
#[derive(Debug, Clone)]
pub struct DescriptorSet {
    descriptors: Vec<MetricDescriptor>,
    by_name: HashMap<&'static str, usize>,
}

impl DescriptorSet {
    /// Build and validate the full descriptor set
    pub fn new() -> Result<Self> {
        let descriptors = all_descriptors();
        for desc in &descriptors {
            Family::build(desc)?;
        }
        let by_name = descriptors
            .iter()
            .enumerate()
            .map(|(i, d)| (d.name, i))
            .collect();
        Ok(Self {
            descriptors,
            by_name,
        })
    }

    pub fn descriptors(&self) -> &[MetricDescriptor] {
        &self.descriptors
    }

    pub fn get(&self, name: &str) -> Option<&MetricDescriptor> {
        self.by_name.get(name).map(|&i| &self.descriptors[i])
    }

    /// Encode `samples` in the Prometheus text format.
    ///
    /// Families without samples are left out of the output.
    pub fn encode(&self, samples: &[MetricSample]) -> Result<String> {
        let registry = Registry::new();
        let families = self
            .descriptors
            .iter()
            .map(Family::build)
            .collect::<Result<Vec<_>>>()?;
        for family in &families {
            family.register(&registry)?;
        }

        for sample in samples {
            let Some(&index) = self.by_name.get(sample.name) else {
                warn!(metric = sample.name, "Dropping sample without descriptor");
                continue;
            };
            if sample.kind == MetricKind::Counter && sample.value < 0.0 {
                continue;
            }
            let values: Vec<&str> = self.descriptors[index]
                .labels
                .iter()
                .map(|label| sample.label(label).unwrap_or(""))
                .collect();
            families[index].record(&values, sample.value)?;
        }

        let mut buffer = String::new();
        TextEncoder::new()
            .encode_utf8(&registry.gather(), &mut buffer)
            .map_err(|e| Error::Internal(format!("Failed to encode metrics: {}", e)))?;
        Ok(buffer)
    }
}
