//! Collector - scrape orchestration
//!
//! One scrape runs the diagnostic tool for each entity class, in order
//! controller, virtual drive, physical drive, battery. Each class goes
//! through invoke, parse and map on its own; a failure in one class is
//! logged and only that class's metrics are left out. A class collected by
//! several commands succeeds when at least one of them does.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, instrument, warn};

use crate::error::{Error, InvokeError, Result};
use crate::hardware::{json, text, EntityClass, Inventory};
use crate::invoker::{DiagnosticRunner, OutputFormat};
use crate::metrics::mapper::{SCRAPE_DURATION, SCRAPE_SUCCESS};
use crate::metrics::{inventory_samples, DescriptorSet, MetricSample};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the collector
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Diagnostic tool output format
    pub format: OutputFormat,

    /// Upper bound for one subprocess call
    pub command_timeout: Duration,

    /// Upper bound for all calls of one scrape together
    pub scrape_timeout: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Text,
            command_timeout: Duration::from_secs(30),
            scrape_timeout: Duration::from_secs(60),
        }
    }
}

// =============================================================================
// Scrape Report
// =============================================================================

/// Outcome of one entity class within a scrape
#[derive(Debug, Clone)]
pub struct ClassReport {
    pub class: EntityClass,
    /// Entities found, after duplicates were dropped
    pub entities: usize,
    pub duration: Duration,
    /// Why the class was skipped, if it was
    pub error: Option<String>,
}

impl ClassReport {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Everything one scrape produced
#[derive(Debug, Clone, Default)]
pub struct ScrapeReport {
    pub classes: Vec<ClassReport>,
    /// Entity samples followed by per-class scrape samples
    pub samples: Vec<MetricSample>,
}

impl ScrapeReport {
    /// Report for `class`, if it was attempted
    pub fn class(&self, class: EntityClass) -> Option<&ClassReport> {
        self.classes.iter().find(|c| c.class == class)
    }

    /// Samples named `name`
    pub fn samples_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a MetricSample> {
        self.samples.iter().filter(move |s| s.name == name)
    }
}

// =============================================================================
// Collector
// =============================================================================

/// Pull collector for MegaRAID controllers
pub struct MegaraidCollector {
    config: CollectorConfig,
    runner: Arc<dyn DiagnosticRunner>,
    descriptors: DescriptorSet,
}

impl MegaraidCollector {
    /// Create a collector and its metric descriptors
    pub fn new(config: CollectorConfig, runner: Arc<dyn DiagnosticRunner>) -> Result<Self> {
        Ok(Self {
            config,
            runner,
            descriptors: DescriptorSet::new()?,
        })
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    pub fn descriptors(&self) -> &DescriptorSet {
        &self.descriptors
    }

    /// Run one scrape. Never fails; per-class failures are in the report.
    #[instrument(skip(self), fields(format = %self.config.format))]
    pub async fn scrape(&self) -> ScrapeReport {
        let started = Instant::now();
        let mut report = ScrapeReport::default();
        let mut scrape_samples = Vec::with_capacity(EntityClass::ALL.len() * 2);

        for class in EntityClass::ALL {
            let class_started = Instant::now();
            let outcome = self.collect_class(class, started).await;
            let duration = class_started.elapsed();

            let class_report = match outcome {
                Ok(inventory) => {
                    debug!(%class, entities = inventory.len(), ?duration, "Collected entity class");
                    report.samples.extend(inventory_samples(&inventory));
                    ClassReport {
                        class,
                        entities: inventory.len(),
                        duration,
                        error: None,
                    }
                }
                Err(e) => {
                    warn!(%class, error = %e, ?duration, "Entity class unavailable this scrape");
                    ClassReport {
                        class,
                        entities: 0,
                        duration,
                        error: Some(e.to_string()),
                    }
                }
            };

            let label = vec![("collector", class.to_string())];
            let success = if class_report.succeeded() { 1.0 } else { 0.0 };
            scrape_samples.push(MetricSample::gauge(SCRAPE_SUCCESS, success, label.clone()));
            scrape_samples.push(MetricSample::gauge(
                SCRAPE_DURATION,
                duration.as_secs_f64(),
                label,
            ));
            report.classes.push(class_report);
        }

        report.samples.extend(scrape_samples);
        report
    }

    /// Scrape and encode the result in the Prometheus text format
    pub async fn render(&self) -> Result<String> {
        let report = self.scrape().await;
        self.descriptors.encode(&report.samples)
    }

    /// Invoke, parse and deduplicate one entity class
    async fn collect_class(&self, class: EntityClass, scrape_started: Instant) -> Result<Inventory> {
        let mut inventory = Inventory::default();
        let mut first_error = None;
        let mut any_succeeded = false;

        for args in self.config.format.commands(class) {
            match self.collect_command(class, args, scrape_started).await {
                Ok(collected) => {
                    any_succeeded = true;
                    inventory.extend(collected);
                }
                Err(e) => {
                    debug!(%class, command = %args.join(" "), error = %e, "Command failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) if !any_succeeded => Err(e),
            _ => Ok(inventory.dedup()),
        }
    }

    async fn collect_command(
        &self,
        class: EntityClass,
        args: &[&str],
        scrape_started: Instant,
    ) -> Result<Inventory> {
        let remaining = self
            .config
            .scrape_timeout
            .saturating_sub(scrape_started.elapsed());
        if remaining.is_zero() {
            return Err(InvokeError::Timeout(self.config.scrape_timeout).into());
        }
        let timeout = self.config.command_timeout.min(remaining);

        let output = self.runner.run(args, timeout).await?;
        parse_class(self.config.format, class, &output)
    }
}

/// Parse raw tool output into the entities of one class
pub fn parse_class(format: OutputFormat, class: EntityClass, output: &str) -> Result<Inventory> {
    let mut inventory = Inventory::default();
    match format {
        OutputFormat::Text => match class {
            EntityClass::Controller => inventory.controllers = text::parse_controllers(output),
            EntityClass::VirtualDrive => {
                inventory.virtual_drives = text::parse_virtual_drives(output)
            }
            EntityClass::PhysicalDrive => {
                inventory.physical_drives = text::parse_physical_drives(output)
            }
            EntityClass::Battery => inventory.batteries = text::parse_batteries(output),
        },
        OutputFormat::Json => {
            inventory = json::parse_document(output)
                .map_err(Error::from)?
                .into_inventory();
            inventory.retain_class(class);
        }
    }
    Ok(inventory)
}
