//! Metrics Mapper
//!
//! Converts entities into metric samples. Optional readings are emitted only
//! when the tool reported them; a reported zero is always emitted.

use serde::Serialize;

use crate::hardware::{
    BatteryBackupUnit, Controller, Inventory, PhysicalDrive, VirtualDrive,
};

// =============================================================================
// Metric Names
// =============================================================================

pub const CONTROLLER_STATUS: &str = "megaraid_controller_status";
pub const CONTROLLER_TEMPERATURE: &str = "megaraid_controller_temperature_celsius";
pub const VD_STATUS: &str = "megaraid_vd_status";
pub const VD_SIZE: &str = "megaraid_vd_size_bytes";
pub const PD_STATUS: &str = "megaraid_pd_status";
pub const PD_TEMPERATURE: &str = "megaraid_pd_temperature_celsius";
pub const PD_MEDIA_ERRORS: &str = "megaraid_pd_media_errors_total";
pub const PD_OTHER_ERRORS: &str = "megaraid_pd_other_errors_total";
pub const PD_PREDICTIVE_FAILURES: &str = "megaraid_pd_predictive_failures_total";
pub const BBU_STATUS: &str = "megaraid_bbu_status";
pub const BBU_TEMPERATURE: &str = "megaraid_bbu_temperature_celsius";
pub const BBU_CHARGE: &str = "megaraid_bbu_charge_percent";
pub const SCRAPE_SUCCESS: &str = "megaraid_scrape_collector_success";
pub const SCRAPE_DURATION: &str = "megaraid_scrape_collector_duration_seconds";

/// Healthy controller status token
pub const CONTROLLER_HEALTHY: &str = "optimal";
/// Healthy virtual drive state token
pub const VD_HEALTHY: &str = "optl";
/// Healthy physical drive state token
pub const PD_HEALTHY: &str = "onln";
/// Healthy battery state token
pub const BBU_HEALTHY: &str = "optimal";

// =============================================================================
// Samples
// =============================================================================

/// Prometheus metric type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MetricKind {
    Gauge,
    Counter,
}

/// One metric sample
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSample {
    pub name: &'static str,
    pub kind: MetricKind,
    pub value: f64,
    /// Label pairs in descriptor order
    pub labels: Vec<(&'static str, String)>,
}

impl MetricSample {
    pub fn gauge(name: &'static str, value: f64, labels: Vec<(&'static str, String)>) -> Self {
        Self {
            name,
            kind: MetricKind::Gauge,
            value,
            labels,
        }
    }

    pub fn counter(name: &'static str, value: f64, labels: Vec<(&'static str, String)>) -> Self {
        Self {
            name,
            kind: MetricKind::Counter,
            value,
            labels,
        }
    }

    /// Value of label `name`, if present
    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// `1.0` when `token` equals `healthy` ignoring case, `0.0` otherwise
pub fn status_value(token: &str, healthy: &str) -> f64 {
    if token.trim().eq_ignore_ascii_case(healthy) {
        1.0
    } else {
        0.0
    }
}

/// A counter reading worth emitting: reported and not suppressed
fn counter_value(count: Option<f64>) -> Option<f64> {
    count.filter(|c| *c >= 0.0)
}

// =============================================================================
// Per-Entity Mapping
// =============================================================================

pub fn controller_samples(ctrl: &Controller) -> Vec<MetricSample> {
    let labels = vec![
        ("controller", ctrl.index.to_string()),
        ("model", ctrl.model.clone()),
        ("serial", ctrl.serial.clone()),
    ];

    let mut samples = Vec::with_capacity(2);
    if let Some(status) = ctrl.effective_status() {
        samples.push(MetricSample::gauge(
            CONTROLLER_STATUS,
            status_value(&status, CONTROLLER_HEALTHY),
            labels.clone(),
        ));
    }
    if let Some(temp) = ctrl.temperature_celsius() {
        samples.push(MetricSample::gauge(CONTROLLER_TEMPERATURE, temp, labels));
    }
    samples
}

pub fn virtual_drive_samples(vd: &VirtualDrive) -> Vec<MetricSample> {
    let controller = vd.controller.to_string();

    let mut samples = vec![MetricSample::gauge(
        VD_STATUS,
        status_value(&vd.state, VD_HEALTHY),
        vec![
            ("controller", controller.clone()),
            ("vd", vd.label.clone()),
            ("type", vd.raid_type.clone()),
            ("access", vd.access.clone()),
        ],
    )];
    if let Some(size) = vd.size_bytes {
        samples.push(MetricSample::gauge(
            VD_SIZE,
            size,
            vec![
                ("controller", controller),
                ("vd", vd.label.clone()),
                ("type", vd.raid_type.clone()),
            ],
        ));
    }
    samples
}

pub fn physical_drive_samples(pd: &PhysicalDrive) -> Vec<MetricSample> {
    let labels = vec![
        ("controller", pd.controller.to_string()),
        ("enclosure_slot", pd.enclosure_slot()),
        ("model", pd.model.clone()),
    ];

    let mut status_labels = labels.clone();
    status_labels.push(("type", pd.interface.clone()));

    let mut samples = vec![MetricSample::gauge(
        PD_STATUS,
        status_value(&pd.state, PD_HEALTHY),
        status_labels,
    )];
    if let Some(temp) = pd.temperature_celsius {
        samples.push(MetricSample::gauge(PD_TEMPERATURE, temp, labels.clone()));
    }

    let counters = [
        (PD_MEDIA_ERRORS, pd.media_errors),
        (PD_OTHER_ERRORS, pd.other_errors),
        (PD_PREDICTIVE_FAILURES, pd.predictive_failures),
    ];
    for (name, count) in counters {
        if let Some(value) = counter_value(count) {
            samples.push(MetricSample::counter(name, value, labels.clone()));
        }
    }
    samples
}

pub fn battery_samples(bbu: &BatteryBackupUnit) -> Vec<MetricSample> {
    let labels = vec![
        ("controller", bbu.controller.to_string()),
        ("type", bbu.battery_type.clone()),
    ];

    let mut samples = vec![MetricSample::gauge(
        BBU_STATUS,
        status_value(&bbu.state, BBU_HEALTHY),
        labels.clone(),
    )];
    if let Some(temp) = bbu.temperature_celsius {
        samples.push(MetricSample::gauge(BBU_TEMPERATURE, temp, labels.clone()));
    }
    if let Some(charge) = bbu.charge_percent {
        samples.push(MetricSample::gauge(BBU_CHARGE, charge, labels));
    }
    samples
}

/// Map every entity in `inventory`
pub fn inventory_samples(inventory: &Inventory) -> Vec<MetricSample> {
    let controllers = inventory.controllers.iter().flat_map(controller_samples);
    let vds = inventory.virtual_drives.iter().flat_map(virtual_drive_samples);
    let pds = inventory.physical_drives.iter().flat_map(physical_drive_samples);
    let bbus = inventory.batteries.iter().flat_map(battery_samples);
    controllers.chain(vds).chain(pds).chain(bbus).collect()
}
