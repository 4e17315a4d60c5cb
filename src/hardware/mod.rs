//! RAID Hardware Entity Model
//!
//! Canonical schema shared by both diagnostic-output pipelines:
//!
//! - [`text`] - line-oriented parser for MegaCLI key:value output
//! - [`json`] - structured mapper for StorCLI `J` output
//! - [`normalize`] - typed field extraction and unit policy
//!
//! Entities are built fresh by one parse call and discarded once mapped to
//! metric samples; nothing here survives across scrapes. Numeric attributes
//! that the tool never printed are `None`, never zero.

pub mod json;
pub mod normalize;
pub mod text;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::warn;

pub use json::{ControllerFailure, StructuredDocument};

// =============================================================================
// Entity Classes
// =============================================================================

/// The four independently collected entity classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityClass {
    /// RAID adapter card
    Controller,
    /// Logical volume
    VirtualDrive,
    /// Physical disk
    PhysicalDrive,
    /// Battery or supercapacitor backup unit
    Battery,
}

impl EntityClass {
    /// All classes in scrape order
    pub const ALL: [EntityClass; 4] = [
        EntityClass::Controller,
        EntityClass::VirtualDrive,
        EntityClass::PhysicalDrive,
        EntityClass::Battery,
    ];

    /// Short name used in logs and the `collector` label
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityClass::Controller => "controller",
            EntityClass::VirtualDrive => "vd",
            EntityClass::PhysicalDrive => "pd",
            EntityClass::Battery => "bbu",
        }
    }
}

impl std::fmt::Display for EntityClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Common identity accessors for entities
pub trait Entity {
    /// Class this entity belongs to
    const CLASS: EntityClass;

    /// Index of the owning controller
    fn controller(&self) -> u32;

    /// Identity within the owning controller
    fn identity(&self) -> String;
}

/// Drop entities whose identity repeats within a controller, keeping the first.
pub fn dedup_by_identity<T: Entity>(entities: Vec<T>) -> Vec<T> {
    let mut seen = HashSet::new();
    entities
        .into_iter()
        .filter(|e| {
            let key = (e.controller(), e.identity());
            if seen.insert(key) {
                true
            } else {
                warn!(
                    class = %T::CLASS,
                    controller = e.controller(),
                    identity = %e.identity(),
                    "Dropping duplicate entity"
                );
                false
            }
        })
        .collect()
}

// =============================================================================
// Controller
// =============================================================================

/// A physical RAID adapter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Controller {
    /// Adapter index
    pub index: u32,
    /// Product name / model
    pub model: String,
    /// Serial number
    pub serial: String,
    /// Firmware package version
    pub firmware_version: Option<String>,
    /// BIOS version
    pub bios_version: Option<String>,
    /// Status as printed by the tool
    pub status: Option<String>,
    /// ROC (RAID-on-chip) temperature
    pub roc_temperature_celsius: Option<f64>,
    /// Board temperature
    pub controller_temperature_celsius: Option<f64>,
    /// Cache memory size in bytes
    pub memory_size_bytes: Option<f64>,
    pub memory_type: Option<String>,
    pub alarm_state: Option<String>,
    pub rebuild_rate: Option<i64>,
    /// Degraded virtual drives (text output only)
    pub degraded_vds: Option<i64>,
    /// Offline virtual drives (text output only)
    pub offline_vds: Option<i64>,
    /// Critical disks (text output only)
    pub critical_disks: Option<i64>,
    /// Failed disks (text output only)
    pub failed_disks: Option<i64>,
}

impl Controller {
    /// Create an empty controller record
    pub fn new(index: u32) -> Self {
        Self {
            index,
            ..Default::default()
        }
    }

    /// Status printed by the tool, or derived from the device-present counters.
    ///
    /// MegaCLI never prints a controller status line, so any non-zero
    /// degraded/offline/critical/failed count reads as `Degraded` and all-zero
    /// counters read as `Optimal`. Returns `None` when neither is available.
    pub fn effective_status(&self) -> Option<String> {
        if let Some(status) = &self.status {
            return Some(status.clone());
        }

        let counters = [
            self.degraded_vds,
            self.offline_vds,
            self.critical_disks,
            self.failed_disks,
        ];
        if counters.iter().all(Option::is_none) {
            return None;
        }
        if counters.iter().flatten().any(|&n| n > 0) {
            Some("Degraded".to_string())
        } else {
            Some("Optimal".to_string())
        }
    }

    /// ROC temperature, falling back to the board sensor
    pub fn temperature_celsius(&self) -> Option<f64> {
        self.roc_temperature_celsius
            .or(self.controller_temperature_celsius)
    }
}

impl Entity for Controller {
    const CLASS: EntityClass = EntityClass::Controller;

    fn controller(&self) -> u32 {
        self.index
    }

    fn identity(&self) -> String {
        self.index.to_string()
    }
}

// =============================================================================
// Virtual Drive
// =============================================================================

/// A logical RAID volume
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VirtualDrive {
    /// Owning controller index
    pub controller: u32,
    /// Target id
    pub target_id: u32,
    /// Label used in metrics (`DG/VD` for StorCLI, target id for MegaCLI)
    pub label: String,
    pub name: String,
    /// RAID type, e.g. `RAID1`
    pub raid_type: String,
    /// Capacity in bytes
    pub size_bytes: Option<f64>,
    /// Canonical short state token (`Optl`, `Dgrd`, ...)
    pub state: String,
    /// State exactly as printed
    pub raw_state: String,
    /// Access policy token (`RW`, `R`, `B`)
    pub access: String,
    pub strip_size: Option<String>,
    pub number_of_drives: Option<i64>,
    pub span_depth: Option<i64>,
    pub default_cache_policy: Option<String>,
    pub current_cache_policy: Option<String>,
    pub disk_cache_policy: Option<String>,
    pub bad_blocks_exist: Option<String>,
}

impl Entity for VirtualDrive {
    const CLASS: EntityClass = EntityClass::VirtualDrive;

    fn controller(&self) -> u32 {
        self.controller
    }

    fn identity(&self) -> String {
        self.label.clone()
    }
}

// =============================================================================
// Physical Drive
// =============================================================================

/// A physical disk, identified by enclosure and slot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhysicalDrive {
    /// Owning controller index
    pub controller: u32,
    /// Enclosure id (may be empty or `N/A` for direct-attached drives)
    pub enclosure: String,
    pub slot: String,
    pub device_id: Option<i64>,
    /// Vendor and model string
    pub model: String,
    /// Interface, e.g. `SAS` or `SATA`
    pub interface: String,
    /// Medium, e.g. `HDD` or `SSD`
    pub medium: Option<String>,
    /// Raw capacity in bytes
    pub size_bytes: Option<f64>,
    /// Canonical short state token (`Onln`, `UGood`, ...)
    pub state: String,
    /// State exactly as printed
    pub raw_state: String,
    pub temperature_celsius: Option<f64>,
    /// Media error count; `-1` marks an unparsable reading
    pub media_errors: Option<f64>,
    /// Other error count; `-1` marks an unparsable reading
    pub other_errors: Option<f64>,
    /// Predictive failure count; `-1` marks an unparsable reading
    pub predictive_failures: Option<f64>,
    pub smart_alert: Option<String>,
}

impl PhysicalDrive {
    /// `enclosure:slot` identity used in metric labels
    pub fn enclosure_slot(&self) -> String {
        format!("{}:{}", self.enclosure, self.slot)
    }
}

impl Entity for PhysicalDrive {
    const CLASS: EntityClass = EntityClass::PhysicalDrive;

    fn controller(&self) -> u32 {
        self.controller
    }

    fn identity(&self) -> String {
        self.enclosure_slot()
    }
}

// =============================================================================
// Battery Backup Unit
// =============================================================================

/// Battery or supercapacitor protecting the controller write cache
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatteryBackupUnit {
    /// Owning adapter index
    pub controller: u32,
    /// Battery type, e.g. `BBU` or `CVPM02`
    pub battery_type: String,
    /// State as printed, e.g. `Optimal`
    pub state: String,
    pub charge_status: Option<String>,
    /// Charge level in percent
    pub charge_percent: Option<f64>,
    pub temperature_celsius: Option<f64>,
    /// Design capacity in mAh
    pub design_capacity: Option<i64>,
    /// Full-charge capacity in mAh
    pub full_charge_capacity: Option<i64>,
    pub cycle_count: Option<i64>,
    pub replacement_required: Option<String>,
    pub learn_cycle_active: Option<String>,
    pub next_learn_time: Option<String>,
}

impl Entity for BatteryBackupUnit {
    const CLASS: EntityClass = EntityClass::Battery;

    fn controller(&self) -> u32 {
        self.controller
    }

    fn identity(&self) -> String {
        self.battery_type.clone()
    }
}

// =============================================================================
// Inventory
// =============================================================================

/// Entity lists for one controller (or one whole parse)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Inventory {
    pub controllers: Vec<Controller>,
    pub virtual_drives: Vec<VirtualDrive>,
    pub physical_drives: Vec<PhysicalDrive>,
    pub batteries: Vec<BatteryBackupUnit>,
}

impl Inventory {
    /// Check if no entity of any class was found
    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
            && self.virtual_drives.is_empty()
            && self.physical_drives.is_empty()
            && self.batteries.is_empty()
    }

    /// Total number of entities
    pub fn len(&self) -> usize {
        self.controllers.len()
            + self.virtual_drives.len()
            + self.physical_drives.len()
            + self.batteries.len()
    }

    /// Append another inventory's entities
    pub fn extend(&mut self, other: Inventory) {
        self.controllers.extend(other.controllers);
        self.virtual_drives.extend(other.virtual_drives);
        self.physical_drives.extend(other.physical_drives);
        self.batteries.extend(other.batteries);
    }

    /// Keep only the entities of `class`
    pub fn retain_class(&mut self, class: EntityClass) {
        if class != EntityClass::Controller {
            self.controllers.clear();
        }
        if class != EntityClass::VirtualDrive {
            self.virtual_drives.clear();
        }
        if class != EntityClass::PhysicalDrive {
            self.physical_drives.clear();
        }
        if class != EntityClass::Battery {
            self.batteries.clear();
        }
    }

    /// Drop repeated identities in every class
    pub fn dedup(self) -> Inventory {
        Inventory {
            controllers: dedup_by_identity(self.controllers),
            virtual_drives: dedup_by_identity(self.virtual_drives),
            physical_drives: dedup_by_identity(self.physical_drives),
            batteries: dedup_by_identity(self.batteries),
        }
    }
}
