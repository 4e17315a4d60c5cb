//! Line-Oriented Parser (MegaCLI text output)
//!
//! A single forward scan with one open entity at a time. A line whose key is
//! the section's defining key closes the open entity and opens a new one;
//! other known keys are normalized and applied through a dispatch table.
//! Unknown keys and blank lines are ignored so new firmware fields do not
//! break parsing.
//!
//! MegaCLI pads keys before the colon (`Product Name    : PERC H710P`), so
//! keys are matched on the trimmed text before the first colon.

use tracing::debug;

use super::normalize::{self, normalize, FieldType, FieldValue};
use super::{BatteryBackupUnit, Controller, PhysicalDrive, VirtualDrive};

// =============================================================================
// Dispatch Table
// =============================================================================

/// Maps one or more keys to a declared type and a setter
pub struct FieldRule<T> {
    /// Keys (aliases) this rule handles
    pub keys: &'static [&'static str],
    /// Declared type passed to the normalizer
    pub field_type: FieldType,
    /// Applies the normalized value to the open entity
    pub apply: fn(&mut T, FieldValue),
}

/// An entity that can be segmented out of MegaCLI text output
pub trait TextSection: Sized + 'static {
    /// Key whose every occurrence starts a new entity
    const DEFINING_KEY: &'static str;

    /// Create an empty entity owned by `adapter`
    fn open(adapter: u32) -> Self;

    /// Field dispatch table, including the defining key's own rule
    fn rules() -> &'static [FieldRule<Self>];

    /// Post-process a closed entity
    fn finish(self) -> Self {
        self
    }
}

/// Split a trimmed line into its key and the prefix to strip (key plus colon)
fn split_key(line: &str) -> Option<(&str, &str)> {
    let (raw_key, _) = line.split_once(':')?;
    let key = raw_key.trim();
    (!key.is_empty()).then(|| (key, &line[..=raw_key.len()]))
}

/// Adapter index announced by a section marker line.
///
/// Recognizes `Adapter #0`, `Adapter 0 -- Virtual Drive Information:` and
/// `BBU status for Adapter: 0`.
fn adapter_marker(line: &str) -> Option<u32> {
    let rest = if let Some(rest) = line.strip_prefix("Adapter #") {
        rest
    } else if let Some(rest) = line.strip_prefix("Adapter ") {
        rest
    } else if let Some(rest) = line.strip_prefix("BBU status for Adapter:") {
        rest
    } else {
        return None;
    };

    let digits: String = rest
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Segment `output` into entities of type `T`
pub fn parse_sections<T: TextSection>(output: &str) -> Vec<T> {
    let mut entities = Vec::new();
    let mut open: Option<T> = None;
    let mut adapter = 0;

    for line in output.lines().map(str::trim) {
        if line.is_empty() {
            continue;
        }
        if let Some(index) = adapter_marker(line) {
            adapter = index;
        }
        let Some((key, prefix)) = split_key(line) else {
            continue;
        };

        if key == T::DEFINING_KEY {
            if let Some(done) = open.take() {
                entities.push(done.finish());
            }
            open = Some(T::open(adapter));
        }

        let Some(entity) = open.as_mut() else {
            continue;
        };
        let Some(rule) = T::rules().iter().find(|r| r.keys.contains(&key)) else {
            continue;
        };

        match normalize(line, prefix, rule.field_type) {
            Ok(value) => (rule.apply)(entity, value),
            Err(e) => debug!(key, error = %e, "Skipping unparsable field"),
        }
    }

    if let Some(done) = open.take() {
        entities.push(done.finish());
    }
    entities
}

/// Parse `-AdpAllInfo` output
pub fn parse_controllers(output: &str) -> Vec<Controller> {
    parse_sections(output)
}

/// Parse `-LDInfo` output
pub fn parse_virtual_drives(output: &str) -> Vec<VirtualDrive> {
    parse_sections(output)
}

/// Parse `-PDList` output
pub fn parse_physical_drives(output: &str) -> Vec<PhysicalDrive> {
    parse_sections(output)
}

/// Parse `-AdpBbuCmd -GetBbuStatus` output
pub fn parse_batteries(output: &str) -> Vec<BatteryBackupUnit> {
    parse_sections(output)
}

// =============================================================================
// Value Helpers
// =============================================================================

fn text(value: FieldValue) -> String {
    value.into_string().unwrap_or_default()
}

fn non_empty(value: FieldValue) -> Option<String> {
    let s = text(value);
    (!s.is_empty()).then_some(s)
}

fn first_word(value: &FieldValue) -> &str {
    value
        .as_str()
        .and_then(|s| s.split_whitespace().next())
        .unwrap_or("")
}

fn percent(value: &FieldValue) -> Option<f64> {
    first_word(value).trim_end_matches('%').parse().ok()
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Translate a MegaCLI virtual-drive state to the StorCLI short token
pub fn vd_state_token(raw: &str) -> String {
    let lower = raw.trim().to_ascii_lowercase();
    let token = if lower == "optimal" {
        "Optl"
    } else if lower.starts_with("partially degraded") {
        "Pdgd"
    } else if lower.starts_with("degraded") {
        "Dgrd"
    } else if lower.starts_with("offline") {
        "OfLn"
    } else if lower.starts_with("recovery") {
        "Rec"
    } else {
        return raw.trim().to_string();
    };
    token.to_string()
}

/// Translate a MegaCLI firmware state (`Online, Spun Up`) to the StorCLI short token
pub fn pd_state_token(raw: &str) -> String {
    let head = raw.split(',').next().unwrap_or("").trim();
    let token = match head.to_ascii_lowercase().as_str() {
        "online" => "Onln",
        "offline" => "Offln",
        "failed" => "Failed",
        "rebuild" => "Rbld",
        "unconfigured(good)" => "UGood",
        "unconfigured(bad)" => "UBad",
        "hotspare" => "GHS",
        "jbod" => "JBOD",
        "copyback" => "Cpybck",
        "missing" => "Msng",
        _ => return head.to_string(),
    };
    token.to_string()
}

/// Build a RAID type from `Primary-1, Secondary-3, RAID Level Qualifier-0`
pub fn raid_type(levels: &str) -> String {
    let level = |name: &str| -> Option<u32> {
        levels
            .split(',')
            .map(str::trim)
            .find_map(|part| part.strip_prefix(name))
            .and_then(|n| n.trim().parse().ok())
    };

    match (level("Primary-"), level("Secondary-")) {
        (Some(primary), Some(3)) => format!("RAID{}0", primary),
        (Some(primary), _) => format!("RAID{}", primary),
        _ => levels.trim().to_string(),
    }
}

/// Translate an access policy to the StorCLI short token
pub fn access_token(raw: &str) -> String {
    match raw.trim().to_ascii_lowercase().as_str() {
        "read/write" => "RW".to_string(),
        "read only" => "R".to_string(),
        "blocked" => "B".to_string(),
        _ => raw.trim().to_string(),
    }
}

// =============================================================================
// Controller
// =============================================================================

static CONTROLLER_RULES: &[FieldRule<Controller>] = &[
    FieldRule {
        keys: &["Product Name"],
        field_type: FieldType::String,
        apply: |c, v| c.model = text(v),
    },
    FieldRule {
        keys: &["Serial No", "Serial Number"],
        field_type: FieldType::String,
        apply: |c, v| c.serial = text(v),
    },
    FieldRule {
        keys: &["FW Package Build", "FW Version"],
        field_type: FieldType::String,
        apply: |c, v| {
            if c.firmware_version.is_none() {
                c.firmware_version = non_empty(v);
            }
        },
    },
    FieldRule {
        keys: &["BIOS Version"],
        field_type: FieldType::String,
        apply: |c, v| c.bios_version = non_empty(v),
    },
    FieldRule {
        keys: &["ROC temperature"],
        field_type: FieldType::Integer,
        apply: |c, v| c.roc_temperature_celsius = v.as_f64(),
    },
    FieldRule {
        keys: &["Controller temperature"],
        field_type: FieldType::Integer,
        apply: |c, v| c.controller_temperature_celsius = v.as_f64(),
    },
    FieldRule {
        keys: &["Memory Size"],
        field_type: FieldType::String,
        apply: |c, v| c.memory_size_bytes = v.as_str().and_then(normalize::reported_size),
    },
    FieldRule {
        keys: &["Memory Type"],
        field_type: FieldType::String,
        apply: |c, v| c.memory_type = non_empty(v),
    },
    FieldRule {
        keys: &["Alarm State", "Alarm"],
        field_type: FieldType::String,
        apply: |c, v| c.alarm_state = non_empty(v),
    },
    FieldRule {
        keys: &["Rebuild Rate"],
        field_type: FieldType::String,
        apply: |c, v| {
            // "Supported Adapter Operations" repeats the key with Yes/No
            if let Some(rate) = percent(&v) {
                c.rebuild_rate = Some(rate as i64);
            }
        },
    },
    FieldRule {
        keys: &["Degraded"],
        field_type: FieldType::Integer,
        apply: |c, v| c.degraded_vds = v.as_int(),
    },
    FieldRule {
        keys: &["Offline"],
        field_type: FieldType::Integer,
        apply: |c, v| c.offline_vds = v.as_int(),
    },
    FieldRule {
        keys: &["Critical Disks"],
        field_type: FieldType::Integer,
        apply: |c, v| c.critical_disks = v.as_int(),
    },
    FieldRule {
        keys: &["Failed Disks"],
        field_type: FieldType::Integer,
        apply: |c, v| c.failed_disks = v.as_int(),
    },
];

impl TextSection for Controller {
    const DEFINING_KEY: &'static str = "Product Name";

    fn open(adapter: u32) -> Self {
        Controller::new(adapter)
    }

    fn rules() -> &'static [FieldRule<Self>] {
        CONTROLLER_RULES
    }
}

// =============================================================================
// Virtual Drive
// =============================================================================

/// Target id from `0 (Target Id: 0)`, falling back to the leading number
fn target_id(value: &str) -> Option<u32> {
    let from_marker = value
        .split_once("Target Id:")
        .and_then(|(_, rest)| rest.trim().trim_end_matches(')').trim().parse().ok());
    from_marker.or_else(|| value.split_whitespace().next()?.parse().ok())
}

static VIRTUAL_DRIVE_RULES: &[FieldRule<VirtualDrive>] = &[
    FieldRule {
        keys: &["Virtual Drive"],
        field_type: FieldType::String,
        apply: |vd, v| {
            if let Some(id) = v.as_str().and_then(target_id) {
                vd.target_id = id;
                vd.label = id.to_string();
            }
        },
    },
    FieldRule {
        keys: &["Name"],
        field_type: FieldType::String,
        apply: |vd, v| vd.name = text(v),
    },
    FieldRule {
        keys: &["RAID Level"],
        field_type: FieldType::String,
        apply: |vd, v| vd.raid_type = raid_type(v.as_str().unwrap_or("")),
    },
    FieldRule {
        keys: &["Size"],
        field_type: FieldType::String,
        apply: |vd, v| vd.size_bytes = v.as_str().and_then(normalize::reported_size),
    },
    FieldRule {
        keys: &["State"],
        field_type: FieldType::String,
        apply: |vd, v| {
            let raw = text(v);
            vd.state = vd_state_token(&raw);
            vd.raw_state = raw;
        },
    },
    FieldRule {
        keys: &["Strip Size"],
        field_type: FieldType::String,
        apply: |vd, v| vd.strip_size = non_empty(v),
    },
    FieldRule {
        keys: &["Number Of Drives"],
        field_type: FieldType::Integer,
        apply: |vd, v| vd.number_of_drives = v.as_int(),
    },
    FieldRule {
        keys: &["Span Depth"],
        field_type: FieldType::Integer,
        apply: |vd, v| vd.span_depth = v.as_int(),
    },
    FieldRule {
        keys: &["Default Cache Policy"],
        field_type: FieldType::String,
        apply: |vd, v| vd.default_cache_policy = non_empty(v),
    },
    FieldRule {
        keys: &["Current Cache Policy"],
        field_type: FieldType::String,
        apply: |vd, v| vd.current_cache_policy = non_empty(v),
    },
    FieldRule {
        keys: &["Current Access Policy", "Access Policy"],
        field_type: FieldType::String,
        apply: |vd, v| vd.access = access_token(v.as_str().unwrap_or("")),
    },
    FieldRule {
        keys: &["Disk Cache Policy"],
        field_type: FieldType::String,
        apply: |vd, v| vd.disk_cache_policy = non_empty(v),
    },
    FieldRule {
        keys: &["Bad Blocks Exist"],
        field_type: FieldType::String,
        apply: |vd, v| vd.bad_blocks_exist = non_empty(v),
    },
];

impl TextSection for VirtualDrive {
    const DEFINING_KEY: &'static str = "Virtual Drive";

    fn open(adapter: u32) -> Self {
        VirtualDrive {
            controller: adapter,
            ..Default::default()
        }
    }

    fn rules() -> &'static [FieldRule<Self>] {
        VIRTUAL_DRIVE_RULES
    }

    fn finish(mut self) -> Self {
        if self.label.is_empty() {
            self.label = self.target_id.to_string();
        }
        self
    }
}

// =============================================================================
// Physical Drive
// =============================================================================

static PHYSICAL_DRIVE_RULES: &[FieldRule<PhysicalDrive>] = &[
    FieldRule {
        keys: &["Enclosure Device ID"],
        field_type: FieldType::String,
        apply: |pd, v| pd.enclosure = text(v),
    },
    FieldRule {
        keys: &["Slot Number"],
        field_type: FieldType::String,
        apply: |pd, v| pd.slot = text(v),
    },
    FieldRule {
        keys: &["Device Id"],
        field_type: FieldType::Integer,
        apply: |pd, v| pd.device_id = v.as_int(),
    },
    FieldRule {
        keys: &["Media Error Count"],
        field_type: FieldType::String,
        apply: |pd, v| pd.media_errors = v.as_str().map(normalize::error_count),
    },
    FieldRule {
        keys: &["Other Error Count"],
        field_type: FieldType::String,
        apply: |pd, v| pd.other_errors = v.as_str().map(normalize::error_count),
    },
    FieldRule {
        keys: &["Predictive Failure Count"],
        field_type: FieldType::String,
        apply: |pd, v| pd.predictive_failures = v.as_str().map(normalize::error_count),
    },
    FieldRule {
        keys: &["PD Type"],
        field_type: FieldType::String,
        apply: |pd, v| pd.interface = text(v),
    },
    FieldRule {
        keys: &["Raw Size"],
        field_type: FieldType::String,
        apply: |pd, v| {
            let raw = v.as_str().unwrap_or("");
            let without_sectors = raw.split('[').next().unwrap_or(raw);
            pd.size_bytes = normalize::reported_size(without_sectors);
        },
    },
    FieldRule {
        keys: &["Firmware state"],
        field_type: FieldType::String,
        apply: |pd, v| {
            let raw = text(v);
            pd.state = pd_state_token(&raw);
            pd.raw_state = raw;
        },
    },
    FieldRule {
        keys: &["Inquiry Data"],
        field_type: FieldType::String,
        apply: |pd, v| pd.model = collapse_whitespace(v.as_str().unwrap_or("")),
    },
    FieldRule {
        keys: &["Media Type"],
        field_type: FieldType::String,
        apply: |pd, v| {
            pd.medium = match v.as_str().unwrap_or("") {
                "Hard Disk Device" => Some("HDD".to_string()),
                "Solid State Device" => Some("SSD".to_string()),
                other => (!other.is_empty()).then(|| other.to_string()),
            }
        },
    },
    FieldRule {
        keys: &["Drive Temperature"],
        field_type: FieldType::String,
        apply: |pd, v| pd.temperature_celsius = normalize::reported_temperature(first_word(&v)),
    },
    FieldRule {
        keys: &["Drive has flagged a S.M.A.R.T alert", "SMART alert flagged by drive"],
        field_type: FieldType::String,
        apply: |pd, v| pd.smart_alert = non_empty(v),
    },
];

impl TextSection for PhysicalDrive {
    const DEFINING_KEY: &'static str = "Enclosure Device ID";

    fn open(adapter: u32) -> Self {
        PhysicalDrive {
            controller: adapter,
            ..Default::default()
        }
    }

    fn rules() -> &'static [FieldRule<Self>] {
        PHYSICAL_DRIVE_RULES
    }
}

// =============================================================================
// Battery Backup Unit
// =============================================================================

static BATTERY_RULES: &[FieldRule<BatteryBackupUnit>] = &[
    FieldRule {
        keys: &["BBU status for Adapter"],
        field_type: FieldType::Integer,
        apply: |b, v| {
            if let Some(index) = v.as_int().and_then(|i| u32::try_from(i).ok()) {
                b.controller = index;
            }
        },
    },
    FieldRule {
        keys: &["BatteryType", "Battery Type"],
        field_type: FieldType::String,
        apply: |b, v| b.battery_type = text(v),
    },
    FieldRule {
        keys: &["Battery State"],
        field_type: FieldType::String,
        apply: |b, v| b.state = text(v),
    },
    FieldRule {
        keys: &["Charging Status", "Charge Status"],
        field_type: FieldType::String,
        apply: |b, v| b.charge_status = non_empty(v),
    },
    FieldRule {
        keys: &["Absolute State of charge", "Absolute state of charge"],
        field_type: FieldType::Integer,
        apply: |b, v| b.charge_percent = v.as_f64(),
    },
    FieldRule {
        keys: &["Relative State of Charge"],
        field_type: FieldType::Integer,
        apply: |b, v| {
            if b.charge_percent.is_none() {
                b.charge_percent = v.as_f64();
            }
        },
    },
    FieldRule {
        keys: &["Temperature"],
        field_type: FieldType::Integer,
        apply: |b, v| b.temperature_celsius = v.as_f64(),
    },
    FieldRule {
        keys: &["Design Capacity"],
        field_type: FieldType::Integer,
        apply: |b, v| b.design_capacity = v.as_int(),
    },
    FieldRule {
        keys: &["Full Charge Capacity"],
        field_type: FieldType::Integer,
        apply: |b, v| b.full_charge_capacity = v.as_int(),
    },
    FieldRule {
        keys: &["Cycle Count"],
        field_type: FieldType::Integer,
        apply: |b, v| b.cycle_count = v.as_int(),
    },
    FieldRule {
        keys: &["Battery Replacement required", "Replacement required"],
        field_type: FieldType::String,
        apply: |b, v| b.replacement_required = non_empty(v),
    },
    FieldRule {
        keys: &["Learn Cycle Active"],
        field_type: FieldType::String,
        apply: |b, v| b.learn_cycle_active = non_empty(v),
    },
    FieldRule {
        keys: &["Next Learn time"],
        field_type: FieldType::String,
        apply: |b, v| b.next_learn_time = non_empty(v),
    },
];

impl TextSection for BatteryBackupUnit {
    const DEFINING_KEY: &'static str = "BBU status for Adapter";

    fn open(adapter: u32) -> Self {
        BatteryBackupUnit {
            controller: adapter,
            ..Default::default()
        }
    }

    fn rules() -> &'static [FieldRule<Self>] {
        BATTERY_RULES
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_key_handles_padding_and_extra_colons() {
        assert_eq!(
            split_key("Product Name    : PERC H710P Mini"),
            Some(("Product Name", "Product Name    :"))
        );
        assert_eq!(
            split_key("Virtual Drive: 0 (Target Id: 0)"),
            Some(("Virtual Drive", "Virtual Drive:"))
        );
        assert_eq!(split_key("Adapter #0"), None);
        assert_eq!(split_key(": orphan"), None);
    }

    #[test]
    fn test_adapter_markers() {
        assert_eq!(adapter_marker("Adapter #1"), Some(1));
        assert_eq!(adapter_marker("Adapter 2 -- Virtual Drive Information:"), Some(2));
        assert_eq!(adapter_marker("BBU status for Adapter: 3"), Some(3));
        assert_eq!(adapter_marker("Adapter Id: x"), None);
        assert_eq!(adapter_marker("Product Name: foo"), None);
    }

    #[test]
    fn test_defining_key_count_equals_entity_count() {
        let output = "\
Enclosure Device ID: 32
Slot Number: 0
Enclosure Device ID: 32
Slot Number: 1
Enclosure position: 1
Enclosure Device ID: 32
Slot Number: 2
";
        let drives = parse_physical_drives(output);
        assert_eq!(drives.len(), 3);
        assert_eq!(drives[2].enclosure_slot(), "32:2");
    }

    #[test]
    fn test_lines_before_first_defining_key_are_ignored() {
        let output = "Exit Code: 0x00\nSlot Number: 9\n";
        assert!(parse_physical_drives(output).is_empty());
    }

    #[test]
    fn test_normalization_failure_only_skips_field() {
        let output = "\
BBU status for Adapter: 0
BatteryType: BBU
Temperature: 28 C
Battery State: Optimal
  Temperature                             : OK
";
        let batteries = parse_batteries(output);
        assert_eq!(batteries.len(), 1);
        assert_eq!(batteries[0].temperature_celsius, Some(28.0));
        assert_eq!(batteries[0].state, "Optimal");
    }

    #[test]
    fn test_state_tokens() {
        assert_eq!(vd_state_token("Optimal"), "Optl");
        assert_eq!(vd_state_token("Partially Degraded"), "Pdgd");
        assert_eq!(vd_state_token("Degraded"), "Dgrd");
        assert_eq!(vd_state_token("Something New"), "Something New");

        assert_eq!(pd_state_token("Online, Spun Up"), "Onln");
        assert_eq!(pd_state_token("Unconfigured(good), Spun down"), "UGood");
        assert_eq!(pd_state_token("Rebuild"), "Rbld");
    }

    #[test]
    fn test_raid_type() {
        assert_eq!(raid_type("Primary-1, Secondary-0, RAID Level Qualifier-0"), "RAID1");
        assert_eq!(raid_type("Primary-1, Secondary-3, RAID Level Qualifier-0"), "RAID10");
        assert_eq!(raid_type("Primary-5, Secondary-0, RAID Level Qualifier-3"), "RAID5");
        assert_eq!(raid_type("weird"), "weird");
    }

    #[test]
    fn test_access_token() {
        assert_eq!(access_token("Read/Write"), "RW");
        assert_eq!(access_token("Read Only"), "R");
        assert_eq!(access_token("Blocked"), "B");
    }

    #[test]
    fn test_virtual_drive_target_id() {
        assert_eq!(target_id("0 (Target Id: 0)"), Some(0));
        assert_eq!(target_id("1 (Target Id: 4)"), Some(4));
        assert_eq!(target_id("2"), Some(2));
        assert_eq!(target_id(""), None);
    }
}
