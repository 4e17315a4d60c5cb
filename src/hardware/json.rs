//! Structured Mapper (StorCLI `J` output)
//!
//! Deserializes each controller block into typed fields and fans the nested
//! arrays out into one [`Inventory`] per controller index. A block whose
//! command status is not `Success`, or whose body does not have the expected
//! shape, is reported in [`StructuredDocument::failures`] without affecting
//! the other blocks.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use tracing::warn;

use super::normalize;
use super::{BatteryBackupUnit, Controller, Inventory, PhysicalDrive, VirtualDrive};
use crate::error::ParseError;

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct StorCliResponse {
    #[serde(rename = "Controllers")]
    controllers: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ControllerBlock {
    #[serde(rename = "Command Status")]
    command_status: CommandStatus,
    #[serde(rename = "Response Data", default)]
    response_data: Option<ResponseData>,
}

#[derive(Debug, Deserialize)]
struct CommandStatus {
    #[serde(rename = "Controller", default, deserialize_with = "lenient_index")]
    controller: Option<u32>,
    #[serde(rename = "Status", default)]
    status: String,
    #[serde(rename = "Description", default, deserialize_with = "lenient_string")]
    description: String,
}

#[derive(Debug, Default, Deserialize)]
struct ResponseData {
    #[serde(rename = "Basics", default, deserialize_with = "lenient_section")]
    basics: Option<Basics>,
    #[serde(rename = "Status", default, deserialize_with = "lenient_section")]
    status: Option<StatusInfo>,
    #[serde(rename = "HwCfg", default, deserialize_with = "lenient_section")]
    hw_cfg: Option<HwCfg>,
    #[serde(rename = "System Overview", default)]
    system_overview: Vec<SystemInfo>,
    #[serde(rename = "VD LIST", default)]
    vd_list: Vec<VdInfo>,
    #[serde(rename = "PD LIST", default)]
    pd_list: Vec<PdInfo>,
    #[serde(rename = "BBU_Info", alias = "Cachevault_Info", default)]
    bbu_info: Vec<BbuInfo>,
}

/// `Basics` section of `/cN show all J`
#[derive(Debug, Deserialize)]
struct Basics {
    #[serde(rename = "Controller", default, deserialize_with = "lenient_index")]
    controller: Option<u32>,
    #[serde(rename = "Model", default, deserialize_with = "lenient_string")]
    model: String,
    #[serde(rename = "Serial Number", default, deserialize_with = "lenient_string")]
    serial: String,
}

#[derive(Debug, Deserialize)]
struct StatusInfo {
    #[serde(rename = "Controller Status", default, deserialize_with = "lenient_string")]
    controller_status: String,
}

#[derive(Debug, Deserialize)]
struct HwCfg {
    #[serde(
        rename = "ROC temperature(Degree Celsius)",
        default,
        deserialize_with = "lenient_string"
    )]
    roc_temperature: String,
}

#[derive(Debug, Deserialize)]
struct SystemInfo {
    #[serde(rename = "Ctl", default, deserialize_with = "lenient_index")]
    ctl: Option<u32>,
    #[serde(rename = "Model", default, deserialize_with = "lenient_string")]
    model: String,
    #[serde(rename = "SerialNo", default, deserialize_with = "lenient_string")]
    serial: String,
    #[serde(rename = "Status", default, deserialize_with = "lenient_string")]
    status: String,
    #[serde(rename = "Hlth", default, deserialize_with = "lenient_string")]
    health: String,
    #[serde(rename = "ROCtemp", default, deserialize_with = "lenient_string")]
    roc_temperature: String,
}

#[derive(Debug, Deserialize)]
struct VdInfo {
    #[serde(rename = "DG/VD", default, deserialize_with = "lenient_string")]
    dg_vd: String,
    #[serde(rename = "TYPE", default, deserialize_with = "lenient_string")]
    raid_type: String,
    #[serde(rename = "State", default, deserialize_with = "lenient_string")]
    state: String,
    #[serde(rename = "Access", default, deserialize_with = "lenient_string")]
    access: String,
    #[serde(rename = "Size", default, deserialize_with = "lenient_string")]
    size: String,
    #[serde(rename = "Name", default, deserialize_with = "lenient_string")]
    name: String,
}

#[derive(Debug, Deserialize)]
struct PdInfo {
    #[serde(rename = "EID:Slt", default, deserialize_with = "lenient_string")]
    eid_slot: String,
    #[serde(rename = "DID", default, deserialize_with = "lenient_index")]
    did: Option<u32>,
    #[serde(rename = "State", default, deserialize_with = "lenient_string")]
    state: String,
    #[serde(rename = "Size", default, deserialize_with = "lenient_string")]
    size: String,
    #[serde(rename = "Intf", default, deserialize_with = "lenient_string")]
    interface: String,
    #[serde(rename = "Med", default, deserialize_with = "lenient_string")]
    medium: String,
    #[serde(rename = "Model", default, deserialize_with = "lenient_string")]
    model: String,
    #[serde(rename = "Temp", default, deserialize_with = "lenient_string")]
    temperature: String,
    #[serde(rename = "Med Err", default, deserialize_with = "lenient_string")]
    media_errors: String,
    #[serde(rename = "Other Err", default, deserialize_with = "lenient_string")]
    other_errors: String,
    #[serde(rename = "Pred Fail", default, deserialize_with = "lenient_string")]
    predictive_failures: String,
}

#[derive(Debug, Deserialize)]
struct BbuInfo {
    #[serde(rename = "Model", alias = "Type", default, deserialize_with = "lenient_string")]
    model: String,
    #[serde(rename = "State", default, deserialize_with = "lenient_string")]
    state: String,
    #[serde(rename = "Temp", default, deserialize_with = "lenient_string")]
    temperature: String,
}

/// Accept strings, numbers and null where StorCLI is inconsistent
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    })
}

/// Accept an index printed either as a number or as a numeric string
fn lenient_index<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Accept a section only when it has the expected object shape
fn lenient_section<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).ok())
}

// =============================================================================
// Mapped Output
// =============================================================================

/// A controller block whose command did not succeed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerFailure {
    /// Controller index
    pub controller: u32,
    /// Command status as printed
    pub status: String,
    /// Failure description
    pub description: String,
}

/// Result of mapping one StorCLI JSON document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructuredDocument {
    /// Entities keyed by controller index
    pub controllers: BTreeMap<u32, Inventory>,
    /// Blocks skipped because their command failed or their body was malformed
    pub failures: Vec<ControllerFailure>,
}

impl StructuredDocument {
    /// Merge all controllers into one inventory
    pub fn into_inventory(self) -> Inventory {
        let mut inventory = Inventory::default();
        for (_, entities) in self.controllers {
            inventory.extend(entities);
        }
        inventory
    }
}

/// Parse a StorCLI JSON document.
///
/// Fails only when the top-level `Controllers` shape is wrong. Failed and
/// malformed controller blocks are collected and logged.
pub fn parse_document(output: &str) -> Result<StructuredDocument, ParseError> {
    let response: StorCliResponse = serde_json::from_str(output)?;
    let mut document = StructuredDocument::default();

    for (position, value) in response.controllers.into_iter().enumerate() {
        let fallback_index = block_index(&value).unwrap_or(position as u32);

        let block: ControllerBlock = match serde_json::from_value(value) {
            Ok(block) => block,
            Err(e) => {
                warn!(controller = fallback_index, error = %e, "Malformed controller block");
                document.failures.push(ControllerFailure {
                    controller: fallback_index,
                    status: MALFORMED_STATUS.to_string(),
                    description: e.to_string(),
                });
                continue;
            }
        };

        let index = block.command_status.controller.unwrap_or(position as u32);

        if !block.command_status.status.eq_ignore_ascii_case("success") {
            warn!(
                controller = index,
                status = %block.command_status.status,
                description = %block.command_status.description,
                "Controller command failed"
            );
            document.failures.push(ControllerFailure {
                controller: index,
                status: block.command_status.status,
                description: block.command_status.description,
            });
            continue;
        }

        let data = block.response_data.unwrap_or_default();
        document
            .controllers
            .entry(index)
            .or_default()
            .extend(map_response(index, data));
    }

    Ok(document)
}

/// Status recorded for a block that could not be decoded
pub const MALFORMED_STATUS: &str = "Malformed";

/// Controller index of a block that may not decode
fn block_index(block: &serde_json::Value) -> Option<u32> {
    let controller = block.get("Command Status")?.get("Controller")?;
    match controller {
        serde_json::Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn map_response(index: u32, data: ResponseData) -> Inventory {
    let basics = data
        .basics
        .map(|basics| map_basics(index, basics, data.status, data.hw_cfg));

    Inventory {
        controllers: basics
            .into_iter()
            .chain(
                data.system_overview
                    .into_iter()
                    .map(|info| map_controller(index, info)),
            )
            .collect(),
        virtual_drives: data
            .vd_list
            .into_iter()
            .map(|vd| map_virtual_drive(index, vd))
            .collect(),
        physical_drives: data
            .pd_list
            .into_iter()
            .map(|pd| map_physical_drive(index, pd))
            .collect(),
        batteries: data
            .bbu_info
            .into_iter()
            .map(|bbu| map_battery(index, bbu))
            .collect(),
    }
}

/// Expand the `Hlth` abbreviation used by `show all J`
fn health_status(health: &str) -> &str {
    match health {
        "Opt" => "Optimal",
        "NdAtn" => "Needs Attention",
        "Dgd" => "Degraded",
        other => other,
    }
}

fn map_controller(block_index: u32, info: SystemInfo) -> Controller {
    let status = if !info.status.is_empty() {
        Some(info.status)
    } else if !info.health.is_empty() {
        Some(health_status(&info.health).to_string())
    } else {
        None
    };

    Controller {
        index: info.ctl.unwrap_or(block_index),
        model: info.model.trim().to_string(),
        serial: info.serial.trim().to_string(),
        status,
        roc_temperature_celsius: normalize::reported_temperature(&info.roc_temperature),
        ..Default::default()
    }
}

fn map_basics(
    block_index: u32,
    basics: Basics,
    status: Option<StatusInfo>,
    hw_cfg: Option<HwCfg>,
) -> Controller {
    let status = status
        .map(|s| s.controller_status)
        .filter(|s| !s.is_empty());
    let roc = hw_cfg.map(|h| h.roc_temperature).unwrap_or_default();

    Controller {
        index: basics.controller.unwrap_or(block_index),
        model: basics.model.trim().to_string(),
        serial: basics.serial.trim().to_string(),
        status,
        roc_temperature_celsius: normalize::reported_temperature(&roc),
        ..Default::default()
    }
}

fn map_virtual_drive(controller: u32, vd: VdInfo) -> VirtualDrive {
    let target_id = vd
        .dg_vd
        .split_once('/')
        .and_then(|(_, id)| id.trim().parse().ok())
        .unwrap_or_default();

    VirtualDrive {
        controller,
        target_id,
        label: vd.dg_vd,
        name: vd.name,
        raid_type: vd.raid_type,
        size_bytes: normalize::reported_size(&vd.size),
        raw_state: vd.state.clone(),
        state: vd.state,
        access: vd.access,
        ..Default::default()
    }
}

fn map_physical_drive(controller: u32, pd: PdInfo) -> PhysicalDrive {
    let (enclosure, slot) = match pd.eid_slot.split_once(':') {
        Some((enclosure, slot)) => (enclosure.trim().to_string(), slot.trim().to_string()),
        None => (pd.eid_slot.trim().to_string(), String::new()),
    };

    PhysicalDrive {
        controller,
        enclosure,
        slot,
        device_id: pd.did.map(i64::from),
        model: pd.model.trim().to_string(),
        interface: pd.interface,
        medium: (!pd.medium.is_empty()).then_some(pd.medium),
        size_bytes: normalize::reported_size(&pd.size),
        raw_state: pd.state.clone(),
        state: pd.state,
        temperature_celsius: normalize::reported_temperature(&pd.temperature),
        media_errors: Some(normalize::error_count(&pd.media_errors)),
        other_errors: Some(normalize::error_count(&pd.other_errors)),
        predictive_failures: Some(normalize::error_count(&pd.predictive_failures)),
        smart_alert: None,
    }
}

fn map_battery(controller: u32, bbu: BbuInfo) -> BatteryBackupUnit {
    BatteryBackupUnit {
        controller,
        battery_type: bbu.model,
        state: bbu.state,
        temperature_celsius: normalize::reported_temperature(&bbu.temperature),
        ..Default::default()
    }
}
