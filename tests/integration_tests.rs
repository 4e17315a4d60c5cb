//! MegaRAID Exporter Integration Tests
//!
//! Runs both parsers and the collector against captured MegaCLI and StorCLI
//! output in `tests/fixtures/`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use megaraid_exporter::error::InvokeError;
use megaraid_exporter::invoker::DiagnosticRunner;

const ADAPTER_INFO: &str = include_str!("fixtures/adapter_info.txt");
const LD_INFO: &str = include_str!("fixtures/ld_info.txt");
const PD_LIST: &str = include_str!("fixtures/pd_list.txt");
const BBU_STATUS_TXT: &str = include_str!("fixtures/bbu_status.txt");
const STORCLI_SHOW_ALL: &str = include_str!("fixtures/storcli_show_all.json");
const STORCLI_CALL_SHOW_ALL: &str = include_str!("fixtures/storcli_call_show_all.json");
const STORCLI_BBU: &str = include_str!("fixtures/storcli_bbu.json");
const STORCLI_CV: &str = include_str!("fixtures/storcli_cv.json");

const TIB: f64 = 1024.0 * 1024.0 * 1024.0 * 1024.0;
const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Number of lines whose trimmed text starts with `key`
fn count_key(output: &str, key: &str) -> usize {
    output
        .lines()
        .filter(|line| line.trim_start().starts_with(key))
        .count()
}

/// What a scripted command does
#[derive(Clone, Copy)]
enum Reply {
    Output(&'static str),
    Exit(i32),
    /// Sleep for the whole timeout, then time out
    Hang,
}

/// Runner that answers by the first command-line argument
struct FixtureRunner {
    replies: Vec<(&'static str, Reply)>,
}

#[async_trait]
impl DiagnosticRunner for FixtureRunner {
    async fn run(&self, args: &[&str], timeout: Duration) -> Result<String, InvokeError> {
        let first = args.first().copied().unwrap_or_default();
        let reply = self
            .replies
            .iter()
            .find(|(arg, _)| *arg == first)
            .map(|(_, reply)| *reply);

        match reply {
            Some(Reply::Output(out)) => Ok(out.to_string()),
            Some(Reply::Exit(code)) => Err(InvokeError::NonZeroExit {
                code: Some(code),
                stderr: "Failed".to_string(),
            }),
            Some(Reply::Hang) => {
                tokio::time::sleep(timeout).await;
                Err(InvokeError::Timeout(timeout))
            }
            None => Err(InvokeError::EmptyOutput),
        }
    }
}

fn megacli_replies() -> Vec<(&'static str, Reply)> {
    vec![
        ("-AdpAllInfo", Reply::Output(ADAPTER_INFO)),
        ("-LDInfo", Reply::Output(LD_INFO)),
        ("-PDList", Reply::Output(PD_LIST)),
        ("-AdpBbuCmd", Reply::Output(BBU_STATUS_TXT)),
    ]
}

fn storcli_replies() -> Vec<(&'static str, Reply)> {
    vec![
        ("/call", Reply::Output(STORCLI_CALL_SHOW_ALL)),
        ("/call/bbu", Reply::Output(STORCLI_BBU)),
        ("/call/cv", Reply::Output(STORCLI_CV)),
    ]
}

// =============================================================================
// Line-Oriented Parser
// =============================================================================

mod text_parser_tests {
    use super::*;
    use megaraid_exporter::hardware::text;

    #[test]
    fn test_entity_count_matches_defining_keys() {
        assert_eq!(
            text::parse_controllers(ADAPTER_INFO).len(),
            count_key(ADAPTER_INFO, "Product Name")
        );
        assert_eq!(
            text::parse_virtual_drives(LD_INFO).len(),
            count_key(LD_INFO, "Virtual Drive")
        );
        assert_eq!(
            text::parse_physical_drives(PD_LIST).len(),
            count_key(PD_LIST, "Enclosure Device ID")
        );
        assert_eq!(
            text::parse_batteries(BBU_STATUS_TXT).len(),
            count_key(BBU_STATUS_TXT, "BBU status for Adapter")
        );
    }

    #[test]
    fn test_adapter_info() {
        let controllers = text::parse_controllers(ADAPTER_INFO);
        assert_eq!(controllers.len(), 2);

        let first = &controllers[0];
        assert_eq!(first.index, 0);
        assert_eq!(first.model, "PERC H710P Mini");
        assert_eq!(first.serial, "29E00XY");
        assert_eq!(first.firmware_version.as_deref(), Some("21.3.5-0002"));
        assert_eq!(first.memory_size_bytes, Some(GIB));
        assert_eq!(first.roc_temperature_celsius, Some(66.0));
        assert_eq!(first.rebuild_rate, Some(30));
        assert_eq!(first.degraded_vds, Some(1));
        assert_eq!(first.effective_status().as_deref(), Some("Degraded"));

        let second = &controllers[1];
        assert_eq!(second.index, 1);
        assert_eq!(second.model, "LSI MegaRAID SAS 9271-8i");
        assert_eq!(second.temperature_celsius(), Some(58.0));
        assert_eq!(second.effective_status().as_deref(), Some("Optimal"));
    }

    #[test]
    fn test_ld_info() {
        let vds = text::parse_virtual_drives(LD_INFO);
        assert_eq!(vds.len(), 3);

        assert_eq!(vds[0].label, "0");
        assert_eq!(vds[0].name, "os");
        assert_eq!(vds[0].raid_type, "RAID1");
        assert_eq!(vds[0].state, "Optl");
        assert_eq!(vds[0].access, "RW");

        assert_eq!(vds[1].target_id, 1);
        assert_eq!(vds[1].raid_type, "RAID10");
        assert_eq!(vds[1].state, "Pdgd");
        assert_eq!(vds[1].raw_state, "Partially Degraded");
        assert_eq!(vds[1].access, "R");
        assert_eq!(vds[1].size_bytes, Some(1.089 * TIB));

        assert_eq!(vds[2].controller, 1);
        assert_eq!(vds[2].raid_type, "RAID5");
        assert_eq!(vds[2].size_bytes, None);
    }

    #[test]
    fn test_pd_list() {
        let pds = text::parse_physical_drives(PD_LIST);
        assert_eq!(pds.len(), 5);

        let healthy = &pds[0];
        assert_eq!(healthy.enclosure_slot(), "32:0");
        assert_eq!(healthy.state, "Onln");
        assert_eq!(healthy.interface, "SAS");
        assert_eq!(healthy.medium.as_deref(), Some("HDD"));
        assert_eq!(healthy.temperature_celsius, Some(36.0));
        assert_eq!(healthy.size_bytes, Some(279.396 * GIB));
        assert_eq!(healthy.media_errors, Some(0.0));

        let failing = &pds[1];
        assert_eq!(failing.model, "SEAGATE ST300MM0008 LS0BS0K2ABCE");
        assert_eq!(failing.media_errors, Some(12.0));
        assert_eq!(failing.other_errors, Some(3.0));
        assert_eq!(failing.predictive_failures, Some(1.0));
        assert_eq!(failing.smart_alert.as_deref(), Some("Yes"));

        let rebuilding = &pds[2];
        assert_eq!(rebuilding.state, "Rbld");
        assert_eq!(rebuilding.other_errors, Some(0.0));
        assert_eq!(rebuilding.temperature_celsius, None);
        assert_eq!(rebuilding.medium.as_deref(), Some("SSD"));

        assert_eq!(pds[3].state, "GHS");
        assert_eq!(pds[4].controller, 1);
        assert_eq!(pds[4].enclosure_slot(), "252:0");
    }

    #[test]
    fn test_bbu_status() {
        let batteries = text::parse_batteries(BBU_STATUS_TXT);
        assert_eq!(batteries.len(), 2);

        let bbu = &batteries[0];
        assert_eq!(bbu.controller, 0);
        assert_eq!(bbu.battery_type, "BBU");
        assert_eq!(bbu.state, "Optimal");
        assert_eq!(bbu.temperature_celsius, Some(28.0));
        assert_eq!(bbu.charge_percent, Some(86.0));
        assert_eq!(bbu.replacement_required.as_deref(), Some("No"));

        let cache_vault = &batteries[1];
        assert_eq!(cache_vault.controller, 1);
        assert_eq!(cache_vault.battery_type, "CVPM02");
        assert_eq!(cache_vault.replacement_required.as_deref(), Some("Yes"));
        assert_eq!(cache_vault.charge_percent, None);
    }
}

// =============================================================================
// Structured Mapper
// =============================================================================

mod json_mapper_tests {
    use super::*;
    use megaraid_exporter::hardware::json;
    use megaraid_exporter::hardware::normalize::ERROR_COUNT_SUPPRESSED;

    #[test]
    fn test_failed_block_is_isolated() {
        let doc = json::parse_document(STORCLI_CALL_SHOW_ALL).unwrap();

        assert_eq!(doc.controllers.keys().copied().collect::<Vec<_>>(), vec![0]);
        assert_eq!(doc.failures.len(), 1);
        assert_eq!(doc.failures[0].controller, 1);
        assert_eq!(doc.failures[0].description, "Controller 1 not found");

        let inventory = &doc.controllers[&0];
        assert_eq!(inventory.virtual_drives.len(), 2);
        assert_eq!(inventory.physical_drives.len(), 3);
    }

    #[test]
    fn test_pd_list_values() {
        let inventory = json::parse_document(STORCLI_CALL_SHOW_ALL)
            .unwrap()
            .into_inventory();
        let pds = &inventory.physical_drives;

        assert_eq!(pds[0].model, "ST300MM0008");
        assert_eq!(pds[0].temperature_celsius, Some(36.0));
        assert_eq!(pds[0].other_errors, Some(0.0));
        assert_eq!(pds[0].predictive_failures, Some(0.0));

        assert_eq!(pds[1].media_errors, Some(7.0));
        assert_eq!(pds[1].other_errors, Some(ERROR_COUNT_SUPPRESSED));
        assert_eq!(pds[1].temperature_celsius, None);

        assert_eq!(pds[2].state, "UGood");
        assert_eq!(pds[2].device_id, Some(2));
    }

    #[test]
    fn test_vd_list_values() {
        let inventory = json::parse_document(STORCLI_CALL_SHOW_ALL)
            .unwrap()
            .into_inventory();
        let vd = &inventory.virtual_drives[1];

        assert_eq!(vd.label, "1/1");
        assert_eq!(vd.target_id, 1);
        assert_eq!(vd.raid_type, "RAID10");
        assert_eq!(vd.state, "Dgrd");
        assert_eq!(vd.size_bytes, Some(1.089 * TIB));
    }

    #[test]
    fn test_system_overview() {
        let controllers = json::parse_document(STORCLI_SHOW_ALL)
            .unwrap()
            .into_inventory()
            .controllers;

        assert_eq!(controllers.len(), 2);
        assert_eq!(controllers[0].index, 0);
        assert_eq!(controllers[0].status.as_deref(), Some("Needs Attention"));
        assert_eq!(controllers[1].index, 1);
        assert_eq!(controllers[1].status.as_deref(), Some("Optimal"));
    }

    #[test]
    fn test_controller_basics() {
        let controllers = json::parse_document(STORCLI_CALL_SHOW_ALL)
            .unwrap()
            .into_inventory()
            .controllers;

        assert_eq!(controllers.len(), 1);
        assert_eq!(controllers[0].serial, "5AT00XY");
        assert_eq!(controllers[0].status.as_deref(), Some("Needs Attention"));
        assert_eq!(controllers[0].roc_temperature_celsius, Some(61.0));
    }

    #[test]
    fn test_bbu_and_cachevault() {
        let bbu = json::parse_document(STORCLI_BBU).unwrap();
        assert_eq!(bbu.failures.len(), 1);
        assert_eq!(bbu.failures[0].controller, 1);

        let batteries = bbu.into_inventory().batteries;
        assert_eq!(batteries.len(), 1);
        assert_eq!(batteries[0].battery_type, "iBBU08");
        assert_eq!(batteries[0].temperature_celsius, Some(30.0));

        let cachevaults = json::parse_document(STORCLI_CV)
            .unwrap()
            .into_inventory()
            .batteries;
        assert_eq!(cachevaults.len(), 1);
        assert_eq!(cachevaults[0].controller, 1);
        assert_eq!(cachevaults[0].battery_type, "CVPM02");
    }
}

// =============================================================================
// Collector
// =============================================================================

mod collector_tests {
    use super::*;
    use megaraid_exporter::collector::{CollectorConfig, MegaraidCollector};
    use megaraid_exporter::hardware::EntityClass;
    use megaraid_exporter::invoker::OutputFormat;
    use megaraid_exporter::metrics::mapper::{
        BBU_STATUS, CONTROLLER_STATUS, PD_MEDIA_ERRORS, PD_OTHER_ERRORS, PD_STATUS, PD_TEMPERATURE,
        VD_STATUS,
    };

    fn collector(format: OutputFormat, replies: Vec<(&'static str, Reply)>) -> MegaraidCollector {
        let config = CollectorConfig {
            format,
            command_timeout: Duration::from_millis(200),
            scrape_timeout: Duration::from_secs(5),
        };
        MegaraidCollector::new(config, Arc::new(FixtureRunner { replies })).unwrap()
    }

    #[tokio::test]
    async fn test_megacli_scrape() {
        let report = collector(OutputFormat::Text, megacli_replies()).scrape().await;

        assert!(report.classes.iter().all(|c| c.succeeded()));
        assert_eq!(report.class(EntityClass::PhysicalDrive).unwrap().entities, 5);

        let statuses: Vec<_> = report
            .samples_named(CONTROLLER_STATUS)
            .map(|s| (s.label("controller").unwrap().to_string(), s.value))
            .collect();
        assert_eq!(statuses, vec![("0".to_string(), 0.0), ("1".to_string(), 1.0)]);

        // "N/A" error counters read as zero and are still emitted
        let other_errors: Vec<_> = report
            .samples_named(PD_OTHER_ERRORS)
            .filter(|s| s.label("enclosure_slot") == Some("32:2"))
            .collect();
        assert_eq!(other_errors.len(), 1);
        assert_eq!(other_errors[0].value, 0.0);

        // Unreported temperature produces no sample
        assert_eq!(
            report
                .samples_named(PD_TEMPERATURE)
                .filter(|s| s.label("enclosure_slot") == Some("32:2"))
                .count(),
            0
        );
        assert_eq!(report.samples_named(BBU_STATUS).count(), 2);
    }

    #[tokio::test]
    async fn test_pd_timeout_keeps_other_classes() {
        let mut replies = megacli_replies();
        replies.retain(|(arg, _)| *arg != "-PDList");
        replies.push(("-PDList", Reply::Hang));

        let collector = collector(OutputFormat::Text, replies);
        let report = collector.scrape().await;

        let pd = report.class(EntityClass::PhysicalDrive).unwrap();
        assert!(!pd.succeeded());
        assert!(pd.error.as_deref().unwrap().contains("timed out"));

        assert!(report.samples_named(CONTROLLER_STATUS).count() > 0);
        assert!(report.samples_named(VD_STATUS).count() > 0);
        assert_eq!(report.samples_named(PD_STATUS).count(), 0);
        assert_eq!(report.samples_named(PD_MEDIA_ERRORS).count(), 0);

        let text = collector.render().await.unwrap();
        assert!(text.contains("megaraid_controller_status{"));
        assert!(text.contains("megaraid_vd_status{"));
        assert!(!text.contains("megaraid_pd_status"));
        assert!(text.contains(r#"megaraid_scrape_collector_success{collector="pd"} 0"#));
    }

    #[tokio::test]
    async fn test_storcli_scrape() {
        let collector = collector(OutputFormat::Json, storcli_replies());
        let report = collector.scrape().await;
        assert!(report.classes.iter().all(|c| c.succeeded()));

        let text = collector.render().await.unwrap();
        assert!(text.contains(
            r#"megaraid_controller_status{controller="0",model="PERC H730P Mini",serial="5AT00XY"} 0"#
        ));
        assert!(text.contains(
            r#"megaraid_vd_status{access="RW",controller="0",type="RAID10",vd="1/1"} 0"#
        ));
        assert!(text.contains(
            r#"megaraid_pd_media_errors_total{controller="0",enclosure_slot="32:1",model="ST600MM0088"} 7"#
        ));
        assert!(text.contains(
            r#"megaraid_pd_other_errors_total{controller="0",enclosure_slot="32:0",model="ST300MM0008"} 0"#
        ));
        // Suppressed counter
        assert!(!text.contains(
            r#"megaraid_pd_other_errors_total{controller="0",enclosure_slot="32:1""#
        ));
        assert!(text.contains(
            r#"megaraid_controller_temperature_celsius{controller="0",model="PERC H730P Mini",serial="5AT00XY"} 61"#
        ));
        assert!(text.contains(r#"megaraid_bbu_temperature_celsius{controller="0",type="iBBU08"} 30"#));
        assert!(text.contains(r#"megaraid_bbu_temperature_celsius{controller="1",type="CVPM02"} 27"#));
    }

    #[tokio::test]
    async fn test_failing_binary_never_fails_scrape() {
        let replies = vec![
            ("-AdpAllInfo", Reply::Exit(1)),
            ("-LDInfo", Reply::Exit(1)),
            ("-PDList", Reply::Exit(1)),
            ("-AdpBbuCmd", Reply::Exit(1)),
        ];
        let text = collector(OutputFormat::Text, replies).render().await.unwrap();

        assert!(!text.contains("megaraid_controller_status"));
        assert_eq!(text.matches("megaraid_scrape_collector_success{").count(), 4);
    }
}

// =============================================================================
// Subprocess Path
// =============================================================================

mod subprocess_tests {
    use super::*;
    use megaraid_exporter::collector::{CollectorConfig, MegaraidCollector};
    use megaraid_exporter::hardware::EntityClass;
    use megaraid_exporter::invoker::SubprocessRunner;
    use megaraid_exporter::monitoring::PathMonitor;

    fn collector_for(path: &str) -> MegaraidCollector {
        let monitor = Arc::new(PathMonitor::with_candidates(
            Some(path.to_string()),
            &[],
            Duration::from_secs(30),
        ));
        monitor.probe();
        MegaraidCollector::new(
            CollectorConfig::default(),
            Arc::new(SubprocessRunner::new(monitor)),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_unrecognized_output_yields_no_entities() {
        // echo prints its arguments, which contain no known keys
        let report = collector_for("/bin/echo").scrape().await;

        for class in EntityClass::ALL {
            let outcome = report.class(class).unwrap();
            assert!(outcome.succeeded(), "{} failed: {:?}", class, outcome.error);
            assert_eq!(outcome.entities, 0);
        }
    }

    #[tokio::test]
    async fn test_missing_binary_fails_every_class() {
        let report = collector_for("/nonexistent/MegaCli64").scrape().await;
        assert!(report.classes.iter().all(|c| !c.succeeded()));
    }
}
