//! Path Health Monitor
//!
//! Health lives in one `RwLock` cell so readers always see a consistent
//! `{path, healthy, last_check}` triple.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::error::{Error, Result};
use crate::invoker::OutputFormat;

/// Default MegaCLI install locations, in probe order
pub const MEGACLI_PATHS: &[&str] = &[
    "/opt/MegaRAID/MegaCli/MegaCli64",
    "/opt/MegaCli/MegaCli64",
    "/usr/sbin/MegaCli64",
    "/usr/local/bin/MegaCli64",
    "/opt/lsi/MegaCLI/MegaCli64",
];

/// Default StorCLI install locations, in probe order
pub const STORCLI_PATHS: &[&str] = &[
    "/opt/MegaRAID/storcli/storcli64",
    "/opt/MegaRAID/perccli/perccli64",
    "/usr/sbin/storcli64",
    "/usr/local/bin/storcli64",
    "/opt/lsi/storcli/storcli64",
];

/// Shortest probe interval; `tokio::time::interval` rejects zero
pub const MIN_CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// Check that `path` is a regular file with at least one execute bit
pub fn is_executable(path: &Path) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

/// One consistent reading of the monitor state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathHealth {
    /// Resolved binary path; empty when nothing was ever found
    pub path: String,
    pub healthy: bool,
    /// Time of the most recent probe
    pub last_check: Option<DateTime<Utc>>,
}

/// Body of the `/health` endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathStatus {
    pub path: String,
    pub healthy: bool,
    /// RFC3339 timestamp of the last probe
    pub last_check: Option<DateTime<Utc>>,
    /// Probe interval, e.g. `30s`
    pub check_interval: String,
}

/// Background probe of the diagnostic binary
pub struct PathMonitor {
    configured: Option<String>,
    candidates: &'static [&'static str],
    check_interval: Duration,
    state: RwLock<PathHealth>,
}

impl PathMonitor {
    /// Create a monitor.
    ///
    /// An explicit `configured` path is the only path ever probed. Otherwise
    /// the default install list for `format` is searched.
    pub fn new(configured: Option<String>, format: OutputFormat, check_interval: Duration) -> Self {
        let candidates = match format {
            OutputFormat::Text => MEGACLI_PATHS,
            OutputFormat::Json => STORCLI_PATHS,
        };
        Self::with_candidates(configured, candidates, check_interval)
    }

    /// Create a monitor with a custom default search list
    pub fn with_candidates(
        configured: Option<String>,
        candidates: &'static [&'static str],
        check_interval: Duration,
    ) -> Self {
        let configured = configured.filter(|p| !p.is_empty());
        let state = PathHealth {
            path: configured.clone().unwrap_or_default(),
            ..Default::default()
        };
        Self {
            configured,
            candidates,
            check_interval: check_interval.max(MIN_CHECK_INTERVAL),
            state: RwLock::new(state),
        }
    }

    /// Pick the path to probe.
    ///
    /// A discovered path is kept while it stays usable, so a binary that
    /// vanishes is reported at its last known location.
    fn resolve(&self, current: &str) -> (String, bool) {
        if let Some(path) = &self.configured {
            return (path.clone(), is_executable(Path::new(path)));
        }
        if !current.is_empty() && is_executable(Path::new(current)) {
            return (current.to_string(), true);
        }
        match self
            .candidates
            .iter()
            .find(|p| is_executable(Path::new(p)))
        {
            Some(found) => (found.to_string(), true),
            None => (current.to_string(), false),
        }
    }

    /// Probe once and update the shared state.
    ///
    /// Returns `true` when the health flag changed; the transition is logged
    /// here and nowhere else.
    pub fn probe(&self) -> bool {
        let current = self.state.read().path.clone();
        let (path, healthy) = self.resolve(&current);

        let mut state = self.state.write();
        let first = state.last_check.is_none();
        let changed = state.healthy != healthy;
        state.path = path;
        state.healthy = healthy;
        state.last_check = Some(Utc::now());
        log_transition(&state, first, changed);
        changed
    }

    /// Probe on every tick until `shutdown` is cancelled
    #[instrument(skip(self, shutdown), fields(interval = ?self.check_interval))]
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut tick = interval(self.check_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Path monitor shutting down");
                    break;
                }
                _ = tick.tick() => {
                    self.probe();
                }
            }
        }
    }

    /// Consistent copy of the current state
    pub fn snapshot(&self) -> PathHealth {
        self.state.read().clone()
    }

    /// Currently resolved path
    pub fn path(&self) -> String {
        self.state.read().path.clone()
    }

    pub fn is_healthy(&self) -> bool {
        self.state.read().healthy
    }

    pub fn check_interval(&self) -> Duration {
        self.check_interval
    }

    /// Status record served on `/health`
    pub fn status(&self) -> PathStatus {
        let snapshot = self.snapshot();
        PathStatus {
            path: snapshot.path,
            healthy: snapshot.healthy,
            last_check: snapshot.last_check,
            check_interval: format_interval(self.check_interval),
        }
    }

    /// Fail with [`Error::BinaryUnavailable`] unless the last probe succeeded
    pub fn ensure_healthy(&self) -> Result<()> {
        let snapshot = self.snapshot();
        if snapshot.healthy {
            Ok(())
        } else {
            Err(Error::BinaryUnavailable {
                path: snapshot.path,
            })
        }
    }
}

fn log_transition(state: &PathHealth, first: bool, changed: bool) {
    match (state.healthy, first || changed) {
        (_, false) => {}
        (true, true) => info!(path = %state.path, "Diagnostic binary found and executable"),
        (false, true) if first => warn!(path = %state.path, "Diagnostic binary not found"),
        (false, true) => error!(path = %state.path, "Diagnostic binary is no longer usable"),
    }
}

/// Format a duration the way operators write it: `30s`, `1m30s`, `500ms`
fn format_interval(d: Duration) -> String {
    let total_ms = d.as_millis();
    if total_ms == 0 {
        return "0s".to_string();
    }
    if total_ms < 1000 {
        return format!("{}ms", total_ms);
    }

    let secs = d.as_secs();
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    let millis = d.subsec_millis();

    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{}h", hours));
    }
    if hours > 0 || minutes > 0 {
        out.push_str(&format!("{}m", minutes));
    }
    if millis > 0 {
        let fraction = format!("{:03}", millis);
        out.push_str(&format!("{}.{}s", seconds, fraction.trim_end_matches('0')));
    } else {
        out.push_str(&format!("{}s", seconds));
    }
    out
}
