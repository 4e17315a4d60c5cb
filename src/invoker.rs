//! Diagnostic Invoker
//!
//! Runs the MegaCLI / StorCLI binary under a bounded timeout and classifies
//! every way that can go wrong. The child is killed if the timeout fires.

use std::io::ErrorKind;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::error::InvokeError;
use crate::hardware::EntityClass;
use crate::monitoring::PathMonitor;

// =============================================================================
// Output Format
// =============================================================================

/// Which diagnostic tool, and therefore which output format, to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// MegaCLI key:value text
    Text,
    /// StorCLI `J` output
    Json,
}

impl OutputFormat {
    /// Commands (argument lists) that collect one entity class.
    ///
    /// StorCLI reports battery units under `/call/bbu` and CacheVault
    /// modules under `/call/cv`, so that class takes two commands.
    pub fn commands(&self, class: EntityClass) -> &'static [&'static [&'static str]] {
        match (self, class) {
            (OutputFormat::Text, EntityClass::Controller) => &[&["-AdpAllInfo", "-aALL", "-NoLog"]],
            (OutputFormat::Text, EntityClass::VirtualDrive) => {
                &[&["-LDInfo", "-Lall", "-aALL", "-NoLog"]]
            }
            (OutputFormat::Text, EntityClass::PhysicalDrive) => &[&["-PDList", "-aALL", "-NoLog"]],
            (OutputFormat::Text, EntityClass::Battery) => {
                &[&["-AdpBbuCmd", "-GetBbuStatus", "-aALL", "-NoLog"]]
            }
            (OutputFormat::Json, EntityClass::Controller)
            | (OutputFormat::Json, EntityClass::VirtualDrive)
            | (OutputFormat::Json, EntityClass::PhysicalDrive) => {
                &[&["/call", "show", "all", "J"]]
            }
            (OutputFormat::Json, EntityClass::Battery) => &[
                &["/call/bbu", "show", "all", "J"],
                &["/call/cv", "show", "all", "J"],
            ],
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

// =============================================================================
// Execution
// =============================================================================

/// Run `path args...` and return its stdout.
///
/// An empty `path` is reported as [`InvokeError::BinaryNotFound`] without
/// spawning anything.
#[instrument(skip(args), fields(args = %args.join(" ")))]
pub async fn execute(path: &str, args: &[&str], timeout: Duration) -> Result<String, InvokeError> {
    if path.is_empty() {
        return Err(InvokeError::BinaryNotFound {
            path: String::new(),
        });
    }

    let child = Command::new(path)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| classify_spawn_error(path, e))?;

    // Dropping the wait future on expiry drops the child, which kills it.
    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(InvokeError::Io)?,
        Err(_) => return Err(InvokeError::Timeout(timeout)),
    };

    if !output.status.success() {
        return Err(InvokeError::NonZeroExit {
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    if stdout.trim().is_empty() {
        return Err(InvokeError::EmptyOutput);
    }

    debug!(bytes = stdout.len(), "Diagnostic command finished");
    Ok(stdout)
}

fn classify_spawn_error(path: &str, error: std::io::Error) -> InvokeError {
    match error.kind() {
        ErrorKind::NotFound => InvokeError::BinaryNotFound {
            path: path.to_string(),
        },
        ErrorKind::PermissionDenied => InvokeError::PermissionDenied {
            path: path.to_string(),
        },
        _ => InvokeError::Io(error),
    }
}

// =============================================================================
// Runner Seam
// =============================================================================

/// Source of raw diagnostic output.
///
/// The collector only talks to this trait, so scrapes can be driven by
/// scripted output in tests.
#[async_trait]
pub trait DiagnosticRunner: Send + Sync {
    /// Run the diagnostic tool with `args`, bounded by `timeout`
    async fn run(&self, args: &[&str], timeout: Duration) -> Result<String, InvokeError>;
}

/// Runs the binary currently resolved by the path monitor
pub struct SubprocessRunner {
    monitor: Arc<PathMonitor>,
}

impl SubprocessRunner {
    /// Create a runner that follows `monitor`'s resolved path
    pub fn new(monitor: Arc<PathMonitor>) -> Self {
        Self { monitor }
    }
}

#[async_trait]
impl DiagnosticRunner for SubprocessRunner {
    async fn run(&self, args: &[&str], timeout: Duration) -> Result<String, InvokeError> {
        let path = self.monitor.path();
        execute(&path, args, timeout).await
    }
}
