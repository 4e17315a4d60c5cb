//! Binary Availability Monitoring
//!
//! A background probe that keeps track of where the diagnostic tool lives and
//! whether it can currently be executed. The result feeds the `/health`
//! endpoint and the path used by every scrape.

mod path;

pub use path::{
    is_executable, PathHealth, PathMonitor, PathStatus, MEGACLI_PATHS, STORCLI_PATHS,
};
