//! Startup breadcrumb log, for debugging launches where even the event log
//! is not yet initialized. Enabled by `MCP_PYEXEC_DEBUG_STARTUP` (any
//! non-empty value) or by naming a file in `MCP_PYEXEC_DEBUG_STARTUP_FILE`.

use std::fs::OpenOptions;
use std::io::Write;
use std::sync::{Mutex, OnceLock};
use std::time::Instant;

static STARTUP_LOG_ENABLED: OnceLock<bool> = OnceLock::new();
static STARTUP_EPOCH: OnceLock<Instant> = OnceLock::new();
static STARTUP_LOG_FILE: OnceLock<Option<Mutex<std::fs::File>>> = OnceLock::new();

const STARTUP_LOG_ENV: &str = "MCP_PYEXEC_DEBUG_STARTUP";
const STARTUP_LOG_PATH_ENV: &str = "MCP_PYEXEC_DEBUG_STARTUP_FILE";
const STARTUP_LOG_DEFAULT: &str = "mcp-pyexec-startup.log";

fn startup_enabled() -> bool {
    *STARTUP_LOG_ENABLED.get_or_init(|| {
        [STARTUP_LOG_ENV, STARTUP_LOG_PATH_ENV].iter().any(|key| {
            std::env::var(key)
                .map(|value| !value.trim().is_empty())
                .unwrap_or(false)
        })
    })
}

pub fn startup_log(message: impl AsRef<str>) {
    if !startup_enabled() {
        return;
    }
    let epoch = *STARTUP_EPOCH.get_or_init(Instant::now);
    let file = STARTUP_LOG_FILE.get_or_init(|| {
        let path = std::env::var(STARTUP_LOG_PATH_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| STARTUP_LOG_DEFAULT.to_string());
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .ok()
            .map(Mutex::new)
    });
    let Some(file) = file else {
        return;
    };
    if let Ok(mut guard) = file.lock() {
        let _ = writeln!(
            *guard,
            "[mcp-pyexec][startup +{:>6}ms] {}",
            epoch.elapsed().as_millis(),
            message.as_ref()
        );
        let _ = guard.flush();
    }
}
