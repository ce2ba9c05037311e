//! Opt-in JSONL debug event log.
//!
//! When `--debug-events-dir` or `MCP_PYEXEC_DEBUG_EVENTS_DIR` names a
//! directory, every startup creates one uniquely named `.jsonl` file there
//! and appends one JSON object per event. Disabled (the default) this module
//! is a no-op; stdout/stderr are never used, they belong to the transport.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde_json::{Value as JsonValue, json};

pub const DEBUG_EVENTS_DIR_ENV: &str = "MCP_PYEXEC_DEBUG_EVENTS_DIR";

static LOGGER: OnceLock<Option<Arc<EventLogger>>> = OnceLock::new();

#[derive(Debug, Clone)]
pub struct StartupContext {
    pub mode: String,
}

#[derive(Debug)]
struct EventLogger {
    file: Mutex<File>,
    file_path: PathBuf,
    startup_epoch: Instant,
    session_instance_id: String,
    pid: u32,
    seq: AtomicU64,
}

impl EventLogger {
    fn new(dir: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        fs::create_dir_all(dir)?;
        let unix_ms = unix_ms_now();
        let pid = std::process::id();
        let (file, file_path) = create_unique_log_file(dir, unix_ms, pid)?;
        Ok(Self {
            file: Mutex::new(file),
            file_path,
            startup_epoch: Instant::now(),
            session_instance_id: format!("{unix_ms}-{pid}"),
            pid,
            seq: AtomicU64::new(0),
        })
    }

    fn write_event(&self, event: &str, payload: JsonValue) -> Result<(), std::io::Error> {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        let line = json!({
            "ts_unix_ms": unix_ms_now(),
            "uptime_ms": self.startup_epoch.elapsed().as_millis(),
            "seq": seq,
            "session_instance_id": self.session_instance_id,
            "pid": self.pid,
            "event": event,
            "payload": payload,
        });
        let mut file = self.file.lock().expect("event logger mutex poisoned");
        writeln!(file, "{line}")?;
        file.flush()?;
        Ok(())
    }
}

/// Set up the logger once per process. A second call is a no-op.
pub fn initialize(
    debug_events_dir: Option<PathBuf>,
    context: StartupContext,
) -> Result<(), Box<dyn std::error::Error>> {
    if LOGGER.get().is_some() {
        return Ok(());
    }

    let maybe_logger = if let Some(dir) = resolve_debug_dir(debug_events_dir) {
        let logger = Arc::new(EventLogger::new(&dir)?);
        logger.write_event("startup", startup_payload(&context, &logger.file_path))?;
        Some(logger)
    } else {
        None
    };
    let _ = LOGGER.set(maybe_logger);
    Ok(())
}

pub fn log(event: &str, payload: JsonValue) {
    let Some(logger) = current_logger() else {
        return;
    };
    let _ = logger.write_event(event, payload);
}

/// Like [`log`], but the payload is only built when logging is enabled.
pub fn log_lazy(event: &str, payload: impl FnOnce() -> JsonValue) {
    let Some(logger) = current_logger() else {
        return;
    };
    let _ = logger.write_event(event, payload());
}

fn current_logger() -> Option<Arc<EventLogger>> {
    LOGGER.get().and_then(|entry| entry.clone())
}

fn resolve_debug_dir(debug_events_dir: Option<PathBuf>) -> Option<PathBuf> {
    if let Some(path) = debug_events_dir
        && !path.as_os_str().is_empty()
    {
        return Some(path);
    }
    std::env::var_os(DEBUG_EVENTS_DIR_ENV)
        .filter(|raw| !raw.is_empty())
        .map(PathBuf::from)
}

fn startup_payload(context: &StartupContext, file_path: &Path) -> JsonValue {
    let cwd = std::env::current_dir()
        .ok()
        .map(|path| path.to_string_lossy().to_string());
    let argv: Vec<String> = std::env::args_os()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();
    json!({
        "mode": context.mode,
        "cwd": cwd,
        "argv": argv,
        "log_file": file_path.to_string_lossy().to_string(),
    })
}

fn create_unique_log_file(
    dir: &Path,
    unix_ms: u128,
    pid: u32,
) -> Result<(File, PathBuf), Box<dyn std::error::Error>> {
    for attempt in 0u32..100 {
        let name = if attempt == 0 {
            format!("events-{unix_ms}-{pid}.jsonl")
        } else {
            format!("events-{unix_ms}-{pid}-{attempt}.jsonl")
        };
        let path = dir.join(name);
        match OpenOptions::new().create_new(true).append(true).open(&path) {
            Ok(file) => return Ok((file, path)),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(err.into()),
        }
    }
    Err("unable to create a unique debug event log file".into())
}

fn unix_ms_now() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    // `initialize` is once-per-process, so a single test exercises the whole
    // startup-and-append path.
    #[test]
    fn initialize_writes_startup_then_appends_events() {
        let dir = tempfile::tempdir().expect("tempdir");
        initialize(
            Some(dir.path().to_path_buf()),
            StartupContext {
                mode: "test".to_string(),
            },
        )
        .expect("initialize");

        log("first_event", json!({"value": 1}));
        log_lazy("second_event", || json!({"value": 2}));

        let entries: Vec<PathBuf> = fs::read_dir(dir.path())
            .expect("read dir")
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .collect();
        assert_eq!(entries.len(), 1, "expected one log file: {entries:?}");

        let raw = fs::read_to_string(&entries[0]).expect("read log");
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 3, "got lines: {lines:?}");

        let startup: JsonValue = serde_json::from_str(lines[0]).expect("parse startup");
        assert_eq!(startup["event"], "startup");
        assert_eq!(startup["payload"]["mode"], "test");

        let first: JsonValue = serde_json::from_str(lines[1]).expect("parse event");
        assert_eq!(first["event"], "first_event");
        assert_eq!(first["payload"]["value"], 1);
        assert_eq!(first["seq"], 2);
    }
}
