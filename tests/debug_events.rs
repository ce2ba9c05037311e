mod common;

use common::{TestResult, result_text, spawn_server_with_env_vars};

#[tokio::test(flavor = "multi_thread")]
async fn env_var_enables_jsonl_event_log() -> TestResult<()> {
    let temp = tempfile::tempdir()?;
    let events_dir = temp.path().join("events");

    let session = spawn_server_with_env_vars(vec![(
        "MCP_PYEXEC_DEBUG_EVENTS_DIR".to_string(),
        events_dir.display().to_string(),
    )])
    .await?;
    let result = session.execute_code("result = 'logged'").await?;
    session.cancel().await?;

    let text = result_text(&result);
    assert!(text.contains("Result:\nlogged"), "got: {text}");

    let mut log_files: Vec<_> = std::fs::read_dir(&events_dir)?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .collect();
    assert_eq!(log_files.len(), 1, "expected one log file: {log_files:?}");
    let log_file = log_files.pop().expect("log file");
    assert_eq!(
        log_file.extension().and_then(|ext| ext.to_str()),
        Some("jsonl")
    );

    let raw = std::fs::read_to_string(&log_file)?;
    let events: Vec<serde_json::Value> = raw
        .lines()
        .map(serde_json::from_str)
        .collect::<Result<_, _>>()?;
    assert!(!events.is_empty());
    assert_eq!(events[0]["event"], "startup");
    assert!(
        events
            .iter()
            .any(|event| event["event"] == "tool_call_begin"),
        "no tool_call_begin event: {events:?}"
    );
    assert!(
        events
            .iter()
            .any(|event| event["event"] == "tool_call_end"
                && event["payload"]["success"] == true),
        "no successful tool_call_end event: {events:?}"
    );
    Ok(())
}

#[cfg(target_family = "unix")]
mod unix {
    use std::ffi::OsString;
    use std::os::unix::ffi::OsStringExt;
    use std::process::Stdio;
    use std::time::Duration;

    use tokio::process::Command;
    use tokio::time;

    use crate::common::TestResult;

    #[tokio::test]
    async fn non_utf8_argv_is_rejected_without_panicking() -> TestResult<()> {
        let exe = std::env::var("CARGO_BIN_EXE_mcp-pyexec")?;
        let invalid_arg = OsString::from_vec(vec![b'-', b'-', b'b', b'a', b'd', b'-', 0x80]);

        let output = time::timeout(
            Duration::from_secs(15),
            Command::new(exe)
                .arg(invalid_arg)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::piped())
                .output(),
        )
        .await
        .map_err(|_| "server startup timed out")??;

        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(!output.status.success(), "bad argv was accepted");
        assert_ne!(
            output.status.code(),
            Some(101),
            "startup panicked on non-UTF-8 argv; stderr: {stderr}"
        );
        assert!(
            !stderr.contains("panicked at"),
            "startup panicked on non-UTF-8 argv; stderr: {stderr}"
        );
        Ok(())
    }
}
