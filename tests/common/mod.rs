#![allow(dead_code)]

use std::error::Error;
use std::path::PathBuf;

use rmcp::ServiceExt;
use rmcp::handler::client::ClientHandler;
use rmcp::model::{CallToolRequestParam, CallToolResult, RawContent};
use rmcp::service::ServiceError;
use rmcp::transport::{ConfigureCommandExt, TokioChildProcess};
use serde_json::{Value, json};
use tokio::process::Command;

pub type TestResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

#[derive(Clone)]
struct TestClient;

impl ClientHandler for TestClient {}

pub struct McpTestSession {
    service: rmcp::service::RunningService<rmcp::service::RoleClient, TestClient>,
}

impl McpTestSession {
    pub fn server_info(&self) -> Option<&rmcp::model::ServerInfo> {
        self.service.peer_info()
    }

    pub async fn execute_code(&self, code: &str) -> Result<CallToolResult, ServiceError> {
        self.call_tool("execute_code", json!({ "code": code })).await
    }

    pub async fn execute_code_in(
        &self,
        code: &str,
        working_dir: &str,
    ) -> Result<CallToolResult, ServiceError> {
        self.call_tool(
            "execute_code",
            json!({ "code": code, "working_dir": working_dir }),
        )
        .await
    }

    pub async fn call_tool(
        &self,
        tool: &str,
        arguments: Value,
    ) -> Result<CallToolResult, ServiceError> {
        let arguments = match arguments {
            Value::Null => None,
            Value::Object(map) => Some(map.into_iter().collect()),
            other => panic!("tool arguments must be a JSON object, got: {other}"),
        };
        self.service
            .call_tool(CallToolRequestParam {
                name: tool.to_string().into(),
                arguments,
            })
            .await
    }

    pub async fn cancel(self) -> TestResult<()> {
        self.service.cancel().await?;
        Ok(())
    }
}

pub async fn spawn_server() -> TestResult<McpTestSession> {
    spawn_server_with_args_and_env(Vec::new(), Vec::new()).await
}

pub async fn spawn_server_with_env_vars(
    env_vars: Vec<(String, String)>,
) -> TestResult<McpTestSession> {
    spawn_server_with_args_and_env(Vec::new(), env_vars).await
}

pub async fn spawn_server_with_args_and_env(
    args: Vec<String>,
    env_vars: Vec<(String, String)>,
) -> TestResult<McpTestSession> {
    let exe = resolve_server_path()?;
    let transport = TokioChildProcess::new(Command::new(exe).configure(|cmd| {
        cmd.env_remove("MCP_PYEXEC_DEBUG_EVENTS_DIR");
        cmd.env_remove("MCP_PYEXEC_DEBUG_STARTUP");
        cmd.env_remove("MCP_PYEXEC_DEBUG_STARTUP_FILE");
        cmd.args(&args);
        for (key, value) in &env_vars {
            cmd.env(key, value);
        }
    }))?;

    let service = TestClient.serve(transport).await?;
    Ok(McpTestSession { service })
}

fn resolve_server_path() -> TestResult<PathBuf> {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_mcp-pyexec") {
        return Ok(PathBuf::from(path));
    }

    let mut path = std::env::current_exe()?;
    path.pop();
    path.pop();
    path.push("mcp-pyexec");
    if cfg!(windows) {
        path.set_extension("exe");
    }

    if path.exists() {
        Ok(path)
    } else {
        Err("unable to locate mcp-pyexec test binary".into())
    }
}

pub fn result_text(result: &CallToolResult) -> String {
    result
        .content
        .iter()
        .filter_map(|item| match &item.raw {
            RawContent::Text(text) => Some(text.text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("")
}
