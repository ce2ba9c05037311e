use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{
    CallToolResult, Content, ErrorData as McpError, ProtocolVersion, ServerCapabilities, ServerInfo,
};
use rmcp::{ServerHandler, tool, tool_handler, tool_router};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;
use std::sync::{Arc, Mutex};

use crate::engine::CodeExecutor;
use crate::report::{self, RenderedReport};

const DEFAULT_WORKING_DIR: &str = ".";

/// The MCP service. The executor sits behind a mutex because the working
/// directory it switches is process-global state: at most one execution may
/// be in flight at a time.
#[derive(Clone)]
pub struct ExecuteCodeServer {
    executor: Arc<Mutex<CodeExecutor>>,
    tool_router: ToolRouter<Self>,
}

#[derive(Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct ExecuteCodeArgs {
    /// Python code to execute.
    code: String,
    /// Working directory for execution (default: current directory).
    #[serde(default)]
    working_dir: Option<String>,
}

#[tool_router]
impl ExecuteCodeServer {
    pub fn new() -> Self {
        Self {
            executor: Arc::new(Mutex::new(CodeExecutor::new())),
            tool_router: Self::tool_router(),
        }
    }

    #[doc = include_str!("../docs/tool-descriptions/execute_code.md")]
    #[tool(name = "execute_code")]
    async fn execute_code(
        &self,
        params: Parameters<ExecuteCodeArgs>,
    ) -> Result<CallToolResult, McpError> {
        let ExecuteCodeArgs { code, working_dir } = params.0;
        if code.trim().is_empty() {
            return Err(McpError::invalid_params(
                "missing required parameter: code",
                None,
            ));
        }
        let working_dir = working_dir.unwrap_or_else(|| DEFAULT_WORKING_DIR.to_string());

        crate::event_log::log_lazy("tool_call_begin", || {
            json!({
                "tool": "execute_code",
                "working_dir": working_dir.clone(),
                "code_chars": code.chars().count(),
            })
        });

        let executor = Arc::clone(&self.executor);
        let engine_code = code.clone();
        let engine_dir = working_dir.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            let mut executor = executor.lock().expect("executor mutex poisoned");
            executor.execute(&engine_code, &engine_dir)
        })
        .await
        .map_err(|err| McpError::internal_error(err.to_string(), None))?
        .map_err(|err| {
            crate::event_log::log_lazy("tool_call_error", || {
                json!({
                    "tool": "execute_code",
                    "error": err.to_string(),
                })
            });
            McpError::internal_error(err.to_string(), None)
        })?;

        let report = report::render(&outcome, &code).map_err(|err| {
            crate::event_log::log_lazy("tool_call_error", || {
                json!({
                    "tool": "execute_code",
                    "error": format!("report spill failed: {err}"),
                })
            });
            McpError::internal_error(format!("failed to write report spill file: {err}"), None)
        })?;

        let spilled = matches!(report, RenderedReport::Spilled { .. });
        crate::event_log::log_lazy("tool_call_end", || {
            json!({
                "tool": "execute_code",
                "success": outcome.success,
                "report_spilled": spilled,
                "result_spilled": outcome.result_file.is_some(),
            })
        });

        let content = vec![Content::text(report.into_text())];
        if outcome.success {
            Ok(CallToolResult::success(content))
        } else {
            Ok(CallToolResult::error(content))
        }
    }
}

impl Default for ExecuteCodeServer {
    fn default() -> Self {
        Self::new()
    }
}

#[tool_handler]
impl ServerHandler for ExecuteCodeServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_06_18,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..ServerInfo::default()
        }
    }
}

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("starting mcp-pyexec server");
    crate::event_log::log("server_run_begin", json!({}));

    let service = ExecuteCodeServer::new();
    crate::event_log::log("server_listen_begin", json!({}));
    let result: Result<(), Box<dyn std::error::Error>> = async {
        let running = rmcp::serve_server(service, rmcp::transport::stdio()).await?;
        running
            .waiting()
            .await
            .map(|_| ())
            .map_err(|err| err.into())
    }
    .await;

    match &result {
        Ok(()) => crate::event_log::log("server_listen_end", json!({"status": "ok"})),
        Err(err) => crate::event_log::log(
            "server_listen_end",
            json!({
                "status": "error",
                "error": err.to_string(),
            }),
        ),
    }
    result
}
