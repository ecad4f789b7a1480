//! RMCP 0.3.2 implementation for RISC-V boot GDB tools
//!
//! Plans, scripts and runs boot debug sessions. Live sessions own a GDB
//! process driven over MI and are addressed by session id.

use rmcp::{
    tool, tool_router, tool_handler, ServerHandler,
    handler::server::{router::tool::ToolRouter, tool::Parameters},
    model::*,
    ErrorData as McpError,
};
use serde::Serialize;
use tracing::{info, warn};
use std::future::Future;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::types::*;
use crate::config::Config;
use crate::error::InitError;
use crate::gdb_client::GdbClient;
use crate::script::render_script;
use crate::session::SessionInitializer;

/// Active GDB session
struct GdbSession {
    initializer: SessionInitializer,
    client: GdbClient,
}

/// RISC-V boot GDB tool handler
#[derive(Clone)]
pub struct GdbBootToolHandler {
    #[allow(dead_code)]
    tool_router: ToolRouter<GdbBootToolHandler>,
    config: Config,
    sessions: Arc<RwLock<HashMap<String, Arc<tokio::sync::Mutex<GdbSession>>>>>,
}

impl GdbBootToolHandler {
    pub fn new(config: Config) -> Self {
        Self {
            tool_router: Self::tool_router(),
            config,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Get a session by ID, returning an MCP error if not found. Sessions
    /// whose GDB has exited are dropped here.
    async fn get_session(&self, session_id: &str) -> Result<Arc<tokio::sync::Mutex<GdbSession>>, McpError> {
        let session = {
            let sessions = self.sessions.read().await;
            sessions.get(session_id).cloned().ok_or_else(|| {
                McpError::invalid_params(format!("Session not found: {}", session_id), None)
            })?
        };

        if !session.lock().await.client.is_running() {
            self.sessions.write().await.remove(session_id);
            warn!("Session {} dropped: GDB exited", session_id);
            return Err(McpError::invalid_params(
                format!("Session {} ended: GDB exited", session_id),
                None,
            ));
        }
        Ok(session)
    }

    async fn register_session(&self, initializer: SessionInitializer, client: GdbClient) -> String {
        let session_id = uuid::Uuid::new_v4().to_string();
        let mut sessions = self.sessions.write().await;
        sessions.insert(
            session_id.clone(),
            Arc::new(tokio::sync::Mutex::new(GdbSession { initializer, client })),
        );
        session_id
    }

    fn initializer(&self, work_dir: Option<&str>, include_inactive: bool) -> Result<SessionInitializer, McpError> {
        self.config
            .initializer(work_dir.map(Path::new), include_inactive)
            .map_err(init_error)
    }
}

impl Default for GdbBootToolHandler {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

fn init_error(e: InitError) -> McpError {
    match e {
        InitError::MissingConfiguration(_) => McpError::invalid_params(e.to_string(), None),
        other => McpError::internal_error(other.to_string(), None),
    }
}

fn json_result<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(value).map_err(|e| {
        McpError::internal_error(format!("Serialization error: {}", e), None)
    })?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

#[tool_router]
impl GdbBootToolHandler {
    // =========================================================================
    // Offline (2 tools)
    // =========================================================================

    #[tool(description = "Show the GDB commands a boot debug session would run (load OpenSBI firmware, add kernel symbols, set entry breakpoints) without starting GDB")]
    async fn plan_session(&self, Parameters(args): Parameters<PlanSessionArgs>) -> Result<CallToolResult, McpError> {
        let initializer = self.initializer(args.work_dir.as_deref(), args.include_inactive)?;
        let commands = initializer.plan();

        let result = PlanSessionResult {
            root: initializer.root().display().to_string(),
            script: commands.iter().map(ToString::to_string).collect(),
            commands,
        };
        json_result(&result)
    }

    #[tool(description = "Write the boot debug session commands to a GDB command file (load with `gdb -x <file>`)")]
    async fn write_init_script(&self, Parameters(args): Parameters<WriteInitScriptArgs>) -> Result<CallToolResult, McpError> {
        let initializer = self.initializer(args.work_dir.as_deref(), args.include_inactive)?;
        let script = render_script(&initializer.plan());

        tokio::fs::write(&args.output_path, &script).await.map_err(|e| {
            McpError::internal_error(format!("Failed to write {}: {}", args.output_path, e), None)
        })?;

        info!("Wrote GDB init script to {}", args.output_path);
        Ok(CallToolResult::success(vec![Content::text(format!(
            "Wrote {} ({} commands)\n\n{}",
            args.output_path,
            script.lines().count() - 1,
            script
        ))]))
    }

    // =========================================================================
    // Live sessions (4 tools)
    // =========================================================================

    #[tool(description = "Start GDB, load the firmware and kernel symbols and set the boot breakpoints. Returns session_id for use with other tools.")]
    async fn start_session(&self, Parameters(args): Parameters<StartSessionArgs>) -> Result<CallToolResult, McpError> {
        // resolved before GDB is spawned
        let initializer = self.initializer(args.work_dir.as_deref(), args.include_inactive)?;
        let gdb_path = self.config.find_gdb().map_err(|e| McpError::internal_error(e, None))?;
        let extra_args = args.extra_args.unwrap_or_default();

        let mut client = GdbClient::start(&gdb_path, &extra_args, self.config.command_timeout)
            .await
            .map_err(|e| McpError::internal_error(format!("GDB start failed: {}", e), None))?;

        let report = match initializer.initialize(&mut client).await {
            Ok(report) => report,
            Err(e) => {
                if let Err(shutdown_err) = client.shutdown().await {
                    warn!("Shutdown error (non-fatal): {}", shutdown_err);
                }
                return Err(init_error(e));
            }
        };

        let session_id = self.register_session(initializer, client).await;
        info!("Session {} created", session_id);
        json_result(&StartSessionResult { session_id, report })
    }

    #[tool(description = "Run a GDB CLI command in a session and return its console output")]
    async fn execute(&self, Parameters(args): Parameters<ExecuteArgs>) -> Result<CallToolResult, McpError> {
        let session = self.get_session(&args.session_id).await?;
        let mut session = session.lock().await;

        let output = session.client.console(&args.command).await.map_err(|e| {
            McpError::internal_error(format!("GDB command failed: {}", e), None)
        })?;

        Ok(CallToolResult::success(vec![Content::text(if output.is_empty() {
            format!("`{}` done (no output)", args.command)
        } else {
            output
        })]))
    }

    #[tool(description = "Re-run session initialization in a live session. GDB may keep duplicate breakpoints; the set of addresses stays the same.")]
    async fn reinitialize(&self, Parameters(args): Parameters<ReinitializeArgs>) -> Result<CallToolResult, McpError> {
        let session = self.get_session(&args.session_id).await?;
        let mut session = session.lock().await;
        let GdbSession { initializer, client } = &mut *session;

        let report = initializer.initialize(client).await.map_err(init_error)?;
        info!("Session {} reinitialized", args.session_id);
        json_result(&report)
    }

    #[tool(description = "Exit GDB and release session")]
    async fn end_session(&self, Parameters(args): Parameters<EndSessionArgs>) -> Result<CallToolResult, McpError> {
        let session = {
            let mut sessions = self.sessions.write().await;
            sessions.remove(&args.session_id)
        };

        match session {
            Some(session) => {
                let mut session = session.lock().await;
                if let Err(e) = session.client.shutdown().await {
                    warn!("Shutdown error (non-fatal): {}", e);
                }
                info!("Session {} ended", args.session_id);
                Ok(CallToolResult::success(vec![Content::text(format!(
                    "Session {} ended", args.session_id
                ))]))
            }
            None => Err(McpError::invalid_params(
                format!("Session not found: {}", args.session_id),
                None,
            )),
        }
    }
}

#[tool_handler]
impl ServerHandler for GdbBootToolHandler {}
