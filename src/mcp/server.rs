use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::transport::StdioTransport;
use super::types::*;
use crate::pipeline::Pipeline;
use crate::tools::{
    convert_tool::{
        ConvertTool, CONVERT_TOOL_ALIAS, CONVERT_TOOL_DEFINITION, CONVERT_TOOL_NAME,
    },
    convert_upload_tool::{
        ConvertUploadTool, CONVERT_UPLOAD_TOOL_ALIAS, CONVERT_UPLOAD_TOOL_DEFINITION,
        CONVERT_UPLOAD_TOOL_NAME,
    },
    unknown_tool,
};

/// Long-lived state shared by every request handler.
pub struct ServerContext {
    pub pipeline: Pipeline,
}

impl ServerContext {
    pub fn new(pipeline: Pipeline) -> Self {
        Self { pipeline }
    }
}

pub struct McpServer {
    context: Arc<ServerContext>,
    initialized: bool,
}

impl McpServer {
    pub fn new(context: ServerContext) -> Self {
        Self {
            context: Arc::new(context),
            initialized: false,
        }
    }

    /// Serves stdio until the client disconnects.
    ///
    /// `tools/call` requests run as separate tasks so that a slow download or
    /// upload does not hold up other requests. All responses go through one
    /// writer task.
    pub async fn start(&mut self) -> Result<()> {
        info!("MCP server started and listening on stdio");

        let (mut reader, mut writer) = StdioTransport::new().into_split();
        let (tx, mut rx) = mpsc::unbounded_channel::<McpResponse>();

        let writer_task = tokio::spawn(async move {
            while let Some(response) = rx.recv().await {
                if let Err(e) = writer.write_response(response).await {
                    error!("Failed to write response: {}", e);
                    break;
                }
            }
        });

        loop {
            match reader.read_message().await? {
                Some(McpMessage::Request(request)) if request.method == "tools/call" => {
                    if !self.initialized {
                        debug!("tools/call received before initialization completed");
                    }
                    let context = Arc::clone(&self.context);
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        let response = Self::handle_call_tool(&context, request).await;
                        if tx.send(response).is_err() {
                            warn!("Response dropped: writer has shut down");
                        }
                    });
                }
                Some(McpMessage::Request(request)) => {
                    let response = self.handle_request(request).await;
                    if tx.send(response).is_err() {
                        break;
                    }
                }
                Some(McpMessage::Notification(notification)) => {
                    self.handle_notification(notification).await;
                }
                None => {
                    info!("Client disconnected");
                    break;
                }
            }
        }

        // In-flight tool calls hold their own senders; the writer drains
        // until the last one finishes.
        drop(tx);
        if let Err(e) = writer_task.await {
            error!("Writer task failed: {}", e);
        }

        Ok(())
    }

    async fn handle_request(&mut self, request: McpRequest) -> McpResponse {
        match request.method.as_str() {
            "initialize" => self.handle_initialize(request).await,
            "tools/list" => self.handle_list_tools(request).await,
            "tools/call" => Self::handle_call_tool(&self.context, request).await,
            "ping" => self.handle_ping(request).await,
            _ => McpResponse::error(
                Self::ensure_valid_id(request.id),
                METHOD_NOT_FOUND,
                "Method not found",
            ),
        }
    }

    async fn handle_notification(&mut self, notification: McpNotification) {
        debug!("Received notification: {}", notification.method);

        match notification.method.as_str() {
            "notifications/initialized" => {
                info!("Client initialization completed");
                self.initialized = true;
            }
            "notifications/cancelled" => {
                debug!("Request cancelled notification received");
            }
            _ => {
                warn!("Unknown notification method: {}", notification.method);
            }
        }
    }

    fn ensure_valid_id(id: Option<serde_json::Value>) -> serde_json::Value {
        match id {
            Some(serde_json::Value::Null) | None => serde_json::Value::String("0".to_string()),
            Some(value) => value,
        }
    }

    async fn handle_initialize(&mut self, request: McpRequest) -> McpResponse {
        let id = Self::ensure_valid_id(request.id);

        let Some(params) = request.params else {
            return McpResponse::error(id, INVALID_PARAMS, "Missing params");
        };

        match serde_json::from_value::<InitializeParams>(params) {
            Ok(init_params) => {
                info!(
                    "Initializing for client {} {} (protocol {})",
                    init_params.client_info.name,
                    init_params.client_info.version,
                    init_params.protocol_version
                );
                let result = InitializeResult {
                    protocol_version: PROTOCOL_VERSION.to_string(),
                    server_info: ServerInfo {
                        name: "PDF to PNG MCP".to_string(),
                        version: env!("CARGO_PKG_VERSION").to_string(),
                        description: Some(
                            "A Model Context Protocol server that converts PDF pages to PNG images and optionally uploads them".to_string(),
                        ),
                    },
                    capabilities: ServerCapabilities {
                        tools: Some(ToolsCapability {
                            list_changed: Some(false),
                        }),
                        logging: Some(serde_json::json!({})),
                    },
                };
                McpResponse::result(id, result)
            }
            Err(e) => McpResponse::error(id, INVALID_PARAMS, format!("Invalid params: {}", e)),
        }
    }

    async fn handle_list_tools(&self, request: McpRequest) -> McpResponse {
        let result = ListToolsResult {
            tools: vec![
                CONVERT_TOOL_DEFINITION.clone(),
                CONVERT_UPLOAD_TOOL_DEFINITION.clone(),
            ],
        };

        McpResponse::result(Self::ensure_valid_id(request.id), result)
    }

    async fn handle_call_tool(context: &ServerContext, request: McpRequest) -> McpResponse {
        let id = Self::ensure_valid_id(request.id);

        let Some(params) = request.params else {
            return McpResponse::error(id, INVALID_PARAMS, "Missing params");
        };

        match serde_json::from_value::<CallToolParams>(params) {
            Ok(call_params) => {
                let name = call_params.name.clone();
                let result = Self::execute_tool(context, call_params).await;
                debug!(tool = %name, is_error = result.is_error(), "Tool call finished: {}", result.text());
                McpResponse::result(id, result)
            }
            Err(e) => McpResponse::error(id, INVALID_PARAMS, format!("Invalid params: {}", e)),
        }
    }

    async fn handle_ping(&self, request: McpRequest) -> McpResponse {
        McpResponse::result(Self::ensure_valid_id(request.id), serde_json::json!({}))
    }

    async fn execute_tool(context: &ServerContext, params: CallToolParams) -> CallToolResult {
        match params.name.as_str() {
            CONVERT_TOOL_NAME | CONVERT_TOOL_ALIAS => {
                let tool = ConvertTool::new(&context.pipeline);
                tool.execute(params.arguments).await
            }
            CONVERT_UPLOAD_TOOL_NAME | CONVERT_UPLOAD_TOOL_ALIAS => {
                let tool = ConvertUploadTool::new(&context.pipeline);
                tool.execute(params.arguments).await
            }
            _ => {
                warn!("Unknown tool requested: {}", params.name);
                unknown_tool(&params.name)
            }
        }
    }
}
