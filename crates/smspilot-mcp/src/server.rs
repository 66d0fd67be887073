use serde_json::{json, Value};
use smspilot_core::protocol::{
    CallToolResult, JsonRpcError, JsonRpcRequest, JsonRpcResponse, ListToolsResult,
    INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, JSONRPC_VERSION, MCP_PROTOCOL_VERSION, METHOD_NOT_FOUND,
};
use smspilot_core::redact::redact_secrets;
use smspilot_core::tools::{ToolError, ToolRegistry};
use tracing::{info, warn};

pub struct McpServer {
    registry: ToolRegistry,
}

impl McpServer {
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }

    /// Handle one request. Notifications get no response.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        if request.jsonrpc != JSONRPC_VERSION {
            return Some(JsonRpcResponse::failure(
                request.id,
                JsonRpcError::new(INVALID_REQUEST, "jsonrpc must be \"2.0\""),
            ));
        }

        let result = match request.method.as_str() {
            "initialize" => Ok(self.initialize()),
            "ping" => Ok(json!({})),
            "tools/list" => self.list_tools(),
            "tools/call" => self.call_tool(request.params).await,
            method if request.id.is_none() => {
                info!("notification {}", method);
                return None;
            }
            method => Err(JsonRpcError::new(
                METHOD_NOT_FOUND,
                format!("Method {} not found", method),
            )),
        };

        // a request without id is a notification even when the method is known
        let id = request.id?;
        Some(match result {
            Ok(value) => JsonRpcResponse::success(Some(id), value),
            Err(e) => JsonRpcResponse::failure(Some(id), e),
        })
    }

    fn initialize(&self) -> Value {
        json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": { "tools": {} },
            "serverInfo": {
                "name": "smspilot-mcp",
                "version": env!("CARGO_PKG_VERSION")
            }
        })
    }

    fn list_tools(&self) -> Result<Value, JsonRpcError> {
        let result = ListToolsResult {
            tools: self.registry.list_tools(),
        };
        serde_json::to_value(result)
            .map_err(|e| JsonRpcError::new(INTERNAL_ERROR, e.to_string()))
    }

    async fn call_tool(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params = params.ok_or_else(|| JsonRpcError::new(INVALID_PARAMS, "Missing params"))?;
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| JsonRpcError::new(INVALID_PARAMS, "Missing tool name"))?;
        let args = params.get("arguments").cloned().unwrap_or_else(|| json!({}));

        let tool = self
            .registry
            .get(name)
            .ok_or_else(|| JsonRpcError::new(METHOD_NOT_FOUND, format!("Tool {} not found", name)))?;

        info!("Executing tool {}", name);
        let result = match tool.execute(args).await {
            Ok(value) => CallToolResult::structured(value),
            Err(ToolError::InvalidArguments(msg)) => {
                return Err(JsonRpcError::new(INVALID_PARAMS, msg));
            }
            Err(e) => {
                let message = redact_secrets(&e.to_string());
                warn!("Tool {} failed: {}", name, message);
                CallToolResult::error(message)
            }
        };

        serde_json::to_value(result)
            .map_err(|e| JsonRpcError::new(INTERNAL_ERROR, e.to_string()))
    }
}
