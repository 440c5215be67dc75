pub mod convert_tool;
pub mod convert_upload_tool;

use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::error;

use crate::mcp::types::CallToolResult;
use crate::pipeline::error::build_error_payload;
use crate::pipeline::PipelineError;

/// Deserializes tool arguments. An absent or empty mapping is rejected
/// before field-level checks.
pub(crate) fn parse_arguments<T: DeserializeOwned>(
    arguments: Option<serde_json::Value>,
) -> Result<T, PipelineError> {
    let args = match arguments {
        Some(serde_json::Value::Object(map)) if !map.is_empty() => serde_json::Value::Object(map),
        Some(serde_json::Value::Object(_)) | Some(serde_json::Value::Null) | None => {
            return Err(PipelineError::InvalidInput("Missing arguments".to_string()));
        }
        Some(_) => {
            return Err(PipelineError::InvalidInput(
                "Arguments must be an object".to_string(),
            ));
        }
    };

    serde_json::from_value::<T>(args)
        .map_err(|e| PipelineError::InvalidInput(format!("Invalid parameters: {}", e)))
}

/// Drops blank strings so they count as missing.
pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

pub(crate) fn failure(tool: &str, err: &PipelineError) -> CallToolResult {
    error!("Tool '{}' failed: {}", tool, err);
    CallToolResult::error(err.to_payload(json!({ "tool": tool })))
}

pub(crate) fn unknown_tool(name: &str) -> CallToolResult {
    CallToolResult::error(build_error_payload(
        "ERR_UNKNOWN_TOOL",
        &format!("Unknown tool: {}", name),
        json!({ "tool": name }),
    ))
}
