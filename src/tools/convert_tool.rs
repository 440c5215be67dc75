use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;
use tracing::info;

use super::{failure, non_blank, parse_arguments};
use crate::mcp::types::{CallToolResult, ToolAnnotations, ToolDefinition};
use crate::pipeline::{ConversionRequest, Pipeline, PipelineError, UploadStage};

pub const CONVERT_TOOL_NAME: &str = "convert";
/// Name used by earlier releases; still accepted on `tools/call`.
pub const CONVERT_TOOL_ALIAS: &str = "pdf2png";

pub static CONVERT_TOOL_DEFINITION: Lazy<ToolDefinition> = Lazy::new(|| ToolDefinition {
    name: CONVERT_TOOL_NAME.to_string(),
    description: "Converts PDFs to images in PNG format, one file per page (page_1.png, page_2.png, ...). Accepts local file paths or remote URLs.".to_string(),
    input_schema: json!({
        "type": "object",
        "properties": {
            "read_file_path": {
                "type": "string",
                "description": "Local path or http(s) URL of the PDF to convert"
            },
            "write_folder_path": {
                "type": "string",
                "description": "Directory to write the PNG files into (created if absent)"
            }
        },
        "required": ["read_file_path", "write_folder_path"]
    }),
    annotations: Some(ToolAnnotations {
        title: Some("PDF to PNG".to_string()),
        read_only_hint: Some(false),
        destructive_hint: Some(false),
        idempotent_hint: Some(true),
        open_world_hint: Some(true),
    }),
});

#[derive(Debug, Deserialize)]
struct ConvertParams {
    read_file_path: Option<String>,
    write_folder_path: Option<String>,
}

impl ConvertParams {
    fn into_request(self) -> Result<ConversionRequest, PipelineError> {
        match (non_blank(self.read_file_path), non_blank(self.write_folder_path)) {
            (Some(source), Some(destination)) => Ok(ConversionRequest {
                source,
                destination: PathBuf::from(destination),
                upload: UploadStage::Skip,
            }),
            _ => Err(PipelineError::InvalidInput(
                "Missing 'read_file_path' or 'write_folder_path'".to_string(),
            )),
        }
    }
}

pub struct ConvertTool<'a> {
    pipeline: &'a Pipeline,
}

impl<'a> ConvertTool<'a> {
    pub fn new(pipeline: &'a Pipeline) -> Self {
        Self { pipeline }
    }

    pub async fn execute(&self, arguments: Option<serde_json::Value>) -> CallToolResult {
        let request = match parse_arguments::<ConvertParams>(arguments)
            .and_then(ConvertParams::into_request)
        {
            Ok(request) => request,
            Err(e) => return failure(CONVERT_TOOL_NAME, &e),
        };

        info!(
            "Converting {} into {}",
            request.source,
            request.destination.display()
        );

        match self.pipeline.run(request).await {
            Ok(result) => CallToolResult::success(result.message()),
            Err(e) => failure(CONVERT_TOOL_NAME, &e),
        }
    }
}
