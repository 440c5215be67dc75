use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;
use tracing::info;

use super::{failure, non_blank, parse_arguments};
use crate::mcp::types::{CallToolResult, ToolAnnotations, ToolDefinition};
use crate::pipeline::{
    ConversionRequest, Credentials, Pipeline, PipelineError, UploadStage, UploadTarget,
};

pub const CONVERT_UPLOAD_TOOL_NAME: &str = "convert_and_upload";
/// Name used by earlier releases; still accepted on `tools/call`.
pub const CONVERT_UPLOAD_TOOL_ALIAS: &str = "pdf2png_upload";

pub static CONVERT_UPLOAD_TOOL_DEFINITION: Lazy<ToolDefinition> = Lazy::new(|| ToolDefinition {
    name: CONVERT_UPLOAD_TOOL_NAME.to_string(),
    description: "Converts PDF to PNG images, uploads them via POST (multipart/form-data, field 'file') to a URL with optional Basic Auth, then deletes the local files. Accepts local paths or URLs.".to_string(),
    input_schema: json!({
        "type": "object",
        "properties": {
            "read_file_path": {
                "type": "string",
                "description": "Local path or http(s) URL of the PDF to convert"
            },
            "upload_url": {
                "type": "string",
                "format": "uri",
                "description": "Endpoint that receives one POST per page"
            },
            "write_folder_path": {
                "type": "string",
                "description": "Directory for the intermediate PNG files (created if absent)"
            },
            "auth_username": {
                "type": "string",
                "nullable": true,
                "description": "Basic Auth username (used only together with auth_password)"
            },
            "auth_password": {
                "type": "string",
                "nullable": true,
                "description": "Basic Auth password (used only together with auth_username)"
            }
        },
        "required": ["read_file_path", "upload_url", "write_folder_path"]
    }),
    annotations: Some(ToolAnnotations {
        title: Some("PDF to PNG with upload".to_string()),
        read_only_hint: Some(false),
        destructive_hint: Some(true),
        idempotent_hint: Some(false),
        open_world_hint: Some(true),
    }),
});

#[derive(Debug, Deserialize)]
struct ConvertUploadParams {
    read_file_path: Option<String>,
    upload_url: Option<String>,
    write_folder_path: Option<String>,
    auth_username: Option<String>,
    auth_password: Option<String>,
}

impl ConvertUploadParams {
    fn into_request(self) -> Result<ConversionRequest, PipelineError> {
        let (source, url, destination) = match (
            non_blank(self.read_file_path),
            non_blank(self.upload_url),
            non_blank(self.write_folder_path),
        ) {
            (Some(source), Some(url), Some(destination)) => (source, url, destination),
            _ => {
                return Err(PipelineError::InvalidInput(
                    "Missing required fields: 'read_file_path', 'upload_url', or 'write_folder_path'"
                        .to_string(),
                ))
            }
        };

        match url::Url::parse(&url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            Ok(parsed) => {
                return Err(PipelineError::InvalidInput(format!(
                    "Unsupported upload URL scheme '{}'",
                    parsed.scheme()
                )))
            }
            Err(e) => {
                return Err(PipelineError::InvalidInput(format!(
                    "Invalid upload URL: {}",
                    e
                )))
            }
        }

        Ok(ConversionRequest {
            source,
            destination: PathBuf::from(destination),
            upload: UploadStage::Upload(UploadTarget {
                url,
                credentials: Credentials::from_parts(self.auth_username, self.auth_password),
            }),
        })
    }
}

pub struct ConvertUploadTool<'a> {
    pipeline: &'a Pipeline,
}

impl<'a> ConvertUploadTool<'a> {
    pub fn new(pipeline: &'a Pipeline) -> Self {
        Self { pipeline }
    }

    pub async fn execute(&self, arguments: Option<serde_json::Value>) -> CallToolResult {
        let request = match parse_arguments::<ConvertUploadParams>(arguments)
            .and_then(ConvertUploadParams::into_request)
        {
            Ok(request) => request,
            Err(e) => return failure(CONVERT_UPLOAD_TOOL_NAME, &e),
        };

        if let UploadStage::Upload(target) = &request.upload {
            info!(
                "Converting {} and uploading pages to {} ({})",
                request.source,
                target.url,
                if target.credentials.is_some() {
                    "Basic Auth"
                } else {
                    "no auth"
                }
            );
        }

        match self.pipeline.run(request).await {
            Ok(result) => CallToolResult::success(result.message()),
            Err(e) => failure(CONVERT_UPLOAD_TOOL_NAME, &e),
        }
    }
}
