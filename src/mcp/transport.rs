use anyhow::Result;
use futures::{SinkExt, StreamExt};
use tokio::io::{BufReader, Stdin, Stdout};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tracing::{debug, error, warn};

use super::types::{McpMessage, McpNotification, McpRequest, McpResponse};

/// Newline-delimited JSON-RPC over stdio.
///
/// Split into halves so that responses from long-running tool calls can be
/// written while the reader keeps accepting new requests.
pub struct StdioTransport {
    reader: MessageReader,
    writer: MessageWriter,
}

pub struct MessageReader {
    inner: FramedRead<BufReader<Stdin>, LinesCodec>,
}

pub struct MessageWriter {
    inner: FramedWrite<Stdout, LinesCodec>,
}

impl StdioTransport {
    pub fn new() -> Self {
        let reader = MessageReader {
            inner: FramedRead::new(BufReader::new(tokio::io::stdin()), LinesCodec::new()),
        };
        let writer = MessageWriter {
            inner: FramedWrite::new(tokio::io::stdout(), LinesCodec::new()),
        };

        Self { reader, writer }
    }

    pub fn into_split(self) -> (MessageReader, MessageWriter) {
        (self.reader, self.writer)
    }
}

impl MessageReader {
    /// Returns `Ok(None)` on EOF. Malformed lines are logged and skipped.
    pub async fn read_message(&mut self) -> Result<Option<McpMessage>> {
        loop {
            match self.inner.next().await {
                Some(Ok(line)) => {
                    debug!("Received: {}", line);
                    if line.trim().is_empty() {
                        continue;
                    }
                    match parse_message(&line) {
                        Ok(message) => return Ok(Some(message)),
                        Err(e) => warn!("Skipping malformed message: {}", e),
                    }
                }
                Some(Err(e)) => {
                    error!("Error reading from stdin: {}", e);
                    return Err(anyhow::anyhow!("Transport error: {}", e));
                }
                None => {
                    debug!("EOF reached");
                    return Ok(None);
                }
            }
        }
    }
}

impl MessageWriter {
    pub async fn write_response(&mut self, response: McpResponse) -> Result<()> {
        let json = serde_json::to_string(&response)?;
        debug!("Sending: {}", json);

        self.inner.send(json).await?;

        Ok(())
    }
}

/// A message with an `id` is a request; one without is a notification.
pub fn parse_message(line: &str) -> Result<McpMessage> {
    let value: serde_json::Value =
        serde_json::from_str(line).map_err(|e| anyhow::anyhow!("Invalid JSON: {}", e))?;

    let Some(obj) = value.as_object() else {
        return Err(anyhow::anyhow!("Invalid JSON-RPC message structure"));
    };

    if obj.contains_key("id") {
        serde_json::from_value::<McpRequest>(value)
            .map(McpMessage::Request)
            .map_err(|e| anyhow::anyhow!("Invalid JSON-RPC request: {}", e))
    } else {
        serde_json::from_value::<McpNotification>(value)
            .map(McpMessage::Notification)
            .map_err(|e| anyhow::anyhow!("Invalid JSON-RPC notification: {}", e))
    }
}
