use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{TransportAdapter, TransportKind};
use crate::mcp::{McpServer, SessionMode};

type BoxedReader = Box<dyn AsyncBufRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// One persistent session over a line-oriented pipe. Each line carries one
/// JSON-RPC message or batch; each answer is written as one line.
pub struct PipeTransport {
    reader: BoxedReader,
    writer: BoxedWriter,
}

impl PipeTransport {
    pub fn new(
        reader: impl AsyncBufRead + Send + Unpin + 'static,
        writer: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
        }
    }

    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

#[async_trait]
impl TransportAdapter for PipeTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Stdio
    }

    async fn serve(self: Box<Self>, core: Arc<McpServer>, shutdown: CancellationToken) -> Result<()> {
        let PipeTransport { reader, mut writer } = *self;
        let mut lines = reader.lines();
        let mut session = core.open_session(SessionMode::Persistent);
        info!("MCP session open on stdio");

        loop {
            let line = tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("Shutdown requested, closing stdio session");
                    break;
                }
                line = lines.next_line() => line.context("Failed to read from input pipe")?,
            };
            let Some(line) = line else {
                info!("Input pipe closed");
                break;
            };
            if line.trim().is_empty() {
                continue;
            }

            if let Some(payload) = session.handle_message(&line).await {
                let mut out =
                    serde_json::to_string(&payload).context("Failed to serialize response")?;
                out.push('\n');
                writer
                    .write_all(out.as_bytes())
                    .await
                    .context("Failed to write to output pipe")?;
                writer.flush().await.context("Failed to flush output pipe")?;
            }

            if session.is_closed() {
                info!("Client ended the session");
                break;
            }
        }

        Ok(())
    }
}
