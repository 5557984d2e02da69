//! Stdin forwarding for the wrapped process
//!
//! The wrapper queues lines onto a channel; a dedicated forwarder owns the
//! child's stdin, encodes each line with the configured input encoding, and
//! flushes per line. Closing the channel closes the child's stdin.

use async_channel::Receiver;
use futures::io::AsyncWriteExt;
use tracing::warn;

use crate::error::Result;
use crate::settings::Encoding;

pub(crate) struct StdinForwarder {
    stdin: async_process::ChildStdin,
    lines: Receiver<String>,
    encoding: Encoding,
}

impl StdinForwarder {
    pub fn new(
        stdin: async_process::ChildStdin,
        lines: Receiver<String>,
        encoding: Encoding,
    ) -> Self {
        Self {
            stdin,
            lines,
            encoding,
        }
    }

    /// Write one line plus terminator, flushing so the child sees it promptly
    async fn write_line(&mut self, line: &str) -> Result<()> {
        let mut bytes = self.encoding.encode(line);
        bytes.push(b'\n');
        self.stdin.write_all(&bytes).await?;
        self.stdin.flush().await?;
        Ok(())
    }

    /// Drain the channel until it closes, then drop stdin to close the pipe
    pub async fn run(mut self) {
        while let Ok(line) = self.lines.recv().await {
            if let Err(e) = self.write_line(&line).await {
                warn!(error = %e, "stdin write to child failed; stopping forwarder");
                break;
            }
        }
    }
}
