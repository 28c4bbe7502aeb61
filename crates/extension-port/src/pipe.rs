//! Raw bidirectional message pipes.
//!
//! A pipe moves JSON arrays in both directions and knows nothing about
//! names, ids or handlers. Two flavours exist:
//!
//! - `Pipe::pair()`: two in-memory ends wired to each other
//! - `Pipe::from_stream()`: NDJSON over any byte stream (Unix socket, stdio)

use serde_json::Value;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Longest line a stream pipe accepts.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// One end of a raw message pipe.
pub struct Pipe {
    pub(crate) outbound: mpsc::UnboundedSender<Value>,
    pub(crate) inbound: mpsc::UnboundedReceiver<Value>,
}

impl Pipe {
    /// Build a pipe from an outbound sender and an inbound receiver.
    pub fn from_parts(
        outbound: mpsc::UnboundedSender<Value>,
        inbound: mpsc::UnboundedReceiver<Value>,
    ) -> Self {
        Self { outbound, inbound }
    }

    /// Two connected in-memory ends.
    pub fn pair() -> (Pipe, Pipe) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (
            Pipe {
                outbound: a_tx,
                inbound: b_rx,
            },
            Pipe {
                outbound: b_tx,
                inbound: a_rx,
            },
        )
    }

    /// Wrap a byte stream, one JSON array per line.
    ///
    /// Spawns a reader task and a writer task. The inbound side ends when
    /// the peer closes the stream, when a line exceeds `MAX_LINE_BYTES`, or
    /// when a write fails. A line that is not JSON is passed on as a string
    /// so the channel reports it as malformed.
    pub fn from_stream<S>(stream: S) -> Pipe
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, mut writer) = tokio::io::split(stream);
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<Value>();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Value>();

        let reading = tokio::spawn(async move {
            let mut reader = BufReader::new(reader);
            let mut line = String::new();

            loop {
                line.clear();
                let read = (&mut reader)
                    .take(MAX_LINE_BYTES as u64 + 1)
                    .read_line(&mut line)
                    .await;
                match read {
                    Ok(0) => {
                        debug!("Peer closed stream");
                        break;
                    }
                    Ok(n) if n > MAX_LINE_BYTES => {
                        warn!(limit = MAX_LINE_BYTES, "Line too long, closing stream");
                        break;
                    }
                    Ok(_) => {
                        let trimmed = line.trim();
                        if trimmed.is_empty() {
                            continue;
                        }
                        let value = match serde_json::from_str::<Value>(trimmed) {
                            Ok(value) => value,
                            Err(e) => {
                                warn!(error = %e, "Failed to parse line");
                                Value::String(trimmed.to_string())
                            }
                        };
                        if inbound_tx.send(value).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!(error = %e, "Read error on stream");
                        break;
                    }
                }
            }
        });

        tokio::spawn(async move {
            while let Some(value) = outbound_rx.recv().await {
                let json = match serde_json::to_string(&value) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!(error = %e, "Failed to serialize message");
                        continue;
                    }
                };
                if writer.write_all(json.as_bytes()).await.is_err()
                    || writer.write_all(b"\n").await.is_err()
                    || writer.flush().await.is_err()
                {
                    debug!("Failed to write message, peer disconnected");
                    // Ends the inbound side too, so the channel closes.
                    reading.abort();
                    break;
                }
            }
            let _ = writer.shutdown().await;
        });

        Pipe {
            outbound: outbound_tx,
            inbound: inbound_rx,
        }
    }
}
