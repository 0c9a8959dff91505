//! Newline-framed sessions
//!
//! The transport seam of the engine. A [`Session`] is one established,
//! line-framed byte pipe: outbound frames go through an unbounded channel
//! drained by a writer task (fire-and-forget, nothing in the engine blocks
//! on I/O), inbound lines arrive as raw bytes with the framing newline
//! stripped. Dropping every handle to a session tears both tasks down and
//! closes the underlying stream; that is the "stop" operation.
//!
//! [`TcpTransport`] is the production implementation. Tests drive the same
//! engine over in-memory duplex pipes through the [`Transport`] trait.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::debug;

use volley_core::{Result, VolleyError};

/// Sending half of a session, cheap to clone and hold behind a lock.
#[derive(Clone, Debug)]
pub struct SessionSender {
    tx: mpsc::UnboundedSender<String>,
}

impl SessionSender {
    /// Queue one frame for transmission. The writer task appends the
    /// framing newline.
    pub fn send(&self, frame: String) -> Result<()> {
        self.tx.send(frame).map_err(|_| VolleyError::SessionClosed)
    }
}

/// One established, line-framed session.
pub struct Session {
    sender: SessionSender,
    inbound: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl Session {
    /// Frame a raw byte stream into a session, spawning its reader and
    /// writer tasks on the current runtime.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, mut write_half) = tokio::io::split(stream);
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<Vec<u8>>();

        // writer: drains the outbound queue until every sender is gone
        tokio::spawn(async move {
            while let Some(mut frame) = out_rx.recv().await {
                frame.push('\n');
                if let Err(e) = write_half.write_all(frame.as_bytes()).await {
                    debug!("session write failed: {}", e);
                    break;
                }
            }
        });

        // reader: delivers one frame per line until EOF or error
        tokio::spawn(async move {
            let mut reader = BufReader::new(read_half);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf).await {
                    Ok(0) => break,
                    Ok(_) => {
                        while matches!(buf.last(), Some(b'\n') | Some(b'\r')) {
                            buf.pop();
                        }
                        if in_tx.send(buf.clone()).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!("session read failed: {}", e);
                        break;
                    }
                }
            }
        });

        Self {
            sender: SessionSender { tx: out_tx },
            inbound: in_rx,
        }
    }

    /// Clonable sending half.
    pub fn sender(&self) -> SessionSender {
        self.sender.clone()
    }

    /// Next inbound frame; `None` once the transport has closed.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.inbound.recv().await
    }
}

/// Session factory seam so the driver can run against fakes in tests.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish one session to `addr`.
    async fn connect(&self, addr: &str) -> Result<Session>;
}

/// Production transport: plain TCP with Nagle disabled.
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpTransport;

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&self, addr: &str) -> Result<Session> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| VolleyError::ConnectionFailed(format!("{addr}: {e}")))?;
        stream
            .set_nodelay(true)
            .map_err(|e| VolleyError::ConnectionFailed(format!("{addr}: {e}")))?;
        Ok(Session::from_stream(stream))
    }
}
