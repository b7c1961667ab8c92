//! Socket and framing collaborator.
//!
//! One transport per connection attempt. The connected socket is split into
//! a writer task draining an unbounded queue and a reader task that forwards
//! parsed frames into the foreground event channel. `send` is synchronous:
//! it validates the frame (the relay's 2048-byte cap, no embedded CR/LF)
//! before queueing, so protocol violations surface to the immediate caller
//! instead of dying silently in the writer.

use crate::error::SendError;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use stray_proto::{line, LineCodec, Message, ProtocolError, RELAY_MAX_LINE};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig as TlsClientConfig, RootCertStore};
use tokio_util::codec::Framed;
use tracing::{debug, warn};

/// Inbound notifications delivered to the foreground loop.
#[derive(Debug)]
pub enum TransportEvent {
    /// A parsed inbound frame.
    Message(Message),
    /// The connection died. Tagged with the transport's generation so a
    /// late notification from a replaced connection can be told apart from
    /// the live one.
    Disconnected { generation: u64, reason: String },
}

/// Handle to one live connection.
pub struct Transport {
    tx: mpsc::UnboundedSender<String>,
    generation: u64,
}

impl Transport {
    /// Open a connection and spawn its reader/writer tasks.
    pub async fn connect(
        host: &str,
        port: u16,
        tls: bool,
        generation: u64,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Transport, ProtocolError> {
        let stream = TcpStream::connect((host, port)).await?;
        let (tx, rx) = mpsc::unbounded_channel();

        if tls {
            let connector = tls_connector()?;
            let server_name = ServerName::try_from(host.to_string()).map_err(|_| {
                ProtocolError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("invalid TLS server name: {host}"),
                ))
            })?;
            let stream = connector.connect(server_name, stream).await?;
            spawn_io(
                Framed::new(stream, LineCodec::with_max_len(RELAY_MAX_LINE)),
                rx,
                events,
                generation,
            );
        } else {
            spawn_io(
                Framed::new(stream, LineCodec::with_max_len(RELAY_MAX_LINE)),
                rx,
                events,
                generation,
            );
        }

        Ok(Transport { tx, generation })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Frame and queue a message.
    ///
    /// Validation happens here, synchronously: an oversized or
    /// CR/LF-injected line is a caller bug and is never retried.
    pub fn send(&self, message: &Message) -> Result<(), SendError> {
        let frame = message.to_string();
        line::validate_outbound(&frame, RELAY_MAX_LINE)?;
        self.tx
            .send(frame)
            .map_err(|_| SendError::TransportClosed)
    }
}

/// Build the TLS connector from the platform trust store.
fn tls_connector() -> Result<TlsConnector, ProtocolError> {
    let loaded = rustls_native_certs::load_native_certs();
    if !loaded.errors.is_empty() {
        warn!(errors = loaded.errors.len(), "some native certificates failed to load");
    }

    let mut roots = RootCertStore::empty();
    let (added, _ignored) = roots.add_parsable_certificates(loaded.certs);
    debug!(certs = added, "native root certificates loaded");

    let config = TlsClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(TlsConnector::from(Arc::new(config)))
}

/// Split the framed stream into writer and reader tasks.
fn spawn_io<S>(
    framed: Framed<S, LineCodec>,
    mut rx: mpsc::UnboundedReceiver<String>,
    events: mpsc::Sender<TransportEvent>,
    generation: u64,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sink, mut stream) = framed.split();

    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if let Err(e) = sink.send(frame).await {
                warn!(error = %e, "transport write failed");
                break;
            }
        }
        let _ = sink.close().await;
    });

    tokio::spawn(async move {
        let reason = loop {
            match stream.next().await {
                Some(Ok(frame)) => {
                    if frame.is_empty() {
                        continue;
                    }
                    match frame.parse::<Message>() {
                        Ok(message) => {
                            if events.send(TransportEvent::Message(message)).await.is_err() {
                                // Foreground loop is gone; nothing left to notify.
                                return;
                            }
                        }
                        Err(e) => {
                            debug!(error = %e, frame = %frame, "ignoring unparseable frame");
                        }
                    }
                }
                Some(Err(e)) => break e.to_string(),
                None => break "connection closed by peer".to_string(),
            }
        };
        let _ = events
            .send(TransportEvent::Disconnected { generation, reason })
            .await;
    });
}
