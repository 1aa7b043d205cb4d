//! TCP transports for both seams.
//!
//! * [`TcpRequestServer`] – every request and reply is one frame of a
//!   [`LengthDelimitedCodec`] stream, so a connection can carry any number of
//!   request/reply exchanges.  Connections are served concurrently.
//! * [`TcpPlatformClient`] – raw tagged frames over [`FrameCodec`]; the read
//!   and write halves are locked independently so a pending `receive` never
//!   delays a `send`.  A lost stream is re-dialled by the next `receive`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use station_protocol::{FrameCodec, Message};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::codec::{Framed, FramedRead, FramedWrite, LengthDelimitedCodec};
use tracing::{debug, info, warn};

use crate::client::{LinkError, PlatformClient};
use crate::server::{RequestHandler, RequestServer};
use crate::signal::ShutdownSignal;

// ---------------------------------------------------------------------------
// TcpRequestServer
// ---------------------------------------------------------------------------

/// Request listener over TCP.
pub struct TcpRequestServer {
    listener: TcpListener,
}

impl TcpRequestServer {
    /// Bind the listening socket.
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<Self, LinkError> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, LinkError> {
        Ok(self.listener.local_addr()?)
    }
}

#[async_trait]
impl RequestServer for TcpRequestServer {
    async fn serve(
        &self,
        handler: Arc<dyn RequestHandler>,
        mut shutdown: ShutdownSignal,
    ) -> Result<(), LinkError> {
        info!(addr = ?self.listener.local_addr().ok(), "request listener started");
        loop {
            tokio::select! {
                _ = shutdown.triggered() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let handler = Arc::clone(&handler);
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            if let Err(e) = serve_connection(stream, peer, handler, shutdown).await {
                                warn!(%peer, error = %e, "request connection failed");
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "accept failed"),
                },
            }
        }
        info!("request listener stopped");
        Ok(())
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    handler: Arc<dyn RequestHandler>,
    mut shutdown: ShutdownSignal,
) -> Result<(), LinkError> {
    debug!(%peer, "client connected");
    let mut framed = Framed::new(stream, LengthDelimitedCodec::new());
    loop {
        tokio::select! {
            _ = shutdown.triggered() => break,
            request = framed.next() => match request {
                Some(Ok(request)) => {
                    let reply = handler.handle(&request).await;
                    framed.send(Bytes::from(reply)).await?;
                }
                Some(Err(e)) => return Err(e.into()),
                None => break,
            },
        }
    }
    debug!(%peer, "client disconnected");
    Ok(())
}

// ---------------------------------------------------------------------------
// TcpPlatformClient
// ---------------------------------------------------------------------------

/// Platform link over a TCP stream carrying raw tagged frames.
///
/// The stream is dialled lazily by `receive` and re-dialled after the peer
/// goes away, so the station survives a platform restart.  `send` never
/// dials; with no stream it fails with [`LinkError::Closed`].
pub struct TcpPlatformClient {
    addr: String,
    reader: Mutex<Option<PlatformReader>>,
    writer: Mutex<Option<PlatformWriter>>,
}

type PlatformReader = FramedRead<OwnedReadHalf, FrameCodec>;
type PlatformWriter = FramedWrite<OwnedWriteHalf, FrameCodec>;

impl TcpPlatformClient {
    /// A client for the platform at `addr`, not yet connected.
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            reader: Mutex::new(None),
            writer: Mutex::new(None),
        }
    }

    /// Connect to the platform at `addr` before returning.
    pub async fn connect(addr: impl Into<String>) -> Result<Self, LinkError> {
        let client = Self::new(addr);
        let stream = TcpStream::connect(client.addr.as_str()).await?;
        let reader = client.install(stream).await?;
        *client.reader.lock().await = Some(reader);
        Ok(client)
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Dial `addr` before `deadline`.  The new write half replaces whatever
    /// the writer held; the read half is returned to the caller, which owns
    /// the reader lock.
    async fn dial(&self, deadline: Instant) -> Result<PlatformReader, LinkError> {
        match tokio::time::timeout_at(deadline, TcpStream::connect(self.addr.as_str())).await {
            Ok(Ok(stream)) => self.install(stream).await,
            Ok(Err(e)) => {
                debug!(addr = %self.addr, error = %e, "platform dial failed");
                Err(LinkError::Closed)
            }
            Err(_) => {
                debug!(addr = %self.addr, "platform dial timed out");
                Err(LinkError::Closed)
            }
        }
    }

    async fn install(&self, stream: TcpStream) -> Result<PlatformReader, LinkError> {
        let peer = stream.peer_addr()?;
        stream.set_nodelay(true)?;
        let (read, write) = stream.into_split();
        *self.writer.lock().await = Some(FramedWrite::new(write, FrameCodec::new()));
        info!(%peer, "platform link connected");
        Ok(FramedRead::new(read, FrameCodec::new()))
    }
}

#[async_trait]
impl PlatformClient for TcpPlatformClient {
    async fn send(&self, message: Message) -> Result<(), LinkError> {
        let mut writer = self.writer.lock().await;
        let sink = writer.as_mut().ok_or(LinkError::Closed)?;
        if let Err(e) = sink.send(message).await {
            *writer = None;
            return Err(e.into());
        }
        Ok(())
    }

    async fn receive(&self, timeout: Duration) -> Result<Message, LinkError> {
        let deadline = Instant::now() + timeout;
        // Lock order: reader, then writer.
        let mut reader = self.reader.lock().await;
        let mut dialled = false;
        loop {
            // A failed send leaves the read half orphaned; start over.
            if reader.is_none() || self.writer.lock().await.is_none() {
                if dialled {
                    return Err(LinkError::Closed);
                }
                *reader = Some(self.dial(deadline).await?);
                dialled = true;
            }
            let Some(stream) = reader.as_mut() else {
                return Err(LinkError::Closed);
            };

            let failure = match tokio::time::timeout_at(deadline, stream.next()).await {
                Err(_) => return Err(LinkError::Timeout(timeout)),
                Ok(Some(Ok(frame))) => return Ok(frame?),
                Ok(None) => LinkError::Closed,
                Ok(Some(Err(e))) => LinkError::Io(e),
            };
            warn!(addr = %self.addr, error = %failure, "platform link lost");
            *reader = None;
            *self.writer.lock().await = None;
            if dialled {
                return Err(failure);
            }
        }
    }
}
