//! Point-to-point request/response exchange between nodes.

use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use prost::Message;
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::{
    error::TransportError,
    message::PaxosMessage,
    registry::Registry,
    types::NodeId,
};

/// Upper bound for a single frame. Messages are a handful of varints.
pub const MAX_FRAME_LENGTH: usize = 64 * 1024;

/// One blocking exchange with a peer, bounded by a timeout.
///
/// Failures are reported, never raised: callers treat any `Err` as "no response".
pub trait Transport: Send + Sync + 'static {
    /// Send `message` to `peer` and wait for its single reply.
    fn request(
        &self,
        peer: NodeId,
        message: PaxosMessage,
    ) -> impl Future<Output = Result<PaxosMessage, TransportError>> + Send;

    /// Deliver `message` to `peer` without waiting for a reply.
    fn notify(
        &self,
        peer: NodeId,
        message: PaxosMessage,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

pub(crate) fn frame_codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(MAX_FRAME_LENGTH)
        .new_codec()
}

pub(crate) fn encode_frame(message: &PaxosMessage) -> Bytes {
    Bytes::from(message.encode_to_vec())
}

/// TCP transport: one connection per exchange, one length-delimited protobuf frame each way.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    registry: Arc<Registry>,
    timeout: Duration,
}

impl TcpTransport {
    pub fn new(registry: Arc<Registry>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    fn resolve(&self, peer: NodeId) -> Result<SocketAddr, TransportError> {
        self.registry
            .address_of(peer)
            .ok_or(TransportError::UnknownPeer(peer))
    }

    async fn connect(
        addr: SocketAddr,
    ) -> Result<Framed<TcpStream, LengthDelimitedCodec>, TransportError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(TransportError::Unreachable)?;
        stream.set_nodelay(true).map_err(TransportError::Unreachable)?;
        Ok(Framed::new(stream, frame_codec()))
    }

    async fn exchange(
        addr: SocketAddr,
        message: PaxosMessage,
    ) -> Result<PaxosMessage, TransportError> {
        let mut framed = Self::connect(addr).await?;
        framed
            .send(encode_frame(&message))
            .await
            .map_err(TransportError::Codec)?;
        let frame = match framed.next().await {
            Some(Ok(frame)) => frame,
            Some(Err(err)) if is_disconnect(&err) => return Err(TransportError::Dropped),
            Some(Err(err)) => return Err(TransportError::Codec(err)),
            None => return Err(TransportError::Dropped),
        };
        Ok(PaxosMessage::decode(frame)?)
    }

    async fn deliver(addr: SocketAddr, message: PaxosMessage) -> Result<(), TransportError> {
        let mut framed = Self::connect(addr).await?;
        framed
            .send(encode_frame(&message))
            .await
            .map_err(TransportError::Codec)?;
        SinkExt::<Bytes>::close(&mut framed)
            .await
            .map_err(TransportError::Codec)
    }
}

fn is_disconnect(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::BrokenPipe
    )
}

impl Transport for TcpTransport {
    async fn request(
        &self,
        peer: NodeId,
        message: PaxosMessage,
    ) -> Result<PaxosMessage, TransportError> {
        let addr = self.resolve(peer)?;
        tokio::time::timeout(self.timeout, Self::exchange(addr, message))
            .await
            .map_err(|_| TransportError::Timeout(self.timeout))?
    }

    async fn notify(&self, peer: NodeId, message: PaxosMessage) -> Result<(), TransportError> {
        let addr = self.resolve(peer)?;
        tokio::time::timeout(self.timeout, Self::deliver(addr, message))
            .await
            .map_err(|_| TransportError::Timeout(self.timeout))?
    }
}
