//! Inbound side of a node: accepts connections and answers one request per connection.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use futures::{SinkExt, StreamExt};
use prost::Message;
use tokio::{
    net::{TcpListener, TcpStream},
    task::JoinHandle,
};
use tokio_util::{codec::Framed, sync::CancellationToken};
use tracing::{debug, info, instrument, warn};

use crate::{
    error::{PaxosError, TransportError},
    events::PaxosEventBus,
    message::PaxosMessage,
    node::ConsensusNode,
    transport::{Transport, encode_frame, frame_codec},
    types::NodeId,
};

/// Pause after a failed `accept` so a persistent error (e.g. EMFILE) does not spin the loop.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// A running listener. Dropping the handle cancels it; [`ListenerHandle::shutdown`] also waits
/// for the accept loop to exit.
pub struct ListenerHandle {
    node: NodeId,
    addr: SocketAddr,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ListenerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Stop accepting connections and abandon in-flight requests.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                warn!(node = self.node, error = %err, "listener task ended abnormally");
            }
        }
        info!(node = self.node, addr = %self.addr, "listener stopped");
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Bind `addr` and serve `node`'s acceptor on it until the returned handle is shut down.
pub async fn spawn_listener<T, E>(
    node: Arc<ConsensusNode<T, E>>,
    addr: SocketAddr,
) -> Result<ListenerHandle, PaxosError>
where
    T: Transport,
    E: PaxosEventBus,
{
    let id = node.id();
    let listener = TcpListener::bind(addr).await.map_err(|source| {
        warn!(node = id, %addr, error = %source, "failed to bind");
        PaxosError::Bind {
            node: id,
            addr,
            source,
        }
    })?;
    let local = listener.local_addr().unwrap_or(addr);
    info!(node = id, addr = %local, "listening");

    let cancel = CancellationToken::new();
    let task = tokio::spawn(accept_loop(node, listener, cancel.clone()));

    Ok(ListenerHandle {
        node: id,
        addr: local,
        cancel,
        task: Some(task),
    })
}

async fn accept_loop<T, E>(
    node: Arc<ConsensusNode<T, E>>,
    listener: TcpListener,
    cancel: CancellationToken,
) where
    T: Transport,
    E: PaxosEventBus,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let node = Arc::clone(&node);
                    let cancel = cancel.child_token();
                    tokio::spawn(async move {
                        tokio::select! {
                            _ = cancel.cancelled() => {}
                            result = serve_connection(node.as_ref(), stream) => {
                                if let Err(err) = result {
                                    debug!(
                                        node = node.id(),
                                        %peer,
                                        error = %err,
                                        "connection closed without reply"
                                    );
                                }
                            }
                        }
                    });
                }
                Err(err) => {
                    warn!(node = node.id(), error = %err, "accept failed");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(ACCEPT_ERROR_BACKOFF) => {}
                    }
                }
            }
        }
    }
}

#[instrument(skip_all, fields(node = node.id()))]
async fn serve_connection<T, E>(
    node: &ConsensusNode<T, E>,
    stream: TcpStream,
) -> Result<(), PaxosError>
where
    T: Transport,
    E: PaxosEventBus,
{
    let _ = stream.set_nodelay(true);
    let mut framed = Framed::new(stream, frame_codec());
    let frame = match framed.next().await {
        Some(frame) => frame.map_err(TransportError::Codec)?,
        None => return Ok(()),
    };
    let request = PaxosMessage::decode(frame).map_err(TransportError::from)?;

    // A dropped request closes the connection, which the sender sees as no response.
    if let Some(reply) = node.handle_message(request).await? {
        framed
            .send(encode_frame(&reply))
            .await
            .map_err(TransportError::Codec)?;
    }
    Ok(())
}
