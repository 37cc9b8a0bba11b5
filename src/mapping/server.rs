// ABOUTME: Mapping server — accepts one connection per client and dispatches it to a handler
// ABOUTME: Mirrors smg.comms.mapping.MappingServer: active/finished client bookkeeping behind one lock

use super::handler::{FrameDecompressor, MappingClientHandler};
use crate::error::Result;
use crate::message::{ImageShape, Intrinsics};
use crate::pool::OverflowPolicy;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

struct Registry {
    handlers: HashMap<u64, Arc<MappingClientHandler>>,
    finished: HashSet<u64>,
    next_id: u64,
}

struct ServerState {
    registry: Mutex<Registry>,
    client_ready: Notify,
    token: CancellationToken,
    pool_policy: OverflowPolicy,
    frame_decompressor: Option<FrameDecompressor>,
}

/// Builder for [`MappingServer`], mirroring `smpp::client::builder::ClientBuilder`.
pub struct MappingServerBuilder {
    port: u16,
    pool_policy: OverflowPolicy,
    frame_decompressor: Option<FrameDecompressor>,
}

impl Default for MappingServerBuilder {
    fn default() -> Self {
        Self {
            port: 7851,
            pool_policy: OverflowPolicy::Discard,
            frame_decompressor: None,
        }
    }
}

impl MappingServerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn pool_policy(mut self, policy: OverflowPolicy) -> Self {
        self.pool_policy = policy;
        self
    }

    pub fn frame_decompressor(mut self, decompressor: FrameDecompressor) -> Self {
        self.frame_decompressor = Some(decompressor);
        self
    }

    pub async fn start(self) -> Result<MappingServer> {
        let listener = TcpListener::bind(("127.0.0.1", self.port)).await?;
        let local_addr = listener.local_addr()?;
        let token = CancellationToken::new();

        let state = Arc::new(ServerState {
            registry: Mutex::new(Registry {
                handlers: HashMap::new(),
                finished: HashSet::new(),
                next_id: 0,
            }),
            client_ready: Notify::new(),
            token: token.clone(),
            pool_policy: self.pool_policy,
            frame_decompressor: self.frame_decompressor,
        });

        let accept_state = state.clone();
        let accept_task = tokio::spawn(accept_loop(listener, accept_state));

        Ok(MappingServer {
            state,
            token,
            local_addr,
            accept_task: Some(accept_task),
        })
    }
}

/// Accepts mapping-client connections and serves their frame streams.
///
/// One task per connected client runs the handshake, then loops reading
/// frames until the connection drops or the server is terminated.
pub struct MappingServer {
    state: Arc<ServerState>,
    token: CancellationToken,
    local_addr: std::net::SocketAddr,
    accept_task: Option<JoinHandle<()>>,
}

impl MappingServer {
    pub async fn start(port: u16) -> Result<Self> {
        MappingServerBuilder::new().port(port).start().await
    }

    /// The address this server actually bound to (useful when `port: 0` was requested).
    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.local_addr
    }

    /// Number of clients currently connected (not yet finished).
    pub async fn active_client_count(&self) -> usize {
        self.state.registry.lock().await.handlers.len()
    }

    pub async fn has_finished(&self, client_id: u64) -> bool {
        self.state.registry.lock().await.finished.contains(&client_id)
    }

    pub async fn has_frames_now(&self, client_id: u64) -> bool {
        match self.handler(client_id).await {
            Some(h) => h.has_frames_now(),
            None => false,
        }
    }

    pub async fn has_more_frames(&self, client_id: u64) -> bool {
        self.has_frames_now(client_id).await || !self.has_finished(client_id).await
    }

    pub async fn image_shapes(&self, client_id: u64) -> Option<Vec<ImageShape>> {
        self.handler(client_id).await?.image_shapes()
    }

    pub async fn intrinsics(&self, client_id: u64) -> Option<Vec<Intrinsics>> {
        self.handler(client_id).await?.intrinsics()
    }

    /// Block until `client_id` has been registered by the accept loop.
    pub async fn wait_for_client(&self, client_id: u64) {
        loop {
            // Register interest before checking, so a notify_waiters() that
            // fires between the check and the wait is never missed.
            let notified = self.state.client_ready.notified();
            if self.handler(client_id).await.is_some() {
                return;
            }
            notified.await;
        }
    }

    /// Fetch the oldest unprocessed frame for `client_id`, passing it to
    /// `receiver`. Blocks until one arrives, the client finishes, or the
    /// server is terminated.
    pub async fn get_frame<F, R>(&self, client_id: u64, receiver: F) -> Option<R>
    where
        F: FnOnce(&crate::message::FrameMessage) -> R,
    {
        let handler = self.handler(client_id).await?;
        handler.get_frame(&self.token, receiver).await
    }

    pub async fn peek_newest_frame<F, R>(&self, client_id: u64, receiver: F) -> Option<R>
    where
        F: FnOnce(&crate::message::FrameMessage) -> R,
    {
        self.handler(client_id).await?.peek_newest_frame(receiver)
    }

    async fn handler(&self, client_id: u64) -> Option<Arc<MappingClientHandler>> {
        self.state.registry.lock().await.handlers.get(&client_id).cloned()
    }

    /// Stop the accept loop and every live per-client task, then wait for
    /// them to finish.
    pub async fn terminate(&mut self) {
        self.token.cancel();
        if let Some(task) = self.accept_task.take()
            && let Err(e) = task.await
        {
            warn!(error = %e, "mapping server accept loop panicked");
        }
    }
}

impl Drop for MappingServer {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn accept_loop(listener: TcpListener, state: Arc<ServerState>) {
    loop {
        tokio::select! {
            _ = state.token.cancelled() => break,
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, addr)) => {
                        let client_id = {
                            let mut registry = state.registry.lock().await;
                            let id = registry.next_id;
                            registry.next_id += 1;
                            id
                        };
                        info!(client_id, %addr, "mapping client connected");
                        tokio::spawn(serve_client(client_id, stream, state.clone()));
                    }
                    Err(e) => warn!(error = %e, "mapping server accept failed"),
                }
            }
        }
    }
}

async fn serve_client(client_id: u64, mut stream: tokio::net::TcpStream, state: Arc<ServerState>) {
    let handler = Arc::new(MappingClientHandler::new(client_id, state.pool_policy));

    if handler.run_pre(&mut stream, &state.token).await {
        {
            let mut registry = state.registry.lock().await;
            registry.handlers.insert(client_id, handler.clone());
        }
        state.client_ready.notify_waiters();

        while !state.token.is_cancelled() && handler.is_connection_ok() {
            handler
                .run_iter(&mut stream, &state.token, state.frame_decompressor.as_ref())
                .await;
        }

        // Drain: a disconnected client may still have unconsumed frames
        // sitting in its queue. Keep the handler published until a consumer
        // has pulled them all, so no received frame is ever silently
        // dropped. Skipped on global shutdown, since nothing will consume
        // the drain queue at that point anyway.
        while !state.token.is_cancelled() && handler.has_frames_now() {
            tokio::time::sleep(crate::socket::DEFAULT_READ_TIMEOUT).await;
        }

        let mut registry = state.registry.lock().await;
        registry.handlers.remove(&client_id);
        registry.finished.insert(client_id);
    } else {
        state.registry.lock().await.finished.insert(client_id);
    }

    info!(client_id, "mapping client finished");
}
