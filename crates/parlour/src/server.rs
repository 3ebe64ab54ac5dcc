//! Server configuration, builder, accept loop, and graceful shutdown.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;

use parlour_protocol::{Envelope, MAX_BUFFERED, wire};
use parlour_session::{Registry, Session};

use crate::conn::drive_connection;
use crate::dispatch::DispatchTable;
use crate::error::{DispatchError, ParlourError};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tunables for a server. `Default` matches the standard deployment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on.
    pub bind_addr: String,

    /// How long one socket read waits before the loop re-checks its
    /// running flag. Bounds shutdown latency; does not end sessions.
    pub read_timeout: Duration,

    /// Flood guard: most bytes a peer may leave undelimited.
    pub max_buffered: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("127.0.0.1:{}", wire::DEFAULT_PORT),
            read_timeout: Duration::from_secs(2),
            max_buffered: MAX_BUFFERED,
        }
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for configuring and binding a [`ParlourServer`].
///
/// # Example
///
/// ```rust,no_run
/// use parlour::prelude::*;
///
/// # async fn run() -> Result<(), ParlourError> {
/// let server = ParlourServer::builder()
///     .bind("0.0.0.0:3904")
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct ParlourServerBuilder {
    config: ServerConfig,
    table: DispatchTable,
}

impl ParlourServerBuilder {
    /// Default settings and the baseline dispatch table.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            table: DispatchTable::baseline(),
        }
    }

    /// Sets the address to bind to.
    pub fn bind(mut self, addr: impl Into<String>) -> Self {
        self.config.bind_addr = addr.into();
        self
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets how long reads wait between running-flag checks.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    /// Sets the flood guard limit.
    pub fn max_buffered(mut self, limit: usize) -> Self {
        self.config.max_buffered = limit;
        self
    }

    /// Registers a handler for a message type.
    ///
    /// See [`DispatchTable::register`]; this is the same registration,
    /// chained builder-style.
    pub fn handler<F, Fut>(mut self, msgt: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Arc<Session>, Envelope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), DispatchError>> + Send + 'static,
    {
        self.table.register(msgt, handler);
        self
    }

    /// Binds the listener and returns a server ready to run.
    ///
    /// # Errors
    /// Returns [`ParlourError::Io`] if binding fails.
    pub async fn build(self) -> Result<ParlourServer, ParlourError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        tracing::info!(addr = %listener.local_addr()?, "listening");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(ParlourServer {
            listener,
            registry: Arc::new(Registry::new()),
            table: Arc::new(self.table),
            config: self.config,
            shutdown_tx,
            shutdown_rx,
        })
    }
}

impl Default for ParlourServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// A bound server. Call [`run`](Self::run) to start accepting.
pub struct ParlourServer {
    listener: TcpListener,
    registry: Arc<Registry>,
    table: Arc<DispatchTable>,
    config: ServerConfig,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

/// A clonable handle onto a running server: the shutdown switch and the
/// registry, for operators and handlers living outside the server task.
#[derive(Clone)]
pub struct ServerHandle {
    shutdown: watch::Sender<bool>,
    registry: Arc<Registry>,
}

impl ServerHandle {
    /// Signals the server to stop accepting and drain every session.
    ///
    /// Returns immediately; the drain completes when
    /// [`ParlourServer::run`] returns.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }
}

impl ParlourServer {
    pub fn builder() -> ParlourServerBuilder {
        ParlourServerBuilder::new()
    }

    /// The address the listener actually bound, useful with port 0.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            shutdown: self.shutdown_tx.clone(),
            registry: self.registry.clone(),
        }
    }

    /// Runs the accept loop until shutdown is signalled, then drains.
    ///
    /// Each accepted connection becomes a registered [`Session`] with
    /// its own task. On shutdown: stop accepting, ask every registered
    /// session to stop, then wait for every session task before
    /// returning. The listener socket closes when the server is
    /// dropped, after the drain — no session is abandoned mid-teardown.
    pub async fn run(mut self) -> Result<(), ParlourError> {
        tracing::info!("server running");
        let mut tasks: JoinSet<()> = JoinSet::new();

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            if let Err(e) = stream.set_nodelay(true) {
                                tracing::debug!(%peer, error = %e, "set_nodelay failed");
                            }
                            let (reader, writer) = stream.into_split();
                            let session =
                                Session::new(peer, writer, self.registry.clone());
                            tracing::info!(id = %session.id(), %peer, "session opened");
                            self.registry.add(session.clone()).await;
                            tasks.spawn(drive_connection(
                                session,
                                reader,
                                self.table.clone(),
                                self.config.read_timeout,
                                self.config.max_buffered,
                            ));
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "accept failed");
                        }
                    }
                }
                _ = self.shutdown_rx.changed() => {
                    if *self.shutdown_rx.borrow() {
                        break;
                    }
                }
                Some(finished) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = finished {
                        tracing::error!(error = %e, "session task failed");
                    }
                }
            }
        }

        self.drain(tasks).await;
        Ok(())
    }

    /// Stops every registered session and waits for their tasks.
    async fn drain(&self, mut tasks: JoinSet<()>) {
        let sessions = self.registry.snapshot().await;
        tracing::info!(sessions = sessions.len(), "shutting down, draining");

        for session in &sessions {
            session.stop();
        }
        while let Some(finished) = tasks.join_next().await {
            if let Err(e) = finished {
                tracing::error!(error = %e, "session task failed");
            }
        }

        tracing::info!("drain complete");
    }
}
