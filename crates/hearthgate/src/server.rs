//! `HearthgateServer` builder and accept loop.
//!
//! This is the entry point for running a Hearthgate front end. It ties
//! the layers together: transport → protocol → session, plus the
//! database link that feeds responses back into sessions.

use std::sync::Arc;
use std::time::Duration;

use hearthgate_session::{DbResponse, Services, SessionConfig};
use hearthgate_transport::{TcpTransport, Transport};
use tokio::sync::mpsc;

use crate::handler::handle_connection;
use crate::{HearthgateError, SessionTable};

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState {
    pub(crate) services: Services,
    pub(crate) config: Arc<SessionConfig>,
    pub(crate) table: Arc<SessionTable>,
    /// Longest a single write to one client may take.
    pub(crate) write_timeout: Duration,
}

/// Default for [`HearthgateServerBuilder::write_timeout`].
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Builder for configuring and starting a Hearthgate server.
///
/// # Example
///
/// ```rust,ignore
/// use hearthgate::prelude::*;
///
/// let (db, link) = MemoryDatabase::new();
/// let server = HearthgateServer::builder()
///     .bind("0.0.0.0:7400")
///     .database_link(link)
///     .build(services)
///     .await?;
/// server.run().await
/// ```
pub struct HearthgateServerBuilder {
    bind_addr: String,
    session_config: SessionConfig,
    write_timeout: Duration,
    database_link: Option<mpsc::UnboundedReceiver<DbResponse>>,
}

impl HearthgateServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:7400".to_string(),
            session_config: SessionConfig::default(),
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            database_link: None,
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets the session configuration.
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    /// Sets how long a write to one client may block before the
    /// connection is dropped.
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Sets the stream of responses coming back from the database. The
    /// server routes each one to its session by client key.
    ///
    /// Without a link, responses must be pushed through
    /// [`HearthgateServer::sessions`], which implements
    /// [`DbResponseSink`](hearthgate_session::DbResponseSink).
    pub fn database_link(mut self, link: mpsc::UnboundedReceiver<DbResponse>) -> Self {
        self.database_link = Some(link);
        self
    }

    /// Binds the listener.
    pub async fn build(self, services: Services) -> Result<HearthgateServer, HearthgateError> {
        let transport = TcpTransport::bind(&self.bind_addr).await?;

        let state = Arc::new(ServerState {
            services,
            config: Arc::new(self.session_config),
            table: Arc::new(SessionTable::new()),
            write_timeout: self.write_timeout,
        });

        Ok(HearthgateServer {
            transport,
            state,
            database_link: self.database_link,
        })
    }
}

impl Default for HearthgateServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Hearthgate server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct HearthgateServer {
    transport: TcpTransport,
    state: Arc<ServerState>,
    database_link: Option<mpsc::UnboundedReceiver<DbResponse>>,
}

impl HearthgateServer {
    /// Creates a new builder.
    pub fn builder() -> HearthgateServerBuilder {
        HearthgateServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// The live session table, for forwarding, kicks, and database
    /// responses.
    pub fn sessions(&self) -> Arc<SessionTable> {
        Arc::clone(&self.state.table)
    }

    /// Runs the server accept loop.
    ///
    /// Spawns the database link task (if a link was configured) and a
    /// handler task for each accepted connection. Runs until the process
    /// is terminated.
    pub async fn run(mut self) -> Result<(), HearthgateError> {
        tracing::info!(addr = ?self.local_addr().ok(), "Hearthgate server running");

        if let Some(mut link) = self.database_link.take() {
            let table = Arc::clone(&self.state.table);
            tokio::spawn(async move {
                while let Some(response) = link.recv().await {
                    table.route(response);
                }
                tracing::warn!("Database link closed");
            });
        }

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}
