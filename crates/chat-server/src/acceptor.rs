//! TCP listener loop.
//!
//! The acceptor only produces: every accepted connection and every
//! accept failure is handed to a callback that is expected to enqueue
//! an event, never to act on it directly.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Placeholder used when the local host name cannot be resolved.
pub const UNRESOLVED_HOST: &str = "UNRESOLVED HOST";

// Accept errors such as EMFILE tend to repeat immediately.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Source of incoming connections.
pub trait Accept: Send + Sync + 'static {
    fn accept(&self) -> impl Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send;

    fn local_addr(&self) -> io::Result<SocketAddr>;
}

impl Accept for TcpListener {
    fn accept(&self) -> impl Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send {
        TcpListener::accept(self)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        TcpListener::local_addr(self)
    }
}

/// Callbacks a [`ConnectionAcceptor`] reports through.
pub struct AcceptorListener {
    pub on_new_connection: Box<dyn Fn(TcpStream, SocketAddr) + Send + Sync>,
    pub on_initialization_error: Box<dyn Fn(String) + Send + Sync>,
}

pub struct ConnectionAcceptor<L = TcpListener> {
    listener: L,
    token: CancellationToken,
    callbacks: AcceptorListener,
}

impl<L: Accept> ConnectionAcceptor<L> {
    pub fn new(listener: L, token: CancellationToken, callbacks: AcceptorListener) -> Self {
        ConnectionAcceptor {
            listener,
            token,
            callbacks,
        }
    }

    pub fn spawn(self) -> AcceptorHandle {
        let token = self.token.clone();
        let task = tokio::spawn(self.run());
        AcceptorHandle { token, task }
    }

    /// Accept connections until stopped.
    ///
    /// A failed accept is reported and the loop carries on; one bad
    /// connection attempt never takes the service down. The listening
    /// socket is closed when this returns.
    pub async fn run(self) {
        let ConnectionAcceptor {
            listener,
            token,
            callbacks,
        } = self;

        loop {
            let accepted = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    debug!(%peer, "accepted connection");
                    (callbacks.on_new_connection)(stream, peer);
                }
                Err(_) if token.is_cancelled() => break,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    (callbacks.on_initialization_error)(e.to_string());
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            }
        }

        info!(addr = ?listener.local_addr().ok(), "no longer accepting connections");
    }
}

/// Handle to a running [`ConnectionAcceptor`].
#[derive(Debug)]
pub struct AcceptorHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl AcceptorHandle {
    /// Stop accepting. Idempotent.
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Wait for the loop to return and the listener to be closed.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            warn!(error = %e, "acceptor task ended abnormally");
        }
    }
}

/// `host:port` for display, with the local host name.
pub fn endpoint_description(local_addr: SocketAddr) -> String {
    let host = hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| UNRESOLVED_HOST.to_string());
    format!("{}:{}", host, local_addr.port())
}
