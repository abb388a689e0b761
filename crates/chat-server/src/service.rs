//! Service orchestration.
//!
//! This module:
//! - binds the listening endpoint (the only fatal failure),
//! - spawns the acceptor loop and the event consumer on `start_serving`,
//! - owns the client registry *inside* the consumer, so that every
//!   mutation of it is an event applied in order, without a lock,
//! - fans broadcasts out as one job per client.
//!
//! Lifecycle: `Created -> Running -> Stopped`. Starting twice is a
//! no-op, and so is stopping twice. Stopping only signals; use
//! [`ServiceHandle::wait_stopped`] to wait for the tasks to wind down.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::mem;
use std::net::SocketAddr;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use chat_protocol::render_chat_line;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::acceptor::{endpoint_description, AcceptorHandle, AcceptorListener, ConnectionAcceptor};
use crate::broadcast::BroadcastJob;
use crate::client::{Client, ClientReader, ReaderHandle, ReaderListener};
use crate::config::Config;
use crate::error::ServiceError;
use crate::event_queue::{EventDispatcher, EventHandler, EventQueue};
use crate::observer::{NoopObserver, ServiceObserver};
use crate::types::{ClientId, Event};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServicePhase {
    Created,
    Running,
    Stopped,
}

enum Lifecycle {
    Created {
        listener: TcpListener,
        queue: EventQueue<Event>,
    },
    Running,
    Stopped,
}

struct Shared {
    local_addr: SocketAddr,
    endpoint: String,
    echo_to_sender: bool,
    dispatcher: EventDispatcher<Event>,
    /// Parent of the acceptor, consumer and reader tokens.
    token: CancellationToken,
    observer: RwLock<Arc<dyn ServiceObserver>>,
    /// Mirror of the registry size, written only by the consumer.
    client_count: AtomicUsize,
    lifecycle: Mutex<Lifecycle>,
    /// Cancelled once the acceptor and the consumer have both finished.
    stopped: CancellationToken,
}

impl Shared {
    fn observer(&self) -> Arc<dyn ServiceObserver> {
        self.observer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The chat service. Dropping it stops it.
pub struct Service {
    handle: ServiceHandle,
}

impl Service {
    /// Bind the configured endpoint.
    ///
    /// Failing to bind is the one fatal error; it is returned before any
    /// task has been spawned.
    pub async fn bind(config: &Config) -> Result<Service, ServiceError> {
        let addr = config.socket_addr_string();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ServiceError::bind(addr.clone(), e))?;

        let service = Service::from_listener(listener, config.echo_to_sender)
            .map_err(|e| ServiceError::bind(addr.clone(), e))?;
        info!(%addr, local_addr = %service.local_addr(), "listening");
        Ok(service)
    }

    /// Build a service around an already bound listener.
    pub fn from_listener(listener: TcpListener, echo_to_sender: bool) -> io::Result<Service> {
        let local_addr = listener.local_addr()?;
        let token = CancellationToken::new();
        let queue = EventQueue::new(token.child_token());

        let shared = Shared {
            local_addr,
            endpoint: endpoint_description(local_addr),
            echo_to_sender,
            dispatcher: queue.dispatcher(),
            token,
            observer: RwLock::new(Arc::new(NoopObserver)),
            client_count: AtomicUsize::new(0),
            lifecycle: Mutex::new(Lifecycle::Created { listener, queue }),
            stopped: CancellationToken::new(),
        };

        Ok(Service {
            handle: ServiceHandle {
                shared: Arc::new(shared),
            },
        })
    }

    /// A cloneable handle that does not keep the service alive.
    pub fn handle(&self) -> ServiceHandle {
        self.handle.clone()
    }
}

impl Deref for Service {
    type Target = ServiceHandle;

    fn deref(&self) -> &ServiceHandle {
        &self.handle
    }
}

impl Drop for Service {
    fn drop(&mut self) {
        self.handle.stop_serving();
        // Observers commonly hold a handle back to the service.
        self.handle.set_observer(Arc::new(NoopObserver));
    }
}

/// Cloneable access to a [`Service`] from other tasks, observers and
/// front ends.
#[derive(Clone)]
pub struct ServiceHandle {
    shared: Arc<Shared>,
}

impl ServiceHandle {
    /// Spawn the acceptor and the event consumer.
    ///
    /// Only the first call on a created service does anything.
    pub fn start_serving(&self) {
        let mut lifecycle = lock(&self.shared.lifecycle);
        let (listener, queue) = match mem::replace(&mut *lifecycle, Lifecycle::Running) {
            Lifecycle::Created { listener, queue } => (listener, queue),
            other => {
                *lifecycle = other;
                return;
            }
        };

        let acceptor = ConnectionAcceptor::new(
            listener,
            self.shared.token.child_token(),
            self.acceptor_listener(),
        );
        let state = ServiceState::new(self.shared.clone());

        let acceptor = acceptor.spawn();
        let consumer = tokio::spawn(queue.run(state));
        tokio::spawn(supervise(
            self.shared.token.clone(),
            self.shared.stopped.clone(),
            acceptor,
            consumer,
        ));

        info!(endpoint = %self.shared.endpoint, "service running");
    }

    /// Stop accepting, stop every reader, and stop the event consumer.
    ///
    /// Never waits, so it is safe from any task, including from inside
    /// an observer callback.
    pub fn stop_serving(&self) {
        let previous = mem::replace(&mut *lock(&self.shared.lifecycle), Lifecycle::Stopped);
        self.shared.token.cancel();

        match previous {
            Lifecycle::Stopped => {}
            Lifecycle::Created { listener, queue } => {
                // No tasks to wait for.
                drop(listener);
                drop(queue);
                self.shared.stopped.cancel();
                info!("service stopped before it was started");
            }
            Lifecycle::Running => info!("service stopping"),
        }
    }

    /// Wait until the service is stopped and its tasks have finished.
    ///
    /// After this returns the listening socket is closed, every reader
    /// loop has ended and no further event will run. Any number of
    /// tasks may wait at once. Must not be awaited from inside an
    /// observer callback.
    pub async fn wait_stopped(&self) {
        self.shared.stopped.cancelled().await;
    }

    /// Broadcast `text` verbatim to every client registered when the
    /// broadcast gets its turn on the event queue.
    ///
    /// Returns `false` once the service can no longer take events.
    pub fn broadcast_message(&self, text: impl Into<String>) -> bool {
        self.shared
            .dispatcher
            .dispatch(Event::Broadcast { text: text.into() })
    }

    /// Replace the observer. Notifications already running keep the old one.
    pub fn set_observer(&self, observer: Arc<dyn ServiceObserver>) {
        *self
            .shared
            .observer
            .write()
            .unwrap_or_else(PoisonError::into_inner) = observer;
    }

    pub fn phase(&self) -> ServicePhase {
        match &*lock(&self.shared.lifecycle) {
            Lifecycle::Created { .. } => ServicePhase::Created,
            Lifecycle::Running => ServicePhase::Running,
            Lifecycle::Stopped => ServicePhase::Stopped,
        }
    }

    /// Number of registered clients as of the last processed event.
    pub fn client_count(&self) -> usize {
        self.shared.client_count.load(Ordering::Acquire)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.shared.local_addr
    }

    /// `host:port` of the listening endpoint.
    pub fn endpoint(&self) -> &str {
        &self.shared.endpoint
    }

    /// Status line: `"<host:port> ---> Clients: <n>"`.
    pub fn describe(&self) -> String {
        format!(
            "{} ---> Clients: {}",
            self.shared.endpoint,
            self.client_count()
        )
    }

    fn acceptor_listener(&self) -> AcceptorListener {
        let connections = self.shared.dispatcher.clone();
        let errors = self.shared.dispatcher.clone();

        AcceptorListener {
            on_new_connection: Box::new(move |stream, peer| {
                connections.dispatch(Event::NewConnection { stream, peer });
            }),
            on_initialization_error: Box::new(move |message| {
                errors.dispatch(Event::InitializationError { message });
            }),
        }
    }
}

impl fmt::Display for ServiceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

impl fmt::Debug for ServiceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceHandle")
            .field("local_addr", &self.shared.local_addr)
            .field("phase", &self.phase())
            .field("clients", &self.client_count())
            .finish()
    }
}

/// Once the service token fires, wait for the acceptor and the consumer
/// (which joins every reader on its way out), then mark the service stopped.
async fn supervise(
    token: CancellationToken,
    stopped: CancellationToken,
    acceptor: AcceptorHandle,
    consumer: JoinHandle<()>,
) {
    token.cancelled().await;
    acceptor.stop();
    acceptor.join().await;

    if let Err(e) = consumer.await {
        warn!(error = %e, "event consumer ended abnormally");
    }

    stopped.cancel();
    debug!("service tasks finished");
}

/// A registered client and the reader feeding its lines.
struct RegistryEntry {
    client: Arc<Client>,
    reader: ReaderHandle,
}

/// Everything the consumer owns. Only event handlers touch `clients`.
struct ServiceState {
    shared: Arc<Shared>,
    clients: HashMap<ClientId, RegistryEntry>,
}

impl EventHandler<Event> for ServiceState {
    async fn handle(&mut self, event: Event) {
        match event {
            Event::NewConnection { stream, peer } => self.add_client(stream, peer),
            Event::InitializationError { message } => {
                self.shared
                    .observer()
                    .on_connection_initialization_error(&message);
            }
            Event::MessageReceived {
                client,
                author,
                text,
            } => self.message_received(client, &author, &text),
            Event::ConnectionLost { client } => self.remove_client(client),
            Event::RemovalError { author } => {
                self.shared.observer().on_client_removal_error(&author);
            }
            Event::Broadcast { text } => self.broadcast(text, None),
        }
    }

    async fn on_stop(&mut self) {
        let readers: Vec<ReaderHandle> = self
            .clients
            .drain()
            .map(|(_, entry)| {
                entry.reader.stop();
                entry.reader
            })
            .collect();
        self.publish_client_count();

        let count = readers.len();
        for reader in readers {
            reader.join().await;
        }
        info!(readers = count, "client readers stopped");
    }
}

impl ServiceState {
    fn new(shared: Arc<Shared>) -> Self {
        ServiceState {
            shared,
            clients: HashMap::new(),
        }
    }

    fn publish_client_count(&self) {
        self.shared
            .client_count
            .store(self.clients.len(), Ordering::Release);
    }

    fn add_client(&mut self, stream: TcpStream, peer: SocketAddr) {
        let (client, read_half) = match Client::new(stream, peer) {
            Ok(parts) => parts,
            Err(e) => {
                warn!(%peer, error = %e, "failed to set up client");
                self.shared
                    .observer()
                    .on_connection_initialization_error(&e.to_string());
                return;
            }
        };

        let client = Arc::new(client);
        let id = client.id();
        let listener = self.reader_listener(id, client.identity().clone());
        let reader =
            ClientReader::new(id, read_half, self.shared.token.child_token(), listener).spawn();

        self.clients.insert(id, RegistryEntry { client, reader });
        self.publish_client_count();

        info!(client = %id, %peer, clients = self.clients.len(), "client connected");
        self.shared.observer().on_new_connection();
    }

    fn reader_listener(&self, id: ClientId, author: Arc<str>) -> ReaderListener {
        let messages = self.shared.dispatcher.clone();
        let lost = self.shared.dispatcher.clone();

        ReaderListener {
            on_message_received: Box::new(move |text| {
                messages.dispatch(Event::MessageReceived {
                    client: id,
                    author: author.clone(),
                    text,
                });
            }),
            on_connection_lost: Box::new(move || {
                lost.dispatch(Event::ConnectionLost { client: id });
            }),
        }
    }

    fn message_received(&self, client: ClientId, author: &str, text: &str) {
        self.shared.observer().on_message_received(author, text);
        self.broadcast(render_chat_line(author, text), Some(client));
    }

    /// Spawn one job per client registered right now.
    fn broadcast(&self, text: String, author: Option<ClientId>) {
        let message: Arc<str> = Arc::from(text);
        let mut recipients = 0usize;

        for (&id, entry) in &self.clients {
            if !self.shared.echo_to_sender && author == Some(id) {
                continue;
            }

            let lost = self.shared.dispatcher.clone();
            BroadcastJob::new(message.clone(), entry.client.clone(), move |_| {
                lost.dispatch(Event::ConnectionLost { client: id });
            })
            .spawn();
            recipients += 1;
        }

        debug!(recipients, %message, "broadcast");
    }

    /// Stop the reader, drop the entry, close the transport.
    ///
    /// Both a reader ending and a failed write land here, possibly for
    /// the same client; whichever comes second finds nothing to do.
    fn remove_client(&mut self, id: ClientId) {
        let Some(entry) = self.clients.remove(&id) else {
            debug!(client = %id, "client already removed");
            return;
        };

        entry.reader.stop();
        self.publish_client_count();

        let client = entry.client;
        let removal_errors = self.shared.dispatcher.clone();
        tokio::spawn(async move {
            if let Err(e) = client.close().await {
                warn!(client = %client.id(), error = %e, "failed to close client");
                removal_errors.dispatch(Event::RemovalError {
                    author: client.identity().clone(),
                });
            }
        });

        info!(client = %id, clients = self.clients.len(), "client removed");
        self.shared.observer().on_connection_lost();
    }
}
