// crates/chat-client/src/network.rs

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chat_protocol::{encode_line, LineDecoder, LineEnding};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{lookup_host, TcpStream};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{ClientConfig, ClientError};

/// What the connection reports to the front end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkEvent {
    /// One line from the server, already decoded.
    Message(String),
    /// Reading or writing failed; both directions have stopped.
    ConnectionLost,
}

/// State shared by the receiving and the sending task.
struct Link {
    token: CancellationToken,
    events: UnboundedSender<NetworkEvent>,
    finished: AtomicBool,
}

impl Link {
    fn deliver(&self, line: String) {
        let _ = self.events.send(NetworkEvent::Message(line));
    }

    /// Stop both tasks; the first failure is reported, later ones are not.
    fn lost(&self) {
        self.token.cancel();
        if !self.finished.swap(true, Ordering::AcqRel) {
            let _ = self.events.send(NetworkEvent::ConnectionLost);
        }
    }

    /// Stop both tasks without reporting anything.
    fn close(&self) {
        self.finished.store(true, Ordering::Release);
        self.token.cancel();
    }
}

/// A live connection to a chat server.
pub struct ChatConnection {
    server_addr: String,
    peer: SocketAddr,
    local: SocketAddr,
    outbound: UnboundedSender<String>,
    link: Arc<Link>,
    tasks: Vec<JoinHandle<()>>,
}

impl ChatConnection {
    /// Resolve, connect, and start the receiving and sending tasks.
    pub async fn connect(
        config: &ClientConfig,
        events: UnboundedSender<NetworkEvent>,
    ) -> Result<Self, ClientError> {
        let server_addr = config.server_addr();
        info!("Connecting to {}...", server_addr);

        let stream = open_stream(config).await?;
        stream
            .set_nodelay(true)
            .map_err(|source| ClientError::Connect {
                addr: server_addr.clone(),
                source,
            })?;
        let peer = stream.peer_addr().map_err(|source| ClientError::Connect {
            addr: server_addr.clone(),
            source,
        })?;
        let local = stream.local_addr().map_err(|source| ClientError::Connect {
            addr: server_addr.clone(),
            source,
        })?;
        info!(%peer, %local, "Connected successfully");

        let (reader, writer) = stream.into_split();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let link = Arc::new(Link {
            token: CancellationToken::new(),
            events,
            finished: AtomicBool::new(false),
        });

        let tasks = vec![
            tokio::spawn(receive_loop(reader, link.clone())),
            tokio::spawn(send_loop(writer, outbound_rx, link.clone())),
        ];

        Ok(ChatConnection {
            server_addr,
            peer,
            local,
            outbound,
            link,
            tasks,
        })
    }

    /// `host:port` as given by the user.
    pub fn server_addr(&self) -> &str {
        &self.server_addr
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Our end of the connection; the server uses it as our name.
    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    /// Queue one line for the sending task.
    ///
    /// Returns `false` once the connection is gone.
    pub fn send(&self, text: impl Into<String>) -> bool {
        !self.link.token.is_cancelled() && self.outbound.send(text.into()).is_ok()
    }

    pub fn is_connected(&self) -> bool {
        !self.link.token.is_cancelled()
    }

    /// Close deliberately; no `ConnectionLost` is reported.
    pub fn close(&self) {
        self.link.close();
    }

    /// Wait for both tasks to end.
    pub async fn join(self) {
        for task in self.tasks {
            let _ = task.await;
        }
    }
}

async fn open_stream(config: &ClientConfig) -> Result<TcpStream, ClientError> {
    let server_addr = config.server_addr();
    let addrs: Vec<SocketAddr> = lookup_host((config.host.as_str(), config.port))
        .await
        .map_err(|source| ClientError::UnknownHost {
            host: config.host.clone(),
            source: Some(source),
        })?
        .collect();
    if addrs.is_empty() {
        return Err(ClientError::UnknownHost {
            host: config.host.clone(),
            source: None,
        });
    }

    let mut last_error: Option<io::Error> = None;
    for addr in addrs {
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!(%addr, error = %e, "connect attempt failed");
                last_error = Some(e);
            }
        }
    }

    match last_error {
        Some(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
            Err(ClientError::ConnectionRefused { addr: server_addr })
        }
        Some(source) => Err(ClientError::Connect {
            addr: server_addr,
            source,
        }),
        None => Err(ClientError::UnknownHost {
            host: config.host.clone(),
            source: None,
        }),
    }
}

async fn receive_loop(mut reader: OwnedReadHalf, link: Arc<Link>) {
    let mut decoder = LineDecoder::new();
    let mut buf = [0u8; 1024];

    loop {
        let read = tokio::select! {
            biased;
            _ = link.token.cancelled() => return,
            read = reader.read(&mut buf) => read,
        };

        match read {
            Ok(0) => {
                if let Some(tail) = decoder.finish() {
                    link.deliver(tail);
                }
                info!("Server closed the connection");
                break;
            }
            Ok(n) => {
                decoder.extend(&buf[..n]);
                while let Some(line) = decoder.next_line() {
                    debug!(%line, "Received from server");
                    link.deliver(line);
                }
            }
            Err(e) => {
                warn!("Read error: {}", e);
                break;
            }
        }
    }

    link.lost();
}

async fn send_loop(
    mut writer: OwnedWriteHalf,
    mut outbound: UnboundedReceiver<String>,
    link: Arc<Link>,
) {
    loop {
        let text = tokio::select! {
            biased;
            _ = link.token.cancelled() => break,
            text = outbound.recv() => text,
        };
        let Some(text) = text else { break };

        let data = encode_line(&text, LineEnding::Cr);
        let written = async {
            writer.write_all(&data).await?;
            writer.flush().await
        }
        .await;

        if let Err(e) = written {
            warn!("Failed to send message: {}", e);
            link.lost();
            break;
        }
        debug!(%text, "Sent message");
    }

    let _ = writer.shutdown().await;
}
