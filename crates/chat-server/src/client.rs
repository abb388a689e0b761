// crates/chat-server/src/client.rs

//! Per-connection state: the [`Client`] (identity + outbound writer)
//! and its [`ClientReader`] (inbound line loop).

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chat_protocol::{encode_line, LineDecoder, LineEnding};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::types::ClientId;

/// Global-ish counter for assigning unique `ClientId`s.
static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

fn next_client_id() -> ClientId {
    ClientId(NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed))
}

const READ_CHUNK: usize = 1024;

/// One accepted connection, as seen by the rest of the service.
///
/// The read half is handed to the client's [`ClientReader`]; the
/// write half stays here, behind an async mutex so that concurrent
/// broadcast jobs never interleave bytes within a line.
#[derive(Debug)]
pub struct Client {
    id: ClientId,
    identity: Arc<str>,
    writer: Mutex<Option<OwnedWriteHalf>>,
}

impl Client {
    /// Wrap an accepted stream, returning the client and its read half.
    pub fn new(stream: TcpStream, peer: SocketAddr) -> io::Result<(Client, OwnedReadHalf)> {
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();

        let client = Client {
            id: next_client_id(),
            identity: Arc::from(peer.to_string()),
            writer: Mutex::new(Some(writer)),
        };
        Ok((client, reader))
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Remote endpoint (`ip:port`), fixed at connect time.
    pub fn identity(&self) -> &Arc<str> {
        &self.identity
    }

    /// Write one line and flush it.
    ///
    /// Fails with `NotConnected` once the client has been closed.
    pub async fn write_line(&self, text: &str) -> io::Result<()> {
        let data = encode_line(text, LineEnding::Lf);

        let mut guard = self.writer.lock().await;
        let writer = guard
            .as_mut()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;

        writer.write_all(&data).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Shut down the outbound direction and release the writer.
    ///
    /// Closing an already closed client is a no-op.
    pub async fn close(&self) -> io::Result<()> {
        let writer = self.writer.lock().await.take();
        match writer {
            Some(mut writer) => writer.shutdown().await,
            None => Ok(()),
        }
    }
}

/// Callbacks a [`ClientReader`] reports through.
pub struct ReaderListener {
    pub on_message_received: Box<dyn FnMut(String) + Send>,
    pub on_connection_lost: Box<dyn FnOnce() + Send>,
}

/// Line-oriented read loop for one client.
pub struct ClientReader {
    client: ClientId,
    reader: OwnedReadHalf,
    decoder: LineDecoder,
    token: CancellationToken,
    listener: ReaderListener,
}

impl ClientReader {
    pub fn new(
        client: ClientId,
        reader: OwnedReadHalf,
        token: CancellationToken,
        listener: ReaderListener,
    ) -> Self {
        ClientReader {
            client,
            reader,
            decoder: LineDecoder::new(),
            token,
            listener,
        }
    }

    /// Start the loop as its own task.
    pub fn spawn(self) -> ReaderHandle {
        let token = self.token.clone();
        let task = tokio::spawn(self.run());
        ReaderHandle { token, task }
    }

    /// Read lines until end-of-stream, an I/O error, or a stop.
    ///
    /// All three end the same way: `on_connection_lost` runs exactly
    /// once and the loop returns.
    pub async fn run(self) {
        let ClientReader {
            client,
            mut reader,
            mut decoder,
            token,
            listener,
        } = self;
        let ReaderListener {
            mut on_message_received,
            on_connection_lost,
        } = listener;

        let mut buf = [0u8; READ_CHUNK];

        loop {
            let read = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!(%client, "reader stopped");
                    break;
                }
                read = reader.read(&mut buf) => read,
            };

            match read {
                Ok(0) => {
                    if let Some(tail) = decoder.finish() {
                        on_message_received(tail);
                    }
                    debug!(%client, "end of stream");
                    break;
                }
                Ok(n) => {
                    decoder.extend(&buf[..n]);
                    while let Some(line) = decoder.next_line() {
                        debug!(%client, %line, "line received");
                        on_message_received(line);
                    }
                }
                Err(e) => {
                    debug!(%client, error = %e, "read failed");
                    break;
                }
            }
        }

        on_connection_lost();
    }
}

/// Handle to a running [`ClientReader`].
#[derive(Debug)]
pub struct ReaderHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl ReaderHandle {
    /// Interrupt the pending read. Idempotent.
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Wait for the loop to return.
    pub async fn join(self) {
        let _ = self.task.await;
    }
}
