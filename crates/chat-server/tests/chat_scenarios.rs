// crates/chat-server/tests/chat_scenarios.rs
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chat_protocol::{charset, LineDecoder};
use chat_server::{Config, Service, ServiceError, ServiceHandle, ServiceObserver, ServicePhase};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

const TIMEOUT: Duration = Duration::from_secs(5);

fn local_config(echo_to_sender: bool) -> Config {
    Config {
        bind_addr: "127.0.0.1".into(),
        port: 0,
        echo_to_sender,
    }
}

#[derive(Default)]
struct Recorder {
    log: Mutex<Vec<String>>,
}

impl Recorder {
    fn snapshot(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn count(&self, entry: &str) -> usize {
        self.log.lock().unwrap().iter().filter(|e| *e == entry).count()
    }
}

impl ServiceObserver for Recorder {
    fn on_new_connection(&self) {
        self.log.lock().unwrap().push("new".into());
    }

    fn on_connection_lost(&self) {
        self.log.lock().unwrap().push("lost".into());
    }

    fn on_message_received(&self, author: &str, text: &str) {
        self.log.lock().unwrap().push(format!("{author} said {text}"));
    }
}

async fn start(echo_to_sender: bool) -> (Service, Arc<Recorder>) {
    let service = Service::bind(&local_config(echo_to_sender)).await.unwrap();
    let recorder = Arc::new(Recorder::default());
    service.set_observer(recorder.clone());
    service.start_serving();
    (service, recorder)
}

async fn wait_for_clients(service: &ServiceHandle, n: usize) {
    tokio::time::timeout(TIMEOUT, async {
        while service.client_count() != n {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("expected {n} clients, have {}", service.client_count()));
}

/// Test-side peer speaking the raw wire format.
struct Peer {
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
    decoder: LineDecoder,
    identity: String,
}

impl Peer {
    async fn connect(addr: SocketAddr) -> Peer {
        let stream = TcpStream::connect(addr).await.unwrap();
        let identity = stream.local_addr().unwrap().to_string();
        let (reader, writer) = stream.into_split();
        Peer {
            reader,
            writer,
            decoder: LineDecoder::new(),
            identity,
        }
    }

    async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.unwrap();
    }

    /// Next line, or `None` once the server closed the connection.
    async fn read_line(&mut self) -> Option<String> {
        let mut buf = [0u8; 512];
        tokio::time::timeout(TIMEOUT, async {
            loop {
                if let Some(line) = self.decoder.next_line() {
                    return Some(line);
                }
                match self.reader.read(&mut buf).await {
                    Ok(0) | Err(_) => return None,
                    Ok(n) => self.decoder.extend(&buf[..n]),
                }
            }
        })
        .await
        .expect("timed out waiting for a line")
    }

    async fn assert_silent(&mut self) {
        let mut buf = [0u8; 64];
        let read = tokio::time::timeout(Duration::from_millis(200), self.reader.read(&mut buf)).await;
        assert!(read.is_err(), "unexpected data: {read:?}");
    }
}

#[test_log::test(tokio::test)]
async fn two_clients_chat_then_one_leaves() {
    let (service, recorder) = start(true).await;
    let addr = service.local_addr();

    let mut a = Peer::connect(addr).await;
    let mut b = Peer::connect(addr).await;
    wait_for_clients(&service, 2).await;

    a.send_raw(b"hi\n").await;
    let expected = format!("{}: hi", a.identity);
    assert_eq!(a.read_line().await.as_deref(), Some(expected.as_str()));
    assert_eq!(b.read_line().await.as_deref(), Some(expected.as_str()));

    drop(b);
    wait_for_clients(&service, 1).await;

    a.send_raw(b"still here\n").await;
    let expected = format!("{}: still here", a.identity);
    assert_eq!(a.read_line().await.as_deref(), Some(expected.as_str()));
    assert_eq!(service.client_count(), 1);

    assert_eq!(recorder.count("new"), 2);
    assert_eq!(recorder.count("lost"), 1);
    assert_eq!(recorder.count(&format!("{} said hi", a.identity)), 1);
}

#[tokio::test]
async fn binding_an_occupied_port_fails_up_front() {
    let (first, _recorder) = start(true).await;

    let config = Config {
        port: first.local_addr().port(),
        ..local_config(true)
    };
    let err = Service::bind(&config).await.err().expect("second bind must fail");
    assert!(matches!(err, ServiceError::AddressInUse { .. }), "{err:?}");
}

#[test_log::test(tokio::test)]
async fn stop_with_three_clients_ends_everything() {
    let (service, recorder) = start(true).await;
    let addr = service.local_addr();

    let mut peers = Vec::new();
    for _ in 0..3 {
        peers.push(Peer::connect(addr).await);
    }
    wait_for_clients(&service, 3).await;

    service.stop_serving();
    tokio::time::timeout(TIMEOUT, service.wait_stopped())
        .await
        .expect("service did not stop");

    assert_eq!(service.phase(), ServicePhase::Stopped);
    assert_eq!(service.client_count(), 0);
    for peer in &mut peers {
        assert_eq!(peer.read_line().await, None);
    }
    assert!(TcpStream::connect(addr).await.is_err());

    let before = recorder.snapshot();
    assert!(!service.broadcast_message("anyone?"));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(recorder.snapshot(), before);
}

#[tokio::test]
async fn latin1_round_trip_is_byte_exact() {
    let (service, _recorder) = start(true).await;
    let addr = service.local_addr();

    let mut a = Peer::connect(addr).await;
    let mut b = Peer::connect(addr).await;
    wait_for_clients(&service, 2).await;

    let payload: Vec<u8> = (0x20..=0x7e).chain(0xa0..=0xff).collect();
    a.send_raw(&payload).await;
    a.send_raw(b"\r\n").await;

    let mut expected = format!("{}: ", a.identity).into_bytes();
    expected.extend_from_slice(&payload);
    expected.push(b'\n');

    let mut received = vec![0u8; expected.len()];
    tokio::time::timeout(TIMEOUT, b.reader.read_exact(&mut received))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received, expected);
    assert_eq!(charset::encode(&charset::decode(&payload)), payload);
}

#[tokio::test]
async fn author_is_skipped_when_echo_is_off() {
    let (service, _recorder) = start(false).await;
    let addr = service.local_addr();

    let mut a = Peer::connect(addr).await;
    let mut b = Peer::connect(addr).await;
    wait_for_clients(&service, 2).await;

    a.send_raw(b"quiet\n").await;
    assert_eq!(
        b.read_line().await,
        Some(format!("{}: quiet", a.identity))
    );
    a.assert_silent().await;
}

#[tokio::test]
async fn carriage_return_terminated_lines() {
    let (service, _recorder) = start(true).await;
    let mut a = Peer::connect(service.local_addr()).await;
    wait_for_clients(&service, 1).await;

    a.send_raw(b"one\rtwo\r").await;
    assert_eq!(a.read_line().await, Some(format!("{}: one", a.identity)));
    assert_eq!(a.read_line().await, Some(format!("{}: two", a.identity)));
}

#[tokio::test]
async fn operator_broadcast_is_sent_verbatim() {
    let (service, _recorder) = start(true).await;
    let mut a = Peer::connect(service.local_addr()).await;
    wait_for_clients(&service, 1).await;

    assert!(service.broadcast_message("server notice"));
    assert_eq!(a.read_line().await.as_deref(), Some("server notice"));
}

#[tokio::test]
async fn registry_tracks_churn() {
    let (service, recorder) = start(true).await;
    let addr = service.local_addr();

    let mut peers = connect_concurrently(addr, 20).await;
    wait_for_clients(&service, 20).await;

    let rest = peers.split_off(10);
    drop(peers);
    wait_for_clients(&service, 10).await;

    drop(rest);
    wait_for_clients(&service, 0).await;

    assert_eq!(recorder.count("new"), 20);
    assert_eq!(recorder.count("lost"), 20);
}

async fn connect_concurrently(addr: SocketAddr, n: usize) -> Vec<Peer> {
    let handles: Vec<_> = (0..n).map(|_| tokio::spawn(Peer::connect(addr))).collect();
    let mut peers = Vec::with_capacity(n);
    for handle in handles {
        peers.push(handle.await.unwrap());
    }
    peers
}

struct StopOnMessage {
    service: ServiceHandle,
}

impl ServiceObserver for StopOnMessage {
    fn on_message_received(&self, _author: &str, _text: &str) {
        self.service.stop_serving();
    }
}

#[test_log::test(tokio::test)]
async fn observer_can_stop_the_service() {
    let service = Service::bind(&local_config(true)).await.unwrap();
    service.set_observer(Arc::new(StopOnMessage {
        service: service.handle(),
    }));
    service.start_serving();

    let mut a = Peer::connect(service.local_addr()).await;
    wait_for_clients(&service, 1).await;
    a.send_raw(b"bye\n").await;

    tokio::time::timeout(TIMEOUT, service.wait_stopped())
        .await
        .expect("service did not stop from inside its observer");
    assert_eq!(service.phase(), ServicePhase::Stopped);
}
