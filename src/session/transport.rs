use std::collections::HashMap;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use log::{trace, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::config::NETCONF_BASE_NS;
use crate::framing::{FrameDecoder, Framing};
use crate::rpc::reply::MessageHead;
use crate::xml::{NamespacePolicy, XmlElement, decode_utf8};

use super::*;

/// A live NETCONF connection, after the `<hello>` exchange.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Capability URIs the device advertised.
    fn server_capabilities(&self) -> Vec<String>;

    fn session_id(&self) -> Option<String>;

    fn is_connected(&self) -> bool;

    /// Sends a complete `<rpc>` message and waits up to `timeout` for the
    /// `<rpc-reply>` with the same message-id.
    async fn rpc(
        &self,
        message_id: u64,
        request: &str,
        timeout: Duration,
    ) -> Result<String, NetconfError>;

    /// Waits up to `wait` for the next `<notification>`.
    async fn take_notification(&self, wait: Duration) -> Result<Option<String>, NetconfError>;

    async fn close(&self) -> Result<(), NetconfError>;
}

/// Opens transports for one transport variant.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(
        &self,
        endpoint: &DeviceEndpoint,
        log: &MessageLog,
    ) -> Result<Arc<dyn Transport>, NetconfError>;
}

type PendingReply = oneshot::Sender<Result<String, NetconfError>>;

/// How a [`FramedChannel`] is set up.
pub(super) struct ChannelOptions {
    pub label: String,
    pub client_capabilities: &'static [&'static str],
    /// Use chunked framing after the hello regardless of what the peer
    /// advertises.
    pub force_chunked: bool,
    /// Reply handed to waiting callers when the peer stops sending data.
    pub eof_reply: Option<String>,
    pub hello_timeout: Duration,
}

/// NETCONF message exchange over any byte stream pair.
///
/// A background task owns the reader and writer: it writes queued frames,
/// decodes incoming ones, routes `<rpc-reply>` messages to the caller
/// waiting on that message-id and queues `<notification>` messages.
pub(super) struct FramedChannel {
    label: String,
    capabilities: Vec<String>,
    session_id: Option<String>,
    framing: Framing,
    outbound: mpsc::Sender<Vec<u8>>,
    pending: Arc<StdMutex<HashMap<String, PendingReply>>>,
    notifications: Mutex<mpsc::Receiver<String>>,
    closed: Arc<AtomicBool>,
    eof_reply: Option<String>,
    cancel: CancellationToken,
}

fn client_hello(capabilities: &[&str]) -> String {
    let mut caps = XmlElement::qualified(NETCONF_BASE_NS, None, "capabilities");
    for uri in capabilities {
        caps.push(XmlElement::qualified(NETCONF_BASE_NS, None, "capability").with_text(*uri));
    }
    let hello = XmlElement::qualified(NETCONF_BASE_NS, None, "hello").with_child(caps);
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{}",
        hello.render(NamespacePolicy::Minimal)
    )
}

async fn read_hello<R>(
    reader: &mut R,
    decoder: &mut FrameDecoder,
    label: &str,
) -> Result<Vec<u8>, NetconfError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; 16 * 1024];
    loop {
        if let Some(message) = decoder.next_message()? {
            return Ok(message);
        }
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Err(NetconfError::SessionTerminated(format!(
                "{label} closed the connection during the hello exchange"
            )));
        }
        decoder.extend(&buf[..n]);
    }
}

fn lock_pending(
    pending: &StdMutex<HashMap<String, PendingReply>>,
) -> std::sync::MutexGuard<'_, HashMap<String, PendingReply>> {
    pending.lock().unwrap_or_else(|e| e.into_inner())
}

impl FramedChannel {
    /// Performs the `<hello>` exchange and starts the I/O task.
    pub(super) async fn establish<R, W>(
        mut reader: R,
        mut writer: W,
        options: ChannelOptions,
        log: &MessageLog,
    ) -> Result<Self, NetconfError>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let label = options.label.clone();
        let hello = client_hello(options.client_capabilities);
        writer
            .write_all(&Framing::EndOfMessage.encode(&hello))
            .await?;
        writer.flush().await?;
        log.append_hello("sent", &hello, options.client_capabilities.len());

        let mut decoder = FrameDecoder::new(Framing::EndOfMessage);
        let server_hello = tokio::time::timeout(
            options.hello_timeout,
            read_hello(&mut reader, &mut decoder, &label),
        )
        .await
        .map_err(|_| NetconfError::Timeout {
            operation: format!("hello exchange with {label}"),
            seconds: options.hello_timeout.as_secs(),
        })??;
        let server_hello = decode_utf8(server_hello)?;

        let root = XmlElement::parse(&server_hello)
            .map_err(|e| NetconfError::Decode(format!("invalid hello from {label}: {e}")))?;
        if root.name() != "hello" {
            return Err(NetconfError::Decode(format!(
                "expected <hello> from {label}, found <{}>",
                root.name()
            )));
        }
        let capabilities: Vec<String> = root
            .descendants("capability")
            .into_iter()
            .filter_map(|c| c.text())
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        let session_id = root
            .child("session-id")
            .and_then(|s| s.text())
            .map(|s| s.trim().to_string());
        log.append_hello("received", &server_hello, capabilities.len());

        let peer_1_1 = capabilities.iter().any(|c| c == config::CAP_BASE_1_1);
        let framing = if options.force_chunked
            || (peer_1_1 && options.client_capabilities.contains(&config::CAP_BASE_1_1))
        {
            Framing::Chunked
        } else {
            Framing::EndOfMessage
        };
        decoder.set_framing(framing);
        debug!(
            "{label} hello complete: session-id {:?}, {} capabilities, {:?} framing",
            session_id,
            capabilities.len(),
            framing
        );

        let (outbound, outbound_rx) = mpsc::channel::<Vec<u8>>(32);
        let (notify_tx, notify_rx) = mpsc::channel::<String>(256);
        let pending: Arc<StdMutex<HashMap<String, PendingReply>>> = Arc::default();
        let closed = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();

        tokio::spawn(io_task(IoTask {
            label: label.clone(),
            reader,
            writer,
            decoder,
            outbound: outbound_rx,
            notifications: notify_tx,
            pending: pending.clone(),
            closed: closed.clone(),
            eof_reply: options.eof_reply.clone(),
            cancel: cancel.clone(),
        }));

        Ok(Self {
            label,
            capabilities,
            session_id,
            framing,
            outbound,
            pending,
            notifications: Mutex::new(notify_rx),
            closed,
            eof_reply: options.eof_reply,
            cancel,
        })
    }

    pub(super) fn capabilities(&self) -> Vec<String> {
        self.capabilities.clone()
    }

    pub(super) fn session_id(&self) -> Option<String> {
        self.session_id.clone()
    }

    pub(super) fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    fn terminated(&self) -> Result<String, NetconfError> {
        match &self.eof_reply {
            Some(reply) => Ok(reply.clone()),
            None => Err(NetconfError::SessionTerminated(self.label.clone())),
        }
    }

    pub(super) async fn rpc(
        &self,
        message_id: u64,
        request: &str,
        timeout: Duration,
    ) -> Result<String, NetconfError> {
        if !self.is_connected() {
            return self.terminated();
        }
        let key = message_id.to_string();
        let (tx, rx) = oneshot::channel();
        lock_pending(&self.pending).insert(key.clone(), tx);
        // The I/O task marks itself closed before failing pending requests.
        if !self.is_connected() {
            lock_pending(&self.pending).remove(&key);
            return self.terminated();
        }

        if self.outbound.send(self.framing.encode(request)).await.is_err() {
            lock_pending(&self.pending).remove(&key);
            return self.terminated();
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => self.terminated(),
            Err(_) => {
                lock_pending(&self.pending).remove(&key);
                Err(NetconfError::Timeout {
                    operation: format!("rpc message-id {key}"),
                    seconds: timeout.as_secs(),
                })
            }
        }
    }

    pub(super) async fn take_notification(
        &self,
        wait: Duration,
    ) -> Result<Option<String>, NetconfError> {
        let mut rx = self.notifications.lock().await;
        match tokio::time::timeout(wait, rx.recv()).await {
            Ok(Some(notification)) => Ok(Some(notification)),
            Ok(None) => Err(NetconfError::SessionTerminated(self.label.clone())),
            Err(_) => Ok(None),
        }
    }

    pub(super) fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.cancel.cancel();
    }
}

impl Drop for FramedChannel {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct IoTask<R, W> {
    label: String,
    reader: R,
    writer: W,
    decoder: FrameDecoder,
    outbound: mpsc::Receiver<Vec<u8>>,
    notifications: mpsc::Sender<String>,
    pending: Arc<StdMutex<HashMap<String, PendingReply>>>,
    closed: Arc<AtomicBool>,
    eof_reply: Option<String>,
    cancel: CancellationToken,
}

async fn io_task<R, W>(mut task: IoTask<R, W>)
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let mut buf = vec![0u8; 16 * 1024];
    'io: loop {
        loop {
            match task.decoder.next_message() {
                Ok(Some(message)) => route(&task, message),
                Ok(None) => break,
                Err(e) => {
                    warn!("{} framing error, closing session: {}", task.label, e);
                    break 'io;
                }
            }
        }

        tokio::select! {
            _ = task.cancel.cancelled() => break,
            frame = task.outbound.recv() => match frame {
                Some(frame) => {
                    trace!("{} sending {} bytes", task.label, frame.len());
                    if let Err(e) = task.writer.write_all(&frame).await {
                        debug!("{} failed to write frame: {:?}", task.label, e);
                        break;
                    }
                    if let Err(e) = task.writer.flush().await {
                        debug!("{} failed to flush frame: {:?}", task.label, e);
                        break;
                    }
                }
                None => break,
            },
            read = task.reader.read(&mut buf) => match read {
                Ok(0) => {
                    debug!("{} returned no data, peer closed the session", task.label);
                    break;
                }
                Ok(n) => task.decoder.extend(&buf[..n]),
                Err(e) => {
                    debug!("{} read failed: {:?}", task.label, e);
                    break;
                }
            },
        }
    }

    task.closed.store(true, Ordering::SeqCst);
    let waiting: Vec<PendingReply> = lock_pending(&task.pending).drain().map(|(_, tx)| tx).collect();
    for tx in waiting {
        let reply = match &task.eof_reply {
            Some(reply) => Ok(reply.clone()),
            None => Err(NetconfError::SessionTerminated(task.label.clone())),
        };
        let _ = tx.send(reply);
    }
    let _ = task.writer.shutdown().await;
    debug!("{} I/O task ended", task.label);
}

fn route<R, W>(task: &IoTask<R, W>, message: Vec<u8>) {
    let head = MessageHead::peek(&String::from_utf8_lossy(&message));
    let decoded = decode_utf8(message);
    let Some(head) = head else {
        warn!("{} received a message without a root element", task.label);
        return;
    };

    match head.root.as_str() {
        "rpc-reply" => {
            let mut pending = lock_pending(&task.pending);
            let key = match head.message_id {
                Some(id) if pending.contains_key(&id) => Some(id),
                // Some agents omit message-id on errors; only unambiguous
                // when a single request is outstanding.
                None if pending.len() == 1 => pending.keys().next().cloned(),
                _ => None,
            };
            match key.and_then(|k| pending.remove(&k)) {
                Some(tx) => {
                    let _ = tx.send(decoded);
                }
                None => warn!("{} dropped an unsolicited rpc-reply", task.label),
            }
        }
        "notification" => match decoded {
            Ok(text) => {
                if task.notifications.try_send(text).is_err() {
                    warn!("{} notification queue full, dropping notification", task.label);
                }
            }
            Err(e) => warn!("{} undecodable notification: {}", task.label, e),
        },
        other => debug!("{} ignoring unexpected <{}> message", task.label, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, BufReader, duplex};

    const SERVER_HELLO: &str = r#"<hello xmlns="urn:ietf:params:xml:ns:netconf:base:1.0"><capabilities><capability>urn:ietf:params:netconf:base:1.1</capability><capability>urn:ietf:params:netconf:capability:candidate:1.0</capability></capabilities><session-id>42</session-id></hello>]]>]]>"#;

    fn options(eof_reply: Option<String>) -> ChannelOptions {
        ChannelOptions {
            label: "test".to_string(),
            client_capabilities: config::CLIENT_CAPABILITIES,
            force_chunked: false,
            eof_reply,
            hello_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn hello_then_chunked_rpc() {
        let (client, server) = duplex(64 * 1024);
        let (client_read, client_write) = tokio::io::split(client);
        let (server_read, mut server_write) = tokio::io::split(server);

        let peer = tokio::spawn(async move {
            server_write.write_all(SERVER_HELLO.as_bytes()).await.expect("hello");
            let mut reader = BufReader::new(server_read);
            let mut seen = Vec::new();
            // client hello, then the chunk header of the request
            loop {
                let mut line = Vec::new();
                reader.read_until(b'>', &mut line).await.expect("read");
                seen.extend_from_slice(&line);
                if seen.windows(6).any(|w| w == b"]]>]]>") {
                    break;
                }
            }
            let mut header = String::new();
            reader.read_line(&mut header).await.expect("blank");
            header.clear();
            reader.read_line(&mut header).await.expect("size");
            let size: usize = header.trim_start_matches('#').trim().parse().expect("size");
            let mut body = vec![0u8; size];
            reader.read_exact(&mut body).await.expect("body");
            let reply = r#"<rpc-reply xmlns="urn:ietf:params:xml:ns:netconf:base:1.0" message-id="101"><ok/></rpc-reply>"#;
            server_write
                .write_all(&Framing::Chunked.encode(reply))
                .await
                .expect("reply");
            String::from_utf8(body).expect("utf8")
        });

        let log = MessageLog::default();
        let channel = FramedChannel::establish(client_read, client_write, options(None), &log)
            .await
            .expect("hello");
        assert_eq!(channel.session_id().as_deref(), Some("42"));
        assert_eq!(channel.capabilities().len(), 2);

        let reply = channel
            .rpc(101, "<rpc message-id=\"101\"><commit/></rpc>", Duration::from_secs(5))
            .await
            .expect("reply");
        assert!(reply.contains("<ok/>"));
        assert_eq!(
            peer.await.expect("peer"),
            "<rpc message-id=\"101\"><commit/></rpc>"
        );
        assert_eq!(log.len(), 2);
    }

    #[tokio::test]
    async fn peer_eof_yields_configured_reply() {
        let (client, server) = duplex(64 * 1024);
        let (client_read, client_write) = tokio::io::split(client);
        let (mut server_read, mut server_write) = tokio::io::split(server);

        let peer = tokio::spawn(async move {
            server_write.write_all(SERVER_HELLO.as_bytes()).await.expect("hello");
            let mut sink = vec![0u8; 4096];
            // wait for the request to arrive, then hang up
            let mut total = Vec::new();
            while !String::from_utf8_lossy(&total).contains("##") {
                let n = server_read.read(&mut sink).await.expect("read");
                if n == 0 {
                    break;
                }
                total.extend_from_slice(&sink[..n]);
            }
            drop(server_write);
            drop(server_read);
        });

        let log = MessageLog::default();
        let channel = FramedChannel::establish(
            client_read,
            client_write,
            options(Some("<rpc-reply><rpc-error/></rpc-reply>".to_string())),
            &log,
        )
        .await
        .expect("hello");
        let reply = channel
            .rpc(101, "<rpc message-id=\"101\"><get/></rpc>", Duration::from_secs(5))
            .await
            .expect("synthesized reply");
        assert!(reply.contains("rpc-error"));
        peer.await.expect("peer");
    }
}
