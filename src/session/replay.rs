use std::collections::{HashMap, VecDeque};
use std::sync::Mutex as StdMutex;
use std::sync::MutexGuard;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use super::*;
use crate::config::NETCONF_BASE_NS;
use crate::xml::XmlElement;

/// One scripted reply in a JSONL replay fixture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ReplayStep {
    /// Local name of the operation element the reply answers, e.g.
    /// `edit-config`.
    pub operation: String,
    /// Reply body placed inside `<rpc-reply>`, or a complete `<rpc-reply>`.
    pub reply: String,
}

#[derive(Debug, Clone)]
enum Scripted {
    Reply(String),
    /// The device never answers; the request times out.
    Stall,
}

#[derive(Debug, Default)]
struct ScriptState {
    replies: HashMap<String, VecDeque<Scripted>>,
    sent: Vec<String>,
    notifications: VecDeque<String>,
    generation: u64,
    hung_up: bool,
}

/// Scripted device behaviour shared between a test and the
/// [`ReplayConnector`] transports it hands out.
///
/// Replies are queued per operation name; the last queued reply for an
/// operation is repeated once the queue runs dry. Operations without any
/// scripted reply are answered with `<ok/>`. A [`stall`](Self::stall) in the
/// queue makes that request time out instead.
#[derive(Debug, Clone, Default)]
pub struct ReplayScript {
    state: Arc<StdMutex<ScriptState>>,
}

impl ReplayScript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads scripted replies from JSONL, one [`ReplayStep`] per line.
    pub fn from_jsonl(jsonl: &str) -> Result<Self, NetconfError> {
        let script = Self::new();
        for (idx, line) in jsonl.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let step: ReplayStep = serde_json::from_str(line).map_err(|e| {
                NetconfError::Decode(format!("invalid replay step on line {}: {e}", idx + 1))
            })?;
            script.respond(&step.operation, step.reply);
        }
        Ok(script)
    }

    fn guard(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queues a reply for the next `operation` request.
    pub fn respond(&self, operation: &str, reply: impl Into<String>) -> &Self {
        self.queue(operation, Scripted::Reply(reply.into()))
    }

    /// Queues a request for `operation` that never gets a reply.
    pub fn stall(&self, operation: &str) -> &Self {
        self.queue(operation, Scripted::Stall)
    }

    fn queue(&self, operation: &str, step: Scripted) -> &Self {
        self.guard()
            .replies
            .entry(operation.to_string())
            .or_default()
            .push_back(step);
        self
    }

    /// Queues a `<notification>` for delivery to the session listener.
    pub fn push_notification(&self, notification: impl Into<String>) {
        self.guard().notifications.push_back(notification.into());
    }

    /// Every `<rpc>` message received, in order.
    pub fn sent(&self) -> Vec<String> {
        self.guard().sent.clone()
    }

    /// Operation element names of the messages received, in order.
    pub fn sent_operations(&self) -> Vec<String> {
        self.sent()
            .iter()
            .map(|message| operation_name(message).unwrap_or_default())
            .collect()
    }

    /// Drops the current connection; the next connect opens a fresh one.
    pub fn hang_up(&self) {
        self.guard().hung_up = true;
    }

    fn attach(&self) -> u64 {
        let mut state = self.guard();
        state.hung_up = false;
        state.generation += 1;
        state.generation
    }

    fn is_live(&self, generation: u64) -> bool {
        let state = self.guard();
        !state.hung_up && state.generation == generation
    }

    /// Reply to `request`, or `None` when the script stalls it.
    fn answer(&self, message_id: u64, request: &str) -> Option<String> {
        let operation = operation_name(request).unwrap_or_default();
        let mut state = self.guard();
        state.sent.push(request.to_string());
        let step = match state.replies.get_mut(&operation) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };
        let body = match step {
            Some(Scripted::Stall) => return None,
            Some(Scripted::Reply(body)) => body,
            None => "<ok/>".to_string(),
        };
        if body.trim_start().starts_with("<rpc-reply") {
            Some(body)
        } else {
            Some(format!(
                "<rpc-reply xmlns=\"{NETCONF_BASE_NS}\" message-id=\"{message_id}\">{body}</rpc-reply>"
            ))
        }
    }
}

fn operation_name(request: &str) -> Option<String> {
    let root = XmlElement::parse(request).ok()?;
    root.children().first().map(|op| op.name().to_string())
}

/// How a scripted connect attempt fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectFailure {
    Refused,
    HostKeyUntrusted,
    AuthenticationFailed,
    Transport(String),
}

/// Connector that serves a [`ReplayScript`] instead of a real device.
#[derive(Debug, Clone)]
pub struct ReplayConnector {
    script: ReplayScript,
    capabilities: Vec<String>,
    opens: Arc<AtomicUsize>,
    failures: Arc<StdMutex<VecDeque<ConnectFailure>>>,
    open_delay: Duration,
}

impl ReplayConnector {
    pub fn new(script: ReplayScript, capabilities: &[&str]) -> Self {
        Self {
            script,
            capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
            opens: Arc::new(AtomicUsize::new(0)),
            failures: Arc::default(),
            open_delay: Duration::ZERO,
        }
    }

    /// Delays every open, to widen race windows in tests.
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    pub fn fail_next_connect(&self, failure: ConnectFailure) {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(failure);
    }

    /// Number of connect attempts seen so far.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn script(&self) -> &ReplayScript {
        &self.script
    }
}

#[async_trait]
impl Connector for ReplayConnector {
    async fn open(
        &self,
        endpoint: &DeviceEndpoint,
        log: &MessageLog,
    ) -> Result<Arc<dyn Transport>, NetconfError> {
        let attempt = self.opens.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.open_delay.is_zero() {
            tokio::time::sleep(self.open_delay).await;
        }

        let device = format!("{}:{}", endpoint.address, endpoint.port);
        let failure = self
            .failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        if let Some(failure) = failure {
            return Err(match failure {
                ConnectFailure::Refused => NetconfError::ConnectionRefused {
                    device,
                    detail: "connection refused".to_string(),
                },
                ConnectFailure::HostKeyUntrusted => NetconfError::HostKeyUntrusted(device),
                ConnectFailure::AuthenticationFailed => {
                    NetconfError::AuthenticationFailed(format!("{}@{}", endpoint.username, device))
                }
                ConnectFailure::Transport(detail) => NetconfError::TransportFailure(detail),
            });
        }

        log.append_hello("sent", "<hello/>", config::CLIENT_CAPABILITIES.len());
        log.append_hello("received", &self.capabilities.join("\n"), self.capabilities.len());
        let generation = self.script.attach();
        Ok(Arc::new(ReplayTransport {
            script: self.script.clone(),
            capabilities: self.capabilities.clone(),
            session_id: format!("{}", 1000 + attempt),
            generation,
        }))
    }
}

struct ReplayTransport {
    script: ReplayScript,
    capabilities: Vec<String>,
    session_id: String,
    generation: u64,
}

#[async_trait]
impl Transport for ReplayTransport {
    fn server_capabilities(&self) -> Vec<String> {
        self.capabilities.clone()
    }

    fn session_id(&self) -> Option<String> {
        Some(self.session_id.clone())
    }

    fn is_connected(&self) -> bool {
        self.script.is_live(self.generation)
    }

    async fn rpc(
        &self,
        message_id: u64,
        request: &str,
        timeout: Duration,
    ) -> Result<String, NetconfError> {
        if !self.is_connected() {
            return Err(NetconfError::SessionTerminated(format!(
                "replay session {}",
                self.session_id
            )));
        }
        self.script
            .answer(message_id, request)
            .ok_or_else(|| NetconfError::Timeout {
                operation: format!("rpc message-id {message_id}"),
                seconds: timeout.as_secs(),
            })
    }

    async fn take_notification(&self, wait: Duration) -> Result<Option<String>, NetconfError> {
        if !self.is_connected() {
            return Err(NetconfError::SessionTerminated(format!(
                "replay session {}",
                self.session_id
            )));
        }
        let next = self.script.guard().notifications.pop_front();
        if next.is_none() {
            tokio::time::sleep(wait).await;
        }
        Ok(next)
    }

    async fn close(&self) -> Result<(), NetconfError> {
        let mut state = self.script.guard();
        if state.generation == self.generation {
            state.hung_up = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_reply_is_sticky_and_unscripted_is_ok() {
        let script = ReplayScript::new();
        script
            .respond("lock", "<rpc-error><error-tag>lock-denied</error-tag></rpc-error>")
            .respond("lock", "<ok/>");
        let first = script.answer(101, "<rpc message-id=\"101\"><lock/></rpc>").expect("first");
        let second = script.answer(102, "<rpc message-id=\"102\"><lock/></rpc>").expect("second");
        let third = script.answer(103, "<rpc message-id=\"103\"><lock/></rpc>").expect("third");
        let other = script.answer(104, "<rpc message-id=\"104\"><commit/></rpc>").expect("other");
        assert!(first.contains("lock-denied"));
        assert!(second.contains("<ok/>"));
        assert!(third.contains("<ok/>"));
        assert!(other.contains("message-id=\"104\"><ok/>"));
        assert_eq!(script.sent_operations(), vec!["lock", "lock", "lock", "commit"]);
    }

    #[test]
    fn loads_steps_from_jsonl() {
        let script = ReplayScript::from_jsonl(
            r#"{"operation":"commit","reply":"<rpc-error><error-tag>operation-failed</error-tag></rpc-error>"}

{"operation":"get","reply":"<data/>"}"#,
        )
        .expect("jsonl");
        assert!(
            script
                .answer(101, "<rpc><commit/></rpc>")
                .is_some_and(|r| r.contains("operation-failed"))
        );
        assert!(
            script
                .answer(102, "<rpc><get/></rpc>")
                .is_some_and(|r| r.contains("<data/>"))
        );
    }

    #[test]
    fn stalled_request_is_recorded_without_a_reply() {
        let script = ReplayScript::new();
        script.stall("commit").respond("commit", "<ok/>");
        assert!(script.answer(101, "<rpc><commit/></rpc>").is_none());
        assert!(script.answer(102, "<rpc><commit/></rpc>").is_some());
        assert_eq!(script.sent_operations(), vec!["commit", "commit"]);
    }

    #[test]
    fn invalid_jsonl_reports_the_line() {
        let err = ReplayScript::from_jsonl("{\"operation\":\"get\"}").expect_err("missing reply");
        assert!(err.to_string().contains("line 1"));
    }
}
