//! NETCONF sessions and everything that drives them.
//!
//! A [`Session`] owns one live transport to a device together with the
//! capability snapshot taken at connect time, the set of datastores it has
//! locked, a background notification listener and a rolling message log.
//! Sessions are created and cached per [`SessionIdentity`] by the
//! [`SessionRegistry`].
//!
//! # Main Components
//!
//! - [`SessionRegistry`] - Injectable cache of live sessions
//! - [`Session`] - Connection state machine (Disconnected, Connecting, Connected)
//! - [`Connector`] / [`Transport`] - Seams for the SSH, pipe and replay transports
//! - [`Dispatcher`] - Runs a batch of operations with commit/discard policy
//! - [`try_lock`] - Lock retry with transient/fatal error classification

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::Duration;

use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, RwLock};

use crate::capabilities::Capabilities;
use crate::config;
use crate::error::NetconfError;
use crate::rpc::RpcBuilder;

pub use dispatch::{Dispatcher, OperationResult, OperationStatus};
pub use lock::{LockPolicy, UnlockOutcome, lock_datastore, try_lock, unlock_datastore};
pub use manager::{Connectors, SessionRegistry};
pub use message_log::{LogEntry, MessageLog};
pub use pipe::PipeConnector;
pub use replay::{ConnectFailure, ReplayConnector, ReplayScript, ReplayStep};
pub use security::{ConnectionSecurityOptions, SecurityLevel};
pub use ssh::SshConnector;
pub use transport::{Connector, Transport};

use listener::NotificationListener;

/// Key under which a session is cached: who is talking to which device, and
/// optionally on which stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
pub struct SessionIdentity {
    pub user: String,
    pub device: String,
    #[serde(default)]
    pub stream: Option<String>,
}

impl SessionIdentity {
    pub fn new(user: impl Into<String>, device: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            device: device.into(),
            stream: None,
        }
    }

    pub fn with_stream(mut self, stream: impl Into<String>) -> Self {
        self.stream = Some(stream.into());
        self
    }
}

impl fmt::Display for SessionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.stream {
            Some(stream) => write!(f, "{}@{}/{}", self.user, self.device, stream),
            None => write!(f, "{}@{}", self.user, self.device),
        }
    }
}

/// Which wire transport a device is reached through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TransportVariant {
    /// NETCONF over the SSH `netconf` subsystem.
    #[default]
    Standard,
    /// NETCONF framed over the stdin/stdout of a local subprocess.
    Pipe,
}

fn default_port() -> u16 {
    config::DEFAULT_NETCONF_PORT
}

fn default_timeout_secs() -> u64 {
    config::DEFAULT_RPC_TIMEOUT_SECS
}

fn default_true() -> bool {
    true
}

/// Connection parameters for one device.
#[derive(Clone, Serialize, Deserialize, JsonSchema)]
pub struct DeviceEndpoint {
    /// Profile name, used in log lines and error messages.
    pub name: String,
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Bound on connect and on each RPC round-trip.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub transport: TransportVariant,
    /// Accept any host key presented by the device.
    #[serde(default)]
    pub skip_host_key_check: bool,
    #[serde(default = "default_true")]
    pub netconf_enabled: bool,
    #[serde(default)]
    pub security_level: SecurityLevel,
    /// Program and arguments spawned by the pipe transport.
    #[serde(default)]
    pub pipe_command: Option<Vec<String>>,
}

impl DeviceEndpoint {
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            port: config::DEFAULT_NETCONF_PORT,
            username: username.into(),
            password: password.into(),
            timeout_secs: config::DEFAULT_RPC_TIMEOUT_SECS,
            transport: TransportVariant::Standard,
            skip_host_key_check: false,
            netconf_enabled: true,
            security_level: SecurityLevel::default(),
            pipe_command: None,
        }
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Argument vector for the pipe transport.
    pub fn pipe_argv(&self) -> Vec<String> {
        match &self.pipe_command {
            Some(argv) if !argv.is_empty() => argv.clone(),
            _ => vec![
                config::DEFAULT_PIPE_PROGRAM.to_string(),
                "-i".to_string(),
                "0".to_string(),
                "-o".to_string(),
                "1".to_string(),
                "-u".to_string(),
                self.username.clone(),
            ],
        }
    }

    /// SHA-256 over every parameter that affects the connection, so cached
    /// sessions can be compared without keeping the password around twice.
    pub fn fingerprint(&self) -> [u8; 32] {
        let parts = [
            self.address.clone(),
            self.port.to_string(),
            self.username.clone(),
            self.password.clone(),
            self.timeout_secs.to_string(),
            format!("{:?}", self.transport),
            self.skip_host_key_check.to_string(),
            format!("{:?}", self.security_level),
            self.pipe_argv().join(" "),
        ];
        let mut hasher = Sha256::new();
        for part in &parts {
            hasher.update(part.as_bytes());
            hasher.update([0u8]);
        }
        hasher.finalize().into()
    }
}

impl fmt::Debug for DeviceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceEndpoint")
            .field("name", &self.name)
            .field("address", &self.address)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("timeout_secs", &self.timeout_secs)
            .field("transport", &self.transport)
            .field("skip_host_key_check", &self.skip_host_key_check)
            .field("netconf_enabled", &self.netconf_enabled)
            .field("security_level", &self.security_level)
            .field("pipe_command", &self.pipe_command)
            .finish()
    }
}

/// Connection state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Disconnected,
    Connecting,
    Connected,
}

struct SessionState {
    phase: SessionPhase,
    transport: Option<Arc<dyn Transport>>,
    capabilities: Arc<Capabilities>,
    session_id: Option<String>,
    locked: BTreeSet<String>,
    listener: Option<NotificationListener>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Disconnected,
            transport: None,
            capabilities: Arc::new(Capabilities::default()),
            session_id: None,
            locked: BTreeSet::new(),
            listener: None,
        }
    }
}

/// One NETCONF session to a device.
pub struct Session {
    identity: SessionIdentity,
    endpoint: DeviceEndpoint,
    fingerprint: [u8; 32],
    connector: Arc<dyn Connector>,
    builder: RpcBuilder,
    state: RwLock<SessionState>,
    /// Serializes connect and disconnect.
    connect_gate: Mutex<()>,
    log: MessageLog,
    next_message_id: AtomicU64,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("identity", &self.identity)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(listener) = self.state.get_mut().listener.take() {
            debug!("{} dropped while connected, stopping listener", self.identity);
            listener.cancel();
        }
    }
}

mod client;
mod dispatch;
mod listener;
mod lock;
mod manager;
mod message_log;
mod pipe;
mod replay;
mod security;
mod ssh;
mod transport;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_debug_redacts_password() {
        let endpoint = DeviceEndpoint::new("csr1", "10.0.0.1", "admin", "s3cret");
        let text = format!("{endpoint:?}");
        assert!(!text.contains("s3cret"));
        assert!(text.contains("<redacted>"));
    }

    #[test]
    fn endpoint_defaults_from_json() {
        let endpoint: DeviceEndpoint = serde_json::from_str(
            r#"{"name":"csr1","address":"10.0.0.1","username":"admin","password":"x"}"#,
        )
        .expect("json");
        assert_eq!(endpoint.port, 830);
        assert_eq!(endpoint.timeout_secs, 30);
        assert_eq!(endpoint.transport, TransportVariant::Standard);
        assert!(endpoint.netconf_enabled);
        assert!(!endpoint.skip_host_key_check);
    }

    #[test]
    fn fingerprint_tracks_password() {
        let a = DeviceEndpoint::new("csr1", "10.0.0.1", "admin", "one");
        let mut b = a.clone();
        assert_eq!(a.fingerprint(), b.fingerprint());
        b.password = "two".to_string();
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn default_pipe_command_runs_proxy_as_user() {
        let endpoint = DeviceEndpoint::new("local", "127.0.0.1", "lab", "");
        assert_eq!(
            endpoint.pipe_argv(),
            vec!["netconf_sshd_proxy", "-i", "0", "-o", "1", "-u", "lab"]
        );
    }

    #[test]
    fn identity_display_includes_stream() {
        let id = SessionIdentity::new("alice", "csr1").with_stream("events");
        assert_eq!(id.to_string(), "alice@csr1/events");
    }
}
