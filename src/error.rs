//! Error types for NETCONF sessions, RPC construction and operation dispatch.
//!
//! Errors fall into three groups: connection-level failures (the session
//! could not be established or was lost), capability-level rejections (the
//! device does not advertise what the request needs) and operation-level
//! failures (a request was malformed, the device answered with an
//! `<rpc-error>`, or the reply could not be decoded).

use thiserror::Error;

use crate::rpc::RpcInputError;

/// Errors that can occur while talking NETCONF to a device.
#[derive(Error, Debug)]
pub enum NetconfError {
    /// The device actively refused the connection attempt.
    #[error("connection refused by device \"{device}\": {detail}")]
    ConnectionRefused { device: String, detail: String },

    /// The SSH host key presented by the device is not trusted.
    ///
    /// Callers usually react by suggesting that host key verification be
    /// disabled for this device profile.
    #[error(
        "host key of device \"{0}\" is not trusted; enable skip_host_key_check for this device to connect anyway"
    )]
    HostKeyUntrusted(String),

    /// The device rejected the supplied credentials.
    #[error("authentication failed for device \"{0}\"")]
    AuthenticationFailed(String),

    /// Any other failure while opening or using the transport.
    #[error("transport failure: {0}")]
    TransportFailure(String),

    /// The peer closed the session while it was in use.
    #[error("session terminated by peer: {0}")]
    SessionTerminated(String),

    /// An operation was attempted on a session that is not connected.
    #[error("no active NETCONF session to \"{0}\"")]
    NotConnected(String),

    /// No reply arrived within the device's RPC timeout.
    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    /// The device does not advertise the capability a request needs.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// The device profile is not marked as supporting NETCONF.
    #[error("Device \"{0}\" is not marked as supporting NETCONF")]
    NetconfDisabled(String),

    /// The request was rejected by the RPC builder before anything was sent.
    #[error(transparent)]
    MalformedRequest(#[from] RpcInputError),

    /// The device answered with an `<rpc-error>`.
    ///
    /// `raw` keeps the device-reported XML so it can be shown verbatim.
    #[error("rpc-error {tag}: {message}")]
    RpcError {
        tag: String,
        message: String,
        raw: String,
    },

    /// The lock was refused for a reason retrying cannot fix.
    #[error("cannot acquire lock on {datastore}: {tag}")]
    LockRejected { datastore: String, tag: String },

    /// The lock stayed contended for every permitted attempt.
    #[error("locking {datastore} failed after {attempts} attempts: retry limit exceeded")]
    LockRetryExhausted { datastore: String, attempts: u32 },

    /// Reply bytes were not valid in the expected encoding.
    #[error("decode error: {0}")]
    Decode(String),

    /// The byte stream violated NETCONF message framing.
    #[error("framing error: {0}")]
    Framing(String),

    /// An error occurred in the async-ssh2-tokio library.
    #[error("async ssh2 error: {0}")]
    Ssh2Error(#[from] async_ssh2_tokio::Error),

    /// An error occurred in the russh library.
    #[error("russh error: {0}")]
    RusshError(#[from] russh::Error),

    /// Unexpected internal failure (log export, task join).
    #[error("internal error: {0}")]
    Internal(String),

    /// Local I/O failure (pipe subprocess, socket).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl NetconfError {
    /// Returns true for failures that mean the session itself is unusable.
    pub fn is_connection_level(&self) -> bool {
        matches!(
            self,
            NetconfError::ConnectionRefused { .. }
                | NetconfError::HostKeyUntrusted(_)
                | NetconfError::AuthenticationFailed(_)
                | NetconfError::TransportFailure(_)
                | NetconfError::SessionTerminated(_)
                | NetconfError::NotConnected(_)
                | NetconfError::Framing(_)
                | NetconfError::Ssh2Error(_)
                | NetconfError::RusshError(_)
                | NetconfError::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_key_message_suggests_opt_out() {
        let err = NetconfError::HostKeyUntrusted("csr1".to_string());
        assert!(err.to_string().contains("skip_host_key_check"));
        assert!(err.is_connection_level());
    }

    #[test]
    fn rpc_error_is_operation_level() {
        let err = NetconfError::RpcError {
            tag: "access-denied".to_string(),
            message: "denied".to_string(),
            raw: "<rpc-reply/>".to_string(),
        };
        assert!(!err.is_connection_level());
        assert_eq!(err.to_string(), "rpc-error access-denied: denied");
    }
}
