//! Protocol constants and connection defaults.
//!
//! Namespaces and capability URIs used when building requests and reading
//! capability lists, the defaults applied to device endpoints and lock
//! retries, and the SSH algorithm lists used by
//! [`ConnectionSecurityOptions`](crate::session::ConnectionSecurityOptions).

use std::time::Duration;

use russh::keys::{Algorithm, EcdsaCurve, HashAlg};
use russh::{cipher, compression, kex, mac};

/// NETCONF base namespace (RFC 6241).
pub const NETCONF_BASE_NS: &str = "urn:ietf:params:xml:ns:netconf:base:1.0";
/// YANG 1.1 namespace, home of the `<action>` element.
pub const YANG_1_NS: &str = "urn:ietf:params:xml:ns:yang:1";
/// RFC 6243 with-defaults parameter namespace.
pub const WITH_DEFAULTS_NS: &str = "urn:ietf:params:xml:ns:yang:ietf-netconf-with-defaults";
/// Event notification namespace (RFC 5277).
pub const NOTIFICATION_NS: &str = "urn:ietf:params:xml:ns:netconf:notification:1.0";
/// ietf-yang-library module namespace.
pub const YANG_LIBRARY_NS: &str = "urn:ietf:params:xml:ns:yang:ietf-yang-library";
/// ietf-netconf-monitoring module namespace.
pub const MONITORING_NS: &str = "urn:ietf:params:xml:ns:yang:ietf-netconf-monitoring";

pub const CAP_BASE_1_0: &str = "urn:ietf:params:netconf:base:1.0";
pub const CAP_BASE_1_1: &str = "urn:ietf:params:netconf:base:1.1";
pub const CAP_CANDIDATE: &str = "urn:ietf:params:netconf:capability:candidate:1.0";
pub const CAP_WRITABLE_RUNNING: &str = "urn:ietf:params:netconf:capability:writable-running:1.0";
pub const CAP_STARTUP: &str = "urn:ietf:params:netconf:capability:startup:1.0";
pub const CAP_NOTIFICATION: &str = "urn:ietf:params:netconf:capability:notification:1.0";
pub const CAP_YANG_LIBRARY: &str = "urn:ietf:params:netconf:capability:yang-library:1.0";

/// Capabilities this client announces in its `<hello>`.
pub const CLIENT_CAPABILITIES: &[&str] = &[CAP_BASE_1_0, CAP_BASE_1_1];

/// Capabilities announced on the local pipe transport, which always speaks
/// chunked framing.
pub const PIPE_CLIENT_CAPABILITIES: &[&str] = &[CAP_BASE_1_1];

/// Error tags that signal a transient lock conflict worth retrying.
pub const LOCK_RETRY_ERROR_TAGS: &[&str] = &["lock-denied", "resource-denied", "in-use"];

/// IANA-assigned NETCONF over SSH port.
pub const DEFAULT_NETCONF_PORT: u16 = 830;
/// Per-RPC reply timeout used when the device profile does not set one.
pub const DEFAULT_RPC_TIMEOUT_SECS: u64 = 30;
/// First message-id handed out by a fresh session.
pub const FIRST_MESSAGE_ID: u64 = 101;
/// How often the notification listener polls while connected.
pub const NOTIFICATION_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Maximum number of entries retained by a session message log.
pub const MESSAGE_LOG_CAPACITY: usize = 2048;
/// Default number of lock attempts before giving up.
pub const DEFAULT_LOCK_ATTEMPTS: u32 = 30;
/// Default pause between lock attempts.
pub const DEFAULT_LOCK_INTERVAL: Duration = Duration::from_secs(1);
/// Program spawned by the pipe transport when the profile names none.
pub const DEFAULT_PIPE_PROGRAM: &str = "netconf_sshd_proxy";

/// Modern key exchange algorithms.
pub const SECURE_KEX_ORDER: &[kex::Name] = &[
    kex::CURVE25519,
    kex::CURVE25519_PRE_RFC_8731,
    kex::ECDH_SHA2_NISTP256,
    kex::ECDH_SHA2_NISTP384,
    kex::ECDH_SHA2_NISTP521,
    kex::DH_G16_SHA512,
    kex::DH_G14_SHA256,
];

/// Key exchange algorithms including SHA-1 groups found on older agents.
pub const LEGACY_KEX_ORDER: &[kex::Name] = &[
    kex::CURVE25519,
    kex::CURVE25519_PRE_RFC_8731,
    kex::ECDH_SHA2_NISTP256,
    kex::ECDH_SHA2_NISTP384,
    kex::ECDH_SHA2_NISTP521,
    kex::DH_G16_SHA512,
    kex::DH_G14_SHA256,
    kex::DH_GEX_SHA256,
    kex::DH_GEX_SHA1,
    kex::DH_G14_SHA1,
    kex::DH_G1_SHA1,
];

pub static SECURE_CIPHERS: &[cipher::Name] = &[
    cipher::CHACHA20_POLY1305,
    cipher::AES_256_GCM,
    cipher::AES_256_CTR,
    cipher::AES_192_CTR,
    cipher::AES_128_CTR,
];

pub static LEGACY_CIPHERS: &[cipher::Name] = &[
    cipher::CHACHA20_POLY1305,
    cipher::AES_256_GCM,
    cipher::AES_256_CTR,
    cipher::AES_192_CTR,
    cipher::AES_128_CTR,
    cipher::AES_256_CBC,
    cipher::AES_192_CBC,
    cipher::AES_128_CBC,
];

pub const SECURE_MAC_ALGORITHMS: &[mac::Name] = &[
    mac::HMAC_SHA512_ETM,
    mac::HMAC_SHA256_ETM,
    mac::HMAC_SHA512,
    mac::HMAC_SHA256,
];

pub const LEGACY_MAC_ALGORITHMS: &[mac::Name] = &[
    mac::HMAC_SHA512_ETM,
    mac::HMAC_SHA256_ETM,
    mac::HMAC_SHA512,
    mac::HMAC_SHA256,
    mac::HMAC_SHA1_ETM,
    mac::HMAC_SHA1,
];

pub const DEFAULT_COMPRESSION_ALGORITHMS: &[compression::Name] = &[compression::NONE];

pub const SECURE_KEY_TYPES: &[Algorithm] = &[
    Algorithm::Ed25519,
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP256,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP384,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP521,
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha512),
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha256),
    },
];

pub const LEGACY_KEY_TYPES: &[Algorithm] = &[
    Algorithm::Ed25519,
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP256,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP384,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP521,
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha512),
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha256),
    },
    Algorithm::Rsa { hash: None },
    Algorithm::Dsa,
];
