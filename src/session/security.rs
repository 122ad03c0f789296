use std::borrow::Cow;

use async_ssh2_tokio::ServerCheckMethod;
use russh::Preferred;

use super::*;

/// Security level used for SSH algorithm selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SecurityLevel {
    /// Strict modern algorithms (default).
    #[default]
    Secure,
    /// Adds SHA-1 key exchange, CBC ciphers and DSA keys for older agents.
    LegacyCompatible,
}

/// Connection security options for SSH establishment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSecurityOptions {
    /// SSH algorithm policy.
    pub level: SecurityLevel,
    /// Server host key verification method.
    pub server_check: ServerCheckMethod,
}

impl Default for ConnectionSecurityOptions {
    fn default() -> Self {
        Self::secure_default()
    }
}

impl ConnectionSecurityOptions {
    /// Secure-by-default profile (recommended).
    pub fn secure_default() -> Self {
        Self {
            level: SecurityLevel::Secure,
            server_check: ServerCheckMethod::DefaultKnownHostsFile,
        }
    }

    /// Profile for a device endpoint: its algorithm level, and known-hosts
    /// verification unless the endpoint opts out.
    pub fn for_endpoint(endpoint: &DeviceEndpoint) -> Self {
        Self {
            level: endpoint.security_level,
            server_check: if endpoint.skip_host_key_check {
                ServerCheckMethod::NoCheck
            } else {
                ServerCheckMethod::DefaultKnownHostsFile
            },
        }
    }

    pub(super) fn preferred(&self) -> Preferred {
        match self.level {
            SecurityLevel::Secure => Preferred {
                kex: Cow::Borrowed(config::SECURE_KEX_ORDER),
                key: Cow::Borrowed(config::SECURE_KEY_TYPES),
                cipher: Cow::Borrowed(config::SECURE_CIPHERS),
                mac: Cow::Borrowed(config::SECURE_MAC_ALGORITHMS),
                compression: Cow::Borrowed(config::DEFAULT_COMPRESSION_ALGORITHMS),
            },
            SecurityLevel::LegacyCompatible => Preferred {
                kex: Cow::Borrowed(config::LEGACY_KEX_ORDER),
                key: Cow::Borrowed(config::LEGACY_KEY_TYPES),
                cipher: Cow::Borrowed(config::LEGACY_CIPHERS),
                mac: Cow::Borrowed(config::LEGACY_MAC_ALGORITHMS),
                compression: Cow::Borrowed(config::DEFAULT_COMPRESSION_ALGORITHMS),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ConnectionSecurityOptions, DeviceEndpoint, SecurityLevel};
    use async_ssh2_tokio::ServerCheckMethod;
    use russh::{cipher, kex, mac};

    fn endpoint(level: SecurityLevel) -> DeviceEndpoint {
        let mut endpoint = DeviceEndpoint::new("csr1", "10.0.0.1", "admin", "admin");
        endpoint.security_level = level;
        endpoint
    }

    #[test]
    fn endpoint_opt_out_disables_host_key_check() {
        let mut endpoint = endpoint(SecurityLevel::Secure);
        assert!(matches!(
            ConnectionSecurityOptions::for_endpoint(&endpoint).server_check,
            ServerCheckMethod::DefaultKnownHostsFile
        ));
        endpoint.skip_host_key_check = true;
        assert!(matches!(
            ConnectionSecurityOptions::for_endpoint(&endpoint).server_check,
            ServerCheckMethod::NoCheck
        ));
    }

    #[test]
    fn legacy_endpoint_still_verifies_host_keys() {
        let options = ConnectionSecurityOptions::for_endpoint(&endpoint(SecurityLevel::LegacyCompatible));
        assert_eq!(options.level, SecurityLevel::LegacyCompatible);
        assert!(matches!(
            options.server_check,
            ServerCheckMethod::DefaultKnownHostsFile
        ));
    }

    #[test]
    fn sha1_and_cbc_are_only_offered_to_legacy_endpoints() {
        let secure = ConnectionSecurityOptions::for_endpoint(&endpoint(SecurityLevel::Secure)).preferred();
        let legacy =
            ConnectionSecurityOptions::for_endpoint(&endpoint(SecurityLevel::LegacyCompatible)).preferred();

        assert!(!secure.kex.contains(&kex::DH_G1_SHA1));
        assert!(!secure.cipher.contains(&cipher::AES_128_CBC));
        assert!(!secure.mac.contains(&mac::HMAC_SHA1));
        assert!(legacy.kex.contains(&kex::DH_G1_SHA1));
        assert!(legacy.cipher.contains(&cipher::AES_128_CBC));
        assert!(legacy.mac.contains(&mac::HMAC_SHA1));
        // legacy widens the secure lists, it never drops from them
        assert!(secure.kex.iter().all(|alg| legacy.kex.contains(alg)));
    }
}
