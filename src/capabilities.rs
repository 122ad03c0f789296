//! Capability model derived from the URIs a device sends in its `<hello>`.
//!
//! [`Capabilities`] is a read-only snapshot: it is rebuilt from the URI list
//! every time a session (re)connects and never mutated afterwards.

use std::collections::{BTreeMap, BTreeSet};

use once_cell::sync::Lazy;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::config::{
    CAP_BASE_1_1, CAP_CANDIDATE, CAP_STARTUP, CAP_WRITABLE_RUNNING, CAP_YANG_LIBRARY,
    MONITORING_NS, YANG_LIBRARY_NS,
};
use crate::error::NetconfError;
use crate::rpc::{OperationKind, OperationRequest, WithDefaultsMode};

static MODULE_PARAM: Lazy<Regex> = Lazy::new(|| match Regex::new(r"module=([^&]+)") {
    Ok(re) => re,
    Err(err) => panic!("invalid MODULE_PARAM regex: {err}"),
});
static REVISION_PARAM: Lazy<Regex> = Lazy::new(|| match Regex::new(r"revision=([^&]+)") {
    Ok(re) => re,
    Err(err) => panic!("invalid REVISION_PARAM regex: {err}"),
});

/// Strategy used to list the schemas a device serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum SchemaSource {
    YangLibrary,
    NetconfMonitoring,
    Capabilities,
}

/// RFC 6243 support advertised by the device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct WithDefaultsSupport {
    pub basic_mode: Option<WithDefaultsMode>,
    pub also_supported: Vec<WithDefaultsMode>,
}

impl WithDefaultsSupport {
    fn parse(uri: &str) -> Self {
        let mut support = Self::default();
        let Some((_, query)) = uri.split_once('?') else {
            return support;
        };
        for param in query.split('&') {
            match param.split_once('=') {
                Some(("basic-mode", mode)) => support.basic_mode = WithDefaultsMode::parse(mode),
                Some(("also-supported", modes)) => {
                    support.also_supported = modes
                        .split(',')
                        .filter_map(WithDefaultsMode::parse)
                        .collect();
                }
                _ => {}
            }
        }
        support
    }

    /// Every mode a retrieval may request.
    pub fn modes(&self) -> Vec<WithDefaultsMode> {
        let mut modes: Vec<WithDefaultsMode> = self.basic_mode.into_iter().collect();
        for mode in &self.also_supported {
            if !modes.contains(mode) {
                modes.push(*mode);
            }
        }
        modes
    }
}

/// Which operations a datastore accepts, given what the device advertises.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DatastoreAccess {
    pub commit: bool,
    pub lock: bool,
    /// Running should be locked before committing this datastore.
    pub lock_running: bool,
}

/// One entry of a capability report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CapabilityEntry {
    pub capability: String,
    pub attributes: BTreeMap<String, Vec<String>>,
}

/// A `(module, revision)` pair named by a capability URI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ModuleRef {
    pub name: String,
    pub revision: String,
}

/// Snapshot of the capabilities a device advertised.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    uris: Vec<String>,
    base: BTreeSet<String>,
    with_defaults: WithDefaultsSupport,
}

impl Capabilities {
    pub fn from_uris<I, S>(uris: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let uris: Vec<String> = uris.into_iter().map(|u| u.into().trim().to_string()).collect();
        let base = uris
            .iter()
            .map(|u| strip_query(u).to_string())
            .collect::<BTreeSet<_>>();
        let with_defaults = uris
            .iter()
            .filter(|u| u.contains(":netconf:capability:") && u.contains(":with-defaults:"))
            .map(|u| WithDefaultsSupport::parse(u))
            .last()
            .unwrap_or_default();
        Self {
            uris,
            base,
            with_defaults,
        }
    }

    /// The URIs exactly as the device sent them.
    pub fn uris(&self) -> &[String] {
        &self.uris
    }

    /// True if a capability with this URI (ignoring any `?` query) is
    /// advertised.
    pub fn supports(&self, uri: &str) -> bool {
        self.base.contains(strip_query(uri))
    }

    pub fn supports_base_1_1(&self) -> bool {
        self.supports(CAP_BASE_1_1)
    }

    pub fn has_candidate(&self) -> bool {
        self.supports(CAP_CANDIDATE)
    }

    pub fn has_writable_running(&self) -> bool {
        self.supports(CAP_WRITABLE_RUNNING)
    }

    pub fn has_startup(&self) -> bool {
        self.supports(CAP_STARTUP)
    }

    /// Datastores that can be read: running always, plus candidate and
    /// startup when advertised.
    pub fn read_datastores(&self) -> Vec<String> {
        let mut stores = vec!["running".to_string()];
        if self.has_candidate() {
            stores.push("candidate".to_string());
        }
        if self.has_startup() {
            stores.push("startup".to_string());
        }
        stores
    }

    /// Datastores that accept edit-config: candidate when advertised and
    /// running when writable-running is advertised.
    pub fn write_datastores(&self) -> Vec<String> {
        let mut stores = Vec::new();
        if self.has_candidate() {
            stores.push("candidate".to_string());
        }
        if self.has_writable_running() {
            stores.push("running".to_string());
        }
        stores
    }

    /// Datastores applicable to `operation`: reads for get-config, writes for
    /// edit-config and the sorted union of both for anything else.
    pub fn datastores_for(&self, operation: OperationKind) -> Vec<String> {
        match operation {
            OperationKind::GetConfig => self.read_datastores(),
            OperationKind::EditConfig => self.write_datastores(),
            _ => {
                let union: BTreeSet<String> = self
                    .read_datastores()
                    .into_iter()
                    .chain(self.write_datastores())
                    .collect();
                union.into_iter().collect()
            }
        }
    }

    pub fn with_defaults(&self) -> &WithDefaultsSupport {
        &self.with_defaults
    }

    /// Picks the target datastore (the requested one, else candidate when
    /// advertised, else running) and what each writable datastore allows.
    pub fn datastore_state(
        &self,
        target: Option<&str>,
    ) -> (String, BTreeMap<String, DatastoreAccess>) {
        let mut states = BTreeMap::new();
        if self.has_candidate() {
            states.insert(
                "candidate".to_string(),
                DatastoreAccess {
                    commit: true,
                    lock: true,
                    lock_running: self.has_writable_running(),
                },
            );
        }
        if self.has_writable_running() {
            states.insert(
                "running".to_string(),
                DatastoreAccess {
                    lock: true,
                    ..Default::default()
                },
            );
        }
        if self.has_startup() {
            states.insert(
                "startup".to_string(),
                DatastoreAccess {
                    lock: true,
                    ..Default::default()
                },
            );
        }

        let target = match target.filter(|t| !t.is_empty()) {
            Some(target) => target.to_string(),
            None if self.has_candidate() => "candidate".to_string(),
            None => "running".to_string(),
        };
        (target, states)
    }

    /// Schema discovery strategies this device supports, best first. The
    /// capability-derived list is always available as a last resort.
    pub fn schema_sources(&self) -> Vec<SchemaSource> {
        let mut sources = Vec::new();
        if self.supports(CAP_YANG_LIBRARY) || self.supports(YANG_LIBRARY_NS) {
            sources.push(SchemaSource::YangLibrary);
        }
        if self.supports(MONITORING_NS) {
            sources.push(SchemaSource::NetconfMonitoring);
        }
        sources.push(SchemaSource::Capabilities);
        sources
    }

    /// Modules named by `?module=` capability URIs. Revisions that are not
    /// advertised are reported as `unknown`.
    pub fn modules(&self) -> Vec<ModuleRef> {
        self.uris
            .iter()
            .filter_map(|uri| {
                let name = MODULE_PARAM.captures(uri)?.get(1)?.as_str().to_string();
                let revision = REVISION_PARAM
                    .captures(uri)
                    .and_then(|c| c.get(1))
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                Some(ModuleRef { name, revision })
            })
            .collect()
    }

    /// Capabilities with their `?key=value` attributes split out, ordered
    /// protocol capabilities first and SNMP MIB translations last.
    pub fn report(&self) -> Vec<CapabilityEntry> {
        let mut entries: Vec<CapabilityEntry> = self
            .uris
            .iter()
            .map(|uri| {
                let (capability, query) = uri.split_once('?').unwrap_or((uri.as_str(), ""));
                let mut attributes = BTreeMap::new();
                for attr in query.split('&').filter(|a| !a.is_empty()) {
                    let (name, value) = attr.split_once('=').unwrap_or((attr, ""));
                    let values = if value.is_empty() {
                        Vec::new()
                    } else {
                        value.split(',').map(str::to_string).collect()
                    };
                    attributes.insert(name.to_string(), values);
                }
                CapabilityEntry {
                    capability: capability.trim().to_string(),
                    attributes,
                }
            })
            .collect();
        entries.sort_by(|a, b| {
            (report_rank(&a.capability), &a.capability)
                .cmp(&(report_rank(&b.capability), &b.capability))
        });
        entries
    }

    /// Rejects requests the device cannot perform before anything is sent.
    pub fn check(&self, request: &OperationRequest) -> Result<(), NetconfError> {
        match request {
            OperationRequest::EditConfig { datastore, .. } => {
                let writable = self.write_datastores();
                if !writable.iter().any(|d| d == datastore) {
                    return Err(NetconfError::NotSupported(format!(
                        "edit-config on datastore \"{datastore}\"; writable datastores: [{}]",
                        writable.join(", ")
                    )));
                }
            }
            OperationRequest::GetConfig { datastore, .. }
            | OperationRequest::Lock { datastore }
            | OperationRequest::Unlock { datastore } => {
                let readable = self.read_datastores();
                if !readable.iter().any(|d| d == datastore) {
                    return Err(NetconfError::NotSupported(format!(
                        "{} on datastore \"{datastore}\"; available datastores: [{}]",
                        request.kind(),
                        readable.join(", ")
                    )));
                }
            }
            OperationRequest::Commit | OperationRequest::Discard => {
                if !self.has_candidate() {
                    return Err(NetconfError::NotSupported(format!(
                        "{} requires the candidate capability",
                        request.kind()
                    )));
                }
            }
            _ => {}
        }

        if let Some(mode) = request.with_defaults()
            && !self.with_defaults.modes().contains(&mode)
        {
            return Err(NetconfError::NotSupported(format!(
                "with-defaults mode \"{}\"",
                mode.as_str()
            )));
        }
        Ok(())
    }
}

fn strip_query(uri: &str) -> &str {
    uri.split('?').next().unwrap_or(uri).trim()
}

fn report_rank(capability: &str) -> u8 {
    if capability.starts_with("urn:ietf:params:netconf:") {
        0
    } else if capability.starts_with("http://tail-f.com/ns/netconf")
        || capability.starts_with("http://tail-f.com/ns/common")
    {
        1
    } else if capability.starts_with("urn:ietf:params:xml:ns:yang:smiv2:") {
        100
    } else if capability.starts_with("urn:ietf:params:xml:ns:") {
        10
    } else if capability.starts_with("http://openconfig.net/yang/") {
        11
    } else if capability.starts_with("http://tail-f.com/yang/") {
        12
    } else {
        50
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CAP_BASE_1_0;

    const WITH_DEFAULTS: &str = "urn:ietf:params:netconf:capability:with-defaults:1.0?basic-mode=explicit&also-supported=report-all,report-all-tagged";

    #[test]
    fn candidate_only_writes_candidate() {
        let caps = Capabilities::from_uris([CAP_BASE_1_0, CAP_CANDIDATE]);
        assert_eq!(caps.write_datastores(), vec!["candidate".to_string()]);
        assert_eq!(
            caps.read_datastores(),
            vec!["running".to_string(), "candidate".to_string()]
        );
    }

    #[test]
    fn no_writable_capability_means_no_write_datastores() {
        let caps = Capabilities::from_uris([CAP_BASE_1_0, CAP_STARTUP]);
        assert!(caps.write_datastores().is_empty());
        assert_eq!(
            caps.read_datastores(),
            vec!["running".to_string(), "startup".to_string()]
        );
    }

    #[test]
    fn derivation_is_repeatable() {
        let uris = [CAP_BASE_1_1, CAP_CANDIDATE, CAP_WRITABLE_RUNNING, WITH_DEFAULTS];
        assert_eq!(Capabilities::from_uris(uris), Capabilities::from_uris(uris));
    }

    #[test]
    fn with_defaults_modes_are_parsed() {
        let caps = Capabilities::from_uris([WITH_DEFAULTS]);
        let support = caps.with_defaults();
        assert_eq!(support.basic_mode, Some(WithDefaultsMode::Explicit));
        assert_eq!(
            support.modes(),
            vec![
                WithDefaultsMode::Explicit,
                WithDefaultsMode::ReportAll,
                WithDefaultsMode::ReportAllTagged
            ]
        );
    }

    #[test]
    fn schema_sources_prefer_yang_library() {
        let caps = Capabilities::from_uris([
            "urn:ietf:params:netconf:capability:yang-library:1.0?revision=2016-06-21&module-set-id=abc",
            "urn:ietf:params:xml:ns:yang:ietf-netconf-monitoring?module=ietf-netconf-monitoring&revision=2010-10-04",
        ]);
        assert_eq!(
            caps.schema_sources(),
            vec![
                SchemaSource::YangLibrary,
                SchemaSource::NetconfMonitoring,
                SchemaSource::Capabilities
            ]
        );
        assert_eq!(
            Capabilities::from_uris([CAP_BASE_1_0]).schema_sources(),
            vec![SchemaSource::Capabilities]
        );
    }

    #[test]
    fn modules_default_to_unknown_revision() {
        let caps = Capabilities::from_uris([
            "http://cisco.com/ns/yang/Cisco-IOS-XE-native?module=Cisco-IOS-XE-native&revision=2019-07-01",
            "http://example.com/ns/foo?module=foo",
            CAP_CANDIDATE,
        ]);
        let modules = caps.modules();
        assert_eq!(modules.len(), 2);
        assert_eq!(modules[0].revision, "2019-07-01");
        assert_eq!(modules[1].name, "foo");
        assert_eq!(modules[1].revision, "unknown");
    }

    #[test]
    fn report_orders_by_family() {
        let caps = Capabilities::from_uris([
            "urn:ietf:params:xml:ns:yang:smiv2:IF-MIB?module=IF-MIB",
            "http://openconfig.net/yang/interfaces?module=openconfig-interfaces&deviation=a,b",
            CAP_CANDIDATE,
            "urn:ietf:params:xml:ns:yang:ietf-interfaces?module=ietf-interfaces",
        ]);
        let report = caps.report();
        let order: Vec<&str> = report.iter().map(|e| e.capability.as_str()).collect();
        assert_eq!(
            order,
            vec![
                CAP_CANDIDATE,
                "urn:ietf:params:xml:ns:yang:ietf-interfaces",
                "http://openconfig.net/yang/interfaces",
                "urn:ietf:params:xml:ns:yang:smiv2:IF-MIB",
            ]
        );
        assert_eq!(
            report[2].attributes.get("deviation"),
            Some(&vec!["a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn datastore_state_defaults_to_candidate() {
        let caps = Capabilities::from_uris([CAP_CANDIDATE, CAP_WRITABLE_RUNNING]);
        let (target, states) = caps.datastore_state(None);
        assert_eq!(target, "candidate");
        assert!(states["candidate"].commit);
        assert!(states["candidate"].lock_running);
        assert!(!states["running"].commit);

        let (target, _) = Capabilities::from_uris([CAP_BASE_1_0]).datastore_state(None);
        assert_eq!(target, "running");
    }

    #[test]
    fn check_rejects_unwritable_datastore() {
        let caps = Capabilities::from_uris([CAP_CANDIDATE]);
        let err = caps
            .check(&OperationRequest::EditConfig {
                datastore: "running".to_string(),
                config: crate::rpc::Payload::Xml(String::new()),
            })
            .expect_err("running is not writable");
        assert!(matches!(err, NetconfError::NotSupported(_)));
        assert!(caps.check(&OperationRequest::Commit).is_ok());
        assert!(
            Capabilities::from_uris([CAP_WRITABLE_RUNNING])
                .check(&OperationRequest::Commit)
                .is_err()
        );
    }

    #[test]
    fn check_rejects_unadvertised_with_defaults() {
        let caps = Capabilities::from_uris([CAP_BASE_1_0]);
        let err = caps
            .check(&OperationRequest::Get {
                filter: None,
                with_defaults: Some(WithDefaultsMode::Trim),
            })
            .expect_err("no with-defaults capability");
        assert!(err.to_string().contains("trim"));
    }
}
