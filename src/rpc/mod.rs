//! Building NETCONF requests from structured operation descriptions.
//!
//! An [`OperationRequest`] names one protocol operation and carries its
//! payload either as literal XML or as path-addressed config nodes grouped
//! per YANG module. [`RpcBuilder`] turns a request into an element tree and
//! wraps it in an `<rpc>` envelope; it never touches a session, so building
//! the same request twice yields identical XML.

pub mod reply;
pub mod xpath;

use std::collections::BTreeMap;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{NETCONF_BASE_NS, WITH_DEFAULTS_NS, YANG_1_NS};
use crate::xml::{NamespacePolicy, XmlElement, parse_fragment};

pub use reply::{RpcErrorInfo, RpcReply};

static XML_NAME: Lazy<Regex> =
    Lazy::new(|| match Regex::new(r"^[A-Za-z_][A-Za-z0-9_.\-]*$") {
        Ok(re) => re,
        Err(err) => panic!("invalid XML_NAME regex: {err}"),
    });

/// A request the builder refused, naming the offending fragment and the rule
/// it broke.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid {subject}:\n{fragment}\n  {rule}")]
pub struct RpcInputError {
    /// What kind of input was rejected (`xpath`, `datastore`, `payload`, ...).
    pub subject: String,
    pub fragment: String,
    pub rule: String,
}

impl RpcInputError {
    pub fn new(
        subject: impl Into<String>,
        fragment: impl Into<String>,
        rule: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            fragment: fragment.into(),
            rule: rule.into(),
        }
    }
}

/// The protocol operations a request can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    Get,
    GetConfig,
    EditConfig,
    Commit,
    Discard,
    Lock,
    Unlock,
    Action,
    Rpc,
}

impl OperationKind {
    /// The `op` tag of the request, which is also the name reported in
    /// batch results. `Discard` sends `<discard-changes>` on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Get => "get",
            OperationKind::GetConfig => "get-config",
            OperationKind::EditConfig => "edit-config",
            OperationKind::Commit => "commit",
            OperationKind::Discard => "discard",
            OperationKind::Lock => "lock",
            OperationKind::Unlock => "unlock",
            OperationKind::Action => "action",
            OperationKind::Rpc => "rpc",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// RFC 6243 retrieval modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum WithDefaultsMode {
    ReportAll,
    ReportAllTagged,
    Trim,
    Explicit,
}

impl WithDefaultsMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WithDefaultsMode::ReportAll => "report-all",
            WithDefaultsMode::ReportAllTagged => "report-all-tagged",
            WithDefaultsMode::Trim => "trim",
            WithDefaultsMode::Explicit => "explicit",
        }
    }

    pub fn parse(mode: &str) -> Option<Self> {
        match mode.trim() {
            "report-all" => Some(WithDefaultsMode::ReportAll),
            "report-all-tagged" => Some(WithDefaultsMode::ReportAllTagged),
            "trim" => Some(WithDefaultsMode::Trim),
            "explicit" => Some(WithDefaultsMode::Explicit),
            _ => None,
        }
    }
}

/// `nc:operation` values that can be attached to a config node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum EditOperation {
    Merge,
    Replace,
    Create,
    Delete,
    Remove,
}

impl EditOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            EditOperation::Merge => "merge",
            EditOperation::Replace => "replace",
            EditOperation::Create => "create",
            EditOperation::Delete => "delete",
            EditOperation::Remove => "remove",
        }
    }
}

/// One node addressed by a schema path, with an optional leaf value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ConfigNode {
    pub xpath: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default, rename = "edit-op")]
    pub edit_op: Option<EditOperation>,
}

/// Config nodes contributed by one YANG module together with the prefixes
/// their paths use.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ModuleConfig {
    #[serde(default)]
    pub namespace_prefixes: BTreeMap<String, String>,
    #[serde(default)]
    pub configs: Vec<ConfigNode>,
}

/// Body of a filter, config or custom operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Payload {
    /// A literal XML fragment.
    Xml(String),
    /// Structured per-module config nodes.
    Modules(Vec<ModuleConfig>),
}

/// A single operation to send to a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum OperationRequest {
    Get {
        #[serde(default)]
        filter: Option<Payload>,
        #[serde(default)]
        with_defaults: Option<WithDefaultsMode>,
    },
    GetConfig {
        datastore: String,
        #[serde(default)]
        filter: Option<Payload>,
        #[serde(default)]
        with_defaults: Option<WithDefaultsMode>,
    },
    EditConfig {
        datastore: String,
        config: Payload,
    },
    Commit,
    Discard,
    Lock {
        datastore: String,
    },
    Unlock {
        datastore: String,
    },
    Action {
        payload: Payload,
    },
    Rpc {
        payload: Payload,
    },
}

impl OperationRequest {
    pub fn kind(&self) -> OperationKind {
        match self {
            OperationRequest::Get { .. } => OperationKind::Get,
            OperationRequest::GetConfig { .. } => OperationKind::GetConfig,
            OperationRequest::EditConfig { .. } => OperationKind::EditConfig,
            OperationRequest::Commit => OperationKind::Commit,
            OperationRequest::Discard => OperationKind::Discard,
            OperationRequest::Lock { .. } => OperationKind::Lock,
            OperationRequest::Unlock { .. } => OperationKind::Unlock,
            OperationRequest::Action { .. } => OperationKind::Action,
            OperationRequest::Rpc { .. } => OperationKind::Rpc,
        }
    }

    /// Datastore the request targets, if it names one.
    pub fn datastore(&self) -> Option<&str> {
        match self {
            OperationRequest::GetConfig { datastore, .. }
            | OperationRequest::EditConfig { datastore, .. }
            | OperationRequest::Lock { datastore }
            | OperationRequest::Unlock { datastore } => Some(datastore),
            _ => None,
        }
    }

    pub fn with_defaults(&self) -> Option<WithDefaultsMode> {
        match self {
            OperationRequest::Get { with_defaults, .. }
            | OperationRequest::GetConfig { with_defaults, .. } => *with_defaults,
            _ => None,
        }
    }
}

fn nc(name: &str) -> XmlElement {
    XmlElement::qualified(NETCONF_BASE_NS, Some("nc"), name)
}

/// Turns [`OperationRequest`]s into XML.
#[derive(Debug, Clone, Copy, Default)]
pub struct RpcBuilder {
    policy: NamespacePolicy,
}

impl RpcBuilder {
    pub fn new(policy: NamespacePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> NamespacePolicy {
        self.policy
    }

    /// Builds the bare operation element (`<get-config>`, `<edit-config>`,
    /// the custom operation of a raw RPC, ...).
    pub fn operation(&self, request: &OperationRequest) -> Result<XmlElement, RpcInputError> {
        let element = match request {
            OperationRequest::Get {
                filter,
                with_defaults,
            } => {
                let mut op = nc("get");
                if let Some(filter) = build_filter(filter.as_ref())? {
                    op.push(filter);
                }
                if let Some(mode) = with_defaults {
                    op.push(with_defaults_element(*mode));
                }
                op
            }
            OperationRequest::GetConfig {
                datastore,
                filter,
                with_defaults,
            } => {
                let mut op = nc("get-config")
                    .with_child(nc("source").with_child(datastore_element(datastore)?));
                if let Some(filter) = build_filter(filter.as_ref())? {
                    op.push(filter);
                }
                if let Some(mode) = with_defaults {
                    op.push(with_defaults_element(*mode));
                }
                op
            }
            OperationRequest::EditConfig { datastore, config } => {
                let mut body = nc("config");
                compile_payload(config, &mut body)?;
                nc("edit-config")
                    .with_child(nc("target").with_child(datastore_element(datastore)?))
                    .with_child(body)
            }
            OperationRequest::Commit => nc("commit"),
            OperationRequest::Discard => nc("discard-changes"),
            OperationRequest::Lock { datastore } => {
                nc("lock").with_child(nc("target").with_child(datastore_element(datastore)?))
            }
            OperationRequest::Unlock { datastore } => {
                nc("unlock").with_child(nc("target").with_child(datastore_element(datastore)?))
            }
            OperationRequest::Action { payload } => {
                let mut action = XmlElement::qualified(YANG_1_NS, Some("yang"), "action");
                compile_payload(payload, &mut action)?;
                if action.children().is_empty() {
                    return Err(RpcInputError::new(
                        "payload",
                        "",
                        "action payload must contain an element",
                    ));
                }
                action
            }
            OperationRequest::Rpc { payload } => custom_operation(payload)?,
        };
        Ok(element)
    }

    /// Builds the full `<rpc>` message for `request`.
    pub fn rpc(
        &self,
        request: &OperationRequest,
        message_id: u64,
    ) -> Result<XmlElement, RpcInputError> {
        Ok(Self::envelope(self.operation(request)?, message_id))
    }

    /// Renders the full `<rpc>` message for `request` under this builder's
    /// namespace policy.
    pub fn render(
        &self,
        request: &OperationRequest,
        message_id: u64,
    ) -> Result<String, RpcInputError> {
        Ok(self.rpc(request, message_id)?.render(self.policy))
    }

    /// Wraps an operation element in `<rpc message-id="...">`.
    pub fn envelope(operation: XmlElement, message_id: u64) -> XmlElement {
        let mut rpc = nc("rpc");
        rpc.set_attribute("message-id", message_id.to_string());
        rpc.push(operation);
        rpc
    }
}

fn datastore_element(datastore: &str) -> Result<XmlElement, RpcInputError> {
    if !XML_NAME.is_match(datastore) {
        return Err(RpcInputError::new(
            "datastore",
            datastore,
            "must be a non-empty XML name",
        ));
    }
    Ok(nc(datastore))
}

fn with_defaults_element(mode: WithDefaultsMode) -> XmlElement {
    XmlElement::qualified(WITH_DEFAULTS_NS, Some("ncwd"), "with-defaults").with_text(mode.as_str())
}

/// An empty filter is dropped rather than sent as `<filter/>`, which would
/// select nothing.
fn build_filter(payload: Option<&Payload>) -> Result<Option<XmlElement>, RpcInputError> {
    let Some(payload) = payload else {
        return Ok(None);
    };
    let mut filter = nc("filter");
    compile_payload(payload, &mut filter)?;
    if filter.children().is_empty() {
        return Ok(None);
    }
    Ok(Some(filter))
}

fn custom_operation(payload: &Payload) -> Result<XmlElement, RpcInputError> {
    let mut holder = XmlElement::new("payload");
    compile_payload(payload, &mut holder)?;
    let mut elements = std::mem::take(holder.children_mut());

    // A caller-supplied envelope is unwrapped; the builder adds its own.
    if elements.len() == 1
        && elements[0].name() == "rpc"
        && matches!(elements[0].namespace(), None | Some(NETCONF_BASE_NS))
    {
        let mut envelope = elements.remove(0);
        elements = std::mem::take(envelope.children_mut());
    }

    match elements.len() {
        1 => Ok(elements.remove(0)),
        0 => Err(RpcInputError::new(
            "payload",
            "",
            "rpc payload must contain an operation element",
        )),
        n => Err(RpcInputError::new(
            "payload",
            elements
                .iter()
                .map(|e| format!("<{}>", e.name()))
                .collect::<Vec<_>>()
                .join(" "),
            format!("rpc payload must contain exactly one operation element, found {n}"),
        )),
    }
}

fn compile_payload(payload: &Payload, container: &mut XmlElement) -> Result<(), RpcInputError> {
    match payload {
        Payload::Xml(text) => {
            let elements =
                parse_fragment(text).map_err(|rule| RpcInputError::new("payload", text.trim(), rule))?;
            for element in elements {
                container.push(element);
            }
        }
        Payload::Modules(modules) => {
            for module in modules {
                for node in &module.configs {
                    apply_node(module, node, container)?;
                }
            }
        }
    }
    Ok(())
}

struct ResolvedKey {
    name: String,
    uri: String,
    prefix: String,
    value: String,
}

fn resolve_prefix(
    module: &ModuleConfig,
    prefix: Option<&str>,
    inherited: Option<&(String, String)>,
    xpath: &str,
    node: &str,
) -> Result<(String, String), RpcInputError> {
    match prefix {
        Some(prefix) => module
            .namespace_prefixes
            .get(prefix)
            .map(|uri| (uri.clone(), prefix.to_string()))
            .ok_or_else(|| {
                RpcInputError::new("xpath", xpath, format!("prefix '{prefix}' is not declared"))
            }),
        None => {
            if let Some(inherited) = inherited {
                return Ok(inherited.clone());
            }
            if module.namespace_prefixes.len() == 1
                && let Some((prefix, uri)) = module.namespace_prefixes.iter().next()
            {
                return Ok((uri.clone(), prefix.clone()));
            }
            Err(RpcInputError::new(
                "xpath",
                xpath,
                format!("node '{node}' has no prefix and no namespace can be inferred"),
            ))
        }
    }
}

/// Merges one path-addressed node into `container`, reusing elements (and
/// list entries with matching keys) created by earlier nodes.
fn apply_node(
    module: &ModuleConfig,
    node: &ConfigNode,
    container: &mut XmlElement,
) -> Result<(), RpcInputError> {
    let steps = xpath::parse(&node.xpath)?;
    let mut current: &mut XmlElement = container;
    let mut inherited: Option<(String, String)> = None;

    for step in &steps {
        let (uri, prefix) = resolve_prefix(
            module,
            step.prefix.as_deref(),
            inherited.as_ref(),
            &node.xpath,
            &step.name,
        )?;

        let mut keys = Vec::with_capacity(step.keys.len());
        for key in &step.keys {
            let (key_uri, key_prefix) = resolve_prefix(
                module,
                key.prefix.as_deref(),
                Some(&(uri.clone(), prefix.clone())),
                &node.xpath,
                &key.name,
            )?;
            keys.push(ResolvedKey {
                name: key.name.clone(),
                uri: key_uri,
                prefix: key_prefix,
                value: key.value.clone(),
            });
        }

        let existing = current.children().iter().position(|child| {
            child.name() == step.name
                && child.namespace() == Some(uri.as_str())
                && keys.iter().all(|key| {
                    child.children_named(&key.name).any(|k| {
                        k.namespace() == Some(key.uri.as_str()) && k.text() == Some(key.value.as_str())
                    })
                })
        });
        let index = match existing {
            Some(index) => index,
            None => {
                let mut element = XmlElement::qualified(&uri, Some(prefix.as_str()), step.name.as_str());
                for key in &keys {
                    element.push(
                        XmlElement::qualified(&key.uri, Some(key.prefix.as_str()), key.name.as_str())
                            .with_text(key.value.as_str()),
                    );
                }
                current.push(element);
                current.children().len() - 1
            }
        };
        current = &mut current.children_mut()[index];
        inherited = Some((uri, prefix));
    }

    if let Some(value) = &node.value {
        current.set_text(value.as_str());
        // Identity values such as `ianaift:ethernetCsmacd` need their prefix
        // bound on the leaf itself.
        if let Some((prefix, _)) = value.split_once(':')
            && let Some(uri) = module.namespace_prefixes.get(prefix)
        {
            current.declare(prefix, uri);
        }
    }
    if let Some(op) = node.edit_op {
        current.set_qualified_attribute(Some(NETCONF_BASE_NS), Some("nc"), "operation", op.as_str());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const OCIF: &str = "http://openconfig.net/yang/interfaces";

    fn interface_module(configs: Vec<ConfigNode>) -> Payload {
        let mut prefixes = BTreeMap::new();
        prefixes.insert("ocif".to_string(), OCIF.to_string());
        Payload::Modules(vec![ModuleConfig {
            namespace_prefixes: prefixes,
            configs,
        }])
    }

    fn node(xpath: &str, value: Option<&str>) -> ConfigNode {
        ConfigNode {
            xpath: xpath.to_string(),
            value: value.map(str::to_string),
            edit_op: None,
        }
    }

    #[test]
    fn get_config_running_without_filter() {
        let text = RpcBuilder::default()
            .render(
                &OperationRequest::GetConfig {
                    datastore: "running".to_string(),
                    filter: None,
                    with_defaults: None,
                },
                101,
            )
            .expect("build");
        assert_eq!(
            text,
            "<rpc xmlns=\"urn:ietf:params:xml:ns:netconf:base:1.0\" message-id=\"101\">\n  <get-config>\n    <source>\n      <running/>\n    </source>\n  </get-config>\n</rpc>\n"
        );
    }

    #[test]
    fn building_twice_is_identical() {
        let builder = RpcBuilder::new(NamespacePolicy::Always);
        let request = OperationRequest::EditConfig {
            datastore: "candidate".to_string(),
            config: interface_module(vec![node(
                "/ocif:interfaces/ocif:interface[ocif:name='Gi1']/ocif:config/ocif:mtu",
                Some("1500"),
            )]),
        };
        assert_eq!(
            builder.render(&request, 7).expect("first"),
            builder.render(&request, 7).expect("second")
        );
    }

    #[test]
    fn empty_filter_is_dropped() {
        let op = RpcBuilder::default()
            .operation(&OperationRequest::Get {
                filter: Some(Payload::Modules(Vec::new())),
                with_defaults: None,
            })
            .expect("build");
        assert!(op.child("filter").is_none());
    }

    #[test]
    fn edit_config_keeps_empty_config() {
        let op = RpcBuilder::default()
            .operation(&OperationRequest::EditConfig {
                datastore: "running".to_string(),
                config: Payload::Modules(Vec::new()),
            })
            .expect("build");
        assert!(op.child("config").is_some());
        assert!(op.path(&["target", "running"]).is_some());
    }

    #[test]
    fn list_entries_with_same_key_are_merged() {
        let op = RpcBuilder::default()
            .operation(&OperationRequest::EditConfig {
                datastore: "candidate".to_string(),
                config: interface_module(vec![
                    node(
                        "/ocif:interfaces/ocif:interface[ocif:name='Gi1']/ocif:config/ocif:mtu",
                        Some("1500"),
                    ),
                    node(
                        "/ocif:interfaces/ocif:interface[ocif:name='Gi1']/ocif:config/ocif:description",
                        Some("uplink"),
                    ),
                    node(
                        "/ocif:interfaces/ocif:interface[ocif:name='Gi2']/ocif:config/ocif:mtu",
                        Some("9000"),
                    ),
                ]),
            })
            .expect("build");
        let interfaces = op.path(&["config", "interfaces"]).expect("interfaces");
        let entries: Vec<_> = interfaces.children_named("interface").collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].child("name").and_then(|n| n.text()), Some("Gi1"));
        assert_eq!(
            entries[0].path(&["config", "description"]).and_then(|n| n.text()),
            Some("uplink")
        );
        assert_eq!(
            entries[1].path(&["config", "mtu"]).and_then(|n| n.text()),
            Some("9000")
        );
    }

    #[test]
    fn edit_operation_becomes_netconf_attribute() {
        let text = RpcBuilder::default()
            .render(
                &OperationRequest::EditConfig {
                    datastore: "candidate".to_string(),
                    config: interface_module(vec![ConfigNode {
                        xpath: "/ocif:interfaces/ocif:interface[ocif:name='Gi3']".to_string(),
                        value: None,
                        edit_op: Some(EditOperation::Delete),
                    }]),
                },
                101,
            )
            .expect("build");
        assert!(text.contains("nc:operation=\"delete\""));
        assert!(text.contains("xmlns:nc=\"urn:ietf:params:xml:ns:netconf:base:1.0\""));
    }

    #[test]
    fn identity_value_declares_its_prefix() {
        let mut prefixes = BTreeMap::new();
        prefixes.insert("ocif".to_string(), OCIF.to_string());
        prefixes.insert(
            "ianaift".to_string(),
            "urn:ietf:params:xml:ns:yang:iana-if-type".to_string(),
        );
        let text = RpcBuilder::default()
            .render(
                &OperationRequest::EditConfig {
                    datastore: "running".to_string(),
                    config: Payload::Modules(vec![ModuleConfig {
                        namespace_prefixes: prefixes,
                        configs: vec![node(
                            "/ocif:interfaces/ocif:interface[ocif:name='Gi1']/ocif:config/ocif:type",
                            Some("ianaift:ethernetCsmacd"),
                        )],
                    }]),
                },
                101,
            )
            .expect("build");
        assert!(text.contains(
            "<type xmlns:ianaift=\"urn:ietf:params:xml:ns:yang:iana-if-type\">ianaift:ethernetCsmacd</type>"
        ));
    }

    #[test]
    fn invalid_xpath_is_reported_before_sending() {
        let err = RpcBuilder::default()
            .operation(&OperationRequest::EditConfig {
                datastore: "running".to_string(),
                config: interface_module(vec![node("foo/", Some("1"))]),
            })
            .expect_err("invalid xpath");
        assert_eq!(err.to_string(), "Invalid xpath:\nfoo/\n  must start with '/'");
    }

    #[test]
    fn undeclared_prefix_is_rejected() {
        let err = RpcBuilder::default()
            .operation(&OperationRequest::EditConfig {
                datastore: "running".to_string(),
                config: interface_module(vec![node("/oc-sys:system", None)]),
            })
            .expect_err("unknown prefix");
        assert!(err.rule.contains("'oc-sys' is not declared"));
    }

    #[test]
    fn bad_datastore_name_is_rejected() {
        let err = RpcBuilder::default()
            .operation(&OperationRequest::Lock {
                datastore: "bad name".to_string(),
            })
            .expect_err("datastore");
        assert_eq!(err.subject, "datastore");
    }

    #[test]
    fn action_is_wrapped_in_yang_action() {
        let text = RpcBuilder::default()
            .render(
                &OperationRequest::Action {
                    payload: Payload::Xml(
                        r#"<system xmlns="urn:example:sys"><restart><delay>5</delay></restart></system>"#
                            .to_string(),
                    ),
                },
                101,
            )
            .expect("build");
        assert!(text.contains("<action xmlns=\"urn:ietf:params:xml:ns:yang:1\">"));
        assert!(text.contains("<system xmlns=\"urn:example:sys\">"));
    }

    #[test]
    fn raw_rpc_envelope_is_unwrapped() {
        let op = RpcBuilder::default()
            .operation(&OperationRequest::Rpc {
                payload: Payload::Xml(
                    r#"<rpc xmlns="urn:ietf:params:xml:ns:netconf:base:1.0" message-id="1"><commit/></rpc>"#
                        .to_string(),
                ),
            })
            .expect("build");
        assert_eq!(op.name(), "commit");
        assert_eq!(op.namespace(), Some(NETCONF_BASE_NS));
    }

    #[test]
    fn raw_rpc_with_two_operations_is_rejected() {
        let err = RpcBuilder::default()
            .operation(&OperationRequest::Rpc {
                payload: Payload::Xml("<a/><b/>".to_string()),
            })
            .expect_err("two roots");
        assert!(err.rule.contains("exactly one"));
    }

    #[test]
    fn with_defaults_is_rendered_in_its_namespace() {
        let text = RpcBuilder::default()
            .render(
                &OperationRequest::Get {
                    filter: None,
                    with_defaults: Some(WithDefaultsMode::ReportAll),
                },
                101,
            )
            .expect("build");
        assert!(text.contains(
            "<with-defaults xmlns=\"urn:ietf:params:xml:ns:yang:ietf-netconf-with-defaults\">report-all</with-defaults>"
        ));
    }

    #[test]
    fn requests_deserialize_from_tagged_json() {
        let request: OperationRequest = serde_json::from_str(
            r#"{"op":"get-config","datastore":"running","with_defaults":"report-all"}"#,
        )
        .expect("json");
        assert_eq!(request.kind(), OperationKind::GetConfig);
        assert_eq!(request.with_defaults(), Some(WithDefaultsMode::ReportAll));
    }

    #[test]
    fn kind_names_match_the_input_tag() {
        for op in ["commit", "discard"] {
            let request: OperationRequest =
                serde_json::from_str(&format!(r#"{{"op":"{op}"}}"#)).expect("json");
            assert_eq!(request.kind().to_string(), op);
        }
        let builder = RpcBuilder::default();
        let element = builder.operation(&OperationRequest::Discard).expect("build");
        assert_eq!(element.name(), "discard-changes");
    }
}
