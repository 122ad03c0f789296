//! Parsing of `<rpc-reply>` messages.

use quick_xml::Reader;
use quick_xml::events::Event;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::config::{LOCK_RETRY_ERROR_TAGS, NETCONF_BASE_NS};
use crate::error::NetconfError;
use crate::xml::{XmlElement, pretty};

/// One `<rpc-error>` reported by the device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RpcErrorInfo {
    pub error_type: Option<String>,
    pub tag: String,
    pub severity: Option<String>,
    pub message: Option<String>,
    pub path: Option<String>,
}

impl RpcErrorInfo {
    fn from_element(element: &XmlElement) -> Self {
        let field = |name: &str| {
            element
                .child(name)
                .and_then(|c| c.text())
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
        };
        Self {
            error_type: field("error-type"),
            tag: field("error-tag").unwrap_or_default(),
            severity: field("error-severity"),
            message: field("error-message"),
            path: field("error-path"),
        }
    }

    /// Warnings do not fail the operation.
    pub fn is_error(&self) -> bool {
        self.severity.as_deref() != Some("warning")
    }
}

/// A decoded `<rpc-reply>`.
#[derive(Debug, Clone)]
pub struct RpcReply {
    raw: String,
    root: XmlElement,
    errors: Vec<RpcErrorInfo>,
}

impl RpcReply {
    pub fn parse(raw: impl Into<String>) -> Result<Self, NetconfError> {
        let raw = raw.into();
        let root = XmlElement::parse(&raw).map_err(NetconfError::Decode)?;
        if root.name() != "rpc-reply" {
            return Err(NetconfError::Decode(format!(
                "expected <rpc-reply>, found <{}>",
                root.name()
            )));
        }
        let errors = root
            .children_named("rpc-error")
            .map(RpcErrorInfo::from_element)
            .collect();
        Ok(Self { raw, root, errors })
    }

    /// Builds the reply reported when a transport ends without answering.
    pub fn transport_error(tag: &str, message: &str) -> Self {
        let error = XmlElement::qualified(NETCONF_BASE_NS, None, "rpc-error")
            .with_child(XmlElement::qualified(NETCONF_BASE_NS, None, "error-type").with_text("transport"))
            .with_child(XmlElement::qualified(NETCONF_BASE_NS, None, "error-tag").with_text(tag))
            .with_child(XmlElement::qualified(NETCONF_BASE_NS, None, "error-severity").with_text("error"))
            .with_child(XmlElement::qualified(NETCONF_BASE_NS, None, "error-message").with_text(message));
        let root = XmlElement::qualified(NETCONF_BASE_NS, None, "rpc-reply").with_child(error);
        let errors = root
            .children_named("rpc-error")
            .map(RpcErrorInfo::from_element)
            .collect();
        let raw = root.render(Default::default());
        Self { raw, root, errors }
    }

    /// True unless the reply carries an error-severity `<rpc-error>`.
    pub fn is_ok(&self) -> bool {
        !self.errors.iter().any(RpcErrorInfo::is_error)
    }

    pub fn errors(&self) -> &[RpcErrorInfo] {
        &self.errors
    }

    /// First error-severity entry.
    pub fn first_error(&self) -> Option<&RpcErrorInfo> {
        self.errors.iter().find(|e| e.is_error())
    }

    /// True when the device refused because a lock is held elsewhere.
    pub fn is_lock_rejection(&self) -> bool {
        self.errors
            .iter()
            .filter(|e| e.is_error())
            .any(|e| LOCK_RETRY_ERROR_TAGS.contains(&e.tag.as_str()))
    }

    pub fn message_id(&self) -> Option<&str> {
        self.root.attribute("message-id")
    }

    pub fn root(&self) -> &XmlElement {
        &self.root
    }

    /// The `<data>` element of a retrieval reply.
    pub fn data(&self) -> Option<&XmlElement> {
        self.root.child("data")
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The reply re-indented for display, or the raw text if it cannot be.
    pub fn pretty(&self) -> String {
        pretty(&self.raw).unwrap_or_else(|_| self.raw.clone())
    }

    /// Converts a failed reply into an error; `None` when the reply is ok.
    pub fn to_error(&self) -> Option<NetconfError> {
        let first = self.first_error()?;
        Some(NetconfError::RpcError {
            tag: first.tag.clone(),
            message: first.message.clone().unwrap_or_default(),
            raw: self.raw.clone(),
        })
    }
}

/// Root element name and `message-id` of an incoming message, read without
/// building the whole tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHead {
    pub root: String,
    pub message_id: Option<String>,
}

impl MessageHead {
    pub fn peek(xml: &str) -> Option<Self> {
        let mut reader = Reader::from_str(xml);
        loop {
            match reader.read_event() {
                Ok(Event::Start(start)) | Ok(Event::Empty(start)) => {
                    let root = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
                    let message_id = start
                        .attributes()
                        .flatten()
                        .find(|a| a.key.local_name().as_ref() == b"message-id")
                        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()));
                    return Some(Self { root, message_id });
                }
                Ok(Event::Eof) | Err(_) => return None,
                Ok(_) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOCK_DENIED: &str = r#"<rpc-reply xmlns="urn:ietf:params:xml:ns:netconf:base:1.0" message-id="104">
  <rpc-error>
    <error-type>protocol</error-type>
    <error-tag>lock-denied</error-tag>
    <error-severity>error</error-severity>
    <error-message>Lock held by session 7</error-message>
  </rpc-error>
</rpc-reply>"#;

    #[test]
    fn ok_reply() {
        let reply = RpcReply::parse(
            r#"<rpc-reply xmlns="urn:ietf:params:xml:ns:netconf:base:1.0" message-id="101"><ok/></rpc-reply>"#,
        )
        .expect("parse");
        assert!(reply.is_ok());
        assert_eq!(reply.message_id(), Some("101"));
        assert!(reply.to_error().is_none());
    }

    #[test]
    fn lock_denied_is_a_lock_rejection() {
        let reply = RpcReply::parse(LOCK_DENIED).expect("parse");
        assert!(!reply.is_ok());
        assert!(reply.is_lock_rejection());
        let err = reply.to_error().expect("error");
        assert_eq!(err.to_string(), "rpc-error lock-denied: Lock held by session 7");
    }

    #[test]
    fn warnings_do_not_fail_the_reply() {
        let reply = RpcReply::parse(
            r#"<rpc-reply message-id="3"><rpc-error><error-tag>partial-operation</error-tag><error-severity>warning</error-severity></rpc-error><ok/></rpc-reply>"#,
        )
        .expect("parse");
        assert!(reply.is_ok());
        assert_eq!(reply.errors().len(), 1);
    }

    #[test]
    fn non_reply_root_is_rejected() {
        assert!(RpcReply::parse("<hello/>").is_err());
    }

    #[test]
    fn transport_error_reply() {
        let reply = RpcReply::transport_error("resource-denied", "No pipe data returned");
        assert!(reply.is_lock_rejection());
        let first = reply.first_error().expect("error");
        assert_eq!(first.error_type.as_deref(), Some("transport"));
        assert_eq!(first.message.as_deref(), Some("No pipe data returned"));
        assert!(reply.raw().contains("<error-tag>resource-denied</error-tag>"));
    }

    #[test]
    fn peek_reads_root_and_message_id() {
        let head = MessageHead::peek(
            "<?xml version=\"1.0\"?>\n<nc:rpc-reply xmlns:nc=\"urn:ietf:params:xml:ns:netconf:base:1.0\" message-id=\"42\"><nc:ok/></nc:rpc-reply>",
        )
        .expect("head");
        assert_eq!(head.root, "rpc-reply");
        assert_eq!(head.message_id.as_deref(), Some("42"));
    }
}
