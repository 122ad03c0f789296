//! Namespace-aware XML element tree.
//!
//! Requests are assembled as [`XmlElement`] trees whose nodes carry a
//! namespace URI and a preferred prefix rather than literal `xmlns`
//! attributes. Declarations are computed at render time from the
//! [`NamespacePolicy`], so fragments contributed by different YANG modules
//! can be merged without their prefixes colliding.

use std::collections::BTreeMap;

use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::name::ResolveResult;
use quick_xml::reader::NsReader;
use quick_xml::{Reader, Writer};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::NetconfError;

/// Namespace of the reserved `xml` prefix (`xml:lang` and friends).
const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// How namespaces are expressed when a tree is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum NamespacePolicy {
    /// Every namespaced element is written with a prefix.
    Always,
    /// Elements use default-namespace declarations wherever possible.
    #[default]
    Minimal,
}

/// An attribute on an [`XmlElement`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlAttribute {
    pub name: String,
    pub namespace: Option<String>,
    pub prefix: Option<String>,
    pub value: String,
}

/// A single element with its attributes, text and children.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct XmlElement {
    name: String,
    namespace: Option<String>,
    prefix: Option<String>,
    attributes: Vec<XmlAttribute>,
    declarations: Vec<(String, String)>,
    text: Option<String>,
    children: Vec<XmlElement>,
}

impl XmlElement {
    /// Creates an element with no namespace.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Creates an element in `namespace`, preferring `prefix` when one is
    /// written out.
    pub fn qualified(namespace: &str, prefix: Option<&str>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: Some(namespace.to_string()),
            prefix: prefix.map(str::to_string),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn children(&self) -> &[XmlElement] {
        &self.children
    }

    pub fn children_mut(&mut self) -> &mut Vec<XmlElement> {
        &mut self.children
    }

    pub fn attributes(&self) -> &[XmlAttribute] {
        &self.attributes
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = Some(text.into());
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.set_text(text);
        self
    }

    pub fn push(&mut self, child: XmlElement) {
        self.children.push(child);
    }

    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.push(child);
        self
    }

    /// Sets an unqualified attribute, replacing any previous value.
    pub fn set_attribute(&mut self, name: &str, value: impl Into<String>) {
        self.set_qualified_attribute(None, None, name, value);
    }

    /// Sets an attribute in `namespace`, replacing any previous value.
    pub fn set_qualified_attribute(
        &mut self,
        namespace: Option<&str>,
        prefix: Option<&str>,
        name: &str,
        value: impl Into<String>,
    ) {
        let value = value.into();
        if let Some(existing) = self
            .attributes
            .iter_mut()
            .find(|a| a.name == name && a.namespace.as_deref() == namespace)
        {
            existing.value = value;
            return;
        }
        self.attributes.push(XmlAttribute {
            name: name.to_string(),
            namespace: namespace.map(str::to_string),
            prefix: prefix.map(str::to_string),
            value,
        });
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Forces `xmlns:prefix="uri"` onto this element, e.g. for identity
    /// values such as `ianaift:ethernetCsmacd` in leaf text.
    pub fn declare(&mut self, prefix: &str, uri: &str) {
        if !self.declarations.iter().any(|(p, _)| p == prefix) {
            self.declarations.push((prefix.to_string(), uri.to_string()));
        }
    }

    /// First direct child with the given local name.
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Direct children with the given local name.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Follows a path of local names through direct children.
    pub fn path(&self, names: &[&str]) -> Option<&XmlElement> {
        names
            .iter()
            .try_fold(self, |node, name| node.child(name))
    }

    /// All descendants (depth-first, document order) with the local name.
    pub fn descendants<'a>(&'a self, name: &str) -> Vec<&'a XmlElement> {
        let mut found = Vec::new();
        collect_descendants(self, name, &mut found);
        found
    }

    /// Serializes the tree with two-space indentation and a trailing newline.
    ///
    /// Output depends only on the tree and the policy, so rendering the same
    /// tree twice yields identical bytes.
    pub fn render(&self, policy: NamespacePolicy) -> String {
        let mut out = String::new();
        write_element(&mut out, self, policy, &Scope::default(), 0);
        out
    }

    /// Parses a document with a single root element.
    pub fn parse(xml: &str) -> Result<XmlElement, String> {
        let mut roots = parse_fragment(xml)?;
        match roots.len() {
            1 => Ok(roots.remove(0)),
            0 => Err("no element found".to_string()),
            n => Err(format!("expected a single root element, found {n}")),
        }
    }
}

fn collect_descendants<'a>(node: &'a XmlElement, name: &str, found: &mut Vec<&'a XmlElement>) {
    for child in &node.children {
        if child.name == name {
            found.push(child);
        }
        collect_descendants(child, name, found);
    }
}

#[derive(Debug, Clone, Default)]
struct Scope {
    default_ns: Option<String>,
    prefixes: BTreeMap<String, String>,
}

impl Scope {
    /// Returns a prefix bound to `uri`, declaring a fresh one when needed.
    /// A fresh prefix never shadows a binding already in scope.
    fn prefix_for(
        &mut self,
        uri: &str,
        hint: Option<&str>,
        decls: &mut Vec<(Option<String>, String)>,
    ) -> String {
        // The xml prefix is bound implicitly and never declared.
        if uri == XML_NS {
            return "xml".to_string();
        }
        if let Some(hint) = hint
            && self.prefixes.get(hint).map(String::as_str) == Some(uri)
        {
            return hint.to_string();
        }
        if let Some((bound, _)) = self.prefixes.iter().find(|(_, u)| u.as_str() == uri) {
            return bound.clone();
        }
        let base = hint.filter(|h| !h.is_empty()).unwrap_or("ns");
        let mut candidate = base.to_string();
        let mut n = 1;
        while self.prefixes.contains_key(&candidate) {
            candidate = format!("{base}{n}");
            n += 1;
        }
        self.prefixes.insert(candidate.clone(), uri.to_string());
        decls.push((Some(candidate.clone()), uri.to_string()));
        candidate
    }
}

fn write_element(
    out: &mut String,
    element: &XmlElement,
    policy: NamespacePolicy,
    parent: &Scope,
    depth: usize,
) {
    let mut scope = parent.clone();
    let mut decls: Vec<(Option<String>, String)> = Vec::new();

    for (prefix, uri) in &element.declarations {
        if scope.prefixes.get(prefix) != Some(uri) {
            scope.prefixes.insert(prefix.clone(), uri.clone());
            decls.push((Some(prefix.clone()), uri.clone()));
        }
    }

    let qname = match (&element.namespace, policy) {
        (None, _) => {
            if scope.default_ns.is_some() {
                scope.default_ns = None;
                decls.push((None, String::new()));
            }
            element.name.clone()
        }
        (Some(uri), NamespacePolicy::Minimal) => {
            if scope.default_ns.as_deref() != Some(uri.as_str()) {
                scope.default_ns = Some(uri.clone());
                decls.push((None, uri.clone()));
            }
            element.name.clone()
        }
        (Some(uri), NamespacePolicy::Always) => {
            let prefix = scope.prefix_for(uri, element.prefix.as_deref(), &mut decls);
            format!("{prefix}:{}", element.name)
        }
    };

    let mut attrs: Vec<(String, String)> = Vec::new();
    for attr in &element.attributes {
        let name = match &attr.namespace {
            Some(uri) => {
                let prefix = scope.prefix_for(uri, attr.prefix.as_deref(), &mut decls);
                format!("{prefix}:{}", attr.name)
            }
            None => attr.name.clone(),
        };
        attrs.push((name, attr.value.clone()));
    }

    let indent = "  ".repeat(depth);
    out.push_str(&indent);
    out.push('<');
    out.push_str(&qname);
    for (prefix, uri) in &decls {
        match prefix {
            Some(p) => out.push_str(&format!(" xmlns:{p}=\"{}\"", escape(uri.as_str()))),
            None => out.push_str(&format!(" xmlns=\"{}\"", escape(uri.as_str()))),
        }
    }
    for (name, value) in &attrs {
        out.push_str(&format!(" {name}=\"{}\"", escape(value.as_str())));
    }

    let text = element.text.as_deref().filter(|t| !t.is_empty());
    match (text, element.children.is_empty()) {
        (None, true) => out.push_str("/>\n"),
        (Some(text), true) => {
            out.push('>');
            out.push_str(&escape(text));
            out.push_str(&format!("</{qname}>\n"));
        }
        (text, false) => {
            out.push('>');
            if let Some(text) = text {
                out.push_str(&escape(text));
            }
            out.push('\n');
            for child in &element.children {
                write_element(out, child, policy, &scope, depth + 1);
            }
            out.push_str(&indent);
            out.push_str(&format!("</{qname}>\n"));
        }
    }
}

/// Parses an XML fragment that may hold several sibling root elements.
///
/// Namespaces are resolved: the result carries URIs and the prefixes used in
/// the source as hints, never literal `xmlns` attributes.
pub fn parse_fragment(xml: &str) -> Result<Vec<XmlElement>, String> {
    let mut reader = NsReader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut roots = Vec::new();
    let mut stack: Vec<XmlElement> = Vec::new();

    loop {
        let (resolved, event) = match reader.read_resolved_event() {
            Ok(resolved) => resolved,
            Err(e) => return Err(e.to_string()),
        };
        let namespace = owned_namespace(resolved)?;
        match event {
            Event::Start(start) => {
                let element = element_from_start(&reader, &start, namespace)?;
                stack.push(element);
            }
            Event::Empty(start) => {
                let element = element_from_start(&reader, &start, namespace)?;
                match stack.last_mut() {
                    Some(parent) => parent.push(element),
                    None => roots.push(element),
                }
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| "closing tag without an open element".to_string())?;
                match stack.last_mut() {
                    Some(parent) => parent.push(element),
                    None => roots.push(element),
                }
            }
            Event::Text(text) => {
                let value = text.unescape().map_err(|e| e.to_string())?;
                append_text(&mut stack, &value)?;
            }
            Event::CData(data) => {
                let value = String::from_utf8_lossy(&data).into_owned();
                append_text(&mut stack, &value)?;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(format!("element <{}> is never closed", open.name));
    }
    Ok(roots)
}

fn owned_namespace(resolved: ResolveResult<'_>) -> Result<Option<String>, String> {
    match resolved {
        ResolveResult::Bound(ns) => Ok(Some(String::from_utf8_lossy(ns.0).into_owned())),
        ResolveResult::Unbound => Ok(None),
        ResolveResult::Unknown(prefix) if prefix == b"xml" => Ok(Some(XML_NS.to_string())),
        ResolveResult::Unknown(prefix) => Err(format!(
            "unknown namespace prefix '{}'",
            String::from_utf8_lossy(&prefix)
        )),
    }
}

fn append_text(stack: &mut [XmlElement], value: &str) -> Result<(), String> {
    match stack.last_mut() {
        Some(top) => {
            let text = top.text.get_or_insert_with(String::new);
            text.push_str(value);
            Ok(())
        }
        None if value.trim().is_empty() => Ok(()),
        None => Err(format!("text '{}' outside of an element", value.trim())),
    }
}

fn element_from_start(
    reader: &NsReader<&[u8]>,
    start: &quick_xml::events::BytesStart<'_>,
    namespace: Option<String>,
) -> Result<XmlElement, String> {
    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
    let prefix = start
        .name()
        .prefix()
        .map(|p| String::from_utf8_lossy(p.as_ref()).into_owned());
    let mut element = XmlElement {
        name,
        namespace,
        prefix,
        ..Default::default()
    };

    for attr in start.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        let key = attr.key.as_ref();
        if key == b"xmlns" || key.starts_with(b"xmlns:") {
            continue;
        }
        let (resolved, local) = reader.resolve_attribute(attr.key);
        let attr_ns = owned_namespace(resolved)?;
        let attr_prefix = attr
            .key
            .prefix()
            .map(|p| String::from_utf8_lossy(p.as_ref()).into_owned());
        let value = attr.unescape_value().map_err(|e| e.to_string())?;
        element.attributes.push(XmlAttribute {
            name: String::from_utf8_lossy(local.as_ref()).into_owned(),
            namespace: attr_ns,
            prefix: attr_prefix,
            value: value.into_owned(),
        });
    }
    Ok(element)
}

/// Re-indents an XML document for display.
pub fn pretty(xml: &str) -> Result<String, NetconfError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    loop {
        let event = reader.read_event().map_err(|e| {
            NetconfError::Decode(format!("{e} at position {}", reader.buffer_position()))
        })?;
        match event {
            Event::Eof => break,
            Event::Decl(_) => continue,
            other => writer
                .write_event(other)
                .map_err(|e| NetconfError::Decode(e.to_string()))?,
        }
    }

    let mut text = String::from_utf8(writer.into_inner())
        .map_err(|e| NetconfError::Decode(e.to_string()))?;
    text.push('\n');
    Ok(text)
}

/// Number of bytes shown on each side of an invalid UTF-8 sequence.
const DECODE_CONTEXT: usize = 30;

/// Converts reply bytes to text, reporting where decoding failed.
pub fn decode_utf8(bytes: Vec<u8>) -> Result<String, NetconfError> {
    String::from_utf8(bytes).map_err(|err| {
        let pos = err.utf8_error().valid_up_to();
        let bytes = err.as_bytes();
        let start = pos.saturating_sub(DECODE_CONTEXT);
        let end = (pos + DECODE_CONTEXT).min(bytes.len());
        NetconfError::Decode(format!(
            "invalid UTF-8 at byte {pos}\nData surrounding the error: {}",
            String::from_utf8_lossy(&bytes[start..end])
        ))
    })
}
