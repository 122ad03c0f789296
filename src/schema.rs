//! Schema discovery: which YANG modules (and revisions) a device serves.
//!
//! Sources are tried best first. The ietf-yang-library and
//! ietf-netconf-monitoring queries are used only when the device advertises
//! them; the list derived from capability URIs is the last resort and does
//! not include submodules.

use std::collections::BTreeSet;

use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::capabilities::SchemaSource;
use crate::config::{MONITORING_NS, YANG_LIBRARY_NS};
use crate::error::NetconfError;
use crate::rpc::{OperationRequest, Payload};
use crate::session::Session;
use crate::xml::XmlElement;

/// One `(module, revision)` pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
pub struct SchemaEntry {
    pub name: String,
    pub revision: String,
}

/// Discovered schemas and the source that produced them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SchemaList {
    pub source: SchemaSource,
    pub schemas: Vec<SchemaEntry>,
}

fn get_with_filter(filter: String) -> OperationRequest {
    OperationRequest::Get {
        filter: Some(Payload::Xml(filter)),
        with_defaults: None,
    }
}

fn field(element: &XmlElement, name: &str) -> Option<String> {
    element
        .child(name)
        .and_then(|c| c.text())
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

fn entry(element: &XmlElement, name_field: &str, revision_field: &str) -> Option<SchemaEntry> {
    Some(SchemaEntry {
        name: field(element, name_field)?,
        revision: field(element, revision_field).unwrap_or_else(|| "unknown".to_string()),
    })
}

/// Modules and submodules from an ietf-yang-library `<modules-state>`.
fn parse_yang_library(data: &XmlElement) -> Vec<SchemaEntry> {
    let Some(state) = data.child("modules-state") else {
        return Vec::new();
    };
    let mut found = Vec::new();
    for module in state.children_named("module") {
        found.extend(entry(module, "name", "revision"));
        for submodule in module.children_named("submodule") {
            found.extend(entry(submodule, "name", "revision"));
        }
    }
    found
}

/// YANG schemas from an ietf-netconf-monitoring `<schemas>` list.
fn parse_monitoring(data: &XmlElement) -> Vec<SchemaEntry> {
    let Some(schemas) = data.path(&["netconf-state", "schemas"]) else {
        return Vec::new();
    };
    schemas
        .children_named("schema")
        .filter(|schema| {
            field(schema, "format").is_none_or(|format| format == "yang" || format.ends_with(":yang"))
        })
        .filter_map(|schema| entry(schema, "identifier", "version"))
        .collect()
}

fn dedup(entries: Vec<SchemaEntry>) -> Vec<SchemaEntry> {
    let mut seen = BTreeSet::new();
    entries
        .into_iter()
        .filter(|e| seen.insert(e.clone()))
        .collect()
}

async fn query(
    session: &Session,
    source: SchemaSource,
) -> Result<Vec<SchemaEntry>, NetconfError> {
    let (filter, parse): (String, fn(&XmlElement) -> Vec<SchemaEntry>) = match source {
        SchemaSource::YangLibrary => (
            format!("<modules-state xmlns=\"{YANG_LIBRARY_NS}\"/>"),
            parse_yang_library,
        ),
        SchemaSource::NetconfMonitoring => (
            format!("<netconf-state xmlns=\"{MONITORING_NS}\"><schemas/></netconf-state>"),
            parse_monitoring,
        ),
        SchemaSource::Capabilities => {
            let modules = session.capabilities().await.modules();
            return Ok(modules
                .into_iter()
                .map(|m| SchemaEntry {
                    name: m.name,
                    revision: m.revision,
                })
                .collect());
        }
    };

    let reply = session.execute(&get_with_filter(filter)).await?;
    if let Some(err) = reply.to_error() {
        return Err(err);
    }
    Ok(reply.data().map(parse).unwrap_or_default())
}

/// Lists the schemas `session`'s device serves, connecting a temporary
/// session if needed.
///
/// A source is skipped when it answers with an error or an empty list.
/// Connection-level failures end discovery.
pub async fn discover_schemas(session: &Session) -> Result<SchemaList, NetconfError> {
    session
        .scoped(|session| async move {
            let sources = session.capabilities().await.schema_sources();
            for source in sources {
                match query(session, source).await {
                    Ok(found) if !found.is_empty() || source == SchemaSource::Capabilities => {
                        debug!(
                            "{} found {} schemas via {:?}",
                            session.identity(),
                            found.len(),
                            source
                        );
                        return Ok(SchemaList {
                            source,
                            schemas: dedup(found),
                        });
                    }
                    Ok(_) => debug!("{} {:?} returned no schemas", session.identity(), source),
                    Err(e) if e.is_connection_level() => return Err(e),
                    Err(e) => debug!("{} {:?} failed: {}", session.identity(), source, e),
                }
            }
            Ok(SchemaList {
                source: SchemaSource::Capabilities,
                schemas: Vec::new(),
            })
        })
        .await
}
