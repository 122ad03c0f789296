//! # netconf-session - NETCONF Client Sessions for Network Devices
//!
//! `netconf-session` opens NETCONF sessions to network devices, builds RPCs
//! from structured operation descriptions, and runs batches of operations
//! with the commit, discard and locking rules device automation needs.
//!
//! ## Features
//!
//! - **Session Registry**: One cached session per user, device and stream
//! - **Two Transports**: NETCONF over SSH, or chunk-framed over a local subprocess pipe
//! - **Capability Model**: Datastores, with-defaults modes and schema sources derived from `<hello>`
//! - **RPC Builder**: Deterministic XML with `always`/`minimal` namespace prefixes and XPath-based config
//! - **Lock Coordinator**: Retries transient lock denials, fails fast on fatal ones
//! - **Operation Dispatcher**: Commit gating, automatic discard, lock-and-retry commits
//! - **Schema Discovery**: yang-library, then netconf-monitoring, then capability URIs
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use netconf_session::rpc::{OperationRequest, Payload};
//! use netconf_session::session::{DeviceEndpoint, Dispatcher, SessionIdentity, SessionRegistry};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = SessionRegistry::default();
//!     let endpoint = DeviceEndpoint::new("csr1", "192.168.1.1", "admin", "password");
//!     let session = registry
//!         .connect(&SessionIdentity::new("alice", "csr1"), &endpoint)
//!         .await?;
//!
//!     let batch = vec![
//!         OperationRequest::EditConfig {
//!             datastore: "candidate".to_string(),
//!             config: Payload::Xml(
//!                 r#"<native xmlns="http://cisco.com/ns/yang/Cisco-IOS-XE-native"><hostname>r1</hostname></native>"#
//!                     .to_string(),
//!             ),
//!         },
//!         OperationRequest::Commit,
//!     ];
//!     for result in Dispatcher::default().dispatch(&session, &batch).await? {
//!         println!("{} {:?}\n{}", result.operation, result.status, result.text);
//!     }
//!
//!     registry.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Main Components
//!
//! - [`session::SessionRegistry`] - Owns live sessions, one per identity
//! - [`session::Session`] - Connection state machine and RPC round-trips
//! - [`session::Dispatcher`] - Batch execution with commit/discard policy
//! - [`rpc::RpcBuilder`] - Operation requests to NETCONF XML
//! - [`capabilities::Capabilities`] - What the device advertised
//! - [`schema::discover_schemas`] - Module and revision listing
//! - [`error::NetconfError`] - Error type shared by every operation

pub mod capabilities;
pub mod config;
pub mod error;
pub mod framing;
pub mod rpc;
pub mod schema;
pub mod session;
pub mod xml;
