#![cfg(unix)]

use std::sync::Arc;

use netconf_session::rpc::{OperationRequest, Payload};
use netconf_session::session::{
    DeviceEndpoint, PipeConnector, Session, SessionIdentity, SessionPhase, TransportVariant,
};

const SERVER_HELLO: &str = r#"<hello xmlns="urn:ietf:params:xml:ns:netconf:base:1.0"><capabilities><capability>urn:ietf:params:netconf:base:1.1</capability><capability>urn:ietf:params:netconf:capability:candidate:1.0</capability></capabilities><session-id>7</session-id></hello>]]>]]>"#;

/// A pipe endpoint whose subprocess runs `script` under `sh`.
fn endpoint(script: String) -> DeviceEndpoint {
    let mut endpoint = DeviceEndpoint::new("local", "127.0.0.1", "lab", "");
    endpoint.transport = TransportVariant::Pipe;
    endpoint.timeout_secs = 10;
    endpoint.pipe_command = Some(vec!["sh".to_string(), "-c".to_string(), script]);
    endpoint
}

fn session(endpoint: DeviceEndpoint) -> Session {
    Session::new(
        SessionIdentity::new("lab", "local"),
        endpoint,
        Arc::new(PipeConnector),
    )
}

fn get_request() -> OperationRequest {
    OperationRequest::Rpc {
        payload: Payload::Xml("<get/>".to_string()),
    }
}

#[tokio::test]
async fn hello_and_chunked_reply_over_a_subprocess() {
    let reply = r#"<rpc-reply xmlns="urn:ietf:params:xml:ns:netconf:base:1.0"><ok/></rpc-reply>"#;
    let script = format!(
        "printf '%s' '{SERVER_HELLO}'; sleep 1; printf '\\n#{}\\n%s\\n##\\n' '{reply}'; sleep 2",
        reply.len()
    );
    let session = session(endpoint(script));

    session.connect().await.expect("connect");
    assert_eq!(session.session_id().await.as_deref(), Some("7"));
    assert!(session.capabilities().await.has_candidate());

    let reply = session.execute(&get_request()).await.expect("reply");
    assert!(reply.is_ok());
    session.disconnect().await.expect("disconnect");
}

#[tokio::test]
async fn silent_subprocess_yields_a_resource_denied_reply() {
    let script = format!("printf '%s' '{SERVER_HELLO}'; sleep 1");
    let session = session(endpoint(script));

    session.connect().await.expect("connect");
    let reply = session.execute(&get_request()).await.expect("synthesized reply");

    assert!(!reply.is_ok());
    let error = reply.first_error().expect("error");
    assert_eq!(error.tag, "resource-denied");
    assert_eq!(error.message.as_deref(), Some("No pipe data returned"));
    assert_eq!(session.phase().await, SessionPhase::Disconnected);
}

#[tokio::test]
async fn subprocess_exiting_before_hello_fails_connect() {
    let session = session(endpoint("exit 0".to_string()));
    let err = session.connect().await.expect_err("no hello");
    assert!(err.is_connection_level());
    assert_eq!(session.phase().await, SessionPhase::Disconnected);
}
