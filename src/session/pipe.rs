use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::{Child, Command};

use super::transport::{ChannelOptions, FramedChannel};
use super::*;
use crate::rpc::RpcReply;

/// Runs NETCONF over the stdin/stdout of a local subprocess, such as an
/// on-box SSH proxy.
///
/// The subprocess always speaks base:1.1, so chunked framing is used as soon
/// as the hello exchange completes. If it stops producing output, pending and
/// later RPCs receive a synthesized `resource-denied` error reply instead of
/// failing the session outright.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipeConnector;

fn no_data_reply() -> String {
    RpcReply::transport_error("resource-denied", "No pipe data returned")
        .raw()
        .to_string()
}

#[async_trait]
impl Connector for PipeConnector {
    async fn open(
        &self,
        endpoint: &DeviceEndpoint,
        log: &MessageLog,
    ) -> Result<Arc<dyn Transport>, NetconfError> {
        let argv = endpoint.pipe_argv();
        let Some((program, args)) = argv.split_first() else {
            return Err(NetconfError::TransportFailure(format!(
                "{}: empty pipe command",
                endpoint.name
            )));
        };

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                NetconfError::TransportFailure(format!("{}: failed to start {program}: {e}", endpoint.name))
            })?;
        debug!("{} started pipe transport {:?}", endpoint.name, argv);

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(NetconfError::TransportFailure(format!(
                "{}: pipe stdio unavailable",
                endpoint.name
            )));
        };

        let channel = FramedChannel::establish(
            stdout,
            stdin,
            ChannelOptions {
                label: format!("pipe:{}", endpoint.name),
                client_capabilities: config::PIPE_CLIENT_CAPABILITIES,
                force_chunked: true,
                eof_reply: Some(no_data_reply()),
                hello_timeout: endpoint.rpc_timeout(),
            },
            log,
        )
        .await?;

        Ok(Arc::new(PipeTransport {
            channel,
            child: Mutex::new(Some(child)),
        }))
    }
}

struct PipeTransport {
    channel: FramedChannel,
    child: Mutex<Option<Child>>,
}

#[async_trait]
impl Transport for PipeTransport {
    fn server_capabilities(&self) -> Vec<String> {
        self.channel.capabilities()
    }

    fn session_id(&self) -> Option<String> {
        self.channel.session_id()
    }

    fn is_connected(&self) -> bool {
        self.channel.is_connected()
    }

    async fn rpc(
        &self,
        message_id: u64,
        request: &str,
        timeout: Duration,
    ) -> Result<String, NetconfError> {
        self.channel.rpc(message_id, request, timeout).await
    }

    async fn take_notification(&self, wait: Duration) -> Result<Option<String>, NetconfError> {
        self.channel.take_notification(wait).await
    }

    async fn close(&self) -> Result<(), NetconfError> {
        self.channel.close();
        if let Some(mut child) = self.child.lock().await.take() {
            if let Err(e) = child.kill().await {
                debug!("pipe transport kill failed: {:?}", e);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_data_reply_is_a_resource_denied_error() {
        let reply = RpcReply::parse(no_data_reply()).expect("parse");
        let error = reply.first_error().expect("error");
        assert_eq!(error.tag, "resource-denied");
        assert_eq!(error.message.as_deref(), Some("No pipe data returned"));
    }

    #[tokio::test]
    async fn missing_program_is_a_transport_failure() {
        let mut endpoint = DeviceEndpoint::new("local", "127.0.0.1", "lab", "");
        endpoint.transport = TransportVariant::Pipe;
        endpoint.pipe_command = Some(vec!["/nonexistent/netconf-proxy".to_string()]);
        let err = PipeConnector
            .open(&endpoint, &MessageLog::default())
            .await
            .err()
            .expect("spawn must fail");
        assert!(matches!(err, NetconfError::TransportFailure(_)));
    }
}
