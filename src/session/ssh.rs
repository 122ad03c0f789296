use async_ssh2_tokio::client::{AuthMethod, Client};
use async_ssh2_tokio::{Config, Error as SshError};
use async_trait::async_trait;

use super::transport::{ChannelOptions, FramedChannel};
use super::*;

/// Opens NETCONF sessions over the SSH `netconf` subsystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct SshConnector;

/// Maps SSH client errors onto the connection failure kinds callers act on.
fn classify(endpoint: &DeviceEndpoint, err: SshError) -> NetconfError {
    let device = format!("{}:{}", endpoint.address, endpoint.port);
    match err {
        SshError::ServerCheckFailed => NetconfError::HostKeyUntrusted(device),
        SshError::PasswordWrong | SshError::KeyAuthFailed => {
            NetconfError::AuthenticationFailed(format!("{}@{}", endpoint.username, device))
        }
        SshError::AddressInvalid(e) => NetconfError::ConnectionRefused {
            device,
            detail: e.to_string(),
        },
        SshError::SshError(russh::Error::IO(e))
            if e.kind() == std::io::ErrorKind::ConnectionRefused =>
        {
            NetconfError::ConnectionRefused {
                device,
                detail: e.to_string(),
            }
        }
        other => NetconfError::TransportFailure(format!("{device}: {other}")),
    }
}

#[async_trait]
impl Connector for SshConnector {
    async fn open(
        &self,
        endpoint: &DeviceEndpoint,
        log: &MessageLog,
    ) -> Result<Arc<dyn Transport>, NetconfError> {
        let device_addr = format!("{}@{}:{}", endpoint.username, endpoint.address, endpoint.port);
        let security_options = ConnectionSecurityOptions::for_endpoint(endpoint);

        let ssh_config = Config {
            preferred: security_options.preferred(),
            inactivity_timeout: None,
            keepalive_interval: Some(Duration::from_secs(30)),
            ..Default::default()
        };

        let connect = Client::connect_with_config(
            (endpoint.address.clone(), endpoint.port),
            &endpoint.username,
            AuthMethod::with_password(&endpoint.password),
            security_options.server_check.clone(),
            ssh_config,
        );
        let client = tokio::time::timeout(endpoint.rpc_timeout(), connect)
            .await
            .map_err(|_| NetconfError::Timeout {
                operation: format!("connect to {}", endpoint.name),
                seconds: endpoint.timeout_secs,
            })?
            .map_err(|e| classify(endpoint, e))?;
        debug!("{} TCP connection successful", device_addr);

        let channel = client
            .get_channel()
            .await
            .map_err(|e| NetconfError::TransportFailure(format!("{device_addr}: {e}")))?;
        channel
            .request_subsystem(true, "netconf")
            .await
            .map_err(|e| {
                NetconfError::TransportFailure(format!(
                    "{device_addr}: netconf subsystem request failed: {e}"
                ))
            })?;
        debug!("{} netconf subsystem request successful", device_addr);

        let (reader, writer) = tokio::io::split(channel.into_stream());
        let channel = FramedChannel::establish(
            reader,
            writer,
            ChannelOptions {
                label: device_addr,
                client_capabilities: config::CLIENT_CAPABILITIES,
                force_chunked: false,
                eof_reply: None,
                hello_timeout: endpoint.rpc_timeout(),
            },
            log,
        )
        .await?;

        Ok(Arc::new(SshTransport {
            channel,
            client: Mutex::new(Some(client)),
        }))
    }
}

struct SshTransport {
    channel: FramedChannel,
    client: Mutex<Option<Client>>,
}

#[async_trait]
impl Transport for SshTransport {
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
        if let Some(client) = self.client.lock().await.take() {
            if let Err(e) = client.disconnect().await {
                debug!("SSH disconnect failed: {:?}", e);
            }
        }
        Ok(())
    }
}
