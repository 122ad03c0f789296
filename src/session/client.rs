use std::future::Future;
use std::sync::atomic::Ordering;

use log::{info, warn};

use super::*;
use crate::rpc::{OperationRequest, RpcReply};
use crate::xml::XmlElement;

impl Session {
    pub fn new(
        identity: SessionIdentity,
        endpoint: DeviceEndpoint,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let fingerprint = endpoint.fingerprint();
        Self {
            identity,
            endpoint,
            fingerprint,
            connector,
            builder: RpcBuilder::default(),
            state: RwLock::new(SessionState::default()),
            connect_gate: Mutex::new(()),
            log: MessageLog::default(),
            next_message_id: AtomicU64::new(config::FIRST_MESSAGE_ID),
        }
    }

    /// Replaces the request builder, e.g. to always emit namespace
    /// declarations.
    pub fn with_builder(mut self, builder: RpcBuilder) -> Self {
        self.builder = builder;
        self
    }

    pub fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    pub fn endpoint(&self) -> &DeviceEndpoint {
        &self.endpoint
    }

    pub fn fingerprint(&self) -> &[u8; 32] {
        &self.fingerprint
    }

    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    pub fn builder(&self) -> &RpcBuilder {
        &self.builder
    }

    pub async fn phase(&self) -> SessionPhase {
        self.state.read().await.phase
    }

    pub async fn is_connected(&self) -> bool {
        let state = self.state.read().await;
        state.phase == SessionPhase::Connected
            && state.transport.as_ref().is_some_and(|t| t.is_connected())
    }

    /// Capability snapshot from the last successful connect. Empty when the
    /// session has never connected.
    pub async fn capabilities(&self) -> Arc<Capabilities> {
        self.state.read().await.capabilities.clone()
    }

    pub async fn session_id(&self) -> Option<String> {
        self.state.read().await.session_id.clone()
    }

    /// Connects if not already connected.
    ///
    /// Concurrent callers are serialized; the second one finds the session
    /// connected and returns immediately.
    pub async fn connect(&self) -> Result<(), NetconfError> {
        let _gate = self.connect_gate.lock().await;
        {
            let state = self.state.read().await;
            if state.phase == SessionPhase::Connected
                && state.transport.as_ref().is_some_and(|t| t.is_connected())
            {
                return Ok(());
            }
        }
        self.teardown().await;

        let device_addr = format!("{}:{}", self.endpoint.address, self.endpoint.port);
        self.state.write().await.phase = SessionPhase::Connecting;
        debug!("{} connecting to {}", self.identity, device_addr);

        match self.connector.open(&self.endpoint, &self.log).await {
            Ok(transport) => {
                let capabilities = Arc::new(Capabilities::from_uris(transport.server_capabilities()));
                let listener = NotificationListener::spawn(
                    transport.clone(),
                    self.log.clone(),
                    self.identity.to_string(),
                    config::NOTIFICATION_POLL_INTERVAL,
                );
                let mut state = self.state.write().await;
                state.session_id = transport.session_id();
                state.transport = Some(transport);
                state.capabilities = capabilities;
                state.locked.clear();
                state.listener = Some(listener);
                state.phase = SessionPhase::Connected;
                drop(state);
                self.log.append(format!("NETCONF CONNECTED {device_addr}"));
                info!("{} NETCONF CONNECTED {}", self.identity, device_addr);
                Ok(())
            }
            Err(e) => {
                self.state.write().await.phase = SessionPhase::Disconnected;
                self.log.append(format!("NETCONF CONNECT FAILED {device_addr}: {e}"));
                warn!("{} connect to {} failed: {}", self.identity, device_addr, e);
                Err(e)
            }
        }
    }

    /// Closes the transport and stops the listener. Disconnecting a
    /// disconnected session does nothing.
    pub async fn disconnect(&self) -> Result<(), NetconfError> {
        let _gate = self.connect_gate.lock().await;
        if self.state.read().await.phase == SessionPhase::Disconnected {
            return Ok(());
        }
        self.teardown().await;
        self.log.append("NETCONF DISCONNECTED");
        debug!("{} disconnected", self.identity);
        Ok(())
    }

    async fn teardown(&self) {
        let (listener, transport) = {
            let mut state = self.state.write().await;
            state.phase = SessionPhase::Disconnected;
            state.locked.clear();
            state.session_id = None;
            (state.listener.take(), state.transport.take())
        };
        if let Some(listener) = listener {
            listener.stop().await;
        }
        if let Some(transport) = transport {
            if let Err(e) = transport.close().await {
                debug!("{} transport close failed: {}", self.identity, e);
            }
        }
    }

    /// Marks the session disconnected after the transport died under it.
    async fn mark_lost(&self) {
        let listener = {
            let mut state = self.state.write().await;
            if state.phase != SessionPhase::Connected {
                return;
            }
            state.phase = SessionPhase::Disconnected;
            state.locked.clear();
            state.transport = None;
            state.listener.take()
        };
        if let Some(listener) = listener {
            listener.cancel();
        }
        warn!("{} connection lost", self.identity);
        self.log.append("NETCONF CONNECTION LOST");
    }

    async fn live_transport(&self) -> Result<Arc<dyn Transport>, NetconfError> {
        let transport = {
            let state = self.state.read().await;
            match (&state.phase, &state.transport) {
                (SessionPhase::Connected, Some(transport)) => transport.clone(),
                _ => return Err(NetconfError::NotConnected(self.identity.to_string())),
            }
        };
        if !transport.is_connected() {
            self.mark_lost().await;
            return Err(NetconfError::NotConnected(self.identity.to_string()));
        }
        Ok(transport)
    }

    /// Wraps `operation` in an `<rpc>` envelope with the next message-id,
    /// sends it and parses the reply. Error replies are returned as `Ok`;
    /// only transport and decode failures are `Err`.
    pub async fn send(&self, operation: XmlElement) -> Result<RpcReply, NetconfError> {
        let transport = self.live_transport().await?;
        let operation_name = operation.name().to_string();
        let message_id = self.next_message_id.fetch_add(1, Ordering::SeqCst);
        let request = RpcBuilder::envelope(operation, message_id).render(self.builder.policy());
        self.log.append(request.clone());

        let result = transport
            .rpc(message_id, &request, self.endpoint.rpc_timeout())
            .await
            .map_err(|e| match e {
                NetconfError::Timeout { seconds, .. } => NetconfError::Timeout {
                    operation: operation_name.clone(),
                    seconds,
                },
                other => other,
            });
        if !transport.is_connected() {
            self.mark_lost().await;
        }
        let raw = result?;
        self.log.append(raw.clone());
        RpcReply::parse(raw)
    }

    /// Builds, capability-checks and sends one operation.
    pub async fn execute(&self, request: &OperationRequest) -> Result<RpcReply, NetconfError> {
        let operation = self.builder.operation(request)?;
        self.live_transport().await?;
        self.capabilities().await.check(request)?;
        self.send(operation).await
    }

    /// Runs `f` against this session, connecting first when needed. A session
    /// connected here is disconnected again once `f` finishes.
    pub async fn scoped<'a, T, F, Fut>(&'a self, f: F) -> Result<T, NetconfError>
    where
        F: FnOnce(&'a Session) -> Fut,
        Fut: Future<Output = Result<T, NetconfError>>,
    {
        let temporary = !self.is_connected().await;
        if temporary {
            debug!("{} No session found. Creating a new temporary session", self.identity);
            self.connect().await?;
        }
        let result = f(self).await;
        if temporary {
            debug!("{} Ending temporary session", self.identity);
            if let Err(e) = self.disconnect().await {
                debug!("{} temporary session close failed: {}", self.identity, e);
            }
        }
        result
    }

    /// Datastores this session currently holds locks on.
    pub async fn locked_datastores(&self) -> BTreeSet<String> {
        let state = self.state.read().await;
        if state.phase != SessionPhase::Connected {
            return BTreeSet::new();
        }
        state.locked.clone()
    }

    pub async fn is_locked(&self, datastore: &str) -> bool {
        self.locked_datastores().await.contains(datastore)
    }

    pub(super) async fn record_lock(&self, datastore: &str) {
        self.state.write().await.locked.insert(datastore.to_string());
    }

    pub(super) async fn release_lock(&self, datastore: &str) {
        self.state.write().await.locked.remove(datastore);
    }
}
