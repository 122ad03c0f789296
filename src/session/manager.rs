use moka::future::Cache;

use super::*;

/// Connector used for each [`TransportVariant`].
#[derive(Clone)]
pub struct Connectors {
    pub standard: Arc<dyn Connector>,
    pub pipe: Arc<dyn Connector>,
}

impl Default for Connectors {
    fn default() -> Self {
        Self {
            standard: Arc::new(SshConnector),
            pipe: Arc::new(PipeConnector),
        }
    }
}

impl fmt::Debug for Connectors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connectors").finish_non_exhaustive()
    }
}

impl Connectors {
    /// Uses one connector for both variants.
    pub fn uniform(connector: Arc<dyn Connector>) -> Self {
        Self {
            standard: connector.clone(),
            pipe: connector,
        }
    }

    pub fn for_variant(&self, variant: TransportVariant) -> Arc<dyn Connector> {
        match variant {
            TransportVariant::Standard => self.standard.clone(),
            TransportVariant::Pipe => self.pipe.clone(),
        }
    }
}

/// Live sessions keyed by [`SessionIdentity`].
///
/// Owned by the application and passed to whoever needs sessions. At most one
/// session exists per identity: concurrent lookups for a missing identity
/// share one initialisation. Entries never expire on their own; they leave
/// only through [`destroy`](Self::destroy), [`shutdown`](Self::shutdown) or
/// replacement after the endpoint parameters changed.
pub struct SessionRegistry {
    cache: Cache<SessionIdentity, Arc<Session>>,
    connectors: Connectors,
    builder: RpcBuilder,
    /// Serializes replacement of sessions whose endpoint changed.
    replace_gate: Mutex<()>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(Connectors::default())
    }
}

impl fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.cache.entry_count())
            .finish_non_exhaustive()
    }
}

impl SessionRegistry {
    pub fn new(connectors: Connectors) -> Self {
        Self {
            cache: Cache::builder().build(),
            connectors,
            builder: RpcBuilder::default(),
            replace_gate: Mutex::new(()),
        }
    }

    /// Builder handed to every session created from now on.
    pub fn with_builder(mut self, builder: RpcBuilder) -> Self {
        self.builder = builder;
        self
    }

    fn new_session(&self, identity: &SessionIdentity, endpoint: &DeviceEndpoint) -> Arc<Session> {
        Arc::new(
            Session::new(
                identity.clone(),
                endpoint.clone(),
                self.connectors.for_variant(endpoint.transport),
            )
            .with_builder(self.builder),
        )
    }

    /// Returns the session for `identity`, creating it (disconnected) on
    /// first use.
    ///
    /// A cached session created from different endpoint parameters is
    /// disconnected and replaced.
    pub async fn get(
        &self,
        identity: &SessionIdentity,
        endpoint: &DeviceEndpoint,
    ) -> Result<Arc<Session>, NetconfError> {
        if !endpoint.netconf_enabled {
            return Err(NetconfError::NetconfDisabled(endpoint.name.clone()));
        }

        let session = self
            .cache
            .get_with(identity.clone(), async { self.new_session(identity, endpoint) })
            .await;
        let fingerprint = endpoint.fingerprint();
        if session.fingerprint() == &fingerprint {
            return Ok(session);
        }

        let _gate = self.replace_gate.lock().await;
        if let Some(current) = self.cache.get(identity).await {
            if current.fingerprint() == &fingerprint {
                return Ok(current);
            }
            debug!("{} connection parameters changed, replacing session", identity);
            if let Err(e) = current.disconnect().await {
                debug!("{} failed to close replaced session: {}", identity, e);
            }
        }
        let fresh = self.new_session(identity, endpoint);
        self.cache.insert(identity.clone(), fresh.clone()).await;
        Ok(fresh)
    }

    /// Cached session for `identity`, if any.
    pub async fn lookup(&self, identity: &SessionIdentity) -> Option<Arc<Session>> {
        self.cache.get(identity).await
    }

    /// Returns a connected session for `identity`.
    pub async fn connect(
        &self,
        identity: &SessionIdentity,
        endpoint: &DeviceEndpoint,
    ) -> Result<Arc<Session>, NetconfError> {
        let session = self.get(identity, endpoint).await?;
        session.connect().await?;
        Ok(session)
    }

    /// Disconnects and forgets the session for `identity`. Returns whether a
    /// session existed.
    pub async fn destroy(&self, identity: &SessionIdentity) -> Result<bool, NetconfError> {
        match self.cache.remove(identity).await {
            Some(session) => {
                debug!("{} session destroyed", identity);
                session.disconnect().await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Identities with a cached session, sorted.
    pub fn identities(&self) -> Vec<SessionIdentity> {
        let mut identities: Vec<SessionIdentity> =
            self.cache.iter().map(|(identity, _)| (*identity).clone()).collect();
        identities.sort();
        identities
    }

    /// Destroys every session.
    pub async fn shutdown(&self) {
        for identity in self.identities() {
            if let Err(e) = self.destroy(&identity).await {
                debug!("{} close during shutdown failed: {}", identity, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(connector: &ReplayConnector) -> SessionRegistry {
        SessionRegistry::new(Connectors::uniform(Arc::new(connector.clone())))
    }

    fn endpoint() -> DeviceEndpoint {
        DeviceEndpoint::new("csr1", "10.0.0.1", "admin", "admin")
    }

    #[tokio::test]
    async fn disabled_device_is_refused() {
        let connector = ReplayConnector::new(ReplayScript::new(), &[config::CAP_BASE_1_1]);
        let registry = registry(&connector);
        let mut endpoint = endpoint();
        endpoint.netconf_enabled = false;
        let err = registry
            .get(&SessionIdentity::new("alice", "csr1"), &endpoint)
            .await
            .expect_err("disabled");
        assert!(matches!(err, NetconfError::NetconfDisabled(ref name) if name == "csr1"));
        assert!(registry.identities().is_empty());
    }

    #[tokio::test]
    async fn same_identity_returns_same_session() {
        let connector = ReplayConnector::new(ReplayScript::new(), &[config::CAP_BASE_1_1]);
        let registry = registry(&connector);
        let id = SessionIdentity::new("alice", "csr1");
        let a = registry.get(&id, &endpoint()).await.expect("a");
        let b = registry.get(&id, &endpoint()).await.expect("b");
        assert!(Arc::ptr_eq(&a, &b));

        let other = registry
            .get(&SessionIdentity::new("alice", "csr1").with_stream("events"), &endpoint())
            .await
            .expect("stream");
        assert!(!Arc::ptr_eq(&a, &other));
    }

    #[tokio::test]
    async fn changed_password_replaces_the_session() {
        let connector = ReplayConnector::new(ReplayScript::new(), &[config::CAP_BASE_1_1]);
        let registry = registry(&connector);
        let id = SessionIdentity::new("alice", "csr1");
        let old = registry.connect(&id, &endpoint()).await.expect("connect");

        let mut changed = endpoint();
        changed.password = "rotated".to_string();
        let new = registry.get(&id, &changed).await.expect("replace");
        assert!(!Arc::ptr_eq(&old, &new));
        assert_eq!(old.phase().await, SessionPhase::Disconnected);
        let cached = registry.lookup(&id).await.expect("cached");
        assert!(Arc::ptr_eq(&cached, &new));
    }

    #[tokio::test]
    async fn destroy_disconnects_and_forgets() {
        let connector = ReplayConnector::new(ReplayScript::new(), &[config::CAP_BASE_1_1]);
        let registry = registry(&connector);
        let id = SessionIdentity::new("alice", "csr1");
        let session = registry.connect(&id, &endpoint()).await.expect("connect");

        assert!(registry.destroy(&id).await.expect("destroy"));
        assert_eq!(session.phase().await, SessionPhase::Disconnected);
        assert!(registry.lookup(&id).await.is_none());
        assert!(!registry.destroy(&id).await.expect("second destroy"));
    }
}
