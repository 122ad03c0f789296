use log::{info, warn};

use super::*;
use crate::rpc::{OperationRequest, RpcReply};

/// How hard [`lock_datastore`] tries before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct LockPolicy {
    pub max_attempts: u32,
    pub interval_ms: u64,
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self {
            max_attempts: config::DEFAULT_LOCK_ATTEMPTS,
            interval_ms: config::DEFAULT_LOCK_INTERVAL.as_millis() as u64,
        }
    }
}

impl LockPolicy {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Result of [`unlock_datastore`].
#[derive(Debug, Clone)]
pub enum UnlockOutcome {
    /// The session did not hold the lock; nothing was sent.
    AlreadyUnlocked,
    /// An `<unlock>` was sent; the reply may still carry an error.
    Unlocked(RpcReply),
}

/// Locks `datastore`, retrying while the device reports it as held by
/// someone else.
///
/// `lock-denied`, `resource-denied` and `in-use` are retried up to
/// `max_attempts` times with `interval` between attempts; any other error
/// tag fails immediately. A `max_attempts` of zero still makes one attempt.
pub async fn try_lock(
    session: &Session,
    datastore: &str,
    max_attempts: u32,
    interval: Duration,
) -> Result<RpcReply, NetconfError> {
    let max_attempts = max_attempts.max(1);
    let request = OperationRequest::Lock {
        datastore: datastore.to_string(),
    };
    let log = session.log();

    for attempt in 1..=max_attempts {
        let reply = session.execute(&request).await?;
        if reply.is_ok() {
            session.record_lock(datastore).await;
            debug!("{} locked {}", session.identity(), datastore);
            return Ok(reply);
        }

        let (tag, message) = reply
            .first_error()
            .map(|e| (e.tag.clone(), e.message.clone().unwrap_or_default()))
            .unwrap_or_default();
        log.append(format!("LOCK FAILED - MESSAGE - {message}"));

        if !reply.is_lock_rejection() {
            log.append(format!("ERROR - CANNOT ACQUIRE LOCK - {tag}"));
            warn!("{} cannot lock {}: {}", session.identity(), datastore, tag);
            return Err(NetconfError::LockRejected {
                datastore: datastore.to_string(),
                tag,
            });
        }

        if attempt < max_attempts {
            log.append(format!("RETRYING LOCK - {attempt}"));
            info!("{} retrying lock on {} ({})", session.identity(), datastore, attempt);
            tokio::time::sleep(interval).await;
        }
    }

    log.append("ERROR - LOCKING FAILED. RETRY TIMER EXCEEDED");
    warn!("{} gave up locking {}", session.identity(), datastore);
    Err(NetconfError::LockRetryExhausted {
        datastore: datastore.to_string(),
        attempts: max_attempts,
    })
}

/// [`try_lock`] with the attempts and interval of `policy`.
pub async fn lock_datastore(
    session: &Session,
    datastore: &str,
    policy: &LockPolicy,
) -> Result<RpcReply, NetconfError> {
    try_lock(session, datastore, policy.max_attempts, policy.interval()).await
}

/// Releases a lock held by this session. Datastores the session never
/// locked are reported as already unlocked without contacting the device.
pub async fn unlock_datastore(
    session: &Session,
    datastore: &str,
) -> Result<UnlockOutcome, NetconfError> {
    if !session.is_locked(datastore).await {
        session.log().append("Already Unlocked");
        return Ok(UnlockOutcome::AlreadyUnlocked);
    }
    let reply = session
        .execute(&OperationRequest::Unlock {
            datastore: datastore.to_string(),
        })
        .await?;
    if reply.is_ok() {
        session.release_lock(datastore).await;
        debug!("{} unlocked {}", session.identity(), datastore);
    }
    Ok(UnlockOutcome::Unlocked(reply))
}
