use log::warn;

use super::*;
use crate::rpc::{OperationKind, OperationRequest, RpcReply};

/// Outcome class of one dispatched operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    /// The device answered without errors.
    Ok,
    /// The device answered with an `<rpc-error>`, or a lock could not be
    /// obtained.
    Failed,
    /// Not sent because an earlier operation in the batch failed.
    Skipped,
    /// Rejected locally or lost on the transport.
    Error,
}

/// One entry of a dispatched batch, in execution order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct OperationResult {
    /// Operation name, e.g. `edit-config`.
    pub operation: String,
    pub status: OperationStatus,
    /// Pretty-printed reply XML, or a human-readable error message.
    pub text: String,
}

impl OperationResult {
    fn from_reply(operation: &str, reply: &RpcReply) -> Self {
        Self {
            operation: operation.to_string(),
            status: if reply.is_ok() {
                OperationStatus::Ok
            } else {
                OperationStatus::Failed
            },
            text: reply.pretty(),
        }
    }

    fn with_status(operation: &str, status: OperationStatus, text: impl Into<String>) -> Self {
        Self {
            operation: operation.to_string(),
            status,
            text: text.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == OperationStatus::Ok
    }
}

const COMMIT_SKIPPED: &str = "EDIT-CONFIG Failed, Cannot send COMMIT.";

/// Runs ordered batches of operations against a session.
///
/// - A commit is sent only after an edit-config earlier in the same batch
///   succeeded; otherwise it is recorded as skipped.
/// - A commit rejected because running is locked is retried once under a
///   lock obtained through [`try_lock`].
/// - A failed commit is followed by `<discard-changes>`.
/// - Failures are recorded per operation and never stop the batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct Dispatcher {
    #[serde(default)]
    pub lock_policy: LockPolicy,
}

impl Dispatcher {
    pub fn new(lock_policy: LockPolicy) -> Self {
        Self { lock_policy }
    }

    /// Executes `requests` in order. Connects a temporary session when
    /// `session` is not connected; only a failure to connect is returned as
    /// `Err`.
    pub async fn dispatch(
        &self,
        session: &Session,
        requests: &[OperationRequest],
    ) -> Result<Vec<OperationResult>, NetconfError> {
        session
            .scoped(|session| async move { Ok(self.run_batch(session, requests).await) })
            .await
    }

    async fn run_batch(&self, session: &Session, requests: &[OperationRequest]) -> Vec<OperationResult> {
        let log = session.log();
        let mut commit_ok = false;
        let mut results = Vec::with_capacity(requests.len());

        for request in requests {
            let operation = request.kind().to_string();
            let result = match self.run_one(session, request, &mut commit_ok).await {
                Ok(result) => result,
                Err(e) => {
                    log.append(format!("ERROR - {e}"));
                    warn!("{} {} failed: {}", session.identity(), operation, e);
                    OperationResult::with_status(&operation, OperationStatus::Error, e.to_string())
                }
            };
            results.push(result);
        }
        results
    }

    async fn run_one(
        &self,
        session: &Session,
        request: &OperationRequest,
        commit_ok: &mut bool,
    ) -> Result<OperationResult, NetconfError> {
        let log = session.log();
        let operation = request.kind().to_string();
        let element = session.builder().operation(request)?;
        let is_commit = match request {
            OperationRequest::Commit => true,
            OperationRequest::Rpc { .. } => element.name() == "commit",
            _ => false,
        };

        if is_commit && !*commit_ok {
            log.append(COMMIT_SKIPPED);
            return Ok(OperationResult::with_status(
                &operation,
                OperationStatus::Skipped,
                COMMIT_SKIPPED,
            ));
        }

        log.append(format!("NETCONF SEND {operation}"));
        let result = match request.kind() {
            OperationKind::Lock => {
                let datastore = request.datastore().unwrap_or_default();
                match lock_datastore(session, datastore, &self.lock_policy).await {
                    Ok(reply) => OperationResult::from_reply(&operation, &reply),
                    Err(e @ (NetconfError::LockRejected { .. } | NetconfError::LockRetryExhausted { .. })) => {
                        OperationResult::with_status(&operation, OperationStatus::Failed, e.to_string())
                    }
                    Err(e) => return Err(e),
                }
            }
            OperationKind::Unlock => {
                let datastore = request.datastore().unwrap_or_default();
                match unlock_datastore(session, datastore).await? {
                    UnlockOutcome::AlreadyUnlocked => {
                        OperationResult::with_status(&operation, OperationStatus::Ok, "Already Unlocked")
                    }
                    UnlockOutcome::Unlocked(reply) => OperationResult::from_reply(&operation, &reply),
                }
            }
            _ if is_commit => {
                let reply = self.commit(session, request).await?;
                OperationResult::from_reply(&operation, &reply)
            }
            _ => {
                let reply = session.execute(request).await?;
                let opens_gate = match request {
                    OperationRequest::EditConfig { .. } => true,
                    OperationRequest::Rpc { .. } => {
                        element.name() == "edit-config"
                            && element.path(&["target", "candidate"]).is_some()
                    }
                    _ => false,
                };
                if opens_gate && reply.is_ok() {
                    *commit_ok = true;
                }
                OperationResult::from_reply(&operation, &reply)
            }
        };

        log.append(result.text.clone());
        log.append(format!("NETCONF {operation} COMPLETE"));
        Ok(result)
    }

    async fn commit(&self, session: &Session, request: &OperationRequest) -> Result<RpcReply, NetconfError> {
        let log = session.log();
        let first = session.execute(request).await?;

        let outcome = if first.is_lock_rejection() {
            log.append("Running datastore is locked for commit");
            match try_lock(
                session,
                "running",
                self.lock_policy.max_attempts,
                self.lock_policy.interval(),
            )
            .await
            {
                Ok(_) => {
                    let retried = session.execute(request).await;
                    release_running(session).await;
                    retried
                }
                Err(e) => {
                    debug!("{} could not lock running for commit: {}", session.identity(), e);
                    Ok(first)
                }
            }
        } else {
            Ok(first)
        };

        if !matches!(&outcome, Ok(reply) if reply.is_ok()) {
            log.append("NETCONF discarding commit");
            match session.execute(&OperationRequest::Discard).await {
                Ok(discard) if !discard.is_ok() => {
                    log.append(format!("discard-changes failed\n{}", discard.pretty()));
                }
                Ok(_) => {}
                Err(e) => log.append(format!("ERROR - discard-changes: {e}")),
            }
        }
        outcome
    }
}

/// Unlocks running after a locked commit. Failures are logged; the commit
/// result is what the caller sees.
async fn release_running(session: &Session) {
    let log = session.log();
    match unlock_datastore(session, "running").await {
        Ok(UnlockOutcome::Unlocked(reply)) if !reply.is_ok() => {
            log.append(format!("unlock running failed\n{}", reply.pretty()));
        }
        Ok(_) => {}
        Err(e) => {
            warn!("{} could not unlock running: {}", session.identity(), e);
            log.append(format!("ERROR - unlock running: {e}"));
        }
    }
}
