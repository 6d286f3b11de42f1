//! Change ingestion
//!
//! Applies a client's batch against the store in list order and echoes what
//! was actually applied. The conflict policy is embedded here and is
//! last-applied-wins: no comparison against the row's current `updated_at`,
//! an update blindly overwrites whatever the server holds. Two clients
//! racing on the same task lose one side's edit with no conflict signal.

use crate::db::TaskRepository;
use crate::error::{AppError, Result};
use crate::identity::UserContext;

use super::types::{ClientChange, MissingTargetPolicy, ServerChange, TargetRef};

/// Applies client batches to the store
pub struct ChangeIngestor {
    policy: MissingTargetPolicy,
}

impl ChangeIngestor {
    pub fn new(policy: MissingTargetPolicy) -> Self {
        Self { policy }
    }

    /// Apply `changes` in order, stamping every mutation with `now`.
    ///
    /// Later ops targeting the same id overwrite the effect of earlier
    /// ones; there is no merging across ops. The returned echo holds one
    /// entry per applied op, in order. Skipped ops leave no trace.
    pub async fn apply(
        &self,
        repo: &mut TaskRepository<'_>,
        ctx: &UserContext,
        changes: &[ClientChange],
        now: i64,
    ) -> Result<Vec<ServerChange>> {
        let mut echo = Vec::with_capacity(changes.len());

        for change in changes {
            match change {
                ClientChange::Create(new) => {
                    let task = repo.insert(ctx.user_id, new, now).await?;
                    tracing::debug!(task_id = task.id, "sync: created task");
                    echo.push(ServerChange::Create(task));
                }
                ClientChange::Update(patch) => {
                    match repo.apply_patch(ctx.user_id, patch, now).await? {
                        Some(task) => echo.push(ServerChange::Update(task)),
                        None => self.on_missing_target(patch.id)?,
                    }
                }
                ClientChange::Delete(target) => {
                    if repo.delete(target.id, ctx.user_id).await? {
                        echo.push(ServerChange::Delete(TargetRef { id: target.id }));
                    } else {
                        self.on_missing_target(target.id)?;
                    }
                }
            }
        }

        Ok(echo)
    }

    fn on_missing_target(&self, id: i64) -> Result<()> {
        match self.policy {
            MissingTargetPolicy::Skip => {
                tracing::debug!(task_id = id, "sync: skipped op on unknown task");
                Ok(())
            }
            MissingTargetPolicy::Reject => Err(AppError::UnknownTarget(id)),
        }
    }
}
