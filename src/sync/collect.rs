//! Server-side delta collection

use crate::db::TaskRepository;
use crate::error::Result;
use crate::identity::UserContext;

use super::types::ServerChange;

/// Computes the delta a client has not seen yet
#[derive(Default)]
pub struct ChangeCollector;

impl ChangeCollector {
    pub fn new() -> Self {
        Self
    }

    /// Every task of the calling user mutated strictly after `watermark`,
    /// each wrapped as an `Update` for the client to upsert - a task the
    /// client has never seen arrives as an update too.
    ///
    /// Deletions do not surface here: rows are removed outright, so a task
    /// deleted by one client after another's watermark simply never appears
    /// in that client's delta.
    pub async fn collect(
        &self,
        repo: &mut TaskRepository<'_>,
        ctx: &UserContext,
        watermark: i64,
    ) -> Result<Vec<ServerChange>> {
        let tasks = repo.updated_after(ctx.user_id, watermark).await?;
        Ok(tasks.into_iter().map(ServerChange::Update).collect())
    }
}
