//! Sync orchestration
//!
//! One coordinator call is one transaction: ingest the client batch, then
//! collect the delta so the collector sees the just-applied writes, then
//! commit. Dropping the transaction on any error path rolls everything
//! back; a failed sync leaves no partial application behind.

use chrono::Utc;
use sqlx::SqlitePool;

use crate::db::TaskRepository;
use crate::error::Result;
use crate::identity::UserContext;

use super::collect::ChangeCollector;
use super::ingest::ChangeIngestor;
use super::types::{MissingTargetPolicy, SyncRequest, SyncResponse};

/// Runs a sync exchange inside a single transaction
pub struct SyncCoordinator<'a> {
    pool: &'a SqlitePool,
    ingestor: ChangeIngestor,
    collector: ChangeCollector,
}

impl<'a> SyncCoordinator<'a> {
    pub fn new(pool: &'a SqlitePool, policy: MissingTargetPolicy) -> Self {
        Self {
            pool,
            ingestor: ChangeIngestor::new(policy),
            collector: ChangeCollector::new(),
        }
    }

    /// Apply the client's changes, then collect the server delta past the
    /// watermark. The response is the ingestion echo followed by the delta.
    ///
    /// The collector runs after ingestion in the same transaction, so the
    /// caller's own just-applied changes come back in the delta as well.
    /// That self-echo is expected; client merge logic must be idempotent
    /// to it.
    pub async fn run(&self, ctx: &UserContext, request: SyncRequest) -> Result<SyncResponse> {
        let mut tx = self.pool.begin().await?;
        // One clock reading stamps every mutation in this exchange
        let now = Utc::now().timestamp_millis();

        let mut repo = TaskRepository::new(&mut *tx);
        let mut changes = self
            .ingestor
            .apply(&mut repo, ctx, &request.changes, now)
            .await?;
        let delta = self.collector.collect(&mut repo, ctx, request.watermark).await?;
        changes.extend(delta);

        tx.commit().await?;

        tracing::debug!(
            user_id = ctx.user_id,
            applied = request.changes.len(),
            returned = changes.len(),
            "sync exchange committed"
        );

        Ok(SyncResponse { changes })
    }

    /// Collect only, no ingestion
    pub async fn diff(&self, ctx: &UserContext, watermark: i64) -> Result<SyncResponse> {
        let mut tx = self.pool.begin().await?;

        let mut repo = TaskRepository::new(&mut *tx);
        let changes = self.collector.collect(&mut repo, ctx, watermark).await?;

        tx.commit().await?;

        Ok(SyncResponse { changes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{initialize_schema, NewTask, TaskFields, TaskPatch};
    use crate::sync::types::{ClientChange, ServerChange, TargetRef};
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_test_db() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .unwrap();
        initialize_schema(&pool).await.unwrap();
        pool
    }

    const ALICE: UserContext = UserContext { user_id: 1 };

    fn create_op(title: &str, quadrant: i64) -> ClientChange {
        ClientChange::Create(NewTask {
            title: title.to_string(),
            description: None,
            quadrant,
            completed: false,
            archived: false,
            due_date: None,
            repeat_type: None,
        })
    }

    fn retitle_op(id: i64, title: &str) -> ClientChange {
        ClientChange::Update(TaskPatch {
            id,
            fields: TaskFields {
                title: Some(title.to_string()),
                ..Default::default()
            },
        })
    }

    fn request(changes: Vec<ClientChange>, watermark: i64) -> SyncRequest {
        SyncRequest { changes, watermark }
    }

    /// Scenario A: create, echo with assigned id, cross-client pull as update
    #[tokio::test]
    async fn test_create_then_cross_client_pull() {
        let pool = setup_test_db().await;
        let coordinator = SyncCoordinator::new(&pool, MissingTargetPolicy::Skip);

        let response = coordinator
            .run(&ALICE, request(vec![create_op("Write spec", 1)], 1000))
            .await
            .unwrap();

        // Echo first: a create carrying the server-assigned id, then the
        // self-echo of the same row in the collected delta.
        let ServerChange::Create(created) = &response.changes[0] else {
            panic!("expected create echo first");
        };
        assert!(created.id > 0);
        assert_eq!(created.title, "Write spec");
        assert_eq!(created.quadrant, 1);

        assert!(matches!(
            &response.changes[1],
            ServerChange::Update(t) if t.id == created.id
        ));
        assert_eq!(response.changes.len(), 2);

        // A second client of the same account pulls from its old watermark
        // and receives the new task as an update, not a create.
        let pull = coordinator.diff(&ALICE, 1000).await.unwrap();
        assert_eq!(pull.changes.len(), 1);
        match &pull.changes[0] {
            ServerChange::Update(task) => {
                assert_eq!(task.id, created.id);
                assert_eq!(task.title, "Write spec");
            }
            other => panic!("expected update, got {:?}", other),
        }
    }

    /// Scenario B: last-applied-wins, the race loser's edit vanishes silently
    #[tokio::test]
    async fn test_lost_update_under_race() {
        let pool = setup_test_db().await;
        let coordinator = SyncCoordinator::new(&pool, MissingTargetPolicy::Skip);

        let seeded = coordinator
            .run(&ALICE, request(vec![create_op("A", 0)], 0))
            .await
            .unwrap();
        let ServerChange::Create(task) = &seeded.changes[0] else {
            panic!("expected create echo");
        };
        let id = task.id;

        let first = coordinator
            .run(&ALICE, request(vec![retitle_op(id, "A1")], 0))
            .await
            .unwrap();
        // No conflict signal of any kind, just an applied echo
        assert!(matches!(&first.changes[0], ServerChange::Update(t) if t.title == "A1"));

        let second = coordinator
            .run(&ALICE, request(vec![retitle_op(id, "B1")], 0))
            .await
            .unwrap();
        assert!(matches!(&second.changes[0], ServerChange::Update(t) if t.title == "B1"));

        let current = coordinator.diff(&ALICE, 0).await.unwrap();
        assert!(matches!(
            &current.changes[0],
            ServerChange::Update(t) if t.title == "B1"
        ));
    }

    /// Scenario C + tombstone gap: deleter gets an echo, everyone else
    /// only ever sees absence
    #[tokio::test]
    async fn test_delete_echo_and_tombstone_gap() {
        let pool = setup_test_db().await;
        let coordinator = SyncCoordinator::new(&pool, MissingTargetPolicy::Skip);

        let seeded = coordinator
            .run(&ALICE, request(vec![create_op("Doomed", 2)], 0))
            .await
            .unwrap();
        let ServerChange::Create(task) = &seeded.changes[0] else {
            panic!("expected create echo");
        };
        let id = task.id;
        let watermark_before_delete = task.updated_at;

        let deletion = coordinator
            .run(
                &ALICE,
                request(
                    vec![ClientChange::Delete(TargetRef { id })],
                    watermark_before_delete,
                ),
            )
            .await
            .unwrap();

        // The deleting client sees the delete in its own echo...
        assert!(matches!(
            &deletion.changes[0],
            ServerChange::Delete(TargetRef { id: deleted }) if *deleted == id
        ));
        // ...and nothing about the row in the delta (it is gone).
        assert_eq!(deletion.changes.len(), 1);

        // Another client of the same account diffing from before the delete
        // gets no deletion signal at all: the row is simply absent.
        let other = coordinator.diff(&ALICE, watermark_before_delete).await.unwrap();
        assert!(other.changes.is_empty());

        let mut conn = pool.acquire().await.unwrap();
        let mut repo = TaskRepository::new(&mut *conn);
        assert!(repo.find(id, ALICE.user_id).await.unwrap().is_none());
    }

    /// Ordering: final state equals the ops applied strictly in list order
    #[tokio::test]
    async fn test_batch_ops_apply_in_order() {
        let pool = setup_test_db().await;
        let coordinator = SyncCoordinator::new(&pool, MissingTargetPolicy::Skip);

        let seeded = coordinator
            .run(&ALICE, request(vec![create_op("v0", 0)], 0))
            .await
            .unwrap();
        let ServerChange::Create(task) = &seeded.changes[0] else {
            panic!("expected create echo");
        };
        let id = task.id;

        let response = coordinator
            .run(
                &ALICE,
                request(vec![retitle_op(id, "v1"), retitle_op(id, "v2")], 0),
            )
            .await
            .unwrap();

        // Both ops applied, both echoed, second overwrites first
        assert!(matches!(&response.changes[0], ServerChange::Update(t) if t.title == "v1"));
        assert!(matches!(&response.changes[1], ServerChange::Update(t) if t.title == "v2"));

        let mut conn = pool.acquire().await.unwrap();
        let mut repo = TaskRepository::new(&mut *conn);
        let stored = repo.find(id, ALICE.user_id).await.unwrap().unwrap();
        assert_eq!(stored.title, "v2");
    }

    /// Missing-target ops are silent no-ops under the default policy
    #[tokio::test]
    async fn test_missing_target_skipped_silently() {
        let pool = setup_test_db().await;
        let coordinator = SyncCoordinator::new(&pool, MissingTargetPolicy::Skip);

        let response = coordinator
            .run(
                &ALICE,
                request(
                    vec![
                        retitle_op(999, "ghost"),
                        ClientChange::Delete(TargetRef { id: 998 }),
                        create_op("Real", 0),
                    ],
                    0,
                ),
            )
            .await
            .unwrap();

        // No error, no echo entries for the skipped ops: one create echo
        // plus its self-echo in the delta.
        assert_eq!(response.changes.len(), 2);
        assert!(matches!(&response.changes[0], ServerChange::Create(t) if t.title == "Real"));
    }

    /// Under the reject policy the whole batch rolls back
    #[tokio::test]
    async fn test_reject_policy_rolls_back_whole_batch() {
        let pool = setup_test_db().await;
        let coordinator = SyncCoordinator::new(&pool, MissingTargetPolicy::Reject);

        let result = coordinator
            .run(
                &ALICE,
                request(vec![create_op("Should not survive", 0), retitle_op(999, "x")], 0),
            )
            .await;

        assert!(matches!(
            result,
            Err(crate::error::AppError::UnknownTarget(999))
        ));

        // The create that preceded the failing op was rolled back
        let delta = coordinator.diff(&ALICE, 0).await.unwrap();
        assert!(delta.changes.is_empty());
    }

    /// Diff(T0) after a committed run(T0) returns a superset of that run's
    /// delta: nothing already surfaced disappears
    #[tokio::test]
    async fn test_diff_is_monotonic_over_committed_changes() {
        let pool = setup_test_db().await;
        let coordinator = SyncCoordinator::new(&pool, MissingTargetPolicy::Skip);

        let response = coordinator
            .run(
                &ALICE,
                request(vec![create_op("one", 0), create_op("two", 1)], 1000),
            )
            .await
            .unwrap();

        let first_delta: Vec<i64> = response
            .changes
            .iter()
            .filter_map(|c| match c {
                ServerChange::Update(t) => Some(t.id),
                _ => None,
            })
            .collect();
        assert_eq!(first_delta.len(), 2);

        let again = coordinator.diff(&ALICE, 1000).await.unwrap();
        let second_delta: Vec<i64> = again
            .changes
            .iter()
            .filter_map(|c| match c {
                ServerChange::Update(t) => Some(t.id),
                _ => None,
            })
            .collect();

        for id in first_delta {
            assert!(second_delta.contains(&id));
        }
    }

    /// Sync exchanges are scoped to the caller's account
    #[tokio::test]
    async fn test_sync_is_user_scoped() {
        let pool = setup_test_db().await;
        let coordinator = SyncCoordinator::new(&pool, MissingTargetPolicy::Skip);
        let bob = UserContext { user_id: 2 };

        let seeded = coordinator
            .run(&ALICE, request(vec![create_op("Alice's", 0)], 0))
            .await
            .unwrap();
        let ServerChange::Create(task) = &seeded.changes[0] else {
            panic!("expected create echo");
        };

        // Bob's delta is empty and Bob cannot touch Alice's task
        assert!(coordinator.diff(&bob, 0).await.unwrap().changes.is_empty());

        let response = coordinator
            .run(
                &bob,
                request(vec![ClientChange::Delete(TargetRef { id: task.id })], 0),
            )
            .await
            .unwrap();
        assert!(response.changes.is_empty());

        let mut conn = pool.acquire().await.unwrap();
        let mut repo = TaskRepository::new(&mut *conn);
        assert!(repo.find(task.id, ALICE.user_id).await.unwrap().is_some());
    }
}
