//! Recovery sweep: reclaim, reap, purge and prune in one transaction.
//!
//! Rows already locked by an in-flight claim or completion are skipped; the
//! next sweep sees them again if they are still stale.

use async_trait::async_trait;
use heddle_core::domain::{
    InstanceToken, ReclaimedTask, SweepCutoffs, SweepReport, TaskId, annotate,
};
use heddle_core::ports::RecoveryStore;
use heddle_core::Result;
use sqlx::Row;

use crate::error::db_err;
use crate::store::PgStore;

#[async_trait]
impl RecoveryStore for PgStore {
    async fn sweep(&self, cutoffs: &SweepCutoffs) -> Result<SweepReport> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let mut report = SweepReport::default();

        // holder が消えた claim も stale 扱い
        let stale = sqlx::query(
            r#"
            SELECT t.id, t.assigned_instance, t.result
              FROM heddle.tasks t
              LEFT JOIN heddle.instances i ON i.token = t.assigned_instance
             WHERE t.status IN ('claimed', 'in_progress')
               AND (i.token IS NULL OR i.last_heartbeat < $1)
             ORDER BY t.id
               FOR UPDATE OF t SKIP LOCKED
            "#,
        )
        .bind(cutoffs.reclaim_before)
        .fetch_all(&mut *tx)
        .await
        .map_err(db_err)?;

        for row in stale {
            let id: i64 = row.try_get("id").map_err(db_err)?;
            let holder: String = row.try_get("assigned_instance").map_err(db_err)?;
            let result: Option<String> = row.try_get("result").map_err(db_err)?;
            let previous = InstanceToken::new(holder);
            let annotated = annotate(result, &cutoffs.reclaim_note(&previous));

            sqlx::query(
                r#"
                UPDATE heddle.tasks
                   SET status = 'pending', assigned_instance = NULL, claimed_at = NULL, result = $2
                 WHERE id = $1
                "#,
            )
            .bind(id)
            .bind(&annotated)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

            tracing::info!(task_id = id, previous = %previous, "reclaimed stale claim");
            report.reclaimed.push(ReclaimedTask {
                task_id: TaskId::new(id),
                previous_instance: previous,
            });
        }

        let mut reaped: Vec<String> = sqlx::query_scalar(
            "DELETE FROM heddle.instances WHERE last_heartbeat < $1 RETURNING token",
        )
        .bind(cutoffs.reap_before)
        .fetch_all(&mut *tx)
        .await
        .map_err(db_err)?;
        reaped.sort();
        report.reaped = reaped.into_iter().map(InstanceToken::new).collect();

        report.purged_messages = sqlx::query("DELETE FROM heddle.messages WHERE expires_at <= $1")
            .bind(cutoffs.now)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?
            .rows_affected();

        report.pruned_activity = sqlx::query("DELETE FROM heddle.activity_log WHERE created_at < $1")
            .bind(cutoffs.prune_activity_before)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?
            .rows_affected();

        tx.commit().await.map_err(db_err)?;
        Ok(report)
    }
}
