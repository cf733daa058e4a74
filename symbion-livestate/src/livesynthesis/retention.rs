use super::counters::LivesynthesisSnapshot;
use crate::config::LivesynthesisConf;
use crate::error::LivestateError;
use crate::store::LiveStore;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::task;

/// Copie chaque ligne livesynthesis dans l'historique de son realm
pub fn snapshot_all(store: &dyn LiveStore, keep: usize, now: OffsetDateTime) -> Result<usize, LivestateError> {
    let rows = store.livesynthesis_rows()?;
    for row in &rows {
        store.push_retention(
            LivesynthesisSnapshot {
                realm: row.realm.clone(),
                taken_at: now,
                counters: row.counters,
            },
            keep,
        )?;
    }
    Ok(rows.len())
}

/// Démarre la prise de snapshots périodique
pub fn spawn_history_job(store: Arc<dyn LiveStore>, conf: LivesynthesisConf) {
    task::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(conf.history_interval_secs.max(1)));
        loop {
            interval.tick().await;
            match snapshot_all(store.as_ref(), conf.history_size, OffsetDateTime::now_utc()) {
                Ok(count) => tracing::debug!(rows = count, "livesynthesis history snapshot"),
                Err(e) => tracing::warn!(error = %e, "livesynthesis history snapshot failed"),
            }
        }
    });
}
