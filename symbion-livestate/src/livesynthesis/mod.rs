/**
 * LIVESYNTHESIS - Agrégateur incrémental des compteurs par realm
 *
 * RÔLE :
 * Maintient pour chaque realm les compteurs d'hosts/services par bucket
 * d'état, en O(1) par événement : un incrément atomique par insertion ou
 * mise à jour, jamais un recomptage complet.
 *
 * FONCTIONNEMENT :
 * - Hooks appelés par le cycle de vie des items après commit
 * - Ligne absente pour le realm = bootstrap via recompute (pas une erreur)
 * - Les échecs sont loggés et n'annulent jamais la requête d'origine :
 *   livesynthesis est une vue dérivée, pas une source de vérité
 */

pub mod bucket;
pub mod counters;
pub mod recompute;
pub mod retention;
pub mod rollup;

use crate::error::LivestateError;
use crate::models::{ChangeSet, Item, ItemKind};
use crate::store::LiveStore;
use bucket::{bucket_delta, bucket_of};
use counters::{Counter, Increment};
use tracing::{debug, error, warn};

pub use recompute::{recompute, recompute_force, RecomputeReport};

pub fn on_inserted_host(store: &dyn LiveStore, items: &[Item]) {
    log_failure(ItemKind::Host, "insert", try_on_inserted(store, items));
}

pub fn on_inserted_service(store: &dyn LiveStore, items: &[Item]) {
    log_failure(ItemKind::Service, "insert", try_on_inserted(store, items));
}

pub fn on_updated_host(store: &dyn LiveStore, change: &ChangeSet, original: &Item) {
    log_failure(ItemKind::Host, "update", try_on_updated(store, change, original));
}

pub fn on_updated_service(store: &dyn LiveStore, change: &ChangeSet, original: &Item) {
    log_failure(ItemKind::Service, "update", try_on_updated(store, change, original));
}

fn log_failure(kind: ItemKind, event: &str, result: Result<(), LivestateError>) {
    match result {
        Ok(()) => {}
        Err(LivestateError::Resolver(e)) => error!(%kind, event, error = %e, "livesynthesis hook: invalid state"),
        Err(e) => warn!(%kind, event, error = %e, "livesynthesis hook failed"),
    }
}

/// Incrément correspondant à l'ajout d'un item dans sa ligne
pub fn insertion_increment(item: &Item) -> Result<Increment, LivestateError> {
    let mut inc = Increment::default();
    inc.add(Counter::total(item.kind), 1);
    inc.add(bucket_of(item).counter(item.kind)?, 1);
    if item.ls_is_flapping {
        inc.add(Counter::flapping(item.kind), 1);
    }
    if !item.is_monitored() {
        inc.add(Counter::not_monitored(item.kind), 1);
    }
    Ok(inc)
}

/// Incrément provoqué par `change` sur `original` : transition de bucket
/// plus les compteurs orthogonaux (flapping, non supervisé).
pub fn update_increment(change: &ChangeSet, original: &Item) -> Result<Increment, LivestateError> {
    let kind = original.kind;
    let mut inc = Increment::default();

    if let Some(transition) = bucket_delta(change, original) {
        inc.add(transition.minus.counter(kind)?, -1);
        inc.add(transition.plus.counter(kind)?, 1);
    }

    let was_flapping = original.ls_is_flapping;
    let now_flapping = change.ls_is_flapping.unwrap_or(was_flapping);
    if was_flapping != now_flapping {
        inc.add(Counter::flapping(kind), if now_flapping { 1 } else { -1 });
    }

    let was_monitored = original.is_monitored();
    let now_monitored = change.active_checks_enabled.unwrap_or(original.active_checks_enabled)
        || change.passive_checks_enabled.unwrap_or(original.passive_checks_enabled);
    if was_monitored != now_monitored {
        inc.add(Counter::not_monitored(kind), if now_monitored { -1 } else { 1 });
    }

    Ok(inc)
}

pub fn try_on_inserted(store: &dyn LiveStore, items: &[Item]) -> Result<(), LivestateError> {
    for item in items.iter().filter(|i| !i.is_template) {
        let inc = insertion_increment(item)?;
        if !store.increment_livesynthesis(&item.realm, &inc)? {
            // premier item du realm : le recompute compte aussi le lot courant
            debug!(realm = %item.realm, "no livesynthesis row, bootstrapping");
            recompute(store, None)?;
            return Ok(());
        }
    }
    Ok(())
}

pub fn try_on_updated(store: &dyn LiveStore, change: &ChangeSet, original: &Item) -> Result<(), LivestateError> {
    if original.is_template {
        return Ok(());
    }
    let inc = update_increment(change, original)?;
    if inc.is_empty() {
        return Ok(());
    }
    if !store.increment_livesynthesis(&original.realm, &inc)? {
        debug!(realm = %original.realm, "no livesynthesis row, bootstrapping");
        recompute(store, None)?;
    }
    Ok(())
}
