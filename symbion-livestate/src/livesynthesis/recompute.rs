//! Recomptage complet des lignes livesynthesis depuis les documents.
//!
//! Utilisé pour le bootstrap (premier item d'un realm), l'auto-réparation au
//! démarrage et la reprise après incident. Sans verrou : idempotent et
//! best-effort face aux écritures concurrentes, le chemin incrémental reprend
//! ensuite depuis la base établie ici.

use super::bucket::bucket_of;
use super::counters::{Counter, Counters, Livesynthesis};
use crate::error::LivestateError;
use crate::models::{Item, ItemKind, RealmId};
use crate::realm::RealmError;
use crate::store::{ItemFilter, LiveStore};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecomputeReport {
    /// Realms pour lesquels une ligne vide a été créée
    pub created: Vec<RealmId>,
    /// (realm, kind) effectivement recomptés
    pub recounted: Vec<(RealmId, ItemKind)>,
}

/// Recompte les realms dont le `{kind}_total` ne correspond plus au nombre réel d'items.
/// `realm = None` : tous les realms.
pub fn recompute(store: &dyn LiveStore, realm: Option<&str>) -> Result<RecomputeReport, LivestateError> {
    run(store, realm, false)
}

/// Recompte sans condition
pub fn recompute_force(store: &dyn LiveStore, realm: Option<&str>) -> Result<RecomputeReport, LivestateError> {
    run(store, realm, true)
}

/// Compteurs attendus pour un ensemble d'items d'un même kind
pub fn tally(kind: ItemKind, items: &[Item]) -> Result<Counters, LivestateError> {
    let mut counters = Counters::default();
    for item in items.iter().filter(|i| i.kind == kind && !i.is_template) {
        *counters.slot_mut(Counter::total(kind)) += 1;
        *counters.slot_mut(bucket_of(item).counter(kind)?) += 1;
        if item.ls_is_flapping {
            *counters.slot_mut(Counter::flapping(kind)) += 1;
        }
        if !item.is_monitored() {
            *counters.slot_mut(Counter::not_monitored(kind)) += 1;
        }
    }
    Ok(counters)
}

/// Compteurs attendus pour un realm, calculés sans rien écrire
pub fn expected_counters(store: &dyn LiveStore, realm: &str) -> Result<Counters, LivestateError> {
    let mut counters = Counters::default();
    for kind in ItemKind::ALL {
        let items = store.find_items(&ItemFilter::new(kind).in_realm(realm))?;
        counters.add(&tally(kind, &items)?);
    }
    Ok(counters)
}

fn run(store: &dyn LiveStore, realm: Option<&str>, force: bool) -> Result<RecomputeReport, LivestateError> {
    let tree = store.realm_tree()?;
    let realms = match realm {
        Some(r) if tree.contains(r) => vec![r.to_string()],
        Some(r) => return Err(RealmError::UnknownRealm(r.to_string()).into()),
        None => tree.ids(),
    };

    let mut report = RecomputeReport::default();
    for realm in realms {
        let row = match store.find_livesynthesis(&realm)? {
            Some(row) => row,
            None => {
                let row = Livesynthesis::zeroed(realm.clone());
                if store.insert_livesynthesis(row.clone())? {
                    report.created.push(realm.clone());
                }
                row
            }
        };

        for kind in ItemKind::ALL {
            let items = store.find_items(&ItemFilter::new(kind).in_realm(realm.as_str()))?;
            if !force && row.counters.get(Counter::total(kind)) == items.len() as i64 {
                continue;
            }
            let counters = tally(kind, &items)?;
            store.set_livesynthesis(&realm, &counters.values_for(kind))?;
            report.recounted.push((realm.clone(), kind));
        }
    }

    if !report.recounted.is_empty() || !report.created.is_empty() {
        info!(
            created = report.created.len(),
            recounted = report.recounted.len(),
            force,
            "livesynthesis recomputed"
        );
    }
    Ok(report)
}
