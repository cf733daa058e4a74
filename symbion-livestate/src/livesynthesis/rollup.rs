/**
 * ROLLUP LIVESYNTHESIS - Lecture hiérarchique des compteurs
 *
 * RÔLE :
 * Construit la réponse de GET /livesynthesis/{realm} :
 * - `concatenation` : somme du realm et de ses descendants lisibles
 * - `history` : snapshots conservés, sommés index par index sur les mêmes realms
 *
 * Les realms hors du périmètre de l'appelant sont exclus silencieusement.
 */

use super::counters::Counters;
use crate::error::LivestateError;
use crate::models::RealmId;
use crate::realm::RealmError;
use crate::scope::AccessScope;
use crate::store::LiveStore;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Paramètres de lecture (`?history=1&concatenation=1`)
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct LivesynthesisQuery {
    #[serde(default, deserialize_with = "flag")]
    pub history: bool,
    #[serde(default, deserialize_with = "flag")]
    pub concatenation: bool,
}

/// Un flag présent est actif, même sans valeur (`?history`), sauf 0/false/no/off
fn flag<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let raw = String::deserialize(deserializer)?;
    Ok(!matches!(raw.trim().to_ascii_lowercase().as_str(), "0" | "false" | "no" | "off"))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    #[serde(rename = "_timestamp", with = "time::serde::rfc3339")]
    pub taken_at: OffsetDateTime,
    #[serde(flatten)]
    pub counters: Counters,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LivesynthesisView {
    #[serde(rename = "_realm")]
    pub realm: RealmId,
    /// Realms effectivement sommés
    #[serde(rename = "_realms")]
    pub realms: Vec<RealmId>,
    #[serde(flatten)]
    pub counters: Counters,
    #[serde(rename = "_history", skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<HistoryEntry>>,
}

/// Realms pris en compte : le realm seul, ou lui et ses descendants lisibles
pub fn visible_realms(
    store: &dyn LiveStore,
    realm: &str,
    scope: &AccessScope,
    concatenation: bool,
) -> Result<Vec<RealmId>, LivestateError> {
    let tree = store.realm_tree()?;
    if !tree.contains(realm) {
        return Err(RealmError::UnknownRealm(realm.to_string()).into());
    }
    if !scope.can_read(realm) {
        return Err(LivestateError::Forbidden(realm.to_string()));
    }

    let mut realms = vec![realm.to_string()];
    if concatenation {
        realms.extend(tree.descendants(realm)?.iter().filter(|r| scope.can_read(r)).cloned());
    }
    Ok(realms)
}

/// Somme des compteurs du realm et de ses descendants lisibles.
/// Un realm sans ligne compte pour zéro.
pub fn rollup(store: &dyn LiveStore, realm: &str, scope: &AccessScope) -> Result<Counters, LivestateError> {
    let realms = visible_realms(store, realm, scope, true)?;
    sum_rows(store, &realms)
}

fn sum_rows(store: &dyn LiveStore, realms: &[RealmId]) -> Result<Counters, LivestateError> {
    let mut total = Counters::default();
    for realm in realms {
        if let Some(row) = store.find_livesynthesis(realm)? {
            total.add(&row.counters);
        }
    }
    Ok(total)
}

fn merged_history(store: &dyn LiveStore, realms: &[RealmId]) -> Result<Vec<HistoryEntry>, LivestateError> {
    let mut merged: Vec<HistoryEntry> = Vec::new();
    for realm in realms {
        for (i, snapshot) in store.retention(realm)?.into_iter().enumerate() {
            match merged.get_mut(i) {
                Some(entry) => entry.counters.add(&snapshot.counters),
                None => merged.push(HistoryEntry {
                    taken_at: snapshot.taken_at,
                    counters: snapshot.counters,
                }),
            }
        }
    }
    Ok(merged)
}

pub fn livesynthesis_view(
    store: &dyn LiveStore,
    realm: &str,
    scope: &AccessScope,
    query: LivesynthesisQuery,
) -> Result<LivesynthesisView, LivestateError> {
    let realms = visible_realms(store, realm, scope, query.concatenation)?;
    let counters = sum_rows(store, &realms)?;
    let history = if query.history {
        Some(merged_history(store, &realms)?)
    } else {
        None
    };
    Ok(LivesynthesisView {
        realm: realm.to_string(),
        realms,
        counters,
        history,
    })
}
