/**
 * CYCLE DE VIE DES ITEMS - Création et mise à jour des hosts/services
 *
 * RÔLE :
 * Joue le rôle du framework REST autour de la persistence : validation minimale,
 * calcul des champs dérivés avant écriture, puis déclenchement des hooks
 * livesynthesis après commit.
 *
 * FONCTIONNEMENT :
 * 1. validation (realm lisible, état compatible avec le kind, host du service)
 * 2. calcul de l'état settled et de `_overall_state_id`
 * 3. écriture du document (mise à jour : read-modify-write atomique via `modify_item`)
 * 4. hooks `on_inserted_*` / `on_updated_*` (échecs loggés, jamais propagés)
 * 5. pour un service dont l'état global change : re-résolution du host
 */

use crate::error::{LivestateError, ResolverInputError};
use crate::livesynthesis;
use crate::models::{ChangeSet, Item, ItemKind, NewItem};
use crate::overall::{item_overall_state, worst_of};
use crate::realm::{Realm, RealmError};
use crate::scope::AccessScope;
use crate::store::{ItemFilter, LiveStore, StoreError};
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

fn now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

fn check_state(kind: ItemKind, change: &ChangeSet) -> Result<(), ResolverInputError> {
    match change.ls_state {
        Some(state) if !kind.accepts(state) => Err(ResolverInputError { kind, state }),
        _ => Ok(()),
    }
}

/// Pire état global des services d'un host, None pour un service ou un template
fn worst_service(store: &dyn LiveStore, item: &Item) -> Result<Option<u8>, LivestateError> {
    match item.kind {
        ItemKind::Host if !item.is_template => {
            Ok(worst_of(&store.find_items(&ItemFilter::of_host(item.id.as_str()))?))
        }
        _ => Ok(None),
    }
}

fn resolve(item: &Item, worst_child: Option<u8>) -> Result<u8, ResolverInputError> {
    if item.is_template {
        return Ok(0);
    }
    item_overall_state(item, worst_child)
}

/// État global d'un item tel qu'il serait stocké : 0 pour un template,
/// pire service pris en compte pour un host.
pub fn compute_overall(store: &dyn LiveStore, item: &Item) -> Result<u8, LivestateError> {
    Ok(resolve(item, worst_service(store, item)?)?)
}

fn modify(
    store: &dyn LiveStore,
    kind: ItemKind,
    id: &str,
    update: &mut dyn FnMut(&mut Item) -> Result<(), ResolverInputError>,
) -> Result<(Item, Item), LivestateError> {
    match store.modify_item(kind, id, update) {
        Ok(Some(pair)) => Ok(pair),
        Ok(None) => Err(LivestateError::NotFound(kind, id.to_string())),
        Err(StoreError::Rejected(e)) => Err(e.into()),
        Err(e) => Err(e.into()),
    }
}

/// Re-résout l'état global d'un host après un changement sur un de ses services.
/// Retourne le nouvel état s'il a changé.
pub fn refresh_host_overall(store: &dyn LiveStore, host_id: &str) -> Result<Option<u8>, LivestateError> {
    let Some(host) = store.find_item(ItemKind::Host, host_id)? else {
        return Err(LivestateError::NotFound(ItemKind::Host, host_id.to_string()));
    };
    let worst_child = worst_service(store, &host)?;
    let (before, after) = modify(store, ItemKind::Host, host_id, &mut |host| {
        host.overall_state_id = resolve(host, worst_child)?;
        Ok(())
    })?;
    if after.overall_state_id == before.overall_state_id {
        return Ok(None);
    }
    debug!(host = %host_id, from = before.overall_state_id, to = after.overall_state_id, "host overall state re-resolved");
    Ok(Some(after.overall_state_id))
}

/// Crée le realm racine au premier démarrage, sinon retourne celui qui porte ce nom
pub fn ensure_root_realm(store: &dyn LiveStore, name: &str) -> Result<Realm, LivestateError> {
    let tree = store.realm_tree()?;
    if let Some(realm) = tree.find_by_name(name).and_then(|id| tree.get(id)) {
        return Ok(realm);
    }
    let realm = store.insert_realm(name, None)?;
    info!(realm = %realm.id, %name, "root realm created");
    Ok(realm)
}

fn refresh_owner(store: &dyn LiveStore, service: &Item) {
    if service.is_template {
        return;
    }
    if let Some(host_id) = &service.host {
        if let Err(e) = refresh_host_overall(store, host_id) {
            warn!(host = %host_id, service = %service.id, error = %e, "host overall state refresh failed");
        }
    }
}

pub fn create_item(
    store: &dyn LiveStore,
    kind: ItemKind,
    new: NewItem,
    scope: &AccessScope,
) -> Result<Item, LivestateError> {
    let tree = store.realm_tree()?;
    let realm = match new.realm {
        Some(realm) => realm,
        None => tree
            .root()
            .cloned()
            .ok_or_else(|| RealmError::UnknownRealm("<root>".into()))?,
    };
    if !tree.contains(&realm) {
        return Err(RealmError::UnknownRealm(realm).into());
    }
    if !scope.can_read(&realm) {
        return Err(LivestateError::Forbidden(realm));
    }

    if kind == ItemKind::Service {
        match &new.host {
            Some(host) => {
                if store.find_item(ItemKind::Host, host)?.is_none() {
                    return Err(LivestateError::UnknownHost(host.clone()));
                }
            }
            None if !new.is_template => return Err(LivestateError::MissingHost),
            None => {}
        }
    }

    let mut item = Item::new(kind, Uuid::new_v4().to_string(), new.name, realm);
    item.sub_realm = new.sub_realm;
    item.is_template = new.is_template;
    item.templates = new.templates;
    item.template_fields = new.template_fields;
    item.host = if kind == ItemKind::Service { new.host } else { None };
    item.active_checks_enabled = new.active_checks_enabled.unwrap_or(true);
    item.passive_checks_enabled = new.passive_checks_enabled.unwrap_or(true);
    item.ls_state = new.ls_state.unwrap_or(item.ls_state);
    item.ls_state_type = new.ls_state_type.unwrap_or(item.ls_state_type);
    item.ls_acknowledged = new.ls_acknowledged.unwrap_or(false);
    item.ls_downtimed = new.ls_downtimed.unwrap_or(false);
    item.ls_is_flapping = new.ls_is_flapping.unwrap_or(false);
    item.ls_output = new.ls_output.unwrap_or_default();
    if !kind.accepts(item.ls_state) {
        return Err(ResolverInputError { kind, state: item.ls_state }.into());
    }

    // à la création, l'état fourni sert de base même s'il est SOFT
    item.settled_state = item.ls_state;
    item.settled_state_type = item.ls_state_type;
    item.ls_last_state_changed = now();
    item.overall_state_id = compute_overall(store, &item)?;

    store.insert_item(item.clone())?;
    debug!(%kind, item = %item.id, realm = %item.realm, "item created");

    match kind {
        ItemKind::Host => livesynthesis::on_inserted_host(store, std::slice::from_ref(&item)),
        ItemKind::Service => {
            livesynthesis::on_inserted_service(store, std::slice::from_ref(&item));
            refresh_owner(store, &item);
        }
    }
    Ok(item)
}

pub fn update_item(
    store: &dyn LiveStore,
    kind: ItemKind,
    id: &str,
    change: ChangeSet,
    scope: &AccessScope,
) -> Result<Item, LivestateError> {
    let Some(current) = store.find_item(kind, id)? else {
        return Err(LivestateError::NotFound(kind, id.to_string()));
    };
    if !scope.can_read(&current.realm) {
        return Err(LivestateError::Forbidden(current.realm));
    }
    check_state(kind, &change)?;

    // lecture des services hors du verrou du store ; le delta, lui, part de
    // l'original effectivement remplacé
    let worst_child = worst_service(store, &current)?;
    let at = now();
    let (original, updated) = modify(store, kind, id, &mut |item| {
        item.apply(&change, at);
        item.overall_state_id = resolve(item, worst_child)?;
        Ok(())
    })?;

    match kind {
        ItemKind::Host => livesynthesis::on_updated_host(store, &change, &original),
        ItemKind::Service => {
            livesynthesis::on_updated_service(store, &change, &original);
            if updated.overall_state_id != original.overall_state_id {
                refresh_owner(store, &updated);
            }
        }
    }
    Ok(updated)
}
