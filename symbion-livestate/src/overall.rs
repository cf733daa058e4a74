/**
 * ÉTAT GLOBAL - Calcul de `_overall_state_id`
 *
 * RÔLE :
 * Réduit l'état brut d'un item (+ ack, downtime, et pour un host l'état de ses
 * services) à un ordinal unique de sévérité, utilisé par les dashboards.
 *
 * ÉCHELLE (0 = meilleur) :
 * - 0 : état "bon" (UP / OK), quel que soit ack/downtime
 * - 1 : problème acquitté
 * - 2 : problème en downtime (prime sur l'acquittement)
 * - 3 : problème léger (host UNREACHABLE, service WARNING / UNKNOWN)
 * - 4 : problème grave (host DOWN, service CRITICAL / UNREACHABLE)
 *
 * Fonctions pures : aucun accès au store ici.
 */

use crate::error::ResolverInputError;
use crate::models::{Item, ItemKind, LsState};

pub const OVERALL_OK: u8 = 0;
pub const OVERALL_ACKNOWLEDGED: u8 = 1;
pub const OVERALL_DOWNTIMED: u8 = 2;
pub const OVERALL_SOFT_PROBLEM: u8 = 3;
pub const OVERALL_HARD_PROBLEM: u8 = 4;

/// Classe de sévérité d'un état brut
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateClass {
    Good,
    SoftProblem,
    HardProblem,
}

pub fn classify(kind: ItemKind, state: LsState) -> Result<StateClass, ResolverInputError> {
    let class = match (kind, state) {
        (ItemKind::Host, LsState::Up) | (ItemKind::Service, LsState::Ok) => StateClass::Good,
        (ItemKind::Host, LsState::Unreachable)
        | (ItemKind::Service, LsState::Warning)
        | (ItemKind::Service, LsState::Unknown) => StateClass::SoftProblem,
        (ItemKind::Host, LsState::Down)
        | (ItemKind::Service, LsState::Critical)
        | (ItemKind::Service, LsState::Unreachable) => StateClass::HardProblem,
        _ => return Err(ResolverInputError { kind, state }),
    };
    Ok(class)
}

/// Ordinal global. `worst_child` = pire `_overall_state_id` parmi les services
/// non-templates d'un host (None pour un service ou un host sans services).
pub fn resolve_overall_state(
    kind: ItemKind,
    state: LsState,
    acknowledged: bool,
    downtimed: bool,
    worst_child: Option<u8>,
) -> Result<u8, ResolverInputError> {
    let own = match classify(kind, state)? {
        StateClass::Good => OVERALL_OK,
        _ if downtimed => OVERALL_DOWNTIMED,
        _ if acknowledged => OVERALL_ACKNOWLEDGED,
        StateClass::SoftProblem => OVERALL_SOFT_PROBLEM,
        StateClass::HardProblem => OVERALL_HARD_PROBLEM,
    };
    Ok(own.max(worst_child.unwrap_or(OVERALL_OK)))
}

/// Résout un item à partir de son état settled : une transition SOFT ne
/// change jamais la classification.
pub fn item_overall_state(item: &Item, worst_child: Option<u8>) -> Result<u8, ResolverInputError> {
    resolve_overall_state(
        item.kind,
        item.settled_state,
        item.ls_acknowledged,
        item.ls_downtimed,
        worst_child,
    )
}

/// Pire état global parmi des services (templates exclus)
pub fn worst_of<'a>(services: impl IntoIterator<Item = &'a Item>) -> Option<u8> {
    services
        .into_iter()
        .filter(|s| !s.is_template)
        .map(|s| s.overall_state_id)
        .max()
}
