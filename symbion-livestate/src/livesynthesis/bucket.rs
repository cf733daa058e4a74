/**
 * BUCKETS LIVESYNTHESIS - Règle de transition entre compteurs
 *
 * RÔLE :
 * Chaque item non-template est compté dans exactement un bucket :
 * acquitté, sinon en downtime, sinon son couple (état, type) settled.
 * Une mise à jour déplace l'item d'un bucket `minus` vers un bucket `plus`.
 *
 * FONCTIONNEMENT :
 * Pipeline ordonné de transformations pures, composées de gauche à droite :
 *   pertinence -> état/type -> front d'acquittement -> front de downtime
 * Chaque étape prend et rend un candidat (minus, plus). L'ordre est fixe et
 * ne dépend jamais de l'ordre des champs du change-set.
 */

use crate::error::ResolverInputError;
use crate::livesynthesis::counters::Counter;
use crate::models::{ChangeSet, Item, ItemKind, LsState, StateType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    State(LsState, StateType),
    Acknowledged,
    InDowntime,
}

impl Bucket {
    pub fn counter(self, kind: ItemKind) -> Result<Counter, ResolverInputError> {
        match self {
            Bucket::State(state, state_type) => Counter::state(kind, state, state_type),
            Bucket::Acknowledged => Ok(Counter::acknowledged(kind)),
            Bucket::InDowntime => Ok(Counter::in_downtime(kind)),
        }
    }
}

/// Bucket courant d'un item stocké
pub fn bucket_of(item: &Item) -> Bucket {
    if item.ls_acknowledged {
        Bucket::Acknowledged
    } else if item.ls_downtimed {
        Bucket::InDowntime
    } else {
        let (state, state_type) = item.settled();
        Bucket::State(state, state_type)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub minus: Bucket,
    pub plus: Bucket,
}

/// Calcule le déplacement de bucket provoqué par `change` sur `original`.
/// `None` : rien à compter.
pub fn bucket_delta(change: &ChangeSet, original: &Item) -> Option<Transition> {
    if !change.touches_live_state() {
        return None;
    }

    let candidate = state_stage(change, original);
    let candidate = ack_stage(candidate, change, original);
    let candidate = downtime_stage(candidate, change, original);

    (candidate.minus != candidate.plus).then_some(candidate)
}

/// `minus` = bucket settled d'origine, `plus` = bucket settled après fusion.
/// Un type SOFT ne settle pas : le bucket reste figé.
fn state_stage(change: &ChangeSet, original: &Item) -> Transition {
    let (state, state_type) = original.settled();
    let (next_state, next_type) = original.settled_after(change);
    Transition {
        minus: Bucket::State(state, state_type),
        plus: Bucket::State(next_state, next_type),
    }
}

/// Front montant : `plus` devient acknowledged. Front descendant : `minus`
/// devient acknowledged. Déjà acquitté et non levé : acknowledged -> acknowledged.
fn ack_stage(candidate: Transition, change: &ChangeSet, original: &Item) -> Transition {
    let was = original.ls_acknowledged;
    let now = change.ls_acknowledged.unwrap_or(was);
    Transition {
        minus: if was { Bucket::Acknowledged } else { candidate.minus },
        plus: if now { Bucket::Acknowledged } else { candidate.plus },
    }
}

/// Symétrique de l'acquittement, appliqué seulement du côté non acquitté.
fn downtime_stage(candidate: Transition, change: &ChangeSet, original: &Item) -> Transition {
    let was_ack = original.ls_acknowledged;
    let now_ack = change.ls_acknowledged.unwrap_or(was_ack);
    let was = original.ls_downtimed;
    let now = change.ls_downtimed.unwrap_or(was);
    Transition {
        minus: if was && !was_ack { Bucket::InDowntime } else { candidate.minus },
        plus: if now && !now_ack { Bucket::InDowntime } else { candidate.plus },
    }
}
