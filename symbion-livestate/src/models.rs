/**
 * MODÈLE DE DONNÉES LIVESTATE - Hosts, services et change-sets
 *
 * RÔLE :
 * Types partagés par tout le kernel : l'item supervisé (host ou service), ses
 * champs live `ls_*`, les champs dérivés (`_overall_state_id`, état "settled")
 * et le change-set typé qui décrit une mise à jour partielle.
 *
 * FONCTIONNEMENT :
 * - Un seul type `Item` pour hosts et services, discriminé par `ItemKind`
 * - Les états SOFT ne "settlent" jamais : `_settled_state` garde le dernier état HARD
 * - `ChangeSet` porte des champs optionnels : absent = non modifié
 */

use serde::{Deserialize, Serialize};
use std::fmt;

pub type ItemId = String;
pub type RealmId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Host,
    Service,
}

impl ItemKind {
    pub const ALL: [ItemKind; 2] = [ItemKind::Host, ItemKind::Service];

    /// Préfixe des compteurs livesynthesis ("hosts_total", "services_ok_hard"...)
    pub fn prefix(self) -> &'static str {
        match self {
            ItemKind::Host => "hosts",
            ItemKind::Service => "services",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ItemKind::Host => "host",
            ItemKind::Service => "service",
        }
    }

    /// État par défaut à la création : "inconnu" est un état à problème
    pub fn default_state(self) -> LsState {
        match self {
            ItemKind::Host => LsState::Unreachable,
            ItemKind::Service => LsState::Unknown,
        }
    }

    pub fn accepts(self, state: LsState) -> bool {
        match self {
            ItemKind::Host => matches!(state, LsState::Up | LsState::Down | LsState::Unreachable),
            ItemKind::Service => matches!(
                state,
                LsState::Ok | LsState::Warning | LsState::Critical | LsState::Unknown | LsState::Unreachable
            ),
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LsState {
    Up,
    Down,
    Unreachable,
    Ok,
    Warning,
    Critical,
    Unknown,
}

impl LsState {
    pub fn as_str(self) -> &'static str {
        match self {
            LsState::Up => "UP",
            LsState::Down => "DOWN",
            LsState::Unreachable => "UNREACHABLE",
            LsState::Ok => "OK",
            LsState::Warning => "WARNING",
            LsState::Critical => "CRITICAL",
            LsState::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for LsState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StateType {
    Hard,
    Soft,
}

fn default_true() -> bool {
    true
}

/// Item supervisé tel que stocké (host ou service)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    #[serde(rename = "_id")]
    pub id: ItemId,
    #[serde(rename = "_kind")]
    pub kind: ItemKind,
    pub name: String,
    #[serde(rename = "_realm")]
    pub realm: RealmId,
    /// Donnée conservée telle quelle : la visibilité passe par le scope de
    /// l'utilisateur (`sub_realms`), jamais par ce champ
    #[serde(rename = "_sub_realm", default)]
    pub sub_realm: bool,
    #[serde(rename = "_is_template", default)]
    pub is_template: bool,
    #[serde(rename = "_templates", default)]
    pub templates: Vec<ItemId>,
    #[serde(rename = "_template_fields", default)]
    pub template_fields: Vec<String>,
    /// Host propriétaire (services uniquement)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<ItemId>,

    #[serde(default = "default_true")]
    pub active_checks_enabled: bool,
    #[serde(default = "default_true")]
    pub passive_checks_enabled: bool,

    pub ls_state: LsState,
    pub ls_state_type: StateType,
    #[serde(default)]
    pub ls_acknowledged: bool,
    #[serde(default)]
    pub ls_downtimed: bool,
    #[serde(default)]
    pub ls_is_flapping: bool,
    #[serde(default)]
    pub ls_output: String,
    #[serde(default)]
    pub ls_last_check: i64,
    #[serde(default)]
    pub ls_last_state_changed: i64,

    // champs dérivés, jamais écrits par le client
    #[serde(rename = "_overall_state_id", default)]
    pub overall_state_id: u8,
    #[serde(rename = "_settled_state")]
    pub settled_state: LsState,
    #[serde(rename = "_settled_state_type")]
    pub settled_state_type: StateType,
}

impl Item {
    /// Item vierge aux valeurs par défaut du kind
    pub fn new(kind: ItemKind, id: impl Into<ItemId>, name: impl Into<String>, realm: impl Into<RealmId>) -> Self {
        let state = kind.default_state();
        Self {
            id: id.into(),
            kind,
            name: name.into(),
            realm: realm.into(),
            sub_realm: false,
            is_template: false,
            templates: Vec::new(),
            template_fields: Vec::new(),
            host: None,
            active_checks_enabled: true,
            passive_checks_enabled: true,
            ls_state: state,
            ls_state_type: StateType::Hard,
            ls_acknowledged: false,
            ls_downtimed: false,
            ls_is_flapping: false,
            ls_output: String::new(),
            ls_last_check: 0,
            ls_last_state_changed: 0,
            overall_state_id: 0,
            settled_state: state,
            settled_state_type: StateType::Hard,
        }
    }

    pub fn settled(&self) -> (LsState, StateType) {
        (self.settled_state, self.settled_state_type)
    }

    /// Ni check actif ni check passif : l'item n'est pas supervisé
    pub fn is_monitored(&self) -> bool {
        self.active_checks_enabled || self.passive_checks_enabled
    }

    /// État settled après application d'un change-set.
    /// Seul un type HARD fusionné fait avancer l'état settled.
    pub fn settled_after(&self, change: &ChangeSet) -> (LsState, StateType) {
        let state = change.ls_state.unwrap_or(self.ls_state);
        let state_type = change.ls_state_type.unwrap_or(self.ls_state_type);
        match state_type {
            StateType::Hard => (state, StateType::Hard),
            StateType::Soft => self.settled(),
        }
    }

    /// Applique un change-set sur les champs live (hors `_overall_state_id`)
    pub fn apply(&mut self, change: &ChangeSet, now: i64) {
        let (settled_state, settled_type) = self.settled_after(change);

        if let Some(state) = change.ls_state {
            if state != self.ls_state {
                self.ls_last_state_changed = now;
            }
            self.ls_state = state;
        }
        if let Some(state_type) = change.ls_state_type {
            self.ls_state_type = state_type;
        }
        if let Some(ack) = change.ls_acknowledged {
            self.ls_acknowledged = ack;
        }
        if let Some(downtimed) = change.ls_downtimed {
            self.ls_downtimed = downtimed;
        }
        if let Some(flapping) = change.ls_is_flapping {
            self.ls_is_flapping = flapping;
        }
        if let Some(active) = change.active_checks_enabled {
            self.active_checks_enabled = active;
        }
        if let Some(passive) = change.passive_checks_enabled {
            self.passive_checks_enabled = passive;
        }
        if let Some(output) = &change.ls_output {
            self.ls_output = output.clone();
        }
        if let Some(last_check) = change.ls_last_check {
            self.ls_last_check = last_check;
        }

        self.settled_state = settled_state;
        self.settled_state_type = settled_type;
    }
}

/// Corps d'une requête de création (POST /host, POST /service)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewItem {
    pub name: String,
    #[serde(rename = "_realm", default)]
    pub realm: Option<RealmId>,
    /// Recopié sur l'item, sans effet sur les compteurs ni sur les droits
    #[serde(rename = "_sub_realm", default)]
    pub sub_realm: bool,
    #[serde(rename = "_is_template", default)]
    pub is_template: bool,
    #[serde(rename = "_templates", default)]
    pub templates: Vec<ItemId>,
    #[serde(rename = "_template_fields", default)]
    pub template_fields: Vec<String>,
    #[serde(default)]
    pub host: Option<ItemId>,
    #[serde(default)]
    pub active_checks_enabled: Option<bool>,
    #[serde(default)]
    pub passive_checks_enabled: Option<bool>,
    #[serde(default)]
    pub ls_state: Option<LsState>,
    #[serde(default)]
    pub ls_state_type: Option<StateType>,
    #[serde(default)]
    pub ls_acknowledged: Option<bool>,
    #[serde(default)]
    pub ls_downtimed: Option<bool>,
    #[serde(default)]
    pub ls_is_flapping: Option<bool>,
    #[serde(default)]
    pub ls_output: Option<String>,
}

/// Mise à jour partielle (PATCH ou check result MQTT).
/// Un champ `None` n'est pas touché par la mise à jour.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ls_state: Option<LsState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ls_state_type: Option<StateType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ls_acknowledged: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ls_downtimed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ls_is_flapping: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_checks_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passive_checks_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ls_output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ls_last_check: Option<i64>,
}

impl ChangeSet {
    /// Vrai si un des quatre champs qui pilotent les buckets est présent
    pub fn touches_live_state(&self) -> bool {
        self.ls_state.is_some()
            || self.ls_state_type.is_some()
            || self.ls_acknowledged.is_some()
            || self.ls_downtimed.is_some()
    }

    pub fn state(state: LsState, state_type: StateType) -> Self {
        Self {
            ls_state: Some(state),
            ls_state_type: Some(state_type),
            ..Self::default()
        }
    }

    pub fn acknowledged(ack: bool) -> Self {
        Self {
            ls_acknowledged: Some(ack),
            ..Self::default()
        }
    }

    pub fn downtimed(downtimed: bool) -> Self {
        Self {
            ls_downtimed: Some(downtimed),
            ..Self::default()
        }
    }
}
