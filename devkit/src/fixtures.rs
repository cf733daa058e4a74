/*!
Builders d'items pour les tests

Produisent un `NewItem` (corps de POST /host ou /service) sans passer par le JSON.
*/

use symbion_livestate::models::{ItemKind, LsState, NewItem, StateType};

#[derive(Debug, Clone)]
pub struct ItemBuilder {
    kind: ItemKind,
    new: NewItem,
}

impl ItemBuilder {
    pub fn host(name: &str) -> Self {
        Self {
            kind: ItemKind::Host,
            new: NewItem { name: name.into(), ..NewItem::default() },
        }
    }

    pub fn service(name: &str, host_id: &str) -> Self {
        Self {
            kind: ItemKind::Service,
            new: NewItem {
                name: name.into(),
                host: Some(host_id.into()),
                ..NewItem::default()
            },
        }
    }

    pub fn in_realm(mut self, realm: &str) -> Self {
        self.new.realm = Some(realm.into());
        self
    }

    pub fn state(mut self, state: LsState, state_type: StateType) -> Self {
        self.new.ls_state = Some(state);
        self.new.ls_state_type = Some(state_type);
        self
    }

    pub fn hard(self, state: LsState) -> Self {
        self.state(state, StateType::Hard)
    }

    pub fn acknowledged(mut self) -> Self {
        self.new.ls_acknowledged = Some(true);
        self
    }

    pub fn downtimed(mut self) -> Self {
        self.new.ls_downtimed = Some(true);
        self
    }

    pub fn flapping(mut self) -> Self {
        self.new.ls_is_flapping = Some(true);
        self
    }

    /// Ni check actif ni check passif
    pub fn unmonitored(mut self) -> Self {
        self.new.active_checks_enabled = Some(false);
        self.new.passive_checks_enabled = Some(false);
        self
    }

    pub fn template(mut self) -> Self {
        self.new.is_template = true;
        self
    }

    pub fn build(self) -> (ItemKind, NewItem) {
        (self.kind, self.new)
    }
}
