//! Compteurs livesynthesis : 26 compteurs par realm (11 hosts, 15 services).

use crate::error::ResolverInputError;
use crate::models::{ItemKind, LsState, RealmId, StateType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use time::OffsetDateTime;

/// Génère l'enum `Counter`, la struct `Counters` et les accès par compteur
/// à partir d'une seule liste (kind, variant, champ).
macro_rules! livesynthesis_counters {
    ($($kind:ident $variant:ident => $field:ident),* $(,)?) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum Counter {
            $($variant),*
        }

        impl Counter {
            pub const ALL: &'static [Counter] = &[$(Counter::$variant),*];

            pub fn field(self) -> &'static str {
                match self {
                    $(Counter::$variant => stringify!($field)),*
                }
            }

            pub fn kind(self) -> ItemKind {
                match self {
                    $(Counter::$variant => ItemKind::$kind),*
                }
            }
        }

        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
        pub struct Counters {
            $(#[serde(default)] pub $field: i64),*
        }

        impl Counters {
            pub fn get(&self, counter: Counter) -> i64 {
                match counter {
                    $(Counter::$variant => self.$field),*
                }
            }

            pub fn slot_mut(&mut self, counter: Counter) -> &mut i64 {
                match counter {
                    $(Counter::$variant => &mut self.$field),*
                }
            }
        }
    };
}

livesynthesis_counters! {
    Host HostsTotal => hosts_total,
    Host HostsNotMonitored => hosts_not_monitored,
    Host HostsUpHard => hosts_up_hard,
    Host HostsUpSoft => hosts_up_soft,
    Host HostsDownHard => hosts_down_hard,
    Host HostsDownSoft => hosts_down_soft,
    Host HostsUnreachableHard => hosts_unreachable_hard,
    Host HostsUnreachableSoft => hosts_unreachable_soft,
    Host HostsAcknowledged => hosts_acknowledged,
    Host HostsInDowntime => hosts_in_downtime,
    Host HostsFlapping => hosts_flapping,
    Service ServicesTotal => services_total,
    Service ServicesNotMonitored => services_not_monitored,
    Service ServicesOkHard => services_ok_hard,
    Service ServicesOkSoft => services_ok_soft,
    Service ServicesWarningHard => services_warning_hard,
    Service ServicesWarningSoft => services_warning_soft,
    Service ServicesCriticalHard => services_critical_hard,
    Service ServicesCriticalSoft => services_critical_soft,
    Service ServicesUnknownHard => services_unknown_hard,
    Service ServicesUnknownSoft => services_unknown_soft,
    Service ServicesUnreachableHard => services_unreachable_hard,
    Service ServicesUnreachableSoft => services_unreachable_soft,
    Service ServicesAcknowledged => services_acknowledged,
    Service ServicesInDowntime => services_in_downtime,
    Service ServicesFlapping => services_flapping,
}

impl Counter {
    pub fn total(kind: ItemKind) -> Counter {
        match kind {
            ItemKind::Host => Counter::HostsTotal,
            ItemKind::Service => Counter::ServicesTotal,
        }
    }

    pub fn not_monitored(kind: ItemKind) -> Counter {
        match kind {
            ItemKind::Host => Counter::HostsNotMonitored,
            ItemKind::Service => Counter::ServicesNotMonitored,
        }
    }

    pub fn acknowledged(kind: ItemKind) -> Counter {
        match kind {
            ItemKind::Host => Counter::HostsAcknowledged,
            ItemKind::Service => Counter::ServicesAcknowledged,
        }
    }

    pub fn in_downtime(kind: ItemKind) -> Counter {
        match kind {
            ItemKind::Host => Counter::HostsInDowntime,
            ItemKind::Service => Counter::ServicesInDowntime,
        }
    }

    pub fn flapping(kind: ItemKind) -> Counter {
        match kind {
            ItemKind::Host => Counter::HostsFlapping,
            ItemKind::Service => Counter::ServicesFlapping,
        }
    }

    /// Compteur `{kind}_{state}_{type}`
    pub fn state(kind: ItemKind, state: LsState, state_type: StateType) -> Result<Counter, ResolverInputError> {
        use Counter::*;
        use LsState as S;

        let hard = state_type == StateType::Hard;
        let counter = match (kind, state) {
            (ItemKind::Host, S::Up) => if hard { HostsUpHard } else { HostsUpSoft },
            (ItemKind::Host, S::Down) => if hard { HostsDownHard } else { HostsDownSoft },
            (ItemKind::Host, S::Unreachable) => if hard { HostsUnreachableHard } else { HostsUnreachableSoft },
            (ItemKind::Service, S::Ok) => if hard { ServicesOkHard } else { ServicesOkSoft },
            (ItemKind::Service, S::Warning) => if hard { ServicesWarningHard } else { ServicesWarningSoft },
            (ItemKind::Service, S::Critical) => if hard { ServicesCriticalHard } else { ServicesCriticalSoft },
            (ItemKind::Service, S::Unknown) => if hard { ServicesUnknownHard } else { ServicesUnknownSoft },
            (ItemKind::Service, S::Unreachable) => {
                if hard { ServicesUnreachableHard } else { ServicesUnreachableSoft }
            }
            _ => return Err(ResolverInputError { kind, state }),
        };
        Ok(counter)
    }

    /// Compteurs d'état (partition hors ack/downtime)
    pub fn is_state_bucket(self) -> bool {
        !matches!(
            self,
            Counter::HostsTotal
                | Counter::HostsNotMonitored
                | Counter::HostsAcknowledged
                | Counter::HostsInDowntime
                | Counter::HostsFlapping
                | Counter::ServicesTotal
                | Counter::ServicesNotMonitored
                | Counter::ServicesAcknowledged
                | Counter::ServicesInDowntime
                | Counter::ServicesFlapping
        )
    }

    pub fn for_kind(kind: ItemKind) -> impl Iterator<Item = Counter> {
        Counter::ALL.iter().copied().filter(move |c| c.kind() == kind)
    }
}

impl Counters {
    pub fn apply(&mut self, increment: &Increment) {
        for (counter, delta) in increment.iter() {
            *self.slot_mut(counter) += delta;
        }
    }

    pub fn add(&mut self, other: &Counters) {
        for &counter in Counter::ALL {
            *self.slot_mut(counter) += other.get(counter);
        }
    }

    /// Somme des buckets : chaque item est soit dans un bucket d'état,
    /// soit acquitté, soit en downtime.
    pub fn bucket_sum(&self, kind: ItemKind) -> i64 {
        Counter::for_kind(kind)
            .filter(|c| c.is_state_bucket())
            .map(|c| self.get(c))
            .sum::<i64>()
            + self.get(Counter::acknowledged(kind))
            + self.get(Counter::in_downtime(kind))
    }

    pub fn is_conserved(&self, kind: ItemKind) -> bool {
        self.bucket_sum(kind) == self.get(Counter::total(kind))
    }

    /// Valeurs des compteurs d'un kind, pour un `set` partiel
    pub fn values_for(&self, kind: ItemKind) -> Vec<(Counter, i64)> {
        Counter::for_kind(kind).map(|c| (c, self.get(c))).collect()
    }
}

/// Delta atomique à appliquer sur une ligne (équivalent d'un `$inc`).
/// Les deltas d'un même compteur se compensent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Increment {
    deltas: BTreeMap<Counter, i64>,
}

impl Increment {
    pub fn add(&mut self, counter: Counter, delta: i64) -> &mut Self {
        let value = self.deltas.entry(counter).or_insert(0);
        *value += delta;
        if *value == 0 {
            self.deltas.remove(&counter);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    pub fn get(&self, counter: Counter) -> i64 {
        self.deltas.get(&counter).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Counter, i64)> + '_ {
        self.deltas.iter().map(|(c, d)| (*c, *d))
    }
}

/// Ligne livesynthesis d'un realm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Livesynthesis {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_realm")]
    pub realm: RealmId,
    #[serde(flatten)]
    pub counters: Counters,
}

impl Livesynthesis {
    pub fn zeroed(realm: impl Into<RealmId>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            realm: realm.into(),
            counters: Counters::default(),
        }
    }
}

/// Snapshot conservé pour l'historique (`?history=1`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LivesynthesisSnapshot {
    #[serde(rename = "_realm")]
    pub realm: RealmId,
    #[serde(rename = "_timestamp", with = "time::serde::rfc3339")]
    pub taken_at: OffsetDateTime,
    #[serde(flatten)]
    pub counters: Counters,
}
