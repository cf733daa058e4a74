/*!
Test Harness pour le kernel livestate

Facilite l'écriture de scénarios avec:
- Store en mémoire, realm racine et scope admin prêts à l'emploi
- Création/mise à jour d'items via le vrai cycle de vie (hooks inclus)
- `assert_consistent` : les lignes stockées doivent égaler un recompute complet
*/

use crate::fixtures::ItemBuilder;
use anyhow::{bail, Context, Result};
use std::sync::Arc;
use symbion_livestate::lifecycle::{create_item, ensure_root_realm, update_item};
use symbion_livestate::livesynthesis::counters::{Counter, Counters};
use symbion_livestate::livesynthesis::recompute::expected_counters;
use symbion_livestate::models::{ChangeSet, Item, ItemKind, RealmId};
use symbion_livestate::scope::AccessScope;
use symbion_livestate::store::{LiveStore, MemoryStore};
use tracing_subscriber::EnvFilter;

/// Harness de test pour les compteurs livesynthesis
pub struct TestHarness {
    pub store: Arc<MemoryStore>,
    pub scope: AccessScope,
    pub root: RealmId,
}

impl TestHarness {
    /// Store vide avec le realm racine "All" (sans ligne livesynthesis)
    pub fn new() -> Result<Self> {
        Self::with_store(MemoryStore::new())
    }

    pub fn with_store(store: MemoryStore) -> Result<Self> {
        init_test_logging();
        let root = ensure_root_realm(&store, "All")?.id;
        Ok(Self {
            store: Arc::new(store),
            scope: AccessScope::admin(),
            root,
        })
    }

    /// Realm enfant, sans ligne livesynthesis : le premier item la bootstrappe
    pub fn add_realm(&self, name: &str, parent: Option<&str>) -> Result<RealmId> {
        let parent = parent.unwrap_or(&self.root);
        Ok(self.store.insert_realm(name, Some(parent))?.id)
    }

    pub fn create(&self, builder: ItemBuilder) -> Result<Item> {
        let (kind, new) = builder.build();
        let name = new.name.clone();
        create_item(self.store.as_ref(), kind, new, &self.scope).with_context(|| format!("create {kind} {name}"))
    }

    pub fn update(&self, kind: ItemKind, id: &str, change: ChangeSet) -> Result<Item> {
        update_item(self.store.as_ref(), kind, id, change, &self.scope).with_context(|| format!("update {kind} {id}"))
    }

    pub fn item(&self, kind: ItemKind, id: &str) -> Result<Item> {
        self.store
            .find_item(kind, id)?
            .with_context(|| format!("{kind} {id} not found"))
    }

    /// Compteurs stockés du realm (zéro si la ligne n'existe pas encore)
    pub fn counters(&self, realm: &str) -> Result<Counters> {
        Ok(self
            .store
            .find_livesynthesis(realm)?
            .map(|row| row.counters)
            .unwrap_or_default())
    }

    /// Vérifie pour chaque realm que la ligne stockée égale un recompute
    /// depuis les documents, et que la conservation tient pour chaque kind.
    pub fn assert_consistent(&self) -> Result<()> {
        for realm in self.store.realm_tree()?.ids() {
            let stored = self.counters(&realm)?;
            let expected = expected_counters(self.store.as_ref(), &realm)?;

            let drift: Vec<String> = Counter::ALL
                .iter()
                .filter(|c| stored.get(**c) != expected.get(**c))
                .map(|c| format!("{}: stored {} expected {}", c.field(), stored.get(*c), expected.get(*c)))
                .collect();
            if !drift.is_empty() {
                bail!("realm {realm} drifted from recompute: {}", drift.join(", "));
            }

            for kind in ItemKind::ALL {
                if !stored.is_conserved(kind) {
                    bail!(
                        "realm {realm}: {kind} total {} != bucket sum {}",
                        stored.get(Counter::total(kind)),
                        stored.bucket_sum(kind)
                    );
                }
            }
        }
        Ok(())
    }
}

/// Logs `tracing` vers la sortie capturée par `cargo test` (RUST_LOG pour filtrer)
pub fn init_test_logging() {
    tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .try_init()
        .ok();
}
