/**
 * STORE MÉMOIRE - Implémentation de LiveStore en mémoire
 *
 * RÔLE :
 * Backend par défaut du kernel : toutes les collections (hosts, services,
 * realms, livesynthesis, historique) vivent dans un cache protégé par un
 * verrou, avec persistence JSON optionnelle.
 *
 * FONCTIONNEMENT :
 * - Un seul `RwLock` : chaque opération est une section critique, donc un
 *   incrément de compteurs est atomique vis-à-vis des autres requêtes
 * - Si un fichier est configuré : chargé au démarrage, réécrit après chaque mutation
 *   (fichier temporaire puis rename, sérialisation et écriture sous `persist`)
 */

use super::{ItemFilter, LiveStore, StoreError};
use crate::error::ResolverInputError;
use crate::livesynthesis::counters::{Counter, Increment, Livesynthesis, LivesynthesisSnapshot};
use crate::models::{Item, ItemId, ItemKind, RealmId};
use crate::realm::{Realm, RealmTree};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Debug, Default, Serialize, Deserialize)]
struct Collections {
    #[serde(default)]
    hosts: BTreeMap<ItemId, Item>,
    #[serde(default)]
    services: BTreeMap<ItemId, Item>,
    #[serde(default)]
    realms: RealmTree,
    #[serde(default)]
    livesynthesis: BTreeMap<RealmId, Livesynthesis>,
    #[serde(default)]
    retention: BTreeMap<RealmId, VecDeque<LivesynthesisSnapshot>>,
}

impl Collections {
    fn items(&self, kind: ItemKind) -> &BTreeMap<ItemId, Item> {
        match kind {
            ItemKind::Host => &self.hosts,
            ItemKind::Service => &self.services,
        }
    }

    fn items_mut(&mut self, kind: ItemKind) -> &mut BTreeMap<ItemId, Item> {
        match kind {
            ItemKind::Host => &mut self.hosts,
            ItemKind::Service => &mut self.services,
        }
    }
}

pub struct MemoryStore {
    /// Fichier de persistence JSON (None = purement en mémoire)
    storage_path: Option<PathBuf>,
    data: RwLock<Collections>,
    /// Sérialise les sauvegardes : le dernier fichier écrit est le dernier snapshot pris
    persist: Mutex<()>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            storage_path: None,
            data: RwLock::new(Collections::default()),
            persist: Mutex::new(()),
        }
    }

    /// Ouvre un store persistant, en chargeant le fichier s'il existe
    pub fn open<P: Into<PathBuf>>(storage_path: P) -> Result<Self, StoreError> {
        let path = storage_path.into();
        let store = Self {
            storage_path: Some(path.clone()),
            data: RwLock::new(Collections::default()),
            persist: Mutex::new(()),
        };
        store.load_from_disk()?;
        tracing::info!(path = %path.display(), "livestate store opened");
        Ok(store)
    }

    fn load_from_disk(&self) -> Result<(), StoreError> {
        let Some(path) = &self.storage_path else { return Ok(()) };
        if !path.exists() {
            return Ok(());
        }
        let content = fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(());
        }
        *self.data.write() = serde_json::from_str(&content)?;
        Ok(())
    }

    fn save_to_disk(&self) -> Result<(), StoreError> {
        let Some(path) = &self.storage_path else { return Ok(()) };
        let _guard = self.persist.lock();
        let json = {
            let data = self.data.read();
            serde_json::to_string_pretty(&*data)?
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        // jamais de fichier à moitié écrit à la place du précédent
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveStore for MemoryStore {
    fn find_item(&self, kind: ItemKind, id: &str) -> Result<Option<Item>, StoreError> {
        Ok(self.data.read().items(kind).get(id).cloned())
    }

    fn find_items(&self, filter: &ItemFilter) -> Result<Vec<Item>, StoreError> {
        let data = self.data.read();
        Ok(data
            .items(filter.kind)
            .values()
            .filter(|item| filter.matches(item))
            .cloned()
            .collect())
    }

    fn insert_item(&self, item: Item) -> Result<(), StoreError> {
        {
            let mut data = self.data.write();
            let items = data.items_mut(item.kind);
            if items.contains_key(&item.id) {
                return Err(StoreError::Duplicate(item.id));
            }
            items.insert(item.id.clone(), item);
        }
        self.save_to_disk()
    }

    fn replace_item(&self, item: Item) -> Result<(), StoreError> {
        {
            let mut data = self.data.write();
            let Some(slot) = data.items_mut(item.kind).get_mut(&item.id) else {
                return Err(StoreError::NotFound(item.kind, item.id));
            };
            *slot = item;
        }
        self.save_to_disk()
    }

    fn modify_item(
        &self,
        kind: ItemKind,
        id: &str,
        update: &mut dyn FnMut(&mut Item) -> Result<(), ResolverInputError>,
    ) -> Result<Option<(Item, Item)>, StoreError> {
        let pair = {
            let mut data = self.data.write();
            let Some(slot) = data.items_mut(kind).get_mut(id) else { return Ok(None) };
            let mut updated = slot.clone();
            update(&mut updated)?;
            let original = std::mem::replace(slot, updated.clone());
            (original, updated)
        };
        self.save_to_disk()?;
        Ok(Some(pair))
    }

    fn find_livesynthesis(&self, realm: &str) -> Result<Option<Livesynthesis>, StoreError> {
        Ok(self.data.read().livesynthesis.get(realm).cloned())
    }

    fn livesynthesis_rows(&self) -> Result<Vec<Livesynthesis>, StoreError> {
        Ok(self.data.read().livesynthesis.values().cloned().collect())
    }

    fn insert_livesynthesis(&self, row: Livesynthesis) -> Result<bool, StoreError> {
        {
            let mut data = self.data.write();
            if data.livesynthesis.contains_key(&row.realm) {
                return Ok(false);
            }
            data.livesynthesis.insert(row.realm.clone(), row);
        }
        self.save_to_disk()?;
        Ok(true)
    }

    fn increment_livesynthesis(&self, realm: &str, increment: &Increment) -> Result<bool, StoreError> {
        {
            let mut data = self.data.write();
            let Some(row) = data.livesynthesis.get_mut(realm) else { return Ok(false) };
            row.counters.apply(increment);
        }
        self.save_to_disk()?;
        Ok(true)
    }

    fn set_livesynthesis(&self, realm: &str, values: &[(Counter, i64)]) -> Result<bool, StoreError> {
        {
            let mut data = self.data.write();
            let Some(row) = data.livesynthesis.get_mut(realm) else { return Ok(false) };
            for &(counter, value) in values {
                *row.counters.slot_mut(counter) = value;
            }
        }
        self.save_to_disk()?;
        Ok(true)
    }

    fn realm_tree(&self) -> Result<RealmTree, StoreError> {
        Ok(self.data.read().realms.clone())
    }

    fn insert_realm(&self, name: &str, parent: Option<&str>) -> Result<Realm, StoreError> {
        let realm = self
            .data
            .write()
            .realms
            .insert(Uuid::new_v4().to_string(), name, parent)?;
        self.save_to_disk()?;
        Ok(realm)
    }

    fn move_realm(&self, id: &str, parent: Option<&str>) -> Result<Realm, StoreError> {
        let realm = self.data.write().realms.set_parent(id, parent)?;
        self.save_to_disk()?;
        Ok(realm)
    }

    fn push_retention(&self, snapshot: LivesynthesisSnapshot, keep: usize) -> Result<(), StoreError> {
        {
            let mut data = self.data.write();
            let history = data.retention.entry(snapshot.realm.clone()).or_default();
            history.push_front(snapshot);
            history.truncate(keep);
        }
        self.save_to_disk()
    }

    fn retention(&self, realm: &str) -> Result<Vec<LivesynthesisSnapshot>, StoreError> {
        Ok(self
            .data
            .read()
            .retention
            .get(realm)
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    #[test]
    fn test_increment_requires_row() {
        let store = MemoryStore::new();
        let mut inc = Increment::default();
        inc.add(Counter::HostsTotal, 1);
        assert!(!store.increment_livesynthesis("r1", &inc).unwrap());

        assert!(store.insert_livesynthesis(Livesynthesis::zeroed("r1")).unwrap());
        assert!(!store.insert_livesynthesis(Livesynthesis::zeroed("r1")).unwrap());
        assert!(store.increment_livesynthesis("r1", &inc).unwrap());
        assert!(store.increment_livesynthesis("r1", &inc).unwrap());

        let row = store.find_livesynthesis("r1").unwrap().unwrap();
        assert_eq!(row.counters.hosts_total, 2);
    }

    #[test]
    fn test_concurrent_increments_are_not_lost() {
        let store = std::sync::Arc::new(MemoryStore::new());
        store.insert_livesynthesis(Livesynthesis::zeroed("r1")).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    let mut inc = Increment::default();
                    inc.add(Counter::ServicesOkHard, 1);
                    for _ in 0..100 {
                        store.increment_livesynthesis("r1", &inc).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let row = store.find_livesynthesis("r1").unwrap().unwrap();
        assert_eq!(row.counters.services_ok_hard, 800);
    }

    #[test]
    fn test_modify_item_returns_the_replaced_version() {
        let store = MemoryStore::new();
        store.insert_item(Item::new(ItemKind::Host, "h1", "web", "r1")).unwrap();

        let (original, updated) = store
            .modify_item(ItemKind::Host, "h1", &mut |item| {
                item.ls_acknowledged = true;
                Ok(())
            })
            .unwrap()
            .unwrap();
        assert!(!original.ls_acknowledged);
        assert!(updated.ls_acknowledged);

        // le second appel voit le résultat du premier
        let (original, _) = store
            .modify_item(ItemKind::Host, "h1", &mut |item| {
                item.ls_downtimed = true;
                Ok(())
            })
            .unwrap()
            .unwrap();
        assert!(original.ls_acknowledged);

        let missing = store.modify_item(ItemKind::Service, "h1", &mut |_| Ok(())).unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_rejected_modification_writes_nothing() {
        use crate::models::LsState;

        let store = MemoryStore::new();
        store.insert_item(Item::new(ItemKind::Host, "h1", "web", "r1")).unwrap();

        let result = store.modify_item(ItemKind::Host, "h1", &mut |item| {
            item.ls_acknowledged = true;
            Err(ResolverInputError { kind: ItemKind::Host, state: LsState::Ok })
        });
        assert!(matches!(result, Err(StoreError::Rejected(_))));
        assert!(!store.find_item(ItemKind::Host, "h1").unwrap().unwrap().ls_acknowledged);
    }

    #[test]
    fn test_filters_and_templates() {
        let store = MemoryStore::new();
        let mut tpl = Item::new(ItemKind::Host, "t1", "generic-host", "r1");
        tpl.is_template = true;
        store.insert_item(tpl).unwrap();
        store.insert_item(Item::new(ItemKind::Host, "h1", "web", "r1")).unwrap();
        store.insert_item(Item::new(ItemKind::Host, "h2", "db", "r2")).unwrap();
        let mut svc = Item::new(ItemKind::Service, "s1", "http", "r1");
        svc.host = Some("h1".into());
        store.insert_item(svc).unwrap();

        assert_eq!(store.find_items(&ItemFilter::new(ItemKind::Host)).unwrap().len(), 2);
        assert_eq!(store.find_items(&ItemFilter::new(ItemKind::Host).with_templates()).unwrap().len(), 3);
        assert_eq!(store.find_items(&ItemFilter::new(ItemKind::Host).in_realm("r1")).unwrap().len(), 1);
        assert_eq!(store.find_items(&ItemFilter::of_host("h1")).unwrap().len(), 1);
        assert!(matches!(
            store.insert_item(Item::new(ItemKind::Host, "h1", "dup", "r1")),
            Err(StoreError::Duplicate(_))
        ));
    }

    #[test]
    fn test_retention_keeps_newest() {
        let store = MemoryStore::new();
        for i in 0..5 {
            let mut snapshot = LivesynthesisSnapshot {
                realm: "r1".into(),
                taken_at: OffsetDateTime::UNIX_EPOCH + time::Duration::minutes(i),
                counters: Default::default(),
            };
            snapshot.counters.hosts_total = i;
            store.push_retention(snapshot, 3).unwrap();
        }
        let history = store.retention("r1").unwrap();
        let totals: Vec<i64> = history.iter().map(|s| s.counters.hosts_total).collect();
        assert_eq!(totals, [4, 3, 2]);
        assert!(store.retention("r2").unwrap().is_empty());
    }

    #[test]
    fn test_persistence_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("livestate.json");

        let realm_id = {
            let store = MemoryStore::open(&path).unwrap();
            let root = store.insert_realm("All", None).unwrap();
            store.insert_realm("Europe", Some(&root.id)).unwrap();
            store.insert_item(Item::new(ItemKind::Host, "h1", "web", root.id.clone())).unwrap();
            store.insert_livesynthesis(Livesynthesis::zeroed(root.id.clone())).unwrap();
            root.id
        };

        let store = MemoryStore::open(&path).unwrap();
        let tree = store.realm_tree().unwrap();
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.descendants(&realm_id).unwrap().len(), 1);
        assert!(store.find_item(ItemKind::Host, "h1").unwrap().is_some());
        assert!(store.find_livesynthesis(&realm_id).unwrap().is_some());
    }

    #[test]
    fn test_concurrent_writers_leave_latest_state_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("livestate.json");
        let store = std::sync::Arc::new(MemoryStore::open(&path).unwrap());
        store.insert_livesynthesis(Livesynthesis::zeroed("r1")).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    let mut inc = Increment::default();
                    inc.add(Counter::HostsTotal, 1);
                    for i in 0..20 {
                        store.insert_item(Item::new(ItemKind::Host, format!("h{t}-{i}"), "web", "r1")).unwrap();
                        store.increment_livesynthesis("r1", &inc).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let reopened = MemoryStore::open(&path).unwrap();
        assert_eq!(reopened.find_items(&ItemFilter::new(ItemKind::Host)).unwrap().len(), 160);
        assert_eq!(reopened.find_livesynthesis("r1").unwrap().unwrap().counters.hosts_total, 160);
        assert!(!path.with_extension("json.tmp").exists());
    }
}
