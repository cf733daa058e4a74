/**
 * STORE LIVESTATE - Interface de persistence des documents
 *
 * RÔLE :
 * Ce module définit le collaborateur "document store" dont dépend l'agrégation :
 * items (hosts/services), realms, lignes livesynthesis et leur historique.
 *
 * FONCTIONNEMENT :
 * - LiveStore trait = interface commune (find/insert/update) que chaque backend implémente
 * - `increment_livesynthesis` = incrément atomique d'une ligne (équivalent `$inc`),
 *   jamais un read-modify-write côté appelant
 * - `modify_item` = read-modify-write d'un item en une section critique : l'original
 *   retourné est celui sur lequel la modification a réellement porté
 * - ItemFilter = langage de requête minimal (kind, realm, host, templates)
 *
 * Le handle est injecté explicitement (`&dyn LiveStore`) dans toutes les
 * fonctions d'agrégation : aucun état global "app courante".
 */

pub mod memory;

use crate::error::ResolverInputError;
use crate::livesynthesis::counters::{Counter, Increment, Livesynthesis, LivesynthesisSnapshot};
use crate::models::{Item, ItemId, ItemKind, RealmId};
use crate::realm::{Realm, RealmError, RealmTree};

pub use memory::MemoryStore;

/// Erreurs possibles lors des opérations sur le store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0} not found: {1}")]
    NotFound(ItemKind, ItemId),
    #[error("item already exists: {0}")]
    Duplicate(ItemId),
    #[error(transparent)]
    Realm(#[from] RealmError),
    #[error("update rejected: {0}")]
    Rejected(#[from] ResolverInputError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Filtre sur les items. Par défaut les templates sont exclus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFilter {
    pub kind: ItemKind,
    pub realm: Option<RealmId>,
    pub host: Option<ItemId>,
    pub include_templates: bool,
}

impl ItemFilter {
    pub fn new(kind: ItemKind) -> Self {
        Self { kind, realm: None, host: None, include_templates: false }
    }

    pub fn in_realm(mut self, realm: impl Into<RealmId>) -> Self {
        self.realm = Some(realm.into());
        self
    }

    /// Services d'un host
    pub fn of_host(host: impl Into<ItemId>) -> Self {
        Self { host: Some(host.into()), ..Self::new(ItemKind::Service) }
    }

    pub fn with_templates(mut self) -> Self {
        self.include_templates = true;
        self
    }

    pub fn matches(&self, item: &Item) -> bool {
        item.kind == self.kind
            && (self.include_templates || !item.is_template)
            && self.realm.as_ref().map_or(true, |r| &item.realm == r)
            && self.host.as_ref().map_or(true, |h| item.host.as_ref() == Some(h))
    }
}

/// Interface commune de persistence
pub trait LiveStore: Send + Sync {
    fn find_item(&self, kind: ItemKind, id: &str) -> Result<Option<Item>, StoreError>;

    /// Résultats triés par `_id`
    fn find_items(&self, filter: &ItemFilter) -> Result<Vec<Item>, StoreError>;

    fn insert_item(&self, item: Item) -> Result<(), StoreError>;

    /// Remplace le document complet (NotFound s'il n'existe pas)
    fn replace_item(&self, item: Item) -> Result<(), StoreError>;

    /// Applique `update` à une copie de l'item puis la substitue, sans qu'aucune
    /// autre écriture ne puisse s'intercaler. Rien n'est écrit si `update` échoue.
    /// Retourne `(original, modifié)`, None si l'item n'existe pas.
    ///
    /// `update` s'exécute sous le verrou du store : il ne doit pas rappeler le store.
    fn modify_item(
        &self,
        kind: ItemKind,
        id: &str,
        update: &mut dyn FnMut(&mut Item) -> Result<(), ResolverInputError>,
    ) -> Result<Option<(Item, Item)>, StoreError>;

    fn find_livesynthesis(&self, realm: &str) -> Result<Option<Livesynthesis>, StoreError>;

    fn livesynthesis_rows(&self) -> Result<Vec<Livesynthesis>, StoreError>;

    /// Insère la ligne si le realm n'en a pas encore, retourne false sinon
    /// (la ligne existante est conservée).
    fn insert_livesynthesis(&self, row: Livesynthesis) -> Result<bool, StoreError>;

    /// Incrément atomique. Retourne false (sans rien écrire) si la ligne n'existe pas.
    fn increment_livesynthesis(&self, realm: &str, increment: &Increment) -> Result<bool, StoreError>;

    /// Écrase les compteurs donnés. Retourne false si la ligne n'existe pas.
    fn set_livesynthesis(&self, realm: &str, values: &[(Counter, i64)]) -> Result<bool, StoreError>;

    /// Copie de l'arbre des realms
    fn realm_tree(&self) -> Result<RealmTree, StoreError>;

    fn insert_realm(&self, name: &str, parent: Option<&str>) -> Result<Realm, StoreError>;

    fn move_realm(&self, id: &str, parent: Option<&str>) -> Result<Realm, StoreError>;

    /// Ajoute un snapshot en tête de l'historique du realm et ne garde que `keep` entrées
    fn push_retention(&self, snapshot: LivesynthesisSnapshot, keep: usize) -> Result<(), StoreError>;

    /// Historique d'un realm, plus récent d'abord
    fn retention(&self, realm: &str) -> Result<Vec<LivesynthesisSnapshot>, StoreError>;
}
