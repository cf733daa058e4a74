/**
 * ARBRE DES REALMS - Hiérarchie de visibilité des items
 *
 * RÔLE :
 * Arène de nœuds indexés (parent + enfants par indice) avec deux index
 * dénormalisés par realm : `_tree_parents` (ancêtres, racine d'abord) et
 * `_all_children` (descendants transitifs).
 *
 * FONCTIONNEMENT :
 * - Les index sont recalculés à chaque changement de structure, jamais en lecture
 * - Forêt stricte : un realm ne peut pas devenir enfant de lui-même ou d'un descendant
 * - Sérialisé comme une liste de `Realm` (vue document)
 */

use crate::models::RealmId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RealmError {
    #[error("unknown realm: {0}")]
    UnknownRealm(RealmId),
    #[error("unknown parent realm: {0}")]
    UnknownParent(RealmId),
    #[error("realm already exists: {0}")]
    Duplicate(RealmId),
    #[error("realm {realm} cannot be moved under {parent}")]
    Cycle { realm: RealmId, parent: RealmId },
}

/// Vue document d'un realm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Realm {
    #[serde(rename = "_id")]
    pub id: RealmId,
    pub name: String,
    #[serde(rename = "_parent", default)]
    pub parent: Option<RealmId>,
    #[serde(rename = "_level", default)]
    pub level: usize,
    #[serde(rename = "_tree_parents", default)]
    pub tree_parents: Vec<RealmId>,
    #[serde(rename = "_children", default)]
    pub children: Vec<RealmId>,
    #[serde(rename = "_all_children", default)]
    pub all_children: BTreeSet<RealmId>,
}

#[derive(Debug, Clone)]
struct Node {
    id: RealmId,
    name: String,
    parent: Option<usize>,
    children: Vec<usize>,
    tree_parents: Vec<RealmId>,
    all_children: BTreeSet<RealmId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Realm>", into = "Vec<Realm>")]
pub struct RealmTree {
    nodes: Vec<Node>,
    index: HashMap<RealmId, usize>,
}

impl RealmTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Premier realm racine créé (le realm "All" au boot)
    pub fn root(&self) -> Option<&RealmId> {
        self.nodes.iter().find(|n| n.parent.is_none()).map(|n| &n.id)
    }

    pub fn ids(&self) -> Vec<RealmId> {
        self.nodes.iter().map(|n| n.id.clone()).collect()
    }

    pub fn find_by_name(&self, name: &str) -> Option<&RealmId> {
        self.nodes.iter().find(|n| n.name == name).map(|n| &n.id)
    }

    pub fn get(&self, id: &str) -> Option<Realm> {
        self.index.get(id).map(|&idx| self.view(idx))
    }

    pub fn realms(&self) -> Vec<Realm> {
        (0..self.nodes.len()).map(|idx| self.view(idx)).collect()
    }

    /// Ancêtres, racine d'abord
    pub fn ancestors(&self, id: &str) -> Result<&[RealmId], RealmError> {
        let idx = self.lookup(id)?;
        Ok(&self.nodes[idx].tree_parents)
    }

    /// Descendants transitifs (hors realm lui-même)
    pub fn descendants(&self, id: &str) -> Result<&BTreeSet<RealmId>, RealmError> {
        let idx = self.lookup(id)?;
        Ok(&self.nodes[idx].all_children)
    }

    pub fn insert(&mut self, id: impl Into<RealmId>, name: impl Into<String>, parent: Option<&str>) -> Result<Realm, RealmError> {
        let id = id.into();
        if self.index.contains_key(&id) {
            return Err(RealmError::Duplicate(id));
        }
        let parent_idx = match parent {
            Some(p) => Some(*self.index.get(p).ok_or_else(|| RealmError::UnknownParent(p.to_string()))?),
            None => None,
        };

        let idx = self.nodes.len();
        let tree_parents = match parent_idx {
            Some(p) => {
                let mut chain = self.nodes[p].tree_parents.clone();
                chain.push(self.nodes[p].id.clone());
                chain
            }
            None => Vec::new(),
        };
        // nouvelle feuille : seuls les ancêtres gagnent un descendant
        for ancestor in &tree_parents {
            let a = self.index[ancestor];
            self.nodes[a].all_children.insert(id.clone());
        }
        if let Some(p) = parent_idx {
            self.nodes[p].children.push(idx);
        }

        self.nodes.push(Node {
            id: id.clone(),
            name: name.into(),
            parent: parent_idx,
            children: Vec::new(),
            tree_parents,
            all_children: BTreeSet::new(),
        });
        self.index.insert(id, idx);
        Ok(self.view(idx))
    }

    /// Déplace un realm sous un nouveau parent (ou à la racine)
    pub fn set_parent(&mut self, id: &str, parent: Option<&str>) -> Result<Realm, RealmError> {
        let idx = self.lookup(id)?;
        let parent_idx = match parent {
            Some(p) => {
                let p_idx = *self.index.get(p).ok_or_else(|| RealmError::UnknownParent(p.to_string()))?;
                if p_idx == idx || self.nodes[idx].all_children.contains(p) {
                    return Err(RealmError::Cycle { realm: id.to_string(), parent: p.to_string() });
                }
                Some(p_idx)
            }
            None => None,
        };

        if let Some(old) = self.nodes[idx].parent {
            self.nodes[old].children.retain(|&c| c != idx);
        }
        if let Some(p) = parent_idx {
            self.nodes[p].children.push(idx);
        }
        self.nodes[idx].parent = parent_idx;
        self.rebuild_indexes();
        Ok(self.view(idx))
    }

    fn lookup(&self, id: &str) -> Result<usize, RealmError> {
        self.index.get(id).copied().ok_or_else(|| RealmError::UnknownRealm(id.to_string()))
    }

    fn view(&self, idx: usize) -> Realm {
        let node = &self.nodes[idx];
        Realm {
            id: node.id.clone(),
            name: node.name.clone(),
            parent: node.parent.map(|p| self.nodes[p].id.clone()),
            level: node.tree_parents.len(),
            tree_parents: node.tree_parents.clone(),
            children: node.children.iter().map(|&c| self.nodes[c].id.clone()).collect(),
            all_children: node.all_children.clone(),
        }
    }

    /// Recalcule ancêtres et descendants de toute la forêt
    fn rebuild_indexes(&mut self) {
        let roots: Vec<usize> = (0..self.nodes.len()).filter(|&i| self.nodes[i].parent.is_none()).collect();
        for root in roots {
            self.rebuild_subtree(root, Vec::new());
        }
    }

    fn rebuild_subtree(&mut self, idx: usize, tree_parents: Vec<RealmId>) -> BTreeSet<RealmId> {
        let mut chain = tree_parents.clone();
        chain.push(self.nodes[idx].id.clone());

        let mut all_children = BTreeSet::new();
        for child in self.nodes[idx].children.clone() {
            all_children.insert(self.nodes[child].id.clone());
            all_children.extend(self.rebuild_subtree(child, chain.clone()));
        }

        let node = &mut self.nodes[idx];
        node.tree_parents = tree_parents;
        node.all_children = all_children.clone();
        all_children
    }
}

impl From<Vec<Realm>> for RealmTree {
    fn from(realms: Vec<Realm>) -> Self {
        let mut tree = RealmTree::new();
        for realm in &realms {
            if tree.index.contains_key(&realm.id) {
                tracing::warn!(realm = %realm.id, "duplicate realm in persisted data, skipped");
                continue;
            }
            tree.index.insert(realm.id.clone(), tree.nodes.len());
            tree.nodes.push(Node {
                id: realm.id.clone(),
                name: realm.name.clone(),
                parent: None,
                children: Vec::new(),
                tree_parents: Vec::new(),
                all_children: BTreeSet::new(),
            });
        }
        for realm in &realms {
            let Some(parent) = &realm.parent else { continue };
            let idx = tree.index[&realm.id];
            match tree.index.get(parent).copied() {
                // un parent déjà dans le sous-arbre casserait la forêt
                Some(p) if !tree.is_below(p, idx) => {
                    tree.nodes[idx].parent = Some(p);
                    tree.nodes[p].children.push(idx);
                }
                _ => tracing::warn!(realm = %realm.id, parent = %parent, "invalid realm parent, attached as root"),
            }
        }
        tree.rebuild_indexes();
        tree
    }
}

impl From<RealmTree> for Vec<Realm> {
    fn from(tree: RealmTree) -> Self {
        tree.realms()
    }
}

impl RealmTree {
    /// Vrai si `idx` est `ancestor` ou un de ses descendants (via les liens parents)
    fn is_below(&self, idx: usize, ancestor: usize) -> bool {
        let mut current = Some(idx);
        while let Some(i) = current {
            if i == ancestor {
                return true;
            }
            current = self.nodes[i].parent;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RealmTree {
        // All
        // ├── europe
        // │   ├── france
        // │   │   └── paris
        // │   └── spain
        // └── asia
        let mut tree = RealmTree::new();
        tree.insert("all", "All", None).unwrap();
        tree.insert("europe", "Europe", Some("all")).unwrap();
        tree.insert("france", "France", Some("europe")).unwrap();
        tree.insert("paris", "Paris", Some("france")).unwrap();
        tree.insert("spain", "Spain", Some("europe")).unwrap();
        tree.insert("asia", "Asia", Some("all")).unwrap();
        tree
    }

    #[test]
    fn test_tree_parents_chain() {
        let tree = sample();
        assert_eq!(tree.ancestors("paris").unwrap(), ["all", "europe", "france"]);
        assert!(tree.ancestors("all").unwrap().is_empty());
        assert_eq!(tree.get("paris").unwrap().level, 3);
        assert_eq!(tree.root().map(String::as_str), Some("all"));
    }

    #[test]
    fn test_descendants_index() {
        let tree = sample();
        let europe: Vec<_> = tree.descendants("europe").unwrap().iter().cloned().collect();
        assert_eq!(europe, ["france", "paris", "spain"]);
        assert_eq!(tree.descendants("all").unwrap().len(), 5);
        assert!(tree.descendants("paris").unwrap().is_empty());
        assert_eq!(tree.get("europe").unwrap().children, ["france", "spain"]);
    }

    #[test]
    fn test_insert_errors() {
        let mut tree = sample();
        assert_eq!(tree.insert("paris", "Paris", Some("france")), Err(RealmError::Duplicate("paris".into())));
        assert_eq!(tree.insert("x", "X", Some("nowhere")), Err(RealmError::UnknownParent("nowhere".into())));
        assert_eq!(tree.ancestors("nowhere"), Err(RealmError::UnknownRealm("nowhere".into())));
    }

    #[test]
    fn test_move_realm_rebuilds_indexes() {
        let mut tree = sample();
        tree.set_parent("france", Some("asia")).unwrap();

        assert_eq!(tree.ancestors("paris").unwrap(), ["all", "asia", "france"]);
        assert!(!tree.descendants("europe").unwrap().contains("paris"));
        assert!(tree.descendants("asia").unwrap().contains("paris"));
        assert_eq!(tree.get("europe").unwrap().children, ["spain"]);
    }

    #[test]
    fn test_move_realm_refuses_cycles() {
        let mut tree = sample();
        assert!(matches!(tree.set_parent("europe", Some("paris")), Err(RealmError::Cycle { .. })));
        assert!(matches!(tree.set_parent("europe", Some("europe")), Err(RealmError::Cycle { .. })));
        // l'arbre est intact
        assert_eq!(tree.ancestors("paris").unwrap(), ["all", "europe", "france"]);
    }

    #[test]
    fn test_serde_roundtrip_keeps_structure() {
        let mut tree = sample();
        tree.set_parent("europe", Some("asia")).unwrap();

        let json = serde_json::to_string(&tree).unwrap();
        let restored: RealmTree = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.realms(), tree.realms());
        assert_eq!(restored.ancestors("paris").unwrap(), ["all", "asia", "europe", "france"]);
    }
}
