use crate::models::RealmId;
use crate::realm::RealmTree;
use std::collections::BTreeSet;

/// Périmètre de lecture de l'appelant, fourni par la couche d'authentification.
/// Les fonctions d'agrégation le reçoivent explicitement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessScope {
    admin: bool,
    realms: BTreeSet<RealmId>,
}

impl AccessScope {
    pub fn admin() -> Self {
        Self { admin: true, realms: BTreeSet::new() }
    }

    pub fn realms<I, S>(realms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<RealmId>,
    {
        Self {
            admin: false,
            realms: realms.into_iter().map(Into::into).collect(),
        }
    }

    /// Étend chaque realm à ses sous-realms ("read in sub-realms").
    /// Un realm inconnu de l'arbre est ignoré.
    pub fn with_sub_realms<I, S>(tree: &RealmTree, realms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<RealmId>,
    {
        let mut expanded = BTreeSet::new();
        for realm in realms.into_iter().map(Into::into) {
            if let Ok(children) = tree.descendants(&realm) {
                expanded.extend(children.iter().cloned());
                expanded.insert(realm);
            }
        }
        Self { admin: false, realms: expanded }
    }

    pub fn is_admin(&self) -> bool {
        self.admin
    }

    pub fn can_read(&self, realm: &str) -> bool {
        self.admin || self.realms.contains(realm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_reads() {
        let mut tree = RealmTree::new();
        tree.insert("all", "All", None).unwrap();
        tree.insert("eu", "Europe", Some("all")).unwrap();
        tree.insert("fr", "France", Some("eu")).unwrap();

        assert!(AccessScope::admin().can_read("anything"));

        let flat = AccessScope::realms(["eu"]);
        assert!(flat.can_read("eu"));
        assert!(!flat.can_read("fr"));

        let deep = AccessScope::with_sub_realms(&tree, ["eu", "ghost"]);
        assert!(deep.can_read("eu"));
        assert!(deep.can_read("fr"));
        assert!(!deep.can_read("all"));
        assert!(!deep.can_read("ghost"));
    }
}
