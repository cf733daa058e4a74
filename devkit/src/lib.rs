/*!
# Symbion DevKit - Utilitaires de test pour le kernel livestate

Bibliothèque facilitant l'écriture de tests sur les compteurs livesynthesis avec:
- Builders d'hosts/services prêts à insérer
- Harness avec store en mémoire, realm racine et scope admin
- Assertion de cohérence : compteurs incrémentaux == recompute complet
*/

pub mod fixtures;
pub mod test_utils;

pub use fixtures::ItemBuilder;
pub use test_utils::TestHarness;
