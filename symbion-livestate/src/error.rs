use crate::models::{ItemKind, LsState, RealmId};
use crate::realm::RealmError;
use crate::store::StoreError;

/// État brut hors de l'enum autorisé pour le kind (bug amont : la validation
/// de schéma aurait dû le rejeter)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("state {state} is not a valid {kind} state")]
pub struct ResolverInputError {
    pub kind: ItemKind,
    pub state: LsState,
}

/// Erreurs du kernel livestate
#[derive(Debug, thiserror::Error)]
pub enum LivestateError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    Resolver(#[from] ResolverInputError),
    #[error(transparent)]
    Realm(#[from] RealmError),
    #[error("{0} not found: {1}")]
    NotFound(ItemKind, String),
    #[error("unknown host for service: {0}")]
    UnknownHost(String),
    #[error("service must reference its host")]
    MissingHost,
    #[error("realm not readable by caller: {0}")]
    Forbidden(RealmId),
}
