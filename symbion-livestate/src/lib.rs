//! Kernel livestate de Symbion : état live des hosts/services et compteurs
//! livesynthesis par realm, tenus à jour incrémentalement.

pub mod config;
pub mod error;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod livesynthesis;
pub mod models;
pub mod mqtt;
pub mod overall;
pub mod realm;
pub mod scope;
pub mod store;

pub use error::{LivestateError, ResolverInputError};
pub use scope::AccessScope;
pub use store::{LiveStore, MemoryStore};
