/// Delegated OAuth access
///
/// - [`provider`]: The OAuth provider contract consumed by the core
/// - [`google`]: Google implementation over reqwest
/// - [`broker`]: Hands out live delegated credentials, refreshing them when
///   they are about to expire

pub mod broker;
pub mod google;
pub mod provider;

pub use broker::{BrokerConfig, BrokerError, DelegatedAccessBroker};
pub use provider::{OAuthProvider, ProviderUser, TokenGrant};
