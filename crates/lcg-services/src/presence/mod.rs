//! Node presence: this gateway's liveness record in the shared registry.
//!
//! Routing components elsewhere read the registry to learn which gateway
//! nodes are alive, where they are, and how loaded. Each gateway process owns
//! exactly one record, keyed by its FQDN, and keeps it alive by refreshing the
//! TTL from a background loop. A node that stops refreshing disappears on its
//! own once the TTL runs out.

pub mod publisher;
pub mod registry;

pub use publisher::{PresencePublisher, PresenceSettings, TickOutcome};
pub use registry::{
    expiry_loop, MemoryRegistry, NodePresence, PresencePatch, PresenceRegistry, RegistryError,
};
