//! Presence registry contract and an in-process implementation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;

/// One gateway node as advertised to the rest of the system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodePresence {
    /// Registry key.
    pub fqdn: String,
    /// ISO 3166-1 alpha-2 country code.
    pub country: String,
    /// Current load reported for balancing. Written as 0 on registration.
    pub load: u32,
}

/// Field-level change to an existing record. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresencePatch {
    pub country: Option<String>,
    pub load: Option<u32>,
}

impl PresencePatch {
    pub fn is_empty(&self) -> bool {
        self.country.is_none() && self.load.is_none()
    }

    pub fn apply(&self, record: &mut NodePresence) {
        if let Some(country) = &self.country {
            record.country = country.clone();
        }
        if let Some(load) = self.load {
            record.load = load;
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    #[error("registry unavailable: {0}")]
    Unavailable(String),
}

/// Key-value store for presence records with per-record expiry.
///
/// Implementations must make `insert`, `update` and `touch` atomic per key.
/// Several gateway processes write concurrently, each to its own key.
#[async_trait]
pub trait PresenceRegistry: Send + Sync {
    /// Fetch a live record. Expired records are absent.
    async fn get(&self, fqdn: &str) -> Result<Option<NodePresence>, RegistryError>;

    /// Upsert a record that expires after `ttl`.
    async fn insert(&self, record: NodePresence, ttl: Duration) -> Result<(), RegistryError>;

    /// Apply `patch` to a live record without changing its expiry.
    /// Returns `false` if no live record exists.
    async fn update(&self, fqdn: &str, patch: &PresencePatch) -> Result<bool, RegistryError>;

    /// Reset a live record's expiry to `ttl` from now.
    /// Returns `false` if no live record exists.
    async fn touch(&self, fqdn: &str, ttl: Duration) -> Result<bool, RegistryError>;
}

// ── In-process registry ───────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct StoredPresence {
    record: NodePresence,
    expires_at: Instant,
}

impl StoredPresence {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Registry held in process memory.
///
/// Expired entries are invisible immediately and physically removed lazily on
/// read or by [`expiry_loop`].
#[derive(Clone, Default)]
pub struct MemoryRegistry {
    entries: Arc<DashMap<String, StoredPresence>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of live records with their remaining TTL.
    pub fn live_nodes(&self) -> Vec<(NodePresence, Duration)> {
        let now = Instant::now();
        let mut nodes: Vec<_> = self
            .entries
            .iter()
            .filter(|e| e.is_live(now))
            .map(|e| (e.record.clone(), e.expires_at - now))
            .collect();
        nodes.sort_by(|a, b| a.0.fqdn.cmp(&b.0.fqdn));
        nodes
    }

    pub fn ttl_remaining(&self, fqdn: &str) -> Option<Duration> {
        let now = Instant::now();
        self.entries
            .get(fqdn)
            .filter(|e| e.is_live(now))
            .map(|e| e.expires_at - now)
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, e| e.is_live(now));
        before - self.entries.len()
    }
}

#[async_trait]
impl PresenceRegistry for MemoryRegistry {
    async fn get(&self, fqdn: &str) -> Result<Option<NodePresence>, RegistryError> {
        let now = Instant::now();
        let expired = match self.entries.get(fqdn) {
            Some(e) if e.is_live(now) => return Ok(Some(e.record.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove_if(fqdn, |_, e| !e.is_live(now));
        }
        Ok(None)
    }

    async fn insert(&self, record: NodePresence, ttl: Duration) -> Result<(), RegistryError> {
        let expires_at = Instant::now() + ttl;
        self.entries
            .insert(record.fqdn.clone(), StoredPresence { record, expires_at });
        Ok(())
    }

    async fn update(&self, fqdn: &str, patch: &PresencePatch) -> Result<bool, RegistryError> {
        let now = Instant::now();
        if let Some(mut e) = self.entries.get_mut(fqdn) {
            if e.is_live(now) {
                patch.apply(&mut e.record);
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn touch(&self, fqdn: &str, ttl: Duration) -> Result<bool, RegistryError> {
        let now = Instant::now();
        if let Some(mut e) = self.entries.get_mut(fqdn) {
            if e.is_live(now) {
                e.expires_at = now + ttl;
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Remove expired registry entries once a second.
///
/// Runs forever: cancel by dropping the task handle.
pub async fn expiry_loop(registry: MemoryRegistry) {
    let mut interval = tokio::time::interval(Duration::from_secs(1));

    loop {
        interval.tick().await;

        let removed = registry.purge_expired();
        if removed > 0 {
            tracing::debug!(removed, "expired presence registry entries");
        }
    }
}
