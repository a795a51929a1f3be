//! Presence publisher: keeps this node's registry record alive.
//!
//! Each tick reconciles the registry with the local view of the node:
//! a missing record is inserted, a drifted record is patched, and a live
//! record has its TTL reset. Ticks are independent; the driver in
//! [`PresencePublisher::run`] sleeps and ticks again whatever the previous
//! tick returned, so the loop only ends with the process.

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use tokio::task::JoinHandle;

use lcg_core::wire::{PRESENCE_REFRESH_SECS, PRESENCE_TTL_SECS};

use super::registry::{NodePresence, PresencePatch, PresenceRegistry, RegistryError};

/// What this node advertises and how often.
#[derive(Debug, Clone)]
pub struct PresenceSettings {
    pub fqdn: String,
    pub country_code: String,
    pub ttl: Duration,
    pub refresh_interval: Duration,
}

impl PresenceSettings {
    pub fn new(fqdn: impl Into<String>, country_code: impl Into<String>) -> Self {
        Self {
            fqdn: fqdn.into(),
            country_code: country_code.into(),
            ttl: Duration::from_secs(PRESENCE_TTL_SECS),
            refresh_interval: Duration::from_secs(PRESENCE_REFRESH_SECS),
        }
    }
}

/// Result of one successful tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// No record existed; a fresh one was inserted.
    Registered,
    /// Drifted fields were rewritten and the TTL reset.
    Corrected(PresencePatch),
    /// Record matched; TTL reset.
    Refreshed,
    /// Record expired between the fetch and the write. The next tick inserts it.
    Vanished,
}

/// Sole writer of this node's presence record.
pub struct PresencePublisher<R> {
    registry: R,
    settings: PresenceSettings,
}

impl<R: PresenceRegistry> PresencePublisher<R> {
    pub fn new(registry: R, settings: PresenceSettings) -> Self {
        Self { registry, settings }
    }

    /// Reconcile the registry record once.
    pub async fn tick(&self) -> Result<TickOutcome, RegistryError> {
        let fqdn = self.settings.fqdn.as_str();

        let Some(online) = self.registry.get(fqdn).await? else {
            self.registry
                .insert(
                    NodePresence {
                        fqdn: fqdn.to_string(),
                        country: self.settings.country_code.clone(),
                        load: 0,
                    },
                    self.settings.ttl,
                )
                .await?;
            tracing::info!(fqdn, country = %self.settings.country_code, "presence registered");
            return Ok(TickOutcome::Registered);
        };

        let patch = self.drift(&online);
        if !patch.is_empty() {
            if !self.registry.update(fqdn, &patch).await? {
                tracing::warn!(
                    fqdn,
                    "presence record vanished before drift correction was saved"
                );
                return Ok(TickOutcome::Vanished);
            }
            tracing::info!(
                fqdn,
                from = %online.country,
                to = %self.settings.country_code,
                "corrected drifted presence record"
            );
        }

        if !self.registry.touch(fqdn, self.settings.ttl).await? {
            tracing::warn!(fqdn, "presence record expired before ttl refresh");
            return Ok(TickOutcome::Vanished);
        }

        if patch.is_empty() {
            Ok(TickOutcome::Refreshed)
        } else {
            Ok(TickOutcome::Corrected(patch))
        }
    }

    /// Fields of the stored record that differ from the local view.
    /// Load is owned by other writers and never reconciled here.
    fn drift(&self, online: &NodePresence) -> PresencePatch {
        PresencePatch {
            country: (online.country != self.settings.country_code)
                .then(|| self.settings.country_code.clone()),
            load: None,
        }
    }

    /// Tick forever at the refresh interval.
    ///
    /// Errors and panics inside a tick are logged and absorbed. If they persist
    /// past the TTL the record lapses, which is the intended outcome for a node
    /// that cannot reach the registry.
    pub async fn run(self) {
        tracing::info!(
            fqdn = %self.settings.fqdn,
            country = %self.settings.country_code,
            ttl_secs = self.settings.ttl.as_secs(),
            interval_secs = self.settings.refresh_interval.as_secs(),
            "presence publisher starting"
        );

        loop {
            tracing::debug!("sending keep alive");
            match AssertUnwindSafe(self.tick()).catch_unwind().await {
                Ok(Ok(outcome)) => tracing::debug!(?outcome, "presence tick complete"),
                Ok(Err(e)) => tracing::error!(error = %e, "presence tick failed"),
                Err(_) => tracing::error!("presence tick panicked"),
            }
            tokio::time::sleep(self.settings.refresh_interval).await;
        }
    }
}

impl<R: PresenceRegistry + 'static> PresencePublisher<R> {
    /// Start [`Self::run`] on the runtime. Aborting the handle does not
    /// deregister; the record simply expires.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
