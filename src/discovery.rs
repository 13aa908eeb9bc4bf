/// Discovery engine (C7)
///
/// A single background task that polls the shared discovery flags every
/// 100 ms and, when armed, populates the peer queue from exactly one
/// configured source: a hardcoded seed list, the built-in DNS seed list, or
/// a single custom domain.
use crate::error::DiscoveryError;
use crate::peer_queue::PeerQueue;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};
use trust_dns_resolver::config::{ResolverConfig, ResolverOpts};
use trust_dns_resolver::TokioAsyncResolver;

/// Compile-time hardcoded seed list, `"ip:port"` shorthand consumed by
/// [`crate::peer_queue::PeerQueue::push`].
pub const HARDCODED_SEEDS: &[&str] = &[
    "95.217.182.87:8333",
    "94.130.142.41:8333",
    "176.9.20.185:8333",
    "88.99.183.150:8333",
    "144.76.255.171:8333",
];

/// Built-in DNS seed domains, resolved when `dns_lookup` is set with no
/// custom domain override.
pub const DNS_SEEDS: &[&str] = &[
    "seed.bitcoin.sipa.be.",
    "seed.btc.petertodd.org.",
    "dnsseed.emzy.de.",
];

/// The three mutually-constrained discovery booleans plus an optional
/// custom DNS domain (data model §3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    pub daemon: bool,
    pub hardcoded_seeds: bool,
    pub dns_lookup: bool,
    pub custom_domain: Option<String>,
}

impl DiscoveryConfig {
    /// `hardcoded_seeds` and `dns_lookup` are exclusive.
    pub fn validate(&self) -> Result<(), DiscoveryError> {
        if self.hardcoded_seeds && self.dns_lookup {
            return Err(DiscoveryError::InvalidConfig(
                "hardcoded_seeds and dns_lookup are mutually exclusive".to_string(),
            ));
        }
        if !self.hardcoded_seeds && !self.dns_lookup {
            return Err(DiscoveryError::InvalidConfig(
                "no discovery source selected".to_string(),
            ));
        }
        Ok(())
    }
}

/// The flags an operator command and the background worker both read and
/// write, behind a single mutex (§5 "discovery flags: each has its own
/// mutex").
#[derive(Debug, Default)]
pub struct DiscoveryState {
    pub config: DiscoveryConfig,
    /// The top-level enable flag; invariant 3 requires `in_progress ⇒ enabled`.
    pub enabled: bool,
    pub in_progress: bool,
    /// Latched result of the most recent attempt; `None` until the first run.
    pub succeeded: Option<bool>,
}

impl DiscoveryState {
    /// Arm discovery with a new configuration, clearing any previously
    /// latched result — the clearing policy SPEC_FULL.md settles on for
    /// the "succeeded is never cleared" open question.
    pub fn arm(&mut self, config: DiscoveryConfig) {
        self.config = config;
        self.enabled = true;
        self.succeeded = None;
    }
}

/// Shared handle to the discovery flags, cloneable across the command
/// layer and the background worker.
#[derive(Clone, Default)]
pub struct DiscoveryHandle(Arc<Mutex<DiscoveryState>>);

impl DiscoveryHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> (bool, bool, Option<bool>) {
        let state = self.0.lock().await;
        (state.enabled, state.in_progress, state.succeeded)
    }

    pub async fn arm(&self, config: DiscoveryConfig) {
        self.0.lock().await.arm(config);
    }

    pub async fn config(&self) -> DiscoveryConfig {
        self.0.lock().await.config.clone()
    }
}

/// Background worker driving [`DiscoveryState`] transitions and populating
/// `queue` from the configured source.
pub struct DiscoveryEngine {
    handle: DiscoveryHandle,
    queue: Arc<PeerQueue>,
}

impl DiscoveryEngine {
    pub fn new(handle: DiscoveryHandle, queue: Arc<PeerQueue>) -> Self {
        Self { handle, queue }
    }

    /// Poll loop: IDLE -> RUNNING -> DONE{ok|fail} -> IDLE, at 100 ms.
    /// Exits when `exit_flag` is observed true.
    pub async fn run(&self, exit_flag: Arc<std::sync::atomic::AtomicBool>) {
        let mut interval = tokio::time::interval(Duration::from_millis(100));
        loop {
            interval.tick().await;
            if exit_flag.load(std::sync::atomic::Ordering::Relaxed) {
                return;
            }

            let should_run = {
                let mut state = self.handle.0.lock().await;
                if state.enabled && !state.in_progress && state.succeeded.is_none() {
                    state.in_progress = true;
                    true
                } else {
                    false
                }
            };
            if !should_run {
                continue;
            }

            let config = self.handle.config().await;
            let result = self.populate(&config).await;

            let mut state = self.handle.0.lock().await;
            state.in_progress = false;
            state.succeeded = Some(result.is_ok());
            match result {
                Ok(count) => info!(count, "peer discovery attempt succeeded"),
                Err(e) => warn!(error = %e, "peer discovery attempt failed"),
            }
        }
    }

    /// Run exactly one population step for the given config, returning the
    /// number of candidates enqueued.
    async fn populate(&self, config: &DiscoveryConfig) -> Result<usize, DiscoveryError> {
        config.validate()?;
        if config.hardcoded_seeds {
            return Ok(self.populate_hardcoded().await);
        }
        if let Some(domain) = &config.custom_domain {
            return self.populate_dns(&[domain.as_str()]).await;
        }
        self.populate_dns(DNS_SEEDS).await
    }

    async fn populate_hardcoded(&self) -> usize {
        let mut count = 0;
        for entry in HARDCODED_SEEDS {
            match self.queue.push(entry, 0).await {
                Ok(()) => count += 1,
                Err(e) => warn!(entry, error = %e, "failed to enqueue hardcoded seed"),
            }
        }
        count
    }

    async fn populate_dns(&self, domains: &[&str]) -> Result<usize, DiscoveryError> {
        let resolver = TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default());
        let mut count = 0;
        let mut last_resolve_err = None;
        for domain in domains {
            match resolver.lookup_ip(*domain).await {
                Ok(lookup) => {
                    for ip in lookup.iter() {
                        if let std::net::IpAddr::V4(v4) = ip {
                            if v4.is_unspecified() {
                                continue;
                            }
                            match self.queue.push(&v4.to_string(), crate::wire::MAINNET_PORT).await {
                                Ok(()) => count += 1,
                                Err(e) => {
                                    warn!(ip = %v4, error = %e, "failed to enqueue DNS-resolved peer")
                                }
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(domain, error = %e, "DNS seed resolution failed");
                    last_resolve_err = Some(DiscoveryError::Resolve(e.to_string()));
                }
            }
        }
        if count == 0 {
            return Err(last_resolve_err.unwrap_or(DiscoveryError::NoCandidates));
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hardcoded_and_dns_are_mutually_exclusive() {
        let config = DiscoveryConfig {
            daemon: false,
            hardcoded_seeds: true,
            dns_lookup: true,
            custom_domain: None,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn no_source_selected_is_invalid() {
        let config = DiscoveryConfig::default();
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn hardcoded_discovery_enqueues_every_compile_time_entry() {
        let queue = Arc::new(PeerQueue::new());
        let handle = DiscoveryHandle::new();
        let engine = DiscoveryEngine::new(handle, queue.clone());
        let config = DiscoveryConfig {
            daemon: false,
            hardcoded_seeds: true,
            dns_lookup: false,
            custom_domain: None,
        };
        let count = engine.populate(&config).await.unwrap();
        assert_eq!(count, HARDCODED_SEEDS.len());
        assert_eq!(queue.len().await, HARDCODED_SEEDS.len());
    }

    #[tokio::test]
    async fn discovery_state_transitions_through_in_progress_to_latched_success() {
        let queue = Arc::new(PeerQueue::new());
        let handle = DiscoveryHandle::new();
        let exit_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let config = DiscoveryConfig {
            daemon: false,
            hardcoded_seeds: true,
            dns_lookup: false,
            custom_domain: None,
        };
        handle.arm(config).await;

        let engine = DiscoveryEngine::new(handle.clone(), queue);
        let exit_flag_clone = exit_flag.clone();
        let task = tokio::spawn(async move { engine.run(exit_flag_clone).await });

        let mut succeeded = None;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let (_, in_progress, latched) = handle.snapshot().await;
            if !in_progress && latched.is_some() {
                succeeded = latched;
                break;
            }
        }
        exit_flag.store(true, std::sync::atomic::Ordering::Relaxed);
        let _ = task.await;
        assert_eq!(succeeded, Some(true));
    }
}
