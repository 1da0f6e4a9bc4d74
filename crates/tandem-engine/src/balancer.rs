//! Load balancer
//!
//! Selects one peer out of a candidate pool under four policies and
//! keeps per-peer health accounting: throughput, failure rate, active
//! channel counts, and a health flag that demotes consistently failing
//! peers and recovers them after an idle cooldown.

use chrono::{Duration as ChronoDuration, Utc};
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tandem_core::{
    config::BalancerConfig,
    models::{BalanceMode, Peer, PeerStats},
    traits::StatsRepository,
    AppError, AppResult,
};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// A peer is demoted once it has more than this many calls...
const HEALTH_MIN_SAMPLE: i64 = 10;

/// ...with a success rate below this percentage
const HEALTH_MIN_SUCCESS_RATE: f64 = 50.0;

/// Peer selector with health accounting
pub struct LoadBalancer {
    stats: RwLock<HashMap<String, PeerStats>>,
    cursors: Mutex<HashMap<String, usize>>,
    repo: Arc<dyn StatsRepository>,
    config: BalancerConfig,
}

impl LoadBalancer {
    /// Create a balancer persisting stats through `repo`
    pub fn new(repo: Arc<dyn StatsRepository>, config: BalancerConfig) -> Self {
        Self {
            stats: RwLock::new(HashMap::new()),
            cursors: Mutex::new(HashMap::new()),
            repo,
            config,
        }
    }

    /// Select one peer from `candidates` under `mode`
    ///
    /// Candidates that are inactive, demoted, or at their channel cap
    /// are filtered out first; an empty result fails the call.
    pub async fn select(&self, candidates: &[Peer], mode: BalanceMode) -> AppResult<Peer> {
        if candidates.is_empty() {
            return Err(AppError::NoHealthyPeers);
        }

        let eligible = self.filter_healthy(candidates).await;
        if eligible.is_empty() {
            return Err(AppError::NoHealthyPeers);
        }

        let selected = match mode {
            BalanceMode::RoundRobin => self.round_robin(&eligible).await,
            BalanceMode::Weighted => self.weighted_random(&eligible),
            BalanceMode::Priority => self.priority(&eligible),
            BalanceMode::Failover => self.failover(&eligible).await,
        };

        debug!("Selected peer {} (mode: {})", selected.name, mode);
        Ok(selected)
    }

    async fn filter_healthy(&self, candidates: &[Peer]) -> Vec<Peer> {
        let stats = self.stats.read().await;

        candidates
            .iter()
            .filter(|p| {
                if !p.active {
                    return false;
                }
                match stats.get(&p.name) {
                    // Unknown peers are assumed healthy and idle
                    None => true,
                    Some(s) => {
                        s.healthy
                            && (p.max_channels == 0 || s.active_calls < p.max_channels as i64)
                    }
                }
            })
            .cloned()
            .collect()
    }

    /// Cycle through the candidate set; the cursor is keyed on the
    /// sorted tuple of names so the same pool shares fairness state no
    /// matter how it was assembled
    async fn round_robin(&self, eligible: &[Peer]) -> Peer {
        let mut ordered: Vec<&Peer> = eligible.iter().collect();
        ordered.sort_by(|a, b| a.name.cmp(&b.name));

        let key = ordered
            .iter()
            .map(|p| p.name.as_str())
            .collect::<Vec<_>>()
            .join(",");

        let mut cursors = self.cursors.lock().await;
        let index = cursors.entry(key).or_insert(0);
        let selected = ordered[*index % ordered.len()].clone();
        *index += 1;
        selected
    }

    /// Random draw proportional to weight; zero total weight degrades
    /// to a uniform draw
    fn weighted_random(&self, eligible: &[Peer]) -> Peer {
        let total: u64 = eligible.iter().map(|p| p.weight as u64).sum();
        let mut rng = rand::thread_rng();

        if total == 0 {
            return eligible[rng.gen_range(0..eligible.len())].clone();
        }

        let mut r = rng.gen_range(0..total) as i64;
        for peer in eligible {
            r -= peer.weight as i64;
            if r < 0 {
                return peer.clone();
            }
        }

        eligible[eligible.len() - 1].clone()
    }

    /// Highest priority wins, name-ordered on ties
    fn priority(&self, eligible: &[Peer]) -> Peer {
        let mut ordered: Vec<&Peer> = eligible.iter().collect();
        ordered.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.name.cmp(&b.name)));
        ordered[0].clone()
    }

    /// Highest priority healthy peer, falling back to highest priority
    async fn failover(&self, eligible: &[Peer]) -> Peer {
        let mut ordered: Vec<&Peer> = eligible.iter().collect();
        ordered.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.name.cmp(&b.name)));

        let stats = self.stats.read().await;
        for peer in &ordered {
            let healthy = stats.get(&peer.name).map_or(true, |s| s.healthy);
            if healthy {
                return (*peer).clone();
            }
        }

        ordered[0].clone()
    }

    /// Record a completed (or failed) call against a peer
    ///
    /// Successful calls feed the running duration mean; a peer with more
    /// than ten calls and under a 50% success rate is demoted.
    pub async fn update_stats(&self, peer_name: &str, succeeded: bool, duration: Duration) {
        let snapshot = {
            let mut stats = self.stats.write().await;
            let entry = stats
                .entry(peer_name.to_string())
                .or_insert_with(|| PeerStats::new(peer_name));

            entry.total_calls += 1;
            entry.last_call_time = Some(Utc::now());

            if succeeded {
                if !duration.is_zero() {
                    entry.avg_duration_secs = (entry.avg_duration_secs
                        * (entry.total_calls - 1) as f64
                        + duration.as_secs_f64())
                        / entry.total_calls as f64;
                }
            } else {
                entry.failed_calls += 1;
            }

            entry.success_rate = (entry.total_calls - entry.failed_calls) as f64
                / entry.total_calls as f64
                * 100.0;

            if entry.total_calls > HEALTH_MIN_SAMPLE
                && entry.success_rate < HEALTH_MIN_SUCCESS_RATE
            {
                if entry.healthy {
                    warn!(
                        "Peer {} demoted: success rate {:.1}% over {} calls",
                        peer_name, entry.success_rate, entry.total_calls
                    );
                }
                entry.healthy = false;
            }

            entry.clone()
        };

        // Mirror to the store off the hot path
        let repo = self.repo.clone();
        tokio::spawn(async move {
            if let Err(e) = repo.upsert(&snapshot).await {
                warn!("Failed to persist stats for {}: {}", snapshot.peer_name, e);
            }
        });
    }

    /// Adjust a peer's active-channel counter, floored at zero
    pub async fn increment_active(&self, peer_name: &str, delta: i64) {
        let mut stats = self.stats.write().await;
        let entry = stats
            .entry(peer_name.to_string())
            .or_insert_with(|| PeerStats::new(peer_name));
        entry.active_calls = (entry.active_calls + delta).max(0);
    }

    /// Current stats for one peer (fresh defaults if never observed)
    pub async fn stats_for(&self, peer_name: &str) -> PeerStats {
        self.stats
            .read()
            .await
            .get(peer_name)
            .cloned()
            .unwrap_or_else(|| PeerStats::new(peer_name))
    }

    /// All observed peer stats, sorted by name
    pub async fn all_stats(&self) -> Vec<PeerStats> {
        let stats = self.stats.read().await;
        let mut result: Vec<PeerStats> = stats.values().cloned().collect();
        result.sort_by(|a, b| a.peer_name.cmp(&b.peer_name));
        result
    }

    /// One health monitor pass: demoted peers idle past the cooldown
    /// get their counters reset and rejoin the pool
    pub async fn check_health(&self) {
        let cooldown = ChronoDuration::seconds(self.config.recovery_cooldown_secs as i64);
        let now = Utc::now();

        let mut stats = self.stats.write().await;
        for (name, entry) in stats.iter_mut() {
            if entry.healthy {
                continue;
            }
            let idle_long_enough = entry
                .last_call_time
                .map_or(true, |last| now - last > cooldown);
            if idle_long_enough {
                info!("Peer {} recovered after cooldown", name);
                entry.healthy = true;
                entry.total_calls = 0;
                entry.failed_calls = 0;
                entry.success_rate = 100.0;
            }
        }
    }

    /// Periodic health monitor loop
    pub async fn run_health_monitor(self: Arc<Self>) {
        let period = Duration::from_secs(self.config.health_check_interval_secs.max(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.check_health().await;
        }
    }
}
