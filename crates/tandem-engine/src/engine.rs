//! Routing engine
//!
//! Drives a call through the four-leg topology. On leg 1 it picks the
//! intermediate and final peers, swaps the caller identity (the outgoing
//! ANI becomes the original DNIS) and masks the destination behind an
//! acquired DID. On the returning legs it verifies the source of the
//! traffic against the stored peers, restores the original identities,
//! and settles stats and pool state when the call completes.

use crate::{balancer::LoadBalancer, ledger::CallLedger, registry::PeerRegistry, routes::RouteTable};
use chrono::{Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tandem_core::{
    config::EngineConfig,
    models::{
        CallRecord, CallResponse, CallStatus, CallStep, DidCounts, Peer, Verification,
    },
    traits::{CallRepository, DidRepository, VerificationRepository},
    AppError, AppResult,
};
use tracing::{info, instrument, warn};

/// Snapshot of what the engine is doing right now
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    /// Live calls in the ledger
    pub active_calls: usize,

    /// DID pool occupancy
    pub dids: DidCounts,

    /// Per-peer involvement in live calls
    pub peers: HashMap<String, PeerInvolvement>,
}

/// How many live calls touch a peer, per role
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PeerInvolvement {
    pub inbound: usize,
    pub intermediate: usize,
    pub r#final: usize,
}

/// The per-call state machine orchestrating registry, balancer, pool
/// and ledger
pub struct RoutingEngine {
    registry: Arc<PeerRegistry>,
    routes: Arc<RouteTable>,
    balancer: Arc<LoadBalancer>,
    ledger: CallLedger,
    dids: Arc<dyn DidRepository>,
    calls: Arc<dyn CallRepository>,
    verifications: Arc<dyn VerificationRepository>,
    config: EngineConfig,
}

impl RoutingEngine {
    /// Wire up an engine over its collaborators
    pub fn new(
        registry: Arc<PeerRegistry>,
        routes: Arc<RouteTable>,
        balancer: Arc<LoadBalancer>,
        dids: Arc<dyn DidRepository>,
        calls: Arc<dyn CallRepository>,
        verifications: Arc<dyn VerificationRepository>,
        config: EngineConfig,
    ) -> Self {
        Self {
            registry,
            routes,
            balancer,
            ledger: CallLedger::new(),
            dids,
            calls,
            verifications,
            config,
        }
    }

    /// Leg 1: a call arrived from the inbound carrier.
    ///
    /// Resolves the route, selects the intermediate and final peers,
    /// acquires a DID bound to the real destination, and answers with
    /// the transformed identities for the hop to the intermediate
    /// carrier. Any failure after the DID was acquired releases it; no
    /// record survives a failed leg 1.
    #[instrument(skip(self))]
    pub async fn process_incoming(
        &self,
        call_id: &str,
        ani: &str,
        dnis: &str,
        inbound_peer: &str,
    ) -> AppResult<CallResponse> {
        info!(call_id, ani, dnis, inbound_peer, "Incoming call");

        if self.ledger.get(call_id).await.is_some() {
            return Err(AppError::AlreadyExists(call_id.to_string()));
        }

        let route = self.routes.resolve_for_inbound(inbound_peer).await?;
        info!(call_id, route = %route.name, mode = %route.mode, "Route resolved");

        let (_, intermediates) = self
            .registry
            .resolve_selector(&route.intermediate_peer)
            .await?;
        let intermediate = self.balancer.select(&intermediates, route.mode).await?;

        let (_, finals) = self.registry.resolve_selector(&route.final_peer).await?;
        let final_peer = self.balancer.select(&finals, route.mode).await?;

        info!(
            call_id,
            intermediate = %intermediate.name,
            final_peer = %final_peer.name,
            "Peers selected"
        );

        let did = self
            .dids
            .acquire(&intermediate.name, dnis)
            .await?
            .ok_or_else(|| AppError::NoDidAvailable(intermediate.name.clone()))?;

        let record = CallRecord {
            call_id: call_id.to_string(),
            original_ani: ani.to_string(),
            original_dnis: dnis.to_string(),
            transformed_ani: dnis.to_string(),
            assigned_did: did.clone(),
            inbound_peer: inbound_peer.to_string(),
            intermediate_peer: intermediate.name.clone(),
            final_peer: final_peer.name.clone(),
            status: CallStatus::Active,
            current_step: CallStep::S1ToS2,
            start_time: Utc::now(),
            end_time: None,
            duration_secs: 0,
        };

        if let Err(e) = self.ledger.insert(record.clone()).await {
            // Lost an insert race; the DID must not stay stranded
            if let Err(release_err) = self.dids.release(&did).await {
                warn!(call_id, "Failed to release DID after insert race: {}", release_err);
            }
            return Err(e);
        }

        if let Err(e) = self.calls.insert(&record).await {
            warn!(call_id, "Failed to persist call record: {}", e);
        }

        self.record_verification(Verification::new(
            call_id,
            CallStep::S1ToS2,
            ani,
            dnis,
            ani,
            dnis,
            None,
            true,
        ))
        .await;

        self.balancer.increment_active(&intermediate.name, 1).await;
        self.balancer.increment_active(&final_peer.name, 1).await;

        info!(call_id, did = %did, next_hop = %intermediate.name, "Routing to intermediate");

        Ok(CallResponse {
            did_assigned: Some(did.clone()),
            next_hop: format!("endpoint-{}", intermediate.name),
            ani_to_send: dnis.to_string(),
            dnis_to_send: did,
        })
    }

    /// Leg 3: the call came back from the intermediate carrier.
    ///
    /// Correlates by the dialed DID, verifies the source address against
    /// the stored intermediate peer, and restores the original
    /// identities for the hop to the final carrier. An ANI differing
    /// from the original DNIS is logged but tolerated unless configured
    /// fatal (carriers reformat numbers).
    #[instrument(skip(self))]
    pub async fn process_return(
        &self,
        ani2: &str,
        did: &str,
        claimed_peer: &str,
        source_ip: &str,
    ) -> AppResult<CallResponse> {
        info!(ani2, did, claimed_peer, source_ip, "Return call");

        let record = self
            .ledger
            .get_by_did(did)
            .await
            .ok_or_else(|| AppError::CallNotFound(format!("no active call for DID {}", did)))?;

        let intermediate = self.registry.get(&record.intermediate_peer).await?;

        if let Err(e) = verify_source_ip(&intermediate, source_ip) {
            warn!(
                call_id = %record.call_id,
                peer = %intermediate.name,
                source_ip,
                "Return leg failed source verification"
            );
            self.fail_verification(
                &record,
                Verification::new(
                    &record.call_id,
                    CallStep::S3ToS2,
                    &record.original_dnis,
                    did,
                    ani2,
                    did,
                    Some(source_ip.to_string()),
                    false,
                ),
            )
            .await;
            return Err(e);
        }

        if ani2 != record.original_dnis {
            warn!(
                call_id = %record.call_id,
                expected = %record.original_dnis,
                received = ani2,
                "ANI mismatch on return leg"
            );
            if self.config.fail_on_ani_mismatch {
                self.fail_verification(
                    &record,
                    Verification::new(
                        &record.call_id,
                        CallStep::S3ToS2,
                        &record.original_dnis,
                        did,
                        ani2,
                        did,
                        Some(source_ip.to_string()),
                        false,
                    ),
                )
                .await;
                return Err(AppError::InvalidInput(format!(
                    "ANI mismatch: expected {}, got {}",
                    record.original_dnis, ani2
                )));
            }
        }

        self.record_verification(Verification::new(
            &record.call_id,
            CallStep::S3ToS2,
            &record.original_dnis,
            did,
            ani2,
            did,
            Some(source_ip.to_string()),
            true,
        ))
        .await;

        let updated = self
            .ledger
            .update(&record.call_id, |r| {
                r.current_step = CallStep::S3ToS2;
                r.status = CallStatus::ReturnedFromS3;
            })
            .await?;
        if let Err(e) = self.calls.update(&updated).await {
            warn!(call_id = %updated.call_id, "Failed to persist call record: {}", e);
        }

        info!(
            call_id = %updated.call_id,
            next_hop = %updated.final_peer,
            "Routing to final carrier with original identities"
        );

        Ok(CallResponse {
            did_assigned: None,
            next_hop: format!("endpoint-{}", updated.final_peer),
            ani_to_send: updated.original_ani,
            dnis_to_send: updated.original_dnis,
        })
    }

    /// Leg 5: the call arrived at the far side of the final carrier.
    ///
    /// Verifies the source, settles stats against both selected peers,
    /// releases the DID and retires the record.
    #[instrument(skip(self))]
    pub async fn process_final(
        &self,
        call_id: &str,
        ani: &str,
        dnis: &str,
        claimed_peer: &str,
        source_ip: &str,
    ) -> AppResult<()> {
        info!(call_id, ani, dnis, claimed_peer, source_ip, "Final call");

        // Call-id first; some providers drop it, so fall back to the
        // original identity pair
        let record = match self.ledger.get(call_id).await {
            Some(record) => record,
            None => self
                .ledger
                .find_by_ani_dnis(ani, dnis)
                .await
                .ok_or_else(|| AppError::CallNotFound(call_id.to_string()))?,
        };

        let final_peer = self.registry.get(&record.final_peer).await?;

        if let Err(e) = verify_source_ip(&final_peer, source_ip) {
            warn!(
                call_id = %record.call_id,
                peer = %final_peer.name,
                source_ip,
                "Final leg failed source verification"
            );
            self.fail_verification(
                &record,
                Verification::new(
                    &record.call_id,
                    CallStep::S4ToS2,
                    &record.original_ani,
                    &record.original_dnis,
                    ani,
                    dnis,
                    Some(source_ip.to_string()),
                    false,
                ),
            )
            .await;
            return Err(e);
        }

        if ani != record.original_ani || dnis != record.original_dnis {
            warn!(
                call_id = %record.call_id,
                expected_ani = %record.original_ani,
                expected_dnis = %record.original_dnis,
                received_ani = ani,
                received_dnis = dnis,
                "Identity mismatch on final leg"
            );
        }

        self.record_verification(Verification::new(
            &record.call_id,
            CallStep::S4ToS2,
            &record.original_ani,
            &record.original_dnis,
            ani,
            dnis,
            Some(source_ip.to_string()),
            true,
        ))
        .await;

        let duration = (Utc::now() - record.start_time).to_std().unwrap_or_default();

        self.balancer
            .update_stats(&record.intermediate_peer, true, duration)
            .await;
        self.balancer
            .update_stats(&record.final_peer, true, duration)
            .await;
        self.balancer
            .increment_active(&record.intermediate_peer, -1)
            .await;
        self.balancer.increment_active(&record.final_peer, -1).await;

        if let Err(e) = self.dids.release(&record.assigned_did).await {
            warn!(call_id = %record.call_id, "Failed to release DID: {}", e);
        }

        let mut finished = self
            .ledger
            .remove(&record.call_id)
            .await
            .unwrap_or(record);
        finished.status = CallStatus::Completed;
        finished.current_step = CallStep::Completed;
        finished.end_time = Some(Utc::now());
        finished.duration_secs = duration.as_secs() as i64;

        if let Err(e) = self.calls.update(&finished).await {
            warn!(call_id = %finished.call_id, "Failed to persist call record: {}", e);
        }

        info!(
            call_id = %finished.call_id,
            duration_secs = finished.duration_secs,
            "Call completed"
        );
        Ok(())
    }

    /// Best-effort hangup notification; a record still in the ledger is
    /// treated as abandonment
    #[instrument(skip(self))]
    pub async fn process_hangup(&self, call_id: &str) -> AppResult<()> {
        if self.ledger.get(call_id).await.is_some() {
            info!(call_id, "Hangup with live record, reclaiming");
            self.reclaim(call_id, CallStatus::Abandoned).await;
        }
        Ok(())
    }

    /// One sweep pass: abandon every live record older than the
    /// configured age and reclaim its resources. Returns how many
    /// records were reclaimed.
    pub async fn sweep_stale_calls(&self) -> usize {
        let max_age = ChronoDuration::seconds(self.config.stale_call_secs as i64);
        let stale = self.ledger.stale_call_ids(max_age).await;

        let mut reclaimed = 0;
        for call_id in stale {
            warn!(call_id = %call_id, "Cleaning up stale call");
            if self.reclaim(&call_id, CallStatus::Abandoned).await.is_some() {
                reclaimed += 1;
            }
        }
        reclaimed
    }

    /// Periodic cleanup loop
    pub async fn run_cleanup(self: Arc<Self>) {
        let period = Duration::from_secs(self.config.cleanup_interval_secs.max(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let reclaimed = self.sweep_stale_calls().await;
            if reclaimed > 0 {
                info!("Cleanup sweep reclaimed {} stale calls", reclaimed);
            }
        }
    }

    /// Live call records, for the operator surface
    pub async fn active_calls(&self) -> Vec<CallRecord> {
        self.ledger.records().await
    }

    /// Engine-wide statistics snapshot
    pub async fn statistics(&self) -> AppResult<EngineStats> {
        let records = self.ledger.records().await;
        let dids = self.dids.counts().await?;

        let mut peers: HashMap<String, PeerInvolvement> = HashMap::new();
        for record in &records {
            peers
                .entry(record.inbound_peer.clone())
                .or_default()
                .inbound += 1;
            peers
                .entry(record.intermediate_peer.clone())
                .or_default()
                .intermediate += 1;
            peers.entry(record.final_peer.clone()).or_default().r#final += 1;
        }

        Ok(EngineStats {
            active_calls: records.len(),
            dids,
            peers,
        })
    }

    /// Retire a record, releasing its DID and settling counters.
    ///
    /// The terminal status is `status`, except that a record already
    /// marked FAILED keeps that status.
    async fn reclaim(&self, call_id: &str, status: CallStatus) -> Option<CallRecord> {
        let mut record = self.ledger.remove(call_id).await?;

        if let Err(e) = self.dids.release(&record.assigned_did).await {
            warn!(call_id, "Failed to release DID: {}", e);
        }

        self.balancer
            .update_stats(&record.intermediate_peer, false, Duration::ZERO)
            .await;
        self.balancer
            .update_stats(&record.final_peer, false, Duration::ZERO)
            .await;
        self.balancer
            .increment_active(&record.intermediate_peer, -1)
            .await;
        self.balancer.increment_active(&record.final_peer, -1).await;

        let now = Utc::now();
        if record.status != CallStatus::Failed {
            record.status = status;
        }
        record.current_step = CallStep::Cleanup;
        record.end_time = Some(now);
        record.duration_secs = (now - record.start_time).num_seconds();

        if let Err(e) = self.calls.update(&record).await {
            warn!(call_id, "Failed to persist call record: {}", e);
        }

        Some(record)
    }

    /// Record a failed identity check and apply the configured DID
    /// policy: by default the DID stays bound (the sweep is the
    /// backstop), optionally the whole call is reclaimed immediately.
    async fn fail_verification(&self, record: &CallRecord, verification: Verification) {
        self.record_verification(verification).await;

        let marked = self
            .ledger
            .update(&record.call_id, |r| {
                r.status = CallStatus::Failed;
            })
            .await;

        if self.config.release_did_on_failed_verification {
            self.reclaim(&record.call_id, CallStatus::Failed).await;
        } else if let Ok(updated) = marked {
            if let Err(e) = self.calls.update(&updated).await {
                warn!(call_id = %updated.call_id, "Failed to persist call record: {}", e);
            }
        }
    }

    async fn record_verification(&self, verification: Verification) {
        if let Err(e) = self.verifications.append(&verification).await {
            warn!(
                call_id = %verification.call_id,
                "Failed to store verification record: {}", e
            );
        }
    }
}

/// Check a leg's source address against the peer it claims to be.
///
/// Only peers trusting their configured address are checked; a port
/// suffix on the observed address is ignored.
fn verify_source_ip(peer: &Peer, source_ip: &str) -> AppResult<()> {
    let ip = source_ip.split(':').next().unwrap_or(source_ip);

    if peer.trusts_source_ip() && peer.host != ip {
        return Err(AppError::UnauthorizedSource {
            expected: peer.host.clone(),
            received: ip.to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_core::models::{AuthMode, PeerType};

    fn ip_peer(host: &str) -> Peer {
        Peer::new("s3a", PeerType::Intermediate, host)
    }

    #[test]
    fn test_verify_source_ip_match() {
        let peer = ip_peer("10.0.0.20");
        assert!(verify_source_ip(&peer, "10.0.0.20").is_ok());
        assert!(verify_source_ip(&peer, "10.0.0.20:5060").is_ok());
    }

    #[test]
    fn test_verify_source_ip_mismatch() {
        let peer = ip_peer("10.0.0.20");
        let err = verify_source_ip(&peer, "10.0.0.99").unwrap_err();
        assert!(matches!(err, AppError::UnauthorizedSource { .. }));
    }

    #[test]
    fn test_credential_peers_skip_ip_check() {
        let mut peer = ip_peer("10.0.0.20");
        peer.username = Some("user".to_string());
        peer.password = Some("secret".to_string());
        peer.auth_mode = AuthMode::Credentials;
        assert!(verify_source_ip(&peer, "10.0.0.99").is_ok());
    }
}
