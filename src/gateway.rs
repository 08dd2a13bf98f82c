//! Review, approval and rejection of the working stage
use super::context::{ApprovalEvent, ApprovalStatus, ChainState};
use super::error::{ConflictError, Result, ValidationError};
use super::grant::{ChainKey, TimeStamp, VesselId};
use super::store::ChainStore;
use tracing::info;

/// Appends approval events to a chain. It never touches grants; the working
/// stage moves because the timeline is re-derived from the longer log.
#[derive(Clone)]
pub struct ApprovalGateway {
    chains: ChainStore,
}

impl ApprovalGateway {
    pub fn new(chains: ChainStore) -> Self {
        Self { chains }
    }

    /// Puts the working stage under review. Also used to re-submit after a rejection.
    pub fn send_for_review(
        &self,
        key: ChainKey,
        vessel_id: VesselId,
        message: &str,
    ) -> Result<ApprovalEvent> {
        self.record(key, vessel_id, message, ApprovalStatus::UnderReview)
    }

    /// Rejects the working stage. The stage stays working until a new decision.
    pub fn reject(&self, key: ChainKey, vessel_id: VesselId, message: &str) -> Result<ApprovalEvent> {
        self.record(key, vessel_id, message, ApprovalStatus::Rejected)
    }

    /// Approves the working stage, handing the chain to the next stage.
    pub fn approve(&self, key: ChainKey, vessel_id: VesselId, message: &str) -> Result<ApprovalEvent> {
        self.record(key, vessel_id, message, ApprovalStatus::Approved)
    }

    fn record(
        &self,
        key: ChainKey,
        vessel_id: VesselId,
        message: &str,
        status: ApprovalStatus,
    ) -> Result<ApprovalEvent> {
        if message.trim().is_empty() {
            return Err(ValidationError::EmptyMessage.into());
        }

        let (event, state) = self.chains.update(&key, |ctx| {
            let state = ctx.current_state();
            if state.working_stage().is_none() {
                return Err(ConflictError::NoWorkingStage { key, state }.into());
            }
            let event = ctx.append_event(vessel_id, message, status, TimeStamp::new())?;
            Ok((event, state))
        })?;

        info!(
            event_id = %event.id,
            transaction_id = key.transaction_id,
            sub_module = key.sub_module,
            stage = state.working_stage(),
            status = ?status,
            "approval event recorded"
        );
        Ok(event)
    }

    pub fn current_state(&self, key: &ChainKey) -> Result<ChainState> {
        Ok(self
            .chains
            .read(key)?
            .map(|ctx| ctx.current_state())
            .unwrap_or(ChainState::Unrouted))
    }
}
