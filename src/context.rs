use super::error::{Result, RoutingError, ValidationError};
use super::grant::{ChainKey, NewGrant, Route, RoutingGrant, TimeStamp, VesselId};
use super::utils::{self, EVENT_HRP, GRANT_HRP};
use chrono::Utc;

/// The append-only log of one approval chain: its grants and approval events.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct RouteContext {
    #[n(0)]
    pub key: ChainKey,
    #[n(1)]
    pub vessel_id: Option<VesselId>, // fixed by the first grant
    #[n(2)]
    pub grants: Vec<RoutingGrant>,
    #[n(3)]
    pub events: Vec<ApprovalEvent>,
    #[n(4)]
    next_sequence: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct ApprovalEvent {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub transaction_id: u64,
    #[n(2)]
    pub sub_module: u64,
    #[n(3)]
    pub vessel_id: VesselId,
    #[n(4)]
    pub message: String,
    #[n(5)]
    pub status: ApprovalStatus,
    #[n(6)]
    pub created_at: TimeStamp<Utc>,
    #[n(7)]
    pub sequence: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum ApprovalStatus {
    #[n(0)]
    UnderReview,
    #[n(1)]
    Approved,
    #[n(2)]
    Rejected,
}

/// Where a chain stands, derived from its log. `stage` is the index of the
/// working timeline stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainState {
    Unrouted,
    Routed { stage: usize },
    UnderReview { stage: usize },
    Rejected { stage: usize, message: String },
    Completed,
}

impl ChainState {
    pub fn working_stage(&self) -> Option<usize> {
        match self {
            ChainState::Routed { stage }
            | ChainState::UnderReview { stage }
            | ChainState::Rejected { stage, .. } => Some(*stage),
            ChainState::Unrouted | ChainState::Completed => None,
        }
    }
}

impl RouteContext {
    pub fn new(key: ChainKey) -> Self {
        Self {
            key,
            vessel_id: None,
            grants: vec![],
            events: vec![],
            next_sequence: 0,
        }
    }

    /// Number of entries ever appended. Changes on every write.
    pub fn len(&self) -> u64 {
        self.next_sequence
    }

    pub fn is_empty(&self) -> bool {
        self.next_sequence == 0
    }

    pub fn is_routed(&self) -> bool {
        !self.grants.is_empty()
    }

    /// An active grant with the same actor and permission, if one exists.
    pub fn find_active(&self, route: &Route) -> Option<&RoutingGrant> {
        self.grants
            .iter()
            .find(|grant| grant.is_granted && grant.route.same_assignment(route))
    }

    pub fn check_vessel(&self, vessel_id: VesselId) -> std::result::Result<(), ValidationError> {
        match self.vessel_id {
            Some(expected) if expected != vessel_id => Err(ValidationError::VesselMismatch {
                expected,
                got: vessel_id,
            }),
            _ => Ok(()),
        }
    }

    pub fn append_grant(
        &mut self,
        grant: NewGrant,
        created_at: TimeStamp<Utc>,
    ) -> Result<RoutingGrant> {
        self.check_vessel(grant.vessel_id)?;

        let stored = RoutingGrant {
            id: utils::new_uuid_to_bech32(GRANT_HRP)?,
            transaction_id: self.key.transaction_id,
            sub_module: self.key.sub_module,
            vessel_id: grant.vessel_id,
            route: grant.route,
            is_granted: grant.is_granted,
            created_at,
            sequence: self.take_sequence(),
        };

        self.vessel_id = Some(grant.vessel_id);
        self.grants.push(stored.clone());
        Ok(stored)
    }

    pub fn append_event(
        &mut self,
        vessel_id: VesselId,
        message: &str,
        status: ApprovalStatus,
        created_at: TimeStamp<Utc>,
    ) -> Result<ApprovalEvent> {
        if message.trim().is_empty() {
            return Err(ValidationError::EmptyMessage.into());
        }
        self.check_vessel(vessel_id)?;

        let event = ApprovalEvent {
            id: utils::new_uuid_to_bech32(EVENT_HRP)?,
            transaction_id: self.key.transaction_id,
            sub_module: self.key.sub_module,
            vessel_id,
            message: message.to_string(),
            status,
            created_at,
            sequence: self.take_sequence(),
        };

        self.events.push(event.clone());
        Ok(event)
    }

    /// Derived state of the approval chain.
    pub fn current_state(&self) -> ChainState {
        super::timeline::Progress::derive(self).state()
    }

    /// sha256 over the encoded log. Any append changes it.
    pub fn revision(&self) -> Result<String> {
        let contents = self.encode()?;
        Ok(sha256::digest(&contents))
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(minicbor::to_vec(self)?)
    }

    pub fn decode(key: &ChainKey, bytes: &[u8]) -> Result<Self> {
        minicbor::decode(bytes).map_err(|source| RoutingError::Decode {
            key: hex::encode(key.to_bytes()),
            source,
        })
    }

    fn take_sequence(&mut self) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        sequence
    }
}
