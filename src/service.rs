//! Service layer API used by the form collaborators and the UI
use super::config::RoutingConfig;
use super::context::{ApprovalEvent, ChainState};
use super::directory::{Directory, UnnamedDirectory};
use super::error::Result;
use super::gateway::ApprovalGateway;
use super::grant::{ChainKey, GrantRequest, RoutingGrant, SubModuleId, TransactionId, VesselId};
use super::permission::{self, AccessLevel, ActingIdentity};
use super::store::{ChainStore, RouteConfigStore};
use super::timeline::{Timeline, TimelineAggregator};
use std::sync::Arc;

pub struct RoutingService {
    store: RouteConfigStore,
    gateway: ApprovalGateway,
    timelines: TimelineAggregator,
    chains: ChainStore,
}

impl RoutingService {
    pub fn new(instance: Arc<sled::Db>) -> Result<Self> {
        Self::with_options(instance, Arc::new(UnnamedDirectory), 8, false)
    }

    pub fn with_options(
        instance: Arc<sled::Db>,
        directory: Arc<dyn Directory + Send + Sync>,
        max_write_attempts: u32,
        flush_on_write: bool,
    ) -> Result<Self> {
        let chains = ChainStore::open(&instance, max_write_attempts, flush_on_write)?;

        Ok(Self {
            store: RouteConfigStore::new(chains.clone()),
            gateway: ApprovalGateway::new(chains.clone()),
            timelines: TimelineAggregator::new(chains.clone(), directory),
            chains,
        })
    }

    /// Opens the sled database named by the configuration.
    pub fn open(
        config: &RoutingConfig,
        directory: Arc<dyn Directory + Send + Sync>,
    ) -> Result<Self> {
        let db = sled::Config::new()
            .path(&config.storage.path)
            .temporary(config.storage.temporary)
            .open()?;
        tracing::info!(
            path = %config.storage.path.display(),
            temporary = config.storage.temporary,
            "routing store opened"
        );

        Self::with_options(
            Arc::new(db),
            directory,
            config.storage.max_write_attempts,
            config.storage.flush_on_write,
        )
    }

    /// Route a transaction to a user or directorate. `acting` is the identity
    /// issuing the grant; internal grants record its directorate.
    pub fn create_routing_grant(
        &self,
        request: &GrantRequest,
        acting: &ActingIdentity,
    ) -> Result<RoutingGrant> {
        self.store.create(request, acting.directorate_id)
    }

    pub fn list_grants(
        &self,
        sub_module: SubModuleId,
        transaction_id: TransactionId,
    ) -> Result<Vec<RoutingGrant>> {
        self.store.list(&ChainKey::new(transaction_id, sub_module))
    }

    pub fn get_timeline(
        &self,
        sub_module: SubModuleId,
        transaction_id: TransactionId,
    ) -> Result<Timeline> {
        self.timelines
            .build(ChainKey::new(transaction_id, sub_module))
    }

    pub fn resolve_permissions(
        &self,
        acting: &ActingIdentity,
        sub_module: SubModuleId,
        transaction_id: TransactionId,
    ) -> Result<AccessLevel> {
        let grants = self.list_grants(sub_module, transaction_id)?;
        Ok(permission::resolve(&grants, acting))
    }

    pub fn send_for_review(
        &self,
        sub_module: SubModuleId,
        transaction_id: TransactionId,
        vessel_id: VesselId,
        message: &str,
    ) -> Result<ApprovalEvent> {
        self.gateway
            .send_for_review(ChainKey::new(transaction_id, sub_module), vessel_id, message)
    }

    pub fn reject(
        &self,
        sub_module: SubModuleId,
        transaction_id: TransactionId,
        vessel_id: VesselId,
        message: &str,
    ) -> Result<ApprovalEvent> {
        self.gateway
            .reject(ChainKey::new(transaction_id, sub_module), vessel_id, message)
    }

    pub fn approve(
        &self,
        sub_module: SubModuleId,
        transaction_id: TransactionId,
        vessel_id: VesselId,
        message: &str,
    ) -> Result<ApprovalEvent> {
        self.gateway
            .approve(ChainKey::new(transaction_id, sub_module), vessel_id, message)
    }

    /// Every approval event of the chain, oldest first.
    pub fn history(
        &self,
        sub_module: SubModuleId,
        transaction_id: TransactionId,
    ) -> Result<Vec<ApprovalEvent>> {
        Ok(self
            .chains
            .read(&ChainKey::new(transaction_id, sub_module))?
            .map(|ctx| ctx.events)
            .unwrap_or_default())
    }

    pub fn chain_state(
        &self,
        sub_module: SubModuleId,
        transaction_id: TransactionId,
    ) -> Result<ChainState> {
        self.gateway
            .current_state(&ChainKey::new(transaction_id, sub_module))
    }
}
