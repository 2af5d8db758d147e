//! Collaborators shared by every session of one engine.

use std::sync::Arc;

use fleet_core::{DomainResult, FleetConfig};
use fleet_protocol::{GameClient, NoDiscovery, PlayerDiscovery, Store};

use crate::scheduler::Scheduler;

/// Injected into the registry and from there into each session.
#[derive(Clone)]
pub struct EngineContext {
    pub client: Arc<dyn GameClient>,
    pub store: Arc<dyn Store>,
    pub discovery: Arc<dyn PlayerDiscovery>,
    pub config: Arc<FleetConfig>,
    pub scheduler: Scheduler,
}

impl EngineContext {
    /// Context with discovery reported as unsupported.
    ///
    /// Fails when `config` does not pass [`FleetConfig::validate`]; zero
    /// intervals would otherwise turn repeating timers into busy loops.
    pub fn new(
        client: Arc<dyn GameClient>,
        store: Arc<dyn Store>,
        config: FleetConfig,
    ) -> DomainResult<Self> {
        config.validate()?;
        Ok(Self {
            client,
            store,
            discovery: Arc::new(NoDiscovery),
            config: Arc::new(config),
            scheduler: Scheduler::new(),
        })
    }

    pub fn with_discovery(mut self, discovery: Arc<dyn PlayerDiscovery>) -> Self {
        self.discovery = discovery;
        self
    }
}

impl std::fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineContext")
            .field("config", &self.config)
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}
