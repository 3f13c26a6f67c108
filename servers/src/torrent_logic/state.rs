use lib_common::configs::EngineConfig;
use lib_common::core::Registry;
use lib_common::error::ConfigError;
use lib_common::ingestors::{TaxonomyService, TorrentService, TransferService};
use lib_common::push::StreamServices;
use std::sync::Arc;

/// Shared by the upstream pollers and the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub services: StreamServices,
    // clientId -> listener set of the live stream
    pub registry: Arc<Registry>,
}

impl AppState {
    pub fn new(engine: &EngineConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            services: StreamServices {
                torrents: Arc::new(TorrentService::new()),
                taxonomy: Arc::new(TaxonomyService::new()),
                transfer: Arc::new(TransferService::new(engine)?),
            },
            registry: Arc::new(Registry::new()),
        })
    }
}
