use std::sync::Arc;

use crate::clock::Clock;
use crate::config::Config;
use crate::engine::{CycleService, SymptomService};
use crate::store::CycleStore;

pub struct AppState {
    pub config: Config,
    pub clock: Arc<dyn Clock>,
    pub cycles: CycleService,
    pub symptoms: SymptomService,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn CycleStore>, clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new(Self {
            config,
            cycles: CycleService::new(Arc::clone(&store)),
            symptoms: SymptomService::new(store),
            clock,
        })
    }
}
