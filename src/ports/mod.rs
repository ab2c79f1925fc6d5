//! Port traits: the boundary between domain logic and storage/config.

pub mod config_port;
pub mod differential_port;
pub mod observation_port;
pub mod ranking_port;
pub mod return_metric_port;

use differential_port::DifferentialStore;
use observation_port::ObservationStore;
use ranking_port::RankingStore;
use return_metric_port::ReturnMetricStore;

/// One handle per store, usually all backed by the same adapter.
#[derive(Clone, Copy)]
pub struct Stores<'a> {
    pub observations: &'a dyn ObservationStore,
    pub differentials: &'a dyn DifferentialStore,
    pub metrics: &'a dyn ReturnMetricStore,
    pub rankings: &'a dyn RankingStore,
}

impl<'a> Stores<'a> {
    pub fn from_one<S>(store: &'a S) -> Self
    where
        S: ObservationStore + DifferentialStore + ReturnMetricStore + RankingStore,
    {
        Self {
            observations: store,
            differentials: store,
            metrics: store,
            rankings: store,
        }
    }
}
