//! Configuration record and minibasin ranks.
//!
//! Both are maintained by an administrator outside this pipeline and are
//! only ever read here.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use hydro_common::{DatasetKind, HydroResult};

/// Dataset assumed active when the configuration record does not say.
pub const DEFAULT_USE_DATASET: DatasetKind = DatasetKind::Assimilated;

/// The platform configuration record (latest row of `sagui_saguiconfig`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaguiConfig {
    /// Minibasins with `ordem` below this are not published
    pub max_ordem: Option<i16>,
    /// Dataset sibling subsystems use for station alerts
    pub use_dataset: DatasetKind,
}

/// Read access to the configuration record and minibasin ranks.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Latest configuration record, `None` when the table is empty.
    async fn load_config(&self) -> HydroResult<Option<SaguiConfig>>;

    /// Ids of the minibasins whose `ordem` is at least `min_ordem`.
    async fn minibasins_with_min_ordem(&self, min_ordem: i16) -> HydroResult<Vec<i16>>;
}
