//! Minibasin filter.
//!
//! Only minibasins whose importance rank (`ordem`) reaches a threshold are
//! published. The threshold and the matching cell set are resolved once per
//! invocation and reused for every dataset and time window.

use std::collections::HashSet;

use tracing::info;

use storage::SettingsStore;

use crate::error::Result;
use crate::extract::CellRecord;

/// Cached set of publishable cells, or a pass-through.
#[derive(Debug, Clone, PartialEq)]
pub struct MinibasinFilter {
    threshold: Option<i16>,
    allowed: Option<HashSet<i16>>,
}

impl MinibasinFilter {
    /// A filter that keeps every row.
    pub fn pass_through() -> Self {
        Self {
            threshold: None,
            allowed: None,
        }
    }

    /// A filter keeping exactly `cells`.
    pub fn with_cells(threshold: i16, cells: impl IntoIterator<Item = i16>) -> Self {
        Self {
            threshold: Some(threshold),
            allowed: Some(cells.into_iter().collect()),
        }
    }

    /// Resolve the threshold and load the matching cells.
    ///
    /// The threshold is the command-line value, else the configuration
    /// record's `max_ordem`, else `default`. Without any of them the filter
    /// passes everything through.
    pub async fn resolve(
        cli_threshold: Option<i16>,
        settings: &dyn SettingsStore,
        default: Option<i16>,
    ) -> Result<Self> {
        let threshold = match cli_threshold {
            Some(t) => Some(t),
            None => settings
                .load_config()
                .await?
                .and_then(|config| config.max_ordem)
                .or(default),
        };

        let Some(threshold) = threshold else {
            info!("No ordem threshold configured, publishing every cell");
            return Ok(Self::pass_through());
        };

        let cells = settings.minibasins_with_min_ordem(threshold).await?;
        info!(threshold, cells = cells.len(), "Filtering cells by minibasin ordem");
        Ok(Self::with_cells(threshold, cells))
    }

    pub fn threshold(&self) -> Option<i16> {
        self.threshold
    }

    pub fn is_pass_through(&self) -> bool {
        self.allowed.is_none()
    }

    pub fn allows(&self, cell_id: i16) -> bool {
        match &self.allowed {
            Some(cells) => cells.contains(&cell_id),
            None => true,
        }
    }

    /// Keep the records whose cell is allowed, order preserved.
    pub fn apply<R: CellRecord>(&self, records: Vec<R>) -> Vec<R> {
        if self.is_pass_through() {
            return records;
        }
        records.into_iter().filter(|r| self.allows(r.cell_id())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::CellValue;

    struct Cell(i16);

    impl CellRecord for Cell {
        fn cell_id(&self) -> i16 {
            self.0
        }

        fn to_row(&self) -> Vec<CellValue> {
            vec![CellValue::SmallInt(self.0)]
        }
    }

    #[test]
    fn test_pass_through_keeps_everything() {
        let filter = MinibasinFilter::pass_through();
        let kept = filter.apply(vec![Cell(1), Cell(2)]);
        assert_eq!(kept.len(), 2);
        assert_eq!(filter.threshold(), None);
    }

    #[test]
    fn test_apply_keeps_allowed_cells_in_order() {
        let filter = MinibasinFilter::with_cells(5, [4, 2]);
        let kept: Vec<i16> = filter
            .apply(vec![Cell(1), Cell(2), Cell(3), Cell(4)])
            .iter()
            .map(|c| c.0)
            .collect();
        assert_eq!(kept, vec![2, 4]);
    }

    #[test]
    fn test_empty_allowed_set_drops_everything() {
        let filter = MinibasinFilter::with_cells(99, []);
        assert!(filter.apply(vec![Cell(1)]).is_empty());
        assert!(!filter.is_pass_through());
    }
}
