//! Paginated upsert of extracted time windows.
//!
//! Windows are accumulated into pages of `page_size` windows; each page is
//! written in one transaction. A page that fails to write is logged and
//! counted, and publishing carries on with the next page. The caller turns
//! the error count into the watermark update.

use std::time::Instant;

use tracing::{debug, error, info};

use hydro_common::jd_to_datetime;
use storage::{CellValue, UpsertSink, UpsertTarget};

use crate::error::{IngestionError, Result};
use crate::extract::CellRecord;
use crate::resolver::{time_range, TimeEntry};

/// Rows extracted from one time window.
#[derive(Debug, Clone, PartialEq)]
pub struct RowBatch {
    pub entry: TimeEntry,
    pub rows: Vec<Vec<CellValue>>,
}

impl RowBatch {
    pub fn from_records<R: CellRecord>(entry: TimeEntry, records: &[R]) -> Self {
        Self {
            entry,
            rows: records.iter().map(|r| r.to_row()).collect(),
        }
    }
}

/// Outcome of publishing a work set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PublishReport {
    /// Number of pages that failed to write
    pub errors: u32,
    /// Number of pages attempted
    pub flushes: usize,
    /// Number of time windows consumed
    pub windows: usize,
    /// Rows affected by successful pages
    pub rows_written: u64,
    /// Rows in pages that failed
    pub rows_failed: usize,
}

/// Writes row batches to one destination, `page_size` batches per
/// transaction.
pub struct PagedPublisher<'a> {
    sink: &'a dyn UpsertSink,
    target: &'a UpsertTarget,
    page_size: usize,
}

impl<'a> PagedPublisher<'a> {
    pub fn new(sink: &'a dyn UpsertSink, target: &'a UpsertTarget, page_size: usize) -> Result<Self> {
        if page_size == 0 {
            return Err(IngestionError::InvalidConfig(
                "commit page size must be >= 1".to_string(),
            ));
        }
        Ok(Self {
            sink,
            target,
            page_size,
        })
    }

    /// Publish every batch produced by `batches`.
    ///
    /// A page is flushed once `page_size` batches were appended since the
    /// previous flush, or when the last batch was appended. Batches are
    /// pulled one at a time, after the previous page has been flushed, so
    /// only one page of rows is held in memory. An `Err` from the iterator
    /// aborts publishing and is returned as is.
    pub async fn publish<I>(&self, batches: I) -> Result<PublishReport>
    where
        I: IntoIterator<Item = Result<RowBatch>>,
        I::IntoIter: ExactSizeIterator,
    {
        let mut batches = batches.into_iter();
        let mut report = PublishReport::default();
        let mut page_rows: Vec<Vec<CellValue>> = Vec::new();
        let mut page_entries: Vec<TimeEntry> = Vec::with_capacity(self.page_size);

        loop {
            let started = Instant::now();
            let Some(batch) = batches.next() else {
                break;
            };
            let batch = batch?;
            debug!(
                table = %self.target.table(),
                index = batch.entry.index,
                time_jd = batch.entry.time_jd,
                rows = batch.rows.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Prepared time window"
            );

            report.windows += 1;
            page_entries.push(batch.entry);
            page_rows.extend(batch.rows);

            let is_last = batches.len() == 0;
            if page_entries.len() >= self.page_size || is_last {
                self.flush(&page_entries, &page_rows, &mut report).await;
                page_entries.clear();
                page_rows.clear();
            }
        }

        Ok(report)
    }

    async fn flush(&self, entries: &[TimeEntry], rows: &[Vec<CellValue>], report: &mut PublishReport) {
        let table = self.target.table();
        let (first_jd, last_jd) = time_range(entries).unwrap_or((f64::NAN, f64::NAN));
        report.flushes += 1;

        if rows.is_empty() {
            debug!(table = %table, first_jd, last_jd, "Nothing to write for page");
            return;
        }

        match self.sink.upsert(self.target, rows).await {
            Ok(affected) => {
                report.rows_written += affected;
                info!(
                    table = %table,
                    first_jd,
                    last_jd,
                    last_date = ?jd_to_datetime(last_jd),
                    windows = entries.len(),
                    rows = affected,
                    "Published page"
                );
            }
            Err(e) => {
                report.errors += 1;
                report.rows_failed += rows.len();
                error!(
                    table = %table,
                    first_jd,
                    last_jd,
                    windows = entries.len(),
                    database = e.is_database(),
                    error = %e,
                    "Failed to publish page"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use hydro_common::HydroResult;
    use storage::SqlIdent;

    struct NullSink;

    #[async_trait]
    impl UpsertSink for NullSink {
        async fn upsert(&self, _target: &UpsertTarget, rows: &[Vec<CellValue>]) -> HydroResult<u64> {
            Ok(rows.len() as u64)
        }
    }

    fn target() -> UpsertTarget {
        let ident = |s: &str| SqlIdent::new(s).unwrap();
        UpsertTarget::new(ident("t"), vec![ident("cell_id")], vec![ident("cell_id")]).unwrap()
    }

    fn batch(index: usize, cells: i16) -> Result<RowBatch> {
        Ok(RowBatch {
            entry: TimeEntry::new(index, index as f64, index as f64),
            rows: (1..=cells).map(|c| vec![CellValue::SmallInt(c)]).collect(),
        })
    }

    #[test]
    fn test_zero_page_size_rejected() {
        let target = target();
        assert!(PagedPublisher::new(&NullSink, &target, 0).is_err());
    }

    #[tokio::test]
    async fn test_trailing_partial_page_is_flushed() {
        let target = target();
        let publisher = PagedPublisher::new(&NullSink, &target, 2).unwrap();
        let report = publisher
            .publish(vec![batch(0, 3), batch(1, 3), batch(2, 3)])
            .await
            .unwrap();

        assert_eq!(report.windows, 3);
        assert_eq!(report.flushes, 2);
        assert_eq!(report.rows_written, 9);
        assert_eq!(report.errors, 0);
    }

    #[tokio::test]
    async fn test_empty_work_set_flushes_nothing() {
        let target = target();
        let publisher = PagedPublisher::new(&NullSink, &target, 1).unwrap();
        let report = publisher.publish(Vec::<Result<RowBatch>>::new()).await.unwrap();
        assert_eq!(report, PublishReport::default());
    }
}
