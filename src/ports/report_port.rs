//! Run artifact port: trade log, equity curve and performance snapshot.

use std::path::Path;

use crate::domain::batch::BatchReport;
use crate::domain::engine::RunResult;
use crate::domain::error::ConfluenceError;
use crate::domain::metrics::Metrics;

pub trait ReportPort {
    fn write_run(
        &self,
        result: &RunResult,
        metrics: &Metrics,
        output_dir: &Path,
    ) -> Result<(), ConfluenceError>;

    fn write_batch(&self, report: &BatchReport, output_dir: &Path) -> Result<(), ConfluenceError>;
}
