//! Run-level quality report, written as JSON and as a Markdown summary.

use std::{
    collections::BTreeMap,
    fmt::Write as _,
    fs,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use ohlcv_ingestor::models::bar_series::BarSeries;
use serde::Serialize;
use thiserror::Error;

use crate::quality::finding::{Finding, FindingKind};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to write report {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode report: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Per-series row.
#[derive(Debug, Clone, Serialize)]
pub struct SeriesQuality {
    pub ticker: String,
    pub timeframe: String,
    pub records: usize,
    pub counts: BTreeMap<FindingKind, usize>,
    pub findings: Vec<Finding>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct QualityTotals {
    pub series: usize,
    pub records: usize,
    pub series_with_findings: usize,
    pub findings: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct QualityReport {
    pub generated_at: DateTime<Utc>,
    pub totals: QualityTotals,
    pub series: Vec<SeriesQuality>,
}

impl QualityReport {
    pub fn new(generated_at: DateTime<Utc>) -> Self {
        Self {
            generated_at,
            totals: QualityTotals::default(),
            series: Vec::new(),
        }
    }

    pub fn push(&mut self, series: &BarSeries, findings: Vec<Finding>) {
        let mut counts = BTreeMap::new();
        for f in &findings {
            *counts.entry(f.kind).or_insert(0) += 1;
        }
        self.totals.series += 1;
        self.totals.records += series.len();
        self.totals.findings += findings.len();
        if !findings.is_empty() {
            self.totals.series_with_findings += 1;
        }
        self.series.push(SeriesQuality {
            ticker: series.key.ticker.clone(),
            timeframe: series.key.timeframe.to_string(),
            records: series.len(),
            counts,
            findings,
        });
    }

    fn stem(&self) -> String {
        format!("quality_report_{}", self.generated_at.format("%Y%m%d_%H%M%S"))
    }

    pub fn to_json(&self) -> Result<String, ReportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_markdown(&self) -> String {
        let mut md = String::new();
        let _ = writeln!(md, "# Data quality report\n");
        let _ = writeln!(md, "Generated: {}\n", self.generated_at.to_rfc3339());
        let _ = writeln!(
            md,
            "- Series checked: {}\n- Records: {}\n- Series with findings: {}\n- Findings: {}\n",
            self.totals.series,
            self.totals.records,
            self.totals.series_with_findings,
            self.totals.findings
        );

        let header: Vec<&str> = FindingKind::ALL.iter().map(|k| k.label()).collect();
        let _ = writeln!(md, "| ticker | timeframe | records | {} |", header.join(" | "));
        let _ = writeln!(md, "|---|---|---:|{}", "---:|".repeat(header.len()));
        for row in &self.series {
            let cells: Vec<String> = FindingKind::ALL
                .iter()
                .map(|k| row.counts.get(k).copied().unwrap_or(0).to_string())
                .collect();
            let _ = writeln!(
                md,
                "| {} | {} | {} | {} |",
                row.ticker,
                row.timeframe,
                row.records,
                cells.join(" | ")
            );
        }

        for row in self.series.iter().filter(|r| !r.findings.is_empty()) {
            let _ = writeln!(md, "\n## {}_{}\n", row.ticker, row.timeframe);
            for f in &row.findings {
                let when = f
                    .timestamps
                    .iter()
                    .map(|t| t.to_rfc3339())
                    .collect::<Vec<_>>()
                    .join(", ");
                let _ = writeln!(md, "- **{}** [{when}]: {}", f.kind, f.detail);
            }
        }
        md
    }

    /// Writes `<stem>.json` and `<stem>.md` into `dir`, creating it if needed.
    /// Returns both paths.
    pub fn write_to(&self, dir: &Path) -> Result<(PathBuf, PathBuf), ReportError> {
        let io = |path: &Path| {
            let path = path.to_path_buf();
            move |source| ReportError::Io { path, source }
        };
        fs::create_dir_all(dir).map_err(io(dir))?;

        let json_path = dir.join(format!("{}.json", self.stem()));
        fs::write(&json_path, self.to_json()?).map_err(io(&json_path))?;

        let md_path = dir.join(format!("{}.md", self.stem()));
        fs::write(&md_path, self.to_markdown()).map_err(io(&md_path))?;
        Ok((json_path, md_path))
    }
}
