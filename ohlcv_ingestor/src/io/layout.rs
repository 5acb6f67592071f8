//! Directory layout of the CSV working set.
//!
//! ```text
//! <base>/fetched_data/<TICKER>_<tf>.csv   last raw download per series
//! <base>/transf_data/<TICKER>_<tf>.csv    master files (the source of truth)
//! <base>/process_data/<TICKER>_<tf>.csv   rows appended by the latest merge
//! ```

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use tracing::warn;

use crate::models::{bar_series::SeriesKey, timeframe::Timeframe};

const FETCHED_DIR: &str = "fetched_data";
const TRANSF_DIR: &str = "transf_data";
const PROCESS_DIR: &str = "process_data";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLayout {
    base_folder: PathBuf,
}

impl DataLayout {
    pub fn new(base_folder: impl Into<PathBuf>) -> Self {
        Self {
            base_folder: base_folder.into(),
        }
    }

    pub fn base_folder(&self) -> &Path {
        &self.base_folder
    }

    pub fn fetched_dir(&self) -> PathBuf {
        self.base_folder.join(FETCHED_DIR)
    }

    pub fn transf_dir(&self) -> PathBuf {
        self.base_folder.join(TRANSF_DIR)
    }

    pub fn process_dir(&self) -> PathBuf {
        self.base_folder.join(PROCESS_DIR)
    }

    pub fn master_path(&self, key: &SeriesKey) -> PathBuf {
        self.transf_dir().join(file_name(key))
    }

    pub fn fetched_path(&self, key: &SeriesKey) -> PathBuf {
        self.fetched_dir().join(file_name(key))
    }

    pub fn process_path(&self, key: &SeriesKey) -> PathBuf {
        self.process_dir().join(file_name(key))
    }

    pub fn ensure_dirs(&self) -> io::Result<()> {
        for dir in [self.fetched_dir(), self.transf_dir(), self.process_dir()] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Master files in `transf_data`, sorted by key. A missing directory is
    /// an empty working set.
    pub fn list_master_files(&self) -> io::Result<Vec<(SeriesKey, PathBuf)>> {
        let dir = self.transf_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut out = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("csv") {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            match parse_file_name(name) {
                Some(key) => out.push((key, path)),
                None => warn!(file = %path.display(), "skipping file with unrecognised name"),
            }
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }
}

pub fn file_name(key: &SeriesKey) -> String {
    format!("{}_{}.csv", key.ticker, key.timeframe)
}

/// Parses `<TICKER>_<tf>.csv`, splitting on the last underscore so tickers
/// may contain underscores themselves.
pub fn parse_file_name(name: &str) -> Option<SeriesKey> {
    let stem = name.strip_suffix(".csv")?;
    let (ticker, tf) = stem.rsplit_once('_')?;
    if ticker.is_empty() {
        return None;
    }
    let timeframe: Timeframe = tf.parse().ok()?;
    Some(SeriesKey::new(ticker, timeframe))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_on_last_underscore() {
        let key = parse_file_name("BRK_B_1d.csv").unwrap();
        assert_eq!(key.ticker, "BRK_B");
        assert_eq!(key.timeframe, Timeframe::OneDay);

        assert_eq!(
            parse_file_name("^GSPC_15m.csv"),
            Some(SeriesKey::new("^GSPC", Timeframe::FifteenMinutes))
        );
        assert!(parse_file_name("AAPL_2h.csv").is_none());
        assert!(parse_file_name("AAPL.csv").is_none());
        assert!(parse_file_name("_1d.csv").is_none());
        assert!(parse_file_name("AAPL_1d.txt").is_none());
    }

    #[test]
    fn lists_only_recognised_masters() {
        let dir = tempfile::tempdir().unwrap();
        let layout = DataLayout::new(dir.path());
        assert!(layout.list_master_files().unwrap().is_empty());

        layout.ensure_dirs().unwrap();
        for name in ["MSFT_1h.csv", "AAPL_1d.csv", "notes.txt", "AAPL_3d.csv"] {
            fs::write(layout.transf_dir().join(name), "").unwrap();
        }

        let keys: Vec<String> = layout
            .list_master_files()
            .unwrap()
            .into_iter()
            .map(|(k, _)| k.to_string())
            .collect();
        assert_eq!(keys, vec!["AAPL_1d", "MSFT_1h"]);
    }
}
