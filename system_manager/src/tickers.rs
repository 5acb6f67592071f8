//! Ticker list loading.
//!
//! `ticker.json` groups symbols under arbitrary names:
//!
//! ```json
//! { "tech": ["AAPL", "MSFT"], "etf": ["SPY", "aapl"] }
//! ```
//!
//! Groups only exist for the reader's benefit; the service works on the
//! flattened, upper-cased, de-duplicated list in file order.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TickerFileError {
    #[error("failed to read ticker file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid ticker file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TickerFile {
    Groups(IndexMap<String, Vec<String>>),
    Flat(Vec<String>),
}

pub fn load_tickers(path: &Path) -> Result<Vec<String>, TickerFileError> {
    let raw = std::fs::read_to_string(path).map_err(|source| TickerFileError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_tickers(&raw).map_err(|source| TickerFileError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

pub fn parse_tickers(raw: &str) -> Result<Vec<String>, serde_json::Error> {
    let lists: Vec<Vec<String>> = match serde_json::from_str::<TickerFile>(raw)? {
        TickerFile::Groups(groups) => groups.into_values().collect(),
        TickerFile::Flat(list) => vec![list],
    };

    let mut out: Vec<String> = Vec::new();
    for ticker in lists.into_iter().flatten() {
        let ticker = ticker.trim().to_ascii_uppercase();
        if !ticker.is_empty() && !out.contains(&ticker) {
            out.push(ticker);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_are_flattened_in_file_order() {
        let tickers =
            parse_tickers(r#"{"tech": ["AAPL", "msft"], "etf": ["SPY", "aapl", " "]}"#).unwrap();
        assert_eq!(tickers, vec!["AAPL", "MSFT", "SPY"]);
    }

    #[test]
    fn a_plain_list_is_accepted() {
        assert_eq!(parse_tickers(r#"["qqq", "QQQ"]"#).unwrap(), vec!["QQQ"]);
    }

    #[test]
    fn wrong_shape_is_an_error() {
        assert!(parse_tickers(r#"{"tech": "AAPL"}"#).is_err());
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = load_tickers(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.json"));
    }
}
