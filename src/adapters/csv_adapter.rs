//! CSV observation reader.
//!
//! Expects a header row with `timestamp_utc`, `symbol`, `exchange` and
//! `funding_rate` columns in any order. Extra columns are ignored.

use crate::domain::error::FundingArbError;
use crate::domain::hour::parse_timestamp;
use crate::domain::observation::Observation;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const COLUMNS: [&str; 4] = ["timestamp_utc", "symbol", "exchange", "funding_rate"];

pub struct CsvAdapter {
    base_path: PathBuf,
}

fn io_err(path: &Path, e: io::Error) -> FundingArbError {
    FundingArbError::Io(io::Error::new(e.kind(), format!("{}: {e}", path.display())))
}

fn csv_err(path: &Path, e: impl std::fmt::Display) -> FundingArbError {
    FundingArbError::Io(io::Error::new(
        io::ErrorKind::InvalidData,
        format!("{}: {e}", path.display()),
    ))
}

impl CsvAdapter {
    /// `base_path` may be a single file or a directory of `*.csv` files.
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    pub fn files(&self) -> Result<Vec<PathBuf>, FundingArbError> {
        if self.base_path.is_file() {
            return Ok(vec![self.base_path.clone()]);
        }
        let entries = fs::read_dir(&self.base_path).map_err(|e| io_err(&self.base_path, e))?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| io_err(&self.base_path, e))?.path();
            if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("csv")) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    pub fn read_all(&self) -> Result<Vec<Observation>, FundingArbError> {
        let mut all = Vec::new();
        for path in self.files()? {
            all.extend(read_observations(&path)?);
        }
        Ok(all)
    }
}

/// Read one observation file. Rows with an unreadable timestamp or a blank
/// symbol/exchange are skipped; a malformed rate becomes a null rate.
pub fn read_observations(path: &Path) -> Result<Vec<Observation>, FundingArbError> {
    let content = fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers = rdr.headers().map_err(|e| csv_err(path, e))?.clone();
    let mut idx = [0usize; 4];
    for (slot, name) in idx.iter_mut().zip(COLUMNS) {
        *slot = headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(name))
            .ok_or_else(|| csv_err(path, format!("missing column {name}")))?;
    }
    let [ts_col, symbol_col, exchange_col, rate_col] = idx;

    let mut observations = Vec::new();
    let mut skipped = 0usize;

    for (line, result) in rdr.records().enumerate() {
        let record = result.map_err(|e| csv_err(path, e))?;
        let raw_ts = record.get(ts_col).unwrap_or_default();
        let symbol = record.get(symbol_col).unwrap_or_default();
        let exchange = record.get(exchange_col).unwrap_or_default();

        let Some(timestamp) = parse_timestamp(raw_ts) else {
            log::warn!("{}:{}: unreadable timestamp {raw_ts:?}, row skipped", path.display(), line + 2);
            skipped += 1;
            continue;
        };
        if symbol.is_empty() || exchange.is_empty() {
            log::warn!("{}:{}: missing symbol or exchange, row skipped", path.display(), line + 2);
            skipped += 1;
            continue;
        }

        observations.push(Observation::from_raw(
            timestamp,
            symbol.to_uppercase(),
            exchange.to_lowercase(),
            record.get(rate_col),
        ));
    }

    log::info!(
        "{}: {} observations read, {skipped} rows skipped",
        path.display(),
        observations.len()
    );
    Ok(observations)
}
