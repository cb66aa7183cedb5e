//! Error types for rate loading and conversion

use crate::core::bounds::Bounds;
use chrono::NaiveDate;
use std::fmt::Display;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConverterError {
    #[error("Malformed rate source: {0}")]
    Format(String),

    #[error("{0} is not a supported currency")]
    UnknownCurrency(String),

    #[error("{date} not in {currency} bounds {bounds}")]
    DateOutOfBounds {
        currency: String,
        date: NaiveDate,
        bounds: Bounds,
    },

    #[error("{currency} has no rate for {date}")]
    RateNotFound { currency: String, date: NaiveDate },

    #[error("Arithmetic overflow while {0}")]
    Overflow(String),

    #[error("Failed to read archive {}: {source}", path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("Failed to read rate source {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ConverterError {
    pub(crate) fn format_at(line: u64, reason: impl Display) -> Self {
        ConverterError::Format(format!("line {line}: {reason}"))
    }
}

pub type Result<T> = std::result::Result<T, ConverterError>;
