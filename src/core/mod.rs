//! Rate loading, fallback resolution and conversion

pub mod bounds;
pub mod config;
pub mod converter;
pub mod currency;
pub mod error;
pub mod fallback;
pub mod log;
pub mod rate;
pub mod table;

// Re-export main types for cleaner imports
pub use bounds::{Bounds, BoundsIndex};
pub use config::{AppConfig, ConverterOptions};
pub use converter::{AsDate, Conversion, CurrencyConverter, RateSnapshot};
pub use currency::Currency;
pub use error::{ConverterError, Result};
pub use fallback::{
    FallbackNotice, FallbackResolver, MissingRateMethod, MissingRatePolicy, Resolved,
    WrongDatePolicy,
};
pub use rate::Rate;
pub use table::{RateSeries, RateTable, RateTableBuilder};
