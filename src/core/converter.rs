//! Currency conversion over a loaded rate table.
//!
//! A converter holds its table as an immutable snapshot. Reloading builds a
//! whole new snapshot and swaps it in, so readers never observe a partially
//! loaded table and in-flight conversions finish on the snapshot they started
//! with.

use crate::core::bounds::{Bounds, BoundsIndex};
use crate::core::config::ConverterOptions;
use crate::core::currency::Currency;
use crate::core::error::{ConverterError, Result};
use crate::core::fallback::{FallbackNotice, FallbackResolver, Resolved};
use crate::core::rate::Rate;
use crate::core::table::{RateTable, RateTableBuilder};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone};
use std::collections::BTreeSet;
use std::io::Read;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

/// Anything carrying a calendar date. Time of day is discarded.
pub trait AsDate {
    fn as_date(&self) -> NaiveDate;
}

impl AsDate for NaiveDate {
    fn as_date(&self) -> NaiveDate {
        *self
    }
}

impl AsDate for NaiveDateTime {
    fn as_date(&self) -> NaiveDate {
        self.date()
    }
}

impl<Tz: TimeZone> AsDate for DateTime<Tz> {
    fn as_date(&self) -> NaiveDate {
        self.date_naive()
    }
}

impl<T: AsDate + ?Sized> AsDate for &T {
    fn as_date(&self) -> NaiveDate {
        (**self).as_date()
    }
}

/// Result of a conversion, with the fallbacks applied to either leg.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversion<R> {
    pub amount: R,
    pub date: NaiveDate,
    pub notices: Vec<FallbackNotice<R>>,
}

/// One immutable table together with its bounds.
#[derive(Debug)]
pub struct RateSnapshot<R> {
    base: Currency,
    table: RateTable<R>,
    bounds: BoundsIndex,
}

impl<R: Rate> RateSnapshot<R> {
    pub fn new(base: Currency, table: RateTable<R>, bounds: BoundsIndex) -> Self {
        RateSnapshot {
            base,
            table,
            bounds,
        }
    }

    pub fn table(&self) -> &RateTable<R> {
        &self.table
    }

    pub fn bounds(&self, currency: &str) -> Result<Bounds> {
        self.bounds.bounds(currency)
    }

    pub fn bounds_index(&self) -> &BoundsIndex {
        &self.bounds
    }

    /// All known currencies, the base currency included.
    pub fn currencies(&self) -> BTreeSet<Currency> {
        self.table
            .currencies()
            .cloned()
            .chain(std::iter::once(self.base.clone()))
            .collect()
    }

    pub fn contains(&self, currency: &str) -> bool {
        self.base == currency || self.table.series(currency).is_some()
    }

    fn ensure_known(&self, currency: &str) -> Result<()> {
        if self.contains(currency) {
            Ok(())
        } else {
            Err(ConverterError::UnknownCurrency(currency.to_string()))
        }
    }

    /// Rate of `currency` on `date`. The base currency is always exactly one.
    pub fn resolve(
        &self,
        resolver: &FallbackResolver,
        currency: &str,
        date: NaiveDate,
    ) -> Result<Resolved<R>> {
        if self.base == currency {
            return Ok(Resolved {
                rate: R::one(),
                date,
                notices: Vec::new(),
            });
        }
        let (currency, series) = self
            .table
            .lookup(currency)
            .ok_or_else(|| ConverterError::UnknownCurrency(currency.to_string()))?;
        let bounds = self.bounds.bounds(currency.as_str())?;
        resolver.resolve(currency, series, bounds, date)
    }

    pub fn convert(
        &self,
        resolver: &FallbackResolver,
        amount: R,
        from: &str,
        to: &str,
        date: NaiveDate,
    ) -> Result<Conversion<R>> {
        self.ensure_known(from)?;
        self.ensure_known(to)?;

        if from == to {
            return Ok(Conversion {
                amount,
                date,
                notices: Vec::new(),
            });
        }

        let from_rate = self.resolve(resolver, from, date)?;
        let to_rate = self.resolve(resolver, to, date)?;
        let converted = amount
            .checked_mul(to_rate.rate)
            .and_then(|v| v.checked_div(from_rate.rate))
            .ok_or_else(|| {
                ConverterError::Overflow(format!("converting {amount} {from} to {to}"))
            })?;
        debug!(
            "Converted {amount} {from} to {converted} {to} on {date} (rates {} / {})",
            from_rate.rate, to_rate.rate
        );

        let mut notices = from_rate.notices;
        notices.extend(to_rate.notices);
        Ok(Conversion {
            amount: converted,
            date,
            notices,
        })
    }
}

/// Converts amounts between any two currencies of a loaded table, through the
/// base currency.
#[derive(Debug)]
pub struct CurrencyConverter<R> {
    options: ConverterOptions,
    resolver: FallbackResolver,
    snapshot: RwLock<Arc<RateSnapshot<R>>>,
}

impl<R: Rate> CurrencyConverter<R> {
    pub fn from_snapshot(snapshot: RateSnapshot<R>, options: ConverterOptions) -> Self {
        CurrencyConverter {
            resolver: options.resolver(),
            options,
            snapshot: RwLock::new(Arc::new(snapshot)),
        }
    }

    pub fn from_reader<Rd: Read>(source: Rd, options: ConverterOptions) -> Result<Self> {
        let snapshot = Self::load_readers(std::iter::once(source), &options)?;
        Ok(Self::from_snapshot(snapshot, options))
    }

    /// Loads and merges files in order; the first recorded rate for a date wins.
    pub fn from_paths<I, P>(paths: I, options: ConverterOptions) -> Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let snapshot = Self::load_paths(paths, &options)?;
        Ok(Self::from_snapshot(snapshot, options))
    }

    /// A builder configured with the base currency and missing markers of
    /// `options`, for callers that add sources themselves.
    pub fn table_builder(options: &ConverterOptions) -> RateTableBuilder<R> {
        RateTableBuilder::new(options.ref_currency.clone())
            .with_na_values(options.na_values.iter().cloned())
    }

    pub fn from_builder(builder: RateTableBuilder<R>, options: ConverterOptions) -> Result<Self> {
        let snapshot = Self::finish(builder, &options)?;
        Ok(Self::from_snapshot(snapshot, options))
    }

    fn finish(builder: RateTableBuilder<R>, options: &ConverterOptions) -> Result<RateSnapshot<R>> {
        let (table, bounds) = builder.build()?;
        Ok(RateSnapshot::new(options.ref_currency.clone(), table, bounds))
    }

    fn load_readers<I, Rd>(sources: I, options: &ConverterOptions) -> Result<RateSnapshot<R>>
    where
        I: IntoIterator<Item = Rd>,
        Rd: Read,
    {
        let mut builder = Self::table_builder(options);
        for source in sources {
            builder.add_reader(source)?;
        }
        Self::finish(builder, options)
    }

    fn load_paths<I, P>(paths: I, options: &ConverterOptions) -> Result<RateSnapshot<R>>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut builder = Self::table_builder(options);
        for path in paths {
            builder.add_path(path)?;
        }
        Self::finish(builder, options)
    }

    /// Replaces the active table with one loaded from `paths`. On error the
    /// active table is left untouched.
    pub fn reload<I, P>(&self, paths: I) -> Result<()>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let snapshot = Self::load_paths(paths, &self.options)?;
        self.swap(snapshot);
        Ok(())
    }

    pub fn reload_reader<Rd: Read>(&self, source: Rd) -> Result<()> {
        let snapshot = Self::load_readers(std::iter::once(source), &self.options)?;
        self.swap(snapshot);
        Ok(())
    }

    fn swap(&self, snapshot: RateSnapshot<R>) {
        let currencies = snapshot.table.len();
        let mut active = self
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *active = Arc::new(snapshot);
        info!("Reloaded rates for {currencies} currencies");
    }

    /// The active snapshot. It stays valid even if a reload happens meanwhile.
    pub fn snapshot(&self) -> Arc<RateSnapshot<R>> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn options(&self) -> &ConverterOptions {
        &self.options
    }

    pub fn base_currency(&self) -> &Currency {
        &self.options.ref_currency
    }

    pub fn currencies(&self) -> BTreeSet<Currency> {
        self.snapshot().currencies()
    }

    pub fn bounds(&self, currency: &str) -> Result<Bounds> {
        self.snapshot().bounds(currency)
    }

    /// Rate of `currency` against the base currency, falling back according
    /// to the configured policies.
    pub fn get_rate(&self, currency: &str, date: impl AsDate) -> Result<R> {
        Ok(self.resolve_rate(currency, date)?.rate)
    }

    /// Rate on the last date `currency` has data for.
    pub fn get_rate_latest(&self, currency: &str) -> Result<R> {
        let snapshot = self.snapshot();
        let date = snapshot.bounds(currency)?.last_date;
        Ok(snapshot.resolve(&self.resolver, currency, date)?.rate)
    }

    pub fn resolve_rate(&self, currency: &str, date: impl AsDate) -> Result<Resolved<R>> {
        self.snapshot()
            .resolve(&self.resolver, currency, date.as_date())
    }

    /// Converts `amount` of `from` into `to` using the rates of `date`.
    pub fn convert(&self, amount: R, from: &str, to: &str, date: impl AsDate) -> Result<R> {
        Ok(self.convert_detailed(amount, from, to, date)?.amount)
    }

    /// Converts using the last date `from` has data for.
    pub fn convert_latest(&self, amount: R, from: &str, to: &str) -> Result<R> {
        let snapshot = self.snapshot();
        let date = snapshot.bounds(from)?.last_date;
        Ok(snapshot
            .convert(&self.resolver, amount, from, to, date)?
            .amount)
    }

    pub fn convert_detailed(
        &self,
        amount: R,
        from: &str,
        to: &str,
        date: impl AsDate,
    ) -> Result<Conversion<R>> {
        self.snapshot()
            .convert(&self.resolver, amount, from, to, date.as_date())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, Utc};
    use rust_decimal::Decimal;

    const RATES: &str = "\
Date,USD,JPY,BGN,
2014-03-28,1.3759,140.9,1.9558,
2014-03-27,1.3758,140.55,N/A,
2014-03-26,1.3800,141.2,1.9558,
";

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn converter(options: ConverterOptions) -> CurrencyConverter<f64> {
        CurrencyConverter::from_reader(RATES.as_bytes(), options).unwrap()
    }

    #[test]
    fn test_as_date_discards_time() {
        let day = date(2014, 3, 28);
        let naive = day.and_time(NaiveTime::from_hms_opt(23, 59, 59).unwrap());
        assert_eq!(naive.as_date(), day);
        assert_eq!(Utc.from_utc_datetime(&naive).as_date(), day);
        assert_eq!((&day).as_date(), day);
    }

    #[test]
    fn test_currencies_include_base() {
        let c = converter(ConverterOptions::default());
        let codes: Vec<String> = c.currencies().into_iter().map(String::from).collect();
        assert_eq!(codes, vec!["BGN", "EUR", "JPY", "USD"]);
        assert_eq!(c.base_currency(), "EUR");
    }

    #[test]
    fn test_base_rate_is_one_on_any_date() {
        let c = converter(ConverterOptions::default());
        assert_eq!(c.get_rate("EUR", date(1900, 1, 1)).unwrap(), 1.0);
        assert_eq!(c.get_rate("EUR", date(2014, 3, 27)).unwrap(), 1.0);
    }

    #[test]
    fn test_convert_through_base() {
        let c = converter(ConverterOptions::default());
        let day = date(2014, 3, 28);
        assert!((c.convert(100.0, "EUR", "USD", day).unwrap() - 137.59).abs() < 1e-9);
        assert!((c.convert(100.0, "USD", "EUR", day).unwrap() - 72.679700559634).abs() < 1e-9);
        let cross = c.convert(100.0, "USD", "JPY", day).unwrap();
        assert!((cross - 100.0 * 140.9 / 1.3759).abs() < 1e-9);
    }

    #[test]
    fn test_same_currency_short_circuits() {
        let c = converter(ConverterOptions::default());
        // BGN has no rate on the 27th and the 1st is out of bounds
        assert_eq!(c.convert(42.0, "BGN", "BGN", date(2014, 3, 27)).unwrap(), 42.0);
        assert_eq!(c.convert(42.0, "BGN", "BGN", date(2014, 3, 1)).unwrap(), 42.0);
        assert!(c.convert(42.0, "BGN", "EUR", date(2014, 3, 27)).is_err());
    }

    #[test]
    fn test_unknown_currency_everywhere() {
        let c = converter(ConverterOptions::default());
        let day = date(2014, 3, 28);
        for err in [
            c.convert(1.0, "AAA", "EUR", day).unwrap_err(),
            c.convert(1.0, "EUR", "AAA", day).unwrap_err(),
            c.convert(1.0, "AAA", "AAA", day).unwrap_err(),
            c.get_rate("AAA", day).unwrap_err(),
            c.get_rate_latest("AAA").unwrap_err(),
            c.bounds("AAA").unwrap_err(),
            c.convert_latest(1.0, "AAA", "EUR").unwrap_err(),
        ] {
            assert!(matches!(err, ConverterError::UnknownCurrency(ref code) if code == "AAA"));
        }
    }

    #[test]
    fn test_latest_uses_last_date_of_source_currency() {
        let c = converter(ConverterOptions::default());
        assert_eq!(c.get_rate_latest("USD").unwrap(), 1.3759);
        assert!((c.convert_latest(100.0, "USD", "EUR").unwrap() - 72.679700559634).abs() < 1e-9);
    }

    #[test]
    fn test_conversion_collects_notices_of_both_legs() {
        let options = ConverterOptions::default()
            .with_fallbacks(crate::core::fallback::MissingRateMethod::LastKnown);
        let c = converter(options);
        let conversion = c
            .convert_detailed(10.0, "BGN", "USD", date(2014, 3, 27))
            .unwrap();
        assert_eq!(conversion.notices.len(), 1);
        assert!((conversion.amount - 10.0 * 1.3758 / 1.9558).abs() < 1e-9);

        let conversion = c
            .convert_detailed(10.0, "BGN", "USD", date(2020, 1, 1))
            .unwrap();
        assert_eq!(conversion.notices.len(), 2);
    }

    #[test]
    fn test_decimal_overflow_is_an_error() {
        let c: CurrencyConverter<Decimal> =
            CurrencyConverter::from_reader(RATES.as_bytes(), ConverterOptions::default()).unwrap();
        let err = c
            .convert(Decimal::MAX, "EUR", "JPY", date(2014, 3, 28))
            .unwrap_err();
        assert!(matches!(err, ConverterError::Overflow(_)));
        assert!(err.to_string().starts_with("Arithmetic overflow while converting"));
        // the inverse direction shrinks the amount and stays representable
        assert!(c.convert(Decimal::MAX, "JPY", "EUR", date(2014, 3, 28)).is_ok());
    }

    #[test]
    fn test_reload_swaps_snapshot() {
        let c = converter(ConverterOptions::default());
        let before = c.snapshot();

        c.reload_reader("Date,GBP\n2015-01-02,0.78\n".as_bytes())
            .unwrap();

        assert!(c.bounds("USD").is_err());
        assert_eq!(c.get_rate("GBP", date(2015, 1, 2)).unwrap(), 0.78);
        // the old snapshot is still usable by whoever holds it
        assert!(before.contains("USD"));
        assert!(!c.snapshot().contains("USD"));
    }

    #[test]
    fn test_failed_reload_keeps_active_table() {
        let c = converter(ConverterOptions::default());
        assert!(c.reload_reader("Day,GBP\n".as_bytes()).is_err());
        assert_eq!(c.get_rate("USD", date(2014, 3, 28)).unwrap(), 1.3759);
    }
}
