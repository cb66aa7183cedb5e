//! Historical rate tables loaded from delimited reference-rate files.
//!
//! The expected layout is the one published by the European Central Bank:
//!
//! ```text
//! Date,USD,JPY,BGN,CYP,CZK,
//! 2014-03-28,1.3759,140.9,1.9558,N/A,27.423,
//! 2014-03-27,1.3758,140.55,1.9558,N/A,27.391,
//! ```
//!
//! Rates are expressed in currency units per base currency unit.

use crate::core::bounds::{Bounds, BoundsIndex};
use crate::core::currency::Currency;
use crate::core::error::{ConverterError, Result};
use crate::core::rate::Rate;
use chrono::NaiveDate;
use csv::StringRecord;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};
use zip::ZipArchive;
use zip::result::ZipError;

const DATE_LABEL: &str = "Date";

/// Parses a calendar date as written in the source files: `2014-03-28`, or
/// `28 March 2014` as used by the single-day files.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%d %B %Y"))
        .ok()
}

/// Dated rates of one currency. A `None` entry is a date the source
/// explicitly marked as missing.
#[derive(Debug, Clone, PartialEq)]
pub struct RateSeries<R> {
    points: BTreeMap<NaiveDate, Option<R>>,
}

impl<R> Default for RateSeries<R> {
    fn default() -> Self {
        RateSeries {
            points: BTreeMap::new(),
        }
    }
}

impl<R: Rate> RateSeries<R> {
    /// Recorded rate on exactly this date.
    pub fn get(&self, date: NaiveDate) -> Option<R> {
        self.points.get(&date).copied().flatten()
    }

    /// Nearest recorded rate strictly before `date`.
    pub fn last_before(&self, date: NaiveDate) -> Option<(NaiveDate, R)> {
        self.points
            .range(..date)
            .rev()
            .find_map(|(d, r)| r.map(|r| (*d, r)))
    }

    /// Nearest recorded rate strictly after `date`.
    pub fn first_after(&self, date: NaiveDate) -> Option<(NaiveDate, R)> {
        use std::ops::Bound::{Excluded, Unbounded};
        self.points
            .range((Excluded(date), Unbounded))
            .find_map(|(d, r)| r.map(|r| (*d, r)))
    }

    pub fn recorded(&self) -> impl DoubleEndedIterator<Item = (NaiveDate, R)> + '_ {
        self.points.iter().filter_map(|(d, r)| r.map(|r| (*d, r)))
    }

    pub fn bounds(&self) -> Option<Bounds> {
        let (first, _) = self.recorded().next()?;
        let (last, _) = self.recorded().next_back()?;
        Some(Bounds::new(first, last))
    }

    /// Calendar days within bounds without a recorded rate, whether the source
    /// marked them missing or skipped them entirely (weekends, holidays).
    pub fn missing_days(&self) -> i64 {
        self.bounds()
            .map_or(0, |b| b.days() - self.recorded().count() as i64)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Merges one entry. The first recorded rate for a date wins; a missing
    /// marker never replaces a recorded rate but is itself replaced by one.
    /// Returns false when a recorded rate was discarded.
    fn merge(&mut self, date: NaiveDate, rate: Option<R>) -> bool {
        match self.points.entry(date) {
            Entry::Vacant(entry) => {
                entry.insert(rate);
                true
            }
            Entry::Occupied(mut entry) => match (*entry.get(), rate) {
                (None, Some(_)) => {
                    entry.insert(rate);
                    true
                }
                (Some(_), Some(_)) => false,
                (_, None) => true,
            },
        }
    }
}

impl<R: Rate> FromIterator<(NaiveDate, Option<R>)> for RateSeries<R> {
    fn from_iter<I: IntoIterator<Item = (NaiveDate, Option<R>)>>(iter: I) -> Self {
        let mut series = RateSeries::default();
        for (date, rate) in iter {
            series.merge(date, rate);
        }
        series
    }
}

/// Immutable mapping from currency to its rate series.
#[derive(Debug, Clone)]
pub struct RateTable<R> {
    series: BTreeMap<Currency, RateSeries<R>>,
}

impl<R: Rate> RateTable<R> {
    /// Loads a single source with the default missing-value markers.
    pub fn load<Rd: Read>(source: Rd, base: &Currency) -> Result<(Self, BoundsIndex)> {
        let mut builder = RateTableBuilder::new(base.clone());
        builder.add_reader(source)?;
        builder.build()
    }

    /// Exact-date lookup, never falls back.
    pub fn get_rate(&self, currency: &str, date: NaiveDate) -> Option<R> {
        self.series.get(currency)?.get(date)
    }

    pub fn series(&self, currency: &str) -> Option<&RateSeries<R>> {
        self.series.get(currency)
    }

    pub(crate) fn lookup(&self, currency: &str) -> Option<(&Currency, &RateSeries<R>)> {
        self.series.get_key_value(currency)
    }

    pub fn currencies(&self) -> impl Iterator<Item = &Currency> {
        self.series.keys()
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

/// Accumulates one or more sources into a [`RateTable`].
///
/// When sources overlap, the first recorded rate for a currency and date wins.
pub struct RateTableBuilder<R> {
    base: Currency,
    na_values: HashSet<String>,
    series: BTreeMap<Currency, RateSeries<R>>,
    discarded: usize,
}

impl<R: Rate> RateTableBuilder<R> {
    pub fn new(base: Currency) -> Self {
        RateTableBuilder {
            base,
            na_values: ["", "N/A"].into_iter().map(String::from).collect(),
            series: BTreeMap::new(),
            discarded: 0,
        }
    }

    /// Replaces the tokens read as a missing rate.
    pub fn with_na_values<I, S>(mut self, na_values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.na_values = na_values
            .into_iter()
            .map(|v| v.into().trim().to_string())
            .collect();
        self
    }

    pub fn add_path<P: AsRef<Path>>(&mut self, path: P) -> Result<usize> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| ConverterError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Reading rates from {}", path.display());
        let is_archive = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"));
        let rows = if is_archive {
            self.add_archive(file, path)
        } else {
            self.add_reader(file)
        };
        rows.map_err(|e| match e {
            ConverterError::Format(reason) => {
                ConverterError::Format(format!("{}: {reason}", path.display()))
            }
            other => other,
        })
    }

    /// Reads every file in a zip archive, in archive order.
    fn add_archive(&mut self, file: File, path: &Path) -> Result<usize> {
        let archive_error = |source: ZipError| ConverterError::Archive {
            path: path.to_path_buf(),
            source,
        };
        let mut archive = ZipArchive::new(file).map_err(archive_error)?;

        let mut rows = 0;
        for i in 0..archive.len() {
            let entry = archive.by_index(i).map_err(archive_error)?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().to_string();
            debug!("Reading archive entry {name}");
            rows += self.add_reader(entry).map_err(|e| match e {
                ConverterError::Format(reason) => {
                    ConverterError::Format(format!("{name}: {reason}"))
                }
                other => other,
            })?;
        }
        Ok(rows)
    }

    /// Parses one source and merges it. Returns the number of data rows read.
    pub fn add_reader<Rd: Read>(&mut self, source: Rd) -> Result<usize> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(source);
        let mut records = reader.records();

        let header = records
            .next()
            .ok_or_else(|| ConverterError::Format("source is empty".to_string()))?
            .map_err(csv_error)?;
        let columns = self.parse_header(&header)?;

        let mut rows = 0;
        for record in records {
            let record = record.map_err(csv_error)?;
            self.parse_row(&record, &columns)?;
            rows += 1;
        }
        debug!(rows, columns = columns.len(), "Parsed rate source");
        Ok(rows)
    }

    /// Currency of each data column; `None` for the empty trailing column of
    /// ECB files.
    fn parse_header(&self, header: &StringRecord) -> Result<Vec<Option<Currency>>> {
        let line = line_of(header);
        let mut cells = header.iter();
        match cells.next() {
            Some(label) if label.eq_ignore_ascii_case(DATE_LABEL) => {}
            other => {
                return Err(ConverterError::format_at(
                    line,
                    format!("expected {DATE_LABEL:?} as first header, found {other:?}"),
                ));
            }
        }

        let mut seen = HashSet::new();
        cells
            .map(|cell| {
                if cell.is_empty() {
                    return Ok(None);
                }
                let currency: Currency = cell
                    .parse()
                    .map_err(|e| ConverterError::format_at(line, e))?;
                if currency == self.base {
                    return Err(ConverterError::format_at(
                        line,
                        format!("base currency {currency} cannot have a rate column"),
                    ));
                }
                if !seen.insert(currency.clone()) {
                    return Err(ConverterError::format_at(
                        line,
                        format!("duplicate column {currency}"),
                    ));
                }
                Ok(Some(currency))
            })
            .collect()
    }

    fn parse_row(&mut self, record: &StringRecord, columns: &[Option<Currency>]) -> Result<()> {
        let line = line_of(record);
        let date_cell = record.get(0).unwrap_or_default();
        let date = parse_date(date_cell).ok_or_else(|| {
            ConverterError::format_at(line, format!("invalid date {date_cell:?}"))
        })?;

        let values = record.len().saturating_sub(1);
        if values < columns.len() {
            return Err(ConverterError::format_at(
                line,
                format!("expected {} values, found {values}", columns.len()),
            ));
        }
        if record.iter().skip(1 + columns.len()).any(|c| !c.is_empty()) {
            return Err(ConverterError::format_at(
                line,
                format!("more values than the {} header columns", columns.len()),
            ));
        }

        for (column, cell) in columns.iter().zip(record.iter().skip(1)) {
            let Some(currency) = column else {
                continue;
            };
            let rate = if self.na_values.contains(cell) {
                None
            } else {
                let rate = R::parse_number(cell)
                    .filter(R::is_strictly_positive)
                    .ok_or_else(|| {
                        ConverterError::format_at(
                            line,
                            format!("invalid {currency} rate {cell:?}"),
                        )
                    })?;
                Some(rate)
            };
            let kept = self
                .series
                .entry(currency.clone())
                .or_default()
                .merge(date, rate);
            if !kept {
                self.discarded += 1;
            }
        }
        Ok(())
    }

    /// Finalises the table and derives its bounds. Currencies without a single
    /// recorded rate are dropped.
    pub fn build(self) -> Result<(RateTable<R>, BoundsIndex)> {
        if self.discarded > 0 {
            debug!(
                discarded = self.discarded,
                "Kept first recorded rate for duplicate dates"
            );
        }

        let mut series = BTreeMap::new();
        let mut bounds = Vec::new();
        for (currency, s) in self.series {
            match s.bounds() {
                Some(b) => {
                    bounds.push((currency.clone(), b));
                    series.insert(currency, s);
                }
                None => debug!("Dropping {currency}: no recorded rate"),
            }
        }

        if series.is_empty() {
            return Err(ConverterError::Format(
                "source contains no rates".to_string(),
            ));
        }

        let points: usize = series.values().map(RateSeries::len).sum();
        info!(
            "Loaded {} {} rates for {} currencies against {}",
            points,
            R::NAME,
            series.len(),
            self.base
        );

        let index = BoundsIndex::new(bounds, &self.base);
        Ok((RateTable { series }, index))
    }
}

fn line_of(record: &StringRecord) -> u64 {
    record.position().map_or(0, |p| p.line())
}

fn csv_error(err: csv::Error) -> ConverterError {
    match err.position() {
        Some(pos) => ConverterError::format_at(pos.line(), &err),
        None => ConverterError::Format(err.to_string()),
    }
}
