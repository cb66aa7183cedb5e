//! First and last available date per currency

use crate::core::currency::Currency;
use crate::core::error::{ConverterError, Result};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Display;

/// Inclusive date range for which a currency has recorded rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Bounds {
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
}

impl Bounds {
    pub fn new(first_date: NaiveDate, last_date: NaiveDate) -> Self {
        debug_assert!(first_date <= last_date);
        Bounds {
            first_date,
            last_date,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.first_date <= date && date <= self.last_date
    }

    /// Number of calendar days covered, both ends included.
    pub fn days(&self) -> i64 {
        (self.last_date - self.first_date).num_days() + 1
    }

    /// The bound closest to a date lying outside the range.
    pub fn nearest(&self, date: NaiveDate) -> NaiveDate {
        if date < self.first_date {
            self.first_date
        } else if date > self.last_date {
            self.last_date
        } else {
            date
        }
    }

    fn union(&self, other: &Bounds) -> Bounds {
        Bounds::new(
            self.first_date.min(other.first_date),
            self.last_date.max(other.last_date),
        )
    }
}

impl Display for Bounds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.first_date, self.last_date)
    }
}

/// Bounds of every known currency, computed once per loaded table.
#[derive(Debug, Clone, Default)]
pub struct BoundsIndex {
    bounds: HashMap<Currency, Bounds>,
}

impl BoundsIndex {
    /// Builds the index from per-currency bounds. The base currency spans the
    /// union of all of them.
    pub(crate) fn new(
        per_currency: impl IntoIterator<Item = (Currency, Bounds)>,
        base: &Currency,
    ) -> Self {
        let mut bounds: HashMap<Currency, Bounds> = per_currency.into_iter().collect();
        if let Some(overall) = bounds.values().copied().reduce(|acc, b| acc.union(&b)) {
            bounds.insert(base.clone(), overall);
        }
        BoundsIndex { bounds }
    }

    pub fn bounds(&self, currency: &str) -> Result<Bounds> {
        self.bounds
            .get(currency)
            .copied()
            .ok_or_else(|| ConverterError::UnknownCurrency(currency.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Currency, &Bounds)> {
        self.bounds.iter()
    }
}
