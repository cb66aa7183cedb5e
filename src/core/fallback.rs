//! Fallback policies applied when an exact rate lookup misses.
//!
//! Two independent policies decide what happens on a miss:
//!
//! - [`WrongDatePolicy`] covers dates outside a currency's bounds. Snapping
//!   moves the date to the nearer bound and retries.
//! - [`MissingRatePolicy`] covers dates inside the bounds without a recorded
//!   rate (weekends, holidays, explicit `N/A`). Filling approximates the rate
//!   with one of the [`MissingRateMethod`]s.

use crate::core::bounds::Bounds;
use crate::core::currency::Currency;
use crate::core::error::{ConverterError, Result};
use crate::core::rate::Rate;
use crate::core::table::RateSeries;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WrongDatePolicy {
    #[default]
    Fail,
    SnapToBounds,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingRateMethod {
    #[default]
    LinearInterpolation,
    LastKnown,
}

impl Display for MissingRateMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                MissingRateMethod::LinearInterpolation => "linear_interpolation",
                MissingRateMethod::LastKnown => "last_known",
            }
        )
    }
}

impl FromStr for MissingRateMethod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "linear_interpolation" => Ok(MissingRateMethod::LinearInterpolation),
            "last_known" => Ok(MissingRateMethod::LastKnown),
            _ => Err(anyhow::anyhow!("Unknown fallback method {:?}", s)),
        }
    }
}

impl MissingRateMethod {
    /// Approximates the rate of `date`, which must lie strictly between two
    /// recorded points for interpolation, or after one for last-known.
    /// `Ok(None)` when the needed neighbours do not exist.
    fn fill<R: Rate>(
        &self,
        currency: &Currency,
        series: &RateSeries<R>,
        date: NaiveDate,
    ) -> Result<Option<(R, FallbackNotice<R>)>> {
        let Some((before, r0)) = series.last_before(date) else {
            return Ok(None);
        };
        let filled = match self {
            MissingRateMethod::LastKnown => (
                r0,
                FallbackNotice::LastKnown {
                    currency: currency.clone(),
                    date,
                    from: before,
                    rate: r0,
                },
            ),
            MissingRateMethod::LinearInterpolation => {
                let Some((after, r1)) = series.first_after(date) else {
                    return Ok(None);
                };
                let elapsed = R::from_days((date - before).num_days());
                let span = R::from_days((after - before).num_days());
                let rate = lerp(r0, r1, elapsed, span).ok_or_else(|| {
                    ConverterError::Overflow(format!("interpolating {currency} rate for {date}"))
                })?;
                (
                    rate,
                    FallbackNotice::Interpolated {
                        currency: currency.clone(),
                        date,
                        before: (before, r0),
                        after: (after, r1),
                        rate,
                    },
                )
            }
        };
        Ok(Some(filled))
    }
}

/// `r0 + (r1 - r0) * elapsed / span`, or `None` on overflow.
fn lerp<R: Rate>(r0: R, r1: R, elapsed: R, span: R) -> Option<R> {
    r1.checked_sub(r0)?
        .checked_mul(elapsed)?
        .checked_div(span)?
        .checked_add(r0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingRatePolicy {
    #[default]
    Fail,
    Fill(MissingRateMethod),
}

/// Record of one fallback applied while resolving a rate.
#[derive(Debug, Clone, PartialEq)]
pub enum FallbackNotice<R> {
    SnappedToBound {
        currency: Currency,
        requested: NaiveDate,
        used: NaiveDate,
        bounds: Bounds,
    },
    LastKnown {
        currency: Currency,
        date: NaiveDate,
        from: NaiveDate,
        rate: R,
    },
    Interpolated {
        currency: Currency,
        date: NaiveDate,
        before: (NaiveDate, R),
        after: (NaiveDate, R),
        rate: R,
    },
}

impl<R: Rate> Display for FallbackNotice<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FallbackNotice::SnappedToBound {
                currency,
                requested,
                used,
                bounds,
            } => write!(
                f,
                "{requested} not in {currency} bounds {bounds}, falling back to {used}"
            ),
            FallbackNotice::LastKnown {
                currency,
                date,
                from,
                rate,
            } => write!(
                f,
                "{currency}: filling {date} missing rate using {rate} from {from}"
            ),
            FallbackNotice::Interpolated {
                currency,
                date,
                before: (d0, r0),
                after: (d1, r1),
                ..
            } => write!(
                f,
                "{currency}: filling {date} missing rate using {r0} ({}d old) and {r1} ({}d later)",
                (*date - *d0).num_days(),
                (*d1 - *date).num_days()
            ),
        }
    }
}

/// A rate together with the fallbacks that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<R> {
    pub rate: R,
    /// Date the rate belongs to, after any snapping.
    pub date: NaiveDate,
    pub notices: Vec<FallbackNotice<R>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FallbackResolver {
    wrong_date: WrongDatePolicy,
    missing_rate: MissingRatePolicy,
    verbose: bool,
}

impl FallbackResolver {
    pub fn new(wrong_date: WrongDatePolicy, missing_rate: MissingRatePolicy) -> Self {
        FallbackResolver {
            wrong_date,
            missing_rate,
            verbose: false,
        }
    }

    /// Reports applied fallbacks at `info` level instead of `debug`.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn wrong_date_policy(&self) -> WrongDatePolicy {
        self.wrong_date
    }

    pub fn missing_rate_policy(&self) -> MissingRatePolicy {
        self.missing_rate
    }

    /// Resolves the rate of one currency on `date`: exact lookup first, then
    /// date snapping for out-of-bounds dates, then filling for missing rates.
    pub fn resolve<R: Rate>(
        &self,
        currency: &Currency,
        series: &RateSeries<R>,
        bounds: Bounds,
        date: NaiveDate,
    ) -> Result<Resolved<R>> {
        if let Some(rate) = series.get(date) {
            return Ok(Resolved {
                rate,
                date,
                notices: Vec::new(),
            });
        }

        let mut notices = Vec::new();
        let mut date = date;

        if !bounds.contains(date) {
            match self.wrong_date {
                WrongDatePolicy::Fail => {
                    return Err(ConverterError::DateOutOfBounds {
                        currency: currency.to_string(),
                        date,
                        bounds,
                    });
                }
                WrongDatePolicy::SnapToBounds => {
                    let used = bounds.nearest(date);
                    notices.push(self.notify(FallbackNotice::SnappedToBound {
                        currency: currency.clone(),
                        requested: date,
                        used,
                        bounds,
                    }));
                    date = used;
                    if let Some(rate) = series.get(date) {
                        return Ok(Resolved {
                            rate,
                            date,
                            notices,
                        });
                    }
                }
            }
        }

        let not_found = || ConverterError::RateNotFound {
            currency: currency.to_string(),
            date,
        };
        match self.missing_rate {
            MissingRatePolicy::Fail => Err(not_found()),
            MissingRatePolicy::Fill(method) => {
                let (rate, notice) = method
                    .fill(currency, series, date)?
                    .ok_or_else(not_found)?;
                notices.push(self.notify(notice));
                Ok(Resolved {
                    rate,
                    date,
                    notices,
                })
            }
        }
    }

    fn notify<R: Rate>(&self, notice: FallbackNotice<R>) -> FallbackNotice<R> {
        if self.verbose {
            info!("{notice}");
        } else {
            debug!("{notice}");
        }
        notice
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn bgn() -> Currency {
        "BGN".parse().unwrap()
    }

    /// 10.0 on the first of November, 20.0 on the 30th, a marked gap between.
    fn gap_series() -> (RateSeries<f64>, Bounds) {
        let series: RateSeries<f64> = vec![
            (date(2010, 11, 1), Some(10.0)),
            (date(2010, 11, 19), None),
            (date(2010, 11, 21), None),
            (date(2010, 11, 30), Some(20.0)),
        ]
        .into_iter()
        .collect();
        let bounds = series.bounds().unwrap();
        (series, bounds)
    }

    fn resolver(wrong_date: WrongDatePolicy, missing_rate: MissingRatePolicy) -> FallbackResolver {
        FallbackResolver::new(wrong_date, missing_rate)
    }

    #[test]
    fn test_method_parse_and_display() {
        for method in [
            MissingRateMethod::LinearInterpolation,
            MissingRateMethod::LastKnown,
        ] {
            assert_eq!(method.to_string().parse::<MissingRateMethod>().unwrap(), method);
        }
        assert_eq!(
            "LAST_KNOWN".parse::<MissingRateMethod>().unwrap(),
            MissingRateMethod::LastKnown
        );
        let err = "nearest".parse::<MissingRateMethod>().unwrap_err();
        assert!(err.to_string().contains("Unknown fallback method"));
    }

    #[test]
    fn test_exact_hit_has_no_notices() {
        let (series, bounds) = gap_series();
        let resolved = FallbackResolver::default()
            .resolve(&bgn(), &series, bounds, date(2010, 11, 30))
            .unwrap();
        assert_eq!(resolved.rate, 20.0);
        assert!(resolved.notices.is_empty());
    }

    #[test]
    fn test_missing_rate_fails_without_fallback() {
        let (series, bounds) = gap_series();
        let err = FallbackResolver::default()
            .resolve(&bgn(), &series, bounds, date(2010, 11, 21))
            .unwrap_err();
        assert_eq!(err.to_string(), "BGN has no rate for 2010-11-21");
        assert!(matches!(err, ConverterError::RateNotFound { .. }));
    }

    #[test]
    fn test_linear_interpolation() {
        let (series, bounds) = gap_series();
        let resolved = resolver(
            WrongDatePolicy::Fail,
            MissingRatePolicy::Fill(MissingRateMethod::LinearInterpolation),
        )
        .resolve(&bgn(), &series, bounds, date(2010, 11, 21))
        .unwrap();

        let expected = 10.0 + 10.0 * 20.0 / 29.0;
        assert!((resolved.rate - expected).abs() < 1e-12);
        assert!(resolved.rate > 10.0 && resolved.rate < 20.0);
        assert_eq!(resolved.date, date(2010, 11, 21));
        assert_eq!(
            resolved.notices[0].to_string(),
            "BGN: filling 2010-11-21 missing rate using 10 (20d old) and 20 (9d later)"
        );
    }

    #[test]
    fn test_linear_interpolation_decimal_is_exact() {
        let series: RateSeries<Decimal> = vec![
            (date(2010, 11, 1), Some(Decimal::new(10, 0))),
            (date(2010, 11, 11), Some(Decimal::new(20, 0))),
        ]
        .into_iter()
        .collect();
        let bounds = series.bounds().unwrap();
        let resolved = resolver(
            WrongDatePolicy::Fail,
            MissingRatePolicy::Fill(MissingRateMethod::LinearInterpolation),
        )
        .resolve(&bgn(), &series, bounds, date(2010, 11, 4))
        .unwrap();
        assert_eq!(resolved.rate, Decimal::new(13, 0));
    }

    #[test]
    fn test_last_known() {
        let (series, bounds) = gap_series();
        let resolver = resolver(
            WrongDatePolicy::Fail,
            MissingRatePolicy::Fill(MissingRateMethod::LastKnown),
        );
        for day in [2, 19, 21, 29] {
            let resolved = resolver
                .resolve(&bgn(), &series, bounds, date(2010, 11, day))
                .unwrap();
            assert_eq!(resolved.rate, 10.0);
        }
        let resolved = resolver
            .resolve(&bgn(), &series, bounds, date(2010, 11, 21))
            .unwrap();
        assert_eq!(
            resolved.notices,
            vec![FallbackNotice::LastKnown {
                currency: bgn(),
                date: date(2010, 11, 21),
                from: date(2010, 11, 1),
                rate: 10.0,
            }]
        );
    }

    #[test]
    fn test_last_known_guard_without_earlier_point() {
        let (series, _) = gap_series();
        // bounds wider than the series, so no earlier point exists
        let bounds = Bounds::new(date(2010, 10, 1), date(2010, 11, 30));
        let err = resolver(
            WrongDatePolicy::Fail,
            MissingRatePolicy::Fill(MissingRateMethod::LastKnown),
        )
        .resolve(&bgn(), &series, bounds, date(2010, 10, 15))
        .unwrap_err();
        assert!(matches!(err, ConverterError::RateNotFound { .. }));
    }

    #[test]
    fn test_wrong_date_fails_without_fallback() {
        let (series, bounds) = gap_series();
        let resolver = resolver(
            WrongDatePolicy::Fail,
            MissingRatePolicy::Fill(MissingRateMethod::LastKnown),
        );
        for requested in [date(1986, 2, 2), date(2010, 12, 1)] {
            let err = resolver
                .resolve(&bgn(), &series, bounds, requested)
                .unwrap_err();
            match err {
                ConverterError::DateOutOfBounds {
                    currency,
                    date: d,
                    bounds: b,
                } => {
                    assert_eq!(currency, "BGN");
                    assert_eq!(d, requested);
                    assert_eq!(b, bounds);
                }
                other => panic!("unexpected error {other:?}"),
            }
        }
    }

    #[test]
    fn test_wrong_date_snaps_to_nearer_bound() {
        let (series, bounds) = gap_series();
        let resolver = resolver(WrongDatePolicy::SnapToBounds, MissingRatePolicy::Fail)
            .with_verbose(true);

        let before = resolver
            .resolve(&bgn(), &series, bounds, date(1986, 2, 2))
            .unwrap();
        assert_eq!(before.rate, 10.0);
        assert_eq!(before.date, bounds.first_date);
        assert_eq!(
            before.notices[0].to_string(),
            "1986-02-02 not in BGN bounds 2010-11-01/2010-11-30, falling back to 2010-11-01"
        );

        let after = resolver
            .resolve(&bgn(), &series, bounds, date(2024, 1, 1))
            .unwrap();
        assert_eq!(after.rate, 20.0);
        assert_eq!(after.date, bounds.last_date);
        assert_eq!(after.notices.len(), 1);
    }

    #[test]
    fn test_verbose_only_changes_reporting() {
        let (series, bounds) = gap_series();
        for method in [
            MissingRateMethod::LinearInterpolation,
            MissingRateMethod::LastKnown,
        ] {
            let quiet = resolver(WrongDatePolicy::SnapToBounds, MissingRatePolicy::Fill(method));
            let loud = quiet.with_verbose(true);
            for day in [date(2010, 11, 21), date(1986, 2, 2), date(2024, 1, 1)] {
                let a = quiet.resolve(&bgn(), &series, bounds, day).unwrap();
                let b = loud.resolve(&bgn(), &series, bounds, day).unwrap();
                assert_eq!(a, b, "{method} on {day}");
            }
        }
    }

    #[test]
    fn test_interpolation_overflow_is_an_error() {
        let series: RateSeries<Decimal> = vec![
            (date(2010, 11, 1), Some(Decimal::MAX)),
            (date(2010, 11, 11), Some(Decimal::ONE)),
        ]
        .into_iter()
        .collect();
        let bounds = series.bounds().unwrap();
        let err = resolver(
            WrongDatePolicy::Fail,
            MissingRatePolicy::Fill(MissingRateMethod::LinearInterpolation),
        )
        .resolve(&bgn(), &series, bounds, date(2010, 11, 4))
        .unwrap_err();
        assert!(matches!(err, ConverterError::Overflow(_)));
        assert_eq!(
            err.to_string(),
            "Arithmetic overflow while interpolating BGN rate for 2010-11-04"
        );
    }

    #[test]
    fn test_policies_are_independent() {
        let (series, bounds) = gap_series();
        // snapping enabled does not fill missing rates inside bounds
        let err = resolver(WrongDatePolicy::SnapToBounds, MissingRatePolicy::Fail)
            .resolve(&bgn(), &series, bounds, date(2010, 11, 21))
            .unwrap_err();
        assert!(matches!(err, ConverterError::RateNotFound { .. }));
    }
}
