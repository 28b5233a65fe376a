//! Return and risk statistics over an equity (price-like) series.
//!
//! Percent figures are rounded to two decimals. Functions return `None` when
//! the input is too short or a denominator is zero.

use chrono::{Datelike, NaiveDate};
use ordered_float::OrderedFloat;
use serde::Serialize;
use statrs::statistics::Statistics;

/// Trading days per year used when none is configured.
pub const YEAR_DAYS: u32 = 245;

/// Annual risk-free rate in percent used when none is configured.
pub const RISK_FREE_RATE: f64 = 3.0;

#[inline]
fn round_to(x: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (x * scale).round() / scale
}

/// Simple returns `p[t] / p[t-1] - 1`; one element shorter than `prices`.
pub fn to_returns(prices: &[f64]) -> Vec<f64> {
    prices.windows(2).map(|w| w[1] / w[0] - 1.0).collect()
}

/// Log returns `ln(p[t] / p[t-1])`.
pub fn to_log_returns(prices: &[f64]) -> Vec<f64> {
    prices.windows(2).map(|w| (w[1] / w[0]).ln()).collect()
}

/// Compound daily returns into a price index starting at `start`.
///
/// Non-finite returns count as zero.
pub fn to_price_index(returns: &[f64], start: f64) -> Vec<f64> {
    let mut level = start;
    returns
        .iter()
        .map(|r| {
            let r = if r.is_finite() { *r } else { 0.0 };
            level *= 1.0 + r;
            level
        })
        .collect()
}

/// Rescale a series so it starts at `value`.
pub fn rebase(prices: &[f64], value: f64) -> Vec<f64> {
    match prices.first() {
        Some(&first) if first != 0.0 => prices.iter().map(|p| p / first * value).collect(),
        _ => Vec::new(),
    }
}

/// Total return over the whole series, in percent.
pub fn total_return_pct(prices: &[f64]) -> Option<f64> {
    let (first, last) = (*prices.first()?, *prices.last()?);
    if first == 0.0 {
        return None;
    }
    Some(round_to(100.0 * (last / first - 1.0), 2))
}

/// Annualized return in percent, compounding over `year_days` per year.
pub fn annual_return_pct(prices: &[f64], year_days: u32) -> Option<f64> {
    if prices.len() < 2 || prices[0] == 0.0 {
        return None;
    }
    let periods = (prices.len() - 1) as f64;
    let growth = prices[prices.len() - 1] / prices[0];
    Some(round_to(
        100.0 * (growth.powf(year_days as f64 / periods) - 1.0),
        2,
    ))
}

/// Annualized volatility of simple returns in percent (population std-dev).
pub fn annual_vol_pct(prices: &[f64], year_days: u32) -> Option<f64> {
    let returns = to_returns(prices);
    if returns.is_empty() {
        return None;
    }
    let std_dev = returns.iter().population_std_dev();
    Some(round_to(100.0 * std_dev * (year_days as f64).sqrt(), 2))
}

/// Largest peak-to-trough decline in percent (zero or negative).
pub fn max_drawdown_pct(prices: &[f64]) -> Option<f64> {
    drawdown_fractions(prices)
        .into_iter()
        .map(OrderedFloat)
        .min()
        .map(|dd| round_to(dd.0 * 100.0, 2))
}

/// `(annual return - risk free) / annual vol`.
pub fn sharpe_ratio(prices: &[f64], year_days: u32, risk_free_rate: f64) -> Option<f64> {
    let ret = annual_return_pct(prices, year_days)?;
    let vol = annual_vol_pct(prices, year_days)?;
    if vol == 0.0 {
        return None;
    }
    Some(round_to((ret - risk_free_rate) / vol, 2))
}

/// `annual return / |max drawdown|`.
pub fn calmar_ratio(prices: &[f64], year_days: u32) -> Option<f64> {
    let ret = annual_return_pct(prices, year_days)?;
    let max_dd = max_drawdown_pct(prices)?;
    if max_dd == 0.0 {
        return None;
    }
    Some(round_to(ret / max_dd.abs(), 2))
}

fn drawdown_fractions(prices: &[f64]) -> Vec<f64> {
    let mut peak = f64::NEG_INFINITY;
    prices
        .iter()
        .map(|&p| {
            peak = peak.max(p);
            p / peak - 1.0
        })
        .collect()
}

/// Drawdown from the running peak at each point, in percent.
pub fn drawdown_series(prices: &[f64]) -> Vec<f64> {
    drawdown_fractions(prices)
        .into_iter()
        .map(|dd| round_to(dd * 100.0, 2))
        .collect()
}

/// One underwater period of an equity curve.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DrawdownPeriod {
    /// First date below the previous peak.
    pub start: NaiveDate,
    /// Date of the deepest point.
    pub valley: NaiveDate,
    /// Recovery date, or the last date if never recovered.
    pub end: NaiveDate,
    /// Calendar days from start to end.
    pub duration_days: i64,
    /// Deepest drawdown in percent (negative).
    pub drawdown_pct: f64,
}

/// Every drawdown period, deepest first.
///
/// `dates` and `prices` must be parallel.
pub fn drawdown_details(dates: &[NaiveDate], prices: &[f64]) -> Vec<DrawdownPeriod> {
    let dd = drawdown_series(prices);
    let n = dd.len().min(dates.len());
    let mut periods = Vec::new();
    let mut open: Option<usize> = None;

    let close_period = |start: usize, end: usize, periods: &mut Vec<DrawdownPeriod>| {
        let valley = (start..=end)
            .min_by_key(|&i| OrderedFloat(dd[i]))
            .unwrap_or(start);
        periods.push(DrawdownPeriod {
            start: dates[start],
            valley: dates[valley],
            end: dates[end],
            duration_days: (dates[end] - dates[start]).num_days(),
            drawdown_pct: dd[valley],
        });
    };

    for i in 0..n {
        match (open, dd[i] == 0.0) {
            (None, false) => open = Some(i),
            (Some(start), true) => {
                close_period(start, i, &mut periods);
                open = None;
            }
            _ => {}
        }
    }
    if let Some(start) = open {
        close_period(start, n - 1, &mut periods);
    }

    periods.sort_by_key(|p| OrderedFloat(p.drawdown_pct));
    periods
}

/// The `top` deepest drawdown periods.
pub fn worst_drawdowns(dates: &[NaiveDate], prices: &[f64], top: usize) -> Vec<DrawdownPeriod> {
    let mut periods = drawdown_details(dates, prices);
    periods.truncate(top);
    periods
}

/// Compounded return of one calendar month.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyReturn {
    pub year: i32,
    pub month: u32,
    /// Rounded to three decimals.
    pub ret: f64,
}

/// Compound daily returns into calendar months.
///
/// `dates[i]` is the date of `returns[i]`; dates must be ascending.
pub fn monthly_returns(dates: &[NaiveDate], returns: &[f64]) -> Vec<MonthlyReturn> {
    let mut months: Vec<MonthlyReturn> = Vec::new();
    let mut growth = 1.0;

    for (date, r) in dates.iter().zip(returns) {
        let key = (date.year(), date.month());
        if months.last().map_or(true, |m| (m.year, m.month) != key) {
            if let Some(m) = months.last_mut() {
                m.ret = round_to(growth - 1.0, 3);
            }
            growth = 1.0;
            months.push(MonthlyReturn { year: key.0, month: key.1, ret: 0.0 });
        }
        if r.is_finite() {
            growth *= 1.0 + r;
        }
    }
    if let Some(m) = months.last_mut() {
        m.ret = round_to(growth - 1.0, 3);
    }
    months
}

/// Headline statistics for one equity curve.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerformanceStats {
    pub total_return_pct: Option<f64>,
    pub annual_return_pct: Option<f64>,
    pub annual_vol_pct: Option<f64>,
    pub max_drawdown_pct: Option<f64>,
    pub sharpe_ratio: Option<f64>,
    pub calmar_ratio: Option<f64>,
}

impl PerformanceStats {
    pub fn compute(prices: &[f64], year_days: u32, risk_free_rate: f64) -> Self {
        Self {
            total_return_pct: total_return_pct(prices),
            annual_return_pct: annual_return_pct(prices, year_days),
            annual_vol_pct: annual_vol_pct(prices, year_days),
            max_drawdown_pct: max_drawdown_pct(prices),
            sharpe_ratio: sharpe_ratio(prices, year_days, risk_free_rate),
            calmar_ratio: calmar_ratio(prices, year_days),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, m, d).unwrap()
    }

    #[test]
    fn test_returns() {
        let r = to_returns(&[100.0, 110.0, 99.0]);
        assert_eq!(r.len(), 2);
        assert_relative_eq!(r[0], 0.10, epsilon = 1e-12);
        assert_relative_eq!(r[1], -0.10, epsilon = 1e-12);

        let lr = to_log_returns(&[100.0, 110.0]);
        assert_relative_eq!(lr[0], (1.1f64).ln(), epsilon = 1e-12);
    }

    #[test]
    fn test_price_index_and_rebase() {
        let idx = to_price_index(&[0.1, f64::NAN, -0.5], 100.0);
        assert_abs_diff_eq!(idx[0], 110.0, epsilon = 1e-9);
        assert_abs_diff_eq!(idx[1], 110.0, epsilon = 1e-9);
        assert_abs_diff_eq!(idx[2], 55.0, epsilon = 1e-9);

        assert_eq!(rebase(&[50.0, 75.0], 100.0), vec![100.0, 150.0]);
        assert!(rebase(&[], 100.0).is_empty());
    }

    #[test]
    fn test_total_and_annual_return() {
        let prices = [100.0, 105.0, 121.0];
        assert_eq!(total_return_pct(&prices), Some(21.0));
        // Two periods, two periods per year: exactly the total return.
        assert_eq!(annual_return_pct(&prices, 2), Some(21.0));
        // One period per year: sqrt(1.21) - 1 = 10%.
        assert_eq!(annual_return_pct(&prices, 1), Some(10.0));
        assert_eq!(annual_return_pct(&[100.0], 245), None);
    }

    #[test]
    fn test_annual_vol_uses_population_std() {
        // returns +10%, -10%: population std = 0.10
        let prices = [100.0, 110.0, 99.0];
        assert_eq!(annual_vol_pct(&prices, 4), Some(20.0));
        assert_eq!(annual_vol_pct(&[100.0], 4), None);
    }

    #[test]
    fn test_max_drawdown() {
        let prices = [100.0, 120.0, 90.0, 130.0, 117.0];
        assert_eq!(max_drawdown_pct(&prices), Some(-25.0));
        assert_eq!(max_drawdown_pct(&[]), None);
        assert_eq!(
            drawdown_series(&prices),
            vec![0.0, 0.0, -25.0, 0.0, -10.0]
        );
    }

    #[test]
    fn test_sharpe_and_calmar() {
        let flat = [100.0, 100.0, 100.0];
        assert_eq!(sharpe_ratio(&flat, 245, 3.0), None);
        assert_eq!(calmar_ratio(&flat, 245), None);

        let prices = [100.0, 110.0, 99.0];
        // annual return with 2 periods/year: -1%; vol with 4 days/year is 20%,
        // with 2 days/year sqrt(2) * 10 = 14.14%
        assert_eq!(annual_return_pct(&prices, 2), Some(-1.0));
        assert_eq!(sharpe_ratio(&prices, 2, 3.0), Some(round_to(-4.0 / 14.14, 2)));
        // max drawdown -10%
        assert_eq!(calmar_ratio(&prices, 2), Some(-0.1));
    }

    #[test]
    fn test_drawdown_details() {
        let dates = [
            date(1, 2),
            date(1, 3),
            date(1, 4),
            date(1, 5),
            date(1, 8),
            date(1, 9),
            date(1, 10),
        ];
        let prices = [100.0, 90.0, 95.0, 101.0, 80.0, 70.0, 75.0];

        let periods = drawdown_details(&dates, &prices);

        assert_eq!(periods.len(), 2);
        // Deepest first: 101 -> 70 never recovered.
        assert_eq!(periods[0].start, date(1, 8));
        assert_eq!(periods[0].valley, date(1, 9));
        assert_eq!(periods[0].end, date(1, 10));
        assert_eq!(periods[0].duration_days, 2);
        assert_relative_eq!(periods[0].drawdown_pct, -30.69);

        assert_eq!(periods[1].start, date(1, 3));
        assert_eq!(periods[1].valley, date(1, 3));
        assert_eq!(periods[1].end, date(1, 5));
        assert_eq!(periods[1].drawdown_pct, -10.0);

        assert_eq!(worst_drawdowns(&dates, &prices, 1).len(), 1);
        assert!(drawdown_details(&dates[..1], &prices[..1]).is_empty());
    }

    #[test]
    fn test_monthly_returns() {
        let dates = [date(1, 30), date(1, 31), date(2, 1), date(2, 2)];
        let returns = [0.1, 0.1, -0.5, 0.2];

        let months = monthly_returns(&dates, &returns);

        assert_eq!(months.len(), 2);
        assert_eq!((months[0].year, months[0].month), (2023, 1));
        assert_relative_eq!(months[0].ret, 0.21);
        assert_eq!((months[1].year, months[1].month), (2023, 2));
        assert_relative_eq!(months[1].ret, -0.4);
    }

    #[test]
    fn test_performance_stats_on_short_series() {
        let stats = PerformanceStats::compute(&[100.0], YEAR_DAYS, RISK_FREE_RATE);
        assert_eq!(stats.total_return_pct, Some(0.0));
        assert_eq!(stats.annual_return_pct, None);
        assert_eq!(stats.sharpe_ratio, None);
    }
}
