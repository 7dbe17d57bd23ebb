// src/backtest/metrics.rs
// Performance metrics calculation

use crate::backtest::types::{Allocation, BacktestMetrics, PartitionMetrics};

/// Calculate all backtest metrics from equity curve and returns
pub fn calculate_metrics(
    equity: &[f64],
    daily_returns: &[f64],
    benchmark_returns: &[f64],
    dates: &[String],
    trading_days_per_year: f64,
) -> BacktestMetrics {
    if equity.is_empty() || daily_returns.is_empty() {
        return BacktestMetrics::default();
    }

    let start_date = dates.first().cloned().unwrap_or_default();
    let end_date = dates.last().cloned().unwrap_or_default();
    let days = daily_returns.len() as u32;
    let years = days as f64 / trading_days_per_year;

    // Total return
    let final_equity = *equity.last().unwrap_or(&1.0);
    let total_return = final_equity - 1.0;

    // CAGR
    let cagr = if years > 0.0 {
        final_equity.powf(1.0 / years) - 1.0
    } else {
        0.0
    };

    let (mean_r, stddev_r) = mean_and_sample_stddev(daily_returns);

    // Volatility (annualized, sample stddev)
    let vol = stddev_r * trading_days_per_year.sqrt();

    // Max drawdown
    let max_drawdown = calculate_max_drawdown(equity);

    // Calmar ratio
    let calmar = if max_drawdown != 0.0 {
        cagr / max_drawdown.abs()
    } else {
        0.0
    };

    // Sharpe ratio (risk-free rate 0): annualized mean return over raw stddev of returns
    let sharpe = if stddev_r > 0.0 {
        trading_days_per_year.sqrt() * mean_r / stddev_r
    } else {
        0.0
    };

    // Sortino ratio: same shape as Sharpe, downside semi-deviation instead of stddev
    let downside_dev = downside_semi_deviation(daily_returns);
    let sortino = if downside_dev > 0.0 {
        trading_days_per_year.sqrt() * mean_r / downside_dev
    } else {
        0.0
    };

    // Beta and Treynor (relative to benchmark)
    let (beta, treynor) = if !benchmark_returns.is_empty() {
        let b = calculate_beta(daily_returns, benchmark_returns);
        let t = if b > 0.0 { cagr / b } else { 0.0 };
        (b, t)
    } else {
        (1.0, cagr) // Default beta = 1
    };

    let win_rate = calculate_win_rate(daily_returns);

    // Best/worst day
    let best_day = daily_returns
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    let worst_day = daily_returns
        .iter()
        .copied()
        .fold(f64::INFINITY, f64::min);

    BacktestMetrics {
        start_date,
        end_date,
        days,
        years,
        total_return,
        cagr,
        vol,
        max_drawdown,
        calmar,
        sharpe,
        sortino,
        treynor,
        beta,
        win_rate,
        best_day: if best_day.is_finite() { best_day } else { 0.0 },
        worst_day: if worst_day.is_finite() { worst_day } else { 0.0 },
        avg_turnover: 0.0, // Set separately
        avg_holdings: 0.0, // Set separately
    }
}

/// Metrics for an IS/OOS partition: the same base set, plus time-in-market
/// and its CAGR ratio, scored against the partition's own filtered values
/// (not a re-chained product — see the caller for how E/r/r_bench are sliced).
pub fn calculate_partition_metrics(
    equity: &[f64],
    daily_returns: &[f64],
    benchmark_returns: &[f64],
    dates: &[String],
    allocations: &[Allocation],
    trading_days_per_year: f64,
) -> PartitionMetrics {
    let base = calculate_metrics(equity, daily_returns, benchmark_returns, dates, trading_days_per_year);
    let tim = calculate_time_in_market(allocations);
    let timar = if tim > 0.0 { base.cagr / tim } else { 0.0 };

    PartitionMetrics {
        start_date: base.start_date,
        end_date: base.end_date,
        years: base.years,
        total_return: base.total_return,
        cagr: base.cagr,
        vol: base.vol,
        max_drawdown: base.max_drawdown,
        calmar: base.calmar,
        sharpe: base.sharpe,
        sortino: base.sortino,
        treynor: base.treynor,
        beta: base.beta,
        win_rate: base.win_rate,
        tim,
        timar,
    }
}

/// Fraction of days holding any non-cash, non-Empty position.
fn calculate_time_in_market(allocations: &[Allocation]) -> f64 {
    if allocations.is_empty() {
        return 0.0;
    }

    let invested_days = allocations
        .iter()
        .filter(|alloc| alloc.values().any(|&w| w > 0.0))
        .count();

    invested_days as f64 / allocations.len() as f64
}

/// Mean and sample (n-1) standard deviation of a return series.
fn mean_and_sample_stddev(returns: &[f64]) -> (f64, f64) {
    let n = returns.len();
    if n == 0 {
        return (0.0, 0.0);
    }

    let mean = returns.iter().sum::<f64>() / n as f64;
    if n < 2 {
        return (mean, 0.0);
    }

    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    (mean, variance.sqrt())
}

/// Downside semi-deviation: root-mean-square of negative returns, using the
/// full sample count as the denominator rather than just the negative days.
fn downside_semi_deviation(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }

    let sum_sq: f64 = returns.iter().filter(|&&r| r < 0.0).map(|r| r.powi(2)).sum();
    (sum_sq / returns.len() as f64).sqrt()
}

/// Win rate over days with a nonzero return; flat days don't count against it.
fn calculate_win_rate(returns: &[f64]) -> f64 {
    let wins = returns.iter().filter(|&&r| r > 0.0).count();
    let losses = returns.iter().filter(|&&r| r < 0.0).count();
    let denom = wins + losses;

    if denom == 0 {
        0.0
    } else {
        wins as f64 / denom as f64
    }
}

/// Calculate maximum drawdown
fn calculate_max_drawdown(equity: &[f64]) -> f64 {
    if equity.is_empty() {
        return 0.0;
    }

    let mut peak = equity[0];
    let mut max_dd = 0.0;

    for &value in equity {
        if value > peak {
            peak = value;
        }
        let dd = (peak - value) / peak;
        if dd > max_dd {
            max_dd = dd;
        }
    }

    -max_dd // Return as negative
}

/// Calculate beta relative to benchmark
fn calculate_beta(returns: &[f64], benchmark: &[f64]) -> f64 {
    if returns.len() != benchmark.len() || returns.is_empty() {
        return 1.0;
    }

    let n = returns.len() as f64;

    let mean_r = returns.iter().sum::<f64>() / n;
    let mean_b = benchmark.iter().sum::<f64>() / n;

    let mut covariance = 0.0;
    let mut variance_b = 0.0;

    for i in 0..returns.len() {
        let r_diff = returns[i] - mean_r;
        let b_diff = benchmark[i] - mean_b;
        covariance += r_diff * b_diff;
        variance_b += b_diff * b_diff;
    }

    covariance /= n;
    variance_b /= n;

    if variance_b > 0.0 {
        covariance / variance_b
    } else {
        1.0
    }
}

/// Calculate turnover between two allocations
pub fn calculate_turnover(
    prev: &std::collections::HashMap<String, f64>,
    curr: &std::collections::HashMap<String, f64>,
) -> f64 {
    let mut total_change = 0.0;

    // Get all tickers from both allocations
    let mut all_tickers: Vec<&String> = prev.keys().chain(curr.keys()).collect();
    all_tickers.sort();
    all_tickers.dedup();

    for ticker in all_tickers {
        let prev_weight = prev.get(ticker).copied().unwrap_or(0.0);
        let curr_weight = curr.get(ticker).copied().unwrap_or(0.0);
        total_change += (curr_weight - prev_weight).abs();
    }

    // Turnover is half the total change (buying and selling are both counted)
    total_change / 2.0
}
