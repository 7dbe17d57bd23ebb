// src/backtest/runner.rs
// Main backtest runner - orchestrates the entire backtest

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use chrono::Datelike;
use crate::backtest::context::{DecisionPrice, EvalContext, IndicatorCache, PriceDb};
use crate::backtest::error::{BacktestError, BacktestResult};
use crate::backtest::indicators::{compute_indicator, get_indicator_lookback};
use crate::backtest::metrics::{calculate_metrics, calculate_partition_metrics, calculate_turnover};
use crate::backtest::nodes::evaluate_node;
use crate::backtest::types::*;

const DEFAULT_BENCHMARK: &str = "SPY";

/// Read OHLCV data from a parquet file using Arrow
/// Parquet schema: Date (timestamp), ticker (string), Open, High, Low, Close, Adj Close, Volume
fn read_parquet_file(
    path: &Path,
) -> Option<(Vec<String>, Vec<f64>, Vec<f64>, Vec<f64>, Vec<f64>, Vec<f64>, Vec<f64>)> {
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use arrow::array::{Array, Float64Array, Int64Array, TimestampNanosecondArray};
    use std::fs::File;

    let file = File::open(path).ok()?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file).ok()?;
    let reader = builder.build().ok()?;

    let mut dates = Vec::new();
    let mut opens = Vec::new();
    let mut highs = Vec::new();
    let mut lows = Vec::new();
    let mut closes = Vec::new();
    let mut adj_closes = Vec::new();
    let mut volumes = Vec::new();

    for batch_result in reader {
        let batch = batch_result.ok()?;

        // Column 0: Date (timestamp[ns, tz=UTC])
        let date_col = batch.column(0);
        let date_array = date_col.as_any().downcast_ref::<TimestampNanosecondArray>()?;

        // Column 2: Open, 3: High, 4: Low, 5: Close, 6: Adj Close, 7: Volume
        let open_col = batch.column(2).as_any().downcast_ref::<Float64Array>()?;
        let high_col = batch.column(3).as_any().downcast_ref::<Float64Array>()?;
        let low_col = batch.column(4).as_any().downcast_ref::<Float64Array>()?;
        let close_col = batch.column(5).as_any().downcast_ref::<Float64Array>()?;
        let adj_close_col = batch.column(6).as_any().downcast_ref::<Float64Array>()?;
        let volume_col = batch.column(7).as_any().downcast_ref::<Int64Array>()?;

        for i in 0..batch.num_rows() {
            // Convert timestamp nanoseconds to YYYY-MM-DD
            let ts_nanos = date_array.value(i);
            let ts_secs = ts_nanos / 1_000_000_000;
            let date = chrono::DateTime::from_timestamp(ts_secs, 0)
                .map(|dt| dt.format("%Y-%m-%d").to_string())
                .unwrap_or_default();

            dates.push(date);
            opens.push(if open_col.is_null(i) { f64::NAN } else { open_col.value(i) });
            highs.push(if high_col.is_null(i) { f64::NAN } else { high_col.value(i) });
            lows.push(if low_col.is_null(i) { f64::NAN } else { low_col.value(i) });
            closes.push(if close_col.is_null(i) { f64::NAN } else { close_col.value(i) });
            adj_closes.push(if adj_close_col.is_null(i) { f64::NAN } else { adj_close_col.value(i) });
            volumes.push(if volume_col.is_null(i) { 0.0 } else { volume_col.value(i) as f64 });
        }
    }

    Some((dates, opens, highs, lows, closes, adj_closes, volumes))
}

/// Load price data for the given tickers and align it to a single date axis.
///
/// The axis is the sorted intersection of dates across `indicator_tickers`
/// (the tickers that actually drive decisions), falling back to the union of
/// all tickers' dates when that intersection is empty (no indicator tickers,
/// or they share no common trading day). Every ticker in `all_tickers`,
/// including position-only ones, is then projected onto that axis with nulls
/// where it has no bar.
pub fn build_price_db_with_date_filter(
    parquet_dir: &Path,
    indicator_tickers: &[String],
    all_tickers: &[String],
) -> BacktestResult<PriceDb> {
    type Bar = (f64, f64, f64, f64, f64, f64);

    let mut ticker_data: HashMap<String, HashMap<String, Bar>> = HashMap::new();
    let mut ticker_dates: HashMap<String, BTreeSet<String>> = HashMap::new();

    for ticker in all_tickers {
        let path = parquet_dir.join(format!("{}.parquet", ticker));
        if !path.exists() {
            continue;
        }

        if let Some((dates, opens, highs, lows, closes, adj_closes, volumes)) = read_parquet_file(&path) {
            let mut date_map: HashMap<String, Bar> = HashMap::new();
            let mut date_set: BTreeSet<String> = BTreeSet::new();
            for (i, date) in dates.iter().enumerate() {
                date_set.insert(date.clone());
                date_map.insert(
                    date.clone(),
                    (
                        opens.get(i).copied().unwrap_or(f64::NAN),
                        highs.get(i).copied().unwrap_or(f64::NAN),
                        lows.get(i).copied().unwrap_or(f64::NAN),
                        closes.get(i).copied().unwrap_or(f64::NAN),
                        adj_closes.get(i).copied().unwrap_or(f64::NAN),
                        volumes.get(i).copied().unwrap_or(0.0),
                    ),
                );
            }
            ticker_dates.insert(ticker.clone(), date_set);
            ticker_data.insert(ticker.clone(), date_map);
        }
    }

    if ticker_data.is_empty() {
        return Err(BacktestError::InsufficientData("no price data found for any ticker".to_string()));
    }

    let relevant: Vec<&BTreeSet<String>> = indicator_tickers
        .iter()
        .filter_map(|t| ticker_dates.get(t))
        .collect();

    let intersection: BTreeSet<String> = if relevant.is_empty() {
        BTreeSet::new()
    } else {
        relevant
            .iter()
            .skip(1)
            .fold(relevant[0].clone(), |acc, set| acc.intersection(set).cloned().collect())
    };

    let axis: Vec<String> = if intersection.is_empty() {
        let mut union: BTreeSet<String> = BTreeSet::new();
        for set in ticker_dates.values() {
            union.extend(set.iter().cloned());
        }
        union.into_iter().collect()
    } else {
        intersection.into_iter().collect()
    };

    if axis.is_empty() {
        return Err(BacktestError::InsufficientData("no overlapping price dates".to_string()));
    }

    tracing::info!(tickers = ticker_data.len(), dates = axis.len(), "aligned price database");
    tracing::info!(start = %axis.first().unwrap(), end = %axis.last().unwrap(), "date range");

    let mut db = PriceDb::new();
    db.date_strings = axis.clone();

    for date_str in &db.date_strings {
        let ts = chrono::NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
            .map(|d| d.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp())
            .unwrap_or(0);
        db.dates.push(ts);
    }

    let num_dates = axis.len();
    for ticker in all_tickers {
        if let Some(date_map) = ticker_data.get(ticker) {
            let mut opens = vec![f64::NAN; num_dates];
            let mut highs = vec![f64::NAN; num_dates];
            let mut lows = vec![f64::NAN; num_dates];
            let mut closes = vec![f64::NAN; num_dates];
            let mut adj_closes = vec![f64::NAN; num_dates];
            let mut volumes = vec![0.0; num_dates];

            for (i, date) in axis.iter().enumerate() {
                if let Some(&(o, h, l, c, ac, v)) = date_map.get(date) {
                    opens[i] = o;
                    highs[i] = h;
                    lows[i] = l;
                    closes[i] = c;
                    adj_closes[i] = ac;
                    volumes[i] = v;
                }
            }

            db.open.insert(ticker.clone(), opens);
            db.high.insert(ticker.clone(), highs);
            db.low.insert(ticker.clone(), lows);
            db.close.insert(ticker.clone(), closes);
            db.adj_close.insert(ticker.clone(), adj_closes);
            db.volume.insert(ticker.clone(), volumes);
        }
    }

    Ok(db)
}

/// Collect all tickers used in a tree (positions, conditions, scaling, everything)
fn collect_all_tickers(node: &FlowNode) -> Vec<String> {
    let mut tickers = Vec::new();
    collect_tickers_recursive(node, &mut tickers);
    tickers.sort();
    tickers.dedup();
    tickers
}

fn collect_tickers_recursive(node: &FlowNode, tickers: &mut Vec<String>) {
    if let Some(positions) = &node.positions {
        for pos in positions {
            add_ticker(pos, tickers);
        }
    }

    if let Some(conditions) = &node.conditions {
        for cond in conditions {
            add_ticker(&cond.ticker, tickers);
            if let Some(rt) = &cond.right_ticker {
                add_ticker(rt, tickers);
            }
        }
    }

    if let Some(ticker) = &node.scale_ticker {
        add_ticker(ticker, tickers);
    }

    if let Some(conditions) = &node.entry_conditions {
        for cond in conditions {
            add_ticker(&cond.ticker, tickers);
        }
    }
    if let Some(conditions) = &node.exit_conditions {
        for cond in conditions {
            add_ticker(&cond.ticker, tickers);
        }
    }

    if let Some(numbered) = &node.numbered {
        for item in &numbered.items {
            for cond in &item.conditions {
                add_ticker(&cond.ticker, tickers);
            }
        }
    }

    for children in node.children.values() {
        for child in children.iter().flatten() {
            collect_tickers_recursive(child, tickers);
        }
    }
}

fn add_ticker(ticker: &str, tickers: &mut Vec<String>) {
    if ticker.is_empty() || ticker == "Empty" || ticker.starts_with("branch:") {
        return;
    }
    if let Some((num, den)) = FlowNode::parse_ratio_ticker(ticker) {
        tickers.push(num.to_string());
        tickers.push(den.to_string());
    } else {
        tickers.push(ticker.to_string());
    }
}

/// Collect the tickers that actually drive a decision: condition/scaling/
/// entry-exit/numbered tickers, plus (for function nodes) each ranked
/// child's own position tickers, since the ranking metric is evaluated on
/// them even though they are also held.
pub(crate) fn collect_indicator_tickers(node: &FlowNode) -> Vec<String> {
    let mut tickers = Vec::new();
    collect_indicator_tickers_recursive(node, &mut tickers);
    tickers.sort();
    tickers.dedup();
    tickers
}

fn collect_indicator_tickers_recursive(node: &FlowNode, tickers: &mut Vec<String>) {
    if let Some(conditions) = &node.conditions {
        for cond in conditions {
            add_ticker(&cond.ticker, tickers);
            if let Some(rt) = &cond.right_ticker {
                add_ticker(rt, tickers);
            }
        }
    }

    if let Some(ticker) = &node.scale_ticker {
        add_ticker(ticker, tickers);
    }

    if let Some(conditions) = &node.entry_conditions {
        for cond in conditions {
            add_ticker(&cond.ticker, tickers);
        }
    }
    if let Some(conditions) = &node.exit_conditions {
        for cond in conditions {
            add_ticker(&cond.ticker, tickers);
        }
    }

    if let Some(numbered) = &node.numbered {
        for item in &numbered.items {
            for cond in &item.conditions {
                add_ticker(&cond.ticker, tickers);
            }
        }
    }

    if node.kind == BlockKind::Function {
        for children in node.children.values() {
            for child in children.iter().flatten() {
                collect_position_tickers_recursive(child, tickers);
            }
        }
    }

    for children in node.children.values() {
        for child in children.iter().flatten() {
            collect_indicator_tickers_recursive(child, tickers);
        }
    }
}

/// Calculate the lookback period needed for the strategy. A tree with no
/// indicators anywhere (pure position nodes) needs no warm-up at all.
pub(crate) fn calculate_lookback(node: &FlowNode) -> usize {
    let mut max_lookback = 0;
    calculate_lookback_recursive(node, &mut max_lookback);
    max_lookback
}

/// Collect only position tickers (tickers that will be allocated to)
pub(crate) fn collect_position_tickers(node: &FlowNode) -> Vec<String> {
    let mut tickers = Vec::new();
    collect_position_tickers_recursive(node, &mut tickers);
    tickers.sort();
    tickers.dedup();
    tickers
}

fn collect_position_tickers_recursive(node: &FlowNode, tickers: &mut Vec<String>) {
    if node.kind == BlockKind::Position {
        if let Some(positions) = &node.positions {
            for pos in positions {
                add_ticker(pos, tickers);
            }
        }
    }

    for children in node.children.values() {
        for child in children.iter().flatten() {
            collect_position_tickers_recursive(child, tickers);
        }
    }
}

/// Find first index where ALL position tickers have valid price data
pub(crate) fn find_first_valid_pos_index(db: &PriceDb, position_tickers: &[String]) -> usize {
    if position_tickers.is_empty() {
        return 0;
    }

    for i in 0..db.len() {
        let mut all_valid = true;
        for ticker in position_tickers {
            if ticker == "Empty" || ticker.is_empty() {
                continue;
            }
            let close_val = db.get_close(ticker, i);
            if close_val.is_none() || close_val.unwrap().is_nan() {
                all_valid = false;
                break;
            }
        }
        if all_valid {
            return i;
        }
    }

    0
}

/// Calculate extra lookback needed for branch references (branch:from, branch:to)
fn calculate_branch_lookback(node: &FlowNode) -> usize {
    let mut max_branch_lookback = 0;
    calculate_branch_lookback_recursive(node, &mut max_branch_lookback);
    max_branch_lookback
}

fn calculate_branch_lookback_recursive(node: &FlowNode, max_lookback: &mut usize) {
    if let Some(conditions) = &node.conditions {
        for cond in conditions {
            if cond.ticker.starts_with("branch:") {
                let lb = get_indicator_lookback(&cond.metric, cond.window);
                *max_lookback = (*max_lookback).max(lb + 50);
            }
        }
    }

    if let Some(ticker) = &node.scale_ticker {
        if ticker.starts_with("branch:") {
            let lb = get_indicator_lookback(
                node.scale_metric.as_deref().unwrap_or(""),
                node.scale_window.unwrap_or(14),
            );
            *max_lookback = (*max_lookback).max(lb + 50);
        }
    }

    for children in node.children.values() {
        for child in children.iter().flatten() {
            calculate_branch_lookback_recursive(child, max_lookback);
        }
    }
}

/// Calculate lookbacks for ratio tickers (e.g., SPY/AGG)
/// Returns Vec of (first_valid_index, lookback) for each ratio
fn calculate_ratio_lookbacks(node: &FlowNode, db: &PriceDb) -> Vec<(usize, usize)> {
    let mut ratios = Vec::new();
    collect_ratio_tickers_recursive(node, &mut ratios);
    ratios.sort();
    ratios.dedup();

    let mut results = Vec::new();
    for (num, den, lookback) in ratios {
        let mut first_valid = 0;
        for i in 0..db.len() {
            let num_val = db.get_close(&num, i);
            let den_val = db.get_close(&den, i);
            if num_val.is_some() && den_val.is_some()
                && !num_val.unwrap().is_nan() && !den_val.unwrap().is_nan() {
                first_valid = i;
                break;
            }
        }
        results.push((first_valid, lookback));
    }

    results
}

fn collect_ratio_tickers_recursive(node: &FlowNode, ratios: &mut Vec<(String, String, usize)>) {
    if let Some(conditions) = &node.conditions {
        for cond in conditions {
            if let Some((num, den)) = FlowNode::parse_ratio_ticker(&cond.ticker) {
                let lb = get_indicator_lookback(&cond.metric, cond.window);
                ratios.push((num.to_string(), den.to_string(), lb));
            }
        }
    }

    if let Some(positions) = &node.positions {
        for pos in positions {
            if let Some((num, den)) = FlowNode::parse_ratio_ticker(pos) {
                ratios.push((num.to_string(), den.to_string(), 0));
            }
        }
    }

    for children in node.children.values() {
        for child in children.iter().flatten() {
            collect_ratio_tickers_recursive(child, ratios);
        }
    }
}

fn calculate_lookback_recursive(node: &FlowNode, max_lookback: &mut usize) {
    if let Some(conditions) = &node.conditions {
        for cond in conditions {
            let lb = get_indicator_lookback(&cond.metric, cond.window);
            *max_lookback = (*max_lookback).max(lb);
        }
    }

    if let Some(metric) = &node.metric {
        let lb = get_indicator_lookback(metric, node.window.unwrap_or(14));
        *max_lookback = (*max_lookback).max(lb);
    }

    if let Some(metric) = &node.scale_metric {
        let lb = get_indicator_lookback(metric, node.scale_window.unwrap_or(14));
        *max_lookback = (*max_lookback).max(lb);
    }

    for children in node.children.values() {
        for child in children.iter().flatten() {
            calculate_lookback_recursive(child, max_lookback);
        }
    }
}

/// Resolve the benchmark ticker: the request's choice if its data exists in
/// the price DB, else a silent fallback to SPY.
fn resolve_benchmark_ticker(db: &PriceDb, requested: Option<&str>) -> String {
    if let Some(ticker) = requested {
        if !ticker.is_empty() && db.has_ticker(ticker) {
            return ticker.to_string();
        }
    }
    DEFAULT_BENCHMARK.to_string()
}

/// Main backtest function
pub fn run_backtest(
    parquet_dir: &Path,
    request: &BacktestRequest,
) -> BacktestResult<BacktestResponse> {
    let node: FlowNode = serde_json::from_str(&request.payload)?;

    let indicator_tickers = collect_indicator_tickers(&node);
    let mut all_tickers = collect_all_tickers(&node);
    if all_tickers.is_empty() {
        return Err(BacktestError::InsufficientData("no tickers found in strategy".to_string()));
    }

    let benchmark_requested = request.benchmark_ticker.clone().unwrap_or_else(|| DEFAULT_BENCHMARK.to_string());
    for candidate in [benchmark_requested.as_str(), DEFAULT_BENCHMARK] {
        if !all_tickers.iter().any(|t| t == candidate) {
            all_tickers.push(candidate.to_string());
        }
    }
    all_tickers.sort();
    all_tickers.dedup();

    let db = build_price_db_with_date_filter(parquet_dir, &indicator_tickers, &all_tickers)?;
    if db.len() < 3 {
        return Err(BacktestError::InsufficientData("not enough price data".to_string()));
    }

    let benchmark_ticker = resolve_benchmark_ticker(&db, Some(&benchmark_requested));

    let mut cache = IndicatorCache::new();
    let mut alt_exit_state = HashMap::new();
    let custom_indicators = request.custom_indicators.as_deref().unwrap_or(&[]);

    let regular_lookback = calculate_lookback(&node);
    let branch_lookback = calculate_branch_lookback(&node);
    let ratio_lookbacks = calculate_ratio_lookbacks(&node, &db);

    let position_tickers = collect_position_tickers(&node);
    let first_valid_pos_index = find_first_valid_pos_index(&db, &position_tickers);

    let decision_price = DecisionPrice::from(&request.mode);

    let mut start_index = match decision_price {
        DecisionPrice::Open => if regular_lookback > 0 { regular_lookback + 1 } else { 0 },
        DecisionPrice::Close => regular_lookback,
    };

    start_index = start_index.max(first_valid_pos_index + branch_lookback);

    for (first_valid_index, lookback) in &ratio_lookbacks {
        let ratio_start = match decision_price {
            DecisionPrice::Open => first_valid_index + lookback + 1,
            DecisionPrice::Close => first_valid_index + lookback,
        };
        start_index = start_index.max(ratio_start);
    }

    if start_index >= db.len() {
        return Err(BacktestError::InsufficientData(
            "warm-up period exceeds available price history".to_string(),
        ));
    }

    tracing::info!(
        regular_lookback,
        branch_lookback,
        first_valid_pos_index,
        ratio_count = ratio_lookbacks.len(),
        start_index,
        "warm-up computed"
    );

    let mut allocations: Vec<Allocation> = vec![HashMap::new(); db.len()];
    let mut warnings: Vec<BacktestWarning> = Vec::new();

    for i in start_index..db.len() {
        let mut ctx = EvalContext::new(
            &db,
            &mut cache,
            request.mode.clone(),
            &mut alt_exit_state,
            custom_indicators,
        );
        ctx.set_day(i);

        allocations[i] = evaluate_node(&mut ctx, &node);

        for message in ctx.warnings {
            warnings.push(BacktestWarning {
                time: db.dates[i],
                date: db.date_strings[i].clone(),
                message,
            });
        }
    }

    let cost_bps = request.cost_bps / 10000.0;
    let curve = calculate_equity_curve(&db, &allocations, start_index, cost_bps, &request.mode, &benchmark_ticker);

    let mut metrics = calculate_metrics(
        &curve.equity,
        &curve.daily_returns,
        &curve.benchmark_returns,
        &db.date_strings[start_index..],
        252.0,
    );

    if curve.days.len() > 1 {
        metrics.avg_turnover = curve.total_turnover / (curve.days.len() - 1) as f64;
    }
    if !curve.days.is_empty() {
        metrics.avg_holdings = curve.total_holdings / curve.days.len() as f64;
    }

    let monthly = calculate_monthly_returns(&db.date_strings, &curve.daily_returns, start_index);

    let split = request
        .split_config
        .as_ref()
        .filter(|c| c.enabled)
        .map(|cfg| split_partitions(&db, &curve, start_index, cfg));

    let indicator_overlays = compute_overlays(
        &mut cache,
        &db,
        start_index,
        request.indicator_overlays.as_deref().unwrap_or(&[]),
        custom_indicators,
    );

    let (is_metrics, oos_metrics, oos_start_date, is_allocations, oos_allocations) = match split {
        Some(SplitResult { is_metrics, oos_metrics, oos_start_date, is_allocations, oos_allocations }) => (
            Some(is_metrics),
            Some(oos_metrics),
            Some(oos_start_date),
            Some(is_allocations),
            Some(oos_allocations),
        ),
        None => (None, None, None, None, None),
    };

    Ok(BacktestResponse {
        equity_curve: curve.points,
        benchmark_curve: Some(curve.benchmark_points),
        drawdown_points: curve.drawdown_points,
        markers: Vec::new(),
        metrics,
        days: curve.days,
        allocations: curve.allocation_rows,
        warnings,
        monthly,
        is_metrics,
        oos_metrics,
        oos_start_date,
        is_allocations,
        oos_allocations,
        indicator_overlays,
        daily_returns: curve.daily_returns,
    })
}

/// Everything the realization loop produces, bundled so split/overlay code
/// downstream doesn't have to thread a ten-tuple around.
struct EquityCurve {
    equity: Vec<f64>,
    daily_returns: Vec<f64>,
    benchmark_returns: Vec<f64>,
    points: Vec<EquityPoint>,
    benchmark_points: Vec<EquityPoint>,
    drawdown_points: Vec<EquityPoint>,
    days: Vec<DayRow>,
    allocation_rows: Vec<AllocationRow>,
    total_turnover: f64,
    total_holdings: f64,
}

/// Resolve (entry, exit) prices for a ticker on decision day `d` under the
/// given mode. For OC the trade starts and finishes within bar `d`; the
/// other three modes cross into `d + 1`.
fn entry_exit(db: &PriceDb, mode: &BacktestMode, ticker: &str, d: usize) -> Option<(f64, f64)> {
    let (entry, exit) = match mode {
        BacktestMode::OO => (db.get_open(ticker, d), db.get_open(ticker, d + 1)),
        BacktestMode::CC => (db.get_adj_close(ticker, d), db.get_adj_close(ticker, d + 1)),
        BacktestMode::CO => (db.get_close(ticker, d), db.get_open(ticker, d + 1)),
        BacktestMode::OC => (db.get_open(ticker, d), db.get_close(ticker, d)),
    };
    match (entry, exit) {
        (Some(e), Some(x)) if !e.is_nan() && !x.is_nan() && e != 0.0 => Some((e, x)),
        _ => None,
    }
}

/// Calculate equity curve from allocations, realizing trades per the
/// requested OO/CC/CO/OC price-timing convention.
fn calculate_equity_curve(
    db: &PriceDb,
    allocations: &[Allocation],
    start_index: usize,
    cost_bps: f64,
    mode: &BacktestMode,
    benchmark_ticker: &str,
) -> EquityCurve {
    let mut equity = vec![1.0];
    let mut daily_returns = Vec::new();
    let mut benchmark_returns = Vec::new();
    let mut points = Vec::new();
    let mut benchmark_points = Vec::new();
    let mut drawdown_points = Vec::new();
    let mut days = Vec::new();
    let mut allocation_rows = Vec::new();

    let mut current_equity = 1.0;
    let mut peak = 1.0;
    let mut benchmark_equity = 1.0;
    let mut total_turnover = 0.0;
    let mut total_holdings = 0.0;
    let mut prev_alloc = HashMap::new();

    points.push(EquityPoint { date: db.date_strings[start_index].clone(), equity: 1.0 });
    benchmark_points.push(EquityPoint { date: db.date_strings[start_index].clone(), equity: 1.0 });
    drawdown_points.push(EquityPoint { date: db.date_strings[start_index].clone(), equity: 0.0 });

    let is_oc = matches!(mode, BacktestMode::OC);
    if db.len() < start_index + 1 {
        return EquityCurve {
            equity, daily_returns, benchmark_returns, points, benchmark_points, drawdown_points,
            days, allocation_rows, total_turnover, total_holdings,
        };
    }
    let last_d = if is_oc { db.len() - 1 } else { db.len().saturating_sub(2) };

    for d in start_index..=last_d {
        let alloc = &allocations[d];
        let trade_date_index = if is_oc { d } else { d + 1 };

        let mut gross_ret = 0.0;
        for (ticker, &weight) in alloc {
            if let Some((entry, exit)) = entry_exit(db, mode, ticker, d) {
                gross_ret += weight * ((exit - entry) / entry);
            }
        }

        let turnover = calculate_turnover(&prev_alloc, alloc);
        let cost = turnover * cost_bps;
        let net_ret = (gross_ret - cost).max(-0.9999);

        total_turnover += turnover;
        total_holdings += alloc.len() as f64;

        current_equity *= 1.0 + net_ret;
        equity.push(current_equity);
        daily_returns.push(net_ret);

        if current_equity > peak {
            peak = current_equity;
        }
        let drawdown = (current_equity - peak) / peak;

        let bench_ret = entry_exit(db, mode, benchmark_ticker, d)
            .map(|(entry, exit)| (exit - entry) / entry)
            .unwrap_or(0.0);
        benchmark_equity *= 1.0 + bench_ret;
        benchmark_returns.push(bench_ret);

        let time = db.dates[trade_date_index];
        let date = db.date_strings[trade_date_index].clone();

        points.push(EquityPoint { date: date.clone(), equity: current_equity });
        benchmark_points.push(EquityPoint { date: date.clone(), equity: benchmark_equity });
        drawdown_points.push(EquityPoint { date: date.clone(), equity: drawdown });

        let holdings: Vec<AllocationEntry> = alloc
            .iter()
            .map(|(t, &w)| AllocationEntry { ticker: t.clone(), weight: w })
            .collect();

        days.push(DayRow {
            time,
            date: date.clone(),
            equity: current_equity,
            drawdown,
            gross_return: gross_ret,
            net_return: net_ret,
            turnover,
            cost,
            holdings: holdings.clone(),
        });

        allocation_rows.push(AllocationRow { date, entries: holdings });

        prev_alloc = alloc.clone();
    }

    EquityCurve {
        equity, daily_returns, benchmark_returns, points, benchmark_points, drawdown_points,
        days, allocation_rows, total_turnover, total_holdings,
    }
}

/// Calculate monthly returns
fn calculate_monthly_returns(
    dates: &[String],
    returns: &[f64],
    start_index: usize,
) -> Vec<MonthlyReturn> {
    let mut monthly = Vec::new();
    let mut current_year = 0i32;
    let mut current_month = 0u32;
    let mut month_return = 1.0;

    for (i, ret) in returns.iter().enumerate() {
        let date_str = match dates.get(start_index + 1 + i) {
            Some(d) => d,
            None => continue,
        };
        if let Ok(date) = chrono::NaiveDate::parse_from_str(date_str, "%Y-%m-%d") {
            let year = date.year();
            let month = date.month();

            if year != current_year || month != current_month {
                if current_year != 0 {
                    monthly.push(MonthlyReturn {
                        year: current_year,
                        month: current_month,
                        value: month_return - 1.0,
                    });
                }
                current_year = year;
                current_month = month;
                month_return = 1.0;
            }

            month_return *= 1.0 + ret;
        }
    }

    if current_year != 0 {
        monthly.push(MonthlyReturn {
            year: current_year,
            month: current_month,
            value: month_return - 1.0,
        });
    }

    monthly
}

struct SplitResult {
    is_metrics: PartitionMetrics,
    oos_metrics: PartitionMetrics,
    oos_start_date: String,
    is_allocations: Vec<AllocationRow>,
    oos_allocations: Vec<AllocationRow>,
}

#[derive(PartialEq)]
enum Partition {
    InSample,
    OutOfSample,
}

/// Classify a trading date into IS/OOS per the requested split strategy.
fn classify(date_str: &str, cfg: &SplitConfig, threshold_date: &str) -> Partition {
    match cfg.strategy {
        SplitStrategy::EvenOddMonth => {
            let month = date_str.get(5..7).and_then(|s| s.parse::<u32>().ok()).unwrap_or(1);
            if month % 2 == 1 { Partition::InSample } else { Partition::OutOfSample }
        }
        SplitStrategy::EvenOddYear => {
            let year = date_str.get(0..4).and_then(|s| s.parse::<i32>().ok()).unwrap_or(0);
            if year % 2 != 0 { Partition::InSample } else { Partition::OutOfSample }
        }
        SplitStrategy::Chronological => {
            if date_str < threshold_date { Partition::InSample } else { Partition::OutOfSample }
        }
    }
}

/// Split the realized backtest into in-sample / out-of-sample partitions and
/// score each with the same metric formulas, on their own filtered
/// `(equity, returns, benchmarkReturns)` values — the literal aligned subset
/// of the full series, not a re-chained product.
fn split_partitions(
    db: &PriceDb,
    curve: &EquityCurve,
    start_index: usize,
    cfg: &SplitConfig,
) -> SplitResult {
    let threshold_date = match (&cfg.split_date, cfg.chronological_percent) {
        (Some(d), _) => d.clone(),
        (None, percent) => {
            let percent = percent.unwrap_or(50.0).clamp(0.0, 100.0);
            let span = db.len() - start_index;
            let offset = ((percent / 100.0) * span as f64).floor() as usize;
            let idx = (start_index + offset).min(db.len() - 1);
            db.date_strings[idx].clone()
        }
    };

    let mut is_equity = vec![curve.equity[0]];
    let mut oos_equity = vec![curve.equity[0]];
    let mut is_returns = Vec::new();
    let mut oos_returns = Vec::new();
    let mut is_bench = Vec::new();
    let mut oos_bench = Vec::new();
    let mut is_dates = vec![db.date_strings[start_index].clone()];
    let mut oos_dates = vec![db.date_strings[start_index].clone()];
    let mut is_rows: Vec<(Allocation, AllocationRow)> = Vec::new();
    let mut oos_rows: Vec<(Allocation, AllocationRow)> = Vec::new();
    let mut oos_start_date: Option<String> = None;

    for (j, ret) in curve.daily_returns.iter().enumerate() {
        let equity_value = curve.equity[j + 1];
        let bench_ret = curve.benchmark_returns[j];
        let row = &curve.days[j];
        let date = row.date.clone();

        let alloc: Allocation = row
            .holdings
            .iter()
            .map(|entry| (entry.ticker.clone(), entry.weight))
            .collect();
        let alloc_row = AllocationRow {
            date: date.clone(),
            entries: row.holdings.clone(),
        };

        match classify(&date, cfg, &threshold_date) {
            Partition::InSample => {
                is_equity.push(equity_value);
                is_returns.push(*ret);
                is_bench.push(bench_ret);
                is_dates.push(date.clone());
                is_rows.push((alloc, alloc_row));
            }
            Partition::OutOfSample => {
                if oos_start_date.is_none() {
                    oos_start_date = Some(date.clone());
                }
                oos_equity.push(equity_value);
                oos_returns.push(*ret);
                oos_bench.push(bench_ret);
                oos_dates.push(date.clone());
                oos_rows.push((alloc, alloc_row));
            }
        }
    }

    let is_allocs: Vec<Allocation> = is_rows.iter().map(|(a, _)| a.clone()).collect();
    let oos_allocs: Vec<Allocation> = oos_rows.iter().map(|(a, _)| a.clone()).collect();

    let is_metrics = calculate_partition_metrics(&is_equity, &is_returns, &is_bench, &is_dates, &is_allocs, 252.0);
    let oos_metrics = calculate_partition_metrics(&oos_equity, &oos_returns, &oos_bench, &oos_dates, &oos_allocs, 252.0);

    SplitResult {
        is_metrics,
        oos_metrics,
        oos_start_date: oos_start_date.unwrap_or_default(),
        is_allocations: is_rows.into_iter().map(|(_, row)| row).collect(),
        oos_allocations: oos_rows.into_iter().map(|(_, row)| row).collect(),
    }
}

/// Compute requested indicator overlay series against the evaluated range.
fn compute_overlays(
    cache: &mut IndicatorCache,
    db: &PriceDb,
    start_index: usize,
    overlays: &[IndicatorOverlay],
    custom_indicators: &[CustomIndicator],
) -> Vec<IndicatorOverlaySeries> {
    overlays
        .iter()
        .map(|overlay| {
            let left = overlay_series(cache, db, start_index, &overlay.ticker, &overlay.metric, overlay.window, custom_indicators);

            let right = overlay.right_ticker.as_ref().map(|ticker| {
                let metric = overlay.right_metric.clone().unwrap_or_else(|| overlay.metric.clone());
                let window = overlay.right_window.unwrap_or(overlay.window);
                overlay_series(cache, db, start_index, ticker, &metric, window, custom_indicators)
            });

            IndicatorOverlaySeries { id: overlay.id.clone(), left, right }
        })
        .collect()
}

fn overlay_series(
    cache: &mut IndicatorCache,
    db: &PriceDb,
    start_index: usize,
    ticker: &str,
    metric: &str,
    window: u32,
    custom_indicators: &[CustomIndicator],
) -> Vec<OverlayPoint> {
    let values = compute_indicator(cache, db, ticker, metric, window, custom_indicators);

    (start_index..db.len())
        .map(|i| {
            let value = values
                .as_ref()
                .and_then(|v| v.get(i).copied())
                .filter(|v| !v.is_nan());
            OverlayPoint { date: db.date_strings[i].clone(), value }
        })
        .collect()
}
