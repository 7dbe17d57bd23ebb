// src/backtest/custom_formula.rs
// Custom-formula evaluator: the interface boundary described as an external
// collaborator. Given a formula string and a per-date variable resolver,
// computes a scalar. Implemented here with `rhai` so the core still has a
// concrete default instead of an unimplemented stub.
//
// A formula is compiled once (`compile_formula`) and the resulting AST is
// reused for every day in the evaluated range; only the `Scope` is rebuilt
// per day from the resolved variable values.
//
// Variables available inside a formula are either raw bars (`close`, `open`,
// `high`, `low`, `volume`, all referring to the custom indicator's own
// ticker at the current day) or `<metric_slug>_<window>` references that are
// resolved through the same dispatcher used for ordinary indicators (e.g.
// `rsi_14`, `sma_20`, `atr_14`).

use rhai::{Engine, Scope, AST};

use crate::backtest::context::{IndicatorCache, PriceDb};
use crate::backtest::indicators::metric_at_index;

/// Reverse of `normalize_metric_name`: slug -> canonical display metric name.
fn slug_to_metric(slug: &str) -> Option<&'static str> {
    Some(match slug {
        "sma" => "Simple Moving Average",
        "ema" => "Exponential Moving Average",
        "hma" => "Hull Moving Average",
        "wma" => "Weighted Moving Average",
        "wilders" => "Wilder Moving Average",
        "rsi" => "Relative Strength Index",
        "rsi_sma" => "RSI (SMA)",
        "rsi_ema" => "RSI (EMA)",
        "stoch_rsi" => "Stochastic RSI",
        "laguerre_rsi" => "Laguerre RSI",
        "roc" => "Rate of Change",
        "std" => "Standard Deviation",
        "std_price" => "Standard Deviation of Price",
        "max_dd" => "Max Drawdown",
        "boll_b" => "Bollinger %B",
        "boll_bw" => "Bollinger Bandwidth",
        "hist_vol" => "Historical Volatility",
        "ulcer" => "Ulcer Index",
        "cum_ret" => "Cumulative Return",
        "sma_ret" => "SMA of Returns",
        "trend_clarity" => "Trend Clarity",
        "linreg_slope" => "Linear Reg Slope",
        "linreg_value" => "Linear Reg Value",
        "price_vs_sma" => "Price vs SMA",
        "ult_smooth" => "Ultimate Smoother",
        "macd_hist" => "MACD Histogram",
        "ppo_hist" => "PPO Histogram",
        "aroon_up" => "Aroon Up",
        "aroon_down" => "Aroon Down",
        "aroon_osc" => "Aroon Oscillator",
        "williams_r" => "Williams %R",
        "stoch_k" => "Stochastic %K",
        "stoch_d" => "Stochastic %D",
        "atr" => "ATR",
        "atr_pct" => "ATR %",
        "cci" => "CCI",
        "adx" => "ADX",
        "mfi" => "Money Flow Index",
        "obv_roc" => "OBV Rate of Change",
        "vwap_ratio" => "VWAP Ratio",
        "price" => "Current Price",
        "drawdown" => "Drawdown",
        _ => return None,
    })
}

fn identifiers(formula: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for ch in formula.chars().chain(std::iter::once(' ')) {
        if ch.is_alphanumeric() || ch == '_' {
            current.push(ch);
        } else if !current.is_empty() {
            if current.chars().next().unwrap().is_alphabetic() {
                out.push(std::mem::take(&mut current));
            } else {
                current.clear();
            }
        }
    }
    out.sort();
    out.dedup();
    out
}

fn resolve_variable(
    cache: &mut IndicatorCache,
    db: &PriceDb,
    ticker: &str,
    name: &str,
    index: usize,
) -> Option<f64> {
    match name {
        "close" => db.get_close(ticker, index),
        "open" => db.get_open(ticker, index),
        "high" => db.get_high(ticker, index),
        "low" => db.get_low(ticker, index),
        "volume" => db.get_volume(ticker, index),
        _ => {
            let (slug, window) = name.rsplit_once('_')?;
            let window: u32 = window.parse().ok()?;
            let metric = slug_to_metric(slug)?;
            // Custom formulas can't reference other custom formulas.
            metric_at_index(cache, db, ticker, metric, window, index, &[])
        }
    }
}

/// A formula compiled once and reused across every day of the evaluated
/// range, so the day loop never re-parses the formula string.
pub struct CompiledFormula {
    engine: Engine,
    ast: AST,
    identifiers: Vec<String>,
}

/// Compile a formula. Returns `None` if it fails to parse.
pub fn compile_formula(formula: &str) -> Option<CompiledFormula> {
    let engine = Engine::new();
    let ast = engine.compile(formula).ok()?;
    Some(CompiledFormula { engine, ast, identifiers: identifiers(formula) })
}

/// Evaluate a compiled formula for `ticker` at `index`. Returns `None` if a
/// referenced variable is unresolvable or itself null, or the formula
/// evaluates to a non-finite result.
pub fn evaluate_custom_formula(
    cache: &mut IndicatorCache,
    db: &PriceDb,
    compiled: &CompiledFormula,
    ticker: &str,
    index: usize,
) -> Option<f64> {
    let mut scope = Scope::new();
    for ident in &compiled.identifiers {
        let v = resolve_variable(cache, db, ticker, ident, index)?;
        if v.is_nan() {
            return None;
        }
        scope.push(ident.clone(), v);
    }

    compiled
        .engine
        .eval_ast_with_scope::<f64>(&mut scope, &compiled.ast)
        .ok()
        .filter(|v| !v.is_nan() && v.is_finite())
}
