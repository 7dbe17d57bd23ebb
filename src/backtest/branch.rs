// src/backtest/branch.rs
// Branch equity simulation for branch references

use std::collections::HashMap;

use crate::backtest::context::{BranchEquity, EvalContext, PriceDb};
use crate::backtest::indicators::branch_metric_at_index;
use crate::backtest::nodes::evaluate_node;
use crate::backtest::runner::calculate_lookback;
use crate::backtest::types::{Allocation, FlowNode};

/// Simulate a branch's equity curve at $1, starting no earlier than the
/// branch subtree's own warm-up requirement.
///
/// Used for branch references like "branch:from", "branch:to". The
/// sub-simulation gets a fresh altExit state: it is an independent backtest,
/// not a continuation of the parent's entered/exited bookkeeping.
///
/// Always simulates through the full price history rather than stopping at
/// whichever day first asked for it: the curve is cached per node id, and a
/// partial curve cached for an early day would be stale (and wrongly read as
/// complete) on every later day that asks for it again.
pub fn simulate_branch_equity(
    ctx: &mut EvalContext,
    branch_node: &FlowNode,
    start_index: usize,
) -> Option<BranchEquity> {
    // Check cache first
    if let Some(cached) = ctx.cache.get_branch_equity(&branch_node.id) {
        return Some(cached.clone());
    }

    // Check recursion depth
    if !ctx.can_recurse_branch() {
        return None;
    }

    let len = ctx.db.len();
    if len == 0 || start_index >= len {
        return None;
    }

    // The subtree needs its own warm-up before it can produce a real
    // allocation; everything before that is null, not a flat $1.
    let own_warmup = calculate_lookback(branch_node);
    let sim_start = start_index.max(own_warmup).min(len - 1);

    // Equity is seeded flat at $1 before warm-up (there is no subtree to
    // simulate yet, but the series still needs a defined value); returns
    // stay null there since no day-over-day change is meaningful.
    let mut equity = vec![1.0; len];
    let mut returns = vec![f64::NAN; len];

    let mut current_equity = 1.0;
    let mut fresh_alt_exit_state: HashMap<String, bool> = HashMap::new();

    for i in sim_start..len {
        let mut sub_ctx = ctx.branch_subcontext(&mut fresh_alt_exit_state);
        sub_ctx.decision_index = i;
        sub_ctx.indicator_index = match sub_ctx.decision_price {
            crate::backtest::context::DecisionPrice::Open => i.saturating_sub(1),
            crate::backtest::context::DecisionPrice::Close => i,
        };

        // Evaluate the branch node
        let alloc = evaluate_node(&mut sub_ctx, branch_node);

        if i == sim_start {
            // First day establishes the $1 baseline; no prior day to return from.
            equity[i] = current_equity;
            continue;
        }

        let daily_return = calculate_daily_return(ctx.db, &alloc, i);
        returns[i] = daily_return;
        current_equity *= 1.0 + daily_return;
        equity[i] = current_equity;
    }

    let result = BranchEquity { equity, returns };

    // Cache the result
    ctx.cache.set_branch_equity(&branch_node.id, result.clone());

    Some(result)
}

/// Calculate daily return from an allocation, always on raw close (not
/// adjusted close): a branch subtree is its own isolated backtest at $1 and
/// realizes close-to-close regardless of the outer backtest's price mode.
fn calculate_daily_return(db: &PriceDb, alloc: &Allocation, index: usize) -> f64 {
    if alloc.is_empty() || index == 0 {
        return 0.0;
    }

    let mut total_return = 0.0;

    for (ticker, &weight) in alloc {
        let today = db.get_close(ticker, index);
        let yesterday = db.get_close(ticker, index - 1);

        if let (Some(t), Some(y)) = (today, yesterday) {
            if y != 0.0 && !y.is_nan() && !t.is_nan() {
                total_return += weight * ((t - y) / y);
            }
        }
    }

    total_return
}

/// Get a metric value from a branch equity curve
pub fn get_branch_metric(
    ctx: &mut EvalContext,
    parent_node: &FlowNode,
    branch_ref: &str,
    metric: &str,
    window: u32,
    index: usize,
) -> Option<f64> {
    // Parse branch reference
    let slot_name = FlowNode::parse_branch_ref(branch_ref)?;

    // Map branch name to slot
    let slot = match slot_name {
        "from" | "then" | "enter" => "then",
        "to" | "else" | "exit" => "else",
        _ => return None,
    };

    // Get the branch node
    let branch_children = parent_node.get_slot(slot);
    if branch_children.is_empty() {
        return None;
    }

    // Use first child as the branch (typically there's only one)
    let branch_node = branch_children[0];

    // Get or simulate branch equity
    let branch_equity = simulate_branch_equity(ctx, branch_node, 0)?;

    // Calculate metric on the equity curve
    branch_metric_at_index(
        &branch_equity.equity,
        &branch_equity.returns,
        metric,
        window,
        index,
    )
}

/// Precompute branch-metric values referenced by a set of conditions, at a
/// fixed set of indices (typically "today" and "yesterday", for crossing
/// comparators).
///
/// `evaluate_conditions` only borrows `ctx.cache`/`ctx.db`, not all of `ctx`,
/// so a branch-metric resolver can't close over `ctx` itself to run a
/// sub-backtest on demand. Resolving eagerly, before the split borrow, sidesteps
/// that conflict.
pub fn precompute_branch_metrics(
    ctx: &mut EvalContext,
    parent_node: &FlowNode,
    conditions: &[crate::backtest::types::ConditionLine],
    indices: &[usize],
) -> HashMap<(String, String, u32, usize), f64> {
    let mut out = HashMap::new();
    let mut refs: Vec<(String, String, u32)> = Vec::new();

    for cond in conditions {
        if FlowNode::is_branch_ref(&cond.ticker) {
            refs.push((cond.ticker.clone(), cond.metric.clone(), cond.window));
        }
        if cond.expanded {
            if let Some(right_ticker) = &cond.right_ticker {
                if FlowNode::is_branch_ref(right_ticker) {
                    let metric = cond.right_metric.clone().unwrap_or_else(|| cond.metric.clone());
                    let window = cond.right_window.unwrap_or(cond.window);
                    refs.push((right_ticker.clone(), metric, window));
                }
            }
        }
    }

    for (ticker, metric, window) in refs {
        for &index in indices {
            if let Some(value) = get_branch_metric(ctx, parent_node, &ticker, &metric, window, index) {
                out.insert((ticker.clone(), metric.clone(), window, index), value);
            }
        }
    }

    out
}

/// Build the `branch_metric_fn` closure for `evaluate_conditions` from a
/// precomputed map.
pub fn branch_metric_lookup(
    map: &HashMap<(String, String, u32, usize), f64>,
) -> impl Fn(&str, &str, u32, usize) -> Option<f64> + '_ {
    move |ticker, metric, window, index| {
        map.get(&(ticker.to_string(), metric.to_string(), window, index)).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_branch_ref_parsing() {
        assert_eq!(FlowNode::parse_branch_ref("branch:from"), Some("from"));
        assert_eq!(FlowNode::parse_branch_ref("branch:to"), Some("to"));
        assert_eq!(FlowNode::parse_branch_ref("SPY"), None);
    }
}
