// src/backtest/weighting.rs
// Weighting modes for combining child allocations

use crate::backtest::context::EvalContext;
use crate::backtest::indicators::compute_indicator;
use crate::backtest::types::{Allocation, FlowNode, WeightMode, empty_allocation, normalize_allocation};

/// Combine multiple child allocations using the specified weighting mode
pub fn combine_allocations(
    ctx: &mut EvalContext,
    node: &FlowNode,
    children: &[(Allocation, &FlowNode)],
    weighting: &WeightMode,
    vol_window: Option<u32>,
) -> Allocation {
    if children.is_empty() {
        return empty_allocation();
    }

    if let WeightMode::Capped = weighting {
        // Caps can bind even with one child, so this mode skips the
        // single-child shortcut the other modes take below.
        return combine_capped(node, children);
    }

    if children.len() == 1 {
        return children[0].0.clone();
    }

    // Calculate weights based on mode
    let weights = match weighting {
        WeightMode::Equal => equal_weights(children.len()),
        WeightMode::Defined => defined_weights(children),
        WeightMode::Inverse => inverse_volatility_weights(ctx, children, vol_window.unwrap_or(20)),
        WeightMode::Pro => pro_volatility_weights(ctx, children, vol_window.unwrap_or(20)),
        WeightMode::Capped => unreachable!("handled above"),
    };

    // Combine allocations with calculated weights
    let mut result = Allocation::new();

    for ((alloc, _), weight) in children.iter().zip(weights.iter()) {
        for (ticker, &ticker_weight) in alloc {
            *result.entry(ticker.clone()).or_insert(0.0) += ticker_weight * weight;
        }
    }

    normalize_allocation(&mut result);
    result
}

/// Capped weighting: clip the base (equal) distribution to `[minCap, maxCap]`,
/// renormalize down if the clipped sum exceeds 1, or route the shortfall to
/// the configured fallback ticker (default `BIL`) if it's under 1.
fn combine_capped(node: &FlowNode, children: &[(Allocation, &FlowNode)]) -> Allocation {
    let base_weights = equal_weights(children.len());
    let min_cap = node.min_cap.unwrap_or(0.0);
    let max_cap = node.max_cap.unwrap_or(1.0);

    let mut weights: Vec<f64> = base_weights.iter().map(|w| w.clamp(min_cap, max_cap)).collect();
    let sum: f64 = weights.iter().sum();

    let mut fallback_weight = 0.0;
    if sum > 1.0 {
        let scale = 1.0 / sum;
        for w in weights.iter_mut() {
            *w *= scale;
        }
    } else if sum < 1.0 {
        fallback_weight = 1.0 - sum;
    }

    let mut result = Allocation::new();
    for ((alloc, _), weight) in children.iter().zip(weights.iter()) {
        for (ticker, &ticker_weight) in alloc {
            *result.entry(ticker.clone()).or_insert(0.0) += ticker_weight * weight;
        }
    }

    if fallback_weight > 0.0 {
        let fallback_ticker = node.capped_fallback.clone().unwrap_or_else(|| "BIL".to_string());
        *result.entry(fallback_ticker).or_insert(0.0) += fallback_weight;
    }

    // Already normalized by construction; a blanket normalize here would
    // wash out the fallback-ticker slack.
    result
}

/// Equal weights for all children
fn equal_weights(n: usize) -> Vec<f64> {
    vec![1.0 / n as f64; n]
}

/// Defined weights based on child.window field
fn defined_weights(children: &[(Allocation, &FlowNode)]) -> Vec<f64> {
    let weights: Vec<f64> = children
        .iter()
        .map(|(_, child)| child.window.unwrap_or(1) as f64)
        .collect();

    let total: f64 = weights.iter().sum();

    if total <= 0.0 {
        // Fallback to equal
        return equal_weights(children.len());
    }

    weights.iter().map(|w| w / total).collect()
}

/// Inverse volatility weighting (lower vol = higher weight)
fn inverse_volatility_weights(
    ctx: &mut EvalContext,
    children: &[(Allocation, &FlowNode)],
    window: u32,
) -> Vec<f64> {
    let vols = calculate_child_volatilities(ctx, children, window);

    // Check if we have valid volatilities
    if vols.iter().any(|v| v.is_none() || *v == Some(0.0)) {
        return equal_weights(children.len());
    }

    let vols: Vec<f64> = vols.into_iter().map(|v| v.unwrap()).collect();

    // Calculate inverse volatility weights
    let inverse_vols: Vec<f64> = vols.iter().map(|v| 1.0 / v).collect();
    let total: f64 = inverse_vols.iter().sum();

    if total <= 0.0 || !total.is_finite() {
        return equal_weights(children.len());
    }

    inverse_vols.iter().map(|iv| iv / total).collect()
}

/// Pro volatility weighting (higher vol = higher weight)
fn pro_volatility_weights(
    ctx: &mut EvalContext,
    children: &[(Allocation, &FlowNode)],
    window: u32,
) -> Vec<f64> {
    let vols = calculate_child_volatilities(ctx, children, window);

    // Check if we have valid volatilities
    if vols.iter().any(|v| v.is_none()) {
        return equal_weights(children.len());
    }

    let vols: Vec<f64> = vols.into_iter().map(|v| v.unwrap()).collect();
    let total: f64 = vols.iter().sum();

    if total <= 0.0 || !total.is_finite() {
        return equal_weights(children.len());
    }

    vols.iter().map(|v| v / total).collect()
}

/// Calculate volatility for each child's allocation
fn calculate_child_volatilities(
    ctx: &mut EvalContext,
    children: &[(Allocation, &FlowNode)],
    window: u32,
) -> Vec<Option<f64>> {
    children
        .iter()
        .map(|(alloc, _)| calculate_allocation_volatility(ctx, alloc, window))
        .collect()
}

/// Calculate weighted average volatility for an allocation
fn calculate_allocation_volatility(
    ctx: &mut EvalContext,
    alloc: &Allocation,
    window: u32,
) -> Option<f64> {
    if alloc.is_empty() {
        return None;
    }

    let mut total_vol = 0.0;
    let mut total_weight = 0.0;

    for (ticker, &weight) in alloc {
        // Get standard deviation of returns for this ticker
        let vol_series = compute_indicator(
            ctx.cache,
            ctx.db,
            ticker,
            "Standard Deviation",
            window,
            ctx.custom_indicators,
        );

        if let Some(vol_values) = vol_series {
            if let Some(&vol) = vol_values.get(ctx.indicator_index) {
                if !vol.is_nan() && vol > 0.0 {
                    total_vol += vol * weight;
                    total_weight += weight;
                }
            }
        }
    }

    if total_weight > 0.0 {
        Some(total_vol / total_weight)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::types::BlockKind;
    use std::collections::HashMap as StdHashMap;

    #[test]
    fn test_equal_weights() {
        let w = equal_weights(4);
        assert_eq!(w.len(), 4);
        assert!((w[0] - 0.25).abs() < 0.001);
        assert!((w.iter().sum::<f64>() - 1.0).abs() < 0.001);
    }

    fn make_node(min_cap: Option<f64>, max_cap: Option<f64>, fallback: Option<&str>) -> FlowNode {
        FlowNode {
            id: "test".to_string(),
            kind: BlockKind::Basic,
            title: "Test".to_string(),
            children: StdHashMap::new(),
            positions: None,
            weighting: WeightMode::Capped,
            weighting_then: None,
            weighting_else: None,
            capped_fallback: fallback.map(|s| s.to_string()),
            capped_fallback_then: None,
            capped_fallback_else: None,
            vol_window: None,
            vol_window_then: None,
            vol_window_else: None,
            min_cap,
            max_cap,
            bg_color: None,
            collapsed: false,
            conditions: None,
            numbered: None,
            metric: None,
            window: None,
            bottom: None,
            rank: None,
            entry_conditions: None,
            exit_conditions: None,
            scale_metric: None,
            scale_window: None,
            scale_ticker: None,
            scale_from: None,
            scale_to: None,
        }
    }

    fn alloc(ticker: &str) -> Allocation {
        let mut a = Allocation::new();
        a.insert(ticker.to_string(), 1.0);
        a
    }

    #[test]
    fn test_combine_capped_slack_to_fallback() {
        // 3 children, equal base = 1/3 each, capped at 0.2 -> sum = 0.6, slack 0.4 -> BIL.
        let node = make_node(None, Some(0.2), None);
        let a = alloc("AAA");
        let b = alloc("BBB");
        let c = alloc("CCC");
        let children: Vec<(Allocation, &FlowNode)> = vec![(a, &node), (b, &node), (c, &node)];
        let result = combine_capped(&node, &children);

        assert!((result["AAA"] - 0.2).abs() < 1e-9);
        assert!((result["BIL"] - 0.4).abs() < 1e-9);
        assert!((result.values().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_combine_capped_renormalizes_when_over() {
        // 2 children, equal base = 0.5 each, min cap 0.6 pushes sum to 1.2 -> renormalize down.
        let node = make_node(Some(0.6), None, None);
        let a = alloc("AAA");
        let b = alloc("BBB");
        let children: Vec<(Allocation, &FlowNode)> = vec![(a, &node), (b, &node)];
        let result = combine_capped(&node, &children);

        assert!((result.values().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(!result.contains_key("BIL"));
    }

    #[test]
    fn test_combine_capped_custom_fallback() {
        let node = make_node(None, Some(0.1), Some("SHY"));
        let a = alloc("AAA");
        let children: Vec<(Allocation, &FlowNode)> = vec![(a, &node)];
        let result = combine_capped(&node, &children);

        assert!((result["AAA"] - 0.1).abs() < 1e-9);
        assert!((result["SHY"] - 0.9).abs() < 1e-9);
    }
}
