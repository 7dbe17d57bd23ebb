// src/backtest/nodes/numbered.rs
// Numbered node - multi-condition evaluation (any/all/none/exactly N)

use crate::backtest::branch::{branch_metric_lookup, precompute_branch_metrics};
use crate::backtest::conditions::{evaluate_conditions, ConditionResult};
use crate::backtest::context::EvalContext;
use crate::backtest::nodes::{evaluate_children, get_active_children};
use crate::backtest::types::{Allocation, FlowNode, NumberedQuantifier, empty_allocation};
use crate::backtest::weighting::combine_allocations;

/// Evaluate a numbered node
/// Evaluates multiple condition items and branches based on quantifier
pub fn evaluate<'a>(ctx: &mut EvalContext<'a>, node: &'a FlowNode) -> Allocation {
    let numbered = match &node.numbered {
        Some(n) => n,
        None => return empty_allocation(),
    };

    if numbered.items.is_empty() {
        return evaluate_branch(ctx, node, "then"); // No items = true
    }

    // Evaluate each item. Nulls count as false here, intentionally: the
    // quantifier interpretation differs from a single indicator's
    // three-valued logic.
    let mut true_count = 0;

    let index = ctx.indicator_index;
    for item in &numbered.items {
        let branch_values = precompute_branch_metrics(
            ctx, node, &item.conditions, &[index, index.saturating_sub(1)],
        );
        let branch_fn = branch_metric_lookup(&branch_values);

        let result = evaluate_conditions(
            ctx.cache,
            ctx.db,
            &item.conditions,
            item.group_logic.as_deref(),
            ctx.indicator_index,
            ctx.branch_parent_node,
            Some(&branch_fn),
            ctx.custom_indicators,
        );

        match result {
            ConditionResult::True => true_count += 1,
            ConditionResult::False | ConditionResult::Null => {}
        }
    }

    let total_items = numbered.items.len();
    let n = numbered.n as usize;

    // Determine branch based on quantifier
    let go_then = match numbered.quantifier {
        NumberedQuantifier::Any => true_count >= 1,
        NumberedQuantifier::All => true_count == total_items,
        NumberedQuantifier::None => true_count == 0,
        NumberedQuantifier::Exactly => true_count == n,
        NumberedQuantifier::AtLeast => true_count >= n,
        NumberedQuantifier::AtMost => true_count <= n,
        NumberedQuantifier::Ladder => {
            // Ladder mode: use ladder-N slot based on true count
            return evaluate_ladder(ctx, node, true_count, total_items);
        }
    };

    if go_then {
        evaluate_branch(ctx, node, "then")
    } else {
        evaluate_branch(ctx, node, "else")
    }
}

/// Evaluate a branch (then or else)
fn evaluate_branch<'a>(ctx: &mut EvalContext<'a>, node: &'a FlowNode, slot: &str) -> Allocation {
    let children = evaluate_children(ctx, node, slot);
    let active = get_active_children(children);

    if active.is_empty() {
        return empty_allocation();
    }

    let (weighting, vol_window) = match slot {
        "then" => (
            node.weighting_then.clone().unwrap_or(node.weighting.clone()),
            node.vol_window_then.or(node.vol_window),
        ),
        "else" => (
            node.weighting_else.clone().unwrap_or(node.weighting.clone()),
            node.vol_window_else.or(node.vol_window),
        ),
        _ => (node.weighting.clone(), node.vol_window),
    };

    combine_allocations(ctx, node, &active, &weighting, vol_window)
}

/// Evaluate ladder mode - pick slot based on true count, capped at the
/// number of declared items (the source never bounds K explicitly).
fn evaluate_ladder<'a>(
    ctx: &mut EvalContext<'a>,
    node: &'a FlowNode,
    true_count: usize,
    total_items: usize,
) -> Allocation {
    let capped_count = true_count.min(total_items);
    let ladder_slot = format!("ladder-{}", capped_count);
    let ladder_children = evaluate_children(ctx, node, &ladder_slot);
    let ladder_active = get_active_children(ladder_children);

    if !ladder_active.is_empty() {
        return combine_allocations(
            ctx, node, &ladder_active,
            &node.weighting, node.vol_window,
        );
    }

    // Fallback: true_count > 0 -> then, else -> else
    if true_count > 0 {
        evaluate_branch(ctx, node, "then")
    } else {
        evaluate_branch(ctx, node, "else")
    }
}
