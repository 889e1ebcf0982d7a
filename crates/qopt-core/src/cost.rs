//! # Cost Model
//!
//! A [`Cost`] is a single non-negative real; lower is better, and infinity
//! marks an infeasible plan. Costs accumulate bottom-up: the total cost of a
//! plan is its local operator cost plus the costs of its children, added
//! with saturation so that overflow degrades to "infeasible" rather than
//! wrapping into a small number the search would happily select.
//!
//! The [`CostModel`] trait keeps the model pluggable. [`DefaultCostModel`]
//! collapses two dimensions into the total with configurable weights:
//!
//! ```text
//! total = cpu_weight * cpu + memory_weight * memory
//! ```
//!
//! CPU cost tracks rows processed or comparisons made; memory cost tracks
//! bytes materialized (hash tables, sort buffers). Replacing a child's plan
//! with a cheaper one can only lower the parent's total, which the search
//! relies on when it recurses child-first.

use crate::expr::{BuildSide, PhysicalOp};
use crate::stats::Statistics;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Estimated expense of a plan. Lower is better.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Cost(f64);

impl Cost {
    pub fn new(value: f64) -> Self {
        if value.is_finite() && value >= 0.0 {
            Cost(value)
        } else {
            Cost::infinite()
        }
    }

    pub fn zero() -> Self {
        Cost(0.0)
    }

    /// The infeasible cost: never selected as a winner.
    pub fn infinite() -> Self {
        Cost(f64::INFINITY)
    }

    pub fn is_infinite(&self) -> bool {
        self.0.is_infinite()
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    /// Saturating addition: any overflow yields the infinite cost.
    pub fn add(self, other: Cost) -> Cost {
        Cost::new(self.0 + other.0)
    }
}

impl PartialEq for Cost {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl PartialOrd for Cost {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.0.partial_cmp(&other.0)
    }
}

/// Pluggable per-operator cost estimation.
pub trait CostModel: Send + Sync {
    /// Total cost of `op` producing `output_stats` from children with the
    /// given statistics and (already accumulated) costs.
    fn compute_cost(
        &self,
        op: &PhysicalOp,
        output_stats: &Statistics,
        child_stats: &[Statistics],
        child_costs: &[Cost],
    ) -> Cost;
}

/// Weighted cpu/memory cost model.
pub struct DefaultCostModel {
    /// Weight for row processing and comparisons.
    pub cpu_weight: f64,
    /// Weight for bytes held in memory (hash tables, sort buffers).
    pub memory_weight: f64,
}

impl Default for DefaultCostModel {
    fn default() -> Self {
        Self {
            cpu_weight: 1.0,
            memory_weight: 1.0,
        }
    }
}

impl DefaultCostModel {
    fn rows(stats: &[Statistics], i: usize) -> f64 {
        stats.get(i).map(|s| s.row_count).unwrap_or(1000.0)
    }

    fn local_cost(&self, op: &PhysicalOp, output_stats: &Statistics, child_stats: &[Statistics]) -> f64 {
        match op {
            // Every row is read and evaluated once.
            PhysicalOp::SeqScan { .. } => self.cpu_weight * output_stats.row_count,
            PhysicalOp::FilterOp { .. } | PhysicalOp::ProjectOp { .. } => {
                self.cpu_weight * Self::rows(child_stats, 0)
            }
            // Build the hash table on the build side, probe with the other.
            PhysicalOp::HashJoin { build_side, .. } => {
                let (build, probe) = match build_side {
                    BuildSide::Left => (0, 1),
                    BuildSide::Right => (1, 0),
                };
                let build_bytes = child_stats
                    .get(build)
                    .map(|s| s.total_size_bytes)
                    .unwrap_or(100_000.0);
                self.cpu_weight * (Self::rows(child_stats, build) + Self::rows(child_stats, probe))
                    + self.memory_weight * build_bytes
            }
            // Both cursors advance at most once per row.
            PhysicalOp::MergeJoin { .. } => {
                self.cpu_weight * (Self::rows(child_stats, 0) + Self::rows(child_stats, 1))
            }
            // Each left row scans all right rows.
            PhysicalOp::NestedLoopJoin { .. } => {
                self.cpu_weight * Self::rows(child_stats, 0) * Self::rows(child_stats, 1)
            }
            PhysicalOp::HashAggregate { .. } => {
                let rows = Self::rows(child_stats, 0);
                self.cpu_weight * rows + self.memory_weight * rows * 100.0
            }
            PhysicalOp::StreamAggregate { .. } => self.cpu_weight * Self::rows(child_stats, 0),
            PhysicalOp::SortOp { .. } => {
                let rows = Self::rows(child_stats, 0);
                let bytes = child_stats
                    .first()
                    .map(|s| s.total_size_bytes)
                    .unwrap_or(rows * 100.0);
                let comparisons = if rows > 1.0 { rows * rows.log2() } else { 1.0 };
                self.cpu_weight * comparisons + self.memory_weight * bytes
            }
            PhysicalOp::LimitOp { .. } => self.cpu_weight * output_stats.row_count,
        }
    }
}

impl CostModel for DefaultCostModel {
    fn compute_cost(
        &self,
        op: &PhysicalOp,
        output_stats: &Statistics,
        child_stats: &[Statistics],
        child_costs: &[Cost],
    ) -> Cost {
        let children = child_costs
            .iter()
            .fold(Cost::zero(), |acc, c| acc.add(*c));
        children.add(Cost::new(self.local_cost(op, output_stats, child_stats)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{ColumnRef, Expr, JoinType};

    fn equi() -> Expr {
        Expr::BinaryOp {
            op: crate::expr::BinaryOp::Eq,
            left: Box::new(Expr::Column(ColumnRef::new("a", "k", 0))),
            right: Box::new(Expr::Column(ColumnRef::new("b", "k", 0))),
        }
    }

    #[test]
    fn building_on_the_small_side_is_cheaper() {
        let model = DefaultCostModel::default();
        let small = Statistics::new(100.0, 10_000.0);
        let large = Statistics::new(1_000_000.0, 100_000_000.0);
        let out = Statistics::new(1_000_000.0, 100_000_000.0);

        let build_left = PhysicalOp::HashJoin {
            join_type: JoinType::Inner,
            build_side: BuildSide::Left,
            condition: equi(),
        };
        let build_right = PhysicalOp::HashJoin {
            join_type: JoinType::Inner,
            build_side: BuildSide::Right,
            condition: equi(),
        };

        let children = [small, large];
        let costs = [Cost::zero(), Cost::zero()];
        let left = model.compute_cost(&build_left, &out, &children, &costs);
        let right = model.compute_cost(&build_right, &out, &children, &costs);
        assert!(left < right);
    }

    #[test]
    fn hash_join_beats_nested_loop_on_large_inputs() {
        let model = DefaultCostModel::default();
        let a = Statistics::new(10_000.0, 1_000_000.0);
        let b = Statistics::new(10_000.0, 1_000_000.0);
        let out = Statistics::new(10_000.0, 2_000_000.0);
        let children = [a, b];
        let costs = [Cost::zero(), Cost::zero()];

        let hash = model.compute_cost(
            &PhysicalOp::HashJoin {
                join_type: JoinType::Inner,
                build_side: BuildSide::Left,
                condition: equi(),
            },
            &out,
            &children,
            &costs,
        );
        let nlj = model.compute_cost(
            &PhysicalOp::NestedLoopJoin {
                join_type: JoinType::Inner,
                condition: equi(),
            },
            &out,
            &children,
            &costs,
        );
        assert!(hash < nlj);
    }

    #[test]
    fn child_costs_accumulate() {
        let model = DefaultCostModel::default();
        let stats = Statistics::new(100.0, 10_000.0);
        let cheap = model.compute_cost(
            &PhysicalOp::FilterOp {
                predicate: Expr::Literal(crate::expr::ScalarValue::Bool(true)),
            },
            &stats,
            std::slice::from_ref(&stats),
            &[Cost::zero()],
        );
        let expensive = model.compute_cost(
            &PhysicalOp::FilterOp {
                predicate: Expr::Literal(crate::expr::ScalarValue::Bool(true)),
            },
            &stats,
            std::slice::from_ref(&stats),
            &[Cost::new(1_000_000.0)],
        );
        assert!(cheap < expensive);
    }

    #[test]
    fn overflow_saturates_to_infinite() {
        let huge = Cost::new(f64::MAX);
        let sum = huge.add(Cost::new(f64::MAX));
        assert!(sum.is_infinite());
        assert!(Cost::new(1.0) < sum);
        assert!(Cost::new(f64::NAN).is_infinite());
        assert!(Cost::new(-1.0).is_infinite());
    }
}
