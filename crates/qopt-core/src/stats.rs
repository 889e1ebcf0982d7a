//! # Statistics and Cardinality Estimation
//!
//! Statistics flow child to parent during costing: base-table statistics
//! come from the catalog, and each physical operator derives its output
//! statistics from its children's. The derivations here are the standard
//! textbook formulas:
//!
//! - **Filter**: `out = in * selectivity`, column NDVs scaled by the row
//!   reduction ratio.
//! - **Join**: `|A ⋈ B| = |A| * |B| / max(NDV(A.key), NDV(B.key))` per
//!   equi-join column pair, selectivities multiplied under the independence
//!   assumption.
//! - **Aggregate**: output groups = product of group-by column NDVs, capped
//!   by the input row count; a global aggregate yields one row.
//! - **Limit**: `out = min(in, count)`.
//!
//! Selectivity estimation: equality is `1 / NDV` (uniform distribution),
//! ranges use a fixed 1/3, conjunctions multiply, disjunctions use
//! inclusion-exclusion, and anything else falls back to
//! [`DEFAULT_FILTER_SELECTIVITY`]. Stats are reproducible from the same
//! inputs; they carry no hidden state.

use crate::expr::{BinaryOp, Expr};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Selectivity assumed when no better estimate is available.
pub const DEFAULT_FILTER_SELECTIVITY: f64 = 0.1;

/// Selectivity assumed for range predicates.
pub const RANGE_SELECTIVITY: f64 = 0.33;

/// Statistics describing one relation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statistics {
    pub row_count: f64,
    pub total_size_bytes: f64,
    pub column_stats: HashMap<String, ColumnStatistics>,
}

impl Statistics {
    pub fn new(row_count: f64, total_size_bytes: f64) -> Self {
        Self {
            row_count,
            total_size_bytes,
            column_stats: HashMap::new(),
        }
    }

    pub fn with_column(mut self, name: impl Into<String>, stats: ColumnStatistics) -> Self {
        self.column_stats.insert(name.into(), stats);
        self
    }

    /// Average row width in bytes, with a 100-byte fallback for empty input.
    pub fn avg_row_size(&self) -> f64 {
        if self.row_count > 0.0 {
            self.total_size_bytes / self.row_count
        } else {
            100.0
        }
    }
}

/// Per-column statistics, typically gathered by an external ANALYZE pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnStatistics {
    /// Number of distinct values. Drives equality selectivity (`1 / NDV`)
    /// and join cardinality.
    pub distinct_count: f64,
    /// Fraction of rows that are NULL, in `[0, 1]`.
    pub null_fraction: f64,
    /// Average value size in bytes.
    pub avg_value_size: f64,
}

impl ColumnStatistics {
    pub fn new(distinct_count: f64, null_fraction: f64) -> Self {
        Self {
            distinct_count,
            null_fraction,
            avg_value_size: 8.0,
        }
    }
}

/// Filter output: scales rows, bytes, and NDVs by the selectivity.
pub fn derive_filter_stats(input: &Statistics, selectivity: f64) -> Statistics {
    let row_count = (input.row_count * selectivity).max(1.0);
    let ratio = if input.row_count > 0.0 {
        row_count / input.row_count
    } else {
        1.0
    };

    let mut column_stats = HashMap::new();
    for (name, stats) in &input.column_stats {
        let mut cs = stats.clone();
        cs.distinct_count = (cs.distinct_count * ratio).max(1.0).min(row_count);
        column_stats.insert(name.clone(), cs);
    }

    Statistics {
        row_count,
        total_size_bytes: input.total_size_bytes * ratio,
        column_stats,
    }
}

/// Equi-join output via the containment assumption: the smaller key domain
/// is contained in the larger, so each column pair contributes a factor of
/// `1 / max(NDV_left, NDV_right)`. A join with no equi columns degenerates
/// to the cross product.
pub fn derive_join_stats(
    left: &Statistics,
    right: &Statistics,
    join_columns: &[(String, String)],
) -> Statistics {
    let mut selectivity = 1.0_f64;
    for (lc, rc) in join_columns {
        let left_ndv = left
            .column_stats
            .get(lc)
            .map(|s| s.distinct_count)
            .unwrap_or(left.row_count);
        let right_ndv = right
            .column_stats
            .get(rc)
            .map(|s| s.distinct_count)
            .unwrap_or(right.row_count);
        selectivity /= left_ndv.max(right_ndv).max(1.0);
    }

    let row_count = (left.row_count * right.row_count * selectivity).max(1.0);
    let total_size_bytes = row_count * (left.avg_row_size() + right.avg_row_size());

    // Column stats survive from both sides; NDV can never exceed the output
    // row count.
    let mut column_stats = HashMap::new();
    for (name, stats) in left.column_stats.iter().chain(right.column_stats.iter()) {
        let mut cs = stats.clone();
        cs.distinct_count = cs.distinct_count.min(row_count);
        column_stats.insert(name.clone(), cs);
    }

    Statistics {
        row_count,
        total_size_bytes,
        column_stats,
    }
}

/// Aggregate output: product of group-by NDVs capped by input rows; one row
/// for a global aggregate. Column stats are not propagated because the
/// outputs are aggregate values.
pub fn derive_aggregate_stats(input: &Statistics, group_by_cols: &[String]) -> Statistics {
    let mut row_count = 1.0_f64;
    for col in group_by_cols {
        let ndv = input
            .column_stats
            .get(col)
            .map(|s| s.distinct_count)
            .unwrap_or(input.row_count);
        row_count *= ndv;
    }
    row_count = row_count.min(input.row_count).max(1.0);

    Statistics {
        row_count,
        total_size_bytes: row_count * 100.0,
        column_stats: HashMap::new(),
    }
}

/// Limit output: truncates the row count, preserving column stats.
pub fn derive_limit_stats(input: &Statistics, count: u64) -> Statistics {
    let row_count = input.row_count.min(count as f64).max(1.0);
    let ratio = if input.row_count > 0.0 {
        row_count / input.row_count
    } else {
        1.0
    };
    Statistics {
        row_count,
        total_size_bytes: input.total_size_bytes * ratio,
        column_stats: input.column_stats.clone(),
    }
}

/// Selectivity of `col = value`: `1 / NDV(col)` under the uniform
/// distribution assumption.
pub fn equality_selectivity(stats: &Statistics, col_name: &str) -> f64 {
    stats
        .column_stats
        .get(col_name)
        .map(|cs| 1.0 / cs.distinct_count.max(1.0))
        .unwrap_or(DEFAULT_FILTER_SELECTIVITY)
}

/// Estimated fraction of input rows passing a predicate.
pub fn estimate_selectivity(expr: &Expr, stats: &Statistics) -> f64 {
    match expr {
        Expr::BinaryOp {
            op: BinaryOp::Eq,
            left,
            right,
        } => {
            if let Expr::Column(c) = left.as_ref() {
                return equality_selectivity(stats, &c.name);
            }
            if let Expr::Column(c) = right.as_ref() {
                return equality_selectivity(stats, &c.name);
            }
            DEFAULT_FILTER_SELECTIVITY
        }
        Expr::BinaryOp {
            op: BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq,
            ..
        } => RANGE_SELECTIVITY,
        Expr::And(conjuncts) => conjuncts
            .iter()
            .map(|c| estimate_selectivity(c, stats))
            .product(),
        Expr::Or(disjuncts) => {
            let miss: f64 = disjuncts
                .iter()
                .map(|d| 1.0 - estimate_selectivity(d, stats))
                .product();
            1.0 - miss
        }
        _ => DEFAULT_FILTER_SELECTIVITY,
    }
}

/// Column name pairs of the equi-conjuncts in a join condition:
/// `a.x = b.y AND a.z = b.w` yields `[("x", "y"), ("z", "w")]`.
pub fn equi_join_column_pairs(condition: &Expr) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for conjunct in condition.conjuncts() {
        if let Expr::BinaryOp {
            op: BinaryOp::Eq,
            left,
            right,
        } = conjunct
        {
            if let (Expr::Column(l), Expr::Column(r)) = (left.as_ref(), right.as_ref()) {
                pairs.push((l.name.clone(), r.name.clone()));
            }
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{ColumnRef, ScalarValue};

    fn table(rows: f64, cols: &[(&str, f64)]) -> Statistics {
        let mut s = Statistics::new(rows, rows * 100.0);
        for (name, ndv) in cols {
            s = s.with_column(*name, ColumnStatistics::new(*ndv, 0.0));
        }
        s
    }

    fn col(name: &str) -> Expr {
        Expr::Column(ColumnRef::new("t", name, 0))
    }

    #[test]
    fn filter_scales_rows_and_ndvs() {
        let input = table(1000.0, &[("x", 100.0)]);
        let out = derive_filter_stats(&input, 0.1);
        assert_eq!(out.row_count, 100.0);
        assert!(out.column_stats["x"].distinct_count <= 100.0);
    }

    #[test]
    fn join_uses_max_ndv_containment() {
        let left = table(1000.0, &[("k", 100.0)]);
        let right = table(500.0, &[("k", 50.0)]);
        let out = derive_join_stats(&left, &right, &[("k".into(), "k".into())]);
        assert_eq!(out.row_count, 1000.0 * 500.0 / 100.0);
    }

    #[test]
    fn join_without_equi_columns_is_cross_product() {
        let left = table(10.0, &[]);
        let right = table(20.0, &[]);
        let out = derive_join_stats(&left, &right, &[]);
        assert_eq!(out.row_count, 200.0);
    }

    #[test]
    fn aggregate_caps_groups_at_input_rows() {
        let input = table(100.0, &[("a", 50.0), ("b", 40.0)]);
        let out = derive_aggregate_stats(&input, &["a".into(), "b".into()]);
        assert_eq!(out.row_count, 100.0);

        let global = derive_aggregate_stats(&input, &[]);
        assert_eq!(global.row_count, 1.0);
    }

    #[test]
    fn limit_truncates() {
        let input = table(1000.0, &[]);
        assert_eq!(derive_limit_stats(&input, 10).row_count, 10.0);
        assert_eq!(derive_limit_stats(&input, 10_000).row_count, 1000.0);
    }

    #[test]
    fn selectivity_estimates() {
        let stats = table(1000.0, &[("x", 200.0)]);
        let eq = Expr::BinaryOp {
            op: BinaryOp::Eq,
            left: Box::new(col("x")),
            right: Box::new(Expr::Literal(ScalarValue::Int64(7))),
        };
        assert!((estimate_selectivity(&eq, &stats) - 1.0 / 200.0).abs() < 1e-12);

        let range = Expr::BinaryOp {
            op: BinaryOp::Gt,
            left: Box::new(col("x")),
            right: Box::new(Expr::Literal(ScalarValue::Int64(7))),
        };
        assert_eq!(estimate_selectivity(&range, &stats), RANGE_SELECTIVITY);

        let both = Expr::And(vec![eq.clone(), range]);
        assert!(estimate_selectivity(&both, &stats) < estimate_selectivity(&eq, &stats));
    }

    #[test]
    fn equi_pairs_skip_non_equi_conjuncts() {
        let cond = Expr::And(vec![
            Expr::BinaryOp {
                op: BinaryOp::Eq,
                left: Box::new(Expr::Column(ColumnRef::new("a", "x", 0))),
                right: Box::new(Expr::Column(ColumnRef::new("b", "y", 0))),
            },
            Expr::BinaryOp {
                op: BinaryOp::Lt,
                left: Box::new(Expr::Column(ColumnRef::new("a", "z", 0))),
                right: Box::new(Expr::Literal(ScalarValue::Int64(3))),
            },
        ]);
        assert_eq!(equi_join_column_pairs(&cond), vec![("x".into(), "y".into())]);
    }
}
