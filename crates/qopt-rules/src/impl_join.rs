//! # Join Implementation Rules
//!
//! Three physical join algorithms with different applicability gates and
//! cost profiles:
//!
//! - **Nested loop join**: the universal fallback. Works for any join type
//!   and any condition, including non-equi predicates and cross products,
//!   at O(n * m) cost. Every join group gets at least this alternative, so
//!   every logical join is implementable.
//! - **Hash join**: inner equi-joins only. Produces two alternatives per
//!   binding, build-left and build-right, and lets the cost model pick the
//!   smaller build side.
//! - **Merge join**: inner equi-joins over sorted inputs. The sort
//!   requirements are not enforced here; the operator declares them as
//!   required input properties and the search either finds naturally sorted
//!   children or pays for sort enforcers.

use qopt_core::error::OptResult;
use qopt_core::expr::{
    BuildSide, JoinType, LogicalOp, OpExpression, Operator, PhysicalOp,
};
use qopt_core::pattern::Pattern;
use qopt_core::rule::{OptContext, Rule, RuleType};
use qopt_core::stats::equi_join_column_pairs;

/// Any logical join -> nested loop join.
pub struct JoinToNestedLoopJoinRule;

impl Rule for JoinToNestedLoopJoinRule {
    fn name(&self) -> &str {
        "JoinToNestedLoopJoin"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Implementation
    }

    fn pattern(&self) -> Pattern {
        Pattern::join()
    }

    fn transform(&self, plan: &OpExpression, _ctx: &OptContext) -> OptResult<Vec<OpExpression>> {
        let Operator::Logical(LogicalOp::Join {
            join_type,
            condition,
        }) = &plan.op
        else {
            return Ok(vec![]);
        };
        Ok(vec![OpExpression::new(
            Operator::Physical(PhysicalOp::NestedLoopJoin {
                join_type: *join_type,
                condition: condition.clone(),
            }),
            plan.children.clone(),
        )])
    }
}

/// Inner equi-join -> hash join, build-left and build-right.
pub struct JoinToHashJoinRule;

impl Rule for JoinToHashJoinRule {
    fn name(&self) -> &str {
        "JoinToHashJoin"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Implementation
    }

    fn pattern(&self) -> Pattern {
        Pattern::join()
    }

    fn check(&self, plan: &OpExpression, _ctx: &OptContext) -> bool {
        match &plan.op {
            Operator::Logical(LogicalOp::Join {
                join_type: JoinType::Inner,
                condition,
            }) => !equi_join_column_pairs(condition).is_empty(),
            _ => false,
        }
    }

    fn transform(&self, plan: &OpExpression, _ctx: &OptContext) -> OptResult<Vec<OpExpression>> {
        let Operator::Logical(LogicalOp::Join {
            join_type,
            condition,
        }) = &plan.op
        else {
            return Ok(vec![]);
        };
        let mut out = Vec::with_capacity(2);
        for build_side in [BuildSide::Right, BuildSide::Left] {
            out.push(OpExpression::new(
                Operator::Physical(PhysicalOp::HashJoin {
                    join_type: *join_type,
                    build_side,
                    condition: condition.clone(),
                }),
                plan.children.clone(),
            ));
        }
        Ok(out)
    }
}

/// Inner equi-join -> merge join over sorted inputs.
pub struct JoinToMergeJoinRule;

impl Rule for JoinToMergeJoinRule {
    fn name(&self) -> &str {
        "JoinToMergeJoin"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Implementation
    }

    fn pattern(&self) -> Pattern {
        Pattern::join()
    }

    fn check(&self, plan: &OpExpression, _ctx: &OptContext) -> bool {
        match &plan.op {
            Operator::Logical(LogicalOp::Join {
                join_type: JoinType::Inner,
                condition,
            }) => !equi_join_column_pairs(condition).is_empty(),
            _ => false,
        }
    }

    fn transform(&self, plan: &OpExpression, _ctx: &OptContext) -> OptResult<Vec<OpExpression>> {
        let Operator::Logical(LogicalOp::Join {
            join_type,
            condition,
        }) = &plan.op
        else {
            return Ok(vec![]);
        };
        Ok(vec![OpExpression::new(
            Operator::Physical(PhysicalOp::MergeJoin {
                join_type: *join_type,
                condition: condition.clone(),
            }),
            plan.children.clone(),
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qopt_core::catalog::InMemoryCatalog;
    use qopt_core::expr::{BinaryOp, ColumnRef, Expr, ScalarValue, TableRef};

    fn leaf(name: &str) -> OpExpression {
        OpExpression::leaf(Operator::Logical(LogicalOp::Get {
            table: TableRef::new("s", name),
            columns: vec![],
        }))
    }

    fn join(join_type: JoinType, condition: Expr) -> OpExpression {
        OpExpression::new(
            Operator::Logical(LogicalOp::Join {
                join_type,
                condition,
            }),
            vec![leaf("a"), leaf("b")],
        )
    }

    fn equi() -> Expr {
        Expr::BinaryOp {
            op: BinaryOp::Eq,
            left: Box::new(Expr::Column(ColumnRef::new("a", "k", 0))),
            right: Box::new(Expr::Column(ColumnRef::new("b", "k", 0))),
        }
    }

    #[test]
    fn nested_loop_applies_to_any_join_type() {
        let catalog = InMemoryCatalog::new();
        let ctx = OptContext { catalog: &catalog };
        for join_type in [JoinType::Inner, JoinType::Left, JoinType::Full, JoinType::Cross] {
            let plan = join(join_type, Expr::Literal(ScalarValue::Bool(true)));
            assert!(JoinToNestedLoopJoinRule.check(&plan, &ctx));
            let out = JoinToNestedLoopJoinRule.transform(&plan, &ctx).unwrap();
            assert_eq!(out.len(), 1);
            assert!(matches!(
                &out[0].op,
                Operator::Physical(PhysicalOp::NestedLoopJoin { join_type: jt, .. }) if *jt == join_type
            ));
        }
    }

    #[test]
    fn hash_join_produces_both_build_sides() {
        let catalog = InMemoryCatalog::new();
        let ctx = OptContext { catalog: &catalog };
        let plan = join(JoinType::Inner, equi());
        assert!(JoinToHashJoinRule.check(&plan, &ctx));
        let out = JoinToHashJoinRule.transform(&plan, &ctx).unwrap();
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn hash_and_merge_require_inner_equi_joins() {
        let catalog = InMemoryCatalog::new();
        let ctx = OptContext { catalog: &catalog };

        let left_equi = join(JoinType::Left, equi());
        assert!(!JoinToHashJoinRule.check(&left_equi, &ctx));
        assert!(!JoinToMergeJoinRule.check(&left_equi, &ctx));

        let inner_non_equi = join(
            JoinType::Inner,
            Expr::BinaryOp {
                op: BinaryOp::Lt,
                left: Box::new(Expr::Column(ColumnRef::new("a", "k", 0))),
                right: Box::new(Expr::Column(ColumnRef::new("b", "k", 0))),
            },
        );
        assert!(!JoinToHashJoinRule.check(&inner_non_equi, &ctx));
        assert!(!JoinToMergeJoinRule.check(&inner_non_equi, &ctx));
        assert!(JoinToNestedLoopJoinRule.check(&inner_non_equi, &ctx));
    }
}
