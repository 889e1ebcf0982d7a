//! # Join Commutativity
//!
//! The algebraic identity `A JOIN B = B JOIN A`, valid for inner and cross
//! joins only -- outer, semi, and anti joins have fixed left/right semantics
//! and cannot be swapped without changing the result.
//!
//! Orientation matters to the cost model: the hash join build side and the
//! nested-loop outer side both come from the join's child order, so making
//! both orientations available lets the cheaper one win. The equi-condition
//! is mirrored along with the children so each orientation reads naturally
//! (`a.x = b.y` becomes `b.y = a.x`).

use qopt_core::error::OptResult;
use qopt_core::expr::{BinaryOp, Expr, JoinType, LogicalOp, OpExpression, Operator};
use qopt_core::pattern::Pattern;
use qopt_core::rule::{OptContext, Rule, RuleType};

/// `A JOIN B -> B JOIN A` for inner and cross joins.
pub struct JoinCommutativityRule;

impl Rule for JoinCommutativityRule {
    fn name(&self) -> &str {
        "JoinCommutativity"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Transformation
    }

    fn pattern(&self) -> Pattern {
        Pattern::join()
    }

    fn check(&self, plan: &OpExpression, _ctx: &OptContext) -> bool {
        matches!(
            &plan.op,
            Operator::Logical(LogicalOp::Join {
                join_type: JoinType::Inner | JoinType::Cross,
                ..
            })
        )
    }

    fn transform(&self, plan: &OpExpression, _ctx: &OptContext) -> OptResult<Vec<OpExpression>> {
        let Operator::Logical(LogicalOp::Join {
            join_type,
            condition,
        }) = &plan.op
        else {
            return Ok(vec![]);
        };
        if plan.children.len() != 2 {
            return Ok(vec![]);
        }

        let swapped = OpExpression::new(
            Operator::Logical(LogicalOp::Join {
                join_type: *join_type,
                condition: mirror_condition(condition),
            }),
            vec![plan.children[1].clone(), plan.children[0].clone()],
        );
        Ok(vec![swapped])
    }
}

/// Mirrors the sides of each equality conjunct: `a.x = b.y` becomes
/// `b.y = a.x`. Semantically identical, but keeps the convention that the
/// left operand refers to the left child.
fn mirror_condition(expr: &Expr) -> Expr {
    match expr {
        Expr::BinaryOp {
            op: BinaryOp::Eq,
            left,
            right,
        } => Expr::BinaryOp {
            op: BinaryOp::Eq,
            left: right.clone(),
            right: left.clone(),
        },
        Expr::And(conjuncts) => Expr::And(conjuncts.iter().map(mirror_condition).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qopt_core::catalog::InMemoryCatalog;
    use qopt_core::expr::ColumnRef;

    fn ctx_catalog() -> InMemoryCatalog {
        InMemoryCatalog::new()
    }

    fn join_plan(join_type: JoinType) -> OpExpression {
        OpExpression::new(
            Operator::Logical(LogicalOp::Join {
                join_type,
                condition: Expr::BinaryOp {
                    op: BinaryOp::Eq,
                    left: Box::new(Expr::Column(ColumnRef::new("a", "x", 0))),
                    right: Box::new(Expr::Column(ColumnRef::new("b", "y", 0))),
                },
            }),
            vec![
                OpExpression::leaf(Operator::Logical(LogicalOp::Get {
                    table: qopt_core::expr::TableRef::new("s", "a"),
                    columns: vec![],
                })),
                OpExpression::leaf(Operator::Logical(LogicalOp::Get {
                    table: qopt_core::expr::TableRef::new("s", "b"),
                    columns: vec![],
                })),
            ],
        )
    }

    #[test]
    fn inner_join_commutes_with_mirrored_condition() {
        let catalog = ctx_catalog();
        let ctx = OptContext { catalog: &catalog };
        let plan = join_plan(JoinType::Inner);
        assert!(JoinCommutativityRule.check(&plan, &ctx));

        let out = JoinCommutativityRule.transform(&plan, &ctx).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].children[0], plan.children[1]);
        assert_eq!(out[0].children[1], plan.children[0]);
        let Operator::Logical(LogicalOp::Join { condition, .. }) = &out[0].op else {
            panic!("expected a join");
        };
        let Expr::BinaryOp { left, .. } = condition else {
            panic!("expected a binary op");
        };
        assert!(matches!(left.as_ref(), Expr::Column(c) if c.table.as_deref() == Some("b")));
    }

    #[test]
    fn outer_joins_do_not_commute() {
        let catalog = ctx_catalog();
        let ctx = OptContext { catalog: &catalog };
        assert!(!JoinCommutativityRule.check(&join_plan(JoinType::Left), &ctx));
        assert!(!JoinCommutativityRule.check(&join_plan(JoinType::Right), &ctx));
        assert!(!JoinCommutativityRule.check(&join_plan(JoinType::Full), &ctx));
    }
}
