//! # Sort Implementation / Enforcer
//!
//! An enforcer is a physical operator whose only job is to establish a
//! required property the child plan lacks. `SortOp` is the canonical one:
//! it appears here as the implementation of an explicit logical `Sort`
//! (an ORDER BY clause), and the search driver injects the same operator on
//! top of an unsorted winner whenever a requirement's sort order cannot be
//! met natively -- whichever is cheaper wins.

use qopt_core::error::OptResult;
use qopt_core::expr::{LogicalOp, OpExpression, Operator, PhysicalOp};
use qopt_core::pattern::Pattern;
use qopt_core::rule::{OptContext, Rule, RuleType};

/// Logical `Sort` -> physical sort.
pub struct SortToSortOpRule;

impl Rule for SortToSortOpRule {
    fn name(&self) -> &str {
        "SortToSortOp"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Implementation
    }

    fn pattern(&self) -> Pattern {
        Pattern::sort()
    }

    fn transform(&self, plan: &OpExpression, _ctx: &OptContext) -> OptResult<Vec<OpExpression>> {
        let Operator::Logical(LogicalOp::Sort { order }) = &plan.op else {
            return Ok(vec![]);
        };
        Ok(vec![OpExpression::new(
            Operator::Physical(PhysicalOp::SortOp {
                order: order.clone(),
            }),
            plan.children.clone(),
        )])
    }
}
