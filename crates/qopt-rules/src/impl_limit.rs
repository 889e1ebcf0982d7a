//! Implementation rule for LIMIT / OFFSET.

use qopt_core::error::OptResult;
use qopt_core::expr::{LogicalOp, OpExpression, Operator, PhysicalOp};
use qopt_core::pattern::Pattern;
use qopt_core::rule::{OptContext, Rule, RuleType};

/// Logical `Limit` -> physical row-count truncation. Order-preserving.
pub struct LimitToLimitOpRule;

impl Rule for LimitToLimitOpRule {
    fn name(&self) -> &str {
        "LimitToLimitOp"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Implementation
    }

    fn pattern(&self) -> Pattern {
        Pattern::limit()
    }

    fn transform(&self, plan: &OpExpression, _ctx: &OptContext) -> OptResult<Vec<OpExpression>> {
        let Operator::Logical(LogicalOp::Limit { offset, count }) = &plan.op else {
            return Ok(vec![]);
        };
        Ok(vec![OpExpression::new(
            Operator::Physical(PhysicalOp::LimitOp {
                offset: *offset,
                count: *count,
            }),
            plan.children.clone(),
        )])
    }
}
