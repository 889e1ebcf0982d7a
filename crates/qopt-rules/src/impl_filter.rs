//! Implementation rule for predicate evaluation.

use qopt_core::error::OptResult;
use qopt_core::expr::{LogicalOp, OpExpression, Operator, PhysicalOp};
use qopt_core::pattern::Pattern;
use qopt_core::rule::{OptContext, Rule, RuleType};

/// Logical `Filter` -> physical row-at-a-time predicate evaluation over the
/// same child. Order-preserving, so a required sort can be pushed through
/// it by the property derivation.
pub struct FilterToPhysicalRule;

impl Rule for FilterToPhysicalRule {
    fn name(&self) -> &str {
        "FilterToPhysical"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Implementation
    }

    fn pattern(&self) -> Pattern {
        Pattern::filter()
    }

    fn transform(&self, plan: &OpExpression, _ctx: &OptContext) -> OptResult<Vec<OpExpression>> {
        let Operator::Logical(LogicalOp::Filter { predicate }) = &plan.op else {
            return Ok(vec![]);
        };
        Ok(vec![OpExpression::new(
            Operator::Physical(PhysicalOp::FilterOp {
                predicate: predicate.clone(),
            }),
            plan.children.clone(),
        )])
    }
}
