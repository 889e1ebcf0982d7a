//! Implementation rule for projection.

use qopt_core::error::OptResult;
use qopt_core::expr::{LogicalOp, OpExpression, Operator, PhysicalOp};
use qopt_core::pattern::Pattern;
use qopt_core::rule::{OptContext, Rule, RuleType};

/// Logical `Project` -> physical expression evaluation per row.
pub struct ProjectToPhysicalRule;

impl Rule for ProjectToPhysicalRule {
    fn name(&self) -> &str {
        "ProjectToPhysical"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Implementation
    }

    fn pattern(&self) -> Pattern {
        Pattern::project()
    }

    fn transform(&self, plan: &OpExpression, _ctx: &OptContext) -> OptResult<Vec<OpExpression>> {
        let Operator::Logical(LogicalOp::Project { exprs, aliases }) = &plan.op else {
            return Ok(vec![]);
        };
        Ok(vec![OpExpression::new(
            Operator::Physical(PhysicalOp::ProjectOp {
                exprs: exprs.clone(),
                aliases: aliases.clone(),
            }),
            plan.children.clone(),
        )])
    }
}
