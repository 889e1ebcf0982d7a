//! # Aggregate Implementation Rules
//!
//! Two physical strategies for aggregation:
//!
//! - **Hash aggregate**: builds a hash table keyed by the group-by columns.
//!   Accepts any input order; memory grows with the number of groups.
//! - **Stream aggregate**: a single O(1)-memory pass over input sorted on
//!   the group-by columns. The sort requirement is declared as an input
//!   property, so the search charges for a sort enforcer unless the child
//!   is already sorted. A global aggregate (no group-by) streams trivially.

use qopt_core::error::OptResult;
use qopt_core::expr::{LogicalOp, OpExpression, Operator, PhysicalOp};
use qopt_core::pattern::Pattern;
use qopt_core::rule::{OptContext, Rule, RuleType};

/// Logical `Aggregate` -> hash aggregate.
pub struct AggregateToHashAggregateRule;

impl Rule for AggregateToHashAggregateRule {
    fn name(&self) -> &str {
        "AggregateToHashAggregate"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Implementation
    }

    fn pattern(&self) -> Pattern {
        Pattern::aggregate()
    }

    fn transform(&self, plan: &OpExpression, _ctx: &OptContext) -> OptResult<Vec<OpExpression>> {
        let Operator::Logical(LogicalOp::Aggregate {
            group_by,
            aggregates,
        }) = &plan.op
        else {
            return Ok(vec![]);
        };
        Ok(vec![OpExpression::new(
            Operator::Physical(PhysicalOp::HashAggregate {
                group_by: group_by.clone(),
                aggregates: aggregates.clone(),
            }),
            plan.children.clone(),
        )])
    }
}

/// Logical `Aggregate` -> stream aggregate over sorted input.
pub struct AggregateToStreamAggregateRule;

impl Rule for AggregateToStreamAggregateRule {
    fn name(&self) -> &str {
        "AggregateToStreamAggregate"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Implementation
    }

    fn pattern(&self) -> Pattern {
        Pattern::aggregate()
    }

    fn transform(&self, plan: &OpExpression, _ctx: &OptContext) -> OptResult<Vec<OpExpression>> {
        let Operator::Logical(LogicalOp::Aggregate {
            group_by,
            aggregates,
        }) = &plan.op
        else {
            return Ok(vec![]);
        };
        Ok(vec![OpExpression::new(
            Operator::Physical(PhysicalOp::StreamAggregate {
                group_by: group_by.clone(),
                aggregates: aggregates.clone(),
            }),
            plan.children.clone(),
        )])
    }
}
