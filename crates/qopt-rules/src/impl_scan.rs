//! Implementation rule for base-table access.
//!
//! A logical `Get` becomes a sequential (full) table scan carrying the same
//! table and column references. The scan is the only leaf physical operator
//! and anchors every costing recursion with catalog statistics.

use qopt_core::error::OptResult;
use qopt_core::expr::{LogicalOp, OpExpression, Operator, PhysicalOp};
use qopt_core::pattern::Pattern;
use qopt_core::rule::{OptContext, Rule, RuleType};

/// `Get(t)` -> `SeqScan(t)`.
pub struct GetToSeqScanRule;

impl Rule for GetToSeqScanRule {
    fn name(&self) -> &str {
        "GetToSeqScan"
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Implementation
    }

    fn pattern(&self) -> Pattern {
        Pattern::get()
    }

    fn transform(&self, plan: &OpExpression, _ctx: &OptContext) -> OptResult<Vec<OpExpression>> {
        let Operator::Logical(LogicalOp::Get { table, columns }) = &plan.op else {
            return Ok(vec![]);
        };
        Ok(vec![OpExpression::leaf(Operator::Physical(
            PhysicalOp::SeqScan {
                table: table.clone(),
                columns: columns.clone(),
            },
        ))])
    }
}
