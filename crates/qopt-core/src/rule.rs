//! # Rule System
//!
//! Two kinds of rules drive the search:
//!
//! - **Transformation rules** rewrite a logical expression into equivalent
//!   logical alternatives (join commutativity is the canonical example).
//!   They expand the search space during the explore phase.
//! - **Implementation rules** lower a logical operator to one or more
//!   physical operators (a logical join becomes a hash join, merge join,
//!   or nested loop join). Their outputs are the candidates the cost model
//!   scores during optimization.
//!
//! A rule is a (pattern, check, transform) triple. The pattern finds
//! candidate subtrees via the binding iterator; `check` is the semantic
//! guard over a concrete binding; `transform` produces zero or more
//! equivalent or lower-level trees. A transform that fails is recovered
//! locally by the driver -- it logs and behaves as if the rule produced
//! nothing -- so a single misbehaving rule can never fail an optimization.
//!
//! Each rule carries a `rule_hash` fingerprint; the memo records which
//! rules have fired on which expression so that re-application is skipped
//! (commutativity would otherwise ping-pong forever). Registries are
//! immutable after construction and shared by reference; rule order is
//! fixed per optimizer instance, which keeps planning deterministic.

use crate::catalog::Catalog;
use crate::error::OptResult;
use crate::expr::OpExpression;
use crate::pattern::Pattern;
use std::hash::{Hash, Hasher};

/// Classification of optimization rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleType {
    /// Logical to logical (search-space expansion).
    Transformation,
    /// Logical to physical (lowering).
    Implementation,
}

/// Context handed to rules during application.
pub struct OptContext<'a> {
    pub catalog: &'a dyn Catalog,
}

/// A transformation or implementation rule.
pub trait Rule: Send + Sync {
    /// Unique rule name; also the source of the fingerprint.
    fn name(&self) -> &str;

    fn rule_type(&self) -> RuleType;

    /// Shape of the subtrees this rule applies to.
    fn pattern(&self) -> Pattern;

    /// Semantic guard over one concrete binding. The default accepts
    /// everything the pattern matched.
    fn check(&self, _plan: &OpExpression, _ctx: &OptContext) -> bool {
        true
    }

    /// Rewrites one binding into zero or more equivalent or lower-level
    /// trees. Leaf placeholders in the input may be reused in the output.
    fn transform(&self, plan: &OpExpression, ctx: &OptContext) -> OptResult<Vec<OpExpression>>;

    /// Fingerprint for per-expression de-duplication.
    fn rule_hash(&self) -> u64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.name().hash(&mut hasher);
        hasher.finish()
    }
}

/// Ordered, immutable collection of rules.
///
/// Registration order is application order; construct once, then share by
/// `Arc` across optimizer instances.
#[derive(Default)]
pub struct RuleRegistry {
    transformation: Vec<Box<dyn Rule>>,
    implementation: Vec<Box<dyn Rule>>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_rule(&mut self, rule: Box<dyn Rule>) {
        match rule.rule_type() {
            RuleType::Transformation => self.transformation.push(rule),
            RuleType::Implementation => self.implementation.push(rule),
        }
    }

    pub fn transformation_rules(&self) -> impl Iterator<Item = &dyn Rule> {
        self.transformation.iter().map(|r| r.as_ref())
    }

    pub fn implementation_rules(&self) -> impl Iterator<Item = &dyn Rule> {
        self.implementation.iter().map(|r| r.as_ref())
    }

    pub fn len(&self) -> usize {
        self.transformation.len() + self.implementation.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transformation.is_empty() && self.implementation.is_empty()
    }
}
