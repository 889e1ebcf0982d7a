//! # Pattern Matching and Binding
//!
//! Rules locate applicable subtrees declaratively: each rule exposes a
//! [`Pattern`] describing the operator shape it rewrites. A pattern is
//! either `Any` -- a leaf matcher that binds an entire memo group without
//! descending into it -- or an operator matcher with one sub-pattern per
//! child.
//!
//! ## Binding
//!
//! The memo is a DAG: a pattern can match one rooted expression in many
//! distinct ways, one per combination of child-group members whose kinds
//! match. [`BindingIterator`] enumerates those combinations lazily, yielding
//! one independently owned [`OpExpression`] per binding. `Any` children bind
//! as [`Operator::Leaf`] placeholders carrying the group id, so a rule's
//! output can be re-inserted without ever copying the subtree it did not
//! inspect.
//!
//! Bindings are enumerated in memo insertion order and combined as a
//! Cartesian product across children, which keeps rule application
//! deterministic. The iterator is finite because memo groups are finite.

use crate::expr::{LogicalOpKind, OpExpression, Operator, PhysicalOpKind};
use crate::memo::{ExprId, GroupId, Memo};

/// Tree template used by rules to locate applicable subtrees.
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Matches an expression whose operator satisfies the matcher and whose
    /// children match the sub-patterns. Arities must agree.
    Operator(OpMatcher, Vec<Pattern>),
    /// Matches an entire group without descending into it.
    Any,
}

/// Payload-free operator matcher.
#[derive(Debug, Clone)]
pub enum OpMatcher {
    Logical(LogicalOpKind),
    Physical(PhysicalOpKind),
    AnyLogical,
    AnyPhysical,
}

impl OpMatcher {
    pub fn matches(&self, op: &Operator) -> bool {
        match (op, self) {
            (Operator::Logical(l), OpMatcher::Logical(kind)) => l.kind() == *kind,
            (Operator::Physical(p), OpMatcher::Physical(kind)) => p.kind() == *kind,
            (Operator::Logical(_), OpMatcher::AnyLogical) => true,
            (Operator::Physical(_), OpMatcher::AnyPhysical) => true,
            _ => false,
        }
    }
}

impl Pattern {
    /// A logical get (leaf, no children).
    pub fn get() -> Self {
        Pattern::Operator(OpMatcher::Logical(LogicalOpKind::Get), vec![])
    }

    /// A logical filter over anything.
    pub fn filter() -> Self {
        Pattern::Operator(OpMatcher::Logical(LogicalOpKind::Filter), vec![Pattern::Any])
    }

    /// A logical projection over anything.
    pub fn project() -> Self {
        Pattern::Operator(OpMatcher::Logical(LogicalOpKind::Project), vec![Pattern::Any])
    }

    /// A logical join over two arbitrary inputs.
    pub fn join() -> Self {
        Pattern::Operator(
            OpMatcher::Logical(LogicalOpKind::Join),
            vec![Pattern::Any, Pattern::Any],
        )
    }

    /// A logical aggregate over anything.
    pub fn aggregate() -> Self {
        Pattern::Operator(
            OpMatcher::Logical(LogicalOpKind::Aggregate),
            vec![Pattern::Any],
        )
    }

    /// A logical sort over anything.
    pub fn sort() -> Self {
        Pattern::Operator(OpMatcher::Logical(LogicalOpKind::Sort), vec![Pattern::Any])
    }

    /// A logical limit over anything.
    pub fn limit() -> Self {
        Pattern::Operator(OpMatcher::Logical(LogicalOpKind::Limit), vec![Pattern::Any])
    }
}

/// Whether `pattern` structurally matches the expression rooted at
/// `expr_id`, with `Any` children accepting any group.
pub fn matches(memo: &Memo, expr_id: ExprId, pattern: &Pattern) -> bool {
    let expr = memo.expr(expr_id);
    match pattern {
        Pattern::Any => true,
        Pattern::Operator(matcher, child_patterns) => {
            if !matcher.matches(expr.op()) {
                return false;
            }
            if expr.children().len() != child_patterns.len() {
                return false;
            }
            expr.children()
                .iter()
                .zip(child_patterns.iter())
                .all(|(&child, pat)| match pat {
                    Pattern::Any => true,
                    _ => group_matches(memo, child, pat),
                })
        }
    }
}

fn group_matches(memo: &Memo, group: GroupId, pattern: &Pattern) -> bool {
    memo.group(group)
        .exprs()
        .iter()
        .any(|&eid| matches(memo, eid, pattern))
}

/// Lazy enumerator of all distinct bindings of a pattern against the DAG
/// rooted at one group expression.
pub struct BindingIterator {
    /// `None` when the root failed to match: the iterator yields nothing.
    root_op: Option<Operator>,
    /// Alternative bindings per child slot, in memo insertion order.
    slots: Vec<Vec<OpExpression>>,
    cursor: Vec<usize>,
    exhausted: bool,
}

impl BindingIterator {
    pub fn new(memo: &Memo, root: ExprId, pattern: &Pattern) -> Self {
        let expr = memo.expr(root);
        match pattern {
            Pattern::Any => Self {
                root_op: Some(Operator::Leaf(expr.group_id())),
                slots: Vec::new(),
                cursor: Vec::new(),
                exhausted: false,
            },
            Pattern::Operator(matcher, child_patterns) => {
                if !matcher.matches(expr.op()) || expr.children().len() != child_patterns.len() {
                    return Self::empty();
                }
                let mut slots = Vec::with_capacity(child_patterns.len());
                for (&child, pat) in expr.children().iter().zip(child_patterns.iter()) {
                    let alternatives = bind_group(memo, child, pat);
                    if alternatives.is_empty() {
                        return Self::empty();
                    }
                    slots.push(alternatives);
                }
                let cursor = vec![0; slots.len()];
                Self {
                    root_op: Some(expr.op().clone()),
                    slots,
                    cursor,
                    exhausted: false,
                }
            }
        }
    }

    fn empty() -> Self {
        Self {
            root_op: None,
            slots: Vec::new(),
            cursor: Vec::new(),
            exhausted: true,
        }
    }
}

impl Iterator for BindingIterator {
    type Item = OpExpression;

    fn next(&mut self) -> Option<OpExpression> {
        if self.exhausted {
            return None;
        }
        let op = self.root_op.clone()?;
        let children = self
            .slots
            .iter()
            .zip(self.cursor.iter())
            .map(|(alts, &i)| alts[i].clone())
            .collect();
        let binding = OpExpression::new(op, children);

        // Advance the odometer, least-significant slot last.
        let mut carried = true;
        for i in (0..self.cursor.len()).rev() {
            self.cursor[i] += 1;
            if self.cursor[i] < self.slots[i].len() {
                carried = false;
                break;
            }
            self.cursor[i] = 0;
        }
        if carried {
            self.exhausted = true;
        }
        Some(binding)
    }
}

/// All bindings of `pattern` against the members of `group`.
fn bind_group(memo: &Memo, group: GroupId, pattern: &Pattern) -> Vec<OpExpression> {
    match pattern {
        Pattern::Any => vec![OpExpression::leaf(Operator::Leaf(memo.resolve(group)))],
        Pattern::Operator(..) => {
            let mut out = Vec::new();
            for &eid in memo.group(group).exprs() {
                out.extend(BindingIterator::new(memo, eid, pattern));
            }
            out
        }
    }
}
