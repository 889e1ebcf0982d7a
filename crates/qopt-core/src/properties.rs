//! # Physical Properties
//!
//! A [`PropertySet`] is an abstract description of the physical
//! characteristics a plan produces or requires: sort order, data
//! distribution, available columns. Property sets drive the search in two
//! ways: a parent operator hands each child the property set it must
//! satisfy, and a candidate plan is only recorded as a winner when its
//! output properties *cover* the requirement.
//!
//! ## The covers relation
//!
//! `a.covers(b)` holds when every requirement in `b` is entailed by some
//! property in `a`. Entailment is per kind:
//!
//! - **Sort**: an order covers any prefix of itself -- `Sort(a, b, c)`
//!   covers `Sort(a, b)` because rows sorted by `(a, b, c)` are sorted by
//!   `(a, b)`.
//! - **Distribution**: exact match (hash-partitioning on `[a]` does not
//!   cover hash-partitioning on `[b]`).
//! - **Columns**: superset.
//!
//! The relation is reflexive and transitive. The empty set requires
//! nothing, so every set covers it; a kind that is absent imposes no
//! requirement.

use crate::expr::{ColumnRef, Expr, SortKey};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How data is spread across execution contexts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Distribution {
    /// All rows in a single context.
    Single,
    /// Every row replicated everywhere.
    Broadcast,
    /// Hash-partitioned on the given expressions.
    Hash(Vec<Expr>),
}

/// A single physical property.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Property {
    Sort(Vec<SortKey>),
    Distribution(Distribution),
    Columns(Vec<ColumnRef>),
}

/// Payload-free discriminant of a [`Property`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PropertyKind {
    Sort,
    Distribution,
    Columns,
}

impl Property {
    pub fn kind(&self) -> PropertyKind {
        match self {
            Property::Sort(_) => PropertyKind::Sort,
            Property::Distribution(_) => PropertyKind::Distribution,
            Property::Columns(_) => PropertyKind::Columns,
        }
    }

    /// Whether this property entails `required`.
    pub fn covers(&self, required: &Property) -> bool {
        match (self, required) {
            (Property::Sort(provided), Property::Sort(req)) => {
                req.len() <= provided.len() && req.iter().zip(provided.iter()).all(|(r, p)| r == p)
            }
            (Property::Distribution(provided), Property::Distribution(req)) => provided == req,
            (Property::Columns(provided), Property::Columns(req)) => {
                req.iter().all(|c| provided.contains(c))
            }
            _ => false,
        }
    }
}

/// An unordered set of physical properties, at most one per kind.
///
/// The backing vector is kept sorted by kind so that equal sets compare and
/// hash identically regardless of insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PropertySet {
    props: Vec<Property>,
}

impl PropertySet {
    /// The empty set: no requirements.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_property(prop: Property) -> Self {
        let mut set = Self::new();
        set.insert(prop);
        set
    }

    /// A set requiring only the given sort order. An empty key list means no
    /// requirement at all.
    pub fn with_sort(order: Vec<SortKey>) -> Self {
        if order.is_empty() {
            Self::new()
        } else {
            Self::with_property(Property::Sort(order))
        }
    }

    /// Adds a property, replacing any existing property of the same kind.
    pub fn insert(&mut self, prop: Property) {
        self.props.retain(|p| p.kind() != prop.kind());
        self.props.push(prop);
        self.props.sort_by_key(Property::kind);
    }

    pub fn contains_kind(&self, kind: PropertyKind) -> bool {
        self.props.iter().any(|p| p.kind() == kind)
    }

    pub fn get(&self, kind: PropertyKind) -> Option<&Property> {
        self.props.iter().find(|p| p.kind() == kind)
    }

    pub fn is_empty(&self) -> bool {
        self.props.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Property> {
        self.props.iter()
    }

    /// A copy of this set with any property of `kind` removed.
    pub fn without(&self, kind: PropertyKind) -> PropertySet {
        PropertySet {
            props: self
                .props
                .iter()
                .filter(|p| p.kind() != kind)
                .cloned()
                .collect(),
        }
    }

    /// Whether every requirement in `required` is entailed by some property
    /// in this set.
    pub fn covers(&self, required: &PropertySet) -> bool {
        required
            .props
            .iter()
            .all(|r| self.props.iter().any(|p| p.covers(r)))
    }
}

impl fmt::Display for PropertySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, p) in self.props.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match p {
                Property::Sort(keys) => write!(f, "sort({} keys)", keys.len())?,
                Property::Distribution(_) => write!(f, "distribution")?,
                Property::Columns(cols) => write!(f, "columns({})", cols.len())?,
            }
        }
        write!(f, "}}")
    }
}
