//! # analogic-core
//!
//! Layer 1: The knowledge model for the ANALOGIC structure-mapping engine.
//!
//! This crate provides:
//! - Typed entities with attribute records
//! - Predicates (relations, functions, attributes, logical connectives)
//! - Nested predicate expressions stored as a shared DAG
//! - Concept graphs with pure structural navigation
//!
//! Key properties:
//! - Expressions form a DAG with shared subexpressions, arena-allocated
//!   and referenced by stable index
//! - All navigation is pure; graphs are immutable for the duration of a match
//! - Entity content comparison rounds numeric values to two decimal places

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use thiserror::Error;

// ============================================================================
// Type Aliases
// ============================================================================

/// Stable identifier of an item (entity or expression) within a concept graph
pub type ItemId = NodeIndex;

// ============================================================================
// Error Types
// ============================================================================

/// Errors in concept graph construction and validation
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Unknown item referenced: {0:?}")]
    UnknownItem(ItemId),
    #[error("Arity mismatch for '{functor}': expected {expected}, got {actual}")]
    ArityMismatch {
        functor: String,
        expected: usize,
        actual: usize,
    },
    #[error("Item {0:?} is not an expression")]
    NotAnExpression(ItemId),
    #[error("Cycle detected in expression graph")]
    CycleDetected,
}

/// Result type for concept graph operations
pub type GraphResult<T> = Result<T, GraphError>;

// ============================================================================
// Attribute Values
// ============================================================================

/// A value stored in an entity's attribute record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    /// Numeric value (compared after rounding to two decimal places)
    Num(f64),
    /// Symbolic value
    Sym(String),
}

/// Round a number to two decimal places, half up
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

impl AttrValue {
    /// Content equality: numbers compare equal when they round to the same
    /// two-decimal value, symbols compare exactly
    pub fn content_eq(&self, other: &AttrValue) -> bool {
        match (self, other) {
            (AttrValue::Num(a), AttrValue::Num(b)) => round2(*a) == round2(*b),
            (AttrValue::Sym(a), AttrValue::Sym(b)) => a == b,
            _ => false,
        }
    }
}

impl From<f64> for AttrValue {
    fn from(x: f64) -> Self {
        AttrValue::Num(x)
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Sym(s.to_string())
    }
}

// ============================================================================
// Entities
// ============================================================================

/// A typed entity: opaque identity plus an ordered attribute record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Entity name (identity within a graph)
    pub name: String,
    /// Ordered mapping from attribute names to values
    pub attributes: BTreeMap<String, AttrValue>,
}

impl Entity {
    /// Create an entity with no attributes
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Add an attribute (builder style)
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Content match: after dropping the ignored attribute names from both
    /// sides, the attribute-name lists must be equal and each pair of values
    /// must be content-equal
    pub fn content_matches(&self, other: &Entity, ignored: &BTreeSet<String>) -> bool {
        let a: Vec<(&String, &AttrValue)> = self
            .attributes
            .iter()
            .filter(|(k, _)| !ignored.contains(*k))
            .collect();
        let b: Vec<(&String, &AttrValue)> = other
            .attributes
            .iter()
            .filter(|(k, _)| !ignored.contains(*k))
            .collect();

        a.len() == b.len()
            && a.iter()
                .zip(b.iter())
                .all(|((ka, va), (kb, vb))| ka == kb && va.content_eq(vb))
    }
}

// ============================================================================
// Predicates
// ============================================================================

/// Type tag of a predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PredicateKind {
    /// Ordinary relation between items
    Relation,
    /// Function mapping items to a value
    Function,
    /// Unary attribute of an item
    Attribute,
    /// Logical connective (and, implies, cause, ...)
    Logical,
}

/// A named relational symbol with arity and matching metadata
///
/// Commutativity and ordering metadata are consumed only by rulesets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    /// Predicate name
    pub name: String,
    /// Number of arguments
    pub arity: usize,
    /// Type tag
    pub kind: PredicateKind,
    /// Whether argument order is irrelevant
    pub commutative: bool,
    /// Whether arguments form an ordered sequence
    pub ordered: bool,
}

impl Predicate {
    /// Create a relation predicate
    pub fn relation(name: impl Into<String>, arity: usize) -> Self {
        Self {
            name: name.into(),
            arity,
            kind: PredicateKind::Relation,
            commutative: false,
            ordered: true,
        }
    }

    /// Create a function predicate
    pub fn function(name: impl Into<String>, arity: usize) -> Self {
        Self {
            name: name.into(),
            arity,
            kind: PredicateKind::Function,
            commutative: false,
            ordered: true,
        }
    }

    /// Create a unary attribute predicate
    pub fn attribute(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arity: 1,
            kind: PredicateKind::Attribute,
            commutative: false,
            ordered: true,
        }
    }

    /// Create a logical connective predicate
    pub fn logical(name: impl Into<String>, arity: usize) -> Self {
        Self {
            name: name.into(),
            arity,
            kind: PredicateKind::Logical,
            commutative: false,
            ordered: true,
        }
    }

    /// Mark the predicate commutative (builder style)
    pub fn commutative(mut self) -> Self {
        self.commutative = true;
        self.ordered = false;
        self
    }

    /// Whether this predicate is a function
    pub fn is_function(&self) -> bool {
        self.kind == PredicateKind::Function
    }
}

// ============================================================================
// Items
// ============================================================================

/// A node in a concept graph: either an entity or an expression head
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Item {
    /// Leaf entity
    Entity(Entity),
    /// Expression head; arguments are the node's outgoing positional edges
    Expression {
        /// The predicate applied by this expression
        functor: Predicate,
    },
}

impl Item {
    /// Whether this item is an entity
    pub fn is_entity(&self) -> bool {
        matches!(self, Item::Entity(_))
    }

    /// Whether this item is an expression
    pub fn is_expression(&self) -> bool {
        matches!(self, Item::Expression { .. })
    }

    /// The entity payload, if any
    pub fn as_entity(&self) -> Option<&Entity> {
        match self {
            Item::Entity(e) => Some(e),
            Item::Expression { .. } => None,
        }
    }

    /// The expression functor, if any
    pub fn functor(&self) -> Option<&Predicate> {
        match self {
            Item::Expression { functor } => Some(functor),
            Item::Entity(_) => None,
        }
    }
}

/// Positional argument edge from an expression to one of its arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgEdge {
    /// Argument position (0-based)
    pub position: usize,
}

// ============================================================================
// Concept Graph
// ============================================================================

/// A knowledge graph of entities and nested predicate expressions
///
/// Expressions form a DAG with shared subexpressions. Nodes are arena
/// allocated inside a petgraph `DiGraph` and referenced by stable `ItemId`;
/// argument edges carry their position and never own their targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptGraph {
    /// Graph name (reported in mapping descriptors)
    pub name: String,
    /// The underlying directed acyclic graph
    pub graph: DiGraph<Item, ArgEdge>,
}

impl ConceptGraph {
    /// Create a new empty concept graph
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            graph: DiGraph::new(),
        }
    }

    /// Add an entity to the graph
    pub fn add_entity(&mut self, entity: Entity) -> ItemId {
        self.graph.add_node(Item::Entity(entity))
    }

    /// Add an expression applying `functor` to existing items
    ///
    /// # Errors
    /// Returns `ArityMismatch` if the argument count differs from the
    /// functor's arity, and `UnknownItem` if an argument id is not in the
    /// graph. Acyclicity holds by construction: arguments must already exist.
    pub fn add_expression(&mut self, functor: Predicate, args: &[ItemId]) -> GraphResult<ItemId> {
        if args.len() != functor.arity {
            return Err(GraphError::ArityMismatch {
                functor: functor.name,
                expected: functor.arity,
                actual: args.len(),
            });
        }
        for &arg in args {
            if self.graph.node_weight(arg).is_none() {
                return Err(GraphError::UnknownItem(arg));
            }
        }

        let node = self.graph.add_node(Item::Expression { functor });
        for (position, &arg) in args.iter().enumerate() {
            self.graph.add_edge(node, arg, ArgEdge { position });
        }
        Ok(node)
    }

    /// Whether the item is an entity
    pub fn is_entity(&self, item: ItemId) -> bool {
        self.graph
            .node_weight(item)
            .is_some_and(|i| i.is_entity())
    }

    /// Whether the item is an expression
    pub fn is_expression(&self, item: ItemId) -> bool {
        self.graph
            .node_weight(item)
            .is_some_and(|i| i.is_expression())
    }

    /// The entity stored at `item`, if it is one
    pub fn entity(&self, item: ItemId) -> Option<&Entity> {
        self.graph.node_weight(item).and_then(|i| i.as_entity())
    }

    /// The functor of an expression item
    pub fn functor(&self, item: ItemId) -> GraphResult<&Predicate> {
        let weight = self
            .graph
            .node_weight(item)
            .ok_or(GraphError::UnknownItem(item))?;
        weight.functor().ok_or(GraphError::NotAnExpression(item))
    }

    /// Arguments of an expression in positional order (empty for entities)
    pub fn args(&self, item: ItemId) -> Vec<ItemId> {
        let mut args: Vec<(usize, ItemId)> = self
            .graph
            .edges_directed(item, Direction::Outgoing)
            .map(|e| (e.weight().position, e.target()))
            .collect();
        args.sort_by_key(|&(pos, _)| pos);
        args.into_iter().map(|(_, id)| id).collect()
    }

    /// All items (entities and expressions)
    pub fn items(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.graph.node_indices()
    }

    /// All expression items
    pub fn expressions(&self) -> Vec<ItemId> {
        self.graph
            .node_indices()
            .filter(|&ix| self.is_expression(ix))
            .collect()
    }

    /// All entity items
    pub fn entities(&self) -> Vec<ItemId> {
        self.graph
            .node_indices()
            .filter(|&ix| self.is_entity(ix))
            .collect()
    }

    /// Top-level expressions: those not used as an argument of any other
    pub fn top_level(&self) -> Vec<ItemId> {
        self.graph
            .node_indices()
            .filter(|&ix| {
                self.is_expression(ix)
                    && self
                        .graph
                        .edges_directed(ix, Direction::Incoming)
                        .next()
                        .is_none()
            })
            .collect()
    }

    /// The item together with every item reachable through argument edges
    pub fn descendants(&self, item: ItemId) -> HashSet<ItemId> {
        let mut seen = HashSet::new();
        let mut stack = vec![item];
        while let Some(current) = stack.pop() {
            if seen.insert(current) {
                for arg in self.args(current) {
                    if !seen.contains(&arg) {
                        stack.push(arg);
                    }
                }
            }
        }
        seen
    }

    /// Whether `item` is a proper ancestor of some member of `set`
    pub fn is_ancestor_of(&self, set: &HashSet<ItemId>, item: ItemId) -> bool {
        self.descendants(item)
            .iter()
            .any(|d| *d != item && set.contains(d))
    }

    /// Number of items in the graph
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Validate structural well-formedness
    ///
    /// # Errors
    /// Returns `CycleDetected` if the expression graph is cyclic, and
    /// `ArityMismatch` if an expression's argument edges disagree with its
    /// functor's arity.
    pub fn validate(&self) -> GraphResult<()> {
        if toposort(&self.graph, None).is_err() {
            return Err(GraphError::CycleDetected);
        }
        for ix in self.graph.node_indices() {
            if let Some(functor) = self.graph[ix].functor() {
                let args = self.args(ix);
                if args.len() != functor.arity {
                    return Err(GraphError::ArityMismatch {
                        functor: functor.name.clone(),
                        expected: functor.arity,
                        actual: args.len(),
                    });
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
