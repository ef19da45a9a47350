use crate::core::Lit;
use crate::create_ref_type;
use crate::graph::FlawId;
use crate::model::lang::Lin;
use crate::model::types::{PredId, TypeId};
use crate::reasoners::lra::LraVar;
use crate::reasoners::ov::OvVar;
use crate::reasoners::rdl::RdlVar;
use std::collections::BTreeMap;

create_ref_type!(ItemId);

/// The numeric sort of an arithmetic item.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ArithKind {
    Int,
    Real,
    Time,
}

/// A linear expression over one of the two arithmetic theories. `Int` and
/// `Real` items live in LRA, `Time` items in RDL.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum LinExpr {
    Lra(Lin<LraVar>),
    Rdl(Lin<RdlVar>),
}

/// A typed value. Items are produced by the modeling layer, stored in an
/// arena and referenced everywhere by [ItemId].
pub enum Item {
    /// Carries the SAT literal holding its truth value.
    Bool(Lit),
    /// Carries a linear expression over the relevant arithmetic theory.
    Arith(ArithKind, LinExpr),
    /// A string literal.
    String(String),
    /// Carries an object variable ranging over component instances.
    Enum(OvVar),
    /// A component instance with named sub-items.
    Component(Component),
    /// A predicate instance.
    Atom(Atom),
}

pub struct Component {
    pub tp: TypeId,
    pub name: String,
    pub exprs: BTreeMap<String, ItemId>,
}

/// A predicate instance with its argument map and state literal σ.
///
/// σ is three-valued: true means the atom is *active* (it holds at the chosen
/// position), false that it is *unified* with another atom, undefined that it
/// is not justified yet. Every atom is introduced together with the
/// `atom_flaw` that justifies it — its `reason`.
pub struct Atom {
    pub pred: PredId,
    pub sigma: Lit,
    pub is_fact: bool,
    pub reason: Option<FlawId>,
    pub exprs: BTreeMap<String, ItemId>,
}

impl Item {
    pub fn as_atom(&self) -> Option<&Atom> {
        match self {
            Item::Atom(a) => Some(a),
            _ => None,
        }
    }

    pub fn is_atom(&self) -> bool {
        matches!(self, Item::Atom(_))
    }

    pub fn is_component(&self) -> bool {
        matches!(self, Item::Component(_))
    }
}
