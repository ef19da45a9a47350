use crate::core::Lit;
use crate::create_ref_type;
use crate::graph::ResolverId;
use crate::model::items::ItemId;
use crate::model::types::Branch;
use crate::reasoners::rdl::RdlVar;
use crate::utils::Rational;

create_ref_type!(FlawId);

/// One branch of a disjunction: an optional cost expression and the body to
/// execute when the branch is chosen.
#[derive(Clone)]
pub struct Disjunct {
    pub cost: Option<ItemId>,
    pub body: Branch,
}

/// The per-kind payload of a flaw; `compute_resolvers` dispatches on it.
pub enum FlawKind {
    /// Choose the value of a Boolean literal.
    Bool { lit: Lit },
    /// Choose the value of an object variable.
    Enum { item: ItemId },
    /// Pick one literal of a disjunction.
    Disj { lits: Vec<Lit> },
    /// Pick one conjunction branch to execute.
    Disjunction { branches: Vec<Disjunct> },
    /// Justify a predicate instance, by activation or unification.
    Atom { atom: ItemId, is_fact: bool },
    /// Two atoms overlapping on a state-variable instance.
    StateVariable { instance: ItemId, atoms: Vec<ItemId> },
    /// Overlapping atoms whose summed amounts exceed a reusable resource's
    /// capacity.
    ReusableResource { instance: ItemId, atoms: Vec<ItemId> },
    /// Production/consumption atoms driving a consumable resource's level
    /// outside `[0, capacity]`.
    ConsumableResource { instance: ItemId, atoms: Vec<ItemId> },
}

impl FlawKind {
    pub fn name(&self) -> &'static str {
        match self {
            FlawKind::Bool { .. } => "bool_flaw",
            FlawKind::Enum { .. } => "enum_flaw",
            FlawKind::Disj { .. } => "disj_flaw",
            FlawKind::Disjunction { .. } => "disjunction_flaw",
            FlawKind::Atom { is_fact: true, .. } => "fact_flaw",
            FlawKind::Atom { is_fact: false, .. } => "goal_flaw",
            FlawKind::StateVariable { .. } => "sv_flaw",
            FlawKind::ReusableResource { .. } => "rr_flaw",
            FlawKind::ConsumableResource { .. } => "cr_flaw",
        }
    }
}

/// An open subproblem.
///
/// `phi` is assigned by `init` at root level and uniquely identifies the flaw
/// in the graph's index; `position` is a time point in the position graph that
/// rules out cyclic causality; `est_cost` is maintained by the heuristic
/// (`+∞` while unreachable under the current graph).
pub struct Flaw {
    pub phi: Option<Lit>,
    pub position: RdlVar,
    pub est_cost: Rational,
    pub expanded: bool,
    pub exclusive: bool,
    pub resolvers: Vec<ResolverId>,
    /// The resolvers whose application created this flaw.
    pub causes: Vec<ResolverId>,
    /// The resolvers whose cost depends on this flaw (inverse of their
    /// preconditions).
    pub supports: Vec<ResolverId>,
    pub kind: FlawKind,
}

impl Flaw {
    pub fn new(position: RdlVar, causes: Vec<ResolverId>, exclusive: bool, kind: FlawKind) -> Flaw {
        Flaw {
            phi: None,
            position,
            est_cost: Rational::PosInfinity,
            expanded: false,
            exclusive,
            resolvers: Vec::new(),
            causes,
            supports: Vec::new(),
            kind,
        }
    }

    /// The activity literal.
    ///
    /// # Panics
    ///
    /// Panics if the flaw has not been initialized yet.
    pub fn phi(&self) -> Lit {
        self.phi.expect("flaw used before initialization")
    }
}
