use crate::core::Lit;
use crate::create_ref_type;
use crate::graph::{Disjunct, FlawId};
use crate::model::items::ItemId;
use crate::utils::Rational;

create_ref_type!(ResolverId);

/// The per-kind payload of a resolver; `apply` dispatches on it.
#[derive(Clone)]
pub enum ResolverKind {
    /// The activity literal itself is the chosen literal (bool and disj
    /// flaws); applying adds nothing.
    ChooseLit,
    /// Assign a value to an object variable.
    ChooseValue { item: ItemId, value: ItemId },
    /// Execute one branch of a disjunction.
    ChooseBranch { branch: Disjunct },
    /// Make a fact hold.
    ActivateFact { atom: ItemId },
    /// Make a goal hold and execute its predicate's rule.
    ActivateGoal { atom: ItemId },
    /// Collapse an atom onto a matching target atom.
    UnifyAtom {
        atom: ItemId,
        target: ItemId,
        unif_lits: Vec<Lit>,
    },
    /// Order one atom entirely before another on a timeline.
    Order { before: ItemId, after: ItemId },
    /// Keep an atom off a component instance.
    Forbid { atom: ItemId, instance: ItemId },
    /// Move an atom onto an instance that a conflicting atom avoids.
    Place { atom: ItemId, instance: ItemId },
}

impl ResolverKind {
    pub fn name(&self) -> &'static str {
        match self {
            ResolverKind::ChooseLit => "choose_lit",
            ResolverKind::ChooseValue { .. } => "choose_value",
            ResolverKind::ChooseBranch { .. } => "choose_conjunction",
            ResolverKind::ActivateFact { .. } => "activate_fact",
            ResolverKind::ActivateGoal { .. } => "activate_goal",
            ResolverKind::UnifyAtom { .. } => "unify_atom",
            ResolverKind::Order { .. } => "order",
            ResolverKind::Forbid { .. } => "forbid",
            ResolverKind::Place { .. } => "place",
        }
    }
}

/// One way to close a flaw.
///
/// `rho` is the activity literal: when it holds the resolver is applied.
/// `preconditions` are the subflaws introduced by the application; the
/// resolver's estimated cost is its intrinsic cost plus the estimated costs
/// of its preconditions.
pub struct Resolver {
    pub flaw: FlawId,
    pub rho: Lit,
    pub intrinsic_cost: Rational,
    pub preconditions: Vec<FlawId>,
    pub kind: ResolverKind,
}
