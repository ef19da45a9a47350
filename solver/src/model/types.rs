use crate::create_ref_type;
use crate::model::items::ItemId;
use crate::solver::{SolveError, Solver};
use std::sync::Arc;

create_ref_type!(PredId);
create_ref_type!(TypeId);

/// The sort of a declared predicate parameter, used to build fresh arguments
/// for the parameters a caller leaves unbound.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Sort {
    Bool,
    Int,
    Real,
    Time,
    /// An instance of the given component type.
    Instance(TypeId),
    /// The distance `end − start`; installed as a derived expression.
    Duration,
}

#[derive(Clone, Debug)]
pub struct Field {
    pub name: String,
    pub sort: Sort,
}

impl Field {
    pub fn new(name: impl Into<String>, sort: Sort) -> Field {
        Field {
            name: name.into(),
            sort,
        }
    }
}

/// The body of a predicate, executed on one of its atoms when the
/// corresponding activation resolver is applied. The external parser compiles
/// rule bodies down to closures over the solver API.
pub type Rule = Arc<dyn Fn(&mut Solver, ItemId) -> Result<(), SolveError>>;

/// The body of a disjunction branch, executed when the branch is chosen.
pub type Branch = Arc<dyn Fn(&mut Solver) -> Result<(), SolveError>>;

pub struct Predicate {
    pub name: String,
    pub owner: Option<TypeId>,
    pub fields: Vec<Field>,
    pub rule: Option<Rule>,
    /// Every atom of this predicate, in creation order; scanned for
    /// unification targets.
    pub atoms: Vec<ItemId>,
}

pub struct ComponentType {
    pub name: String,
    /// Index into the solver's smart-type states when this type has
    /// domain-specific semantics (state variable, resource, agent).
    pub smart: Option<usize>,
    pub instances: Vec<ItemId>,
    pub predicates: Vec<PredId>,
}
