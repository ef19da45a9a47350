//! The driver: item and atom construction, decision taking, propagation
//! routing, conflict recovery and the solve loop.

mod api;
mod search;

pub use api::ModelLoader;

use crate::collections::ref_store::RefVec;
use crate::core::{BVar, Lbool, Lit, TRUE_LIT};
use crate::graph::{FlawId, Graph, ResolverId};
use crate::json::Event;
use crate::model::items::{Item, ItemId, LinExpr};
use crate::model::types::{ComponentType, Field, Predicate, PredId, Sort, TypeId};
use crate::reasoners::lra::{LraTheory, LraVar};
use crate::reasoners::ov::OvTheory;
use crate::reasoners::rdl::{RdlTheory, RdlVar};
use crate::reasoners::sat::SatCore;
use crate::types::SmartState;
use crate::utils::{InfRational, Rational};
use hashbrown::HashMap;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

pub const AT: &str = "at";
pub const START: &str = "start";
pub const END: &str = "end";
pub const DURATION: &str = "duration";
pub const TAU: &str = "tau";
pub const AMOUNT: &str = "amount";
pub const CAPACITY: &str = "capacity";
pub const INITIAL_AMOUNT: &str = "initial_amount";
pub const ORIGIN: &str = "origin";
pub const HORIZON: &str = "horizon";

/// Which arithmetic theory backs the temporal ordering literals of the smart
/// types.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum OrderingTheory {
    #[default]
    Rdl,
    Lra,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct SolverConfig {
    pub ordering: OrderingTheory,
    /// Whether unexpanded flaws are closed under the graph-validity literal
    /// after each build.
    pub pruning: bool,
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveError {
    /// A proven conflict at the root level, or graph exhaustion.
    #[error("the problem admits no solution")]
    Unsolvable,
    /// The cooperative cancellation flag was raised.
    #[error("solver interrupted")]
    Interrupted,
}

/// The reversible delta attached to one decision level.
pub(crate) struct Layer {
    pub decision: Lit,
    pub old_costs: HashMap<FlawId, Rational>,
    pub new_flaws: BTreeSet<FlawId>,
    pub solved_flaws: BTreeSet<FlawId>,
}

impl Layer {
    fn new(decision: Lit) -> Layer {
        Layer {
            decision,
            old_costs: HashMap::new(),
            new_flaws: BTreeSet::new(),
            solved_flaws: BTreeSet::new(),
        }
    }
}

pub struct Solver {
    pub config: SolverConfig,
    pub name: String,
    pub id: u32,

    pub sat: SatCore,
    pub lra: LraTheory,
    pub rdl: RdlTheory,
    pub ov: OvTheory,

    pub items: RefVec<ItemId, Item>,
    pub predicates: RefVec<PredId, Predicate>,
    pub types: RefVec<TypeId, ComponentType>,
    pub graph: Graph,
    pub(crate) smarts: Vec<SmartState>,
    /// Named top-level expressions.
    pub(crate) exprs: BTreeMap<String, ItemId>,

    /// The controlling literal: facts asserted while it is in place are gated
    /// on it (`¬ni ∨ fact`).
    pub(crate) ni: Lit,
    pub(crate) ni_stack: Vec<Lit>,
    /// The resolver currently being applied, recorded as the cause of the
    /// flaws created during the application.
    pub(crate) res: Option<ResolverId>,
    pub(crate) current_flaw: Option<FlawId>,
    pub(crate) current_resolver: Option<ResolverId>,

    pub(crate) trail: Vec<Layer>,
    pub(crate) sat_cursor: usize,

    /// Smart-type watches: a change on the key wakes up the (smart index,
    /// atom) pairs.
    pub(crate) sat_watches: HashMap<BVar, Vec<(usize, ItemId)>>,
    pub(crate) rdl_watches: HashMap<RdlVar, Vec<(usize, ItemId)>>,
    pub(crate) lra_watches: HashMap<LraVar, Vec<(usize, ItemId)>>,

    pub(crate) events: Vec<Event>,
    pub(crate) listening: bool,
    interrupted: Arc<AtomicBool>,

    pub(crate) impulse: PredId,
    pub(crate) interval: PredId,
    pub origin: ItemId,
    pub horizon: ItemId,
}

impl Solver {
    pub fn new(name: impl Into<String>, config: SolverConfig) -> Solver {
        let mut slv = Solver {
            config,
            name: name.into(),
            id: 0,
            sat: SatCore::new(),
            lra: LraTheory::new(),
            rdl: RdlTheory::new(),
            ov: OvTheory::new(),
            items: RefVec::new(),
            predicates: RefVec::new(),
            types: RefVec::new(),
            graph: Graph::new(),
            smarts: Vec::new(),
            exprs: BTreeMap::new(),
            ni: TRUE_LIT,
            ni_stack: Vec::new(),
            res: None,
            current_flaw: None,
            current_resolver: None,
            trail: Vec::new(),
            sat_cursor: 0,
            sat_watches: HashMap::new(),
            rdl_watches: HashMap::new(),
            lra_watches: HashMap::new(),
            events: Vec::new(),
            listening: false,
            interrupted: Arc::new(AtomicBool::new(false)),
            impulse: PredId::from_u32(0),
            interval: PredId::from_u32(0),
            origin: ItemId::from_u32(0),
            horizon: ItemId::from_u32(0),
        };
        slv.init();
        slv
    }

    /// Installs the base model: `origin` and `horizon` time points and the
    /// builtin `Impulse` and `Interval` predicates.
    fn init(&mut self) {
        let origin = self.new_time();
        let horizon = self.new_time();
        self.origin = origin;
        self.horizon = horizon;
        self.exprs.insert(ORIGIN.to_string(), origin);
        self.exprs.insert(HORIZON.to_string(), horizon);
        let zero = self.new_time_const(Rational::ZERO);
        let geq = self.geq(origin, zero);
        self.assert_fact(geq).expect("base model is consistent");
        let leq = self.leq(origin, horizon);
        self.assert_fact(leq).expect("base model is consistent");

        self.impulse = self.predicates.push(Predicate {
            name: "Impulse".to_string(),
            owner: None,
            fields: vec![Field::new(AT, Sort::Time)],
            rule: Some(Arc::new(|s: &mut Solver, atm: ItemId| {
                let at = s.arg(atm, AT);
                let after_origin = s.leq(s.origin, at);
                s.assert_fact(after_origin)?;
                let before_horizon = s.leq(at, s.horizon);
                s.assert_fact(before_horizon)
            })),
            atoms: Vec::new(),
        });
        self.interval = self.predicates.push(Predicate {
            name: "Interval".to_string(),
            owner: None,
            fields: vec![
                Field::new(START, Sort::Time),
                Field::new(END, Sort::Time),
                Field::new(DURATION, Sort::Duration),
            ],
            rule: Some(Arc::new(|s: &mut Solver, atm: ItemId| s.interval_rule(atm))),
            atoms: Vec::new(),
        });
    }

    pub fn interval_pred(&self) -> PredId {
        self.interval
    }

    pub fn impulse_pred(&self) -> PredId {
        self.impulse
    }

    pub fn root_level(&self) -> bool {
        self.trail.is_empty()
    }

    pub fn decision_level(&self) -> usize {
        self.trail.len()
    }

    /// The current controlling literal.
    pub fn ni(&self) -> Lit {
        self.ni
    }

    pub(crate) fn set_ni(&mut self, ni: Lit) {
        self.ni_stack.push(self.ni);
        self.ni = ni;
    }

    pub(crate) fn restore_ni(&mut self) {
        self.ni = self.ni_stack.pop().expect("unbalanced ni scope");
    }

    /// The causes to attach to a flaw created now: the resolver currently
    /// being applied, if any.
    pub(crate) fn cause(&self) -> Vec<ResolverId> {
        self.res.into_iter().collect()
    }

    pub fn bool_value(&self, item: ItemId) -> Lbool {
        match &self.items[item] {
            Item::Bool(l) => self.sat.value(*l),
            _ => panic!("not a boolean item"),
        }
    }

    pub fn lit(&self, item: ItemId) -> Lit {
        match &self.items[item] {
            Item::Bool(l) => *l,
            _ => panic!("not a boolean item"),
        }
    }

    pub fn arith_value(&self, item: ItemId) -> InfRational {
        match &self.items[item] {
            Item::Arith(_, LinExpr::Lra(lin)) => self.lra.value(lin),
            Item::Arith(_, LinExpr::Rdl(lin)) => self.rdl.value(lin),
            _ => panic!("not an arithmetic item"),
        }
    }

    pub fn arith_bounds(&self, item: ItemId) -> (InfRational, InfRational) {
        match &self.items[item] {
            Item::Arith(_, LinExpr::Lra(lin)) => self.lra.bounds(lin),
            Item::Arith(_, LinExpr::Rdl(lin)) => self.rdl.bounds(lin),
            _ => panic!("not an arithmetic item"),
        }
    }

    /// The component instances an item may denote: the remaining domain of an
    /// enum, or the item itself.
    pub fn domain(&self, item: ItemId) -> Vec<ItemId> {
        match &self.items[item] {
            Item::Enum(v) => self.ov.domain(*v, &self.sat),
            _ => vec![item],
        }
    }

    pub fn is_constant(&self, item: ItemId) -> bool {
        match &self.items[item] {
            Item::Bool(l) => self.sat.value(*l) != Lbool::Undef,
            Item::Arith(..) => {
                let (lb, ub) = self.arith_bounds(item);
                lb == ub
            }
            Item::Enum(v) => self.ov.domain(*v, &self.sat).len() == 1,
            _ => true,
        }
    }

    /// The state literal σ of an atom.
    pub fn sigma(&self, atom: ItemId) -> Lit {
        self.items[atom]
            .as_atom()
            .expect("not an atom")
            .sigma
    }

    /// The `atom_flaw` that justifies an atom.
    pub fn reason(&self, atom: ItemId) -> FlawId {
        self.items[atom]
            .as_atom()
            .expect("not an atom")
            .reason
            .expect("atom without a reason flaw")
    }

    /// An argument of an atom or a sub-item of a component.
    ///
    /// # Panics
    ///
    /// Panics if no item is registered under `name`.
    pub fn arg(&self, item: ItemId, name: &str) -> ItemId {
        self.opt_arg(item, name)
            .unwrap_or_else(|| panic!("no item named `{name}`"))
    }

    pub fn opt_arg(&self, item: ItemId, name: &str) -> Option<ItemId> {
        match &self.items[item] {
            Item::Atom(a) => a.exprs.get(name).copied(),
            Item::Component(c) => c.exprs.get(name).copied(),
            _ => None,
        }
    }

    /// A named top-level expression, as registered with [Self::set_expr].
    pub fn expr(&self, name: &str) -> Option<ItemId> {
        self.exprs.get(name).copied()
    }

    pub fn set_expr(&mut self, name: impl Into<String>, item: ItemId) {
        self.exprs.insert(name.into(), item);
    }

    pub fn exprs(&self) -> &BTreeMap<String, ItemId> {
        &self.exprs
    }

    /// The flaw the search is currently working on, if any.
    pub fn current_flaw(&self) -> Option<FlawId> {
        self.current_flaw
    }

    /// The resolver the search last committed to, if any.
    pub fn current_resolver(&self) -> Option<ResolverId> {
        self.current_resolver
    }

    /// The graph-validity literal, once the graph has been built.
    pub fn gamma(&self) -> Option<Lit> {
        self.graph.gamma
    }

    /// A handle that makes [Self::solve] return [SolveError::Interrupted] at
    /// the next iteration of its loop when raised.
    pub fn interrupter(&self) -> Arc<AtomicBool> {
        self.interrupted.clone()
    }

    pub(crate) fn is_interrupted(&self) -> bool {
        self.interrupted.load(std::sync::atomic::Ordering::Relaxed)
    }

    /// Turns the observation stream on or off.
    pub fn set_listening(&mut self, on: bool) {
        self.listening = on;
    }

    /// Drains the pending observation events.
    pub fn drain_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub(crate) fn fire(&mut self, event: Event) {
        if self.listening {
            self.events.push(event);
        }
    }

    /// Tears the search down to the root level.
    pub fn reset_to_root(&mut self) {
        while !self.trail.is_empty() {
            self.pop();
        }
    }
}
