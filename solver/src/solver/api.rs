//! The programmatic modeling API: typed item construction, arithmetic and
//! relational expressions, Boolean combinators, fact assertion, atom and
//! disjunction introduction. This is the surface the external
//! modeling-language parser drives.

use crate::core::{Lbool, Lit, FALSE_LIT, TRUE_LIT};
use crate::graph::{Disjunct, FlawId, FlawKind};
use crate::model::items::{ArithKind, Atom, Component, Item, ItemId, LinExpr};
use crate::model::lang::Lin;
use crate::model::types::{ComponentType, Field, Predicate, PredId, Rule, Sort, TypeId};
use crate::reasoners::lra::LraVar;
use crate::reasoners::rdl::RdlVar;
use crate::solver::{
    OrderingTheory, SolveError, Solver, CAPACITY, DURATION, END, INITIAL_AMOUNT, START, TAU,
};
use crate::utils::Rational;
use std::collections::BTreeMap;

/// Hook for the external modeling layer: implementations translate a problem
/// description into calls on the solver's API.
pub trait ModelLoader {
    fn load(&self, solver: &mut Solver) -> Result<(), SolveError>;
}

impl Solver {
    /// Ingests a problem through the given loader, then propagates; a
    /// conflict at this stage proves the problem unsolvable.
    pub fn read(&mut self, loader: &dyn ModelLoader) -> Result<(), SolveError> {
        loader.load(self)?;
        self.propagate_and_recover()
    }

    pub(crate) fn new_bool_item(&mut self, lit: Lit) -> ItemId {
        self.items.push(Item::Bool(lit))
    }

    pub fn new_bool(&mut self) -> ItemId {
        let lit = Lit::new(self.sat.new_var(), true);
        self.new_bool_item(lit)
    }

    pub fn new_bool_const(&mut self, value: bool) -> ItemId {
        self.new_bool_item(if value { TRUE_LIT } else { FALSE_LIT })
    }

    pub fn new_int(&mut self) -> ItemId {
        let v = self.lra.new_var();
        self.items
            .push(Item::Arith(ArithKind::Int, LinExpr::Lra(Lin::var(v))))
    }

    pub fn new_int_const(&mut self, value: i64) -> ItemId {
        self.items.push(Item::Arith(
            ArithKind::Int,
            LinExpr::Lra(Lin::constant(Rational::from(value))),
        ))
    }

    pub fn new_real(&mut self) -> ItemId {
        let v = self.lra.new_var();
        self.items
            .push(Item::Arith(ArithKind::Real, LinExpr::Lra(Lin::var(v))))
    }

    pub fn new_real_const(&mut self, value: Rational) -> ItemId {
        self.items.push(Item::Arith(
            ArithKind::Real,
            LinExpr::Lra(Lin::constant(value)),
        ))
    }

    /// A fresh time point, allocated in the theory the configuration selects
    /// for temporal ordering.
    pub fn new_time(&mut self) -> ItemId {
        let expr = match self.config.ordering {
            OrderingTheory::Rdl => LinExpr::Rdl(Lin::var(self.rdl.new_var())),
            OrderingTheory::Lra => LinExpr::Lra(Lin::var(self.lra.new_var())),
        };
        self.items.push(Item::Arith(ArithKind::Time, expr))
    }

    pub fn new_time_const(&mut self, value: Rational) -> ItemId {
        let expr = match self.config.ordering {
            OrderingTheory::Rdl => LinExpr::Rdl(Lin::constant(value)),
            OrderingTheory::Lra => LinExpr::Lra(Lin::constant(value)),
        };
        self.items.push(Item::Arith(ArithKind::Time, expr))
    }

    pub fn new_string(&mut self, value: impl Into<String>) -> ItemId {
        self.items.push(Item::String(value.into()))
    }

    /// An object variable over the given component instances; a singleton
    /// domain denotes the instance itself.
    pub fn new_enum(&mut self, values: Vec<ItemId>) -> ItemId {
        assert!(!values.is_empty(), "empty enum domain");
        if values.len() == 1 {
            return values[0];
        }
        let var = self.ov.new_var(values, &mut self.sat);
        self.items.push(Item::Enum(var))
    }

    pub(crate) fn lin_expr(&self, item: ItemId) -> LinExpr {
        match &self.items[item] {
            Item::Arith(_, e) => e.clone(),
            _ => panic!("not an arithmetic item"),
        }
    }

    pub fn arith_kind(&self, item: ItemId) -> ArithKind {
        match &self.items[item] {
            Item::Arith(k, _) => *k,
            _ => panic!("not an arithmetic item"),
        }
    }

    /// The sort of the result of combining the given operands.
    fn combined_kind(&self, items: &[ItemId]) -> ArithKind {
        let mut kind = ArithKind::Int;
        for &i in items {
            match self.arith_kind(i) {
                ArithKind::Time => return ArithKind::Time,
                ArithKind::Real => kind = ArithKind::Real,
                ArithKind::Int => {}
            }
        }
        kind
    }

    fn as_lra(&self, e: &LinExpr) -> Option<Lin<LraVar>> {
        match e {
            LinExpr::Lra(l) => Some(l.clone()),
            LinExpr::Rdl(l) if l.is_constant() => Some(Lin::constant(l.known)),
            LinExpr::Rdl(_) => None,
        }
    }

    fn as_rdl(&self, e: &LinExpr) -> Option<Lin<RdlVar>> {
        match e {
            LinExpr::Rdl(l) => Some(l.clone()),
            LinExpr::Lra(l) if l.is_constant() => Some(Lin::constant(l.known)),
            LinExpr::Lra(_) => None,
        }
    }

    /// Folds the operands into one linear expression, upgrading constants
    /// across theories; mixing variables of both theories is a modeling
    /// error.
    fn combine(&self, items: &[ItemId], f: impl Fn(bool) -> Rational) -> (ArithKind, LinExpr) {
        let kind = self.combined_kind(items);
        let rdl_vars = items.iter().any(|&i| matches!(self.lin_expr(i), LinExpr::Rdl(ref l) if !l.is_constant()));
        if rdl_vars {
            let mut acc: Lin<RdlVar> = Lin::constant(Rational::ZERO);
            for (n, &i) in items.iter().enumerate() {
                let l = self
                    .as_rdl(&self.lin_expr(i))
                    .expect("mixing time points with other arithmetic variables");
                acc = acc + l.scaled(f(n == 0));
            }
            (kind, LinExpr::Rdl(acc))
        } else {
            let mut acc: Lin<LraVar> = Lin::constant(Rational::ZERO);
            for (n, &i) in items.iter().enumerate() {
                let l = self
                    .as_lra(&self.lin_expr(i))
                    .expect("mixing time points with other arithmetic variables");
                acc = acc + l.scaled(f(n == 0));
            }
            (kind, LinExpr::Lra(acc))
        }
    }

    pub fn minus(&mut self, item: ItemId) -> ItemId {
        let (kind, expr) = match self.lin_expr(item) {
            LinExpr::Lra(l) => (self.arith_kind(item), LinExpr::Lra(-l)),
            LinExpr::Rdl(l) => (self.arith_kind(item), LinExpr::Rdl(-l)),
        };
        self.items.push(Item::Arith(kind, expr))
    }

    pub fn add(&mut self, items: &[ItemId]) -> ItemId {
        assert!(items.len() > 1);
        let (kind, expr) = self.combine(items, |_| Rational::ONE);
        self.items.push(Item::Arith(kind, expr))
    }

    pub fn sub(&mut self, items: &[ItemId]) -> ItemId {
        assert!(items.len() > 1);
        let (kind, expr) = self.combine(items, |first| {
            if first {
                Rational::ONE
            } else {
                -Rational::ONE
            }
        });
        self.items.push(Item::Arith(kind, expr))
    }

    /// The rational value of a constant arithmetic item.
    ///
    /// # Panics
    ///
    /// Panics if the item is not constant (a programmer error in `mul`/`div`
    /// usage).
    pub fn rational_value(&self, item: ItemId) -> Rational {
        let v = self.arith_value(item);
        assert!(
            self.is_constant(item) && v.eps == Rational::ZERO,
            "expected a constant operand"
        );
        v.rat
    }

    /// Multiplication: all operands but at most one must be constant.
    pub fn mul(&mut self, items: &[ItemId]) -> ItemId {
        assert!(items.len() > 1);
        let var_pos = items.iter().position(|&i| !self.is_constant(i));
        match var_pos {
            Some(p) => {
                let mut factor = Rational::ONE;
                for (n, &i) in items.iter().enumerate() {
                    if n != p {
                        factor = factor * self.rational_value(i);
                    }
                }
                let kind = self.combined_kind(items);
                let expr = match self.lin_expr(items[p]) {
                    LinExpr::Lra(l) => LinExpr::Lra(l.scaled(factor)),
                    LinExpr::Rdl(l) => LinExpr::Rdl(l.scaled(factor)),
                };
                self.items.push(Item::Arith(kind, expr))
            }
            None => {
                let mut product = Rational::ONE;
                for &i in items {
                    product = product * self.rational_value(i);
                }
                let kind = self.combined_kind(items);
                self.items
                    .push(Item::Arith(kind, LinExpr::Lra(Lin::constant(product))))
            }
        }
    }

    /// Division: every operand but the first must be a non-zero constant.
    pub fn div(&mut self, items: &[ItemId]) -> ItemId {
        assert!(items.len() > 1);
        let mut divisor = Rational::ONE;
        for &i in &items[1..] {
            divisor = divisor * self.rational_value(i);
        }
        let factor = Rational::ONE / divisor;
        let kind = if self.combined_kind(items) == ArithKind::Int {
            ArithKind::Real
        } else {
            self.combined_kind(items)
        };
        let expr = match self.lin_expr(items[0]) {
            LinExpr::Lra(l) => LinExpr::Lra(l.scaled(factor)),
            LinExpr::Rdl(l) => LinExpr::Rdl(l.scaled(factor)),
        };
        self.items.push(Item::Arith(kind, expr))
    }

    /// The literal reifying `l ≤ r`, in whichever arithmetic theory hosts the
    /// operands.
    pub(crate) fn leq_lit(&mut self, l: ItemId, r: ItemId) -> Lit {
        let rdl = matches!(self.lin_expr(l), LinExpr::Rdl(ref e) if !e.is_constant())
            || matches!(self.lin_expr(r), LinExpr::Rdl(ref e) if !e.is_constant());
        if rdl {
            let ll = self
                .as_rdl(&self.lin_expr(l))
                .expect("mixing time points with other arithmetic variables");
            let rl = self.as_rdl(&self.lin_expr(r)).expect("mixing time points");
            self.rdl.new_leq(&ll, &rl, &mut self.sat)
        } else {
            let ll = self.as_lra(&self.lin_expr(l)).expect("arithmetic operand");
            let rl = self.as_lra(&self.lin_expr(r)).expect("arithmetic operand");
            self.lra.new_leq(&ll, &rl, &mut self.sat)
        }
    }

    pub(crate) fn lt_lit(&mut self, l: ItemId, r: ItemId) -> Lit {
        let rdl = matches!(self.lin_expr(l), LinExpr::Rdl(ref e) if !e.is_constant())
            || matches!(self.lin_expr(r), LinExpr::Rdl(ref e) if !e.is_constant());
        if rdl {
            let ll = self.as_rdl(&self.lin_expr(l)).expect("mixing time points");
            let rl = self.as_rdl(&self.lin_expr(r)).expect("mixing time points");
            self.rdl.new_lt(&ll, &rl, &mut self.sat)
        } else {
            let ll = self.as_lra(&self.lin_expr(l)).expect("arithmetic operand");
            let rl = self.as_lra(&self.lin_expr(r)).expect("arithmetic operand");
            self.lra.new_lt(&ll, &rl, &mut self.sat)
        }
    }

    pub fn lt(&mut self, l: ItemId, r: ItemId) -> ItemId {
        let lit = self.lt_lit(l, r);
        self.new_bool_item(lit)
    }

    pub fn leq(&mut self, l: ItemId, r: ItemId) -> ItemId {
        let lit = self.leq_lit(l, r);
        self.new_bool_item(lit)
    }

    pub fn gt(&mut self, l: ItemId, r: ItemId) -> ItemId {
        let lit = self.lt_lit(r, l);
        self.new_bool_item(lit)
    }

    pub fn geq(&mut self, l: ItemId, r: ItemId) -> ItemId {
        let lit = self.leq_lit(r, l);
        self.new_bool_item(lit)
    }

    /// The literal reifying the equality of two items, dispatching on their
    /// kind: SAT equivalence for booleans, theory equality for arithmetic,
    /// pointwise equality for object variables, identity for components,
    /// recursive argument equality for atoms.
    pub(crate) fn eq_lit(&mut self, l: ItemId, r: ItemId) -> Lit {
        if l == r {
            return TRUE_LIT;
        }
        enum Shape {
            Bool(Lit),
            Arith,
            Str(String),
            Enum(crate::reasoners::ov::OvVar),
            Comp,
            Atom,
        }
        let shape = |it: &Item| match it {
            Item::Bool(b) => Shape::Bool(*b),
            Item::Arith(..) => Shape::Arith,
            Item::String(s) => Shape::Str(s.clone()),
            Item::Enum(v) => Shape::Enum(*v),
            Item::Component(_) => Shape::Comp,
            Item::Atom(_) => Shape::Atom,
        };
        match (shape(&self.items[l]), shape(&self.items[r])) {
            (Shape::Bool(a), Shape::Bool(b)) => self.sat.new_eq(a, b),
            (Shape::Arith, Shape::Arith) => {
                let le = self.leq_lit(l, r);
                let ge = self.leq_lit(r, l);
                self.sat.new_conj(&[le, ge])
            }
            (Shape::Str(a), Shape::Str(b)) => {
                if a == b {
                    TRUE_LIT
                } else {
                    FALSE_LIT
                }
            }
            (Shape::Enum(a), Shape::Enum(b)) => {
                let shared: Vec<ItemId> = self
                    .ov
                    .candidates(a)
                    .into_iter()
                    .filter(|v| self.ov.candidates(b).contains(v))
                    .collect();
                let mut options = Vec::new();
                for v in shared {
                    let la = self.ov.allows(a, v);
                    let lb = self.ov.allows(b, v);
                    options.push(self.sat.new_conj(&[la, lb]));
                }
                self.sat.new_disj(&options)
            }
            (Shape::Enum(a), Shape::Comp) => self.ov.allows(a, r),
            (Shape::Comp, Shape::Enum(b)) => self.ov.allows(b, l),
            (Shape::Comp, Shape::Comp) => FALSE_LIT, // identity was checked above
            (Shape::Atom, Shape::Atom) => {
                let pred = self.items[l].as_atom().unwrap().pred;
                if pred != self.items[r].as_atom().unwrap().pred {
                    return FALSE_LIT;
                }
                let (la, ra) = (
                    self.items[l].as_atom().unwrap().exprs.clone(),
                    self.items[r].as_atom().unwrap().exprs.clone(),
                );
                // derived parameters (durations) follow from the parameters
                // they are computed from
                let derived: Vec<String> = self.predicates[pred]
                    .fields
                    .iter()
                    .filter(|f| f.sort == Sort::Duration)
                    .map(|f| f.name.clone())
                    .collect();
                let mut parts = Vec::new();
                for (name, li) in &la {
                    if derived.contains(name) {
                        continue;
                    }
                    if let Some(ri) = ra.get(name) {
                        parts.push(self.eq_lit(*li, *ri));
                    }
                }
                self.sat.new_conj(&parts)
            }
            _ => FALSE_LIT,
        }
    }

    pub fn eq(&mut self, l: ItemId, r: ItemId) -> ItemId {
        let lit = self.eq_lit(l, r);
        self.new_bool_item(lit)
    }

    /// Whether two items can still be made equal under the current state.
    pub fn matches(&self, l: ItemId, r: ItemId) -> bool {
        if l == r {
            return true;
        }
        match (&self.items[l], &self.items[r]) {
            (Item::Bool(a), Item::Bool(b)) => {
                let (va, vb) = (self.sat.value(*a), self.sat.value(*b));
                va == Lbool::Undef || vb == Lbool::Undef || va == vb
            }
            (Item::Arith(ka, _), Item::Arith(kb, _)) => {
                if ka != kb {
                    return false;
                }
                let (la, ua) = self.arith_bounds(l);
                let (lb, ub) = self.arith_bounds(r);
                la <= ub && lb <= ua
            }
            (Item::String(a), Item::String(b)) => a == b,
            (Item::Enum(a), Item::Enum(b)) => {
                let db = self.ov.domain(*b, &self.sat);
                self.ov
                    .domain(*a, &self.sat)
                    .iter()
                    .any(|v| db.contains(v))
            }
            (Item::Enum(a), Item::Component(_)) => self.ov.domain(*a, &self.sat).contains(&r),
            (Item::Component(_), Item::Enum(b)) => self.ov.domain(*b, &self.sat).contains(&l),
            (Item::Component(_), Item::Component(_)) => false,
            (Item::Atom(a), Item::Atom(b)) => {
                if a.pred != b.pred {
                    return false;
                }
                a.exprs.iter().all(|(name, &li)| match b.exprs.get(name) {
                    Some(&ri) => self.matches(li, ri),
                    None => true,
                })
            }
            _ => false,
        }
    }

    pub fn conj(&mut self, items: &[ItemId]) -> ItemId {
        let lits: Vec<Lit> = items.iter().map(|&i| self.lit(i)).collect();
        let l = self.sat.new_conj(&lits);
        self.new_bool_item(l)
    }

    pub fn disj(&mut self, items: &[ItemId]) -> ItemId {
        let lits: Vec<Lit> = items.iter().map(|&i| self.lit(i)).collect();
        let l = self.sat.new_disj(&lits);
        self.new_bool_item(l)
    }

    pub fn exct_one(&mut self, items: &[ItemId]) -> ItemId {
        let lits: Vec<Lit> = items.iter().map(|&i| self.lit(i)).collect();
        let l = self.sat.new_exact_one(&lits);
        self.new_bool_item(l)
    }

    pub fn negate(&mut self, item: ItemId) -> ItemId {
        let l = self.lit(item);
        self.new_bool_item(!l)
    }

    /// Posts a fact, gated on the current controlling literal: the fact must
    /// hold whenever the resolver (or flaw) being applied does.
    pub fn assert_fact(&mut self, item: ItemId) -> Result<(), SolveError> {
        let l = self.lit(item);
        self.assert_lit(l)
    }

    pub(crate) fn assert_lit(&mut self, l: Lit) -> Result<(), SolveError> {
        let ni = self.ni;
        if !self.sat.new_clause([!ni, l]) {
            return Err(SolveError::Unsolvable);
        }
        Ok(())
    }

    /// Creates a disjunction flaw: the search will pick exactly one branch
    /// and execute its body.
    pub fn new_disjunction(&mut self, branches: Vec<Disjunct>) -> Result<FlawId, SolveError> {
        assert!(!branches.is_empty(), "empty disjunction");
        let causes = self.cause();
        self.new_flaw(FlawKind::Disjunction { branches }, causes, false, true)
    }

    /// Creates a flaw forcing a choice on an undetermined boolean item.
    pub fn new_bool_flaw(&mut self, item: ItemId) -> Result<FlawId, SolveError> {
        let lit = self.lit(item);
        let causes = self.cause();
        self.new_flaw(FlawKind::Bool { lit }, causes, false, true)
    }

    /// Creates a flaw forcing an object variable to take a value.
    pub fn new_enum_flaw(&mut self, item: ItemId) -> Result<FlawId, SolveError> {
        assert!(matches!(self.items[item], Item::Enum(_)));
        let causes = self.cause();
        self.new_flaw(FlawKind::Enum { item }, causes, true, true)
    }

    /// Creates a flaw that picks one literal of a disjunction.
    pub fn new_disj_flaw(&mut self, lits: Vec<Lit>, exclusive: bool) -> Result<FlawId, SolveError> {
        assert!(!lits.is_empty());
        let causes = self.cause();
        self.new_flaw(FlawKind::Disj { lits }, causes, exclusive, true)
    }

    /// Introduces a predicate instance together with the `atom_flaw` that
    /// justifies it. Missing declared parameters are filled with fresh items;
    /// the smart type observing the predicate, if any, is notified.
    pub fn new_atom(
        &mut self,
        is_fact: bool,
        pred: PredId,
        mut args: BTreeMap<String, ItemId>,
    ) -> Result<ItemId, SolveError> {
        let fields = self.predicates[pred].fields.clone();
        let owner = self.predicates[pred].owner;
        if let Some(tp) = owner {
            if !args.contains_key(TAU) {
                let instances = self.types[tp].instances.clone();
                let tau = self.new_enum(instances);
                args.insert(TAU.to_string(), tau);
            }
        }
        for field in fields {
            if args.contains_key(&field.name) {
                continue;
            }
            let item = match field.sort {
                Sort::Bool => self.new_bool(),
                Sort::Int => self.new_int(),
                Sort::Real => self.new_real(),
                Sort::Time => self.new_time(),
                Sort::Instance(tp) => {
                    let instances = self.types[tp].instances.clone();
                    self.new_enum(instances)
                }
                Sort::Duration => {
                    let (start, end) = (args[START], args[END]);
                    self.sub(&[end, start])
                }
            };
            args.insert(field.name, item);
        }
        let sigma = Lit::new(self.sat.new_var(), true);
        let atom = self.items.push(Item::Atom(Atom {
            pred,
            sigma,
            is_fact,
            reason: None,
            exprs: args,
        }));
        self.predicates[pred].atoms.push(atom);
        tracing::trace!("new atom of {}", self.predicates[pred].name);
        let causes = self.cause();
        let flaw = self.new_flaw(FlawKind::Atom { atom, is_fact }, causes, true, true)?;
        if let Item::Atom(a) = &mut self.items[atom] {
            a.reason = Some(flaw);
        }
        if let Some(tp) = owner {
            if let Some(idx) = self.types[tp].smart {
                self.smart_new_atom(idx, atom)?;
            }
        }
        Ok(atom)
    }

    /// Declares a plain component type.
    pub fn new_type(&mut self, name: impl Into<String>) -> TypeId {
        self.types.push(ComponentType {
            name: name.into(),
            smart: None,
            instances: Vec::new(),
            predicates: Vec::new(),
        })
    }

    /// Creates an instance of a component type. Resource instances get their
    /// field constraints (non-negative capacity and initial amount) posted
    /// here, the constructor-body behavior of the resource types.
    pub fn new_instance(
        &mut self,
        tp: TypeId,
        name: impl Into<String>,
        exprs: BTreeMap<String, ItemId>,
    ) -> Result<ItemId, SolveError> {
        let item = self.items.push(Item::Component(Component {
            tp,
            name: name.into(),
            exprs,
        }));
        self.types[tp].instances.push(item);
        for field in [CAPACITY, INITIAL_AMOUNT] {
            if let Some(v) = self.opt_arg(item, field) {
                let zero = self.new_real_const(Rational::ZERO);
                let geq = self.leq_lit(zero, v);
                self.assert_lit(geq)?;
            }
        }
        Ok(item)
    }

    /// Declares a predicate. Predicates owned by a smart type are given the
    /// timeline parameters and the `Interval` base behavior on top of their
    /// own rule.
    pub fn new_predicate(
        &mut self,
        owner: Option<TypeId>,
        name: impl Into<String>,
        fields: Vec<Field>,
        rule: Option<Rule>,
    ) -> PredId {
        let mut all_fields = Vec::new();
        let mut rule = rule;
        if let Some(tp) = owner {
            if self.types[tp].smart.is_some() {
                all_fields.push(Field::new(START, Sort::Time));
                all_fields.push(Field::new(END, Sort::Time));
                all_fields.push(Field::new(DURATION, Sort::Duration));
                let wrapped: Rule = match rule {
                    Some(user) => std::sync::Arc::new(move |s: &mut Solver, atm: ItemId| {
                        s.interval_rule(atm)?;
                        user(s, atm)
                    }),
                    None => std::sync::Arc::new(|s: &mut Solver, atm: ItemId| s.interval_rule(atm)),
                };
                rule = Some(wrapped);
            }
        }
        all_fields.extend(fields);
        let pred = self.predicates.push(Predicate {
            name: name.into(),
            owner,
            fields: all_fields,
            rule,
            atoms: Vec::new(),
        });
        if let Some(tp) = owner {
            self.types[tp].predicates.push(pred);
        }
        pred
    }

    /// The `Interval` base behavior: the atom lies within the horizon, ends
    /// after it starts, and its duration is the distance from start to end.
    pub(crate) fn interval_rule(&mut self, atm: ItemId) -> Result<(), SolveError> {
        let start = self.arg(atm, START);
        let end = self.arg(atm, END);
        let after_origin = self.leq_lit(self.origin, start);
        self.assert_lit(after_origin)?;
        let before_horizon = self.leq_lit(end, self.horizon);
        self.assert_lit(before_horizon)?;
        let ordered = self.leq_lit(start, end);
        self.assert_lit(ordered)?;
        if let Some(d) = self.opt_arg(atm, DURATION) {
            let span = self.sub(&[end, start]);
            let same = self.eq_lit(d, span);
            self.assert_lit(same)?;
        }
        Ok(())
    }
}
