//! End-to-end planning scenarios driving the programmatic API, standing in
//! for the external modeling layer.

use std::collections::BTreeMap;
use std::sync::Arc;
use vela::core::Lbool;
use vela::graph::Disjunct;
use vela::model::types::{Branch, Field, Rule, Sort};
use vela::solver::{AMOUNT, CAPACITY, DURATION, END, INITIAL_AMOUNT, START};
use vela::utils::{InfRational, Rational};
use vela::{ModelLoader, SolveError, Solver, SolverConfig};

fn solver() -> Solver {
    Solver::new("test", SolverConfig::default())
}

fn args(pairs: &[(&str, vela::model::items::ItemId)]) -> BTreeMap<String, vela::model::items::ItemId> {
    pairs
        .iter()
        .map(|&(n, i)| (n.to_string(), i))
        .collect()
}

/// Pins the duration of an interval atom to a constant.
fn pin_duration(s: &mut Solver, atm: vela::model::items::ItemId, d: i64) {
    let duration = s.arg(atm, DURATION);
    let value = s.new_time_const(Rational::from(d));
    let same = s.eq(duration, value);
    s.assert_fact(same).unwrap();
}

fn window(s: &Solver, atm: vela::model::items::ItemId) -> (InfRational, InfRational) {
    (
        s.arith_value(s.arg(atm, START)),
        s.arith_value(s.arg(atm, END)),
    )
}

#[test]
fn test_boolean_choice() {
    // one free bool with the tautological goal `b ∨ ¬b`
    let mut s = solver();
    let b = s.new_bool();
    let nb = s.negate(b);
    let either = s.disj(&[b, nb]);
    s.assert_fact(either).unwrap();
    assert!(s.solve().unwrap());
    assert!(s.graph.active_flaws.is_empty());
}

#[test]
fn test_forced_bool_flaw() {
    let mut s = solver();
    let b = s.new_bool();
    s.new_bool_flaw(b).unwrap();
    assert!(s.solve().unwrap());
    assert_ne!(s.bool_value(b), Lbool::Undef);
}

#[test]
fn test_enum_flaw_picks_a_value() {
    let mut s = solver();
    let tp = s.new_type("T");
    let t1 = s.new_instance(tp, "t1", BTreeMap::new()).unwrap();
    let t2 = s.new_instance(tp, "t2", BTreeMap::new()).unwrap();
    let e = s.new_enum(vec![t1, t2]);
    s.new_enum_flaw(e).unwrap();
    assert!(s.solve().unwrap());
    assert_eq!(s.domain(e).len(), 1);
}

#[test]
fn test_atom_unification() {
    // a fact P(1) and a goal P(?x): the goal unifies with the fact
    let mut s = solver();
    let p = s.new_predicate(None, "P", vec![Field::new("x", Sort::Int)], None);
    let one = s.new_int_const(1);
    let fact = s.new_atom(true, p, args(&[("x", one)])).unwrap();
    let goal = s.new_atom(false, p, BTreeMap::new()).unwrap();
    assert!(s.solve().unwrap());
    assert_eq!(s.sat.value(s.sigma(fact)), Lbool::True);
    assert_eq!(s.sat.value(s.sigma(goal)), Lbool::False);
    let x = s.arg(goal, "x");
    assert_eq!(s.arith_bounds(x), (InfRational::from(1), InfRational::from(1)));
}

#[test]
fn test_goal_chain_is_decomposed() {
    // P3 ← P2 ← P1 through rule bodies
    let mut s = solver();
    let p1 = s.new_predicate(None, "P1", vec![], None);
    let rule2: Rule = Arc::new(move |s: &mut Solver, _atm| {
        s.new_atom(false, p1, BTreeMap::new()).map(|_| ())
    });
    let p2 = s.new_predicate(None, "P2", vec![], Some(rule2));
    let rule3: Rule = Arc::new(move |s: &mut Solver, _atm| {
        s.new_atom(false, p2, BTreeMap::new()).map(|_| ())
    });
    let p3 = s.new_predicate(None, "P3", vec![], Some(rule3));
    let top = s.new_atom(false, p3, BTreeMap::new()).unwrap();
    assert!(s.solve().unwrap());
    assert_eq!(s.sat.value(s.sigma(top)), Lbool::True);
    // the whole chain was introduced and activated
    assert_eq!(s.predicates[p2].atoms.len(), 1);
    assert_eq!(s.predicates[p1].atoms.len(), 1);
    for pred in [p1, p2] {
        let atm = s.predicates[pred].atoms[0];
        assert_eq!(s.sat.value(s.sigma(atm)), Lbool::True);
    }
}

#[test]
fn test_deep_goal_deferred_when_unifiable() {
    // a goal that can unify with an existing fact keeps its own subgoal
    // unexpanded during graph construction
    let mut s = solver();
    let p1 = s.new_predicate(None, "P1", vec![], None);
    let rule2: Rule = Arc::new(move |s: &mut Solver, _atm| {
        s.new_atom(false, p1, BTreeMap::new()).map(|_| ())
    });
    let p2 = s.new_predicate(None, "P2", vec![], Some(rule2));
    // the cached plan: an already justified P2 fact
    let fact = s.new_atom(true, p2, BTreeMap::new()).unwrap();
    let goal = s.new_atom(false, p2, BTreeMap::new()).unwrap();
    // a second, independent goal keeps the expansion queue busy
    let q_rule: Rule = Arc::new(move |s: &mut Solver, _atm| {
        s.new_atom(false, p1, BTreeMap::new()).map(|_| ())
    });
    let q = s.new_predicate(None, "Q", vec![], Some(q_rule));
    s.new_atom(false, q, BTreeMap::new()).unwrap();

    assert!(s.solve().unwrap());
    assert_eq!(s.sat.value(s.sigma(fact)), Lbool::True);
    // the goal collapsed onto the fact instead of being activated
    assert_eq!(s.sat.value(s.sigma(goal)), Lbool::False);
    // its subgoal was never introduced: the flaw of the P1 atom created under
    // the goal's activation stayed unexpanded or was never activated
    for &atm in &s.predicates[p1].atoms {
        let f = s.reason(atm);
        if !s.graph.flaws[f].expanded {
            // deferred and never needed
            assert_ne!(s.sat.value(s.sigma(atm)), Lbool::True);
        }
    }
}

#[test]
fn test_disjunction_executes_cheapest_branch() {
    let mut s = solver();
    let x = s.new_int();
    let five = s.new_int_const(5);
    let three = s.new_int_const(3);
    let expensive: Branch = {
        Arc::new(move |s: &mut Solver| {
            let geq = s.geq(x, five);
            s.assert_fact(geq)
        })
    };
    let cheap: Branch = {
        Arc::new(move |s: &mut Solver| {
            let leq = s.leq(x, three);
            s.assert_fact(leq)
        })
    };
    let two = s.new_int_const(2);
    s.new_disjunction(vec![
        Disjunct {
            cost: Some(two),
            body: expensive,
        },
        Disjunct {
            cost: None,
            body: cheap,
        },
    ])
    .unwrap();
    assert!(s.solve().unwrap());
    // the default-cost branch is cheaper and gets chosen
    let (_, ub) = s.arith_bounds(x);
    assert_eq!(ub, InfRational::from(3));
}

#[test]
fn test_state_variable_conflict() {
    // two intervals insisting on the same state variable must not overlap
    let mut s = solver();
    let sv = s.new_state_variable("sv");
    let _inst = s.new_instance(sv, "sv0", BTreeMap::new()).unwrap();
    let at = s.new_predicate(Some(sv), "At", vec![], None);
    let a1 = s.new_atom(true, at, BTreeMap::new()).unwrap();
    let a2 = s.new_atom(true, at, BTreeMap::new()).unwrap();
    pin_duration(&mut s, a1, 2);
    pin_duration(&mut s, a2, 2);
    assert!(s.solve().unwrap());
    let (s1, e1) = window(&s, a1);
    let (s2, e2) = window(&s, a2);
    assert!(e1 <= s2 || e2 <= s1, "atoms still overlap: [{s1}, {e1}] and [{s2}, {e2}]");
    // the overlap surfaced as exactly one sv_flaw over the pair
    let sv_flaws = s
        .graph
        .flaws
        .values()
        .filter(|f| f.kind.name() == "sv_flaw")
        .count();
    assert_eq!(sv_flaws, 1);
}

#[test]
fn test_reusable_resource_capacity() {
    // three unit users on a capacity-2 resource: at most two may overlap
    let mut s = solver();
    let (rr, use_p) = s.new_reusable_resource("rr");
    let cap = s.new_real_const(Rational::from(2));
    let _inst = s
        .new_instance(rr, "rr0", args(&[(CAPACITY, cap)]))
        .unwrap();
    let mut atoms = Vec::new();
    for _ in 0..3 {
        let amount = s.new_real_const(Rational::ONE);
        let atm = s.new_atom(true, use_p, args(&[(AMOUNT, amount)])).unwrap();
        pin_duration(&mut s, atm, 2);
        atoms.push(atm);
    }
    assert!(s.solve().unwrap());
    // sweep the final schedule: concurrent usage never exceeds the capacity
    let windows: Vec<_> = atoms.iter().map(|&a| window(&s, a)).collect();
    let mut pulses: Vec<InfRational> = windows
        .iter()
        .flat_map(|&(a, b)| [a, b])
        .collect();
    pulses.sort();
    pulses.dedup();
    for w in pulses.windows(2) {
        let (from, to) = (w[0], w[1]);
        let usage = windows
            .iter()
            .filter(|&&(a, b)| a <= from && to <= b)
            .count();
        assert!(usage <= 2, "{usage} concurrent users in [{from}, {to}]");
    }
    assert!(s
        .graph
        .flaws
        .values()
        .any(|f| f.kind.name() == "rr_flaw"));
}

#[test]
fn test_consumable_resource_stays_in_range() {
    // an early consumer would drive the level negative: production must be
    // ordered before it
    let mut s = solver();
    let (cr, produce, consume) = s.new_consumable_resource("cr");
    let initial = s.new_real_const(Rational::ZERO);
    let cap = s.new_real_const(Rational::from(10));
    let _inst = s
        .new_instance(cr, "cr0", args(&[(INITIAL_AMOUNT, initial), (CAPACITY, cap)]))
        .unwrap();
    let five = s.new_real_const(Rational::from(5));
    let prod = s.new_atom(true, produce, args(&[(AMOUNT, five)])).unwrap();
    pin_duration(&mut s, prod, 2);
    let four = s.new_real_const(Rational::from(4));
    let cons = s.new_atom(true, consume, args(&[(AMOUNT, four)])).unwrap();
    pin_duration(&mut s, cons, 1);
    assert!(s.solve().unwrap());
    let (_, prod_end) = window(&s, prod);
    let (cons_start, _) = window(&s, cons);
    assert!(cons_start >= prod_end, "consumption starts before production ends");
}

#[test]
fn test_inapplicable_goal_is_unsolvable() {
    let mut s = solver();
    let rule: Rule = Arc::new(|s: &mut Solver, _atm| {
        let f = s.new_bool_const(false);
        s.assert_fact(f)
    });
    let p = s.new_predicate(None, "Impossible", vec![], Some(rule));
    s.new_atom(false, p, BTreeMap::new()).unwrap();
    assert_eq!(s.solve(), Err(SolveError::Unsolvable));
}

#[test]
fn test_contradictory_facts_are_unsolvable() {
    let mut s = solver();
    let x = s.new_int();
    let one = s.new_int_const(1);
    let two = s.new_int_const(2);
    let eq1 = s.eq(x, one);
    let eq2 = s.eq(x, two);
    s.assert_fact(eq1).unwrap();
    s.assert_fact(eq2).unwrap();
    assert_eq!(s.solve(), Err(SolveError::Unsolvable));
}

/// A stand-in for the external modeling layer: loads a fact `P(1)` and a
/// goal `P(?x)`.
struct UnificationProblem;

impl ModelLoader for UnificationProblem {
    fn load(&self, s: &mut Solver) -> Result<(), SolveError> {
        let p = s.new_predicate(None, "P", vec![Field::new("x", Sort::Int)], None);
        let one = s.new_int_const(1);
        let fact = s.new_atom(true, p, args(&[("x", one)]))?;
        s.set_expr("fact", fact);
        let goal = s.new_atom(false, p, BTreeMap::new())?;
        s.set_expr("goal", goal);
        Ok(())
    }
}

#[test]
fn test_read_through_model_loader() {
    let mut s = solver();
    s.read(&UnificationProblem).unwrap();
    assert!(s.solve().unwrap());
    let goal = s.expr("goal").unwrap();
    assert_eq!(s.sat.value(s.sigma(goal)), Lbool::False);
    let x = s.arg(goal, "x");
    assert_eq!(s.arith_bounds(x), (InfRational::from(1), InfRational::from(1)));
}

/// A loader whose facts are contradictory: `read` must already report the
/// problem unsolvable.
struct ContradictoryProblem;

impl ModelLoader for ContradictoryProblem {
    fn load(&self, s: &mut Solver) -> Result<(), SolveError> {
        let x = s.new_int();
        let one = s.new_int_const(1);
        let two = s.new_int_const(2);
        let eq1 = s.eq(x, one);
        s.assert_fact(eq1)?;
        let eq2 = s.eq(x, two);
        s.assert_fact(eq2)
    }
}

#[test]
fn test_read_surfaces_contradictions() {
    let mut s = solver();
    assert_eq!(s.read(&ContradictoryProblem), Err(SolveError::Unsolvable));
}

#[test]
fn test_interruption() {
    let mut s = solver();
    let b = s.new_bool();
    s.new_bool_flaw(b).unwrap();
    s.interrupter()
        .store(true, std::sync::atomic::Ordering::Relaxed);
    assert_eq!(s.solve(), Err(SolveError::Interrupted));
}

#[test]
fn test_timelines_view() {
    let mut s = solver();
    let sv = s.new_state_variable("sv");
    let _inst = s.new_instance(sv, "sv0", BTreeMap::new()).unwrap();
    let at = s.new_predicate(Some(sv), "At", vec![], None);
    let a1 = s.new_atom(true, at, BTreeMap::new()).unwrap();
    pin_duration(&mut s, a1, 3);
    assert!(s.solve().unwrap());
    let timelines = vela::json::timelines_to_json(&s);
    let tls = timelines.as_array().unwrap();
    let sv_tl = tls
        .iter()
        .find(|t| t["type"] == "StateVariable")
        .expect("missing state-variable timeline");
    assert_eq!(sv_tl["name"], "sv0");
    let values = sv_tl["values"].as_array().unwrap();
    assert!(values
        .iter()
        .any(|v| v["atoms"].as_array().is_some_and(|a| !a.is_empty())));
}

#[test]
fn test_observation_stream() {
    let mut s = solver();
    s.set_listening(true);
    let p = s.new_predicate(None, "P", vec![Field::new("x", Sort::Int)], None);
    let one = s.new_int_const(1);
    s.new_atom(true, p, args(&[("x", one)])).unwrap();
    s.new_atom(false, p, BTreeMap::new()).unwrap();
    assert!(s.solve().unwrap());
    let events = s.drain_events();
    assert!(!events.is_empty());
    let payloads: Vec<_> = events
        .iter()
        .map(|e| vela::json::event_to_json(&s, e))
        .collect();
    assert!(payloads.iter().any(|p| p["type"] == "flaw_created"));
    assert!(payloads.iter().any(|p| p["type"] == "resolver_created"));
    assert!(payloads.iter().any(|p| p["type"] == "current_flaw"));
    for p in &payloads {
        assert!(p.get("solver_id").is_some());
    }
}

#[test]
fn test_impulse_on_solver_timeline() {
    let mut s = solver();
    let imp = s.impulse_pred();
    let three = s.new_time_const(Rational::from(3));
    let atm = s.new_atom(true, imp, args(&[("at", three)])).unwrap();
    assert!(s.solve().unwrap());
    assert_eq!(s.sat.value(s.sigma(atm)), Lbool::True);
    let timelines = vela::json::timelines_to_json(&s);
    let tls = timelines.as_array().unwrap();
    let solver_tl = tls
        .iter()
        .find(|t| t["type"] == "Solver")
        .expect("missing solver timeline");
    assert!(!solver_tl["values"].as_array().unwrap().is_empty());
}

#[test]
fn test_causal_positions_are_acyclic() {
    let mut s = solver();
    let p = s.new_predicate(None, "P", vec![Field::new("x", Sort::Int)], None);
    let one = s.new_int_const(1);
    s.new_atom(true, p, args(&[("x", one)])).unwrap();
    s.new_atom(false, p, BTreeMap::new()).unwrap();
    assert!(s.solve().unwrap());
    for &(f, r) in &s.graph.causal_links {
        let effect = s.graph.resolvers[r].flaw;
        let (lb, _) = s.rdl.distance(
            s.graph.flaws[f].position,
            s.graph.flaws[effect].position,
        );
        assert!(lb >= InfRational::from(1), "causal link without ordering");
    }
}
