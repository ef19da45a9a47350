//! JSON views of the solver state — items, atoms, flaws, resolvers, the
//! graph and the five timeline shapes — plus the observation event stream.

use crate::core::{Lbool, Lit};
use crate::graph::{FlawId, ResolverId};
use crate::model::items::{ArithKind, Item, ItemId};
use crate::solver::{Solver, AT, CAPACITY, INITIAL_AMOUNT, START};
use crate::types::SmartKind;
use crate::utils::{InfRational, Rational};
use serde_json::{json, Value};
use std::collections::BTreeSet;

/// An entry of the observation stream. Payloads are resolved against the
/// solver state at serialization time through [event_to_json].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Event {
    FlawCreated(FlawId),
    FlawStateChanged(FlawId),
    FlawCostChanged(FlawId),
    FlawPositionChanged(FlawId),
    CurrentFlaw(FlawId),
    ResolverCreated(ResolverId),
    ResolverStateChanged(ResolverId),
    CurrentResolver(ResolverId),
    CausalLinkAdded { flaw: FlawId, resolver: ResolverId },
    Graph,
}

pub fn rational_to_json(rat: Rational) -> Value {
    json!({ "num": rat.numer(), "den": rat.denom() })
}

pub fn inf_rational_to_json(rat: InfRational) -> Value {
    let mut j = rational_to_json(rat.rat);
    if rat.eps != Rational::ZERO {
        j["inf"] = rational_to_json(rat.eps);
    }
    j
}

fn lit_to_string(l: Lit) -> String {
    format!(
        "{}b{}",
        if l.is_positive() { "" } else { "!" },
        l.variable().to_u32()
    )
}

fn lbool_to_str(v: Lbool) -> &'static str {
    match v {
        Lbool::True => "True",
        Lbool::False => "False",
        Lbool::Undef => "Undefined",
    }
}

/// The value view of an item.
pub fn value_to_json(slv: &Solver, item: ItemId) -> Value {
    match &slv.items[item] {
        Item::Bool(l) => json!({
            "type": "bool",
            "lit": lit_to_string(*l),
            "val": lbool_to_str(slv.sat.value(*l)),
        }),
        Item::Arith(kind, _) => {
            let tp = match kind {
                ArithKind::Int => "int",
                ArithKind::Real => "real",
                ArithKind::Time => "time",
            };
            let (lb, ub) = slv.arith_bounds(item);
            let mut j = json!({
                "type": tp,
                "val": inf_rational_to_json(slv.arith_value(item)),
            });
            if lb.is_finite() {
                j["lb"] = inf_rational_to_json(lb);
            }
            if ub.is_finite() {
                j["ub"] = inf_rational_to_json(ub);
            }
            j
        }
        Item::String(s) => json!({ "type": "string", "val": s }),
        Item::Enum(v) => json!({
            "type": "enum",
            "var": usize::from(*v),
            "vals": slv.ov.domain(*v, &slv.sat).iter().map(|&i| usize::from(i)).collect::<Vec<_>>(),
        }),
        Item::Component(_) | Item::Atom(_) => json!({
            "type": "item",
            "val": usize::from(item),
        }),
    }
}

/// The full view of a component instance or atom.
pub fn item_to_json(slv: &Solver, item: ItemId) -> Value {
    match &slv.items[item] {
        Item::Component(c) => {
            let mut j = json!({
                "id": usize::from(item),
                "name": c.name,
                "type": slv.types[c.tp].name,
            });
            if !c.exprs.is_empty() {
                let mut exprs = serde_json::Map::new();
                for (name, &i) in &c.exprs {
                    exprs.insert(name.clone(), value_to_json(slv, i));
                }
                j["exprs"] = Value::Object(exprs);
            }
            j
        }
        Item::Atom(a) => {
            let status = match slv.sat.value(a.sigma) {
                Lbool::True => "Active",
                Lbool::False => "Unified",
                Lbool::Undef => "Inactive",
            };
            let mut exprs = serde_json::Map::new();
            for (name, &i) in &a.exprs {
                exprs.insert(name.clone(), value_to_json(slv, i));
            }
            json!({
                "id": usize::from(item),
                "type": slv.predicates[a.pred].name,
                "sigma": a.sigma.variable().to_u32(),
                "status": status,
                "is_fact": a.is_fact,
                "exprs": Value::Object(exprs),
            })
        }
        _ => value_to_json(slv, item),
    }
}

/// The `{active, forbidden, inactive}` state of a flaw, from φ.
pub fn flaw_state(slv: &Solver, f: FlawId) -> &'static str {
    match slv.sat.value(slv.graph.flaws[f].phi()) {
        Lbool::True => "active",
        Lbool::False => "forbidden",
        Lbool::Undef => "inactive",
    }
}

/// The `{active, forbidden, inactive}` state of a resolver, from ρ.
pub fn resolver_state(slv: &Solver, r: ResolverId) -> &'static str {
    match slv.sat.value(slv.graph.resolvers[r].rho) {
        Lbool::True => "active",
        Lbool::False => "forbidden",
        Lbool::Undef => "inactive",
    }
}

fn flaw_position(slv: &Solver, f: FlawId) -> Value {
    let (lb, _) = slv
        .rdl
        .distance(slv.rdl.zero(), slv.graph.flaws[f].position);
    inf_rational_to_json(lb)
}

pub fn flaw_to_json(slv: &Solver, f: FlawId) -> Value {
    let flaw = &slv.graph.flaws[f];
    json!({
        "id": usize::from(f),
        "state": flaw_state(slv, f),
        "phi": lit_to_string(flaw.phi()),
        "cost": rational_to_json(flaw.est_cost),
        "pos": flaw_position(slv, f),
        "data": { "type": flaw.kind.name() },
        "causes": flaw.causes.iter().map(|&c| usize::from(c)).collect::<Vec<_>>(),
    })
}

pub fn resolver_to_json(slv: &Solver, r: ResolverId) -> Value {
    let resolver = &slv.graph.resolvers[r];
    json!({
        "id": usize::from(r),
        "state": resolver_state(slv, r),
        "flaw": usize::from(resolver.flaw),
        "rho": lit_to_string(resolver.rho),
        "intrinsic_cost": rational_to_json(resolver.intrinsic_cost),
        "data": { "type": resolver.kind.name() },
        "preconditions": resolver.preconditions.iter().map(|&p| usize::from(p)).collect::<Vec<_>>(),
    })
}

pub fn graph_to_json(slv: &Solver) -> Value {
    let mut j = json!({
        "flaws": slv.graph.flaws.keys().filter(|&f| slv.graph.flaws[f].phi.is_some())
            .map(|f| flaw_to_json(slv, f)).collect::<Vec<_>>(),
        "resolvers": slv.graph.resolvers.keys().map(|r| resolver_to_json(slv, r)).collect::<Vec<_>>(),
    });
    if let Some(f) = slv.current_flaw() {
        j["current_flaw"] = json!(usize::from(f));
    }
    if let Some(r) = slv.current_resolver() {
        j["current_resolver"] = json!(usize::from(r));
    }
    j
}

/// The solver state: component instances, atoms and named expressions.
pub fn solver_to_json(slv: &Solver) -> Value {
    let mut items = Vec::new();
    let mut atoms = Vec::new();
    for (i, item) in slv.items.iter() {
        match item {
            Item::Component(_) => items.push(item_to_json(slv, i)),
            Item::Atom(_) => atoms.push(item_to_json(slv, i)),
            _ => {}
        }
    }
    let mut exprs = serde_json::Map::new();
    for (name, &i) in slv.exprs() {
        exprs.insert(name.clone(), value_to_json(slv, i));
    }
    json!({
        "name": slv.name,
        "items": items,
        "atoms": atoms,
        "exprs": Value::Object(exprs),
    })
}

fn atom_pulse(slv: &Solver, atm: ItemId) -> Option<InfRational> {
    if let Some(at) = slv.opt_arg(atm, AT) {
        return Some(slv.arith_value(at));
    }
    slv.opt_arg(atm, START).map(|s| slv.arith_value(s))
}

/// The timelines of the solver: its own root timeline plus one per smart
/// type instance.
pub fn timelines_to_json(slv: &Solver) -> Value {
    let mut timelines = Vec::new();

    // root atoms, by starting pulse
    let mut root_atoms: Vec<(InfRational, ItemId)> = Vec::new();
    for (i, item) in slv.items.iter() {
        if let Item::Atom(a) = item {
            if slv.predicates[a.pred].owner.is_none()
                && slv.sat.value(a.sigma) == Lbool::True
            {
                if let Some(p) = atom_pulse(slv, i) {
                    root_atoms.push((p, i));
                }
            }
        }
    }
    root_atoms.sort();
    if !root_atoms.is_empty() {
        timelines.push(json!({
            "id": slv.id,
            "type": "Solver",
            "name": slv.name,
            "values": root_atoms.iter().map(|&(_, a)| usize::from(a)).collect::<Vec<_>>(),
        }));
    }

    for idx in 0..slv.smarts.len() {
        let kind = slv.smarts[idx].kind;
        for (instance, atoms) in slv.smart_partition(idx, false) {
            let name = match &slv.items[instance] {
                Item::Component(c) => c.name.clone(),
                _ => String::new(),
            };
            match kind {
                SmartKind::Agent => {
                    let mut pulsed: Vec<(InfRational, ItemId)> = atoms
                        .iter()
                        .filter_map(|&a| atom_pulse(slv, a).map(|p| (p, a)))
                        .collect();
                    pulsed.sort();
                    timelines.push(json!({
                        "id": usize::from(instance),
                        "type": "Agent",
                        "name": name,
                        "values": pulsed.iter().map(|&(_, a)| usize::from(a)).collect::<Vec<_>>(),
                    }));
                }
                SmartKind::StateVariable => {
                    timelines.push(json!({
                        "id": usize::from(instance),
                        "type": "StateVariable",
                        "name": name,
                        "values": sweep_segments(slv, &atoms, |_, overlapping, _, _| json!({
                            "atoms": overlapping.iter().map(|&a| usize::from(a)).collect::<Vec<_>>(),
                        })),
                    }));
                }
                SmartKind::ReusableResource => {
                    let capacity = slv
                        .opt_arg(instance, CAPACITY)
                        .map(|c| inf_rational_to_json(slv.arith_value(c)))
                        .unwrap_or(Value::Null);
                    timelines.push(json!({
                        "id": usize::from(instance),
                        "type": "ReusableResource",
                        "name": name,
                        "capacity": capacity,
                        "values": sweep_segments(slv, &atoms, |s, overlapping, _, _| {
                            let usage = overlapping.iter().fold(Rational::ZERO, |acc, &a| {
                                acc + s.arith_value(s.arg(a, crate::solver::AMOUNT)).rat
                            });
                            json!({
                                "usage": rational_to_json(usage),
                                "atoms": overlapping.iter().map(|&a| usize::from(a)).collect::<Vec<_>>(),
                            })
                        }),
                    }));
                }
                SmartKind::ConsumableResource => {
                    let capacity = slv
                        .opt_arg(instance, CAPACITY)
                        .map(|c| inf_rational_to_json(slv.arith_value(c)))
                        .unwrap_or(Value::Null);
                    let initial = slv
                        .opt_arg(instance, INITIAL_AMOUNT)
                        .map(|c| inf_rational_to_json(slv.arith_value(c)))
                        .unwrap_or_else(|| rational_to_json(Rational::ZERO));
                    timelines.push(json!({
                        "id": usize::from(instance),
                        "type": "ConsumableResource",
                        "name": name,
                        "capacity": capacity,
                        "initial_amount": initial,
                        "values": sweep_segments(slv, &atoms, |s, overlapping, from, to| json!({
                            "start": rational_to_json(s.cr_level(instance, &atoms, from)),
                            "end": rational_to_json(s.cr_level(instance, &atoms, to)),
                            "atoms": overlapping.iter().map(|&a| usize::from(a)).collect::<Vec<_>>(),
                        })),
                    }));
                }
            }
        }
    }
    Value::Array(timelines)
}

/// Splits a timeline at its pulses and renders each segment with the set of
/// atoms overlapping it.
fn sweep_segments(
    slv: &Solver,
    atoms: &[ItemId],
    render: impl Fn(&Solver, &BTreeSet<ItemId>, InfRational, InfRational) -> Value,
) -> Value {
    let mut pulses: BTreeSet<InfRational> = BTreeSet::new();
    let mut windows = Vec::new();
    for &atm in atoms {
        let (start, end) = slv.atom_window(atm);
        pulses.insert(start);
        pulses.insert(end);
        windows.push((atm, start, end));
    }
    let pulses: Vec<InfRational> = pulses.into_iter().collect();
    let mut values = Vec::new();
    for w in pulses.windows(2) {
        let (from, to) = (w[0], w[1]);
        let overlapping: BTreeSet<ItemId> = windows
            .iter()
            .filter(|&&(_, s, e)| s <= from && to <= e)
            .map(|&(a, _, _)| a)
            .collect();
        let mut v = render(slv, &overlapping, from, to);
        v["from"] = inf_rational_to_json(from);
        v["to"] = inf_rational_to_json(to);
        values.push(v);
    }
    Value::Array(values)
}

/// Renders an observation event, stamping the message type and solver id.
pub fn event_to_json(slv: &Solver, event: &Event) -> Value {
    let tag = |mut j: Value, tp: &str| {
        j["type"] = json!(tp);
        j["solver_id"] = json!(slv.id);
        j
    };
    match *event {
        Event::FlawCreated(f) => tag(flaw_to_json(slv, f), "flaw_created"),
        Event::FlawStateChanged(f) => tag(
            json!({ "id": usize::from(f), "state": flaw_state(slv, f) }),
            "flaw_state_changed",
        ),
        Event::FlawCostChanged(f) => tag(
            json!({
                "id": usize::from(f),
                "cost": rational_to_json(slv.graph.flaws[f].est_cost),
            }),
            "flaw_cost_changed",
        ),
        Event::FlawPositionChanged(f) => tag(
            json!({ "id": usize::from(f), "position": flaw_position(slv, f) }),
            "flaw_position_changed",
        ),
        Event::CurrentFlaw(f) => tag(json!({ "id": usize::from(f) }), "current_flaw"),
        Event::ResolverCreated(r) => tag(resolver_to_json(slv, r), "resolver_created"),
        Event::ResolverStateChanged(r) => tag(
            json!({ "id": usize::from(r), "state": resolver_state(slv, r) }),
            "resolver_state_changed",
        ),
        Event::CurrentResolver(r) => tag(json!({ "id": usize::from(r) }), "current_resolver"),
        Event::CausalLinkAdded { flaw, resolver } => tag(
            json!({
                "flaw_id": usize::from(flaw),
                "resolver_id": usize::from(resolver),
            }),
            "causal_link_added",
        ),
        Event::Graph => tag(graph_to_json(slv), "graph"),
    }
}
