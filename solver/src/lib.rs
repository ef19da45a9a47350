//! Core of an integrated constraint-based planner.
//!
//! Given a problem expressed as typed items, predicate instances (atoms),
//! rules and constraints, the solver searches for a grounding of all atoms
//! that satisfies every posted constraint and eliminates every *flaw*.
//!
//! The building blocks:
//!  - [graph]: the flaw/resolver graph, a bipartite AND/OR structure of open
//!    subproblems and their candidate fixes, costed by a relaxed-plan
//!    heuristic;
//!  - [reasoners]: the four cooperating propagators the graph is kept in sync
//!    with — Boolean SAT, linear real arithmetic, difference logic over reals
//!    and an object-variable theory;
//!  - [solver]: the driver, a DPLL-style decision/backtracking loop gluing
//!    the graph to the propagators;
//!  - [types]: smart types (state variables and resources) that inspect every
//!    consistent assignment and inject new flaws for the overlaps they find.

pub mod backtrack;
pub mod collections;
pub mod core;
pub mod graph;
pub mod json;
pub mod model;
pub mod reasoners;
pub mod solver;
pub mod types;
pub mod utils;

pub use crate::solver::{ModelLoader, OrderingTheory, SolveError, Solver, SolverConfig};
