//! The flaw/resolver graph: a bipartite AND/OR structure where flaws are open
//! subproblems and resolvers their candidate fixes, costed by the `h₁`
//! relaxed-plan heuristic.

mod flaw;
mod flaws;
mod graph_impl;
mod h1;
mod resolver;

pub use flaw::*;
pub use graph_impl::*;
pub use resolver::*;
