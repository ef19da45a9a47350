//! Agents: components whose atoms form a timeline with no exclusivity or
//! capacity semantics. They exist for the timeline view and report no
//! inconsistencies.

use crate::model::types::TypeId;
use crate::solver::Solver;
use crate::types::SmartKind;

impl Solver {
    /// Declares an agent type; predicates later declared on it are tracked
    /// for the agent's timeline but never produce flaws.
    pub fn new_agent(&mut self, name: impl Into<String>) -> TypeId {
        self.register_smart(name, SmartKind::Agent)
    }
}
