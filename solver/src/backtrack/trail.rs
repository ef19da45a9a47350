use crate::backtrack::DecLvl;

/// A sequence of events with save points, allowing the changes made to a
/// datastructure to be undone in reverse order until a previous save point.
#[derive(Clone, Default)]
pub struct Trail<Event> {
    events: Vec<Event>,
    saved_states: Vec<usize>,
}

impl<Event> Trail<Event> {
    pub fn new() -> Self {
        Trail {
            events: Vec::new(),
            saved_states: Vec::new(),
        }
    }

    pub fn push(&mut self, e: Event) {
        self.events.push(e);
    }

    pub fn save_state(&mut self) -> DecLvl {
        self.saved_states.push(self.events.len());
        DecLvl::new(self.saved_states.len() as u32)
    }

    pub fn num_saved(&self) -> u32 {
        self.saved_states.len() as u32
    }

    pub fn current_decision_level(&self) -> DecLvl {
        DecLvl::new(self.num_saved())
    }

    /// Pops and hands to `f`, in reverse order, every event recorded since the
    /// last save point.
    ///
    /// # Panics
    ///
    /// Panics if there is no save point to restore.
    pub fn restore_last_with(&mut self, mut f: impl FnMut(Event)) {
        let last_index = self.saved_states.pop().expect("No saved state");
        while self.events.len() > last_index {
            let e = self.events.pop().expect("No event left");
            f(e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restore_reverses_events() {
        let mut trail: Trail<i32> = Trail::new();
        trail.push(1);
        trail.save_state();
        trail.push(2);
        trail.push(3);
        let mut undone = Vec::new();
        trail.restore_last_with(|e| undone.push(e));
        assert_eq!(undone, vec![3, 2]);
        assert_eq!(trail.num_saved(), 0);
    }
}
