/// A decision level: the number of save points currently on a trail.
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash, Debug)]
pub struct DecLvl(u32);

impl DecLvl {
    pub const ROOT: DecLvl = DecLvl(0);

    pub fn new(num_saved: u32) -> Self {
        DecLvl(num_saved)
    }

    pub fn to_u32(self) -> u32 {
        self.0
    }
}

impl From<usize> for DecLvl {
    fn from(u: usize) -> Self {
        DecLvl(u as u32)
    }
}

impl std::fmt::Display for DecLvl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DecLvl({})", self.0)
    }
}

/// Datastructures whose changes can be undone in reverse chronological order.
pub trait Backtrack {
    fn save_state(&mut self) -> DecLvl;
    fn num_saved(&self) -> u32;
    fn current_decision_level(&self) -> DecLvl {
        DecLvl::new(self.num_saved())
    }
    fn is_root_level(&self) -> bool {
        self.num_saved() == 0
    }
    fn restore_last(&mut self);
    fn restore(&mut self, saved_id: DecLvl) {
        while self.current_decision_level() > saved_id {
            self.restore_last();
        }
    }
    fn reset(&mut self) {
        self.restore(DecLvl::ROOT);
    }
}
