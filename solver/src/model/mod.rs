//! The typed data model the external modeling layer targets: items, atoms,
//! predicates with rule closures, and component types.

pub mod items;
pub mod lang;
pub mod types;

pub use items::*;
pub use types::*;
