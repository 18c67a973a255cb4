//! Desired-state document and the predicate that scopes it to a node.

mod matcher;
mod types;

pub use matcher::matches;
pub use types::*;
