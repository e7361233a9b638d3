//! Input data: the run registry and the static policy lists.

pub mod lists;
pub mod registry;
