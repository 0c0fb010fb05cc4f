//! Controller operations, split by concern
//!
//! Each file adds an `impl ListController` block. Operations run on the
//! controller task and never await; slow work is spawned and comes back as
//! a [`super::event_loop::Completion`].

mod mutation;
mod pagination;
mod selection;
mod sync;
mod undo;

pub(crate) use mutation::{MutationJob, mutation_worker};
pub(crate) use pagination::InFlightLoad;
pub use pagination::LoadOutcome;
