//! Task graph execution.
//!
//! A plan is an ordered list of `Task`s whose `depends_on` edges form a
//! (nominally acyclic) graph. `TaskGraph` answers which tasks are runnable
//! given the set of completed ids, `ExecutionState` accumulates what the
//! capabilities hand back, and `Scheduler` drives one task per step until
//! nothing is runnable or the step budget runs out.

pub mod executor;
pub mod state;
pub mod task;

pub use executor::{RunReport, RunResult, Scheduler, StepRecord};
pub use state::{ExecutionState, StateDelta};
pub use task::TaskGraph;
