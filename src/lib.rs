//! Internship placement solver.
//!
//! Given a cohort of students, a catalogue of internship offers with limited
//! seats per period and the students' ranked choices, the solver places every
//! student in some organization for every period of the cohort. It is a
//! greedy, multi-pass heuristic with fallback tiers, not an optimal matcher.

pub mod availability;
pub mod calendar;
pub mod capacity;
pub mod config;
pub mod data;
pub mod error;
pub mod offers;
pub mod preferences;
pub mod server;
pub mod sink;
pub mod solver;
pub mod store;

pub use data::{Affectation, ChoiceTag, SolverInput, SolverOutput};
pub use error::{RunError, SolverError, StoreError};
pub use solver::{solve, CancelToken, SolveOptions};
pub use store::{run_cohort, CohortStore, JsonDirStore, MemoryStore};
