//! readscore-core: Marking sessions, composite scorers, and orchestration.
//!
//! This crate holds the data model, the collaborator traits, and every
//! scoring rule the rest of the readscore system builds on.

pub mod error;
pub mod fluency;
pub mod grid;
pub mod model;
pub mod orchestrator;
pub mod parser;
pub mod replay;
pub mod retell;
pub mod sheet;
pub mod tally;
pub mod timing;
pub mod traits;
