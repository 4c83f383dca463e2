pub mod fusion;
pub mod generator;
pub mod router;
pub mod state_machine;

pub use state_machine::{run_turn, TurnDeps};
