// Operator modules
pub mod logging;
pub mod replay;

// Local state (configuration, identity key)
pub mod state;

pub use replay::{replay, Replayer, Report, Script, Step, StepError, StepOutcome, StepResult};
pub use state::{AppConfig, AppState, StateError};
