// Training module
//
// Background retraining: persisted progress, the trigger policy, the
// validation gate, and the supervisor loop that ties them together.

pub mod policy;
pub mod state;
pub mod supervisor;
pub mod validation;

pub use policy::{TriggerDecision, TriggerPolicy};
pub use state::TrainerState;
pub use supervisor::{CycleFailure, CycleOutcome, RetrainSupervisor, TickOutcome};
pub use validation::{probe_input, validate_current, ValidationError};
