pub mod queue;
pub mod task;

pub use queue::{
    ConfirmOutcome, FailOutcome, MutationOrigin, MutationStatus, OptimisticMutationQueue,
    PendingMutation, PersistRequest,
};
pub use task::{PersistOutcome, PersistTask};
