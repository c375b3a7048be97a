//! Engine layer: filter pipeline, observation pipeline, prediction
//! assembly, and the `Processor` that binds them to session-scoped calls.

pub mod filters;
pub mod observation;
pub mod prediction;
pub mod processor;

pub use filters::{run_pipeline, FilterContext};
pub use observation::{apply_observe, ObserveOutcome};
pub use prediction::{assemble, rank};
pub use processor::{Processor, Stores};

/// Re-export commonly used types.
pub mod prelude {
    pub use crate::filters::FilterContext;
    pub use crate::observation::ObserveOutcome;
    pub use crate::processor::{Processor, Stores};
}
