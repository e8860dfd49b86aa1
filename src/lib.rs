pub mod alias;
pub mod drafting;
pub mod error;
pub mod matter;
pub mod observability;
pub mod pipeline;
pub mod presets;
pub mod snapshot;
pub mod stages;
pub mod step;
pub mod validation;

pub use error::{MissingPrerequisite, PipelineError, StageError};
pub use pipeline::{Pipeline, PipelineContext, PipelineResult, RunOptions, Stage, StageOutput};
pub use step::{StepStatus, StepSummary};
