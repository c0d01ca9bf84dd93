pub(crate) mod branch;
pub mod path;
pub mod registry;
pub mod state;

pub use path::ValidatorPath;
pub use registry::{PathHandle, Validator};
pub use state::{FinishState, Outcome, PathReport, PathStats, RunningState};
