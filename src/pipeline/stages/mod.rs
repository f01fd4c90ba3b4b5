//! The standard pipeline stages.

mod ingest;
mod persist;
mod requirements;
mod review;
mod test_cases;

pub use ingest::{DEFAULT_SOURCE_FILE, IngestStage};
pub use persist::PersistStage;
pub use requirements::RequirementsStage;
pub use review::ReviewStage;
pub use test_cases::TestsStage;

/// Base instruction every generation stage is hydrated on top of.
pub const AGENT_INSTRUCTIONS: &str = "You are the Requirements Agent. Follow the [Memory] settings for tone and format. \
Be concise, avoid speculation, and produce tracker-ready requirements and test cases.";
