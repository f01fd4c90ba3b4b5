pub mod config;
pub mod errors;
pub mod extract;
pub mod llm;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod session;
pub mod store;
pub mod sync;
pub mod ui;
pub mod util;
