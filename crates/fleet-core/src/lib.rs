pub mod classifier;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod inventory;
pub mod io;
pub mod orchestrator;
pub mod paths;
pub mod provider;
pub mod reducer;
pub mod types;
pub mod webtier;

pub use error::{FleetError, RemoteError, Result};
