pub mod address;
pub mod blob;
pub mod cli;
pub mod config;
pub mod context;
mod db;
pub mod embedding;
pub mod error;
pub mod index;
mod metrics;
pub mod model;
pub mod pipeline;
pub mod retry;
pub mod server;
pub mod utils;

pub use config::Opts;
pub use context::AppContext;
pub use error::{BackendError, Error};
