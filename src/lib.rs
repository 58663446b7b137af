pub mod accel;
pub mod assets;
pub mod classify;
pub mod cli;
pub mod clip;
pub mod config;
pub mod db;
pub mod encoding;
pub mod fusion;
pub mod hnsw;
pub mod index;
pub mod jobs;
pub mod pipeline;
pub mod providers;
pub mod searcher;
mod server;

pub use config::Opts;
pub use index::IndexManager;
pub use pipeline::Pipeline;
pub use searcher::Searcher;
