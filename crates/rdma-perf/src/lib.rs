#![deny(clippy::all)]

mod utils;

pub mod args;
pub mod argv;
pub mod config;
pub mod error;
pub mod harness;
pub mod pipeline;
pub mod usage;

pub use self::args::parse_params;
pub use self::config::Config;
pub use self::error::ArgError;
pub use self::pipeline::{run, Collaborators, Stage, Status};
