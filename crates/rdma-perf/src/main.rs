#![deny(clippy::all)]

use rdma_perf::harness::SocketHarness;
use rdma_perf::usage::{usage, USAGE_DESCRIPTORS};
use rdma_perf::{parse_params, pipeline, ArgError};

use std::env;
use std::process::ExitCode;

use tracing::{debug, error};

fn main() -> ExitCode {
    if env::var("RUST_BACKTRACE").is_err() {
        env::set_var("RUST_BACKTRACE", "1")
    }
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "rdma_perf=info")
    }

    tracing_subscriber::fmt::init();

    let config = match parse_params(env::args_os()) {
        Ok(config) => config,
        Err(err) => {
            match err {
                ArgError::Help => print!("{}", usage(&USAGE_DESCRIPTORS)),
                ArgError::Usage(_) => {
                    print!("{}", usage(&USAGE_DESCRIPTORS));
                    error!("{}", err);
                }
                _ => error!("{}", err),
            }
            return ExitCode::from(err.exit_code());
        }
    };

    debug!("parsed:\n{:#?}", config);

    let status = pipeline::run(config, &mut SocketHarness::new());
    ExitCode::from(status.code())
}
