//! Test lifecycle: ordered fallible stages followed by an unconditional
//! teardown.

use crate::config::Config;

use std::fmt;

use anyhow::Result;
use scopeguard::{guard_on_unwind, ScopeGuard};
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    NormalizeDependencies,
    ResourceAlloc,
    ResourceInit,
    SyncConfigurations,
    InitConnection,
    SyncPostConnection,
    DoTest,
    PrintResults,
    ResourceDestroy,
}

impl Stage {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::NormalizeDependencies => "force_configurations_dependencies",
            Stage::ResourceAlloc => "resource_alloc",
            Stage::ResourceInit => "resource_init",
            Stage::SyncConfigurations => "sync_configurations",
            Stage::InitConnection => "init_connection",
            Stage::SyncPostConnection => "sync_post_connection",
            Stage::DoTest => "do_test",
            Stage::PrintResults => "print_results",
            Stage::ResourceDestroy => "resource_destroy",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    /// `stage` is the first stage that failed
    Failure { stage: Stage },
}

impl Status {
    pub const FAIL: u8 = 1;

    #[inline]
    #[must_use]
    pub fn is_success(self) -> bool {
        self == Status::Success
    }

    /// Process exit status.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Status::Success => 0,
            Status::Failure { .. } => Self::FAIL,
        }
    }
}

/// The operations a run is made of.
///
/// Every stage works on a resource handle created by
/// [`Collaborators::create_resource`]. That handle must be safe to pass to
/// [`Collaborators::resource_destroy`] whatever stage it reached.
pub trait Collaborators {
    type Resource;

    /// Returns a handle in its initial, unallocated state.
    fn create_resource(&mut self, config: &Config) -> Self::Resource;

    fn normalize_dependencies(&mut self, config: &mut Config) -> Result<()>;

    fn resource_alloc(&mut self, res: &mut Self::Resource, config: &Config) -> Result<()>;

    fn resource_init(&mut self, res: &mut Self::Resource, config: &Config) -> Result<()>;

    fn sync_configurations(&mut self, res: &mut Self::Resource, config: &Config) -> Result<()>;

    fn init_connection(&mut self, res: &mut Self::Resource, config: &Config) -> Result<()>;

    fn sync_post_connection(&mut self, res: &mut Self::Resource, config: &Config) -> Result<()>;

    fn do_test(&mut self, res: &mut Self::Resource, config: &Config) -> Result<()>;

    fn print_results(&mut self, res: &mut Self::Resource, config: &Config) -> Result<()>;

    fn resource_destroy(&mut self, res: &mut Self::Resource) -> Result<()>;

    fn wait_for_keypress(&mut self);

    fn report_status(&mut self, status: Status);
}

fn check(stage: Stage, f: impl FnOnce() -> Result<()>) -> Result<(), Stage> {
    debug!("{stage}");
    f().map_err(|err| {
        error!("{stage} failed: {err:?}");
        stage
    })
}

fn run_stages<C: Collaborators>(
    collab: &mut C,
    res: &mut C::Resource,
    config: &mut Config,
) -> Result<(), Stage> {
    check(Stage::NormalizeDependencies, || {
        collab.normalize_dependencies(config)
    })?;

    let config: &Config = config;
    info!("\n{config}");

    check(Stage::ResourceAlloc, || collab.resource_alloc(res, config))?;
    check(Stage::ResourceInit, || collab.resource_init(res, config))?;
    check(Stage::SyncConfigurations, || {
        collab.sync_configurations(res, config)
    })?;
    check(Stage::InitConnection, || collab.init_connection(res, config))?;
    check(Stage::SyncPostConnection, || {
        collab.sync_post_connection(res, config)
    })?;
    check(Stage::DoTest, || collab.do_test(res, config))?;

    if !config.role.is_server() {
        check(Stage::PrintResults, || collab.print_results(res, config))?;
    }

    Ok(())
}

/// Runs every stage in order until the first failure, then tears down.
///
/// The resource handle is destroyed exactly once, also when a stage
/// panics. A failing destroy only turns a successful run into a failure;
/// an earlier failure keeps its stage. The status is handed to
/// [`Collaborators::report_status`] and returned.
pub fn run<C: Collaborators>(mut config: Config, collab: &mut C) -> Status {
    let res = collab.create_resource(&config);

    let mut guard = guard_on_unwind((&mut *collab, res), |(collab, mut res)| {
        if let Err(err) = collab.resource_destroy(&mut res) {
            error!("resource_destroy failed while unwinding: {err:?}");
        }
    });

    let mut status = {
        let (collab, res) = &mut *guard;
        match run_stages(&mut **collab, res, &mut config) {
            Ok(()) => Status::Success,
            Err(stage) => Status::Failure { stage },
        }
    };

    let (collab, mut res) = ScopeGuard::into_inner(guard);

    if config.wait_before_exit {
        collab.wait_for_keypress();
    }

    if let Err(err) = collab.resource_destroy(&mut res) {
        error!("{} failed: {err:?}", Stage::ResourceDestroy);
        if status.is_success() {
            status = Status::Failure {
                stage: Stage::ResourceDestroy,
            };
        }
    }

    collab.report_status(status);
    status
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(Status::Success.code(), 0);
        let failure = Status::Failure {
            stage: Stage::DoTest,
        };
        assert_eq!(failure.code(), 1);
        assert!(!failure.is_success());
    }

    #[test]
    fn stage_names() {
        assert_eq!(
            Stage::NormalizeDependencies.to_string(),
            "force_configurations_dependencies"
        );
        assert_eq!(Stage::SyncPostConnection.to_string(), "sync_post_connection");
    }
}
