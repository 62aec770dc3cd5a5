use rdma_perf::config::{Config, Role};
use rdma_perf::pipeline::{run, Collaborators, Stage, Status};

use std::panic::{self, AssertUnwindSafe};

use anyhow::{anyhow, Result};

#[derive(Debug, Default)]
struct Recorder {
    calls: Vec<&'static str>,
    fail_at: Option<Stage>,
    panic_at: Option<Stage>,
    destroy_fails: bool,
    reported: Option<Status>,
}

#[derive(Debug, Default)]
struct Handle {
    destroyed: usize,
}

impl Recorder {
    fn failing_at(stage: Stage) -> Self {
        Self {
            fail_at: Some(stage),
            ..Self::default()
        }
    }

    fn step(&mut self, stage: Stage) -> Result<()> {
        self.calls.push(stage.as_str());
        if self.panic_at == Some(stage) {
            panic!("{stage} exploded");
        }
        if self.fail_at == Some(stage) {
            return Err(anyhow!("{stage} failed on purpose"));
        }
        Ok(())
    }

    fn count(&self, name: &str) -> usize {
        self.calls.iter().filter(|&&call| call == name).count()
    }
}

impl Collaborators for Recorder {
    type Resource = Handle;

    fn create_resource(&mut self, _: &Config) -> Handle {
        self.calls.push("create_resource");
        Handle::default()
    }

    fn normalize_dependencies(&mut self, config: &mut Config) -> Result<()> {
        config.batch_size = config.batch_size.max(1);
        self.step(Stage::NormalizeDependencies)
    }

    fn resource_alloc(&mut self, _: &mut Handle, _: &Config) -> Result<()> {
        self.step(Stage::ResourceAlloc)
    }

    fn resource_init(&mut self, _: &mut Handle, _: &Config) -> Result<()> {
        self.step(Stage::ResourceInit)
    }

    fn sync_configurations(&mut self, _: &mut Handle, _: &Config) -> Result<()> {
        self.step(Stage::SyncConfigurations)
    }

    fn init_connection(&mut self, _: &mut Handle, _: &Config) -> Result<()> {
        self.step(Stage::InitConnection)
    }

    fn sync_post_connection(&mut self, _: &mut Handle, _: &Config) -> Result<()> {
        self.step(Stage::SyncPostConnection)
    }

    fn do_test(&mut self, _: &mut Handle, config: &Config) -> Result<()> {
        assert!(config.batch_size >= 1, "normalized config must reach do_test");
        self.step(Stage::DoTest)
    }

    fn print_results(&mut self, _: &mut Handle, _: &Config) -> Result<()> {
        self.step(Stage::PrintResults)
    }

    fn resource_destroy(&mut self, res: &mut Handle) -> Result<()> {
        res.destroyed += 1;
        assert_eq!(res.destroyed, 1, "resource destroyed twice");
        self.calls.push(Stage::ResourceDestroy.as_str());
        if self.destroy_fails {
            return Err(anyhow!("destroy failed on purpose"));
        }
        Ok(())
    }

    fn wait_for_keypress(&mut self) {
        self.calls.push("wait_for_keypress");
    }

    fn report_status(&mut self, status: Status) {
        assert!(self.reported.is_none(), "status reported twice");
        self.calls.push("report_status");
        self.reported = Some(status);
    }
}

fn client() -> Config {
    Config::default()
}

fn server() -> Config {
    Config {
        role: Role::Server,
        ..Config::default()
    }
}

const STAGES: [Stage; 7] = [
    Stage::NormalizeDependencies,
    Stage::ResourceAlloc,
    Stage::ResourceInit,
    Stage::SyncConfigurations,
    Stage::InitConnection,
    Stage::SyncPostConnection,
    Stage::DoTest,
];

#[test]
fn client_success_runs_every_stage_once() {
    let mut rec = Recorder::default();
    let status = run(client(), &mut rec);

    assert_eq!(status, Status::Success);
    assert_eq!(status.code(), 0);
    assert_eq!(rec.reported, Some(Status::Success));
    assert_eq!(
        rec.calls,
        [
            "create_resource",
            "force_configurations_dependencies",
            "resource_alloc",
            "resource_init",
            "sync_configurations",
            "init_connection",
            "sync_post_connection",
            "do_test",
            "print_results",
            "resource_destroy",
            "report_status",
        ]
    );
}

#[test]
fn server_success_never_prints_results() {
    let mut rec = Recorder::default();
    let status = run(server(), &mut rec);

    assert_eq!(status, Status::Success);
    assert_eq!(rec.count("print_results"), 0);
    assert_eq!(rec.count("do_test"), 1);
    assert_eq!(rec.count("resource_destroy"), 1);
}

#[test]
fn first_failure_stops_the_pipeline() {
    for (n, &failing) in STAGES.iter().enumerate() {
        for config in [client(), server()] {
            let mut rec = Recorder::failing_at(failing);
            let status = run(config, &mut rec);

            assert_eq!(status, Status::Failure { stage: failing });
            assert_eq!(status.code(), 1);
            assert_eq!(rec.reported, Some(status));

            for &later in &STAGES[n + 1..] {
                assert_eq!(rec.count(later.as_str()), 0, "{later} ran after {failing}");
            }
            assert_eq!(rec.count("print_results"), 0);
            assert_eq!(rec.count("resource_destroy"), 1);
            assert_eq!(rec.calls.last().copied(), Some("report_status"));
        }
    }
}

#[test]
fn print_results_failure_is_reported() {
    let mut rec = Recorder::failing_at(Stage::PrintResults);
    let status = run(client(), &mut rec);
    assert_eq!(
        status,
        Status::Failure {
            stage: Stage::PrintResults
        }
    );
    assert_eq!(rec.count("resource_destroy"), 1);
}

#[test]
fn destroy_failure_downgrades_success() {
    let mut rec = Recorder {
        destroy_fails: true,
        ..Recorder::default()
    };
    let status = run(client(), &mut rec);
    assert_eq!(
        status,
        Status::Failure {
            stage: Stage::ResourceDestroy
        }
    );
    assert_eq!(rec.reported, Some(status));
}

#[test]
fn destroy_failure_keeps_earlier_failure() {
    let mut rec = Recorder {
        fail_at: Some(Stage::InitConnection),
        destroy_fails: true,
        ..Recorder::default()
    };
    let status = run(client(), &mut rec);
    assert_eq!(
        status,
        Status::Failure {
            stage: Stage::InitConnection
        }
    );
}

#[test]
fn wait_happens_before_release() {
    for fail_at in [None, Some(Stage::ResourceInit)] {
        let mut rec = Recorder {
            fail_at,
            ..Recorder::default()
        };
        let config = Config {
            wait_before_exit: true,
            ..client()
        };
        run(config, &mut rec);

        let tail = &rec.calls[rec.calls.len() - 3..];
        assert_eq!(tail, ["wait_for_keypress", "resource_destroy", "report_status"]);
    }
}

#[test]
fn no_wait_unless_asked() {
    let mut rec = Recorder::default();
    run(client(), &mut rec);
    assert_eq!(rec.count("wait_for_keypress"), 0);
}

#[test]
fn panicking_stage_still_releases() {
    let mut rec = Recorder {
        panic_at: Some(Stage::DoTest),
        ..Recorder::default()
    };
    let result = panic::catch_unwind(AssertUnwindSafe(|| run(client(), &mut rec)));

    assert!(result.is_err());
    assert_eq!(rec.count("resource_destroy"), 1);
    assert_eq!(rec.count("report_status"), 0);
}
