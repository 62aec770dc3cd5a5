//! Collaborators that run a test between two processes over TCP.

mod channel;
mod deps;
mod resources;
mod workload;

pub use self::channel::{Dest, Message, TestParams};
pub use self::deps::force_configurations_dependencies;
pub use self::resources::Resources;
pub use self::workload::Stats;

use crate::config::Config;
use crate::pipeline::{Collaborators, Status};

use std::io::{self, BufRead, Write};

use anyhow::{anyhow, Context as _, Result};
use tracing::{info, warn};

/// Stateless driver of the socket based test; all state lives in
/// [`Resources`].
#[derive(Debug, Default)]
pub struct SocketHarness;

impl SocketHarness {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Collaborators for SocketHarness {
    type Resource = Resources;

    fn create_resource(&mut self, config: &Config) -> Resources {
        Resources::new(config)
    }

    fn normalize_dependencies(&mut self, config: &mut Config) -> Result<()> {
        force_configurations_dependencies(config)
    }

    fn resource_alloc(&mut self, res: &mut Resources, config: &Config) -> Result<()> {
        res.alloc(config)
    }

    fn resource_init(&mut self, res: &mut Resources, config: &Config) -> Result<()> {
        res.init(config)
    }

    fn sync_configurations(&mut self, res: &mut Resources, config: &Config) -> Result<()> {
        let local = TestParams::new(config);
        let msg = channel::exchange(res.stream()?, &Message::Params(local.clone()))?;
        let remote = match msg {
            Message::Params(remote) => remote,
            other => return Err(anyhow!("unexpected message {:?}", other)),
        };
        info!("remote params:\n{:#?}", remote);
        local
            .check_peer(&remote)
            .context("configurations of both sides do not match")
    }

    fn init_connection(&mut self, res: &mut Resources, config: &Config) -> Result<()> {
        let local_dest = Dest {
            qpn: std::process::id() & 0x00ff_ffff,
            psn: rand::random::<u32>() & 0x00ff_ffff,
            mac: config.mac.clone(),
        };
        info!("local dest:\n{:#?}", local_dest);

        let msg = channel::exchange(res.stream()?, &Message::Dest(local_dest.clone()))?;
        let remote_dest = match msg {
            Message::Dest(dest) => dest,
            other => return Err(anyhow!("unexpected message {:?}", other)),
        };
        info!("remote dest:\n{:#?}", remote_dest);

        res.local_dest = Some(local_dest);
        res.remote_dest = Some(remote_dest);
        Ok(())
    }

    fn sync_post_connection(&mut self, res: &mut Resources, _: &Config) -> Result<()> {
        channel::barrier(res.stream()?, Message::Ready)?;
        if let (Some(local), Some(remote)) = (&res.local_dest, &res.remote_dest) {
            info!(
                local_qpn = local.qpn,
                remote_qpn = remote.qpn,
                remote_psn = remote.psn,
                "connection established"
            );
        }
        Ok(())
    }

    fn do_test(&mut self, res: &mut Resources, config: &Config) -> Result<()> {
        if config.role.is_server() {
            workload::run_server(res, config)
        } else {
            let stats = workload::run_client(res, config)?;
            res.stats = Some(stats);
            Ok(())
        }
    }

    fn print_results(&mut self, res: &mut Resources, config: &Config) -> Result<()> {
        let stats = res
            .stats
            .as_ref()
            .ok_or_else(|| anyhow!("no results were recorded"))?;
        workload::print_statistics(stats, config);
        Ok(())
    }

    fn resource_destroy(&mut self, res: &mut Resources) -> Result<()> {
        res.destroy()
    }

    fn wait_for_keypress(&mut self) {
        print!("Press ENTER to continue...");
        if let Err(err) = io::stdout().flush() {
            warn!("failed to flush stdout: {}", err);
        }
        let mut line = String::new();
        if let Err(err) = io::stdin().lock().read_line(&mut line) {
            warn!("failed to wait for keypress: {}", err);
        }
    }

    fn report_status(&mut self, status: Status) {
        match status {
            Status::Success => println!("Test PASSED"),
            Status::Failure { stage } => println!("Test FAILED ({stage})"),
        }
    }
}
