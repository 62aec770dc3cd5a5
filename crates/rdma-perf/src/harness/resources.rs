use super::channel::Dest;
use super::workload::Stats;

use crate::config::{Config, Endpoint};

use std::io;
use std::net::{Ipv4Addr, Shutdown, SocketAddr, TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context as _, Result};
use numeric_cast::NumericCast;
use tracing::{debug, info};

const CONNECT_RETRIES: usize = 50;
const CONNECT_INTERVAL: Duration = Duration::from_millis(100);

/// Pattern written into every send ring byte
pub(crate) const SEND_FILL: u8 = 0xcc;

/// Send and receive rings, one slot per outstanding work request.
#[derive(Debug)]
pub(crate) struct Rings {
    pub(crate) send: Vec<u8>,
    pub(crate) recv: Vec<u8>,
    /// bytes per slot (`num_sge * msg_size`)
    pub(crate) slot_len: usize,
    pub(crate) seg_len: usize,
    /// target of atomic operations issued by the peer
    pub(crate) atomic_target: u64,
}

impl Rings {
    fn alloc(config: &Config) -> Result<Self> {
        let seg_len: usize = config.msg_size.numeric_cast();
        let num_sge: usize = config.num_sge.numeric_cast();
        let ring_depth: usize = config.ring_depth.numeric_cast();

        let slot_len = seg_len
            .checked_mul(num_sge)
            .ok_or_else(|| anyhow!("slot size overflows"))?;
        let ring_len = slot_len
            .checked_mul(ring_depth)
            .ok_or_else(|| anyhow!("ring size overflows"))?;

        Ok(Self {
            send: alloc_ring(ring_len, SEND_FILL)?,
            recv: alloc_ring(ring_len, 0)?,
            slot_len,
            seg_len,
            atomic_target: 0,
        })
    }

    pub(crate) fn slot(&self, wr_id: u64) -> std::ops::Range<usize> {
        let slots = (self.send.len() / self.slot_len.max(1)).max(1);
        let idx: usize = (wr_id % slots.numeric_cast::<u64>()).numeric_cast();
        let start = idx * self.slot_len;
        start..start + self.slot_len
    }
}

fn alloc_ring(len: usize, fill: u8) -> Result<Vec<u8>> {
    let mut ring = Vec::new();
    ring.try_reserve_exact(len)
        .with_context(|| format!("failed to allocate {len} byte rings"))?;
    ring.resize(len, fill);
    Ok(ring)
}

/// Everything one side of a test holds.
///
/// A freshly created handle owns nothing and has no socket; every field is
/// filled in by a later stage.
#[derive(Debug)]
pub struct Resources {
    pub(crate) endpoint: Endpoint,
    pub(crate) listener: Option<TcpListener>,
    pub(crate) stream: Option<TcpStream>,
    pub(crate) rings: Option<Rings>,
    pub(crate) local_dest: Option<Dest>,
    pub(crate) remote_dest: Option<Dest>,
    pub(crate) stats: Option<Stats>,
}

impl Resources {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            listener: None,
            stream: None,
            rings: None,
            local_dest: None,
            remote_dest: None,
            stats: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    pub(crate) fn stream(&mut self) -> Result<&mut TcpStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| anyhow!("control channel is not connected"))
    }

    pub(crate) fn alloc(&mut self, config: &Config) -> Result<()> {
        let rings = Rings::alloc(config)?;
        info!(
            device = %config.device_name,
            ring_bytes = rings.send.len(),
            "allocated rings"
        );
        self.rings = Some(rings);
        Ok(())
    }

    pub(crate) fn init(&mut self, config: &Config) -> Result<()> {
        let port = self.endpoint.port;
        let stream = if config.role.is_server() {
            let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
            let listener = TcpListener::bind(addr)
                .with_context(|| format!("failed to listen on port {port}"))?;
            info!("listening on port {}", port);
            let (stream, peer_addr) = listener.accept()?;
            info!("accepted connection from {}", peer_addr);
            self.listener = Some(listener);
            stream
        } else {
            let host = self.endpoint.address.as_str();
            info!("connecting to {}:{}", host, port);
            connect((host, port))?
        };
        stream.set_nodelay(true)?;
        self.stream = Some(stream);
        Ok(())
    }

    /// Releases everything; safe on a handle in any state.
    pub(crate) fn destroy(&mut self) -> Result<()> {
        self.rings = None;
        drop(self.listener.take());
        self.local_dest = None;
        self.remote_dest = None;

        if let Some(stream) = self.stream.take() {
            match stream.shutdown(Shutdown::Both) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotConnected => {}
                Err(err) => return Err(err).context("failed to close control channel"),
            }
        }
        Ok(())
    }
}

fn connect(addr: (&str, u16)) -> Result<TcpStream> {
    let mut attempt = 1;
    loop {
        match TcpStream::connect(addr) {
            Ok(stream) => return Ok(stream),
            Err(err) if attempt < CONNECT_RETRIES => {
                debug!(attempt, %err, "connect failed, retrying");
                attempt += 1;
                thread::sleep(CONNECT_INTERVAL);
            }
            Err(err) => {
                return Err(err).with_context(|| format!("failed to connect to {}:{}", addr.0, addr.1))
            }
        }
    }
}
