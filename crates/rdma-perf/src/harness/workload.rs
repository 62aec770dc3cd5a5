//! Timed workload carried over the control connection.
//!
//! The client is the requester: it posts work requests in batches, keeping
//! at most `ring_depth` of them outstanding, and the server completes each
//! batch with one acknowledgement. The client only reads responses once its
//! window is posted, so batches and window are shrunk until the unread
//! responses fit in [`MAX_UNREAD_BYTES`].

use super::channel::{recv_msg, send_msg, Message};
use super::resources::{Resources, Rings, SEND_FILL};

use crate::config::{Config, Opcode, SendMethod};

use std::collections::VecDeque;
use std::io::{BufReader, BufWriter, Read, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};

use anyhow::{anyhow, ensure, Result};
use numeric_cast::NumericCast;
use serde::{Deserialize, Serialize};
use tabled::Table;
use tabled::Tabled;
use tracing::{debug, info, trace};

/// Upper bound on response bytes the server may send ahead of the client.
const MAX_UNREAD_BYTES: u64 = 64 * 1024;

/// bincode size of [`Completion`]
const COMPLETION_LEN: u64 = 16;

const ATOMIC_LEN: u64 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    /// payload travels with the request
    Push,
    /// payload travels with the response
    Pull,
    /// one word each way
    Atomic,
    /// completes without the peer
    Local,
}

impl Flow {
    fn of(opcode: Opcode) -> Self {
        match opcode {
            Opcode::Send
            | Opcode::SendWithImm
            | Opcode::SendWithInv
            | Opcode::RdmaWrite
            | Opcode::RdmaWriteWithImm => Flow::Push,
            Opcode::RdmaRead => Flow::Pull,
            Opcode::AtomicFetchAndAdd | Opcode::AtomicCmpAndSwp => Flow::Atomic,
            Opcode::BindMw | Opcode::LocalInv => Flow::Local,
        }
    }

    /// Bytes the server answers a single request with.
    fn response_len(self, slot_len: u64) -> u64 {
        match self {
            Flow::Pull => slot_len,
            Flow::Atomic => ATOMIC_LEN,
            Flow::Push | Flow::Local => 0,
        }
    }
}

/// Returns the batch size and in-flight window actually used.
///
/// Both sides derive them from the same parameters, so they agree on the
/// batch boundaries.
fn fit_window(response_len: u64, batch_size: u64, ring_depth: u64) -> (u64, u64) {
    let batch_size = match response_len {
        0 => batch_size,
        len => batch_size.min(((MAX_UNREAD_BYTES - COMPLETION_LEN) / len).max(1)),
    };
    let batch_bytes = batch_size
        .saturating_mul(response_len)
        .saturating_add(COMPLETION_LEN);
    let batches = (MAX_UNREAD_BYTES / batch_bytes).max(1);
    (batch_size, ring_depth.min(batches * batch_size))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct WorkRequest {
    wr_id: u64,
    opcode: Opcode,
    length: u32,
    compare_add: u64,
    swap: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct Completion {
    /// id of the last request of the batch
    wr_id: u64,
    count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stats {
    pub completed: u64,
    pub bytes: u64,
    pub elapsed: Duration,
}

struct Session<'a> {
    reader: BufReader<&'a TcpStream>,
    writer: BufWriter<&'a TcpStream>,
    rings: &'a mut Rings,
    opcode: Opcode,
    flow: Flow,
    iterations: u64,
    batch_size: u64,
    window: u64,
}

impl<'a> Session<'a> {
    fn new(res: &'a mut Resources, config: &Config) -> Result<Self> {
        let Resources { stream, rings, .. } = res;
        let stream = stream
            .as_ref()
            .ok_or_else(|| anyhow!("control channel is not connected"))?;
        let rings = rings
            .as_mut()
            .ok_or_else(|| anyhow!("rings are not allocated"))?;

        let batch_size = u64::from(config.batch_size);
        let ring_depth = u64::from(config.ring_depth);
        ensure!(
            batch_size > 0 && batch_size <= ring_depth,
            "batch size {} does not fit ring depth {}",
            batch_size,
            ring_depth
        );

        let flow = Flow::of(config.opcode);
        let response_len = flow.response_len(rings.slot_len.numeric_cast());
        let (batch_size, window) = fit_window(response_len, batch_size, ring_depth);
        if window < ring_depth {
            debug!(batch_size, window, "in-flight window limited by unread responses");
        }

        Ok(Self {
            reader: BufReader::new(stream),
            writer: BufWriter::new(stream),
            rings,
            opcode: config.opcode,
            flow,
            iterations: u64::from(config.iterations),
            batch_size,
            window,
        })
    }

    fn bytes_per_request(&self) -> u64 {
        match self.flow {
            Flow::Push | Flow::Pull => self.rings.slot_len.numeric_cast(),
            Flow::Atomic => ATOMIC_LEN,
            Flow::Local => 0,
        }
    }

    /// Closing barrier. Goes through the buffered halves since the reader
    /// may already hold the peer's `Done`.
    fn finish(mut self) -> Result<()> {
        send_msg(&mut self.writer, &Message::Done)?;
        match recv_msg(&mut self.reader)? {
            Message::Done => Ok(()),
            other => Err(anyhow!("protocol error: expected Done message, got {:?}", other)),
        }
    }

    fn post(&mut self, wr_id: u64, use_inline: bool) -> Result<()> {
        let slot = self.rings.slot(wr_id);
        let (compare_add, swap) = match self.opcode {
            Opcode::AtomicFetchAndAdd => (1, 0),
            Opcode::AtomicCmpAndSwp => (wr_id, wr_id.wrapping_add(1)),
            _ => (0, 0),
        };
        let wr = WorkRequest {
            wr_id,
            opcode: self.opcode,
            length: self.rings.slot_len.numeric_cast(),
            compare_add,
            swap,
        };

        if self.flow != Flow::Push {
            bincode::serialize_into(&mut self.writer, &wr)?;
            return Ok(());
        }

        let payload = &self.rings.send[slot];
        if use_inline {
            let mut frame = bincode::serialize(&wr)?;
            frame.extend_from_slice(payload);
            self.writer.write_all(&frame)?;
        } else {
            bincode::serialize_into(&mut self.writer, &wr)?;
            for sge in payload.chunks(self.rings.seg_len.max(1)) {
                self.writer.write_all(sge)?;
            }
        }
        Ok(())
    }

    fn post_batch(&mut self, first: u64, count: u64, method: SendMethod, use_inline: bool) -> Result<()> {
        for wr_id in first..first + count {
            self.post(wr_id, use_inline)?;
            if method == SendMethod::Old {
                self.writer.flush()?;
            }
        }
        trace!(first, count, ?method, "posted batch");
        Ok(())
    }

    fn poll_batch(&mut self, first: u64, count: u64) -> Result<()> {
        for wr_id in first..first + count {
            match self.flow {
                Flow::Pull => {
                    let slot = self.rings.slot(wr_id);
                    let buf = &mut self.rings.recv[slot];
                    self.reader.read_exact(buf)?;
                    ensure!(
                        buf.iter().all(|&b| b == SEND_FILL),
                        "corrupted read payload for wr {}",
                        wr_id
                    );
                }
                Flow::Atomic => {
                    let old: u64 = bincode::deserialize_from(&mut self.reader)?;
                    ensure!(
                        old == wr_id,
                        "atomic wr {} returned {}, expected {}",
                        wr_id,
                        old,
                        wr_id
                    );
                }
                Flow::Push | Flow::Local => {}
            }
        }

        let comp: Completion = bincode::deserialize_from(&mut self.reader)?;
        let last = first + count - 1;
        ensure!(
            comp.wr_id == last && comp.count == count,
            "unexpected completion {:?}, expected wr {} count {}",
            comp,
            last,
            count
        );
        Ok(())
    }

    fn serve(&mut self, expected: u64) -> Result<()> {
        let wr: WorkRequest = bincode::deserialize_from(&mut self.reader)?;
        ensure!(
            wr.wr_id == expected && wr.opcode == self.opcode,
            "unexpected work request {:?}",
            wr
        );
        let slot = self.rings.slot(wr.wr_id);
        ensure!(
            usize::try_from(wr.length).ok() == Some(slot.len()),
            "work request length {} does not match slot size {}",
            wr.length,
            slot.len()
        );

        match self.flow {
            Flow::Push => self.reader.read_exact(&mut self.rings.recv[slot])?,
            Flow::Pull => self.writer.write_all(&self.rings.send[slot])?,
            Flow::Atomic => {
                let target = &mut self.rings.atomic_target;
                let old = *target;
                match wr.opcode {
                    Opcode::AtomicFetchAndAdd => *target = old.wrapping_add(wr.compare_add),
                    _ if old == wr.compare_add => *target = wr.swap,
                    _ => {}
                }
                bincode::serialize_into(&mut self.writer, &old)?;
            }
            Flow::Local => {}
        }
        Ok(())
    }
}

pub(crate) fn run_client(res: &mut Resources, config: &Config) -> Result<Stats> {
    let mut session = Session::new(res, config)?;
    let iterations = session.iterations;

    info!("start iteration");
    let t0 = Instant::now();

    let mut posted = 0;
    let mut completed = 0;

    if session.flow == Flow::Local {
        posted = iterations;
        completed = iterations;
    }

    let mut inflight: VecDeque<(u64, u64)> = VecDeque::new();
    let mut batch_no: u64 = 0;

    while completed < iterations {
        loop {
            let count = session.batch_size.min(iterations - posted);
            if count == 0 || posted - completed + count > session.window {
                break;
            }
            let method = match config.send_method {
                SendMethod::Mix if batch_no % 2 == 0 => SendMethod::Old,
                SendMethod::Mix => SendMethod::New,
                method => method,
            };
            session.post_batch(posted, count, method, config.use_inline)?;
            inflight.push_back((posted, count));
            posted += count;
            batch_no += 1;
        }
        session.writer.flush()?;

        let (first, count) = inflight
            .pop_front()
            .ok_or_else(|| anyhow!("no work request in flight"))?;
        session.poll_batch(first, count)?;
        completed += count;
        trace!(posted, completed);
    }

    let elapsed = t0.elapsed();
    info!("end iteration");

    let bytes = completed * session.bytes_per_request();
    session.finish()?;

    Ok(Stats {
        completed,
        bytes,
        elapsed,
    })
}

pub(crate) fn run_server(res: &mut Resources, config: &Config) -> Result<()> {
    let mut session = Session::new(res, config)?;

    if session.flow != Flow::Local {
        let mut remaining = session.iterations;
        let mut next = 0;
        while remaining > 0 {
            let count = session.batch_size.min(remaining);
            for _ in 0..count {
                session.serve(next)?;
                next += 1;
            }
            let comp = Completion {
                wr_id: next - 1,
                count,
            };
            bincode::serialize_into(&mut session.writer, &comp)?;
            session.writer.flush()?;
            remaining -= count;
        }
        debug!(served = next, "all work requests served");
    }

    session.finish()
}

#[derive(Tabled)]
struct Report {
    opcode: String,
    iterations: u64,
    bytes: u64,
    seconds: String,
    mbps: String,
    usec_per_iter: String,
}

#[allow(clippy::cast_precision_loss)]
pub(crate) fn print_statistics(stats: &Stats, config: &Config) {
    let time_sec = stats.elapsed.as_secs_f64();
    let mbps = if time_sec > 0.0 {
        (stats.bytes * 8) as f64 / 1e6 / time_sec
    } else {
        0.0
    };
    let usec_per_iter = if stats.completed > 0 {
        time_sec * 1e6 / stats.completed as f64
    } else {
        0.0
    };

    let report = Report {
        opcode: config.opcode.to_string(),
        iterations: stats.completed,
        bytes: stats.bytes,
        seconds: format!("{time_sec:.6}"),
        mbps: format!("{mbps:.2}"),
        usec_per_iter: format!("{usec_per_iter:.2}"),
    };
    print!("{}", Table::new([report]));
}
