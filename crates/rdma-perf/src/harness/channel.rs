//! Out-of-band control channel: parameter exchange, endpoint exchange and
//! barriers.

use crate::config::{Config, MacAddr, Opcode, QpType, Role, SendMethod};

use std::io::{Read, Write};

use anyhow::{anyhow, ensure, Result};
use numeric_cast::NumericCast;
use serde::{Deserialize, Serialize};

/// Test parameters both sides must agree on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestParams {
    pub role: Role,
    pub qp_type: QpType,
    pub opcode: Opcode,
    pub extended_atomic: bool,
    pub ring_depth: u32,
    pub num_sge: u32,
    pub batch_size: u32,
    pub msg_size: u32,
    pub iterations: u32,
    pub send_method: SendMethod,
}

impl TestParams {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            role: config.role,
            qp_type: config.qp_type,
            opcode: config.opcode,
            extended_atomic: config.extended_atomic,
            ring_depth: config.ring_depth,
            num_sge: config.num_sge,
            batch_size: config.batch_size,
            msg_size: config.msg_size,
            iterations: config.iterations,
            send_method: config.send_method,
        }
    }

    /// Checks that `remote` is a valid counterpart of `self`.
    pub fn check_peer(&self, remote: &Self) -> Result<()> {
        ensure!(
            self.role != remote.role,
            "both sides run as {}, one of them must be started with --daemon",
            self.role
        );
        ensure!(
            remote.qp_type == self.qp_type.peer(),
            "qp type mismatch: local {}, remote {}",
            self.qp_type,
            remote.qp_type
        );

        macro_rules! same {
            ($($field:ident),+) => {$(
                ensure!(
                    self.$field == remote.$field,
                    concat!(stringify!($field), " mismatch: local {:?}, remote {:?}"),
                    self.$field,
                    remote.$field
                );
            )+};
        }

        same!(
            opcode,
            extended_atomic,
            ring_depth,
            num_sge,
            batch_size,
            msg_size,
            iterations,
            send_method
        );
        Ok(())
    }
}

/// Remote endpoint of the data path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dest {
    pub qpn: u32,
    pub psn: u32,
    pub mac: MacAddr,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    Params(TestParams),
    Dest(Dest),
    Ready,
    Done,
}

impl Message {
    fn name(&self) -> &'static str {
        match self {
            Message::Params(_) => "Params",
            Message::Dest(_) => "Dest",
            Message::Ready => "Ready",
            Message::Done => "Done",
        }
    }
}

pub fn send_msg<W: Write>(stream: &mut W, msg: &Message) -> Result<()> {
    let buf = bincode::serialize(msg)?;
    let msg_size: u8 = buf.len().numeric_cast();
    stream.write_all(&[msg_size])?;
    stream.write_all(&buf)?;
    stream.flush()?;
    Ok(())
}

pub fn recv_msg<R: Read>(stream: &mut R) -> Result<Message> {
    let mut msg_size = [0u8];
    stream.read_exact(&mut msg_size)?;
    let mut buf = vec![0; msg_size[0].into()];
    stream.read_exact(&mut buf)?;
    let msg = bincode::deserialize::<Message>(&buf)?;
    Ok(msg)
}

/// Sends `local` and returns what the peer sent back.
pub fn exchange<S: Read + Write>(stream: &mut S, local: &Message) -> Result<Message> {
    send_msg(stream, local)?;
    let remote = recv_msg(stream)?;
    if std::mem::discriminant(&remote) != std::mem::discriminant(local) {
        return Err(anyhow!(
            "protocol error: expected {} message, got {}",
            local.name(),
            remote.name()
        ));
    }
    Ok(remote)
}

/// Both sides announce `msg` and wait for the peer to do the same.
pub fn barrier<S: Read + Write>(stream: &mut S, msg: Message) -> Result<()> {
    exchange(stream, &msg)?;
    Ok(())
}
