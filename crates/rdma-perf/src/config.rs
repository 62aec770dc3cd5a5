use crate::utils::bool_to_str;

use std::fmt;

use serde::{Deserialize, Serialize};

pub const DEF_DEVICE_NAME: &str = "mlx5_0";
pub const DEF_IP: &str = "127.0.0.1";
pub const DEF_TCP_PORT: u16 = 17500;
pub const DEF_NUM_OF_ITER: u32 = 8;
pub const DEF_MSG_SIZE: u32 = 8;
pub const DEF_RING_DEPTH: u32 = 64;
pub const DEF_BATCH_SIZE: u32 = 1;
pub const DEF_NUM_SGE: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Client,
    Server,
}

impl Role {
    #[inline]
    #[must_use]
    pub fn is_server(self) -> bool {
        self == Role::Server
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Client => "Client",
            Role::Server => "Server",
        })
    }
}

/// Queue pair transport service type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QpType {
    RC,
    DC,
    UD,
    RawPacket,
    XrcSend,
    XrcRecv,
}

impl QpType {
    /// The transport the remote side must use to talk to this one.
    #[must_use]
    pub fn peer(self) -> Self {
        match self {
            QpType::XrcSend => QpType::XrcRecv,
            QpType::XrcRecv => QpType::XrcSend,
            other => other,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            QpType::RC => "IBV_QPT_RC",
            QpType::DC => "IBV_QPT_DRIVER",
            QpType::UD => "IBV_QPT_UD",
            QpType::RawPacket => "IBV_QPT_RAW_PACKET",
            QpType::XrcSend => "IBV_QPT_XRC_SEND",
            QpType::XrcRecv => "IBV_QPT_XRC_RECV",
        }
    }
}

impl fmt::Display for QpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Work request opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Opcode {
    Send,
    SendWithImm,
    SendWithInv,
    RdmaWrite,
    RdmaWriteWithImm,
    RdmaRead,
    BindMw,
    LocalInv,
    AtomicFetchAndAdd,
    AtomicCmpAndSwp,
}

impl Opcode {
    #[must_use]
    pub fn is_atomic(self) -> bool {
        matches!(self, Opcode::AtomicFetchAndAdd | Opcode::AtomicCmpAndSwp)
    }

    /// Opcodes that never touch the wire.
    #[must_use]
    pub fn is_local(self) -> bool {
        matches!(self, Opcode::BindMw | Opcode::LocalInv)
    }

    #[must_use]
    pub fn is_send(self) -> bool {
        matches!(self, Opcode::Send | Opcode::SendWithImm | Opcode::SendWithInv)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Opcode::Send => "IBV_WR_SEND",
            Opcode::SendWithImm => "IBV_WR_SEND_WITH_IMM",
            Opcode::SendWithInv => "IBV_WR_SEND_WITH_INV",
            Opcode::RdmaWrite => "IBV_WR_RDMA_WRITE",
            Opcode::RdmaWriteWithImm => "IBV_WR_RDMA_WRITE_WITH_IMM",
            Opcode::RdmaRead => "IBV_WR_RDMA_READ",
            Opcode::BindMw => "IBV_WR_BIND_MW",
            Opcode::LocalInv => "IBV_WR_LOCAL_INV",
            Opcode::AtomicFetchAndAdd => "IBV_WR_ATOMIC_FETCH_AND_ADD",
            Opcode::AtomicCmpAndSwp => "IBV_WR_ATOMIC_CMP_AND_SWP",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Post send API flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SendMethod {
    Old,
    New,
    Mix,
}

impl fmt::Display for SendMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SendMethod::Old => "OLD",
            SendMethod::New => "NEW",
            SendMethod::Mix => "MIX",
        })
    }
}

/// Textual MAC address with a fixed upper bound on its length.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacAddr(String);

impl MacAddr {
    /// `xx:xx:xx:xx:xx:xx`
    pub const MAX_LEN: usize = 17;

    /// Returns `None` if `s` is longer than [`MacAddr::MAX_LEN`] bytes.
    #[must_use]
    pub fn new(s: &str) -> Option<Self> {
        (s.len() <= Self::MAX_LEN).then(|| Self(s.to_owned()))
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub address: String,
    pub port: u16,
}

/// Normalized test parameters.
///
/// Built once by the argument parser and read-only afterwards, except for
/// the dependency normalization pass that runs before any resource is
/// allocated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub role: Role,
    pub endpoint: Endpoint,
    pub device_name: String,
    pub qp_type: QpType,
    pub opcode: Opcode,
    pub extended_atomic: bool,
    pub ring_depth: u32,
    pub num_sge: u32,
    pub batch_size: u32,
    pub msg_size: u32,
    pub iterations: u32,
    pub send_method: SendMethod,
    pub mac: MacAddr,
    pub use_inline: bool,
    pub wait_before_exit: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            role: Role::Client,
            endpoint: Endpoint {
                address: DEF_IP.to_owned(),
                port: DEF_TCP_PORT,
            },
            device_name: DEF_DEVICE_NAME.to_owned(),
            qp_type: QpType::RC,
            opcode: Opcode::Send,
            extended_atomic: false,
            ring_depth: DEF_RING_DEPTH,
            num_sge: DEF_NUM_SGE,
            batch_size: DEF_BATCH_SIZE,
            msg_size: DEF_MSG_SIZE,
            iterations: DEF_NUM_OF_ITER,
            send_method: SendMethod::Old,
            mac: MacAddr::default(),
            use_inline: false,
            wait_before_exit: false,
        }
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const W: usize = 30;

        writeln!(f, " ---------------------- config data  ---------------")?;
        writeln!(f, " {:W$} : {}", "Test side", self.role)?;
        if !self.role.is_server() {
            writeln!(f, " {:W$} : {}", "IP", self.endpoint.address)?;
        }
        writeln!(f, " {:W$} : {}", "TCPort", self.endpoint.port)?;
        writeln!(f, " {:W$} : {}", "HCA", self.device_name)?;
        writeln!(f, " {:W$} : {}", "Number of iterations", self.iterations)?;
        writeln!(f, " {:W$} : {}", "QP Type", self.qp_type)?;
        writeln!(f, " {:W$} : {}", "MAC", self.mac)?;
        writeln!(f, " {:W$} : {}", "Opcode", self.opcode)?;
        writeln!(f, " {:W$} : {}", "Extended atomics", bool_to_str(self.extended_atomic))?;
        writeln!(f, " {:W$} : {}", "Ring-depth", self.ring_depth)?;
        writeln!(f, " {:W$} : {}", "msg size", self.msg_size)?;
        writeln!(f, " {:W$} : {}", "Batch size", self.batch_size)?;
        writeln!(f, " {:W$} : {}", "Number of SGEs", self.num_sge)?;
        writeln!(f, " {:W$} : {}", "Use inline", bool_to_str(self.use_inline))?;
        writeln!(f, " {:W$} : {}", "Use post send method", self.send_method)?;
        writeln!(f, " {:W$} : {}", "Wait before exit", bool_to_str(self.wait_before_exit))?;
        write!(f, " --------------------------------------------------")
    }
}
