use std::fmt::Write as _;

/// Tag identifying the semantic case of an option.
///
/// The numbering is stable and has gaps; the handler must treat any value
/// it does not know as an internal inconsistency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CaseCode(pub u32);

impl CaseCode {
    pub const HELP: Self = Self(0);
    pub const INL: Self = Self(1);
    pub const RING: Self = Self(2);
    pub const SGE: Self = Self(3);
    pub const OP: Self = Self(4);
    pub const SND_MTD: Self = Self(5);
    pub const NUM_OF_ITER: Self = Self(6);
    pub const MAC: Self = Self(7);
    pub const HOST: Self = Self(8);
    pub const WAIT: Self = Self(9);
    pub const IP: Self = Self(10);
    pub const DAEMON: Self = Self(12);
    pub const TCP: Self = Self(14);
    pub const BATCH: Self = Self(15);
    pub const QP_TYPE: Self = Self(16);
}

#[derive(Debug, Clone, Copy)]
pub struct UsageDescriptor {
    pub short: Option<char>,
    pub long: &'static str,
    /// `Some` if the option takes a value
    pub value_name: Option<&'static str>,
    pub help: &'static str,
    pub case_code: CaseCode,
}

impl UsageDescriptor {
    #[inline]
    #[must_use]
    pub fn takes_value(&self) -> bool {
        self.value_name.is_some()
    }
}

pub static USAGE_DESCRIPTORS: [UsageDescriptor; 15] = [
    UsageDescriptor {
        short: Some('h'),
        long: "help",
        value_name: None,
        help: "Print this message and exit",
        case_code: CaseCode::HELP,
    },
    UsageDescriptor {
        short: Some('I'),
        long: "use_inl",
        value_name: None,
        help: "Use inline data to post",
        case_code: CaseCode::INL,
    },
    UsageDescriptor {
        short: Some('r'),
        long: "ring_sz",
        value_name: Some("RING_SZ"),
        help: "the ring to be used on the TX and RX queues (Default 64)",
        case_code: CaseCode::RING,
    },
    UsageDescriptor {
        short: None,
        long: "num_sge",
        value_name: Some("NUM_SGE"),
        help: "Number of SGEs to be used (Default 1)",
        case_code: CaseCode::SGE,
    },
    UsageDescriptor {
        short: Some('o'),
        long: "opcode",
        value_name: Some("OPCODE"),
        help: "Message opcode (SEND (default), SEND_IMM, SEND_INV, WRITE, WRITE_IMM, READ, BIND, LOCAL_INV,\n\
               ATOMIC_FA, ATOMIC_CS, EXT_ATOMIC_FA, EXT_ATOMIC_CS)",
        case_code: CaseCode::OP,
    },
    UsageDescriptor {
        short: Some('m'),
        long: "method",
        value_name: Some("METHOD"),
        help: "Post send method [OLD, NEW, MIX] (default: OLD)",
        case_code: CaseCode::SND_MTD,
    },
    UsageDescriptor {
        short: Some('i'),
        long: "iteration",
        value_name: Some("ITERATION"),
        help: "The number of iteration for this test (Default 8)",
        case_code: CaseCode::NUM_OF_ITER,
    },
    UsageDescriptor {
        short: None,
        long: "mac",
        value_name: Some("MAC_ADDR"),
        help: "Local mac to use for Raw packet transport",
        case_code: CaseCode::MAC,
    },
    UsageDescriptor {
        short: Some('d'),
        long: "device",
        value_name: Some("HOST_ID"),
        help: "HCA to use - Default mlx5_0",
        case_code: CaseCode::HOST,
    },
    UsageDescriptor {
        short: Some('w'),
        long: "wait",
        value_name: None,
        help: "Wait before exit",
        case_code: CaseCode::WAIT,
    },
    UsageDescriptor {
        short: None,
        long: "ip",
        value_name: Some("IP_ADDR"),
        help: "The ip of the server. Default value: current machine.",
        case_code: CaseCode::IP,
    },
    UsageDescriptor {
        short: None,
        long: "daemon",
        value_name: None,
        help: "Run as a server.",
        case_code: CaseCode::DAEMON,
    },
    UsageDescriptor {
        short: None,
        long: "tcp",
        value_name: Some("TCP"),
        help: "TCP port to use",
        case_code: CaseCode::TCP,
    },
    UsageDescriptor {
        short: Some('b'),
        long: "batch",
        value_name: Some("BATCH"),
        help: "WRs list size to post",
        case_code: CaseCode::BATCH,
    },
    UsageDescriptor {
        short: Some('t'),
        long: "qp_type",
        value_name: Some("QP_TYPE"),
        help: "Enforce QPs type [RC/DC/UD/RAW/XRC (Default: RC)]",
        case_code: CaseCode::QP_TYPE,
    },
];

/// Renders the usage text of `table`.
#[must_use]
pub fn usage(table: &[UsageDescriptor]) -> String {
    let flags: Vec<String> = table
        .iter()
        .map(|desc| {
            let mut flag = match desc.short {
                Some(short) => format!("-{short}, --{}", desc.long),
                None => format!("    --{}", desc.long),
            };
            if let Some(value_name) = desc.value_name {
                let _ = write!(flag, " <{value_name}>");
            }
            flag
        })
        .collect();

    let width = flags.iter().map(String::len).max().unwrap_or(0);

    let mut out = format!("Usage: {} [OPTIONS]\n\nOptions:\n", env!("CARGO_PKG_NAME"));
    for (flag, desc) in flags.iter().zip(table) {
        let mut lines = desc.help.lines();
        let first = lines.next().unwrap_or_default();
        let _ = writeln!(out, "    {flag:width$}    {first}");
        for line in lines {
            let _ = writeln!(out, "    {:width$}    {line}", "");
        }
    }
    out
}
