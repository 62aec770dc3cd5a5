use crate::argv::parse_argv;
use crate::config::{Config, MacAddr, Opcode, QpType, Role, SendMethod};
use crate::error::ArgError;
use crate::usage::{CaseCode, UsageDescriptor, USAGE_DESCRIPTORS};
use crate::utils::parse_ulong;

use std::ffi::OsString;

/// Transport as spelled on the command line. `XRC` stays unresolved until
/// the role is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QpTypeArg {
    RC,
    DC,
    UD,
    Raw,
    Xrc,
}

impl QpTypeArg {
    fn resolve(self, role: Role) -> QpType {
        match self {
            QpTypeArg::RC => QpType::RC,
            QpTypeArg::DC => QpType::DC,
            QpTypeArg::UD => QpType::UD,
            QpTypeArg::Raw => QpType::RawPacket,
            QpTypeArg::Xrc if role.is_server() => QpType::XrcRecv,
            QpTypeArg::Xrc => QpType::XrcSend,
        }
    }
}

fn parse_qp_type(s: &str) -> Result<QpTypeArg, ArgError> {
    match s {
        "RC" => Ok(QpTypeArg::RC),
        "DC" => Ok(QpTypeArg::DC),
        "UD" => Ok(QpTypeArg::UD),
        "RAW" => Ok(QpTypeArg::Raw),
        "XRC" => Ok(QpTypeArg::Xrc),
        _ => Err(ArgError::Validation(format!(
            "Unsupported QP Transport Service Type {s}"
        ))),
    }
}

/// Returns the opcode and whether the extended atomics flavour was asked for.
fn parse_opcode(s: &str) -> Result<(Opcode, bool), ArgError> {
    let op = match s {
        "SEND" => (Opcode::Send, false),
        "SEND_IMM" => (Opcode::SendWithImm, false),
        "SEND_INV" => (Opcode::SendWithInv, false),
        "WRITE" => (Opcode::RdmaWrite, false),
        "WRITE_IMM" => (Opcode::RdmaWriteWithImm, false),
        "READ" => (Opcode::RdmaRead, false),
        "BIND" => (Opcode::BindMw, false),
        "LOCAL_INV" => (Opcode::LocalInv, false),
        "ATOMIC_FA" => (Opcode::AtomicFetchAndAdd, false),
        "ATOMIC_CS" => (Opcode::AtomicCmpAndSwp, false),
        "EXT_ATOMIC_FA" => (Opcode::AtomicFetchAndAdd, true),
        "EXT_ATOMIC_CS" => (Opcode::AtomicCmpAndSwp, true),
        _ => return Err(ArgError::Validation(format!("Unsupported opcode {s}"))),
    };
    Ok(op)
}

fn parse_send_method(s: &str) -> Result<SendMethod, ArgError> {
    match s {
        "OLD" => Ok(SendMethod::Old),
        "NEW" => Ok(SendMethod::New),
        "MIX" => Ok(SendMethod::Mix),
        _ => Err(ArgError::Validation(format!(
            "Unsupported post send method {s}"
        ))),
    }
}

fn parse_number<T: TryFrom<u64>>(s: &str, what: &str) -> Result<T, ArgError> {
    T::try_from(parse_ulong(s))
        .map_err(|_| ArgError::Validation(format!("{what} {s} is out of range")))
}

fn parse_nonzero(s: &str, what: &str) -> Result<u32, ArgError> {
    let n: u32 = parse_number(s, what)?;
    if n == 0 {
        return Err(ArgError::Validation(format!("{what} can't be zero")));
    }
    Ok(n)
}

/// Configuration under construction.
///
/// Options are applied one at a time; role dependent values are only
/// resolved by [`ConfigBuilder::build`], so the relative order of `--daemon`
/// and `--qp_type` does not matter.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
    qp_type: Option<QpTypeArg>,
}

impl ConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies the option `table[opt_index]` with its `value`.
    ///
    /// Either exactly the fields owned by that option change, or an error is
    /// returned and nothing changes.
    pub fn process_arg(
        &mut self,
        opt_index: usize,
        value: Option<&str>,
        table: &[UsageDescriptor],
    ) -> Result<(), ArgError> {
        let value = value.unwrap_or_default();
        let desc = table.get(opt_index).ok_or_else(|| ArgError::Dispatch {
            case_code: CaseCode(u32::MAX),
            value: value.to_owned(),
        })?;

        let config = &mut self.config;
        match desc.case_code {
            CaseCode::HELP => return Err(ArgError::Help),
            CaseCode::INL => config.use_inline = true,
            CaseCode::RING => config.ring_depth = parse_nonzero(value, "Ring size")?,
            CaseCode::SGE => config.num_sge = parse_nonzero(value, "Number of SGEs")?,
            CaseCode::NUM_OF_ITER => {
                config.iterations = parse_number(value, "Number of iterations")?;
            }
            CaseCode::HOST => config.device_name = value.to_owned(),
            CaseCode::MAC => {
                config.mac = MacAddr::new(value).ok_or_else(|| {
                    ArgError::Validation(format!(
                        "MAC address {value} is longer than {} characters",
                        MacAddr::MAX_LEN
                    ))
                })?;
            }
            CaseCode::WAIT => config.wait_before_exit = true,
            CaseCode::DAEMON => config.role = Role::Server,
            CaseCode::IP => config.endpoint.address = value.to_owned(),
            CaseCode::TCP => config.endpoint.port = parse_number(value, "TCP port")?,
            CaseCode::BATCH => config.batch_size = parse_number(value, "Batch size")?,
            CaseCode::SND_MTD => config.send_method = parse_send_method(value)?,
            CaseCode::QP_TYPE => self.qp_type = Some(parse_qp_type(value)?),
            CaseCode::OP => {
                let (opcode, extended) = parse_opcode(value)?;
                config.opcode = opcode;
                if extended {
                    config.extended_atomic = true;
                }
            }
            case_code => {
                return Err(ArgError::Dispatch {
                    case_code,
                    value: value.to_owned(),
                })
            }
        }
        Ok(())
    }

    /// Resolves the remaining role dependent values.
    #[must_use]
    pub fn build(self) -> Config {
        let mut config = self.config;
        if let Some(qp_type) = self.qp_type {
            config.qp_type = qp_type.resolve(config.role);
        }
        config
    }
}

/// Builds the configuration from the process arguments (program name
/// first).
pub fn parse_params<I, T>(args: I) -> Result<Config, ArgError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
    if args.len() <= 1 {
        return Err(ArgError::NoArguments);
    }

    let mut builder = ConfigBuilder::new();
    parse_argv(args, &USAGE_DESCRIPTORS, |opt_index, value, table| {
        builder.process_arg(opt_index, value, table)
    })?;
    Ok(builder.build())
}
