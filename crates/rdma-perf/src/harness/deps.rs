use crate::config::{Config, Opcode, QpType};

use anyhow::{ensure, Result};
use tracing::warn;

const ATOMIC_SIZE: u32 = 8;

/// Reconciles options that depend on each other.
///
/// Combinations the transport cannot carry are errors; values that only
/// need adjusting are adjusted with a warning.
pub fn force_configurations_dependencies(config: &mut Config) -> Result<()> {
    let opcode = config.opcode;

    match config.qp_type {
        QpType::UD => {
            ensure!(
                matches!(opcode, Opcode::Send | Opcode::SendWithImm),
                "{} is not supported on {}",
                opcode,
                config.qp_type
            );
        }
        QpType::RawPacket => {
            ensure!(
                opcode == Opcode::Send,
                "{} is not supported on {}",
                opcode,
                config.qp_type
            );
            ensure!(
                !config.mac.is_empty(),
                "a local MAC (--mac) is required for raw packet transport"
            );
        }
        QpType::RC | QpType::DC | QpType::XrcSend | QpType::XrcRecv => {}
    }

    if config.use_inline {
        ensure!(
            opcode.is_send() || matches!(opcode, Opcode::RdmaWrite | Opcode::RdmaWriteWithImm),
            "inline data can not be used with {}",
            opcode
        );
    }

    if opcode.is_atomic() {
        if config.msg_size != ATOMIC_SIZE {
            warn!(
                "atomic operations move {} bytes, msg size {} ignored",
                ATOMIC_SIZE, config.msg_size
            );
            config.msg_size = ATOMIC_SIZE;
        }
        if config.num_sge != 1 {
            warn!("atomic operations use one SGE, {} requested", config.num_sge);
            config.num_sge = 1;
        }
    }

    if config.batch_size == 0 {
        warn!("batch size 0 is treated as 1");
        config.batch_size = 1;
    }
    if config.batch_size > config.ring_depth {
        warn!(
            "batch size {} is larger than the ring, using {}",
            config.batch_size, config.ring_depth
        );
        config.batch_size = config.ring_depth;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::config::MacAddr;

    #[test]
    fn defaults_pass_untouched() {
        let mut config = Config::default();
        force_configurations_dependencies(&mut config).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn datagram_opcodes() {
        let mut config = Config {
            qp_type: QpType::UD,
            opcode: Opcode::RdmaWrite,
            ..Config::default()
        };
        assert!(force_configurations_dependencies(&mut config).is_err());

        config.opcode = Opcode::SendWithImm;
        force_configurations_dependencies(&mut config).unwrap();
    }

    #[test]
    fn raw_needs_mac() {
        let mut config = Config {
            qp_type: QpType::RawPacket,
            ..Config::default()
        };
        assert!(force_configurations_dependencies(&mut config).is_err());

        config.mac = MacAddr::new("00:11:22:33:44:55").unwrap();
        force_configurations_dependencies(&mut config).unwrap();

        config.opcode = Opcode::SendWithImm;
        assert!(force_configurations_dependencies(&mut config).is_err());
    }

    #[test]
    fn inline_restrictions() {
        for opcode in [Opcode::RdmaRead, Opcode::AtomicCmpAndSwp, Opcode::LocalInv] {
            let mut config = Config {
                opcode,
                use_inline: true,
                ..Config::default()
            };
            assert!(force_configurations_dependencies(&mut config).is_err());
        }

        let mut config = Config {
            opcode: Opcode::RdmaWriteWithImm,
            use_inline: true,
            ..Config::default()
        };
        force_configurations_dependencies(&mut config).unwrap();
    }

    #[test]
    fn atomics_are_single_word() {
        let mut config = Config {
            opcode: Opcode::AtomicFetchAndAdd,
            num_sge: 4,
            msg_size: 64,
            ..Config::default()
        };
        force_configurations_dependencies(&mut config).unwrap();
        assert_eq!(config.num_sge, 1);
        assert_eq!(config.msg_size, 8);
    }

    #[test]
    fn batch_fits_ring() {
        let mut config = Config {
            batch_size: 0,
            ..Config::default()
        };
        force_configurations_dependencies(&mut config).unwrap();
        assert_eq!(config.batch_size, 1);

        config.batch_size = 1000;
        config.ring_depth = 16;
        force_configurations_dependencies(&mut config).unwrap();
        assert_eq!(config.batch_size, 16);
    }
}
