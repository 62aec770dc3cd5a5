//! Table driven command line dispatcher.

use crate::error::ArgError;
use crate::usage::UsageDescriptor;

use std::ffi::OsString;

use clap::{Arg, ArgMatches, Command};

fn command(table: &[UsageDescriptor]) -> Command<'static> {
    let args = table.iter().map(|desc| {
        let mut arg = Arg::new(desc.long)
            .long(desc.long)
            .help(desc.help)
            .multiple_occurrences(true);
        if let Some(short) = desc.short {
            arg = arg.short(short);
        }
        if let Some(value_name) = desc.value_name {
            arg = arg
                .value_name(value_name)
                .takes_value(true)
                .allow_hyphen_values(true);
        }
        arg
    });

    Command::new(env!("CARGO_PKG_NAME"))
        .disable_help_flag(true)
        .disable_version_flag(true)
        .args(args)
}

fn usage_error(err: &clap::Error) -> ArgError {
    let msg = err.to_string();
    let line = msg.lines().next().unwrap_or_default();
    ArgError::Usage(line.trim_start_matches("error: ").to_owned())
}

/// Matches `args` (program name first) against `table` and calls
/// `process_arg` once per recognized option, in command line order.
///
/// The callback receives the index of the matched entry, the option value
/// (`None` for flags) and the table itself. Parsing stops at the first
/// error. Options in front of an unknown or incomplete one are still
/// handed to the callback first, so `-h --bogus` is a help request.
pub fn parse_argv<I, T, F>(
    args: I,
    table: &[UsageDescriptor],
    mut process_arg: F,
) -> Result<(), ArgError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
    F: FnMut(usize, Option<&str>, &[UsageDescriptor]) -> Result<(), ArgError>,
{
    let args: Vec<OsString> = args.into_iter().map(Into::into).collect();

    match command(table).try_get_matches_from(args.iter().cloned()) {
        Ok(matches) => replay(&matches, table, &mut process_arg),
        Err(err) => {
            let prefix = (1..args.len()).rev().find_map(|len| {
                command(table)
                    .try_get_matches_from(args[..len].iter().cloned())
                    .ok()
            });
            if let Some(matches) = prefix {
                replay(&matches, table, &mut process_arg)?;
            }
            Err(usage_error(&err))
        }
    }
}

fn replay<F>(
    matches: &ArgMatches,
    table: &[UsageDescriptor],
    process_arg: &mut F,
) -> Result<(), ArgError>
where
    F: FnMut(usize, Option<&str>, &[UsageDescriptor]) -> Result<(), ArgError>,
{
    let mut hits: Vec<(usize, usize, Option<&str>)> = Vec::new();
    for (opt_index, desc) in table.iter().enumerate() {
        let positions = match matches.indices_of(desc.long) {
            Some(positions) => positions,
            None => continue,
        };
        if desc.takes_value() {
            let values = matches.values_of(desc.long).into_iter().flatten();
            hits.extend(positions.zip(values).map(|(pos, v)| (pos, opt_index, Some(v))));
        } else {
            hits.extend(positions.map(|pos| (pos, opt_index, None)));
        }
    }
    hits.sort_unstable_by_key(|&(pos, _, _)| pos);

    for (_, opt_index, value) in hits {
        process_arg(opt_index, value, table)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::usage::{CaseCode, USAGE_DESCRIPTORS};

    fn collect(args: &[&str]) -> Result<Vec<(&'static str, Option<String>)>, ArgError> {
        let mut seen = Vec::new();
        parse_argv(args.iter().copied(), &USAGE_DESCRIPTORS, |idx, value, table| {
            assert_eq!(table.len(), USAGE_DESCRIPTORS.len());
            seen.push((table[idx].long, value.map(str::to_owned)));
            Ok(())
        })?;
        Ok(seen)
    }

    #[test]
    fn short_and_long_forms() {
        let seen = collect(&["rdma-perf", "-r", "5", "--num_sge", "2", "--daemon", "-I"]).unwrap();
        assert_eq!(
            seen,
            vec![
                ("ring_sz", Some("5".to_owned())),
                ("num_sge", Some("2".to_owned())),
                ("daemon", None),
                ("use_inl", None),
            ]
        );
    }

    #[test]
    fn keeps_command_line_order() {
        let seen = collect(&["rdma-perf", "-t", "XRC", "--daemon", "-t", "RC"]).unwrap();
        assert_eq!(
            seen,
            vec![
                ("qp_type", Some("XRC".to_owned())),
                ("daemon", None),
                ("qp_type", Some("RC".to_owned())),
            ]
        );
    }

    #[test]
    fn inline_values() {
        let seen = collect(&["rdma-perf", "--ring_sz=7", "-b3", "-i", "-1"]).unwrap();
        assert_eq!(
            seen,
            vec![
                ("ring_sz", Some("7".to_owned())),
                ("batch", Some("3".to_owned())),
                ("iteration", Some("-1".to_owned())),
            ]
        );
    }

    #[test]
    fn help_is_a_table_entry() {
        let seen = collect(&["rdma-perf", "-h"]).unwrap();
        assert_eq!(seen, vec![("help", None)]);
        let seen = collect(&["rdma-perf", "--help"]).unwrap();
        assert_eq!(seen, vec![("help", None)]);
    }

    #[test]
    fn rejects_unknown_and_incomplete() {
        assert!(matches!(collect(&["rdma-perf", "--bogus"]), Err(ArgError::Usage(_))));
        assert!(matches!(collect(&["rdma-perf", "-x"]), Err(ArgError::Usage(_))));
        assert!(matches!(collect(&["rdma-perf", "stray"]), Err(ArgError::Usage(_))));
        assert!(matches!(collect(&["rdma-perf", "--ring_sz"]), Err(ArgError::Usage(_))));
    }

    #[test]
    fn options_before_a_bad_one_are_processed() {
        let mut seen = Vec::new();
        let result = parse_argv(
            ["rdma-perf", "-r", "5", "-h", "--bogus", "-w"],
            &USAGE_DESCRIPTORS,
            |idx, value, table| {
                seen.push((table[idx].long, value.map(str::to_owned)));
                if table[idx].case_code == CaseCode::HELP {
                    return Err(ArgError::Help);
                }
                Ok(())
            },
        );
        assert_eq!(result, Err(ArgError::Help));
        assert_eq!(seen, vec![("ring_sz", Some("5".to_owned())), ("help", None)]);

        let mut calls = 0;
        let result = parse_argv(["rdma-perf", "--bogus", "-h"], &USAGE_DESCRIPTORS, |_, _, _| {
            calls += 1;
            Ok(())
        });
        assert!(matches!(result, Err(ArgError::Usage(_))));
        assert_eq!(calls, 0);
    }

    #[test]
    fn stops_at_first_callback_error() {
        let mut calls = 0;
        let result = parse_argv(
            ["rdma-perf", "-I", "-w", "--daemon"],
            &USAGE_DESCRIPTORS,
            |idx, _, table| {
                calls += 1;
                if table[idx].case_code == CaseCode::WAIT {
                    return Err(ArgError::Validation("stop".into()));
                }
                Ok(())
            },
        );
        assert_eq!(result, Err(ArgError::Validation("stop".into())));
        assert_eq!(calls, 2);
    }
}
