use crate::usage::CaseCode;

use std::fmt;

/// Fatal conditions raised while turning the command line into a [`Config`].
///
/// None of them leaves a half-updated configuration behind: the parser is
/// abandoned as soon as one is returned.
///
/// [`Config`]: crate::config::Config
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgError {
    /// `-h`/`--help` was given
    Help,
    /// the command line carries no option at all
    NoArguments,
    /// unknown option, missing value or stray operand
    Usage(String),
    /// a value was rejected by its option
    Validation(String),
    /// the option table holds a tag the handler does not know
    Dispatch { case_code: CaseCode, value: String },
}

impl ArgError {
    /// Process exit status for this error.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            ArgError::Help | ArgError::NoArguments | ArgError::Validation(_) => 1,
            ArgError::Usage(_) => 2,
            ArgError::Dispatch { .. } => 4,
        }
    }
}

impl fmt::Display for ArgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgError::Help => f.write_str("help requested"),
            ArgError::NoArguments => {
                f.write_str("Sorry, you must enter some data. type -h for help.")
            }
            ArgError::Usage(msg) | ArgError::Validation(msg) => f.write_str(msg),
            ArgError::Dispatch { case_code, value } => {
                write!(f, "unknown parameter in the switch {} ({value})", case_code.0)
            }
        }
    }
}

impl std::error::Error for ArgError {}
