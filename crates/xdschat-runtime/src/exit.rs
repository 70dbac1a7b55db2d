//! Process exit seam
//!
//! The shutdown sequence ends the process. Going through `ProcessExit` keeps that
//! last step replaceable in tests.

use std::fmt;

/// Exit code after an orderly shutdown
pub const EXIT_OK: i32 = 0;
/// Exit code when the shutdown sequence itself failed
pub const EXIT_FAILURE: i32 = 1;
/// Exit code after a completed self-destruct
pub const EXIT_SELF_DESTRUCT: i32 = 666;

/// How the shutdown sequence ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShutdownOutcome {
    /// Workers awaited, keys cleared
    Completed,
    /// Workers awaited, keys cleared, data directory deleted
    SelfDestructed,
    /// Some step of the sequence failed
    Failed,
}

impl ShutdownOutcome {
    pub fn exit_code(self) -> i32 {
        match self {
            ShutdownOutcome::Completed => EXIT_OK,
            ShutdownOutcome::SelfDestructed => EXIT_SELF_DESTRUCT,
            ShutdownOutcome::Failed => EXIT_FAILURE,
        }
    }
}

impl fmt::Display for ShutdownOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownOutcome::Completed => write!(f, "Completed"),
            ShutdownOutcome::SelfDestructed => write!(f, "SelfDestructed"),
            ShutdownOutcome::Failed => write!(f, "Failed"),
        }
    }
}

/// Terminates the process
pub trait ProcessExit: Send + Sync {
    fn exit(&self, code: i32);
}

/// Exits through `std::process::exit`
#[derive(Debug, Default, Clone, Copy)]
pub struct StdProcessExit;

impl ProcessExit for StdProcessExit {
    fn exit(&self, code: i32) {
        std::process::exit(code)
    }
}
