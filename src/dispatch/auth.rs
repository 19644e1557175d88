//! Default authentication decision.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Outcome handed back for every authentication attempt.
///
/// The dispatcher does not inspect credentials; it answers every attempt with
/// the process-wide default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AuthDecision {
    Granted,
    Denied,
    /// Authentication is not handled here at all.
    Unavailable,
}

impl fmt::Display for AuthDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AuthDecision::Granted => "granted",
            AuthDecision::Denied => "denied",
            AuthDecision::Unavailable => "unavailable",
        })
    }
}
