use serde::Deserialize;
use serde::Serialize;
use strum_macros::Display;

/// Which execution backend the file manager runs commands through.
///
/// This is the value persisted as the user's default privilege preference:
/// `restricted` is the safe default, `privileged` routes every command
/// through an elevated shell.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ConsoleMode {
    /// A fixed command set implemented in-process, running with the rights
    /// of the current user.
    #[default]
    Restricted,

    /// A shell process launched with elevated rights; can run arbitrary
    /// commands and deliver signals to them.
    Privileged,
}

impl ConsoleMode {
    pub fn is_privileged(self) -> bool {
        matches!(self, ConsoleMode::Privileged)
    }
}
