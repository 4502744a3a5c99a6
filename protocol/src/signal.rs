use serde::Deserialize;
use serde::Serialize;
use strum_macros::Display;

/// Signals a console can deliver to an in-flight command.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ExecSignal {
    Interrupt,
    Terminate,
    Kill,
}

impl ExecSignal {
    /// POSIX signal number.
    pub fn as_raw(self) -> i32 {
        match self {
            ExecSignal::Interrupt => 2,
            ExecSignal::Terminate => 15,
            ExecSignal::Kill => 9,
        }
    }
}
