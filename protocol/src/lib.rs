//! Wire/API types shared by the console subsystem and its front ends.
//!
//! Everything here is serde-serializable so a UI (or the bundled CLI) can
//! consume the execution event stream and error information without string
//! parsing.

pub mod command;
pub mod escalation;
pub mod events;
pub mod identity;
pub mod mode;
pub mod signal;

pub use command::FileCommand;
pub use escalation::EscalationDecision;
pub use events::ExecCanceledEvent;
pub use events::ExecErrorInfo;
pub use events::ExecErrorKind;
pub use events::ExecEvent;
pub use events::ExecExitedEvent;
pub use events::ExecFailedEvent;
pub use events::ExecStartedEvent;
pub use events::OutputStream;
pub use events::PartialResultEvent;
pub use identity::Identity;
pub use mode::ConsoleMode;
pub use signal::ExecSignal;
