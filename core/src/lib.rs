//! Console/command-execution subsystem of the file manager.
//!
//! The pieces fit together like this: a front end obtains the current
//! [`console::Console`] from the [`registry::ConsoleRegistry`], wraps a
//! [`fileshell_protocol::FileCommand`] in an [`executable::Executable`], and
//! submits it, either directly via [`console::execute`] or through
//! [`relaunch::submit`] to get the escalate-and-retry protocol on
//! permission failures. Results stream back over the
//! [`listener::ExecEventSender`] channel.

pub mod config;
pub mod console;
pub mod error;
pub mod executable;
pub mod listener;
pub mod output;
pub mod registry;
pub mod relaunch;

pub use config::ConsoleConfig;
pub use console::Console;
pub use console::EmbeddedConsole;
pub use console::ExecOutcome;
pub use console::ShellConsole;
pub use error::ConsoleError;
pub use executable::ExecMode;
pub use executable::Executable;
pub use listener::ExecEventSender;
pub use output::ExecOutput;
pub use output::ExecStatus;
pub use registry::ConsoleFactory;
pub use registry::ConsoleRegistry;
pub use relaunch::EscalationPrompt;
