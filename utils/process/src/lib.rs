//! Child-process plumbing for console backends.
//!
//! Spawns pipe-backed children in their own process group, streams
//! stdout/stderr chunks (tagged by stream) over a broadcast channel, forwards
//! stdin writes over an mpsc channel, and reports exit via a oneshot plus an
//! atomic flag. Process-group helpers allow signaling or killing the whole
//! child tree, not just the immediate child.

pub mod process_group;
mod spawn;

pub use spawn::OutputChunk;
pub use spawn::ProcessHandle;
pub use spawn::SpawnedChild;
pub use spawn::spawn_command;
