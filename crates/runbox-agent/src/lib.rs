//! Script run supervision: dependency sniffing and installation, launching
//! scripts as process-group leaders, tracking them in an in-memory registry,
//! and tearing them down.

pub mod config;
pub mod installer;
pub mod port_alloc;
pub mod process_handle;
pub mod process_manager;
mod process_manager_support;
pub mod reconcile;
pub mod sniffer;
pub mod spawn_queue;
pub mod storage;

pub use config::AgentConfig;
pub use process_manager::ProcessManager;
pub use process_manager_support::format_error_chain;
pub use spawn_queue::{SpawnQueue, SpawnTicket};
pub use storage::{RunFiles, ScriptNameError, ScriptStore};
