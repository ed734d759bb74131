//! External engine plumbing.
//!
//! Everything needed to run the command-line backtesting engine once:
//! per-task file allocation, the JSON configuration document, argument
//! construction and process supervision. Executors compose these.

mod command;
mod config_file;
mod process;
mod workspace;

pub use command::EngineCommand;
pub use config_file::EngineConfigFile;
pub use process::{ProcessError, ProcessOutcome, ProcessOutput, run_process};
pub use workspace::{TaskFiles, Workspace};
