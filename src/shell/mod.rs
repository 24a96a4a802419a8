pub mod ast;
pub mod builtins;
pub mod dir_stack;
pub mod error;
pub mod executor;
pub mod job_manager;
mod shell;
mod signals;

pub use shell::Shell;
