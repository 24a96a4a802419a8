//! 雑魚 Shell 的执行引擎。
//!
//! 解析器交给 [`Shell`] 一棵命令树，引擎负责创建进程、连接管道、
//! 应用重定向和局部变量、跟踪后台任务，并把退出码发布到 `?` 变量。

pub mod shell;
pub mod utils;

pub use shell::ast::{InputRedirect, Node, OutputRedirect, Setup, Simple, Subshell};
pub use shell::error::{ShellError, ShellResult};
pub use shell::executor::{ForkLauncher, Launcher};
pub use shell::Shell;
pub use utils::config::Config;

#[cfg(test)]
mod tests;
