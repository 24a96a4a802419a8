mod executor;
pub mod pipeline;
pub mod redirect;
pub mod variable;

use nix::unistd::Pid;

use super::ast::{Node, Simple, Subshell};
use super::error::ShellResult;
use super::shell::Shell;

pub use executor::ForkLauncher;

/// 解释器对操作系统的全部要求：创建进程并等待它们。
///
/// 需要在子进程里继续解释命令树的操作拿到整个 `Shell`，
/// 子进程里的 `Shell` 是父进程的副本，修改不会影响父进程。
/// 测试可以换成不创建进程的实现来检查解释器的状态机。
pub trait Launcher: Sized {
    /// 运行一个外部命令并等待，返回退出码
    fn run_command(shell: &mut Shell<Self>, command: &Simple) -> ShellResult<i32>;

    /// 按从左到右的顺序启动所有阶段并全部等待，返回各阶段的退出码
    fn run_pipeline(shell: &mut Shell<Self>, stages: &[&Node]) -> ShellResult<Vec<i32>>;

    /// 在独立进程中解释子命令树并等待
    fn run_subshell(shell: &mut Shell<Self>, subshell: &Subshell) -> ShellResult<i32>;

    /// 启动一个后台进程，不等待
    fn spawn_background(shell: &mut Shell<Self>, node: &Node) -> ShellResult<Pid>;

    /// 非阻塞检查后台进程，仍在运行时返回 `None`
    fn try_wait(&mut self, pid: Pid) -> ShellResult<Option<i32>>;
}
