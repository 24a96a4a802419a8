use std::ffi::CString;
use std::io::{self, Write};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::panic::{self, AssertUnwindSafe};

use log::{debug, warn};
use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, FdFlag};
use nix::unistd::{close, dup2, execvp, fork, pipe, ForkResult, Pid};

use super::redirect::apply_setup;
use super::Launcher;
use crate::shell::ast::{Node, Simple, Subshell};
use crate::shell::builtins::Builtin;
use crate::shell::error::{ShellError, ShellResult};
use crate::shell::job_manager::waitpidx;
use crate::shell::shell::Shell;
use crate::shell::signals;

/// 用 fork/exec 实现的进程启动器
#[derive(Debug, Clone, Copy, Default)]
pub struct ForkLauncher;

/// 子进程的出口：刷新标准流后直接 `_exit`，不运行父进程遗留的析构和 atexit
fn child_exit(status: i32) -> ! {
    let _ = io::stdout().flush();
    let _ = io::stderr().flush();
    // SAFETY: _exit 没有前置条件
    unsafe { libc::_exit(status) }
}

/// 在子进程中运行 `body`，无论成功、失败还是 panic 都不会回到调用者
fn child_main<F>(body: F) -> !
where
    F: FnOnce() -> i32,
{
    let status = panic::catch_unwind(AssertUnwindSafe(body)).unwrap_or(1);
    child_exit(status)
}

fn report(err: &ShellError) {
    let _ = writeln!(io::stderr(), "{}", err);
}

fn spawn<F>(context: &'static str, child: F) -> ShellResult<Pid>
where
    F: FnOnce() -> i32,
{
    // 父进程缓冲区里的输出不能被子进程再写一次
    let _ = io::stdout().flush();
    // SAFETY: 子进程只执行 `child` 然后 `_exit`，从不返回到调用栈上层
    match unsafe { fork() } {
        Ok(ForkResult::Parent { child }) => Ok(child),
        Ok(ForkResult::Child) => child_main(child),
        Err(e) => Err(ShellError::sys(context, e)),
    }
}

fn wait_foreground(pid: Pid) -> ShellResult<i32> {
    let status = waitpidx(pid, true)?.unwrap_or(0);
    debug!("前台进程 {} 结束，状态 {}", pid, status);
    Ok(status)
}

/// 替换当前进程映像。只有失败时才会返回，返回值是子进程的退出码。
fn exec_program(argv: &[String]) -> i32 {
    let args: Result<Vec<CString>, _> = argv.iter().map(|arg| CString::new(arg.as_bytes())).collect();
    let args = match args {
        Ok(args) if !args.is_empty() => args,
        Ok(_) => {
            report(&ShellError::MalformedTree("empty command".to_string()));
            return 1;
        }
        Err(e) => {
            let _ = writeln!(io::stderr(), "execvp: {}", e);
            return 1;
        }
    };
    let errno = match execvp(&args[0], &args) {
        Ok(never) => match never {},
        Err(errno) => errno,
    };
    let _ = writeln!(io::stderr(), "execvp: {}: {}", argv[0], errno.desc());
    match errno {
        Errno::ENOENT => 127,
        _ => 126,
    }
}

/// 子进程中运行一个简单命令：准备环境后执行内建命令或替换进程映像
fn run_simple_in_child(shell: &mut Shell<ForkLauncher>, command: &Simple) -> i32 {
    if let Err(e) = apply_setup(&command.setup, &mut io::stderr()) {
        report(&e);
        return 1;
    }
    match Builtin::of(command) {
        Some(builtin) => shell.run_builtin_in_child(builtin, command),
        None => exec_program(&command.argv),
    }
}

fn run_subshell_in_child(shell: &mut Shell<ForkLauncher>, subshell: &Subshell) -> i32 {
    if let Err(e) = apply_setup(&subshell.setup, &mut io::stderr()) {
        report(&e);
        return 1;
    }
    match shell.eval(&subshell.inner) {
        Ok(status) => status,
        Err(e) => {
            report(&e);
            1
        }
    }
}

/// 管道阶段或后台任务在子进程里的入口
fn run_node_in_child(shell: &mut Shell<ForkLauncher>, node: &Node) -> i32 {
    match node {
        Node::Simple(command) => run_simple_in_child(shell, command),
        Node::Subshell(subshell) => run_subshell_in_child(shell, subshell),
        other => match shell.eval(other) {
            Ok(status) => status,
            Err(e) => {
                report(&e);
                1
            }
        },
    }
}

/// 连接阶段的标准输入输出。
///
/// 管道两端在子进程里显式关闭；其余 3 以上的描述符只标记 close-on-exec，
/// 子进程里仍然存活的对象（例如日志文件）继续有效，目标程序一个也继承不到。
fn wire_stage(
    prev_read: Option<&OwnedFd>,
    pipe_fds: Option<&(OwnedFd, OwnedFd)>,
    sweep_limit: i32,
) -> ShellResult<()> {
    if let Some(read) = prev_read {
        dup2(read.as_raw_fd(), libc::STDIN_FILENO).map_err(|e| ShellError::sys("dup2 stdin", e))?;
    }
    if let Some((_, write)) = pipe_fds {
        dup2(write.as_raw_fd(), libc::STDOUT_FILENO)
            .map_err(|e| ShellError::sys("dup2 stdout", e))?;
    }
    // 子进程以 _exit 结束，这些 OwnedFd 的析构永远不会运行
    let handed_off = prev_read
        .into_iter()
        .chain(pipe_fds.into_iter().flat_map(|(read, write)| [read, write]));
    for fd in handed_off {
        let _ = close(fd.as_raw_fd());
    }
    mark_cloexec(3..sweep_limit);
    Ok(())
}

/// 给范围内所有打开的描述符加上 FD_CLOEXEC，未打开的编号直接跳过
fn mark_cloexec(fds: std::ops::Range<RawFd>) {
    for fd in fds {
        if let Ok(flags) = fcntl(fd, FcntlArg::F_GETFD) {
            let flags = FdFlag::from_bits_truncate(flags) | FdFlag::FD_CLOEXEC;
            let _ = fcntl(fd, FcntlArg::F_SETFD(flags));
        }
    }
}

impl Launcher for ForkLauncher {
    fn run_command(shell: &mut Shell<Self>, command: &Simple) -> ShellResult<i32> {
        let pid = spawn("fork", || {
            signals::reset_foreground_child();
            shell.enter_child();
            run_simple_in_child(shell, command)
        })?;
        debug!("启动前台进程 {}: {:?}", pid, command.argv);
        wait_foreground(pid)
    }

    fn run_pipeline(shell: &mut Shell<Self>, stages: &[&Node]) -> ShellResult<Vec<i32>> {
        let sweep_limit = shell.config().fd_sweep_limit;
        let mut pids = Vec::with_capacity(stages.len());
        let mut prev_read: Option<OwnedFd> = None;
        let mut failure = None;

        for (i, stage) in stages.iter().enumerate() {
            let is_last = i + 1 == stages.len();
            let pipe_fds = if is_last {
                None
            } else {
                match pipe() {
                    Ok(fds) => Some(fds),
                    Err(e) => {
                        failure = Some(ShellError::sys("pipe", e));
                        break;
                    }
                }
            };

            let spawned = spawn("fork", || {
                signals::reset_foreground_child();
                shell.enter_child();
                if let Err(e) = wire_stage(prev_read.as_ref(), pipe_fds.as_ref(), sweep_limit) {
                    report(&e);
                    return 1;
                }
                run_node_in_child(shell, stage)
            });

            match spawned {
                Ok(pid) => {
                    debug!("管道阶段 {} 启动为进程 {}: {}", i, pid, stage);
                    pids.push(pid);
                    // 父进程只保留下一阶段要用的读端，旧读端和本次写端在这里关闭
                    prev_read = pipe_fds.map(|(read, _write)| read);
                }
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        drop(prev_read);

        let mut statuses = Vec::with_capacity(pids.len());
        for pid in pids {
            match waitpidx(pid, true) {
                Ok(Some(status)) => statuses.push(status),
                Ok(None) => {}
                Err(e) => warn!("等待管道阶段 {} 失败: {}", pid, e),
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(statuses),
        }
    }

    fn run_subshell(shell: &mut Shell<Self>, subshell: &Subshell) -> ShellResult<i32> {
        let pid = spawn("fork", || {
            signals::reset_foreground_child();
            shell.enter_child();
            run_subshell_in_child(shell, subshell)
        })?;
        debug!("启动子 shell {}: {}", pid, subshell.inner);
        wait_foreground(pid)
    }

    fn spawn_background(shell: &mut Shell<Self>, node: &Node) -> ShellResult<Pid> {
        spawn("fork", || {
            signals::reset_background_child();
            shell.enter_child();
            run_node_in_child(shell, node)
        })
    }

    fn try_wait(&mut self, pid: Pid) -> ShellResult<Option<i32>> {
        waitpidx(pid, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::serial;
    use std::fs::{self, File};

    fn is_cloexec(fd: RawFd) -> Option<bool> {
        let flags = fcntl(fd, FcntlArg::F_GETFD).ok()?;
        Some(FdFlag::from_bits_truncate(flags).contains(FdFlag::FD_CLOEXEC))
    }

    #[allow(clippy::unwrap_used)]
    #[test]
    fn test_stage_wiring_keeps_live_descriptors_usable() {
        let _lock = serial();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log");
        let mut log = File::create(&path).unwrap();
        let log_fd = log.as_raw_fd();
        // std 打开的文件默认带 close-on-exec，先去掉，模拟可继承的描述符
        fcntl(log_fd, FcntlArg::F_SETFD(FdFlag::empty())).unwrap();
        let fds = pipe().unwrap();
        let (read_fd, write_fd) = (fds.0.as_raw_fd(), fds.1.as_raw_fd());

        let pid = spawn("fork", || {
            if wire_stage(None, Some(&fds), 256).is_err() {
                return 2;
            }
            // 交出去的管道两端已经关闭
            if is_cloexec(read_fd).is_some() || is_cloexec(write_fd).is_some() {
                return 3;
            }
            // 仍被对象持有的描述符保持打开，只是不会跨过 exec
            if is_cloexec(log_fd) != Some(true) {
                return 4;
            }
            match writeln!(log, "from stage") {
                Ok(()) => 0,
                Err(_) => 1,
            }
        })
        .unwrap();
        drop(fds);

        assert_eq!(wait_foreground(pid).unwrap(), 0);
        assert_eq!(fs::read_to_string(&path).unwrap(), "from stage\n");
        assert_eq!(is_cloexec(log_fd), Some(false));
    }
}
