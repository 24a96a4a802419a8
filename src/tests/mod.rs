#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::env;
use std::io::{self, Write};
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::{Mutex, MutexGuard};

use nix::unistd::Pid;

use crate::shell::ast::{Node, Simple, Subshell};
use crate::shell::error::ShellResult;
use crate::shell::executor::pipeline::collect_stages;
use crate::shell::executor::Launcher;
use crate::shell::Shell;
use crate::utils::config::Config;

mod redirection_tests;

static PROCESS_LOCK: Mutex<()> = Mutex::new(());

/// 工作目录、环境变量和标准描述符是整个测试进程共享的，相关测试逐个执行
pub fn serial() -> MutexGuard<'static, ()> {
    PROCESS_LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

/// 测试结束时回到原来的工作目录
pub struct CwdGuard {
    saved: PathBuf,
}

impl CwdGuard {
    pub fn new() -> Self {
        Self {
            saved: env::current_dir().unwrap(),
        }
    }
}

impl Drop for CwdGuard {
    fn drop(&mut self) {
        let _ = env::set_current_dir(&self.saved);
    }
}

/// 可以在交给 `Shell` 之后继续读取的缓冲区
#[derive(Clone, Default)]
pub struct SharedBuf(Rc<RefCell<Vec<u8>>>);

impl SharedBuf {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).to_string()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub fn test_config() -> Config {
    Config::from_lookup(|_| None)
}

/// 真实进程的 shell，内建命令输出和诊断写入缓冲区
pub fn fork_shell(config: Config) -> (Shell, SharedBuf, SharedBuf) {
    let out = SharedBuf::default();
    let diag = SharedBuf::default();
    let shell = Shell::new(config).with_streams(Box::new(out.clone()), Box::new(diag.clone()));
    (shell, out, diag)
}

/// 不创建进程的启动器：按程序名给出退出码并记录调用顺序。
/// `true` 为 0，`false` 为 1，`exit N` 为 N，其它程序为 0。
#[derive(Default)]
pub struct ScriptedLauncher {
    pub log: Vec<String>,
    pub finished: HashMap<Pid, i32>,
    next_pid: i32,
}

impl ScriptedLauncher {
    fn status_of(node: &Node) -> i32 {
        match node {
            Node::Simple(simple) => match simple.program() {
                Some("false") => 1,
                Some("exit") => simple.argv.get(1).and_then(|s| s.parse().ok()).unwrap_or(0),
                _ => 0,
            },
            _ => 0,
        }
    }
}

impl Launcher for ScriptedLauncher {
    fn run_command(shell: &mut Shell<Self>, command: &Simple) -> ShellResult<i32> {
        let node = Node::Simple(command.clone());
        shell.launcher_mut().log.push(format!("run {}", node));
        Ok(Self::status_of(&node))
    }

    fn run_pipeline(shell: &mut Shell<Self>, stages: &[&Node]) -> ShellResult<Vec<i32>> {
        let names: Vec<String> = stages.iter().map(|s| s.to_string()).collect();
        shell.launcher_mut().log.push(format!("pipe {}", names.join(" | ")));
        Ok(stages.iter().map(|s| Self::status_of(s)).collect())
    }

    fn run_subshell(shell: &mut Shell<Self>, subshell: &Subshell) -> ShellResult<i32> {
        shell.launcher_mut().log.push("subshell".to_string());
        shell.eval(&subshell.inner)
    }

    fn spawn_background(shell: &mut Shell<Self>, node: &Node) -> ShellResult<Pid> {
        if let Node::Pipe { .. } = node {
            collect_stages(node)?;
        }
        let launcher = shell.launcher_mut();
        launcher.next_pid += 1;
        launcher.log.push(format!("bg {}", node));
        Ok(Pid::from_raw(1000 + launcher.next_pid))
    }

    fn try_wait(&mut self, pid: Pid) -> ShellResult<Option<i32>> {
        Ok(self.finished.remove(&pid))
    }
}

pub fn scripted_shell(config: Config) -> (Shell<ScriptedLauncher>, SharedBuf, SharedBuf) {
    let out = SharedBuf::default();
    let diag = SharedBuf::default();
    let shell = Shell::with_launcher(config, ScriptedLauncher::default())
        .with_streams(Box::new(out.clone()), Box::new(diag.clone()));
    (shell, out, diag)
}

pub fn sh(script: &str) -> Node {
    Node::simple(["sh", "-c", script])
}
