use std::io::{self, Write};

use log::{debug, error, warn};

use super::ast::{Node, Simple};
use super::builtins::Builtin;
use super::dir_stack::DirStack;
use super::error::{ShellError, ShellResult};
use super::executor::pipeline::{aggregate_status, collect_stages};
use super::executor::redirect::ScopedSetup;
use super::executor::variable::{publish_status, STATUS_VAR};
use super::executor::{ForkLauncher, Launcher};
use super::job_manager::{Job, JobManager};
use crate::utils::config::Config;

/// 命令树解释器以及它独占的状态：目录栈、后台任务表和上一次的退出码
pub struct Shell<L = ForkLauncher> {
    config: Config,
    launcher: L,
    dirs: DirStack,
    jobs: JobManager,
    last_status: i32,
    out: Box<dyn Write>,
    diag: Box<dyn Write>,
}

impl Shell<ForkLauncher> {
    pub fn new(config: Config) -> Self {
        Self::with_launcher(config, ForkLauncher)
    }
}

impl<L: Launcher> Shell<L> {
    pub fn with_launcher(config: Config, launcher: L) -> Self {
        Self {
            dirs: DirStack::new(config.dir_stack_depth),
            jobs: JobManager::new(config.max_jobs),
            config,
            launcher,
            last_status: 0,
            out: Box::new(io::stdout()),
            diag: Box::new(io::stderr()),
        }
    }

    /// 替换内建命令的输出流和诊断流（默认是 stdout 和 stderr）
    pub fn with_streams(mut self, out: Box<dyn Write>, diag: Box<dyn Write>) -> Self {
        self.out = out;
        self.diag = diag;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    pub fn launcher_mut(&mut self) -> &mut L {
        &mut self.launcher
    }

    pub fn last_status(&self) -> i32 {
        self.last_status
    }

    pub fn dir_stack(&self) -> &DirStack {
        &self.dirs
    }

    pub fn jobs(&self) -> &[Job] {
        self.jobs.get_jobs()
    }

    /// 处理一行命令树。
    ///
    /// 先回收已结束的后台任务，再解释命令树。只有致命错误（命令树损坏）
    /// 才会返回 `Err`，调用者必须随即终止 shell 进程。
    pub fn execute(&mut self, node: Option<&Node>) -> ShellResult<i32> {
        self.reap();
        match node {
            Some(node) => self.eval(node),
            None => Ok(0),
        }
    }

    /// 与 `execute` 相同，但遇到致命错误时直接结束当前进程
    pub fn process(&mut self, node: Option<&Node>) -> i32 {
        match self.execute(node) {
            Ok(status) => status,
            Err(e) => {
                error!("致命错误，退出: {}", e);
                let _ = writeln!(self.diag, "{}", e);
                let _ = self.diag.flush();
                std::process::exit(1);
            }
        }
    }

    /// 回收已经结束的后台任务，返回 (pid, 退出码)
    pub fn reap(&mut self) -> Vec<(nix::unistd::Pid, i32)> {
        let launcher = &mut self.launcher;
        self.jobs.reap(|pid| launcher.try_wait(pid), &mut *self.diag)
    }

    /// shell 退出前释放目录栈，记录仍在运行的后台任务
    pub fn shutdown(&mut self) {
        for job in self.jobs.get_jobs() {
            warn!("退出时后台任务仍在运行: {}", job);
        }
        self.dirs.clear();
        let _ = self.out.flush();
        let _ = self.diag.flush();
        debug!("shell 状态已清理");
    }

    pub(crate) fn eval(&mut self, node: &Node) -> ShellResult<i32> {
        match node {
            Node::Simple(command) => self.eval_simple(command),
            Node::Pipe { .. } => self.eval_pipeline(node),
            Node::Sequence { left, right } => {
                let status = self.eval(left)?;
                match right {
                    Some(right) => self.eval(right),
                    None => Ok(status),
                }
            }
            Node::And { left, right } => {
                let status = self.eval(left)?;
                match right {
                    Some(right) if status == 0 => self.eval(right),
                    _ => Ok(self.publish(status)),
                }
            }
            Node::Or { left, right } => {
                let status = self.eval(left)?;
                match right {
                    Some(right) if status != 0 => self.eval(right),
                    _ => Ok(self.publish(status)),
                }
            }
            Node::Background { left, right } => {
                self.end_background(left)?;
                self.publish(0);
                match right {
                    Some(right) => self.eval(right),
                    None => Ok(0),
                }
            }
            Node::Subshell(subshell) => {
                let result = L::run_subshell(self, subshell);
                self.settle(result)
            }
        }
    }

    /// 后台运算符的左侧：`&` 连接的每一项各自在后台启动，
    /// `;` 连接的部分同步执行完再继续下一项。
    fn end_background(&mut self, node: &Node) -> ShellResult<()> {
        match node {
            Node::Background { left, right } => {
                self.end_background(left)?;
                if let Some(right) = right {
                    self.end_background(right)?;
                }
            }
            Node::Sequence { left, right } => {
                self.eval(left)?;
                if let Some(right) = right {
                    self.end_background(right)?;
                }
            }
            other => self.spawn_background(other)?,
        }
        Ok(())
    }

    fn spawn_background(&mut self, node: &Node) -> ShellResult<()> {
        if let Node::Pipe { .. } = node {
            // 损坏的管道在父进程里就要发现
            collect_stages(node)?;
        }
        if self.jobs.is_full() {
            warn!("后台任务表已满，拒绝启动: {}", node);
            let _ = writeln!(self.diag, "{}", ShellError::RegistryFull);
            return Ok(());
        }
        match L::spawn_background(self, node) {
            Ok(pid) => {
                debug!("后台启动 {}: {}", pid, node);
                let _ = writeln!(self.diag, "Backgrounded: {}", pid);
                if let Err(e) = self.jobs.add_job(pid, node.to_string()) {
                    let _ = writeln!(self.diag, "{}", e);
                }
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!("后台启动失败: {}", e);
                let _ = writeln!(self.diag, "{}", e);
            }
        }
        Ok(())
    }

    fn eval_simple(&mut self, command: &Simple) -> ShellResult<i32> {
        if command.argv.is_empty() {
            // 空命令什么也不做，退出码保持不变
            if command.setup.locals.contains_key(STATUS_VAR) {
                let _ = writeln!(self.diag, "{}", ShellError::InvalidVariable(STATUS_VAR.to_string()));
            }
            return Ok(self.last_status);
        }
        if let Some(builtin) = Builtin::of(command) {
            let status = self.run_builtin_here(builtin, command);
            return Ok(self.publish(status));
        }
        let result = L::run_command(self, command);
        self.settle(result)
    }

    fn eval_pipeline(&mut self, node: &Node) -> ShellResult<i32> {
        let stages = collect_stages(node)?;
        debug!("执行管道，共 {} 个阶段", stages.len());
        let result = L::run_pipeline(self, &stages).map(|statuses| aggregate_status(&statuses));
        self.settle(result)
    }

    /// 在 shell 自身进程里执行内建命令，局部变量和重定向只在命令期间有效
    fn run_builtin_here(&mut self, builtin: Builtin, command: &Simple) -> i32 {
        let _scope = match ScopedSetup::apply(&command.setup, &mut *self.diag) {
            Ok(scope) => scope,
            Err(e) => {
                let _ = writeln!(self.diag, "{}", e);
                return 1;
            }
        };
        builtin.run(&command.argv, &mut self.dirs, &mut *self.out, &mut *self.diag)
    }

    /// 子进程里执行内建命令：效果只留在这个短命进程里
    pub(crate) fn run_builtin_in_child(&mut self, builtin: Builtin, command: &Simple) -> i32 {
        builtin.run(&command.argv, &mut self.dirs, &mut *self.out, &mut *self.diag)
    }

    /// fork 之后在子进程里调用：后台任务属于父进程，输出流指向子进程自己的描述符
    pub(crate) fn enter_child(&mut self) {
        self.jobs.forget_all();
        self.out = Box::new(io::stdout());
        self.diag = Box::new(io::stderr());
    }

    /// 非致命错误输出诊断并转换为退出码
    fn settle(&mut self, result: ShellResult<i32>) -> ShellResult<i32> {
        match result {
            Ok(status) => Ok(self.publish(status)),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!("命令执行失败: {}", e);
                let _ = writeln!(self.diag, "{}", e);
                Ok(self.publish(e.status()))
            }
        }
    }

    fn publish(&mut self, status: i32) -> i32 {
        self.last_status = status;
        publish_status(status);
        status
    }
}
