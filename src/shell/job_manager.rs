use std::fmt;
use std::io::Write;

use log::{debug, warn};
use nix::errno::Errno;
use nix::sys::wait::waitpid;
use nix::sys::wait::WaitPidFlag as WF;
use nix::sys::wait::WaitStatus as WS;
use nix::unistd::Pid;

use super::error::{ShellError, ShellResult};

#[derive(Debug, Clone)]
pub struct Job {
    pub pid: Pid,
    pub command: String,
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.pid, self.command)
    }
}

/// 后台任务表：按创建顺序记录尚未回收的后台进程
#[derive(Debug, Clone)]
pub struct JobManager {
    jobs: Vec<Job>,
    capacity: usize,
}

impl JobManager {
    pub fn new(capacity: usize) -> Self {
        Self {
            jobs: Vec::new(),
            capacity,
        }
    }

    pub fn get_jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn is_full(&self) -> bool {
        self.jobs.len() >= self.capacity
    }

    pub fn add_job(&mut self, pid: Pid, command: String) -> ShellResult<()> {
        if self.is_full() {
            warn!("后台任务表已满 ({}), 无法记录 {}", self.capacity, pid);
            return Err(ShellError::RegistryFull);
        }
        let job = Job { pid, command };
        debug!("记录后台任务: {}", job);
        self.jobs.push(job);
        Ok(())
    }

    /// fork 出来的子进程不拥有父进程的后台任务
    pub fn forget_all(&mut self) {
        self.jobs.clear();
    }

    /// 非阻塞地检查每个后台任务，已结束的输出 `Completed: <pid> (<status>)` 并移除，
    /// 其余任务保持原有顺序。
    pub fn reap<F>(&mut self, mut poll: F, diag: &mut dyn Write) -> Vec<(Pid, i32)>
    where
        F: FnMut(Pid) -> ShellResult<Option<i32>>,
    {
        let mut finished = Vec::new();
        self.jobs.retain(|job| match poll(job.pid) {
            Ok(None) => true,
            Ok(Some(status)) => {
                debug!("后台任务结束: {} 状态 {}", job, status);
                let _ = writeln!(diag, "Completed: {} ({})", job.pid, status);
                finished.push((job.pid, status));
                false
            }
            Err(e) => {
                warn!("无法检查后台任务 {}: {}，不再跟踪", job, e);
                false
            }
        });
        finished
    }
}

/// 退出码；被信号杀死时为 128 + 信号值
pub fn exit_code(ws: WS) -> Option<i32> {
    match ws {
        WS::Exited(_, status) => Some(status),
        WS::Signaled(_, sig, _core_dumped) => Some(128 + sig as i32),
        _ => None,
    }
}

/// 等待指定子进程。非阻塞模式下进程仍在运行时返回 `None`。
pub fn waitpidx(pid: Pid, block: bool) -> ShellResult<Option<i32>> {
    let options = if block { None } else { Some(WF::WNOHANG) };
    loop {
        match waitpid(pid, options) {
            Ok(ws) => match exit_code(ws) {
                Some(status) => return Ok(Some(status)),
                None if block => continue,
                None => return Ok(None),
            },
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(ShellError::sys("waitpid", e)),
        }
    }
}
