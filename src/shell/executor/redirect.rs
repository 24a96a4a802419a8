use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;

use log::{debug, warn};
use nix::unistd::{dup, dup2};

use super::variable::{bind_locals, LocalsGuard};
use crate::shell::ast::{InputRedirect, OutputRedirect, Setup};
use crate::shell::error::{ShellError, ShellResult};

const STDIN: RawFd = libc::STDIN_FILENO;
const STDOUT: RawFd = libc::STDOUT_FILENO;

fn redirect_fd(file: &impl AsRawFd, target: RawFd, context: &'static str) -> ShellResult<()> {
    dup2(file.as_raw_fd(), target).map_err(|e| ShellError::sys(context, e))?;
    Ok(())
}

fn open_input(path: &str) -> ShellResult<File> {
    File::open(path).map_err(|e| ShellError::io("open input file", e))
}

/// here-document 写入一个已经 unlink 的临时文件，描述符在进程退出或关闭前一直有效
fn here_doc(text: &str) -> ShellResult<File> {
    let mut file = tempfile::tempfile().map_err(|e| ShellError::io("mkstemp", e))?;
    file.write_all(text.as_bytes())
        .map_err(|e| ShellError::io("write to temp file", e))?;
    file.seek(SeekFrom::Start(0))
        .map_err(|e| ShellError::io("seek", e))?;
    Ok(file)
}

fn open_output(path: &str, append: bool) -> ShellResult<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).mode(0o644);
    if append {
        options.append(true);
    } else {
        options.truncate(true);
    }
    options.open(path).map_err(|e| {
        let context = if append {
            "open append output file"
        } else {
            "open output file"
        };
        ShellError::io(context, e)
    })
}

/// 把输入输出重定向应用到当前进程的标准描述符上。
/// 打开的文件在 dup2 之后立即关闭。
pub fn apply_redirections(setup: &Setup) -> ShellResult<()> {
    match &setup.input {
        InputRedirect::None => {}
        InputRedirect::File(path) => {
            debug!("输入重定向: < {}", path);
            redirect_fd(&open_input(path)?, STDIN, "dup2 input")?;
        }
        InputRedirect::HereDoc(text) => {
            debug!("here-document 输入: {} 字节", text.len());
            redirect_fd(&here_doc(text)?, STDIN, "dup2 HERE doc")?;
        }
    }

    match &setup.output {
        OutputRedirect::None => {}
        OutputRedirect::Truncate(path) => {
            debug!("输出重定向: > {}", path);
            redirect_fd(&open_output(path, false)?, STDOUT, "dup2 output")?;
        }
        OutputRedirect::Append(path) => {
            debug!("追加输出重定向: >> {}", path);
            redirect_fd(&open_output(path, true)?, STDOUT, "dup2 append output")?;
        }
    }
    Ok(())
}

/// 子进程里的完整准备：先局部变量，再重定向。只调用一次，失败由调用者结束子进程。
pub fn apply_setup(setup: &Setup, diag: &mut dyn Write) -> ShellResult<()> {
    if setup.is_empty() {
        return Ok(());
    }
    bind_locals(&setup.locals, diag)?;
    apply_redirections(setup)
}

/// 保存 shell 自己的标准输入输出，离开作用域时还原
pub struct StdioGuard {
    saved_in: OwnedFd,
    saved_out: OwnedFd,
}

impl StdioGuard {
    pub fn save() -> ShellResult<Self> {
        let saved_in = dup(STDIN).map_err(|e| ShellError::sys("dup stdin", e))?;
        // SAFETY: dup 返回的描述符只归这里所有
        let saved_in = unsafe { OwnedFd::from_raw_fd(saved_in) };
        let saved_out = dup(STDOUT).map_err(|e| ShellError::sys("dup stdout", e))?;
        let saved_out = unsafe { OwnedFd::from_raw_fd(saved_out) };
        Ok(Self {
            saved_in,
            saved_out,
        })
    }
}

impl Drop for StdioGuard {
    fn drop(&mut self) {
        let _ = io::stdout().flush();
        if let Err(e) = dup2(self.saved_in.as_raw_fd(), STDIN) {
            warn!("还原 stdin 失败: {}", e);
        }
        if let Err(e) = dup2(self.saved_out.as_raw_fd(), STDOUT) {
            warn!("还原 stdout 失败: {}", e);
        }
    }
}

/// shell 进程内执行内建命令时的作用域：变量与标准描述符在 drop 时还原
pub struct ScopedSetup {
    // 先还原描述符，再还原变量
    _stdio: Option<StdioGuard>,
    _locals: LocalsGuard,
}

impl ScopedSetup {
    pub fn apply(setup: &Setup, diag: &mut dyn Write) -> ShellResult<Self> {
        let locals = LocalsGuard::bind(&setup.locals, diag)?;
        let stdio = if setup.input == InputRedirect::None && setup.output == OutputRedirect::None {
            None
        } else {
            let guard = StdioGuard::save()?;
            apply_redirections(setup)?;
            Some(guard)
        };
        Ok(Self {
            _stdio: stdio,
            _locals: locals,
        })
    }
}
