use std::io;

use nix::errno::Errno;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("{context}: {}", reason(.source))]
    Io {
        context: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("{context}: {}", .errno.desc())]
    Sys { context: &'static str, errno: Errno },

    #[error("{0}")]
    Usage(String),

    #[error("cannot set variable '{0}'")]
    InvalidVariable(String),

    #[error("background process queue full")]
    RegistryFull,

    #[error("directory stack full")]
    StackFull,

    #[error("malformed command tree: {0}")]
    MalformedTree(String),
}

impl ShellError {
    pub fn io(context: &'static str, source: io::Error) -> Self {
        ShellError::Io { context, source }
    }

    pub fn sys(context: &'static str, errno: Errno) -> Self {
        ShellError::Sys { context, errno }
    }

    /// 作为命令退出码：有系统错误码就用错误码，否则为 1
    pub fn status(&self) -> i32 {
        let code = match self {
            ShellError::Io { source, .. } => source.raw_os_error().unwrap_or(1),
            ShellError::Sys { errno, .. } => *errno as i32,
            _ => 1,
        };
        if (1..=255).contains(&code) {
            code
        } else {
            1
        }
    }

    /// 致命错误需要终止检测到它的进程
    pub fn is_fatal(&self) -> bool {
        matches!(self, ShellError::MalformedTree(_))
    }
}

/// 系统错误只输出错误描述，和 perror 一致，不带 "(os error N)" 后缀
fn reason(source: &io::Error) -> String {
    match source.raw_os_error() {
        Some(code) => Errno::from_raw(code).desc().to_string(),
        None => source.to_string(),
    }
}

pub type ShellResult<T> = Result<T, ShellError>;
