use std::env;
use std::path::{Path, PathBuf};

use log::debug;

use crate::shell::error::{ShellError, ShellResult};

/// 当前工作目录，保留原始字节
pub fn current_dir() -> ShellResult<PathBuf> {
    env::current_dir().map_err(|e| ShellError::io("getcwd", e))
}

/// 切换工作目录，失败时保留系统错误码
pub fn change_dir<P: AsRef<Path>>(path: P, context: &'static str) -> ShellResult<()> {
    let path = path.as_ref();
    debug!("{}: 切换目录到 {}", context, path.display());
    env::set_current_dir(path).map_err(|e| ShellError::io(context, e))
}
