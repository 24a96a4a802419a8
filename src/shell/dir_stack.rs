use std::io::{self, Write};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use super::error::{ShellError, ShellResult};

/// pushd/popd 使用的目录栈，有容量上限。
/// 路径按操作系统的原始字节保存，非 UTF-8 目录也能原样回到。
#[derive(Debug, Clone)]
pub struct DirStack {
    dirs: Vec<PathBuf>,
    capacity: usize,
}

impl DirStack {
    pub fn new(capacity: usize) -> Self {
        Self {
            dirs: Vec::new(),
            capacity,
        }
    }

    pub fn push(&mut self, dir: PathBuf) -> ShellResult<()> {
        if self.dirs.len() >= self.capacity {
            warn!("目录栈已满 ({}), 拒绝压入 {}", self.capacity, dir.display());
            return Err(ShellError::StackFull);
        }
        debug!("目录入栈: {}", dir.display());
        self.dirs.push(dir);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<PathBuf> {
        let dir = self.dirs.pop();
        debug!("目录出栈: {:?}", dir);
        dir
    }

    pub fn len(&self) -> usize {
        self.dirs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }

    /// 栈顶在前
    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.dirs.iter().rev().map(PathBuf::as_path)
    }

    pub fn clear(&mut self) {
        self.dirs.clear();
    }

    /// 写出当前目录和栈内容（栈顶在前），空格分隔，换行结尾
    pub fn write_listing(&self, cwd: &Path, out: &mut dyn Write) -> io::Result<()> {
        out.write_all(cwd.as_os_str().as_bytes())?;
        for dir in self.iter() {
            out.write_all(b" ")?;
            out.write_all(dir.as_os_str().as_bytes())?;
        }
        out.write_all(b"\n")
    }

    pub fn render(&self, cwd: &Path) -> Vec<u8> {
        let mut listing = Vec::new();
        // 写入 Vec 不会失败
        let _ = self.write_listing(cwd, &mut listing);
        listing
    }
}
