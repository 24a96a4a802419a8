use std::env;
use std::io::Write;

use log::debug;

use super::ast::Simple;
use super::dir_stack::DirStack;
use super::error::{ShellError, ShellResult};
use crate::utils::path::{change_dir, current_dir};

/// 必须在 shell 进程上下文里执行的命令，只按 argv[0] 识别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Cd,
    Pushd,
    Popd,
}

impl Builtin {
    pub fn lookup(name: &str) -> Option<Self> {
        match name {
            "cd" => Some(Builtin::Cd),
            "pushd" => Some(Builtin::Pushd),
            "popd" => Some(Builtin::Popd),
            _ => None,
        }
    }

    pub fn of(command: &Simple) -> Option<Self> {
        command.program().and_then(Self::lookup)
    }

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Cd => "cd",
            Builtin::Pushd => "pushd",
            Builtin::Popd => "popd",
        }
    }

    /// 执行内建命令并返回退出码，错误信息写入 `diag`
    pub fn run(
        self,
        argv: &[String],
        dirs: &mut DirStack,
        out: &mut dyn Write,
        diag: &mut dyn Write,
    ) -> i32 {
        debug!("执行内建命令 {}: {:?}", self.name(), argv);
        let result = match self {
            Builtin::Cd => builtin_cd(argv),
            Builtin::Pushd => builtin_pushd(argv, dirs, out),
            Builtin::Popd => builtin_popd(argv, dirs, out),
        };
        match result {
            Ok(()) => 0,
            Err(e) => {
                let _ = writeln!(diag, "{}", e);
                e.status()
            }
        }
    }
}

fn builtin_cd(argv: &[String]) -> ShellResult<()> {
    if argv.len() > 2 {
        return Err(ShellError::Usage("cd: too many arguments".to_string()));
    }
    let target = match argv.get(1) {
        Some(dir) => dir.clone(),
        None => env::var("HOME").map_err(|_| ShellError::Usage("cd: HOME not set".to_string()))?,
    };
    change_dir(target, "cd")
}

fn builtin_pushd(argv: &[String], dirs: &mut DirStack, out: &mut dyn Write) -> ShellResult<()> {
    if argv.len() != 2 {
        return Err(ShellError::Usage("pushd: usage: pushd <dir>".to_string()));
    }
    let cwd = current_dir()?;
    dirs.push(cwd)
        .map_err(|e| ShellError::Usage(format!("pushd: {}", e)))?;
    if let Err(e) = change_dir(&argv[1], "pushd") {
        // 切换失败时撤销刚刚压入的目录
        dirs.pop();
        return Err(e);
    }
    print_directory(dirs, out)
}

fn builtin_popd(argv: &[String], dirs: &mut DirStack, out: &mut dyn Write) -> ShellResult<()> {
    if argv.len() != 1 {
        return Err(ShellError::Usage("popd: too many arguments".to_string()));
    }
    let dir = dirs
        .pop()
        .ok_or_else(|| ShellError::Usage("popd: directory stack empty".to_string()))?;
    change_dir(dir, "popd")?;
    print_directory(dirs, out)
}

fn print_directory(dirs: &DirStack, out: &mut dyn Write) -> ShellResult<()> {
    let cwd = current_dir()?;
    dirs.write_listing(&cwd, out)
        .and_then(|_| out.flush())
        .map_err(|e| ShellError::io("write", e))
}
