use std::collections::HashMap;
use std::env;
use std::io::Write;

use log::{debug, warn};

use crate::shell::error::{ShellError, ShellResult};

/// 保存上一次退出码的特殊变量名
pub const STATUS_VAR: &str = "?";

/// 发布进程范围的退出码，子进程和变量展开都从 `?` 读取
pub fn publish_status(status: i32) {
    env::set_var(STATUS_VAR, status.to_string());
}

pub fn read_status() -> Option<i32> {
    env::var(STATUS_VAR).ok()?.parse().ok()
}

fn check_name(name: &str) -> ShellResult<()> {
    if name.is_empty() || name.contains('=') || name.contains('\0') {
        return Err(ShellError::InvalidVariable(name.to_string()));
    }
    Ok(())
}

/// 把局部变量写入当前进程环境。
///
/// 对 `?` 的赋值被拒绝并输出诊断，但不算失败；
/// 其它非法变量名是设置失败。返回被覆盖前的旧值，方便恢复。
pub fn bind_locals(
    locals: &HashMap<String, String>,
    diag: &mut dyn Write,
) -> ShellResult<Vec<(String, Option<String>)>> {
    let mut previous = Vec::with_capacity(locals.len());
    for (name, value) in locals {
        if name == STATUS_VAR {
            warn!("拒绝设置变量 '?'");
            let _ = writeln!(diag, "cannot set variable '?'");
            continue;
        }
        if let Err(e) = check_name(name).and_then(|_| check_value(name, value)) {
            restore(previous);
            return Err(e);
        }
        debug!("设置局部变量: {}={}", name, value);
        previous.push((name.clone(), env::var(name).ok()));
        env::set_var(name, value);
    }
    Ok(previous)
}

fn check_value(name: &str, value: &str) -> ShellResult<()> {
    if value.contains('\0') {
        return Err(ShellError::InvalidVariable(name.to_string()));
    }
    Ok(())
}

/// 恢复 `bind_locals` 覆盖前的环境
pub fn restore(previous: Vec<(String, Option<String>)>) {
    for (name, value) in previous.into_iter().rev() {
        match value {
            Some(value) => env::set_var(&name, value),
            None => env::remove_var(&name),
        }
    }
}

/// 在 shell 自身进程里执行内建命令时使用，离开作用域时恢复环境
pub struct LocalsGuard {
    previous: Vec<(String, Option<String>)>,
}

impl LocalsGuard {
    pub fn bind(locals: &HashMap<String, String>, diag: &mut dyn Write) -> ShellResult<Self> {
        Ok(Self {
            previous: bind_locals(locals, diag)?,
        })
    }
}

impl Drop for LocalsGuard {
    fn drop(&mut self) {
        restore(std::mem::take(&mut self.previous));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::serial;

    #[allow(clippy::unwrap_used)]
    #[test]
    fn test_question_mark_is_refused_without_failing() {
        let _lock = serial();
        publish_status(7);
        let mut diag = Vec::new();
        let locals = HashMap::from([("?".to_string(), "0".to_string())]);
        let previous = bind_locals(&locals, &mut diag).unwrap();
        assert!(previous.is_empty());
        assert_eq!(read_status(), Some(7));
        assert_eq!(String::from_utf8(diag).unwrap(), "cannot set variable '?'\n");
    }

    #[allow(clippy::unwrap_used)]
    #[test]
    fn test_guard_restores_environment() {
        let _lock = serial();
        env::set_var("ZAKO_TEST_KEEP", "old");
        env::remove_var("ZAKO_TEST_NEW");
        let locals = HashMap::from([
            ("ZAKO_TEST_KEEP".to_string(), "new".to_string()),
            ("ZAKO_TEST_NEW".to_string(), "fresh".to_string()),
        ]);
        {
            let _guard = LocalsGuard::bind(&locals, &mut Vec::new()).unwrap();
            assert_eq!(env::var("ZAKO_TEST_KEEP").unwrap(), "new");
            assert_eq!(env::var("ZAKO_TEST_NEW").unwrap(), "fresh");
        }
        assert_eq!(env::var("ZAKO_TEST_KEEP").unwrap(), "old");
        assert!(env::var("ZAKO_TEST_NEW").is_err());
        env::remove_var("ZAKO_TEST_KEEP");
    }

    #[test]
    fn test_invalid_name_is_setup_failure() {
        let _lock = serial();
        let locals = HashMap::from([("A=B".to_string(), "x".to_string())]);
        let result = bind_locals(&locals, &mut Vec::new());
        assert!(matches!(result, Err(ShellError::InvalidVariable(name)) if name == "A=B"));
    }
}
