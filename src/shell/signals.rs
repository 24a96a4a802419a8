use log::warn;
use nix::sys::signal::{signal, SigHandler, Signal};

fn set_default(sig: Signal) {
    // SAFETY: 只是把处理方式恢复为默认，不安装自定义处理函数
    if let Err(e) = unsafe { signal(sig, SigHandler::SigDfl) } {
        warn!("恢复 {} 默认处理失败: {}", sig, e);
    }
}

/// 前台命令、子 shell 和管道阶段：可以被 Ctrl-C 打断，下游关闭读端时直接终止。
/// Rust 运行时启动时把 SIGPIPE 设成了忽略，忽略状态会穿过 exec 继承，所以必须恢复。
pub fn reset_foreground_child() {
    set_default(Signal::SIGINT);
    set_default(Signal::SIGPIPE);
}

/// 后台子进程保留 shell 对 SIGINT 的处理方式，只恢复 SIGPIPE
pub fn reset_background_child() {
    set_default(Signal::SIGPIPE);
}
