use dotenv::dotenv;
use log::warn;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

const DEFAULT_MAX_JOBS: usize = 1000;
const DEFAULT_DIR_STACK_DEPTH: usize = 1000;
const DEFAULT_FD_SWEEP_LIMIT: i32 = 256;

#[derive(Debug, Clone)]
pub struct Config {
    pub name: String,
    pub logger_level: String,
    pub logger_dir: PathBuf,
    /// 日志是否同时输出到 stderr
    pub logger_stderr: bool,
    /// 后台任务表容量
    pub max_jobs: usize,
    /// 目录栈容量
    pub dir_stack_depth: usize,
    /// 管道子进程关闭描述符的上限（不含）
    pub fd_sweep_limit: i32,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl Config {
    fn get_config_dir(home: Option<String>) -> PathBuf {
        if let Some(home) = home {
            PathBuf::from(home).join(".config/zako")
        } else {
            PathBuf::from("tmp")
        }
    }

    pub fn new() -> Self {
        // 优先加载环境变量
        if cfg!(debug_assertions) {
            dotenv::from_filename(".env.development").ok();
        } else {
            dotenv().ok();
        }
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 从任意键值来源构建配置，不直接读取进程环境
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let config_dir = Self::get_config_dir(lookup("HOME"));
        let mut config = Config {
            name: String::from("zako"),
            logger_level: String::from("info"),
            logger_dir: config_dir.join("logs"),
            logger_stderr: false,
            max_jobs: DEFAULT_MAX_JOBS,
            dir_stack_depth: DEFAULT_DIR_STACK_DEPTH,
            fd_sweep_limit: DEFAULT_FD_SWEEP_LIMIT,
        };

        if let Some(level) = lookup("ZAKO_LOG_LEVEL") {
            config.logger_level = level;
        }
        if let Some(dir) = lookup("ZAKO_LOG_DIR") {
            config.logger_dir = PathBuf::from(dir);
        }
        if let Some(flag) = lookup("ZAKO_LOG_STDERR") {
            config.logger_stderr = matches!(flag.as_str(), "1" | "true" | "yes");
        }
        config.max_jobs = parse_or("ZAKO_MAX_JOBS", lookup("ZAKO_MAX_JOBS"), config.max_jobs);
        config.dir_stack_depth = parse_or(
            "ZAKO_DIR_STACK_DEPTH",
            lookup("ZAKO_DIR_STACK_DEPTH"),
            config.dir_stack_depth,
        );
        // 0、1、2 是标准描述符，至少从 3 开始清理
        config.fd_sweep_limit = parse_or(
            "ZAKO_FD_SWEEP_LIMIT",
            lookup("ZAKO_FD_SWEEP_LIMIT"),
            config.fd_sweep_limit,
        )
        .max(4);

        config
    }
}

fn parse_or<T: FromStr + Copy>(key: &str, raw: Option<String>, default: T) -> T {
    match raw {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("配置 {} 的值无效: {:?}，使用默认值", key, raw);
            default
        }),
        None => default,
    }
}
