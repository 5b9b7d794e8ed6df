use crate::config::AppConfig;
use crate::errors::AppError;
use log::LevelFilter;
use std::str::FromStr;

/// 按 `sys.log_level` 初始化 env_logger，`RUST_LOG` 仍可覆盖
pub fn init_log(config: &AppConfig) -> Result<(), AppError> {
    let log_level = config.get_sys().log_level;
    let level = LevelFilter::from_str(&log_level)
        .map_err(|_| AppError::Validation(format!("invalid log level: {}", log_level)))?;
    env_logger::Builder::new()
        .filter(None, level)
        .parse_default_env()
        .try_init()
        .map_err(|e| AppError::Internal(e.to_string()))
}
