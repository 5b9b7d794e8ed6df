use crate::errors::AppError;
use config::Config;
use once_cell::sync::OnceCell;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    pub server: Option<ServerConfig>,
    pub sys: Option<SysConfig>,
    pub presence: Option<PresenceConfig>,
    pub router: Option<RouterConfig>,
    pub recommend: Option<RecommendConfig>,
}

impl AppConfig {
    /// 从配置文件 + `APP_` 前缀环境变量构建配置
    pub fn new(file: &str) -> Result<Self, AppError> {
        let config = Config::builder()
            .add_source(config::File::with_name(file).required(true))
            .add_source(config::Environment::with_prefix("APP").prefix_separator("_").separator("__"))
            .build()?;
        let cfg = config.try_deserialize::<AppConfig>()?;
        Ok(cfg)
    }

    pub fn init(file: &str) -> Result<(), AppError> {
        let instance = Self::new(file)?;
        INSTANCE
            .set(Arc::new(instance))
            .map_err(|_| AppError::Internal("AppConfig already initialized".to_string()))
    }

    pub fn get_server(&self) -> ServerConfig {
        self.server.clone().unwrap_or_default()
    }
    pub fn get_sys(&self) -> SysConfig {
        self.sys.clone().unwrap_or_default()
    }
    pub fn get_presence(&self) -> PresenceConfig {
        self.presence.clone().unwrap_or_default()
    }
    pub fn get_router(&self) -> RouterConfig {
        self.router.clone().unwrap_or_default()
    }
    pub fn get_recommend(&self) -> RecommendConfig {
        self.recommend.clone().unwrap_or_default()
    }

    /// 获取单例（未初始化时返回默认配置）
    pub fn get() -> Arc<Self> {
        INSTANCE.get_or_init(|| Arc::new(AppConfig::default())).clone()
    }
}
static INSTANCE: OnceCell<Arc<AppConfig>> = OnceCell::new();

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}
impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 9001 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SysConfig {
    //全局日志级别
    pub log_level: String,
}
impl Default for SysConfig {
    fn default() -> Self {
        Self { log_level: "info".to_string() }
    }
}

/// 在线状态 / 心跳配置
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PresenceConfig {
    /// 超过该时长没有心跳的连接会被清理
    pub heartbeat_timeout_secs: u64,
    /// 心跳清理任务的执行间隔
    pub sweep_interval_secs: u64,
    /// 在线状态广播通道容量
    pub event_capacity: usize,
}
impl Default for PresenceConfig {
    fn default() -> Self {
        Self { heartbeat_timeout_secs: 60, sweep_interval_secs: 10, event_capacity: 1024 }
    }
}
impl PresenceConfig {
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

/// 消息路由配置
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RouterConfig {
    /// 单条消息最多投递轮次，超过后标记为 failed
    pub retry_budget: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// 单个连接的投递超时
    pub delivery_timeout_ms: u64,
    /// 客户端 token 去重缓存的存活时间
    pub dedupe_ttl_secs: u64,
    pub dedupe_capacity: u64,
    /// 历史消息分页上限
    pub history_page_max: usize,
}
impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            retry_budget: 3,
            backoff_base_ms: 50,
            backoff_max_ms: 2_000,
            delivery_timeout_ms: 5_000,
            dedupe_ttl_secs: 300,
            dedupe_capacity: 100_000,
            history_page_max: 100,
        }
    }
}
impl RouterConfig {
    /// 第 `attempt` 次失败后的退避时长（指数增长，有上限）
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let ms = self.backoff_base_ms.saturating_mul(1u64 << exp).min(self.backoff_max_ms);
        Duration::from_millis(ms)
    }
    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }
    pub fn dedupe_ttl(&self) -> Duration {
        Duration::from_secs(self.dedupe_ttl_secs)
    }
}

/// 好友推荐配置
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RecommendConfig {
    pub cache_capacity: u64,
    pub default_limit: usize,
    pub max_limit: usize,
}
impl Default for RecommendConfig {
    fn default() -> Self {
        Self { cache_capacity: 10_000, default_limit: 10, max_limit: 100 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_and_caps() {
        let cfg = RouterConfig { backoff_base_ms: 100, backoff_max_ms: 350, ..Default::default() };
        assert_eq!(cfg.backoff(1), Duration::from_millis(100));
        assert_eq!(cfg.backoff(2), Duration::from_millis(200));
        assert_eq!(cfg.backoff(3), Duration::from_millis(350));
        assert_eq!(cfg.backoff(40), Duration::from_millis(350));
    }

    #[test]
    fn test_missing_sections_fall_back_to_defaults() {
        let cfg: AppConfig = serde_json::from_str(r#"{"presence":{"heartbeat_timeout_secs":5}}"#).unwrap();
        let presence = cfg.get_presence();
        assert_eq!(presence.heartbeat_timeout(), Duration::from_secs(5));
        assert_eq!(presence.sweep_interval_secs, 10);
        assert_eq!(cfg.get_router().retry_budget, 3);
        assert_eq!(cfg.get_recommend().default_limit, 10);
    }
}
