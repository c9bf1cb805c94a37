//! 配置系统
//! 从环境变量加载所有配置（前缀 CRM_，层级分隔符 __）

use config::{Config, ConfigError, Environment};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// 后端 REST 接口根地址，例如 "http://localhost:8000/api"
    pub base_url: String,
    /// 请求超时时间（秒），超时由传输层负责
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// 查询结果保持新鲜的时间（秒）
    pub stale_time_secs: u64,
    /// 公共数据（下拉选项）保持新鲜的时间（秒）
    pub common_data_stale_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListConfig {
    /// 搜索输入防抖时间（毫秒）
    pub search_debounce_ms: u64,
    /// 默认每页条数
    pub default_page_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// 本地持久化目录
    pub dir: String,
    /// 会话记录键名
    pub session_key: String,
    /// 用户资料缓存键名
    pub profile_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeConfig {
    /// 权限变更频道前缀，完整频道名为 "<prefix>.<userId>"
    pub channel_prefix: String,
    /// 事件缓冲区大小
    pub event_buffer: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别: trace, debug, info, warn, error
    pub level: String,
    /// 日志格式: json, pretty
    pub format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub cache: CacheConfig,
    pub list: ListConfig,
    pub storage: StorageConfig,
    pub realtime: RealtimeConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// 从环境变量加载配置
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut settings = Config::builder();

        // 添加默认配置
        settings = settings
            .set_default("api.base_url", "http://localhost:8000/api")?
            .set_default("api.timeout_secs", 30)?
            .set_default("cache.stale_time_secs", 30)?
            .set_default("cache.common_data_stale_secs", 300)?
            .set_default("list.search_debounce_ms", 500)?
            .set_default("list.default_page_size", 10)?
            .set_default("storage.dir", ".crm-admin")?
            .set_default("storage.session_key", "auth-storage")?
            .set_default("storage.profile_key", "user-storage")?
            .set_default("realtime.channel_prefix", "user-permissions-changed")?
            .set_default("realtime.event_buffer", 64)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?;

        // 从环境变量加载配置（前缀为 CRM_）
        settings = settings.add_source(
            Environment::with_prefix("CRM")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = settings.build()?.try_deserialize()?;

        // 验证配置
        config.validate()?;

        Ok(config)
    }

    /// 验证配置合法性
    pub fn validate(&self) -> Result<(), ConfigError> {
        // 验证接口地址
        let url = url::Url::parse(&self.api.base_url)
            .map_err(|e| ConfigError::Message(format!("Invalid api.base_url: {}", e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Message(
                "api.base_url must use http or https".to_string(),
            ));
        }

        if self.api.timeout_secs == 0 || self.api.timeout_secs > 300 {
            return Err(ConfigError::Message(
                "api.timeout_secs must be between 1 and 300".to_string(),
            ));
        }

        if self.list.default_page_size == 0 || self.list.default_page_size > 500 {
            return Err(ConfigError::Message(
                "list.default_page_size must be between 1 and 500".to_string(),
            ));
        }

        if self.storage.session_key == self.storage.profile_key {
            return Err(ConfigError::Message(
                "storage.session_key and storage.profile_key must differ".to_string(),
            ));
        }

        if self.realtime.event_buffer == 0 {
            return Err(ConfigError::Message(
                "realtime.event_buffer must be > 0".to_string(),
            ));
        }

        // 验证日志级别
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::Message(format!(
                    "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                    self.logging.level
                )))
            }
        }

        // 验证日志格式
        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" => {}
            _ => {
                return Err(ConfigError::Message(format!(
                    "Invalid log format: {}. Must be one of: json, pretty",
                    self.logging.format
                )))
            }
        }

        Ok(())
    }

    pub fn stale_time(&self) -> Duration {
        Duration::from_secs(self.cache.stale_time_secs)
    }

    pub fn common_data_stale_time(&self) -> Duration {
        Duration::from_secs(self.cache.common_data_stale_secs)
    }

    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.list.search_debounce_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }
}
