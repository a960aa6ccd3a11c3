/// 配置模块
///
/// 提供 SIP 话机与 PBX 管理 API 的配置结构
use crate::error::ConfigError;

/// 默认 User-Agent
pub const DEFAULT_USER_AGENT: &str = concat!("sip-bridge/", env!("CARGO_PKG_VERSION"));

/// 默认注册过期时间（秒）
pub const DEFAULT_REGISTER_EXPIRES: u32 = 3600;

/// SIP 话机配置
#[derive(Debug, Clone)]
pub struct PhoneConfig {
    /// 本地监听端口，0 表示随机
    pub local_port: u16,

    /// User-Agent字符串
    pub user_agent: String,

    /// 注册过期时间（秒）
    pub register_expires: u32,
}

impl Default for PhoneConfig {
    fn default() -> Self {
        Self {
            local_port: 0,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            register_expires: DEFAULT_REGISTER_EXPIRES,
        }
    }
}

impl PhoneConfig {
    /// 创建默认配置
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置 User-Agent
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// 设置本地端口
    pub fn with_local_port(mut self, port: u16) -> Self {
        self.local_port = port;
        self
    }

    /// 设置注册过期时间
    pub fn with_register_expires(mut self, expires: u32) -> Self {
        self.register_expires = expires;
        self
    }
}

/// PBX 管理 API 配置
///
/// 管理端通过固定的管理员账号获取 Bearer token
#[derive(Debug, Clone)]
pub struct AdminConfig {
    /// 基础 URL (例如 "http://pbx.example.com:8080")
    pub base_url: String,

    /// 管理员用户名
    pub username: String,

    /// 管理员密码
    pub password: String,

    /// 请求超时时间（秒）
    pub timeout_secs: u64,
}

impl AdminConfig {
    /// 创建新的管理配置
    ///
    /// base_url 末尾的 '/' 会被去除，避免拼接出双斜杠路径
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let base_url = base_url.into();
        let username = username.into();

        if base_url.is_empty() {
            return Err(ConfigError::Missing("base_url".to_string()));
        }
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Invalid(format!(
                "base_url 必须以 http:// 或 https:// 开头: {}",
                base_url
            )));
        }
        if username.is_empty() {
            return Err(ConfigError::Missing("username".to_string()));
        }

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            username,
            password: password.into(),
            timeout_secs: 15,
        })
    }

    /// 设置请求超时时间
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phone_config_defaults() {
        let config = PhoneConfig::new();
        assert_eq!(config.local_port, 0);
        assert_eq!(config.register_expires, DEFAULT_REGISTER_EXPIRES);
        assert!(config.user_agent.starts_with("sip-bridge/"));
    }

    #[test]
    fn test_phone_config_builder() {
        let config = PhoneConfig::new()
            .with_user_agent("MyPhone/2.0")
            .with_register_expires(600);
        assert_eq!(config.user_agent, "MyPhone/2.0");
        assert_eq!(config.register_expires, 600);
    }

    #[test]
    fn test_admin_config_trims_trailing_slash() {
        let config = AdminConfig::new("http://pbx.local:8080/", "admin", "secret").unwrap();
        assert_eq!(config.base_url, "http://pbx.local:8080");
    }

    #[test]
    fn test_admin_config_rejects_bad_url() {
        assert!(AdminConfig::new("pbx.local:8080", "admin", "secret").is_err());
        assert!(AdminConfig::new("", "admin", "secret").is_err());
        assert!(AdminConfig::new("http://pbx.local", "", "secret").is_err());
    }
}
