// 声明所有模块
pub mod account;
pub mod admin;
pub mod call;
pub mod config;
pub mod error;
pub mod events;
pub mod phone;
pub mod utils;

/// 重新导出thiserror错误类型
pub use crate::error::{AdminError, BridgeError, CallError, CallResult, ConfigError};

/// 主要API重新导出，简化使用
pub use crate::account::RegistrationSession;
pub use crate::admin::{AdminClient, BroadcastGroup, ExtensionAccount};
pub use crate::config::{AdminConfig, PhoneConfig};
pub use crate::events::{CallState, PhoneEvent, RegistrationState};
pub use crate::phone::SipPhone;
pub use crate::utils as utils_mod;

/// SIP Bridge库的版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 便捷函数：启动话机会话并完成注册
pub async fn create_registered_phone(
    server: &str,
    user: &str,
    password: &str,
) -> Result<SipPhone, BridgeError> {
    let phone = SipPhone::start(PhoneConfig::new())
        .await
        .map_err(|e| BridgeError::RegistrationFailed(e.to_string()))?;

    phone
        .register(None, server, user, password)
        .await
        .map_err(|e| BridgeError::RegistrationFailed(e.to_string()))?;

    Ok(phone)
}

/// 便捷函数：快速创建 PBX 管理客户端
pub fn create_admin_client(
    base_url: &str,
    username: &str,
    password: &str,
) -> Result<AdminClient, BridgeError> {
    let config = AdminConfig::new(base_url, username, password)?;
    Ok(AdminClient::new(config).map_err(BridgeError::Admin)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_create_admin_client() {
        assert!(create_admin_client("http://pbx.local:8080", "admin", "secret").is_ok());
        assert!(create_admin_client("pbx.local", "admin", "secret").is_err());
    }
}
