/// 注册会话模块
///
/// 维护当前活跃的注册会话。底层栈同一时刻只保留一组凭证与代理配置：
/// 安装新会话前总是清空旧会话（replace-all），id 仅用于注销时的关联
use uuid::Uuid;

/// 注册会话记录
///
/// {id, 服务器地址, 身份, 凭证} 的绑定
#[derive(Debug, Clone)]
pub struct RegistrationSession {
    /// 会话 id（调用方提供或自动生成）
    pub id: String,

    /// 服务器地址 host[:port]
    pub server_address: String,

    /// SIP 用户名
    pub username: String,

    /// SIP 密码
    pub password: String,

    /// 是否发布 presence 状态
    pub publish: bool,

    /// 是否启用 AVPF（兼容性考虑默认关闭）
    pub avpf: bool,
}

impl RegistrationSession {
    /// 创建新的注册会话
    ///
    /// id 为 None 时自动生成 UUID v4
    pub fn new(
        id: Option<String>,
        server_address: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            id: id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            server_address: server_address.into(),
            username: username.into(),
            password: password.into(),
            publish: true,
            avpf: false,
        }
    }

    /// 本方身份 URI 字符串，形如 sip:user@server
    pub fn identity(&self) -> String {
        format!("sip:{}@{}", self.username, self.server_address)
    }

    /// 解析后的身份 URI
    pub fn identity_uri(&self) -> Result<rsip::Uri, rsip::Error> {
        self.identity().as_str().try_into()
    }

    /// 注册目标 URI 字符串，形如 sip:server
    pub fn server_uri(&self) -> Result<rsip::Uri, rsip::Error> {
        format!("sip:{}", self.server_address).as_str().try_into()
    }
}

/// 注册会话表
///
/// 最多持有一个活跃会话；安装新会话会移除并返回旧会话，
/// 供调用方向服务器发送 expires=0 注销
#[derive(Debug, Default)]
pub struct AccountRegistry {
    active: Option<RegistrationSession>,
}

impl AccountRegistry {
    /// 创建空表
    pub fn new() -> Self {
        Self::default()
    }

    /// 安装新会话，返回被替换下来的旧会话
    pub fn install(&mut self, session: RegistrationSession) -> Option<RegistrationSession> {
        self.active.replace(session)
    }

    /// 移除会话
    ///
    /// - `Some(id)`: 仅当 id 与活跃会话匹配时移除；不匹配则不做任何事
    /// - `None`: 移除全部（即活跃会话）
    pub fn remove(&mut self, id: Option<&str>) -> Option<RegistrationSession> {
        match id {
            Some(id) => {
                if self.active.as_ref().map(|s| s.id.as_str()) == Some(id) {
                    self.active.take()
                } else {
                    None
                }
            }
            None => self.active.take(),
        }
    }

    /// 当前活跃会话
    pub fn active(&self) -> Option<&RegistrationSession> {
        self.active.as_ref()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.active.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(id: &str, user: &str) -> RegistrationSession {
        RegistrationSession::new(Some(id.to_string()), "pbx.local:5060", user, "secret")
    }

    #[test]
    fn test_generated_id_is_uuid() {
        let s = RegistrationSession::new(None, "pbx.local", "1001", "secret");
        assert_eq!(s.id.len(), 36);
        assert!(s.publish);
        assert!(!s.avpf);
    }

    #[test]
    fn test_identity_format() {
        let s = session("a", "1001");
        assert_eq!(s.identity(), "sip:1001@pbx.local:5060");
        assert!(s.identity_uri().is_ok());
        assert!(s.server_uri().is_ok());
    }

    #[test]
    fn test_register_twice_keeps_single_session() {
        let mut registry = AccountRegistry::new();

        assert!(registry.install(session("a", "1001")).is_none());
        let replaced = registry.install(session("b", "1002"));

        // 第二次注册后只剩一组凭证，且是第二次的身份
        assert_eq!(replaced.unwrap().username, "1001");
        assert_eq!(registry.active().unwrap().username, "1002");
        assert_eq!(registry.active().unwrap().id, "b");
    }

    #[test]
    fn test_remove_unknown_id_is_noop() {
        let mut registry = AccountRegistry::new();
        registry.install(session("a", "1001"));

        assert!(registry.remove(Some("missing")).is_none());
        // 活跃会话不受影响
        assert_eq!(registry.active().unwrap().id, "a");
    }

    #[test]
    fn test_remove_matching_id() {
        let mut registry = AccountRegistry::new();
        registry.install(session("a", "1001"));

        let removed = registry.remove(Some("a"));
        assert_eq!(removed.unwrap().id, "a");
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_all_without_id() {
        let mut registry = AccountRegistry::new();
        registry.install(session("a", "1001"));

        assert!(registry.remove(None).is_some());
        assert!(registry.is_empty());
        // 空表上的移除是 no-op
        assert!(registry.remove(None).is_none());
    }
}
