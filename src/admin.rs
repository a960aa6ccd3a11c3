/// PBX 管理 API 客户端
///
/// 无状态的请求/响应封装：每次操作前用固定管理员账号换取 Bearer token，
/// 请求体全部走 serde 结构化序列化（包括查询参数），
/// 非 2xx 状态作为错误返回而不是当成功解析
use crate::config::AdminConfig;
use crate::error::AdminError;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

/// 广播组记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastGroup {
    /// 服务端分配的 id，创建时缺省
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    /// 组名
    pub name: String,

    /// 组呼号码
    pub number: String,

    /// 成员分机号列表
    #[serde(default)]
    pub members: Vec<String>,
}

impl BroadcastGroup {
    /// 创建新的广播组记录（尚未提交到服务端）
    pub fn new(name: impl Into<String>, number: impl Into<String>, members: Vec<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            number: number.into(),
            members,
        }
    }
}

/// 分机账号记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtensionAccount {
    /// 分机号
    pub number: String,

    /// SIP 密码
    pub password: String,

    /// 显示名称
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl ExtensionAccount {
    /// 创建新的分机账号记录
    pub fn new(number: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            number: number.into(),
            password: password.into(),
            display_name: None,
        }
    }

    /// 设置显示名称
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// PBX 管理 API 客户端
pub struct AdminClient {
    config: AdminConfig,
    client: reqwest::Client,
}

impl AdminClient {
    /// 创建管理客户端
    pub fn new(config: AdminConfig) -> Result<Self, AdminError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/admintor/api{}", self.config.base_url, path)
    }

    /// 登录换取 Bearer token
    pub async fn login(&self) -> Result<String, AdminError> {
        debug!("登录 PBX 管理端: {}", self.config.base_url);

        let resp = self
            .client
            .post(self.url("/login"))
            .json(&json!({
                "username": self.config.username,
                "password": self.config.password,
            }))
            .send()
            .await?;

        let body = Self::check(resp).await?;

        // token 可能在顶层或 data 节点下
        body.get("token")
            .and_then(|v| v.as_str())
            .or_else(|| {
                body.get("data")
                    .and_then(|d| d.get("token"))
                    .and_then(|v| v.as_str())
            })
            .map(|s| s.to_string())
            .ok_or(AdminError::MissingToken)
    }

    /// 非 2xx 状态转为错误，成功时解析 JSON body
    async fn check(resp: reqwest::Response) -> Result<serde_json::Value, AdminError> {
        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            return Err(AdminError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(serde_json::from_str(&text)?)
    }

    /// 带 token 的 POST，返回响应 JSON 的字符串形式
    async fn post_json(&self, path: &str, body: &serde_json::Value) -> Result<String, AdminError> {
        // token 每次请求重新获取，不做缓存
        let token = self.login().await?;

        let resp = self
            .client
            .post(self.url(path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;

        Ok(Self::check(resp).await?.to_string())
    }

    /// 带 token 的 GET，查询参数结构化传入
    async fn get_query(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<String, AdminError> {
        let token = self.login().await?;

        let resp = self
            .client
            .get(self.url(path))
            .bearer_auth(token)
            .query(query)
            .send()
            .await?;

        Ok(Self::check(resp).await?.to_string())
    }

    /// 创建广播组
    pub async fn create_group(&self, group: &BroadcastGroup) -> Result<String, AdminError> {
        info!("创建广播组: {} ({})", group.name, group.number);
        self.post_json("/pbx/page/create", &serde_json::to_value(group)?)
            .await
    }

    /// 更新广播组
    pub async fn update_group(&self, group: &BroadcastGroup) -> Result<String, AdminError> {
        info!("更新广播组: {} ({})", group.name, group.number);
        self.post_json("/pbx/page/update", &serde_json::to_value(group)?)
            .await
    }

    /// 删除广播组
    pub async fn delete_group(&self, id: i64) -> Result<String, AdminError> {
        info!("删除广播组: {}", id);
        self.post_json("/pbx/page/delete", &json!({ "id": id })).await
    }

    /// 查询广播组
    ///
    /// name 为空时查询全部
    pub async fn query_groups(&self, name: Option<&str>) -> Result<String, AdminError> {
        let mut query = Vec::new();
        if let Some(name) = name {
            query.push(("name", name.to_string()));
        }
        self.get_query("/pbx/page/query", &query).await
    }

    /// 查询通道状态
    pub async fn query_channels(&self) -> Result<String, AdminError> {
        self.get_query("/status/channel/query", &[]).await
    }

    /// 创建分机
    pub async fn create_extension(&self, ext: &ExtensionAccount) -> Result<String, AdminError> {
        info!("创建分机: {}", ext.number);
        self.post_json("/pbx/phone/create", &serde_json::to_value(ext)?)
            .await
    }

    /// 透传 fsapi 命令
    pub async fn fsapi(&self, command: &str) -> Result<String, AdminError> {
        self.post_json("/utils/fsapi", &json!({ "command": command }))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AdminConfig {
        AdminConfig::new("http://pbx.local:8080", "admin", "secret").unwrap()
    }

    #[test]
    fn test_url_join() {
        let client = AdminClient::new(config()).unwrap();
        assert_eq!(
            client.url("/pbx/page/create"),
            "http://pbx.local:8080/admintor/api/pbx/page/create"
        );
        assert_eq!(client.url("/login"), "http://pbx.local:8080/admintor/api/login");
    }

    #[test]
    fn test_group_serialization_escapes_user_input() {
        // 含引号/非数字的输入必须产出合法 JSON（序列化负责转义）
        let group = BroadcastGroup::new(
            "早间\"广播\"",
            "no-digit",
            vec!["1001".to_string(), "1002".to_string()],
        );
        let text = serde_json::to_string(&group).unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["name"], "早间\"广播\"");
        assert_eq!(parsed["number"], "no-digit");
        assert_eq!(parsed["members"][1], "1002");
        // 创建时没有 id 字段
        assert!(parsed.get("id").is_none());
    }

    #[test]
    fn test_group_roundtrip_with_id() {
        let raw = r#"{"id":7,"name":"night","number":"900","members":[]}"#;
        let group: BroadcastGroup = serde_json::from_str(raw).unwrap();
        assert_eq!(group.id, Some(7));
        assert_eq!(group.number, "900");
    }

    #[test]
    fn test_extension_omits_empty_display_name() {
        let ext = ExtensionAccount::new("1003", "pw");
        let value = serde_json::to_value(&ext).unwrap();
        assert!(value.get("display_name").is_none());

        let named = ExtensionAccount::new("1003", "pw").with_display_name("门口话机");
        let value = serde_json::to_value(&named).unwrap();
        assert_eq!(value["display_name"], "门口话机");
    }
}
