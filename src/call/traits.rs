/// Call traits 定义
///
/// 使用 trait 抽象呼出通道，编排逻辑与底层栈解耦
use crate::error::CallResult;
use async_trait::async_trait;

/// 呼出请求参数
#[derive(Debug, Clone)]
pub struct InviteSpec {
    /// 被叫 URI
    pub target: rsip::Uri,

    /// 是否带视频
    pub video: bool,

    /// SDP offer 内容
    pub sdp_offer: String,
}

impl InviteSpec {
    /// 根据 user/host/port 构造被叫 URI
    ///
    /// # 参数
    /// - `user`: 被叫号码或用户名
    /// - `host`: 服务器/对端地址
    /// - `port`: SIP 端口
    pub fn from_parts(
        user: &str,
        host: &str,
        port: u16,
        video: bool,
        sdp_offer: String,
    ) -> Result<Self, rsip::Error> {
        let target: rsip::Uri = format!("sip:{}@{}:{}", user, host, port).as_str().try_into()?;
        Ok(Self {
            target,
            video,
            sdp_offer,
        })
    }
}

/// 呼出通道 trait
///
/// 定义发起与终止呼叫的核心行为
#[async_trait]
pub trait Dialer: Send + Sync {
    /// 底层呼叫句柄类型
    type Call: Send + Sync;

    /// 网络可达性探测
    ///
    /// 返回 false 时呼叫前置检查失败，不会发出 INVITE
    fn network_available(&self) -> bool;

    /// 发送 INVITE
    ///
    /// # 返回
    /// - `Ok(Call)`: 呼叫句柄
    /// - `Err`: 呼叫失败
    async fn invite(&self, spec: &InviteSpec) -> CallResult<Self::Call>;

    /// 终止呼叫
    async fn terminate(&self, call: &Self::Call) -> CallResult<()>;

    /// 呼叫是否处于进行中状态（calling/early/confirmed）
    fn in_progress(&self, call: &Self::Call) -> bool;
}
