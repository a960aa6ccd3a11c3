/// Call 模块
///
/// 提供呼出控制逻辑
///
/// ## 设计模式
///
/// 使用 trait 把"发什么"与"怎么发"分离：
///
/// - `Dialer` trait: 定义呼出行为接口（可达性探测、INVITE、挂断）
/// - `CallController`: 呼叫编排（先挂断旧呼叫、自呼保护、单呼叫槽位）
///
/// 真实实现由 `phone` 模块基于 rsipstack 提供；
/// 编排规则本身不依赖网络，可用 mock Dialer 验证
///
/// ## 使用示例
///
/// ```rust,ignore
/// use sip_bridge::call::*;
///
/// let controller = CallController::new(dialer);
/// controller.place_call(spec, Some(&own_identity)).await?;
/// controller.terminate_all().await?;
/// ```
mod controller;
mod traits;

// 导出公共接口
pub use controller::CallController;
pub use traits::{Dialer, InviteSpec};
