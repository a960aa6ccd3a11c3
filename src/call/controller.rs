/// 呼叫编排实现
///
/// 单呼叫槽位：任意时刻最多一路呼出。
/// 发起新呼叫前总是先终止旧呼叫（last call wins）
use super::traits::{Dialer, InviteSpec};
use crate::error::{CallError, CallResult};
use crate::utils::weak_address_equal;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// 呼叫控制器
///
/// 持有当前呼叫句柄，编排顺序：
/// 可达性检查 -> 终止旧呼叫 -> 自呼保护 -> INVITE
pub struct CallController<D: Dialer> {
    dialer: D,

    /// 当前呼叫槽位，每次新呼叫覆盖
    current: Mutex<Option<D::Call>>,
}

impl<D: Dialer> CallController<D> {
    /// 创建呼叫控制器
    pub fn new(dialer: D) -> Self {
        Self {
            dialer,
            current: Mutex::new(None),
        }
    }

    /// 访问底层呼出通道
    pub fn dialer(&self) -> &D {
        &self.dialer
    }

    /// 发起呼叫
    ///
    /// # 参数
    /// - `spec`: 呼出请求
    /// - `own_identity`: 当前注册身份，用于自呼保护
    ///
    /// # 返回
    /// - `Ok(true)`: INVITE 已发出
    /// - `Ok(false)`: 命中自呼保护，未发 INVITE
    /// - `Err(CallError::NetworkUnreachable)`: 网络不可达，呼叫状态未被改动
    pub async fn place_call(
        &self,
        spec: InviteSpec,
        own_identity: Option<&rsip::Uri>,
    ) -> CallResult<bool> {
        // 前置检查：网络不可达时直接失败，不触碰任何呼叫状态
        if !self.dialer.network_available() {
            warn!("网络不可达，拒绝发起呼叫: {}", spec.target);
            return Err(CallError::NetworkUnreachable);
        }

        let mut slot = self.current.lock().await;

        // 先终止进行中的呼叫
        if let Some(prev) = slot.take() {
            info!("存在进行中的呼叫，先行终止");
            if let Err(e) = self.dialer.terminate(&prev).await {
                warn!("终止旧呼叫失败: {}", e);
            }
        }

        // 自呼保护：目标与本方注册身份弱等时不发 INVITE
        if let Some(own) = own_identity {
            if weak_address_equal(&spec.target, own) {
                warn!("呼叫目标即本方身份，忽略: {}", spec.target);
                return Ok(false);
            }
        }

        info!("📞 发起呼叫到: {} (video: {})", spec.target, spec.video);
        let call = self.dialer.invite(&spec).await?;
        *slot = Some(call);

        Ok(true)
    }

    /// 终止当前呼叫
    ///
    /// 仅当呼叫处于进行中状态时才向对端发送终止请求；
    /// 底层失败会记录日志并原样上抛，槽位总是被清空
    pub async fn terminate_all(&self) -> CallResult<()> {
        let mut slot = self.current.lock().await;

        if let Some(call) = slot.take() {
            if self.dialer.in_progress(&call) {
                if let Err(e) = self.dialer.terminate(&call).await {
                    error!("挂断失败: {}", e);
                    return Err(e);
                }
                info!("当前呼叫已挂断");
            }
        }

        Ok(())
    }

    /// 是否存在当前呼叫
    pub async fn has_active_call(&self) -> bool {
        self.current.lock().await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Mutex as StdMutex;

    /// 记录操作顺序的 mock 呼出通道
    #[derive(Default)]
    struct MockDialer {
        online: AtomicBool,
        progressing: AtomicBool,
        fail_terminate: AtomicBool,
        next_id: AtomicU32,
        log: StdMutex<Vec<String>>,
    }

    impl MockDialer {
        fn online() -> Self {
            let dialer = Self::default();
            dialer.online.store(true, Ordering::SeqCst);
            dialer.progressing.store(true, Ordering::SeqCst);
            dialer
        }

        fn events(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Dialer for MockDialer {
        type Call = u32;

        fn network_available(&self) -> bool {
            self.online.load(Ordering::SeqCst)
        }

        async fn invite(&self, spec: &InviteSpec) -> CallResult<u32> {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            self.log
                .lock()
                .unwrap()
                .push(format!("invite:{}:{}", id, spec.target));
            Ok(id)
        }

        async fn terminate(&self, call: &u32) -> CallResult<()> {
            self.log.lock().unwrap().push(format!("terminate:{}", call));
            if self.fail_terminate.load(Ordering::SeqCst) {
                return Err(CallError::invalid_target("terminate refused"));
            }
            Ok(())
        }

        fn in_progress(&self, _call: &u32) -> bool {
            self.progressing.load(Ordering::SeqCst)
        }
    }

    fn spec(target: &str) -> InviteSpec {
        InviteSpec {
            target: target.try_into().unwrap(),
            video: false,
            sdp_offer: String::new(),
        }
    }

    #[tokio::test]
    async fn test_new_call_terminates_prior_first() {
        let controller = CallController::new(MockDialer::online());

        assert!(controller.place_call(spec("sip:1002@pbx.local"), None).await.unwrap());
        assert!(controller.place_call(spec("sip:1003@pbx.local"), None).await.unwrap());

        let events = controller.dialer().events();
        assert_eq!(events[0], "invite:0:sip:1002@pbx.local");
        // 第二次呼叫前必须先终止第一路
        assert_eq!(events[1], "terminate:0");
        assert_eq!(events[2], "invite:1:sip:1003@pbx.local");
    }

    #[tokio::test]
    async fn test_self_call_is_noop() {
        let controller = CallController::new(MockDialer::online());
        let own: rsip::Uri = "sip:1001@pbx.local:5060".try_into().unwrap();

        let issued = controller
            .place_call(spec("sip:1001@pbx.local"), Some(&own))
            .await
            .unwrap();

        assert!(!issued);
        assert!(controller.dialer().events().is_empty());
        assert!(!controller.has_active_call().await);
    }

    #[tokio::test]
    async fn test_unreachable_network_issues_nothing() {
        let dialer = MockDialer::online();
        dialer.online.store(false, Ordering::SeqCst);
        let controller = CallController::new(dialer);

        // 先塞入一路"进行中"的呼叫
        controller.dialer().online.store(true, Ordering::SeqCst);
        controller.place_call(spec("sip:1002@pbx.local"), None).await.unwrap();
        controller.dialer().online.store(false, Ordering::SeqCst);

        let result = controller.place_call(spec("sip:1003@pbx.local"), None).await;
        assert!(matches!(result, Err(CallError::NetworkUnreachable)));

        // 未发出新 INVITE，旧呼叫也未被终止
        let events = controller.dialer().events();
        assert_eq!(events, vec!["invite:0:sip:1002@pbx.local"]);
        assert!(controller.has_active_call().await);
    }

    #[tokio::test]
    async fn test_terminate_all_only_when_progressing() {
        let controller = CallController::new(MockDialer::online());
        controller.place_call(spec("sip:1002@pbx.local"), None).await.unwrap();

        // 呼叫已不在进行中状态，不再向对端发终止请求
        controller.dialer().progressing.store(false, Ordering::SeqCst);
        controller.terminate_all().await.unwrap();

        let events = controller.dialer().events();
        assert_eq!(events, vec!["invite:0:sip:1002@pbx.local"]);
        assert!(!controller.has_active_call().await);
    }

    #[tokio::test]
    async fn test_terminate_all_propagates_failure() {
        let controller = CallController::new(MockDialer::online());
        controller.place_call(spec("sip:1002@pbx.local"), None).await.unwrap();

        controller.dialer().fail_terminate.store(true, Ordering::SeqCst);
        let result = controller.terminate_all().await;

        assert!(result.is_err());
        // 失败后槽位依然被清空，不会反复挂断同一路
        assert!(!controller.has_active_call().await);
    }

    #[tokio::test]
    async fn test_terminate_all_idle_is_noop() {
        let controller = CallController::new(MockDialer::online());
        controller.terminate_all().await.unwrap();
        assert!(controller.dialer().events().is_empty());
    }
}
