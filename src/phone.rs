/// SIP 话机核心模块
///
/// 提供注册、呼叫、来电接听与事件转发的会话对象封装。
/// 会话对象由调用方持有，不使用进程级单例；
/// 底层栈的事件循环由会话自有的后台任务驱动，随 start/stop 启停
use crate::account::{AccountRegistry, RegistrationSession};
use crate::call::{CallController, Dialer, InviteSpec};
use crate::config::PhoneConfig;
use crate::error::{CallError, CallResult};
use crate::events::{CallState, EventHub, RegistrationState};
use crate::utils;
use async_trait::async_trait;
use rsip::prelude::{HeadersExt, ToTypedHeader};
use rsipstack::{
    dialog::{
        authenticate::Credential,
        client_dialog::ClientInviteDialog,
        dialog::{DialogState, TerminatedReason},
        dialog_layer::DialogLayer,
        invitation::InviteOption,
        registration::Registration,
        server_dialog::ServerInviteDialog,
    },
    transaction::Endpoint,
    transport::{udp::UdpConnection, TransportLayer},
    EndpointBuilder,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// SDP offer 中使用的本地音频端口
const RTP_AUDIO_PORT: u16 = 4000;

/// 基于 rsipstack 的呼出通道
///
/// 呼出身份取自当前活跃的注册会话；未注册时以本地联系地址匿名呼出
struct StackDialer {
    dialog_layer: Arc<DialogLayer>,
    state_sender: UnboundedSender<DialogState>,
    accounts: Arc<Mutex<AccountRegistry>>,

    /// 本地绑定的实际地址，用于构造 Contact
    local_addr: String,
}

impl StackDialer {
    fn contact_uri(&self, user: &str) -> Result<rsip::Uri, rsip::Error> {
        format!("sip:{}@{}", user, self.local_addr).as_str().try_into()
    }
}

#[async_trait]
impl Dialer for StackDialer {
    type Call = ClientInviteDialog;

    fn network_available(&self) -> bool {
        utils::network_available()
    }

    async fn invite(&self, spec: &InviteSpec) -> CallResult<ClientInviteDialog> {
        // 呼出身份与凭证取自活跃注册会话
        let (caller, contact, credential) = {
            let accounts = self.accounts.lock().await;
            match accounts.active() {
                Some(session) => (
                    session.identity_uri()?,
                    self.contact_uri(&session.username)?,
                    Some(Credential {
                        username: session.username.clone(),
                        password: session.password.clone(),
                        realm: None, // 将从 401/407 响应自动提取
                    }),
                ),
                None => (
                    self.contact_uri("bridge")?,
                    self.contact_uri("bridge")?,
                    None,
                ),
            }
        };

        info!("Call信息 源：{} -> 目标：{}", caller, spec.target);

        // 生成呼叫 Call-ID（直接使用 UUID 字符串）
        let call_id_string = Uuid::new_v4().to_string();
        debug!("生成呼叫 Call-ID: {}", call_id_string);

        let invite_opt = InviteOption {
            caller,
            callee: spec.target.clone(),
            contact,
            credential,
            content_type: Some("application/sdp".to_string()),
            offer: Some(spec.sdp_offer.as_bytes().to_vec()),
            call_id: Some(call_id_string),
            ..Default::default()
        };

        // 发送 INVITE
        let (dialog, response) = self
            .dialog_layer
            .do_invite(invite_opt, self.state_sender.clone())
            .await?;

        let dialog_id = dialog.id();
        info!(
            "✅ INVITE 请求已发送，Dialog -> Call-ID: {} From-Tag: {} To-Tag: {}",
            dialog_id.call_id, dialog_id.local_tag, dialog_id.remote_tag
        );

        if let Some(resp) = response {
            if resp.status_code != rsip::StatusCode::OK {
                return Err(CallError::CallRejected {
                    code: resp.status_code.code(),
                    phrase: resp.status_code.to_string(),
                });
            }
        }

        Ok(dialog)
    }

    async fn terminate(&self, call: &ClientInviteDialog) -> CallResult<()> {
        call.bye().await?;
        Ok(())
    }

    fn in_progress(&self, call: &ClientInviteDialog) -> bool {
        !matches!(call.state(), DialogState::Terminated(..))
    }
}

/// SIP 话机会话
///
/// 对外暴露的操作面：注册/注销、呼叫/挂断/接听、事件处理器注册。
/// 内部共享状态均由锁保护，register/call/事件派发可以并发调用
pub struct SipPhone {
    config: PhoneConfig,
    endpoint: Endpoint,
    cancel_token: CancellationToken,
    accounts: Arc<Mutex<AccountRegistry>>,
    calls: CallController<StackDialer>,
    incoming: Arc<Mutex<Option<ServerInviteDialog>>>,
    events: Arc<EventHub>,

    /// 本地绑定的实际地址
    local_addr: String,
}

impl SipPhone {
    /// 启动话机会话
    ///
    /// 创建传输层与端点，并启动三个后台任务：
    /// 端点 serve 循环、传入请求处理、对话状态事件循环
    pub async fn start(config: PhoneConfig) -> CallResult<Self> {
        let cancel_token = CancellationToken::new();

        // 获取本地IP
        let local_ip = utils::get_first_non_loopback_interface()
            .map_err(|_| CallError::NetworkUnreachable)?;
        info!(
            "检测到本地出口IP: {} ({})",
            local_ip,
            if local_ip.is_ipv6() { "IPv6" } else { "IPv4" }
        );

        // 创建传输层
        let transport_layer = TransportLayer::new(cancel_token.clone());

        let local_addr = format!("{}:{}", local_ip, config.local_port)
            .parse()
            .map_err(|e| CallError::invalid_config(format!("local_addr: {}", e)))?;
        let connection =
            UdpConnection::create_connection(local_addr, None, Some(cancel_token.child_token()))
                .await?;
        transport_layer.add_transport(connection.into());

        // 创建端点
        let mut endpoint_builder = EndpointBuilder::new();
        endpoint_builder
            .with_cancel_token(cancel_token.clone())
            .with_transport_layer(transport_layer)
            .with_user_agent(&config.user_agent);

        let endpoint = endpoint_builder.build();

        let actual_local_addr = endpoint
            .get_addrs()
            .first()
            .ok_or(CallError::NotInitialized)?
            .addr
            .to_string();
        info!("本地绑定的实际地址: {}", actual_local_addr);

        // 启动端点服务
        let endpoint_for_serve = endpoint.inner.clone();
        tokio::spawn(async move {
            endpoint_for_serve.serve().await.ok();
        });

        // 创建对话层与状态事件通道
        let dialog_layer = Arc::new(DialogLayer::new(endpoint.inner.clone()));
        let (state_sender, state_receiver) = dialog_layer.new_dialog_state_channel();

        let accounts = Arc::new(Mutex::new(AccountRegistry::new()));
        let incoming = Arc::new(Mutex::new(None));
        let events = Arc::new(EventHub::new());

        // 启动传入请求处理
        let contact: rsip::Uri = format!("sip:bridge@{}", actual_local_addr)
            .as_str()
            .try_into()?;
        Self::start_incoming_handler(
            endpoint.incoming_transactions()?,
            dialog_layer.clone(),
            state_sender.clone(),
            incoming.clone(),
            events.clone(),
            contact,
            cancel_token.clone(),
        );

        // 启动对话状态事件循环
        Self::start_state_event_loop(state_receiver, events.clone(), cancel_token.clone());

        let dialer = StackDialer {
            dialog_layer,
            state_sender,
            accounts: accounts.clone(),
            local_addr: actual_local_addr.clone(),
        };

        Ok(Self {
            config,
            endpoint,
            cancel_token,
            accounts,
            calls: CallController::new(dialer),
            incoming,
            events,
            local_addr: actual_local_addr,
        })
    }

    /// 传入请求处理器
    ///
    /// 对话内请求交给已匹配的对话处理；新 INVITE 建立来电对话并派发事件；
    /// MESSAGE 回 200 后转成事件；其余方法回 405
    fn start_incoming_handler(
        mut incoming: rsipstack::transaction::TransactionReceiver,
        dialog_layer: Arc<DialogLayer>,
        state_sender: UnboundedSender<DialogState>,
        incoming_slot: Arc<Mutex<Option<ServerInviteDialog>>>,
        events: Arc<EventHub>,
        contact: rsip::Uri,
        cancel_token: CancellationToken,
    ) {
        tokio::spawn(async move {
            while let Some(mut transaction) = tokio::select! {
                tx = incoming.recv() => tx,
                _ = cancel_token.cancelled() => None,
            } {
                let method = transaction.original.method;
                debug!("收到传入请求: {}", method);

                if let Some(mut dialog) = dialog_layer.match_dialog(&transaction) {
                    tokio::spawn(async move {
                        if let Err(e) = dialog.handle(&mut transaction).await {
                            error!("处理 {} 请求失败: {}", method, e);
                        }
                    });
                    continue;
                }

                match method {
                    rsip::Method::Invite => {
                        let from = transaction
                            .original
                            .from_header()
                            .ok()
                            .and_then(|h| h.typed().ok())
                            .map(|h| h.uri.to_string())
                            .unwrap_or_default();

                        match dialog_layer.get_or_create_server_invite(
                            &transaction,
                            state_sender.clone(),
                            None,
                            Some(contact.clone()),
                        ) {
                            Ok(mut dialog) => {
                                info!("收到来电: {}", from);
                                *incoming_slot.lock().await = Some(dialog.clone());
                                events.call_changed(
                                    CallState::IncomingReceived,
                                    format!("来电: {}", from),
                                );
                                tokio::spawn(async move {
                                    if let Err(e) = dialog.handle(&mut transaction).await {
                                        error!("处理 INVITE 请求失败: {}", e);
                                    }
                                });
                            }
                            Err(e) => {
                                warn!("创建来电对话失败: {}", e);
                                transaction
                                    .reply(rsip::StatusCode::ServerInternalError)
                                    .await
                                    .ok();
                            }
                        }
                    }
                    rsip::Method::Message => {
                        let from = transaction
                            .original
                            .from_header()
                            .ok()
                            .and_then(|h| h.typed().ok())
                            .map(|h| h.uri.to_string())
                            .unwrap_or_default();
                        let body = String::from_utf8_lossy(&transaction.original.body).to_string();

                        transaction.reply(rsip::StatusCode::OK).await.ok();
                        info!("收到消息: {} -> {}", from, body);
                        events.message_received(from, body);
                    }
                    rsip::Method::Options => {
                        transaction.reply(rsip::StatusCode::OK).await.ok();
                    }
                    _ => {
                        warn!("未找到匹配的对话: {}", method);
                        transaction
                            .reply(rsip::StatusCode::MethodNotAllowed)
                            .await
                            .ok();
                    }
                }
            }
        });
    }

    /// 对话状态事件循环
    ///
    /// 把底层对话状态翻译成呼叫状态事件派发出去
    fn start_state_event_loop(
        mut receiver: UnboundedReceiver<DialogState>,
        events: Arc<EventHub>,
        cancel_token: CancellationToken,
    ) {
        tokio::spawn(async move {
            loop {
                let state = tokio::select! {
                    s = receiver.recv() => match s {
                        Some(s) => s,
                        None => break,
                    },
                    _ = cancel_token.cancelled() => break,
                };

                if let Some((call_state, message)) = translate_dialog_state(&state) {
                    events.call_changed(call_state, message);
                }
            }
        });
    }

    /// 注册到 SIP 服务器
    ///
    /// 总是先清空已有的注册会话（并尽力向服务器注销旧身份），
    /// 再安装新的 {id, 服务器, 身份, 凭证} 绑定并执行 REGISTER。
    ///
    /// # 返回
    /// 会话 id（调用方提供的或自动生成的），供后续 unregister 关联
    pub async fn register(
        &self,
        id: Option<String>,
        server_address: &str,
        username: &str,
        password: &str,
    ) -> CallResult<String> {
        let session = RegistrationSession::new(id, server_address, username, password);
        let session_id = session.id.clone();

        info!("正在注册到 SIP 服务器: {}", session.identity());

        // 清空旧会话，同一时刻只保留一组凭证与代理配置
        let replaced = self.accounts.lock().await.install(session.clone());
        if let Some(old) = replaced {
            info!("移除旧注册会话: {}", old.identity());
            if let Err(e) = self.send_register(&old, Some(0)).await {
                warn!("注销旧身份失败（忽略）: {}", e);
            }
        }

        self.events.registration_changed(
            RegistrationState::Progress,
            format!("REGISTER {}", session.identity()),
        );

        let expires = self.config.register_expires;
        let response = match self.send_register(&session, Some(expires)).await {
            Ok(response) => response,
            Err(e) => {
                self.events
                    .registration_changed(RegistrationState::Failed, e.to_string());
                return Err(e);
            }
        };

        if response.status_code == rsip::StatusCode::OK {
            info!("✔ 注册成功,响应状态: {}", response.status_code);
            self.events
                .registration_changed(RegistrationState::Ok, response.status_code.to_string());
        } else {
            warn!("注册响应: {}", response.status_code);
            self.events
                .registration_changed(RegistrationState::Failed, response.status_code.to_string());

            // 根据状态码返回适当的错误
            match response.status_code {
                rsip::StatusCode::Unauthorized => {
                    return Err(CallError::authentication_failed("认证失败"));
                }
                rsip::StatusCode::NotFound => {
                    return Err(CallError::invalid_target("注册目标未找到"));
                }
                rsip::StatusCode::ServerInternalError | rsip::StatusCode::ServiceUnavailable => {
                    let uri = session.server_uri()?;
                    let port = uri.host_with_port.port.unwrap_or_else(|| 5060.into());
                    return Err(CallError::NetworkConnection {
                        host: uri.host_with_port.host.to_string(),
                        port: port.into(),
                    });
                }
                _ => {
                    return Err(CallError::Other(
                        format!(
                            "注册失败: {} {}",
                            response.status_code,
                            String::from_utf8_lossy(&response.body)
                        )
                        .into(),
                    ));
                }
            }
        }

        Ok(session_id)
    }

    /// 从 SIP 服务器注销
    ///
    /// - `Some(id)`: 仅注销 id 匹配的会话，不匹配时为 no-op
    /// - `None`: 注销全部
    ///
    /// 没有任何注册时同样是 no-op
    pub async fn unregister(&self, id: Option<&str>) -> CallResult<()> {
        let removed = self.accounts.lock().await.remove(id);

        let session = match removed {
            Some(session) => session,
            None => {
                info!("没有匹配的注册会话，注销跳过: {:?}", id);
                return Ok(());
            }
        };

        info!("正在从SIP服务器注销: {}", session.identity());

        // 执行注销（expires=0表示注销）
        let response = self.send_register(&session, Some(0)).await?;

        if response.status_code == rsip::StatusCode::OK {
            info!("✔ 注销成功,响应状态: {}", response.status_code);
        } else {
            warn!("注销响应: {}", response.status_code);
        }

        self.events.registration_changed(
            RegistrationState::Cleared,
            format!("UNREGISTER {}", session.identity()),
        );

        Ok(())
    }

    /// 执行一次 REGISTER 交互
    async fn send_register(
        &self,
        session: &RegistrationSession,
        expires: Option<u32>,
    ) -> CallResult<rsip::Response> {
        // 构造注册URI（移除 transport 参数，registrar 不需要）
        let mut register_uri = session.server_uri()?;
        register_uri
            .params
            .retain(|p| !matches!(p, rsip::Param::Transport(_)));

        debug!("Register URI: {}, expires: {:?}", register_uri, expires);

        // 创建认证凭证
        let credential = Credential {
            username: session.username.clone(),
            password: session.password.clone(),
            realm: None, // 将从 401 响应自动提取
        };

        let mut registration = Registration::new(self.endpoint.inner.clone(), Some(credential));
        registration.call_id = utils::make_call_id(None);

        let response = registration.register(register_uri, expires).await?;
        Ok(response)
    }

    /// 发起呼叫
    ///
    /// 前置检查网络可达性；已有呼叫会先被终止；
    /// 目标与本方注册身份弱等时不发 INVITE（自呼保护）
    ///
    /// # 参数
    /// - `user`: 被叫号码或用户名
    /// - `host`: 对端地址
    /// - `port`: SIP 端口
    /// - `video`: 是否带视频
    ///
    /// # 返回
    /// - `Ok(true)`: INVITE 已发出
    /// - `Ok(false)`: 命中自呼保护
    pub async fn call(&self, user: &str, host: &str, port: u16, video: bool) -> CallResult<bool> {
        let (own_identity, avpf) = {
            let accounts = self.accounts.lock().await;
            match accounts.active() {
                Some(session) => (Some(session.identity_uri()?), session.avpf),
                None => (None, false),
            }
        };

        let local_ip = utils::get_first_non_loopback_interface()
            .map_err(|_| CallError::NetworkUnreachable)?;
        let sdp_offer = utils::build_sdp_offer(&local_ip, RTP_AUDIO_PORT, video, avpf);

        let spec = InviteSpec::from_parts(user, host, port, video, sdp_offer)?;

        match self.calls.place_call(spec, own_identity.as_ref()).await {
            Ok(issued) => Ok(issued),
            Err(e) => {
                self.events
                    .call_changed(CallState::Error, format!("呼叫失败: {}", e));
                Err(e)
            }
        }
    }

    /// 挂断当前呼叫
    ///
    /// 仅当呼叫处于进行中状态时才向对端发送 BYE；底层失败原样上抛
    pub async fn terminate_all(&self) -> CallResult<()> {
        let result = self.calls.terminate_all().await;
        if result.is_ok() {
            self.events.call_changed(CallState::Released, "呼叫已挂断");
        }
        result
    }

    /// 接听当前来电
    ///
    /// 直接透传给来电对话的 accept；没有来电时返回错误
    pub async fn accept(&self) -> CallResult<()> {
        let dialog = self
            .incoming
            .lock()
            .await
            .take()
            .ok_or(CallError::NoPendingCall)?;

        let local_ip = utils::get_first_non_loopback_interface()
            .map_err(|_| CallError::NetworkUnreachable)?;
        let sdp_answer = utils::build_sdp_offer(&local_ip, RTP_AUDIO_PORT, false, false);

        dialog.accept(None, Some(sdp_answer.into_bytes()))?;
        info!("来电已接听");
        self.events.call_changed(CallState::Connected, "来电已接听");

        Ok(())
    }

    /// 当前活跃注册会话的 id
    pub async fn registered_id(&self) -> Option<String> {
        self.accounts.lock().await.active().map(|s| s.id.clone())
    }

    /// 是否存在当前呼叫
    pub async fn has_active_call(&self) -> bool {
        self.calls.has_active_call().await
    }

    /// 本地绑定地址
    pub fn local_addr(&self) -> &str {
        &self.local_addr
    }

    /// 注册"注册状态变化"处理器，替换之前的处理器
    pub fn set_on_registration_state(
        &self,
        handler: impl Fn(RegistrationState, &str) + Send + Sync + 'static,
    ) {
        self.events.set_on_registration_state(Box::new(handler));
    }

    /// 注册"呼叫状态变化"处理器，替换之前的处理器
    pub fn set_on_call_state(&self, handler: impl Fn(CallState, &str) + Send + Sync + 'static) {
        self.events.set_on_call_state(Box::new(handler));
    }

    /// 注册"收到消息"处理器，替换之前的处理器
    pub fn set_on_message(&self, handler: impl Fn(&str, &str) + Send + Sync + 'static) {
        self.events.set_on_message(Box::new(handler));
    }

    /// 关闭会话，停止全部后台任务
    pub async fn stop(&self) {
        self.cancel_token.cancel();
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}

/// 把底层对话状态翻译成呼叫状态事件
fn translate_dialog_state(state: &DialogState) -> Option<(CallState, String)> {
    match state {
        DialogState::Calling(..) => Some((CallState::OutgoingInit, "INVITE 已发送".to_string())),
        DialogState::Early(..) => Some((CallState::OutgoingRinging, "对端振铃".to_string())),
        DialogState::Confirmed(..) => Some((CallState::Connected, "通话建立".to_string())),
        DialogState::Terminated(_, reason) => {
            let message = match reason {
                TerminatedReason::UasBye => "对端主动挂断".to_string(),
                other => format!("通话结束: {:?}", other),
            };
            Some((CallState::Released, message))
        }
        _ => None,
    }
}
