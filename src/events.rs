/// 事件模块
///
/// 将底层栈的状态变化转换为强类型事件，投递给调用方注册的处理器。
/// 每种事件只有一个处理槽位，后注册的处理器覆盖先前的（last wins），
/// 没有队列也没有多播
use std::sync::Mutex;

/// 注册状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    /// 未注册
    None,

    /// 注册进行中
    Progress,

    /// 注册成功
    Ok,

    /// 已注销
    Cleared,

    /// 注册失败
    Failed,
}

/// 呼叫状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    /// 空闲
    Idle,

    /// 呼出已发起
    OutgoingInit,

    /// 对端振铃
    OutgoingRinging,

    /// 通话建立
    Connected,

    /// 收到来电
    IncomingReceived,

    /// 通话结束
    Released,

    /// 呼叫出错
    Error,
}

/// 话机事件
///
/// 每个事件携带状态枚举与自由文本消息
#[derive(Debug, Clone)]
pub enum PhoneEvent {
    /// 注册状态变化
    RegistrationStateChanged {
        state: RegistrationState,
        message: String,
    },

    /// 呼叫状态变化
    CallStateChanged { state: CallState, message: String },

    /// 收到即时消息
    MessageReceived { from: String, message: String },
}

/// 注册状态处理器
pub type RegistrationHandler = Box<dyn Fn(RegistrationState, &str) + Send + Sync>;

/// 呼叫状态处理器
pub type CallStateHandler = Box<dyn Fn(CallState, &str) + Send + Sync>;

/// 消息处理器
pub type MessageHandler = Box<dyn Fn(&str, &str) + Send + Sync>;

/// 事件中枢
///
/// 三个互相独立的单槽位回调注册，派发在底层事件循环所在线程同步执行
#[derive(Default)]
pub struct EventHub {
    on_registration: Mutex<Option<RegistrationHandler>>,
    on_call: Mutex<Option<CallStateHandler>>,
    on_message: Mutex<Option<MessageHandler>>,
}

impl EventHub {
    /// 创建空的事件中枢
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册注册状态处理器，替换之前的处理器
    pub fn set_on_registration_state(&self, handler: RegistrationHandler) {
        *self.on_registration.lock().unwrap() = Some(handler);
    }

    /// 注册呼叫状态处理器，替换之前的处理器
    pub fn set_on_call_state(&self, handler: CallStateHandler) {
        *self.on_call.lock().unwrap() = Some(handler);
    }

    /// 注册消息处理器，替换之前的处理器
    pub fn set_on_message(&self, handler: MessageHandler) {
        *self.on_message.lock().unwrap() = Some(handler);
    }

    /// 派发事件到对应槽位的处理器（没有处理器时丢弃）
    pub fn dispatch(&self, event: PhoneEvent) {
        match event {
            PhoneEvent::RegistrationStateChanged { state, message } => {
                if let Some(handler) = self.on_registration.lock().unwrap().as_ref() {
                    handler(state, &message);
                }
            }
            PhoneEvent::CallStateChanged { state, message } => {
                if let Some(handler) = self.on_call.lock().unwrap().as_ref() {
                    handler(state, &message);
                }
            }
            PhoneEvent::MessageReceived { from, message } => {
                if let Some(handler) = self.on_message.lock().unwrap().as_ref() {
                    handler(&from, &message);
                }
            }
        }
    }

    /// 便捷派发：注册状态变化
    pub fn registration_changed(&self, state: RegistrationState, message: impl Into<String>) {
        self.dispatch(PhoneEvent::RegistrationStateChanged {
            state,
            message: message.into(),
        });
    }

    /// 便捷派发：呼叫状态变化
    pub fn call_changed(&self, state: CallState, message: impl Into<String>) {
        self.dispatch(PhoneEvent::CallStateChanged {
            state,
            message: message.into(),
        });
    }

    /// 便捷派发：收到消息
    pub fn message_received(&self, from: impl Into<String>, message: impl Into<String>) {
        self.dispatch(PhoneEvent::MessageReceived {
            from: from.into(),
            message: message.into(),
        });
    }
}
