//! 交换请求与读结果类型

use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

/// 单次写操作的截止时间。
pub const WRITE_DEADLINE: Duration = Duration::from_secs(10);

/// 单次读操作使用的缓冲区大小。
pub const READ_WINDOW: usize = 1200;

/// 单次发送内容忍的读错误次数（超过即结束本次接收）。
pub const MAX_READ_ERRORS: u32 = 3;

/// 单次发送内允许的重连次数（超过即以 StreamClosed 结束整个交换）。
pub const MAX_RECONNECTS: u32 = 3;

/// 默认重发次数。
pub const DEFAULT_ATTEMPTS: u32 = 2;

/// 默认读超时。
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(3);

/// 应答校验函数：只判断，不修改缓冲区，不 panic。
pub type Validator = Arc<dyn Fn(&[u8]) -> bool + Send + Sync>;

/// 一次请求/应答交换的参数。
#[derive(Clone)]
pub struct RequestSpec {
    /// 请求帧
    pub payload: Vec<u8>,
    /// 应答校验
    pub validator: Validator,
    /// 校验失败后的重发次数（总发送次数 = attempts + 1）
    pub attempts: u32,
    /// 每次读操作的超时
    pub read_timeout: Duration,
    /// 对端关闭时是否重连并重发
    pub reconnect_on_close: bool,
}

impl RequestSpec {
    /// 使用默认参数创建请求：重发 2 次、读超时 3 秒、允许重连、接受任何应答。
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: payload.into(),
            validator: Arc::new(|_: &[u8]| true),
            attempts: DEFAULT_ATTEMPTS,
            read_timeout: DEFAULT_READ_TIMEOUT,
            reconnect_on_close: true,
        }
    }

    pub fn with_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&[u8]) -> bool + Send + Sync + 'static,
    {
        self.validator = Arc::new(validator);
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    pub fn without_reconnect(mut self) -> Self {
        self.reconnect_on_close = false;
        self
    }
}

impl fmt::Debug for RequestSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestSpec")
            .field("payload_len", &self.payload.len())
            .field("attempts", &self.attempts)
            .field("read_timeout", &self.read_timeout)
            .field("reconnect_on_close", &self.reconnect_on_close)
            .finish_non_exhaustive()
    }
}

/// 单次读操作的分类结果。
#[derive(Debug)]
pub enum ReadOutcome {
    /// 读到 n 个字节（n > 0）
    Data(usize),
    /// 截止时间内无数据
    Timeout,
    /// 对端关闭
    StreamClosed,
    /// 其他读错误
    Other(io::Error),
}
