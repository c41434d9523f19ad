//! 协议错误类型定义

/// 协议通信错误
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// 连接错误（建连、关闭、写入失败）
    #[error("connection error: {0}")]
    Connection(String),

    /// IO 错误
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 对端关闭连接（EOF）
    #[error("stream closed by peer")]
    StreamClosed,

    /// 重试用尽后应答仍未通过校验
    #[error("invalid response after {attempts} sends ({received} bytes received)")]
    Validation { attempts: u32, received: usize },
}
