//! 驱动错误类型定义

use meter_protocol::ProtocolError;

/// 驱动错误
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// 通信失败（连接、超时、校验重试用尽）
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// 应答通过帧校验，但字段无法解析
    #[error("decode error: {0}")]
    Decode(String),

    /// 未知驱动名称
    #[error("unknown driver: {0}")]
    UnknownDriver(String),

    /// 未初始化就读取
    #[error("driver {0} is not initialized")]
    NotInitialized(&'static str),
}

/// 把越界读取（`None`）转换为解析错误。
pub(crate) fn field<T>(value: Option<T>, name: &str) -> Result<T, DriverError> {
    value.ok_or_else(|| DriverError::Decode(format!("{name} is out of range")))
}
