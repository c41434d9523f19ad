//! 链路抽象
//!
//! 交换引擎只依赖 [`Link`]，真实连接由 [`crate::TcpLink`] 提供，测试中可替换为脚本化实现。

use crate::error::ProtocolError;
use crate::types::ReadOutcome;
use async_trait::async_trait;
use std::time::Duration;
use tracing::warn;

/// 面向字节流的设备链路。
///
/// 同一时刻只服务一个交换，调用方串行使用。
#[async_trait]
pub trait Link: Send {
    /// 当前是否持有打开的连接。
    fn is_connected(&self) -> bool;

    /// 建立连接；已连接时返回错误。
    async fn connect(&mut self) -> Result<(), ProtocolError>;

    /// 关闭连接。无论底层关闭是否出错，之后 `is_connected()` 都为 false。
    async fn close(&mut self) -> Result<(), ProtocolError>;

    /// 在截止时间内写出全部字节。
    async fn write(&mut self, bytes: &[u8], deadline: Duration) -> Result<(), ProtocolError>;

    /// 在截止时间内读一次。
    async fn read(&mut self, buffer: &mut [u8], deadline: Duration) -> ReadOutcome;

    /// 关闭后重新连接。关闭失败只记录日志。
    async fn reconnect(&mut self) -> Result<(), ProtocolError> {
        if let Err(err) = self.close().await {
            warn!(error = %err, "close before reconnect failed");
        }
        self.connect().await
    }
}
