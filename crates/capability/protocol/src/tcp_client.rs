//! TCP 链路实现
//!
//! 主动连接计量器（或其串口服务器），以字节流方式收发。
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! let mut link = TcpLink::new("192.168.1.100", 4001, Duration::from_secs(10));
//! link.connect().await?;
//! let response = execute(&mut link, &RequestSpec::new(payload)).await?;
//! link.close().await?;
//! ```

use crate::error::ProtocolError;
use crate::link::Link;
use crate::types::ReadOutcome;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// TCP 链路
pub struct TcpLink {
    host: String,
    port: u16,
    connect_timeout: Duration,
    stream: Option<TcpStream>,
}

impl TcpLink {
    pub fn new(host: impl Into<String>, port: u16, connect_timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout,
            stream: None,
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[async_trait]
impl Link for TcpLink {
    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn connect(&mut self) -> Result<(), ProtocolError> {
        if self.stream.is_some() {
            return Err(ProtocolError::Connection(format!(
                "already connected to {}",
                self.endpoint()
            )));
        }

        let endpoint = self.endpoint();
        let stream = match timeout(
            self.connect_timeout,
            TcpStream::connect((self.host.as_str(), self.port)),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(err)) => {
                warn!(endpoint = %endpoint, error = %err, "tcp connect failed");
                return Err(ProtocolError::Connection(format!(
                    "connect {endpoint}: {err}"
                )));
            }
            Err(_) => {
                warn!(endpoint = %endpoint, "tcp connect timed out");
                return Err(ProtocolError::Connection(format!(
                    "connect {endpoint}: timed out"
                )));
            }
        };

        info!(endpoint = %endpoint, "connected");
        self.stream = Some(stream);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ProtocolError> {
        let Some(mut stream) = self.stream.take() else {
            return Ok(());
        };
        let result = stream.shutdown().await;
        // stream 在此处释放，连接已关闭
        drop(stream);
        info!(endpoint = %self.endpoint(), "disconnected");
        result.map_err(|err| ProtocolError::Connection(format!("close: {err}")))
    }

    async fn write(&mut self, bytes: &[u8], deadline: Duration) -> Result<(), ProtocolError> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(ProtocolError::Connection("not connected".to_string()));
        };
        match timeout(deadline, stream.write_all(bytes)).await {
            Ok(Ok(())) => {
                debug!(len = bytes.len(), "payload written");
                Ok(())
            }
            Ok(Err(err)) => Err(ProtocolError::Connection(format!("write: {err}"))),
            Err(_) => Err(ProtocolError::Connection("write deadline exceeded".to_string())),
        }
    }

    async fn read(&mut self, buffer: &mut [u8], deadline: Duration) -> ReadOutcome {
        let Some(stream) = self.stream.as_mut() else {
            return ReadOutcome::StreamClosed;
        };
        match timeout(deadline, stream.read(buffer)).await {
            Err(_) => ReadOutcome::Timeout,
            Ok(Ok(0)) => ReadOutcome::StreamClosed,
            Ok(Ok(n)) => ReadOutcome::Data(n),
            Ok(Err(err)) if err.kind() == ErrorKind::UnexpectedEof => ReadOutcome::StreamClosed,
            Ok(Err(err)) => ReadOutcome::Other(err),
        }
    }
}
