//! # 计量器通信核心
//!
//! 面向串口服务器（serial-over-TCP）上的热量表/能量表，提供：
//! - **数值原语**：大端整数拼装、IEEE-754 位模式还原、压缩 BCD 解码
//! - **校验和**：字节和、取反字节和、CRC-16/MODBUS、三字节校验
//! - **帧校验**：四种帧族的完整性判定（不完整时返回 false，让引擎继续读）
//! - **标签扫描**：在变长应答中按标签定位值
//! - **链路**：单连接生命周期（连接、关闭、重连）
//! - **交换引擎**：写出、限时读取、回显剥离、错误分类、重试与重连
//!
//! ## 数据流
//!
//! ```text
//! 协议适配器 ── RequestSpec(payload + validator + 时限/重试) ──▶ execute
//!                                                                 │
//!                                                        Link（TcpLink）
//!                                                                 │
//! 协议适配器 ◀── 通过校验的原始字节 ─────────────────────────────────┘
//!      │
//!      ▼
//! scanner / codec 提取字段
//! ```
//!
//! 同一链路同一时刻只有一个交换，没有流水线与多路复用。

pub mod checksum;
pub mod codec;
mod error;
mod exchange;
pub mod frame;
mod link;
pub mod scanner;
mod tcp_client;
mod types;

pub use error::ProtocolError;
pub use exchange::{execute, is_link_reset};
pub use link::Link;
pub use scanner::{TagRecord, grab, grab_array, grab_first};
pub use tcp_client::TcpLink;
pub use types::*;
