//! # 设备协议适配器
//!
//! 每个驱动对应一种帧族，负责构造请求、选择校验函数、从应答中提取字段：
//!
//! | 驱动 | 帧族 | 设备 |
//! |------|------|------|
//! | [`Tem104Driver`] | A：`55h`/`AAh` 起始，取反和校验 | ТЭМ-104 |
//! | [`Skm2Driver`] | B：M-Bus 短帧/长帧，标签寻址记录 | СКМ-2 |
//! | [`Sku02Driver`] | C：34 字节命令帧，三字节校验 | SKU-02 |
//! | [`IstokTm3Driver`] | D：Modbus RTU，CRC16 | ИСТОК-ТМ3 |
//!
//! 通信、重试、回显处理全部由 `meter_protocol::execute` 完成。

mod driver;
mod error;
mod istok_tm3;
mod skm2;
mod sku02;
mod tem104;

pub use driver::{DeviceDriver, DriverKind};
pub use error::DriverError;
pub use istok_tm3::IstokTm3Driver;
pub use skm2::Skm2Driver;
pub use sku02::Sku02Driver;
pub use tem104::Tem104Driver;
