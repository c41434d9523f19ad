//! 驱动接口与按名称选择

use crate::error::DriverError;
use crate::{IstokTm3Driver, Skm2Driver, Sku02Driver, Tem104Driver};
use async_trait::async_trait;
use domain::Reading;
use meter_protocol::Link;
use std::fmt;
use std::str::FromStr;

/// 设备协议适配器。
///
/// 链路由调用方持有，每次调用时借出；驱动之间不共享状态。
#[async_trait]
pub trait DeviceDriver: Send {
    fn name(&self) -> &'static str;

    /// 初始化：记录设备地址，读取后续抄表需要的设备参数。
    async fn initialize(&mut self, address: u8, link: &mut dyn Link) -> Result<(), DriverError>;

    /// 读取当前数据。
    async fn read(&mut self, link: &mut dyn Link) -> Result<Reading, DriverError>;
}

/// 可选驱动。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverKind {
    /// ТЭМ-104（A 族）
    Tem104,
    /// СКМ-2（B 族，M-Bus）
    Skm2,
    /// SKU-02（C 族）
    Sku02,
    /// ИСТОК-ТМ3（D 族，Modbus RTU）
    IstokTm3,
}

impl DriverKind {
    pub const ALL: [DriverKind; 4] = [Self::Tem104, Self::Skm2, Self::Sku02, Self::IstokTm3];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tem104 => "tem104",
            Self::Skm2 => "skm2",
            Self::Sku02 => "sku02",
            Self::IstokTm3 => "istok-tm3",
        }
    }

    pub fn build(self) -> Box<dyn DeviceDriver> {
        match self {
            Self::Tem104 => Box::new(Tem104Driver::new()),
            Self::Skm2 => Box::new(Skm2Driver::new()),
            Self::Sku02 => Box::new(Sku02Driver::new()),
            Self::IstokTm3 => Box::new(IstokTm3Driver::new()),
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DriverKind {
    type Err = DriverError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "tem104" | "tem-104" => Ok(Self::Tem104),
            "skm2" | "skm-2" => Ok(Self::Skm2),
            "sku02" | "sku-02" => Ok(Self::Sku02),
            "istok-tm3" | "istoktm3" | "alfamera" => Ok(Self::IstokTm3),
            _ => Err(DriverError::UnknownDriver(value.to_string())),
        }
    }
}
