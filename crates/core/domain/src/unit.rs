//! 热能计量单位与换算系数。

use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// 热能单位。数值编码用于 JSON 输出。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnergyUnit {
    Mwh = 0,
    #[default]
    Gcal = 1,
    Gj = 2,
    Kwh = 3,
}

impl EnergyUnit {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Mwh => "MWh",
            Self::Gcal => "Gcal",
            Self::Gj => "GJ",
            Self::Kwh => "kWh",
        }
    }
}

impl fmt::Display for EnergyUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// 无法识别的单位名称。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownUnit(pub String);

impl fmt::Display for UnknownUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown energy unit: {}", self.0)
    }
}

impl std::error::Error for UnknownUnit {}

impl FromStr for EnergyUnit {
    type Err = UnknownUnit;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mwh" => Ok(Self::Mwh),
            "gcal" => Ok(Self::Gcal),
            "gj" => Ok(Self::Gj),
            "kwh" => Ok(Self::Kwh),
            _ => Err(UnknownUnit(value.to_string())),
        }
    }
}

impl Serialize for EnergyUnit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

/// 各单位折算为 Gcal 的系数（1 单位 = 系数 Gcal）。
///
/// 具体仪表的换算约定可能不同，驱动可以覆盖默认值。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coefficients {
    pub gj: f64,
    pub mwh: f64,
    pub kwh: f64,
}

impl Default for Coefficients {
    fn default() -> Self {
        Self {
            gj: 0.239,
            mwh: 0.86,
            kwh: 0.00086,
        }
    }
}

impl Coefficients {
    /// 以 MWh 系数推导其余两项（1 MWh = 3.6 GJ = 1000 kWh）。
    pub fn from_mwh(mwh: f64) -> Self {
        Self {
            gj: mwh / 3.6,
            mwh,
            kwh: mwh / 1000.0,
        }
    }

    pub fn to_gcal(&self, unit: EnergyUnit) -> f64 {
        match unit {
            EnergyUnit::Gcal => 1.0,
            EnergyUnit::Gj => self.gj,
            EnergyUnit::Mwh => self.mwh,
            EnergyUnit::Kwh => self.kwh,
        }
    }
}
