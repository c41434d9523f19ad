//! 一次抄表的读数。

use crate::unit::{Coefficients, EnergyUnit};
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Serialize, Serializer};

/// 单个计量系统的读数。
///
/// 能量单位由所属 [`Reading::unit`] 决定；体积 m³，质量 t，流量 m³/h 或 t/h，
/// 温度 °C，压力 MPa，时间秒。
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SystemReading {
    /// 未启用的系统不输出
    #[serde(skip)]
    pub active: bool,
    #[serde(rename = "timeRunSys")]
    pub time_run: u32,
    #[serde(rename = "SigmaQ")]
    pub sigma_q: f64,
    #[serde(rename = "Q1")]
    pub q1: f64,
    #[serde(rename = "Q2")]
    pub q2: f64,
    #[serde(rename = "Q3")]
    pub q3: f64,
    #[serde(rename = "V1")]
    pub v1: f64,
    #[serde(rename = "V2")]
    pub v2: f64,
    #[serde(rename = "M1")]
    pub m1: f64,
    #[serde(rename = "M2")]
    pub m2: f64,
    #[serde(rename = "GM1")]
    pub gm1: f32,
    #[serde(rename = "GM2")]
    pub gm2: f32,
    #[serde(rename = "GV1")]
    pub gv1: f32,
    #[serde(rename = "GV2")]
    pub gv2: f32,
    #[serde(rename = "T1")]
    pub t1: f32,
    #[serde(rename = "T2")]
    pub t2: f32,
    #[serde(rename = "T3")]
    pub t3: f32,
    #[serde(rename = "P1")]
    pub p1: f32,
    #[serde(rename = "P2")]
    pub p2: f32,
    #[serde(rename = "P3")]
    pub p3: f32,
}

impl SystemReading {
    fn scale_energy(&mut self, factor: f64) {
        self.sigma_q *= factor;
        self.q1 *= factor;
        self.q2 *= factor;
        self.q3 *= factor;
    }
}

/// 一次抄表周期的完整读数。
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    pub serial: String,
    #[serde(rename = "unitQ")]
    pub unit: EnergyUnit,
    #[serde(rename = "timeRequest", serialize_with = "unix_seconds")]
    pub requested_at: DateTime<Utc>,
    /// 仪表时钟（仪表本地时间）
    #[serde(rename = "timeDevice", serialize_with = "local_unix_seconds")]
    pub device_time: Option<NaiveDateTime>,
    /// 通电时间
    pub time_on: u32,
    /// 无故障运行时间（所有系统合计）
    pub time_run_common: u32,
    #[serde(rename = "system", serialize_with = "active_systems")]
    pub systems: Vec<SystemReading>,
    #[serde(skip)]
    pub coefficients: Coefficients,
}

impl Reading {
    pub fn new(unit: EnergyUnit) -> Self {
        Self {
            serial: String::new(),
            unit,
            requested_at: Utc::now(),
            device_time: None,
            time_on: 0,
            time_run_common: 0,
            systems: Vec::new(),
            coefficients: Coefficients::default(),
        }
    }

    /// 保证至少有 `count` 个系统，已有系统不受影响。
    pub fn ensure_systems(&mut self, count: usize) {
        if self.systems.len() < count {
            self.systems.resize_with(count, SystemReading::default);
        }
    }

    /// 取得下标为 `index` 的系统，不存在时补齐。
    pub fn system_mut(&mut self, index: usize) -> &mut SystemReading {
        self.ensure_systems(index + 1);
        &mut self.systems[index]
    }

    pub fn active_systems(&self) -> impl Iterator<Item = (usize, &SystemReading)> {
        self.systems
            .iter()
            .enumerate()
            .filter(|(_, system)| system.active)
    }

    /// 换算全部能量字段到 `target`，经由 Gcal 中转。
    pub fn convert_to(&mut self, target: EnergyUnit) {
        if self.unit == target {
            return;
        }
        let factor = self.coefficients.to_gcal(self.unit) / self.coefficients.to_gcal(target);
        for system in &mut self.systems {
            system.scale_energy(factor);
        }
        self.unit = target;
    }
}

fn unix_seconds<S: Serializer>(time: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_i64(time.timestamp())
}

fn local_unix_seconds<S: Serializer>(
    time: &Option<NaiveDateTime>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match time.and_then(|naive| Local.from_local_datetime(&naive).earliest()) {
        Some(local) => serializer.serialize_i64(local.timestamp()),
        None => serializer.serialize_none(),
    }
}

fn active_systems<S: Serializer>(
    systems: &[SystemReading],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(systems.iter().filter(|system| system.active))
}
