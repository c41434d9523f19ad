//! SKU-02 驱动（C 族）
//!
//! 协议不带设备地址，总线上只能有一台设备。每个应答前 29 字节为数据头，
//! 其中 18..21 字节给出能量单位、压力单位和水量类型（体积或质量）。

use crate::driver::DeviceDriver;
use crate::error::{DriverError, field};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use domain::{EnergyUnit, Reading};
use meter_protocol::codec::{be_f32_at, be_u16_at, be_u32_at};
use meter_protocol::frame::{sku_command, sku_frame};
use meter_protocol::{Link, RequestSpec, execute};
use tracing::{debug, info};

const CURRENT_DATA: u8 = 0x20;
const CLOCK: u8 = 0x28;

/// 当前数据应答中最后一个字段（P2）的结束位置
const CURRENT_DATA_MIN_LEN: usize = 106;
const CLOCK_MIN_LEN: usize = 37;

/// 按管径设定的量纲系数，下标取 18 字节高半字节
const DIMENSION: [f64; 16] = [
    1.0, 1.0, 1.0, 1.0, 10.0, 10.0, 10.0, 10.0, 100.0, 100.0, 100.0, 100.0, 100.0, 100.0, 100.0,
    100.0,
];

pub struct Sku02Driver {
    initialized: bool,
}

impl Sku02Driver {
    pub fn new() -> Self {
        Self { initialized: false }
    }
}

impl Default for Sku02Driver {
    fn default() -> Self {
        Self::new()
    }
}

/// 能量单位与原始计数的换算系数。
fn energy_unit(code: u8) -> Result<(EnergyUnit, f64), DriverError> {
    match code {
        0 => Ok((EnergyUnit::Mwh, 0.001)),
        1 => Ok((EnergyUnit::Gcal, 0.000_859_845)),
        2 => Ok((EnergyUnit::Gj, 0.0036)),
        _ => Err(DriverError::Decode(format!("unknown energy unit code {code}"))),
    }
}

fn populate(datum: &[u8], reading: &mut Reading) -> Result<(), DriverError> {
    if datum.len() < CURRENT_DATA_MIN_LEN {
        return Err(DriverError::Decode(format!(
            "current data too short: {} bytes",
            datum.len()
        )));
    }
    let long = |offset: usize, name: &str| field(be_u32_at(datum, offset), name);
    let float = |offset: usize, name: &str| field(be_f32_at(datum, offset), name);

    reading.serial = long(21, "serial")?.to_string();
    reading.time_on = long(46, "time on")?;

    let dimension = DIMENSION[usize::from(datum[18] >> 4)];
    let (unit, factor) = energy_unit(datum[18] & 0x0F)?;
    reading.unit = unit;

    let system = reading.system_mut(0);
    system.active = true;
    system.sigma_q = f64::from(long(50, "SigmaQ")?) * factor * dimension;
    system.q1 = f64::from(long(30, "Q1")?) * factor * dimension;
    system.q2 = f64::from(long(34, "Q2")?) * factor * dimension;

    let water1 = f64::from(long(38, "water 1")?) * 0.01 * dimension;
    let water2 = f64::from(long(42, "water 2")?) * 0.01 * dimension;
    let flow1 = float(70, "flow 1")?;
    let flow2 = float(74, "flow 2")?;
    if datum[20] & 0x0F == 0 {
        system.v1 = water1;
        system.v2 = water2;
        system.gv1 = flow1;
        system.gv2 = flow2;
    } else {
        system.m1 = water1;
        system.m2 = water2;
        system.gm1 = flow1;
        system.gm2 = flow2;
    }

    system.t1 = float(86, "T1")?;
    system.t2 = float(90, "T2")?;
    system.t3 = float(94, "T3")?;
    system.p1 = float(98, "P1")?;
    system.p2 = float(102, "P2")?;
    // 压力以 kPa 给出
    if datum[19] & 0x0F == 0 {
        system.p1 *= 0.001;
        system.p2 *= 0.001;
    }
    Ok(())
}

#[async_trait]
impl DeviceDriver for Sku02Driver {
    fn name(&self) -> &'static str {
        "sku02"
    }

    async fn initialize(&mut self, address: u8, _link: &mut dyn Link) -> Result<(), DriverError> {
        // 技术参数随当前数据一起返回，初始化无需通信
        debug!(address, "sku02 ignores bus address");
        self.initialized = true;
        Ok(())
    }

    async fn read(&mut self, link: &mut dyn Link) -> Result<Reading, DriverError> {
        if !self.initialized {
            return Err(DriverError::NotInitialized("sku02"));
        }

        info!("requesting current data");
        let spec = RequestSpec::new(sku_command(CURRENT_DATA)).with_validator(sku_frame);
        let response = execute(link, &spec).await?;
        let mut reading = Reading::new(EnergyUnit::Gcal);
        populate(&response, &mut reading)?;

        // 数据头中的时间不含分秒，单独读取时钟
        info!("reading device clock");
        reading.requested_at = Utc::now();
        let spec = RequestSpec::new(sku_command(CLOCK)).with_validator(sku_frame);
        let response = execute(link, &spec).await?;
        if response.len() < CLOCK_MIN_LEN {
            return Err(DriverError::Decode(format!(
                "clock response too short: {} bytes",
                response.len()
            )));
        }
        let year = field(be_u16_at(&response, 30), "clock year")?;
        let [month, day, hour, minute, second] =
            [32, 33, 34, 35, 36].map(|offset| u32::from(response[offset]));
        let time = NaiveDate::from_ymd_opt(i32::from(year), month, day)
            .and_then(|date| date.and_hms_opt(hour, minute, second));
        reading.device_time = Some(field(time, "device clock")?);

        Ok(reading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_energy_unit_codes() {
        assert_eq!(energy_unit(1).expect("gcal").0, EnergyUnit::Gcal);
        assert!(matches!(energy_unit(3), Err(DriverError::Decode(_))));
    }

    #[test]
    fn test_populate_rejects_short_frame() {
        let mut reading = Reading::new(EnergyUnit::Gcal);
        assert!(matches!(
            populate(&[0u8; 40], &mut reading),
            Err(DriverError::Decode(_))
        ));
    }

    #[test]
    fn test_populate_mass_mode() {
        let mut datum = vec![0u8; CURRENT_DATA_MIN_LEN];
        datum[18] = 0x82; // 量纲 100，GJ
        datum[19] = 0x01; // MPa
        datum[20] = 0x01; // 质量
        datum[38..42].copy_from_slice(&250u32.to_be_bytes());
        datum[70..74].copy_from_slice(&3.5f32.to_be_bytes());
        datum[98..102].copy_from_slice(&0.6f32.to_be_bytes());
        let mut reading = Reading::new(EnergyUnit::Gcal);
        populate(&datum, &mut reading).expect("populate");

        let system = &reading.systems[0];
        assert_eq!(reading.unit, EnergyUnit::Gj);
        assert!((system.m1 - 250.0).abs() < 1e-9);
        assert_eq!(system.v1, 0.0);
        assert_eq!(system.gm1, 3.5);
        assert_eq!(system.p1, 0.6);
    }
}
