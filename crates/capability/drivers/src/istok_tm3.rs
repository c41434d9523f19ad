//! ИСТОК-ТМ3 驱动（D 族，Modbus RTU 读保持寄存器）

use crate::driver::DeviceDriver;
use crate::error::{DriverError, field};
use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use domain::{EnergyUnit, Reading};
use meter_protocol::codec::{be_f32_at, be_f64_at, be_u16_at, be_u32_at};
use meter_protocol::frame::{
    MODBUS_READ_HOLDING, modbus_payload, modbus_read_command, modbus_rtu_frame,
};
use meter_protocol::{Link, RequestSpec, execute};
use std::time::Duration;
use tracing::{debug, info};

const READ_TIMEOUT: Duration = Duration::from_secs(7);

/// 出厂信息 EF04..EF08：EF05 为批内序号，EF07 为生产日期
const REG_SERIAL: u16 = 0xEF04;
const REG_SYSTEM_COUNT: u16 = 0x0143;
const REG_UNIT_PRESSURE: u16 = 0xED00;
const REG_UNIT_ENERGY: u16 = 0xED01;
const REG_UNIT_WATER: u16 = 0xED02;
const REG_CLOCK: u16 = 0xEF50;
const REG_TIME_ON: u16 = 0xEF57;
const REG_SYSTEM_BASE: u16 = 0x7000;
const SYSTEM_BLOCK_REGISTERS: u16 = 0x3A;

/// 累计能量以 cal 或 J 存储，换算到 Gcal 或 GJ
const ENERGY_SCALE: f64 = 1_000_000.0;

/// 初始化阶段读出的设备参数。
#[derive(Debug, Clone)]
struct Setup {
    serial: String,
    systems: usize,
    unit: EnergyUnit,
    pressure_factor: f32,
    water_factor: f32,
}

pub struct IstokTm3Driver {
    station: u8,
    setup: Option<Setup>,
}

impl IstokTm3Driver {
    pub fn new() -> Self {
        Self {
            station: 0,
            setup: None,
        }
    }

    async fn read_registers(
        &self,
        link: &mut dyn Link,
        register: u16,
        count: u16,
    ) -> Result<Vec<u8>, DriverError> {
        debug!(
            station = self.station,
            register = format_args!("{register:04X}"),
            count,
            "reading registers"
        );
        let spec = RequestSpec::new(modbus_read_command(self.station, register, count))
            .with_validator(modbus_rtu_frame(self.station, MODBUS_READ_HOLDING))
            .with_read_timeout(READ_TIMEOUT);
        let response = execute(link, &spec).await?;
        let payload = modbus_payload(&response);
        if payload.len() < usize::from(count) * 2 {
            return Err(DriverError::Decode(format!(
                "register {register:04X}: expected {} bytes, got {}",
                usize::from(count) * 2,
                payload.len()
            )));
        }
        Ok(payload.to_vec())
    }

    async fn read_word(&self, link: &mut dyn Link, register: u16) -> Result<u16, DriverError> {
        let payload = self.read_registers(link, register, 1).await?;
        field(be_u16_at(&payload, 0), "register word")
    }

    async fn read_long(&self, link: &mut dyn Link, register: u16) -> Result<u32, DriverError> {
        let payload = self.read_registers(link, register, 2).await?;
        field(be_u32_at(&payload, 0), "register long")
    }
}

impl Default for IstokTm3Driver {
    fn default() -> Self {
        Self::new()
    }
}

/// 出厂编号：年（两位）+ 月（两位）+ 批内序号（三位），如 `1612001`。
fn serial_number(payload: &[u8]) -> Result<String, DriverError> {
    let batch = field(be_u16_at(payload, 2), "batch number")?;
    let made = field(be_u16_at(payload, 6), "production date")?;
    let year = made >> 9;
    let month = (made >> 5) & 0x0F;
    Ok(format!("{year}{month:02}{batch:03}"))
}

fn energy_unit(code: u16) -> EnergyUnit {
    match code {
        0 => EnergyUnit::Gj,
        _ => EnergyUnit::Gcal,
    }
}

/// 压力单位折算到 MPa。
fn pressure_factor(code: u16) -> Result<f32, DriverError> {
    match code {
        0 => Ok(0.001),       // kPa
        1 => Ok(0.098_066_5), // kgf/cm²
        2 => Ok(0.1),         // bar
        3 => Ok(1.0),         // MPa
        _ => Err(DriverError::Decode(format!("unknown pressure unit {code}"))),
    }
}

/// 水量单位：m³ / t 或千 m³ / 千 t。
fn water_factor(code: u16) -> Result<f32, DriverError> {
    match code {
        0 => Ok(1.0),
        1 => Ok(0.001),
        _ => Err(DriverError::Decode(format!("unknown water unit {code}"))),
    }
}

fn populate_system(
    block: &[u8],
    setup: &Setup,
    reading: &mut Reading,
    index: usize,
) -> Result<(), DriverError> {
    let double = |offset: usize, name: &str| field(be_f64_at(block, offset), name);
    let float = |offset: usize, name: &str| field(be_f32_at(block, offset), name);

    let system = reading.system_mut(index);
    system.active = true;
    system.sigma_q = double(0, "SigmaQ")? / ENERGY_SCALE;
    system.q1 = double(8, "Q1")? / ENERGY_SCALE;
    system.m1 = double(16, "M1")? * 0.001;
    system.gm1 = float(24, "GM1")? * 0.001;
    system.gv1 = float(28, "GV1")? * setup.water_factor;
    system.t1 = float(32, "T1")?;
    system.p1 = float(36, "P1")? * setup.pressure_factor;
    system.q2 = double(40, "Q2")? / ENERGY_SCALE;
    system.m2 = double(48, "M2")? * 0.001;
    system.gm2 = float(56, "GM2")? * 0.001;
    system.gv2 = float(60, "GV2")? * setup.water_factor;
    system.t2 = float(64, "T2")?;
    system.p2 = float(68, "P2")? * setup.pressure_factor;
    system.q3 = double(72, "Q3")? / ENERGY_SCALE;
    system.t3 = float(104, "T3")?;
    system.p3 = float(108, "P3")? * setup.pressure_factor;
    system.time_run = field(be_u32_at(block, 112), "system run time")?;
    Ok(())
}

#[async_trait]
impl DeviceDriver for IstokTm3Driver {
    fn name(&self) -> &'static str {
        "istok-tm3"
    }

    async fn initialize(&mut self, address: u8, link: &mut dyn Link) -> Result<(), DriverError> {
        self.station = address;
        info!(station = address, "initializing istok-tm3");

        let serial = serial_number(&self.read_registers(link, REG_SERIAL, 5).await?)?;
        let systems = usize::from(self.read_word(link, REG_SYSTEM_COUNT).await?);
        let unit = energy_unit(self.read_word(link, REG_UNIT_ENERGY).await?);
        let pressure_factor = pressure_factor(self.read_word(link, REG_UNIT_PRESSURE).await?)?;
        let water_factor = water_factor(self.read_word(link, REG_UNIT_WATER).await?)?;

        debug!(serial = %serial, systems, unit = %unit, "istok-tm3 initialized");
        self.setup = Some(Setup {
            serial,
            systems,
            unit,
            pressure_factor,
            water_factor,
        });
        Ok(())
    }

    async fn read(&mut self, link: &mut dyn Link) -> Result<Reading, DriverError> {
        let setup = self
            .setup
            .clone()
            .ok_or(DriverError::NotInitialized("istok-tm3"))?;

        info!(station = self.station, "reading device clock");
        let clock = self.read_long(link, REG_CLOCK).await?;

        let mut reading = Reading::new(setup.unit);
        reading.serial = setup.serial.clone();
        reading.requested_at = Utc::now();
        reading.device_time = DateTime::from_timestamp(i64::from(clock), 0)
            .map(|time| time.with_timezone(&Local).naive_local());
        reading.ensure_systems(setup.systems);

        for index in 0..setup.systems {
            info!(station = self.station, system = index + 1, "reading system block");
            let offset = u16::try_from(index * 4)
                .map_err(|_| DriverError::Decode(format!("system index {index} out of range")))?;
            let block = self
                .read_registers(link, REG_SYSTEM_BASE + offset, SYSTEM_BLOCK_REGISTERS)
                .await?;
            populate_system(&block, &setup, &mut reading, index)?;
        }

        info!(station = self.station, "reading time on");
        reading.time_on = self.read_long(link, REG_TIME_ON).await?;
        Ok(reading)
    }
}
