//! ТЭМ-104 驱动（A 族）
//!
//! 内存布局：
//! - 2K 定时器内存 `0000h` 起：系统数（1 字节）、`007Ch` 出厂编号（4 字节）
//! - 2K 定时器内存 `0200h` 起（SysInt，`FFh` 字节）：各系统与通道的累计量
//! - 运行内存 `2200h` 起（SysPar，每系统 `92h` 字节）：各系统的当前值
//!
//! 下文偏移均相对应答帧起始（含 6 字节帧头）。

use crate::driver::DeviceDriver;
use crate::error::{DriverError, field};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use domain::{EnergyUnit, Reading};
use meter_protocol::codec::{bcd_byte, be_f32_at, be_u32_at};
use meter_protocol::frame::{tem_command, tem_frame};
use meter_protocol::{Link, RequestSpec, execute};
use std::time::Duration;
use tracing::{debug, info, warn};

const HEADER: usize = 6;
/// 累计量区按地址计算最多容纳的系统数
const MAX_SYSTEMS: usize = 4;

const RAM_BASE: u16 = 0x2200;
const RAM_SYSTEM_STRIDE: u16 = 0x92;
/// 只读到瞬时功率之前
const RAM_READ_LEN: u8 = 0x60;

const INTEGRATOR_TIMEOUT: Duration = Duration::from_secs(5);
const INTEGRATOR_HALF: u8 = 0x7F;

pub struct Tem104Driver {
    address: u8,
    systems: Option<usize>,
    serial: String,
}

impl Tem104Driver {
    pub fn new() -> Self {
        Self {
            address: 0,
            systems: None,
            serial: String::new(),
        }
    }

    fn request(&self, body: &[u8]) -> RequestSpec {
        RequestSpec::new(tem_command(self.address, body)).with_validator(tem_frame)
    }

    async fn read_clock(
        &self,
        link: &mut dyn Link,
        reading: &mut Reading,
    ) -> Result<(), DriverError> {
        info!(address = self.address, "reading device clock");
        let spec = self
            .request(&[0x0F, 0x02, 0x02, 0x10, 0x10])
            .with_validator(|buffer: &[u8]| buffer.len() >= 15 && tem_frame(buffer));
        let response = execute(link, &spec).await?;

        let bcd = |offset: usize, name: &str| {
            field(response.get(offset).copied().and_then(bcd_byte), name)
        };
        let second = bcd(HEADER, "clock second")?;
        let minute = bcd(HEADER + 1, "clock minute")?;
        let hour = bcd(HEADER + 2, "clock hour")?;
        let day = bcd(HEADER + 3, "clock day")?;
        let month = bcd(HEADER + 4, "clock month")?;
        let year = bcd(HEADER + 5, "clock year")?;

        let date = NaiveDate::from_ymd_opt(2000 + i32::from(year), u32::from(month), u32::from(day));
        let time = date.and_then(|date| {
            date.and_hms_opt(u32::from(hour), u32::from(minute), u32::from(second))
        });
        reading.device_time = Some(field(time, "device clock")?);
        Ok(())
    }

    async fn read_current(
        &self,
        link: &mut dyn Link,
        reading: &mut Reading,
        systems: usize,
    ) -> Result<(), DriverError> {
        for index in 0..systems {
            info!(address = self.address, system = index + 1, "reading current values");
            // systems <= MAX_SYSTEMS，地址不会溢出
            let [hi, lo] = (RAM_BASE + RAM_SYSTEM_STRIDE * index as u16).to_be_bytes();
            let spec = self.request(&[0x0C, 0x01, 0x03, hi, lo, RAM_READ_LEN]);
            let response = execute(link, &spec).await?;

            let float =
                |offset: usize, name: &str| field(be_f32_at(&response, HEADER + offset), name);
            let system = reading.system_mut(index);
            system.t1 = float(0x00, "T1")?;
            system.t2 = float(0x04, "T2")?;
            system.t3 = float(0x08, "T3")?;
            system.p1 = float(0x10, "P1")?;
            system.p2 = float(0x14, "P2")?;
            system.p3 = float(0x18, "P3")?;
            system.gv1 = float(0x40, "GV1")?;
            system.gv2 = float(0x44, "GV2")?;
            system.gm1 = float(0x50, "GM1")?;
            system.gm2 = float(0x54, "GM2")?;
        }
        Ok(())
    }

    /// 读取累计量区。部分串口服务器无法转发整块应答，失败时改为两次半块读取再拼接。
    async fn read_integrators(&self, link: &mut dyn Link) -> Result<Vec<u8>, DriverError> {
        info!(address = self.address, "reading integrators");
        let full = self
            .request(&[0x0F, 0x01, 0x03, 0x02, 0x00, 0xFF])
            .with_read_timeout(INTEGRATOR_TIMEOUT);
        match execute(link, &full).await {
            Ok(response) => return Ok(response),
            Err(err) => warn!(error = %err, "full integrator read failed, falling back to halves"),
        }

        let first = self
            .request(&[0x0F, 0x01, 0x03, 0x02, 0x00, INTEGRATOR_HALF])
            .with_read_timeout(INTEGRATOR_TIMEOUT);
        let second = self
            .request(&[0x0F, 0x01, 0x03, 0x02, INTEGRATOR_HALF, INTEGRATOR_HALF])
            .with_read_timeout(INTEGRATOR_TIMEOUT);
        let first = execute(link, &first).await?;
        let second = execute(link, &second).await?;

        let half = usize::from(INTEGRATOR_HALF);
        let mut memory = field(first.get(..HEADER + half), "first integrator half")?.to_vec();
        memory.extend_from_slice(field(
            second.get(HEADER..HEADER + half),
            "second integrator half",
        )?);
        Ok(memory)
    }
}

impl Default for Tem104Driver {
    fn default() -> Self {
        Self::new()
    }
}

/// 整数部分（u32）加小数部分（f32）。
fn integrator(
    memory: &[u8],
    long_at: usize,
    float_at: usize,
    name: &str,
) -> Result<f64, DriverError> {
    let whole = field(be_u32_at(memory, long_at), name)?;
    let fraction = field(be_f32_at(memory, float_at), name)?;
    Ok(f64::from(whole) + f64::from(fraction))
}

#[async_trait]
impl DeviceDriver for Tem104Driver {
    fn name(&self) -> &'static str {
        "tem104"
    }

    async fn initialize(&mut self, address: u8, link: &mut dyn Link) -> Result<(), DriverError> {
        self.address = address;
        info!(address, "initializing tem104");

        const INIT_LEN: u8 = 0x80;
        let expected = HEADER + usize::from(INIT_LEN) + 1;
        let spec = self
            .request(&[0x0F, 0x01, 0x03, 0x00, 0x00, INIT_LEN])
            .with_validator(move |buffer: &[u8]| buffer.len() == expected && tem_frame(buffer));
        let response = execute(link, &spec).await?;

        let systems = usize::from(field(response.get(HEADER).copied(), "system count")?);
        if systems > MAX_SYSTEMS {
            return Err(DriverError::Decode(format!("unsupported system count {systems}")));
        }
        self.serial = field(be_u32_at(&response, HEADER + 0x7C), "serial")?.to_string();
        self.systems = Some(systems);
        debug!(systems, serial = %self.serial, "tem104 initialized");
        Ok(())
    }

    async fn read(&mut self, link: &mut dyn Link) -> Result<Reading, DriverError> {
        let systems = self.systems.ok_or(DriverError::NotInitialized("tem104"))?;

        // 设备按 Gcal 累计（协议文档标注为 MWh，实测为 Gcal）
        let mut reading = Reading::new(EnergyUnit::Gcal);
        reading.serial = self.serial.clone();
        reading.requested_at = Utc::now();
        reading.ensure_systems(systems);
        for system in &mut reading.systems {
            system.active = true;
        }

        self.read_clock(link, &mut reading).await?;
        self.read_current(link, &mut reading, systems).await?;
        let memory = self.read_integrators(link).await?;

        for index in 0..systems {
            let sigma_q = integrator(
                &memory,
                HEADER + 0x58 + 4 * index,
                HEADER + 0x28 + 4 * index,
                "SigmaQ",
            )?;
            let time_run = field(be_u32_at(&memory, 0x72 + 4 * index), "system run time")?;
            let system = reading.system_mut(index);
            system.sigma_q = sigma_q;
            system.time_run = time_run;
        }

        // 通道累计量无法对应到具体系统，归入第一个系统
        if systems > 0 {
            let v1 = integrator(&memory, HEADER + 0x38, HEADER + 0x08, "V1")?;
            let v2 = integrator(&memory, HEADER + 0x3C, HEADER + 0x0C, "V2")?;
            let m1 = integrator(&memory, HEADER + 0x48, HEADER + 0x18, "M1")?;
            let m2 = integrator(&memory, HEADER + 0x4C, HEADER + 0x1C, "M2")?;
            let first = reading.system_mut(0);
            first.v1 = v1;
            first.v2 = v2;
            first.m1 = m1;
            first.m2 = m2;
        }

        reading.time_on = field(be_u32_at(&memory, 0x6E), "time on")?;
        Ok(reading)
    }
}
