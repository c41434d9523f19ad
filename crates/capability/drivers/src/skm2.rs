//! СКМ-2 驱动（B 族，M-Bus EN 60870-5）
//!
//! 地址 `FEh` 为广播地址，`0` 为未配置设备，`1..=250` 为从站。
//! 当前数据以变长记录（DIB/VIB + 值）返回，值为小端序。
//! 同一字段在不同固件中可能有多个标签，按表中顺序取第一个命中的。

use crate::driver::DeviceDriver;
use crate::error::{DriverError, field};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, Utc};
use domain::{Coefficients, EnergyUnit, Reading, SystemReading};
use meter_protocol::codec::{le_f32, le_u16, le_u32};
use meter_protocol::frame::{mbus_ack, mbus_long_frame, mbus_long_request, mbus_short_frame};
use meter_protocol::{Link, RequestSpec, TagRecord, execute, grab_array, grab_first};
use tracing::{debug, info};

const SND_NKE: u8 = 0x40;
const SND_UD: u8 = 0x53;
const REQ_UD2: u8 = 0x5B;
const CI_APPLICATION_RESET: u8 = 0x50;

/// 长帧中固定数据头之后的第一个记录位置
const RECORDS_START: usize = 19;
/// 能量换算：厂家上位机使用 1 MWh = 1/1.163 Gcal
const MWH_TO_GCAL: f64 = 1.0 / 1.163;

/// 记录值的解码方式。
#[derive(Debug, Clone, Copy)]
enum Decode {
    /// 4 字节无符号计数乘以系数
    Counter(f64),
    /// 4 字节 IEEE-754
    Float,
    /// 2 字节，0.01 °C
    Temperature,
    /// 3 字节，0.0001 MPa
    Pressure,
    /// 4 字节秒数
    Seconds,
}

impl Decode {
    fn width(self) -> usize {
        match self {
            Self::Temperature => 2,
            Self::Pressure => 3,
            Self::Counter(_) | Self::Float | Self::Seconds => 4,
        }
    }

    fn apply(self, value: &[u8]) -> Option<f64> {
        Some(match self {
            Self::Counter(factor) => f64::from(le_u32(value.try_into().ok()?)) * factor,
            Self::Float => f64::from(le_f32(value.try_into().ok()?)),
            Self::Temperature => f64::from(le_u16(value.try_into().ok()?)) * 0.01,
            Self::Pressure => {
                let [b0, b1, b2]: [u8; 3] = value.try_into().ok()?;
                f64::from(le_u32([b0, b1, b2, 0])) * 0.0001
            }
            Self::Seconds => f64::from(le_u32(value.try_into().ok()?)),
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum Field {
    SigmaQ,
    V1,
    V2,
    M1,
    M2,
    Gv1,
    Gv2,
    Gm1,
    Gm2,
    T1,
    T2,
    T3,
    P1,
    P2,
    TimeRun,
}

impl Field {
    fn store(self, system: &mut SystemReading, value: f64) {
        match self {
            Self::SigmaQ => system.sigma_q = value,
            Self::V1 => system.v1 = value,
            Self::V2 => system.v2 = value,
            Self::M1 => system.m1 = value,
            Self::M2 => system.m2 = value,
            Self::Gv1 => system.gv1 = value as f32,
            Self::Gv2 => system.gv2 = value as f32,
            Self::Gm1 => system.gm1 = value as f32,
            Self::Gm2 => system.gm2 = value as f32,
            Self::T1 => system.t1 = value as f32,
            Self::T2 => system.t2 = value as f32,
            Self::T3 => system.t3 = value as f32,
            Self::P1 => system.p1 = value as f32,
            Self::P2 => system.p2 = value as f32,
            Self::TimeRun => system.time_run = value as u32,
        }
    }
}

struct Entry {
    system: usize,
    field: Field,
    alternatives: &'static [(&'static [u8], Decode)],
}

const fn entry(
    system: usize,
    field: Field,
    alternatives: &'static [(&'static [u8], Decode)],
) -> Entry {
    Entry {
        system,
        field,
        alternatives,
    }
}

#[rustfmt::skip]
const RECORDS: &[Entry] = &[
    // 第一系统。能量标签顺序不能调换，否则 Q3 会被当作 ΣQ
    entry(0, Field::SigmaQ, &[
        (&[0x04, 0x07], Decode::Counter(0.01)),
        (&[0x04, 0x06], Decode::Counter(0.001)),
        (&[0x84, 0x80, 0x40, 0x07], Decode::Counter(0.01)),
        (&[0x84, 0x80, 0x40, 0x06], Decode::Counter(0.001)),
    ]),
    entry(0, Field::M1, &[(&[0x04, 0x1B], Decode::Counter(0.001))]),
    entry(0, Field::M2, &[(&[0x84, 0x40, 0x1B], Decode::Counter(0.001))]),
    // 更换主板后 VIF 可能变为 14h
    entry(0, Field::V1, &[
        (&[0x04, 0x13], Decode::Counter(0.001)),
        (&[0x04, 0x14], Decode::Counter(0.01)),
    ]),
    entry(0, Field::V2, &[
        (&[0x84, 0x40, 0x13], Decode::Counter(0.001)),
        (&[0x84, 0x40, 0x14], Decode::Counter(0.01)),
    ]),
    entry(0, Field::Gm1, &[(&[0x05, 0x56], Decode::Float)]),
    entry(0, Field::Gm2, &[(&[0x85, 0x40, 0x56], Decode::Float)]),
    entry(0, Field::Gv1, &[(&[0x05, 0x3E], Decode::Float)]),
    entry(0, Field::Gv2, &[(&[0x85, 0x40, 0x3E], Decode::Float)]),
    entry(0, Field::T1, &[(&[0x02, 0x59], Decode::Temperature)]),
    entry(0, Field::T2, &[(&[0x02, 0x5D], Decode::Temperature)]),
    entry(0, Field::T3, &[(&[0x02, 0x65], Decode::Temperature)]),
    entry(0, Field::P1, &[(&[0x03, 0x68], Decode::Pressure)]),
    entry(0, Field::P2, &[(&[0x83, 0x40, 0x68], Decode::Pressure)]),
    entry(0, Field::TimeRun, &[(&[0x84, 0x40, 0x24], Decode::Seconds)]),
    // 第二系统
    entry(1, Field::SigmaQ, &[
        (&[0x84, 0x40, 0x07], Decode::Counter(0.01)),
        (&[0x84, 0x40, 0x06], Decode::Counter(0.001)),
    ]),
    entry(1, Field::V1, &[(&[0x84, 0xC0, 0x40, 0x13], Decode::Counter(0.001))]),
    entry(1, Field::V2, &[(&[0x84, 0x80, 0x80, 0x40, 0x13], Decode::Counter(0.001))]),
    entry(1, Field::M1, &[(&[0x84, 0xC0, 0x40, 0x1B], Decode::Counter(0.001))]),
    entry(1, Field::M2, &[(&[0x84, 0x80, 0x80, 0x40, 0x1B], Decode::Counter(0.001))]),
    entry(1, Field::Gv1, &[(&[0x85, 0x80, 0x40, 0x3E], Decode::Float)]),
    entry(1, Field::Gv2, &[(&[0x85, 0xC0, 0x40, 0x3E], Decode::Float)]),
    entry(1, Field::Gm1, &[(&[0x85, 0x80, 0x40, 0x56], Decode::Float)]),
    entry(1, Field::Gm2, &[(&[0x85, 0xC0, 0x40, 0x56], Decode::Float)]),
    entry(1, Field::T1, &[(&[0x82, 0x40, 0x59], Decode::Temperature)]),
    entry(1, Field::T2, &[(&[0x82, 0x40, 0x5D], Decode::Temperature)]),
    entry(1, Field::P1, &[(&[0x83, 0x80, 0x40, 0x68], Decode::Pressure)]),
    entry(1, Field::P2, &[(&[0x83, 0xC0, 0x40, 0x68], Decode::Pressure)]),
    entry(1, Field::TimeRun, &[(&[0x84, 0x80, 0x40, 0x24], Decode::Seconds)]),
];

const TIME_RUN_COMMON: &[u8] = &[0x04, 0x24];
const TIME_ON: &[u8] = &[0x04, 0x20];
const DEVICE_TIME: &[u8] = &[0x04, 0x6D];

pub struct Skm2Driver {
    address: Option<u8>,
}

impl Skm2Driver {
    pub fn new() -> Self {
        Self { address: None }
    }
}

impl Default for Skm2Driver {
    fn default() -> Self {
        Self::new()
    }
}

/// 按记录表解出两个系统的值。找到任一字段的系统视为启用。
fn decode_records(records: &[u8], reading: &mut Reading) {
    reading.ensure_systems(2);
    for entry in RECORDS {
        let tags: Vec<TagRecord<'_>> = entry
            .alternatives
            .iter()
            .map(|(tag, decode)| TagRecord::new(tag, decode.width()))
            .collect();
        let Some((index, value)) = grab_first(records, &tags) else {
            continue;
        };
        let Some(value) = entry.alternatives[index].1.apply(value) else {
            continue;
        };
        let system = reading.system_mut(entry.system);
        system.active = true;
        entry.field.store(system, value);
    }

    if let Some(value) = grab_array::<4>(records, TIME_RUN_COMMON) {
        reading.time_run_common = le_u32(value);
    }
    if let Some(value) = grab_array::<4>(records, TIME_ON) {
        reading.time_on = le_u32(value);
    }
    if let Some(value) = grab_array::<4>(records, DEVICE_TIME) {
        reading.device_time = decode_mbus_time(value);
    }
}

/// M-Bus F 型时间（分、时、日+年低位、月+年高位）。
fn decode_mbus_time(value: [u8; 4]) -> Option<NaiveDateTime> {
    let minute = u32::from(value[0] & 0x3F);
    let hour = u32::from(value[1] & 0x1F);
    let day = u32::from(value[2] & 0x1F);
    let month = u32::from(value[3] & 0x0F);
    let year = 2000 + i32::from(value[2] >> 5) + i32::from((value[3] & 0xF0) >> 1);
    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, 0)
}

#[async_trait]
impl DeviceDriver for Skm2Driver {
    fn name(&self) -> &'static str {
        "skm2"
    }

    async fn initialize(&mut self, address: u8, link: &mut dyn Link) -> Result<(), DriverError> {
        info!(address, "initializing skm2");
        let spec = RequestSpec::new(mbus_short_frame(SND_NKE, address)).with_validator(mbus_ack);
        execute(link, &spec).await?;
        self.address = Some(address);
        Ok(())
    }

    async fn read(&mut self, link: &mut dyn Link) -> Result<Reading, DriverError> {
        let address = self.address.ok_or(DriverError::NotInitialized("skm2"))?;

        info!(address, "requesting current data");
        let reset = mbus_long_request(SND_UD, address, CI_APPLICATION_RESET, &[0x10]);
        execute(link, &RequestSpec::new(reset).with_validator(mbus_ack)).await?;

        let mut reading = Reading::new(EnergyUnit::Mwh);
        reading.requested_at = Utc::now();
        reading.coefficients = Coefficients::from_mwh(MWH_TO_GCAL);

        info!(address, "reading response data");
        let spec = RequestSpec::new(mbus_short_frame(REQ_UD2, address))
            .with_validator(mbus_long_frame);
        let response = execute(link, &spec).await?;

        let ident = field(response.get(7..11), "identification number")?;
        reading.serial = ident.iter().rev().map(|byte| format!("{byte:02x}")).collect();
        let records = field(response.get(RECORDS_START..), "data records")?;
        decode_records(records, &mut reading);
        debug!(
            serial = %reading.serial,
            active = reading.active_systems().count(),
            "skm2 records decoded"
        );
        Ok(reading)
    }
}
