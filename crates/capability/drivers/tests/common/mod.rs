#![allow(dead_code)]

//! 驱动测试共用的模拟表计与应答帧构造

use async_trait::async_trait;
use meter_protocol::checksum::{SumStyle, additive_sum8, triple_checksum};
use meter_protocol::frame::with_crc16;
use meter_protocol::{Link, ProtocolError, ReadOutcome};
use std::collections::HashMap;
use std::time::Duration;

/// 按请求字节应答的内存表计。未登记的请求一直超时。
#[derive(Default)]
pub struct MockMeter {
    connected: bool,
    answers: HashMap<Vec<u8>, Vec<u8>>,
    pending: Vec<u8>,
    pub echo: bool,
    pub writes: Vec<Vec<u8>>,
}

impl MockMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(&mut self, request: impl Into<Vec<u8>>, response: Vec<u8>) -> &mut Self {
        self.answers.insert(request.into(), response);
        self
    }

    pub fn writes_of(&self, request: &[u8]) -> usize {
        self.writes.iter().filter(|write| write.as_slice() == request).count()
    }
}

#[async_trait]
impl Link for MockMeter {
    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn connect(&mut self) -> Result<(), ProtocolError> {
        self.connected = true;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ProtocolError> {
        self.connected = false;
        self.pending.clear();
        Ok(())
    }

    async fn write(&mut self, bytes: &[u8], _deadline: Duration) -> Result<(), ProtocolError> {
        if !self.connected {
            return Err(ProtocolError::Connection("not connected".to_string()));
        }
        self.writes.push(bytes.to_vec());
        self.pending.clear();
        if let Some(response) = self.answers.get(bytes) {
            if self.echo {
                self.pending.extend_from_slice(bytes);
            }
            self.pending.extend_from_slice(response);
        }
        Ok(())
    }

    async fn read(&mut self, buffer: &mut [u8], _deadline: Duration) -> ReadOutcome {
        if self.pending.is_empty() {
            return ReadOutcome::Timeout;
        }
        let n = self.pending.len().min(buffer.len());
        buffer[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        ReadOutcome::Data(n)
    }
}

/// A 族应答：`AAh addr !addr g c len data… sum`。
pub fn tem_response(address: u8, data: &[u8]) -> Vec<u8> {
    let mut frame = vec![0xAA, address, !address, 0x0F, 0x01, data.len() as u8];
    frame.extend_from_slice(data);
    frame.push(SumStyle::Inverted.compute(&frame));
    frame
}

/// B 族长帧应答。
pub fn mbus_response(payload: &[u8]) -> Vec<u8> {
    let len = payload.len() as u8;
    let mut frame = vec![0x68, len, len, 0x68];
    frame.extend_from_slice(payload);
    frame.push(additive_sum8(payload));
    frame.push(0x16);
    frame
}

/// C 族应答，`fill` 写入数据区（整帧下标）。
pub fn sku_response(block: usize, fill: impl FnOnce(&mut [u8])) -> Vec<u8> {
    let mut frame = vec![0u8; block];
    frame[0] = 0x68;
    frame[1..3].copy_from_slice(&(block as u16).to_be_bytes());
    frame[3] = 0x68;
    fill(&mut frame);
    let checksum = triple_checksum(&frame[..block - 4]);
    frame[block - 4..block - 1].copy_from_slice(&checksum);
    frame[block - 1] = 0x16;
    frame
}

/// D 族读保持寄存器应答。
pub fn modbus_response(station: u8, data: &[u8]) -> Vec<u8> {
    let mut body = vec![station, 0x03, data.len() as u8];
    body.extend_from_slice(data);
    with_crc16(&body)
}

pub fn put(buffer: &mut [u8], offset: usize, bytes: &[u8]) {
    buffer[offset..offset + bytes.len()].copy_from_slice(bytes);
}
