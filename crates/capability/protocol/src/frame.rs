//! 帧构造与帧校验
//!
//! 校验函数签名统一为 `(&[u8]) -> bool`，供交换引擎判断已累积的应答是否为完整、合法的帧。
//! 校验顺序固定：最短长度 → 结构标志 → 声明长度 → 校验和。任何不完整或非法的缓冲区只返回
//! `false`，交换引擎据此继续读取。
//!
//! ```text
//! A  55h addr !addr body… sum            →  AAh addr !addr … len data… sum
//! B  10h C A sum 16h / 68h L L 68h …     →  E5h / 68h L L 68h data… sum 16h
//! C  68h len(BE) 68h … c1 c2 c3 16h      →  同结构
//! D  station fn data… crc(LE)            →  station fn n data… crc(LE)
//! ```

use crate::checksum::{SumStyle, crc16_modbus_trailer, triple_checksum};
use crate::codec::be_u16;
use tracing::debug;

pub const TEM_REQUEST_START: u8 = 0x55;
pub const TEM_RESPONSE_START: u8 = 0xAA;
/// 6 字节头 + 1 字节校验（数据区可为空）
pub const TEM_FRAME_MIN_LEN: usize = 7;
const TEM_HEADER_LEN: usize = 6;

pub const MBUS_ACK: u8 = 0xE5;
pub const MBUS_SHORT_START: u8 = 0x10;
pub const MBUS_LONG_START: u8 = 0x68;
pub const MBUS_STOP: u8 = 0x16;
/// `68h L L 68h C A CI sum 16h`
pub const MBUS_LONG_FRAME_MIN_LEN: usize = 9;

pub const SKU_START: u8 = 0x68;
pub const SKU_STOP: u8 = 0x16;
pub const SKU_COMMAND_LEN: usize = 34;
/// 命令字节在命令帧中的位置
pub const SKU_COMMAND_OFFSET: usize = 29;
/// `68h len len 68h` + 三字节校验 + 停止位
pub const SKU_FRAME_MIN_LEN: usize = 8;
const SKU_DEVICE_TYPE: u8 = 0x02;

pub const MODBUS_READ_HOLDING: u8 = 0x03;
/// 站号 + 功能码 + 字节数 + 2 字节 CRC
pub const MODBUS_FRAME_MIN_LEN: usize = 5;

// ---------------------------------------------------------------------------
// A 族：固定起始字节 + 地址取反 + 取反和校验
// ---------------------------------------------------------------------------

/// 构造 A 族命令：`55h addr !addr body… invertedSum8`。
pub fn tem_command(address: u8, body: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(body.len() + 4);
    frame.extend_from_slice(&[TEM_REQUEST_START, address, !address]);
    frame.extend_from_slice(body);
    frame.push(SumStyle::Inverted.compute(&frame));
    frame
}

/// A 族应答校验。第 6 字节为数据区长度，校验字节紧随数据区。
pub fn tem_frame(buffer: &[u8]) -> bool {
    if buffer.len() < TEM_FRAME_MIN_LEN {
        return false;
    }
    if buffer[0] != TEM_RESPONSE_START || !buffer[1] != buffer[2] {
        return false;
    }
    let declared = TEM_HEADER_LEN + usize::from(buffer[5]);
    if buffer.len() < declared + 1 {
        return false;
    }
    verify_sum(SumStyle::Inverted, &buffer[..declared], buffer[declared])
}

// ---------------------------------------------------------------------------
// B 族：M-Bus 类单字节确认与长帧
// ---------------------------------------------------------------------------

/// 短帧 `10h C A sum 16h`。
pub fn mbus_short_frame(control: u8, address: u8) -> [u8; 5] {
    [
        MBUS_SHORT_START,
        control,
        address,
        SumStyle::Additive.compute(&[control, address]),
        MBUS_STOP,
    ]
}

/// 长帧 `68h L L 68h C A CI data… sum 16h`，`L = 3 + data.len()`。
///
/// 调用方保证 `data.len() <= 252`。
pub fn mbus_long_request(control: u8, address: u8, ci: u8, data: &[u8]) -> Vec<u8> {
    let len = (3 + data.len()) as u8;
    let mut frame = Vec::with_capacity(data.len() + 9);
    frame.extend_from_slice(&[MBUS_LONG_START, len, len, MBUS_LONG_START, control, address, ci]);
    frame.extend_from_slice(data);
    frame.push(SumStyle::Additive.compute(&frame[4..]));
    frame.push(MBUS_STOP);
    frame
}

/// 单字节确认：首字节为 `E5h` 即表示设备已接受。
pub fn mbus_ack(buffer: &[u8]) -> bool {
    buffer.first() == Some(&MBUS_ACK)
}

/// 长帧校验。两个长度字节必须一致，且限定整帧长度。
pub fn mbus_long_frame(buffer: &[u8]) -> bool {
    if buffer.len() < MBUS_LONG_FRAME_MIN_LEN {
        return false;
    }
    if buffer[0] != MBUS_LONG_START || buffer[3] != MBUS_LONG_START || buffer[1] != buffer[2] {
        return false;
    }
    let payload_end = 4 + usize::from(buffer[1]);
    if buffer.len() < payload_end + 2 {
        return false;
    }
    if buffer[payload_end + 1] != MBUS_STOP {
        return false;
    }
    verify_sum(SumStyle::Additive, &buffer[4..payload_end], buffer[payload_end])
}

// ---------------------------------------------------------------------------
// C 族：定长命令帧 + 三字节校验
// ---------------------------------------------------------------------------

/// 构造 34 字节命令帧，除命令字节外数据区全零。
pub fn sku_command(command: u8) -> [u8; SKU_COMMAND_LEN] {
    let mut frame = [0u8; SKU_COMMAND_LEN];
    frame[0] = SKU_START;
    frame[1..3].copy_from_slice(&(SKU_COMMAND_LEN as u16).to_be_bytes());
    frame[3] = SKU_START;
    frame[5] = SKU_DEVICE_TYPE;
    frame[SKU_COMMAND_OFFSET] = command;
    let checksum = triple_checksum(&frame[..SKU_COMMAND_LEN - 4]);
    frame[SKU_COMMAND_LEN - 4..SKU_COMMAND_LEN - 1].copy_from_slice(&checksum);
    frame[SKU_COMMAND_LEN - 1] = SKU_STOP;
    frame
}

/// C 族应答校验。第 1..3 字节为大端整帧长度。
pub fn sku_frame(buffer: &[u8]) -> bool {
    if buffer.len() < SKU_FRAME_MIN_LEN {
        return false;
    }
    if buffer[0] != SKU_START || buffer[3] != SKU_START {
        return false;
    }
    let block = usize::from(be_u16([buffer[1], buffer[2]]));
    if block < SKU_FRAME_MIN_LEN || buffer.len() < block {
        return false;
    }
    if buffer[block - 1] != SKU_STOP {
        return false;
    }
    let expected = triple_checksum(&buffer[..block - 4]);
    let matches = expected == buffer[block - 4..block - 1];
    if !matches {
        debug!(
            expected = %hex::encode_upper(&expected),
            received = %hex::encode_upper(&buffer[block - 4..block - 1]),
            "triple checksum mismatch"
        );
    }
    matches
}

// ---------------------------------------------------------------------------
// D 族：站号 + 功能码 + CRC16/MODBUS
// ---------------------------------------------------------------------------

/// 追加小端 CRC 帧尾。
pub fn with_crc16(body: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(body.len() + 2);
    frame.extend_from_slice(body);
    frame.extend_from_slice(&crc16_modbus_trailer(body));
    frame
}

/// 读保持寄存器命令。
pub fn modbus_read_command(station: u8, register: u16, count: u16) -> Vec<u8> {
    let [reg_hi, reg_lo] = register.to_be_bytes();
    let [count_hi, count_lo] = count.to_be_bytes();
    with_crc16(&[station, MODBUS_READ_HOLDING, reg_hi, reg_lo, count_hi, count_lo])
}

/// 生成指定站号和功能码的应答校验函数。
///
/// 异常应答（功能码最高位置位）不会匹配。
pub fn modbus_rtu_frame(station: u8, function: u8) -> impl Fn(&[u8]) -> bool + Send + Sync {
    move |buffer: &[u8]| {
        if buffer.len() < MODBUS_FRAME_MIN_LEN {
            return false;
        }
        if buffer[0] != station || buffer[1] != function {
            return false;
        }
        let payload_end = 3 + usize::from(buffer[2]);
        if buffer.len() < payload_end + 2 {
            return false;
        }
        crc16_modbus_trailer(&buffer[..payload_end]) == buffer[payload_end..payload_end + 2]
    }
}

/// 读保持寄存器应答的数据区（去掉站号、功能码、字节数与 CRC）。
///
/// 调用方应先用 [`modbus_rtu_frame`] 校验。
pub fn modbus_payload(frame: &[u8]) -> &[u8] {
    let end = frame
        .get(2)
        .map(|count| 3 + usize::from(*count))
        .unwrap_or(0)
        .min(frame.len());
    frame.get(3..end).unwrap_or(&[])
}

fn verify_sum(style: SumStyle, covered: &[u8], received: u8) -> bool {
    let expected = style.compute(covered);
    if expected != received {
        debug!(
            expected = format_args!("{:02X}", expected),
            received = format_args!("{:02X}", received),
            "checksum mismatch"
        );
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::additive_sum8;

    fn tem_response(address: u8, data: &[u8]) -> Vec<u8> {
        let mut frame = vec![TEM_RESPONSE_START, address, !address, 0x0F, 0x01, data.len() as u8];
        frame.extend_from_slice(data);
        frame.push(SumStyle::Inverted.compute(&frame));
        frame
    }

    fn mbus_long_response(payload: &[u8]) -> Vec<u8> {
        let len = payload.len() as u8;
        let mut frame = vec![0x68, len, len, 0x68];
        frame.extend_from_slice(payload);
        frame.push(additive_sum8(payload));
        frame.push(0x16);
        frame
    }

    #[test]
    fn test_tem_command_layout() {
        let frame = tem_command(0x01, &[0x0F, 0x01, 0x03, 0x00, 0x00, 0x80]);
        assert_eq!(&frame[..3], &[0x55, 0x01, 0xFE]);
        assert_eq!(frame.len(), 10);
        assert_eq!(*frame.last().unwrap(), SumStyle::Inverted.compute(&frame[..9]));
    }

    #[test]
    fn test_tem_frame() {
        let frame = tem_response(0x03, &[0x10, 0x20, 0x30]);
        assert!(tem_frame(&frame));
        // 截断
        assert!(!tem_frame(&frame[..frame.len() - 1]));
        // 地址取反不符
        let mut broken = frame.clone();
        broken[2] = 0x00;
        assert!(!tem_frame(&broken));
        // 校验和错误
        let mut broken = frame.clone();
        broken[7] ^= 0x01;
        assert!(!tem_frame(&broken));
    }

    #[test]
    fn test_mbus_short_frame() {
        assert_eq!(mbus_short_frame(0x40, 0x01), [0x10, 0x40, 0x01, 0x41, 0x16]);
    }

    #[test]
    fn test_mbus_long_request() {
        let frame = mbus_long_request(0x53, 0x01, 0x50, &[0x10]);
        assert_eq!(frame, vec![0x68, 0x04, 0x04, 0x68, 0x53, 0x01, 0x50, 0x10, 0xB4, 0x16]);
        assert!(mbus_long_frame(&frame));
    }

    #[test]
    fn test_mbus_ack() {
        assert!(mbus_ack(&[0xE5]));
        assert!(!mbus_ack(&[]));
        assert!(!mbus_ack(&[0x10, 0xE5]));
    }

    #[test]
    fn test_mbus_long_frame() {
        let frame = mbus_long_response(&[0x08, 0x01, 0x72, 0x78, 0x56, 0x34, 0x12]);
        assert!(mbus_long_frame(&frame));

        let mut torn = frame.clone();
        torn[2] = torn[1] + 1;
        assert!(!mbus_long_frame(&torn));

        let mut bad_stop = frame.clone();
        let last = bad_stop.len() - 1;
        bad_stop[last] = 0x00;
        assert!(!mbus_long_frame(&bad_stop));

        let mut bad_sum = frame.clone();
        bad_sum[5] ^= 0xFF;
        assert!(!mbus_long_frame(&bad_sum));
    }

    #[test]
    fn test_sku_command() {
        let frame = sku_command(0x20);
        assert_eq!(frame.len(), 34);
        assert_eq!(&frame[..6], &[0x68, 0x00, 0x22, 0x68, 0x00, 0x02]);
        assert_eq!(frame[29], 0x20);
        assert_eq!(frame[33], 0x16);
        assert!(sku_frame(&frame));

        let mut broken = frame;
        broken[31] ^= 0x01;
        assert!(!sku_frame(&broken));
    }

    #[test]
    fn test_sku_frame_rejects_short_block() {
        // 声明长度小于最短帧
        assert!(!sku_frame(&[0x68, 0x00, 0x02, 0x68, 0, 0, 0, 0x16]));
        // 声明长度大于实际长度
        let frame = sku_command(0x28);
        assert!(!sku_frame(&frame[..20]));
    }

    #[test]
    fn test_modbus_read_command() {
        let frame = modbus_read_command(0x01, 0x0000, 0x000A);
        assert_eq!(frame, vec![0x01, 0x03, 0x00, 0x00, 0x00, 0x0A, 0xC5, 0xCD]);
    }

    #[test]
    fn test_modbus_rtu_frame() {
        let frame = with_crc16(&[0x05, 0x03, 0x02, 0x00, 0x01]);
        let validator = modbus_rtu_frame(0x05, 0x03);
        assert!(validator(&frame));
        assert_eq!(modbus_payload(&frame), &[0x00, 0x01]);
        assert!(!modbus_rtu_frame(0x06, 0x03)(&frame));

        let mut broken = frame.clone();
        broken[4] = 0x02;
        assert!(!validator(&broken));

        // 异常应答
        let exception = with_crc16(&[0x05, 0x83, 0x02]);
        assert!(!validator(&exception));
    }

    #[test]
    fn test_validators_reject_short_buffers() {
        let modbus = modbus_rtu_frame(0x01, 0x03);
        let tem = tem_response(0x01, &[]);
        let mbus = mbus_long_request(0x08, 0x01, 0x72, &[]);
        let sku = sku_command(0x20);
        let modbus_ok = with_crc16(&[0x01, 0x03, 0x00]);

        for len in 0..TEM_FRAME_MIN_LEN {
            assert!(!tem_frame(&tem[..len]));
        }
        for len in 0..MBUS_LONG_FRAME_MIN_LEN {
            assert!(!mbus_long_frame(&mbus[..len]));
        }
        for len in 0..SKU_FRAME_MIN_LEN {
            assert!(!sku_frame(&sku[..len]));
        }
        for len in 0..MODBUS_FRAME_MIN_LEN {
            assert!(!modbus(&modbus_ok[..len]));
        }
        assert!(!mbus_ack(&[]));

        // 完整最短帧可以通过
        assert!(tem_frame(&tem));
        assert!(mbus_long_frame(&mbus));
        assert!(modbus(&modbus_ok));
    }
}
