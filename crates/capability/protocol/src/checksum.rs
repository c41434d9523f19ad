//! 校验和算法
//!
//! 各设备族使用的校验方式互不兼容，且无法从帧内容判断该用哪一种，
//! 由选定的协议适配器决定。

use crc::{CRC_16_MODBUS, Crc};

const CRC_MODBUS: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

/// 单字节和校验的两种变体。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SumStyle {
    /// 字节和取模 256（M-Bus 类）
    Additive,
    /// 字节和按位取反（ТЭМ 类）
    Inverted,
}

impl SumStyle {
    pub fn compute(self, bytes: &[u8]) -> u8 {
        match self {
            Self::Additive => additive_sum8(bytes),
            Self::Inverted => inverted_sum8(bytes),
        }
    }
}

/// 所有字节之和，取模 256。
pub fn additive_sum8(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |sum, byte| sum.wrapping_add(*byte))
}

/// [`additive_sum8`] 的按位取反。
pub fn inverted_sum8(bytes: &[u8]) -> u8 {
    !additive_sum8(bytes)
}

/// CRC-16/MODBUS（多项式 0xA001 反射，初值 0xFFFF）。
pub fn crc16_modbus(bytes: &[u8]) -> u16 {
    CRC_MODBUS.checksum(bytes)
}

/// 帧尾形式的 CRC，低字节在前。
pub fn crc16_modbus_trailer(bytes: &[u8]) -> [u8; 2] {
    crc16_modbus(bytes).to_le_bytes()
}

/// 三字节校验 `[c1, c2, c3]`。
///
/// `c1` 为全部字节异或；`c3` 为字节和再加上 `c1 * 2`；`c2 = c3 ^ 0xFF`。
/// 所有运算按 8 位回绕。
pub fn triple_checksum(bytes: &[u8]) -> [u8; 3] {
    let (xor, sum) = bytes
        .iter()
        .fold((0u8, 0u8), |(xor, sum), byte| (xor ^ byte, sum.wrapping_add(*byte)));
    let c3 = sum.wrapping_add(xor.wrapping_mul(2));
    [xor, c3 ^ 0xFF, c3]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sum8_variants() {
        assert_eq!(additive_sum8(&[0x40, 0x01]), 0x41);
        assert_eq!(inverted_sum8(&[0x40, 0x01]), 0xBE);
        assert_eq!(additive_sum8(&[0xFF, 0x02]), 0x01);
        assert_eq!(SumStyle::Additive.compute(&[0x53, 0x01, 0x50, 0x10]), 0xB4);
        assert_eq!(SumStyle::Inverted.compute(&[0x40, 0x01]), 0xBE);
    }

    #[test]
    fn test_crc16_modbus_reference_vector() {
        let frame = [0x01, 0x03, 0x00, 0x00, 0x00, 0x0A];
        assert_eq!(crc16_modbus(&frame), 0xCDC5);
        assert_eq!(crc16_modbus_trailer(&frame), [0xC5, 0xCD]);
    }

    #[test]
    fn test_triple_checksum() {
        assert_eq!(triple_checksum(&[0x01, 0x02]), [0x03, 0xF6, 0x09]);
        assert_eq!(triple_checksum(&[]), [0x00, 0xFF, 0x00]);
        // 回绕不应 panic
        let checksum = triple_checksum(&[0xFF; 40]);
        assert_eq!(checksum[1], checksum[2] ^ 0xFF);
    }
}
