//! 数值解码原语
//!
//! 大端整数拼装、IEEE-754 位模式还原、压缩 BCD 解码。
//! 定宽数组入参的函数不会失败；按偏移读取的 `*_at` 版本越界时返回 `None`。

pub fn be_u16(bytes: [u8; 2]) -> u16 {
    u16::from_be_bytes(bytes)
}

pub fn be_u32(bytes: [u8; 4]) -> u32 {
    u32::from_be_bytes(bytes)
}

pub fn be_u64(bytes: [u8; 8]) -> u64 {
    u64::from_be_bytes(bytes)
}

/// 按位还原 f32（不是数值转换）。
pub fn f32_from_bits(bits: u32) -> f32 {
    f32::from_bits(bits)
}

/// 按位还原 f64（不是数值转换）。
pub fn f64_from_bits(bits: u64) -> f64 {
    f64::from_bits(bits)
}

pub fn be_f32(bytes: [u8; 4]) -> f32 {
    f32_from_bits(be_u32(bytes))
}

pub fn be_f64(bytes: [u8; 8]) -> f64 {
    f64_from_bits(be_u64(bytes))
}

/// 反转字节序后按大端解释，即小端读取。
pub fn le_u16(mut bytes: [u8; 2]) -> u16 {
    bytes.reverse();
    be_u16(bytes)
}

pub fn le_u32(mut bytes: [u8; 4]) -> u32 {
    bytes.reverse();
    be_u32(bytes)
}

pub fn le_f32(mut bytes: [u8; 4]) -> f32 {
    bytes.reverse();
    be_f32(bytes)
}

/// 从 `offset` 处取出 N 个字节。
pub fn array_at<const N: usize>(buffer: &[u8], offset: usize) -> Option<[u8; N]> {
    let end = offset.checked_add(N)?;
    buffer.get(offset..end)?.try_into().ok()
}

pub fn be_u16_at(buffer: &[u8], offset: usize) -> Option<u16> {
    array_at(buffer, offset).map(be_u16)
}

pub fn be_u32_at(buffer: &[u8], offset: usize) -> Option<u32> {
    array_at(buffer, offset).map(be_u32)
}

pub fn be_f32_at(buffer: &[u8], offset: usize) -> Option<f32> {
    array_at(buffer, offset).map(be_f32)
}

pub fn be_f64_at(buffer: &[u8], offset: usize) -> Option<f64> {
    array_at(buffer, offset).map(be_f64)
}

/// 压缩 BCD 解码，失败时返回 0。
///
/// 0 同时也是合法读数，需要区分时请使用 [`try_decode_bcd`]。
pub fn decode_bcd(bytes: &[u8]) -> u64 {
    try_decode_bcd(bytes).unwrap_or(0)
}

/// 压缩 BCD 解码。
///
/// 每字节两位十进制数（高半字节在前）。最后一个字节低半字节为 `0xF` 时视为奇数位结束符，
/// 只取该字节高半字节。其余位置出现大于 9 的半字节返回 `None`。
pub fn try_decode_bcd(bytes: &[u8]) -> Option<u64> {
    let mut value: u64 = 0;
    for (index, byte) in bytes.iter().enumerate() {
        let hi = u64::from(byte >> 4);
        let lo = u64::from(byte & 0x0F);
        if hi > 9 {
            return None;
        }
        if lo == 0x0F && index == bytes.len() - 1 {
            return value.checked_mul(10)?.checked_add(hi);
        }
        if lo > 9 {
            return None;
        }
        value = value.checked_mul(100)?.checked_add(10 * hi + lo)?;
    }
    Some(value)
}

/// 单字节 BCD 校正：`0x22` -> `22`。
pub fn bcd_byte(byte: u8) -> Option<u8> {
    try_decode_bcd(&[byte]).map(|value| value as u8)
}
