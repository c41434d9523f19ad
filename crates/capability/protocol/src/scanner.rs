//! 标签寻址值扫描
//!
//! 变长应答（DIB/VIB 类记录）中的值按前导字节模式定位，而不是固定偏移。
//! 返回的字节按缓冲区原顺序给出，字节序由调用方按协议调整。

/// 一条标签记录：标签字节模式 + 值宽度。
///
/// 同一逻辑字段在不同固件版本中可能使用不同标签，调用方按优先级列出多条记录。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagRecord<'a> {
    pub tag: &'a [u8],
    pub width: usize,
}

impl<'a> TagRecord<'a> {
    pub const fn new(tag: &'a [u8], width: usize) -> Self {
        Self { tag, width }
    }
}

/// 在 `buffer` 中查找 `tag` 第一次出现的位置，返回其后紧跟的 `width` 个字节。
///
/// 标签不存在或剩余字节不足 `width` 时返回 `None`，不会返回不完整的切片。
pub fn grab<'b>(buffer: &'b [u8], tag: &[u8], width: usize) -> Option<&'b [u8]> {
    if tag.is_empty() || tag.len() > buffer.len() {
        return None;
    }
    let index = buffer.windows(tag.len()).position(|window| window == tag)?;
    let start = index + tag.len();
    buffer.get(start..start.checked_add(width)?)
}

/// 定宽版本的 [`grab`]。
pub fn grab_array<const N: usize>(buffer: &[u8], tag: &[u8]) -> Option<[u8; N]> {
    grab(buffer, tag, N)?.try_into().ok()
}

/// 按顺序尝试多条记录，返回第一条命中的记录下标与值字节。
pub fn grab_first<'b>(buffer: &'b [u8], records: &[TagRecord<'_>]) -> Option<(usize, &'b [u8])> {
    records
        .iter()
        .enumerate()
        .find_map(|(index, record)| grab(buffer, record.tag, record.width).map(|value| (index, value)))
}
