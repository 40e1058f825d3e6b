//! 页负载压缩/解压（LZ4 / None）
//!
//! 转换器默认不压缩（下游按定宽步长直接扫描），LZ4 作为可选的体积手段保留。

use crate::common::{EngineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionType {
    #[default]
    None,
    Lz4,
}

impl CompressionType {
    pub fn to_tag(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Lz4  => 1,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::None),
            1 => Some(Self::Lz4),
            _ => None,
        }
    }
}

pub fn compress(data: &[u8], codec: CompressionType) -> Result<Vec<u8>> {
    match codec {
        CompressionType::None => Ok(data.to_vec()),
        CompressionType::Lz4  =>
            lz4::block::compress(data, None, false)
                .map_err(|e| EngineError::Compression(e.to_string())),
    }
}

pub fn decompress(
    data:             &[u8],
    codec:            CompressionType,
    uncompressed_len: usize,
) -> Result<Vec<u8>> {
    match codec {
        CompressionType::None => Ok(data.to_vec()),
        CompressionType::Lz4  =>
            lz4::block::decompress(data, Some(uncompressed_len as i32))
                .map_err(|e| EngineError::Compression(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lz4_round_trip() {
        let data: Vec<u8> = (0..4096u32).flat_map(|i| (i % 7).to_le_bytes()).collect();
        let packed = compress(&data, CompressionType::Lz4).unwrap();
        assert!(packed.len() < data.len());
        let unpacked = decompress(&packed, CompressionType::Lz4, data.len()).unwrap();
        assert_eq!(unpacked, data);
    }

    #[test]
    fn none_is_identity() {
        let data = b"plain".to_vec();
        assert_eq!(compress(&data, CompressionType::None).unwrap(), data);
    }
}
