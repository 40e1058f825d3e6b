//! Data Page 读写
//!
//! ```text
//! ┌──────────────────────────────────┐
//! │ value_count  (u32 LE)            │
//! │ first_row_id (u64 LE)            │
//! │ uncomp_size  (u32 LE)            │
//! │ payload      (定宽值 × count，   │
//! │               可选 LZ4)          │
//! │ CRC32        (u32 LE)            │
//! └──────────────────────────────────┘
//! ```
//!
//! payload 是页内全部值按列类型的定宽小端编码；解码必须带上列的
//! `FieldType`，不存在无类型的猜测式解码。CRC 覆盖其前的全部字节。

use crate::common::{EngineError, Result, RowId};
use crate::compression::{self, CompressionType};
use crate::field_type::{FieldType, Value};

/// 每页最多容纳的行数
pub const PAGE_MAX_ROWS: usize = 1024;

/// 页头字节数（count + first_row_id + uncomp_size）
const PAGE_HEADER_LEN: usize = 16;

// ── PageBuilder ───────────────────────────────────────────────────────────────

pub struct PageBuilder {
    pub first_row_id: RowId,
    field_type:       FieldType,
    compression:      CompressionType,
    values:           Vec<Value>,
}

impl PageBuilder {
    pub fn new(
        first_row_id: RowId,
        field_type:   FieldType,
        compression:  CompressionType,
    ) -> Self {
        Self {
            first_row_id,
            field_type,
            compression,
            values: Vec::with_capacity(PAGE_MAX_ROWS),
        }
    }

    /// 追加一个值；类型由上游列写入器保证与列一致
    pub fn add(&mut self, v: Value) {
        self.values.push(v);
    }

    pub fn len(&self)      -> usize { self.values.len() }
    pub fn is_empty(&self) -> bool  { self.values.is_empty() }
    pub fn is_full(&self)  -> bool  { self.values.len() >= PAGE_MAX_ROWS }

    /// 序列化为页字节（定宽编码 → 压缩 → header + CRC）
    pub fn build(self) -> Result<Vec<u8>> {
        let count = self.values.len() as u32;
        let mut encoded = Vec::with_capacity(self.values.len() * self.field_type.fixed_size());
        for v in &self.values {
            v.encode(&mut encoded);
        }
        let uncomp_size = encoded.len() as u32;
        let compressed  = compression::compress(&encoded, self.compression)?;

        let mut page = Vec::with_capacity(PAGE_HEADER_LEN + compressed.len() + 4);
        page.extend_from_slice(&count.to_le_bytes());
        page.extend_from_slice(&self.first_row_id.to_le_bytes());
        page.extend_from_slice(&uncomp_size.to_le_bytes());
        page.extend_from_slice(&compressed);

        let crc = crc32fast::hash(&page);
        page.extend_from_slice(&crc.to_le_bytes());
        Ok(page)
    }
}

// ── PageDecoder ───────────────────────────────────────────────────────────────

pub struct PageDecoder {
    pub first_row_id: RowId,
    pub values:       Vec<Value>,
}

impl PageDecoder {
    pub fn decode(
        data:        &[u8],
        field_type:  FieldType,
        compression: CompressionType,
    ) -> Result<Self> {
        if data.len() < PAGE_HEADER_LEN + 4 {
            return Err(EngineError::MalformedColumnFile {
                path:   String::new(),
                reason: "page data too short".into(),
            });
        }
        let value_count  = u32::from_le_bytes(data[0..4].try_into().unwrap()) as usize;
        let first_row_id = u64::from_le_bytes(data[4..12].try_into().unwrap());
        let uncomp_size  = u32::from_le_bytes(data[12..16].try_into().unwrap()) as usize;

        let payload_end = data.len() - 4;
        let stored_crc  = u32::from_le_bytes(data[payload_end..].try_into().unwrap());
        if crc32fast::hash(&data[..payload_end]) != stored_crc {
            return Err(EngineError::ChecksumMismatch);
        }

        let payload = &data[PAGE_HEADER_LEN..payload_end];
        let raw     = compression::decompress(payload, compression, uncomp_size)?;

        let stride = field_type.fixed_size();
        if raw.len() != value_count * stride {
            return Err(EngineError::MalformedColumnFile {
                path:   String::new(),
                reason: format!(
                    "page payload is {} bytes, expected {} values * {} bytes",
                    raw.len(), value_count, stride
                ),
            });
        }

        let values = raw
            .chunks_exact(stride)
            .map(|cell| field_type.decode(cell))
            .collect();

        Ok(Self { first_row_id, values })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_page(compression: CompressionType) -> Vec<u8> {
        let mut b = PageBuilder::new(2048, FieldType::Int32, compression);
        for i in 0..100 {
            b.add(Value::Int32(i * 3 - 50));
        }
        b.build().unwrap()
    }

    #[test]
    fn page_round_trip_plain() {
        let bytes = build_page(CompressionType::None);
        let page = PageDecoder::decode(&bytes, FieldType::Int32, CompressionType::None).unwrap();
        assert_eq!(page.first_row_id, 2048);
        assert_eq!(page.values.len(), 100);
        assert_eq!(page.values[0], Value::Int32(-50));
        assert_eq!(page.values[99], Value::Int32(247));
    }

    #[test]
    fn page_round_trip_lz4() {
        let bytes = build_page(CompressionType::Lz4);
        let page = PageDecoder::decode(&bytes, FieldType::Int32, CompressionType::Lz4).unwrap();
        assert_eq!(page.values.len(), 100);
    }

    #[test]
    fn corrupted_page_fails_crc() {
        let mut bytes = build_page(CompressionType::None);
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0xFF;
        let err = PageDecoder::decode(&bytes, FieldType::Int32, CompressionType::None);
        assert!(matches!(err, Err(EngineError::ChecksumMismatch)));
    }

    #[test]
    fn wrong_field_type_is_rejected_by_size_check() {
        let bytes = build_page(CompressionType::None);
        // 4 字节 Int32 负载按 8 字节 Int64 解释，步长校验必须失败
        let err = PageDecoder::decode(&bytes, FieldType::Int64, CompressionType::None);
        assert!(matches!(err, Err(EngineError::MalformedColumnFile { .. })));
    }
}
