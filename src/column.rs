//! 列文件读写
//!
//! 每列一个物理文件，转换器与排序器唯一共享的磁盘接口：
//!
//! ```text
//! ┌────────────────────────────────────┐
//! │  MAGIC  (8 bytes) "SSBCOL\0\0"     │
//! │  Version(4 bytes) = 1              │
//! ├────────────────────────────────────┤
//! │  DATA PAGES                        │ ← page 模块的定宽页
//! ├────────────────────────────────────┤
//! │  PAGE INDEX                        │
//! │    count (u32)                     │
//! │    (first_row_id u64,              │
//! │     offset u64, length u32) × N    │
//! ├────────────────────────────────────┤
//! │  FOOTER                            │
//! │    num_rows     (u64)              │
//! │    field_type   (u8 tag + u16 aux) │
//! │    compression  (u8)               │
//! │    index_offset (u64)              │
//! │  Footer CRC32  (4 bytes)           │
//! │  Footer length (4 bytes)           │
//! │  MAGIC         (8 bytes)           │
//! └────────────────────────────────────┘
//! ```
//!
//! 写入全程落在 `<路径>.tmp`，`finish()` 封盘后由持有方统一 `commit()`
//! 原子改名——崩溃只会留下排序器拒绝打开的 `.tmp` 残片，不会留下看似
//! 完整的半成品。

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::common::{EngineError, Result, RowId};
use crate::compression::CompressionType;
use crate::field_type::{FieldType, Value};
use crate::page::{PageBuilder, PageDecoder};

const MAGIC: &[u8; 8] = b"SSBCOL\0\0";
const VERSION: u32    = 1;

/// 文件头字节数（MAGIC + version）
const HEADER_LEN: u64 = 12;
/// Footer 本体字节数
const FOOTER_LEN: usize = 20;
/// Footer 之后的尾部（CRC + footer 长度 + MAGIC）
const TRAILER_LEN: u64 = 16;

// ── 页索引 ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct PageIndexEntry {
    first_row_id: RowId,
    offset:       u64,
    length:       u32,
}

/// (first_row_id, 文件偏移, 页长) 有序列表，按 row_id 二分定位页
#[derive(Debug, Default, Clone)]
struct PageIndex {
    entries: Vec<PageIndexEntry>,
}

impl PageIndex {
    fn add(&mut self, first_row_id: RowId, offset: u64, length: u32) {
        self.entries.push(PageIndexEntry { first_row_id, offset, length });
    }

    /// 找包含 row_id 的页下标（二分查找）
    fn find_page(&self, row_id: RowId) -> Option<usize> {
        if self.entries.is_empty() {
            return None;
        }
        let pos = self.entries.partition_point(|e| e.first_row_id <= row_id);
        Some(pos.saturating_sub(1))
    }

    fn page_count(&self) -> usize {
        self.entries.len()
    }

    fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.entries.len() * 20);
        out.extend_from_slice(&(self.entries.len() as u32).to_le_bytes());
        for e in &self.entries {
            out.extend_from_slice(&e.first_row_id.to_le_bytes());
            out.extend_from_slice(&e.offset.to_le_bytes());
            out.extend_from_slice(&e.length.to_le_bytes());
        }
        out
    }

    fn deserialize(data: &[u8]) -> Option<Self> {
        let mut cur = Cursor::new(data);
        let n = cur.read_u32::<LittleEndian>().ok()? as usize;
        let mut entries = Vec::with_capacity(n);
        for _ in 0..n {
            entries.push(PageIndexEntry {
                first_row_id: cur.read_u64::<LittleEndian>().ok()?,
                offset:       cur.read_u64::<LittleEndian>().ok()?,
                length:       cur.read_u32::<LittleEndian>().ok()?,
            });
        }
        Some(Self { entries })
    }
}

// ── ColumnWriter ──────────────────────────────────────────────────────────────

/// 流式列写入器：页满即落盘，整列从不驻留内存
pub struct ColumnWriter {
    final_path:  PathBuf,
    tmp_path:    PathBuf,
    file:        BufWriter<File>,
    field_type:  FieldType,
    compression: CompressionType,
    current:     PageBuilder,
    index:       PageIndex,
    num_rows:    RowId,
    data_offset: u64,
}

impl ColumnWriter {
    pub fn create(
        path:        &Path,
        field_type:  FieldType,
        compression: CompressionType,
    ) -> Result<Self> {
        let tmp_path = tmp_path_for(path);
        let file = File::create(&tmp_path).map_err(|e| EngineError::io(&tmp_path, e))?;
        let mut file = BufWriter::new(file);
        file.write_all(MAGIC).map_err(|e| EngineError::io(&tmp_path, e))?;
        file.write_u32::<LittleEndian>(VERSION)
            .map_err(|e| EngineError::io(&tmp_path, e))?;
        Ok(Self {
            final_path: path.to_path_buf(),
            tmp_path,
            file,
            field_type,
            compression,
            current: PageBuilder::new(0, field_type, compression),
            index: PageIndex::default(),
            num_rows: 0,
            data_offset: HEADER_LEN,
        })
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    /// 追加一个值到本列
    pub fn append(&mut self, v: Value) -> Result<()> {
        self.current.add(v);
        self.num_rows += 1;
        if self.current.is_full() {
            self.flush_page()?;
        }
        Ok(())
    }

    fn flush_page(&mut self) -> Result<()> {
        let first_rid = self.current.first_row_id;
        let bytes = std::mem::replace(
            &mut self.current,
            PageBuilder::new(self.num_rows, self.field_type, self.compression),
        )
        .build()?;

        self.index.add(first_rid, self.data_offset, bytes.len() as u32);
        self.file
            .write_all(&bytes)
            .map_err(|e| EngineError::io(&self.tmp_path, e))?;
        self.data_offset += bytes.len() as u64;
        Ok(())
    }

    /// 完成写入：落页索引与 Footer。文件仍停留在 `.tmp`，由 `SealedColumn::commit`
    /// 原子改名到最终路径。
    pub fn finish(mut self) -> Result<SealedColumn> {
        if !self.current.is_empty() {
            self.flush_page()?;
        }
        let index_offset = self.data_offset;
        let index_bytes  = self.index.serialize();
        self.file
            .write_all(&index_bytes)
            .map_err(|e| EngineError::io(&self.tmp_path, e))?;

        let mut footer = Vec::with_capacity(FOOTER_LEN);
        footer.extend_from_slice(&self.num_rows.to_le_bytes());
        let (tag, aux) = self.field_type.to_tag();
        footer.push(tag);
        footer.extend_from_slice(&aux.to_le_bytes());
        footer.push(self.compression.to_tag());
        footer.extend_from_slice(&index_offset.to_le_bytes());

        let crc = crc32fast::hash(&footer);
        self.file
            .write_all(&footer)
            .map_err(|e| EngineError::io(&self.tmp_path, e))?;
        self.file
            .write_u32::<LittleEndian>(crc)
            .map_err(|e| EngineError::io(&self.tmp_path, e))?;
        self.file
            .write_u32::<LittleEndian>(footer.len() as u32)
            .map_err(|e| EngineError::io(&self.tmp_path, e))?;
        self.file
            .write_all(MAGIC)
            .map_err(|e| EngineError::io(&self.tmp_path, e))?;
        self.file
            .flush()
            .map_err(|e| EngineError::io(&self.tmp_path, e))?;

        Ok(SealedColumn {
            tmp_path:   self.tmp_path,
            final_path: self.final_path,
            num_rows:   self.num_rows,
        })
    }

    pub fn num_rows(&self) -> RowId {
        self.num_rows
    }
}

/// `finish()` 之后、提交之前的列文件句柄
#[derive(Debug)]
pub struct SealedColumn {
    tmp_path:     PathBuf,
    final_path:   PathBuf,
    pub num_rows: RowId,
}

impl SealedColumn {
    /// 原子改名到最终路径
    pub fn commit(self) -> Result<()> {
        fs::rename(&self.tmp_path, &self.final_path)
            .map_err(|e| EngineError::io(&self.final_path, e))
    }

    /// 放弃写入，清掉临时文件
    pub fn discard(self) {
        let _ = fs::remove_file(&self.tmp_path);
    }
}

/// `<路径>.tmp`（列文件名无扩展名，直接追加）
pub fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

// ── ColumnReader ──────────────────────────────────────────────────────────────

/// 列文件读取器；`open` 时校验 MAGIC 与 Footer CRC
pub struct ColumnReader {
    path:        PathBuf,
    file:        BufReader<File>,
    field_type:  FieldType,
    compression: CompressionType,
    num_rows:    RowId,
    index:       PageIndex,
}

impl ColumnReader {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| EngineError::io(path, e))?;
        let file_len = file
            .metadata()
            .map_err(|e| EngineError::io(path, e))?
            .len();
        let mut file = BufReader::new(file);

        if file_len < HEADER_LEN + FOOTER_LEN as u64 + TRAILER_LEN {
            return Err(malformed(path, "file too short"));
        }

        // 文件头
        let mut head = [0u8; 12];
        file.read_exact(&mut head).map_err(|e| EngineError::io(path, e))?;
        if &head[..8] != MAGIC {
            return Err(malformed(path, "bad magic"));
        }
        let version = u32::from_le_bytes(head[8..12].try_into().unwrap());
        if version != VERSION {
            return Err(malformed(path, &format!("unsupported version {version}")));
        }

        // 尾部：CRC + footer 长度 + MAGIC
        file.seek(SeekFrom::Start(file_len - TRAILER_LEN))
            .map_err(|e| EngineError::io(path, e))?;
        let footer_crc = file
            .read_u32::<LittleEndian>()
            .map_err(|e| EngineError::io(path, e))?;
        let footer_len = file
            .read_u32::<LittleEndian>()
            .map_err(|e| EngineError::io(path, e))? as u64;
        let mut tail_magic = [0u8; 8];
        file.read_exact(&mut tail_magic)
            .map_err(|e| EngineError::io(path, e))?;
        if &tail_magic != MAGIC {
            return Err(malformed(path, "bad trailing magic"));
        }
        if footer_len + TRAILER_LEN + HEADER_LEN > file_len {
            return Err(malformed(path, "footer length out of bounds"));
        }

        // Footer 本体
        let footer_start = file_len - TRAILER_LEN - footer_len;
        file.seek(SeekFrom::Start(footer_start))
            .map_err(|e| EngineError::io(path, e))?;
        let mut footer = vec![0u8; footer_len as usize];
        file.read_exact(&mut footer)
            .map_err(|e| EngineError::io(path, e))?;
        if crc32fast::hash(&footer) != footer_crc {
            return Err(malformed(path, "footer checksum mismatch"));
        }

        let mut cur = Cursor::new(&footer[..]);
        let num_rows = cur
            .read_u64::<LittleEndian>()
            .map_err(|_| malformed(path, "footer truncated"))?;
        let ft_tag = cur.read_u8().map_err(|_| malformed(path, "footer truncated"))?;
        let ft_aux = cur
            .read_u16::<LittleEndian>()
            .map_err(|_| malformed(path, "footer truncated"))?;
        let comp_tag = cur.read_u8().map_err(|_| malformed(path, "footer truncated"))?;
        let index_offset = cur
            .read_u64::<LittleEndian>()
            .map_err(|_| malformed(path, "footer truncated"))?;

        let field_type = FieldType::from_tag(ft_tag, ft_aux)
            .ok_or_else(|| malformed(path, &format!("unknown field type tag {ft_tag}")))?;
        let compression = CompressionType::from_tag(comp_tag)
            .ok_or_else(|| malformed(path, &format!("unknown compression tag {comp_tag}")))?;

        // 页索引
        if index_offset < HEADER_LEN || index_offset > footer_start {
            return Err(malformed(path, "page index offset out of bounds"));
        }
        file.seek(SeekFrom::Start(index_offset))
            .map_err(|e| EngineError::io(path, e))?;
        let mut index_bytes = vec![0u8; (footer_start - index_offset) as usize];
        file.read_exact(&mut index_bytes)
            .map_err(|e| EngineError::io(path, e))?;
        let index = PageIndex::deserialize(&index_bytes)
            .ok_or_else(|| malformed(path, "cannot parse page index"))?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            field_type,
            compression,
            num_rows,
            index,
        })
    }

    pub fn num_rows(&self) -> RowId {
        self.num_rows
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    fn read_page(&mut self, page_idx: usize) -> Result<PageDecoder> {
        let entry = self.index.entries[page_idx];
        self.file
            .seek(SeekFrom::Start(entry.offset))
            .map_err(|e| EngineError::io(&self.path, e))?;
        let mut buf = vec![0u8; entry.length as usize];
        self.file
            .read_exact(&mut buf)
            .map_err(|e| EngineError::io(&self.path, e))?;
        PageDecoder::decode(&buf, self.field_type, self.compression).map_err(|e| match e {
            EngineError::ChecksumMismatch => malformed(&self.path, "page checksum mismatch"),
            EngineError::MalformedColumnFile { reason, .. } => malformed(&self.path, &reason),
            other => other,
        })
    }

    /// 读取行区间 `[start, start + len)`，只解码覆盖到的页
    pub fn read_range(&mut self, start: RowId, len: usize) -> Result<Vec<Value>> {
        if start + len as u64 > self.num_rows {
            return Err(malformed(
                &self.path,
                &format!(
                    "range [{start}, {}) exceeds {} rows",
                    start + len as u64,
                    self.num_rows
                ),
            ));
        }
        let mut out = Vec::with_capacity(len);
        if len == 0 {
            return Ok(out);
        }

        let mut page_idx = self
            .index
            .find_page(start)
            .ok_or_else(|| malformed(&self.path, "empty page index"))?;
        while out.len() < len {
            if page_idx >= self.index.page_count() {
                return Err(malformed(&self.path, "page index does not cover range"));
            }
            let page = self.read_page(page_idx)?;
            let skip = (start + out.len() as u64).saturating_sub(page.first_row_id) as usize;
            for v in page.values.into_iter().skip(skip) {
                out.push(v);
                if out.len() == len {
                    break;
                }
            }
            page_idx += 1;
        }
        Ok(out)
    }

    /// 转为顺序块迭代器（归并游标按页粒度拉取）
    pub fn into_blocks(self) -> ColumnBlocks {
        ColumnBlocks { reader: self, next_page: 0 }
    }
}

/// 按页推进的顺序读取器
pub struct ColumnBlocks {
    reader:    ColumnReader,
    next_page: usize,
}

impl ColumnBlocks {
    /// 取下一页的全部值；读完返回 None
    pub fn next_block(&mut self) -> Result<Option<Vec<Value>>> {
        if self.next_page >= self.reader.index.page_count() {
            return Ok(None);
        }
        let page = self.reader.read_page(self.next_page)?;
        self.next_page += 1;
        Ok(Some(page.values))
    }
}

fn malformed(path: &Path, reason: &str) -> EngineError {
    EngineError::MalformedColumnFile {
        path:   path.display().to_string(),
        reason: reason.into(),
    }
}
