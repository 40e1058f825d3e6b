//! 列式转换器
//!
//! 逐行流式读取行式分隔表（`.tbl`），按模式解析每个字段并分发到对应列的
//! 写入器；页满即落盘，整表从不驻留内存。
//!
//! 坏行策略（显式约定）：**整轮拒绝**。字段数不符或字段不可解析立即中止，
//! 报出文件与 1 起始行号，不提交任何输出。dbgen 的输出是机器生成的，
//! 跳过坏行只会掩盖生成器故障并让各列悄悄错位。
//!
//! 提交协议：所有列先写到 `.tmp`，输入走完、行数对齐后统一原子改名；
//! 任何错误路径都会清掉本表的 `.tmp` 残片。

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::Path;

use log::info;

use crate::column::{tmp_path_for, ColumnWriter, SealedColumn};
use crate::common::{EngineError, Result};
use crate::compression::CompressionType;
use crate::schema::TableSchema;

#[derive(Debug, Clone, Copy, Default)]
pub struct ConvertOptions {
    pub compression: CompressionType,
}

#[derive(Debug, Clone, Copy)]
pub struct ConvertStats {
    pub rows:    u64,
    pub columns: usize,
}

pub struct Converter {
    schema: TableSchema,
    opts:   ConvertOptions,
}

impl Converter {
    pub fn new(schema: TableSchema, opts: ConvertOptions) -> Self {
        Self { schema, opts }
    }

    /// `input` 的每一行拆为一条记录，写出 `out_dir` 下的整组列文件
    pub fn convert(&self, input: &Path, out_dir: &Path) -> Result<ConvertStats> {
        let result = self.convert_inner(input, out_dir);
        if result.is_err() {
            self.remove_temp_files(out_dir);
        }
        result
    }

    fn convert_inner(&self, input: &Path, out_dir: &Path) -> Result<ConvertStats> {
        // 输入必须在建输出目录之前就能打开
        let file = File::open(input).map_err(|e| EngineError::InputUnreadable {
            path:   input.display().to_string(),
            source: e,
        })?;
        fs::create_dir_all(out_dir).map_err(|e| EngineError::io(out_dir, e))?;

        let num_cols = self.schema.num_columns();
        info!(
            "converting table `{}` from {} into {}",
            self.schema.name,
            input.display(),
            out_dir.display()
        );

        let mut writers: Vec<ColumnWriter> = Vec::with_capacity(num_cols);
        for (idx, c) in self.schema.columns.iter().enumerate() {
            writers.push(ColumnWriter::create(
                &self.schema.column_path(out_dir, idx),
                c.field_type,
                self.opts.compression,
            )?);
        }

        let mut rows: u64 = 0;
        let reader = BufReader::new(file);
        for (line_idx, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| EngineError::io(input, e))?;
            let line_no = line_idx as u64 + 1;
            self.append_record(&mut writers, input, line_no, &line)?;
            rows += 1;
        }

        // 统一封盘，全部成功后再统一改名提交
        let mut sealed: Vec<SealedColumn> = Vec::with_capacity(num_cols);
        for w in writers {
            sealed.push(w.finish()?);
        }
        for s in sealed {
            debug_assert_eq!(s.num_rows, rows);
            s.commit()?;
        }

        info!("table `{}`: {rows} rows, {num_cols} columns", self.schema.name);
        Ok(ConvertStats { rows, columns: num_cols })
    }

    /// 解析一行并分发到各列写入器
    fn append_record(
        &self,
        writers: &mut [ColumnWriter],
        input:   &Path,
        line_no: u64,
        line:    &str,
    ) -> Result<()> {
        let mut fields: Vec<&str> = line.split(self.schema.delimiter).collect();
        // dbgen 行尾带分隔符，容忍恰好一个尾部空字段
        if fields.len() == writers.len() + 1 && fields.last() == Some(&"") {
            fields.pop();
        }
        if fields.len() != writers.len() {
            return Err(EngineError::FieldCountMismatch {
                path:     input.display().to_string(),
                line:     line_no,
                expected: writers.len(),
                found:    fields.len(),
            });
        }

        for (idx, text) in fields.iter().enumerate() {
            let def = &self.schema.columns[idx];
            let value = def.field_type.parse(text).ok_or_else(|| {
                EngineError::UnparsableField {
                    path:      input.display().to_string(),
                    line:      line_no,
                    column:    def.name.into(),
                    text:      (*text).into(),
                    type_name: def.field_type.type_name(),
                }
            })?;
            writers[idx].append(value)?;
        }
        Ok(())
    }

    /// 错误路径清扫：去掉本表遗留的 `.tmp`
    fn remove_temp_files(&self, out_dir: &Path) {
        for idx in 0..self.schema.num_columns() {
            let _ = fs::remove_file(tmp_path_for(&self.schema.column_path(out_dir, idx)));
        }
    }
}
