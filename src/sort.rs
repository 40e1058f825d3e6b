//! 外部归并排序引擎
//!
//! 两阶段 out-of-core 排序，输入输出均为列文件：
//!
//! - **Phase 1 分区 + 局部排序**：把 `expected_rows` 行切成
//!   `partitions` 个连续分区（末分区可短）。每个分区把所有列的行区间
//!   读入内存，在键列上求下标置换（键相等按分区内原始位置），对每列应用
//!   置换后写出一个已排序的临时 run。分区之间相互独立，由 rayon 线程池
//!   并行处理；常驻内存上界 = 工作线程数 × 单分区全列数据。
//!
//! - **Phase 2 K 路归并**：每个存活 run 一个游标，`BinaryHeap` 取
//!   `(键值, run 序号)` 最小者，整行发射到输出列写入器后推进该游标。
//!   游标按页粒度缓冲，整个已排序数据集从不驻留内存。run 数超过
//!   `fan_in` 时先做中间轮归并，收敛到不超过 `fan_in` 个 run 再做
//!   落盘输出的最终轮（`partitions` 与 `fan_in` 是两个独立参数）。
//!
//! 完整性：实际发射行数必须等于 `expected_rows`，否则在提交前失败；
//! 临时 run 目录在成功与失败路径上都会清除；输出只经原子改名提交。

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use rayon::prelude::*;

use crate::column::{tmp_path_for, ColumnBlocks, ColumnReader, ColumnWriter, SealedColumn};
use crate::common::{EngineError, Result, RowId};
use crate::compression::CompressionType;
use crate::field_type::Value;
use crate::schema::TableSchema;

// ── 参数与统计 ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SortOptions {
    pub key_column:  String,
    /// Phase 1 分区数
    pub partitions:  usize,
    /// Phase 2 单轮归并的最大路数
    pub fan_in:      usize,
    /// Phase 1 工作线程数；0 = rayon 默认
    pub threads:     usize,
    /// 最终输出列的压缩方式（临时 run 恒为不压缩）
    pub compression: CompressionType,
}

#[derive(Debug, Clone, Copy)]
pub struct SortStats {
    pub rows:         u64,
    pub partitions:   usize,
    /// 中间归并轮数（不含最终轮）
    pub merge_rounds: usize,
}

pub struct ExternalSorter {
    schema:  TableSchema,
    opts:    SortOptions,
    key_idx: usize,
}

impl ExternalSorter {
    pub fn new(schema: TableSchema, opts: SortOptions) -> Result<Self> {
        if opts.partitions == 0 {
            return Err(EngineError::InvalidParameter("partitions must be >= 1".into()));
        }
        if opts.fan_in < 2 {
            return Err(EngineError::InvalidParameter("fan-in must be >= 2".into()));
        }
        let key_idx = schema.column_index(&opts.key_column)?;
        Ok(Self { schema, opts, key_idx })
    }

    /// 把 `input_dir` 下本表的列文件按键列排序，写出到 `output_dir`
    pub fn sort(
        &self,
        input_dir:     &Path,
        output_dir:    &Path,
        expected_rows: u64,
    ) -> Result<SortStats> {
        fs::create_dir_all(output_dir).map_err(|e| EngineError::io(output_dir, e))?;
        let scratch = ScratchDir::create(output_dir)?;
        let result = self.sort_inner(input_dir, output_dir, expected_rows, scratch.path());
        if result.is_err() {
            self.remove_output_temp_files(output_dir);
        }
        // scratch 随 Drop 整目录清除
        result
    }

    fn sort_inner(
        &self,
        input_dir:     &Path,
        output_dir:    &Path,
        expected_rows: u64,
        scratch:       &Path,
    ) -> Result<SortStats> {
        self.verify_input(input_dir, expected_rows)?;

        // ── Phase 1 ──────────────────────────────────────────────────────────
        let ranges = partition_ranges(expected_rows, self.opts.partitions);
        info!(
            "sort `{}` by `{}`: {} rows, {} partitions, fan-in {}",
            self.schema.name,
            self.opts.key_column,
            expected_rows,
            ranges.len(),
            self.opts.fan_in
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.opts.threads)
            .build()
            .map_err(|e| EngineError::InvalidParameter(format!("thread pool: {e}")))?;
        let runs: Result<Vec<RunHandle>> = pool.install(|| {
            ranges
                .par_iter()
                .enumerate()
                .map(|(k, &(start, len))| self.sort_partition(input_dir, scratch, k, start, len))
                .collect()
        });
        let mut runs = runs?;

        let produced: u64 = runs.iter().map(|r| r.rows).sum();
        if produced != expected_rows {
            return Err(EngineError::RowCountMismatch {
                expected: expected_rows,
                actual:   produced,
                context:  "phase 1 run total".into(),
            });
        }

        // ── Phase 2：中间轮（仅当 run 数超过 fan_in）────────────────────────
        let mut merge_rounds = 0usize;
        let mut next_merge_id = 0usize;
        while runs.len() > self.opts.fan_in {
            merge_rounds += 1;
            debug!("merge round {merge_rounds}: {} runs", runs.len());
            let mut merged = Vec::new();
            for group in take_groups(&mut runs, self.opts.fan_in) {
                let base = format!("m{next_merge_id}");
                next_merge_id += 1;
                let targets: Vec<PathBuf> = (0..self.schema.num_columns())
                    .map(|c| scratch.join(format!("{base}_c{c}")))
                    .collect();
                let (sealed, rows) = self.merge_runs(&group, &targets, CompressionType::None)?;
                for s in sealed {
                    s.commit()?;
                }
                for r in &group {
                    r.remove();
                }
                merged.push(RunHandle {
                    dir:      scratch.to_path_buf(),
                    base,
                    num_cols: self.schema.num_columns(),
                    rows,
                });
            }
            runs = merged;
        }

        // ── Phase 2：最终轮 → 输出目录 ───────────────────────────────────────
        info!("final merge: {} runs", runs.len());
        let targets: Vec<PathBuf> = (0..self.schema.num_columns())
            .map(|c| self.schema.column_path(output_dir, c))
            .collect();
        let (sealed, emitted) = self.merge_runs(&runs, &targets, self.opts.compression)?;
        if emitted != expected_rows {
            for s in sealed {
                s.discard();
            }
            return Err(EngineError::RowCountMismatch {
                expected: expected_rows,
                actual:   emitted,
                context:  "merge output".into(),
            });
        }
        for s in sealed {
            s.commit()?;
        }
        for r in &runs {
            r.remove();
        }

        info!("sorted {} rows into {}", emitted, output_dir.display());
        Ok(SortStats { rows: emitted, partitions: ranges.len(), merge_rounds })
    }

    /// 每个输入列都必须恰好报告 `expected_rows` 行且类型与模式一致
    fn verify_input(&self, input_dir: &Path, expected_rows: u64) -> Result<()> {
        for (idx, def) in self.schema.columns.iter().enumerate() {
            let path = self.schema.column_path(input_dir, idx);
            let reader = ColumnReader::open(&path)?;
            if reader.num_rows() != expected_rows {
                return Err(EngineError::RowCountMismatch {
                    expected: expected_rows,
                    actual:   reader.num_rows(),
                    context:  path.display().to_string(),
                });
            }
            if reader.field_type() != def.field_type {
                return Err(EngineError::MalformedColumnFile {
                    path:   path.display().to_string(),
                    reason: format!(
                        "field type {:?} does not match schema column `{}` ({:?})",
                        reader.field_type(),
                        def.name,
                        def.field_type
                    ),
                });
            }
        }
        Ok(())
    }

    // ── Phase 1 ───────────────────────────────────────────────────────────────

    /// 分区内全列读入、键列求置换、逐列应用并写出临时 run
    fn sort_partition(
        &self,
        input_dir: &Path,
        scratch:   &Path,
        k:         usize,
        start:     RowId,
        len:       usize,
    ) -> Result<RunHandle> {
        if len > u32::MAX as usize {
            return Err(EngineError::InvalidParameter(format!(
                "partition {k} has {len} rows, max is {}",
                u32::MAX
            )));
        }
        let num_cols = self.schema.num_columns();
        let mut cols: Vec<Vec<Value>> = Vec::with_capacity(num_cols);
        for c in 0..num_cols {
            let mut reader = ColumnReader::open(&self.schema.column_path(input_dir, c))?;
            cols.push(reader.read_range(start, len)?);
        }

        // 键相等时按分区内原始位置，保证整体排序稳定且确定
        let key = &cols[self.key_idx];
        let mut perm: Vec<u32> = (0..len as u32).collect();
        perm.sort_unstable_by(|&a, &b| {
            key[a as usize].cmp(&key[b as usize]).then(a.cmp(&b))
        });

        let base = format!("r{k}");
        let mut sealed = Vec::with_capacity(num_cols);
        for (c, col) in cols.iter().enumerate() {
            let path = scratch.join(format!("{base}_c{c}"));
            let mut w = ColumnWriter::create(
                &path,
                self.schema.columns[c].field_type,
                CompressionType::None,
            )?;
            for &p in &perm {
                w.append(col[p as usize].clone())?;
            }
            sealed.push(w.finish()?);
        }
        for s in sealed {
            s.commit()?;
        }

        debug!("partition {k}: rows [{start}, {}) sorted", start + len as u64);
        Ok(RunHandle { dir: scratch.to_path_buf(), base, num_cols, rows: len as u64 })
    }

    // ── Phase 2 ───────────────────────────────────────────────────────────────

    /// K 路归并一组 run，写到 `targets`；返回封盘的列与发射行数，
    /// 提交与否由调用方决定
    fn merge_runs(
        &self,
        runs:        &[RunHandle],
        targets:     &[PathBuf],
        compression: CompressionType,
    ) -> Result<(Vec<SealedColumn>, u64)> {
        let num_cols = self.schema.num_columns();
        let mut writers = Vec::with_capacity(num_cols);
        for (c, path) in targets.iter().enumerate() {
            writers.push(ColumnWriter::create(
                path,
                self.schema.columns[c].field_type,
                compression,
            )?);
        }

        let mut cursors = Vec::with_capacity(runs.len());
        let mut heap: BinaryHeap<Reverse<HeapKey>> = BinaryHeap::with_capacity(runs.len());
        for (i, run) in runs.iter().enumerate() {
            let cursor = RunCursor::open(run)?;
            if !cursor.exhausted {
                heap.push(Reverse(HeapKey {
                    key: cursor.current(self.key_idx).clone(),
                    run: i,
                }));
            }
            cursors.push(cursor);
        }

        let mut emitted: u64 = 0;
        while let Some(Reverse(top)) = heap.pop() {
            let cursor = &mut cursors[top.run];
            for (c, w) in writers.iter_mut().enumerate() {
                w.append(cursor.current(c).clone())?;
            }
            emitted += 1;
            cursor.advance()?;
            if !cursor.exhausted {
                heap.push(Reverse(HeapKey {
                    key: cursor.current(self.key_idx).clone(),
                    run: top.run,
                }));
            }
        }

        let mut sealed = Vec::with_capacity(num_cols);
        for w in writers {
            sealed.push(w.finish()?);
        }
        Ok((sealed, emitted))
    }

    /// 错误路径清扫：去掉输出目录里本表的 `.tmp`
    fn remove_output_temp_files(&self, output_dir: &Path) {
        for idx in 0..self.schema.num_columns() {
            let _ = fs::remove_file(tmp_path_for(&self.schema.column_path(output_dir, idx)));
        }
    }
}

// ── 归并堆键 ──────────────────────────────────────────────────────────────────

/// 键相等时按 run 序号（即分区序）裁决；run 内顺序由游标天然保持，
/// 两者合起来就是 (分区序, 分区内位置) 的稳定约定
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct HeapKey {
    key: Value,
    run: usize,
}

// ── Run 与游标 ────────────────────────────────────────────────────────────────

/// 一个已排序临时 run 的列文件组
#[derive(Debug)]
struct RunHandle {
    dir:      PathBuf,
    base:     String,
    num_cols: usize,
    rows:     u64,
}

impl RunHandle {
    fn col_path(&self, c: usize) -> PathBuf {
        self.dir.join(format!("{}_c{}", self.base, c))
    }

    fn remove(&self) {
        for c in 0..self.num_cols {
            let _ = fs::remove_file(self.col_path(c));
        }
    }
}

/// 归并游标：每列一个顺序页迭代器，按页粒度缓冲当前块
struct RunCursor {
    blocks:    Vec<ColumnBlocks>,
    bufs:      Vec<Vec<Value>>,
    pos:       usize,
    exhausted: bool,
    name:      String,
}

impl RunCursor {
    fn open(run: &RunHandle) -> Result<Self> {
        let mut blocks = Vec::with_capacity(run.num_cols);
        for c in 0..run.num_cols {
            blocks.push(ColumnReader::open(&run.col_path(c))?.into_blocks());
        }
        let mut cursor = Self {
            blocks,
            bufs: Vec::new(),
            pos: 0,
            exhausted: false,
            name: run.base.clone(),
        };
        cursor.fill()?;
        Ok(cursor)
    }

    fn current(&self, col: usize) -> &Value {
        &self.bufs[col][self.pos]
    }

    fn advance(&mut self) -> Result<()> {
        self.pos += 1;
        if self.pos >= self.bufs[0].len() {
            self.fill()?;
        }
        Ok(())
    }

    /// 拉取每列的下一页块。写入端按行锁步追加且页容量一致，所以各列的
    /// 页界必然对齐；不对齐说明 run 文件损坏。
    fn fill(&mut self) -> Result<()> {
        let mut next: Vec<Option<Vec<Value>>> = Vec::with_capacity(self.blocks.len());
        for b in &mut self.blocks {
            next.push(b.next_block()?);
        }
        if next.iter().all(|b| b.is_none()) {
            self.exhausted = true;
            self.bufs.clear();
            return Ok(());
        }
        let mut bufs = Vec::with_capacity(next.len());
        for b in next {
            match b {
                Some(v) => bufs.push(v),
                None => return Err(self.misaligned()),
            }
        }
        if bufs.windows(2).any(|w| w[0].len() != w[1].len()) {
            return Err(self.misaligned());
        }
        self.bufs = bufs;
        self.pos = 0;
        Ok(())
    }

    fn misaligned(&self) -> EngineError {
        EngineError::MalformedColumnFile {
            path:   self.name.clone(),
            reason: "run columns have misaligned page boundaries".into(),
        }
    }
}

// ── 辅助 ──────────────────────────────────────────────────────────────────────

/// 连续等宽分区（size = ceil(total / partitions)，末分区可短）
fn partition_ranges(total: u64, partitions: usize) -> Vec<(RowId, usize)> {
    if total == 0 {
        return Vec::new();
    }
    let size = total.div_ceil(partitions as u64);
    let mut out = Vec::with_capacity(partitions);
    let mut start = 0u64;
    while start < total {
        let len = size.min(total - start) as usize;
        out.push((start, len));
        start += len as u64;
    }
    out
}

/// 把 run 列表按 fan_in 切成消费组
fn take_groups(runs: &mut Vec<RunHandle>, fan_in: usize) -> Vec<Vec<RunHandle>> {
    let mut groups = Vec::new();
    let mut cur = Vec::with_capacity(fan_in);
    for r in runs.drain(..) {
        cur.push(r);
        if cur.len() == fan_in {
            groups.push(std::mem::take(&mut cur));
        }
    }
    if !cur.is_empty() {
        groups.push(cur);
    }
    groups
}

/// 排序临时目录；Drop 时整目录清除（成功与失败路径共用）
struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    fn create(parent: &Path) -> Result<Self> {
        let path = parent.join(".sort-tmp");
        if path.exists() {
            fs::remove_dir_all(&path).map_err(|e| EngineError::io(&path, e))?;
        }
        fs::create_dir_all(&path).map_err(|e| EngineError::io(&path, e))?;
        Ok(Self { path })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}
