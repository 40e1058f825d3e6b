//! # ssb-columnar-engine
//!
//! SSB（Star Schema Benchmark）数据准备引擎的 Rust 实现，包含两个组件：
//! - **Converter**：行式分隔文本表（`.tbl`）→ 定宽列式文件
//! - **ExternalSorter**：对事实表的列式文件按键列做外部（out-of-core）归并排序
//!
//! ## 整体架构
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        driver (main.rs)                      │
//! │        convert ──────────────┐         sort ───────────┐     │
//! └──────────────────────────────┼─────────────────────────┼─────┘
//!                                │                         │
//!                          Converter                ExternalSorter
//!                      （逐行流式解析）          ┌──────────┴──────────┐
//!                                │          Phase 1              Phase 2
//!                                │       分区 + 局部排序         K 路归并
//!                                │       (rayon 并行)       (BinaryHeap 游标)
//!                                │               │                 │
//!                                ▼               ▼                 ▼
//!                    ┌──────────────────────────────────────────────┐
//!                    │  列文件格式（column.rs，两组件唯一共享接口）  │
//!                    │   MAGIC │ Data Pages │ Page Index │ Footer   │
//!                    └──────────────────────────────────────────────┘
//! ```
//!
//! 两组件只通过列文件格式交换数据，互不调用。

pub mod common;
pub mod field_type;
pub mod schema;

pub mod compression;
pub mod page;
pub mod column;

pub mod convert;
pub mod sort;
