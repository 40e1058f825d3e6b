//! SSB 表模式与基数表
//!
//! 五张表的列序即物理布局序，行式源与列式结果共用同一模式。
//! 列文件按 `<前缀><列下标>` 命名（`LINEORDER0` … `LINEORDER16`、`DDATE0` …），
//! 与下游扫描引擎的按列装载约定一致。

use std::path::{Path, PathBuf};

use crate::common::{EngineError, Result};
use crate::field_type::FieldType;

// ── 模式定义 ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub name:       &'static str,
    pub field_type: FieldType,
}

#[derive(Debug, Clone)]
pub struct TableSchema {
    pub name:        &'static str,
    /// 列文件名前缀
    pub file_prefix: &'static str,
    pub delimiter:   char,
    pub columns:     Vec<ColumnDef>,
}

impl TableSchema {
    /// 按表名取内置模式
    pub fn by_name(name: &str) -> Result<Self> {
        match name {
            "lineorder" => Ok(Self::lineorder()),
            "date"      => Ok(Self::date()),
            "customer"  => Ok(Self::customer()),
            "supplier"  => Ok(Self::supplier()),
            "part"      => Ok(Self::part()),
            other       => Err(EngineError::UnknownTable(other.into())),
        }
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, column: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c.name == column)
            .ok_or_else(|| EngineError::UnknownColumn {
                table:  self.name.into(),
                column: column.into(),
            })
    }

    /// 第 `idx` 列在 `dir` 下的列文件路径
    pub fn column_path(&self, dir: &Path, idx: usize) -> PathBuf {
        dir.join(format!("{}{}", self.file_prefix, idx))
    }

    // ── 内置 SSB 模式 ─────────────────────────────────────────────────────────

    pub fn lineorder() -> Self {
        Self {
            name:        "lineorder",
            file_prefix: "LINEORDER",
            delimiter:   '|',
            columns: vec![
                // 大规模因子下 orderkey 超出 i32，放宽为 i64
                col("lo_orderkey",      FieldType::Int64),
                col("lo_linenumber",    FieldType::Int32),
                col("lo_custkey",       FieldType::Int32),
                col("lo_partkey",       FieldType::Int32),
                col("lo_suppkey",       FieldType::Int32),
                col("lo_orderdate",     FieldType::Date),
                col("lo_orderpriority", FieldType::Char(15)),
                col("lo_shippriority",  FieldType::Char(1)),
                col("lo_quantity",      FieldType::Int32),
                col("lo_extendedprice", FieldType::Decimal),
                col("lo_ordtotalprice", FieldType::Decimal),
                col("lo_discount",      FieldType::Int32),
                col("lo_revenue",       FieldType::Decimal),
                col("lo_supplycost",    FieldType::Decimal),
                col("lo_tax",           FieldType::Int32),
                col("lo_commitdate",    FieldType::Date),
                col("lo_shipmode",      FieldType::Char(10)),
            ],
        }
    }

    pub fn date() -> Self {
        Self {
            name:        "date",
            file_prefix: "DDATE",
            delimiter:   '|',
            columns: vec![
                col("d_datekey",          FieldType::Date),
                col("d_date",             FieldType::Char(18)),
                col("d_dayofweek",        FieldType::Char(9)),
                col("d_month",            FieldType::Char(9)),
                col("d_year",             FieldType::Int32),
                col("d_yearmonthnum",     FieldType::Int32),
                col("d_yearmonth",        FieldType::Char(7)),
                col("d_daynuminweek",     FieldType::Int32),
                col("d_daynuminmonth",    FieldType::Int32),
                col("d_daynuminyear",     FieldType::Int32),
                col("d_sellingseason",    FieldType::Char(12)),
                col("d_lastdayinweekfl",  FieldType::Int32),
                col("d_lastdayinmonthfl", FieldType::Int32),
                col("d_holidayfl",        FieldType::Int32),
                col("d_weekdayfl",        FieldType::Int32),
            ],
        }
    }

    pub fn customer() -> Self {
        Self {
            name:        "customer",
            file_prefix: "CUSTOMER",
            delimiter:   '|',
            columns: vec![
                col("c_custkey",    FieldType::Int32),
                col("c_name",       FieldType::Char(25)),
                col("c_address",    FieldType::Char(25)),
                col("c_city",       FieldType::Char(10)),
                col("c_nation",     FieldType::Char(15)),
                col("c_region",     FieldType::Char(12)),
                col("c_phone",      FieldType::Char(15)),
                col("c_mktsegment", FieldType::Char(10)),
            ],
        }
    }

    pub fn supplier() -> Self {
        Self {
            name:        "supplier",
            file_prefix: "SUPPLIER",
            delimiter:   '|',
            columns: vec![
                col("s_suppkey", FieldType::Int32),
                col("s_name",    FieldType::Char(25)),
                col("s_address", FieldType::Char(25)),
                col("s_city",    FieldType::Char(10)),
                col("s_nation",  FieldType::Char(15)),
                col("s_region",  FieldType::Char(12)),
                col("s_phone",   FieldType::Char(15)),
            ],
        }
    }

    pub fn part() -> Self {
        Self {
            name:        "part",
            file_prefix: "PART",
            delimiter:   '|',
            columns: vec![
                col("p_partkey",   FieldType::Int32),
                col("p_name",      FieldType::Char(22)),
                col("p_mfgr",      FieldType::Char(6)),
                col("p_category",  FieldType::Char(7)),
                col("p_brand1",    FieldType::Char(9)),
                col("p_color",     FieldType::Char(11)),
                col("p_type",      FieldType::Char(25)),
                col("p_size",      FieldType::Int32),
                col("p_container", FieldType::Char(10)),
            ],
        }
    }
}

fn col(name: &'static str, field_type: FieldType) -> ColumnDef {
    ColumnDef { name, field_type }
}

// ── 基数表 ────────────────────────────────────────────────────────────────────

/// 已知规模因子对应的 lineorder 行数（数据生成管线的实测基数）。
/// 引擎自身从不隐式查表——期望行数始终由调用方显式传入。
pub fn lineorder_cardinality(scale_factor: u32) -> Option<u64> {
    match scale_factor {
        20  => Some(119_994_608),
        40  => Some(240_012_290),
        60  => Some(360_011_594),
        80  => Some(480_025_129),
        100 => Some(600_037_902),
        120 => Some(720_040_849),
        140 => Some(840_042_983),
        160 => Some(960_017_389),
        180 => Some(1_080_017_552),
        200 => Some(1_200_018_434),
        _   => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_schemas_match_ssb_column_counts() {
        assert_eq!(TableSchema::lineorder().num_columns(), 17);
        assert_eq!(TableSchema::date().num_columns(), 15);
        assert_eq!(TableSchema::customer().num_columns(), 8);
        assert_eq!(TableSchema::supplier().num_columns(), 7);
        assert_eq!(TableSchema::part().num_columns(), 9);
    }

    #[test]
    fn column_lookup_and_paths() {
        let schema = TableSchema::lineorder();
        assert_eq!(schema.column_index("lo_orderdate").unwrap(), 5);
        assert!(schema.column_index("lo_nope").is_err());
        let p = schema.column_path(Path::new("/data"), 5);
        assert_eq!(p, PathBuf::from("/data/LINEORDER5"));
    }

    #[test]
    fn unknown_table_is_an_error() {
        assert!(TableSchema::by_name("orders").is_err());
    }

    #[test]
    fn cardinality_table_covers_known_scale_factors() {
        assert_eq!(lineorder_cardinality(200), Some(1_200_018_434));
        assert_eq!(lineorder_cardinality(33), None);
    }
}
