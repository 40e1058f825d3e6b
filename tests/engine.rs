//! 转换器 + 排序器的端到端测试：行式 .tbl → 列文件 → 外部排序 → 校验

use std::fs;
use std::path::Path;

use tempfile::TempDir;

use ssb_columnar_engine::column::ColumnReader;
use ssb_columnar_engine::common::EngineError;
use ssb_columnar_engine::compression::CompressionType;
use ssb_columnar_engine::convert::{ConvertOptions, Converter};
use ssb_columnar_engine::field_type::{FieldType, Value};
use ssb_columnar_engine::schema::{ColumnDef, TableSchema};
use ssb_columnar_engine::sort::{ExternalSorter, SortOptions};

/// 三列小表：键 / 负载 / 价格
fn fact_schema() -> TableSchema {
    TableSchema {
        name:        "fact",
        file_prefix: "FACT",
        delimiter:   '|',
        columns: vec![
            ColumnDef { name: "f_key",   field_type: FieldType::Int32 },
            ColumnDef { name: "f_tag",   field_type: FieldType::Char(6) },
            ColumnDef { name: "f_price", field_type: FieldType::Decimal },
        ],
    }
}

fn sort_options(partitions: usize, fan_in: usize) -> SortOptions {
    SortOptions {
        key_column:  "f_key".into(),
        partitions,
        fan_in,
        threads:     2,
        compression: CompressionType::None,
    }
}

fn convert_rows(dir: &Path, rows: &[(i32, &str, &str)]) -> std::path::PathBuf {
    let tbl = dir.join("fact.tbl");
    let body: String = rows
        .iter()
        .map(|(k, t, p)| format!("{k}|{t}|{p}|\n"))
        .collect();
    fs::write(&tbl, body).unwrap();

    let out = dir.join("columnar");
    Converter::new(fact_schema(), ConvertOptions::default())
        .convert(&tbl, &out)
        .unwrap();
    out
}

fn read_table(dir: &Path, rows: usize) -> Vec<(Value, Value, Value)> {
    let schema = fact_schema();
    let mut cols: Vec<Vec<Value>> = (0..3)
        .map(|c| {
            let mut r = ColumnReader::open(&schema.column_path(dir, c)).unwrap();
            assert_eq!(r.num_rows(), rows as u64);
            r.read_range(0, rows).unwrap()
        })
        .collect();
    let (c2, c1, c0) = (cols.pop().unwrap(), cols.pop().unwrap(), cols.pop().unwrap());
    c0.into_iter()
        .zip(c1)
        .zip(c2)
        .map(|((a, b), c)| (a, b, c))
        .collect()
}

#[test]
fn round_trip_reconstructs_rows_in_order() {
    let dir = TempDir::new().unwrap();
    let rows = [
        (5, "alpha", "1.50"),
        (3, "beta", "2"),
        (9, "gamma", "0.07"),
    ];
    let out = convert_rows(dir.path(), &rows);

    let got = read_table(&out, 3);
    assert_eq!(got[0], (
        Value::Int32(5),
        Value::Chars(b"alpha ".to_vec()),
        Value::Decimal(150),
    ));
    assert_eq!(got[1].0, Value::Int32(3));
    assert_eq!(got[2].2, Value::Decimal(7));
}

/// 规格中的算例：键 [5,3,3,1,9,2,2,8,4,7]、2 个分区 →
/// 局部排序 [1,3,3,5,9] / [2,2,4,7,8]，归并 [1,2,2,3,3,4,5,7,8,9]
#[test]
fn worked_example_two_partitions() {
    let dir = TempDir::new().unwrap();
    let keys = [5, 3, 3, 1, 9, 2, 2, 8, 4, 7];
    let rows: Vec<(i32, String, String)> = keys
        .iter()
        .enumerate()
        .map(|(i, &k)| (k, format!("row{i:02}"), format!("{i}.00")))
        .collect();
    let rows_ref: Vec<(i32, &str, &str)> = rows
        .iter()
        .map(|(k, t, p)| (*k, t.as_str(), p.as_str()))
        .collect();
    let columnar = convert_rows(dir.path(), &rows_ref);

    let sorted_dir = dir.path().join("sorted");
    let stats = ExternalSorter::new(fact_schema(), sort_options(2, 16))
        .unwrap()
        .sort(&columnar, &sorted_dir, 10)
        .unwrap();
    assert_eq!(stats.rows, 10);
    assert_eq!(stats.partitions, 2);
    assert_eq!(stats.merge_rounds, 0);

    let got = read_table(&sorted_dir, 10);
    let got_keys: Vec<i32> = got
        .iter()
        .map(|(k, _, _)| match k {
            Value::Int32(v) => *v,
            other => panic!("unexpected {other:?}"),
        })
        .collect();
    assert_eq!(got_keys, vec![1, 2, 2, 3, 3, 4, 5, 7, 8, 9]);

    // 置换不变性：全行多重集合一致
    let mut original = read_table(&columnar, 10);
    let mut sorted = got;
    original.sort();
    sorted.sort();
    assert_eq!(original, sorted);
}

#[test]
fn equal_keys_keep_original_relative_order() {
    let dir = TempDir::new().unwrap();
    // 全部键相等，负载编码原始行号；3 个分区跨界验证 (分区序, 区内位置) 约定
    let rows: Vec<(i32, String, String)> = (0..50)
        .map(|i| (7, format!("row{i:02}"), "1.00".to_string()))
        .collect();
    let rows_ref: Vec<(i32, &str, &str)> = rows
        .iter()
        .map(|(k, t, p)| (*k, t.as_str(), p.as_str()))
        .collect();
    let columnar = convert_rows(dir.path(), &rows_ref);

    let sorted_dir = dir.path().join("sorted");
    ExternalSorter::new(fact_schema(), sort_options(3, 16))
        .unwrap()
        .sort(&columnar, &sorted_dir, 50)
        .unwrap();

    let got = read_table(&sorted_dir, 50);
    for (i, (_, tag, _)) in got.iter().enumerate() {
        // Char(6) 空格右填充
        assert_eq!(*tag, Value::Chars(format!("row{i:02} ").into_bytes()));
    }
}

#[test]
fn fan_in_below_partition_count_triggers_merge_rounds() {
    let dir = TempDir::new().unwrap();
    let rows: Vec<(i32, String, String)> = (0..200)
        .map(|i| ((i * 37) % 101, format!("r{i:04}"), "0.01".to_string()))
        .collect();
    let rows_ref: Vec<(i32, &str, &str)> = rows
        .iter()
        .map(|(k, t, p)| (*k, t.as_str(), p.as_str()))
        .collect();
    let columnar = convert_rows(dir.path(), &rows_ref);

    let sorted_dir = dir.path().join("sorted");
    let stats = ExternalSorter::new(fact_schema(), sort_options(5, 2))
        .unwrap()
        .sort(&columnar, &sorted_dir, 200)
        .unwrap();
    assert_eq!(stats.rows, 200);
    assert!(stats.merge_rounds >= 1);

    let got = read_table(&sorted_dir, 200);
    for pair in got.windows(2) {
        assert!(pair[0].0 <= pair[1].0, "output not non-decreasing");
    }
    // 多重集合不变
    let mut original = read_table(&columnar, 200);
    let mut sorted = got;
    original.sort();
    sorted.sort();
    assert_eq!(original, sorted);
}

#[test]
fn count_mismatch_fails_without_committing_output() {
    let dir = TempDir::new().unwrap();
    let rows = [(1, "a", "1"), (2, "b", "2"), (3, "c", "3")];
    let columnar = convert_rows(dir.path(), &rows);

    let sorted_dir = dir.path().join("sorted");
    let err = ExternalSorter::new(fact_schema(), sort_options(2, 16))
        .unwrap()
        .sort(&columnar, &sorted_dir, 99);
    assert!(matches!(err, Err(EngineError::RowCountMismatch { .. })));

    // 无成品、无 .tmp、无临时 run 目录
    let schema = fact_schema();
    for c in 0..3 {
        assert!(!schema.column_path(&sorted_dir, c).exists());
        let mut tmp = schema.column_path(&sorted_dir, c).into_os_string();
        tmp.push(".tmp");
        assert!(!Path::new(&tmp).exists());
    }
    assert!(!sorted_dir.join(".sort-tmp").exists());
}

#[test]
fn scratch_dir_is_removed_on_success() {
    let dir = TempDir::new().unwrap();
    let rows = [(2, "b", "1"), (1, "a", "2")];
    let columnar = convert_rows(dir.path(), &rows);

    let sorted_dir = dir.path().join("sorted");
    ExternalSorter::new(fact_schema(), sort_options(2, 16))
        .unwrap()
        .sort(&columnar, &sorted_dir, 2)
        .unwrap();
    assert!(!sorted_dir.join(".sort-tmp").exists());
}

#[test]
fn lz4_output_round_trips_through_sort() {
    let dir = TempDir::new().unwrap();
    let rows: Vec<(i32, String, String)> = (0..3000)
        .map(|i| ((3000 - i) % 500, format!("r{i:04}"), format!("{}.25", i % 90)))
        .collect();
    let rows_ref: Vec<(i32, &str, &str)> = rows
        .iter()
        .map(|(k, t, p)| (*k, t.as_str(), p.as_str()))
        .collect();
    let columnar = convert_rows(dir.path(), &rows_ref);

    let sorted_dir = dir.path().join("sorted");
    let mut opts = sort_options(4, 16);
    opts.compression = CompressionType::Lz4;
    ExternalSorter::new(fact_schema(), opts)
        .unwrap()
        .sort(&columnar, &sorted_dir, 3000)
        .unwrap();

    let got = read_table(&sorted_dir, 3000);
    for pair in got.windows(2) {
        assert!(pair[0].0 <= pair[1].0);
    }
}

#[test]
fn ssb_lineorder_schema_converts_and_sorts_by_orderdate() {
    let dir = TempDir::new().unwrap();
    let tbl = dir.path().join("lineorder.tbl");
    // dbgen 风格的 lineorder 行（17 字段 + 行尾分隔符）
    let mut body = String::new();
    let dates = [19960315, 19920101, 19981120, 19940707];
    for (i, d) in dates.iter().enumerate() {
        body.push_str(&format!(
            "{ok}|{ln}|7|21|3|{d}|3-MEDIUM|0|17|2116823|17366547|4|2032150|74711|2|{cd}|TRUCK|\n",
            ok = i + 1,
            ln = 1,
            d = d,
            cd = d + 45,
        ));
    }
    fs::write(&tbl, body).unwrap();

    let columnar = dir.path().join("columnar");
    let schema = TableSchema::lineorder();
    Converter::new(schema.clone(), ConvertOptions::default())
        .convert(&tbl, &columnar)
        .unwrap();

    let sorted_dir = dir.path().join("sorted");
    ExternalSorter::new(
        schema.clone(),
        SortOptions {
            key_column:  "lo_orderdate".into(),
            partitions:  2,
            fan_in:      16,
            threads:     1,
            compression: CompressionType::None,
        },
    )
    .unwrap()
    .sort(&columnar, &sorted_dir, 4)
    .unwrap();

    let date_idx = schema.column_index("lo_orderdate").unwrap();
    let mut r = ColumnReader::open(&schema.column_path(&sorted_dir, date_idx)).unwrap();
    assert_eq!(
        r.read_range(0, 4).unwrap(),
        vec![
            Value::Date(19920101),
            Value::Date(19940707),
            Value::Date(19960315),
            Value::Date(19981120),
        ]
    );
}
