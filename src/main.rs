//! 命令行驱动：对引擎的两次外部调用（convert / sort）
//!
//! 编排逻辑本身没有算法含量——建目录、按表调用转换器、再对事实表调用
//! 排序器；期望行数既可显式给出，也可用 `--sf` 从内置基数表取。

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use log::error;

use ssb_columnar_engine::common::{EngineError, Result};
use ssb_columnar_engine::compression::CompressionType;
use ssb_columnar_engine::convert::{ConvertOptions, Converter};
use ssb_columnar_engine::schema::{lineorder_cardinality, TableSchema};
use ssb_columnar_engine::sort::{ExternalSorter, SortOptions};

#[derive(Parser)]
#[command(name = "ssb-columnar", version, about = "SSB columnar conversion and out-of-core sort")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CompressionArg {
    None,
    Lz4,
}

impl From<CompressionArg> for CompressionType {
    fn from(arg: CompressionArg) -> Self {
        match arg {
            CompressionArg::None => Self::None,
            CompressionArg::Lz4  => Self::Lz4,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// 把一张行式 .tbl 表转换为列式文件
    Convert {
        /// 表名：lineorder / date / customer / supplier / part
        #[arg(long)]
        table: String,
        /// 行式输入文件（.tbl）
        #[arg(long)]
        input: PathBuf,
        /// 列文件输出目录
        #[arg(long)]
        out_dir: PathBuf,
        #[arg(long, value_enum, default_value_t = CompressionArg::None)]
        compression: CompressionArg,
    },
    /// 对已转换的列式表按键列做外部归并排序
    Sort {
        #[arg(long, default_value = "lineorder")]
        table: String,
        /// 转换器输出目录（排序输入）
        #[arg(long)]
        input_dir: PathBuf,
        /// 排序结果输出目录
        #[arg(long)]
        out_dir: PathBuf,
        /// 排序键列名
        #[arg(long)]
        key: String,
        #[arg(long, default_value_t = 5)]
        partitions: usize,
        #[arg(long, default_value_t = 16)]
        fan_in: usize,
        /// 期望总行数；省略时需给 --sf 查内置基数表
        #[arg(long)]
        rows: Option<u64>,
        /// 规模因子（仅用于查 lineorder 基数）
        #[arg(long)]
        sf: Option<u32>,
        /// Phase 1 工作线程数；0 = 默认
        #[arg(long, default_value_t = 0)]
        threads: usize,
        #[arg(long, value_enum, default_value_t = CompressionArg::None)]
        compression: CompressionArg,
    },
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Convert { table, input, out_dir, compression } => {
            let schema = TableSchema::by_name(&table)?;
            let converter = Converter::new(
                schema,
                ConvertOptions { compression: compression.into() },
            );
            let stats = converter.convert(&input, &out_dir)?;
            println!("converted {} rows x {} columns", stats.rows, stats.columns);
            Ok(())
        }
        Command::Sort {
            table,
            input_dir,
            out_dir,
            key,
            partitions,
            fan_in,
            rows,
            sf,
            threads,
            compression,
        } => {
            let schema = TableSchema::by_name(&table)?;
            let expected_rows = match (rows, sf) {
                (Some(n), _) => n,
                (None, Some(sf)) => lineorder_cardinality(sf).ok_or_else(|| {
                    EngineError::InvalidParameter(format!("no known cardinality for sf={sf}"))
                })?,
                (None, None) => {
                    return Err(EngineError::InvalidParameter(
                        "either --rows or --sf is required".into(),
                    ))
                }
            };
            let sorter = ExternalSorter::new(
                schema,
                SortOptions {
                    key_column: key,
                    partitions,
                    fan_in,
                    threads,
                    compression: compression.into(),
                },
            )?;
            let stats = sorter.sort(&input_dir, &out_dir, expected_rows)?;
            println!(
                "sorted {} rows ({} partitions, {} intermediate merge rounds)",
                stats.rows, stats.partitions, stats.merge_rounds
            );
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
