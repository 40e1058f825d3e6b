//! 全局基础类型与错误定义

use std::path::Path;

use thiserror::Error;

/// 表内行号（按基数上限 12 亿条，必须是 64 位）
pub type RowId = u64;

// ── 错误 ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum EngineError {
    // 输入错误
    #[error("cannot open input file {path}: {source}")]
    InputUnreadable {
        path:   String,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}:{line}: expected {expected} fields, found {found}")]
    FieldCountMismatch {
        path:     String,
        line:     u64,
        expected: usize,
        found:    usize,
    },
    #[error("{path}:{line}: column `{column}`: cannot parse {text:?} as {type_name}")]
    UnparsableField {
        path:      String,
        line:      u64,
        column:    String,
        text:      String,
        type_name: &'static str,
    },

    // 完整性错误
    #[error("row count mismatch ({context}): expected {expected}, actual {actual}")]
    RowCountMismatch {
        expected: u64,
        actual:   u64,
        context:  String,
    },
    #[error("checksum mismatch")]
    ChecksumMismatch,
    #[error("malformed column file {path}: {reason}")]
    MalformedColumnFile { path: String, reason: String },

    // 模式错误
    #[error("unknown table: {0}")]
    UnknownTable(String),
    #[error("unknown column `{column}` in table `{table}`")]
    UnknownColumn { table: String, column: String },

    // 资源错误
    #[error("I/O error on {path}: {source}")]
    Io {
        path:   String,
        #[source]
        source: std::io::Error,
    },
    #[error("compression error: {0}")]
    Compression(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

impl EngineError {
    /// 给 I/O 错误补上路径上下文
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io { path: path.display().to_string(), source }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
