//! 列的语义类型与运行时值表示
//!
//! 所有类型定宽，宽度即列文件中的物理步长：
//!
//! | 类型      | 宽度    | 物理表示                      |
//! |-----------|---------|-------------------------------|
//! | `Int32`   | 4       | i32 LE                        |
//! | `Int64`   | 8       | i64 LE                        |
//! | `Decimal` | 8       | i64 LE，scale=2（12.34→1234） |
//! | `Char(n)` | n       | 定长字节，空格右填充          |
//! | `Date`    | 4       | i32 LE，yyyymmdd              |

/// 列在列式文件中的存储类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Int32,
    Int64,
    /// 定点小数，按 10^2 缩放为 i64 存储；比较与排序全程走整数，无浮点近似
    Decimal,
    Char(u16),
    /// 日期按 yyyymmdd 整数存储（dbgen 的 datekey 表示）
    Date,
}

/// Decimal 的小数位数
pub const DECIMAL_SCALE: u32 = 2;

impl FieldType {
    /// 固定字节宽度
    pub fn fixed_size(self) -> usize {
        match self {
            Self::Int32 | Self::Date    => 4,
            Self::Int64 | Self::Decimal => 8,
            Self::Char(n)               => n as usize,
        }
    }

    pub fn type_name(self) -> &'static str {
        match self {
            Self::Int32   => "int32",
            Self::Int64   => "int64",
            Self::Decimal => "decimal",
            Self::Char(_) => "char",
            Self::Date    => "date",
        }
    }

    /// 按语义类型解析一个文本字段；失败返回 None，文件/行号上下文由调用方补充
    pub fn parse(self, text: &str) -> Option<Value> {
        match self {
            Self::Int32   => text.parse::<i32>().ok().map(Value::Int32),
            Self::Int64   => text.parse::<i64>().ok().map(Value::Int64),
            Self::Date    => text.parse::<i32>().ok().map(Value::Date),
            Self::Decimal => parse_decimal(text).map(Value::Decimal),
            Self::Char(n) => {
                let bytes = text.as_bytes();
                if bytes.len() > n as usize {
                    return None;
                }
                let mut buf = vec![b' '; n as usize];
                buf[..bytes.len()].copy_from_slice(bytes);
                Some(Value::Chars(buf))
            }
        }
    }

    /// 从定宽小端字节解码一个值；`bytes` 长度必须等于 `fixed_size`
    pub fn decode(self, bytes: &[u8]) -> Value {
        match self {
            Self::Int32   => Value::Int32(i32::from_le_bytes(bytes[..4].try_into().unwrap())),
            Self::Int64   => Value::Int64(i64::from_le_bytes(bytes[..8].try_into().unwrap())),
            Self::Decimal => Value::Decimal(i64::from_le_bytes(bytes[..8].try_into().unwrap())),
            Self::Date    => Value::Date(i32::from_le_bytes(bytes[..4].try_into().unwrap())),
            Self::Char(_) => Value::Chars(bytes.to_vec()),
        }
    }

    // ── Footer 序列化用的类型标签 ─────────────────────────────────────────────

    pub fn to_tag(self) -> (u8, u16) {
        match self {
            Self::Int32   => (0, 0),
            Self::Int64   => (1, 0),
            Self::Decimal => (2, 0),
            Self::Char(n) => (3, n),
            Self::Date    => (4, 0),
        }
    }

    pub fn from_tag(tag: u8, aux: u16) -> Option<Self> {
        match tag {
            0 => Some(Self::Int32),
            1 => Some(Self::Int64),
            2 => Some(Self::Decimal),
            3 => Some(Self::Char(aux)),
            4 => Some(Self::Date),
            _ => None,
        }
    }
}

/// 全精度定点解析：接受 `1234` 与 `-12.34` 两种写法，小数位至多 2 位
fn parse_decimal(s: &str) -> Option<i64> {
    let (neg, s) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None       => (false, s),
    };
    let (int_part, frac_part) = match s.split_once('.') {
        Some((i, f)) => (i, f),
        None         => (s, ""),
    };
    if int_part.is_empty() || frac_part.len() > DECIMAL_SCALE as usize {
        return None;
    }
    if !int_part.bytes().all(|b| b.is_ascii_digit())
        || !frac_part.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }
    let whole: i64 = int_part.parse().ok()?;
    // "12.3" 与 "12.30" 等值：右侧补零到 scale 位
    let mut frac: i64 = if frac_part.is_empty() { 0 } else { frac_part.parse().ok()? };
    for _ in frac_part.len()..DECIMAL_SCALE as usize {
        frac *= 10;
    }
    let v = whole.checked_mul(100)?.checked_add(frac)?;
    Some(if neg { -v } else { v })
}

// ── 运行时值 ──────────────────────────────────────────────────────────────────

/// 列值（运行时表示）
///
/// 派生的 `Ord` 在同类型之间是声明精度下的数值/字节序全序；
/// 同一列的值永远同类型，跨类型的判别式顺序实际不会参与比较。
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Value {
    Int32(i32),
    Int64(i64),
    Decimal(i64),
    Date(i32),
    Chars(Vec<u8>),
}

impl Value {
    /// 定宽小端编码，追加到 `out`
    pub fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Self::Int32(v)   => out.extend_from_slice(&v.to_le_bytes()),
            Self::Int64(v)   => out.extend_from_slice(&v.to_le_bytes()),
            Self::Decimal(v) => out.extend_from_slice(&v.to_le_bytes()),
            Self::Date(v)    => out.extend_from_slice(&v.to_le_bytes()),
            Self::Chars(b)   => out.extend_from_slice(b),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int32(v)   => write!(f, "{v}"),
            Self::Int64(v)   => write!(f, "{v}"),
            Self::Decimal(v) => write!(f, "{}.{:02}", v / 100, (v % 100).abs()),
            Self::Date(v)    => write!(f, "{v}"),
            Self::Chars(b)   => write!(f, "{}", String::from_utf8_lossy(b)),
        }
    }
}
