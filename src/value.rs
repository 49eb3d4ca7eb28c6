// ABOUTME: Dynamic SQL value type decoded from and encoded to the wire
// ABOUTME: Rows are positional vectors of these, addressed through the schema

use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use tokio_postgres::types::{to_sql_checked, FromSql, IsNull, ToSql, Type};
use uuid::Uuid;

/// A single column value.
///
/// Covers the PostgreSQL types the extractor understands natively. NUMERIC
/// keeps both its wire bytes (so it can be re-bound as a parameter without
/// loss) and a decoded decimal string for output. Anything else falls back
/// to UTF-8 text when the wire bytes allow it (enum labels do), or raw bytes.
#[derive(Debug, Clone)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Numeric { raw: Vec<u8>, text: String },
    Text(String),
    Bytes(Vec<u8>),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Date(NaiveDate),
    Time(NaiveTime),
    Uuid(Uuid),
    Json(serde_json::Value),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Decimal string for a NUMERIC literal, parsed back from wire bytes.
    pub fn numeric(text: &str) -> Result<Self, String> {
        let raw = encode_numeric(text)?;
        Ok(SqlValue::Numeric {
            raw,
            text: text.to_string(),
        })
    }

    /// Plain-text rendering without SQL quoting. Used for CSV fields,
    /// log output, and the anonymizer's canonical form.
    pub fn to_text(&self) -> String {
        match self {
            SqlValue::Null => String::new(),
            SqlValue::Bool(b) => b.to_string(),
            SqlValue::Int(i) => i.to_string(),
            SqlValue::Float(f) => f.to_string(),
            SqlValue::Numeric { text, .. } => text.clone(),
            SqlValue::Text(s) => s.clone(),
            SqlValue::Bytes(b) => {
                use base64::Engine as _;
                base64::engine::general_purpose::STANDARD.encode(b)
            }
            SqlValue::Timestamp(t) => t.format("%Y-%m-%dT%H:%M:%S%.f").to_string(),
            SqlValue::TimestampTz(t) => t.to_rfc3339(),
            SqlValue::Date(d) => d.to_string(),
            SqlValue::Time(t) => t.to_string(),
            SqlValue::Uuid(u) => u.to_string(),
            SqlValue::Json(j) => j.to_string(),
        }
    }

    /// Stable byte encoding for keyed hashing. Equal values produce equal
    /// bytes regardless of which table or column they came from.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = vec![self.rank()];
        match self {
            SqlValue::Bytes(b) => out.extend_from_slice(b),
            other => out.extend_from_slice(other.to_text().as_bytes()),
        }
        out
    }

    fn rank(&self) -> u8 {
        match self {
            SqlValue::Null => 0,
            SqlValue::Bool(_) => 1,
            SqlValue::Int(_) => 2,
            SqlValue::Float(_) => 3,
            SqlValue::Numeric { .. } => 4,
            SqlValue::Text(_) => 5,
            SqlValue::Bytes(_) => 6,
            SqlValue::Timestamp(_) => 7,
            SqlValue::TimestampTz(_) => 8,
            SqlValue::Date(_) => 9,
            SqlValue::Time(_) => 10,
            SqlValue::Uuid(_) => 11,
            SqlValue::Json(_) => 12,
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "NULL")
        } else {
            write!(f, "{}", self.to_text())
        }
    }
}

impl PartialEq for SqlValue {
    fn eq(&self, other: &Self) -> bool {
        use SqlValue::*;
        match (self, other) {
            (Null, Null) => true,
            (Bool(a), Bool(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            // Bit equality so row keys containing floats stay hashable.
            (Float(a), Float(b)) => a.to_bits() == b.to_bits(),
            (Numeric { text: a, .. }, Numeric { text: b, .. }) => a == b,
            (Text(a), Text(b)) => a == b,
            (Bytes(a), Bytes(b)) => a == b,
            (Timestamp(a), Timestamp(b)) => a == b,
            (TimestampTz(a), TimestampTz(b)) => a == b,
            (Date(a), Date(b)) => a == b,
            (Time(a), Time(b)) => a == b,
            (Uuid(a), Uuid(b)) => a == b,
            (Json(a), Json(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for SqlValue {}

impl Hash for SqlValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u8(self.rank());
        match self {
            SqlValue::Null => {}
            SqlValue::Bool(b) => b.hash(state),
            SqlValue::Int(i) => i.hash(state),
            SqlValue::Float(f) => f.to_bits().hash(state),
            SqlValue::Numeric { text, .. } => text.hash(state),
            SqlValue::Text(s) => s.hash(state),
            SqlValue::Bytes(b) => b.hash(state),
            SqlValue::Timestamp(t) => t.hash(state),
            SqlValue::TimestampTz(t) => t.hash(state),
            SqlValue::Date(d) => d.hash(state),
            SqlValue::Time(t) => t.hash(state),
            SqlValue::Uuid(u) => u.hash(state),
            SqlValue::Json(j) => j.to_string().hash(state),
        }
    }
}

impl PartialOrd for SqlValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SqlValue {
    fn cmp(&self, other: &Self) -> Ordering {
        use SqlValue::*;
        match (self, other) {
            (Bool(a), Bool(b)) => a.cmp(b),
            (Int(a), Int(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (Numeric { text: a, .. }, Numeric { text: b, .. }) => a.cmp(b),
            (Text(a), Text(b)) => a.cmp(b),
            (Bytes(a), Bytes(b)) => a.cmp(b),
            (Timestamp(a), Timestamp(b)) => a.cmp(b),
            (TimestampTz(a), TimestampTz(b)) => a.cmp(b),
            (Date(a), Date(b)) => a.cmp(b),
            (Time(a), Time(b)) => a.cmp(b),
            (Uuid(a), Uuid(b)) => a.cmp(b),
            (Json(a), Json(b)) => a.to_string().cmp(&b.to_string()),
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }
}

impl<'a> FromSql<'a> for SqlValue {
    fn from_sql(
        ty: &Type,
        raw: &'a [u8],
    ) -> Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        let value = match ty.name() {
            "bool" => SqlValue::Bool(bool::from_sql(ty, raw)?),
            "int2" => SqlValue::Int(i16::from_sql(ty, raw)? as i64),
            "int4" => SqlValue::Int(i32::from_sql(ty, raw)? as i64),
            "int8" => SqlValue::Int(i64::from_sql(ty, raw)?),
            "oid" => SqlValue::Int(u32::from_sql(ty, raw)? as i64),
            "float4" => SqlValue::Float(f32::from_sql(ty, raw)? as f64),
            "float8" => SqlValue::Float(f64::from_sql(ty, raw)?),
            "numeric" => SqlValue::Numeric {
                raw: raw.to_vec(),
                text: decode_numeric(raw)?,
            },
            "text" | "varchar" | "bpchar" | "name" | "citext" | "unknown" => {
                SqlValue::Text(String::from_sql(ty, raw)?)
            }
            "bytea" => SqlValue::Bytes(raw.to_vec()),
            "timestamp" => SqlValue::Timestamp(NaiveDateTime::from_sql(ty, raw)?),
            "timestamptz" => SqlValue::TimestampTz(DateTime::<Utc>::from_sql(ty, raw)?),
            "date" => SqlValue::Date(NaiveDate::from_sql(ty, raw)?),
            "time" => SqlValue::Time(NaiveTime::from_sql(ty, raw)?),
            "uuid" => SqlValue::Uuid(Uuid::from_sql(ty, raw)?),
            "json" | "jsonb" => SqlValue::Json(serde_json::Value::from_sql(ty, raw)?),
            // Enum labels and other text-shaped types arrive as their UTF-8
            // wire form; anything truly binary is kept opaque.
            _ => match std::str::from_utf8(raw) {
                Ok(s) => SqlValue::Text(s.to_string()),
                Err(_) => SqlValue::Bytes(raw.to_vec()),
            },
        };
        Ok(value)
    }

    fn from_sql_null(_: &Type) -> Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        Ok(SqlValue::Null)
    }

    fn accepts(_: &Type) -> bool {
        true
    }
}

impl ToSql for SqlValue {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            SqlValue::Null => Ok(IsNull::Yes),
            SqlValue::Bool(b) => b.to_sql(ty, out),
            SqlValue::Int(i) => match ty.name() {
                "int2" => i16::try_from(*i)?.to_sql(ty, out),
                "int4" => i32::try_from(*i)?.to_sql(ty, out),
                "oid" => u32::try_from(*i)?.to_sql(ty, out),
                "float8" => (*i as f64).to_sql(ty, out),
                "text" | "varchar" => i.to_string().to_sql(ty, out),
                _ => i.to_sql(ty, out),
            },
            SqlValue::Float(f) => match ty.name() {
                "float4" => (*f as f32).to_sql(ty, out),
                _ => f.to_sql(ty, out),
            },
            SqlValue::Numeric { raw, .. } => {
                out.extend_from_slice(raw);
                Ok(IsNull::No)
            }
            SqlValue::Text(s) => {
                out.extend_from_slice(s.as_bytes());
                Ok(IsNull::No)
            }
            SqlValue::Bytes(b) => {
                out.extend_from_slice(b);
                Ok(IsNull::No)
            }
            SqlValue::Timestamp(t) => t.to_sql(ty, out),
            SqlValue::TimestampTz(t) => t.to_sql(ty, out),
            SqlValue::Date(d) => d.to_sql(ty, out),
            SqlValue::Time(t) => t.to_sql(ty, out),
            SqlValue::Uuid(u) => u.to_sql(ty, out),
            SqlValue::Json(j) => j.to_sql(ty, out),
        }
    }

    fn accepts(_: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

/// Decode the PostgreSQL binary NUMERIC wire format into a decimal string.
///
/// Layout: u16 digit count, i16 weight (in base-10000 groups), u16 sign,
/// u16 display scale, then the base-10000 digit groups, all big-endian.
pub fn decode_numeric(raw: &[u8]) -> Result<String, Box<dyn std::error::Error + Sync + Send>> {
    if raw.len() < 8 {
        return Err("numeric value too short".into());
    }
    let read_u16 = |at: usize| u16::from_be_bytes([raw[at], raw[at + 1]]);
    let ndigits = read_u16(0) as usize;
    let weight = i16::from_be_bytes([raw[2], raw[3]]) as i32;
    let sign = read_u16(4);
    let dscale = read_u16(6) as usize;

    if raw.len() < 8 + ndigits * 2 {
        return Err("numeric value truncated".into());
    }
    let digits: Vec<u16> = (0..ndigits).map(|i| read_u16(8 + i * 2)).collect();

    match sign {
        0x0000 | 0x4000 => {}
        0xC000 => return Ok("NaN".to_string()),
        other => return Err(format!("unrecognized numeric sign word {:#06x}", other).into()),
    }

    let mut text = String::new();
    if sign == 0x4000 {
        text.push('-');
    }

    // Integer part: digit group at index i carries weight (weight - i).
    if weight < 0 {
        text.push('0');
    } else {
        for idx in 0..=(weight as usize) {
            let group = digits.get(idx).copied().unwrap_or(0);
            if idx == 0 {
                text.push_str(&group.to_string());
            } else {
                text.push_str(&format!("{:04}", group));
            }
        }
    }

    if dscale > 0 {
        let mut frac = String::new();
        let frac_groups = dscale.div_ceil(4);
        for k in 1..=frac_groups as i32 {
            let idx = weight + k;
            let group = if idx >= 0 {
                digits.get(idx as usize).copied().unwrap_or(0)
            } else {
                0
            };
            frac.push_str(&format!("{:04}", group));
        }
        frac.truncate(dscale);
        text.push('.');
        text.push_str(&frac);
    }

    Ok(text)
}

/// Encode a decimal string into the binary NUMERIC wire format.
/// Inverse of [`decode_numeric`]; used to bind parsed seed literals.
pub fn encode_numeric(text: &str) -> Result<Vec<u8>, String> {
    let trimmed = text.trim();
    let (negative, unsigned) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };

    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((i, f)) => (i, f),
        None => (unsigned, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(format!("'{}' is not a decimal number", text));
    }
    if !int_part.chars().all(|c| c.is_ascii_digit())
        || !frac_part.chars().all(|c| c.is_ascii_digit())
    {
        return Err(format!("'{}' is not a decimal number", text));
    }

    let dscale = frac_part.len();
    let int_digits = if int_part.is_empty() { "0" } else { int_part };

    // Left-pad the integer part and right-pad the fraction so both split
    // cleanly into base-10000 groups.
    let pad_left = (4 - int_digits.len() % 4) % 4;
    let mut aligned = "0".repeat(pad_left);
    aligned.push_str(int_digits);
    let int_groups = aligned.len() / 4;
    let pad_right = (4 - frac_part.len() % 4) % 4;
    aligned.push_str(frac_part);
    aligned.push_str(&"0".repeat(pad_right));

    let mut groups: Vec<u16> = aligned
        .as_bytes()
        .chunks(4)
        .map(|chunk| std::str::from_utf8(chunk).unwrap().parse::<u16>().unwrap())
        .collect();

    let mut weight = int_groups as i32 - 1;
    while groups.first() == Some(&0) && weight >= 0 && groups.len() > 1 {
        groups.remove(0);
        weight -= 1;
    }
    while groups.last() == Some(&0) && groups.len() > 1 {
        groups.pop();
    }

    let zero = groups.iter().all(|&g| g == 0);
    if zero {
        groups.clear();
        weight = 0;
    }

    let sign_word: u16 = if negative && !zero { 0x4000 } else { 0x0000 };
    let mut out = Vec::with_capacity(8 + groups.len() * 2);
    out.extend_from_slice(&(groups.len() as u16).to_be_bytes());
    out.extend_from_slice(&(weight as i16).to_be_bytes());
    out.extend_from_slice(&sign_word.to_be_bytes());
    out.extend_from_slice(&(dscale as u16).to_be_bytes());
    for group in groups {
        out.extend_from_slice(&group.to_be_bytes());
    }
    Ok(out)
}
