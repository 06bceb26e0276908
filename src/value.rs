//! Dynamic row values
//! ------------------
//! Column types are only known at runtime, so rows travel as maps of a small
//! scalar sum type. `Value` is also the driver boundary: it implements
//! `ToSql` by adapting to whatever parameter type Postgres inferred.

use std::collections::BTreeMap;
use std::error::Error;

use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// One record: column name -> value. Key order carries no meaning.
pub type Row = BTreeMap<String, Value>;

impl Value {
    /// Convert any JSON value; arrays and objects are kept as their JSON text.
    ///
    /// Integers that fit `i64` become `Int`; larger unsigned integers are kept
    /// as their decimal text. Other numbers become `Float`, so a `numeric`
    /// value carrying more than f64's ~15-17 significant digits is rounded.
    pub fn from_json(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() { Value::Int(i) }
                else if n.is_u64() { Value::Text(n.to_string()) }
                else { Value::Float(n.as_f64().unwrap_or(f64::NAN)) }
            }
            serde_json::Value::String(s) => Value::Text(s),
            other => Value::Text(other.to_string()),
        }
    }

    pub fn is_null(&self) -> bool { matches!(self, Value::Null) }

    /// Text form used for text-typed parameters. `None` for SQL NULL.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Bool(b) => Some(b.to_string()),
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Text(s) => Some(s.clone()),
        }
    }

    /// Integer view, accepting integral floats and numeric strings.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
            Value::Text(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Text(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "t" | "true" | "yes" | "on" | "1" => Some(true),
                "f" | "false" | "no" | "off" | "0" => Some(false),
                _ => None,
            },
            Value::Int(1) => Some(true),
            Value::Int(0) => Some(false),
            _ => None,
        }
    }
}

/// Decode one `row_to_json` document into a row.
pub fn row_from_json_text(text: &str) -> Result<Row, serde_json::Error> {
    let map: serde_json::Map<String, serde_json::Value> = serde_json::from_str(text)?;
    Ok(map.into_iter().map(|(k, v)| (k, Value::from_json(v))).collect())
}

/// Convert a JSON object payload into a row.
pub fn row_from_json_object(map: serde_json::Map<String, serde_json::Value>) -> Row {
    map.into_iter().map(|(k, v)| (k, Value::from_json(v))).collect()
}

fn mismatch(v: &Value, ty: &Type) -> Box<dyn Error + Sync + Send> {
    format!("cannot bind {:?} as parameter of type {}", v, ty).into()
}

fn is_textual(ty: &Type) -> bool {
    *ty == Type::TEXT || *ty == Type::VARCHAR || *ty == Type::BPCHAR || *ty == Type::NAME || *ty == Type::UNKNOWN
}

impl ToSql for Value {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        if self.is_null() {
            return Ok(IsNull::Yes);
        }
        if *ty == Type::INT2 {
            let i = self.as_i64().ok_or_else(|| mismatch(self, ty))?;
            return i16::try_from(i)?.to_sql(ty, out);
        }
        if *ty == Type::INT4 {
            let i = self.as_i64().ok_or_else(|| mismatch(self, ty))?;
            return i32::try_from(i)?.to_sql(ty, out);
        }
        if *ty == Type::INT8 {
            return self.as_i64().ok_or_else(|| mismatch(self, ty))?.to_sql(ty, out);
        }
        if *ty == Type::FLOAT4 {
            return (self.as_f64().ok_or_else(|| mismatch(self, ty))? as f32).to_sql(ty, out);
        }
        if *ty == Type::FLOAT8 {
            return self.as_f64().ok_or_else(|| mismatch(self, ty))?.to_sql(ty, out);
        }
        if *ty == Type::BOOL {
            return self.as_bool().ok_or_else(|| mismatch(self, ty))?.to_sql(ty, out);
        }
        if is_textual(ty) {
            // non-null, so to_text is always Some
            let s = self.to_text().unwrap_or_default();
            return s.as_str().to_sql(ty, out);
        }
        Err(mismatch(self, ty))
    }

    fn accepts(ty: &Type) -> bool {
        is_textual(ty)
            || *ty == Type::INT2
            || *ty == Type::INT4
            || *ty == Type::INT8
            || *ty == Type::FLOAT4
            || *ty == Type::FLOAT8
            || *ty == Type::BOOL
    }

    to_sql_checked!();
}
