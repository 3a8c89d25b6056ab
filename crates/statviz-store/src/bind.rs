//! Named-parameter binding
//!
//! Statements reference parameters as `:name`; the store binds them
//! positionally. The rewrite walks the statement once, skipping string
//! literals and quoted identifiers, and leaves `::` casts alone.

use crate::StoreError;
use serde_json::Value;

/// Rewrite `:name` placeholders to `?` and collect their values in order.
pub fn bind_positional(
    sql: &str,
    params: &serde_json::Map<String, Value>,
) -> Result<(String, Vec<duckdb::types::Value>), StoreError> {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len());
    let mut values = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            // String literal: copy through to the closing quote ('' escapes)
            '\'' => {
                out.push(c);
                i += 1;
                while i < chars.len() {
                    out.push(chars[i]);
                    if chars[i] == '\'' {
                        if i + 1 < chars.len() && chars[i + 1] == '\'' {
                            out.push(chars[i + 1]);
                            i += 2;
                            continue;
                        }
                        i += 1;
                        break;
                    }
                    i += 1;
                }
            }
            // Quoted identifier
            '"' => {
                out.push(c);
                i += 1;
                while i < chars.len() {
                    out.push(chars[i]);
                    if chars[i] == '"' {
                        i += 1;
                        break;
                    }
                    i += 1;
                }
            }
            ':' => {
                // `::` is a cast, not a parameter
                if i + 1 < chars.len() && chars[i + 1] == ':' {
                    out.push_str("::");
                    i += 2;
                } else if i + 1 < chars.len() && is_ident_start(chars[i + 1]) {
                    let mut j = i + 1;
                    while j < chars.len() && is_ident_char(chars[j]) {
                        j += 1;
                    }
                    let name: String = chars[i + 1..j].iter().collect();
                    let value = params
                        .get(&name)
                        .ok_or_else(|| StoreError::MissingParameter(name.clone()))?;
                    values.push(scalar_to_duckdb(&name, value)?);
                    out.push('?');
                    i = j;
                } else {
                    out.push(c);
                    i += 1;
                }
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    Ok((out, values))
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn scalar_to_duckdb(name: &str, value: &Value) -> Result<duckdb::types::Value, StoreError> {
    use duckdb::types::Value as Dv;

    Ok(match value {
        Value::Null => Dv::Null,
        Value::Bool(b) => Dv::Boolean(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Dv::BigInt(i)
            } else if let Some(f) = n.as_f64() {
                Dv::Double(f)
            } else {
                return Err(StoreError::InvalidParameter(name.to_string()));
            }
        }
        Value::String(s) => Dv::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => {
            return Err(StoreError::InvalidParameter(name.to_string()))
        }
    })
}
