//! Payload extraction: `event_data` mapping to a scalar `value_prop` column
//!
//! Payload text is read either as JSON or as a flat literal mapping such as
//! `{'position': 0, 'value_prop': 'cellphone_recharge'}`. The literal grammar
//! only admits quoted keys and scalar values; nothing is evaluated.

use crate::error::PayloadError;
use crate::table::{CanonicalTable, Record};
use serde_json::{Number, Value};
use std::iter::Peekable;
use std::str::Chars;

/// Column holding the nested event payload
pub const PAYLOAD_COLUMN: &str = "event_data";

/// Column produced from the payload
pub const VALUE_PROP_COLUMN: &str = "value_prop";

/// Replace `event_data` with `value_prop` on every row
///
/// Row order and row count are preserved. The first row whose payload is
/// missing, malformed or lacks `value_prop` fails the whole table.
pub fn extract_value_prop(mut table: CanonicalTable) -> Result<CanonicalTable, PayloadError> {
    let name = table.name.clone();
    let error = |row: usize, reason: String| PayloadError {
        table: name.clone(),
        row,
        reason,
    };

    for (index, row) in table.rows.iter_mut().enumerate() {
        let payload = match row.fields.remove(PAYLOAD_COLUMN) {
            Some(Value::Object(map)) => map,
            Some(Value::String(text)) => parse_payload(&text).map_err(|reason| error(index, reason))?,
            Some(Value::Null) | None => {
                return Err(error(index, format!("missing {}", PAYLOAD_COLUMN)));
            }
            Some(other) => {
                return Err(error(index, format!("expected a mapping, got {}", other)));
            }
        };

        let value_prop = match payload.get(VALUE_PROP_COLUMN) {
            Some(Value::String(s)) if s.is_empty() => {
                return Err(error(index, format!("empty {}", VALUE_PROP_COLUMN)));
            }
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Null) | None => {
                return Err(error(index, format!("payload has no {}", VALUE_PROP_COLUMN)));
            }
            Some(other) => {
                return Err(error(index, format!("{} is not a scalar: {}", VALUE_PROP_COLUMN, other)));
            }
        };

        row.fields
            .insert(VALUE_PROP_COLUMN.to_string(), Value::String(value_prop));
    }

    table.add_column(VALUE_PROP_COLUMN);
    table.remove_column(PAYLOAD_COLUMN);
    Ok(table)
}

/// Deserialize payload text as a JSON object, falling back to a flat literal mapping
pub fn parse_payload(text: &str) -> Result<Record, String> {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(text) {
        return Ok(map);
    }
    LiteralParser::new(text).parse_mapping()
}

/// Parser for `{'key': scalar, ...}` with scalars: quoted strings, numbers,
/// `True`/`False`/`None` (and their lowercase JSON spellings)
struct LiteralParser<'a> {
    chars: Peekable<Chars<'a>>,
}

impl<'a> LiteralParser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            chars: text.chars().peekable(),
        }
    }

    fn parse_mapping(mut self) -> Result<Record, String> {
        let mut record = Record::new();
        self.expect('{')?;
        self.skip_whitespace();

        if self.chars.peek() == Some(&'}') {
            self.chars.next();
            return self.finish(record);
        }

        loop {
            self.skip_whitespace();
            if self.chars.peek() == Some(&'}') {
                // trailing comma
                self.chars.next();
                break;
            }
            let key = self.parse_string()?;
            self.expect(':')?;
            let value = self.parse_scalar()?;
            record.insert(key, value);

            self.skip_whitespace();
            match self.chars.next() {
                Some(',') => continue,
                Some('}') => break,
                Some(c) => return Err(format!("unexpected {:?} in mapping", c)),
                None => return Err("unterminated mapping".to_string()),
            }
        }

        self.finish(record)
    }

    fn finish(mut self, record: Record) -> Result<Record, String> {
        self.skip_whitespace();
        match self.chars.next() {
            None => Ok(record),
            Some(c) => Err(format!("unexpected {:?} after mapping", c)),
        }
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.chars.peek(), Some(c) if c.is_whitespace()) {
            self.chars.next();
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), String> {
        self.skip_whitespace();
        match self.chars.next() {
            Some(c) if c == expected => Ok(()),
            Some(c) => Err(format!("expected {:?}, found {:?}", expected, c)),
            None => Err(format!("expected {:?}, found end of input", expected)),
        }
    }

    fn parse_string(&mut self) -> Result<String, String> {
        self.skip_whitespace();
        let quote = match self.chars.next() {
            Some(q @ ('\'' | '"')) => q,
            Some(c) => return Err(format!("expected quoted key, found {:?}", c)),
            None => return Err("expected quoted key, found end of input".to_string()),
        };

        let mut out = String::new();
        loop {
            match self.chars.next() {
                Some(c) if c == quote => return Ok(out),
                Some('\\') => match self.chars.next() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some(c @ ('\\' | '\'' | '"')) => out.push(c),
                    Some(c) => return Err(format!("unsupported escape \\{}", c)),
                    None => return Err("unterminated string".to_string()),
                },
                Some(c) => out.push(c),
                None => return Err("unterminated string".to_string()),
            }
        }
    }

    fn parse_scalar(&mut self) -> Result<Value, String> {
        self.skip_whitespace();
        match self.chars.peek() {
            Some('\'' | '"') => self.parse_string().map(Value::String),
            Some('{' | '[' | '(') => Err("nested values are not supported".to_string()),
            Some(_) => {
                let mut token = String::new();
                while let Some(&c) = self.chars.peek() {
                    if c == ',' || c == '}' || c.is_whitespace() {
                        break;
                    }
                    token.push(c);
                    self.chars.next();
                }
                scalar_token(&token)
            }
            None => Err("expected value, found end of input".to_string()),
        }
    }
}

fn scalar_token(token: &str) -> Result<Value, String> {
    match token {
        "True" | "true" => return Ok(Value::Bool(true)),
        "False" | "false" => return Ok(Value::Bool(false)),
        "None" | "null" => return Ok(Value::Null),
        _ => {}
    }
    if let Ok(i) = token.parse::<i64>() {
        return Ok(Value::Number(i.into()));
    }
    token
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| format!("unsupported value {:?}", token))
}
