//! Small composable validators over `serde_json::Value`.
//!
//! Each check is a plain function `fn(&mut Checker, &Value) -> Option<T>`;
//! `None` means the check failed and an [`Issue`] was recorded at the
//! current path. Checks nest through [`Checker::field`] and
//! [`Checker::array`], so one pass reports every problem in a payload.

use serde_json::{Map, Value};

use crate::error::{Issue, ValidationError};

/// A type that can be built from an untyped JSON value after checking its
/// shape.
pub trait Shape: Sized {
    fn from_value(value: &Value) -> Result<Self, ValidationError>;
}

#[derive(Debug, Default)]
pub struct Checker {
    path: Vec<String>,
    issues: Vec<Issue>,
}

impl Checker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure at the current path.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.issues.push(Issue { path: self.path.clone(), message: message.into() });
    }

    /// Run `check` with `segment` appended to the path.
    pub fn at<T>(&mut self, segment: impl Into<String>, check: impl FnOnce(&mut Self) -> T) -> T {
        self.path.push(segment.into());
        let out = check(self);
        self.path.pop();
        out
    }

    /// Required member of an object. A missing key is reported as `Required`.
    pub fn field<'v, T>(
        &mut self,
        object: &'v Map<String, Value>,
        key: &str,
        check: impl FnOnce(&mut Self, &'v Value) -> Option<T>,
    ) -> Option<T> {
        self.at(key, |c| match object.get(key) {
            Some(value) => check(c, value),
            None => {
                c.fail("Required");
                None
            }
        })
    }

    /// Optional member of an object. Absent yields `Some(None)`; present but
    /// invalid yields `None`.
    pub fn optional_field<'v, T>(
        &mut self,
        object: &'v Map<String, Value>,
        key: &str,
        check: impl FnOnce(&mut Self, &'v Value) -> Option<T>,
    ) -> Option<Option<T>> {
        match object.get(key) {
            None => Some(None),
            Some(value) => self.at(key, |c| check(c, value)).map(Some),
        }
    }

    /// Array whose items all pass `check` and which has at least `min` items.
    pub fn array<T>(
        &mut self,
        value: &Value,
        min: usize,
        too_short: &str,
        check: impl Fn(&mut Self, &Value) -> Option<T>,
    ) -> Option<Vec<T>> {
        let Some(items) = value.as_array() else {
            self.expected("array", value);
            return None;
        };

        if items.len() < min {
            self.fail(too_short);
            return None;
        }

        let mut out = Vec::with_capacity(items.len());
        let mut ok = true;
        for (idx, item) in items.iter().enumerate() {
            match self.at(idx.to_string(), |c| check(c, item)) {
                Some(v) => out.push(v),
                None => ok = false,
            }
        }

        ok.then_some(out)
    }

    /// Turn the collected issues into a result.
    pub fn finish<T>(self, value: Option<T>) -> Result<T, ValidationError> {
        match value {
            Some(v) if self.issues.is_empty() => Ok(v),
            _ => Err(ValidationError { issues: self.issues }),
        }
    }

    fn expected(&mut self, expected: &str, received: &Value) {
        self.fail(format!("Expected {expected}, received {}", type_name(received)));
    }
}

pub fn object<'v>(c: &mut Checker, value: &'v Value) -> Option<&'v Map<String, Value>> {
    let obj = value.as_object();
    if obj.is_none() {
        c.expected("object", value);
    }
    obj
}

pub fn string(c: &mut Checker, value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        other => {
            c.expected("string", other);
            None
        }
    }
}

pub fn number(c: &mut Checker, value: &Value) -> Option<f64> {
    let n = value.as_f64();
    if n.is_none() {
        c.expected("number", value);
    }
    n
}

/// Absolute URL, as accepted by the `url` crate.
pub fn url(c: &mut Checker, value: &Value) -> Option<String> {
    let s = string(c, value)?;
    if url::Url::parse(&s).is_err() {
        c.fail("Invalid URL");
        return None;
    }
    Some(s)
}

/// Timestamp of the exact form `YYYY-MM-DDTHH:MM:SS±HH:MM`.
pub fn offset_timestamp(c: &mut Checker, value: &Value) -> Option<String> {
    let s = string(c, value)?;
    if !is_offset_timestamp(&s) {
        c.fail("Invalid ISO 8601 datetime with timezone");
        return None;
    }
    Some(s)
}

/// String restricted to one of `allowed`.
pub fn one_of(c: &mut Checker, value: &Value, allowed: &[&str]) -> Option<String> {
    let s = string(c, value)?;
    if allowed.contains(&s.as_str()) {
        return Some(s);
    }

    let expected = allowed.iter().map(|a| format!("'{a}'")).collect::<Vec<_>>().join(" | ");
    c.fail(format!("Invalid enum value. Expected {expected}, received '{s}'"));
    None
}

fn is_offset_timestamp(s: &str) -> bool {
    const PATTERN: &[u8] = b"dddd-dd-ddTdd:dd:dd~dd:dd";

    let bytes = s.as_bytes();
    bytes.len() == PATTERN.len()
        && bytes.iter().zip(PATTERN).all(|(b, p)| match p {
            b'd' => b.is_ascii_digit(),
            b'~' => *b == b'+' || *b == b'-',
            lit => b == lit,
        })
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
