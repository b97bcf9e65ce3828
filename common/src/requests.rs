//! Marshalling of script call arguments into typed request descriptors.
//!
//! Every accepted key and value type is enumerated here. Anything else is rejected with an
//! [`ArgumentError`] that names the offending argument and field, before an operation id is
//! allocated.

use std::collections::btree_map::{self, BTreeMap};

use http::header::{HeaderName, HeaderValue};
use url::Url;

use crate::error::ArgumentError;
use crate::validate;
use crate::value::ScriptValue;

pub const CONTENT_TYPE: &str = "content-type";
pub const USER_AGENT: &str = "user-agent";
pub const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

pub const INVALID_URL: &str = "invalid request url";

/// Outgoing headers, one value per name. Names are stored lowercased so that removal matches
/// regardless of how the script spelled the key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(BTreeMap<String, String>);

impl Headers {
    pub fn new() -> Headers {
        Headers::default()
    }

    pub fn insert(&mut self, name: &str, value: impl Into<String>) -> Option<String> {
        self.0.insert(name.to_ascii_lowercase(), value.into())
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.0.remove(&name.to_ascii_lowercase())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    #[inline]
    pub fn iter(&self) -> btree_map::Iter<'_, String, String> {
        self.0.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Applies a script header table on top of `self`: strings and numbers set a header, `nil`
    /// removes one. `position` is the argument index reported on error.
    pub fn apply_script(&mut self, table: &ScriptValue, position: usize) -> Result<(), ArgumentError> {
        let table = match table {
            ScriptValue::Nil => return Ok(()),
            ScriptValue::Table(table) => table,
            other => {
                return Err(ArgumentError::new(
                    position,
                    format!("table expected, got {}", other.type_name()),
                ))
            }
        };

        for (key, value) in table {
            let name = match key {
                key if key.is_string_or_number() => key.coerce_string(),
                _ => None,
            };
            let name = name.ok_or_else(|| {
                ArgumentError::new(
                    position,
                    format!("string expected, got {} as header name", key.type_name()),
                )
            })?;

            if HeaderName::from_bytes(name.as_bytes()).is_err() {
                return Err(ArgumentError::new(position, format!("invalid header name '{}'", name)));
            }

            match value {
                ScriptValue::Nil => {
                    self.remove(&name);
                }
                value if value.is_string_or_number() => {
                    let text = value
                        .coerce_string()
                        .filter(|text| HeaderValue::from_str(text).is_ok())
                        .ok_or_else(|| {
                            ArgumentError::new(position, format!("invalid value in field {}", name))
                        })?;

                    self.insert(&name, text);
                }
                other => {
                    return Err(ArgumentError::new(
                        position,
                        format!(
                            "string, number or nil expected, got {} in field {}",
                            other.type_name(),
                            name
                        ),
                    ))
                }
            }
        }

        Ok(())
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = (&'a String, &'a String);
    type IntoIter = btree_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    Text(String),
    Bytes(Vec<u8>),
}

impl RequestBody {
    pub fn len(&self) -> usize {
        match self {
            RequestBody::Text(text) => text.len(),
            RequestBody::Bytes(bytes) => bytes.len(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    pub method: Option<String>,
    /// Treat both the request body and the response body as raw bytes.
    pub binary: bool,
}

impl RequestOptions {
    pub fn from_script(options: &ScriptValue, position: usize) -> Result<RequestOptions, ArgumentError> {
        let mut parsed = RequestOptions::default();

        let table = match options {
            ScriptValue::Nil => return Ok(parsed),
            ScriptValue::Table(table) => table,
            other => {
                return Err(ArgumentError::new(
                    position,
                    format!("table expected, got {}", other.type_name()),
                ))
            }
        };

        for (key, value) in table {
            match key.as_str() {
                Some("method") => match value {
                    ScriptValue::Nil => parsed.method = None,
                    ScriptValue::String(method) => {
                        if http::Method::from_bytes(method.as_bytes()).is_err() {
                            return Err(ArgumentError::new(
                                position,
                                format!("invalid method '{}'", method),
                            ));
                        }
                        parsed.method = Some(method.clone());
                    }
                    other => {
                        return Err(ArgumentError::new(
                            position,
                            format!("string expected, got {} in field method", other.type_name()),
                        ))
                    }
                },
                Some("binary") => match value {
                    ScriptValue::Nil => parsed.binary = false,
                    ScriptValue::Boolean(binary) => parsed.binary = *binary,
                    other => {
                        return Err(ArgumentError::new(
                            position,
                            format!("boolean expected, got {} in field binary", other.type_name()),
                        ))
                    }
                },
                Some(other) => {
                    return Err(ArgumentError::new(position, format!("unknown option '{}'", other)))
                }
                None => {
                    return Err(ArgumentError::new(
                        position,
                        format!("string expected, got {} as option name", key.type_name()),
                    ))
                }
            }
        }

        Ok(parsed)
    }
}

/// A fully resolved HTTP request. Immutable once handed to a worker.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    pub url: Url,
    pub method: String,
    pub headers: Headers,
    pub body: Option<RequestBody>,
    pub binary: bool,
}

impl RequestDescriptor {
    /// Resolves the method (GET without a body, POST with one, unless overridden) and gives text
    /// bodies a default content type.
    pub fn new(
        url: Url,
        body: Option<RequestBody>,
        mut headers: Headers,
        options: RequestOptions,
    ) -> RequestDescriptor {
        let method = match options.method {
            Some(method) => method,
            None if body.is_some() => http::Method::POST.to_string(),
            None => http::Method::GET.to_string(),
        };

        if let Some(RequestBody::Text(_)) = body {
            if !headers.contains(CONTENT_TYPE) {
                headers.insert(CONTENT_TYPE, TEXT_CONTENT_TYPE);
            }
        }

        RequestDescriptor {
            url,
            method,
            headers,
            body,
            binary: options.binary,
        }
    }

    /// Marshals the arguments of `requestAsync(url, body?, headers?, options?)`.
    pub fn from_script(
        url: &str,
        body: &ScriptValue,
        headers: &ScriptValue,
        options: &ScriptValue,
        defaults: &Headers,
    ) -> Result<RequestDescriptor, ArgumentError> {
        let url = validate::parse_url(url).ok_or_else(|| ArgumentError::new(1, INVALID_URL))?;

        let mut resolved = defaults.clone();
        resolved.apply_script(headers, 3)?;

        let options = RequestOptions::from_script(options, 4)?;
        let body = body_from_script(body, options.binary, 2)?;

        Ok(RequestDescriptor::new(url, body, resolved, options))
    }
}

fn body_from_script(
    body: &ScriptValue,
    binary: bool,
    position: usize,
) -> Result<Option<RequestBody>, ArgumentError> {
    if body.is_nil() {
        return Ok(None);
    }

    let expected = || ArgumentError::new(position, format!("string expected, got {}", body.type_name()));

    if !body.is_string_or_number() {
        return Err(expected());
    }

    if binary {
        body.coerce_bytes().map(|bytes| Some(RequestBody::Bytes(bytes))).ok_or_else(expected)
    } else {
        body.coerce_string().map(|text| Some(RequestBody::Text(text))).ok_or_else(|| {
            ArgumentError::new(position, "body is not valid UTF-8, use the binary option")
        })
    }
}

/// A WebSocket connection request.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectDescriptor {
    pub url: Url,
    pub headers: Headers,
}

impl ConnectDescriptor {
    /// Marshals the arguments of `websocketAsync(url, headers?)`.
    pub fn from_script(
        url: &str,
        headers: &ScriptValue,
        defaults: &Headers,
    ) -> Result<ConnectDescriptor, ArgumentError> {
        let url = validate::parse_url(url).ok_or_else(|| ArgumentError::new(1, INVALID_URL))?;

        let mut resolved = defaults.clone();
        resolved.apply_script(headers, 2)?;

        Ok(ConnectDescriptor { url, headers: resolved })
    }
}
