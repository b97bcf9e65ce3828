use std::collections::BTreeMap;

use serde::Serialize;

use crate::value::{ScriptTable, ScriptValue};

/// The structured description of a completed HTTP response. An envelope only exists when the
/// transport succeeded, so `success` reflects the status class (2xx) and nothing else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    pub success: bool,
    pub status_code: u16,
    pub reason_phrase: String,
    /// Lowercased header names, each with its values in the order they were received.
    pub headers: BTreeMap<String, Vec<String>>,
}

impl ResponseEnvelope {
    pub fn new(
        status_code: u16,
        reason_phrase: impl Into<String>,
        headers: BTreeMap<String, Vec<String>>,
    ) -> ResponseEnvelope {
        ResponseEnvelope {
            success: is_success_status(status_code),
            status_code,
            reason_phrase: reason_phrase.into(),
            headers,
        }
    }

    pub fn header(&self, name: &str) -> Option<&[String]> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(Vec::as_slice)
    }

    /// The caller-visible form: `{ success, statusCode, reasonPhrase, headers }`, where each
    /// header maps to an array of its values.
    pub fn to_script_value(&self) -> ScriptValue {
        let headers: ScriptTable = self
            .headers
            .iter()
            .map(|(name, values)| (name.as_str(), ScriptTable::array(values.iter().map(String::as_str))))
            .collect();

        ScriptTable::new()
            .with("success", self.success)
            .with("statusCode", i64::from(self.status_code))
            .with("reasonPhrase", self.reason_phrase.as_str())
            .with("headers", headers)
            .into()
    }
}

#[inline]
pub fn is_success_status(status_code: u16) -> bool {
    (200..300).contains(&status_code)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(status: u16, reason: &str) -> ResponseEnvelope {
        let mut headers = BTreeMap::new();
        headers.insert("set-cookie".to_owned(), vec!["a=1".to_owned(), "b=2".to_owned()]);
        headers.insert("content-type".to_owned(), vec!["text/plain".to_owned()]);
        ResponseEnvelope::new(status, reason, headers)
    }

    #[test]
    fn success_follows_status_class() {
        assert!(envelope(200, "OK").success);
        assert!(envelope(204, "No Content").success);
        assert!(!envelope(301, "Moved Permanently").success);
        assert!(!envelope(404, "Not Found").success);
        assert!(!envelope(500, "Internal Server Error").success);
        assert!(!is_success_status(199));
    }

    #[test]
    fn headers_keep_every_value() {
        let envelope = envelope(200, "OK");
        assert_eq!(
            envelope.header("Set-Cookie"),
            Some(&["a=1".to_owned(), "b=2".to_owned()][..])
        );
        assert_eq!(envelope.header("x-missing"), None);
    }

    #[test]
    fn script_form_uses_caller_field_names() {
        let value = envelope(404, "Not Found").to_script_value();
        let table = value.as_table().unwrap();

        assert_eq!(table.get("success"), Some(&ScriptValue::Boolean(false)));
        assert_eq!(table.get("statusCode"), Some(&ScriptValue::Integer(404)));
        assert_eq!(table.get("reasonPhrase"), Some(&ScriptValue::from("Not Found")));

        let headers = table.get("headers").and_then(ScriptValue::as_table).unwrap();
        let cookies = headers.get("set-cookie").and_then(ScriptValue::as_table).unwrap();
        assert_eq!(cookies.get_index(1), Some(&ScriptValue::from("a=1")));
        assert_eq!(cookies.get_index(2), Some(&ScriptValue::from("b=2")));
    }

    #[test]
    fn serializes_with_camel_case_fields() {
        let json = serde_json::to_value(envelope(200, "OK")).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["statusCode"], 200);
        assert_eq!(json["reasonPhrase"], "OK");
        assert_eq!(json["headers"]["set-cookie"][1], "b=2");
    }
}
