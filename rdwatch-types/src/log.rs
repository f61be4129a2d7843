//! Log push-stream entries.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One log record as emitted by the server's log stream.
///
/// Entries are immutable once received. Structured data recorded by the
/// server-side tracing span lives in `fields`; a few well-known keys get
/// dedicated accessors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// RFC 3339 timestamp string, kept verbatim.
    pub timestamp: String,

    /// Level as sent by the server (`ERROR`, `WARN`, `info`, ...).
    pub level: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Module path of the emitting component.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    #[serde(default)]
    pub fields: Map<String, Value>,
}

/// Normalized log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    /// Anything the server sends that isn't a known level.
    Other,
}

impl LogLevel {
    /// Parse a level string case-insensitively. `warning` maps to `Warn`.
    pub fn parse(level: &str) -> Self {
        match level.to_ascii_lowercase().as_str() {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warn" | "warning" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Other,
        }
    }

    /// Returns a short label for display.
    pub fn label(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Other => "?",
        }
    }
}

/// Connection context attached to proxy log lines under `fields.ctx`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogContext {
    #[serde(default)]
    pub src_socket_addr: Option<String>,
    #[serde(default)]
    pub dest_socket_addr: Option<String>,
    #[serde(default)]
    pub dest_domain: Option<String>,
    /// Chain of nets the connection was routed through.
    #[serde(default)]
    pub net_list: Vec<String>,
}

impl LogContext {
    /// True when none of the address fields is present.
    pub fn is_empty(&self) -> bool {
        self.src_socket_addr.is_none()
            && self.dest_socket_addr.is_none()
            && self.dest_domain.is_none()
    }
}

impl LogEntry {
    /// Create an entry with no structured fields.
    pub fn new(
        timestamp: impl Into<String>,
        level: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: timestamp.into(),
            level: level.into(),
            message: Some(message.into()),
            target: None,
            fields: Map::new(),
        }
    }

    /// Decode a raw text frame from the log stream.
    pub fn parse(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }

    /// Normalized level of this entry.
    pub fn level(&self) -> LogLevel {
        LogLevel::parse(&self.level)
    }

    /// The message to show: `fields.message` when the server recorded one,
    /// otherwise the top-level `message`.
    pub fn display_message(&self) -> Option<&str> {
        self.fields
            .get("message")
            .and_then(Value::as_str)
            .or(self.message.as_deref())
    }

    /// Parsed connection context from `fields.ctx`.
    ///
    /// The server encodes the context either as an object or as a JSON
    /// string; both are accepted. Returns `None` if the field is missing or
    /// does not decode.
    pub fn context(&self) -> Option<LogContext> {
        match self.fields.get("ctx")? {
            Value::String(raw) => serde_json::from_str(raw).ok(),
            value @ Value::Object(_) => serde_json::from_value(value.clone()).ok(),
            _ => None,
        }
    }

    /// Structured fields other than the message and the context.
    pub fn extra_fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields
            .iter()
            .filter(|(key, _)| key.as_str() != "message" && key.as_str() != "ctx")
    }

    /// Case-insensitive substring search over the displayed message, level
    /// and target.
    ///
    /// Entries carrying a `ctx` field are also matched against their
    /// serialized fields, so addresses and domains are searchable.
    pub fn matches(&self, query: &str) -> bool {
        if query.is_empty() {
            return true;
        }
        let needle = query.to_lowercase();
        let contains = |s: &str| s.to_lowercase().contains(&needle);

        if self.display_message().is_some_and(contains)
            || contains(&self.level)
            || self.target.as_deref().is_some_and(contains)
        {
            return true;
        }

        if self.fields.contains_key("ctx") {
            if let Ok(fields) = serde_json::to_string(&self.fields) {
                return contains(&fields);
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn proxied_entry() -> LogEntry {
        serde_json::from_value(json!({
            "timestamp": "2024-05-01T12:00:00.123Z",
            "level": "INFO",
            "target": "rabbit_digger::rabbit_digger",
            "fields": {
                "message": "connected",
                "ctx": "{\"src_socket_addr\":\"127.0.0.1:50000\",\"dest_domain\":\"example.com:443\",\"net_list\":[\"local\",\"proxy\"]}",
                "elapsed": 12
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_parse_minimal_entry() {
        let entry = LogEntry::parse(r#"{"timestamp":"t","level":"warn"}"#).unwrap();
        assert_eq!(entry.level(), LogLevel::Warn);
        assert!(entry.message.is_none());
        assert!(entry.target.is_none());
        assert!(entry.fields.is_empty());
    }

    #[test]
    fn test_level_parsing() {
        assert_eq!(LogLevel::parse("ERROR"), LogLevel::Error);
        assert_eq!(LogLevel::parse("Warning"), LogLevel::Warn);
        assert_eq!(LogLevel::parse("debug"), LogLevel::Debug);
        assert_eq!(LogLevel::parse("verbose"), LogLevel::Other);
    }

    #[test]
    fn test_display_message_prefers_fields() {
        let mut entry = LogEntry::new("t", "info", "top-level");
        assert_eq!(entry.display_message(), Some("top-level"));

        entry.fields.insert("message".into(), json!("from fields"));
        assert_eq!(entry.display_message(), Some("from fields"));
    }

    #[test]
    fn test_context_from_string() {
        let ctx = proxied_entry().context().unwrap();
        assert_eq!(ctx.src_socket_addr.as_deref(), Some("127.0.0.1:50000"));
        assert_eq!(ctx.dest_domain.as_deref(), Some("example.com:443"));
        assert_eq!(ctx.net_list, vec!["local", "proxy"]);
        assert!(ctx.dest_socket_addr.is_none());
        assert!(!ctx.is_empty());
    }

    #[test]
    fn test_context_from_object() {
        let mut entry = LogEntry::new("t", "info", "m");
        entry
            .fields
            .insert("ctx".into(), json!({"dest_socket_addr": "1.1.1.1:53"}));
        let ctx = entry.context().unwrap();
        assert_eq!(ctx.dest_socket_addr.as_deref(), Some("1.1.1.1:53"));
    }

    #[test]
    fn test_context_missing_or_garbage() {
        let mut entry = LogEntry::new("t", "info", "m");
        assert!(entry.context().is_none());

        entry.fields.insert("ctx".into(), json!("not json"));
        assert!(entry.context().is_none());
    }

    #[test]
    fn test_extra_fields_skip_message_and_ctx() {
        let entry = proxied_entry();
        let keys: Vec<&str> = entry.extra_fields().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["elapsed"]);
    }

    #[test]
    fn test_matches() {
        let entry = proxied_entry();
        assert!(entry.matches(""));
        assert!(entry.matches("info"));
        assert!(entry.matches("RABBIT_DIGGER"));
        assert!(entry.matches("example.com"));
        assert!(!entry.matches("nothing-like-this"));

        let plain = LogEntry::new("t", "debug", "Handshake done");
        assert!(plain.matches("handshake"));
        assert!(!plain.matches("example"));
    }
}
