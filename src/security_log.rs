//! Append-only JSON-lines log of security relevant events.

use std::{path::PathBuf, sync::Arc, sync::LazyLock};

use chrono::Utc;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tokio::{fs::OpenOptions, io::AsyncWriteExt, sync::Mutex};

/// Logged input is cut to this many characters.
pub const MAX_LOGGED_INPUT: usize = 500;

const REDACTED_FIELDS: [&str; 6] = [
    "password",
    "new_password",
    "current_password",
    "otp",
    "token",
    "recaptcha_token",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityEvent {
    RateLimitExceeded,
    SuspiciousInputDetected,
    AuthenticationFailure,
}

impl SecurityEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::SuspiciousInputDetected => "SUSPICIOUS_INPUT_DETECTED",
            Self::AuthenticationFailure => "AUTHENTICATION_FAILURE",
        }
    }
}

/// Request facts recorded alongside every event.
#[derive(Debug, Clone, Default)]
pub struct RequestInfo {
    pub ip: String,
    pub user_agent: Option<String>,
    pub url: String,
    pub method: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Entry<'a> {
    timestamp: String,
    event: &'a str,
    ip: &'a str,
    user_agent: Option<&'a str>,
    url: &'a str,
    method: &'a str,
    details: Value,
}

#[derive(Clone, Debug)]
pub struct SecurityLogger {
    path: Arc<PathBuf>,
    write_lock: Arc<Mutex<()>>,
}

impl SecurityLogger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Arc::new(path.into()),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Create the parent directory of the log file.
    pub async fn prepare(&self) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    pub async fn record(&self, event: SecurityEvent, request: &RequestInfo, details: Value) {
        tracing::warn!(
            event = event.as_str(),
            ip = %request.ip,
            url = %request.url,
            "security event"
        );

        let entry = Entry {
            timestamp: Utc::now().to_rfc3339(),
            event: event.as_str(),
            ip: &request.ip,
            user_agent: request.user_agent.as_deref(),
            url: &request.url,
            method: &request.method,
            details,
        };
        let mut line = match serde_json::to_string(&entry) {
            Ok(line) => line,
            Err(err) => {
                tracing::error!(error = %err, "failed to serialize security event");
                return;
            }
        };
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let result = async {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.path.as_ref())
                .await?;
            file.write_all(line.as_bytes()).await?;
            file.flush().await
        }
        .await;
        if let Err(err) = result {
            tracing::error!(error = %err, path = %self.path.display(), "error writing to security log");
        }
    }
}

static SUSPICIOUS_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)sql|select|union|insert|update|delete|drop|create|alter",
        r"(?i)<script|javascript:|vbscript:|onload|onerror",
        r"\.\./|\.\.\\",
        r"[|&;$`]",
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

/// The first suspicious pattern found in `input`, if any.
pub fn detect_suspicious(input: &str) -> Option<&'static str> {
    SUSPICIOUS_PATTERNS
        .iter()
        .find(|re| re.is_match(input))
        .map(|re| re.as_str())
}

/// Replace credential-bearing fields of a JSON document before it is logged.
pub fn redact(mut value: Value) -> Value {
    match &mut value {
        Value::Object(map) => {
            for (key, field) in map.iter_mut() {
                if REDACTED_FIELDS.contains(&key.to_ascii_lowercase().as_str()) {
                    *field = Value::String("[REDACTED]".into());
                } else {
                    *field = redact(field.take());
                }
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                *item = redact(item.take());
            }
        }
        _ => {}
    }
    value
}

pub fn truncate(input: &str, max_chars: usize) -> String {
    input.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_sql_and_script_injection() {
        assert!(detect_suspicious("1 UNION SELECT password FROM users").is_some());
        assert!(detect_suspicious("<script>alert(1)</script>").is_some());
        assert!(detect_suspicious("../../etc/passwd").is_some());
        assert!(detect_suspicious("rm -rf / ; echo").is_some());
    }

    #[test]
    fn plain_input_is_not_flagged() {
        assert_eq!(detect_suspicious(r#"{"name":"Gold ring","price":1500}"#), None);
    }

    #[test]
    fn redact_hides_nested_credentials() {
        let value = serde_json::json!({
            "email": "a@b.c",
            "password": "Secret#1",
            "profile": { "otp": "123456", "city": "Pokhara" }
        });
        let redacted = redact(value);
        assert_eq!(redacted["email"], "a@b.c");
        assert_eq!(redacted["password"], "[REDACTED]");
        assert_eq!(redacted["profile"]["otp"], "[REDACTED]");
        assert_eq!(redacted["profile"]["city"], "Pokhara");
    }
}
