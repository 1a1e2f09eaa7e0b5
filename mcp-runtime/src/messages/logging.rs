//! Log, progress, and cancellation notification payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Severity levels for `notifications/message`, matching syslog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[allow(missing_docs)]
pub enum LogLevel {
    Debug,
    Info,
    Notice,
    Warning,
    Error,
    Critical,
    Alert,
    Emergency,
}

/// Parameters of `notifications/message`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingMessageParams {
    /// Severity of the message
    pub level: LogLevel,

    /// Name of the emitting logger
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logger: Option<String>,

    /// The log payload, carried opaquely
    pub data: Value,
}

/// Parameters of `notifications/progress`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressParams {
    /// Token identifying the operation being reported on
    #[serde(rename = "progressToken")]
    pub progress_token: Value,

    /// Progress made so far
    pub progress: f64,

    /// Total work expected, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
}

/// Parameters of `notifications/cancelled`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelledParams {
    /// Id of the request being cancelled
    #[serde(rename = "requestId")]
    pub request_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_log_level_serialization() {
        assert_eq!(serde_json::to_string(&LogLevel::Warning).unwrap(), "\"warning\"");
        let level: LogLevel = serde_json::from_str("\"error\"").unwrap();
        assert_eq!(level, LogLevel::Error);
    }

    #[test]
    fn test_log_level_ordering() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Error < LogLevel::Emergency);
    }

    #[test]
    fn test_logging_message_omits_absent_logger() {
        let params = LoggingMessageParams {
            level: LogLevel::Info,
            logger: None,
            data: json!("started"),
        };
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json, json!({"level": "info", "data": "started"}));
    }

    #[test]
    fn test_cancelled_params_wire_shape() {
        let params = CancelledParams {
            request_id: "17".to_string(),
        };
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json, json!({"requestId": "17"}));
    }
}
