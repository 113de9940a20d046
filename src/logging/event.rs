use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Packages the collector accepts from this client
const KNOWN_PACKAGES: &[&str] = &["api"];
const FALLBACK_PACKAGE: &str = "api";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stack {
    Frontend,
    Backend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl FromStr for Stack {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "frontend" => Ok(Stack::Frontend),
            "backend" => Ok(Stack::Backend),
            _ => Err(()),
        }
    }
}

impl FromStr for Level {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "debug" => Ok(Level::Debug),
            "info" => Ok(Level::Info),
            "warn" => Ok(Level::Warn),
            "error" => Ok(Level::Error),
            "fatal" => Ok(Level::Fatal),
            _ => Err(()),
        }
    }
}

/// One event as accepted by the log collector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    /// RFC 3339 UTC, millisecond precision
    pub timestamp: String,
    pub stack: Stack,
    pub level: Level,
    pub package: String,
    pub message: String,
}

impl LogEvent {
    pub fn new(stack: Stack, level: Level, package: &str, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            stack,
            level,
            package: normalize_package(package),
            message: message.into(),
        }
    }

    /// Build an event from loosely typed input. Unknown values are coerced
    /// rather than rejected: stack to `frontend`, level to `info`, package
    /// to `api`.
    pub fn normalized(stack: &str, level: &str, package: &str, message: impl Into<String>) -> Self {
        Self::new(
            stack.parse().unwrap_or(Stack::Frontend),
            level.parse().unwrap_or(Level::Info),
            package,
            message,
        )
    }
}

fn normalize_package(package: &str) -> String {
    let package = package.trim().to_lowercase();
    if KNOWN_PACKAGES.contains(&package.as_str()) {
        package
    } else {
        FALLBACK_PACKAGE.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalization_coerces_unknown_values() {
        let event = LogEvent::normalized("MOBILE", "verbose", "Widgets", "hi");
        assert_eq!(event.stack, Stack::Frontend);
        assert_eq!(event.level, Level::Info);
        assert_eq!(event.package, "api");
        assert_eq!(event.message, "hi");
    }

    #[test]
    fn test_normalization_keeps_known_values() {
        let event = LogEvent::normalized("Backend", " ERROR ", "API", "boom");
        assert_eq!(event.stack, Stack::Backend);
        assert_eq!(event.level, Level::Error);
        assert_eq!(event.package, "api");
    }

    #[test]
    fn test_wire_format() {
        let event = LogEvent::new(Stack::Frontend, Level::Warn, "api", "m");
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["stack"], "frontend");
        assert_eq!(value["level"], "warn");
        let timestamp = value["timestamp"].as_str().unwrap();
        assert!(timestamp.ends_with('Z'), "not UTC: {timestamp}");
        assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
    }
}
