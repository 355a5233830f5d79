use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::EntityId;

/// Kind of entity a history record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordType {
    Image,
    Video,
    Text,
}

impl RecordType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            RecordType::Image => "IMAGE",
            RecordType::Video => "VIDEO",
            RecordType::Text => "TEXT",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "IMAGE" => Ok(RecordType::Image),
            "VIDEO" => Ok(RecordType::Video),
            "TEXT" => Ok(RecordType::Text),
            _ => Err(ParseLabelError::new("record type", s)),
        }
    }
}

/// Coarse risk bucket reported by analyzers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub const HIGH_THRESHOLD: f64 = 0.75;
    pub const MEDIUM_THRESHOLD: f64 = 0.4;

    /// Bucket a probability in `[0, 1]`.
    #[must_use]
    pub fn from_probability(probability: f64) -> Self {
        if probability >= Self::HIGH_THRESHOLD {
            RiskLevel::High
        } else if probability >= Self::MEDIUM_THRESHOLD {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    /// Trust penalty (as a probability) applied for a text assessment at this level.
    #[must_use]
    pub const fn text_penalty(self) -> f64 {
        match self {
            RiskLevel::Low => 0.0,
            RiskLevel::Medium => 0.1,
            RiskLevel::High => 0.3,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOW" => Ok(RiskLevel::Low),
            "MEDIUM" => Ok(RiskLevel::Medium),
            "HIGH" => Ok(RiskLevel::High),
            _ => Err(ParseLabelError::new("risk level", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: {value:?}")]
pub struct ParseLabelError {
    kind: &'static str,
    value: String,
}

impl ParseLabelError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// One monitored event. Immutable once appended to history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub entity_id: EntityId,

    #[serde(rename = "type")]
    pub record_type: RecordType,

    pub source_url: String,

    /// Article title (text records only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    pub risk_level: RiskLevel,

    /// Analyzer probability, rounded to 4 decimal places.
    pub probability: f64,

    pub trust_score_after: f64,

    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_parse_case_insensitively() {
        assert_eq!("image".parse::<RecordType>(), Ok(RecordType::Image));
        assert_eq!(" Text ".parse::<RecordType>(), Ok(RecordType::Text));
        assert_eq!("medium".parse::<RiskLevel>(), Ok(RiskLevel::Medium));
        assert!("severe".parse::<RiskLevel>().is_err());
    }

    #[test]
    fn risk_thresholds() {
        assert_eq!(RiskLevel::from_probability(0.0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_probability(0.39), RiskLevel::Low);
        assert_eq!(RiskLevel::from_probability(0.4), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_probability(0.75), RiskLevel::High);
    }

    #[test]
    fn record_serializes_type_key_and_skips_missing_title() {
        let record = HistoryRecord {
            entity_id: EntityId::for_image("https://example.com/a.png"),
            record_type: RecordType::Image,
            source_url: "https://example.com/a.png".to_string(),
            title: None,
            risk_level: RiskLevel::High,
            probability: 0.9,
            trust_score_after: 10.0,
            timestamp_ms: 1,
        };
        let json = serde_json::to_value(&record).expect("serialize");
        assert_eq!(json["type"], "IMAGE");
        assert_eq!(json["risk_level"], "HIGH");
        assert!(json.get("title").is_none());
    }
}
