use serde::{Deserialize, Serialize};

/// Water count at which a flower becomes ready to send.
pub const READY_WATER_COUNT: i64 = 7;

/// Flower lifecycle. Transitions are one-directional:
/// growing -> ready -> sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowerStatus {
    Growing,
    Ready,
    Sent,
}

impl FlowerStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Growing => "growing",
            Self::Ready => "ready",
            Self::Sent => "sent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "growing" => Some(Self::Growing),
            "ready" => Some(Self::Ready),
            "sent" => Some(Self::Sent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DropType {
    Text,
    Voice,
    Photo,
    Video,
    Mood,
}

impl DropType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Voice => "voice",
            Self::Photo => "photo",
            Self::Video => "video",
            Self::Mood => "mood",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Self::Text),
            "voice" => Some(Self::Voice),
            "photo" => Some(Self::Photo),
            "video" => Some(Self::Video),
            "mood" => Some(Self::Mood),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    Instant,
    Scheduled,
}

impl DeliveryMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Instant => "instant",
            Self::Scheduled => "scheduled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "instant" => Some(Self::Instant),
            "scheduled" => Some(Self::Scheduled),
            _ => None,
        }
    }
}

/// Stage is derived from the cumulative water count, never set directly.
pub fn stage_for_water_count(water_count: i64) -> i64 {
    if water_count >= READY_WATER_COUNT {
        2
    } else if water_count >= 3 {
        1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_thresholds() {
        assert_eq!(stage_for_water_count(0), 0);
        assert_eq!(stage_for_water_count(2), 0);
        assert_eq!(stage_for_water_count(3), 1);
        assert_eq!(stage_for_water_count(6), 1);
        assert_eq!(stage_for_water_count(7), 2);
        assert_eq!(stage_for_water_count(30), 2);
    }

    #[test]
    fn status_rejects_unknown_strings() {
        assert_eq!(FlowerStatus::parse("growing"), Some(FlowerStatus::Growing));
        assert_eq!(FlowerStatus::parse("wilted"), None);
        assert_eq!(DropType::parse("voice"), Some(DropType::Voice));
        assert_eq!(DropType::parse("hologram"), None);
        assert_eq!(DeliveryMode::parse("scheduled"), Some(DeliveryMode::Scheduled));
        assert_eq!(DeliveryMode::parse("carrier-pigeon"), None);
    }
}
