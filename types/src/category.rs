use std::fmt;

use serde::{Deserialize, Serialize};

/// Content category a URL is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentCategory {
    Image,
    Video,
    Text,
    Unknown,
}

impl ContentCategory {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ContentCategory::Image => "IMAGE",
            ContentCategory::Video => "VIDEO",
            ContentCategory::Text => "TEXT",
            ContentCategory::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ContentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
