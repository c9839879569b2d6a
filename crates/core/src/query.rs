//! Query resolver result types

use serde::{Deserialize, Serialize};

/// Intent classification returned by the query resolver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryIntent {
    WeatherQuery,
    TimeQuery,
    AccountQuery,
    HelpRequest,
    #[default]
    Unknown,
}

impl QueryIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WeatherQuery => "WEATHER_QUERY",
            Self::TimeQuery => "TIME_QUERY",
            Self::AccountQuery => "ACCOUNT_QUERY",
            Self::HelpRequest => "HELP_REQUEST",
            Self::Unknown => "UNKNOWN",
        }
    }
}

/// Classification metadata attached to a resolved answer
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct QueryMetadata {
    pub intent: QueryIntent,
    /// Classifier confidence in [0, 1]
    pub confidence: f64,
}

/// Answer produced by the query resolver for one utterance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedAnswer {
    pub text: String,
    pub metadata: QueryMetadata,
}
