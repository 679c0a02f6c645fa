use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of music entity a recommendation can point at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Artist,
    Recording,
    ReleaseGroup,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Artist => write!(f, "artist"),
            EntityKind::Recording => write!(f, "recording"),
            EntityKind::ReleaseGroup => write!(f, "release group"),
        }
    }
}

/// Tri-state user judgment of a recommended item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feedback {
    Unset,
    Positive,
    Negative,
}

impl Feedback {
    /// Ranking tier: positive items serve first, negative last
    pub fn tier(self) -> u8 {
        match self {
            Feedback::Positive => 0,
            Feedback::Unset => 1,
            Feedback::Negative => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Feedback::Unset => "unset",
            Feedback::Positive => "positive",
            Feedback::Negative => "negative",
        }
    }
}

impl std::str::FromStr for Feedback {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unset" => Ok(Feedback::Unset),
            "positive" => Ok(Feedback::Positive),
            "negative" => Ok(Feedback::Negative),
            other => Err(format!("unknown feedback value: {other}")),
        }
    }
}

/// A stored recommendation edge linking a source item to a recommended item
/// for one user
///
/// Created only in batches by the synthesizer; `feedback`/`created_at` are
/// mutated only by the feedback lifecycle operations; otherwise immutable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecommendationRecord {
    pub id: Uuid,
    pub user_id: String,
    /// Anchor entity the recommendation was generated from
    pub source_item: String,
    /// Suggested entity; never equal to `source_item`
    pub recommended_item: String,
    pub display_name: String,
    pub reasoning: String,
    /// Clamped into [0, 1] before persisting
    pub confidence: f64,
    pub feedback: Feedback,
    /// Refreshed whenever feedback changes
    pub created_at: DateTime<Utc>,
}

impl RecommendationRecord {
    /// Builds a fresh record with unset feedback and a clamped confidence
    pub fn new(
        user_id: &str,
        source_item: &str,
        recommended_item: &str,
        display_name: &str,
        reasoning: &str,
        confidence: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            source_item: source_item.to_string(),
            recommended_item: recommended_item.to_string(),
            display_name: display_name.to_string(),
            reasoning: reasoning.to_string(),
            confidence: confidence.clamp(0.0, 1.0),
            feedback: Feedback::Unset,
            created_at: Utc::now(),
        }
    }

    /// Endpoint of this edge that is not `anchor`, if any
    ///
    /// Degenerate self-edges yield `None`.
    pub fn neighbor_of(&self, anchor: &str) -> Option<&str> {
        if self.source_item == anchor && self.recommended_item != anchor {
            Some(&self.recommended_item)
        } else if self.recommended_item == anchor && self.source_item != anchor {
            Some(&self.source_item)
        } else {
            None
        }
    }
}

/// Projection of judged records used as prompt context and exclusion set
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedbackHistoryEntry {
    pub recommended_item: String,
    pub feedback: Feedback,
    pub reasoning: String,
    pub source_item: String,
}

/// Externally supplied closeness signal for one candidate entity
///
/// Produced by the upstream similarity provider; never persisted here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityCandidate {
    pub id: String,
    pub display_name: String,
    /// Provider score on a 0-100 scale
    pub score: f64,
    #[serde(default)]
    pub shared_attributes: Vec<String>,
}

/// Genre or tag name with its popularity count
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagCount {
    pub name: String,
    #[serde(default)]
    pub count: u32,
}

/// Externally supplied metadata describing the anchor entity
///
/// The `id` here is authoritative: persisted records key on it rather than on
/// whatever identifier the caller passed alongside the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceItemMetadata {
    pub id: String,
    pub display_name: String,
    pub kind: EntityKind,
    #[serde(default)]
    pub disambiguation: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub genres: Vec<TagCount>,
    #[serde(default)]
    pub tags: Vec<TagCount>,
}

/// One served recommendation, ordered by the selector
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServedRecommendation {
    pub item: String,
    pub display_name: String,
    pub reasoning: String,
    pub confidence: f64,
}

/// Serving mode for the selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServingMode {
    /// Serve ranked neighbors, skipping negatively judged ones
    #[default]
    Feedbacked,
    /// Restrict to neighbors with no feedback at all
    Unfed,
}
