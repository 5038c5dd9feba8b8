//! Core data models used throughout Envision.
//!
//! These types represent the profile that drives a generation, the
//! passages and usage records stored in SQLite, and the points stored in
//! the vector index.

use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

/// Rendered in place of optional profile fields that were not supplied.
pub const PLACEHOLDER: &str = "Unknown";

/// A user's biographical and astrological profile.
///
/// Transient: built per request and folded into the prompt. Required fields
/// default to empty on deserialization so that [`UserProfile::validate`]
/// can report every missing field at once.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct UserProfile {
    #[serde(default)]
    pub preferred_name: String,
    pub birth_date: Option<String>,
    pub birth_time: Option<String>,
    pub birth_place: Option<String>,
    #[serde(default)]
    pub nakshatra: String,
    #[serde(default)]
    pub lagna: String,
    pub star_sign: Option<String>,
    #[serde(default)]
    pub strengths: String,
    #[serde(default, alias = "challenges")]
    pub areas_of_improvement: String,
    pub greatest_achievement: Option<String>,
    pub recent_achievement: Option<String>,
    pub next_year_goals: Option<String>,
    #[serde(default)]
    pub life_goals: String,
    pub legacy: Option<String>,
    #[serde(default, alias = "desired_mindset")]
    pub manifestation_focus: String,
}

impl UserProfile {
    /// Check that every required field is present and non-blank.
    pub fn validate(&self) -> Result<(), ServiceError> {
        let required = [
            ("preferred_name", &self.preferred_name),
            ("nakshatra", &self.nakshatra),
            ("lagna", &self.lagna),
            ("strengths", &self.strengths),
            ("areas_of_improvement", &self.areas_of_improvement),
            ("life_goals", &self.life_goals),
            ("manifestation_focus", &self.manifestation_focus),
        ];

        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, v)| v.trim().is_empty())
            .map(|(k, _)| *k)
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ServiceError::BadRequest(format!(
                "missing required profile fields: {}",
                missing.join(", ")
            )))
        }
    }

    /// Labelled profile fields in prompt order, with absent optionals
    /// rendered as [`PLACEHOLDER`].
    pub fn labelled_fields(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("Preferred Name", self.preferred_name.as_str()),
            ("Date of Birth", or_placeholder(&self.birth_date)),
            ("Birth Time", or_placeholder(&self.birth_time)),
            ("Birth Place", or_placeholder(&self.birth_place)),
            ("Nakshatra", self.nakshatra.as_str()),
            ("Lagna (Ascendant)", self.lagna.as_str()),
            ("Star Sign", or_placeholder(&self.star_sign)),
            ("Strengths", self.strengths.as_str()),
            ("Areas of Improvement", self.areas_of_improvement.as_str()),
            (
                "Greatest Achievement in Life",
                or_placeholder(&self.greatest_achievement),
            ),
            (
                "Major Achievement in the Last One Year",
                or_placeholder(&self.recent_achievement),
            ),
            (
                "Goals for the Next One Year",
                or_placeholder(&self.next_year_goals),
            ),
            ("Long-Term Life Goals", self.life_goals.as_str()),
            ("Desired Legacy", or_placeholder(&self.legacy)),
            (
                "Primary Manifestation Focus",
                self.manifestation_focus.as_str(),
            ),
        ]
    }
}

fn or_placeholder(value: &Option<String>) -> &str {
    match value.as_deref() {
        Some(v) if !v.trim().is_empty() => v,
        _ => PLACEHOLDER,
    }
}

/// A generated passage stored in SQLite. Immutable once written.
#[derive(Debug, Clone)]
pub struct GeneratedPassage {
    pub id: i64,
    pub user_id: String,
    pub text: String,
    pub created_at: i64,
}

/// One billable operation in the usage ledger.
#[derive(Debug, Clone)]
pub struct UsageRecord {
    pub id: i64,
    pub user_id: String,
    pub endpoint: String,
    pub tokens_used: i64,
    pub cost: f64,
    pub duration_ms: f64,
    pub created_at: i64,
}

/// Ownership metadata attached to a passage when it is indexed.
#[derive(Debug, Clone)]
pub struct PassageMetadata {
    pub user_id: String,
    pub passage_id: i64,
}

/// Payload stored alongside each vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorPayload {
    pub user_id: String,
    pub passage_id: i64,
    pub text: String,
    /// RFC 3339 timestamp of when the point was written.
    pub timestamp: String,
}

/// A point in the vector index.
#[derive(Debug, Clone)]
pub struct VectorPoint {
    pub point_id: String,
    pub vector: Vec<f32>,
    pub payload: VectorPayload,
}

/// A search hit: payload plus cosine similarity to the query.
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    pub point_id: String,
    pub payload: VectorPayload,
    pub score: f32,
}
