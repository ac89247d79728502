//! Complaint record and payload validation.
//!
//! DESIGN
//! ======
//! Rows reach us from two untrusted places: REST query results and
//! change-feed payloads. Both go through `Complaint::from_payload`, which
//! checks shape and types before anything is admitted into view state.
//! There is no `Deserialize` impl; `from_payload` is the only way in.

use std::fmt;

use serde::Serialize;
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

// =============================================================================
// FIELD CONSTANTS
// =============================================================================

/// Row key for the store-assigned identifier.
pub const FIELD_ID: &str = "id";

/// Row key for the complaint body.
pub const FIELD_TEXT: &str = "text";

/// Row key for the store-assigned creation timestamp.
pub const FIELD_CREATED_AT: &str = "created_at";

// =============================================================================
// ERROR
// =============================================================================

/// Reasons a row was refused admission.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("field `{field}` has the wrong type (expected {expected})")]
    WrongType { field: &'static str, expected: &'static str },

    #[error("complaint text is empty")]
    EmptyText,

    #[error("invalid created_at timestamp: {0}")]
    Timestamp(String),
}

// =============================================================================
// TYPES
// =============================================================================

/// Opaque store-assigned identifier. Integer ids are held in decimal form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ComplaintId(String);

impl ComplaintId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ComplaintId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A submitted complaint. Never updated or deleted once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Complaint {
    pub id: ComplaintId,
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Complaint {
    pub fn new(id: ComplaintId, text: impl Into<String>, created_at: OffsetDateTime) -> Self {
        Self { id, text: text.into(), created_at }
    }

    /// Validate an untrusted row and build a complaint from it.
    ///
    /// # Errors
    ///
    /// Returns a [`PayloadError`] naming the first field that is missing,
    /// mistyped, empty, or unparsable.
    pub fn from_payload(payload: &Value) -> Result<Self, PayloadError> {
        let row = payload.as_object().ok_or(PayloadError::NotAnObject)?;

        let id = match row.get(FIELD_ID) {
            Some(Value::String(s)) if !s.is_empty() => ComplaintId::new(s.clone()),
            Some(Value::Number(n)) if n.is_i64() || n.is_u64() => ComplaintId::new(n.to_string()),
            Some(_) => return Err(PayloadError::WrongType { field: FIELD_ID, expected: "string or integer" }),
            None => return Err(PayloadError::MissingField(FIELD_ID)),
        };

        let text = match row.get(FIELD_TEXT) {
            Some(Value::String(s)) => s.clone(),
            Some(_) => return Err(PayloadError::WrongType { field: FIELD_TEXT, expected: "string" }),
            None => return Err(PayloadError::MissingField(FIELD_TEXT)),
        };
        if text.trim().is_empty() {
            return Err(PayloadError::EmptyText);
        }

        let created_at = match row.get(FIELD_CREATED_AT) {
            Some(Value::String(s)) => parse_timestamp(s)?,
            Some(_) => return Err(PayloadError::WrongType { field: FIELD_CREATED_AT, expected: "string" }),
            None => return Err(PayloadError::MissingField(FIELD_CREATED_AT)),
        };

        Ok(Self { id, text, created_at })
    }

    /// Human-readable creation time, always in UTC.
    #[must_use]
    pub fn display_time(&self) -> String {
        let utc = self.created_at.to_offset(time::UtcOffset::UTC);
        utc.format(format_description!("[year]-[month]-[day] [hour]:[minute]:[second] UTC"))
            .unwrap_or_else(|_| utc.to_string())
    }
}

/// Parse a store timestamp. Offset-less values are taken as UTC.
///
/// # Errors
///
/// Returns [`PayloadError::Timestamp`] when neither form matches.
pub fn parse_timestamp(raw: &str) -> Result<OffsetDateTime, PayloadError> {
    if let Ok(ts) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Ok(ts);
    }
    let naive = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]]");
    PrimitiveDateTime::parse(raw, naive)
        .map(PrimitiveDateTime::assume_utc)
        .map_err(|_| PayloadError::Timestamp(raw.to_string()))
}

/// Sort newest first. Stable, so equal timestamps keep their input order.
pub fn sort_newest_first(complaints: &mut [Complaint]) {
    complaints.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

#[cfg(test)]
#[path = "complaint_test.rs"]
mod tests;
