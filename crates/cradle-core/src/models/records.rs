//! Domain records captured during a collection session.
//!
//! The outbox treats these as opaque snapshots; only the identifier and the
//! few indexed columns are known to the store.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::util::unix_millis_now;

/// A unique identifier for a domain record, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Create a new unique record ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Local mirror of a record's delivery state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordSyncStatus {
    Pending,
    Synced,
    Error,
}

impl RecordSyncStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Synced => "SYNCED",
            Self::Error => "ERROR",
        }
    }
}

impl FromStr for RecordSyncStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "SYNCED" => Ok(Self::Synced),
            "ERROR" => Ok(Self::Error),
            other => Err(Error::InvalidInput(format!(
                "unknown record sync status: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionType {
    FirstCollection,
    Recollection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    InProgress,
    Completed,
    Cancelled,
}

impl SessionState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

/// One biometric collection session for a baby
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSession {
    pub id: RecordId,
    pub operator_id: i64,
    pub mother_ref: String,
    pub baby_ref: String,
    pub scanner_ref: String,
    pub session_type: SessionType,
    pub origin_session_id: Option<RecordId>,
    pub matching_enabled: bool,
    pub started_at: i64,
    pub ended_at: Option<i64>,
    pub state: SessionState,
    pub created_at: i64,
}

impl CollectionSession {
    /// Start a new in-progress session
    #[must_use]
    pub fn start(
        operator_id: i64,
        mother_ref: impl Into<String>,
        baby_ref: impl Into<String>,
        scanner_ref: impl Into<String>,
        session_type: SessionType,
    ) -> Self {
        let now = unix_millis_now();
        Self {
            id: RecordId::new(),
            operator_id,
            mother_ref: mother_ref.into(),
            baby_ref: baby_ref.into(),
            scanner_ref: scanner_ref.into(),
            session_type,
            origin_session_id: None,
            matching_enabled: false,
            started_at: now,
            ended_at: None,
            state: SessionState::InProgress,
            created_at: now,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.baby_ref.trim().is_empty() {
            return Err(Error::InvalidInput("session baby_ref must not be empty".into()));
        }
        if self.session_type == SessionType::Recollection && self.origin_session_id.is_none() {
            return Err(Error::InvalidInput(
                "recollection sessions must reference an origin session".into(),
            ));
        }
        Ok(())
    }
}

/// The ten digits that can be captured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Finger {
    ThumbRight,
    ThumbLeft,
    IndexRight,
    IndexLeft,
    MiddleRight,
    MiddleLeft,
    RingRight,
    RingLeft,
    LittleRight,
    LittleLeft,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaptureOutcome {
    Success,
    Failure,
    Partial,
}

/// Result of capturing a single finger within a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FingerCapture {
    pub id: RecordId,
    pub session_id: RecordId,
    pub finger: Finger,
    /// 0-100
    pub quality: u8,
    pub frames_ok: u32,
    pub frames_total: u32,
    pub outcome: CaptureOutcome,
    pub image_path: Option<String>,
    pub created_at: i64,
}

impl FingerCapture {
    #[must_use]
    pub fn new(
        session_id: RecordId,
        finger: Finger,
        quality: u8,
        frames_ok: u32,
        frames_total: u32,
        outcome: CaptureOutcome,
    ) -> Self {
        Self {
            id: RecordId::new(),
            session_id,
            finger,
            quality,
            frames_ok,
            frames_total,
            outcome,
            image_path: None,
            created_at: unix_millis_now(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.quality > 100 {
            return Err(Error::InvalidInput(format!(
                "capture quality must be within 0..=100, got {}",
                self.quality
            )));
        }
        if self.frames_ok > self.frames_total {
            return Err(Error::InvalidInput(format!(
                "frames_ok ({}) exceeds frames_total ({})",
                self.frames_ok, self.frames_total
            )));
        }
        Ok(())
    }
}

/// Environmental/questionnaire form filled for a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionForm {
    pub id: RecordId,
    pub session_id: RecordId,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub mixture_type: Option<String>,
    pub questionnaire_version: String,
    pub notes: Option<String>,
    pub partial_justification: Option<String>,
    pub quick_collection: bool,
    pub created_at: i64,
}

impl CollectionForm {
    #[must_use]
    pub fn new(session_id: RecordId, questionnaire_version: impl Into<String>) -> Self {
        Self {
            id: RecordId::new(),
            session_id,
            temperature: None,
            humidity: None,
            mixture_type: None,
            questionnaire_version: questionnaire_version.into(),
            notes: None,
            partial_justification: None,
            quick_collection: false,
            created_at: unix_millis_now(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.questionnaire_version.trim().is_empty() {
            return Err(Error::InvalidInput(
                "questionnaire_version must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Audit trail entry for an operator action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: RecordId,
    pub user_id: i64,
    pub action: String,
    pub entity: String,
    pub entity_ref: Option<String>,
    pub old_data: Option<String>,
    pub new_data: Option<String>,
    pub device: Option<String>,
    pub created_at: i64,
}

impl AuditEntry {
    #[must_use]
    pub fn new(user_id: i64, action: impl Into<String>, entity: impl Into<String>) -> Self {
        Self {
            id: RecordId::new(),
            user_id,
            action: action.into(),
            entity: entity.into(),
            entity_ref: None,
            old_data: None,
            new_data: None,
            device: None,
            created_at: unix_millis_now(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.action.trim().is_empty() || self.entity.trim().is_empty() {
            return Err(Error::InvalidInput(
                "audit action and entity must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Login attempt on the device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginEvent {
    pub id: RecordId,
    pub user_id: Option<i64>,
    pub email: String,
    pub success: bool,
    pub failure_reason: Option<String>,
    pub device: Option<String>,
    pub created_at: i64,
}

impl LoginEvent {
    #[must_use]
    pub fn new(email: impl Into<String>, success: bool) -> Self {
        Self {
            id: RecordId::new(),
            user_id: None,
            email: email.into(),
            success,
            failure_reason: None,
            device: None,
            created_at: unix_millis_now(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.email.trim().is_empty() {
            return Err(Error::InvalidInput("login email must not be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_id_parse() {
        let id = RecordId::new();
        let parsed: RecordId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_session_start_is_in_progress() {
        let session =
            CollectionSession::start(7, "mother-1", "baby-1", "scanner-1", SessionType::FirstCollection);
        assert_eq!(session.state, SessionState::InProgress);
        assert_eq!(session.started_at, session.created_at);
        assert!(session.validate().is_ok());
    }

    #[test]
    fn test_recollection_requires_origin() {
        let mut session =
            CollectionSession::start(7, "mother-1", "baby-1", "scanner-1", SessionType::Recollection);
        assert!(session.validate().is_err());

        session.origin_session_id = Some(RecordId::new());
        assert!(session.validate().is_ok());
    }

    #[test]
    fn test_finger_capture_validation() {
        let session = RecordId::new();
        let ok = FingerCapture::new(session, Finger::ThumbRight, 88, 9, 10, CaptureOutcome::Success);
        assert!(ok.validate().is_ok());

        let bad_quality =
            FingerCapture::new(session, Finger::ThumbLeft, 101, 1, 1, CaptureOutcome::Success);
        assert!(bad_quality.validate().is_err());

        let bad_frames =
            FingerCapture::new(session, Finger::IndexLeft, 50, 11, 10, CaptureOutcome::Partial);
        assert!(bad_frames.validate().is_err());
    }

    #[test]
    fn test_login_event_requires_email() {
        assert!(LoginEvent::new("  ", false).validate().is_err());
        assert!(LoginEvent::new("op@example.com", true).validate().is_ok());
    }

    #[test]
    fn test_finger_serializes_as_screaming_tag() {
        let json = serde_json::to_string(&Finger::LittleLeft).unwrap();
        assert_eq!(json, "\"LITTLE_LEFT\"");
    }
}
