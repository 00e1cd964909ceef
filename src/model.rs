use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type EntityId = String;

/// Placeholder stage id sent to the backend when no numeric id could be
/// resolved client-side; the backend resolves or creates the stage by name.
pub const SENTINEL_STAGE_ID: i64 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Deal,
    Lead,
}

impl EntityKind {
    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::Deal => "deal",
            EntityKind::Lead => "lead",
        }
    }
}

/// One of the fixed, compiled-in pipeline stages. The `key` is stable and
/// drives all internal logic; label and color are display concerns.
#[derive(Debug, Clone, Copy)]
pub struct StageDefinition {
    pub key: &'static str,
    pub label: &'static str,
    pub color: &'static str,
    pub order: usize,
}

pub static CANONICAL_STAGES: [StageDefinition; 5] = [
    StageDefinition {
        key: "lead",
        label: "Lead",
        color: "cyan",
        order: 0,
    },
    StageDefinition {
        key: "qualified",
        label: "Qualified",
        color: "blue",
        order: 1,
    },
    StageDefinition {
        key: "proposal",
        label: "Proposal",
        color: "yellow",
        order: 2,
    },
    StageDefinition {
        key: "negotiation",
        label: "Negotiation",
        color: "magenta",
        order: 3,
    },
    StageDefinition {
        key: "closed-won",
        label: "Closed Won",
        color: "green",
        order: 4,
    },
];

/// A pipeline stage as configured server-side. Opaque to the client except
/// for fuzzy name matching against the canonical taxonomy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackendStageRecord {
    pub id: i64,
    pub name: String,
}

/// A canonical stage enriched with whatever the backend reports for it.
/// `id` is present only once a backend record has been matched to this key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardStage {
    pub key: &'static str,
    pub label: String,
    pub color: &'static str,
    pub id: Option<i64>,
}

/// A deal's stage as stored: either a canonical key ("negotiation") or a
/// backend stage id, depending on which surface wrote it last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StageRef {
    Id(i64),
    Key(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deal {
    pub id: EntityId,
    pub title: String,
    pub stage: StageRef,
    pub value: f64,
    pub probability: u8,
    pub customer_name: String,
    pub assigned_to: Option<String>,
    pub expected_close: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: EntityId,
    pub name: String,
    pub stage_id: Option<i64>,
    pub stage_name: Option<String>,
    pub estimated_value: f64,
    pub assigned_to: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One requested relocation of a deal or lead, built from a drop gesture or
/// an explicit command, consumed once by the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveIntent {
    pub kind: EntityKind,
    pub entity_id: EntityId,
    pub target_key: String,
    pub target_id: Option<i64>,
}

impl MoveIntent {
    pub fn new(kind: EntityKind, entity_id: impl Into<EntityId>, stage: &BoardStage) -> Self {
        MoveIntent {
            kind,
            entity_id: entity_id.into(),
            target_key: stage.key.to_string(),
            target_id: stage.id,
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum DropError {
    #[error("drop target {0} does not resolve to a stage")]
    UnresolvedTarget(String),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("endpoint not available")]
    EndpointMissing,
    #[error("no active pipeline is configured")]
    NoPipeline,
    #[error("{0}")]
    Rejected(String),
}

impl TransportError {
    /// Errors the executor may recover from by switching to the fallback
    /// transport; everything else is surfaced as-is.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            TransportError::EndpointMissing | TransportError::NoPipeline
        )
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum MoveError {
    #[error("no backend stage id could be resolved for {0}")]
    UnresolvedStage(String),
    #[error("unknown stage {0}")]
    UnknownStage(String),
    #[error("a move for this {} is already in flight", .0.label())]
    MoveInFlight(EntityKind),
    #[error("move rejected: {0}")]
    Transport(TransportError),
}

pub fn canonical_index(key: &str) -> Option<usize> {
    CANONICAL_STAGES.iter().position(|s| s.key == key)
}

pub fn canonical_stage(key: &str) -> Option<&'static StageDefinition> {
    CANONICAL_STAGES.iter().find(|s| s.key == key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_table_is_ordered() {
        for (idx, stage) in CANONICAL_STAGES.iter().enumerate() {
            assert_eq!(stage.order, idx);
        }
        assert_eq!(canonical_index("lead"), Some(0));
        assert_eq!(canonical_index("closed-won"), Some(4));
        assert_eq!(canonical_index("archived"), None);
    }

    #[test]
    fn stage_ref_accepts_key_or_id() {
        let from_key: StageRef = serde_yaml::from_str("negotiation").unwrap();
        assert_eq!(from_key, StageRef::Key("negotiation".into()));
        let from_id: StageRef = serde_yaml::from_str("7").unwrap();
        assert_eq!(from_id, StageRef::Id(7));
    }

    #[test]
    fn recoverable_transport_errors() {
        assert!(TransportError::EndpointMissing.is_recoverable());
        assert!(TransportError::NoPipeline.is_recoverable());
        assert!(!TransportError::Rejected("denied".into()).is_recoverable());
    }
}
