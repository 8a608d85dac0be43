use crate::ids::StableId;
use serde::Serialize;

/// Where an observation came from. Both reference columns may be populated while the legacy
/// column is retained; readers prefer the stable identifier and fall back to the sequence
/// number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRef {
    Stable(StableId),
    Legacy(i64),
}

impl MessageRef {
    pub fn from_columns(stable: Option<String>, legacy: Option<i64>) -> Option<Self> {
        match (stable, legacy) {
            (Some(stable), _) => Some(MessageRef::Stable(StableId::from_stored(stable))),
            (None, Some(legacy)) => Some(MessageRef::Legacy(legacy)),
            (None, None) => None,
        }
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, MessageRef::Legacy(_))
    }
}
