//! Target selectors for outbound control traffic
//!
//! A selector addresses every client, one group, or an explicit id set.
//! Matching is a pure predicate over a [`ConnectionRecord`] so the router and
//! tests agree on exactly the same semantics.

use serde::{Deserialize, Serialize};

use crate::connection::{ClientId, ConnectionRecord};

/// Addressing mode for `control`, `media` and `plugin` envelopes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum TargetSelector {
    /// Every connected client
    All,
    /// Clients whose registry group equals `group_id`
    Group {
        #[serde(rename = "groupId")]
        group_id: String,
    },
    /// Clients whose id is in `ids`
    ClientIds { ids: Vec<ClientId> },
}

impl TargetSelector {
    pub fn group(group_id: impl Into<String>) -> Self {
        Self::Group {
            group_id: group_id.into(),
        }
    }

    pub fn client_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ClientId>,
    {
        Self::ClientIds {
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    /// Single-client selector
    pub fn client(id: impl Into<ClientId>) -> Self {
        Self::ClientIds {
            ids: vec![id.into()],
        }
    }
}

/// Whether `record` is addressed by `selector`
///
/// Role filtering (only clients receive targeted traffic) is the router's
/// job; this predicate only looks at group and id membership.
pub fn matches_target(selector: &TargetSelector, record: &ConnectionRecord) -> bool {
    match selector {
        TargetSelector::All => true,
        TargetSelector::Group { group_id } => record.group.as_deref() == Some(group_id.as_str()),
        TargetSelector::ClientIds { ids } => ids.iter().any(|id| *id == record.client_id),
    }
}
