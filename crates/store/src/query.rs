use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use killwatch_core::{KillId, Killmail, SystemId};

/// Filters for [`crate::EventStore::query_kills`]. Empty filter matches everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KillFilter {
    #[serde(default)]
    pub systems: BTreeSet<SystemId>,
    /// Inclusive lower bound on kill time.
    pub since: Option<DateTime<Utc>>,
    /// Exclusive upper bound on kill time.
    pub until: Option<DateTime<Utc>>,
    pub min_value: Option<f64>,
}

impl KillFilter {
    pub fn in_systems(systems: impl IntoIterator<Item = SystemId>) -> Self {
        Self {
            systems: systems.into_iter().collect(),
            ..Self::default()
        }
    }
}

/// Keyset cursor: the `(kill_time, kill_id)` of the last row on the previous page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillCursor {
    pub kill_time: DateTime<Utc>,
    pub kill_id: KillId,
}

impl KillCursor {
    pub fn after(kill: &Killmail) -> Self {
        Self {
            kill_time: kill.kill_time,
            kill_id: kill.kill_id,
        }
    }
}

/// One page of results. `next` is `None` once the final (short) page is reached.
#[derive(Debug, Clone)]
pub struct KillPage {
    pub kills: Vec<Killmail>,
    pub next: Option<KillCursor>,
}
