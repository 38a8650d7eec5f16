//! Observable engine events.
//!
//! Every tick returns the events it produced so a front end can refresh
//! whatever it displays without polling engine state.

use serde::Serialize;
use wheelhouse_core::{LockState, TagId, WheelId};

use crate::connection::{PortState, PortTransition};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A port moved through its connection lifecycle.
    PortStateChanged {
        port: String,
        from: PortState,
        to: PortState,
    },

    /// The device on a port reported its wheel identity.
    WheelIdentified { port: String, wheel_id: WheelId },

    /// A tag was read on a port. Unreadable reads carry the sentinel tag.
    TagRead { port: String, tag: TagId },

    /// Tag frames on a port failed their checksum.
    ChecksumMismatch { port: String, count: usize },

    /// A lock command was written to a port.
    LockCommandSent {
        port: String,
        tag: TagId,
        state: LockState,
    },

    /// A scheduled lock applied.
    ScheduleFired { tag: TagId, lock_distance: f64 },

    /// The activity log rejected a record.
    LogFailed { port: String, tag: TagId },
}

impl From<PortTransition> for EngineEvent {
    fn from(t: PortTransition) -> Self {
        EngineEvent::PortStateChanged {
            port: t.port,
            from: t.from,
            to: t.to,
        }
    }
}
