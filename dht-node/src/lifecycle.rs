//! `NodeStatus`: INIT -> JOINING -> READY -> LEAVING -> STOPPED. Transition
//! to READY requires a non-nil successor[0]; a failed predecessor probe
//! never moves a node out of READY.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeStatus {
    Init,
    Joining,
    Ready,
    Leaving,
    Stopped,
}

impl NodeStatus {
    fn encode(self) -> u8 {
        match self {
            NodeStatus::Init => 0,
            NodeStatus::Joining => 1,
            NodeStatus::Ready => 2,
            NodeStatus::Leaving => 3,
            NodeStatus::Stopped => 4,
        }
    }

    fn decode(v: u8) -> Self {
        match v {
            0 => NodeStatus::Init,
            1 => NodeStatus::Joining,
            2 => NodeStatus::Ready,
            3 => NodeStatus::Leaving,
            _ => NodeStatus::Stopped,
        }
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NodeStatus::Init => "INIT",
            NodeStatus::Joining => "JOINING",
            NodeStatus::Ready => "READY",
            NodeStatus::Leaving => "LEAVING",
            NodeStatus::Stopped => "STOPPED",
        };
        write!(f, "{s}")
    }
}

/// Lock-free status cell shared between the bootstrap path, the worker
/// tasks, and the HTTP health handler.
pub struct LifecycleState {
    status: AtomicU8,
}

impl LifecycleState {
    pub fn new() -> Self {
        Self {
            status: AtomicU8::new(NodeStatus::Init.encode()),
        }
    }

    pub fn get(&self) -> NodeStatus {
        NodeStatus::decode(self.status.load(Ordering::Acquire))
    }

    pub fn set(&self, status: NodeStatus) {
        self.status.store(status.encode(), Ordering::Release);
    }

    pub fn is_ready(&self) -> bool {
        self.get() == NodeStatus::Ready
    }
}

impl Default for LifecycleState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_in_init_and_moves_through_states() {
        let lifecycle = LifecycleState::new();
        assert_eq!(lifecycle.get(), NodeStatus::Init);
        lifecycle.set(NodeStatus::Joining);
        assert!(!lifecycle.is_ready());
        lifecycle.set(NodeStatus::Ready);
        assert!(lifecycle.is_ready());
        lifecycle.set(NodeStatus::Leaving);
        assert!(!lifecycle.is_ready());
    }

    #[test]
    fn display_matches_health_endpoint_vocabulary() {
        assert_eq!(NodeStatus::Ready.to_string(), "READY");
        assert_eq!(NodeStatus::Stopped.to_string(), "STOPPED");
    }
}
