//! Test doubles shared by this crate's tests and downstream integration tests.

use crate::game::Spinner;
use crate::player::Player;
use slotfactory_wss::{ClientHandle, Outlet};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Outbound capacity of mock connections; large enough that tests never kick.
pub const MOCK_OUTBOUND_CAPACITY: usize = 1_024;

pub fn detached_client() -> (ClientHandle, Outlet) {
    ClientHandle::detached(MOCK_OUTBOUND_CAPACITY)
}

/// Creates a player whose frames can be read back from the returned outlet.
pub fn connected_player(id: &str, name: &str) -> (Player, Outlet) {
    let (client, outlet) = detached_client();
    (Player::new(id, name, client), outlet)
}

/// Drains and parses every frame queued on `outlet`.
pub fn frames(outlet: &mut Outlet) -> Vec<serde_json::Value> {
    outlet
        .drain()
        .iter()
        .filter_map(|frame| serde_json::from_str(frame).ok())
        .collect()
}

/// Replays a fixed sequence of outcomes, cycling when exhausted.
pub struct FixedSpinner {
    faces: Vec<u32>,
    next: AtomicUsize,
}

impl FixedSpinner {
    pub fn new(faces: impl IntoIterator<Item = u32>) -> Self {
        let faces: Vec<u32> = faces.into_iter().collect();
        Self {
            faces: if faces.is_empty() { vec![1] } else { faces },
            next: AtomicUsize::new(0),
        }
    }
}

impl Spinner for FixedSpinner {
    fn spin(&self, faces: u32) -> u32 {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.faces.len();
        self.faces[index].clamp(1, faces.max(1))
    }
}
