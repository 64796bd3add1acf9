//! Resource table and lease state machine.
//!
//! # States (per slot)
//! - Free: no owner, no deadline
//! - Leased: owner set, deadline in the future; requests are denied
//! - Lapsed: owner set, deadline passed; the next request takes the slot
//!
//! # State Transitions
//! ```text
//! Free   → Leased: claim
//! Leased → Lapsed: deadline passes (no event, observed lazily)
//! Lapsed → Leased: claim (previous owner evicted unless it is the claimant)
//! *      → Free:   free_all
//! ```
//!
//! # Design Decisions
//! - One mutex per slot: slots are arbitrated independently
//! - Deadlines use tokio's clock so tests can pause and advance time
//! - Lock order is acquisition map → slot → session table; no slot lock
//!   is held while taking the map lock
//! - Replies about a slot are queued while that slot is locked

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use serde::Serialize;
use tokio::time::Instant;

/// Number of arbitrated resource slots.
pub const RESOURCE_COUNT: usize = 4;

#[derive(Debug, Default)]
struct Slot {
    owner: Option<String>,
    deadline: Option<Instant>,
}

impl Slot {
    fn is_leased(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now < deadline)
    }
}

/// Outcome of a claim on one slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// An unexpired lease protects the slot.
    Denied,
    /// The claimant now holds the slot. `evicted` names a different user
    /// whose lapsed lease was taken over.
    Granted { evicted: Option<String> },
}

/// Point-in-time view of one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotInfo {
    /// External, 1-based slot number.
    pub resource: u8,
    pub owner: Option<String>,
    pub leased: bool,
    pub remaining_ms: u64,
}

#[derive(Debug, Default)]
pub struct ResourceTable {
    slots: [Mutex<Slot>; RESOURCE_COUNT],
    acquired_at: Mutex<HashMap<String, SystemTime>>,
}

impl ResourceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to take slot `index` for `username` with a fresh `lease`.
    pub fn claim(&self, index: usize, username: &str, lease: Duration) -> ClaimOutcome {
        self.claim_with(index, username, lease, |_| {})
    }

    /// Like [`claim`](Self::claim), but runs `on_outcome` before the slot
    /// is released. Replies queued from `on_outcome` are therefore ordered
    /// with every other mutation of the same slot.
    ///
    /// `on_outcome` must not touch the resource table.
    pub fn claim_with<F>(
        &self,
        index: usize,
        username: &str,
        lease: Duration,
        on_outcome: F,
    ) -> ClaimOutcome
    where
        F: FnOnce(&ClaimOutcome),
    {
        let mut slot = self.slots[index].lock().expect("resource slot mutex poisoned");
        let now = Instant::now();
        let outcome = if slot.is_leased(now) {
            ClaimOutcome::Denied
        } else {
            let previous = slot.owner.replace(username.to_string());
            slot.deadline = Some(now + lease);
            ClaimOutcome::Granted {
                evicted: previous.filter(|owner| owner != username),
            }
        };
        on_outcome(&outcome);
        outcome
    }

    /// Remember when `username` started holding resources, unless already
    /// tracked.
    pub fn record_acquisition(&self, username: &str) {
        self.acquired_at
            .lock()
            .expect("acquisition map mutex poisoned")
            .entry(username.to_string())
            .or_insert_with(SystemTime::now);
    }

    /// Drop acquisition times for users that own no slot any more.
    pub fn sweep_acquisitions(&self) {
        let mut acquired = self.acquired_at.lock().expect("acquisition map mutex poisoned");
        let owners: HashSet<String> = self.owners().into_iter().flatten().collect();
        acquired.retain(|username, _| owners.contains(username));
    }

    /// Clear every slot. Returns `(index, previous owner)` for each slot
    /// that was occupied.
    pub fn free_all(&self) -> Vec<(usize, String)> {
        self.free_all_with(|_, _| {})
    }

    /// Like [`free_all`](Self::free_all), but calls `on_freed` for each
    /// previous owner while that slot is still locked.
    pub fn free_all_with<F>(&self, mut on_freed: F) -> Vec<(usize, String)>
    where
        F: FnMut(usize, &str),
    {
        let mut acquired = self.acquired_at.lock().expect("acquisition map mutex poisoned");
        let mut freed = Vec::new();
        for (index, slot) in self.slots.iter().enumerate() {
            let mut slot = slot.lock().expect("resource slot mutex poisoned");
            slot.deadline = None;
            if let Some(owner) = slot.owner.take() {
                on_freed(index, &owner);
                freed.push((index, owner));
            }
        }
        acquired.clear();
        freed
    }

    /// Current owner of each slot, stale owners included.
    pub fn owners(&self) -> [Option<String>; RESOURCE_COUNT] {
        std::array::from_fn(|index| {
            self.slots[index]
                .lock()
                .expect("resource slot mutex poisoned")
                .owner
                .clone()
        })
    }

    pub fn is_leased(&self, index: usize) -> bool {
        self.slots[index]
            .lock()
            .expect("resource slot mutex poisoned")
            .is_leased(Instant::now())
    }

    pub fn acquisition_times(&self) -> HashMap<String, SystemTime> {
        self.acquired_at
            .lock()
            .expect("acquisition map mutex poisoned")
            .clone()
    }

    pub fn snapshot(&self) -> Vec<SlotInfo> {
        let now = Instant::now();
        self.slots
            .iter()
            .enumerate()
            .map(|(index, slot)| {
                let slot = slot.lock().expect("resource slot mutex poisoned");
                let remaining = slot
                    .deadline
                    .map(|deadline| deadline.saturating_duration_since(now))
                    .unwrap_or_default();
                SlotInfo {
                    resource: index as u8 + 1,
                    owner: slot.owner.clone(),
                    leased: slot.is_leased(now),
                    remaining_ms: remaining.as_millis() as u64,
                }
            })
            .collect()
    }
}
