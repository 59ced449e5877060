//! Mount point - the single slot a render unit is displayed in

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

use super::RenderUnit;
use crate::render::ContentTree;

/// Claim on the next mount, handed out in request order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MountTicket(u64);

impl MountTicket {
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// What is currently displayed
#[derive(Debug, Clone, PartialEq)]
pub struct MountedView {
    pub unit_id: u64,
    pub template: String,
    pub html: String,
}

/// Holds at most one mounted [`RenderUnit`]
///
/// Replacing a unit disposes the old one and publishes the new view in one
/// critical section, so observers never see two units or an empty slot in
/// between. Only the unit of the most recent [`MountPoint::claim`] may mount.
pub struct MountPoint {
    claimed: AtomicU64,
    slot: Mutex<Option<RenderUnit>>,
    view: watch::Sender<Option<Arc<MountedView>>>,
}

impl MountPoint {
    pub fn new() -> Self {
        let (view, _) = watch::channel(None);
        Self {
            claimed: AtomicU64::new(0),
            slot: Mutex::new(None),
            view,
        }
    }

    /// Claim the next mount; earlier claims can no longer mount
    pub fn claim(&self) -> MountTicket {
        MountTicket(self.claimed.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Whether `ticket` is still the most recent claim
    pub fn is_current(&self, ticket: MountTicket) -> bool {
        self.claimed.load(Ordering::SeqCst) == ticket.0
    }

    /// Render `unit` and make it the mounted unit
    ///
    /// Returns false, disposing `unit`, when its id is not the most recent claim.
    pub fn mount(&self, unit: RenderUnit, tree: &ContentTree) -> bool {
        let html = unit.render(tree);

        let mut slot = self.lock();
        if !self.is_current(MountTicket(unit.id())) {
            tracing::debug!("Not mounting superseded render unit #{}", unit.id());
            unit.dispose();
            return false;
        }

        let view = MountedView {
            unit_id: unit.id(),
            template: unit.reference().to_string(),
            html,
        };
        if let Some(previous) = slot.take() {
            previous.dispose();
        }
        tracing::debug!("Mounting render unit #{}", unit.id());
        *slot = Some(unit);
        self.view.send_replace(Some(Arc::new(view)));
        true
    }

    /// The mounted view, if any
    pub fn current(&self) -> Option<Arc<MountedView>> {
        self.view.borrow().clone()
    }

    /// Id of the mounted unit
    pub fn unit_id(&self) -> Option<u64> {
        self.lock().as_ref().map(RenderUnit::id)
    }

    /// Watch mounted views as they change
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<MountedView>>> {
        self.view.subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, Option<RenderUnit>> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MountPoint {
    fn default() -> Self {
        Self::new()
    }
}
