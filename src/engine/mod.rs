mod availability;
mod conflict;
mod error;
mod lifecycle;
mod queries;

pub use availability::block_slots;
pub use conflict::Availability;
pub use error::EngineError;
pub use lifecycle::{Actor, CreateBooking};

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::model::*;
use crate::notify::NotifyHub;
use crate::store::EntityStore;

/// The booking engine: Availability Resolver, Conflict Checker and Booking
/// Lifecycle Manager over one injected [`EntityStore`].
///
/// Booking-affecting operations serialize on a per-tutor mutex: concurrent
/// operations on different tutors proceed independently, operations on the
/// same tutor run one at a time. The conflict check inside `create_booking`
/// runs under that lock, which closes the check-then-book race between two
/// students going for the same slot.
pub struct Engine {
    pub(super) store: Arc<EntityStore>,
    pub notify: Arc<NotifyHub>,
    tutor_locks: DashMap<UserId, Arc<Mutex<()>>>,
}

impl Engine {
    pub fn new(store: Arc<EntityStore>, notify: Arc<NotifyHub>) -> Self {
        Self {
            store,
            notify,
            tutor_locks: DashMap::new(),
        }
    }

    /// Mutual-exclusion scope for one tutor's bookings. Entries are created
    /// lazily and live for the process; the map is bounded by tutor count.
    pub(super) fn tutor_lock(&self, tutor_id: UserId) -> Arc<Mutex<()>> {
        self.tutor_locks
            .entry(tutor_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    /// Resolve the tutor's profile or fail NotFound. Reads (slot listing,
    /// availability checks) and writes both start here.
    pub(super) async fn require_tutor(&self, tutor_id: UserId) -> Result<TutorProfile, EngineError> {
        self.store
            .get_tutor_profile(tutor_id)
            .await
            .ok_or_else(|| EngineError::NotFound(format!("tutor {tutor_id}")))
    }

    /// All bookings currently occupying the tutor's calendar
    /// (status PENDING or CONFIRMED).
    pub(super) async fn active_bookings(&self, tutor_id: UserId) -> Vec<Booking> {
        let mut bookings = self.store.bookings_for_tutor(tutor_id).await;
        bookings.retain(|b| b.status.blocks_slot());
        bookings
    }
}
