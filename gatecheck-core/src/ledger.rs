//! Authoritative client-side model of the service state
//!
//! All mutation goes through methods that preserve the reservation and
//! seat-count invariants. Every critical section is short and copies data out
//! before releasing its lock; no lock is ever held across an await point.

use crate::dataset::{Dataset, StaticFile};
use crate::model::{
    Actor, ActorKind, Event, EventState, PendingReservation, Reservation, SheetKind,
};
use crate::random::RandomSource;
use chrono::{DateTime, Utc};
use gatecheck_http::{fatal, CheckResult};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// In-process ledger of events, reservations and pending-operation logs
pub struct Ledger {
    allowable_delay: Duration,
    sheet_kinds: Vec<SheetKind>,
    static_files: Vec<StaticFile>,
    expected_index_digest: u32,

    events: RwLock<Vec<Arc<Event>>>,
    reservations: Mutex<HashMap<u64, Arc<Reservation>>>,
    reserve_log: Mutex<HashMap<u64, PendingReservation>>,
    cancel_log: Mutex<HashMap<u64, PendingReservation>>,
    next_log_id: AtomicU64,
}

impl Ledger {
    /// Seed the ledger from the initial dataset
    pub fn new(dataset: &Dataset, allowable_delay: Duration) -> Self {
        let events = dataset
            .events
            .iter()
            .map(|e| {
                Arc::new(Event::new(EventState {
                    id: e.id,
                    title: e.title.clone(),
                    price: e.price,
                    public: e.public,
                    closed: e.closed,
                    remains: e.remains,
                    // Dataset events settled long before the run started
                    created_at: None,
                }))
            })
            .collect();

        Self {
            allowable_delay,
            sheet_kinds: dataset.sheet_kinds.clone(),
            static_files: dataset.static_files.clone(),
            expected_index_digest: dataset.expected_index_digest,
            events: RwLock::new(events),
            reservations: Mutex::new(HashMap::new()),
            reserve_log: Mutex::new(HashMap::new()),
            cancel_log: Mutex::new(HashMap::new()),
            next_log_id: AtomicU64::new(1),
        }
    }

    pub fn allowable_delay(&self) -> Duration {
        self.allowable_delay
    }

    /// Now minus the allowable delay: writes older than this must be visible
    pub fn delay_threshold(&self) -> DateTime<Utc> {
        Utc::now() - chrono::Duration::milliseconds(self.allowable_delay.as_millis() as i64)
    }

    pub fn sheet_kinds(&self) -> &[SheetKind] {
        &self.sheet_kinds
    }

    pub fn sheet_kind_by_rank(&self, rank: &str) -> Option<&SheetKind> {
        self.sheet_kinds.iter().find(|k| k.rank == rank)
    }

    pub fn static_files(&self) -> &[StaticFile] {
        &self.static_files
    }

    pub fn expected_index_digest(&self) -> u32 {
        self.expected_index_digest
    }

    /// Allocate a fresh, unregistered actor credential set
    pub fn create_actor(&self, kind: ActorKind, rng: &RandomSource) -> Actor {
        Actor {
            id: 0,
            nickname: rng.alpha_string(8),
            login_name: rng.alpha_string(12),
            password: rng.alpha_string(12),
            online: false,
            kind,
        }
    }

    // Events

    pub fn find_event_by_id(&self, id: u64) -> Option<Arc<Event>> {
        let events = self.events.read();
        events.iter().find(|e| e.id() == id).cloned()
    }

    /// Make a pool-created event visible to the random pickers and listings
    pub fn publish_event(&self, event: Arc<Event>) {
        self.events.write().push(event);
    }

    /// Snapshot of all public events, sorted ascending by id
    pub fn public_events_snapshot(&self) -> Vec<EventState> {
        let mut snapshot: Vec<EventState> = {
            let events = self.events.read();
            events.iter().map(|e| e.snapshot()).collect()
        };
        snapshot.retain(|e| e.public);
        snapshot.sort_by_key(|e| e.id);
        snapshot
    }

    pub fn random_public_event(&self, rng: &RandomSource) -> Option<Arc<Event>> {
        let candidates: Vec<Arc<Event>> = {
            let events = self.events.read();
            events
                .iter()
                .filter(|e| {
                    let s = e.snapshot();
                    s.public && !s.closed
                })
                .cloned()
                .collect()
        };
        pick_arc(&candidates, rng)
    }

    pub fn random_public_sold_out_event(&self, rng: &RandomSource) -> Option<Arc<Event>> {
        let candidates: Vec<Arc<Event>> = {
            let events = self.events.read();
            events
                .iter()
                .filter(|e| {
                    let s = e.snapshot();
                    s.public && s.remains == 0
                })
                .cloned()
                .collect()
        };
        pick_arc(&candidates, rng)
    }

    // Pending-operation logs
    //
    // Insertion happens-before the network call, deletion happens-after it
    // returns, so the log window strictly covers the in-flight period.

    pub fn append_reserve_log(&self, pending: PendingReservation) -> u64 {
        let log_id = self.next_log_id.fetch_add(1, Ordering::Relaxed);
        self.reserve_log.lock().insert(log_id, pending);
        log_id
    }

    pub fn delete_reserve_log(&self, log_id: u64) {
        self.reserve_log.lock().remove(&log_id);
    }

    pub fn append_cancel_log(&self, pending: PendingReservation) -> u64 {
        let log_id = self.next_log_id.fetch_add(1, Ordering::Relaxed);
        self.cancel_log.lock().insert(log_id, pending);
        log_id
    }

    pub fn delete_cancel_log(&self, log_id: u64) {
        self.cancel_log.lock().remove(&log_id);
    }

    /// Reservations that may have committed server-side while their request
    /// was in flight; counted as slack in report reconciliation
    pub fn maybe_reserved_count(&self) -> usize {
        self.reserve_log.lock().len()
    }

    pub fn maybe_reserved_count_for_event(&self, event_id: u64) -> usize {
        let log = self.reserve_log.lock();
        log.values().filter(|p| p.event_id == event_id).count()
    }

    // Reservations

    /// Merge a completed reservation into the permanent set
    pub fn commit_reservation(&self, reservation: Arc<Reservation>) -> CheckResult<()> {
        let mut reservations = self.reservations.lock();
        if reservations.contains_key(&reservation.id) {
            return Err(fatal!(
                "the service assigned reservation id {} twice",
                reservation.id
            ));
        }
        reservations.insert(reservation.id, reservation);
        Ok(())
    }

    /// Start canceling: marks the stored reservation and hands it out so
    /// concurrent readers observe a consistent timestamp once committed
    pub fn begin_cancel_reservation(&self, id: u64) -> CheckResult<Arc<Reservation>> {
        let reservation = {
            let reservations = self.reservations.lock();
            reservations.get(&id).cloned()
        }
        .ok_or_else(|| fatal!("reservation {} is not in the ledger", id))?;

        reservation.request_cancel();
        Ok(reservation)
    }

    pub fn commit_cancel_reservation(&self, reservation: &Reservation) {
        reservation.commit_cancel();
    }

    /// Point-in-time copy of the reservation set
    pub fn reservations_snapshot(&self) -> HashMap<u64, Arc<Reservation>> {
        self.reservations.lock().clone()
    }

    pub fn reservations_snapshot_for_event(&self, event_id: u64) -> HashMap<u64, Arc<Reservation>> {
        let reservations = self.reservations.lock();
        reservations
            .iter()
            .filter(|(_, r)| r.event_id == event_id)
            .map(|(id, r)| (*id, r.clone()))
            .collect()
    }

    /// Reservations whose creation settled before `t`; these must all appear
    /// in an authoritative report requested after `t`
    pub fn reservations_settled_before(&self, t: DateTime<Utc>) -> HashMap<u64, Arc<Reservation>> {
        let reservations = self.reservations.lock();
        reservations
            .iter()
            .filter(|(_, r)| r.reserved_at <= t)
            .map(|(id, r)| (*id, r.clone()))
            .collect()
    }
}

fn pick_arc(candidates: &[Arc<Event>], rng: &RandomSource) -> Option<Arc<Event>> {
    if candidates.is_empty() {
        return None;
    }
    candidates.get(rng.pick(candidates.len())).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NON_RESERVED_NUM;

    fn ledger() -> Ledger {
        Ledger::new(&Dataset::sample(), Duration::from_secs(1))
    }

    fn reservation(id: u64) -> Arc<Reservation> {
        Arc::new(Reservation::new(id, 1, 1, "S".to_string(), id))
    }

    #[test]
    fn test_commit_reservation_rejects_duplicate_id() {
        let ledger = ledger();
        ledger.commit_reservation(reservation(1)).unwrap();
        assert!(ledger.commit_reservation(reservation(1)).is_err());
        assert!(ledger.commit_reservation(reservation(2)).is_ok());
    }

    #[test]
    fn test_log_window_counts() {
        let ledger = ledger();
        let pending = PendingReservation {
            event_id: 1,
            user_id: 1,
            sheet_rank: "S".to_string(),
        };

        let a = ledger.append_reserve_log(pending.clone());
        let b = ledger.append_reserve_log(PendingReservation {
            event_id: 2,
            ..pending.clone()
        });
        assert_eq!(ledger.maybe_reserved_count(), 2);
        assert_eq!(ledger.maybe_reserved_count_for_event(1), 1);

        ledger.delete_reserve_log(a);
        assert_eq!(ledger.maybe_reserved_count(), 1);
        ledger.delete_reserve_log(b);
        assert_eq!(ledger.maybe_reserved_count(), 0);
    }

    #[test]
    fn test_cancel_transition_is_visible_through_snapshot() {
        let ledger = ledger();
        ledger.commit_reservation(reservation(5)).unwrap();

        // Snapshot taken before the cancel still observes the timestamp once
        // the cancellation commits: both refer to the same stored object.
        let snapshot = ledger.reservations_snapshot();
        let stored = ledger.begin_cancel_reservation(5).unwrap();
        assert!(snapshot[&5].is_active());
        ledger.commit_cancel_reservation(&stored);
        assert!(!snapshot[&5].is_active());
    }

    #[test]
    fn test_begin_cancel_unknown_reservation_is_fatal() {
        let ledger = ledger();
        assert!(ledger.begin_cancel_reservation(99).is_err());
    }

    #[test]
    fn test_settled_before_filter() {
        let ledger = ledger();
        ledger.commit_reservation(reservation(1)).unwrap();
        let cutoff = Utc::now() - chrono::Duration::seconds(1);
        // The reservation was created just now, after the cutoff
        assert!(ledger.reservations_settled_before(cutoff).is_empty());
        assert_eq!(ledger.reservations_settled_before(Utc::now()).len(), 1);
    }

    #[test]
    fn test_random_pickers_respect_flags() {
        let ledger = ledger();
        let rng = RandomSource::seeded(3);

        for _ in 0..20 {
            let event = ledger.random_public_event(&rng).unwrap();
            let s = event.snapshot();
            assert!(s.public && !s.closed);

            let sold_out = ledger.random_public_sold_out_event(&rng).unwrap();
            let s = sold_out.snapshot();
            assert!(s.public && s.remains == 0);
            assert_eq!(s.id, 2);
        }
    }

    #[test]
    fn test_remains_arithmetic_under_concurrency() {
        let ledger = Arc::new(ledger());
        let event = ledger.find_event_by_id(1).unwrap();
        let initial = event.snapshot().remains;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let event = event.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..50 {
                    event.commit_reserve();
                    event.commit_cancel();
                }
                // One net reservation per thread
                event.commit_reserve();
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(event.snapshot().remains, initial - 8);
        // The sheet-slot sentinel stays out of the seat-number domain
        assert_eq!(NON_RESERVED_NUM, 0);
    }
}
