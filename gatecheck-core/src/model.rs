//! Client-side entity model and wire-level DTOs

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Sentinel seat number for a probe slot with no outstanding reservation
pub const NON_RESERVED_NUM: u64 = 0;

/// Which pool an actor belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActorKind {
    User,
    Administrator,
}

/// A simulated end user or administrator credential set
///
/// Both kinds share this shape but are pooled separately since their
/// endpoints differ. `online` is mutated only after a login/logout response
/// verifies, never speculatively.
#[derive(Debug, Clone)]
pub struct Actor {
    /// Server-assigned id; 0 until the account creation response commits it
    pub id: u64,
    pub nickname: String,
    pub login_name: String,
    pub password: String,
    pub online: bool,
    pub kind: ActorKind,
}

/// Static seat class shared by all events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetKind {
    pub rank: String,
    pub total: u64,
    pub price: u64,
}

/// One poolable (event, rank) probe slot
///
/// `num` holds the seat number assigned by an outstanding reservation test,
/// or [`NON_RESERVED_NUM`] when the slot is free.
#[derive(Debug, Clone)]
pub struct EventSheet {
    pub event_id: u64,
    pub rank: String,
    pub num: u64,
}

/// Mutable view of one event, copied out under the event lock
#[derive(Debug, Clone)]
pub struct EventState {
    pub id: u64,
    pub title: String,
    pub price: u64,
    pub public: bool,
    pub closed: bool,
    pub remains: u64,

    /// When the create-event response committed; `None` for dataset events
    /// that settled long before the run started
    pub created_at: Option<DateTime<Utc>>,
}

/// One event, shared across tasks
///
/// `remains` is read and written from many concurrent reservation and
/// cancellation flows, so all state lives behind a per-event lock.
#[derive(Debug)]
pub struct Event {
    state: Mutex<EventState>,
}

impl Event {
    pub fn new(state: EventState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    /// Point-in-time copy of the event state
    pub fn snapshot(&self) -> EventState {
        self.state.lock().clone()
    }

    pub fn id(&self) -> u64 {
        self.state.lock().id
    }

    /// Commit the server-assigned id once the create-event response verifies
    pub fn set_created(&self, id: u64) {
        let mut state = self.state.lock();
        state.id = id;
        state.created_at = Some(Utc::now());
    }

    pub fn set_public(&self, public: bool) {
        self.state.lock().public = public;
    }

    /// One committed reservation: remaining seats decrease by exactly 1
    pub fn commit_reserve(&self) {
        let mut state = self.state.lock();
        if state.remains == 0 {
            tracing::warn!("event {} has no remaining seats to reserve", state.id);
            return;
        }
        state.remains -= 1;
    }

    /// One committed cancellation: remaining seats increase by exactly 1
    pub fn commit_cancel(&self) {
        self.state.lock().remains += 1;
    }
}

/// Cancellation lifecycle of one reservation
#[derive(Debug, Clone, Copy, Default)]
struct CancelState {
    requested_at: Option<DateTime<Utc>>,
    canceled_at: Option<DateTime<Utc>>,
}

/// One committed reservation
///
/// Shared between the scenario that created it and the verifiers, so the
/// cancellation timestamps live behind a lock: `begin_cancel_reservation`
/// hands out the stored object and concurrent readers must observe a
/// consistent timestamp once the cancellation commits.
#[derive(Debug)]
pub struct Reservation {
    pub id: u64,
    pub event_id: u64,
    pub user_id: u64,
    pub sheet_rank: String,
    pub sheet_num: u64,
    pub reserved_at: DateTime<Utc>,
    cancel: Mutex<CancelState>,
}

impl Reservation {
    pub fn new(id: u64, event_id: u64, user_id: u64, sheet_rank: String, sheet_num: u64) -> Self {
        Self {
            id,
            event_id,
            user_id,
            sheet_rank,
            sheet_num,
            reserved_at: Utc::now(),
            cancel: Mutex::new(CancelState::default()),
        }
    }

    /// Mark that a cancellation request is about to go out
    pub fn request_cancel(&self) {
        self.cancel.lock().requested_at = Some(Utc::now());
    }

    /// Mark the cancellation as committed by a verified response
    pub fn commit_cancel(&self) {
        self.cancel.lock().canceled_at = Some(Utc::now());
    }

    pub fn canceled_at(&self) -> Option<DateTime<Utc>> {
        self.cancel.lock().canceled_at
    }

    /// A reservation without a committed cancellation is active
    pub fn is_active(&self) -> bool {
        self.canceled_at().is_none()
    }

    /// Definitely canceled before `t`
    pub fn canceled_before(&self, t: DateTime<Utc>) -> bool {
        matches!(self.cancel.lock().canceled_at, Some(at) if at <= t)
    }

    /// Possibly canceled as of `t`: a cancel was requested but is not known
    /// to have settled before `t`
    pub fn maybe_canceled(&self, t: DateTime<Utc>) -> bool {
        let cancel = self.cancel.lock();
        cancel.requested_at.is_some() && !matches!(cancel.canceled_at, Some(at) if at <= t)
    }
}

/// Provisional reservation data bracketing an in-flight mutating request
#[derive(Debug, Clone)]
pub struct PendingReservation {
    pub event_id: u64,
    pub user_id: u64,
    pub sheet_rank: String,
}

// Wire-level DTOs

/// JSON error envelope: `{"error": "<code>"}`
#[derive(Debug, Deserialize)]
pub struct JsonError {
    pub error: String,
}

/// Public identity returned by user and administrator endpoints
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonUser {
    pub id: u64,
    pub nickname: String,
}

/// Event row in listings and in the top-page `data-events` attribute
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonEvent {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub remains: u64,
}

/// Full event view returned by the administrator endpoints
#[derive(Debug, Deserialize)]
pub struct JsonFullEvent {
    pub id: u64,
    pub title: String,
    pub price: u64,
    pub public: bool,
    #[serde(default)]
    pub closed: bool,
}

/// Reservation create response: status 202 with this body
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct JsonReservation {
    pub reservation_id: u64,
    pub sheet_rank: String,
    pub sheet_num: u64,
}

/// Detailed per-user view; decoded for shape only
#[derive(Debug, Deserialize)]
pub struct JsonFullUser {
    pub id: u64,
    pub nickname: String,
}
