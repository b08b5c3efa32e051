//! Exclusive checkout of actors and probe slots
//!
//! The pool is the sole mechanism preventing two concurrent tasks from
//! mutating the same actor session or racing on the same sheet. Every pop
//! hands custody to a ticket whose `Drop` returns the resource on all exit
//! paths, so the 1:1 pop/release pairing cannot be forgotten.

use crate::dataset::Dataset;
use crate::ledger::Ledger;
use crate::model::{Actor, ActorKind, Event, EventSheet, EventState, NON_RESERVED_NUM};
use crate::random::RandomSource;
use gatecheck_http::{Checker, CheckResult, HttpConfig};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// One pooled actor together with its private session player
pub struct ActorSlot {
    pub actor: Actor,
    pub checker: Checker,
}

struct PoolInner {
    ledger: Arc<Ledger>,
    rng: RandomSource,
    base_url: Url,
    http: HttpConfig,

    users: Mutex<Vec<ActorSlot>>,
    admins: Mutex<Vec<ActorSlot>>,
    sheets: Mutex<VecDeque<EventSheet>>,
    /// Slots holding an outstanding reservation; kept for accounting only
    retired_sheets: Mutex<Vec<EventSheet>>,

    /// Single non-blocking gate for "create an event because the sheet pool
    /// is empty"; held across the creation request, hence a tokio mutex
    event_creation: tokio::sync::Mutex<()>,
}

/// Thread-safe checkout/return of actors and sheet probe slots
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

impl Pool {
    /// Build the pool from the initial dataset, one isolated session per actor
    pub fn new(
        ledger: Arc<Ledger>,
        dataset: &Dataset,
        base_url: Url,
        http: HttpConfig,
        rng: RandomSource,
    ) -> CheckResult<Self> {
        let mut users = Vec::with_capacity(dataset.users.len());
        for u in &dataset.users {
            users.push(ActorSlot {
                actor: Actor {
                    id: u.id,
                    nickname: u.nickname.clone(),
                    login_name: u.login_name.clone(),
                    password: u.password.clone(),
                    online: false,
                    kind: ActorKind::User,
                },
                checker: Checker::new(base_url.clone(), http.clone())?,
            });
        }

        let mut admins = Vec::with_capacity(dataset.administrators.len());
        for a in &dataset.administrators {
            admins.push(ActorSlot {
                actor: Actor {
                    id: a.id,
                    nickname: a.nickname.clone(),
                    login_name: a.login_name.clone(),
                    password: a.password.clone(),
                    online: false,
                    kind: ActorKind::Administrator,
                },
                checker: Checker::new(base_url.clone(), http.clone())?,
            });
        }

        let mut sheets = VecDeque::new();
        for event in &dataset.events {
            if event.public && !event.closed && event.remains > 0 {
                for kind in &dataset.sheet_kinds {
                    sheets.push_back(EventSheet {
                        event_id: event.id,
                        rank: kind.rank.clone(),
                        num: NON_RESERVED_NUM,
                    });
                }
            }
        }

        Ok(Self {
            inner: Arc::new(PoolInner {
                ledger,
                rng,
                base_url,
                http,
                users: Mutex::new(users),
                admins: Mutex::new(admins),
                sheets: Mutex::new(sheets),
                retired_sheets: Mutex::new(Vec::new()),
                event_creation: tokio::sync::Mutex::new(()),
            }),
        })
    }

    /// Fresh anonymous session, not tied to any pooled actor
    pub fn new_checker(&self) -> CheckResult<Checker> {
        Checker::new(self.inner.base_url.clone(), self.inner.http.clone())
    }

    /// Remove one registered user uniformly at random; `None` means "skip
    /// this iteration", never an error
    pub fn pop_random_user(&self) -> Option<ActorTicket> {
        self.pop_random(ActorKind::User)
    }

    /// Remove one administrator uniformly at random
    pub fn pop_random_administrator(&self) -> Option<ActorTicket> {
        self.pop_random(ActorKind::Administrator)
    }

    fn pop_random(&self, kind: ActorKind) -> Option<ActorTicket> {
        let slot = {
            let mut slots = self.free_list(kind).lock();
            if slots.is_empty() {
                None
            } else {
                let index = self.inner.rng.pick(slots.len());
                Some(slots.swap_remove(index))
            }
        }?;
        Some(ActorTicket {
            slot: Some(slot),
            kind,
            pool: self.inner.clone(),
        })
    }

    fn free_list(&self, kind: ActorKind) -> &Mutex<Vec<ActorSlot>> {
        match kind {
            ActorKind::User => &self.inner.users,
            ActorKind::Administrator => &self.inner.admins,
        }
    }

    /// Allocate a not-yet-registered user for account-creation scenarios
    ///
    /// The credentials join the active pool only through
    /// [`NewActorTicket::publish`]; dropping the ticket discards them.
    pub fn pop_new_user(&self) -> CheckResult<NewActorTicket> {
        let actor = self
            .inner
            .ledger
            .create_actor(ActorKind::User, &self.inner.rng);
        let checker = self.new_checker()?;
        Ok(NewActorTicket {
            slot: Some(ActorSlot { actor, checker }),
            pool: self.inner.clone(),
        })
    }

    /// Remove a not-currently-tested (event, rank) probe slot
    pub fn pop_event_sheet(&self) -> Option<SheetTicket> {
        let sheet = self.inner.sheets.lock().pop_front()?;
        Some(SheetTicket {
            sheet: Some(sheet),
            pool: self.inner.clone(),
        })
    }

    /// Try to become the single task creating a new event
    ///
    /// Losers must back off immediately rather than queue: an empty sheet
    /// pool resolves itself shortly once the winner publishes.
    pub fn try_begin_event_creation(&self) -> Option<EventCreationGuard<'_>> {
        self.inner
            .event_creation
            .try_lock()
            .ok()
            .map(|guard| EventCreationGuard { _guard: guard })
    }

    /// Allocate a new event, not yet visible to the server or the pool
    ///
    /// The caller must invoke [`EventPublish::publish`] once the server-side
    /// creation call verifies.
    pub fn create_new_event(&self) -> (Arc<Event>, EventPublish) {
        let rng = &self.inner.rng;
        let total: u64 = self.inner.ledger.sheet_kinds().iter().map(|k| k.total).sum();
        let event = Arc::new(Event::new(EventState {
            id: 0,
            title: format!("Concert {}", rng.alpha_string(6)),
            price: rng.in_range(1, 10) * 1000,
            public: true,
            closed: false,
            remains: total,
            created_at: None,
        }));
        let publish = EventPublish {
            event: event.clone(),
            pool: self.inner.clone(),
            published: false,
        };
        (event, publish)
    }

    pub fn available_users(&self) -> usize {
        self.inner.users.lock().len()
    }

    pub fn available_administrators(&self) -> usize {
        self.inner.admins.lock().len()
    }

    pub fn available_sheets(&self) -> usize {
        self.inner.sheets.lock().len()
    }

    pub fn retired_sheets(&self) -> usize {
        self.inner.retired_sheets.lock().len()
    }
}

/// Exclusive custody of one pooled actor; returns it on drop
pub struct ActorTicket {
    slot: Option<ActorSlot>,
    kind: ActorKind,
    pool: Arc<PoolInner>,
}

impl ActorTicket {
    /// The actor and its session player, borrowed disjointly
    pub fn parts(&mut self) -> (&mut Actor, &mut Checker) {
        let slot = self.slot.as_mut().expect("ticket slot present until drop");
        (&mut slot.actor, &mut slot.checker)
    }
}

impl Drop for ActorTicket {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            match self.kind {
                ActorKind::User => self.pool.users.lock().push(slot),
                ActorKind::Administrator => self.pool.admins.lock().push(slot),
            }
        }
    }
}

/// Custody of a not-yet-registered actor
pub struct NewActorTicket {
    slot: Option<ActorSlot>,
    pool: Arc<PoolInner>,
}

impl NewActorTicket {
    pub fn parts(&mut self) -> (&mut Actor, &mut Checker) {
        let slot = self.slot.as_mut().expect("ticket slot present until drop");
        (&mut slot.actor, &mut slot.checker)
    }

    /// Move the now-registered actor into the active user pool
    pub fn publish(mut self) {
        if let Some(slot) = self.slot.take() {
            self.pool.users.lock().push(slot);
        }
    }
}

impl Drop for NewActorTicket {
    fn drop(&mut self) {
        if self.slot.take().is_some() {
            debug!("discarding credentials of an actor whose registration did not complete");
        }
    }
}

/// Exclusive custody of one (event, rank) probe slot
pub struct SheetTicket {
    sheet: Option<EventSheet>,
    pool: Arc<PoolInner>,
}

impl SheetTicket {
    pub fn sheet(&self) -> &EventSheet {
        self.sheet.as_ref().expect("ticket slot present until drop")
    }

    pub fn sheet_mut(&mut self) -> &mut EventSheet {
        self.sheet.as_mut().expect("ticket slot present until drop")
    }
}

impl Drop for SheetTicket {
    fn drop(&mut self) {
        if let Some(sheet) = self.sheet.take() {
            if sheet.num == NON_RESERVED_NUM {
                self.pool.sheets.lock().push_back(sheet);
            } else {
                // Holding an outstanding reservation; not probeable again
                self.pool.retired_sheets.lock().push(sheet);
            }
        }
    }
}

/// Token making a created event visible once the server accepted it
pub struct EventPublish {
    event: Arc<Event>,
    pool: Arc<PoolInner>,
    published: bool,
}

impl EventPublish {
    /// Publish the event to the ledger and enqueue its probe slots
    pub fn publish(mut self, tag: &str) {
        self.published = true;
        let snapshot = self.event.snapshot();
        self.pool.ledger.publish_event(self.event.clone());
        if snapshot.public && !snapshot.closed {
            let mut sheets = self.pool.sheets.lock();
            for kind in self.pool.ledger.sheet_kinds() {
                sheets.push_back(EventSheet {
                    event_id: snapshot.id,
                    rank: kind.rank.clone(),
                    num: NON_RESERVED_NUM,
                });
            }
        }
        debug!("published event {} ({})", snapshot.id, tag);
    }
}

impl Drop for EventPublish {
    fn drop(&mut self) {
        if !self.published {
            debug!("abandoning event that was never created server-side");
        }
    }
}

/// Holder of the single create-event gate
pub struct EventCreationGuard<'a> {
    _guard: tokio::sync::MutexGuard<'a, ()>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::time::Duration;

    fn pool() -> Pool {
        let dataset = Dataset::sample();
        let ledger = Arc::new(Ledger::new(&dataset, Duration::from_secs(1)));
        Pool::new(
            ledger,
            &dataset,
            Url::parse("http://127.0.0.1:1/").unwrap(),
            HttpConfig::default(),
            RandomSource::seeded(11),
        )
        .unwrap()
    }

    #[test]
    fn test_pop_returns_on_drop() {
        let pool = pool();
        assert_eq!(pool.available_users(), 2);
        {
            let _ticket = pool.pop_random_user().unwrap();
            assert_eq!(pool.available_users(), 1);
        }
        assert_eq!(pool.available_users(), 2);
    }

    #[test]
    fn test_pool_exhaustion_is_not_an_error() {
        let pool = pool();
        let _a = pool.pop_random_administrator().unwrap();
        assert!(pool.pop_random_administrator().is_none());
    }

    #[test]
    fn test_actor_mutations_survive_checkout() {
        let pool = pool();
        {
            let mut ticket = pool.pop_random_administrator().unwrap();
            let (admin, _checker) = ticket.parts();
            admin.online = true;
        }
        let mut ticket = pool.pop_random_administrator().unwrap();
        let (admin, _checker) = ticket.parts();
        assert!(admin.online);
    }

    #[test]
    fn test_new_user_joins_pool_only_on_publish() {
        let pool = pool();
        {
            let discarded = pool.pop_new_user().unwrap();
            drop(discarded);
        }
        assert_eq!(pool.available_users(), 2);

        let published = pool.pop_new_user().unwrap();
        published.publish();
        assert_eq!(pool.available_users(), 3);
    }

    #[test]
    fn test_sheet_with_outstanding_reservation_is_retired() {
        let pool = pool();
        let before = pool.available_sheets();

        {
            let mut ticket = pool.pop_event_sheet().unwrap();
            ticket.sheet_mut().num = 17;
        }
        assert_eq!(pool.available_sheets(), before - 1);
        assert_eq!(pool.retired_sheets(), 1);

        // A slot released with the sentinel goes back to the queue
        {
            let _ticket = pool.pop_event_sheet().unwrap();
        }
        assert_eq!(pool.available_sheets(), before - 1);
    }

    #[test]
    fn test_event_creation_gate_is_non_blocking() {
        let pool = pool();
        let first = pool.try_begin_event_creation();
        assert!(first.is_some());
        assert!(pool.try_begin_event_creation().is_none());
        drop(first);
        assert!(pool.try_begin_event_creation().is_some());
    }

    #[test]
    fn test_published_event_becomes_visible_with_sheets() {
        let dataset = Dataset::sample();
        let ledger = Arc::new(Ledger::new(&dataset, Duration::from_secs(1)));
        let pool = Pool::new(
            ledger.clone(),
            &dataset,
            Url::parse("http://127.0.0.1:1/").unwrap(),
            HttpConfig::default(),
            RandomSource::seeded(11),
        )
        .unwrap();

        let before = pool.available_sheets();
        let (event, publish) = pool.create_new_event();
        // Server assigns the id before the caller publishes
        event.set_created(42);
        assert!(ledger.find_event_by_id(42).is_none());

        publish.publish("test");
        assert!(ledger.find_event_by_id(42).is_some());
        assert_eq!(pool.available_sheets(), before + 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_no_two_holders_of_the_same_user() {
        let pool = pool();
        let held: Arc<parking_lot::Mutex<HashSet<u64>>> =
            Arc::new(parking_lot::Mutex::new(HashSet::new()));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let pool = pool.clone();
            let held = held.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..100 {
                    if let Some(mut ticket) = pool.pop_random_user() {
                        let id = ticket.parts().0.id;
                        assert!(held.lock().insert(id), "user {} double-issued", id);
                        tokio::task::yield_now().await;
                        assert!(held.lock().remove(&id));
                    } else {
                        tokio::task::yield_now().await;
                    }
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(pool.available_users(), 2);
    }
}
