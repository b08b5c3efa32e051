//! State/consistency engine for the Gatecheck benchmarker
//!
//! Gatecheck drives a ticket-reservation web service with many concurrent
//! simulated actors and independently verifies that server responses stay
//! consistent with a client-side model of the service's true state.
//!
//! This crate holds the hard parts: the [`ledger::Ledger`] (authoritative
//! client-side model), the [`pool::Pool`] (exclusive checkout of actors and
//! probe slots), the consistency verifiers ([`verify`], [`report`],
//! [`digest`]), and the [`scenario::Harness`] composing them into end-to-end
//! actor behaviors. The HTTP action player lives in `gatecheck-http`.

pub mod counter;
pub mod dataset;
pub mod digest;
pub mod ledger;
pub mod model;
pub mod pool;
pub mod random;
pub mod report;
pub mod scenario;
pub mod verify;

// Re-export main types for convenience
pub use counter::{Counters, MemoryCounters, NoopCounters};
pub use dataset::Dataset;
pub use ledger::Ledger;
pub use model::{Actor, ActorKind, Event, EventSheet, Reservation, NON_RESERVED_NUM};
pub use pool::Pool;
pub use random::RandomSource;
pub use scenario::{Harness, ScenarioKind};

// The player's error type doubles as the scenario error type
pub use gatecheck_http::{CheckError, CheckResult};
