//! Initial-state dataset consumed at harness construction
//!
//! Loading the file itself is the driver's job; the core only consumes the
//! deserialized struct.

use crate::model::SheetKind;
use serde::{Deserialize, Serialize};

/// Initial service state shipped with the benchmark
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    /// Registered users known to the service at start
    pub users: Vec<DatasetActor>,

    /// Administrators known to the service at start
    pub administrators: Vec<DatasetActor>,

    /// Events present at start, including sold-out and closed ones
    pub events: Vec<DatasetEvent>,

    /// Seat classes shared by all events
    pub sheet_kinds: Vec<SheetKind>,

    /// Static assets with expected content checksums
    #[serde(default)]
    pub static_files: Vec<StaticFile>,

    /// Expected structural digest of the top page
    pub expected_index_digest: u32,
}

/// One pre-registered credential set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetActor {
    pub id: u64,
    pub nickname: String,
    pub login_name: String,
    pub password: String,
}

/// One pre-existing event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetEvent {
    pub id: u64,
    pub title: String,
    pub price: u64,
    pub public: bool,
    #[serde(default)]
    pub closed: bool,
    pub remains: u64,
}

/// Static asset address plus expected content checksum (CRC32 of the body)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticFile {
    pub path: String,
    pub checksum: u32,
}

impl Dataset {
    /// Small fixed dataset for tests and local smoke runs
    pub fn sample() -> Self {
        Self {
            users: vec![
                DatasetActor {
                    id: 1,
                    nickname: "Alice".to_string(),
                    login_name: "alice".to_string(),
                    password: "alicepw".to_string(),
                },
                DatasetActor {
                    id: 2,
                    nickname: "Bob".to_string(),
                    login_name: "bob".to_string(),
                    password: "bobpw".to_string(),
                },
            ],
            administrators: vec![DatasetActor {
                id: 1000,
                nickname: "Root".to_string(),
                login_name: "admin".to_string(),
                password: "adminpw".to_string(),
            }],
            events: vec![
                DatasetEvent {
                    id: 1,
                    title: "Opening Night".to_string(),
                    price: 1000,
                    public: true,
                    closed: false,
                    remains: 1000,
                },
                DatasetEvent {
                    id: 2,
                    title: "Matinee".to_string(),
                    price: 2000,
                    public: true,
                    closed: false,
                    remains: 0,
                },
                DatasetEvent {
                    id: 3,
                    title: "Dress Rehearsal".to_string(),
                    price: 500,
                    public: false,
                    closed: false,
                    remains: 1000,
                },
            ],
            sheet_kinds: vec![
                SheetKind {
                    rank: "S".to_string(),
                    total: 50,
                    price: 5000,
                },
                SheetKind {
                    rank: "A".to_string(),
                    total: 150,
                    price: 3000,
                },
                SheetKind {
                    rank: "B".to_string(),
                    total: 300,
                    price: 1000,
                },
                SheetKind {
                    rank: "C".to_string(),
                    total: 500,
                    price: 0,
                },
            ],
            static_files: Vec::new(),
            expected_index_digest: 0,
        }
    }
}
