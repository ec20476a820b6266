//! Purpose: Wire types for the collections the beacon client pages through.
//! Exports: `JournalEntry`, `MoodLog`, `BeaconNotification`, `CommunityPost`, `Collection`.
//! Role: Shared between the HTTP fetcher, the demo server, and the CLI.
//! Invariants: Collection path segments are stable once published.
//! Invariants: Timestamps are RFC 3339 strings; lists are served newest first.

use crate::api::{Identified, RemoteEntity};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: u64,
    pub title: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood_score: Option<u8>,
    pub created_at: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoodLog {
    pub id: u64,
    /// 1 (lowest) through 5 (highest).
    pub score: u8,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub logged_at: String,
}

/// A check-in request sent by a trusted contact.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeaconNotification {
    pub id: String,
    pub sender: String,
    pub message: String,
    #[serde(default)]
    pub replied: bool,
    pub sent_at: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunityPost {
    pub id: u64,
    pub room: String,
    pub author: String,
    pub body: String,
    #[serde(default)]
    pub reply_count: u32,
    pub posted_at: String,
}

macro_rules! identified {
    ($ty:ty, $id:ty, $collection:literal) => {
        impl Identified for $ty {
            type Id = $id;

            fn id(&self) -> &$id {
                &self.id
            }
        }

        impl RemoteEntity for $ty {
            const COLLECTION: &'static str = $collection;
        }
    };
}

identified!(JournalEntry, u64, "journal");
identified!(MoodLog, u64, "moods");
identified!(BeaconNotification, String, "beacons");
identified!(CommunityPost, u64, "community");

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Collection {
    Journal,
    Moods,
    Beacons,
    Community,
}

impl Collection {
    pub const ALL: [Collection; 4] = [
        Collection::Journal,
        Collection::Moods,
        Collection::Beacons,
        Collection::Community,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Collection::Journal => JournalEntry::COLLECTION,
            Collection::Moods => MoodLog::COLLECTION,
            Collection::Beacons => BeaconNotification::COLLECTION,
            Collection::Community => CommunityPost::COLLECTION,
        }
    }

    pub fn parse(segment: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|collection| collection.as_str() == segment)
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
