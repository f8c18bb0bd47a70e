//! Punch and test-punch stream records
//!
//! Each completed message on a stream channel is one JSON batch:
//!
//! ```text
//! { "punches": [ { "sinumber": 8154321, "stationnumber": 31, "timestamp": "..." }, ... ] }
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A card read registered by the device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Punch {
    /// SportIdent card number
    pub sinumber: u64,
    /// Control station code
    pub stationnumber: u32,
    /// ISO-8601 time of the punch
    pub timestamp: String,
}

/// Delivery state of a test punch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestPunchStatus {
    Pending,
    Sent,
    Acked,
    NotAcked,
    #[serde(other)]
    Unknown,
}

/// A synthetic punch sent by the device to test the radio path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestPunch {
    pub id: u64,
    pub sinumber: u64,
    pub stationnumber: u32,
    pub timestamp: String,
    pub status: TestPunchStatus,
    #[serde(default)]
    pub noofsendtries: u32,
    #[serde(default)]
    pub retries: u32,
}

#[derive(Deserialize)]
struct Batch<T> {
    punches: Vec<T>,
}

/// Decode a punches-channel message
pub fn decode_punches(text: &str) -> Result<Vec<Punch>> {
    serde_json::from_str::<Batch<Punch>>(text)
        .map(|b| b.punches)
        .map_err(|e| Error::Batch {
            channel: "punches",
            reason: e.to_string(),
        })
}

/// Decode a test-punches-channel message
pub fn decode_test_punches(text: &str) -> Result<Vec<TestPunch>> {
    serde_json::from_str::<Batch<TestPunch>>(text)
        .map(|b| b.punches)
        .map_err(|e| Error::Batch {
            channel: "testpunches",
            reason: e.to_string(),
        })
}

/// Append-only accumulation of received punches
#[derive(Debug, Clone, Default)]
pub struct PunchLog {
    punches: Vec<Punch>,
}

impl PunchLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, batch: &[Punch]) {
        self.punches.extend_from_slice(batch);
    }

    pub fn punches(&self) -> &[Punch] {
        &self.punches
    }

    pub fn len(&self) -> usize {
        self.punches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.punches.is_empty()
    }

    pub fn clear(&mut self) {
        self.punches.clear();
    }
}

/// Latest state of every test punch, updated in place by id
#[derive(Debug, Clone, Default)]
pub struct TestPunchBoard {
    punches: Vec<TestPunch>,
}

impl TestPunchBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert new punches and replace known ones, keeping first-seen order
    pub fn merge(&mut self, batch: &[TestPunch]) {
        for punch in batch {
            match self.punches.iter_mut().find(|p| p.id == punch.id) {
                Some(existing) => *existing = punch.clone(),
                None => self.punches.push(punch.clone()),
            }
        }
    }

    pub fn punches(&self) -> &[TestPunch] {
        &self.punches
    }

    pub fn get(&self, id: u64) -> Option<&TestPunch> {
        self.punches.iter().find(|p| p.id == id)
    }

    pub fn len(&self) -> usize {
        self.punches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.punches.is_empty()
    }

    pub fn clear(&mut self) {
        self.punches.clear();
    }
}
