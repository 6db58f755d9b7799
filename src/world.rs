//! Per-cell world state supplied for one render run.
//!
//! The bulk map-stats payload is loosely shaped JSON. It is validated here,
//! once, and turned into typed records so rendering never has to deal with
//! missing keys.

use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;

use crate::coords::CellName;
use crate::error::MapError;

/// Highest ownership level a cell can report.
pub const MAX_LEVEL: u8 = 8;

/// Status of a cell; everything except `Open` gets a colored mask.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CellStatus {
    Open,
    OutOfBounds,
    RespawnProtected,
    NoviceProtected,
}

impl CellStatus {
    /// Parse the status string used by the game API.
    pub fn from_api(status: &str) -> Option<Self> {
        match status {
            "normal" => Some(CellStatus::Open),
            "out of borders" => Some(CellStatus::OutOfBounds),
            "respawn" => Some(CellStatus::RespawnProtected),
            "novice" => Some(CellStatus::NoviceProtected),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Owner {
    pub username: String,
    /// 0 marks an outpost (remote claim), 1-8 an owned cell
    pub level: u8,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CellState {
    pub status: CellStatus,
    pub owner: Option<Owner>,
}

impl CellState {
    pub fn new(status: CellStatus) -> Self {
        Self { status, owner: None }
    }

    pub fn owned(status: CellStatus, username: &str, level: u8) -> Self {
        Self {
            status,
            owner: Some(Owner { username: username.to_string(), level }),
        }
    }
}

/// Raw `map-stats` response.
#[derive(Deserialize, Debug, Default)]
pub struct RawMapStats {
    #[serde(default)]
    pub stats: HashMap<String, RawCell>,
    #[serde(default)]
    pub users: HashMap<String, RawUser>,
}

#[derive(Deserialize, Debug)]
pub struct RawCell {
    pub status: String,
    #[serde(default)]
    pub own: Option<RawOwner>,
    /// Novice area expiry, ms since epoch
    #[serde(default)]
    pub novice: Option<f64>,
    /// Respawn area expiry, ms since epoch
    #[serde(default, rename = "respawnArea")]
    pub respawn_area: Option<f64>,
}

#[derive(Deserialize, Debug)]
pub struct RawOwner {
    pub user: String,
    pub level: i64,
}

#[derive(Deserialize, Debug)]
pub struct RawUser {
    pub username: String,
    #[serde(default)]
    pub badge: serde_json::Value,
}

/// Validated world state for one run.
#[derive(Clone, Debug, Default)]
pub struct WorldState {
    cells: HashMap<CellName, CellState>,
    /// Badge descriptor per username of every owner seen
    badges: BTreeMap<String, String>,
}

impl WorldState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate a raw payload. `now_ms` decides which protection areas are
    /// still active.
    pub fn from_raw(raw: RawMapStats, now_ms: i64) -> Result<Self, MapError> {
        let mut state = Self::new();

        for (name, cell) in raw.stats {
            let key: CellName = name.parse()?;
            let reject = |reason: String| MapError::MalformedCell { cell: name.clone(), reason };

            let status = CellStatus::from_api(&cell.status)
                .ok_or_else(|| reject(format!("unknown status `{}`", cell.status)))?;
            let status = refine_status(status, cell.novice, cell.respawn_area, now_ms);

            let owner = match cell.own {
                None => None,
                Some(own) => {
                    let user = raw
                        .users
                        .get(&own.user)
                        .ok_or_else(|| reject(format!("owner id {} has no user record", own.user)))?;
                    if !(0..=MAX_LEVEL as i64).contains(&own.level) {
                        return Err(reject(format!("ownership level {} out of range", own.level)));
                    }
                    state
                        .badges
                        .entry(user.username.clone())
                        .or_insert_with(|| user.badge.to_string());
                    Some(Owner { username: user.username.clone(), level: own.level as u8 })
                }
            };

            state.cells.insert(key, CellState { status, owner });
        }

        Ok(state)
    }

    pub fn insert(&mut self, cell: CellName, state: CellState) {
        self.cells.insert(cell, state);
    }

    pub fn set_badge(&mut self, username: &str, descriptor: &str) {
        self.badges.insert(username.to_string(), descriptor.to_string());
    }

    pub fn get(&self, cell: &CellName) -> Option<&CellState> {
        self.cells.get(cell)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Username -> badge descriptor for every owner in the world.
    pub fn badges(&self) -> &BTreeMap<String, String> {
        &self.badges
    }
}

/// The API only reports `normal` and `out of borders`; protection areas are
/// inferred from their expiry timestamps. When both are active the one that
/// lasts longer wins, novice on a tie.
pub fn refine_status(status: CellStatus, novice: Option<f64>, respawn: Option<f64>, now_ms: i64) -> CellStatus {
    if status != CellStatus::Open {
        return status;
    }
    let active = |t: Option<f64>| t.filter(|t| *t >= now_ms as f64);
    match (active(novice), active(respawn)) {
        (Some(n), Some(r)) if r > n => CellStatus::RespawnProtected,
        (Some(_), _) => CellStatus::NoviceProtected,
        (None, Some(_)) => CellStatus::RespawnProtected,
        (None, None) => CellStatus::Open,
    }
}
