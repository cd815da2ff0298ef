//! Weekly provider availability grid.
//!
//! The grid covers one Sunday-to-Saturday week with hourly cells from 08:00 to
//! 18:00 inclusive. Cells are identified by `YYYY-MM-DD_HH:00` keys, which is
//! also the form they are persisted in.

use std::{collections::BTreeSet, fmt, str::FromStr};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveDate};
use shared::{domain::ProviderId, protocol::AvailabilitySlot};
use thiserror::Error;
use tracing::info;

pub const FIRST_HOUR: u32 = 8;
pub const LAST_HOUR: u32 = 18;
pub const DAYS_PER_WEEK: usize = 7;
pub const BUSY_THRESHOLD: f64 = 0.7;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CellKeyError {
    #[error("malformed cell key '{0}'")]
    Malformed(String),
    #[error("hour {0} is outside the bookable range")]
    OutOfRange(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellKey {
    pub date: NaiveDate,
    pub hour: u32,
}

impl CellKey {
    pub fn new(date: NaiveDate, hour: u32) -> Result<Self, CellKeyError> {
        if !(FIRST_HOUR..=LAST_HOUR).contains(&hour) {
            return Err(CellKeyError::OutOfRange(hour));
        }
        Ok(Self { date, hour })
    }

    /// `HH:00`, the form slot start times use.
    pub fn time_label(&self) -> String {
        format!("{:02}:00", self.hour)
    }
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{:02}:00", self.date.format("%Y-%m-%d"), self.hour)
    }
}

impl FromStr for CellKey {
    type Err = CellKeyError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let malformed = || CellKeyError::Malformed(raw.to_string());
        let (date, time) = raw.split_once('_').ok_or_else(malformed)?;
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| malformed())?;
        let hour = time
            .strip_suffix(":00")
            .filter(|hour| hour.len() == 2)
            .and_then(|hour| hour.parse::<u32>().ok())
            .ok_or_else(malformed)?;
        CellKey::new(date, hour)
    }
}

/// Sunday on or before `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_sunday()))
}

#[async_trait]
pub trait AvailabilityStore: Send + Sync {
    async fn load_cells(&self, provider: &ProviderId) -> Result<Vec<String>>;
    async fn save_cells(&self, provider: &ProviderId, cells: &[String]) -> Result<()>;
}

#[async_trait]
impl AvailabilityStore for storage::Storage {
    async fn load_cells(&self, provider: &ProviderId) -> Result<Vec<String>> {
        Ok(self.get_availability(provider).await?.unwrap_or_default())
    }

    async fn save_cells(&self, provider: &ProviderId, cells: &[String]) -> Result<()> {
        self.set_availability(provider, cells).await
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingChanges {
    pub added: BTreeSet<CellKey>,
    pub removed: BTreeSet<CellKey>,
}

impl PendingChanges {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len()
    }
}

#[derive(Debug, Clone)]
pub struct AvailabilityGrid {
    week_start: NaiveDate,
    selected: BTreeSet<CellKey>,
    saved: BTreeSet<CellKey>,
    dragging: bool,
}

impl AvailabilityGrid {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            week_start: week_start(today),
            selected: BTreeSet::new(),
            saved: BTreeSet::new(),
            dragging: false,
        }
    }

    pub fn week_start(&self) -> NaiveDate {
        self.week_start
    }

    pub fn days(&self) -> Vec<NaiveDate> {
        (0..DAYS_PER_WEEK as i64)
            .map(|offset| self.week_start + Duration::days(offset))
            .collect()
    }

    pub fn hours() -> impl Iterator<Item = u32> {
        FIRST_HOUR..=LAST_HOUR
    }

    /// Every cell of the visible week, row by row (hour, then day).
    pub fn cells(&self) -> Vec<CellKey> {
        let days = self.days();
        Self::hours()
            .flat_map(|hour| days.iter().map(move |&date| CellKey { date, hour }))
            .collect()
    }

    pub fn is_selected(&self, key: &CellKey) -> bool {
        self.selected.contains(key)
    }

    /// Flips one cell and returns its new state.
    pub fn toggle(&mut self, key: CellKey) -> bool {
        if self.selected.remove(&key) {
            false
        } else {
            self.selected.insert(key);
            true
        }
    }

    /// Pressing on a cell toggles it and starts a drag.
    pub fn begin_drag(&mut self, key: CellKey) {
        self.dragging = true;
        self.toggle(key);
    }

    /// Entering a cell mid-drag toggles it too.
    pub fn drag_over(&mut self, key: CellKey) {
        if self.dragging {
            self.toggle(key);
        }
    }

    pub fn end_drag(&mut self) {
        self.dragging = false;
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    /// Moves the visible week by `weeks` (negative goes back). Selections in
    /// other weeks are kept.
    pub fn navigate(&mut self, weeks: i64) {
        self.week_start += Duration::weeks(weeks);
    }

    pub fn pending_changes(&self) -> PendingChanges {
        PendingChanges {
            added: self.selected.difference(&self.saved).copied().collect(),
            removed: self.saved.difference(&self.selected).copied().collect(),
        }
    }

    pub fn has_pending_changes(&self) -> bool {
        self.selected != self.saved
    }

    pub fn discard_changes(&mut self) {
        self.selected = self.saved.clone();
    }

    pub fn selected_keys(&self) -> Vec<String> {
        self.selected.iter().map(CellKey::to_string).collect()
    }

    pub async fn save(&mut self, store: &dyn AvailabilityStore, provider: &ProviderId) -> Result<()> {
        let keys = self.selected_keys();
        store.save_cells(provider, &keys).await?;
        self.saved = self.selected.clone();
        info!(provider = %provider.as_str(), cells = keys.len(), "availability saved");
        Ok(())
    }

    /// Replaces the selection with what the store holds. Stored keys that no
    /// longer parse are skipped.
    pub async fn load(&mut self, store: &dyn AvailabilityStore, provider: &ProviderId) -> Result<()> {
        let stored = store.load_cells(provider).await?;
        let cells: BTreeSet<CellKey> = stored
            .iter()
            .filter_map(|raw| raw.parse().ok())
            .collect();
        self.saved = cells.clone();
        self.selected = cells;
        Ok(())
    }
}

/// Published slots starting in `key`'s hour.
pub fn slots_for_cell<'a>(key: &CellKey, slots: &'a [AvailabilitySlot]) -> Vec<&'a AvailabilitySlot> {
    let time = key.time_label();
    slots
        .iter()
        .filter(|slot| slot.date == key.date && slot.start_time == time)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occupancy {
    Open,
    Busy,
    Full,
}

pub fn occupancy(slot: &AvailabilitySlot) -> Occupancy {
    if slot.max_patients == 0 || slot.current_patients >= slot.max_patients {
        return Occupancy::Full;
    }
    let ratio = f64::from(slot.current_patients) / f64::from(slot.max_patients);
    if ratio >= BUSY_THRESHOLD {
        Occupancy::Busy
    } else {
        Occupancy::Open
    }
}
