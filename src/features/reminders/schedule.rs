//! # Schedule Store
//!
//! Reminder items as received from the caller, their normalised form, and the
//! in-memory store that is replaced wholesale on every update.
//!
//! - **Version**: 1.2.0
//! - **Since**: 0.1.0
//!
//! ## Changelog
//! - 1.2.0: `replace` reports affected item ids instead of clearing everything
//! - 1.1.0: Accept numeric ids and comma-delimited `times`
//! - 1.0.0: Initial release

use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDate, NaiveTime, Timelike};
use log::{debug, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

static TIME_OF_DAY: OnceLock<Option<Regex>> = OnceLock::new();

fn time_of_day_pattern() -> Result<&'static Regex> {
    TIME_OF_DAY
        .get_or_init(|| Regex::new(r"^(\d{1,2}):(\d{1,2})(?::\d{1,2})?$").ok())
        .as_ref()
        .ok_or_else(|| anyhow!("time-of-day pattern failed to compile"))
}

/// Format a time of day the way it is shown and correlated: `HH:MM`
pub fn format_time_of_day(time: NaiveTime) -> String {
    format!("{:02}:{:02}", time.hour(), time.minute())
}

/// Opaque reminder item identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "RawItemId")]
pub struct ItemId(String);

/// Ids arrive as database integers from the page and as strings from files
#[derive(Deserialize)]
#[serde(untagged)]
enum RawItemId {
    Signed(i64),
    Unsigned(u64),
    Text(String),
}

impl From<RawItemId> for ItemId {
    fn from(raw: RawItemId) -> Self {
        match raw {
            RawItemId::Signed(n) => ItemId(n.to_string()),
            RawItemId::Unsigned(n) => ItemId(n.to_string()),
            RawItemId::Text(s) => ItemId(s),
        }
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        ItemId(s.to_string())
    }
}

impl From<String> for ItemId {
    fn from(s: String) -> Self {
        ItemId(s)
    }
}

impl ItemId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// `times` as sent by the caller: a list, or one comma-delimited string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimesField {
    List(Vec<String>),
    Delimited(String),
}

impl TimesField {
    /// Trimmed, non-empty entries in their original order
    pub fn entries(&self) -> Vec<String> {
        let raw: Vec<&str> = match self {
            TimesField::List(list) => list.iter().map(String::as_str).collect(),
            TimesField::Delimited(s) => s.split(',').collect(),
        };
        raw.into_iter()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// A reminder item in wire shape
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderItemInput {
    pub id: ItemId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub dosage: String,
    #[serde(default)]
    pub times: Option<TimesField>,
    /// `yyyy-MM-dd`; absent or empty means unbounded
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
}

/// One parsed time-of-day entry of an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScheduledTime(NaiveTime);

impl ScheduledTime {
    /// Parse `H:MM` or `HH:MM` (a trailing `:SS` is accepted and ignored)
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let caps = time_of_day_pattern()?
            .captures(s)
            .ok_or_else(|| anyhow!("not a time of day: {:?}", s))?;
        let hour: u32 = caps[1].parse()?;
        let minute: u32 = caps[2].parse()?;
        NaiveTime::from_hms_opt(hour, minute, 0)
            .map(ScheduledTime)
            .ok_or_else(|| anyhow!("time of day out of range: {:?}", s))
    }

    pub fn time(&self) -> NaiveTime {
        self.0
    }
}

impl std::fmt::Display for ScheduledTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&format_time_of_day(self.0))
    }
}

/// A normalised reminder item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderItem {
    pub id: ItemId,
    pub name: String,
    pub dosage: String,
    pub times: Vec<ScheduledTime>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

fn parse_bound(raw: Option<&str>) -> Result<Option<NaiveDate>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Some)
            .with_context(|| format!("invalid date {:?}", s)),
    }
}

impl ReminderItem {
    /// Normalise a wire item.
    ///
    /// Unparseable time entries are dropped with a warning; unparseable date
    /// bounds reject the whole item.
    pub fn from_input(input: ReminderItemInput) -> Result<Self> {
        let start_date = parse_bound(input.start_date.as_deref())
            .with_context(|| format!("item {} startDate", input.id))?;
        let end_date = parse_bound(input.end_date.as_deref())
            .with_context(|| format!("item {} endDate", input.id))?;

        let mut seen = HashSet::new();
        let mut times = Vec::new();
        for entry in input.times.as_ref().map(TimesField::entries).unwrap_or_default() {
            match ScheduledTime::parse(&entry) {
                Ok(t) => {
                    if seen.insert(t) {
                        times.push(t);
                    }
                }
                Err(e) => warn!("Dropping time entry of item {}: {}", input.id, e),
            }
        }

        Ok(ReminderItem {
            id: input.id,
            name: input.name,
            dosage: input.dosage,
            times,
            start_date,
            end_date,
        })
    }

    /// Whether `date` falls inside the inclusive `[start_date, end_date]` range
    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        self.start_date.map_or(true, |start| date >= start)
            && self.end_date.map_or(true, |end| date <= end)
    }
}

/// Result of normalising one schedule update
#[derive(Debug, Default)]
pub struct NormalizedSchedule {
    pub items: Vec<ReminderItem>,
    pub skipped: usize,
}

/// Normalise a full update, skipping malformed and duplicate items
pub fn normalize_items(inputs: Vec<ReminderItemInput>) -> NormalizedSchedule {
    let mut out = NormalizedSchedule::default();
    let mut ids = HashSet::new();

    for input in inputs {
        if ids.contains(&input.id) {
            warn!("Skipping duplicate reminder item id {}", input.id);
            out.skipped += 1;
            continue;
        }
        match ReminderItem::from_input(input) {
            Ok(item) => {
                ids.insert(item.id.clone());
                out.items.push(item);
            }
            Err(e) => {
                warn!("Skipping malformed reminder item: {e:#}");
                out.skipped += 1;
            }
        }
    }

    out
}

/// Decode wire items one by one so a single bad record cannot reject the rest
pub fn decode_items(values: Vec<serde_json::Value>) -> (Vec<ReminderItemInput>, usize) {
    let mut skipped = 0;
    let items = values
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<ReminderItemInput>(value) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!("Skipping undecodable reminder item: {e}");
                skipped += 1;
                None
            }
        })
        .collect();
    (items, skipped)
}

/// Schedule file loaded at daemon start
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScheduleFile {
    pub items: Vec<ReminderItemInput>,
}

impl ScheduleFile {
    /// Load a YAML schedule file
    pub fn load(path: &str) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path).with_context(|| format!("failed to read schedule {path}"))?;
        let file: ScheduleFile =
            serde_yaml::from_str(&contents).with_context(|| format!("failed to parse schedule {path}"))?;
        Ok(file)
    }
}

/// Holds the current set of reminder items
#[derive(Clone, Default)]
pub struct ScheduleStore {
    items: Arc<RwLock<Arc<Vec<ReminderItem>>>>,
}

impl ScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a new full set of items, returning the ids that were added,
    /// removed, or changed relative to the previous set
    pub fn replace(&self, items: Vec<ReminderItem>) -> Vec<ItemId> {
        let new = Arc::new(items);
        let old = {
            let mut guard = self.items.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *guard, new.clone())
        };

        let previous: HashMap<&ItemId, &ReminderItem> =
            old.iter().map(|item| (&item.id, item)).collect();
        let current: HashSet<&ItemId> = new.iter().map(|item| &item.id).collect();

        let mut affected: BTreeSet<ItemId> = new
            .iter()
            .filter(|item| previous.get(&item.id).copied() != Some(*item))
            .map(|item| item.id.clone())
            .collect();
        affected.extend(
            old.iter()
                .filter(|item| !current.contains(&item.id))
                .map(|item| item.id.clone()),
        );

        debug!(
            "Schedule replaced: {} items ({} affected)",
            new.len(),
            affected.len()
        );
        affected.into_iter().collect()
    }

    /// Cheap snapshot of the current items
    pub fn snapshot(&self) -> Arc<Vec<ReminderItem>> {
        self.items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn get(&self, id: &ItemId) -> Option<ReminderItem> {
        self.snapshot().iter().find(|item| &item.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
