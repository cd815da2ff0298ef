use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use shared::{
    domain::{FieldValue, FormRecord, ProviderId, SlotKind},
    protocol::AvailabilitySlot,
};
use tokio::sync::Mutex;

use super::*;
use crate::{
    availability::{
        occupancy, slots_for_cell, week_start, AvailabilityGrid, AvailabilityStore, CellKey,
        CellKeyError, Occupancy,
    },
    notice::{NoticeQueue, NoticeVariant},
    sanitize::{escape_html, sanitize_record, SubmissionScreen},
    strength::PasswordRequirements,
};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("date")
}

#[test]
fn escapes_html_metacharacters() {
    assert_eq!(
        escape_html(r#"<a href="x">Tom & 'Jerry'</a>"#),
        "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#x27;Jerry&#x27;&lt;/a&gt;"
    );
}

#[test]
fn sanitising_trims_and_escapes_all_but_passwords() {
    let mut record = FormRecord::new();
    record.set("city", "  Austin <TX>  ");
    record.set("password", "  P<a>ss1!  ");
    record.set("confirm_password", "  P<a>ss1!  ");
    record.set("medical_conditions", vec![" Asthma ".to_string(), "A&B".to_string()]);
    record.set("date_of_birth", date(1990, 5, 1));

    let clean = sanitize_record(&record);
    assert_eq!(clean.text("city"), Some("Austin &lt;TX&gt;"));
    assert_eq!(clean.text("password"), Some("  P<a>ss1!  "));
    assert_eq!(clean.text("confirm_password"), Some("  P<a>ss1!  "));
    assert_eq!(
        clean.get("medical_conditions"),
        Some(&FieldValue::List(vec!["Asthma".to_string(), "A&amp;B".to_string()]))
    );
    assert_eq!(clean.get("date_of_birth"), Some(&FieldValue::Date(date(1990, 5, 1))));
}

#[test]
fn screen_flags_script_like_content_in_free_text() {
    let rules = patient_rule_table(&RulesConfig::default()).expect("rules");
    let screen = SubmissionScreen::new(&rules).expect("screen");
    let flagged = |field: &str, value: &str| {
        let mut record = FormRecord::new();
        record.set(field, value);
        screen.find_suspicious(&sanitize_record(&record))
    };

    assert_eq!(flagged("city", "JavaScript:alert(1)"), Some("city".to_string()));
    assert_eq!(flagged("city", "data:text/html,hi"), Some("city".to_string()));
    assert_eq!(flagged("city", "Springfield"), None);
    assert_eq!(flagged("city", "<script>alert(1)</script>"), None);
    assert_eq!(flagged("city", "x onload = y"), None);
    assert_eq!(flagged("policy_number", "ON12=34"), None);
    assert_eq!(flagged("password", "javascript:Aa1!"), None);

    assert!(screen.is_screened("insurance_provider"));
    assert!(!screen.is_screened("email"));
    assert!(!screen.is_screened("zip"));
    assert!(!screen.is_screened("confirm_password"));
}

#[test]
fn requirements_checklist_follows_policy() {
    let strict = PasswordRequirements::check("Abcdefg1#", PasswordPolicy::Strict);
    assert!(strict.min_length && strict.has_number && !strict.has_special);
    assert_eq!(strict.satisfied(), 4);

    let broad = PasswordRequirements::check("Abcdefg1#", PasswordPolicy::Broad);
    assert!(broad.has_special);
    let items = broad.items(PasswordPolicy::Broad);
    assert_eq!(items.len(), 5);
    assert!(items.iter().all(|(_, met)| *met));
    assert_eq!(items[0].0, "At least 8 characters");
}

#[test]
fn notices_expire_unless_sticky() {
    let queue = NoticeQueue::new(Duration::from_secs(3));
    let handle = queue.clone();
    let timed = queue.success("Saved", None);
    let sticky = handle.enqueue(
        NoticeVariant::Error,
        "Offline",
        Some("Check your connection".to_string()),
        Duration::ZERO,
    );
    assert_eq!(queue.len(), 2);

    let later = Instant::now() + Duration::from_secs(10);
    let active: Vec<_> = queue.active_at(later).into_iter().map(|n| n.id).collect();
    assert_eq!(active, vec![sticky]);

    assert_eq!(queue.prune_expired(later), 1);
    assert!(!queue.dismiss(timed));
    assert!(queue.dismiss(sticky));
    assert!(queue.is_empty());
}

#[test]
fn cell_keys_round_trip_through_text() {
    let key = CellKey::new(date(2026, 10, 12), 9).expect("key");
    assert_eq!(key.to_string(), "2026-10-12_09:00");
    assert_eq!("2026-10-12_09:00".parse::<CellKey>(), Ok(key));
    assert_eq!(
        "2026-10-12_07:00".parse::<CellKey>(),
        Err(CellKeyError::OutOfRange(7))
    );
    assert!(matches!(
        "2026-10-12 09:00".parse::<CellKey>(),
        Err(CellKeyError::Malformed(_))
    ));
    assert!(matches!(
        "2026-10-12_9:00".parse::<CellKey>(),
        Err(CellKeyError::Malformed(_))
    ));
}

#[test]
fn weeks_start_on_sunday() {
    assert_eq!(week_start(date(2026, 10, 17)), date(2026, 10, 11));
    assert_eq!(week_start(date(2026, 10, 11)), date(2026, 10, 11));

    let grid = AvailabilityGrid::new(date(2026, 10, 17));
    assert_eq!(grid.days().len(), 7);
    assert_eq!(grid.cells().len(), 7 * 11);
    assert_eq!(grid.cells()[0].to_string(), "2026-10-11_08:00");
    assert_eq!(
        grid.cells().last().map(CellKey::to_string),
        Some("2026-10-17_18:00".to_string())
    );
}

#[test]
fn drag_toggles_each_entered_cell() {
    let mut grid = AvailabilityGrid::new(date(2026, 10, 17));
    let a = CellKey::new(date(2026, 10, 12), 9).expect("a");
    let b = CellKey::new(date(2026, 10, 12), 10).expect("b");
    let c = CellKey::new(date(2026, 10, 12), 11).expect("c");

    grid.drag_over(a);
    assert!(!grid.is_selected(&a));

    grid.begin_drag(a);
    grid.drag_over(b);
    grid.drag_over(c);
    grid.end_drag();
    grid.drag_over(a);
    assert!(grid.is_selected(&a) && grid.is_selected(&b) && grid.is_selected(&c));

    assert!(!grid.toggle(b));
    assert_eq!(grid.selected_keys(), vec!["2026-10-12_09:00", "2026-10-12_11:00"]);
}

#[derive(Default)]
struct MemoryStore {
    cells: Mutex<HashMap<String, Vec<String>>>,
}

#[async_trait]
impl AvailabilityStore for MemoryStore {
    async fn load_cells(&self, provider: &ProviderId) -> Result<Vec<String>> {
        Ok(self
            .cells
            .lock()
            .await
            .get(provider.as_str())
            .cloned()
            .unwrap_or_default())
    }

    async fn save_cells(&self, provider: &ProviderId, cells: &[String]) -> Result<()> {
        self.cells
            .lock()
            .await
            .insert(provider.as_str().to_string(), cells.to_vec());
        Ok(())
    }
}

#[tokio::test]
async fn pending_changes_clear_on_save_and_survive_navigation() {
    let store = MemoryStore::default();
    let provider = ProviderId::new("dr-ada");
    let mut grid = AvailabilityGrid::new(date(2026, 10, 17));
    let monday = CellKey::new(date(2026, 10, 12), 9).expect("key");

    grid.toggle(monday);
    assert!(grid.has_pending_changes());
    assert_eq!(grid.pending_changes().added.len(), 1);

    grid.navigate(1);
    assert_eq!(grid.week_start(), date(2026, 10, 18));
    grid.navigate(-1);
    assert!(grid.is_selected(&monday));

    grid.save(&store, &provider).await.expect("save");
    assert!(!grid.has_pending_changes());

    grid.toggle(monday);
    assert_eq!(grid.pending_changes().removed.len(), 1);
    grid.discard_changes();
    assert!(grid.is_selected(&monday));

    let mut reloaded = AvailabilityGrid::new(date(2026, 10, 17));
    reloaded.load(&store, &provider).await.expect("load");
    assert!(reloaded.is_selected(&monday));
    assert!(!reloaded.has_pending_changes());
}

fn slot(id: &str, start: &str, current: u32, max: u32) -> AvailabilitySlot {
    AvailabilitySlot {
        id: id.to_string(),
        date: date(2026, 10, 12),
        start_time: start.to_string(),
        end_time: "10:00".to_string(),
        kind: SlotKind::Consultation,
        max_patients: max,
        current_patients: current,
        is_recurring: false,
    }
}

#[test]
fn slot_occupancy_and_cell_lookup() {
    assert_eq!(occupancy(&slot("a", "09:00", 6, 10)), Occupancy::Open);
    assert_eq!(occupancy(&slot("b", "09:00", 7, 10)), Occupancy::Busy);
    assert_eq!(occupancy(&slot("c", "09:00", 10, 10)), Occupancy::Full);
    assert_eq!(occupancy(&slot("d", "09:00", 0, 0)), Occupancy::Full);

    let slots = vec![
        slot("a", "09:00", 0, 4),
        slot("b", "10:00", 0, 4),
        slot("c", "09:00", 1, 4),
    ];
    let key = CellKey::new(date(2026, 10, 12), 9).expect("key");
    let ids: Vec<&str> = slots_for_cell(&key, &slots)
        .into_iter()
        .map(|slot| slot.id.as_str())
        .collect();
    assert_eq!(ids, vec!["a", "c"]);
}
