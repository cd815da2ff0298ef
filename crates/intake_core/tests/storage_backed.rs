use std::sync::Arc;

use chrono::NaiveDate;
use intake_core::{
    availability::{AvailabilityGrid, CellKey},
    config::Settings,
    fields::*,
    notice::NoticeQueue,
    FixedClock, NavigationOutcome, RegistrationSession, SubmitError,
};
use shared::{domain::ProviderId, error::ErrorCode};
use storage::Storage;

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 17).expect("date")
}

fn session(storage: &Storage) -> RegistrationSession {
    RegistrationSession::patient(
        &Settings::default(),
        Arc::new(storage.clone()),
        NoticeQueue::default(),
        Arc::new(FixedClock(today())),
    )
    .expect("session")
}

fn fill(session: &mut RegistrationSession, email: &str) {
    let values = [
        (FIRST_NAME, "Grace"),
        (LAST_NAME, "Hopper"),
        (EMAIL, email),
        (PHONE_NUMBER, "555-867-5309"),
        (DATE_OF_BIRTH, "1986-12-09"),
        (PASSWORD, "Cobol1959!"),
        (CONFIRM_PASSWORD, "Cobol1959!"),
        (STREET, "1 Navy Way"),
        (CITY, "Arlington"),
        (STATE, "VA"),
        (ZIP, "22202-4101"),
    ];
    for (field, value) in values {
        session.set_value(field, value);
    }
    assert_eq!(session.next(), NavigationOutcome::Moved { from: 0, to: 1 });
    assert_eq!(session.next(), NavigationOutcome::Moved { from: 1, to: 2 });
}

#[tokio::test]
async fn registrations_land_in_sqlite_once_per_email() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");

    let mut first = session(&storage);
    fill(&mut first, "grace@example.com");
    let receipt = first.submit().await.expect("stored");

    let stored = storage
        .registration_by_email("grace@example.com")
        .await
        .expect("lookup")
        .expect("row");
    assert_eq!(stored.registration_id, receipt.registration_id);
    assert_eq!(stored.record.text(CITY), Some("Arlington"));
    assert_eq!(stored.record.text(PASSWORD), Some("Cobol1959!"));

    let mut second = session(&storage);
    fill(&mut second, "GRACE@example.com");
    let err = second.submit().await.expect_err("duplicate");
    let SubmitError::Rejected { source, .. } = err else {
        panic!("expected a rejection");
    };
    assert_eq!(source.code, ErrorCode::Conflict);
    assert_eq!(
        second.submission_error(),
        Some("Registration failed. Please try again.")
    );
    assert_eq!(storage.count_registrations().await.expect("count"), 1);
}

#[tokio::test]
async fn availability_grid_persists_through_storage() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let provider = ProviderId::new("dr-grace");
    let monday_nine = CellKey::new(NaiveDate::from_ymd_opt(2026, 10, 12).expect("date"), 9)
        .expect("cell");
    let monday_ten = CellKey::new(NaiveDate::from_ymd_opt(2026, 10, 12).expect("date"), 10)
        .expect("cell");

    let mut grid = AvailabilityGrid::new(today());
    grid.begin_drag(monday_nine);
    grid.drag_over(monday_ten);
    grid.end_drag();
    grid.save(&storage, &provider).await.expect("save");

    assert_eq!(
        storage.get_availability(&provider).await.expect("get"),
        Some(vec![
            "2026-10-12_09:00".to_string(),
            "2026-10-12_10:00".to_string()
        ])
    );

    let mut reloaded = AvailabilityGrid::new(today());
    reloaded.load(&storage, &provider).await.expect("load");
    assert!(reloaded.is_selected(&monday_nine));
    assert!(reloaded.is_selected(&monday_ten));
    assert!(!reloaded.has_pending_changes());
}
