use std::{sync::Arc, time::Duration};

use shared::error::ApiError;

use super::fixtures::{address_values, personal_values, required_values, session};
use super::*;
use crate::{
    debounce::Debouncer,
    fields::*,
    notice::NoticeVariant,
    submit::{MockRegistrationApi, GENERIC_FAILURE_MESSAGE},
};

fn fill(session: &mut RegistrationSession, values: Vec<(&'static str, shared::domain::FieldValue)>) {
    for (field, value) in values {
        session.set_value(field, value);
    }
}

fn advance_to_last(session: &mut RegistrationSession) {
    assert_eq!(session.next(), NavigationOutcome::Moved { from: 0, to: 1 });
    assert_eq!(session.next(), NavigationOutcome::Moved { from: 1, to: 2 });
}

#[tokio::test]
async fn valid_registration_is_submitted_once() {
    let api = Arc::new(MockRegistrationApi::default());
    let (mut session, notices) = session(api.clone());
    fill(&mut session, required_values());
    advance_to_last(&mut session);

    let receipt = session.submit().await.expect("submitted");
    assert_eq!(api.call_count(), 1);
    assert!(session.is_submitted());
    assert_eq!(session.receipt(), Some(&receipt));
    assert!(session.engine().values().is_empty());
    assert_eq!(session.submission_error(), None);

    let received = api.received().await;
    assert_eq!(received[0].email(), Some("ada@example.com"));
    assert_eq!(received[0].record.get(EMERGENCY_NAME), None);

    let active = notices.active();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].variant, NoticeVariant::Success);
}

#[tokio::test]
async fn next_is_blocked_by_an_invalid_step() {
    let api = Arc::new(MockRegistrationApi::default());
    let (mut session, _notices) = session(api);
    fill(&mut session, personal_values());
    advance_once(&mut session);

    session.set_value(STREET, "1 Main St");
    session.set_value(STATE, "IL");
    session.set_value(ZIP, "62704");

    assert_eq!(
        session.next(),
        NavigationOutcome::Blocked {
            step: 1,
            invalid_fields: vec![CITY.to_string()],
        }
    );
    assert_eq!(session.steps().current_index(), 1);
    assert!(session.engine().is_touched(CITY));
    assert_eq!(session.visible_error(CITY), Some("City is required"));
    assert_eq!(session.visible_error(STREET), None);
}

fn advance_once(session: &mut RegistrationSession) {
    assert_eq!(session.next(), NavigationOutcome::Moved { from: 0, to: 1 });
}

#[tokio::test]
async fn blocked_first_step_touches_every_field() {
    let (mut session, _notices) = session(Arc::new(MockRegistrationApi::default()));
    let NavigationOutcome::Blocked { invalid_fields, .. } = session.next() else {
        panic!("expected a blocked step");
    };
    assert!(invalid_fields.contains(&FIRST_NAME.to_string()));
    assert!(!invalid_fields.contains(&GENDER.to_string()));
    for field in &session.steps().current_step().fields {
        assert!(session.engine().is_touched(field), "{field} not touched");
    }
}

#[tokio::test]
async fn step_selection_is_gated_on_completion() {
    let (mut session, _notices) = session(Arc::new(MockRegistrationApi::default()));
    assert_eq!(session.select_step(2), NavigationOutcome::Unchanged);
    assert_eq!(session.select_step(1), NavigationOutcome::Unchanged);

    fill(&mut session, personal_values());
    advance_once(&mut session);
    assert_eq!(session.select_step(2), NavigationOutcome::Unchanged);
    assert_eq!(session.select_step(0), NavigationOutcome::Moved { from: 1, to: 0 });
    assert_eq!(session.select_step(1), NavigationOutcome::Moved { from: 0, to: 1 });
    assert_eq!(session.prev(), NavigationOutcome::Moved { from: 1, to: 0 });
    assert_eq!(session.prev(), NavigationOutcome::Unchanged);
}

#[tokio::test]
async fn submit_is_only_offered_on_the_last_step() {
    let api = Arc::new(MockRegistrationApi::default());
    let (mut session, _notices) = session(api.clone());
    fill(&mut session, required_values());

    assert!(matches!(
        session.submit().await,
        Err(SubmitError::NotAtFinalStep)
    ));
    assert_eq!(api.call_count(), 0);
}

#[tokio::test]
async fn rejection_surfaces_generic_message_and_allows_retry() {
    let api = Arc::new(MockRegistrationApi::default());
    api.fail_with(Some(ApiError::unavailable("backend down")));
    let (mut session, notices) = session(api.clone());
    fill(&mut session, required_values());
    advance_to_last(&mut session);

    let err = session.submit().await.expect_err("rejected");
    assert!(matches!(err, SubmitError::Rejected { .. }));
    assert_eq!(session.submission_error(), Some(GENERIC_FAILURE_MESSAGE));
    assert!(!session.is_submitted());
    assert!(!session.is_submitting());
    assert_eq!(session.engine().values().text(CITY), Some("Springfield"));
    assert_eq!(notices.active()[0].variant, NoticeVariant::Error);
    assert_eq!(api.call_count(), 1);

    api.fail_with(None);
    session.submit().await.expect("retry accepted");
    assert_eq!(api.call_count(), 2);
    assert_eq!(session.submission_error(), None);
}

#[tokio::test]
async fn duplicate_email_is_rejected_by_the_collaborator() {
    let api = Arc::new(MockRegistrationApi::default());
    let (mut first, _) = session(api.clone());
    fill(&mut first, required_values());
    advance_to_last(&mut first);
    first.submit().await.expect("first");

    let (mut second, _) = session(api.clone());
    fill(&mut second, required_values());
    advance_to_last(&mut second);
    let err = second.submit().await.expect_err("duplicate");
    let SubmitError::Rejected { source, .. } = err else {
        panic!("expected rejection");
    };
    assert_eq!(source.code, shared::error::ErrorCode::Conflict);
    assert_eq!(api.accepted().await, 1);
}

#[tokio::test(start_paused = true)]
async fn settle_applies_only_the_latest_debounced_pass() {
    let (mut session, _notices) = session(Arc::new(MockRegistrationApi::default()));
    session.set_value(EMAIL, "bad");
    session.set_value(EMAIL, "ada@example.com");

    assert!(session.settle().await);
    let errors = session.engine().errors();
    assert!(!errors.contains_key(EMAIL));
    assert!(errors.contains_key(FIRST_NAME));
    assert!(!session.engine().is_valid());

    assert!(!session.poll_validation());
    assert!(!session.settle().await);
}

#[tokio::test(start_paused = true)]
async fn debounced_pass_marks_a_complete_form_valid() {
    let (mut session, _notices) = session(Arc::new(MockRegistrationApi::default()));
    fill(&mut session, required_values());
    assert!(!session.engine().is_valid());

    tokio::time::sleep(Duration::from_millis(301)).await;
    assert!(session.poll_validation());
    assert!(session.engine().is_valid());
}

#[tokio::test(start_paused = true)]
async fn debouncer_restarts_the_quiet_period() {
    let mut debouncer = Debouncer::new(Duration::from_millis(300));
    debouncer.schedule(ValidationTicket(1));
    debouncer.schedule(ValidationTicket(2));
    assert!(debouncer.is_scheduled());

    assert_eq!(debouncer.next_due().await, Some(ValidationTicket(2)));
    assert_eq!(debouncer.try_due(), None);
}

#[test]
fn debouncer_without_runtime_leaves_ticket_pending() {
    let mut debouncer = Debouncer::new(Duration::from_millis(300));
    debouncer.schedule(ValidationTicket(1));
    assert!(!debouncer.is_scheduled());
    assert_eq!(debouncer.try_due(), None);
}

#[test]
fn flush_validation_runs_without_waiting() {
    let (mut session, _notices) = session(Arc::new(MockRegistrationApi::default()));
    fill(&mut session, address_values());
    let errors = session.flush_validation().clone();
    assert!(errors.contains_key(EMAIL));
    assert!(!errors.contains_key(CITY));
    assert_eq!(session.engine().pending_ticket(), None);
}

#[test]
fn steps_must_reference_known_fields() {
    let rules = Arc::new(patient_rule_table(&RulesConfig::default()).expect("rules"));
    let steps = vec![Step::new("only", "Only", "", &[FIRST_NAME, "nickname"])];
    let result = RegistrationSession::new(
        rules,
        steps,
        Debouncer::new(Duration::from_millis(300)),
        Arc::new(MockRegistrationApi::default()),
        notice::NoticeQueue::default(),
        super::fixtures::clock(),
    );
    assert!(matches!(
        result,
        Err(DefinitionError::UnknownStepField { field, .. }) if field == "nickname"
    ));
}

#[tokio::test]
async fn reset_starts_over() {
    let (mut session, _notices) = session(Arc::new(MockRegistrationApi::default()));
    fill(&mut session, personal_values());
    advance_once(&mut session);
    session.reset();

    assert_eq!(session.steps().current_index(), 0);
    assert!(session.engine().values().is_empty());
    assert_eq!(session.progress().completion_percentage, 25);
}
