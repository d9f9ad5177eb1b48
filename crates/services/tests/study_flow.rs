use chrono::Duration;
use hsc_core::analytics::MasteryThreshold;
use hsc_core::model::{CardFilter, UserId};
use hsc_core::study::{Advance, StudyError, StudyPhase};
use hsc_core::time::fixed_now;
use services::{
    AppServices, Clock, Config, ErrorKind, Restore, StudyNavigator, StudyServiceError, UndoStack,
};
use storage::repository::Storage;
use storage::seed::seed_demo_content;

fn config() -> Config {
    Config {
        database_url: String::new(),
        ai: None,
        mastery: MasteryThreshold::default(),
    }
}

async fn seeded() -> AppServices {
    let storage = Storage::in_memory();
    seed_demo_content(&storage, fixed_now()).await.unwrap();
    AppServices::from_storage(storage, &config(), Clock::fixed(fixed_now()))
}

#[tokio::test]
async fn second_check_on_an_answered_card_records_nothing() {
    let app = seeded().await;
    let study = app.study();
    let user = UserId::random();

    let mut session = study
        .start_from_filter(&CardFilter::default())
        .await
        .unwrap();
    let expected = session.current().card.expected_answer();
    session.set_input(expected.clone()).unwrap();

    let outcome = study.check_answer(user, &mut session).await.unwrap();
    assert!(outcome.is_correct);
    assert_eq!(outcome.expected, expected);
    assert_eq!(outcome.progress.attempts(), 1);

    let err = study.check_answer(user, &mut session).await.unwrap_err();
    assert!(matches!(
        err,
        StudyServiceError::Study(StudyError::AlreadyAnswered { index: 0 })
    ));
    assert_eq!(err.kind(), ErrorKind::Validation);

    let attempts = app
        .storage()
        .progress
        .attempts_for_user(user, None)
        .await
        .unwrap();
    assert_eq!(attempts.len(), 1);
}

#[tokio::test]
async fn failed_write_keeps_the_card_open() {
    let app = seeded().await;
    let study = app.study();
    let user = UserId::random();

    let mut session = study
        .start_from_filter(&CardFilter::default())
        .await
        .unwrap();
    session.set_input("Ignorance").unwrap();
    let card_id = session.current().card.id();
    app.catalog().bulk_delete(&[card_id]).await.unwrap();

    let err = study.check_answer(user, &mut session).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(session.phase(), StudyPhase::Presenting);
    assert_eq!(session.current().input, "Ignorance");
    assert!(!session.is_check_in_flight());
    assert!(session.current().result.is_none());
}

#[tokio::test]
async fn blank_answer_is_rejected_before_any_write() {
    let app = seeded().await;
    let study = app.study();
    let user = UserId::random();

    let mut session = study
        .start_from_filter(&CardFilter::default())
        .await
        .unwrap();
    session.set_input("   ").unwrap();
    let err = study.check_answer(user, &mut session).await.unwrap_err();
    assert!(matches!(err, StudyServiceError::Study(StudyError::EmptyAnswer)));
    assert!(
        app.storage()
            .progress
            .attempts_for_user(user, None)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn walking_every_card_completes_with_a_tally() {
    let app = seeded().await;
    let study = app.study();
    let user = UserId::random();

    let mut session = study
        .start_from_filter(&CardFilter::default())
        .await
        .unwrap();
    let total = session.len();
    assert_eq!(total, 8);

    let mut completed = None;
    for index in 0..total {
        // Every other card gets a wrong answer.
        let answer = if index % 2 == 0 {
            session.current().card.expected_answer()
        } else {
            "nonsense".to_owned()
        };
        session.set_input(answer).unwrap();
        let outcome = study.check_answer(user, &mut session).await.unwrap();
        assert_eq!(outcome.is_correct, index % 2 == 0);

        match study.next(&mut session).unwrap().0 {
            Advance::Moved { index: moved } => assert_eq!(moved, index + 1),
            Advance::Complete(tally) => completed = Some(tally),
        }
    }

    let tally = completed.unwrap();
    assert_eq!(tally.correct, 4);
    assert_eq!(tally.answered, 8);
    assert_eq!(tally.total, 8);
    assert_eq!(session.phase(), StudyPhase::Complete);
    assert!(study.next(&mut session).is_err());

    let summary = app.progress().user_progress(user).await.unwrap();
    assert_eq!(summary.total_attempts, 8);
    assert_eq!(summary.correct_attempts, 4);
    assert_eq!(summary.cards_studied, 8);
    assert_eq!(summary.current_streak_days, 1);

    let per_book = app.progress().flashcard_progress(user).await.unwrap();
    assert_eq!(per_book.len(), 2);
    assert!(per_book.iter().all(|book| book.total_flashcards == 4));
    assert!(per_book.iter().all(|book| book.mastered_flashcards == 0));
}

#[tokio::test]
async fn ending_a_session_stops_further_checks() {
    let app = seeded().await;
    let study = app.study();
    let user = UserId::random();

    let mut session = study
        .start_from_filter(&CardFilter::default())
        .await
        .unwrap();
    session.set_input("Ignorance").unwrap();
    study.check_answer(user, &mut session).await.unwrap();

    let tally = study.end_session(&mut session);
    assert_eq!(tally.answered, 1);
    assert_eq!(session.phase(), StudyPhase::Ended);
    assert!(study.next(&mut session).is_err());
    assert!(study.previous(&mut session).is_err());
}

#[tokio::test]
async fn due_session_picks_up_scheduled_cards() {
    let storage = Storage::in_memory();
    seed_demo_content(&storage, fixed_now()).await.unwrap();
    let today = AppServices::from_storage(storage.clone(), &config(), Clock::fixed(fixed_now()));
    let user = UserId::random();

    let err = today.study().start_due(user, 10).await.unwrap_err();
    assert!(matches!(err, StudyServiceError::Study(StudyError::EmptySession)));

    let cards = today
        .catalog()
        .list_cards(&CardFilter::default())
        .await
        .unwrap();
    for card in cards.iter().take(3) {
        today
            .progress()
            .record_attempt(user, card.id(), false, None)
            .await
            .unwrap();
    }

    let later = fixed_now() + Duration::days(2);
    let tomorrow = AppServices::from_storage(storage, &config(), Clock::fixed(later));
    let session = tomorrow.study().start_due(user, 10).await.unwrap();
    assert_eq!(session.len(), 3);

    let limited = tomorrow.study().start_due(user, 2).await.unwrap();
    assert_eq!(limited.len(), 2);
}

#[tokio::test]
async fn navigator_back_after_a_check_does_not_record_twice() {
    let app = seeded().await;
    let study = app.study();
    let user = UserId::random();

    let session = study
        .start_from_filter(&CardFilter::default())
        .await
        .unwrap();
    let mut nav = StudyNavigator::new(session, UndoStack::new());

    let action = nav.session_mut().set_input("Ignorance").unwrap();
    nav.record(action);
    let outcome = study.check_answer(user, nav.session_mut()).await.unwrap();
    nav.record(outcome.action);
    let (_, action) = study.next(nav.session_mut()).unwrap();
    nav.record(action);

    // Back to the entry taken before the check.
    assert_eq!(nav.back(fixed_now()), Restore::Snapshot);
    assert_eq!(nav.back(fixed_now()), Restore::Snapshot);
    assert_eq!(nav.session().cursor(), 0);
    assert_eq!(nav.session().phase(), StudyPhase::Answered);
    assert!(study.check_answer(user, nav.session_mut()).await.is_err());

    let attempts = app
        .storage()
        .progress
        .attempts_for_user(user, None)
        .await
        .unwrap();
    assert_eq!(attempts.len(), 1);
}

#[tokio::test]
async fn hidden_cards_do_not_use_up_the_due_limit() {
    let storage = Storage::in_memory();
    seed_demo_content(&storage, fixed_now()).await.unwrap();
    let today = AppServices::from_storage(storage.clone(), &config(), Clock::fixed(fixed_now()));
    let user = UserId::random();

    let cards = today
        .catalog()
        .list_cards(&CardFilter::default())
        .await
        .unwrap();
    for card in cards.iter().take(3) {
        today
            .progress()
            .record_attempt(user, card.id(), false, None)
            .await
            .unwrap();
    }
    // The earliest due card is hidden.
    today
        .catalog()
        .bulk_toggle_active(&[cards[0].id()], false)
        .await
        .unwrap();

    let later = fixed_now() + Duration::days(2);
    let tomorrow = AppServices::from_storage(storage, &config(), Clock::fixed(later));
    let session = tomorrow.study().start_due(user, 1).await.unwrap();
    assert_eq!(session.card_ids(), vec![cards[1].id()]);

    let due = tomorrow.progress().due_cards(user, 10).await.unwrap();
    assert_eq!(due.len(), 2);
    assert!(due.iter().all(|card| card.id() != cards[0].id()));
}
