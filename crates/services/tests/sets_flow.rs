use hsc_core::analytics::MasteryThreshold;
use hsc_core::model::{CardFilter, UserId};
use hsc_core::study::StudyError;
use hsc_core::time::fixed_now;
use services::{AppServices, Clock, Config, ErrorKind, SetServiceError, StudyServiceError};
use storage::repository::Storage;
use storage::seed::seed_demo_content;

async fn seeded() -> AppServices {
    let storage = Storage::in_memory();
    seed_demo_content(&storage, fixed_now()).await.unwrap();
    let config = Config {
        database_url: String::new(),
        ai: None,
        mastery: MasteryThreshold::default(),
    };
    AppServices::from_storage(storage, &config, Clock::fixed(fixed_now()))
}

#[tokio::test]
async fn only_the_owner_can_change_a_set() {
    let app = seeded().await;
    let sets = app.sets();
    let owner = UserId::random();
    let stranger = UserId::random();
    let card = app.catalog().list_cards(&CardFilter::default()).await.unwrap()[0].id();

    let set = sets.create_set(owner, "Revision", None).await.unwrap();
    let err = sets.add_card(stranger, set.id(), card).await.unwrap_err();
    assert!(matches!(err, SetServiceError::NotOwner { .. }));
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(sets.delete_set(stranger, set.id()).await.is_err());
    assert!(sets.list_sets(stranger).await.unwrap().is_empty());

    let err = app
        .study()
        .start_from_set(stranger, set.id())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StudyServiceError::Set(SetServiceError::NotOwner { .. })
    ));
}

#[tokio::test]
async fn membership_changes_are_idempotent() {
    let app = seeded().await;
    let sets = app.sets();
    let owner = UserId::random();
    let cards = app.catalog().list_cards(&CardFilter::default()).await.unwrap();

    let set = sets
        .create_set(owner, "Quotes to drill", Some("weak spots"))
        .await
        .unwrap();
    let first = sets.add_card(owner, set.id(), cards[0].id()).await.unwrap();
    let again = sets.add_card(owner, set.id(), cards[0].id()).await.unwrap();
    assert_eq!(first, again);
    sets.add_card(owner, set.id(), cards[1].id()).await.unwrap();
    assert_eq!(sets.count_cards(set.id()).await.unwrap(), 2);

    // Removing a card that was never added is a no-op.
    sets.remove_card(owner, set.id(), cards[5].id()).await.unwrap();
    sets.remove_card(owner, set.id(), cards[0].id()).await.unwrap();
    let members = sets.list_cards_in_set(set.id()).await.unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].id(), cards[1].id());

    let listed = sets.list_sets(owner).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].card_count, 1);
}

#[tokio::test]
async fn blank_set_name_is_rejected() {
    let app = seeded().await;
    let err = app
        .sets()
        .create_set(UserId::random(), "   ", None)
        .await
        .unwrap_err();
    assert!(matches!(err, SetServiceError::Set(_)));
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn set_session_skips_hidden_members() {
    let app = seeded().await;
    let sets = app.sets();
    let owner = UserId::random();
    let cards = app.catalog().list_cards(&CardFilter::default()).await.unwrap();

    let set = sets.create_set(owner, "Mixed", None).await.unwrap();
    for card in cards.iter().take(3) {
        sets.add_card(owner, set.id(), card.id()).await.unwrap();
    }
    app.catalog()
        .bulk_archive(&[cards[1].id()], true)
        .await
        .unwrap();

    let session = app.study().start_from_set(owner, set.id()).await.unwrap();
    assert_eq!(session.len(), 2);
    assert_eq!(session.card_ids(), vec![cards[0].id(), cards[2].id()]);

    app.catalog()
        .bulk_toggle_active(&[cards[0].id(), cards[2].id()], false)
        .await
        .unwrap();
    let err = app
        .study()
        .start_from_set(owner, set.id())
        .await
        .unwrap_err();
    assert!(matches!(err, StudyServiceError::Study(StudyError::EmptySession)));
}

#[tokio::test]
async fn deleting_a_card_drops_its_membership() {
    let app = seeded().await;
    let sets = app.sets();
    let owner = UserId::random();
    let cards = app.catalog().list_cards(&CardFilter::default()).await.unwrap();

    let set = sets.create_set(owner, "Short", None).await.unwrap();
    sets.add_card(owner, set.id(), cards[0].id()).await.unwrap();
    sets.add_card(owner, set.id(), cards[1].id()).await.unwrap();
    app.catalog().bulk_delete(&[cards[0].id()]).await.unwrap();

    assert_eq!(sets.count_cards(set.id()).await.unwrap(), 1);
    sets.delete_set(owner, set.id()).await.unwrap();
    assert!(sets.list_sets(owner).await.unwrap().is_empty());
}
