use std::collections::BTreeSet;

use chrono::Duration;
use hsc_core::model::{CardFilter, SetName, ThemeColor, ThemeName, UserId};
use hsc_core::scheduler::Scheduler;
use hsc_core::time::fixed_now;
use storage::repository::{Storage, StorageError};
use storage::seed::seed_demo_content;

async fn seeded(name: &str) -> Storage {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let storage = Storage::sqlite(&url).await.expect("connect");
    seed_demo_content(&storage, fixed_now()).await.expect("seed");
    storage
}

#[tokio::test]
async fn sqlite_filters_and_hides_cards() {
    let storage = seeded("memdb_filters").await;

    let books = storage.quotes.list_books().await.unwrap();
    assert_eq!(books.len(), 2);
    let orwell = books.iter().find(|b| b.title == "1984").unwrap();

    let by_book = storage
        .cards
        .list_cards(&CardFilter::default().book(orwell.id))
        .await
        .unwrap();
    assert_eq!(by_book.len(), 4);

    let searched = storage
        .cards
        .list_cards(&CardFilter::default().search("big brother"))
        .await
        .unwrap();
    assert_eq!(searched.len(), 1);

    let themes = storage.themes.list_themes().await.unwrap();
    let power = themes.iter().find(|t| t.name().as_str() == "Power").unwrap();
    let themed = storage
        .cards
        .list_cards(&CardFilter::default().themes([power.id()]))
        .await
        .unwrap();
    assert_eq!(themed.len(), 3);

    let hidden = [by_book[0].id()];
    storage
        .cards
        .set_active(&hidden, false, fixed_now() + Duration::hours(1))
        .await
        .unwrap();
    let visible = storage.cards.list_cards(&CardFilter::default()).await.unwrap();
    assert_eq!(visible.len(), 7);
    let all = storage
        .cards
        .list_cards(&CardFilter::default().everything())
        .await
        .unwrap();
    assert_eq!(all.len(), 8);

    let card = storage.cards.get_card(hidden[0]).await.unwrap();
    assert!(!card.is_active());
    assert_eq!(card.updated_at(), fixed_now() + Duration::hours(1));
}

#[tokio::test]
async fn sqlite_records_attempts_and_cascades_on_delete() {
    let storage = seeded("memdb_attempts").await;
    let user = UserId::random();
    let cards = storage.cards.list_cards(&CardFilter::default()).await.unwrap();
    let card = cards[0].id();

    let scheduler = Scheduler::default();
    let first = scheduler
        .apply_attempt(user, card, None, true, fixed_now(), Some(4_000))
        .unwrap();
    storage
        .progress
        .record_attempt(&first.progress, &first.attempt)
        .await
        .unwrap();

    let later = fixed_now() + Duration::days(1);
    let second = scheduler
        .apply_attempt(user, card, Some(&first.progress), false, later, None)
        .unwrap();
    storage
        .progress
        .record_attempt(&second.progress, &second.attempt)
        .await
        .unwrap();

    let row = storage.progress.get_progress(user, card).await.unwrap().unwrap();
    assert_eq!(row.attempts(), 2);
    assert_eq!(row.correct_attempts(), 1);
    assert_eq!(row.interval_days(), 1);

    let due = storage
        .progress
        .due_progress(user, later + Duration::days(1), 10)
        .await
        .unwrap();
    assert_eq!(due.len(), 1);

    let attempts = storage.progress.attempts_for_user(user, None).await.unwrap();
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[0].response_time_ms, Some(4_000));
    let recent = storage
        .progress
        .attempts_for_user(user, Some(later))
        .await
        .unwrap();
    assert_eq!(recent.len(), 1);

    storage.cards.delete_cards(&[card]).await.unwrap();
    assert!(storage.progress.get_progress(user, card).await.unwrap().is_none());
    assert!(storage.progress.attempts_for_user(user, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn sqlite_set_membership_is_idempotent() {
    let storage = seeded("memdb_sets").await;
    let owner = UserId::random();
    let cards = storage.cards.list_cards(&CardFilter::default()).await.unwrap();

    let name = SetName::new("Exam week").unwrap();
    let set = storage
        .sets
        .create_set(owner, &name, Some("  "), fixed_now())
        .await
        .unwrap();
    assert_eq!(set.description(), None);

    let first = storage
        .sets
        .add_card(set.id(), cards[0].id(), fixed_now() + Duration::minutes(1))
        .await
        .unwrap();
    let again = storage
        .sets
        .add_card(set.id(), cards[0].id(), fixed_now() + Duration::minutes(5))
        .await
        .unwrap();
    assert_eq!(first.added_at, again.added_at);
    storage
        .sets
        .add_card(set.id(), cards[1].id(), fixed_now() + Duration::minutes(2))
        .await
        .unwrap();
    assert_eq!(storage.sets.count_cards(set.id()).await.unwrap(), 2);

    storage
        .sets
        .remove_card(set.id(), cards[5].id(), fixed_now())
        .await
        .unwrap();
    let members = storage.sets.list_cards_in_set(set.id()).await.unwrap();
    assert_eq!(
        members.iter().map(|c| c.id()).collect::<Vec<_>>(),
        vec![cards[0].id(), cards[1].id()]
    );

    let summaries = storage.sets.list_sets(owner).await.unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].card_count, 2);
    assert_eq!(
        summaries[0].set.updated_at(),
        fixed_now() + Duration::minutes(2)
    );

    storage.sets.delete_set(set.id()).await.unwrap();
    assert!(matches!(
        storage.sets.count_cards(set.id()).await,
        Err(StorageError::NotFound)
    ));
}

#[tokio::test]
async fn sqlite_theme_rules() {
    let storage = seeded("memdb_themes").await;
    let duplicate = storage
        .themes
        .insert_theme(
            &ThemeName::new("Power").unwrap(),
            &ThemeColor::new("#000000").unwrap(),
        )
        .await;
    assert!(matches!(duplicate, Err(StorageError::Conflict)));

    let cards = storage.cards.list_cards(&CardFilter::default()).await.unwrap();
    let ids: Vec<_> = cards.iter().take(2).map(|c| c.id()).collect();

    // A missing theme aborts the whole retag.
    let bogus: BTreeSet<_> = [hsc_core::model::ThemeId::new(9_999)].into_iter().collect();
    let err = storage
        .cards
        .replace_themes(&ids, &bogus, fixed_now())
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound));
    let unchanged = storage.cards.get_card(ids[0]).await.unwrap();
    assert_eq!(unchanged.theme_ids(), cards[0].theme_ids());

    let themes = storage.themes.list_themes().await.unwrap();
    let truth = themes.iter().find(|t| t.name().as_str() == "Truth").unwrap();
    storage.themes.delete_theme(truth.id()).await.unwrap();
    let remaining = storage
        .cards
        .list_cards(&CardFilter::default().everything())
        .await
        .unwrap();
    assert!(remaining.iter().all(|c| !c.theme_ids().contains(&truth.id())));
}

#[tokio::test]
async fn sqlite_due_limit_skips_hidden_cards() {
    let storage = seeded("memdb_due_hidden").await;
    let user = UserId::random();
    let cards = storage.cards.list_cards(&CardFilter::default()).await.unwrap();

    let scheduler = Scheduler::default();
    for (offset, card) in cards.iter().take(3).enumerate() {
        let at = fixed_now() + Duration::minutes(i64::try_from(offset).unwrap());
        let applied = scheduler
            .apply_attempt(user, card.id(), None, false, at, None)
            .unwrap();
        storage
            .progress
            .record_attempt(&applied.progress, &applied.attempt)
            .await
            .unwrap();
    }
    storage
        .cards
        .set_archived(&[cards[0].id()], true, fixed_now())
        .await
        .unwrap();

    let later = fixed_now() + Duration::days(2);
    let due = storage.progress.due_progress(user, later, 1).await.unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].card_id(), cards[1].id());
    assert_eq!(
        storage.progress.due_progress(user, later, 10).await.unwrap().len(),
        2
    );
}
