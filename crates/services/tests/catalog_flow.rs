use std::collections::BTreeSet;

use hsc_core::analytics::MasteryThreshold;
use hsc_core::generator::RedactionPolicy;
use hsc_core::model::{Book, CardFilter, Theme, UserId};
use hsc_core::time::fixed_now;
use services::{AppServices, CatalogError, Clock, Config, ErrorKind};
use storage::repository::{NewQuoteRecord, Storage};
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

async fn book(app: &AppServices, title: &str) -> Book {
    let books = app.catalog().list_books().await.unwrap();
    books.into_iter().find(|b| b.title == title).unwrap()
}

async fn theme(app: &AppServices, name: &str) -> Theme {
    let themes = app.catalog().list_themes().await.unwrap();
    themes.into_iter().find(|t| t.name().as_str() == name).unwrap()
}

#[tokio::test]
async fn filter_by_book_and_themes_is_conjunctive() {
    let app = seeded().await;
    let catalog = app.catalog();
    let orwell = book(&app, "1984").await;
    let power = theme(&app, "Power").await;
    let truth = theme(&app, "Truth").await;

    let all = catalog.list_cards(&CardFilter::default()).await.unwrap();
    assert_eq!(all.len(), 8);

    let filter = CardFilter::default()
        .book(orwell.id)
        .themes([power.id(), truth.id()]);
    let hits = catalog.list_cards(&filter).await.unwrap();
    assert_eq!(hits.len(), 3);

    // Every hit satisfies both dimensions, and nothing that does is missing.
    let listings = app.storage().cards.list_listings().await.unwrap();
    let mut expected: Vec<_> = listings
        .iter()
        .filter(|l| l.book_id == orwell.id)
        .filter(|l| {
            l.card.theme_ids().contains(&power.id()) || l.card.theme_ids().contains(&truth.id())
        })
        .map(|l| l.card.id())
        .collect();
    expected.sort();
    let mut found: Vec<_> = hits.iter().map(|c| c.id()).collect();
    found.sort();
    assert_eq!(found, expected);
}

#[tokio::test]
async fn empty_selection_is_rejected_without_writes() {
    let app = seeded().await;
    let catalog = app.catalog();

    let err = catalog.bulk_delete(&[]).await.unwrap_err();
    assert!(matches!(err, CatalogError::EmptySelection));
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(catalog.bulk_toggle_active(&[], false).await.is_err());
    assert_eq!(
        catalog.list_cards(&CardFilter::default()).await.unwrap().len(),
        8
    );
}

#[tokio::test]
async fn theme_update_replaces_the_whole_set() {
    let app = seeded().await;
    let catalog = app.catalog();
    let ambition = theme(&app, "Ambition").await;

    let cards = catalog.list_cards(&CardFilter::default()).await.unwrap();
    let ids: Vec<_> = cards.iter().take(2).map(|c| c.id()).collect();
    let replacement: BTreeSet<_> = [ambition.id()].into_iter().collect();
    catalog.bulk_update_themes(&ids, &replacement).await.unwrap();

    for id in &ids {
        let card = catalog.get_card(*id).await.unwrap();
        assert_eq!(card.theme_ids(), &replacement);
    }
    let untouched = catalog.get_card(cards[2].id()).await.unwrap();
    assert_eq!(untouched.theme_ids(), cards[2].theme_ids());
}

#[tokio::test]
async fn archive_and_active_are_independent() {
    let app = seeded().await;
    let catalog = app.catalog();
    let cards = catalog.list_cards(&CardFilter::default()).await.unwrap();
    let first = cards[0].id();

    catalog.bulk_archive(&[first], true).await.unwrap();
    catalog.bulk_archive(&[first], true).await.unwrap();
    let card = catalog.get_card(first).await.unwrap();
    assert!(card.is_archived());
    assert!(card.is_active());

    let mut with_archived = CardFilter::default();
    with_archived.include_archived = true;
    assert_eq!(catalog.list_cards(&with_archived).await.unwrap().len(), 8);
    assert_eq!(
        catalog.list_cards(&CardFilter::default()).await.unwrap().len(),
        7
    );
}

#[tokio::test]
async fn regenerate_resets_lineage() {
    let app = seeded().await;
    let catalog = app.catalog();
    let progress = app.progress();
    let user = UserId::random();

    let cards = catalog.list_cards(&CardFilter::default()).await.unwrap();
    let old = cards[0].clone();
    progress
        .record_attempt(user, old.id(), true, Some(2_500))
        .await
        .unwrap();

    let fresh = catalog
        .bulk_regenerate(&[old.id()], &RedactionPolicy::with_blanks(2).unwrap())
        .await
        .unwrap();
    assert_eq!(fresh.len(), 1);
    let new = &fresh[0];
    assert_ne!(new.id(), old.id());
    assert_eq!(new.quote_id(), old.quote_id());
    assert_eq!(new.missing_words().len(), 2);
    assert_eq!(new.theme_ids(), old.theme_ids());

    assert!(catalog.get_card(old.id()).await.is_err());
    assert!(
        app.storage()
            .progress
            .get_progress(user, old.id())
            .await
            .unwrap()
            .is_none()
    );
    assert_eq!(progress.user_progress(user).await.unwrap().total_attempts, 0);
}

#[tokio::test]
async fn failed_regeneration_leaves_catalog_untouched() {
    let app = seeded().await;
    let catalog = app.catalog();
    let before = catalog.list_cards(&CardFilter::default()).await.unwrap();
    let ids: Vec<_> = before.iter().map(|c| c.id()).collect();

    // "Big Brother is watching you." cannot carry five blanks.
    let err = catalog
        .bulk_regenerate(&ids, &RedactionPolicy::with_blanks(5).unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::Regeneration { .. }));
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let after = catalog.list_cards(&CardFilter::default()).await.unwrap();
    assert_eq!(after, before);
}

#[tokio::test]
async fn book_generation_reports_unusable_quotes() {
    let app = seeded().await;
    let macbeth = book(&app, "Macbeth").await;
    app.storage()
        .quotes
        .insert_quote(NewQuoteRecord::new(macbeth.id, "Fragment", "So it is."))
        .await
        .unwrap();

    let run = app
        .catalog()
        .generate_for_book(macbeth.id, &RedactionPolicy::default())
        .await
        .unwrap();
    assert_eq!(run.book.title, "Macbeth");
    assert_eq!(run.generated.len(), 4);
    assert_eq!(run.failures.len(), 1);
    assert_eq!(run.failures[0].quote_title, "Fragment");

    let macbeth_cards = app
        .catalog()
        .list_cards(&CardFilter::default().book(macbeth.id))
        .await
        .unwrap();
    assert_eq!(macbeth_cards.len(), 8);
}
