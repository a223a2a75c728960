use super::*;
use crate::model::seed::{sample_contents, sample_users};
use crate::store::MemoryStore;
use tokio_test::{assert_err, assert_ok};

async fn seeded() -> (Arc<MemoryStore>, CatalogService<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let service = CatalogService::new(Arc::clone(&store));
    service
        .seed_catalog(&sample_users().unwrap(), &sample_contents().unwrap())
        .await
        .unwrap();
    (store, service)
}

fn titles(contents: &[Content]) -> Vec<&str> {
    contents.iter().map(|c| c.title.as_str()).collect()
}

#[tokio::test]
async fn test_seed_reports_ids() {
    let store = Arc::new(MemoryStore::new());
    let service = CatalogService::new(Arc::clone(&store));

    let report = service
        .seed_catalog(&sample_users().unwrap(), &sample_contents().unwrap())
        .await
        .unwrap();

    assert_eq!(report.user_ids.len(), 2);
    assert_eq!(report.content_ids.len(), 3);
    assert_eq!(store.count(DEFAULT_USERS_COLLECTION).await, 2);
    assert_eq!(store.count(DEFAULT_CONTENTS_COLLECTION).await, 3);
}

#[tokio::test]
async fn test_seed_with_empty_inputs() {
    let store = Arc::new(MemoryStore::new());
    let service = CatalogService::new(Arc::clone(&store));

    let report = service.seed_catalog(&[], &[]).await.unwrap();
    assert_eq!(report, SeedReport::default());
    assert_eq!(store.count(DEFAULT_CONTENTS_COLLECTION).await, 0);
}

#[tokio::test]
async fn test_find_long_content() {
    let (_, service) = seeded().await;

    let long = service.find_long_content(120).collect().await.unwrap();
    assert_eq!(titles(&long), ["Inception", "Interstellar"]);
    assert!(long.iter().all(|c| c.duration_minutes > 120));

    let none = service.find_long_content(169).collect().await.unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn test_find_recent_series() {
    let (_, service) = seeded().await;

    let recent = service.find_recent_series(2015).collect().await.unwrap();
    assert_eq!(titles(&recent), ["Dark"]);
    assert_eq!(recent[0].kind.seasons(), Some(3));

    let later = service.find_recent_series(2017).collect().await.unwrap();
    assert!(later.is_empty());
}

#[tokio::test]
async fn test_search_title_substring() {
    let (_, service) = seeded().await;

    let found = service.search_title_substring("in").collect().await.unwrap();
    assert_eq!(titles(&found), ["Inception", "Interstellar"]);

    let upper = service.search_title_substring("STELLAR").collect().await.unwrap();
    assert_eq!(titles(&upper), ["Interstellar"]);
}

#[tokio::test]
async fn test_search_text_is_literal() {
    let (_, service) = seeded().await;

    let found = service.search_title_substring("In.*").collect().await.unwrap();
    assert!(found.is_empty());
}

#[tokio::test]
async fn test_find_by_types() {
    let (_, service) = seeded().await;

    let movies = service
        .find_by_types(&[ContentType::Movie])
        .collect()
        .await
        .unwrap();
    assert_eq!(titles(&movies), ["Inception", "Interstellar"]);

    let both = service
        .find_by_types(&[ContentType::Movie, ContentType::Series])
        .collect()
        .await
        .unwrap();
    assert_eq!(both.len(), 3);

    let nothing = service.find_by_types(&[]).collect().await.unwrap();
    assert!(nothing.is_empty());
}

#[tokio::test]
async fn test_query_is_restartable() {
    let (_, service) = seeded().await;
    let query = service.find_long_content(120);

    assert_eq!(query.collect().await.unwrap().len(), 2);

    let extra = Content::movie("Oppenheimer", &["Drama"], 180, 2023, 4.6).unwrap();
    service.seed_catalog(&[], &[extra]).await.unwrap();

    let again = query.collect().await.unwrap();
    assert_eq!(titles(&again), ["Inception", "Interstellar", "Oppenheimer"]);
}

#[tokio::test]
async fn test_rate_content() {
    let (_, service) = seeded().await;

    let outcome = service.rate_content("Dark", 4.5).await.unwrap();
    assert_eq!(outcome, UpdateOutcome { matched: 1, modified: 1 });

    let dark = service.search_title_substring("dark").collect().await.unwrap();
    assert_eq!(dark[0].average_rating, 4.5);

    let unchanged = service.rate_content("Dark", 4.5).await.unwrap();
    assert_eq!(unchanged.modified, 0);
}

#[tokio::test]
async fn test_rate_inception_reread_by_exact_title() {
    let (store, service) = seeded().await;

    let outcome = service.rate_content("Inception", 4.9).await.unwrap();
    assert_eq!(outcome, UpdateOutcome { matched: 1, modified: 1 });

    let stored: Vec<Document> = store
        .find(
            DEFAULT_CONTENTS_COLLECTION,
            &query::eq(fields::TITLE, "Inception"),
        )
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);

    let inception = Content::from_document(stored[0].clone()).unwrap();
    assert_eq!(inception.average_rating, 4.9);
    assert_eq!(inception.duration_minutes, 148);
}

#[tokio::test]
async fn test_rate_missing_title_is_not_found() {
    let (store, service) = seeded().await;

    let err = service.rate_content("Tenet", 4.0).await.unwrap_err();
    assert!(matches!(err, CatalogError::NotFound(_)));

    // Never upserts.
    assert_eq!(store.count(DEFAULT_CONTENTS_COLLECTION).await, 3);

    // Title match is exact.
    let err = service.rate_content("dark", 4.0).await.unwrap_err();
    assert!(matches!(err, CatalogError::NotFound(_)));
}

#[tokio::test]
async fn test_rate_out_of_range() {
    let (_, service) = seeded().await;

    for rating in [-0.1, 5.1, f64::NAN] {
        let err = service.rate_content("Dark", rating).await.unwrap_err();
        assert!(matches!(err, CatalogError::Validation(_)));
    }
    assert_ok!(service.rate_content("Dark", 0.0).await);
    assert_ok!(service.rate_content("Dark", 5.0).await);
}

#[tokio::test]
async fn test_prune_old_content() {
    let (store, service) = seeded().await;

    assert_eq!(service.prune_old_content(2005).await.unwrap(), 0);
    assert_eq!(service.prune_old_content(2012).await.unwrap(), 1);
    assert_eq!(service.prune_old_content(2012).await.unwrap(), 0);

    let left = service
        .find_by_types(&[ContentType::Movie, ContentType::Series])
        .collect()
        .await
        .unwrap();
    assert_eq!(titles(&left), ["Dark", "Interstellar"]);
    assert_eq!(store.count(DEFAULT_CONTENTS_COLLECTION).await, 2);
}

#[tokio::test]
async fn test_ensure_indexes_is_idempotent() {
    let (_, service) = seeded().await;

    let first = service.ensure_indexes().await.unwrap();
    let second = service.ensure_indexes().await.unwrap();
    assert_eq!(first, ["titulo_1", "genero_1", "email_1"]);
    assert_eq!(first, second);

    let contents = service
        .list_indexes(DEFAULT_CONTENTS_COLLECTION)
        .await
        .unwrap();
    let names: Vec<&str> = contents.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, ["_id_", "titulo_1", "genero_1"]);

    let users = service.list_indexes(DEFAULT_USERS_COLLECTION).await.unwrap();
    let email = users.iter().find(|i| i.name == "email_1").unwrap();
    assert!(email.unique);
    assert_eq!(email.key_fields(), ["email"]);
}

#[tokio::test]
async fn test_duplicate_email_rejected() {
    let (store, service) = seeded().await;
    service.ensure_indexes().await.unwrap();

    let twin = User::new("Ana María", "ana@mail.com", 40, "Chile").unwrap();
    let err = service.seed_catalog(&[twin], &[]).await.unwrap_err();
    assert!(matches!(err, CatalogError::Validation(_)));

    let shouting = User::new("Ana", "  ANA@Mail.com ", 22, "Colombia").unwrap();
    assert_err!(service.seed_catalog(&[shouting], &[]).await);

    assert_eq!(store.count(DEFAULT_USERS_COLLECTION).await, 2);
}

#[tokio::test]
async fn test_decoded_user_with_shouted_email_rejected() {
    let (store, service) = seeded().await;
    service.ensure_indexes().await.unwrap();

    let twin: User = mongodb::bson::from_document(mongodb::bson::doc! {
        "nombre": "Ana María",
        "email": "ANA@MAIL.COM",
        "edad": 40,
        "pais": "Chile",
        "fechaRegistro": mongodb::bson::DateTime::now(),
    })
    .unwrap();

    let err = service.seed_catalog(&[twin], &[]).await.unwrap_err();
    assert!(matches!(err, CatalogError::Validation(_)));
    assert_eq!(store.count(DEFAULT_USERS_COLLECTION).await, 2);
}

#[tokio::test]
async fn test_rating_by_type() {
    let (_, service) = seeded().await;

    let rows = service.rating_by_type().await.unwrap();
    assert_eq!(rows.len(), 2);

    assert_eq!(rows[0].content_type, ContentType::Series);
    assert!((rows[0].average_rating.unwrap() - 4.9).abs() < 1e-9);

    assert_eq!(rows[1].content_type, ContentType::Movie);
    assert!((rows[1].average_rating.unwrap() - 4.75).abs() < 1e-9);
}

#[tokio::test]
async fn test_count_by_genre() {
    let (_, service) = seeded().await;

    let rows = service.count_by_genre().await.unwrap();
    let pairs: Vec<(&str, u64)> = rows.iter().map(|r| (r.genre.as_str(), r.total)).collect();
    assert_eq!(
        pairs,
        [("Science Fiction", 3), ("Drama", 2), ("Action", 1)]
    );
}

#[tokio::test]
async fn test_aggregates_on_empty_catalog() {
    let service = CatalogService::new(Arc::new(MemoryStore::new()));

    assert!(service.rating_by_type().await.unwrap().is_empty());
    assert!(service.count_by_genre().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_store_unavailable_propagates() {
    let (store, service) = seeded().await;
    store.set_available(false);

    let err = service.find_long_content(0).collect().await.unwrap_err();
    assert!(matches!(err, CatalogError::StoreUnavailable(_)));

    let err = service.rate_content("Dark", 4.0).await.unwrap_err();
    assert!(matches!(err, CatalogError::StoreUnavailable(_)));

    let err = service.count_by_genre().await.unwrap_err();
    assert!(matches!(err, CatalogError::StoreUnavailable(_)));
}

#[tokio::test]
async fn test_undecodable_document_is_decode_error() {
    let (store, service) = seeded().await;
    store
        .insert_many(
            DEFAULT_CONTENTS_COLLECTION,
            vec![mongodb::bson::doc! { "titulo": "Broken", "duracion": 500 }],
        )
        .await
        .unwrap();

    let err = service.find_long_content(200).collect().await.unwrap_err();
    assert!(matches!(err, CatalogError::Decode(_)));
}

#[tokio::test]
async fn test_custom_collections_and_trait_object() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let collections = Collections {
        users: "viewers".to_string(),
        contents: "titles".to_string(),
    };
    let service = CatalogService::with_collections(Arc::clone(&store), collections);

    service
        .seed_catalog(&[], &sample_contents().unwrap())
        .await
        .unwrap();

    assert_eq!(service.find_long_content(0).collect().await.unwrap().len(), 3);
    assert!(
        store
            .list_indexes(DEFAULT_CONTENTS_COLLECTION)
            .await
            .unwrap()
            .is_empty()
    );

    let shared = service.clone();
    let handle = tokio::spawn(async move { shared.prune_old_content(2015).await });
    assert_eq!(handle.await.unwrap().unwrap(), 2);
}
