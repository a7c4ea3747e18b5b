#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use chrono::NaiveDate;
use common::{Account, Document, Sample, named};
use crudkit::{
    Entity, ErrorKind, FieldMap, FieldType, Generated, ListParams, MemoryStore, Repository,
    RepositoryError, Session, Value,
};

async fn seed(store: &MemoryStore, names: &[&str]) {
    let repo = Repository::<Sample>::new();
    let mut session = store.session();
    for name in names {
        repo.create(&mut session, &named(name)).await.unwrap();
    }
}

#[test]
fn derive_describes_fields() {
    assert_eq!(Sample::table_name(), "samples");
    assert_eq!(Sample::entity_name(), "Sample");
    assert_eq!(Sample::key_field(), "id");

    let id = Sample::field("id").unwrap();
    assert_eq!(id.field_type, FieldType::Integer);
    assert_eq!(id.generated, Some(Generated::AutoIncrement));
    assert!(!id.nullable);
    assert!(Sample::field("description").unwrap().nullable);
    assert_eq!(Sample::field("score").unwrap().field_type, FieldType::Float);
    assert_eq!(Sample::field("active").unwrap().field_type, FieldType::Boolean);

    assert!(Document::supports_soft_delete());
    assert!(Document::tracks_updates());
    assert!(!Sample::supports_soft_delete());
    assert_eq!(
        Document::field("created_at").unwrap().generated,
        Some(Generated::Now)
    );

    assert_eq!(Account::key_field(), "handle");
    assert_eq!(Account::field("display_name").unwrap().attr, "display");
    assert!(!Account::has_field("cached"));
    assert!(Account::field("note").unwrap().nullable);
}

#[tokio::test]
async fn create_commits_and_key_lookup_casts() {
    let store = MemoryStore::new();
    let repo = Repository::<Sample>::new();
    let mut session = store.session();

    let created = repo
        .create(&mut session, &named("alpha").with("score", "2.5"))
        .await
        .unwrap();
    assert_eq!(created.id, 1);
    assert_eq!(created.score, Some(2.5));
    assert_eq!(created.description, None);
    assert_eq!(store.committed_rows("samples").unwrap(), 1);

    let mut other = store.session();
    let found = repo.get_by_key(&mut other, "1").await.unwrap();
    assert_eq!(found, Some(created));
    assert_eq!(repo.get_by_key(&mut other, 99i64).await.unwrap(), None);
}

#[tokio::test]
async fn create_rejects_bad_payload_without_writing() {
    let store = MemoryStore::new();
    let repo = Repository::<Sample>::new();
    let mut session = store.session();

    let err = repo
        .create(&mut session, &named("alpha").with("active", "maybe"))
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::InvalidValue { ref field } if field == "active"));

    let err = repo
        .create(&mut session, &named("alpha").with("colour", "red"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("colour"));
    assert_eq!(store.committed_rows("samples").unwrap(), 0);
}

#[tokio::test]
async fn list_counts_everything_and_limit_zero_skips_items() {
    let store = MemoryStore::new();
    seed(&store, &["a", "b", "c", "d", "e"]).await;
    let repo = Repository::<Sample>::new();
    let mut session = store.session();

    let (total, items) = repo
        .get_list(&mut session, &ListParams::new(), &FieldMap::new())
        .await
        .unwrap();
    assert_eq!(total, 5);
    assert_eq!(items.len(), 5);
    let ids: Vec<i64> = items.iter().map(|s| s.id).collect();
    assert_eq!(ids, [5, 4, 3, 2, 1]);

    let (total, items) = repo
        .get_list(&mut session, &ListParams::new().limit(0), &FieldMap::new())
        .await
        .unwrap();
    assert_eq!(total, 5);
    assert!(items.is_empty());
}

#[tokio::test]
async fn skip_is_a_page_index() {
    let store = MemoryStore::new();
    seed(&store, &["a", "b", "c", "d", "e"]).await;
    let repo = Repository::<Sample>::new();
    let mut session = store.session();

    let params = ListParams::new().order("asc").limit(2).skip(1);
    let (total, items) = repo
        .get_list(&mut session, &params, &FieldMap::new())
        .await
        .unwrap();
    assert_eq!(total, 5);
    let ids: Vec<i64> = items.iter().map(|s| s.id).collect();
    assert_eq!(ids, [3, 4]);

    let params = ListParams::new().order("asc").limit(2).skip(2);
    let (_, items) = repo
        .get_list(&mut session, &params, &FieldMap::new())
        .await
        .unwrap();
    assert_eq!(items.len(), 1);
}

#[tokio::test]
async fn list_orders_by_requested_field() {
    let store = MemoryStore::new();
    seed(&store, &["pear", "apple", "quince", "fig"]).await;
    let repo = Repository::<Sample>::new();
    let mut session = store.session();

    let asc = ListParams::new().order("ASC").order_by("name");
    let (_, items) = repo
        .get_list(&mut session, &asc, &FieldMap::new())
        .await
        .unwrap();
    let names: Vec<&str> = items.iter().map(|s| s.name.as_str()).collect();
    assert!(names.windows(2).all(|w| w[0] <= w[1]), "{names:?}");

    let desc = ListParams::new().order("desc").order_by("name");
    let (_, items) = repo
        .get_list(&mut session, &desc, &FieldMap::new())
        .await
        .unwrap();
    let names: Vec<&str> = items.iter().map(|s| s.name.as_str()).collect();
    assert!(names.windows(2).all(|w| w[0] >= w[1]), "{names:?}");
}

#[tokio::test]
async fn list_rejects_bad_ordering_before_querying() {
    let store = MemoryStore::new();
    let repo = Repository::<Sample>::new();
    let mut session = store.session();

    let err = repo
        .get_list(
            &mut session,
            &ListParams::new().order("sideways"),
            &FieldMap::new(),
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("sideways"));
    assert_eq!(err.kind(), ErrorKind::ClientInput);

    let err = repo
        .get_list(
            &mut session,
            &ListParams::new().order_by("ghost"),
            &FieldMap::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::UnknownField { ref field, .. } if field == "ghost"));
}

#[tokio::test]
async fn list_filters_are_cast() {
    let store = MemoryStore::new();
    let repo = Repository::<Sample>::new();
    let mut session = store.session();
    repo.create(&mut session, &named("a").with("active", true).with("score", 1.5))
        .await
        .unwrap();
    repo.create(&mut session, &named("b").with("active", "no").with("description", "x"))
        .await
        .unwrap();
    repo.create(&mut session, &named("c")).await.unwrap();

    let active = FieldMap::new().with("active", "YES");
    let (total, items) = repo
        .get_list(&mut session, &ListParams::new(), &active)
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(items[0].name, "a");

    let scored = FieldMap::new().with("score", "1.5");
    let (total, _) = repo
        .get_list(&mut session, &ListParams::new(), &scored)
        .await
        .unwrap();
    assert_eq!(total, 1);

    let undescribed = FieldMap::new().with("description", "None");
    let (total, _) = repo
        .get_list(&mut session, &ListParams::new(), &undescribed)
        .await
        .unwrap();
    assert_eq!(total, 2);
}

#[tokio::test]
async fn bad_filters_are_client_errors() {
    let store = MemoryStore::new();
    let repo = Repository::<Sample>::new();
    let mut session = store.session();

    let err = repo
        .get_one(&mut session, &FieldMap::new().with("id", "not-a-number"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("'id'"));
    assert!(err.is_client_error());

    let err = repo
        .get_one(&mut session, &FieldMap::new().with("ghost_field", "x"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("ghost_field"));
    assert!(err.to_string().contains("Sample"));
}

#[tokio::test]
async fn get_one_matches_all_filters() {
    let store = MemoryStore::new();
    seed(&store, &["alpha", "beta"]).await;
    let repo = Repository::<Sample>::new();
    let mut session = store.session();

    let found = repo
        .get_one(&mut session, &named("beta"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, 2);

    let missing = repo
        .get_one(&mut session, &named("beta").with("id", "1"))
        .await
        .unwrap();
    assert_eq!(missing, None);
}

#[tokio::test]
async fn update_commits_and_returns_refreshed_entity() {
    let store = MemoryStore::new();
    seed(&store, &["alpha"]).await;
    let repo = Repository::<Sample>::new();
    let mut session = store.session();

    let updated = repo
        .update(&mut session, "1", &FieldMap::new().with("description", "first"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.description.as_deref(), Some("first"));
    assert_eq!(updated.name, "alpha");

    let mut fresh = store.session();
    let stored = repo.require_by_key(&mut fresh, 1i64).await.unwrap();
    assert_eq!(stored, updated);
}

#[tokio::test]
async fn update_of_missing_key_is_none() {
    let store = MemoryStore::new();
    let repo = Repository::<Sample>::new();
    let mut session = store.session();

    let result = repo
        .update(&mut session, 42i64, &named("ghost"))
        .await
        .unwrap();
    assert_eq!(result, None);

    let err = repo.require_by_key(&mut session, 42i64).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(err.to_string().contains("42"));
    assert!(err.to_string().contains("Sample"));
}

#[tokio::test]
async fn empty_update_returns_current_state() {
    let store = MemoryStore::new();
    seed(&store, &["alpha"]).await;
    let repo = Repository::<Sample>::new();
    let mut session = store.session();

    let current = repo
        .update(&mut session, 1i64, &FieldMap::new())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(current.name, "alpha");
}

#[tokio::test]
async fn update_stamps_updated_at() {
    let store = MemoryStore::new();
    let repo = Repository::<Document>::new();
    let mut session = store.session();

    let doc = repo
        .create(&mut session, &FieldMap::new().with("title", "draft"))
        .await
        .unwrap();
    assert_eq!(doc.updated_at, None);

    let doc = repo
        .update(&mut session, doc.id, &FieldMap::new().with("title", "final"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(doc.title, "final");
    let stamped = doc.updated_at.unwrap();
    assert!(stamped >= doc.created_at);
}

#[tokio::test]
async fn timestamps_are_cast_from_strings() {
    let store = MemoryStore::new();
    let repo = Repository::<Document>::new();
    let mut session = store.session();

    let fields = FieldMap::new()
        .with("title", "holiday")
        .with("created_at", "2023-12-25 14:30:00");
    let doc = repo.create(&mut session, &fields).await.unwrap();
    let expected = NaiveDate::from_ymd_opt(2023, 12, 25)
        .unwrap()
        .and_hms_opt(14, 30, 0)
        .unwrap();
    assert_eq!(doc.created_at, expected);

    let found = repo
        .get_one(
            &mut session,
            &FieldMap::new().with("created_at", "2023-12-25 14:30:00"),
        )
        .await
        .unwrap();
    assert_eq!(found.map(|d| d.id), Some(doc.id));

    let err = repo
        .get_one(&mut session, &FieldMap::new().with("created_at", "2023/12/25"))
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::InvalidValue { .. }));
}

#[tokio::test]
async fn delete_leaves_commit_to_caller() {
    let store = MemoryStore::new();
    seed(&store, &["alpha"]).await;
    let repo = Repository::<Sample>::new();
    let mut session = store.session();

    assert!(!repo.delete(&mut session, 7i64).await.unwrap());
    assert_eq!(store.committed_rows("samples").unwrap(), 1);

    assert!(repo.delete(&mut session, "1").await.unwrap());
    assert_eq!(repo.get_by_key(&mut session, 1i64).await.unwrap(), None);
    assert_eq!(store.committed_rows("samples").unwrap(), 1);

    Session::commit(&mut session).await.unwrap();
    assert_eq!(store.committed_rows("samples").unwrap(), 0);
}

#[tokio::test]
async fn dropped_session_discards_delete() {
    let store = MemoryStore::new();
    seed(&store, &["alpha"]).await;
    let repo = Repository::<Sample>::new();

    {
        let mut session = store.session();
        assert!(repo.delete(&mut session, 1i64).await.unwrap());
    }

    let mut session = store.session();
    assert!(repo.get_by_key(&mut session, 1i64).await.unwrap().is_some());
}

#[tokio::test]
async fn soft_delete_unsupported_leaves_row() {
    let store = MemoryStore::new();
    seed(&store, &["alpha"]).await;
    let repo = Repository::<Sample>::new();
    let mut session = store.session();

    let before = repo.get_by_key(&mut session, 1i64).await.unwrap();
    assert!(!repo.soft_delete(&mut session, 1i64).await.unwrap());
    assert!(!repo.soft_delete(&mut session, 9i64).await.unwrap());
    assert_eq!(repo.get_by_key(&mut session, 1i64).await.unwrap(), before);
}

#[tokio::test]
async fn soft_delete_marks_row() {
    let store = MemoryStore::new();
    let repo = Repository::<Document>::new();
    let mut session = store.session();
    let doc = repo
        .create(&mut session, &FieldMap::new().with("title", "draft"))
        .await
        .unwrap();

    assert!(repo.soft_delete(&mut session, doc.id).await.unwrap());
    let marked = repo.get_by_key(&mut session, doc.id).await.unwrap().unwrap();
    assert!(marked.deleted_at.is_some());

    assert!(!repo.soft_delete(&mut session, 500i64).await.unwrap());
}

#[tokio::test]
async fn natural_keys_and_renamed_columns() {
    let store = MemoryStore::new();
    let repo = Repository::<Account>::new();
    let mut session = store.session();

    let fields = FieldMap::new()
        .with("handle", "ada")
        .with("display_name", "Ada L.");
    let account = repo.create(&mut session, &fields).await.unwrap();
    assert_eq!(account.display, "Ada L.");
    assert_eq!(account.cached, None);

    let err = repo.create(&mut session, &fields).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(matches!(err, RepositoryError::Conflict { ref key, .. } if key == "ada"));

    let err = repo
        .create(&mut session, &FieldMap::new().with("display_name", "anon"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("handle"));

    let found = repo.require_by_key(&mut session, "ada").await.unwrap();
    assert_eq!(found, account);
}

#[tokio::test]
async fn sessions_opened_earlier_do_not_lose_later_commits() {
    let store = MemoryStore::new();
    let repo = Repository::<Sample>::new();

    let mut early = store.session();
    let (total, _) = repo
        .get_list(&mut early, &ListParams::new(), &FieldMap::new())
        .await
        .unwrap();
    assert_eq!(total, 0);

    let mut other = store.session();
    let x = repo.create(&mut other, &named("x")).await.unwrap();
    let y = repo.create(&mut early, &named("y")).await.unwrap();
    assert_ne!(x.id, y.id);

    let mut fresh = store.session();
    let (total, items) = repo
        .get_list(
            &mut fresh,
            &ListParams::new().order("asc").order_by("name"),
            &FieldMap::new(),
        )
        .await
        .unwrap();
    assert_eq!(total, 2);
    let names: Vec<&str> = items.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, ["x", "y"]);
}

#[tokio::test]
async fn concurrent_natural_key_insert_conflicts_at_commit() {
    let store = MemoryStore::new();
    let repo = Repository::<Account>::new();
    let mut first = store.session();
    let mut second = store.session();
    let _ = repo.get_by_key(&mut second, "ada").await.unwrap();

    let fields = FieldMap::new().with("handle", "ada");
    repo.create(&mut first, &fields.clone().with("display_name", "first"))
        .await
        .unwrap();
    let err = repo
        .create(&mut second, &fields.with("display_name", "second"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let mut fresh = store.session();
    let stored = repo.require_by_key(&mut fresh, "ada").await.unwrap();
    assert_eq!(stored.display, "first");
    assert_eq!(store.committed_rows("accounts").unwrap(), 1);
}

#[tokio::test]
async fn non_finite_floats_are_invalid_values() {
    let store = MemoryStore::new();
    let repo = Repository::<Sample>::new();
    let mut session = store.session();

    for raw in ["NaN", "inf", "-infinity"] {
        let err = repo
            .create(&mut session, &named("alpha").with("score", raw))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::InvalidValue { ref field } if field == "score"));
    }
    assert_eq!(store.committed_rows("samples").unwrap(), 0);

    let err = repo
        .get_list(
            &mut session,
            &ListParams::new(),
            &FieldMap::new().with("score", "NaN"),
        )
        .await
        .unwrap_err();
    assert!(err.is_client_error());
}

#[tokio::test]
async fn explicit_null_filter_value() {
    let store = MemoryStore::new();
    seed(&store, &["alpha"]).await;
    let repo = Repository::<Sample>::new();
    let mut session = store.session();

    let filters = FieldMap::new().with("score", Value::Null);
    let (total, _) = repo
        .get_list(&mut session, &ListParams::new(), &filters)
        .await
        .unwrap();
    assert_eq!(total, 1);
}
