mod common;

use common::{customer, names, Customer};
use genrepo_core::{
    AsyncReadOnlyRepository, AsyncRepository, Filter, Includes, OrderBy, ReadOnlyRepository,
    ReadOptions, RepoError, SessionError, SessionRepository, SqliteSession, StoreOptions,
};
use std::future::Future;
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};

async fn seeded(session: &mut SqliteSession) {
    let mut repo = SessionRepository::new(session);
    for (index, name) in ["F", "B", "D", "A", "E", "C"].iter().enumerate() {
        let mut record = customer(name, index as u32 + 1);
        repo.create_async(&mut record, None).await.unwrap();
    }
    let report = repo.save_async().await.unwrap();
    assert_eq!(report.affected(), 6);
}

#[tokio::test]
async fn async_reads_match_blocking_reads() {
    let mut session = SqliteSession::open_in_memory().unwrap();
    seeded(&mut session).await;
    let repo = SessionRepository::new(&mut session);

    let options = ReadOptions::new()
        .order_by(OrderBy::asc_by(|row: &Customer| row.name.clone()))
        .page(2, 3);
    let from_async = repo.get_all_async(&options).await.unwrap();
    let from_blocking = repo.get_all(&options).unwrap();
    assert_eq!(names(&from_async), vec!["C", "D", "E"]);
    assert_eq!(from_async, from_blocking);

    let top = Filter::new(|row: &Customer| row.rank > 4);
    assert_eq!(repo.get_count_async(Some(&top)).await.unwrap(), 2);
    assert!(repo.get_exists_async(Some(&top)).await.unwrap());
    assert_eq!(
        names(&repo.get_async(Some(&top), &ReadOptions::new()).await.unwrap()),
        vec!["E", "C"]
    );

    let found: Option<Customer> = repo.get_by_id_async(&4).await.unwrap();
    assert_eq!(found.unwrap().name, "A");
}

#[tokio::test]
async fn async_single_result_semantics() {
    let mut session = SqliteSession::open_in_memory().unwrap();
    seeded(&mut session).await;
    let repo = SessionRepository::new(&mut session);
    let top = Filter::new(|row: &Customer| row.rank > 4);

    let err = repo
        .get_one_async(Some(&top), &Includes::none())
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::AmbiguousResult { .. }));

    let first = repo
        .get_first_async(
            Some(&top),
            Some(&OrderBy::desc_by(|row: &Customer| row.rank)),
            &Includes::parse("Orders"),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.name, "C");
}

#[tokio::test]
async fn async_delete_by_id_reports_missing_records() {
    let mut session = SqliteSession::open_in_memory().unwrap();
    seeded(&mut session).await;
    let mut repo = SessionRepository::new(&mut session);

    let err = repo.delete_by_id_async::<Customer>(&77).await.unwrap_err();
    assert!(matches!(err, RepoError::NotFound { ref id, .. } if id == "77"));

    repo.delete_by_id_async::<Customer>(&1).await.unwrap();
    repo.save_async().await.unwrap();
    assert_eq!(repo.get_count_async::<Customer>(None).await.unwrap(), 5);
}

#[tokio::test]
async fn async_update_and_delete_round_trip() {
    let mut session = SqliteSession::open_in_memory().unwrap();
    let mut repo = SessionRepository::new(&mut session);

    let mut dora = customer("Dora", 1);
    let entry = repo.create_async(&mut dora, Some("async")).await.unwrap();
    assert!(repo.save_async().await.unwrap().refresh(entry, &mut dora));

    dora.rank = 9;
    repo.update_async(&mut dora, Some("async")).await.unwrap();
    repo.save_async().await.unwrap();
    let stored: Option<Customer> = repo.get_by_id_async(&1).await.unwrap();
    assert_eq!(stored.unwrap().rank, 9);

    let latest: Customer = repo.get_by_id_async(&1).await.unwrap().unwrap();
    repo.delete_async(&latest).await.unwrap();
    repo.save_async().await.unwrap();
    assert!(!repo.get_exists_async::<Customer>(None).await.unwrap());
}

#[tokio::test]
async fn async_save_reports_conflicts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");

    let mut first = SqliteSession::open(&path, &StoreOptions::default()).unwrap();
    let mut repo = SessionRepository::new(&mut first);
    let mut eve = customer("Eve", 1);
    let entry = repo.create_async(&mut eve, None).await.unwrap();
    repo.save_async().await.unwrap().refresh(entry, &mut eve);
    let mut stale = eve.clone();

    repo.update_async(&mut eve, None).await.unwrap();
    repo.save_async().await.unwrap();

    let mut second = SqliteSession::open(&path, &StoreOptions::default()).unwrap();
    let mut other = SessionRepository::new(&mut second);
    other.update_async(&mut stale, None).await.unwrap();
    let err = other.save_async().await.unwrap_err();
    assert!(matches!(err, RepoError::ConcurrencyConflict { .. }));
}

#[tokio::test]
async fn async_validation_failure_is_aggregated() {
    let mut session = SqliteSession::open_in_memory().unwrap();
    let mut repo = SessionRepository::new(&mut session);

    let mut first = customer("", 1);
    first.email = "nobody".to_string();
    repo.create_async(&mut first, None).await.unwrap();

    match repo.save_async().await.unwrap_err() {
        RepoError::ValidationFailed(failure) => assert!(failure
            .message()
            .ends_with("The validation errors are: Name is required.; Email is invalid.")),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn async_rejected_insert_can_be_resubmitted() {
    let mut session = SqliteSession::open_in_memory().unwrap();
    let mut repo = SessionRepository::new(&mut session);

    let mut draft = customer("Gus", 1);
    draft.email = "gus".to_string();
    let rejected = repo.create_async(&mut draft, None).await.unwrap();
    assert!(matches!(
        repo.save_async().await.unwrap_err(),
        RepoError::ValidationFailed(_)
    ));

    repo.detach_async(rejected).await.unwrap();
    draft.email = "gus@example.com".to_string();
    repo.create_async(&mut draft, None).await.unwrap();
    assert_eq!(repo.save_async().await.unwrap().affected(), 1);
    assert_eq!(repo.get_count_async::<Customer>(None).await.unwrap(), 1);
}

struct NoopWake;

impl Wake for NoopWake {
    fn wake(self: Arc<Self>) {}
}

#[test]
fn async_reads_outside_a_runtime_fail_cleanly() {
    let mut session = SqliteSession::open_in_memory().unwrap();
    let repo = SessionRepository::new(&mut session);

    let waker = Waker::from(Arc::new(NoopWake));
    let mut cx = Context::from_waker(&waker);
    let mut count = repo.get_count_async::<Customer>(None);
    match count.as_mut().poll(&mut cx) {
        Poll::Ready(Err(RepoError::Store(SessionError::Worker(message)))) => {
            assert!(message.contains("no tokio runtime"));
        }
        Poll::Ready(other) => panic!("unexpected result: {other:?}"),
        Poll::Pending => panic!("read suspended without a runtime"),
    }
}
