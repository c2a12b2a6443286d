mod common;

use common::{customer, names, Customer};
use genrepo_core::{
    Filter, Includes, OrderBy, ReadOnlyRepository, ReadOptions, RepoError, Repository,
    SessionError, SessionRepository, SqliteSession,
};

// Insertion order F, B, D, A, E, C with ranks 1..=6 and ids 1..=6.
fn seeded() -> SqliteSession {
    let mut session = SqliteSession::open_in_memory().unwrap();
    {
        let mut repo = SessionRepository::new(&mut session);
        for (index, name) in ["F", "B", "D", "A", "E", "C"].iter().enumerate() {
            let mut record = customer(name, index as u32 + 1);
            repo.create(&mut record, Some("seed")).unwrap();
        }
        repo.save().unwrap();
    }
    session
}

fn by_name() -> OrderBy<Customer> {
    OrderBy::asc_by(|row: &Customer| row.name.clone())
}

#[test]
fn paging_applies_after_ordering() {
    let mut session = seeded();
    let repo = SessionRepository::new(&mut session);

    let rows = repo
        .get_all(&ReadOptions::new().order_by(by_name()).page(2, 3))
        .unwrap();
    assert_eq!(names(&rows), vec!["C", "D", "E"]);
}

#[test]
fn unordered_reads_follow_store_order() {
    let mut session = seeded();
    let repo = SessionRepository::new(&mut session);

    let all = repo.get_all(&ReadOptions::new()).unwrap();
    assert_eq!(names(&all), vec!["F", "B", "D", "A", "E", "C"]);

    let page = repo.get_all(&ReadOptions::new().page(1, 2)).unwrap();
    assert_eq!(names(&page), vec!["B", "D"]);

    let tail = repo.get_all(&ReadOptions::new().skip(4)).unwrap();
    assert_eq!(names(&tail), vec!["E", "C"]);

    let head = repo.get_all(&ReadOptions::new().take(2)).unwrap();
    assert_eq!(names(&head), vec!["F", "B"]);

    let past_end = repo.get_all::<Customer>(&ReadOptions::new().skip(10)).unwrap();
    assert!(past_end.is_empty());
}

#[test]
fn get_filters_before_ordering_and_paging() {
    let mut session = seeded();
    let repo = SessionRepository::new(&mut session);
    let ranked = Filter::new(|row: &Customer| row.rank >= 3);

    let desc = repo
        .get(
            Some(&ranked),
            &ReadOptions::new().order_by(OrderBy::desc_by(|row: &Customer| row.rank)),
        )
        .unwrap();
    assert_eq!(names(&desc), vec!["C", "E", "A", "D"]);

    let from_two = Filter::new(|row: &Customer| row.rank >= 2);
    let paged = repo
        .get(
            Some(&from_two),
            &ReadOptions::new().order_by(by_name()).page(1, 2),
        )
        .unwrap();
    assert_eq!(names(&paged), vec!["B", "C"]);

    let unfiltered = repo.get::<Customer>(None, &ReadOptions::new()).unwrap();
    assert_eq!(unfiltered.len(), 6);
}

#[test]
fn get_one_distinguishes_none_single_and_ambiguous() {
    let mut session = seeded();
    let repo = SessionRepository::new(&mut session);

    let single = repo
        .get_one(Some(&Filter::new(|row: &Customer| row.name == "A")), &Includes::none())
        .unwrap()
        .unwrap();
    assert_eq!(single.rank, 4);

    let missing = repo
        .get_one(Some(&Filter::new(|row: &Customer| row.name == "Z")), &Includes::none())
        .unwrap();
    assert!(missing.is_none());

    let err = repo
        .get_one(Some(&Filter::new(|row: &Customer| row.rank > 4)), &Includes::none())
        .unwrap_err();
    assert!(matches!(
        err,
        RepoError::AmbiguousResult {
            type_name: "customer"
        }
    ));
}

#[test]
fn get_first_is_deterministic_under_ordering() {
    let mut session = seeded();
    let repo = SessionRepository::new(&mut session);
    let top = Filter::new(|row: &Customer| row.rank > 4);

    let first = repo
        .get_first(Some(&top), Some(&by_name()), &Includes::none())
        .unwrap()
        .unwrap();
    assert_eq!(first.name, "C");

    let store_first: Customer = repo
        .get_first(None, None, &Includes::none())
        .unwrap()
        .unwrap();
    assert_eq!(store_first.name, "F");

    let nothing = repo
        .get_first(
            Some(&Filter::new(|row: &Customer| row.rank > 100)),
            None,
            &Includes::none(),
        )
        .unwrap();
    assert!(nothing.is_none());
}

#[test]
fn get_by_id_returns_match_or_none() {
    let mut session = seeded();
    let repo = SessionRepository::new(&mut session);

    let third: Customer = repo.get_by_id(&3).unwrap().unwrap();
    assert_eq!(third.name, "D");
    assert_eq!(*third.meta.id(), 3);
    assert!(third.meta.version().is_some());
    assert_eq!(third.meta.created_by(), Some("seed"));

    assert!(repo.get_by_id::<Customer>(&0).unwrap().is_none());
    assert!(repo.get_by_id::<Customer>(&99).unwrap().is_none());
}

#[test]
fn count_and_exists_honor_filters() {
    let mut session = seeded();
    let repo = SessionRepository::new(&mut session);

    assert_eq!(repo.get_count::<Customer>(None).unwrap(), 6);
    assert_eq!(
        repo.get_count(Some(&Filter::new(|row: &Customer| row.rank > 3)))
            .unwrap(),
        3
    );
    assert!(repo.get_exists::<Customer>(None).unwrap());
    assert!(!repo
        .get_exists(Some(&Filter::new(|row: &Customer| row.name == "Z")))
        .unwrap());
}

#[test]
fn empty_store_reads_are_empty() {
    let mut session = SqliteSession::open_in_memory().unwrap();
    let repo = SessionRepository::new(&mut session);

    assert!(repo.get_all::<Customer>(&ReadOptions::new()).unwrap().is_empty());
    assert_eq!(repo.get_count::<Customer>(None).unwrap(), 0);
    assert!(!repo.get_exists::<Customer>(None).unwrap());
    assert!(repo
        .get_one::<Customer>(None, &Includes::none())
        .unwrap()
        .is_none());
}

#[test]
fn includes_must_name_declared_relations() {
    let mut session = seeded();
    let repo = SessionRepository::new(&mut session);

    let with_orders = repo
        .get_all(&ReadOptions::<Customer>::new().includes(Includes::parse("Orders, ")))
        .unwrap();
    assert_eq!(with_orders.len(), 6);

    let err = repo
        .get_all(&ReadOptions::<Customer>::new().includes(Includes::parse("Orders,Invoices")))
        .unwrap_err();
    match err {
        RepoError::Store(SessionError::UnknownInclude {
            type_name,
            relation,
        }) => {
            assert_eq!(type_name, "customer");
            assert_eq!(relation, "Invoices");
        }
        other => panic!("unexpected error: {other}"),
    }

    let err = repo
        .get_one::<Customer>(None, &Includes::none().with("Invoices"))
        .unwrap_err();
    assert!(matches!(
        err,
        RepoError::Store(SessionError::UnknownInclude { .. })
    ));
}

#[test]
fn reads_do_not_register_changes() {
    let mut session = seeded();
    {
        let repo = SessionRepository::new(&mut session);
        repo.get_all::<Customer>(&ReadOptions::new()).unwrap();
        repo.get_by_id::<Customer>(&1).unwrap();
    }
    assert!(!session.has_changes());
}
