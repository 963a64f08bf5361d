use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender, bounded};

use cairn::{
    CairnError, Collection, Document, FieldPath, FindOptions, IndexEventListener, IndexKind, field,
};

/// Holds the first build it sees until the test releases it.
struct Gate {
    armed: AtomicBool,
    started: Sender<()>,
    release: Receiver<()>,
}

impl IndexEventListener for Gate {
    fn on_index_build_start(&self, _fields: &FieldPath) {
        if self.armed.swap(false, Ordering::SeqCst) {
            let _ = self.started.send(());
            let _ = self.release.recv();
        }
    }
}

/// Subscribes an armed gate; returns the "build started" receiver and the release sender.
fn hold_next_build(collection: &Collection) -> (Receiver<()>, Sender<()>) {
    let (started_tx, started_rx) = bounded(1);
    let (release_tx, release_rx) = bounded(1);
    collection.subscribe(Arc::new(Gate {
        armed: AtomicBool::new(true),
        started: started_tx,
        release: release_rx,
    }));
    (started_rx, release_tx)
}

#[test]
fn test_concurrent_build_is_rejected() -> cairn::Result<()> {
    let collection = Arc::new(Collection::in_memory("people")?);
    for age in 0..50 {
        collection.insert(Document::new().add_field("age", age))?;
    }
    let age: FieldPath = "age".into();
    collection.create_index(age.clone(), IndexKind::NonUnique)?;

    let (started_rx, release_tx) = hold_next_build(&collection);

    let builder = {
        let collection = collection.clone();
        let age = age.clone();
        thread::spawn(move || collection.rebuild_index(&age))
    };

    started_rx.recv().unwrap();
    assert!(collection.is_indexing(&age)?);

    let err = collection.rebuild_index(&age).unwrap_err();
    assert!(matches!(&err, CairnError::Indexing(msg) if msg.contains("already running")));
    let err = collection.drop_index(&age).unwrap_err();
    assert!(matches!(err, CairnError::Indexing(_)));
    assert!(collection.drop_all_indices().is_err());

    release_tx.send(()).unwrap();
    builder.join().unwrap()?;

    assert!(!collection.is_indexing(&age)?);
    assert_eq!(collection.find(&field("age").lt(10))?.count(), 10);
    Ok(())
}

#[test]
fn test_parallel_writers() -> cairn::Result<()> {
    let collection = Arc::new(Collection::in_memory("events")?);
    collection.create_index("worker".into(), IndexKind::NonUnique)?;
    collection.create_index("seq".into(), IndexKind::Unique)?;

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let collection = collection.clone();
            thread::spawn(move || -> cairn::Result<()> {
                for i in 0..25 {
                    collection.insert(
                        Document::new()
                            .add_field("worker", worker)
                            .add_field("seq", worker * 100 + i),
                    )?;
                }
                Ok(())
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap()?;
    }

    assert_eq!(collection.size()?, 100);
    for worker in 0..4 {
        assert_eq!(collection.find(&field("worker").eq(worker))?.count(), 25);
    }
    Ok(())
}

#[test]
fn test_insert_and_find_during_create_index() -> cairn::Result<()> {
    let collection = Arc::new(Collection::in_memory("people")?);
    for age in 0..20 {
        collection.insert(Document::new().add_field("age", age))?;
    }
    let age: FieldPath = "age".into();
    let (started, release) = hold_next_build(&collection);

    let builder = {
        let collection = collection.clone();
        let age = age.clone();
        thread::spawn(move || collection.create_index(age, IndexKind::NonUnique))
    };
    started.recv().unwrap();
    assert!(collection.is_indexing(&age)?);

    // the empty index being built is not trusted
    let plan = collection.explain(&field("age").lt(10), &FindOptions::default())?;
    assert!(plan.is_collection_scan());
    assert_eq!(collection.find(&field("age").lt(10))?.count(), 10);

    collection.insert(Document::new().add_field("age", 5).add_field("late", true))?;
    assert_eq!(collection.find(&field("age").lt(10))?.count(), 11);

    release.send(()).unwrap();
    builder.join().unwrap()?;

    let plan = collection.explain(&field("age").lt(10), &FindOptions::default())?;
    assert!(plan.to_string().starts_with("index-scan([age]"));
    assert_eq!(collection.find(&field("age").lt(10))?.count(), 11);
    assert_eq!(collection.find(&field("late").eq(true))?.count(), 1);
    Ok(())
}

#[test]
fn test_remove_during_rebuild() -> cairn::Result<()> {
    let collection = Arc::new(Collection::in_memory("people")?);
    let email: FieldPath = "email".into();
    collection.create_index(email.clone(), IndexKind::Unique)?;
    let ada = collection.insert(Document::new().add_field("email", "ada@example.com"))?;
    collection.insert(Document::new().add_field("email", "bob@example.com"))?;
    let (started, release) = hold_next_build(&collection);

    let builder = {
        let collection = collection.clone();
        let email = email.clone();
        thread::spawn(move || collection.rebuild_index(&email))
    };
    started.recv().unwrap();

    assert!(collection.remove(ada)?.is_some());
    let found = collection.find(&field("email").eq("ada@example.com"))?.count();
    assert_eq!(found, 0);

    release.send(()).unwrap();
    builder.join().unwrap()?;

    // no entry for the removed record outlives the rebuild
    collection.insert(Document::new().add_field("email", "ada@example.com"))?;
    assert_eq!(collection.find(&field("email").eq("ada@example.com"))?.count(), 1);
    assert_eq!(collection.size()?, 2);
    Ok(())
}
