//! Serialization guarantees of the identity lock registry, exercised
//! through the public handle API. The mock engine panics on any two
//! overlapping calls for one identity, so every test here fails loudly if
//! serialization breaks.

use nsbox_container::{Container, ContainerState, Engine};
use nsbox_engine::mock::MockEngine;
use std::sync::Arc;
use std::time::Duration;

const CONFIG_PATH: &str = "/tmp/nsbox-concurrency-tests";

fn setup(name: &str) -> (Arc<MockEngine>, Arc<dyn Engine>) {
    let mock = Arc::new(MockEngine::new());
    let engine: Arc<dyn Engine> = mock.clone();
    let container = Container::with_config_path(Arc::clone(&engine), name, CONFIG_PATH).unwrap();
    mock.define(container.identity()).unwrap();
    (mock, engine)
}

#[test]
fn mutators_on_one_identity_are_totally_ordered() {
    let (_mock, engine) = setup("contended");

    let threads: Vec<_> = (0..8)
        .map(|t| {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || {
                let handle =
                    Container::with_config_path(engine, "contended", CONFIG_PATH).unwrap();
                for i in 0..25 {
                    handle
                        .set_config_item("environment", &format!("T{t}_I{i}=x"))
                        .unwrap();
                    let _ = handle.state().unwrap();
                }
            })
        })
        .collect();
    for t in threads {
        t.join().unwrap();
    }

    let probe = Container::with_config_path(engine, "contended", CONFIG_PATH).unwrap();
    assert_eq!(probe.config_item("environment").len(), 8 * 25);
}

#[test]
fn distinct_identities_do_not_serialize_against_each_other() {
    let mock = Arc::new(MockEngine::new());
    let engine: Arc<dyn Engine> = mock.clone();

    let threads: Vec<_> = (0..8)
        .map(|t| {
            let engine = Arc::clone(&engine);
            let mock = Arc::clone(&mock);
            std::thread::spawn(move || {
                let handle =
                    Container::with_config_path(engine, format!("worker-{t}"), CONFIG_PATH)
                        .unwrap();
                mock.define(handle.identity()).unwrap();
                handle.start().unwrap();
                for _ in 0..25 {
                    handle.set_config_item("environment", "X=1").unwrap();
                    assert!(handle.running());
                }
                handle.stop().unwrap();
            })
        })
        .collect();
    for t in threads {
        t.join().unwrap();
    }

    assert_eq!(
        engine
            .defined_names(std::path::Path::new(CONFIG_PATH))
            .len(),
        8
    );
}

#[test]
fn a_blocked_wait_does_not_starve_mutators_on_the_same_identity() {
    let (_mock, engine) = setup("waited-on");

    let waiter_engine = Arc::clone(&engine);
    let waiter = std::thread::spawn(move || {
        let handle =
            Container::with_config_path(waiter_engine, "waited-on", CONFIG_PATH).unwrap();
        handle.wait(ContainerState::Running, Duration::from_secs(10))
    });

    // Mutate the same identity while the wait is in progress. If the wait
    // held the identity lock across its sleep these calls would stall past
    // the deadline instead of interleaving with the polls.
    let handle = Container::with_config_path(engine, "waited-on", CONFIG_PATH).unwrap();
    std::thread::sleep(Duration::from_millis(100));
    for i in 0..10 {
        handle
            .set_config_item("environment", &format!("STEP={i}"))
            .unwrap();
    }
    handle.start().unwrap();

    assert!(waiter.join().unwrap(), "waiter missed the state transition");
}

#[test]
fn handles_on_the_same_identity_share_one_lock_entry() {
    let (mock, engine) = setup("shared-entry");

    let first = Container::with_config_path(Arc::clone(&engine), "shared-entry", CONFIG_PATH)
        .unwrap();
    let second = {
        let engine = Arc::clone(&engine);
        std::thread::spawn(move || {
            let handle =
                Container::with_config_path(engine, "shared-entry", CONFIG_PATH).unwrap();
            handle.set_config_item("environment", "FROM=second").unwrap();
        })
    };
    first.set_config_item("environment", "FROM=first").unwrap();
    second.join().unwrap();

    // Both writes went through the same serialized entry.
    assert_eq!(first.config_item("environment").len(), 2);
    drop(first);
    let _ = mock;
}

#[test]
fn registry_entries_outlive_individual_handles() {
    let (_mock, engine) = setup("reclaimed");

    // Churn handles so entries are reclaimed and recreated, under load on
    // the same identity from another thread.
    let churn_engine = Arc::clone(&engine);
    let churner = std::thread::spawn(move || {
        for _ in 0..50 {
            let handle =
                Container::with_config_path(Arc::clone(&churn_engine), "reclaimed", CONFIG_PATH)
                    .unwrap();
            handle.set_config_item("environment", "CHURN=1").unwrap();
        }
    });
    for _ in 0..50 {
        let handle =
            Container::with_config_path(Arc::clone(&engine), "reclaimed", CONFIG_PATH).unwrap();
        handle.set_config_item("environment", "MAIN=1").unwrap();
    }
    churner.join().unwrap();

    let probe = Container::with_config_path(engine, "reclaimed", CONFIG_PATH).unwrap();
    assert_eq!(probe.config_item("environment").len(), 100);
}
