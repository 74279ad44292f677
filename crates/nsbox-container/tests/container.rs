//! Handle lifecycle, state machine and wait behavior against the mock
//! engine.

use nsbox_container::{
    active_container_names, defined_container_names, defined_containers, Container,
    ContainerError, ContainerState, Engine, LogLevel, Verbosity,
};
use nsbox_engine::mock::MockEngine;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn setup(name: &str) -> (Arc<MockEngine>, Container) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let mock = Arc::new(MockEngine::new());
    let engine: Arc<dyn Engine> = mock.clone();
    let container = Container::with_config_path(engine, name, "/tmp/nsbox-tests").unwrap();
    (mock, container)
}

fn setup_defined(name: &str) -> (Arc<MockEngine>, Container) {
    let (mock, container) = setup(name);
    mock.define(container.identity()).unwrap();
    (mock, container)
}

#[test]
fn undefined_then_defined() {
    let (mock, container) = setup("lorem");
    assert!(!container.defined());
    mock.define(container.identity()).unwrap();
    assert!(container.defined());
    assert!(container.may_control());
}

#[test]
fn invalid_names_are_rejected() {
    let mock = Arc::new(MockEngine::new());
    let engine: Arc<dyn Engine> = mock;
    assert!(matches!(
        Container::new(Arc::clone(&engine), ""),
        Err(ContainerError::InvalidName(_))
    ));
    assert!(matches!(
        Container::new(engine, "a/b"),
        Err(ContainerError::InvalidName(_))
    ));
}

#[test]
fn identity_is_bound_at_creation() {
    let (_mock, container) = setup("lorem");
    assert_eq!(container.name(), "lorem");
    assert_eq!(
        container.config_path(),
        std::path::Path::new("/tmp/nsbox-tests")
    );
}

#[test]
fn start_then_wait_running() {
    let (_mock, container) = setup_defined("start-wait");
    assert!(container.init_pid().is_none());

    container.start().unwrap();
    assert!(container.wait(ContainerState::Running, Duration::from_secs(30)));
    assert!(container.running());
    assert!(container.init_pid().is_some());
}

#[test]
fn wait_with_zero_timeout_polls_once_without_blocking() {
    let (_mock, container) = setup_defined("zero-wait");

    let begin = Instant::now();
    let reached = container.wait(ContainerState::Running, Duration::ZERO);
    assert!(!reached);
    assert!(
        begin.elapsed() < Duration::from_millis(500),
        "zero-timeout wait blocked"
    );
}

#[test]
fn wait_observes_state_changed_by_an_external_actor() {
    let (mock, container) = setup_defined("external-wait");

    let mock_for_thread = Arc::clone(&mock);
    let identity = container.identity().clone();
    let changer = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(150));
        mock_for_thread.simulate_state_change(&identity, ContainerState::Running);
    });

    assert!(container.wait(ContainerState::Running, Duration::from_secs(5)));
    changer.join().unwrap();
}

#[test]
fn wait_accepts_an_effectively_unbounded_timeout() {
    let (mock, container) = setup_defined("unbounded-wait");

    let mock_for_thread = Arc::clone(&mock);
    let identity = container.identity().clone();
    let changer = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(150));
        mock_for_thread.simulate_state_change(&identity, ContainerState::Running);
    });

    assert!(container.wait(ContainerState::Running, Duration::MAX));
    changer.join().unwrap();
}

#[test]
fn wait_expiry_is_a_boolean_outcome() {
    let (_mock, container) = setup_defined("expire-wait");
    let begin = Instant::now();
    assert!(!container.wait(ContainerState::Running, Duration::from_millis(200)));
    assert!(begin.elapsed() >= Duration::from_millis(200));
}

#[test]
fn state_is_re_read_on_every_query() {
    let (mock, container) = setup_defined("fresh-state");
    container.start().unwrap();
    assert_eq!(container.state().unwrap(), ContainerState::Running);

    // The container's init exiting is invisible to our locks; the next
    // query must still see it.
    mock.simulate_state_change(container.identity(), ContainerState::Stopped);
    assert_eq!(container.state().unwrap(), ContainerState::Stopped);
    assert!(!container.running());
}

#[test]
fn state_of_undefined_container_is_not_found() {
    let (_mock, container) = setup("ghost");
    assert!(matches!(
        container.state(),
        Err(ContainerError::NotFound(_))
    ));
}

#[test]
fn freeze_and_unfreeze_cycle() {
    let (_mock, container) = setup_defined("freezer");
    container.start().unwrap();

    container.freeze().unwrap();
    assert!(container.wait(ContainerState::Frozen, Duration::from_secs(30)));
    assert_eq!(container.state().unwrap(), ContainerState::Frozen);

    container.unfreeze().unwrap();
    assert!(container.wait(ContainerState::Running, Duration::from_secs(30)));
}

#[test]
fn shutdown_stops_a_running_container() {
    let (_mock, container) = setup_defined("shutdown");
    container.start().unwrap();
    container.shutdown(Duration::from_secs(30)).unwrap();
    assert!(container.wait(ContainerState::Stopped, Duration::from_secs(30)));
    assert!(!container.running());
}

#[test]
fn stop_requires_a_running_container() {
    let (_mock, container) = setup_defined("stop-stopped");
    assert!(matches!(
        container.stop(),
        Err(ContainerError::Engine { operation: "stop", .. })
    ));
}

#[test]
fn reboot_replaces_the_init_process() {
    let (_mock, container) = setup_defined("reboot");
    container.start().unwrap();
    let before = container.init_pid().unwrap();
    container.reboot().unwrap();
    assert!(container.wait(ContainerState::Running, Duration::from_secs(30)));
    let after = container.init_pid().unwrap();
    assert_ne!(before, after);
}

#[test]
fn config_items_are_list_valued() {
    let (_mock, container) = setup_defined("config");
    assert_eq!(container.config_item("uts.name"), vec!["config"]);

    container.set_config_item("environment", "FOO=1").unwrap();
    container.set_config_item("environment", "BAR=2").unwrap();
    assert_eq!(container.config_item("environment"), vec!["FOO=1", "BAR=2"]);

    container.clear_config_item("environment").unwrap();
    assert!(container.config_item("environment").is_empty());

    assert!(container
        .config_keys("uts.")
        .contains(&"uts.name".to_string()));
}

#[test]
fn cgroup_items_pass_through() {
    let (_mock, container) = setup_defined("cgroup");
    container.set_cgroup_item("memory.max", "104857600").unwrap();
    assert_eq!(container.cgroup_item("memory.max"), vec!["104857600"]);
}

#[test]
fn log_configuration_is_independent_of_execution_state() {
    let (_mock, mut container) = setup_defined("logging");

    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("logging.log");
    container.set_log_file(&log_path).unwrap();
    assert_eq!(container.log_file(), Some(log_path.as_path()));

    container.set_log_level(LogLevel::Warn).unwrap();
    assert_eq!(container.log_level(), LogLevel::Warn);

    assert_eq!(container.verbosity(), Verbosity::Quiet);
    container.set_verbosity(Verbosity::Verbose);
    assert_eq!(container.verbosity(), Verbosity::Verbose);
}

#[test]
fn release_is_idempotent_and_implied_by_drop() {
    let (_mock, mut container) = setup_defined("release");
    container.release();
    container.release();
    // Drop after explicit release must not double-release.
}

#[test]
fn console_fd_surfaces_unsupported_distinctly() {
    let (_mock, container) = setup_defined("console");
    assert!(matches!(
        container.console_fd(0),
        Err(ContainerError::Unsupported { .. })
    ));
}

#[test]
fn execute_runs_in_a_stopped_container() {
    let (_mock, container) = setup_defined("oneshot");
    let argv = vec!["/bin/echo".to_string(), "hello".to_string()];
    let stdout = container.execute(&argv).unwrap();
    assert_eq!(String::from_utf8_lossy(&stdout).trim(), "hello");

    container.start().unwrap();
    assert!(container.execute(&argv).is_err());
}

#[test]
fn enumeration_distinguishes_defined_from_active() {
    let mock = Arc::new(MockEngine::new());
    let engine: Arc<dyn Engine> = mock.clone();
    let path = std::path::Path::new("/tmp/nsbox-enum-tests");

    let first = Container::with_config_path(Arc::clone(&engine), "alpha", path).unwrap();
    let second = Container::with_config_path(Arc::clone(&engine), "beta", path).unwrap();
    mock.define(first.identity()).unwrap();
    mock.define(second.identity()).unwrap();
    first.start().unwrap();

    assert_eq!(
        defined_container_names(engine.as_ref(), Some(path)),
        vec!["alpha", "beta"]
    );
    assert_eq!(
        active_container_names(engine.as_ref(), Some(path)),
        vec!["alpha"]
    );

    let handles = defined_containers(&engine, Some(path)).unwrap();
    assert_eq!(handles.len(), 2);
    assert!(handles.iter().all(Container::defined));
}
