//! Attach/execute semantics: exit status mapping, environment composition,
//! working directory, namespace pass-through. These spawn real host
//! processes through the mock engine.

use nsbox_container::{AttachOptions, Container, ContainerError, Engine};
use nsbox_engine::mock::MockEngine;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::Pid;
use std::sync::Arc;

fn sh(script: &str) -> Vec<String> {
    vec!["/bin/sh".to_string(), "-c".to_string(), script.to_string()]
}

fn setup_running(name: &str) -> (Arc<MockEngine>, Container) {
    let mock = Arc::new(MockEngine::new());
    let engine: Arc<dyn Engine> = mock.clone();
    let container = Container::with_config_path(engine, name, "/tmp/nsbox-attach-tests").unwrap();
    mock.define(container.identity()).unwrap();
    container.start().unwrap();
    (mock, container)
}

#[test]
fn exit_status_maps_to_boolean_success() {
    let (_mock, container) = setup_running("exit-status");
    let options = AttachOptions::default();

    assert!(container.run_command(&sh("exit 0"), &options).unwrap());
    assert!(!container.run_command(&sh("exit 1"), &options).unwrap());
}

#[test]
fn signal_termination_is_failure_not_error() {
    let (_mock, container) = setup_running("signaled");
    let ok = container
        .run_command(&sh("kill -9 $$"), &AttachOptions::default())
        .unwrap();
    assert!(!ok);
}

#[test]
fn run_command_requires_a_runnable_state() {
    let mock = Arc::new(MockEngine::new());
    let engine: Arc<dyn Engine> = mock.clone();
    let container =
        Container::with_config_path(engine, "not-running", "/tmp/nsbox-attach-tests").unwrap();
    mock.define(container.identity()).unwrap();

    assert!(matches!(
        container.run_command(&sh("exit 0"), &AttachOptions::default()),
        Err(ContainerError::Engine { operation: "attach", .. })
    ));
}

#[test]
fn empty_argv_is_a_launch_error() {
    let (_mock, container) = setup_running("empty-argv");
    assert!(matches!(
        container.run_command(&[], &AttachOptions::default()),
        Err(ContainerError::Launch { .. })
    ));
}

#[test]
fn explicit_env_is_visible_inside() {
    let (_mock, container) = setup_running("env-explicit");
    let options = AttachOptions {
        clear_env: true,
        env: vec!["FOO=BAR".to_string()],
        ..AttachOptions::default()
    };
    assert!(container
        .run_command(&sh("test \"$FOO\" = 'BAR'"), &options)
        .unwrap());
}

#[test]
fn clear_env_removes_inherited_variables() {
    // PATH is always present in the caller's environment.
    assert!(std::env::var("PATH").is_ok());

    let (_mock, container) = setup_running("env-clear");
    let options = AttachOptions {
        clear_env: true,
        env: vec!["FOO=BAR".to_string()],
        ..AttachOptions::default()
    };
    assert!(container
        .run_command(&sh("test -z \"$PATH\""), &options)
        .unwrap());
}

#[test]
fn env_to_keep_preserves_named_caller_variables() {
    let path = std::env::var("PATH").unwrap();

    let (_mock, container) = setup_running("env-keep");
    let options = AttachOptions {
        clear_env: true,
        env_to_keep: vec!["PATH".to_string()],
        ..AttachOptions::default()
    };
    // Only the named variable survives the cleared environment.
    let script = format!("test \"$PATH\" = '{path}' && test -z \"$HOME\"");
    assert!(container.run_command(&sh(&script), &options).unwrap());
}

#[test]
fn working_directory_is_applied() {
    let (_mock, container) = setup_running("cwd");
    let dir = tempfile::tempdir().unwrap();
    let cwd = dir.path().canonicalize().unwrap();

    let options = AttachOptions {
        cwd: Some(cwd.clone()),
        ..AttachOptions::default()
    };
    let script = format!("test \"$(pwd)\" = '{}'", cwd.display());
    assert!(container.run_command(&sh(&script), &options).unwrap());
}

#[test]
fn missing_working_directory_is_a_launch_error() {
    let (_mock, container) = setup_running("cwd-missing");
    let options = AttachOptions {
        cwd: Some("/nonexistent/nsbox/cwd".into()),
        ..AttachOptions::default()
    };
    assert!(matches!(
        container.run_command(&sh("exit 0"), &options),
        Err(ContainerError::Launch { .. })
    ));
}

#[test]
fn no_wait_returns_a_reapable_host_pid() {
    let (_mock, container) = setup_running("no-wait");

    let pid = container
        .run_command_no_wait(&sh("exit 0"), &AttachOptions::default())
        .unwrap();
    assert!(pid > 0);
    let status = waitpid(Pid::from_raw(pid), None).unwrap();
    assert!(matches!(status, WaitStatus::Exited(_, 0)));

    let pid = container
        .run_command_no_wait(&sh("exit 3"), &AttachOptions::default())
        .unwrap();
    let status = waitpid(Pid::from_raw(pid), None).unwrap();
    assert!(matches!(status, WaitStatus::Exited(_, 3)));
}

#[test]
fn omitted_namespaces_are_forwarded_verbatim() {
    let (mock, container) = setup_running("netless");

    let mut options = AttachOptions::default();
    options.namespaces.network = false;
    assert!(container.run_command(&sh("exit 0"), &options).unwrap());

    let spec = mock.last_attach(container.identity()).unwrap();
    assert!(!spec.namespaces.network, "network omission was not forwarded");
    assert!(spec.namespaces.mount);
    assert!(spec.uid.is_none());
}
