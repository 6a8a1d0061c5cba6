//! Instance lifecycle tests against the `/bin/sh` fixture engine.
//!
//! These cover provisioning, startup, readiness, idempotent start/stop and the
//! failure paths of a launch, without needing a database installed.

mod common;

use common::{
    fast_config, is_pid_alive, ScriptEngine, CRASH_SCRIPT, DEFAULT_RESOURCE, HANG_SCRIPT,
    INIT_MARKER, SERVE_SCRIPT,
};
use ephemeral_service::instance::OWNER_ONLY;
use ephemeral_service::{
    AutoStart, ConnectionOverrides, Error, Lifecycle, SearchPaths, ServiceInstance,
};
use std::os::unix::fs::PermissionsExt;
use std::time::Duration;

// =============================================================================
// Start / stop
// =============================================================================

#[tokio::test]
async fn test_default_resource_created_once_across_restarts() {
    let temp_dir = tempfile::tempdir().unwrap();
    let engine = ScriptEngine::serving();
    let config = fast_config().with_base_dir(temp_dir.path().join("instance"));

    let mut instance = ServiceInstance::new(engine.clone(), config).await.unwrap();
    assert_eq!(instance.state(), Lifecycle::Running);
    assert!(instance.data_dir().join(DEFAULT_RESOURCE).exists());
    assert_eq!(engine.resources_created(), 1);

    instance.stop().await.unwrap();
    assert_eq!(instance.state(), Lifecycle::Stopped);
    assert!(instance.pid().is_none());

    instance.start().await.unwrap();
    assert_eq!(instance.state(), Lifecycle::Running);
    assert_eq!(engine.resources_created(), 1, "second start must reuse the resource");
    assert_eq!(engine.post_start_count(), 2);
    assert_eq!(engine.init_count(), 1);

    instance.stop().await.unwrap();
}

#[tokio::test]
async fn test_start_is_idempotent() {
    let mut instance = ServiceInstance::new(ScriptEngine::serving(), fast_config())
        .await
        .unwrap();
    let pid = instance.pid().expect("running instance has a pid");
    let port = instance.port().expect("port assigned on start");

    instance.start().await.unwrap();

    assert_eq!(instance.pid(), Some(pid));
    assert_eq!(instance.port(), Some(port));
    assert!(is_pid_alive(pid));

    instance.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_twice_is_harmless() {
    let mut instance = ServiceInstance::new(ScriptEngine::serving(), fast_config())
        .await
        .unwrap();
    let pid = instance.pid().unwrap();
    let base_dir = instance.base_dir().to_path_buf();
    assert!(instance.uses_temp_dir());

    instance.stop().await.unwrap();
    instance.stop().await.unwrap();

    assert!(instance.pid().is_none());
    assert!(!is_pid_alive(pid));
    assert!(!base_dir.exists(), "temp base dir should be removed");
    assert_eq!(instance.state(), Lifecycle::Cleaned);
}

#[tokio::test]
async fn test_cleaned_instance_cannot_restart() {
    let mut instance = ServiceInstance::new(ScriptEngine::serving(), fast_config())
        .await
        .unwrap();
    instance.stop().await.unwrap();

    let err = instance.start().await.unwrap_err();
    assert!(matches!(err, Error::Lifecycle(_)));
    let err = instance.provision().await.unwrap_err();
    assert!(matches!(err, Error::Lifecycle(_)));
}

#[tokio::test]
async fn test_explicit_base_dir_is_preserved() {
    let temp_dir = tempfile::tempdir().unwrap();
    let base_dir = temp_dir.path().join("pg");
    let config = fast_config().with_base_dir(&base_dir);

    let mut instance = ServiceInstance::new(ScriptEngine::serving(), config)
        .await
        .unwrap();
    assert!(!instance.uses_temp_dir());
    instance.stop().await.unwrap();

    assert!(base_dir.exists());
    assert!(base_dir.join("data").join(INIT_MARKER).exists());
    assert!(base_dir.join("script.log").exists());
    assert_eq!(instance.state(), Lifecycle::Stopped);
}

// =============================================================================
// Manual lifecycle
// =============================================================================

#[tokio::test]
async fn test_manual_provision_then_start() {
    let engine = ScriptEngine::serving();
    let config = fast_config().with_auto_start(AutoStart::Manual);

    let mut instance = ServiceInstance::new(engine.clone(), config).await.unwrap();
    assert_eq!(instance.state(), Lifecycle::New);
    assert!(instance.pid().is_none());
    assert!(instance.port().is_none());

    instance.provision().await.unwrap();
    assert_eq!(instance.state(), Lifecycle::Provisioned);
    for dir in [instance.data_dir(), instance.layout().socket_dir.as_path()] {
        let mode = std::fs::metadata(dir).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, OWNER_ONLY, "{} should be owner-only", dir.display());
    }

    // Initialization only happens once per data directory.
    instance.provision().await.unwrap();
    assert_eq!(engine.init_count(), 1);

    instance.start().await.unwrap();
    assert_eq!(instance.state(), Lifecycle::Running);
    assert!(instance.started_at().is_some());
    assert!(instance.is_alive());

    let port = instance.port().unwrap();
    assert_eq!(
        instance.url().unwrap(),
        format!("script://tester@127.0.0.1:{}/default", port)
    );
    let params = instance
        .connection_with(&ConnectionOverrides::database("other"))
        .unwrap();
    assert_eq!(params.database, "other");
    assert_eq!(params.port, port);

    instance.stop().await.unwrap();
    assert!(!instance.is_alive());
}

#[tokio::test]
async fn test_connection_needs_a_port() {
    let config = fast_config().with_auto_start(AutoStart::Manual);
    let mut instance = ServiceInstance::new(ScriptEngine::serving(), config)
        .await
        .unwrap();

    assert!(matches!(instance.connection(), Err(Error::Lifecycle(_))));
    instance.stop().await.unwrap();
}

#[tokio::test]
async fn test_copy_data_from_skips_initialization() {
    let source = tempfile::tempdir().unwrap();
    std::fs::write(source.path().join(INIT_MARKER), "1\n").unwrap();
    std::fs::write(source.path().join("rows.txt"), "seeded\n").unwrap();

    let engine = ScriptEngine::serving();
    let config = fast_config().with_copy_data_from(source.path());
    let mut instance = ServiceInstance::new(engine.clone(), config).await.unwrap();

    assert_eq!(
        std::fs::read_to_string(instance.data_dir().join("rows.txt")).unwrap(),
        "seeded\n"
    );
    assert_eq!(engine.init_count(), 0);

    instance.stop().await.unwrap();
    assert!(source.path().join("rows.txt").exists(), "source must be untouched");
}

#[tokio::test]
async fn test_copy_data_from_refuses_existing_data_dir() {
    let source = tempfile::tempdir().unwrap();
    std::fs::write(source.path().join(INIT_MARKER), "1\n").unwrap();
    std::fs::write(source.path().join("rows.txt"), "seeded\n").unwrap();

    // Left behind by an interrupted earlier copy.
    let temp_dir = tempfile::tempdir().unwrap();
    let base_dir = temp_dir.path().join("instance");
    std::fs::create_dir_all(base_dir.join("data")).unwrap();
    std::fs::write(base_dir.join("data").join(INIT_MARKER), "1\n").unwrap();

    let config = fast_config()
        .with_base_dir(&base_dir)
        .with_copy_data_from(source.path());
    let result = ServiceInstance::new(ScriptEngine::serving(), config).await;

    match result {
        Err(Error::Provisioning(msg)) => assert!(msg.contains("already exists"), "{}", msg),
        Err(other) => panic!("expected a provisioning error, got {}", other),
        Ok(_) => panic!("expected a provisioning error"),
    }
    assert!(!base_dir.join("data/rows.txt").exists());
    assert!(base_dir.join("data").join(INIT_MARKER).exists(), "caller data is left alone");
}

#[tokio::test]
async fn test_copy_data_from_keeps_caller_base_dir_mode() {
    let source = tempfile::tempdir().unwrap();
    std::fs::write(source.path().join(INIT_MARKER), "1\n").unwrap();

    let temp_dir = tempfile::tempdir().unwrap();
    let base_dir = temp_dir.path().join("instance");
    std::fs::create_dir(&base_dir).unwrap();
    std::fs::set_permissions(&base_dir, std::fs::Permissions::from_mode(0o755)).unwrap();

    let config = fast_config()
        .with_base_dir(&base_dir)
        .with_copy_data_from(source.path());
    let mut instance = ServiceInstance::new(ScriptEngine::serving(), config)
        .await
        .unwrap();

    let mode = |path: &std::path::Path| {
        std::fs::metadata(path).unwrap().permissions().mode() & 0o777
    };
    assert_eq!(mode(&base_dir), 0o755);
    assert_eq!(mode(instance.data_dir()), OWNER_ONLY);

    // A restart reuses the clone instead of copying again.
    instance.stop().await.unwrap();
    instance.provision().await.unwrap();
    instance.start().await.unwrap();
    instance.stop().await.unwrap();
}

#[tokio::test]
async fn test_boot_log_is_readable() {
    let script = format!("echo \"listening on $2\"\n{}", SERVE_SCRIPT);
    let mut instance = ServiceInstance::new(ScriptEngine::new(&script), fast_config())
        .await
        .unwrap();

    let port = instance.port().unwrap();
    let log = instance.read_boot_log().await;
    assert!(log.contains(&format!("listening on {}", port)), "log was: {}", log);

    instance.stop().await.unwrap();
}

// =============================================================================
// Failure paths
// =============================================================================

#[tokio::test]
async fn test_crash_during_startup_reports_log() {
    let temp_dir = tempfile::tempdir().unwrap();
    let base_dir = temp_dir.path().join("crash");
    let config = fast_config().with_base_dir(&base_dir);

    let result = ServiceInstance::new(ScriptEngine::new(CRASH_SCRIPT), config).await;

    match result {
        Err(Error::Launch { reason, log, .. }) => {
            assert!(reason.contains("exit status: 3"), "reason was: {}", reason);
            assert!(log.contains("FATAL: boom"), "log was: {}", log);
        }
        Err(other) => panic!("expected a launch error, got {}", other),
        Ok(_) => panic!("expected a launch error"),
    }
    assert!(base_dir.exists(), "explicit base dir must survive a failed start");
}

#[tokio::test]
async fn test_start_timeout_stops_and_cleans_up() {
    let config = fast_config()
        .with_auto_start(AutoStart::Manual)
        .with_start_timeout(Duration::from_millis(300));
    let mut instance = ServiceInstance::new(ScriptEngine::new(HANG_SCRIPT), config)
        .await
        .unwrap();
    let base_dir = instance.base_dir().to_path_buf();
    instance.provision().await.unwrap();

    let err = instance.start().await.unwrap_err();
    assert!(matches!(err, Error::Launch { ref reason, .. } if reason == "timeout"));
    assert!(instance.pid().is_none());
    assert!(!base_dir.exists());
    assert_eq!(instance.state(), Lifecycle::Cleaned);
}

#[tokio::test]
async fn test_failed_initialization_removes_temp_dir() {
    let engine = ScriptEngine::serving().failing_initialize();
    let config = fast_config().with_auto_start(AutoStart::Manual);
    let mut instance = ServiceInstance::new(engine.clone(), config).await.unwrap();
    let base_dir = instance.base_dir().to_path_buf();

    let err = instance.provision().await.unwrap_err();

    assert!(matches!(err, Error::Provisioning(ref msg) if msg == "initialization failed"));
    assert!(!base_dir.exists(), "partial directory must be removed");
    assert_eq!(engine.init_count(), 0);
}

#[tokio::test]
async fn test_failed_initialization_on_auto_start() {
    let result =
        ServiceInstance::new(ScriptEngine::serving().failing_initialize(), fast_config()).await;

    match result {
        Err(Error::Provisioning(msg)) => assert_eq!(msg, "initialization failed"),
        Err(other) => panic!("expected a provisioning error, got {}", other),
        Ok(_) => panic!("expected a provisioning error"),
    }
}

#[tokio::test]
async fn test_failed_clone_leaves_instance_new() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = fast_config()
        .with_auto_start(AutoStart::Manual)
        .with_copy_data_from(temp_dir.path().join("missing"));
    let engine = ScriptEngine::serving();
    let mut instance = ServiceInstance::new(engine.clone(), config).await.unwrap();

    let err = instance.provision().await.unwrap_err();

    assert!(matches!(err, Error::Provisioning(_)));
    assert_eq!(instance.state(), Lifecycle::New);
    assert!(!instance.data_dir().exists());
    assert_eq!(engine.init_count(), 0);

    instance.stop().await.unwrap();
    assert!(!instance.base_dir().exists());
}

#[tokio::test]
async fn test_missing_executable_fails_before_touching_disk() {
    let temp_dir = tempfile::tempdir().unwrap();
    let base_dir = temp_dir.path().join("never-created");
    let engine = ScriptEngine::serving().with_search_paths(SearchPaths::none());

    let result = ServiceInstance::new(engine, fast_config().with_base_dir(&base_dir)).await;

    match result {
        Err(Error::Configuration(msg)) => assert_eq!(msg, "command not found: sh"),
        Err(other) => panic!("expected a configuration error, got {}", other),
        Ok(_) => panic!("expected a configuration error"),
    }
    assert!(!base_dir.exists());
}
