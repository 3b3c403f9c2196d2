use std::collections::HashMap;
use std::time::Duration;

use tokio_test::{assert_err, assert_ok};

use tcprelay::config::{options, ConfigManager};
use tcprelay::{ProxyConfig, RemoteEndpoint};

#[test]
fn test_missing_file_gives_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = assert_ok!(ConfigManager::load_from_file(&dir.path().join("absent.toml")));

    assert!(config.remotes.is_empty());
    assert_eq!(config.local_port, 5000);
    assert_eq!(config.buffer_size, 8192);
    assert_eq!(config.timeout, Duration::from_secs(300));
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_save_and_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("tcprelay.toml");

    let mut config = ProxyConfig::default();
    config.remotes = vec![
        RemoteEndpoint::new("10.0.0.1", 1000),
        RemoteEndpoint::new("::1", 2000),
    ];
    config.local_port = 6000;
    config.timeout = Duration::from_secs(90);
    config.logging.log_data = true;

    assert_ok!(ConfigManager::save_to_file(&config, &path));
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("[::1]:2000"), "{}", text);

    let loaded = assert_ok!(ConfigManager::load_from_file(&path));
    assert_eq!(loaded.remotes, config.remotes);
    assert_eq!(loaded.local_port, 6000);
    assert_eq!(loaded.timeout, Duration::from_secs(90));
    assert!(loaded.logging.log_data);
}

#[test]
fn test_partial_file_keeps_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tcprelay.toml");
    std::fs::write(
        &path,
        "remotes = [\"modem.local:2000\"]\ntimeout = \"30s\"\n\n[logging]\nlevel = \"debug\"\n",
    )
    .unwrap();

    let config = assert_ok!(ConfigManager::load_from_file(&path));
    assert_eq!(config.remotes, vec![RemoteEndpoint::new("modem.local", 2000)]);
    assert_eq!(config.timeout, Duration::from_secs(30));
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.buffer_size, 8192);
}

#[test]
fn test_invalid_files_are_rejected() {
    let dir = tempfile::tempdir().unwrap();

    let bad_endpoint = dir.path().join("endpoint.toml");
    std::fs::write(&bad_endpoint, "remotes = [\"nowhere\"]\n").unwrap();
    assert_err!(ConfigManager::load_from_file(&bad_endpoint));

    let bad_buffer = dir.path().join("buffer.toml");
    std::fs::write(&bad_buffer, "buffer_size = 0\n").unwrap();
    let err = ConfigManager::load_from_file(&bad_buffer).unwrap_err();
    assert!(format!("{:#}", err).contains("buffer_size"));

    let not_toml = dir.path().join("garbage.toml");
    std::fs::write(&not_toml, "this is not = = toml").unwrap();
    assert_err!(ConfigManager::load_from_file(&not_toml));
}

#[test]
fn test_environment_overrides() {
    let env: HashMap<&str, &str> = [
        ("TCPRELAY_REMOTES", "10.0.0.1:1000,10.0.0.2:2000"),
        ("TCPRELAY_LOCAL_PORT", "7000"),
        ("TCPRELAY_TIMEOUT", "0"),
        ("TCPRELAY_LOG_DATA", "true"),
    ]
    .into_iter()
    .collect();

    let mut config = ProxyConfig::default();
    assert_ok!(ConfigManager::apply_env_from(&mut config, |name| {
        env.get(name).map(|v| v.to_string())
    }));

    assert_eq!(config.remotes.len(), 2);
    assert_eq!(config.local_port, 7000);
    assert_eq!(config.io_timeout(), None);
    assert!(config.logging.log_data);
    assert_eq!(config.buffer_size, 8192);
}

#[test]
fn test_invalid_environment_names_the_variable() {
    let mut config = ProxyConfig::default();
    let err = ConfigManager::apply_env_from(&mut config, |name| {
        (name == "TCPRELAY_BUFFER_SIZE").then(|| "lots".to_string())
    })
    .unwrap_err();
    assert!(err.to_string().contains("TCPRELAY_BUFFER_SIZE"));
}

#[test]
fn test_cli_overrides_win() {
    let mut config = ProxyConfig::default();
    config.remotes = vec![RemoteEndpoint::new("10.0.0.1", 1000)];

    config.merge_with_cli_args(&[], None, Some(6001), None, Some(10));
    assert_eq!(config.remotes.len(), 1);
    assert_eq!(config.local_port, 6001);
    assert_eq!(config.timeout, Duration::from_secs(10));

    let cli_remotes = vec![RemoteEndpoint::new("10.0.0.9", 9000)];
    config.merge_with_cli_args(
        &cli_remotes,
        Some("127.0.0.1".parse().unwrap()),
        None,
        Some(1024),
        None,
    );
    assert_eq!(config.remotes, cli_remotes);
    assert_eq!(config.listen_addr().to_string(), "127.0.0.1:6001");
    assert_eq!(config.buffer_size, 1024);

    assert_ok!(options::apply_assignment(&mut config, "buffer-size=2048"));
    assert_eq!(config.buffer_size, 2048);
    assert_ok!(config.validate());
}

#[test]
fn test_empty_remotes_still_validate() {
    assert_ok!(ProxyConfig::default().validate());
}

#[test]
fn test_environment_fills_keys_the_file_omits() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tcprelay.toml");
    std::fs::write(&path, "local_port = 6500\n\n[logging]\nlevel = \"warn\"\n").unwrap();

    let env: HashMap<&str, &str> = [
        ("TCPRELAY_REMOTES", "10.0.0.1:1000"),
        ("TCPRELAY_LOCAL_PORT", "7000"),
        ("TCPRELAY_LOG_DATA", "true"),
    ]
    .into_iter()
    .collect();

    let config = assert_ok!(ConfigManager::load_layered(&path, |name| {
        env.get(name).map(|v| v.to_string())
    }));

    // Environment beats defaults, the file beats the environment
    assert_eq!(config.remotes, vec![RemoteEndpoint::new("10.0.0.1", 1000)]);
    assert!(config.logging.log_data);
    assert_eq!(config.local_port, 6500);
    assert_eq!(config.logging.level, "warn");
    assert_eq!(config.buffer_size, 8192);
}

#[test]
fn test_environment_applies_without_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = assert_ok!(ConfigManager::load_layered(
        &dir.path().join("absent.toml"),
        |name| (name == "TCPRELAY_TIMEOUT").then(|| "2m".to_string()),
    ));
    assert_eq!(config.timeout, Duration::from_secs(120));
}
