use std::time::Duration;
use std::{env, fs};

use octofhir_ciba::config::loader::load_config;
use octofhir_ciba::token::AtHashMode;

#[test]
fn config_loading_env_overrides_and_validation() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("ciba.toml");

    let toml_content = r#"
issuer = "https://auth.example.com"
token_endpoint = "https://auth.example.com/token"

[session]
default_expiry = "3m"
max_expiry = "10m"
poll_interval = "2s"

[tokens]
access_token_lifetime = "15m"
at_hash = "legacy_hex_prefix"

[client_auth]
fail_closed_on_unknown_method = true

[notifications]
callback_signing_secret = "cb-secret"

[logging]
level = "debug"
"#;
    fs::write(&path, toml_content).expect("write toml");

    // 1) Valid config parses
    let cfg = load_config(path.to_str()).expect("should parse config");
    assert_eq!(cfg.issuer, "https://auth.example.com");
    assert_eq!(cfg.session.default_expiry, Duration::from_secs(180));
    assert_eq!(cfg.session.max_expiry, Duration::from_secs(600));
    assert_eq!(cfg.session.poll_interval, Duration::from_secs(2));
    assert_eq!(cfg.session.consent_wait_timeout, Duration::from_secs(30));
    assert_eq!(cfg.tokens.access_token_lifetime, Duration::from_secs(900));
    assert_eq!(cfg.tokens.at_hash, AtHashMode::LegacyHexPrefix);
    assert!(cfg.client_auth.fail_closed_on_unknown_method);
    assert_eq!(cfg.notifications.callback_signing_secret.as_deref(), Some("cb-secret"));
    assert_eq!(cfg.logging.level, "debug");

    // 2) Env override wins over file
    unsafe {
        env::set_var("CIBA__SESSION__POLL_INTERVAL", "10s");
    }
    let cfg_env = load_config(path.to_str()).expect("should parse config with env overrides");
    assert_eq!(cfg_env.session.poll_interval, Duration::from_secs(10));
    unsafe {
        env::remove_var("CIBA__SESSION__POLL_INTERVAL");
    }

    // 3) Invalid config is rejected
    let invalid_path = dir.path().join("invalid.toml");
    let invalid_toml = r#"
issuer = "https://auth.example.com"
token_endpoint = "/token"
"#;
    fs::write(&invalid_path, invalid_toml).expect("write invalid toml");
    let err = load_config(invalid_path.to_str()).expect_err("expected validation error");
    assert!(err.to_string().contains("token_endpoint"));
}
