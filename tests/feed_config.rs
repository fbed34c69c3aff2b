// tests/feed_config.rs
use feed_sync::config::{FeedConfig, ENV_FEED_CONFIG_PATH};
use std::{env, fs};

const OVERRIDE_VARS: [&str; 6] = [
    "FEED_CACHE_TTL_SECS",
    "FEED_DEFAULT_LIMIT",
    "FEED_MAX_LIMIT",
    "FEED_WINDOW_HOURS",
    "FEED_UPSTREAM_TIMEOUT_SECS",
    "FEED_GENERATOR",
];

fn clear_env() {
    env::remove_var(ENV_FEED_CONFIG_PATH);
    for v in OVERRIDE_VARS {
        env::remove_var(v);
    }
}

#[test]
fn load_from_file_reads_toml() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("feed.toml");
    fs::write(
        &p,
        r#"
cache_ttl_secs = 120
max_limit = 30
fallback_seed = 9

[generator]
provider = "mock"
timeout_secs = 5
"#,
    )
    .unwrap();

    let cfg = FeedConfig::load_from_file(&p).unwrap();
    assert_eq!(cfg.cache_ttl_secs, 120);
    assert_eq!(cfg.max_limit, 30);
    assert_eq!(cfg.default_limit, 15);
    assert_eq!(cfg.fallback_seed, 9);
    assert_eq!(cfg.generator.provider, "mock");
    assert_eq!(cfg.upstream_timeout().as_secs(), 5);
}

#[test]
fn broken_toml_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("feed.toml");
    fs::write(&p, "cache_ttl_secs = \"soon\"").unwrap();
    let err = FeedConfig::load_from_file(&p).unwrap_err();
    assert!(format!("{err:#}").contains("parsing feed config"));
}

#[serial_test::serial]
#[test]
fn default_uses_env_then_fallbacks_then_overrides() {
    // Run from an empty dir so the repo's own config/ is not picked up.
    let old = env::current_dir().unwrap();
    let tmp = tempfile::tempdir().unwrap();
    env::set_current_dir(tmp.path()).unwrap();
    clear_env();

    // 1) Nothing on disk: built-in defaults.
    let d = FeedConfig::load_default().unwrap();
    assert_eq!(d, FeedConfig::default());

    // 2) ./config/feed.toml
    let cfg_dir = tmp.path().join("config");
    fs::create_dir_all(&cfg_dir).unwrap();
    fs::write(cfg_dir.join("feed.toml"), "cache_ttl_secs = 60").unwrap();
    assert_eq!(FeedConfig::load_default().unwrap().cache_ttl_secs, 60);

    // 3) FEED_CONFIG_PATH wins over ./config
    let p_env = tmp.path().join("other.toml");
    fs::write(&p_env, "cache_ttl_secs = 90").unwrap();
    env::set_var(ENV_FEED_CONFIG_PATH, p_env.display().to_string());
    assert_eq!(FeedConfig::load_default().unwrap().cache_ttl_secs, 90);

    // 4) Individual env overrides win over the file; junk values are ignored.
    env::set_var("FEED_CACHE_TTL_SECS", "15");
    env::set_var("FEED_MAX_LIMIT", "not-a-number");
    env::set_var("FEED_GENERATOR", "Mock");
    let o = FeedConfig::load_default().unwrap();
    assert_eq!(o.cache_ttl_secs, 15);
    assert_eq!(o.max_limit, 50);
    assert_eq!(o.generator.provider, "mock");

    // 5) A missing explicit path is an error.
    env::set_var(ENV_FEED_CONFIG_PATH, tmp.path().join("nope.toml"));
    assert!(FeedConfig::load_default().is_err());

    clear_env();
    env::set_current_dir(&old).unwrap();
}

#[serial_test::serial]
#[test]
fn openai_without_key_fails_fast() {
    clear_env();
    let old_key = env::var("OPENAI_API_KEY").ok();
    env::remove_var("OPENAI_API_KEY");
    env::set_var("FEED_GENERATOR", "openai");

    let err = FeedConfig::load_default().unwrap_err();
    assert!(err.to_string().contains("OPENAI_API_KEY"));

    env::set_var("OPENAI_API_KEY", "sk-test");
    let cfg = FeedConfig::load_default().unwrap();
    assert_eq!(cfg.generator.api_key, "sk-test");

    clear_env();
    match old_key {
        Some(k) => env::set_var("OPENAI_API_KEY", k),
        None => env::remove_var("OPENAI_API_KEY"),
    }
}
