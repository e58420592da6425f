// tests/config_env.rs
use deadline_scout::config::{EngineConfig, ENV_CONFIG_PATH, MAX_WORKERS};
use std::{env, fs};

fn clear_env() {
    for k in [
        ENV_CONFIG_PATH,
        "SCOUT_WORKERS",
        "SCOUT_PERSIST_THRESHOLD",
        "SCOUT_MAJOR_SHIFT_DAYS",
    ] {
        env::remove_var(k);
    }
}

#[serial_test::serial]
#[test]
fn default_uses_env_then_fallbacks() {
    // isolate CWD so the repo's own config/ is not picked up
    let old = env::current_dir().unwrap();
    let tmp = tempfile::tempdir().unwrap();
    env::set_current_dir(tmp.path()).unwrap();
    clear_env();

    // 1) nothing on disk: built-in defaults
    let cfg = EngineConfig::load_default().unwrap();
    assert_eq!(cfg.change.major_shift_days, 7);
    assert_eq!(cfg.run.workers, 4);

    // 2) config/scout.toml fallback
    fs::create_dir_all(tmp.path().join("config")).unwrap();
    fs::write(
        tmp.path().join("config/scout.toml"),
        "[scheduler]\nfailure_threshold = 5\n",
    )
    .unwrap();
    let cfg = EngineConfig::load_default().unwrap();
    assert_eq!(cfg.scheduler.failure_threshold, 5);

    // 3) env path wins over the fallback
    let explicit = tmp.path().join("other.toml");
    fs::write(&explicit, "[change]\npersist_threshold = 0.85\n").unwrap();
    env::set_var(ENV_CONFIG_PATH, explicit.display().to_string());
    let cfg = EngineConfig::load_default().unwrap();
    assert!((cfg.change.persist_threshold - 0.85).abs() < 1e-6);
    assert_eq!(cfg.scheduler.failure_threshold, 3);

    // 4) missing env path is an error
    env::set_var(ENV_CONFIG_PATH, tmp.path().join("nope.toml").display().to_string());
    assert!(EngineConfig::load_default().is_err());

    clear_env();
    env::set_current_dir(&old).unwrap();
}

#[serial_test::serial]
#[test]
fn env_overrides_are_clamped() {
    let old = env::current_dir().unwrap();
    let tmp = tempfile::tempdir().unwrap();
    env::set_current_dir(tmp.path()).unwrap();
    clear_env();

    env::set_var("SCOUT_WORKERS", "32");
    env::set_var("SCOUT_PERSIST_THRESHOLD", "1.7");
    env::set_var("SCOUT_MAJOR_SHIFT_DAYS", "not-a-number");
    let cfg = EngineConfig::load_default().unwrap();
    assert_eq!(cfg.run.workers, MAX_WORKERS);
    assert_eq!(cfg.change.persist_threshold, 1.0);
    assert_eq!(cfg.change.major_shift_days, 7);

    clear_env();
    env::set_current_dir(&old).unwrap();
}
