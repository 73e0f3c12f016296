// tests/config_load.rs
use std::path::PathBuf;
use std::{env, fs};

use trending_ingest::config::{
    ENV_BATCH_ROWS, ENV_CONFIG_PATH, ENV_DATABASE_PATH, ENV_LISTEN_ADDR, ENV_RAW_DIR,
};
use trending_ingest::{ErrorKind, IngestConfig};

fn clear_env() {
    for key in [
        ENV_CONFIG_PATH,
        ENV_DATABASE_PATH,
        ENV_RAW_DIR,
        ENV_BATCH_ROWS,
        ENV_LISTEN_ADDR,
    ] {
        env::remove_var(key);
    }
}

#[test]
fn explicit_toml_and_json_files() {
    let dir = tempfile::tempdir().unwrap();

    let p_toml = dir.path().join("ingest.toml");
    fs::write(
        &p_toml,
        r#"
database_path = "/var/lib/trending/youtube.db"
batch_rows = 250
"#,
    )
    .unwrap();
    let t = IngestConfig::load_from(&p_toml).unwrap();
    assert_eq!(t.database_path, PathBuf::from("/var/lib/trending/youtube.db"));
    assert_eq!(t.batch_rows, 250);
    assert_eq!(t.videos_file, "GBvideos.csv");

    let p_json = dir.path().join("ingest.json");
    fs::write(&p_json, r#"{"batch_rows": 99999, "raw_dir": "in"}"#).unwrap();
    let j = IngestConfig::load_from(&p_json).unwrap();
    assert_eq!(j.batch_rows, 3000, "clamped to the statement ceiling");
    assert_eq!(j.categories_path(), PathBuf::from("in/GB_category_id.json"));

    let bad = dir.path().join("bad.toml");
    fs::write(&bad, "batch_rows = \"many\"").unwrap();
    assert_eq!(
        IngestConfig::load_from(&bad).unwrap_err().kind(),
        ErrorKind::Config
    );
}

#[serial_test::serial]
#[test]
fn default_uses_env_then_fallbacks() {
    // Isolate CWD so the repo's own config/ is not picked up.
    let old = env::current_dir().unwrap();
    let tmp = tempfile::tempdir().unwrap();
    env::set_current_dir(tmp.path()).unwrap();
    clear_env();

    // 1) nothing present -> built-in defaults
    assert_eq!(IngestConfig::load_default().unwrap(), IngestConfig::default());

    // 2) ./config/ingest.toml fallback
    let cfg_dir = tmp.path().join("config");
    fs::create_dir_all(&cfg_dir).unwrap();
    fs::write(cfg_dir.join("ingest.toml"), r#"raw_dir = "from-toml""#).unwrap();
    assert_eq!(
        IngestConfig::load_default().unwrap().raw_dir,
        PathBuf::from("from-toml")
    );

    // 3) explicit path in env wins over the fallback
    let p_env = tmp.path().join("elsewhere.json");
    fs::write(&p_env, r#"{"raw_dir": "from-env-file"}"#).unwrap();
    env::set_var(ENV_CONFIG_PATH, p_env.display().to_string());
    assert_eq!(
        IngestConfig::load_default().unwrap().raw_dir,
        PathBuf::from("from-env-file")
    );

    // 4) a dangling env path is a config error, not a silent default
    env::set_var(ENV_CONFIG_PATH, tmp.path().join("missing.toml").display().to_string());
    assert_eq!(
        IngestConfig::load_default().unwrap_err().kind(),
        ErrorKind::Config
    );

    clear_env();
    env::set_current_dir(&old).unwrap();
}

#[serial_test::serial]
#[test]
fn single_value_overrides() {
    let old = env::current_dir().unwrap();
    let tmp = tempfile::tempdir().unwrap();
    env::set_current_dir(tmp.path()).unwrap();
    clear_env();

    env::set_var(ENV_DATABASE_PATH, "override.db");
    env::set_var(ENV_RAW_DIR, "raw-override");
    env::set_var(ENV_BATCH_ROWS, " 0 ");
    env::set_var(ENV_LISTEN_ADDR, "127.0.0.1:9999");
    let cfg = IngestConfig::load_default().unwrap();
    assert_eq!(cfg.database_path, PathBuf::from("override.db"));
    assert_eq!(cfg.videos_path(), PathBuf::from("raw-override/GBvideos.csv"));
    assert_eq!(cfg.batch_rows, 1);
    assert_eq!(cfg.listen_addr, "127.0.0.1:9999");

    env::set_var(ENV_BATCH_ROWS, "lots");
    assert_eq!(
        IngestConfig::load_default().unwrap_err().kind(),
        ErrorKind::Config
    );

    clear_env();
    env::set_current_dir(&old).unwrap();
}
