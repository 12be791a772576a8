use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;

pub const CLUSTER_FORM: &str = r#"
[[controls]]
id = "details"
type = "step"
name = "Details"

[[controls]]
id = "name"
type = "text"
validation = { required = true }

[[controls]]
id = "region"
type = "singleselect"
fetch_available = { query = "regions", empty_desc = "No regions" }

[[controls]]
id = "pools"
type = "group"

[[controls.controls]]
id = "size"
type = "number"

[[controls]]
id = "confirm"
type = "review"
name = "Review"
"#;

pub fn new_command_with_temp_home() -> (Command, tempfile::TempDir) {
    let temp_home = tempfile::tempdir().expect("temp home");
    let binary = assert_cmd::cargo::cargo_bin!("ctlpanel");
    let mut command = Command::new(binary);
    command.env("HOME", temp_home.path());
    command.env("XDG_CONFIG_HOME", temp_home.path().join(".config"));
    command.env_remove("RUST_LOG");
    (command, temp_home)
}

pub fn write_form(dir: &Path) -> PathBuf {
    let path = dir.join("cluster.toml");
    fs::write(&path, CLUSTER_FORM).expect("write form");
    path
}

pub fn write_config(home: &Path, raw: &str) {
    let config_dir = home.join(".config").join("ctlpanel");
    fs::create_dir_all(&config_dir).expect("create config dir");
    fs::write(config_dir.join("config.toml"), raw).expect("write config");
}
