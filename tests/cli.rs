use assert_cmd::Command;
use predicates::str::contains;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

const ABSENT_PROCESS: &str = "lp-absent-proc";

const LOGINUSERS: &str = r#""users"
{
	"76561197960265729"
	{
		"AccountName"		"older"
		"MostRecent"		"0"
	}
	"76561197960265730"
	{
		"AccountName"		"farmer"
		"MostRecent"		"1"
	}
}
"#;

const LOCALCONFIG: &str = r#""UserLocalConfigStore"
{
	"Software"
	{
		"Valve"
		{
			"Steam"
			{
				"apps"
				{
					"413150"
					{
						"LastPlayed"		"1700000000"
						"LaunchOptions"		"-old"
					}
				}
			}
		}
	}
}
"#;

fn bin() -> Command {
    let path = assert_cmd::cargo::cargo_bin!("launchpatch");
    Command::new(path)
}

fn parse_json(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).expect("json output")
}

struct Fixture {
    _dir: tempfile::TempDir,
    config_path: PathBuf,
    localconfig: PathBuf,
}

impl Fixture {
    fn backup(&self) -> PathBuf {
        PathBuf::from(format!("{}.bak", self.localconfig.display()))
    }
}

fn write_steam_root(root: &Path, localconfig: &str) -> PathBuf {
    fs::create_dir_all(root.join("config")).unwrap();
    fs::write(root.join("config").join("loginusers.vdf"), LOGINUSERS).unwrap();
    let account_config = root.join("userdata").join("2").join("config");
    fs::create_dir_all(&account_config).unwrap();
    let path = account_config.join("localconfig.vdf");
    fs::write(&path, localconfig).unwrap();
    path
}

fn fixture_with(localconfig: &str, process_name: &str) -> Fixture {
    let dir = tempdir().unwrap();
    let root = dir.path().join("Steam");
    let localconfig_path = write_steam_root(&root, localconfig);
    let config_path = dir.path().join("config.yaml");
    fs::write(
        &config_path,
        format!(
            "version: 1\nsteam:\n  root: '{}'\n  process_name: {}\n",
            root.display(),
            process_name
        ),
    )
    .unwrap();
    Fixture {
        _dir: dir,
        config_path,
        localconfig: localconfig_path,
    }
}

fn fixture() -> Fixture {
    fixture_with(LOCALCONFIG, ABSENT_PROCESS)
}

#[test]
fn config_init_creates_and_preserves_existing() {
    let dir = tempdir().unwrap();
    let config_dir = dir.path().join("config");

    let output = bin()
        .env("LAUNCHPATCH_CONFIG_DIR", &config_dir)
        .arg("--json")
        .arg("config")
        .arg("init")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value = parse_json(&output);
    assert!(value["ok"].as_bool().unwrap());
    assert!(value["result"]["created"].as_bool().unwrap());

    let config_path = config_dir.join("config.yaml");
    let template = fs::read_to_string(&config_path).unwrap();
    assert!(template.contains("app_id: \"413150\""));

    fs::write(&config_path, "sentinel: true\n").unwrap();

    let output = bin()
        .env("LAUNCHPATCH_CONFIG_DIR", &config_dir)
        .arg("--json")
        .arg("config")
        .arg("init")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value = parse_json(&output);
    assert!(!value["result"]["created"].as_bool().unwrap());
    assert_eq!(fs::read_to_string(&config_path).unwrap(), "sentinel: true\n");
}

#[test]
fn config_validate_rejects_unknown_fields() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("config.yaml");
    fs::write(&config_path, "version: 1\nsteam:\n  library: /games\n").unwrap();

    let output = bin()
        .arg("--config")
        .arg(&config_path)
        .arg("--json")
        .arg("config")
        .arg("validate")
        .assert()
        .failure()
        .get_output()
        .stdout
        .clone();

    let value = parse_json(&output);
    assert!(!value["ok"].as_bool().unwrap());
    assert!(value["error"].as_str().unwrap().contains("unknown field"));
}

#[test]
fn account_resolves_short_id() {
    let fx = fixture();
    let output = bin()
        .arg("--config")
        .arg(&fx.config_path)
        .arg("--json")
        .arg("account")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let value = parse_json(&output);
    assert_eq!(value["result"]["account"], "2");
}

#[test]
fn steam_root_flag_overrides_config() {
    let fx = fixture();
    let other = tempdir().unwrap();
    fs::create_dir_all(other.path().join("config")).unwrap();
    fs::write(
        other.path().join("config").join("loginusers.vdf"),
        "\"users\" { \"76561197960265740\" { \"MostRecent\" \"1\" } }",
    )
    .unwrap();

    let output = bin()
        .arg("--config")
        .arg(&fx.config_path)
        .arg("--steam-root")
        .arg(other.path())
        .arg("--json")
        .arg("account")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert_eq!(parse_json(&output)["result"]["account"], "12");
}

#[test]
fn paths_lists_resolved_files() {
    let fx = fixture();
    let output = bin()
        .arg("--config")
        .arg(&fx.config_path)
        .arg("--json")
        .arg("paths")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let value = parse_json(&output);
    assert_eq!(value["result"]["account"], "2");
    assert_eq!(value["result"]["loginusers_exists"], true);
    assert_eq!(
        value["result"]["localconfig"].as_str().unwrap(),
        fx.localconfig.to_string_lossy()
    );
    assert_eq!(value["result"]["process_name"], ABSENT_PROCESS);
}

#[test]
fn show_prints_current_launch_options() {
    let fx = fixture();
    let output = bin()
        .arg("--config")
        .arg(&fx.config_path)
        .arg("--json")
        .arg("show")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let value = parse_json(&output);
    assert_eq!(value["result"]["launch_options"], "-old");
    assert_eq!(value["result"]["app_id"], "413150");
}

#[test]
fn patch_with_yes_writes_value_and_backup() {
    let fx = fixture();
    let output = bin()
        .arg("--config")
        .arg(&fx.config_path)
        .arg("--json")
        .arg("patch")
        .arg("--yes")
        .arg("\"/games/StardewModdingAPI\" %command%")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value = parse_json(&output);
    assert!(value["ok"].as_bool().unwrap());
    assert_eq!(value["result"]["previous"], "-old");
    assert_eq!(fs::read_to_string(fx.backup()).unwrap(), LOCALCONFIG);

    let written = fs::read_to_string(&fx.localconfig).unwrap();
    assert!(written.contains(
        "\"LaunchOptions\"\t\t\"\\\"/games/StardewModdingAPI\\\" %command%\""
    ));
    assert!(written.contains("\"LastPlayed\"\t\t\"1700000000\""));
}

#[test]
fn patch_prompt_rejects_invalid_input_then_accepts() {
    let fx = fixture();
    bin()
        .arg("--config")
        .arg(&fx.config_path)
        .arg("patch")
        .arg("-mods")
        .write_stdin("maybe\n  Y  \n")
        .assert()
        .success()
        .stdout(contains("changed: true"))
        .stderr(contains("That's not a valid option."));

    assert!(fs::read_to_string(&fx.localconfig)
        .unwrap()
        .contains("\"LaunchOptions\"\t\t\"-mods\""));
}

#[test]
fn patch_prompt_can_be_declined() {
    let fx = fixture();
    bin()
        .arg("--config")
        .arg(&fx.config_path)
        .arg("patch")
        .arg("-mods")
        .write_stdin("n\n")
        .assert()
        .success()
        .stdout(contains("cancelled: true"));

    assert_eq!(fs::read_to_string(&fx.localconfig).unwrap(), LOCALCONFIG);
    assert!(!fx.backup().exists());
}

#[test]
fn patch_fails_when_input_closes() {
    let fx = fixture();
    bin()
        .arg("--config")
        .arg(&fx.config_path)
        .arg("patch")
        .arg("-mods")
        .write_stdin("")
        .assert()
        .failure()
        .stderr(contains("input closed"));

    assert_eq!(fs::read_to_string(&fx.localconfig).unwrap(), LOCALCONFIG);
}

#[cfg(target_os = "linux")]
#[test]
fn patch_refuses_while_process_is_running() {
    // The binary under test is itself a running process named "launchpatch".
    let fx = fixture_with(LOCALCONFIG, "launchpatch");
    let output = bin()
        .arg("--config")
        .arg(&fx.config_path)
        .arg("--json")
        .arg("patch")
        .arg("--yes")
        .arg("-mods")
        .assert()
        .failure()
        .get_output()
        .stdout
        .clone();
    let value = parse_json(&output);
    assert!(value["error"].as_str().unwrap().contains("still running"));
    assert_eq!(fs::read_to_string(&fx.localconfig).unwrap(), LOCALCONFIG);
    assert!(!fx.backup().exists());
}

#[test]
fn patch_missing_app_leaves_file_untouched() {
    let without_app = LOCALCONFIG.replace("413150", "570");
    let fx = fixture_with(&without_app, ABSENT_PROCESS);
    let output = bin()
        .arg("--config")
        .arg(&fx.config_path)
        .arg("--json")
        .arg("patch")
        .arg("--yes")
        .arg("-mods")
        .assert()
        .failure()
        .get_output()
        .stdout
        .clone();

    let value = parse_json(&output);
    assert_eq!(value["error_step"], "not_found");
    assert!(value["error"].as_str().unwrap().contains("413150"));
    assert_eq!(fs::read_to_string(&fx.localconfig).unwrap(), without_app);
    assert_eq!(fs::read_to_string(fx.backup()).unwrap(), without_app);
}

#[test]
fn patch_aborts_when_backup_cannot_be_written() {
    let fx = fixture();
    fs::create_dir_all(fx.backup()).unwrap();
    let output = bin()
        .arg("--config")
        .arg(&fx.config_path)
        .arg("--json")
        .arg("patch")
        .arg("--yes")
        .arg("-mods")
        .assert()
        .failure()
        .get_output()
        .stdout
        .clone();

    let value = parse_json(&output);
    assert_eq!(value["error_step"], "backup");
    assert_eq!(fs::read(&fx.localconfig).unwrap(), LOCALCONFIG.as_bytes());
}

#[test]
fn restore_puts_backup_back() {
    let fx = fixture();
    bin()
        .arg("--config")
        .arg(&fx.config_path)
        .arg("patch")
        .arg("--yes")
        .arg("-mods")
        .assert()
        .success();
    assert_ne!(fs::read_to_string(&fx.localconfig).unwrap(), LOCALCONFIG);

    let output = bin()
        .arg("--config")
        .arg(&fx.config_path)
        .arg("--json")
        .arg("restore")
        .arg("--yes")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert!(parse_json(&output)["result"]["restored"].as_bool().unwrap());
    assert_eq!(fs::read_to_string(&fx.localconfig).unwrap(), LOCALCONFIG);
}

#[test]
fn non_steam_distributor_changes_nothing() {
    let fx = fixture();
    let output = bin()
        .arg("--config")
        .arg(&fx.config_path)
        .arg("--json")
        .arg("--distributor")
        .arg("gog")
        .arg("patch")
        .arg("--yes")
        .arg("-mods")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let value = parse_json(&output);
    assert_eq!(value["result"]["changed"], false);
    assert_eq!(value["result"]["distributor"], "gog");
    assert_eq!(fs::read_to_string(&fx.localconfig).unwrap(), LOCALCONFIG);
}

#[cfg(target_os = "linux")]
#[test]
fn default_root_follows_steam_home_symlink() {
    let home = tempdir().unwrap();
    let install = home.path().join(".steam").join("debian-installation");
    write_steam_root(&install, LOCALCONFIG);
    fs::create_dir_all(install.join("steamapps")).unwrap();
    fs::write(
        install.join("steamapps").join("libraryfolders.vdf"),
        "\"libraryfolders\"\n{\n}\n",
    )
    .unwrap();
    std::os::unix::fs::symlink(&install, home.path().join(".steam").join("steam")).unwrap();

    let config_path = home.path().join("config.yaml");
    fs::write(
        &config_path,
        format!("version: 1\nsteam:\n  process_name: {ABSENT_PROCESS}\n"),
    )
    .unwrap();

    let output = bin()
        .env("HOME", home.path())
        .env_remove("SNAP_USER_DATA")
        .arg("--config")
        .arg(&config_path)
        .arg("--json")
        .arg("paths")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let value = parse_json(&output);
    let root = PathBuf::from(value["result"]["steam_root"].as_str().unwrap());
    assert_eq!(
        fs::canonicalize(root).unwrap(),
        fs::canonicalize(&install).unwrap()
    );
    assert_eq!(value["result"]["loginusers_exists"], true);
    assert_eq!(value["result"]["account"], "2");
}
