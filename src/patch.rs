//! Backup-then-patch of a Steam account's `localconfig.vdf`.

use serde::Serialize;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

use crate::account::{self, ResolutionError, ShortId};
use crate::report::Reporter;
use crate::vdf::{self, display_key_path, DecodeOptions, Node};

pub const BACKUP_SUFFIX: &str = ".bak";
pub const LAUNCH_OPTIONS_KEY: &str = "LaunchOptions";

const APPS_PATH: [&str; 5] = ["UserLocalConfigStore", "Software", "Valve", "Steam", "apps"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchStep {
    Read,
    Backup,
    Parse,
    NotFound,
    Write,
}

impl fmt::Display for PatchStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PatchStep::Read => "read",
            PatchStep::Backup => "backup",
            PatchStep::Parse => "parse",
            PatchStep::NotFound => "not found",
            PatchStep::Write => "write",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
#[error("step '{step}' failed for {}: {detail}", .path.display())]
pub struct PatchError {
    pub step: PatchStep,
    pub path: PathBuf,
    pub detail: String,
}

impl PatchError {
    fn new(step: PatchStep, path: &Path, detail: impl Into<String>) -> Self {
        Self {
            step,
            path: path.to_path_buf(),
            detail: detail.into(),
        }
    }
}

/// Where Steam keeps the files this crate touches, relative to its install root.
#[derive(Debug, Clone)]
pub struct SteamLayout {
    pub root: PathBuf,
}

impl SteamLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn loginusers_path(&self) -> PathBuf {
        self.root.join("config").join("loginusers.vdf")
    }

    pub fn localconfig_path(&self, account: &ShortId) -> PathBuf {
        self.root
            .join("userdata")
            .join(account.as_str())
            .join("config")
            .join("localconfig.vdf")
    }
}

/// The application block whose launch options get rewritten.
#[derive(Debug, Clone)]
pub struct LaunchTarget {
    pub app_id: String,
}

impl LaunchTarget {
    pub fn new(app_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
        }
    }

    pub fn app_path(&self) -> Vec<&str> {
        let mut path = APPS_PATH.to_vec();
        path.push(self.app_id.as_str());
        path
    }

    pub fn field_path(&self) -> Vec<&str> {
        let mut path = self.app_path();
        path.push(LAUNCH_OPTIONS_KEY);
        path
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PatchReport {
    pub path: PathBuf,
    pub backup_path: PathBuf,
    pub previous: Option<String>,
    pub value: String,
}

pub fn backup_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(BACKUP_SUFFIX);
    PathBuf::from(name)
}

pub struct Patcher {
    pub layout: SteamLayout,
    pub target: LaunchTarget,
    pub decode: DecodeOptions,
}

impl Patcher {
    pub fn new(layout: SteamLayout, target: LaunchTarget, decode: DecodeOptions) -> Self {
        Self {
            layout,
            target,
            decode,
        }
    }

    pub fn active_account(&self) -> Result<ShortId, ResolutionError> {
        account::resolve_active_account(&self.layout.loginusers_path(), &self.decode)
    }

    /// Each step gates the next: nothing is written to `localconfig.vdf` unless the
    /// backup landed and the app block was found.
    pub fn patch_launch_options(
        &self,
        account: &ShortId,
        new_value: &str,
        reporter: &dyn Reporter,
    ) -> Result<PatchReport, PatchError> {
        let path = self.layout.localconfig_path(account);
        let contents = read_text(&path)?;

        let backup_path = backup_path_for(&path);
        fs::write(&backup_path, &contents).map_err(|err| {
            PatchError::new(
                PatchStep::Backup,
                &path,
                format!("could not write {}: {err}", backup_path.display()),
            )
        })?;
        reporter.info(&format!("Backed up localconfig to {}.", backup_path.display()));

        let mut document = self.parse(&path, &contents)?;
        let app_path = self.target.app_path();
        if document.navigate(&app_path).and_then(Node::as_mapping).is_none() {
            return Err(PatchError::new(
                PatchStep::NotFound,
                &path,
                format!(
                    "app {} is not registered for this account (missing {})",
                    self.target.app_id,
                    display_key_path(&app_path)
                ),
            ));
        }

        let previous = document
            .set_scalar(&self.target.field_path(), new_value)
            .map_err(|err| PatchError::new(PatchStep::NotFound, &path, err.to_string()))?
            .and_then(|node| node.as_scalar().map(str::to_string));

        let output = vdf::encode(&document);
        write_atomic_text_file_preserving_mode(&path, &output).map_err(|err| {
            PatchError::new(
                PatchStep::Write,
                &path,
                format!(
                    "{err}; the original contents are preserved in {}",
                    backup_path.display()
                ),
            )
        })?;

        Ok(PatchReport {
            path,
            backup_path,
            previous,
            value: new_value.to_string(),
        })
    }

    /// Current launch options of the target app; `None` when the app has none set.
    pub fn read_launch_options(&self, account: &ShortId) -> Result<Option<String>, PatchError> {
        let path = self.layout.localconfig_path(account);
        let contents = read_text(&path)?;
        let document = self.parse(&path, &contents)?;
        let app_path = self.target.app_path();
        let app = document
            .navigate(&app_path)
            .and_then(Node::as_mapping)
            .ok_or_else(|| {
                PatchError::new(
                    PatchStep::NotFound,
                    &path,
                    format!("missing {}", display_key_path(&app_path)),
                )
            })?;
        Ok(app
            .get(LAUNCH_OPTIONS_KEY)
            .and_then(Node::as_scalar)
            .map(str::to_string))
    }

    /// Puts the last backup back in place. The backup must still parse.
    pub fn restore_backup(
        &self,
        account: &ShortId,
        reporter: &dyn Reporter,
    ) -> Result<PathBuf, PatchError> {
        let path = self.layout.localconfig_path(account);
        let backup_path = backup_path_for(&path);
        let contents = read_text(&backup_path)?;
        self.parse(&backup_path, &contents)?;
        write_atomic_text_file_preserving_mode(&path, &contents)
            .map_err(|err| PatchError::new(PatchStep::Write, &path, err.to_string()))?;
        reporter.info(&format!("Restored {} from backup.", path.display()));
        Ok(path)
    }

    fn parse(&self, path: &Path, contents: &str) -> Result<Node, PatchError> {
        vdf::decode_with(contents, &self.decode)
            .map_err(|err| PatchError::new(PatchStep::Parse, path, err.to_string()))
    }
}

fn read_text(path: &Path) -> Result<String, PatchError> {
    fs::read_to_string(path).map_err(|err| PatchError::new(PatchStep::Read, path, err.to_string()))
}

fn write_atomic_text_file(path: &Path, content: &str, mode: Option<u32>) -> io::Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let pid = std::process::id();
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let tmp_path = parent.join(format!(
        ".{}.tmp.{}.{}",
        path.file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "launchpatch".to_string()),
        pid,
        ts
    ));

    fs::write(&tmp_path, content)?;
    if let Err(err) = apply_mode(&tmp_path, mode).and_then(|()| fs::rename(&tmp_path, path)) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }
    Ok(())
}

#[cfg(unix)]
fn apply_mode(path: &Path, mode: Option<u32>) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    match mode {
        Some(mode) => fs::set_permissions(path, fs::Permissions::from_mode(mode)),
        None => Ok(()),
    }
}

#[cfg(not(unix))]
fn apply_mode(_path: &Path, _mode: Option<u32>) -> io::Result<()> {
    Ok(())
}

fn write_atomic_text_file_preserving_mode(path: &Path, content: &str) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(path).map(|m| m.permissions().mode()).ok();
        return write_atomic_text_file(path, content, mode);
    }
    #[cfg(not(unix))]
    {
        write_atomic_text_file(path, content, None)
    }
}
