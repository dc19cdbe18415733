use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::AppError;

/// Linux truncates `/proc/<pid>/comm` to this many bytes.
const COMM_MAX_BYTES: usize = 15;

pub trait ProcessMonitor {
    /// Whether a process with exactly this name is alive right now.
    fn is_running(&self, name: &str) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ProcessSource {
    ProcFs,
    Pgrep(PathBuf),
    Tasklist(PathBuf),
}

/// Answers from the live process table of the host.
#[derive(Debug, Clone)]
pub struct SystemProcesses {
    source: ProcessSource,
}

impl SystemProcesses {
    /// Locates whatever the host needs to list processes. Linux reads `/proc` directly;
    /// elsewhere `pgrep` or `tasklist` must be on `PATH`.
    pub fn detect() -> Result<Self, AppError> {
        if cfg!(target_os = "linux") {
            return Ok(Self {
                source: ProcessSource::ProcFs,
            });
        }
        let tool = if cfg!(windows) { "tasklist" } else { "pgrep" };
        let probe = which::which(tool).map_err(|err| {
            AppError::Process(format!(
                "unable to locate `{tool}` to check running processes: {err}"
            ))
        })?;
        let source = if cfg!(windows) {
            ProcessSource::Tasklist(probe)
        } else {
            ProcessSource::Pgrep(probe)
        };
        Ok(Self { source })
    }

    pub fn probe_description(&self) -> String {
        match &self.source {
            ProcessSource::ProcFs => "/proc".to_string(),
            ProcessSource::Pgrep(path) | ProcessSource::Tasklist(path) => {
                path.display().to_string()
            }
        }
    }
}

impl ProcessMonitor for SystemProcesses {
    fn is_running(&self, name: &str) -> bool {
        match &self.source {
            ProcessSource::ProcFs => proc_table_contains(Path::new("/proc"), name),
            ProcessSource::Pgrep(probe) => pgrep_matches(probe, name),
            ProcessSource::Tasklist(probe) => tasklist_matches(probe, name),
        }
    }
}

// An unreadable process table is treated as "running" so the gate stays closed.
fn proc_table_contains(proc_root: &Path, name: &str) -> bool {
    let wanted = truncate_comm(name);
    let entries = match fs::read_dir(proc_root) {
        Ok(entries) => entries,
        Err(_) => return true,
    };
    entries.flatten().any(|entry| {
        let file_name = entry.file_name();
        let is_pid = file_name
            .to_str()
            .is_some_and(|s| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()));
        if !is_pid {
            return false;
        }
        fs::read_to_string(entry.path().join("comm"))
            .map(|comm| comm.trim_end_matches('\n') == wanted)
            .unwrap_or(false)
    })
}

fn truncate_comm(name: &str) -> &str {
    if name.len() <= COMM_MAX_BYTES {
        return name;
    }
    let mut end = COMM_MAX_BYTES;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

fn pgrep_matches(probe: &Path, name: &str) -> bool {
    // pgrep exits 1 when nothing matched and >1 on real failures.
    match Command::new(probe)
        .arg("-x")
        .arg(name)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
    {
        Ok(status) => status.code() != Some(1),
        Err(_) => true,
    }
}

fn tasklist_matches(probe: &Path, name: &str) -> bool {
    let image = windows_image_name(name);
    let output = Command::new(probe)
        .args(["/FI", &format!("IMAGENAME eq {image}"), "/NH", "/FO", "CSV"])
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output();
    match output {
        Ok(output) if output.status.success() => {
            tasklist_output_lists(&String::from_utf8_lossy(&output.stdout), &image)
        }
        _ => true,
    }
}

fn tasklist_output_lists(stdout: &str, image: &str) -> bool {
    let needle = format!("\"{}\"", image.to_ascii_lowercase());
    stdout
        .to_ascii_lowercase()
        .lines()
        .any(|line| line.starts_with(&needle))
}

fn windows_image_name(name: &str) -> String {
    if name.to_ascii_lowercase().ends_with(".exe") {
        name.to_string()
    } else {
        format!("{name}.exe")
    }
}
