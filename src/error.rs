use std::io;
use thiserror::Error;

use crate::account::ResolutionError;
use crate::gate::GateError;
use crate::patch::PatchError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("process error: {0}")]
    Process(String),
    #[error("account error: {0}")]
    Resolution(#[from] ResolutionError),
    #[error("patch error: {0}")]
    Patch(#[from] PatchError),
    #[error("input error: {0}")]
    Gate(#[from] GateError),
}
