//! `/backup`: snapshot creation and restore, run to completion in the handler.

use std::path::{Path, PathBuf};

use serde_json::{json, Map, Value};
use service::backup::BackupConsolidator;
use service::errors::PrefsError;
use service::lifecycle::{InFlight, Outcome};
use service::reply;
use tracing::{error, warn};

use crate::state::ServerState;

pub const CATEGORY: &str = "/backup";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupMethod {
    PreBackup,
    PostRestore,
}

impl BackupMethod {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "preBackup" => Some(Self::PreBackup),
            "postRestore" => Some(Self::PostRestore),
            _ => None,
        }
    }
}

pub fn handle(state: &ServerState, request: InFlight, method: BackupMethod) {
    let payload = request.message().payload();
    let outcome = match method {
        BackupMethod::PreBackup => pre_backup(state, payload),
        BackupMethod::PostRestore => post_restore(state, payload),
    };
    request.finish(outcome);
}

fn payload_object(payload: &str) -> Result<Map<String, Value>, Outcome> {
    match serde_json::from_str::<Value>(payload) {
        Ok(Value::Object(obj)) => Ok(obj),
        Ok(_) => Err(param_error("Payload must have type object")),
        Err(_) => Err(param_error("Cannot parse payload")),
    }
}

fn param_error(text: &str) -> Outcome {
    Outcome::FailedWithPayload(PrefsError::InvalidParam(text.to_string()))
}

/// `{tempDir?}` -> `{files:[path], backupFile:path, returnValue:true}`.
fn pre_backup(state: &ServerState, payload: &str) -> Outcome {
    let params = match payload_object(payload) {
        Ok(params) => params,
        Err(outcome) => return outcome,
    };
    let temp_dir = match params.get("tempDir") {
        None => None,
        Some(Value::String(dir)) => Some(PathBuf::from(dir)),
        Some(_) => return param_error("Parameter \"tempDir\" must have value type string"),
    };
    let storage = &state.config.storage;
    let path = BackupConsolidator::backup_path(temp_dir.as_deref(), &storage.backup_file, &storage.backup_file_name);
    let backup_file = path.to_string_lossy().into_owned();

    match state.backup.create_backup(&path) {
        Ok(_) => Outcome::Completed(
            json!({ "files": [backup_file], "backupFile": backup_file, "returnValue": true }).to_string(),
        ),
        Err(e) => {
            error!(path = %backup_file, error = %e, "backup failed");
            Outcome::Completed(
                json!({
                    "backupFile": backup_file,
                    "errorText": PrefsError::BackupFailed.to_string(),
                    "returnValue": false,
                })
                .to_string(),
            )
        }
    }
}

/// `{tempDir, files:[...]}`: restores every listed file that is a snapshot.
fn post_restore(state: &ServerState, payload: &str) -> Outcome {
    let params = match payload_object(payload) {
        Ok(params) => params,
        Err(outcome) => return outcome,
    };
    let temp_dir = match params.get("tempDir") {
        None => return param_error("Required parameter \"tempDir\" is missing"),
        Some(Value::String(dir)) => dir.as_str(),
        Some(_) => return param_error("Parameter \"tempDir\" must have value type string"),
    };
    let files = match params.get("files") {
        None => return param_error("Required parameter \"files\" is missing"),
        Some(Value::Array(files)) => files,
        Some(_) => return param_error("Parameter \"files\" must have value type array"),
    };

    for path in restore_candidates(temp_dir, files, &state.config.storage.backup_file_name) {
        if let Err(e) = state.restore.apply_restore(&path) {
            error!(path = %path.display(), error = %e, "restore failed");
            return Outcome::Failed(PrefsError::RestoreFailed);
        }
    }
    Outcome::Completed(reply::success_body())
}

/// Snapshot files named in a restore request. Bare file names live in
/// `temp_dir`; entries that are not non-empty strings are skipped.
pub fn restore_candidates(temp_dir: &str, files: &[Value], backup_file_name: &str) -> Vec<PathBuf> {
    files
        .iter()
        .enumerate()
        .filter_map(|(index, entry)| match entry.as_str() {
            Some(file) if !file.is_empty() => Some(file),
            _ => {
                warn!(index, "skipping invalid restore file entry");
                None
            }
        })
        .map(|file| if file.contains('/') { PathBuf::from(file) } else { Path::new(temp_dir).join(file) })
        .filter(|path| path.to_string_lossy().contains(backup_file_name))
        .collect()
}
