//! HTTP routes for uploading files, verifying them and maintaining the ledger.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::MutexGuard;

use axum::{
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

use crate::crypto::{hash_file, sha256_hex};
use crate::model::{Ledger, Record};
use crate::storage::save_ledger;
use crate::AppState;

type ApiError = (StatusCode, String);

/// Build the router over the shared state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/files", get(list_files))
        .route("/upload", post(upload_file))
        .route("/download/:filename", get(download_file))
        .route("/verify", get(verify_ledger))
        .route("/repair", post(repair_ledger))
        .route("/reset", post(reset_ledger))
        .route("/health", get(health))
        .route("/version", get(version))
        .with_state(state)
}

fn lock_ledger(state: &AppState) -> Result<MutexGuard<'_, Ledger>, ApiError> {
    state.ledger.lock().map_err(|_| {
        error!("ledger lock poisoned");
        (StatusCode::INTERNAL_SERVER_ERROR, "ledger unavailable".to_string())
    })
}

fn internal<E: std::fmt::Display>(e: E) -> ApiError {
    error!(error = %e, "request failed");
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

fn error_messages(ledger: &Ledger) -> Vec<String> {
    ledger.validation_errors().iter().map(ToString::to_string).collect()
}

/// Strip a client-supplied name down to a safe single path component.
///
/// Separators become spaces, whitespace runs become `_`, anything outside
/// `[A-Za-z0-9._-]` is dropped and leading/trailing `.`/`_` are trimmed.
pub fn sanitize_filename(raw: &str) -> String {
    let spaced = raw.replace(['/', '\\'], " ");
    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");
    let kept: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    kept.trim_matches(|c| c == '.' || c == '_').to_string()
}

fn format_timestamp(ts: f64) -> String {
    OffsetDateTime::from_unix_timestamp_nanos((ts * 1e9) as i128)
        .ok()
        .and_then(|t| t.format(&Rfc3339).ok())
        .unwrap_or_else(|| ts.to_string())
}

/// GET /files
#[derive(Serialize)]
pub struct FileView {
    pub position: u64,
    pub name: String,
    pub digest: String,
    pub timestamp: String,
}

#[derive(Serialize)]
pub struct FileList {
    pub chain_valid: bool,
    pub validation_errors: Vec<String>,
    pub files: Vec<FileView>,
}

pub async fn list_files(State(state): State<AppState>) -> Result<Json<FileList>, ApiError> {
    let mut ledger = lock_ledger(&state)?;
    let chain_valid = ledger.validate();
    let files = ledger
        .entries()
        .into_iter()
        .map(|e| FileView {
            position: e.position,
            name: e.name,
            digest: e.digest,
            timestamp: format_timestamp(e.timestamp),
        })
        .collect();

    Ok(Json(FileList {
        chain_valid,
        validation_errors: error_messages(&ledger),
        files,
    }))
}

/// POST /upload — multipart form with a `file` field.
#[derive(Serialize)]
pub struct UploadResp {
    pub position: u64,
    pub name: String,
    pub digest: String,
    pub block_hash: String,
}

pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResp>), ApiError> {
    let bad_request = |e: axum::extract::multipart::MultipartError| (StatusCode::BAD_REQUEST, e.to_string());

    // 1) Stream the `file` field to a private temp file in the upload directory
    let mut stored = None;
    while let Some(mut field) = multipart.next_field().await.map_err(bad_request)? {
        if field.name() != Some("file") {
            continue;
        }
        let name = sanitize_filename(field.file_name().unwrap_or_default());
        if name.is_empty() {
            return Err((StatusCode::BAD_REQUEST, "no selected file".into()));
        }

        tokio::fs::create_dir_all(&state.upload_dir).await.map_err(internal)?;
        let pending = PendingUpload::new(&state.upload_dir);
        let mut file = tokio::fs::File::create(&pending.path).await.map_err(internal)?;
        while let Some(chunk) = field.chunk().await.map_err(bad_request)? {
            file.write_all(&chunk).await.map_err(internal)?;
        }
        file.flush().await.map_err(internal)?;
        stored = Some((name, pending));
        break;
    }
    let (name, pending) = stored.ok_or((StatusCode::BAD_REQUEST, "no file part".to_string()))?;

    // 2) Digest the received bytes
    let hash_path = pending.path.clone();
    let digest = tokio::task::spawn_blocking(move || hash_file(&hash_path))
        .await
        .map_err(internal)?
        .map_err(internal)?;

    // 3) Append, re-validate, persist and move the bytes into place under one lock
    let mut ledger = lock_ledger(&state)?;
    if !ledger.validate() {
        let errors = error_messages(&ledger).join(", ");
        warn!(%name, %errors, "upload refused: ledger is invalid");
        return Err((
            StatusCode::CONFLICT,
            format!("ledger integrity check failed: {errors}"),
        ));
    }
    let block = ledger.append(Record::new(name.clone(), digest.clone()));
    if !ledger.validate() {
        let errors = error_messages(&ledger).join(", ");
        warn!(%name, %errors, "ledger invalid after append; not persisted");
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to add file to ledger: {errors}"),
        ));
    }
    save_ledger(&ledger, &state.ledger_path).map_err(internal)?;
    pending
        .commit(&state.upload_dir.join(&name))
        .map_err(internal)?;
    drop(ledger);

    info!(%name, %digest, position = block.index(), "registered upload");
    Ok((
        StatusCode::CREATED,
        Json(UploadResp {
            position: block.index(),
            name,
            digest,
            block_hash: block.hash().to_string(),
        }),
    ))
}

static UPLOAD_SEQ: AtomicU64 = AtomicU64::new(0);

/// Received bytes waiting for their ledger entry to be persisted.
///
/// The temp name starts with a dot, which `sanitize_filename` never yields,
/// so downloads cannot reach it. Removed on drop unless committed.
struct PendingUpload {
    path: PathBuf,
    committed: bool,
}

impl PendingUpload {
    fn new(upload_dir: &std::path::Path) -> Self {
        let seq = UPLOAD_SEQ.fetch_add(1, Ordering::Relaxed);
        let path = upload_dir.join(format!(".upload-{}-{seq}.part", std::process::id()));
        Self {
            path,
            committed: false,
        }
    }

    /// Rename into `dest`, replacing any earlier upload of the same name.
    fn commit(mut self, dest: &std::path::Path) -> std::io::Result<()> {
        std::fs::rename(&self.path, dest)?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for PendingUpload {
    fn drop(&mut self) {
        if !self.committed {
            if let Err(e) = std::fs::remove_file(&self.path) {
                debug!(path = %self.path.display(), error = %e, "could not remove pending upload");
            }
        }
    }
}

/// GET /download/:filename — served only if the ledger is intact and the
/// file still matches its registered digest.
pub async fn download_file(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let not_found = || (StatusCode::NOT_FOUND, "file not found".to_string());
    let name = sanitize_filename(&filename);
    if name.is_empty() {
        return Err(not_found());
    }

    // The bytes that are hashed are the bytes that are served.
    let bytes = match tokio::fs::read(state.upload_dir.join(&name)).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_found()),
        Err(e) => return Err(internal(e)),
    };
    let current = sha256_hex(&bytes);

    let registered = {
        let mut ledger = lock_ledger(&state)?;
        if !ledger.validate() {
            let errors = error_messages(&ledger).join(", ");
            return Err((
                StatusCode::CONFLICT,
                format!("ledger integrity check failed: {errors}"),
            ));
        }
        ledger
            .find_latest_by_name(&name)
            .map(|b| b.record().digest.clone())
    };

    if registered.as_deref() != Some(current.as_str()) {
        warn!(%name, %current, ?registered, "download refused: integrity check failed");
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            "file integrity check failed; the file may have been tampered with".into(),
        ));
    }

    info!(%name, "file integrity verified");
    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{name}\""),
            ),
        ],
        bytes,
    ))
}

/// GET /verify — fail-fast chain validation; returns { ok, errors[] }
#[derive(Serialize)]
pub struct ValidateResp {
    pub ok: bool,
    pub errors: Vec<String>,
}

pub async fn verify_ledger(State(state): State<AppState>) -> Result<Json<ValidateResp>, ApiError> {
    let mut ledger = lock_ledger(&state)?;
    let ok = ledger.validate();
    Ok(Json(ValidateResp {
        ok,
        errors: error_messages(&ledger),
    }))
}

/// POST /repair
#[derive(Serialize)]
pub struct RepairResp {
    pub repaired: bool,
    pub valid: bool,
    pub previous_errors: Vec<String>,
    pub errors: Vec<String>,
}

pub async fn repair_ledger(State(state): State<AppState>) -> Result<Json<RepairResp>, ApiError> {
    let mut ledger = lock_ledger(&state)?;
    if ledger.validate() {
        return Ok(Json(RepairResp {
            repaired: false,
            valid: true,
            previous_errors: Vec::new(),
            errors: Vec::new(),
        }));
    }

    let previous_errors = error_messages(&ledger);
    ledger.repair();
    save_ledger(&ledger, &state.ledger_path).map_err(internal)?;
    let valid = ledger.validate();
    info!(?previous_errors, valid, "ledger repaired");

    Ok(Json(RepairResp {
        repaired: true,
        valid,
        previous_errors,
        errors: error_messages(&ledger),
    }))
}

/// POST /reset
#[derive(Serialize)]
pub struct ResetResp {
    pub blocks: usize,
}

pub async fn reset_ledger(State(state): State<AppState>) -> Result<Json<ResetResp>, ApiError> {
    let mut ledger = lock_ledger(&state)?;
    ledger.reset();
    save_ledger(&ledger, &state.ledger_path).map_err(internal)?;
    warn!("ledger reset to genesis");
    Ok(Json(ResetResp {
        blocks: ledger.len(),
    }))
}

/// GET /health
#[derive(Serialize)]
pub struct Health {
    pub status: &'static str,
}
pub async fn health() -> Json<Health> {
    Json(Health { status: "ok" })
}

/// GET /version
#[derive(Serialize)]
pub struct Version {
    pub version: &'static str,
    pub git_sha: Option<&'static str>,
}
pub async fn version() -> Json<Version> {
    Json(Version {
        version: env!("CARGO_PKG_VERSION"),
        git_sha: option_env!("GIT_SHA"),
    })
}
