//! API route handlers.

use anyhow::Context;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::{AppConfig, OutputConfig};
use crate::error::ScrapeError;
use crate::guard::{site_now, UpdateGuard, UpdatePermit};
use crate::output::{timestamp, OutputDocuments};
use crate::scraper::{RaceScraper, ScrapeRequest};
use crate::types::{HealthResponse, UpdateRequest, UpdateResponse};

/// Application state shared across handlers.
pub struct AppState {
    pub scraper: RaceScraper,
    pub config: AppConfig,
    pub update_guard: UpdateGuard,
}

impl UpdateResponse {
    pub fn status_code(&self) -> StatusCode {
        match self {
            UpdateResponse::Ok { .. } | UpdateResponse::Aborted { .. } => StatusCode::OK,
            UpdateResponse::Busy { .. } => StatusCode::CONFLICT,
            UpdateResponse::Error { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for UpdateResponse {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self)).into_response()
    }
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Scrape and republish the race documents.
///
/// Only one update runs at a time; a request arriving meanwhile gets 409.
/// A malformed body is treated as an empty one.
pub async fn update_race(State(state): State<Arc<AppState>>, body: Bytes) -> UpdateResponse {
    let Some(permit) = state.update_guard.try_acquire() else {
        return UpdateResponse::Busy {
            message: "Update already running".to_string(),
        };
    };

    let req: UpdateRequest = if body.is_empty() {
        UpdateRequest::default()
    } else {
        serde_json::from_slice(&body).unwrap_or_else(|e| {
            debug!(error = %e, "Ignoring unreadable update body");
            UpdateRequest::default()
        })
    };

    match run_update(&state, req.into(), permit).await {
        Ok(response) => response,
        Err(ScrapeError::Abort { reason, .. }) => {
            warn!(%reason, "Update aborted");
            UpdateResponse::Aborted { reason }
        }
        Err(ScrapeError::Unexpected(e)) => {
            let error = format!("{e:#}");
            error!(%error, "Update failed");
            UpdateResponse::Error { error }
        }
    }
}

async fn run_update(
    state: &AppState,
    req: ScrapeRequest,
    permit: UpdatePermit,
) -> Result<UpdateResponse, ScrapeError> {
    let data = state.scraper.scrape(&req).await?;

    let generated_at = timestamp(site_now(&state.config.guard));
    let documents = OutputDocuments::build(&data, Some(&generated_at))
        .context("failed to serialise output documents")?;

    let written = spawn_persist(documents, state.config.output.clone(), permit)
        .await
        .context("output writer panicked")?
        .context("failed to write output documents")?;

    info!(path = %written.display(), %generated_at, "Race data updated");
    Ok(UpdateResponse::Ok {
        written_to: written.display().to_string(),
        generated_at,
    })
}

/// Write the documents on the blocking pool. The permit is released only
/// once the write is over, even if the request that started it is dropped.
fn spawn_persist(
    documents: OutputDocuments,
    output: OutputConfig,
    permit: UpdatePermit,
) -> tokio::task::JoinHandle<std::io::Result<std::path::PathBuf>> {
    tokio::task::spawn_blocking(move || {
        let written = documents.persist(&output);
        drop(permit);
        written
    })
}
