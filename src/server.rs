//! HTTP endpoint for single still images, as posted by an ESP32-CAM.
//!
//! `POST /detect-hand` accepts either a `multipart/form-data` upload with the image in a field
//! named `file`, or the raw encoded image as the request body. Responses are JSON:
//!
//! - `200 {"warning": true, "message": ...}` if an open hand was detected (an alert was sent),
//! - `200 {"warning": false, "message": "No open palm detected"}` otherwise,
//! - `400 {"status": "error", "message": "Invalid image"}` if the image cannot be decoded,
//! - `500 {"status": "error", "message": "Detection failed"}` if inference fails.

use std::{future::Future, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, FromRequest, Multipart, Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use tokio::net::TcpListener;

use crate::pipeline::{Pipeline, PipelineError, INVALID_IMAGE};

/// Path of the detection endpoint.
pub const DETECT_PATH: &str = "/detect-hand";

/// Name of the multipart form field carrying the image.
pub const UPLOAD_FIELD: &str = "file";

const DETECTION_FAILED: &str = "Detection failed";

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    status: &'static str,
    message: &'a str,
}

fn error_response(status: StatusCode, message: &str) -> Response {
    let body = ErrorBody {
        status: "error",
        message,
    };
    (status, Json(body)).into_response()
}

/// Builds the application router.
pub fn router(pipeline: Arc<Pipeline>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route(DETECT_PATH, post(detect_hand))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(pipeline)
}

/// Serves `app` on `addr` until `shutdown` completes.
pub async fn serve<F>(addr: SocketAddr, app: Router, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;
    log::info!("listening on http://{}{}", listener.local_addr()?, DETECT_PATH);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server failed")?;
    Ok(())
}

async fn detect_hand(State(pipeline): State<Arc<Pipeline>>, request: Request) -> Response {
    let data = match read_upload(request).await {
        Ok(data) => data,
        Err(response) => return response,
    };
    log::debug!("received {} byte image", data.len());

    match tokio::task::spawn_blocking(move || pipeline.handle_upload(&data)).await {
        Ok(Ok(verdict)) => {
            if verdict.warning {
                log::warn!("open hand detected, alert sent");
            }
            Json(verdict).into_response()
        }
        Ok(Err(PipelineError::InvalidImage(e))) => {
            log::debug!("rejecting upload: {e}");
            error_response(StatusCode::BAD_REQUEST, INVALID_IMAGE)
        }
        Ok(Err(e)) => {
            log::error!("{e}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, DETECTION_FAILED)
        }
        Err(e) => {
            log::error!("detection task failed: {e}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, DETECTION_FAILED)
        }
    }
}

/// Extracts the image bytes from a multipart upload or a raw request body.
async fn read_upload(request: Request) -> Result<Bytes, Response> {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map_or(false, |value| value.starts_with("multipart/form-data"));

    if !is_multipart {
        return Bytes::from_request(request, &())
            .await
            .map_err(IntoResponse::into_response);
    }

    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(IntoResponse::into_response)?;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(IntoResponse::into_response)?
    {
        if field.name() == Some(UPLOAD_FIELD) {
            return field.bytes().await.map_err(IntoResponse::into_response);
        }
    }

    Err(error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        "missing `file` field",
    ))
}

/// Completes when the process receives Ctrl-C.
pub async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => log::info!("received Ctrl-C, shutting down"),
        Err(e) => {
            log::error!("failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    }
}
