use axum::{
    body::Bytes,
    extract::{Multipart, Path, State, multipart::MultipartError},
    http::{
        HeaderValue, StatusCode,
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
};
use runbox_agent::storage::accept_upload_name;

use crate::error::{ApiError, ApiResult};
use crate::routes::back_to_dashboard;
use crate::state::AppState;

const UPLOAD_FIELD: &str = "file";

fn multipart_error(state: &AppState, err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return ApiError::PayloadTooLarge(format!(
            "file too large (max {})",
            state.config.max_upload_label()
        ));
    }
    ApiError::BadRequest(err.body_text())
}

/// Stores the script and queues a run for it. The response does not wait for
/// installation or launch.
pub async fn upload(State(state): State<AppState>, mut multipart: Multipart) -> ApiResult<Response> {
    let mut upload: Option<(String, Bytes)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(&state, e))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let raw_name = field.file_name().unwrap_or_default().to_string();
        let data = field.bytes().await.map_err(|e| multipart_error(&state, e))?;
        upload = Some((raw_name, data));
        break;
    }

    let Some((raw_name, data)) = upload else {
        return Err(ApiError::BadRequest("no file selected".to_string()));
    };
    let name = accept_upload_name(&raw_name)?;

    state.scripts().save(&name, &data).await?;
    let ticket = state.queue.submit(name.clone()).await;
    tracing::info!(
        filename = %name,
        bytes = data.len(),
        run_id = %ticket.run_id,
        "script uploaded"
    );

    Ok(back_to_dashboard(
        &format!("File uploaded and started with run id: {}", ticket.run_id),
        Some(&ticket.run_id),
    ))
}

pub async fn start(State(state): State<AppState>, Path(filename): Path<String>) -> ApiResult<Response> {
    if !state.scripts().exists(&filename).await {
        return Err(ApiError::NotFound("file not found".to_string()));
    }

    let ticket = state.queue.submit(filename.clone()).await;
    tracing::info!(filename = %filename, run_id = %ticket.run_id, "run requested");

    Ok(back_to_dashboard(
        &format!("File {filename} started with run id: {}", ticket.run_id),
        Some(&ticket.run_id),
    ))
}

/// Stops every run of the script, then removes the file.
pub async fn delete(State(state): State<AppState>, Path(filename): Path<String>) -> ApiResult<Response> {
    if state.scripts().path_of(&filename).is_err() {
        return Err(ApiError::NotFound("file not found".to_string()));
    }

    let stopped = state.manager.stop_by_filename(&filename).await;
    let deleted = state.scripts().delete(&filename).await?;
    tracing::info!(filename = %filename, stopped_runs = stopped.len(), deleted, "script delete");

    if !deleted {
        return Err(ApiError::NotFound("file not found".to_string()));
    }
    Ok(back_to_dashboard(
        &format!("File {filename} deleted successfully"),
        None,
    ))
}

pub async fn download(State(state): State<AppState>, Path(filename): Path<String>) -> ApiResult<Response> {
    let Some(data) = state.scripts().read(&filename).await? else {
        return Err(ApiError::NotFound("file not found".to_string()));
    };

    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{filename}\""))
        .map_err(|e| ApiError::Internal(e.into()))?;
    Ok((
        [
            (CONTENT_TYPE, HeaderValue::from_static("text/x-python")),
            (CONTENT_DISPOSITION, disposition),
        ],
        data,
    )
        .into_response())
}
