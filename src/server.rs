use std::io::Write as _;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderValue, StatusCode, header};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use serde::{Deserialize, Serialize};
use tempfile::TempPath;

use crate::document;
use crate::foundation::config::ServerConfig;
use crate::foundation::error::{ConvertError, ConvertResult};
use crate::midi::MidiResult;
use crate::pipeline::{self, ConversionInputs, OutputTarget};
use crate::resolve::{InputRole, ResolvedFile, resolve, resolve_optional};
use crate::service::ConversionService;

/// Body of `POST /convert`.
///
/// Each field is either a server-side file path or the XML document itself. A value whose
/// first non-whitespace character is `<` is taken as a document; anything else is a path.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ConvertRequest {
    /// MSM path or document.
    #[serde(default)]
    pub msm: Option<String>,
    /// MPM path or document.
    #[serde(default)]
    pub mpm: Option<String>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: String,
    kind: &'a str,
}

struct AppState<S> {
    service: Arc<Mutex<S>>,
    scratch_dir: PathBuf,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            scratch_dir: self.scratch_dir.clone(),
        }
    }
}

/// Build the router: `POST /convert` and its `OPTIONS` preflight.
///
/// Conversions are serialized on the service mutex. Each one writes to its own scratch file
/// under `scratch_dir`.
pub fn router<S>(service: Arc<Mutex<S>>, scratch_dir: PathBuf) -> Router
where
    S: ConversionService + Send + 'static,
{
    let state = AppState {
        service,
        scratch_dir,
    };
    Router::new()
        .route("/convert", post(convert::<S>).options(preflight))
        .layer(middleware::map_response(with_cors))
        .with_state(state)
}

/// Bind `config.addr` and serve until Ctrl-C.
pub async fn serve<S>(service: Arc<Mutex<S>>, config: &ServerConfig) -> std::io::Result<()>
where
    S: ConversionService + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    tracing::info!(
        addr = %listener.local_addr()?,
        scratch_dir = %config.scratch_dir.display(),
        "listening"
    );
    axum::serve(listener, router(service, config.scratch_dir.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "cannot listen for Ctrl-C; shutting down");
        return;
    }
    tracing::info!("shutting down");
}

async fn convert<S>(State(state): State<AppState<S>>, body: Bytes) -> Response
where
    S: ConversionService + Send + 'static,
{
    let request: ConvertRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            return error_response(&ConvertError::invalid_input(format!(
                "request body is not valid JSON: {e}"
            )));
        }
    };
    tracing::info!(
        msm = %describe_input(request.msm.as_deref()),
        mpm = %describe_input(request.mpm.as_deref()),
        "convert request"
    );

    match tokio::task::spawn_blocking(move || convert_blocking(&state, request)).await {
        Ok(Ok(midi)) => (
            [(header::CONTENT_TYPE, HeaderValue::from_static("audio/midi"))],
            midi.into_bytes(),
        )
            .into_response(),
        Ok(Err(e)) => error_response(&e),
        Err(e) => error_response(&ConvertError::bridge(format!("conversion task failed: {e}"))),
    }
}

fn convert_blocking<S: ConversionService>(
    state: &AppState<S>,
    request: ConvertRequest,
) -> ConvertResult<MidiResult> {
    // Inline documents live in scratch files until the conversion is done.
    let mut staged = Vec::new();
    let msm = stage_input(request.msm.as_deref(), InputRole::Msm, state, &mut staged)?;
    let mpm = stage_input(request.mpm.as_deref(), InputRole::Mpm, state, &mut staged)?;
    let mpm = mpm.ok_or_else(|| ConvertError::file_not_found("no MPM input file given"))?;
    let inputs = ConversionInputs {
        mei: None,
        msm,
        mpm,
    };

    let mut service = state
        .service
        .lock()
        .map_err(|_| ConvertError::bridge("conversion service lock poisoned"))?;
    pipeline::convert(
        &mut *service,
        &inputs,
        &OutputTarget::Scratch(state.scratch_dir.clone()),
    )
}

fn describe_input(value: Option<&str>) -> String {
    match value {
        None => "-".to_owned(),
        Some(v) if v.trim_start().starts_with('<') => format!("inline ({} bytes)", v.len()),
        Some(v) => v.to_owned(),
    }
}

/// Turn one request field into a resolved file, writing inline XML to a scratch file first.
fn stage_input<S>(
    value: Option<&str>,
    role: InputRole,
    state: &AppState<S>,
    staged: &mut Vec<TempPath>,
) -> ConvertResult<Option<ResolvedFile>> {
    let Some(value) = value else {
        return Ok(None);
    };
    let document = value.trim_start();
    if !document.starts_with('<') {
        return resolve_optional(Some(value), role);
    }

    document::inspect_bytes(document.as_bytes(), role)?;

    let dir = &state.scratch_dir;
    std::fs::create_dir_all(dir).map_err(|e| {
        ConvertError::write(format!(
            "cannot create scratch directory '{}': {e}",
            dir.display()
        ))
    })?;
    let mut file = tempfile::Builder::new()
        .prefix("mpm2midi-")
        .suffix(&format!(".{}", role.to_string().to_lowercase()))
        .tempfile_in(dir)
        .map_err(|e| ConvertError::write(format!("cannot stage inline {role}: {e}")))?;
    file.write_all(document.as_bytes())
        .and_then(|_| file.flush())
        .map_err(|e| ConvertError::write(format!("cannot stage inline {role}: {e}")))?;
    let path = file.into_temp_path();

    let resolved = resolve(&path, role)?;
    tracing::debug!(%role, path = %resolved.path().display(), "staged inline document");
    staged.push(path);
    Ok(Some(resolved))
}

async fn preflight() -> impl IntoResponse {
    (
        StatusCode::OK,
        [
            (header::ALLOW, "OPTIONS, POST"),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, "*"),
        ],
    )
}

async fn with_cors(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
    response
}

fn error_response(err: &ConvertError) -> Response {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    tracing::warn!(status = status.as_u16(), error = %err, "convert request failed");
    (
        status,
        axum::Json(ErrorBody {
            error: err.to_string(),
            kind: err.kind(),
        }),
    )
        .into_response()
}
