use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode};
use axum::middleware::Next;
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::sync::Arc;
use tera::{Context as TeraContext, Tera};
use tracing::{info, warn};

use super::models::{
    ErrorResponse, ExtractRequest, ExtractResponse, ImageGenerationRequest,
    ImageGenerationResponse, SpeechRequest, SpeechResponse, SpeechSegment,
};
use super::state::ServerState;
use crate::aggregator::{AggregateMode, aggregate};
use crate::data;
use crate::error::PipelineError;
use crate::paths;
use crate::pipeline::Pipeline;
use crate::prompt::require_text;
use crate::providers::{ImageProvider, ImageReference, OcrProvider, SpeechProvider};
use crate::settings;
use crate::synthesis::{AudioOutput, joined_bytes};

const INDEX_TEMPLATE: &str = include_str!("templates/index.html.tera");

type ApiError = (StatusCode, Json<ErrorResponse>);

pub async fn run_server<O, S, I>(
    settings: settings::Settings,
    pipeline: Pipeline<O, S, I>,
    addr: String,
) -> Result<()>
where
    O: OcrProvider + 'static,
    S: SpeechProvider + 'static,
    I: ImageProvider + 'static,
{
    let app = router(settings, pipeline)?;
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| "failed to bind server address")?;
    info!("server: listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

pub(crate) fn router<O, S, I>(
    settings: settings::Settings,
    pipeline: Pipeline<O, S, I>,
) -> Result<Router>
where
    O: OcrProvider + 'static,
    S: SpeechProvider + 'static,
    I: ImageProvider + 'static,
{
    let index = Arc::new(render_index(&settings)?);
    let body_limit = settings.server_max_body_mb.get().saturating_mul(1024 * 1024);
    let state = Arc::new(ServerState {
        tmp_dir: paths::server_tmp_dir(settings.server_tmp_dir.as_deref()),
        settings,
        pipeline,
    });
    let app = Router::new()
        .route(
            "/",
            get(move || {
                let index = index.clone();
                async move { Html((*index).clone()) }
            }),
        )
        .route("/health", get(health))
        .route("/extract", post(extract::<O, S, I>))
        .route("/speech", post(speech::<O, S, I>))
        .route("/image", post(image::<O, S, I>))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(axum::middleware::from_fn(cors_middleware));
    Ok(app)
}

fn render_index(settings: &settings::Settings) -> Result<String> {
    let mut context = TeraContext::new();
    context.insert("language_code", &settings.language_code);
    context.insert("voice", &settings.voice);
    context.insert("max_chunk", &settings.max_chunk.get());
    context.insert("max_body_mb", &settings.server_max_body_mb.get());
    Tera::one_off(INDEX_TEMPLATE, &context, true).with_context(|| "failed to render index page")
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

async fn cors_middleware(req: Request<Body>, next: Next) -> Result<Response<Body>, StatusCode> {
    if req.method() == Method::OPTIONS {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        apply_cors_headers(response.headers_mut());
        return Ok(response);
    }
    let mut response = next.run(req).await;
    apply_cors_headers(response.headers_mut());
    Ok(response)
}

fn apply_cors_headers(headers: &mut HeaderMap) {
    headers.insert("access-control-allow-origin", HeaderValue::from_static("*"));
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static("GET,POST,OPTIONS"),
    );
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static("content-type,authorization"),
    );
}

async fn extract<O, S, I>(
    State(state): State<Arc<ServerState<O, S, I>>>,
    Json(payload): Json<ExtractRequest>,
) -> Result<Json<ExtractResponse>, ApiError>
where
    O: OcrProvider + 'static,
    S: SpeechProvider + 'static,
    I: ImageProvider + 'static,
{
    let mode = match payload.mode.as_deref() {
        Some(value) => AggregateMode::parse(value)
            .ok_or_else(|| bad_request(format!("unknown mode '{}'", value)))?,
        None => AggregateMode::default(),
    };

    let mut images = Vec::with_capacity(payload.images.len());
    for (index, image) in payload.images.into_iter().enumerate() {
        let bytes = BASE64
            .decode(image.data_base64.trim().as_bytes())
            .map_err(|err| bad_request(format!("image {}: invalid base64: {}", index, err)))?;
        let name = image.name.unwrap_or_else(|| format!("image-{}", index));
        let raw = data::load_image_from_bytes(bytes, image.mime.as_deref(), Some(&name))
            .map_err(|err| bad_request(err.to_string()))?;
        images.push(raw);
    }

    let texts = state
        .pipeline
        .extract_all(images)
        .await
        .map_err(pipeline_error)?;
    let batch = aggregate(&texts);
    let text = match mode {
        AggregateMode::Replace => batch,
        AggregateMode::Append => {
            let current = payload.current_text.unwrap_or_default();
            aggregate(&[current, batch])
        }
    };
    Ok(Json(ExtractResponse { text, texts }))
}

async fn speech<O, S, I>(
    State(state): State<Arc<ServerState<O, S, I>>>,
    Json(payload): Json<SpeechRequest>,
) -> Result<Json<SpeechResponse>, ApiError>
where
    O: OcrProvider + 'static,
    S: SpeechProvider + 'static,
    I: ImageProvider + 'static,
{
    require_text(&payload.text, "speech").map_err(pipeline_error)?;
    // Files only live for the duration of the request; the audio travels
    // base64 in the response and the directory is removed when `dir` drops.
    let dir = request_dir(&state.tmp_dir).map_err(|err| internal(err.to_string()))?;
    let output = AudioOutput::new(dir.path(), "speech");

    let segments = state
        .pipeline
        .synthesize_all(&payload.text, &output)
        .await
        .map_err(pipeline_error)?;

    let joined_base64 = if payload.join.unwrap_or(false) && !segments.is_empty() {
        Some(BASE64.encode(joined_bytes(&segments)))
    } else {
        None
    };
    let segments = segments
        .into_iter()
        .map(|segment| SpeechSegment {
            index: segment.index,
            data_base64: BASE64.encode(&segment.bytes),
            text: segment.text,
            mime: segment.mime,
        })
        .collect();
    drop(dir);
    Ok(Json(SpeechResponse {
        segments,
        joined_base64,
    }))
}

async fn image<O, S, I>(
    State(state): State<Arc<ServerState<O, S, I>>>,
    Json(payload): Json<ImageGenerationRequest>,
) -> Result<Json<ImageGenerationResponse>, ApiError>
where
    O: OcrProvider + 'static,
    S: SpeechProvider + 'static,
    I: ImageProvider + 'static,
{
    let prompt = state
        .pipeline
        .prompt_for(&payload.text)
        .map_err(pipeline_error)?;
    let generated = state
        .pipeline
        .generate_image(&payload.text)
        .await
        .map_err(pipeline_error)?;
    let (url, data_base64) = match generated.reference {
        ImageReference::Url(url) => (Some(url), None),
        ImageReference::Base64(data) => (None, Some(data)),
    };
    Ok(Json(ImageGenerationResponse {
        prompt,
        url,
        data_base64,
        revised_prompt: generated.revised_prompt,
    }))
}

fn request_dir(root: &std::path::Path) -> Result<tempfile::TempDir> {
    std::fs::create_dir_all(root)
        .with_context(|| format!("failed to create tmp dir: {}", root.display()))?;
    tempfile::Builder::new()
        .prefix("speech-")
        .tempdir_in(root)
        .with_context(|| "failed to create request dir")
}

fn pipeline_error(err: PipelineError) -> ApiError {
    let status = match &err {
        PipelineError::EmptyInput { .. } => StatusCode::BAD_REQUEST,
        PipelineError::Output { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_GATEWAY,
    };
    if err.is_external() {
        warn!("server: {}", err);
    }
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            segment_index: err.segment_index(),
        }),
    )
}

fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.into(),
            segment_index: None,
        }),
    )
}

fn internal(message: impl Into<String>) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: message.into(),
            segment_index: None,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::PROMPT_SUFFIX;
    use crate::test_util::{FakeImages, FakeOcr, FakeSpeech};
    use serde_json::{Value, json};
    use std::num::NonZeroUsize;

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    fn test_settings(tmp: &std::path::Path) -> settings::Settings {
        let mut settings = settings::Settings::default();
        settings.server_tmp_dir = Some(tmp.to_path_buf());
        settings.max_chunk = NonZeroUsize::new(4).unwrap();
        settings
    }

    async fn spawn(ocr: FakeOcr, speech: FakeSpeech, tmp: &std::path::Path) -> String {
        spawn_with(ocr, speech, test_settings(tmp)).await
    }

    async fn spawn_with(ocr: FakeOcr, speech: FakeSpeech, settings: settings::Settings) -> String {
        let pipeline = Pipeline::new(ocr, speech, FakeImages::default(), &settings);
        let app = router(settings, pipeline).expect("router");
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{}", addr)
    }

    async fn post_json(url: String, body: Value) -> (u16, Value) {
        let response = reqwest::Client::new()
            .post(url)
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap())
    }

    #[tokio::test]
    async fn extract_aggregates_uploaded_images() {
        let tmp = tempfile::tempdir().unwrap();
        let ocr = FakeOcr::default()
            .with_text("甲文字.png", "甲")
            .with_text("乙文字.png", "乙");
        let base = spawn(ocr, FakeSpeech::default(), tmp.path()).await;
        let encoded = BASE64.encode(PNG);
        let (status, body) = post_json(
            format!("{}/extract", base),
            json!({"images": [
                {"data_base64": encoded, "name": "甲文字.png"},
                {"data_base64": encoded, "name": "乙文字.png"}
            ]}),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(body["text"], "甲\n乙");
    }

    #[tokio::test]
    async fn extract_accepts_phone_sized_photos() {
        let tmp = tempfile::tempdir().unwrap();
        let ocr = FakeOcr::default().with_text("photo.png", "相片");
        let base = spawn(ocr, FakeSpeech::default(), tmp.path()).await;
        let mut photo = PNG.to_vec();
        photo.resize(2_500_000, 0);
        let (status, body) = post_json(
            format!("{}/extract", base),
            json!({"images": [{"data_base64": BASE64.encode(&photo), "name": "photo.png"}]}),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(body["text"], "相片");
    }

    #[tokio::test]
    async fn body_over_configured_limit_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let mut settings = test_settings(tmp.path());
        settings.server_max_body_mb = NonZeroUsize::new(1).unwrap();
        let base = spawn_with(FakeOcr::default(), FakeSpeech::default(), settings).await;
        let response = reqwest::Client::new()
            .post(format!("{}/extract", base))
            .json(&json!({"images": [{"data_base64": "A".repeat(1536 * 1024)}]}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 413);
    }

    #[tokio::test]
    async fn extract_append_keeps_current_text() {
        let tmp = tempfile::tempdir().unwrap();
        let ocr = FakeOcr::default().with_text("乙文字.png", "乙");
        let base = spawn(ocr, FakeSpeech::default(), tmp.path()).await;
        let (status, body) = post_json(
            format!("{}/extract", base),
            json!({
                "mode": "append",
                "current_text": "甲",
                "images": [{"data_base64": BASE64.encode(PNG), "name": "乙文字.png"}]
            }),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(body["text"], "甲\n乙");
    }

    #[tokio::test]
    async fn extract_failure_is_bad_gateway() {
        let tmp = tempfile::tempdir().unwrap();
        let base = spawn(FakeOcr::default(), FakeSpeech::default(), tmp.path()).await;
        let (status, body) = post_json(
            format!("{}/extract", base),
            json!({"images": [{"data_base64": BASE64.encode(PNG), "name": "x.png"}]}),
        )
        .await;
        assert_eq!(status, 502);
        assert!(body["error"].as_str().unwrap().contains("x.png"));
    }

    #[tokio::test]
    async fn speech_returns_segments_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        let base = spawn(FakeOcr::default(), FakeSpeech::default(), tmp.path()).await;
        let (status, body) = post_json(
            format!("{}/speech", base),
            json!({"text": "abcdefghij", "join": true}),
        )
        .await;
        assert_eq!(status, 200);
        let segments = body["segments"].as_array().unwrap();
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[2]["text"], "ij");
        assert_eq!(segments[0]["data_base64"], BASE64.encode(b"AUDIO:abcd"));
        assert_eq!(
            body["joined_base64"],
            BASE64.encode(b"AUDIO:abcdAUDIO:efghAUDIO:ij")
        );
    }

    #[tokio::test]
    async fn speech_leaves_nothing_in_tmp_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let base = spawn(FakeOcr::default(), FakeSpeech::failing_at(5), tmp.path()).await;
        for _ in 0..2 {
            let (status, _) =
                post_json(format!("{}/speech", base), json!({"text": "abcdef"})).await;
            assert_eq!(status, 200);
        }
        // Sixth provider call fails: second segment of the third request.
        let (status, _) = post_json(format!("{}/speech", base), json!({"text": "abcdef"})).await;
        assert_eq!(status, 502);
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn speech_failure_reports_segment_index() {
        let tmp = tempfile::tempdir().unwrap();
        let base = spawn(FakeOcr::default(), FakeSpeech::failing_at(1), tmp.path()).await;
        let (status, body) = post_json(
            format!("{}/speech", base),
            json!({"text": "abcdefghij"}),
        )
        .await;
        assert_eq!(status, 502);
        assert_eq!(body["segment_index"], 1);
    }

    #[tokio::test]
    async fn empty_text_is_bad_request() {
        let tmp = tempfile::tempdir().unwrap();
        let base = spawn(FakeOcr::default(), FakeSpeech::default(), tmp.path()).await;
        let (status, _) = post_json(format!("{}/speech", base), json!({"text": "  "})).await;
        assert_eq!(status, 400);
        let (status, _) = post_json(format!("{}/image", base), json!({"text": ""})).await;
        assert_eq!(status, 400);
    }

    #[tokio::test]
    async fn image_returns_prompt_and_url() {
        let tmp = tempfile::tempdir().unwrap();
        let base = spawn(FakeOcr::default(), FakeSpeech::default(), tmp.path()).await;
        let (status, body) = post_json(format!("{}/image", base), json!({"text": "貓"})).await;
        assert_eq!(status, 200);
        assert_eq!(body["prompt"], format!("貓{}", PROMPT_SUFFIX));
        assert_eq!(body["url"], "https://images.example.com/1.png");
    }

    #[tokio::test]
    async fn index_page_is_rendered() {
        let tmp = tempfile::tempdir().unwrap();
        let base = spawn(FakeOcr::default(), FakeSpeech::default(), tmp.path()).await;
        let page = reqwest::get(format!("{}/", base))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(page.contains("cmn-TW-Wavenet-A"));
        assert!(page.contains("limit 20 MB"));
    }
}
