use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use base64::{Engine as _, engine::general_purpose};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::{
    error::{AppError, Result},
    models::{
        link::{ClientContext, ContentType, CreatedLink, LinkOptions, LinkSummary, RevealedContent, ViewOutcome},
        session::Session,
    },
    services::links::NewLinkRequest,
    state::AppState,
    validation::links::{decode_content, parse_device_id, parse_region, validate_view_password},
};

/// Header carrying the client's region, set by the edge proxy.
pub const REGION_HEADER: &str = "x-client-region";
/// Header carrying the viewer's device id.
pub const DEVICE_HEADER: &str = "x-device-id";

/// The request payload for creating a link.
#[derive(Deserialize)]
pub struct CreateLinkRequest {
    #[serde(rename = "type")]
    pub content_type: ContentType,
    pub content: String,
    pub file_name: Option<String>,
    #[serde(default)]
    pub options: LinkOptions,
}

#[derive(Deserialize, Default)]
struct ViewRequest {
    password: Option<String>,
}

#[derive(Serialize)]
pub struct LinkListResponse {
    pub links: Vec<LinkSummary>,
}

#[derive(Serialize)]
pub struct DeleteResponse {
    pub success: bool,
}

#[derive(Serialize)]
struct PasswordPrompt {
    requires_password: bool,
}

/// Decrypted content as sent to the viewer.
#[derive(Serialize)]
struct ViewResponse {
    content: String,
    /// `utf8` for text links, `base64` otherwise.
    encoding: &'static str,
    #[serde(rename = "type")]
    content_type: ContentType,
    mime_type: Option<String>,
    file_name: Option<String>,
    is_last_view: bool,
    screenshot_block: bool,
    camouflage: bool,
}

impl From<RevealedContent> for ViewResponse {
    fn from(revealed: RevealedContent) -> Self {
        let RevealedContent {
            content,
            content_type,
            mime_type,
            file_name,
            is_last_view,
            screenshot_block,
            camouflage,
        } = revealed;

        let (content, encoding) = match content_type {
            ContentType::Text => match String::from_utf8(content) {
                Ok(text) => (text, "utf8"),
                Err(e) => (general_purpose::STANDARD.encode(e.into_bytes()), "base64"),
            },
            ContentType::File => (general_purpose::STANDARD.encode(&content), "base64"),
        };

        Self {
            content,
            encoding,
            content_type,
            mime_type,
            file_name,
            is_last_view,
            screenshot_block,
            camouflage,
        }
    }
}

fn no_store(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

fn client_context(headers: &HeaderMap) -> ClientContext {
    let read = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    ClientContext {
        region: parse_region(read(REGION_HEADER)),
        device_id: parse_device_id(read(DEVICE_HEADER)),
    }
}

/// Creates a link and debits its price.
#[axum::debug_handler]
pub async fn create_link(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(payload): Json<CreateLinkRequest>,
) -> Result<Response> {
    let request = NewLinkRequest {
        content: decode_content(payload.content_type, payload.content)?,
        content_type: payload.content_type,
        file_name: payload.file_name,
        options: payload.options,
    };

    let created: CreatedLink = state.links.create_link(session.wallet_id, request).await?;
    Ok((StatusCode::CREATED, Json(created)).into_response())
}

/// Lists the signed-in wallet's links.
#[axum::debug_handler]
pub async fn list_links(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<Json<LinkListResponse>> {
    let links = state.links.list_links(session.wallet_id).await?;
    Ok(Json(LinkListResponse { links }))
}

#[axum::debug_handler]
pub async fn delete_link(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(link_id): Path<String>,
) -> Result<Json<DeleteResponse>> {
    state.links.delete_link(session.wallet_id, &link_id).await?;
    Ok(Json(DeleteResponse { success: true }))
}

/// Opens a link. Public; the body may carry `{"password": "..."}`.
#[axum::debug_handler]
pub async fn view_link(
    State(state): State<AppState>,
    Path(link_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let request: ViewRequest = if body.iter().all(u8::is_ascii_whitespace) {
        ViewRequest::default()
    } else {
        sonic_rs::from_slice(&body)
            .map_err(|_| AppError::validation("Request body must be JSON"))?
    };

    let password = match request.password {
        Some(pw) if pw.is_empty() => None,
        Some(mut pw) => {
            if let Err(e) = validate_view_password(&pw) {
                pw.zeroize();
                return Err(e);
            }
            Some(pw)
        }
        None => None,
    };

    let outcome = state
        .links
        .view_link(&link_id, password, client_context(&headers))
        .await?;

    let response = match outcome {
        ViewOutcome::PasswordRequired => Json(PasswordPrompt {
            requires_password: true,
        })
        .into_response(),
        ViewOutcome::Revealed(revealed) => Json(ViewResponse::from(revealed)).into_response(),
    };

    Ok(no_store(response))
}
