use axum::{
    http::{header, StatusCode, Uri},
    response::{Html, IntoResponse, Redirect, Response},
};
use rust_embed::Embed;

/// Mount point of the embedded frontend
pub const UI_PREFIX: &str = "/ui";

#[derive(Embed)]
#[folder = "web"]
struct WebAssets;

/// Serve embedded frontend files under [`UI_PREFIX`]
pub async fn serve_static(uri: Uri) -> Response {
    let path = uri
        .path()
        .trim_start_matches(UI_PREFIX)
        .trim_start_matches('/');
    let path = if path.is_empty() { "index.html" } else { path };

    if let Some(content) = <WebAssets as Embed>::get(path) {
        let mime = mime_guess::from_path(path).first_or_octet_stream();
        return (
            StatusCode::OK,
            [(header::CONTENT_TYPE, mime.as_ref())],
            content.data.into_owned(),
        )
            .into_response();
    }

    // Unknown paths under the prefix get the page itself
    if let Some(content) = <WebAssets as Embed>::get("index.html") {
        return Html(String::from_utf8_lossy(&content.data).to_string()).into_response();
    }

    (StatusCode::NOT_FOUND, "Frontend not bundled").into_response()
}

pub async fn redirect_to_ui() -> Redirect {
    Redirect::permanent("/ui/")
}
