use axum::{
    extract::{Multipart, Path, State},
    http::header,
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use super::{parse_id, AppState};
use crate::auth::AuthUser;
use crate::error::ServerError;

#[derive(Serialize)]
pub struct UploadResponse {
    id: Uuid,
    url: String,
}

/// Accept a multipart `file` field holding an image and return its public URL.
pub async fn upload(
    State(state): State<AppState>,
    auth: AuthUser,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ServerError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("Multipart error: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let data = field
            .bytes()
            .await
            .map_err(|e| ServerError::BadRequest(format!("Failed to read field: {e}")))?;

        let id = state.blob_store.store_image(&data).await?;
        info!(id = %id, size = data.len(), user = %auth.user_id.short(), "Image uploaded");

        return Ok(Json(UploadResponse {
            id,
            url: state.blob_store.url_for(id),
        }));
    }

    Err(ServerError::BadRequest(
        "Missing 'file' field in multipart form".into(),
    ))
}

pub async fn download(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
    let id: Uuid = parse_id(&raw_id, "upload")?;
    let (kind, data) = state.blob_store.get_image(id).await?;
    Ok((
        [
            (header::CONTENT_TYPE, kind.content_type()),
            (header::CACHE_CONTROL, "public, max-age=31536000, immutable"),
        ],
        data,
    ))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::TestApp;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    const BOUNDARY: &str = "lumen-test-boundary";

    fn multipart_request(token: &str, field: &str, data: &[u8]) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"a.png\"\r\nContent-Type: image/png\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/api/uploads")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 1, 2, 3, 4];

    #[tokio::test]
    async fn test_upload_and_download() {
        let app = TestApp::new().await;
        let (token, _) = app.register("alice").await;

        let (status, body) = app.send(multipart_request(&token, "file", PNG)).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        let id = body["id"].as_str().unwrap().to_string();
        assert_eq!(
            body["url"],
            format!("http://localhost:5001/api/uploads/{id}")
        );

        let response = app
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/api/uploads/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], PNG);
    }

    #[tokio::test]
    async fn test_upload_rejections() {
        let app = TestApp::new().await;
        let (token, _) = app.register("alice").await;

        let (status, _) = app.send(multipart_request(&token, "other", PNG)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app
            .send(multipart_request(&token, "file", b"plain text"))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let mut big = PNG.to_vec();
        big.resize(2048, 0);
        let (status, _) = app.send(multipart_request(&token, "file", &big)).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);

        let (status, _) = app
            .send(
                Request::builder()
                    .uri(format!("/api/uploads/{}", uuid::Uuid::new_v4()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
