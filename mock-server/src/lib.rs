use std::collections::BTreeMap;
use std::io::Cursor;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::Path,
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use image::{codecs::gif::GifEncoder, DynamicImage, Frame, ImageFormat, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

/// Credentials `/user` accepts.
pub const USER: &str = "octocat";
pub const PASSWORD: &str = "hunter2";

/// Longest delay `/delay/{ms}` will honour.
pub const MAX_DELAY_MS: u64 = 10_000;

/// Body returned for missing or wrong credentials.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    pub message: String,
    pub documentation_url: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub login: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatusBody {
    pub status: u16,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Delayed {
    pub delayed_ms: u64,
}

/// What `/echo` saw.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Echo {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: BTreeMap<String, Vec<String>>,
    pub body: String,
}

pub fn app() -> Router {
    Router::new()
        .route("/", get(user))
        .route("/user", get(user))
        .route("/status/{code}", get(status))
        .route("/delay/{ms}", get(delay))
        .route("/images/{format}", get(image_fixture))
        .route("/echo", any(echo))
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

pub fn bad_credentials() -> ApiError {
    ApiError {
        message: "Bad credentials".to_string(),
        documentation_url: "https://developer.github.com/v3".to_string(),
    }
}

async fn user(headers: HeaderMap) -> Response {
    let expected = format!("Basic {}", STANDARD.encode(format!("{USER}:{PASSWORD}")));
    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == expected);

    if authorized {
        Json(User {
            login: USER.to_string(),
        })
        .into_response()
    } else {
        (StatusCode::UNAUTHORIZED, Json(bad_credentials())).into_response()
    }
}

async fn status(Path(code): Path<u16>) -> Result<(StatusCode, Json<StatusBody>), StatusCode> {
    let status = StatusCode::from_u16(code).map_err(|_| StatusCode::BAD_REQUEST)?;
    Ok((status, Json(StatusBody { status: code })))
}

async fn delay(Path(ms): Path<u64>) -> Json<Delayed> {
    let ms = ms.min(MAX_DELAY_MS);
    tokio::time::sleep(Duration::from_millis(ms)).await;
    Json(Delayed { delayed_ms: ms })
}

async fn image_fixture(Path(format): Path<String>) -> Result<Response, StatusCode> {
    let (content_type, bytes) = match format.as_str() {
        "png" => ("image/png", encode_sample(ImageFormat::Png)),
        "jpeg" => ("image/jpeg", encode_sample(ImageFormat::Jpeg)),
        "gif" => ("image/gif", encode_sample(ImageFormat::Gif)),
        "broken" => ("image/png", Ok(b"\x89PNG but not really".to_vec())),
        _ => return Err(StatusCode::NOT_FOUND),
    };
    let bytes = bytes.map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response())
}

/// An 8x8 gradient in `format`.
pub fn encode_sample(format: ImageFormat) -> Result<Vec<u8>, image::ImageError> {
    let img = RgbaImage::from_fn(8, 8, |x, y| Rgba([(x * 32) as u8, (y * 32) as u8, 128, 255]));
    let mut out = Vec::new();
    match format {
        ImageFormat::Gif => GifEncoder::new(&mut out).encode_frame(Frame::new(img))?,
        ImageFormat::Jpeg => {
            DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(img).to_rgb8())
                .write_to(&mut Cursor::new(&mut out), format)?
        }
        _ => DynamicImage::ImageRgba8(img).write_to(&mut Cursor::new(&mut out), format)?,
    }
    Ok(out)
}

async fn echo(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Json<Echo> {
    let mut echoed: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in &headers {
        echoed
            .entry(name.as_str().to_string())
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    Json(Echo {
        method: method.to_string(),
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        headers: echoed,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_credentials_matches_github_shape() {
        let json = serde_json::to_value(bad_credentials()).unwrap();
        assert_eq!(json["message"], "Bad credentials");
        assert_eq!(json["documentation_url"], "https://developer.github.com/v3");
    }

    #[test]
    fn samples_decode_in_their_own_format() {
        for format in [ImageFormat::Png, ImageFormat::Jpeg, ImageFormat::Gif] {
            let bytes = encode_sample(format).unwrap();
            let img = image::load_from_memory_with_format(&bytes, format).unwrap();
            assert_eq!((img.width(), img.height()), (8, 8), "{format:?}");
        }
    }

    #[test]
    fn echo_defaults_are_empty() {
        let echo = Echo::default();
        assert!(echo.headers.is_empty());
        assert!(echo.query.is_none());
    }
}
