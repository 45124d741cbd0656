//! Read-only WebDAV view of the catalog: a root collection, an `All Songs`
//! folder, and one virtual `.mp3` per indexed track. GET/HEAD delegate to
//! the same range-streaming path as `/stream/{id}`.

use crate::handlers::songs::stream_response;
use crate::models::Track;
use crate::startup::AppState;
use axum::{
    extract::{Request, State},
    http::{Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use base64::{Engine as _, engine::general_purpose};
use futures::TryStreamExt;
use mongodb::options::FindOptions;
use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};
use regex::Regex;
use secrecy::ExposeSecret;
use service_core::error::AppError;
use std::sync::OnceLock;
use subtle::ConstantTimeEq;

const SONGS_COLLECTION: &str = "All Songs";
/// WebDAV clients choke on unbounded listings; cap the folder.
const LISTING_LIMIT: i64 = 500;

/// Bytes escaped in hrefs beyond controls.
const HREF_ESCAPE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'`')
    .add(b'#')
    .add(b'?')
    .add(b'{')
    .add(b'}')
    .add(b'[')
    .add(b']');

fn filename_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(.+) \[([^\]]+)\]\.mp3$").expect("static regex"))
}

struct DavResource {
    name: String,
    is_dir: bool,
    size: Option<u64>,
    mimetype: Option<String>,
}

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn generate_propfind_xml(resources: &[DavResource], base_url: &str, is_collection: bool) -> String {
    let mut base_url = base_url.to_string();
    if is_collection && !base_url.ends_with('/') {
        base_url.push('/');
    }

    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"utf-8\" ?>\n<D:multistatus xmlns:D=\"DAV:\">",
    );
    for resource in resources {
        let href = if resource.name.is_empty() {
            base_url.clone()
        } else {
            format!(
                "{base_url}{}",
                utf8_percent_encode(&resource.name, HREF_ESCAPE)
            )
        };
        let display = if resource.name.is_empty() {
            "/"
        } else {
            &resource.name
        };

        xml.push_str("\n<D:response>");
        xml.push_str(&format!("\n<D:href>{}</D:href>", xml_escape(&href)));
        xml.push_str("\n<D:propstat>\n<D:prop>");
        xml.push_str(&format!(
            "\n<D:displayname>{}</D:displayname>",
            xml_escape(display)
        ));
        if resource.is_dir {
            xml.push_str("\n<D:resourcetype><D:collection/></D:resourcetype>");
        } else {
            xml.push_str("\n<D:resourcetype/>");
            if let Some(size) = resource.size {
                xml.push_str(&format!(
                    "\n<D:getcontentlength>{size}</D:getcontentlength>"
                ));
            }
            if let Some(mimetype) = &resource.mimetype {
                xml.push_str(&format!(
                    "\n<D:getcontenttype>{}</D:getcontenttype>",
                    xml_escape(mimetype)
                ));
            }
        }
        xml.push_str("\n</D:prop>\n<D:status>HTTP/1.1 200 OK</D:status>\n</D:propstat>\n</D:response>");
    }
    xml.push_str("\n</D:multistatus>");
    xml
}

fn track_filename(track: &Track) -> String {
    let sanitize = |value: &str| -> String {
        value
            .chars()
            .filter(|c| !matches!(c, '\\' | '/' | '*' | '?' | ':' | '"' | '<' | '>' | '|'))
            .collect()
    };
    format!(
        "{} - {} [{}].mp3",
        sanitize(&track.title),
        sanitize(track.artist.as_str()),
        track.file_unique_id.as_deref().unwrap_or_default()
    )
}

fn check_auth(state: &AppState, request: &Request) -> Result<(), Response> {
    let config = &state.config.webdav;

    let denied = || {
        (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, "Basic")],
            "Incorrect username or password",
        )
            .into_response()
    };

    let Some(credentials) = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
        .and_then(|v| general_purpose::STANDARD.decode(v).ok())
        .and_then(|v| String::from_utf8(v).ok())
    else {
        return Err(denied());
    };
    let Some((username, password)) = credentials.split_once(':') else {
        return Err(denied());
    };

    let username_ok: bool = username
        .as_bytes()
        .ct_eq(config.username.as_bytes())
        .into();
    let password_ok: bool = password
        .as_bytes()
        .ct_eq(config.password.expose_secret().as_bytes())
        .into();
    if !(username_ok && password_ok) {
        return Err(denied());
    }
    Ok(())
}

pub async fn webdav_handler(
    State(state): State<AppState>,
    request: Request,
) -> Result<Response, AppError> {
    if !state.config.webdav.enabled {
        return Err(AppError::NotFound(anyhow::anyhow!("Not Found")));
    }
    if let Err(denied) = check_auth(&state, &request) {
        return Ok(denied);
    }

    let path = request
        .uri()
        .path()
        .strip_prefix("/webdav")
        .unwrap_or_default()
        .trim_matches('/');
    let path = percent_decode_str(path)
        .decode_utf8()
        .map_err(|_| AppError::BadRequest(anyhow::anyhow!("invalid path encoding")))?
        .into_owned();

    let method = request.method().clone();
    if method == Method::OPTIONS {
        Ok((
            [
                ("Allow", "GET, HEAD, PROPFIND, OPTIONS"),
                ("DAV", "1"),
                ("MS-Author-Via", "DAV"),
            ],
            StatusCode::OK,
        )
            .into_response())
    } else if method == Method::GET || method == Method::HEAD {
        let range_header = request
            .headers()
            .get(header::RANGE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        serve_file(&state, &path, range_header.as_deref(), method == Method::HEAD).await
    } else if method.as_str() == "PROPFIND" {
        let depth = request
            .headers()
            .get("Depth")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("1")
            .to_string();
        propfind(&state, &path, &depth).await
    } else {
        Ok(StatusCode::METHOD_NOT_ALLOWED.into_response())
    }
}

async fn serve_file(
    state: &AppState,
    path: &str,
    range_header: Option<&str>,
    head_only: bool,
) -> Result<Response, AppError> {
    let file_unique_id = path
        .strip_prefix(SONGS_COLLECTION)
        .and_then(|rest| rest.strip_prefix('/'))
        .and_then(|filename| filename_regex().captures(filename))
        .and_then(|captures| captures.get(2))
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("File Not Found")))?;

    stream_response(state, file_unique_id.as_str(), range_header, head_only).await
}

async fn propfind(state: &AppState, path: &str, depth: &str) -> Result<Response, AppError> {
    let resources = match path {
        "" => {
            let mut resources = vec![DavResource {
                name: String::new(),
                is_dir: true,
                size: None,
                mimetype: None,
            }];
            if depth != "0" {
                resources.push(DavResource {
                    name: SONGS_COLLECTION.to_string(),
                    is_dir: true,
                    size: None,
                    mimetype: None,
                });
            }
            (resources, "/webdav/".to_string(), true)
        }
        SONGS_COLLECTION => {
            let mut resources = vec![DavResource {
                name: String::new(),
                is_dir: true,
                size: None,
                mimetype: None,
            }];
            if depth != "0" {
                let options = FindOptions::builder().limit(LISTING_LIMIT).build();
                let mut cursor = state.db.songs().find(None, options).await?;
                while let Some(track) = cursor.try_next().await? {
                    resources.push(DavResource {
                        name: track_filename(&track),
                        is_dir: false,
                        size: track.file_size,
                        mimetype: track.mime_type.clone(),
                    });
                }
            }
            let base = format!(
                "/webdav/{}",
                utf8_percent_encode(SONGS_COLLECTION, HREF_ESCAPE)
            );
            (resources, base, true)
        }
        other => {
            // a single file inside the songs folder
            let file_unique_id = other
                .strip_prefix(SONGS_COLLECTION)
                .and_then(|rest| rest.strip_prefix('/'))
                .and_then(|filename| filename_regex().captures(filename))
                .and_then(|captures| captures.get(2))
                .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Not Found")))?;

            let track = state
                .db
                .songs()
                .find_one(
                    mongodb::bson::doc! { "file_unique_id": file_unique_id.as_str() },
                    None,
                )
                .await?
                .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Not Found")))?;

            let resources = vec![DavResource {
                name: String::new(),
                is_dir: false,
                size: track.file_size,
                mimetype: track.mime_type.clone(),
            }];
            let base = format!("/webdav/{}", utf8_percent_encode(other, HREF_ESCAPE));
            (resources, base, false)
        }
    };

    let (resources, base_url, is_collection) = resources;
    let xml = generate_propfind_xml(&resources, &base_url, is_collection);
    Ok((
        StatusCode::MULTI_STATUS,
        [(header::CONTENT_TYPE, "application/xml; charset=utf-8")],
        xml,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn track(title: &str, artist: &str, id: &str) -> Track {
        Track {
            id: None,
            chat_id: Some(-100),
            msg_id: Some(1),
            file_unique_id: Some(id.to_string()),
            file_size: Some(123),
            file_name: None,
            title: title.to_string(),
            track_id: None,
            artist: artist.to_string(),
            artist_id: None,
            album: None,
            album_id: None,
            isrc: None,
            track_no: None,
            provider: "apple-music".to_string(),
            duration: None,
            tags: None,
            mime_type: Some("audio/mpeg".to_string()),
            cover_url: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn filenames_roundtrip_through_the_regex() {
        let name = track_filename(&track("So What", "Miles Davis", "uniq42"));
        assert_eq!(name, "So What - Miles Davis [uniq42].mp3");
        let captures = filename_regex().captures(&name).unwrap();
        assert_eq!(&captures[2], "uniq42");
    }

    #[test]
    fn unsafe_filename_characters_are_dropped() {
        let name = track_filename(&track("What / If?", "A<C>DC", "u1"));
        assert_eq!(name, "What  If - ACDC [u1].mp3");
    }

    #[test]
    fn propfind_xml_lists_collections_and_files() {
        let resources = [
            DavResource {
                name: String::new(),
                is_dir: true,
                size: None,
                mimetype: None,
            },
            DavResource {
                name: "a [u1].mp3".to_string(),
                is_dir: false,
                size: Some(9),
                mimetype: Some("audio/mpeg".to_string()),
            },
        ];
        let xml = generate_propfind_xml(&resources, "/webdav/All Songs", true);
        assert!(xml.contains("<D:collection/>"));
        assert!(xml.contains("<D:getcontentlength>9</D:getcontentlength>"));
        assert!(xml.contains("a%20%5Bu1%5D.mp3"));
    }
}
