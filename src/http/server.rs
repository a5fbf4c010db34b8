use anyhow::anyhow;
use log::info;
use rouille::{Request, Response};
use std::{
    path::Path,
    sync::{Arc, Mutex},
};

use crate::{
    catalog::{CatalogService, Upload},
    config::{COVERS_PREFIX, HttpConfig, MUSIC_PREFIX, Uploads},
    domain::{
        page::{DEFAULT_PAGE_SIZE, PageRequest},
        track::{Category, TrackId},
    },
    error::CatalogError,
    http::{
        error::ApiError,
        form::{FilePart, parse_track_form},
    },
    storage::{blob, repository::SqliteTrackRepository},
};

pub type Catalog = CatalogService<SqliteTrackRepository>;

pub struct HttpServer {
    catalog: Arc<Mutex<Catalog>>,
    uploads: Uploads,
    pub config: HttpConfig,
}

impl HttpServer {
    pub fn new(catalog: Catalog, uploads: Uploads, config: HttpConfig) -> Self {
        Self {
            catalog: Arc::new(Mutex::new(catalog)),
            uploads,
            config,
        }
    }

    pub fn run(self) {
        let addr = format!("{}:{}", self.config.bind_addr, self.config.port);
        rouille::start_server(addr, move |request| self.handle_request(request));
    }

    fn handle_request(&self, request: &Request) -> Response {
        Self::log_request(request);

        let response = if request.method() == "OPTIONS" {
            Self::handle_preflight()
        } else if let Some(asset) = request.remove_prefix(&format!("{MUSIC_PREFIX}/")) {
            Self::handle_asset(&asset, &self.uploads.music_dir())
        } else if let Some(asset) = request.remove_prefix(&format!("{COVERS_PREFIX}/")) {
            Self::handle_asset(&asset, &self.uploads.covers_dir())
        } else {
            self.route_api(request)
        };

        let response = self.with_cors(response);
        info!("Response: {} {}", request.method(), response.status_code);
        response
    }

    fn route_api(&self, request: &Request) -> Response {
        let result = rouille::router!(request,
            (GET) (/api/tracks) => {
                self.handle_search(request)
            },
            (POST) (/api/tracks) => {
                self.handle_create(request)
            },
            (GET) (/api/tracks/{id: i64}) => {
                self.handle_show(TrackId(id))
            },
            (PUT) (/api/tracks/{id: i64}) => {
                self.handle_update(TrackId(id), request)
            },
            (DELETE) (/api/tracks/{id: i64}) => {
                self.handle_delete(TrackId(id))
            },
            _ => Ok(Response::empty_404())
        );

        result.unwrap_or_else(ApiError::into_response)
    }

    fn log_request(request: &Request) {
        info!("{} {}", request.method(), request.raw_url());
    }

    /// runs `f` with the catalog locked
    fn with_catalog<T>(
        &self,
        f: impl FnOnce(&mut Catalog) -> Result<T, CatalogError>,
    ) -> Result<T, ApiError> {
        let mut catalog = self.catalog.lock().map_err(|e| {
            CatalogError::Internal(anyhow!("Could not access catalog under lock: {e}"))
        })?;
        Ok(f(&mut *catalog)?)
    }

    fn handle_search(&self, request: &Request) -> Result<Response, ApiError> {
        let title = request.get_param("title");
        let category = request
            .get_param("category")
            .filter(|c| !c.is_empty())
            .map(|c| c.parse::<Category>())
            .transpose()?;
        let page = Self::numeric_param(request, "page", 0)?;
        let size = Self::numeric_param(request, "size", DEFAULT_PAGE_SIZE)?;
        let page = PageRequest::new(page, size)?;

        let found = self.with_catalog(|c| c.search(title.as_deref(), category, page))?;
        Ok(Response::json(&found))
    }

    fn handle_show(&self, id: TrackId) -> Result<Response, ApiError> {
        let track = self.with_catalog(|c| c.show(id))?;
        Ok(Response::json(&track))
    }

    fn handle_create(&self, request: &Request) -> Result<Response, ApiError> {
        let form = parse_track_form(request)?;
        let FilePart { file_name, bytes } = form
            .file
            .ok_or_else(|| ApiError::BadRequest("file is required".into()))?;

        let created = self.with_catalog(|c| {
            c.create_with_file(form.dto, Upload::new(file_name, bytes.as_slice()))
        })?;
        Ok(Response::json(&created))
    }

    fn handle_update(&self, id: TrackId, request: &Request) -> Result<Response, ApiError> {
        let form = parse_track_form(request)?;
        let upload = form
            .file
            .as_ref()
            .map(|f| Upload::new(f.file_name.clone(), f.bytes.as_slice()));

        let updated = self.with_catalog(|c| c.update_with_file(id, form.dto, upload))?;
        Ok(Response::json(&updated))
    }

    fn handle_delete(&self, id: TrackId) -> Result<Response, ApiError> {
        self.with_catalog(|c| c.delete(id))?;
        Ok(Response::empty_204())
    }

    fn numeric_param(request: &Request, name: &str, default: u32) -> Result<u32, ApiError> {
        match request.get_param(name).filter(|v| !v.is_empty()) {
            None => Ok(default),
            Some(v) => v
                .parse()
                .map_err(|_| ApiError::BadRequest(format!("invalid {name} '{v}'"))),
        }
    }

    /// streams a file from one of the upload directories
    fn handle_asset(asset: &Request, dir: &Path) -> Response {
        if asset.method() != "GET" {
            return Response::text("method not allowed").with_status_code(405);
        }

        let name = asset.url();
        let Some(path) = blob::safe_join(dir, name.trim_start_matches('/')) else {
            return Response::empty_404();
        };
        if !path.is_file() {
            return Response::empty_404();
        }

        match std::fs::File::open(&path) {
            Ok(file) => {
                log::debug!(
                    "ASSET {} -> 200 OK, path: {}",
                    name,
                    path.to_string_lossy()
                );
                Response::from_file(Self::mime_for_path(&path), file)
            }
            Err(_) => Response::empty_404(),
        }
    }

    fn mime_for_path(path: &Path) -> String {
        let ext = path
            .extension()
            .map(|ext| ext.to_string_lossy())
            .map(|s| s.to_lowercase());
        let default = || {
            mime_guess::from_path(path)
                .first_or_octet_stream()
                .to_string()
        };
        ext.and_then(|ext| Self::mime_from_ext(ext.as_str()))
            .unwrap_or_else(default)
    }

    /// Map file extension (without dot) to proper MIME type for browser playback.
    /// Returns None if the extension is not recognized.
    pub fn mime_from_ext(ext: &str) -> Option<String> {
        match ext {
            "m4a" => Some("audio/x-m4a".to_string()), // Safari iOS compatible
            "aac" => Some("audio/aac".to_string()),
            "mp3" => Some("audio/mpeg".to_string()),
            "wav" => Some("audio/wav".to_string()),
            "ogg" => Some("audio/ogg".to_string()),
            "flac" => Some("audio/flac".to_string()),
            _ => None,
        }
    }

    fn handle_preflight() -> Response {
        Response::empty_204()
            .with_additional_header(
                "Access-Control-Allow-Methods",
                "GET, POST, PUT, DELETE, OPTIONS",
            )
            .with_additional_header("Access-Control-Allow-Headers", "*")
    }

    fn with_cors(&self, response: Response) -> Response {
        match &self.config.allowed_origin {
            Some(origin) => {
                response.with_additional_header("Access-Control-Allow-Origin", origin.clone())
            }
            None => response,
        }
    }
}

#[cfg(test)]
pub fn parse_json_response<T: serde::de::DeserializeOwned>(
    response: rouille::Response,
) -> anyhow::Result<T> {
    Ok(serde_json::from_reader(
        response.data.into_reader_and_size().0,
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{page::Page, track::TrackDto},
        storage::{blob::BlobStore, schema},
    };

    use rouille::Request;
    use rusqlite::Connection;
    use std::io::Read;
    use tempfile::{TempDir, tempdir};

    const BOUNDARY: &str = "trackshelf-test-boundary";

    pub fn parse_text_response(response: rouille::Response) -> String {
        let mut buf = String::new();
        let mut reader = response.data.into_reader_and_size().0;
        reader.read_to_string(&mut buf).unwrap();
        buf
    }

    fn create_server(tmp: &TempDir, allowed_origin: Option<&str>) -> anyhow::Result<HttpServer> {
        let conn = Connection::open_in_memory()?;
        schema::init(&conn)?;
        let uploads = Uploads {
            root: tmp.path().to_path_buf(),
            base_url: None,
        };
        let catalog = CatalogService::new(
            SqliteTrackRepository::from_existing_conn(conn),
            BlobStore::new(uploads.music_dir(), MUSIC_PREFIX, None),
        );

        Ok(HttpServer::new(
            catalog,
            uploads,
            HttpConfig {
                bind_addr: "0.0.0.0".to_string(),
                port: 8080,
                allowed_origin: allowed_origin.map(str::to_string),
            },
        ))
    }

    fn multipart_body(fields: &[(&str, &str)], file: Option<(&str, &[u8])>) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        if let Some((file_name, bytes)) = file {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: audio/mpeg\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn multipart_request(method: &str, url: &str, body: Vec<u8>) -> Request {
        Request::fake_http(
            method,
            url,
            vec![(
                "Content-Type".to_owned(),
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )],
            body,
        )
    }

    const SONG_FIELDS: &[(&str, &str)] = &[
        ("title", "Test Song"),
        ("artist", "Test Artist"),
        ("category", "pop"),
        ("description", "Test Description"),
        ("duration", "180"),
        ("coverImage", "test-cover.jpg"),
    ];

    fn create_song(server: &HttpServer) -> anyhow::Result<TrackDto> {
        let request = multipart_request(
            "POST",
            "/api/tracks",
            multipart_body(SONG_FIELDS, Some(("song.mp3", &b"test audio content!"[..]))),
        );
        let response = server.handle_request(&request);
        assert_eq!(response.status_code, 200);
        parse_json_response(response)
    }

    fn get(server: &HttpServer, url: &str) -> Response {
        server.handle_request(&Request::fake_http("GET", url, vec![], vec![]))
    }

    // --------------------------------------------------
    // ✅ CREATE
    // --------------------------------------------------

    #[test]
    fn test_http_create_track_with_file() -> anyhow::Result<()> {
        let tmp = tempdir()?;
        let server = create_server(&tmp, None)?;

        let created = create_song(&server)?;

        assert!(created.id.is_some());
        assert_eq!(created.file_size, Some(19));
        assert_eq!(created.category, Some(Category::Pop));
        assert_eq!(created.duration, Some(180));
        assert!(created.file_url.unwrap().starts_with("/uploads/music/"));
        Ok(())
    }

    #[test]
    fn test_http_created_file_is_served() -> anyhow::Result<()> {
        let tmp = tempdir()?;
        let server = create_server(&tmp, None)?;
        let url = create_song(&server)?.file_url.unwrap();

        let response = get(&server, &url);

        assert_eq!(response.status_code, 200);
        let content_type = response
            .headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("Content-Type"))
            .map(|(_, v)| v.to_string());
        assert_eq!(content_type.as_deref(), Some("audio/mpeg"));

        let mut body = Vec::new();
        response
            .data
            .into_reader_and_size()
            .0
            .read_to_end(&mut body)?;
        assert_eq!(body, b"test audio content!");
        Ok(())
    }

    #[test]
    fn test_http_create_without_file_is_bad_request() -> anyhow::Result<()> {
        let tmp = tempdir()?;
        let server = create_server(&tmp, None)?;

        let request = multipart_request("POST", "/api/tracks", multipart_body(SONG_FIELDS, None));
        let response = server.handle_request(&request);

        assert_eq!(response.status_code, 400);
        assert!(parse_text_response(response).contains("file is required"));
        Ok(())
    }

    #[test]
    fn test_http_create_with_unknown_category_stores_nothing() -> anyhow::Result<()> {
        let tmp = tempdir()?;
        let server = create_server(&tmp, None)?;

        let request = multipart_request(
            "POST",
            "/api/tracks",
            multipart_body(
                &[("title", "t"), ("artist", "a"), ("category", "POP")],
                Some(("song.mp3", &b"abc"[..])),
            ),
        );
        let response = server.handle_request(&request);

        assert_eq!(response.status_code, 400);
        assert!(!tmp.path().join("music").exists());
        Ok(())
    }

    #[test]
    fn test_http_create_with_extensionless_file_name() -> anyhow::Result<()> {
        let tmp = tempdir()?;
        let server = create_server(&tmp, None)?;

        let request = multipart_request(
            "POST",
            "/api/tracks",
            multipart_body(SONG_FIELDS, Some(("song", &b"abc"[..]))),
        );
        let response = server.handle_request(&request);

        assert_eq!(response.status_code, 400);
        Ok(())
    }

    #[test]
    fn test_http_create_requires_multipart() -> anyhow::Result<()> {
        let tmp = tempdir()?;
        let server = create_server(&tmp, None)?;

        let request = Request::fake_http(
            "POST",
            "/api/tracks",
            vec![("Content-Type".to_owned(), "application/json".to_owned())],
            b"{}".to_vec(),
        );
        let response = server.handle_request(&request);

        assert_eq!(response.status_code, 400);
        Ok(())
    }

    // --------------------------------------------------
    // ✅ SEARCH / SHOW
    // --------------------------------------------------

    #[test]
    fn test_http_search_defaults() -> anyhow::Result<()> {
        let tmp = tempdir()?;
        let server = create_server(&tmp, None)?;
        create_song(&server)?;

        let response = get(&server, "/api/tracks");

        assert_eq!(response.status_code, 200);
        let page: Page<TrackDto> = parse_json_response(response)?;
        assert_eq!(page.total_elements, 1);
        assert_eq!(page.size, 8);
        assert_eq!(page.number, 0);
        Ok(())
    }

    #[test]
    fn test_http_search_filters() -> anyhow::Result<()> {
        let tmp = tempdir()?;
        let server = create_server(&tmp, None)?;
        create_song(&server)?;

        let page: Page<TrackDto> =
            parse_json_response(get(&server, "/api/tracks?title=test&category=pop"))?;
        assert_eq!(page.total_elements, 1);

        let page: Page<TrackDto> =
            parse_json_response(get(&server, "/api/tracks?category=rock&page=0&size=4"))?;
        assert_eq!(page.total_elements, 0);
        assert_eq!(page.size, 4);
        Ok(())
    }

    #[test]
    fn test_http_search_invalid_params() -> anyhow::Result<()> {
        let tmp = tempdir()?;
        let server = create_server(&tmp, None)?;

        assert_eq!(get(&server, "/api/tracks?category=polka").status_code, 400);
        assert_eq!(get(&server, "/api/tracks?page=-1").status_code, 400);
        assert_eq!(get(&server, "/api/tracks?size=0").status_code, 400);
        Ok(())
    }

    #[test]
    fn test_http_show_track() -> anyhow::Result<()> {
        let tmp = tempdir()?;
        let server = create_server(&tmp, None)?;
        let created = create_song(&server)?;

        let response = get(&server, &format!("/api/tracks/{}", created.id.unwrap()));

        assert_eq!(response.status_code, 200);
        let shown: TrackDto = parse_json_response(response)?;
        assert_eq!(shown, created);
        Ok(())
    }

    #[test]
    fn test_http_show_track_not_found() -> anyhow::Result<()> {
        let tmp = tempdir()?;
        let server = create_server(&tmp, None)?;

        assert_eq!(get(&server, "/api/tracks/42").status_code, 404);
        assert_eq!(get(&server, "/api/tracks/not-a-number").status_code, 404);
        Ok(())
    }

    // --------------------------------------------------
    // ✅ UPDATE / DELETE
    // --------------------------------------------------

    #[test]
    fn test_http_update_without_file_keeps_file() -> anyhow::Result<()> {
        let tmp = tempdir()?;
        let server = create_server(&tmp, None)?;
        let created = create_song(&server)?;

        let request = multipart_request(
            "PUT",
            &format!("/api/tracks/{}", created.id.unwrap()),
            multipart_body(
                &[
                    ("title", "Updated Song"),
                    ("artist", "Updated Artist"),
                    ("category", "rock"),
                ],
                None,
            ),
        );
        let response = server.handle_request(&request);

        assert_eq!(response.status_code, 200);
        let updated: TrackDto = parse_json_response(response)?;
        assert_eq!(updated.title.as_deref(), Some("Updated Song"));
        assert_eq!(updated.category, Some(Category::Rock));
        assert_eq!(updated.description, None);
        assert_eq!(updated.duration, Some(0));
        assert_eq!(updated.file_url, created.file_url);
        assert_eq!(updated.file_size, created.file_size);
        Ok(())
    }

    #[test]
    fn test_http_update_with_file_replaces_it() -> anyhow::Result<()> {
        let tmp = tempdir()?;
        let server = create_server(&tmp, None)?;
        let created = create_song(&server)?;

        let request = multipart_request(
            "PUT",
            &format!("/api/tracks/{}", created.id.unwrap()),
            multipart_body(SONG_FIELDS, Some(("remix.flac", &b"new"[..]))),
        );
        let updated: TrackDto = parse_json_response(server.handle_request(&request))?;

        assert_ne!(updated.file_url, created.file_url);
        assert_eq!(updated.file_size, Some(3));
        assert!(updated.file_url.unwrap().ends_with(".flac"));
        Ok(())
    }

    #[test]
    fn test_http_update_not_found() -> anyhow::Result<()> {
        let tmp = tempdir()?;
        let server = create_server(&tmp, None)?;

        let request = multipart_request(
            "PUT",
            "/api/tracks/77",
            multipart_body(SONG_FIELDS, Some(("song.mp3", &b"abc"[..]))),
        );
        let response = server.handle_request(&request);

        assert_eq!(response.status_code, 404);
        assert!(!tmp.path().join("music").exists());
        Ok(())
    }

    #[test]
    fn test_http_delete_track() -> anyhow::Result<()> {
        let tmp = tempdir()?;
        let server = create_server(&tmp, None)?;
        let id = create_song(&server)?.id.unwrap();
        let url = format!("/api/tracks/{id}");

        let response = server.handle_request(&Request::fake_http("DELETE", url.as_str(), vec![], vec![]));
        assert_eq!(response.status_code, 204);

        assert_eq!(get(&server, &url).status_code, 404);

        let response = server.handle_request(&Request::fake_http("DELETE", url.as_str(), vec![], vec![]));
        assert_eq!(response.status_code, 404);
        Ok(())
    }

    // --------------------------------------------------
    // ❌ STATIC ASSETS
    // --------------------------------------------------

    #[test]
    fn test_http_asset_missing_or_escaping() -> anyhow::Result<()> {
        let tmp = tempdir()?;
        let server = create_server(&tmp, None)?;
        std::fs::write(tmp.path().join("secret.txt"), b"nope")?;

        assert_eq!(get(&server, "/uploads/music/missing.mp3").status_code, 404);
        assert_eq!(get(&server, "/uploads/music/../secret.txt").status_code, 404);
        assert_eq!(get(&server, "/uploads/covers/").status_code, 404);
        Ok(())
    }

    #[test]
    fn test_http_cover_is_served() -> anyhow::Result<()> {
        let tmp = tempdir()?;
        let server = create_server(&tmp, None)?;
        std::fs::create_dir_all(tmp.path().join("covers"))?;
        std::fs::write(tmp.path().join("covers").join("cover.jpg"), b"jpeg")?;

        let response = get(&server, "/uploads/covers/cover.jpg");

        assert_eq!(response.status_code, 200);
        Ok(())
    }

    #[test]
    fn test_mime_for_path() {
        assert_eq!(HttpServer::mime_for_path(Path::new("a.m4a")), "audio/x-m4a");
        assert_eq!(HttpServer::mime_for_path(Path::new("a.MP3")), "audio/mpeg");
        assert_eq!(HttpServer::mime_for_path(Path::new("a.jpg")), "image/jpeg");
        assert_eq!(
            HttpServer::mime_for_path(Path::new("a")),
            "application/octet-stream"
        );
    }

    // --------------------------------------------------
    // CORS
    // --------------------------------------------------

    fn header(response: &Response, name: &str) -> Option<String> {
        response
            .headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.to_string())
    }

    #[test]
    fn test_http_cors_headers() -> anyhow::Result<()> {
        let tmp = tempdir()?;
        let server = create_server(&tmp, Some("http://localhost:4200"))?;

        let response = server.handle_request(&Request::fake_http(
            "OPTIONS",
            "/api/tracks",
            vec![],
            vec![],
        ));
        assert_eq!(response.status_code, 204);
        assert_eq!(
            header(&response, "Access-Control-Allow-Origin").as_deref(),
            Some("http://localhost:4200")
        );
        assert!(header(&response, "Access-Control-Allow-Methods").is_some());

        let response = get(&server, "/api/tracks");
        assert_eq!(
            header(&response, "Access-Control-Allow-Origin").as_deref(),
            Some("http://localhost:4200")
        );
        Ok(())
    }

    #[test]
    fn test_http_no_cors_header_by_default() -> anyhow::Result<()> {
        let tmp = tempdir()?;
        let server = create_server(&tmp, None)?;

        let response = get(&server, "/api/tracks");

        assert!(header(&response, "Access-Control-Allow-Origin").is_none());
        Ok(())
    }
}
