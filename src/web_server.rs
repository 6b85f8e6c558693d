use actix_files::NamedFile;
use actix_multipart::Multipart;
use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
use base64::{engine::general_purpose::STANDARD, Engine};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use crate::cache::ResponseCache;
use crate::config::AppConfig;
use crate::display::Zone;
use crate::error::AppError;
use crate::exif_extract::extract_metadata;
use crate::metadata::{ImageReport, MiniResponse, Thumbnails};
use crate::provenance::{format_provenance, summarize, unverified, C2paData, ProvenanceItem};
use crate::provenance_source::ProvenanceSource;
use crate::resolver::{self, ImageFetcher, ResolvedImage};

const STATIC_ASSETS: &[&str] = &["styles.css", "script.js", "content_credentials_logo.svg"];
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif"];

pub struct AppState {
    pub config: Arc<AppConfig>,
    pub provenance: Arc<dyn ProvenanceSource>,
    pub fetcher: Arc<dyn ImageFetcher>,
    pub mini_cache: ResponseCache<MiniResponse>,
}

impl AppState {
    pub fn new(
        config: Arc<AppConfig>,
        provenance: Arc<dyn ProvenanceSource>,
        fetcher: Arc<dyn ImageFetcher>,
    ) -> Self {
        let mini_cache = ResponseCache::new(config.mini_cache_ttl());
        Self {
            config,
            provenance,
            fetcher,
            mini_cache,
        }
    }

    async fn resolve(&self, uri: &str, timeout: Duration) -> Result<ResolvedImage, AppError> {
        resolver::resolve(uri, self.fetcher.as_ref(), timeout).await
    }
}

#[derive(Deserialize, Debug)]
struct UriQuery {
    uri: Option<String>,
}

impl UriQuery {
    fn required(&self) -> Result<&str, AppError> {
        self.uri
            .as_deref()
            .filter(|uri| !uri.is_empty())
            .ok_or_else(|| AppError::BadRequest("Image URI is required".to_string()))
    }
}

#[derive(Serialize, Debug)]
struct C2paResponse {
    provenance: Vec<ProvenanceItem>,
    c2pa_data: Option<C2paData>,
    thumbnails: Thumbnails,
}

async fn read_report(path: &Path, display_name: &str) -> Result<ImageReport, AppError> {
    let path = path.to_path_buf();
    let metadata = tokio::task::spawn_blocking(move || extract_metadata(&path)).await?;
    Ok(metadata.into_report(display_name))
}

async fn read_provenance(source: &dyn ProvenanceSource, path: &Path) -> Option<C2paData> {
    match source.extract_provenance(path).await {
        Ok(data) => data,
        Err(e) => {
            log::warn!("Could not read provenance for {:?}: {}", path, e);
            None
        }
    }
}

async fn read_thumbnails(source: &dyn ProvenanceSource, path: &Path) -> Thumbnails {
    match source.extract_thumbnails(path).await {
        Ok(thumbnails) => thumbnails,
        Err(e) => {
            log::warn!("Could not read thumbnails for {:?}: {}", path, e);
            Thumbnails::default()
        }
    }
}

async fn exif_metadata(
    state: web::Data<AppState>,
    query: web::Query<UriQuery>,
) -> Result<HttpResponse, AppError> {
    let uri = query.required()?;
    log::debug!("Received EXIF request for: {}", uri);

    let image = state.resolve(uri, state.config.download_timeout()).await?;
    let name = resolver::display_name(uri);
    let report = read_report(image.path(), &name).await?;

    Ok(HttpResponse::Ok().json(HashMap::from([(name, report)])))
}

async fn c2pa_metadata(
    state: web::Data<AppState>,
    query: web::Query<UriQuery>,
) -> Result<HttpResponse, AppError> {
    let uri = query.required()?;
    log::debug!("Received C2PA request for: {}", uri);

    let image = state.resolve(uri, state.config.download_timeout()).await?;
    let source = state.provenance.as_ref();
    let c2pa_data = read_provenance(source, image.path()).await;
    let thumbnails = read_thumbnails(source, image.path()).await;
    let provenance = c2pa_data
        .as_ref()
        .map(|data| format_provenance(data, Zone::Local))
        .unwrap_or_default();
    log::trace!("Provenance for {}: {:?}", uri, provenance);

    Ok(HttpResponse::Ok().json(C2paResponse {
        provenance,
        c2pa_data,
        thumbnails,
    }))
}

fn viewer_link(viewer_url: &str, uri: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(uri.as_bytes()).collect();
    format!("{}?uri={}", viewer_url, encoded)
}

async fn mini_summary(state: &AppState, uri: &str, more: String) -> Result<MiniResponse, AppError> {
    let image = state.resolve(uri, state.config.mini_timeout()).await?;
    let minimal = state.provenance.extract_minimal(image.path()).await?;
    Ok(summarize(minimal.as_ref(), more))
}

async fn c2pa_mini(
    state: web::Data<AppState>,
    query: web::Query<UriQuery>,
) -> Result<HttpResponse, AppError> {
    let uri = query.required()?;

    if let Some(cached) = state.mini_cache.get(uri) {
        log::debug!("Serving cached summary for: {}", uri);
        return Ok(HttpResponse::Ok().json(cached));
    }

    let more = viewer_link(&state.config.viewer_url, uri);
    match mini_summary(&state, uri, more.clone()).await {
        Ok(summary) => {
            state.mini_cache.put(uri, summary.clone());
            log::trace!("Cached summary for {} ({} entries)", uri, state.mini_cache.len());
            Ok(HttpResponse::Ok().json(summary))
        }
        Err(e) => {
            log::warn!("Summary for {} failed: {}", uri, e);
            Ok(HttpResponse::Ok().json(unverified(more)))
        }
    }
}

async fn upload(
    state: web::Data<AppState>,
    mut payload: Multipart,
) -> Result<HttpResponse, AppError> {
    let mut upload = None;
    while let Some(mut field) = payload.try_next().await? {
        if field.name() != "file" {
            continue;
        }
        let filename = field
            .content_disposition()
            .get_filename()
            .map(str::to_string);
        let mut bytes = Vec::new();
        while let Some(chunk) = field.try_next().await? {
            bytes.extend_from_slice(&chunk);
        }
        upload = Some((filename, bytes));
    }

    let Some((filename, bytes)) = upload else {
        return Err(AppError::BadRequest("No file uploaded".to_string()));
    };
    let Some(filename) = filename.filter(|name| !name.is_empty()) else {
        return Err(AppError::BadRequest("No file selected".to_string()));
    };
    log::debug!("Received upload {} ({} bytes)", filename, bytes.len());

    let image = resolver::from_upload(&bytes, Some(&filename))?;
    let source = state.provenance.as_ref();

    let mut report = read_report(image.path(), &filename).await?;
    let provenance = read_provenance(source, image.path())
        .await
        .map(|data| format_provenance(&data, Zone::Local))
        .unwrap_or_default();
    report.thumbnails = Some(read_thumbnails(source, image.path()).await);
    report.provenance = Some(provenance);
    report.image_data = Some(format!(
        "data:image/{};base64,{}",
        report.format.to_lowercase(),
        STANDARD.encode(&bytes)
    ));

    Ok(HttpResponse::Ok().json(HashMap::from([(filename, report)])))
}

async fn open_file(path: PathBuf) -> Result<NamedFile, AppError> {
    log::trace!("Attempting to serve file from: {:?}", path);
    NamedFile::open_async(&path).await.map_err(|e| match e.kind() {
        ErrorKind::NotFound => AppError::NotFound("File not found".to_string()),
        _ => {
            log::error!("Error serving {:?}: {}", path, e);
            AppError::Io(e)
        }
    })
}

async fn index(state: web::Data<AppState>) -> Result<NamedFile, AppError> {
    open_file(Path::new(&state.config.static_directory).join("index.html")).await
}

async fn static_asset(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<NamedFile, AppError> {
    let asset = req.path().trim_start_matches('/');
    open_file(Path::new(&state.config.static_directory).join(asset)).await
}

fn is_servable_image(filename: &str) -> bool {
    let path = Path::new(filename);
    let plain = path.file_name().map(|f| f == path.as_os_str()).unwrap_or(false);
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    plain && IMAGE_EXTENSIONS.contains(&extension.as_str())
}

async fn image_file(
    filename: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<NamedFile, AppError> {
    let filename = filename.into_inner();
    log::debug!("Received request for image file: {}", filename);
    if !is_servable_image(&filename) {
        return Err(AppError::NotFound("File not found".to_string()));
    }
    open_file(Path::new(&state.config.image_directory).join(filename)).await
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/exif_metadata").route(web::get().to(exif_metadata)))
        .service(web::resource("/api/c2pa_metadata").route(web::get().to(c2pa_metadata)))
        .service(web::resource("/api/c2pa_mini").route(web::get().to(c2pa_mini)))
        .service(web::resource("/api/upload").route(web::post().to(upload)))
        .service(web::resource("/").to(index));
    for asset in STATIC_ASSETS {
        cfg.service(web::resource(format!("/{}", asset)).to(static_asset));
    }
    cfg.service(web::resource("/{filename}").to(image_file));
}

pub async fn start_web_server(state: AppState) -> std::io::Result<()> {
    let port = state.config.web_port;
    log::info!("Starting web server on port: {}", port);
    log::debug!(
        "Serving static files from {} and images from {}",
        state.config.static_directory,
        state.config.image_directory
    );
    let state = web::Data::new(state);

    HttpServer::new(move || App::new().app_data(state.clone()).configure(routes))
        .bind(format!("0.0.0.0:{}", port))?
        .run()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::tests::ManualClock;
    use crate::provenance_sources::c2pa_library::C2paLibrary;
    use crate::resolver::FetchedImage;
    use crate::test_fixtures;
    use actix_web::http::{header, StatusCode};
    use actix_web::test;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use url::Url;

    /// Serves the same JPEG for every URL and counts downloads.
    struct CountingFetcher {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingFetcher {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ImageFetcher for CountingFetcher {
        async fn fetch(&self, _url: &Url, _timeout: Duration) -> Result<FetchedImage, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AppError::Download("connection refused".into()));
            }
            Ok(FetchedImage {
                bytes: test_fixtures::jpeg(8, 8),
                content_type: Some("image/jpeg".into()),
            })
        }
    }

    fn state_with(
        config: AppConfig,
        fetcher: Arc<CountingFetcher>,
        clock: Arc<ManualClock>,
    ) -> web::Data<AppState> {
        let config = Arc::new(config);
        web::Data::new(AppState {
            mini_cache: ResponseCache::with_clock(config.mini_cache_ttl(), clock),
            config,
            provenance: Arc::new(C2paLibrary::new()),
            fetcher,
        })
    }

    fn state(fetcher: Arc<CountingFetcher>) -> web::Data<AppState> {
        state_with(AppConfig::default(), fetcher, Arc::new(ManualClock::new()))
    }

    fn query(uri: &str) -> String {
        url::form_urlencoded::byte_serialize(uri.as_bytes()).collect()
    }

    #[actix_web::test]
    async fn missing_uri_is_rejected() {
        let fetcher = CountingFetcher::new(false);
        let app = test::init_service(
            App::new()
                .app_data(state(fetcher.clone()))
                .configure(routes),
        )
        .await;

        for endpoint in ["/api/exif_metadata", "/api/c2pa_metadata", "/api/c2pa_mini"] {
            let req = test::TestRequest::get().uri(endpoint).to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{}", endpoint);
            let body: Value = test::read_body_json(resp).await;
            assert_eq!(body["error"], "Image URI is required");
        }
        assert_eq!(fetcher.calls(), 0);
    }

    #[actix_web::test]
    async fn exif_metadata_for_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("camera.jpg");
        std::fs::write(&path, test_fixtures::jpeg_with_exif(64, 48)).unwrap();

        let app = test::init_service(
            App::new()
                .app_data(state(CountingFetcher::new(false)))
                .configure(routes),
        )
        .await;
        let req = test::TestRequest::get()
            .uri(&format!("/api/exif_metadata?uri={}", query(path.to_str().unwrap())))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: Value = test::read_body_json(resp).await;
        let report = &body["camera.jpg"];
        assert_eq!(report["filename"], "camera.jpg");
        assert_eq!(report["format"], "JPEG");
        assert_eq!(report["width"], 64);
        assert_eq!(report["height"], 48);
        assert_eq!(report["photography"]["camera_make"], "Canon");
        assert_eq!(report["photography"]["shutter_speed"], "1/2000s");
        assert!(report.get("image_data").is_none());
    }

    #[actix_web::test]
    async fn missing_local_file_is_404() {
        let app = test::init_service(
            App::new()
                .app_data(state(CountingFetcher::new(false)))
                .configure(routes),
        )
        .await;
        let req = test::TestRequest::get()
            .uri("/api/exif_metadata?uri=%2Fno%2Fsuch%2Ffile.jpg")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn no_manifest_is_empty_provenance() {
        let fetcher = CountingFetcher::new(false);
        let app = test::init_service(
            App::new()
                .app_data(state(fetcher.clone()))
                .configure(routes),
        )
        .await;
        let req = test::TestRequest::get()
            .uri("/api/c2pa_metadata?uri=https%3A%2F%2Fexample.com%2Fplain.jpg")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["provenance"], serde_json::json!([]));
        assert!(body["c2pa_data"].is_null());
        assert_eq!(body["thumbnails"], serde_json::json!({}));
        assert_eq!(fetcher.calls(), 1);
    }

    #[actix_web::test]
    async fn signed_local_file_has_provenance() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signed.jpg");
        std::fs::write(&path, test_fixtures::signed_jpeg()).unwrap();

        let app = test::init_service(
            App::new()
                .app_data(state(CountingFetcher::new(false)))
                .configure(routes),
        )
        .await;
        let uri = query(path.to_str().unwrap());

        let req = test::TestRequest::get()
            .uri(&format!("/api/c2pa_metadata?uri={}", uri))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        let names: Vec<&str> = body["provenance"]
            .as_array()
            .unwrap()
            .iter()
            .map(|item| item["name"].as_str().unwrap())
            .collect();
        assert_eq!(names[..2], ["Claim Generator", "Issued By"]);
        assert_eq!(names.last(), Some(&"Verification"));
        assert_eq!(body["c2pa_data"]["verification"], "valid");
        assert!(body["thumbnails"]["claim_thumbnail"].is_string());
        assert!(body["thumbnails"]["ingredient_thumbnail"].is_string());

        let req = test::TestRequest::get()
            .uri(&format!("/api/c2pa_mini?uri={}", uri))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["creator"], "Jane Doe");
        assert_eq!(body["issued_by"], test_fixtures::SIGNING_ORG);
        assert_eq!(body["status"], "Authenticity Verified");
    }

    #[actix_web::test]
    async fn download_failure_is_400() {
        let app = test::init_service(
            App::new()
                .app_data(state(CountingFetcher::new(true)))
                .configure(routes),
        )
        .await;
        let req = test::TestRequest::get()
            .uri("/api/c2pa_metadata?uri=https%3A%2F%2Fexample.com%2Fgone.jpg")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn mini_summary_is_cached_until_ttl() {
        let fetcher = CountingFetcher::new(false);
        let clock = Arc::new(ManualClock::new());
        let app = test::init_service(
            App::new()
                .app_data(state_with(AppConfig::default(), fetcher.clone(), clock.clone()))
                .configure(routes),
        )
        .await;
        let uri = "/api/c2pa_mini?uri=https%3A%2F%2Fexample.com%2Fa.jpg";

        let first: Value =
            test::call_and_read_body_json(&app, test::TestRequest::get().uri(uri).to_request())
                .await;
        assert_eq!(first["status"], "Unverified");
        assert!(first["creator"].is_null());
        assert_eq!(
            first["more"],
            "https://apps.thecontrarian.in/c2pa/?uri=https%3A%2F%2Fexample.com%2Fa.jpg"
        );

        clock.advance(Duration::from_secs(299));
        let second: Value =
            test::call_and_read_body_json(&app, test::TestRequest::get().uri(uri).to_request())
                .await;
        assert_eq!(first, second);
        assert_eq!(fetcher.calls(), 1);

        clock.advance(Duration::from_secs(2));
        let _: Value =
            test::call_and_read_body_json(&app, test::TestRequest::get().uri(uri).to_request())
                .await;
        assert_eq!(fetcher.calls(), 2);
    }

    #[actix_web::test]
    async fn mini_failures_are_not_cached() {
        let fetcher = CountingFetcher::new(true);
        let data = state(fetcher.clone());
        let app = test::init_service(App::new().app_data(data.clone()).configure(routes)).await;
        let uri = "/api/c2pa_mini?uri=https%3A%2F%2Fexample.com%2Fdown.jpg";

        for _ in 0..2 {
            let resp = test::call_service(&app, test::TestRequest::get().uri(uri).to_request()).await;
            assert_eq!(resp.status(), StatusCode::OK);
            let body: Value = test::read_body_json(resp).await;
            assert_eq!(body["status"], "Unverified");
        }
        assert_eq!(fetcher.calls(), 2);
        assert_eq!(data.mini_cache.len(), 0);
    }

    fn multipart(filename: &str, bytes: &[u8]) -> Vec<u8> {
        let mut body = format!(
            "--BOUNDARY\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n\
             Content-Type: image/jpeg\r\n\r\n",
            filename
        )
        .into_bytes();
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n--BOUNDARY--\r\n");
        body
    }

    #[actix_web::test]
    async fn upload_returns_image_data() {
        let app = test::init_service(
            App::new()
                .app_data(state(CountingFetcher::new(false)))
                .configure(routes),
        )
        .await;
        let image = test_fixtures::jpeg(32, 16);
        let req = test::TestRequest::post()
            .uri("/api/upload")
            .insert_header((header::CONTENT_TYPE, "multipart/form-data; boundary=BOUNDARY"))
            .set_payload(multipart("shot.jpg", &image))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: Value = test::read_body_json(resp).await;
        let report = &body["shot.jpg"];
        assert_eq!(report["width"], 32);
        assert_eq!(report["provenance"], serde_json::json!([]));

        let data_url = report["image_data"].as_str().unwrap();
        let encoded = data_url.strip_prefix("data:image/jpeg;base64,").unwrap();
        assert_eq!(STANDARD.decode(encoded).unwrap(), image);
    }

    #[actix_web::test]
    async fn upload_without_filename_is_rejected() {
        let app = test::init_service(
            App::new()
                .app_data(state(CountingFetcher::new(false)))
                .configure(routes),
        )
        .await;
        let req = test::TestRequest::post()
            .uri("/api/upload")
            .insert_header((header::CONTENT_TYPE, "multipart/form-data; boundary=BOUNDARY"))
            .set_payload(multipart("", b"abc"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn serves_images_and_viewer_assets() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("photo.jpg"), test_fixtures::jpeg(4, 4)).unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"secret").unwrap();
        std::fs::write(dir.path().join("index.html"), b"<html></html>").unwrap();
        std::fs::write(dir.path().join("styles.css"), b"body {}").unwrap();

        let directory = dir.path().to_string_lossy().into_owned();
        let config = AppConfig {
            static_directory: directory.clone(),
            image_directory: directory,
            ..AppConfig::default()
        };
        let app = test::init_service(
            App::new()
                .app_data(state_with(config, CountingFetcher::new(false), Arc::new(ManualClock::new())))
                .configure(routes),
        )
        .await;

        for (path, status) in [
            ("/", StatusCode::OK),
            ("/styles.css", StatusCode::OK),
            ("/photo.jpg", StatusCode::OK),
            ("/notes.txt", StatusCode::NOT_FOUND),
            ("/missing.png", StatusCode::NOT_FOUND),
        ] {
            let resp = test::call_service(&app, test::TestRequest::get().uri(path).to_request()).await;
            assert_eq!(resp.status(), status, "{}", path);
        }
    }

    #[actix_web::test]
    async fn image_names_must_be_plain() {
        assert!(is_servable_image("a.JPG"));
        assert!(is_servable_image("b.gif"));
        assert!(!is_servable_image("c.svg"));
        assert!(!is_servable_image("../d.png"));
        assert!(!is_servable_image("noext"));
    }
}
