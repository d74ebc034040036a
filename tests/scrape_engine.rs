//! End-to-end scrapes against a local fixture server.

use std::path::Path;
use std::sync::Arc;

use axum::extract::Json;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Redirect};
use axum::routing::{get, post};
use axum::Router;
use serde_json::{json, Value};

use metascrape::catalog::{CatalogState, MemoryCatalog, NamedEntity, StoredScene};
use metascrape::models::{ContentType, Input, ScrapedContent, ScrapedPerformer, ScrapedScene};
use metascrape::{Config, ScrapeContext, ScrapeError, ScraperRegistry};

const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D];

async fn graphql(headers: HeaderMap, Json(body): Json<Value>) -> impl IntoResponse {
    if headers.get("ApiKey").and_then(|v| v.to_str().ok()) != Some("secret") {
        return (StatusCode::UNAUTHORIZED, Json(json!({"errors": [{"message": "no key"}]})));
    }
    let query = body["query"].as_str().unwrap_or_default();
    if query.contains("findPerformer(") {
        return (
            StatusCode::OK,
            Json(json!({"data": {"findPerformer": {
                "id": "7",
                "name": "Remote Performer",
                "aliases": ["RP"],
                "tags": [{"id": "3", "name": "Outdoor"}]
            }}})),
        );
    }
    (
        StatusCode::OK,
        Json(json!({"errors": [{"message": "unknown query"}]})),
    )
}

fn fixture_router() -> Router {
    Router::new()
        .route(
            "/performer/mia",
            get(|| async {
                Html(
                    r#"<html><body><h1>Mia Malkova</h1>
                    <span class="dob">July 1, 1992 (27 years old)</span></body></html>"#,
                )
            }),
        )
        .route(
            "/api/performer/mia",
            get(|| async { Json(json!({"data": {"name": "Mia Malkova"}})) }),
        )
        .route(
            "/api/performer/none",
            get(|| async { Json(json!({"data": null})) }),
        )
        .route(
            "/scene/1",
            get(|| async {
                Html(
                    r#"<html><body>
                    <h1>Beach Day</h1>
                    <a class="tag">Admin Tools</a><a class="tag">Public</a>
                    <a class="studio">Acme</a>
                    <a id="details" href="/scene/1/details">details</a>
                    </body></html>"#,
                )
            }),
        )
        .route(
            "/scene/1/details",
            get(|| async {
                Html("<html><body><p>A long day at the beach.</p><time>2020-01-02</time></body></html>")
            }),
        )
        .route(
            "/scene/missing",
            get(|| async { (StatusCode::NOT_FOUND, "gone") }),
        )
        .route("/scene/loop", get(|| async { Redirect::temporary("/scene/loop") }))
        .route("/graphql", post(graphql))
        .route(
            "/performer/7/image",
            get(|| async { ([(header::CONTENT_TYPE, "image/png")], PNG) }),
        )
}

async fn serve() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, fixture_router()).await.unwrap();
    });
    format!("http://{}", addr)
}

fn write(dir: &Path, name: &str, contents: &str) {
    std::fs::write(dir.join(name), contents).unwrap();
}

fn write_definitions(dir: &Path, base: &str) {
    write(
        dir,
        "markup.yml",
        &format!(
            r#"
name: Markup Site
performerByURL:
  - action: scrapeXPath
    url: ["{base}/performer/"]
    scraper: performer
sceneByURL:
  - action: scrapeXPath
    url: ["{base}/scene/"]
    scraper: scene
xPathScrapers:
  performer:
    performer:
      Name: //h1
      Birthdate:
        selector: //span[@class="dob"]
        postProcess:
          - replace:
              - regex: " \\(.*\\)"
                with: ""
          - parseDate: January 2, 2006
  scene:
    scene:
      Title: //h1
      Details:
        selector: //a[@id="details"]/@href
        postProcess:
          - subScraper: //p
      Date:
        selector: //a[@id="details"]/@href
        postProcess:
          - subScraper: //time
      Tags:
        Name: //a[@class="tag"]
      Studio:
        Name: //a[@class="studio"]
"#
        ),
    );

    write(
        dir,
        "json.yml",
        &format!(
            r#"
name: Json Site
performerByURL:
  - action: scrapeJson
    url: ["{base}/api/performer/"]
    scraper: performer
jsonScrapers:
  performer:
    performer:
      Name: data.name
"#
        ),
    );

    write(
        dir,
        "remote.yml",
        &format!(
            r#"
name: Remote Catalog
performerByFragment:
  action: stash
stashServer:
  url: {base}/
  apiKey: secret
"#
        ),
    );

    write(
        dir,
        "urlonly.yml",
        &format!(
            r#"
name: URL Only
sceneByURL:
  - action: scrapeXPath
    url: ["{base}/scene/"]
    scraper: scene
xPathScrapers:
  scene:
    scene:
      Title: //h1
"#
        ),
    );
}

fn catalog() -> Arc<MemoryCatalog> {
    let named = |id: &str, name: &str| NamedEntity {
        id: id.to_string(),
        name: name.to_string(),
        aliases: Vec::new(),
        checksum: None,
    };
    Arc::new(MemoryCatalog::from_state(CatalogState {
        studios: vec![named("11", "Acme")],
        tags: vec![named("3", "Outdoor"), named("4", "Public")],
        scenes: vec![StoredScene {
            id: "100".to_string(),
            title: Some("Stored".to_string()),
            url: Some(String::new()),
            ..Default::default()
        }],
        ..Default::default()
    }))
}

async fn setup() -> (tempfile::TempDir, ScraperRegistry, String) {
    let base = serve().await;
    let dir = tempfile::tempdir().unwrap();
    write_definitions(dir.path(), &base);

    let config = Config {
        scrapers_path: dir.path().display().to_string(),
        exclude_tag_patterns: vec!["^admin".to_string()],
        ..Default::default()
    };
    let registry = ScraperRegistry::new(config, catalog()).unwrap();
    (dir, registry, base)
}

fn performer(content: Option<ScrapedContent>) -> ScrapedPerformer {
    match content {
        Some(ScrapedContent::Performer(p)) => p,
        other => panic!("expected a performer, got {:?}", other),
    }
}

fn scene(content: Option<ScrapedContent>) -> ScrapedScene {
    match content {
        Some(ScrapedContent::Scene(s)) => s,
        other => panic!("expected a scene, got {:?}", other),
    }
}

#[tokio::test]
async fn test_markup_performer_by_url() {
    let (_dir, registry, base) = setup().await;
    let found = registry
        .scrape_url(&ScrapeContext::new(), &format!("{}/performer/mia", base), ContentType::Performer)
        .await
        .unwrap();

    let p = performer(found);
    assert_eq!(p.name.as_deref(), Some("Mia Malkova"));
    assert_eq!(p.birthdate.as_deref(), Some("1992-07-01"));
}

#[tokio::test]
async fn test_json_performer_and_null_data() {
    let (_dir, registry, base) = setup().await;
    let ctx = ScrapeContext::new();

    let found = registry
        .scrape_url(&ctx, &format!("{}/api/performer/mia", base), ContentType::Performer)
        .await
        .unwrap();
    assert_eq!(performer(found).name.as_deref(), Some("Mia Malkova"));

    let none = registry
        .scrape_url(&ctx, &format!("{}/api/performer/none", base), ContentType::Performer)
        .await
        .unwrap();
    assert!(none.is_none());
}

#[tokio::test]
async fn test_scene_resolution_exclusion_and_sub_scrape() {
    let (_dir, registry, base) = setup().await;
    let found = registry
        .scrape_url(&ScrapeContext::new(), &format!("{}/scene/1", base), ContentType::Scene)
        .await
        .unwrap();

    let s = scene(found);
    assert_eq!(s.title.as_deref(), Some("Beach Day"));
    assert_eq!(s.details.as_deref(), Some("A long day at the beach."));
    assert_eq!(s.date.as_deref(), Some("2020-01-02"));

    let tag_names: Vec<_> = s.tags.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(tag_names, vec!["Public"]);
    assert_eq!(s.tags[0].stored_id.as_deref(), Some("4"));
    assert_eq!(s.studio.unwrap().stored_id.as_deref(), Some("11"));
}

#[tokio::test]
async fn test_remote_catalog_ids_are_blanked() {
    let (_dir, registry, _base) = setup().await;
    let input = Input::performer(ScrapedPerformer {
        remote_site_id: Some("7".to_string()),
        ..Default::default()
    });

    let found = registry
        .scrape_fragment(&ScrapeContext::new(), "remote", input)
        .await
        .unwrap();

    let p = performer(found);
    assert_eq!(p.name.as_deref(), Some("Remote Performer"));
    assert_eq!(p.stored_id, None);
    assert_eq!(p.remote_site_id.as_deref(), Some("7"));
    assert_eq!(p.aliases.as_deref(), Some("RP"));
    assert_eq!(p.tags[0].stored_id, None);
    assert_eq!(p.tags[0].remote_site_id.as_deref(), Some("3"));
    assert!(p
        .image
        .as_deref()
        .is_some_and(|i| i.starts_with("data:image/png;base64,")));
}

#[tokio::test]
async fn test_fragment_falls_back_to_url() {
    let (_dir, registry, base) = setup().await;
    let input = Input::scene(ScrapedScene {
        urls: vec![format!("{}/scene/1", base)],
        ..Default::default()
    });

    let found = registry
        .scrape_fragment(&ScrapeContext::new(), "urlonly", input)
        .await
        .unwrap();
    assert!(scene(found).title.is_some());
}

#[tokio::test]
async fn test_http_errors_abort() {
    let (_dir, registry, base) = setup().await;
    let ctx = ScrapeContext::new();

    let err = registry
        .scrape_url(&ctx, &format!("{}/scene/missing", base), ContentType::Scene)
        .await
        .unwrap_err();
    assert!(matches!(err, ScrapeError::Http { status: 404, .. }));

    let err = registry
        .scrape_url(&ctx, &format!("{}/scene/loop", base), ContentType::Scene)
        .await
        .unwrap_err();
    assert!(matches!(err, ScrapeError::MaxRedirectsExceeded(_)));
}

#[tokio::test]
async fn test_stored_scene_without_strategy_or_url() {
    let (_dir, registry, _base) = setup().await;
    let ctx = ScrapeContext::new();

    let err = registry
        .scrape_stored(&ctx, "urlonly", "100", ContentType::Scene)
        .await
        .unwrap_err();
    assert!(matches!(err, ScrapeError::NotSupported(_)));

    let err = registry
        .scrape_stored(&ctx, "urlonly", "999", ContentType::Scene)
        .await
        .unwrap_err();
    assert!(matches!(err, ScrapeError::NotFound(_)));
}

#[cfg(unix)]
#[tokio::test]
async fn test_script_scene_by_url() {
    let (dir, registry, _base) = setup().await;
    write(
        dir.path(),
        "scene.sh",
        "#!/bin/sh\ncat > /dev/null\necho 'INFO: scraping' >&2\necho '{\"title\": \"From Script\", \"tags\": [{\"name\": \"Outdoor\"}]}'\n",
    );
    write(
        dir.path(),
        "script.yml",
        "name: Script\nsceneByURL:\n  - action: script\n    url: [script.example]\n    script: [sh, scene.sh]\n",
    );
    registry.reload();

    let found = registry
        .scrape_url(&ScrapeContext::new(), "https://script.example/1", ContentType::Scene)
        .await
        .unwrap();
    let s = scene(found);
    assert_eq!(s.title.as_deref(), Some("From Script"));
    assert_eq!(s.tags[0].stored_id.as_deref(), Some("3"));
}

#[cfg(unix)]
#[tokio::test]
async fn test_script_deadline_kills_child() {
    let (dir, registry, _base) = setup().await;
    write(dir.path(), "slow.sh", "#!/bin/sh\nsleep 30\necho null\n");
    write(
        dir.path(),
        "slow.yml",
        "sceneByURL:\n  - action: script\n    url: [slow.example]\n    script: [sh, slow.sh]\n",
    );
    registry.reload();

    let ctx = ScrapeContext::new().with_timeout(std::time::Duration::from_millis(200));
    let err = registry
        .scrape_url(&ctx, "https://slow.example/1", ContentType::Scene)
        .await
        .unwrap_err();
    assert!(matches!(err, ScrapeError::DeadlineExceeded));
}
