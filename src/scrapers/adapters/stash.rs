//! Remote catalog adapter. Talks GraphQL to another catalog server.
//!
//! Ids in responses belong to the remote server, so every record leaves
//! here with its stored ids moved into `remote_site_id`.

use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use super::{AdapterCall, StoredEntity};
use crate::error::{Result, ScrapeError};
use crate::models::{ContentType, Input, ScrapedContent, ScrapedPerformer};
use crate::scrapers::definition::{HeaderEntry, StashServer};

const API_KEY_HEADER: &str = "ApiKey";
const SEARCH_PAGE_SIZE: u32 = 10;

const PERFORMER_FIELDS: &str = "
    id name disambiguation gender urls twitter instagram birthdate ethnicity country
    eye_color height: height_cm measurements fake_tits penis_length circumcised
    career_length tattoos piercings aliases: alias_list details death_date hair_color
    weight tags { id name }";

const STUDIO_FIELDS: &str = "id name url";

fn scene_fields() -> String {
    format!(
        "id title code details director urls date
         studio {{ {studio} }}
         tags {{ id name }}
         performers {{ {performer} }}
         movies {{ movie {{ id name aliases duration date director synopsis url studio {{ {studio} }} }} }}",
        studio = STUDIO_FIELDS,
        performer = PERFORMER_FIELDS,
    )
}

fn gallery_fields() -> String {
    format!(
        "id title code details photographer urls date
         studio {{ {studio} }}
         tags {{ id name }}
         performers {{ {performer} }}",
        studio = STUDIO_FIELDS,
        performer = PERFORMER_FIELDS,
    )
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

struct StashClient<'a> {
    call: &'a AdapterCall<'a>,
    server: &'a StashServer,
}

impl<'a> StashClient<'a> {
    fn new(call: &'a AdapterCall<'a>) -> Result<Self> {
        Ok(Self {
            call,
            server: call.stash_server()?,
        })
    }

    fn base_url(&self) -> &str {
        self.server.url.trim_end_matches('/')
    }

    async fn query(&self, query: &str, variables: Value) -> Result<Value> {
        let url = format!("{}/graphql", self.base_url());
        let headers: Vec<HeaderEntry> = self
            .server
            .api_key
            .iter()
            .filter(|k| !k.is_empty())
            .map(|k| HeaderEntry {
                key: API_KEY_HEADER.to_string(),
                value: k.clone(),
            })
            .collect();

        debug!("Querying remote catalog {}", url);
        let body = json!({ "query": query, "variables": variables });
        let response: GraphQlResponse = self
            .call
            .env
            .http
            .post_json(self.call.ctx, &url, &body, &headers)
            .await?
            .json()
            .await
            .map_err(|e| ScrapeError::RemoteProtocol(e.to_string()))?;

        if !response.errors.is_empty() {
            let messages: Vec<_> = response.errors.into_iter().map(|e| e.message).collect();
            return Err(ScrapeError::RemoteProtocol(messages.join("; ")));
        }
        response
            .data
            .ok_or_else(|| ScrapeError::RemoteProtocol("response has no data".to_string()))
    }

    fn performer_image(&self, id: &str) -> String {
        format!("{}/performer/{}/image", self.base_url(), id)
    }

    fn scene_image(&self, id: &str) -> String {
        format!("{}/scene/{}/screenshot", self.base_url(), id)
    }
}

/// Reshape a remote record for decoding: `id` becomes `stored_id`, scalars
/// become strings, alias lists are joined and movie wrappers are unwrapped.
fn normalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, value) in map {
                let value = match (key.as_str(), value) {
                    ("aliases", Value::Array(items)) => Value::String(
                        items
                            .iter()
                            .filter_map(Value::as_str)
                            .collect::<Vec<_>>()
                            .join(", "),
                    ),
                    ("movies", Value::Array(items)) => Value::Array(
                        items
                            .into_iter()
                            .map(|m| match m {
                                Value::Object(mut o) if o.contains_key("movie") => {
                                    normalize(o.remove("movie").unwrap_or(Value::Null))
                                }
                                other => normalize(other),
                            })
                            .collect(),
                    ),
                    (_, value) => normalize(value),
                };
                if value.is_null() {
                    continue;
                }
                let key = if key == "id" { "stored_id".to_string() } else { key };
                out.insert(key, value);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(normalize).collect()),
        Value::Number(n) => Value::String(n.to_string()),
        Value::Bool(b) => Value::String(b.to_string()),
        other => other,
    }
}

fn decode(ty: ContentType, value: Value) -> Result<Option<ScrapedContent>> {
    if value.is_null() {
        return Ok(None);
    }
    let mut content = ScrapedContent::from_json(ty, normalize(value))
        .map_err(|e| ScrapeError::RemoteProtocol(format!("could not decode {}: {}", ty, e)))?;
    content.blank_stored_ids();
    Ok(Some(content))
}

fn field(data: &mut Value, name: &str) -> Value {
    data.get_mut(name).map(Value::take).unwrap_or(Value::Null)
}

fn record_id(value: &Value) -> Option<String> {
    match value.get("id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

async fn find_performer(client: &StashClient<'_>, id: &str) -> Result<Option<ScrapedContent>> {
    let query = format!(
        "query FindPerformer($id: ID!) {{ findPerformer(id: $id) {{ {} }} }}",
        PERFORMER_FIELDS
    );
    let mut data = client.query(&query, json!({ "id": id })).await?;
    let performer = field(&mut data, "findPerformer");
    let image = record_id(&performer).map(|id| client.performer_image(&id));

    Ok(decode(ContentType::Performer, performer)?.map(|mut content| {
        if let ScrapedContent::Performer(p) = &mut content {
            p.image = image;
        }
        content
    }))
}

async fn find_scene_by_hash(
    client: &StashClient<'_>,
    checksum: Option<&str>,
    oshash: Option<&str>,
) -> Result<Option<ScrapedContent>> {
    if checksum.is_none() && oshash.is_none() {
        return Ok(None);
    }
    let query = format!(
        "query FindSceneByHash($input: SceneHashInput!) {{ findSceneByHash(input: $input) {{ {} }} }}",
        scene_fields()
    );
    let input = json!({ "input": { "checksum": checksum, "oshash": oshash } });
    let mut data = client.query(&query, input).await?;
    let scene = field(&mut data, "findSceneByHash");
    let image = record_id(&scene).map(|id| client.scene_image(&id));

    Ok(decode(ContentType::Scene, scene)?.map(|mut content| {
        if let ScrapedContent::Scene(s) = &mut content {
            s.image = image;
        }
        content
    }))
}

async fn find_gallery_by_hash(client: &StashClient<'_>, checksum: Option<&str>) -> Result<Option<ScrapedContent>> {
    let Some(checksum) = checksum else {
        return Ok(None);
    };
    let query = format!(
        "query FindGalleryByHash($input: GalleryHashInput!) {{ findGalleryByHash(input: $input) {{ {} }} }}",
        gallery_fields()
    );
    let mut data = client
        .query(&query, json!({ "input": { "checksum": checksum } }))
        .await?;
    decode(ContentType::Gallery, field(&mut data, "findGalleryByHash"))
}

pub(super) async fn by_name(call: &AdapterCall<'_>, query: &str, ty: ContentType) -> Result<Vec<ScrapedContent>> {
    let client = StashClient::new(call)?;
    let filter = json!({ "filter": { "q": query, "page": 1, "per_page": SEARCH_PAGE_SIZE } });

    match ty {
        ContentType::Performer => {
            let gql = "query FindPerformers($filter: FindFilterType) { findPerformers(filter: $filter) { performers { id name } } }";
            let mut data = client.query(gql, filter).await?;
            let found = field(&mut data, "findPerformers");
            let performers = found
                .get("performers")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();

            // The remote id travels in `url` too so a fragment scrape can
            // fetch the full record afterwards.
            Ok(performers
                .iter()
                .filter_map(|p| {
                    let id = record_id(p)?;
                    Some(ScrapedContent::Performer(ScrapedPerformer {
                        name: p.get("name").and_then(Value::as_str).map(str::to_string),
                        url: Some(id.clone()),
                        remote_site_id: Some(id),
                        ..Default::default()
                    }))
                })
                .collect())
        }
        ContentType::Scene => {
            let gql = format!(
                "query FindScenes($filter: FindFilterType) {{ findScenes(filter: $filter) {{ scenes {{ {} }} }} }}",
                scene_fields()
            );
            let mut data = client.query(&gql, filter).await?;
            let scenes = field(&mut data, "findScenes")
                .get_mut("scenes")
                .map(Value::take)
                .and_then(|v| match v {
                    Value::Array(items) => Some(items),
                    _ => None,
                })
                .unwrap_or_default();

            let mut out = Vec::with_capacity(scenes.len());
            for scene in scenes {
                let image = record_id(&scene).map(|id| client.scene_image(&id));
                if let Some(mut content) = decode(ContentType::Scene, scene)? {
                    if let ScrapedContent::Scene(s) = &mut content {
                        s.image = image;
                    }
                    out.push(content);
                }
            }
            Ok(out)
        }
        other => Err(ScrapeError::NotSupported(format!(
            "{}: cannot search {} by name on a remote catalog",
            call.def.id, other
        ))),
    }
}

pub(super) async fn by_fragment(call: &AdapterCall<'_>, input: &Input) -> Result<Option<ScrapedContent>> {
    let client = StashClient::new(call)?;

    if let Some(performer) = &input.performer {
        let remote_id = performer
            .remote_site_id
            .as_deref()
            .or(performer.url.as_deref())
            .filter(|id| !id.is_empty());
        let Some(remote_id) = remote_id else {
            return Err(ScrapeError::InvalidInput(
                "performer fragment has no remote id".to_string(),
            ));
        };
        return find_performer(&client, remote_id).await;
    }

    if let Some(scene) = &input.scene {
        let Some(stored_id) = scene.stored_id.as_deref() else {
            return Err(ScrapeError::NotSupported(format!(
                "{}: scene fragments without a stored scene cannot be matched remotely",
                call.def.id
            )));
        };
        let mut txn = call.env.catalog.begin().await?;
        let stored = txn.find_scene(stored_id).await?;
        let Some(stored) = stored else {
            return Err(ScrapeError::NotFound(format!("scene {}", stored_id)));
        };
        return find_scene_by_hash(&client, stored.checksum.as_deref(), stored.oshash.as_deref()).await;
    }

    if let Some(gallery) = &input.gallery {
        let Some(stored_id) = gallery.stored_id.as_deref() else {
            return Err(ScrapeError::NotSupported(format!(
                "{}: gallery fragments without a stored gallery cannot be matched remotely",
                call.def.id
            )));
        };
        let mut txn = call.env.catalog.begin().await?;
        let stored = txn.find_gallery(stored_id).await?;
        let Some(stored) = stored else {
            return Err(ScrapeError::NotFound(format!("gallery {}", stored_id)));
        };
        return find_gallery_by_hash(&client, stored.checksum.as_deref()).await;
    }

    Err(ScrapeError::InvalidInput("empty scrape input".to_string()))
}

pub(super) async fn by_stored(call: &AdapterCall<'_>, stored: &StoredEntity) -> Result<Option<ScrapedContent>> {
    let client = StashClient::new(call)?;
    match stored {
        StoredEntity::Scene(scene) => {
            find_scene_by_hash(&client, scene.checksum.as_deref(), scene.oshash.as_deref()).await
        }
        StoredEntity::Gallery(gallery) => find_gallery_by_hash(&client, gallery.checksum.as_deref()).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_remote_scene() {
        let raw = json!({
            "id": 12,
            "title": "Remote",
            "studio": { "id": "3", "name": "Studio" },
            "performers": [{ "id": "7", "name": "P", "aliases": ["A", "B"], "height": 170 }],
            "movies": [{ "movie": { "id": "9", "name": "M" } }],
            "code": null
        });
        let content = decode(ContentType::Scene, raw).unwrap().unwrap();
        let ScrapedContent::Scene(scene) = content else {
            panic!("expected a scene");
        };

        assert_eq!(scene.stored_id, None);
        assert_eq!(scene.remote_site_id.as_deref(), Some("12"));
        assert_eq!(scene.code, None);
        let studio = scene.studio.unwrap();
        assert_eq!(studio.remote_site_id.as_deref(), Some("3"));
        assert_eq!(scene.performers[0].aliases.as_deref(), Some("A, B"));
        assert_eq!(scene.performers[0].height.as_deref(), Some("170"));
        assert_eq!(scene.movies[0].name.as_deref(), Some("M"));
        assert_eq!(scene.movies[0].remote_site_id.as_deref(), Some("9"));
    }

    #[test]
    fn test_decode_null_record() {
        assert!(decode(ContentType::Gallery, Value::Null).unwrap().is_none());
    }

    #[test]
    fn test_record_id() {
        assert_eq!(record_id(&json!({"id": 4})), Some("4".to_string()));
        assert_eq!(record_id(&json!({"id": "x"})), Some("x".to_string()));
        assert_eq!(record_id(&json!({})), None);
    }
}
