//! STAC catalog client for Sentinel-2 L2A scene discovery.
//!
//! Speaks the `/search` endpoint of two catalogs: Microsoft Planetary
//! Computer and Element84 Earth Search. Both serve the same products;
//! Microsoft additionally requires asset hrefs to be signed with a
//! short-lived SAS token, fetched once per session and refreshed when it
//! nears expiry.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::geometry::BoundingBox;

/// The collection both catalogs publish Sentinel-2 L2A products under.
pub const COLLECTION: &str = "sentinel-2-l2a";

const MICROSOFT_API_URL: &str = "https://planetarycomputer.microsoft.com/api/stac/v1";
const ELEMENT84_API_URL: &str = "https://earth-search.aws.element84.com/v1";
const MICROSOFT_SAS_URL: &str = "https://planetarycomputer.microsoft.com/api/sas/v1";

/// Single-page search; the original tool never paginated and a few-km box
/// over two months stays well under this.
const SEARCH_LIMIT: u32 = 100;

/// Tokens this close to expiry are refreshed before use.
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;

/// Which catalog to query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CatalogApi {
    /// Microsoft Planetary Computer (signed asset access)
    Microsoft,
    /// Element84 Earth Search (anonymous access)
    Element84,
}

impl CatalogApi {
    #[must_use]
    pub fn endpoint(&self) -> &'static str {
        match self {
            CatalogApi::Microsoft => MICROSOFT_API_URL,
            CatalogApi::Element84 => ELEMENT84_API_URL,
        }
    }
}

impl std::fmt::Display for CatalogApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogApi::Microsoft => f.write_str("microsoft"),
            CatalogApi::Element84 => f.write_str("element84"),
        }
    }
}

/// One catalog item, reduced to what the downloader needs.
#[derive(Debug, Clone)]
pub struct Scene {
    pub id: String,
    /// Acquisition datetime exactly as the catalog reported it.
    pub datetime: String,
    pub acquired: DateTime<Utc>,
    pub cloud_cover: f64,
    pub platform: Option<String>,
    /// Asset key to href.
    pub assets: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct ItemCollection {
    #[serde(default)]
    features: Vec<StacItem>,
}

#[derive(Debug, Deserialize)]
struct StacItem {
    id: String,
    properties: StacProperties,
    #[serde(default)]
    assets: HashMap<String, StacAsset>,
}

#[derive(Debug, Deserialize)]
struct StacProperties {
    datetime: String,
    #[serde(rename = "eo:cloud_cover")]
    cloud_cover: Option<f64>,
    platform: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StacAsset {
    href: String,
}

impl Scene {
    fn from_item(item: StacItem) -> Result<Self> {
        let acquired = DateTime::parse_from_rfc3339(&item.properties.datetime)
            .map_err(|e| {
                Error::Catalog(format!(
                    "scene {} has unparseable datetime {:?}: {e}",
                    item.id, item.properties.datetime
                ))
            })?
            .with_timezone(&Utc);

        let cloud_cover = item.properties.cloud_cover.ok_or_else(|| {
            Error::Catalog(format!("scene {} is missing eo:cloud_cover", item.id))
        })?;

        Ok(Scene {
            id: item.id,
            datetime: item.properties.datetime,
            acquired,
            cloud_cover,
            platform: item.properties.platform,
            assets: item
                .assets
                .into_iter()
                .map(|(key, asset)| (key, asset.href))
                .collect(),
        })
    }
}

/// Short-lived SAS token for Planetary Computer blob access.
#[derive(Debug, Clone)]
pub struct SasToken {
    pub token: String,
    pub expiry: DateTime<Utc>,
}

impl SasToken {
    /// Expired, or close enough to expiry that a fresh fetch is due.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now + chrono::Duration::seconds(TOKEN_EXPIRY_MARGIN_SECS) >= self.expiry
    }
}

#[derive(Debug, Deserialize)]
struct SasTokenResponse {
    #[serde(rename = "msft:expiry")]
    expiry: DateTime<Utc>,
    token: String,
}

/// Blocking STAC client.
///
/// Holds the only process-scoped state of the tool: the HTTP connection
/// pool and, for Microsoft, the cached SAS token.
pub struct CatalogClient {
    api: CatalogApi,
    http: reqwest::blocking::Client,
    pub(crate) sas: Option<SasToken>,
}

impl CatalogClient {
    pub fn new(api: CatalogApi) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            api,
            http,
            sas: None,
        })
    }

    #[must_use]
    pub fn api(&self) -> CatalogApi {
        self.api
    }

    /// The HTTP client, shared with asset readers for connection reuse.
    #[must_use]
    pub fn http(&self) -> &reqwest::blocking::Client {
        &self.http
    }

    /// Search for scenes intersecting `bbox` within the date range and
    /// below the cloud-cover ceiling.
    ///
    /// Returns scenes ordered by ascending cloud cover, then acquisition
    /// time. An empty result is an error, never an empty success.
    pub fn search(
        &self,
        bbox: &BoundingBox,
        cloud_cover: f64,
        date_range: (NaiveDate, NaiveDate),
    ) -> Result<Vec<Scene>> {
        let body = serde_json::json!({
            "collections": [COLLECTION],
            "intersects": bbox.to_geojson(),
            "query": {"eo:cloud_cover": {"lt": cloud_cover}},
            "datetime": format!(
                "{}/{}",
                date_range.0.format("%Y-%m-%d"),
                date_range.1.format("%Y-%m-%d")
            ),
            "limit": SEARCH_LIMIT,
        });

        let url = format!("{}/search", self.api.endpoint());
        debug!(%url, "searching catalog");
        let response = self.http.post(&url).json(&body).send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Catalog(format!("search request failed: {status}")));
        }

        let collection: ItemCollection = response.json()?;
        let scenes = scenes_from_collection(collection)?;
        info!(count = scenes.len(), "catalog search matched scenes");
        Ok(scenes)
    }

    /// Sign an asset href for download.
    ///
    /// Element84 assets are public; Microsoft hrefs get the session SAS
    /// token appended as their query string.
    pub fn sign(&mut self, href: &str) -> Result<String> {
        match self.api {
            CatalogApi::Element84 => Ok(href.to_string()),
            CatalogApi::Microsoft => {
                let token = self.ensure_token()?;
                let mut url = Url::parse(href)
                    .map_err(|e| Error::Catalog(format!("invalid asset href {href:?}: {e}")))?;
                url.set_query(Some(&token));
                Ok(url.to_string())
            }
        }
    }

    /// Size estimate for an asset, used by verbose reporting. Failures
    /// degrade to `None` rather than aborting the scene.
    #[must_use]
    pub fn head_size(&self, href: &str) -> Option<u64> {
        let response = self.http.head(href).send().ok()?;
        response
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
    }

    fn ensure_token(&mut self) -> Result<String> {
        if let Some(token) = &self.sas {
            if !token.is_expired(Utc::now()) {
                return Ok(token.token.clone());
            }
            debug!("SAS token expired, refreshing");
        }

        let url = format!("{MICROSOFT_SAS_URL}/token/{COLLECTION}");
        let response = self
            .http
            .get(&url)
            .send()
            .map_err(|e| Error::Authentication(format!("token request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Authentication(format!(
                "token endpoint returned {status}"
            )));
        }

        let parsed: SasTokenResponse = response
            .json()
            .map_err(|e| Error::Authentication(format!("malformed token response: {e}")))?;

        debug!(expiry = %parsed.expiry, "acquired SAS token");
        let token = SasToken {
            token: parsed.token,
            expiry: parsed.expiry,
        };
        let value = token.token.clone();
        self.sas = Some(token);
        Ok(value)
    }
}

/// Convert a parsed item collection into the ordered scene list.
fn scenes_from_collection(collection: ItemCollection) -> Result<Vec<Scene>> {
    let mut scenes = Vec::with_capacity(collection.features.len());
    for item in collection.features {
        match Scene::from_item(item) {
            Ok(scene) => scenes.push(scene),
            Err(e) => warn!("skipping malformed catalog item: {e}"),
        }
    }

    if scenes.is_empty() {
        return Err(Error::NoScenes);
    }

    scenes.sort_by(|a, b| {
        a.cloud_cover
            .total_cmp(&b.cloud_cover)
            .then_with(|| a.acquired.cmp(&b.acquired))
    });

    Ok(scenes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item_json(id: &str, datetime: &str, cloud_cover: f64) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "properties": {
                "datetime": datetime,
                "eo:cloud_cover": cloud_cover,
                "platform": "sentinel-2a",
            },
            "assets": {
                "B02": {"href": format!("https://example.com/{id}/B02.tif")},
                "B03": {"href": format!("https://example.com/{id}/B03.tif")},
            },
        })
    }

    fn collection_from(items: Vec<serde_json::Value>) -> ItemCollection {
        serde_json::from_value(serde_json::json!({
            "type": "FeatureCollection",
            "features": items,
        }))
        .unwrap()
    }

    #[test]
    fn test_scene_parses_from_stac_item() {
        let collection =
            collection_from(vec![item_json("S2A_X", "2024-01-14T10:30:21.024000Z", 3.5)]);
        let scenes = scenes_from_collection(collection).unwrap();
        assert_eq!(scenes.len(), 1);
        let scene = &scenes[0];
        assert_eq!(scene.id, "S2A_X");
        assert_eq!(scene.cloud_cover, 3.5);
        assert_eq!(scene.platform.as_deref(), Some("sentinel-2a"));
        assert!(scene.assets.contains_key("B02"));
        assert_eq!(scene.acquired.date_naive().to_string(), "2024-01-14");
    }

    #[test]
    fn test_empty_collection_is_no_scenes() {
        let collection = collection_from(vec![]);
        let err = scenes_from_collection(collection).unwrap_err();
        assert!(matches!(err, Error::NoScenes));
    }

    #[test]
    fn test_scenes_ordered_by_cloud_cover_then_date() {
        let collection = collection_from(vec![
            item_json("later_clear", "2024-02-20T10:30:00Z", 1.0),
            item_json("cloudy", "2024-01-05T10:30:00Z", 9.0),
            item_json("early_clear", "2024-01-10T10:30:00Z", 1.0),
        ]);
        let scenes = scenes_from_collection(collection).unwrap();
        let ids: Vec<&str> = scenes.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["early_clear", "later_clear", "cloudy"]);
    }

    #[test]
    fn test_items_without_cloud_cover_are_skipped() {
        let mut bad = item_json("no_cc", "2024-01-10T10:30:00Z", 0.0);
        bad["properties"]
            .as_object_mut()
            .unwrap()
            .remove("eo:cloud_cover");
        let collection = collection_from(vec![bad, item_json("ok", "2024-01-11T10:30:00Z", 2.0)]);
        let scenes = scenes_from_collection(collection).unwrap();
        assert_eq!(scenes.len(), 1);
        assert_eq!(scenes[0].id, "ok");
    }

    #[test]
    fn test_token_expiry_margin() {
        let now = Utc::now();
        let fresh = SasToken {
            token: "se=later".to_string(),
            expiry: now + chrono::Duration::minutes(30),
        };
        assert!(!fresh.is_expired(now));

        let nearly = SasToken {
            token: "se=soon".to_string(),
            expiry: now + chrono::Duration::seconds(30),
        };
        assert!(nearly.is_expired(now), "tokens within the margin count as expired");

        let gone = SasToken {
            token: "se=past".to_string(),
            expiry: now - chrono::Duration::minutes(5),
        };
        assert!(gone.is_expired(now));
    }

    #[test]
    fn test_token_response_shape() {
        let parsed: SasTokenResponse = serde_json::from_value(serde_json::json!({
            "msft:expiry": "2024-01-14T12:00:00Z",
            "token": "st=2024-01-14&se=2024-01-14T12%3A00%3A00Z&sig=abc",
        }))
        .unwrap();
        assert!(parsed.token.starts_with("st="));
        assert_eq!(parsed.expiry.to_rfc3339(), "2024-01-14T12:00:00+00:00");
    }

    #[test]
    fn test_sign_appends_cached_token() {
        let mut client = CatalogClient::new(CatalogApi::Microsoft).unwrap();
        client.sas = Some(SasToken {
            token: "sig=abc123".to_string(),
            expiry: Utc::now() + chrono::Duration::hours(1),
        });
        let signed = client
            .sign("https://sentinel2l2a01.blob.core.windows.net/x/B04.tif")
            .unwrap();
        assert_eq!(
            signed,
            "https://sentinel2l2a01.blob.core.windows.net/x/B04.tif?sig=abc123"
        );
    }

    #[test]
    fn test_element84_sign_is_identity() {
        let mut client = CatalogClient::new(CatalogApi::Element84).unwrap();
        let href = "https://e84-bucket.s3.amazonaws.com/x/red.tif";
        assert_eq!(client.sign(href).unwrap(), href);
    }
}
