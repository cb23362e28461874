//! Airtable REST client for the property table.
//!
//! Listing follows `offset` pagination until the store reports no more pages. Field names are
//! the column names of the table (e.g. "Check-in Time").

use crate::config::AirtableSettings;
use crate::properties::{AccessCodes, Property, PropertyPatch, WifiCredentials};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};

/// Placeholder photo attached to every mapped property; the table carries no photos column.
pub const PLACEHOLDER_PHOTO: &str = "https://images.unsplash.com/photo-1522708323590-d24dbb6b0267";

const F_NAME: &str = "Name";
const F_ADDRESS: &str = "Address";
const F_CHECK_IN: &str = "Check-in Time";
const F_CHECK_OUT: &str = "Check-out Time";
const F_MAX_GUESTS: &str = "Max Guests";
const F_WIFI_NAME: &str = "WiFi Name";
const F_WIFI_PASSWORD: &str = "WiFi Password";
const F_DOOR_CODE: &str = "Door Code";
const F_AMENITIES: &str = "Amenities";
const F_HOUSE_RULES: &str = "House Rules";

#[derive(Debug, thiserror::Error)]
pub enum AirtableError {
    #[error("airtable request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("airtable api error: {0}")]
    Api(String),
    #[error("airtable url error: {0}")]
    Url(String),
}

/// Read side of the context store, as seen by the resolver.
#[async_trait]
pub trait PropertySource: Send + Sync {
    /// All property records, in store order.
    async fn list_properties(&self) -> Result<Vec<Property>, AirtableError>;
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    records: Vec<Record>,
    offset: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Record {
    id: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct DeleteResponse {
    #[serde(default)]
    deleted: bool,
}

/// Client for one Airtable table.
#[derive(Clone)]
pub struct AirtableClient {
    base_url: String,
    api_key: String,
    base_id: String,
    table: String,
    view: String,
    sender_field: Option<String>,
    client: reqwest::Client,
}

impl AirtableClient {
    pub fn new(settings: &AirtableSettings) -> Result<Self, AirtableError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()?;
        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            base_id: settings.base_id.clone(),
            table: settings.table.clone(),
            view: settings.view.clone(),
            sender_field: settings.sender_field.clone(),
            client,
        })
    }

    /// `{base}/v0/{baseId}/{table}[/{recordId}]`, each segment percent-encoded.
    fn table_url(&self, record_id: Option<&str>) -> Result<reqwest::Url, AirtableError> {
        let mut url =
            reqwest::Url::parse(&self.base_url).map_err(|e| AirtableError::Url(e.to_string()))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| AirtableError::Url(format!("{} cannot be a base", self.base_url)))?;
            segments.pop_if_empty().push("v0").push(&self.base_id).push(&self.table);
            if let Some(id) = record_id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    async fn check(res: reqwest::Response) -> Result<reqwest::Response, AirtableError> {
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(AirtableError::Api(format!("{} {}", status, body)));
        }
        Ok(res)
    }

    /// GET the table through the configured view, one page at a time.
    pub async fn list_properties(&self) -> Result<Vec<Property>, AirtableError> {
        let url = self.table_url(None)?;
        let mut out = Vec::new();
        let mut offset: Option<String> = None;
        loop {
            let mut req = self
                .client
                .get(url.clone())
                .bearer_auth(&self.api_key)
                .query(&[("view", self.view.as_str())]);
            if let Some(ref off) = offset {
                req = req.query(&[("offset", off.as_str())]);
            }
            let res = Self::check(req.send().await?).await?;
            let page: ListResponse = res.json().await?;
            out.extend(page.records.iter().map(|r| self.map_record(r)));
            match page.offset {
                Some(next) if !next.is_empty() => {
                    if offset.as_deref() == Some(next.as_str()) {
                        log::warn!("airtable: store repeated offset {}, stopping pagination", next);
                        break;
                    }
                    offset = Some(next);
                }
                _ => break,
            }
        }
        log::debug!("airtable: fetched {} propert(ies) from {}", out.len(), self.table);
        Ok(out)
    }

    /// POST a new record. `property.id` is ignored.
    pub async fn create_property(&self, property: &Property) -> Result<Property, AirtableError> {
        let url = self.table_url(None)?;
        let body = serde_json::json!({ "fields": property_fields(property) });
        let res = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let record: Record = Self::check(res).await?.json().await?;
        log::info!("airtable: created property {}", record.id);
        Ok(self.map_record(&record))
    }

    /// PATCH the record with only the fields the patch sets.
    pub async fn update_property(
        &self,
        id: &str,
        patch: &PropertyPatch,
    ) -> Result<Property, AirtableError> {
        let url = self.table_url(Some(id))?;
        let body = serde_json::json!({ "fields": patch_fields(patch) });
        let res = self
            .client
            .patch(url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let record: Record = Self::check(res).await?.json().await?;
        log::info!("airtable: updated property {}", record.id);
        Ok(self.map_record(&record))
    }

    /// DELETE the record.
    pub async fn delete_property(&self, id: &str) -> Result<(), AirtableError> {
        let url = self.table_url(Some(id))?;
        let res = self
            .client
            .delete(url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let data: DeleteResponse = Self::check(res).await?.json().await?;
        if !data.deleted {
            return Err(AirtableError::Api(format!("record {} was not deleted", id)));
        }
        log::info!("airtable: deleted property {}", id);
        Ok(())
    }

    fn map_record(&self, record: &Record) -> Property {
        let f = &record.fields;
        Property {
            id: record.id.clone(),
            name: text(f, F_NAME),
            address: text(f, F_ADDRESS),
            check_in_time: text(f, F_CHECK_IN),
            check_out_time: text(f, F_CHECK_OUT),
            max_guests: f
                .get(F_MAX_GUESTS)
                .and_then(|v| v.as_u64().or_else(|| v.as_f64().map(|n| n as u64)))
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(0),
            access_codes: AccessCodes {
                wifi: WifiCredentials {
                    name: text(f, F_WIFI_NAME),
                    password: text(f, F_WIFI_PASSWORD),
                },
                door: text(f, F_DOOR_CODE),
            },
            amenities: list(f, F_AMENITIES),
            house_rules: list(f, F_HOUSE_RULES),
            photos: vec![PLACEHOLDER_PHOTO.to_string()],
            contact: self
                .sender_field
                .as_deref()
                .map(|field| text(f, field))
                .filter(|s| !s.is_empty()),
        }
    }
}

#[async_trait]
impl PropertySource for AirtableClient {
    async fn list_properties(&self) -> Result<Vec<Property>, AirtableError> {
        AirtableClient::list_properties(self).await
    }
}

/// String field (numbers rendered as text); missing => "".
fn text(fields: &Map<String, Value>, name: &str) -> String {
    match fields.get(name) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// Multi-select (array) field. A long-text value is read one entry per non-empty line.
fn list(fields: &Map<String, Value>, name: &str) -> Vec<String> {
    match fields.get(name) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Some(Value::String(s)) => s
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn property_fields(p: &Property) -> Map<String, Value> {
    let mut m = Map::new();
    m.insert(F_NAME.into(), p.name.clone().into());
    m.insert(F_ADDRESS.into(), p.address.clone().into());
    m.insert(F_CHECK_IN.into(), p.check_in_time.clone().into());
    m.insert(F_CHECK_OUT.into(), p.check_out_time.clone().into());
    m.insert(F_MAX_GUESTS.into(), p.max_guests.into());
    m.insert(F_WIFI_NAME.into(), p.access_codes.wifi.name.clone().into());
    m.insert(F_WIFI_PASSWORD.into(), p.access_codes.wifi.password.clone().into());
    m.insert(F_DOOR_CODE.into(), p.access_codes.door.clone().into());
    m.insert(F_HOUSE_RULES.into(), p.house_rules.clone().into());
    m.insert(F_AMENITIES.into(), p.amenities.clone().into());
    m
}

fn patch_fields(p: &PropertyPatch) -> Map<String, Value> {
    let mut m = Map::new();
    let strings = [
        (F_NAME, &p.name),
        (F_ADDRESS, &p.address),
        (F_CHECK_IN, &p.check_in_time),
        (F_CHECK_OUT, &p.check_out_time),
        (F_WIFI_NAME, &p.wifi_name),
        (F_WIFI_PASSWORD, &p.wifi_password),
        (F_DOOR_CODE, &p.door_code),
    ];
    for (field, value) in strings {
        if let Some(v) = value.as_ref().filter(|v| !v.is_empty()) {
            m.insert(field.into(), v.clone().into());
        }
    }
    if let Some(n) = p.max_guests.filter(|n| *n > 0) {
        m.insert(F_MAX_GUESTS.into(), n.into());
    }
    if let Some(ref rules) = p.house_rules {
        m.insert(F_HOUSE_RULES.into(), rules.clone().into());
    }
    if let Some(ref amenities) = p.amenities {
        m.insert(F_AMENITIES.into(), amenities.clone().into());
    }
    m
}
