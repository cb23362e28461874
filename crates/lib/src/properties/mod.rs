//! Property records (rental units) used as reply context.
//!
//! Records live in the context store and are read fresh on every request. The relay never
//! writes them; create/update/delete are administrative operations driven from the CLI.

mod airtable;
mod resolver;

pub use airtable::{AirtableClient, AirtableError, PropertySource, PLACEHOLDER_PHOTO};
pub use resolver::{
    normalize_sender, resolver_for, ContextResolver, NotImplementedMatcher, SenderKeyMatcher,
};

use serde::{Deserialize, Serialize};

/// A rental unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Property {
    /// Store record id. Ignored on create.
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub check_in_time: String,
    #[serde(default)]
    pub check_out_time: String,
    #[serde(default)]
    pub max_guests: u32,
    #[serde(default)]
    pub access_codes: AccessCodes,
    #[serde(default)]
    pub amenities: Vec<String>,
    #[serde(default)]
    pub house_rules: Vec<String>,
    #[serde(default)]
    pub photos: Vec<String>,
    /// Guest contact used by sender matching, when the store carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessCodes {
    #[serde(default)]
    pub wifi: WifiCredentials,
    #[serde(default)]
    pub door: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WifiCredentials {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub password: String,
}

/// Partial update. Only fields that are `Some` (and non-empty/non-zero) are sent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyPatch {
    pub name: Option<String>,
    pub address: Option<String>,
    pub check_in_time: Option<String>,
    pub check_out_time: Option<String>,
    pub max_guests: Option<u32>,
    pub wifi_name: Option<String>,
    pub wifi_password: Option<String>,
    pub door_code: Option<String>,
    pub amenities: Option<Vec<String>>,
    pub house_rules: Option<Vec<String>>,
}

/// Booking status of the guest, derived per request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookingContext {
    pub has_booking: bool,
    pub check_in: Option<String>,
    pub check_out: Option<String>,
}
