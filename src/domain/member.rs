use serde::{Deserialize, Deserializer, Serialize};

use serde_aux::field_attributes::{
    deserialize_number_from_string, deserialize_option_number_from_string,
};

/// Membership state of an address on one list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    Subscribed,
    Unsubscribed,
    Cleaned,
    Pending,
    #[serde(other)]
    Other,
}

/// Approximate subscriber location as tracked by the remote service
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geo {
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub latitude: f64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub longitude: f64,
}

/// Remote membership record for one address on one list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberInfo {
    pub email: String,
    #[serde(default)]
    pub euid: Option<String>,
    pub status: MemberStatus,
    #[serde(default, deserialize_with = "deserialize_option_number_from_string")]
    pub web_id: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_option_number_from_string")]
    pub member_rating: Option<u8>,
    #[serde(default, deserialize_with = "deserialize_geo")]
    pub geo: Option<Geo>,
}

impl MemberInfo {
    pub fn is_subscribed(&self) -> bool {
        self.status == MemberStatus::Subscribed
    }
}

/// Acknowledgement returned by the remote service for a subscribe or update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberReceipt {
    pub email: String,
    #[serde(default)]
    pub euid: Option<String>,
}

// The remote service sends `[]` instead of an object when it has no location
fn deserialize_geo<'de, D>(deserializer: D) -> Result<Option<Geo>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}
