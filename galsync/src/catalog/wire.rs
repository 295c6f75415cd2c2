//! Wire types of the catalog JSON responses
//!
//! The catalog is loose about types: ids arrive as numbers or strings,
//! scores as numbers, numeric strings or nothing, and the organization
//! `website` field is either a list of `{title, link}` objects or a plain
//! string. Every field is therefore optional and decoded leniently so a
//! single odd item never discards a whole response.

use crate::models::{CandidateMatch, OrganizationRecord};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

/// Website labels in the order they are preferred
const WEBSITE_PRIORITY: [&str; 4] = ["homepage", "官网", "官方网站", "official website"];

/// `{"data": {"result": [...]}}`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchEnvelope {
    #[serde(default)]
    pub data: Option<SearchData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchData {
    #[serde(default, deserialize_with = "lenient::list")]
    pub result: Vec<GameItem>,
}

impl SearchEnvelope {
    pub fn into_items(self) -> Vec<GameItem> {
        self.data.map(|d| d.result).unwrap_or_default()
    }
}

/// One search hit
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameItem {
    #[serde(default, deserialize_with = "lenient::string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub chinese_name: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient::score")]
    pub score: f64,
    /// Nested organization, when the catalog sends one
    #[serde(default, deserialize_with = "lenient::object")]
    pub org: Option<Map<String, Value>>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub org_id: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub org_name: String,
    #[serde(default, deserialize_with = "lenient::website")]
    pub org_website: Option<WebsiteField>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub org_description: String,
}

impl From<GameItem> for CandidateMatch {
    /// Organization fields come from the nested object when it is non-empty,
    /// otherwise from the flattened `org*` fields
    fn from(item: GameItem) -> Self {
        let (org_id, org_name, org_website, org_description) = match item.org {
            Some(org) if !org.is_empty() => (
                lenient::value_to_string(org.get("id")),
                lenient::value_to_string(org.get("name")),
                WebsiteField::from_value(org.get("website"))
                    .map(|w| w.resolve())
                    .unwrap_or_default(),
                lenient::value_to_string(org.get("description")),
            ),
            _ => (
                item.org_id,
                item.org_name,
                item.org_website.map(|w| w.resolve()).unwrap_or_default(),
                item.org_description,
            ),
        };

        Self {
            name: item.name,
            localized_name: item.chinese_name,
            target_id: item.id,
            score: round_score(item.score),
            org_id,
            org_name,
            org_website,
            org_description,
        }
    }
}

/// `{"data": {"org": {...}}}`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrgEnvelope {
    #[serde(default)]
    pub data: Option<OrgData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrgData {
    #[serde(default, deserialize_with = "lenient::object")]
    pub org: Option<Map<String, Value>>,
}

impl OrgEnvelope {
    /// Decode the organization detail, or `None` when the body carries none
    pub fn into_record(self, org_id: &str) -> Option<OrganizationRecord> {
        let org = self.data?.org.filter(|o| !o.is_empty())?;
        let detail: OrgDetail = serde_json::from_value(Value::Object(org)).ok()?;

        Some(OrganizationRecord {
            org_id: org_id.to_string(),
            name: detail.name,
            localized_name: detail.chinese_name,
            website: detail.website.map(|w| w.resolve()).unwrap_or_default(),
            description: detail.introduction,
            founding_date: detail.birthday,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrgDetail {
    #[serde(default, deserialize_with = "lenient::string")]
    name: String,
    #[serde(default, deserialize_with = "lenient::string")]
    chinese_name: String,
    #[serde(default, deserialize_with = "lenient::website")]
    website: Option<WebsiteField>,
    #[serde(default, deserialize_with = "lenient::string")]
    introduction: String,
    #[serde(default, deserialize_with = "lenient::string")]
    birthday: String,
}

/// A labeled link of an organization
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LabeledLink {
    #[serde(default, deserialize_with = "lenient::string")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub link: String,
}

/// The two shapes of the `website` field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebsiteField {
    LabeledLinks(Vec<LabeledLink>),
    Raw(String),
}

impl WebsiteField {
    /// Interpret a JSON value; shapes other than a list or a string yield `None`
    pub fn from_value(value: Option<&Value>) -> Option<Self> {
        match value? {
            Value::Array(items) => Some(WebsiteField::LabeledLinks(
                items
                    .iter()
                    .filter_map(|item| serde_json::from_value(item.clone()).ok())
                    .collect(),
            )),
            Value::String(raw) => Some(WebsiteField::Raw(raw.clone())),
            _ => None,
        }
    }

    /// Canonical website
    ///
    /// Labeled links are picked by title priority (case-insensitive), then
    /// the first link. A label whose first entry has an empty link defers to
    /// the next label. A raw string is used as-is.
    pub fn resolve(&self) -> String {
        match self {
            WebsiteField::Raw(raw) => raw.trim().to_string(),
            WebsiteField::LabeledLinks(links) => {
                // only the first entry carrying a label is considered for it
                for wanted in WEBSITE_PRIORITY {
                    let hit = links
                        .iter()
                        .find(|l| l.title.to_lowercase() == wanted)
                        .filter(|l| !l.link.is_empty());
                    if let Some(link) = hit {
                        return link.link.clone();
                    }
                }
                links.first().map(|l| l.link.clone()).unwrap_or_default()
            }
        }
    }
}

/// Round to 4 decimals
pub fn round_score(score: f64) -> f64 {
    if score.is_finite() {
        (score * 10_000.0).round() / 10_000.0
    } else {
        0.0
    }
}

mod lenient {
    use super::*;

    /// Strings as-is, numbers and booleans as text, null or absent as empty
    pub fn value_to_string(value: Option<&Value>) -> String {
        match value {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            Some(other) => other.to_string(),
        }
    }

    pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        let value = Value::deserialize(d)?;
        Ok(value_to_string(Some(&value)))
    }

    /// Numbers or numeric strings; anything else is 0.0
    pub fn score<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        let value = Value::deserialize(d)?;
        let score = match value {
            Value::Number(n) => n.as_f64().unwrap_or(0.0),
            Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
            _ => 0.0,
        };
        Ok(if score.is_finite() { score } else { 0.0 })
    }

    pub fn object<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Map<String, Value>>, D::Error> {
        match Value::deserialize(d)? {
            Value::Object(map) => Ok(Some(map)),
            _ => Ok(None),
        }
    }

    pub fn website<'de, D: Deserializer<'de>>(d: D) -> Result<Option<WebsiteField>, D::Error> {
        let value = Value::deserialize(d)?;
        Ok(WebsiteField::from_value(Some(&value)))
    }

    /// A list whose malformed entries are dropped
    pub fn list<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: serde::de::DeserializeOwned,
    {
        match Value::deserialize(d)? {
            Value::Array(items) => Ok(items
                .into_iter()
                .filter_map(|item| serde_json::from_value(item).ok())
                .collect()),
            _ => Ok(Vec::new()),
        }
    }
}
