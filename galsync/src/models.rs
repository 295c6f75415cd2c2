//! Record types shared by the matching pipeline
//!
//! The serde renames on the persisted records are the column headers of the
//! output tables; field order is the column order downstream consumers rely on.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Column order of the matched-results table
pub const MATCHED_COLUMNS: [&str; 13] = [
    "bgm_id",
    "bgm游戏",
    "日文名 (原始)",
    "中文名 (原始)",
    "name",
    "chineseName",
    "ym_id",
    "score",
    "orgId",
    "orgName",
    "orgWebsite",
    "orgDescription",
    "匹配来源",
];

/// Column order of the organization table
pub const ORGANIZATION_COLUMNS: [&str; 6] = [
    "org_id",
    "name",
    "chineseName",
    "website",
    "description",
    "birthday",
];

/// Single column of the unmatched table
pub const UNMATCHED_COLUMNS: [&str; 1] = ["原始的未匹配bgm游戏名称"];

/// Which of a source record's two names produced a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NameVariant {
    A,
    B,
}

impl NameVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            NameVariant::A => "A",
            NameVariant::B => "B",
        }
    }
}

impl fmt::Display for NameVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the source catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRecord {
    /// Source id, or `ROW_<index>` when the row has none
    pub id: String,
    pub name_a: String,
    pub name_b: String,
}

impl SourceRecord {
    pub fn has_names(&self) -> bool {
        !self.name_a.is_empty() || !self.name_b.is_empty()
    }

    /// Name shown for the record: variant A when present, else variant B
    pub fn display_name(&self) -> &str {
        if self.name_a.is_empty() {
            &self.name_b
        } else {
            &self.name_a
        }
    }

    /// The non-empty names in search order
    pub fn search_names(&self) -> impl Iterator<Item = (NameVariant, &str)> {
        [
            (NameVariant::A, self.name_a.as_str()),
            (NameVariant::B, self.name_b.as_str()),
        ]
        .into_iter()
        .filter(|(_, name)| !name.is_empty())
    }
}

/// A scored search result from the target catalog
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateMatch {
    pub name: String,
    pub localized_name: String,
    pub target_id: String,
    /// Provider score, rounded to 4 decimals
    pub score: f64,
    pub org_id: String,
    pub org_name: String,
    pub org_website: String,
    pub org_description: String,
}

/// Publisher / developer details from the target catalog
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrganizationRecord {
    #[serde(rename = "org_id")]
    pub org_id: String,
    pub name: String,
    #[serde(rename = "chineseName")]
    pub localized_name: String,
    pub website: String,
    pub description: String,
    #[serde(rename = "birthday")]
    pub founding_date: String,
}

impl OrganizationRecord {
    /// Complete records are never looked up again
    pub fn is_complete(&self) -> bool {
        !self.website.is_empty() && !self.description.is_empty()
    }
}

/// Persisted result of a successful match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedRecord {
    #[serde(rename = "bgm_id")]
    pub source_id: String,
    #[serde(rename = "bgm游戏")]
    pub display_name: String,
    #[serde(rename = "日文名 (原始)")]
    pub name_a: String,
    #[serde(rename = "中文名 (原始)")]
    pub name_b: String,
    pub name: String,
    #[serde(rename = "chineseName")]
    pub localized_name: String,
    #[serde(rename = "ym_id")]
    pub target_id: String,
    pub score: f64,
    #[serde(rename = "orgId")]
    pub org_id: String,
    #[serde(rename = "orgName")]
    pub org_name: String,
    #[serde(rename = "orgWebsite")]
    pub org_website: String,
    #[serde(rename = "orgDescription")]
    pub org_description: String,
    #[serde(rename = "匹配来源")]
    pub match_field: NameVariant,
}

impl MatchedRecord {
    /// Assemble a row from the source record, the winning candidate and the
    /// enriched organization
    ///
    /// Each organization field falls back to the candidate's own value when
    /// enrichment left it empty.
    pub fn assemble(
        source: &SourceRecord,
        candidate: &CandidateMatch,
        field: NameVariant,
        organization: Option<&OrganizationRecord>,
    ) -> Self {
        let pick = |enriched: Option<&String>, raw: &String| -> String {
            match enriched {
                Some(value) if !value.is_empty() => value.clone(),
                _ => raw.clone(),
            }
        };

        Self {
            source_id: source.id.clone(),
            display_name: source.display_name().to_string(),
            name_a: source.name_a.clone(),
            name_b: source.name_b.clone(),
            name: candidate.name.clone(),
            localized_name: candidate.localized_name.clone(),
            target_id: candidate.target_id.clone(),
            score: candidate.score,
            org_id: candidate.org_id.clone(),
            org_name: pick(organization.map(|o| &o.name), &candidate.org_name),
            org_website: pick(organization.map(|o| &o.website), &candidate.org_website),
            org_description: pick(
                organization.map(|o| &o.description),
                &candidate.org_description,
            ),
            match_field: field,
        }
    }
}

/// Why a source record produced no match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnmatchedReason {
    /// Both name variants were empty; nothing was searched
    EmptyName,
    /// Searches ran but returned no candidate
    NoCandidate,
}

impl UnmatchedReason {
    pub fn tag(&self) -> &'static str {
        match self {
            UnmatchedReason::EmptyName => "空名称",
            UnmatchedReason::NoCandidate => "未匹配",
        }
    }

    /// Label persisted in the unmatched table
    pub fn label(&self, source_id: &str) -> String {
        format!("ID_{}_{}", source_id, self.tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(a: &str, b: &str) -> SourceRecord {
        SourceRecord {
            id: "1".to_string(),
            name_a: a.to_string(),
            name_b: b.to_string(),
        }
    }

    #[test]
    fn test_display_name_prefers_variant_a() {
        assert_eq!(source("テスト", "测试").display_name(), "テスト");
        assert_eq!(source("", "测试").display_name(), "测试");
    }

    #[test]
    fn test_search_names_skip_empty() {
        let src = source("", "测试");
        let names: Vec<_> = src.search_names().collect();
        assert_eq!(names, vec![(NameVariant::B, "测试")]);
        assert!(!source("", "").has_names());
    }

    #[test]
    fn test_assemble_falls_back_per_field() {
        let candidate = CandidateMatch {
            name: "Test".into(),
            score: 0.9,
            org_id: "10".into(),
            org_name: "Raw Org".into(),
            org_website: "http://raw".into(),
            org_description: "raw description".into(),
            ..Default::default()
        };
        let enriched = OrganizationRecord {
            org_id: "10".into(),
            name: "Org".into(),
            website: "http://x".into(),
            ..Default::default()
        };

        let record =
            MatchedRecord::assemble(&source("テスト", ""), &candidate, NameVariant::A, Some(&enriched));
        assert_eq!(record.org_name, "Org");
        assert_eq!(record.org_website, "http://x");
        assert_eq!(record.org_description, "raw description");

        let bare = MatchedRecord::assemble(&source("テスト", ""), &candidate, NameVariant::A, None);
        assert_eq!(bare.org_name, "Raw Org");
    }

    #[test]
    fn test_unmatched_labels() {
        assert_eq!(UnmatchedReason::EmptyName.label("7"), "ID_7_空名称");
        assert_eq!(UnmatchedReason::NoCandidate.label("ROW_3"), "ID_ROW_3_未匹配");
    }

    #[test]
    fn test_organization_completeness() {
        let mut org = OrganizationRecord {
            website: "http://x".into(),
            ..Default::default()
        };
        assert!(!org.is_complete());
        org.description = "studio".into();
        assert!(org.is_complete());
    }
}
