use serde::{Deserialize, Serialize};

/// Page of results from Google Books `GET /volumes`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeList {
    #[serde(default)]
    pub total_items: u64,
    #[serde(default)]
    pub items: Vec<Volume>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    pub id: String,
    #[serde(default)]
    pub self_link: Option<String>,
    #[serde(default)]
    pub volume_info: VolumeInfo,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeInfo {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default)]
    pub published_date: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub page_count: Option<u32>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub image_links: Option<ImageLinks>,
    #[serde(default)]
    pub industry_identifiers: Vec<IndustryIdentifier>,
}

impl VolumeInfo {
    /// ISBN-13 if present, else ISBN-10.
    pub fn isbn(&self) -> Option<&str> {
        let find = |kind: &str| {
            self.industry_identifiers
                .iter()
                .find(|id| id.kind == kind)
                .map(|id| id.identifier.as_str())
        };
        find("ISBN_13").or_else(|| find("ISBN_10"))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageLinks {
    #[serde(default)]
    pub small_thumbnail: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndustryIdentifier {
    #[serde(rename = "type")]
    pub kind: String,
    pub identifier: String,
}

/// Response of OpenLibrary `GET /search.json`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenLibrarySearch {
    #[serde(default)]
    pub num_found: u64,
    #[serde(default)]
    pub start: u64,
    #[serde(default)]
    pub docs: Vec<OpenLibraryDoc>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OpenLibraryDoc {
    pub key: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author_name: Vec<String>,
    #[serde(default)]
    pub first_publish_year: Option<i32>,
    #[serde(default)]
    pub cover_i: Option<u64>,
    #[serde(default)]
    pub isbn: Vec<String>,
}

impl OpenLibraryDoc {
    /// Medium cover image URL, when the record has a cover id.
    pub fn cover_url(&self) -> Option<String> {
        self.cover_i
            .map(|id| format!("https://covers.openlibrary.org/b/id/{id}-M.jpg"))
    }
}
