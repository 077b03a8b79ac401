use serde::{Deserialize, Serialize};
use std::fmt;

/// A user tag, place (`@name`) or project (`#name`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub slug: String,
}

/// The kind of entity an article represents, derived from its URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArticleKind {
    Account,
    Repository,
}

impl ArticleKind {
    /// The matching value of the search form `type` radio.
    pub fn search_type(self) -> &'static str {
        match self {
            ArticleKind::Account => "people",
            ArticleKind::Repository => "repositories",
        }
    }
}

impl fmt::Display for ArticleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArticleKind::Account => write!(f, "account"),
            ArticleKind::Repository => write!(f, "repository"),
        }
    }
}

/// Response to a star/check toggle POST.
#[derive(Debug, Clone, Deserialize)]
pub struct ToggleResponse {
    pub error: Option<String>,
    #[serde(default)]
    pub login_required: bool,
    #[serde(default)]
    pub is_set: bool,
    pub title: Option<String>,
}

/// Response to a note save POST.
#[derive(Debug, Clone, Deserialize)]
pub struct NoteResponse {
    pub error: Option<String>,
    #[serde(default)]
    pub login_required: bool,
    pub message: Option<String>,
    pub note_rendered: Option<String>,
}

/// Response to a tag save POST.
#[derive(Debug, Clone, Deserialize)]
pub struct TagResponse {
    pub error: Option<String>,
    #[serde(default)]
    pub login_required: bool,
    pub message: Option<String>,
    #[serde(default)]
    pub is_set: bool,
    pub slug: Option<String>,
}

/// Per-session login data returned by the login iframe flow.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginData {
    #[serde(rename = "Token")]
    pub token: String,
    pub username: String,
    #[serde(default = "one")]
    pub nb_accounts: u32,
    #[serde(rename = "UserTags", default)]
    pub user_tags: UserTags,
}

fn one() -> u32 {
    1
}

/// The logged-in user's tag vocabulary, grouped per tag kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UserTags {
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub places: Vec<Tag>,
    #[serde(default)]
    pub projects: Vec<Tag>,
}

/// A transient user-facing notice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub text: String,
    pub is_error: bool,
}

impl Notice {
    pub fn message(text: impl Into<String>) -> Self {
        Notice {
            text: text.into(),
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Notice {
            text: text.into(),
            is_error: true,
        }
    }
}
