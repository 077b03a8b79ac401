//! User tagging. A tag's first character decides its kind: `@` marks a
//! place, `#` a project, anything else a plain tag.

use crate::engine::Engine;
use crate::error::{NavError, Result};
use crate::types::{Tag, TagResponse};

const TAG_SAVE_URL: &str = "/private/tag/save/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    Tags,
    Places,
    Projects,
}

impl TagKind {
    pub fn of(name: &str) -> Self {
        match name.chars().next() {
            Some('@') => TagKind::Places,
            Some('#') => TagKind::Projects,
            _ => TagKind::Tags,
        }
    }

    pub fn group_code(self) -> &'static str {
        match self {
            TagKind::Tags => "tags",
            TagKind::Places => "places",
            TagKind::Projects => "projects",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TagKind::Tags => "Tags",
            TagKind::Places => "Places",
            TagKind::Projects => "Projects",
        }
    }
}

/// What a tag POST asks the server to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagAct {
    Create,
    Add,
    Remove,
}

impl TagAct {
    fn as_str(self) -> &'static str {
        match self {
            TagAct::Create => "create",
            TagAct::Add => "add",
            TagAct::Remove => "remove",
        }
    }
}

fn validate_tag_name(name: &str) -> Result<String> {
    let name = name.trim().to_lowercase();
    if name.is_empty() {
        return Err(NavError::Validation("a tag needs a name".to_string()));
    }
    let kind = TagKind::of(&name);
    let bare = match kind {
        TagKind::Tags => name.as_str(),
        TagKind::Places | TagKind::Projects => &name[1..],
    };
    if bare.is_empty() {
        return Err(NavError::Validation(format!(
            "a {} needs a name after its marker",
            kind.label().to_lowercase()
        )));
    }
    Ok(name)
}

impl Engine {
    /// Add, create or remove a tag on an article. On success every
    /// rendered copy reflects the new tag set, the cache is
    /// invalidated, and a created tag becomes a search filter choice.
    pub async fn apply_tag(&mut self, article_url: &str, name: &str, act: TagAct) -> Result<()> {
        if !self.is_logged() {
            self.error("You need to be logged for this", true);
            return Ok(());
        }
        let name = match validate_tag_name(name) {
            Ok(name) => name,
            Err(err) => {
                self.surface(&err);
                return Err(err);
            }
        };

        let node = self
            .articles
            .get(article_url)
            .and_then(|a| a.node)
            .and_then(|id| self.doc.node(id));
        let mut form = vec![
            ("tag".to_string(), name.clone()),
            ("act".to_string(), act.as_str().to_string()),
            ("csrfmiddlewaretoken".to_string(), self.csrf_token()),
        ];
        if let Some(node) = node {
            if let Some(content_type) = &node.tag_content_type {
                form.push(("content_type".to_string(), content_type.clone()));
            }
            if let Some(object_id) = &node.tag_object_id {
                form.push(("object_id".to_string(), object_id.clone()));
            }
        }

        let body = match self.post(TAG_SAVE_URL, &form).await {
            Ok(body) => body,
            Err(err) => {
                self.surface(&err);
                return Err(err);
            }
        };
        let response: TagResponse = match serde_json::from_str(&body) {
            Ok(response) => response,
            Err(_) => {
                self.error("", false);
                return Ok(());
            }
        };
        if let Some(error) = response.error {
            self.surface(&NavError::app(error, response.login_required));
            return Ok(());
        }

        self.cache.clear(true);
        let tag = Tag {
            slug: response.slug.clone().unwrap_or_else(|| name.clone()),
            name,
        };
        if response.is_set {
            self.doc.for_each_node_of(article_url, |node| {
                if !node.user_tags.iter().any(|t| t.slug == tag.slug) {
                    node.user_tags.push(tag.clone());
                    node.user_tags.sort_by(|a, b| a.name.cmp(&b.name));
                }
            });
            if self.search.active {
                self.search.add_tag(&tag, TagKind::of(&tag.name));
            }
        } else {
            self.doc.for_each_node_of(article_url, |node| {
                node.user_tags.retain(|t| t.slug != tag.slug);
            });
        }
        if let Some(message) = response.message {
            self.message(&message);
        }
        Ok(())
    }
}
