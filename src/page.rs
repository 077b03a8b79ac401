//! Render model of the page. Entities are authoritative for their own
//! state; the document is strictly a render target plus a node-lookup
//! mechanism. One entity can be rendered as several nodes at once (in a
//! listing and in an open detail, say) and every lookup by URL returns
//! all live copies.

use crate::markup::{MoreLink, ParsedArticle};
use crate::types::Tag;

pub type NodeId = u64;

/// Where a rendered article node lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Slot {
    /// The page-level results pane.
    Results,
    /// The results of an open section of an open article.
    Section { article: String, kind: String },
}

/// Star/check button state on one rendered node.
#[derive(Debug, Clone, Default)]
pub struct ActionFlag {
    pub selected: bool,
    pub loading: bool,
    pub title: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ArticleNode {
    pub id: NodeId,
    pub url: String,
    pub slot: Slot,
    /// Pagination stamp (`data-page`); `None` until the owning pane
    /// stamps the batch it arrived with.
    pub page: Option<u32>,
    pub name: String,
    pub owner: Option<String>,
    pub backend: Option<String>,
    pub with_details: bool,
    /// A nested child pane is currently expanded under this node.
    pub with_opened: bool,
    pub loading: bool,
    pub star: ActionFlag,
    pub check: ActionFlag,
    pub star_url: Option<String>,
    pub check_url: Option<String>,
    pub note_edit_url: Option<String>,
    pub note_save_url: Option<String>,
    pub note_html: Option<String>,
    pub note_editing: bool,
    pub user_tags: Vec<Tag>,
    pub tag_content_type: Option<String>,
    pub tag_object_id: Option<String>,
}

#[derive(Debug, Default)]
pub struct Document {
    pub title: String,
    pub results_visible: bool,
    /// `with-opened` flag of the page-level results pane.
    pub results_with_opened: bool,
    next_id: NodeId,
    nodes: Vec<ArticleNode>,
    more: Vec<(Slot, MoreLink)>,
}

impl Document {
    pub fn insert(&mut self, parsed: ParsedArticle, slot: Slot) -> NodeId {
        let id = self.next_id;
        self.next_id += 1;
        self.nodes.push(ArticleNode {
            id,
            url: parsed.url,
            slot,
            page: None,
            name: parsed.name,
            owner: parsed.owner,
            backend: parsed.backend,
            with_details: false,
            with_opened: false,
            loading: false,
            star: ActionFlag {
                selected: parsed.starred,
                loading: false,
                title: parsed.star_title,
            },
            check: ActionFlag {
                selected: parsed.checked,
                loading: false,
                title: parsed.check_title,
            },
            star_url: parsed.star_url,
            check_url: parsed.check_url,
            note_edit_url: parsed.note_edit_url,
            note_save_url: parsed.note_save_url,
            note_html: parsed.note_html,
            note_editing: false,
            user_tags: Vec::new(),
            tag_content_type: parsed.tag_content_type,
            tag_object_id: parsed.tag_object_id,
        });
        id
    }

    pub fn nodes(&self) -> &[ArticleNode] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&ArticleNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut ArticleNode> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    /// Every live rendered copy of an entity.
    pub fn nodes_for(&self, url: &str) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| n.url == url)
            .map(|n| n.id)
            .collect()
    }

    pub fn for_each_node_of(&mut self, url: &str, mut apply: impl FnMut(&mut ArticleNode)) {
        for node in self.nodes.iter_mut().filter(|n| n.url == url) {
            apply(node);
        }
    }

    pub fn in_slot(&self, slot: &Slot) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| &n.slot == slot)
            .map(|n| n.id)
            .collect()
    }

    pub fn find_in_slot(&self, slot: &Slot, url: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .find(|n| &n.slot == slot && n.url == url)
            .map(|n| n.id)
    }

    /// Remove every node rendered in a slot.
    pub fn clear_slot(&mut self, slot: &Slot) {
        self.nodes.retain(|n| &n.slot != slot);
        self.more.retain(|(s, _)| s != slot);
    }

    /// Remove every node belonging to any section of an article (used
    /// when its detail pane goes away).
    pub fn clear_article_sections(&mut self, article_url: &str) {
        self.nodes
            .retain(|n| !matches!(&n.slot, Slot::Section { article, .. } if article == article_url));
        self.more
            .retain(|(s, _)| !matches!(s, Slot::Section { article, .. } if article == article_url));
    }

    /// Stamp the current page number on loaded items not yet stamped, so
    /// pagination code can tell which batch a node belongs to.
    pub fn stamp_unpaged(&mut self, slot: &Slot, page: u32) {
        for node in self
            .nodes
            .iter_mut()
            .filter(|n| &n.slot == slot && n.page.is_none())
        {
            node.page = Some(page);
        }
    }

    pub fn set_more(&mut self, slot: Slot, link: Option<MoreLink>) {
        self.more.retain(|(s, _)| s != &slot);
        if let Some(link) = link {
            self.more.push((slot, link));
        }
    }

    pub fn more_for(&self, slot: &Slot) -> Option<&MoreLink> {
        self.more.iter().find(|(s, _)| s == slot).map(|(_, l)| l)
    }
}
