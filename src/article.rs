//! Articles: the accounts and repositories rendered as result items.
//! One `Article` exists per URL no matter how many rendered copies the
//! page holds; it binds to the node the user last interacted with and
//! owns the open/closed detail pane, its sections, and the note editor.

use crate::engine::{Engine, EntityKey};
use crate::error::{NavError, Result};
use crate::markup::{self, DetailMarkup};
use crate::page::{NodeId, Slot};
use crate::section::Section;
use crate::types::{ArticleKind, NoteResponse, ToggleResponse};

/// Which toggle button was activated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleKind {
    Star,
    Check,
}

#[derive(Debug)]
pub struct Article {
    pub url: String,
    pub kind: ArticleKind,
    /// The rendered copy this entity currently acts through.
    pub node: Option<NodeId>,
    pub loading: bool,
    pub open: bool,
    pub detail: Option<DetailMarkup>,
    pub sections: std::collections::HashMap<String, Section>,
    pub current_section: Option<String>,
    pub title: Option<String>,
    pub editing_note: bool,
}

impl Article {
    fn new(url: &str) -> Self {
        let kind = if url.starts_with("/user/") {
            ArticleKind::Account
        } else {
            ArticleKind::Repository
        };
        Article {
            url: url.to_string(),
            kind,
            node: None,
            loading: false,
            open: false,
            detail: None,
            sections: std::collections::HashMap::new(),
            current_section: None,
            title: None,
            editing_note: false,
        }
    }
}

impl Engine {
    /// One entity per URL: look up or create.
    pub(crate) fn article_mut(&mut self, url: &str) -> &mut Article {
        self.articles
            .entry(url.to_string())
            .or_insert_with(|| Article::new(url))
    }

    pub fn article(&self, url: &str) -> Option<&Article> {
        self.articles.get(url)
    }

    pub(crate) fn bind_article_node(&mut self, url: &str, node_id: NodeId) {
        self.article_mut(url).node = Some(node_id);
    }

    /// Display title, lazily derived from the bound node's markup.
    pub(crate) fn article_title(&mut self, url: &str) -> String {
        if let Some(title) = self.articles.get(url).and_then(|a| a.title.clone()) {
            return title;
        }
        let derived = self
            .articles
            .get(url)
            .and_then(|a| a.node)
            .and_then(|id| self.doc.node(id))
            .map(|node| {
                let owner = node
                    .owner
                    .as_deref()
                    .map(|o| format!("{o}/"))
                    .unwrap_or_default();
                let backend = node
                    .backend
                    .as_deref()
                    .map(|b| format!(" {b}"))
                    .unwrap_or_default();
                format!("`{owner}{}`{backend}", node.name)
            })
            .unwrap_or_else(|| url.to_string());
        self.article_mut(url).title = Some(derived.clone());
        derived
    }

    /// Header click on a rendered copy. An expanded child collapses
    /// first; otherwise the detail pane toggles.
    pub async fn click_article(&mut self, node_id: NodeId) -> Result<()> {
        let Some(node) = self.doc.node(node_id) else {
            return Ok(());
        };
        let url = node.url.clone();
        let with_opened = node.with_opened;
        self.bind_article_node(&url, node_id);
        if with_opened {
            self.close_opened_children(&url);
            return Ok(());
        }
        if self.articles.get(&url).is_some_and(|a| a.open) {
            self.close_article(&url, true);
            Ok(())
        } else {
            self.open_article(&url).await
        }
    }

    /// Open the detail pane of the bound node.
    pub async fn open_article(&mut self, url: &str) -> Result<()> {
        {
            let article = self.article_mut(url);
            if article.loading || article.open {
                return Ok(());
            }
        }
        self.load_article_detail(url).await
    }

    /// Fetch the detail pane and apply it. Also the replay path, which
    /// reloads even an already-open article.
    pub(crate) async fn load_article_detail(&mut self, url: &str) -> Result<()> {
        let node_id = {
            let article = self.article_mut(url);
            if article.loading {
                return Ok(());
            }
            let Some(node_id) = article.node else {
                return Ok(());
            };
            article.loading = true;
            node_id
        };
        self.remove_article_detail(url);
        if let Some(node) = self.doc.node_mut(node_id) {
            node.with_details = true;
            node.loading = true;
        }
        self.set_parent_with_opened(url, true);

        let fetched = match self.fetch(url, None).await {
            Ok(fetched) => fetched,
            Err(err) => {
                self.article_mut(url).loading = false;
                if let Some(node) = self.doc.node_mut(node_id) {
                    node.loading = false;
                    node.with_details = false;
                }
                self.set_parent_with_opened(url, false);
                self.surface(&err);
                return Err(err);
            }
        };

        // the node may have been removed while the fetch was in flight
        let stale = self.articles.get(url).and_then(|a| a.node) != Some(node_id)
            || self.doc.node(node_id).is_none();
        self.article_mut(url).loading = false;
        if stale {
            tracing::debug!(url, "discarding stale detail response");
            return Ok(());
        }

        let detail = markup::parse_detail(&fetched.body);
        self.apply_detail(url, detail);
        if let Some(node) = self.doc.node_mut(node_id) {
            node.loading = false;
        }
        self.add_to_history(EntityKey::Article(url.to_string()), None, false);
        Ok(())
    }

    fn apply_detail(&mut self, url: &str, detail: DetailMarkup) {
        {
            let article = self.article_mut(url);
            article.open = true;
            article.sections.clear();
            article.current_section = None;
            for link in &detail.sections {
                article
                    .sections
                    .insert(link.kind.clone(), Section::new(link));
            }
            article.detail = Some(detail.clone());
        }
        self.adopt_embedded_sections(url, &detail);
    }

    /// Adopt a server-rendered result-detail markup on a direct page
    /// load: seed the cache with the pane, register the entity as open,
    /// and anchor history at the current location.
    pub fn prepare_article_existing(&mut self, article_html: &str) {
        let Some(parsed) = markup::parse_articles(article_html).into_iter().next() else {
            return;
        };
        let url = parsed.url.clone();
        let node_id = self.doc.insert(parsed, Slot::Results);
        if let Some(node) = self.doc.node_mut(node_id) {
            node.with_details = true;
        }
        self.doc.results_visible = true;
        self.bind_article_node(&url, node_id);
        if let Some(detail_html) = markup::detail_html(article_html) {
            let key = self.cache.key(&url, None);
            self.cache.set(&key, &detail_html);
            let detail = markup::parse_detail(&detail_html);
            self.apply_detail(&url, detail);
        } else {
            self.article_mut(&url).open = true;
        }
        self.set_parent_with_opened(&url, true);
        self.doc.stamp_unpaged(&Slot::Results, 1);
        self.add_to_history(EntityKey::Article(url.clone()), None, true);
        if self.articles.get(&url).is_some_and(|a| a.current_section.is_none()) {
            let title = self.article_title(&url);
            self.set_doc_title(&title);
        }
    }

    /// Collapse the detail pane. `add_parent_to_history` records the
    /// revealed parent as the new location, making open and close
    /// symmetric in the history.
    pub fn close_article(&mut self, url: &str, add_parent_to_history: bool) {
        if !self.articles.get(url).is_some_and(|a| a.open) {
            return;
        }
        if add_parent_to_history {
            if let Some(parent) = self.parent_of_article(url) {
                self.add_to_history(parent, None, false);
            }
        }
        self.set_parent_with_opened(url, false);
        self.remove_article_detail(url);
    }

    /// A click on an article that has an expanded child: fold the child
    /// back in and make the clicked article's own pane current again.
    pub fn close_opened_children(&mut self, url: &str) {
        if !self.articles.get(url).is_some_and(|a| a.open) {
            return;
        }
        let Some(kind) = self
            .articles
            .get(url)
            .and_then(|a| a.current_section.clone())
        else {
            self.add_to_history(EntityKey::Article(url.to_string()), None, false);
            return;
        };
        let slot = Slot::Section {
            article: url.to_string(),
            kind: kind.clone(),
        };
        for id in self.doc.in_slot(&slot) {
            let Some(node) = self.doc.node(id) else {
                continue;
            };
            if node.with_details {
                let child = node.url.clone();
                self.bind_article_node(&child, id);
                self.close_article(&child, false);
            }
        }
        self.add_to_history(
            EntityKey::Section {
                article: url.to_string(),
                kind,
            },
            None,
            false,
        );
    }

    /// Tear the detail pane down: section nodes go away, the entity
    /// forgets its open state.
    pub(crate) fn remove_article_detail(&mut self, url: &str) {
        self.remove_sections(url);
        if let Some(article) = self.articles.get_mut(url) {
            article.open = false;
            article.detail = None;
            article.editing_note = false;
            if let Some(node_id) = article.node {
                if let Some(node) = self.doc.node_mut(node_id) {
                    node.with_details = false;
                }
            }
        }
    }

    /// Flip a `with-opened` marker. Collapsing manages the family both
    /// ways: descendants still expanded are folded first, and expanding
    /// propagates up the ancestor chain.
    pub(crate) fn set_article_with_opened(&mut self, url: &str, toggle: bool, manage_family: bool) {
        let Some(node_id) = self.articles.get(url).and_then(|a| a.node) else {
            return;
        };
        if manage_family && !toggle {
            self.collapse_descendants_under(url);
        }
        if let Some(node) = self.doc.node_mut(node_id) {
            node.with_opened = toggle;
        }
        if manage_family && toggle {
            self.set_parent_with_opened(url, true);
        }
    }

    /// Propagate a marker change to the entity containing this
    /// article's bound node.
    pub(crate) fn set_parent_with_opened(&mut self, url: &str, toggle: bool) {
        let Some(slot) = self
            .articles
            .get(url)
            .and_then(|a| a.node)
            .and_then(|id| self.doc.node(id))
            .map(|n| n.slot.clone())
        else {
            return;
        };
        match slot {
            Slot::Results => {
                if !toggle {
                    self.collapse_descendants_in(&Slot::Results);
                }
                self.doc.results_with_opened = toggle;
            }
            Slot::Section { article, .. } => {
                self.set_article_with_opened(&article, toggle, true);
            }
        }
    }

    fn collapse_descendants_under(&mut self, url: &str) {
        let kinds: Vec<String> = self
            .articles
            .get(url)
            .map(|a| a.sections.keys().cloned().collect())
            .unwrap_or_default();
        for kind in kinds {
            self.collapse_descendants_in(&Slot::Section {
                article: url.to_string(),
                kind,
            });
        }
    }

    fn collapse_descendants_in(&mut self, slot: &Slot) {
        for id in self.doc.in_slot(slot) {
            let Some(node) = self.doc.node(id) else {
                continue;
            };
            if !node.with_opened {
                continue;
            }
            let child = node.url.clone();
            self.collapse_descendants_under(&child);
            if let Some(node) = self.doc.node_mut(id) {
                node.with_opened = false;
            }
        }
    }

    /// Detach an entity from a rendered copy that is going away.
    pub(crate) fn detach_article_node(&mut self, url: &str, node_id: NodeId) {
        self.doc.clear_article_sections(url);
        if let Some(article) = self.articles.get_mut(url) {
            if article.node == Some(node_id) {
                article.node = None;
                article.open = false;
                article.detail = None;
                article.current_section = None;
                article.editing_note = false;
                for section in article.sections.values_mut() {
                    section.open = false;
                    section.loading = false;
                }
            }
        }
    }

    // ---- star / check -----------------------------------------------

    /// Toggle star or check-later. On success every rendered copy of
    /// the entity is updated and the cache is invalidated, since an
    /// unknown number of cached fragments rendered the old state.
    pub async fn toggle_article(&mut self, url: &str, kind: ToggleKind) -> Result<()> {
        let Some(node_id) = self.articles.get(url).and_then(|a| a.node) else {
            return Ok(());
        };
        let Some(node) = self.doc.node(node_id) else {
            return Ok(());
        };
        let action_url = match kind {
            ToggleKind::Star => node.star_url.clone(),
            ToggleKind::Check => node.check_url.clone(),
        };
        let Some(action_url) = action_url else {
            return Ok(());
        };
        if let Some(node) = self.doc.node_mut(node_id) {
            flag_mut(node, kind).loading = true;
        }

        let form = vec![("csrfmiddlewaretoken".to_string(), self.csrf_token())];
        let body = match self.post(&action_url, &form).await {
            Ok(body) => body,
            Err(err) => {
                self.doc
                    .for_each_node_of(url, |node| flag_mut(node, kind).loading = false);
                self.surface(&err);
                return Err(err);
            }
        };
        let response: ToggleResponse = match serde_json::from_str(&body) {
            Ok(response) => response,
            Err(_) => {
                self.doc
                    .for_each_node_of(url, |node| flag_mut(node, kind).loading = false);
                self.error("", false);
                return Ok(());
            }
        };

        // rendered state changed server-side either way
        self.cache.clear(true);
        match response.error {
            Some(error) => {
                self.doc
                    .for_each_node_of(url, |node| flag_mut(node, kind).loading = false);
                self.surface(&NavError::app(error, response.login_required));
            }
            None => {
                self.doc.for_each_node_of(url, |node| {
                    let flag = flag_mut(node, kind);
                    flag.loading = false;
                    flag.selected = response.is_set;
                    flag.title = response.title.clone();
                });
            }
        }
        Ok(())
    }

    // ---- notes ------------------------------------------------------

    /// Start editing the private note: fetch the edit form (never
    /// cached) and switch every rendered copy into editing mode.
    pub async fn edit_note(&mut self, url: &str) -> Result<()> {
        if self.articles.get(url).is_some_and(|a| a.editing_note) {
            return Ok(());
        }
        let Some(node_id) = self.articles.get(url).and_then(|a| a.node) else {
            return Ok(());
        };
        let Some(edit_url) = self.doc.node(node_id).and_then(|n| n.note_edit_url.clone()) else {
            return Ok(());
        };

        let body = match self.get_raw(&edit_url).await {
            Ok(body) => body,
            Err(err) => {
                self.surface(&err);
                return Err(err);
            }
        };
        // the endpoint answers JSON on failure, a form fragment on success
        if let Ok(response) = serde_json::from_str::<NoteResponse>(&body) {
            if let Some(error) = response.error {
                self.surface(&NavError::app(error, response.login_required));
                return Ok(());
            }
        }
        let save_url = markup::parse_form_action(&body);
        self.article_mut(url).editing_note = true;
        self.doc.for_each_node_of(url, |node| {
            node.note_editing = true;
            if save_url.is_some() {
                node.note_save_url = save_url.clone();
            }
        });
        Ok(())
    }

    pub fn cancel_note(&mut self, url: &str) {
        if let Some(article) = self.articles.get_mut(url) {
            article.editing_note = false;
        }
        self.doc.for_each_node_of(url, |node| node.note_editing = false);
    }

    /// Save (or delete) the private note. On success every rendered
    /// copy shows the new rendered note and the cache is invalidated.
    pub async fn save_note(&mut self, url: &str, content: &str, delete: bool) -> Result<()> {
        let Some(node_id) = self.articles.get(url).and_then(|a| a.node) else {
            return Ok(());
        };
        let save_url = self.doc.node(node_id).and_then(|n| {
            n.note_save_url.clone().or_else(|| n.note_edit_url.clone())
        });
        let Some(save_url) = save_url else {
            return Ok(());
        };

        let mut form = vec![
            ("note".to_string(), content.to_string()),
            ("csrfmiddlewaretoken".to_string(), self.csrf_token()),
        ];
        if delete {
            form.push(("delete".to_string(), "1".to_string()));
        }
        let body = match self.post(&save_url, &form).await {
            Ok(body) => body,
            Err(err) => {
                self.surface(&err);
                return Err(err);
            }
        };
        let response: NoteResponse = match serde_json::from_str(&body) {
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

        let rendered = response
            .note_rendered
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        self.doc.for_each_node_of(url, |node| {
            node.note_html = rendered.clone();
        });
        self.cache.clear(true);
        if let Some(message) = response.message {
            self.message(&message);
        }
        self.cancel_note(url);
        Ok(())
    }
}

fn flag_mut(node: &mut crate::page::ArticleNode, kind: ToggleKind) -> &mut crate::page::ActionFlag {
    match kind {
        ToggleKind::Star => &mut node.star,
        ToggleKind::Check => &mut node.check,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tests::{article_html, detail_html, engine_with};
    use crate::transport::mock::MockTransport;
    use crate::types::{LoginData, UserTags};

    async fn engine_with_open_results() -> (Engine, std::sync::Arc<MockTransport>) {
        let transport = MockTransport::new();
        transport.on_get(
            "/",
            Some("type=repositories&filter=&q=bob&order="),
            &article_html("/user/bob/", "bob"),
        );
        transport.on_get(
            "/user/bob/",
            None,
            &detail_html(&[
                ("followers", "/user/bob/followers/"),
                ("following", "/user/bob/following/"),
            ]),
        );
        let (mut engine, handle) = engine_with(transport);
        engine.search.form.set_text("q", "bob");
        engine.submit_search().await.unwrap();
        (engine, handle)
    }

    #[tokio::test]
    async fn open_then_close_restores_the_closed_state() {
        let (mut engine, _) = engine_with_open_results().await;
        let id = engine.doc.in_slot(&Slot::Results)[0];

        engine.click_article(id).await.unwrap();
        assert!(engine.article("/user/bob/").unwrap().open);
        assert!(engine.doc.node(id).unwrap().with_details);
        assert!(engine.doc.results_with_opened);
        assert_eq!(engine.history.current().unwrap().url, "/user/bob/");

        engine.click_article(id).await.unwrap();
        let article = engine.article("/user/bob/").unwrap();
        assert!(!article.open);
        assert!(article.sections.values().all(|s| !s.open));
        assert!(!engine.doc.node(id).unwrap().with_details);
        assert!(!engine.doc.results_with_opened);
        // closing records the revealed parent
        assert!(engine
            .history
            .current()
            .unwrap()
            .url
            .starts_with("/?type="));
    }

    #[tokio::test]
    async fn second_open_is_a_noop_while_open() {
        let (mut engine, handle) = engine_with_open_results().await;
        let id = engine.doc.in_slot(&Slot::Results)[0];
        engine.click_article(id).await.unwrap();
        let requests = handle.requests().len();
        engine.open_article("/user/bob/").await.unwrap();
        assert_eq!(handle.requests().len(), requests);
    }

    #[tokio::test]
    async fn detail_sections_come_from_the_pane_tabs() {
        let (mut engine, _) = engine_with_open_results().await;
        let id = engine.doc.in_slot(&Slot::Results)[0];
        engine.click_article(id).await.unwrap();
        let article = engine.article("/user/bob/").unwrap();
        assert_eq!(article.sections.len(), 2);
        assert_eq!(
            article.sections.get("followers").map(|s| s.url.as_str()),
            Some("/user/bob/followers/")
        );
        assert!(article.current_section.is_none());
    }

    #[tokio::test]
    async fn title_derives_from_markup() {
        let (mut engine, _) = engine_with_open_results().await;
        let id = engine.doc.in_slot(&Slot::Results)[0];
        engine.bind_article_node("/user/bob/", id);
        assert_eq!(engine.article_title("/user/bob/"), "`bob` github");
    }

    #[tokio::test]
    async fn toggle_updates_every_copy_and_clears_cache() {
        let (mut engine, _handle) = {
            let transport = MockTransport::new();
            transport.on_get(
                "/",
                Some("type=repositories&filter=&q=bob&order="),
                &article_html("/user/bob/", "bob"),
            );
            transport.on_get(
                "/user/bob/",
                None,
                &detail_html(&[("followers", "/user/bob/followers/")]),
            );
            transport.on_get(
                "/user/bob/followers/",
                None,
                &article_html("/user/bob/", "bob"),
            );
            transport.on_post(
                "/private/star/",
                r#"{"error": null, "is_set": true, "title": "Unstar"}"#,
            );
            let (mut engine, handle) = engine_with(transport);
            engine.search.form.set_text("q", "bob");
            engine.submit_search().await.unwrap();
            (engine, handle)
        };
        engine.on_logged(LoginData {
            token: "tok".to_string(),
            username: "bob".to_string(),
            nb_accounts: 1,
            user_tags: UserTags::default(),
        });
        let id = engine.doc.in_slot(&Slot::Results)[0];
        engine.click_article(id).await.unwrap();
        engine
            .load_section("/user/bob/", "followers")
            .await
            .unwrap();
        // the same entity is now rendered twice
        assert_eq!(engine.doc.nodes_for("/user/bob/").len(), 2);

        engine
            .toggle_article("/user/bob/", ToggleKind::Star)
            .await
            .unwrap();
        for id in engine.doc.nodes_for("/user/bob/") {
            let node = engine.doc.node(id).unwrap();
            assert!(node.star.selected);
            assert!(!node.star.loading);
            assert_eq!(node.star.title.as_deref(), Some("Unstar"));
        }
        // mutations invalidate cached fragments
        assert!(!engine.cache.has(&engine.cache.key("/user/bob/", None)));
    }

    #[tokio::test]
    async fn failed_toggle_reverts_loading_and_surfaces_the_error() {
        let (mut engine, _) = {
            let transport = MockTransport::new();
            transport.on_get(
                "/",
                Some("type=repositories&filter=&q=bob&order="),
                &article_html("/user/bob/", "bob"),
            );
            transport.on_post(
                "/private/star/",
                r#"{"error": "You need to be logged", "login_required": true}"#,
            );
            engine_with(transport)
        };
        engine.search.form.set_text("q", "bob");
        engine.submit_search().await.unwrap();
        let id = engine.doc.in_slot(&Slot::Results)[0];
        engine.bind_article_node("/user/bob/", id);

        engine
            .toggle_article("/user/bob/", ToggleKind::Star)
            .await
            .unwrap();
        let node = engine.doc.node(id).unwrap();
        assert!(!node.star.selected);
        assert!(!node.star.loading);
        assert!(engine.notices().iter().any(|n| n.is_error));
        // login_required responses re-prompt for login
        assert!(engine
            .notices()
            .iter()
            .any(|n| !n.is_error && n.text.contains("log in")));
    }

    #[tokio::test]
    async fn note_edit_and_save_round_trip() {
        let (mut engine, _) = {
            let transport = MockTransport::new();
            transport.on_get(
                "/",
                Some("type=repositories&filter=&q=bob&order="),
                &article_html_with_note("/user/bob/", "bob"),
            );
            transport.on_get_raw(
                "/private/note/edit/",
                None,
                r#"<form action="/private/note/save/"><textarea name="note"></textarea></form>"#,
            );
            transport.on_post(
                "/private/note/save/",
                r#"{"error": null, "message": "Note saved", "note_rendered": "<p>hi</p>"}"#,
            );
            engine_with(transport)
        };
        engine.search.form.set_text("q", "bob");
        engine.submit_search().await.unwrap();
        let id = engine.doc.in_slot(&Slot::Results)[0];
        engine.bind_article_node("/user/bob/", id);

        engine.edit_note("/user/bob/").await.unwrap();
        assert!(engine.article("/user/bob/").unwrap().editing_note);
        assert_eq!(
            engine.doc.node(id).unwrap().note_save_url.as_deref(),
            Some("/private/note/save/")
        );

        engine.save_note("/user/bob/", "hi", false).await.unwrap();
        let node = engine.doc.node(id).unwrap();
        assert!(!node.note_editing);
        assert_eq!(node.note_html.as_deref(), Some("<p>hi</p>"));
        assert!(engine
            .notices()
            .iter()
            .any(|n| !n.is_error && n.text == "Note saved"));
    }

    fn article_html_with_note(url: &str, name: &str) -> String {
        format!(
            r#"<article class="content">
                <header><h1><a href="{url}">{name}</a></h1><h3>github</h3></header>
                <footer><section><ul class="actions">
                    <li class="action-note"><a href="/private/note/edit/">note</a></li>
                </ul></section></footer>
            </article>"#
        )
    }
}
