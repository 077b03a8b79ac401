//! The navigation engine. One `Engine` owns every piece of client state
//! (entity registries, response cache, history, render model) and every
//! operation runs on `&mut Engine`, which is how the single-threaded
//! cooperative model of a browser page translates here: at most one
//! navigation mutates state at a time.

use std::collections::HashMap;
use std::sync::Arc;

use crate::article::Article;
use crate::cache::{compute_url, Fetched, ResponseCache};
use crate::config::Config;
use crate::error::{NavError, Result};
use crate::forms::Form;
use crate::history::{BrowserHistory, HistoryEntry, HistoryStep};
use crate::markup;
use crate::page::{Document, Slot};
use crate::search::SearchPane;
use crate::transport::Transport;
use crate::types::{LoginData, Notice, UserTags};

const GENERIC_ERROR: &str = "We had a problem, please try again";
const MAX_ERROR_LEN: usize = 200;

/// The logged-in user, as reported by the login flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub username: String,
    pub nb_accounts: u32,
    pub user_tags: UserTags,
}

/// An entity that can anchor a history entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityKey {
    Search,
    Article(String),
    Section { article: String, kind: String },
}

/// What a history replay achieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Replay {
    /// The recorded state was rebuilt in place.
    Handled,
    /// Nothing could be rebuilt; the caller should do a full page load.
    Reload,
}

/// What the driver should do after a location change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavOutcome {
    Stay,
    Reload,
}

/// Viewport geometry reported by the scroll watcher.
#[derive(Debug, Clone, Copy)]
pub struct ScrollMetrics {
    pub doc_height: u32,
    pub win_height: u32,
    pub scroll_top: u32,
}

pub struct Engine {
    pub config: Config,
    transport: Arc<dyn Transport>,
    pub cache: ResponseCache,
    pub history: BrowserHistory,
    pub doc: Document,
    pub search: SearchPane,
    pub(crate) articles: HashMap<String, Article>,
    session: Option<Session>,
    notices: Vec<Notice>,
    /// URL of the last entry we wrote ourselves; used both to suppress
    /// duplicate pushes and to recognize our own location changes.
    pub(crate) last_history_url: Option<String>,
    /// A scroll-triggered load is in flight.
    scroll_busy: bool,
    pub page_url: String,
}

impl Engine {
    pub fn new(
        config: Config,
        transport: Arc<dyn Transport>,
        page_url: &str,
        search_form: Option<Form>,
    ) -> Self {
        let cache = ResponseCache::new(config.protected_suffixes.clone());
        let search = match search_form {
            Some(form) => SearchPane::new("/", form),
            None => SearchPane::inactive(),
        };
        Engine {
            config,
            transport,
            cache,
            history: BrowserHistory::default(),
            doc: Document::default(),
            search,
            articles: HashMap::new(),
            session: None,
            notices: Vec::new(),
            last_history_url: None,
            scroll_busy: false,
            page_url: page_url.to_string(),
        }
    }

    /// Cache-checked GET through the shared transport.
    pub(crate) async fn fetch(&mut self, url: &str, querystring: Option<&str>) -> Result<Fetched> {
        self.cache
            .fetch(self.transport.as_ref(), url, querystring)
            .await
    }

    /// Raw (uncached, unmarked) GET, for endpoints whose responses must
    /// never be cached.
    pub(crate) async fn get_raw(&self, url: &str) -> Result<String> {
        self.transport.get(url, None).await
    }

    pub(crate) async fn post(&self, url: &str, form: &[(String, String)]) -> Result<String> {
        self.transport.post(url, form).await
    }

    // ---- session ----------------------------------------------------

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn is_logged(&self) -> bool {
        self.session.is_some()
    }

    pub(crate) fn csrf_token(&self) -> String {
        self.session
            .as_ref()
            .map(|s| s.token.clone())
            .unwrap_or_default()
    }

    /// Apply login data from the login flow. Repeated identical
    /// responses are a no-op.
    pub fn on_logged(&mut self, data: LoginData) {
        let session = Session {
            token: data.token,
            username: data.username,
            nb_accounts: data.nb_accounts,
            user_tags: data.user_tags,
        };
        if self.session.as_ref() == Some(&session) {
            return;
        }
        tracing::info!(username = %session.username, "logged in");
        self.session = Some(session);
        self.message("You are now logged in");
    }

    pub fn on_logged_out(&mut self) {
        if self.session.take().is_none() {
            return;
        }
        tracing::info!("logged out");
        self.message("You are now logged out");
    }

    // ---- notices ----------------------------------------------------

    pub fn message(&mut self, text: &str) {
        self.notices.push(Notice::message(text));
    }

    /// Surface a failure. Server messages that are empty or
    /// implausibly long are replaced by a generic one.
    pub fn error(&mut self, message: &str, login_required: bool) {
        let text = if message.is_empty() || message.len() > MAX_ERROR_LEN {
            GENERIC_ERROR
        } else {
            message
        };
        tracing::warn!(error = %text, login_required, "surfacing error");
        self.notices.push(Notice::error(text));
        if login_required {
            self.notices
                .push(Notice::message("Please log in and try again"));
        }
    }

    /// Route a failure to the notice channel. Application-level errors
    /// carry the re-login hint, everything else renders as-is.
    pub(crate) fn surface(&mut self, err: &NavError) {
        match err {
            NavError::App {
                message,
                login_required,
            } => self.error(message, *login_required),
            other => self.error(&other.to_string(), false),
        }
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    // ---- titles -----------------------------------------------------

    pub(crate) fn set_doc_title(&mut self, title: &str) {
        self.doc.title = format!("{title} - {}", self.config.site_name);
    }

    pub(crate) fn entity_title(&mut self, origin: &EntityKey) -> String {
        match origin {
            EntityKey::Search => self.search.title(),
            EntityKey::Article(url) => self.article_title(url),
            EntityKey::Section { article, kind } => self.section_title(article, kind),
        }
    }

    // ---- history ----------------------------------------------------

    /// Record the current state under `origin`. The step list is the
    /// root-first chain of open entities leading to it, so a later
    /// replay can rebuild the whole nesting.
    pub(crate) fn add_to_history(
        &mut self,
        origin: EntityKey,
        querystring: Option<&str>,
        replace_current: bool,
    ) {
        let Some(origin_url) = self.origin_url(&origin) else {
            return;
        };
        let querystring = match querystring {
            Some(qs) => Some(qs.to_string()),
            None => self.default_querystring(&origin),
        };
        let url = compute_url(&origin_url, querystring.as_deref());
        if self.last_history_url.as_deref() == Some(url.as_str()) {
            return;
        }
        let title = format!("{} - {}", self.entity_title(&origin), self.config.site_name);
        let steps = self.state_chain(&origin);
        tracing::debug!(url = %url, replace = replace_current, "history write");
        self.doc.title = title.clone();
        self.last_history_url = Some(url.clone());
        let entry = HistoryEntry { steps, title, url };
        if replace_current {
            self.history.replace(entry);
        } else {
            self.history.push(entry);
        }
    }

    fn origin_url(&self, origin: &EntityKey) -> Option<String> {
        match origin {
            EntityKey::Search => Some(self.search.url.clone()),
            EntityKey::Article(url) => Some(url.clone()),
            EntityKey::Section { article, kind } => self
                .articles
                .get(article)
                .and_then(|a| a.sections.get(kind))
                .map(|s| s.url.clone()),
        }
    }

    fn default_querystring(&self, origin: &EntityKey) -> Option<String> {
        match origin {
            EntityKey::Search => Some(self.search.querystring.clone()),
            EntityKey::Article(_) => None,
            EntityKey::Section { article, kind } => self
                .articles
                .get(article)
                .and_then(|a| a.sections.get(kind))
                .map(|s| s.querystring.clone()),
        }
    }

    /// Root-first chain of steps from the page root down to `origin`.
    fn state_chain(&self, origin: &EntityKey) -> Vec<HistoryStep> {
        let mut steps = Vec::new();
        let mut cursor = Some(origin.clone());
        while let Some(key) = cursor.take() {
            match key {
                EntityKey::Search => {
                    steps.push(HistoryStep::Search {
                        querystring: self.search.querystring.clone(),
                    });
                }
                EntityKey::Article(url) => {
                    steps.push(HistoryStep::Article {
                        page: self.article_page(&url),
                        url: url.clone(),
                    });
                    cursor = self.parent_of_article(&url);
                }
                EntityKey::Section { article, kind } => {
                    let querystring = self
                        .articles
                        .get(&article)
                        .and_then(|a| a.sections.get(&kind))
                        .map(|s| s.querystring.clone())
                        .unwrap_or_default();
                    steps.push(HistoryStep::Section { kind, querystring });
                    cursor = Some(EntityKey::Article(article));
                }
            }
        }
        steps.reverse();
        steps
    }

    fn article_page(&self, url: &str) -> u32 {
        self.articles
            .get(url)
            .and_then(|a| a.node)
            .and_then(|id| self.doc.node(id))
            .and_then(|n| n.page)
            .unwrap_or(1)
    }

    /// The containing entity of an article's bound node, if any.
    pub(crate) fn parent_of_article(&self, url: &str) -> Option<EntityKey> {
        let node_id = self.articles.get(url)?.node?;
        match &self.doc.node(node_id)?.slot {
            Slot::Results => self.search.active.then_some(EntityKey::Search),
            Slot::Section { article, kind } => Some(EntityKey::Section {
                article: article.clone(),
                kind: kind.clone(),
            }),
        }
    }

    // ---- replay -----------------------------------------------------

    /// React to a location change (back/forward or an external link).
    /// Changes caused by our own history writes are ignored. Replay
    /// failures degrade to a full reload.
    pub async fn on_state_change(
        &mut self,
        target_url: &str,
        state: Option<(Vec<HistoryStep>, String)>,
    ) -> NavOutcome {
        if self.last_history_url.as_deref() == Some(target_url) {
            return NavOutcome::Stay;
        }
        if let Some((_, state_url)) = &state {
            if self.last_history_url.as_deref() == Some(state_url.as_str()) {
                return NavOutcome::Stay;
            }
        }
        let steps = state.map(|(steps, _)| steps).unwrap_or_default();
        match self.load_from_history(steps).await {
            Ok(Replay::Handled) => NavOutcome::Stay,
            Ok(Replay::Reload) => NavOutcome::Reload,
            Err(err) => {
                tracing::warn!(error = %err, "history replay failed");
                NavOutcome::Reload
            }
        }
    }

    /// Replay a recorded step chain, root-first. A step whose anchor no
    /// longer exists is skipped without advancing the parent cursor;
    /// the outcome is whatever the last attempted step achieved.
    pub async fn load_from_history(&mut self, steps: Vec<HistoryStep>) -> Result<Replay> {
        let mut parent: Option<EntityKey> = None;
        let mut outcome = Replay::Reload;
        let mut iter = steps.into_iter().peekable();
        while let Some(step) = iter.next() {
            let terminal = iter.peek().is_none();
            match step {
                HistoryStep::Search { querystring } => {
                    if !self.search.active {
                        continue;
                    }
                    let url = compute_url(&self.search.url, opt_str(&querystring));
                    self.last_history_url = Some(url);
                    self.replay_search(&querystring).await?;
                    if terminal {
                        let title = self.search.title();
                        self.set_doc_title(&title);
                    }
                    parent = Some(EntityKey::Search);
                    outcome = Replay::Handled;
                }
                HistoryStep::Article { url, page: _ } => {
                    let slot = match &parent {
                        Some(EntityKey::Section { article, kind }) => Slot::Section {
                            article: article.clone(),
                            kind: kind.clone(),
                        },
                        _ => Slot::Results,
                    };
                    let Some(node_id) = self.doc.find_in_slot(&slot, &url) else {
                        outcome = Replay::Reload;
                        continue;
                    };
                    self.last_history_url = Some(url.clone());
                    self.bind_article_node(&url, node_id);
                    self.load_article_detail(&url).await?;
                    if terminal {
                        let title = self.article_title(&url);
                        self.set_doc_title(&title);
                    }
                    parent = Some(EntityKey::Article(url));
                    outcome = Replay::Handled;
                }
                HistoryStep::Section { kind, querystring } => {
                    let Some(EntityKey::Article(article_url)) = parent.clone() else {
                        outcome = Replay::Reload;
                        continue;
                    };
                    let Some(section_url) = self.section_url(&article_url, &kind) else {
                        outcome = Replay::Reload;
                        continue;
                    };
                    self.last_history_url =
                        Some(compute_url(&section_url, opt_str(&querystring)));
                    self.replay_section(&article_url, &kind, &querystring).await?;
                    if terminal {
                        let title = self.section_title(&article_url, &kind);
                        self.set_doc_title(&title);
                    }
                    parent = Some(EntityKey::Section {
                        article: article_url,
                        kind,
                    });
                    outcome = Replay::Handled;
                }
            }
        }
        Ok(outcome)
    }

    // ---- endless pagination -----------------------------------------

    /// Trigger the next batch of the innermost visible results pane when
    /// the viewport is close enough to the bottom. Returns whether a
    /// load ran. Re-entry is refused until the triggered load completes.
    pub async fn on_scroll(&mut self, metrics: ScrollMetrics) -> Result<bool> {
        if self.scroll_busy {
            return Ok(false);
        }
        let remaining = metrics
            .doc_height
            .saturating_sub(metrics.win_height)
            .saturating_sub(metrics.scroll_top);
        if remaining > self.config.scroll_margin {
            return Ok(false);
        }
        let Some(slot) = self.scroll_target_slot() else {
            return Ok(false);
        };
        if self.doc.more_for(&slot).is_none() {
            return Ok(false);
        }
        self.scroll_busy = true;
        let result = self.load_more(&slot).await;
        self.scroll_busy = false;
        result.map(|()| true)
    }

    /// The pane whose pagination the scroll watcher feeds: the page
    /// results, or the current section of the innermost open article.
    fn scroll_target_slot(&self) -> Option<Slot> {
        if !self.doc.results_with_opened {
            return Some(Slot::Results);
        }
        let mut slot = Slot::Results;
        loop {
            let opened = self
                .doc
                .in_slot(&slot)
                .into_iter()
                .filter_map(|id| self.doc.node(id))
                .find(|n| n.with_details)?;
            let article = self.articles.get(&opened.url)?;
            let kind = article.current_section.clone()?;
            let next = Slot::Section {
                article: opened.url.clone(),
                kind,
            };
            if !opened.with_opened {
                return Some(next);
            }
            slot = next;
        }
    }

    /// Fetch and append the next batch behind a pane's "more" control.
    pub(crate) async fn load_more(&mut self, slot: &Slot) -> Result<()> {
        let Some(link) = self.doc.more_for(slot).cloned() else {
            return Ok(());
        };
        let querystring = format!("querystring_key={}", link.querystring_key);
        let fetched = match self.fetch(&link.href, Some(&querystring)).await {
            Ok(fetched) => fetched,
            Err(err) => {
                self.surface(&err);
                return Err(err);
            }
        };
        self.doc.set_more(slot.clone(), None);
        for parsed in markup::parse_articles(&fetched.body) {
            self.doc.insert(parsed, slot.clone());
        }
        self.doc
            .set_more(slot.clone(), markup::parse_more(&fetched.body));
        self.set_last_page(slot, link.page);
        Ok(())
    }

    /// Stamp the freshly appended batch and remember the page number on
    /// the owning pane.
    pub(crate) fn set_last_page(&mut self, slot: &Slot, page: u32) {
        let page = page.max(1);
        self.doc.stamp_unpaged(slot, page);
        match slot {
            Slot::Results => self.search.last_page = page,
            Slot::Section { article, kind } => {
                if let Some(section) = self
                    .articles
                    .get_mut(article)
                    .and_then(|a| a.sections.get_mut(kind))
                {
                    section.last_page = page;
                }
            }
        }
    }
}

pub(crate) fn opt_str(value: &str) -> Option<&str> {
    (!value.is_empty()).then_some(value)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;

    pub(crate) fn search_form() -> Form {
        crate::search::default_form()
    }

    pub(crate) fn engine_with(transport: MockTransport) -> (Engine, Arc<MockTransport>) {
        let transport = Arc::new(transport);
        let engine = Engine::new(
            Config::default(),
            transport.clone(),
            "/",
            Some(search_form()),
        );
        (engine, transport)
    }

    pub(crate) fn article_html(url: &str, name: &str) -> String {
        format!(
            r#"<article class="content">
                <header><h1><a href="{url}">{name}</a></h1><h3>github</h3></header>
                <footer><section><ul class="actions">
                    <li class="action-star"><form action="/private/star/"><button title="Star">star</button></form></li>
                    <li class="action-check"><form action="/private/check/"><button title="Check later">check</button></form></li>
                </ul></section></footer>
            </article>"#
        )
    }

    pub(crate) fn detail_html(kinds: &[(&str, &str)]) -> String {
        let tabs: String = kinds
            .iter()
            .map(|(kind, url)| {
                format!(r#"<li rel="{kind}"><a href="{url}"><span>{kind}</span></a></li>"#)
            })
            .collect();
        format!(r#"<section class="details"><header><ul>{tabs}</ul></header></section>"#)
    }

    #[tokio::test]
    async fn own_history_writes_are_ignored_on_state_change() {
        let transport = MockTransport::new();
        transport.on_get(
            "/",
            Some("type=repositories&filter=&q=django&order="),
            &article_html("/project/github.com:django/django/", "django"),
        );
        let (mut engine, _) = engine_with(transport);
        engine.search.form.set_text("q", "django");
        engine.submit_search().await.unwrap();
        let url = engine.history.current().unwrap().url.clone();
        assert_eq!(engine.on_state_change(&url, None).await, NavOutcome::Stay);
    }

    #[tokio::test]
    async fn unknown_location_without_state_reloads() {
        let transport = MockTransport::new();
        let (mut engine, _) = engine_with(transport);
        assert_eq!(
            engine.on_state_change("/elsewhere/", None).await,
            NavOutcome::Reload
        );
    }

    #[tokio::test]
    async fn replayed_search_hits_the_cache() {
        let transport = MockTransport::new();
        transport.on_get(
            "/",
            Some("type=repositories&filter=&q=flask&order="),
            &article_html("/project/github.com:mitsuhiko/flask/", "flask"),
        );
        let (mut engine, handle) = engine_with(transport);
        engine.search.form.set_text("q", "flask");
        engine.submit_search().await.unwrap();
        let steps = engine.history.current().unwrap().steps.clone();
        let before = handle.requests().len();

        // simulate navigating away and back
        engine.last_history_url = None;
        let outcome = engine.load_from_history(steps).await.unwrap();
        assert_eq!(outcome, Replay::Handled);
        assert_eq!(handle.requests().len(), before);
        assert_eq!(engine.doc.in_slot(&Slot::Results).len(), 1);
    }

    #[tokio::test]
    async fn replay_of_unknown_article_falls_back_to_reload() {
        let transport = MockTransport::new();
        let (mut engine, _) = engine_with(transport);
        let steps = vec![HistoryStep::Article {
            url: "/user/nobody/".to_string(),
            page: 1,
        }];
        assert_eq!(
            engine.load_from_history(steps).await.unwrap(),
            Replay::Reload
        );
    }

    #[tokio::test]
    async fn multi_step_replay_rebuilds_nesting_from_cache() {
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
            &article_html("/user/alice/", "alice"),
        );
        let (mut engine, handle) = engine_with(transport);
        engine.search.form.set_text("q", "bob");
        engine.submit_search().await.unwrap();
        let id = engine.doc.in_slot(&Slot::Results)[0];
        engine.click_article(id).await.unwrap();
        engine.load_section("/user/bob/", "followers").await.unwrap();
        let steps = engine.history.current().unwrap().steps.clone();
        assert_eq!(steps.len(), 3);

        // tear the page down, then come back through history
        engine.close_article("/user/bob/", false);
        engine.remove_search_results();
        engine.last_history_url = None;
        let before = handle.requests().len();

        let outcome = engine.load_from_history(steps).await.unwrap();
        assert_eq!(outcome, Replay::Handled);
        assert_eq!(handle.requests().len(), before);
        let article = engine.article("/user/bob/").unwrap();
        assert!(article.open);
        assert_eq!(article.current_section.as_deref(), Some("followers"));
        let slot = Slot::Section {
            article: "/user/bob/".to_string(),
            kind: "followers".to_string(),
        };
        assert_eq!(engine.doc.in_slot(&slot).len(), 1);
    }

    #[tokio::test]
    async fn duplicate_history_write_is_suppressed() {
        let transport = MockTransport::new();
        transport.on_get(
            "/",
            Some("type=repositories&filter=&q=x&order="),
            &article_html("/user/x/", "x"),
        );
        let (mut engine, _) = engine_with(transport);
        engine.search.form.set_text("q", "x");
        engine.submit_search().await.unwrap();
        let len = engine.history.len();
        engine.add_to_history(EntityKey::Search, None, false);
        assert_eq!(engine.history.len(), len);
    }

    #[tokio::test]
    async fn repeated_login_data_is_idempotent() {
        let transport = MockTransport::new();
        let (mut engine, _) = engine_with(transport);
        let data = || LoginData {
            token: "tok".to_string(),
            username: "bob".to_string(),
            nb_accounts: 1,
            user_tags: UserTags::default(),
        };
        engine.on_logged(data());
        engine.take_notices();
        engine.on_logged(data());
        assert!(engine.take_notices().is_empty());
        engine.on_logged_out();
        engine.on_logged_out();
        assert_eq!(engine.take_notices().len(), 1);
    }

    #[tokio::test]
    async fn scroll_far_from_bottom_does_nothing() {
        let transport = MockTransport::new();
        let (mut engine, _) = engine_with(transport);
        let triggered = engine
            .on_scroll(ScrollMetrics {
                doc_height: 5000,
                win_height: 800,
                scroll_top: 0,
            })
            .await
            .unwrap();
        assert!(!triggered);
    }

    #[tokio::test]
    async fn scroll_near_bottom_loads_next_page() {
        let transport = MockTransport::new();
        let body = format!(
            r#"{}<nav><div class="endless_container">
                <a class="endless_more" rel="results" href="/?page=2&amp;q=x">more</a>
            </div></nav>"#,
            article_html("/user/a/", "a")
        );
        transport.on_get("/", Some("type=repositories&filter=&q=x&order="), &body);
        transport.on_get(
            "/?page=2&q=x",
            Some("querystring_key=results"),
            &article_html("/user/b/", "b"),
        );
        let (mut engine, _) = engine_with(transport);
        engine.search.form.set_text("q", "x");
        engine.submit_search().await.unwrap();
        assert_eq!(engine.search.last_page, 1);

        let triggered = engine
            .on_scroll(ScrollMetrics {
                doc_height: 1000,
                win_height: 800,
                scroll_top: 100,
            })
            .await
            .unwrap();
        assert!(triggered);
        assert_eq!(engine.search.last_page, 2);
        assert_eq!(engine.doc.in_slot(&Slot::Results).len(), 2);
        assert!(engine.doc.more_for(&Slot::Results).is_none());
    }
}
