//! Detail-pane sections (followers, forks, activity...). Exactly one
//! section of an open article is current at a time; its results live in
//! the matching `Slot::Section` and its optional filter form keeps its
//! own querystring.

use crate::cache::compute_url;
use crate::engine::{opt_str, Engine, EntityKey};
use crate::error::Result;
use crate::forms::Form;
use crate::markup::{self, DetailMarkup, SectionLink};
use crate::page::Slot;

#[derive(Debug)]
pub struct Section {
    pub kind: String,
    pub url: String,
    pub label: Option<String>,
    /// Serialized filter form of the last load, empty for a plain load.
    pub querystring: String,
    pub last_page: u32,
    pub loading: bool,
    pub open: bool,
    pub filter_form: Option<Form>,
}

impl Section {
    pub(crate) fn new(link: &SectionLink) -> Self {
        Section {
            kind: link.kind.clone(),
            url: link.url.clone(),
            label: (!link.label.is_empty()).then(|| link.label.clone()),
            querystring: String::new(),
            last_page: 1,
            loading: false,
            open: false,
            filter_form: None,
        }
    }
}

impl Engine {
    pub(crate) fn section_url(&self, article_url: &str, kind: &str) -> Option<String> {
        self.articles
            .get(article_url)
            .and_then(|a| a.sections.get(kind))
            .map(|s| s.url.clone())
    }

    /// Display title: the tab label, anchored to the owning article,
    /// decorated with the active filter.
    pub(crate) fn section_title(&mut self, article_url: &str, kind: &str) -> String {
        let article_title = self.article_title(article_url);
        let Some(section) = self
            .articles
            .get(article_url)
            .and_then(|a| a.sections.get(kind))
        else {
            return article_title;
        };
        let label = section.label.clone().unwrap_or_else(|| kind.to_string());
        let base = format!("{label} for {article_title}");
        let Some(form) = &section.filter_form else {
            return base;
        };
        let query = form.text_value("q").unwrap_or("").trim().to_string();
        let mut title = if query.is_empty() {
            base
        } else {
            format!("Search for `{query}` in {base}")
        };
        let mut extras: Vec<String> = form
            .checked_in_group("search_options")
            .map(|f| f.label.replace(" ?", ""))
            .collect();
        if let Some(order) = form.checked_field("order") {
            if !order.value.is_empty() {
                extras.push(format!("Sort by {}", order.label));
            }
        }
        if !extras.is_empty() {
            title.push_str(&format!(" ({})", extras.join(", ")));
        }
        title
    }

    /// Open a section by article URL and kind, opening the article
    /// first if needed.
    pub async fn load_section(&mut self, article_url: &str, kind: &str) -> Result<()> {
        if !self.articles.get(article_url).is_some_and(|a| a.open) {
            self.open_article(article_url).await?;
            if !self.articles.get(article_url).is_some_and(|a| a.open) {
                return Ok(());
            }
        }
        self.click_section(article_url, kind).await
    }

    /// Tab click: a click on the current open tab is a no-op, any other
    /// tab replaces the current section.
    pub async fn click_section(&mut self, article_url: &str, kind: &str) -> Result<()> {
        let already_current = self
            .articles
            .get(article_url)
            .is_some_and(|a| a.current_section.as_deref() == Some(kind));
        let open = self
            .articles
            .get(article_url)
            .and_then(|a| a.sections.get(kind))
            .is_some_and(|s| s.open);
        if already_current && open {
            return Ok(());
        }
        self.remove_sections(article_url);
        if let Some(section) = self
            .articles
            .get_mut(article_url)
            .and_then(|a| a.sections.get_mut(kind))
        {
            section.querystring.clear();
        }
        self.load_section_content(article_url, kind, None).await
    }

    /// Filter form submit inside the current section.
    pub async fn submit_section_filter(&mut self, article_url: &str, kind: &str) -> Result<()> {
        let querystring = {
            let Some(section) = self
                .articles
                .get_mut(article_url)
                .and_then(|a| a.sections.get_mut(kind))
            else {
                return Ok(());
            };
            let Some(form) = section.filter_form.as_mut() else {
                return Ok(());
            };
            let query = form.text_value("q").unwrap_or("").trim().to_string();
            form.set_text("q", &query);
            let querystring = form.serialize();
            section.querystring = querystring.clone();
            querystring
        };
        // teardown keeps the form and querystring, only the rendered
        // results and open flags go away
        self.remove_sections(article_url);
        self.load_section_content(article_url, kind, Some(&querystring))
            .await
    }

    /// Fetch a section's results and render them, marking it current.
    pub(crate) async fn load_section_content(
        &mut self,
        article_url: &str,
        kind: &str,
        querystring: Option<&str>,
    ) -> Result<()> {
        let section_url = {
            let Some(section) = self
                .articles
                .get_mut(article_url)
                .and_then(|a| a.sections.get_mut(kind))
            else {
                return Ok(());
            };
            if section.loading {
                return Ok(());
            }
            section.loading = true;
            section.url.clone()
        };
        self.set_current_section(article_url, Some(kind));

        let fetched = match self
            .fetch(&section_url, querystring.and_then(opt_str))
            .await
        {
            Ok(fetched) => fetched,
            Err(err) => {
                if let Some(section) = self
                    .articles
                    .get_mut(article_url)
                    .and_then(|a| a.sections.get_mut(kind))
                {
                    section.loading = false;
                }
                self.surface(&err);
                return Err(err);
            }
        };

        // the article may have been closed while the fetch was in flight
        if !self.articles.get(article_url).is_some_and(|a| a.open) {
            if let Some(section) = self
                .articles
                .get_mut(article_url)
                .and_then(|a| a.sections.get_mut(kind))
            {
                section.loading = false;
            }
            tracing::debug!(url = %section_url, "discarding stale section response");
            return Ok(());
        }

        let filter_form = markup::parse_filter_form(&fetched.body);
        {
            let Some(section) = self
                .articles
                .get_mut(article_url)
                .and_then(|a| a.sections.get_mut(kind))
            else {
                return Ok(());
            };
            section.loading = false;
            section.open = true;
            if filter_form.is_some() {
                section.filter_form = filter_form;
            }
        }

        let slot = Slot::Section {
            article: article_url.to_string(),
            kind: kind.to_string(),
        };
        self.doc.clear_slot(&slot);
        for parsed in markup::parse_articles(&fetched.body) {
            self.doc.insert(parsed, slot.clone());
        }
        self.doc
            .set_more(slot.clone(), markup::parse_more(&fetched.body));
        self.set_last_page(&slot, 1);
        self.set_current_section(article_url, Some(kind));
        self.add_to_history(
            EntityKey::Section {
                article: article_url.to_string(),
                kind: kind.to_string(),
            },
            fetched.querystring.as_deref(),
            false,
        );

        // the unfiltered response equals the default filter-form
        // serialization, so alias the cache key filtered loads will use
        if !fetched.from_cache && querystring.is_none() {
            self.alias_default_filter_key(article_url, kind);
        }
        Ok(())
    }

    fn alias_default_filter_key(&mut self, article_url: &str, kind: &str) {
        let Some(section) = self
            .articles
            .get(article_url)
            .and_then(|a| a.sections.get(kind))
        else {
            return;
        };
        let Some(form) = &section.filter_form else {
            return;
        };
        let plain = self.cache.key(&section.url, None);
        let filtered = self.cache.key(&section.url, Some(&form.serialize()));
        self.cache.copy(&plain, &filtered);
    }

    /// Replay a recorded section: restore its filter form from the
    /// recorded querystring and load.
    pub(crate) async fn replay_section(
        &mut self,
        article_url: &str,
        kind: &str,
        querystring: &str,
    ) -> Result<()> {
        self.remove_sections(article_url);
        if let Some(section) = self
            .articles
            .get_mut(article_url)
            .and_then(|a| a.sections.get_mut(kind))
        {
            section.querystring = querystring.to_string();
            if let Some(form) = section.filter_form.as_mut() {
                form.unserialize(
                    querystring,
                    crate::forms::UnserializeOptions {
                        override_values: true,
                        ..Default::default()
                    },
                );
            }
        }
        self.load_section_content(article_url, kind, opt_str(querystring))
            .await
    }

    /// Mark a section current (or none) and reflect it in the document
    /// title.
    pub(crate) fn set_current_section(&mut self, article_url: &str, kind: Option<&str>) {
        if let Some(article) = self.articles.get_mut(article_url) {
            article.current_section = kind.map(str::to_string);
        }
        if let Some(kind) = kind {
            let title = self.section_title(article_url, kind);
            self.set_doc_title(&title);
        }
    }

    /// Tear down every section of an article, detaching any child
    /// articles rendered inside them first.
    pub(crate) fn remove_sections(&mut self, article_url: &str) {
        let kinds: Vec<String> = self
            .articles
            .get(article_url)
            .map(|a| a.sections.keys().cloned().collect())
            .unwrap_or_default();
        for kind in kinds {
            let slot = Slot::Section {
                article: article_url.to_string(),
                kind,
            };
            for id in self.doc.in_slot(&slot) {
                let Some(node) = self.doc.node(id) else {
                    continue;
                };
                let child = node.url.clone();
                self.detach_article_node(&child, id);
            }
        }
        self.doc.clear_article_sections(article_url);
        if let Some(article) = self.articles.get_mut(article_url) {
            article.current_section = None;
            for section in article.sections.values_mut() {
                section.open = false;
                section.loading = false;
            }
        }
    }

    /// Sections the server rendered inline inside a detail fragment:
    /// the current one is adopted as already loaded, with its content
    /// seeded into the cache.
    pub(crate) fn adopt_embedded_sections(&mut self, article_url: &str, detail: &DetailMarkup) {
        for embedded in &detail.embedded {
            if !embedded.current {
                continue;
            }
            let Some(section_url) = self.section_url(article_url, &embedded.kind) else {
                continue;
            };
            let key = self.cache.key(&section_url, None);
            self.cache.set(&key, &embedded.html);

            let filter_form = markup::parse_filter_form(&embedded.html);
            if let Some(section) = self
                .articles
                .get_mut(article_url)
                .and_then(|a| a.sections.get_mut(&embedded.kind))
            {
                section.open = true;
                section.filter_form = filter_form;
            }
            let slot = Slot::Section {
                article: article_url.to_string(),
                kind: embedded.kind.clone(),
            };
            for parsed in markup::parse_articles(&embedded.html) {
                self.doc.insert(parsed, slot.clone());
            }
            self.doc
                .set_more(slot.clone(), markup::parse_more(&embedded.html));
            self.set_last_page(&slot, 1);
            self.set_current_section(article_url, Some(&embedded.kind));
            self.alias_default_filter_key(article_url, &embedded.kind);
            self.last_history_url = self
                .last_history_url
                .clone()
                .or_else(|| Some(compute_url(&section_url, None)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tests::{article_html, detail_html, engine_with};
    use crate::transport::mock::MockTransport;

    const FILTERED_SECTION: &str = r#"
        <section class="search"><form>
            <fieldset class="search_main"><input type="text" name="q" value="" /></fieldset>
            <fieldset class="search_order">
                <input type="radio" name="order" value="" checked /><label>None</label>
                <input type="radio" name="order" value="name" /><label>name</label>
            </fieldset>
        </form></section>
    "#;

    async fn open_bob(transport: MockTransport) -> (Engine, std::sync::Arc<MockTransport>) {
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
        let id = engine.doc.in_slot(&Slot::Results)[0];
        engine.click_article(id).await.unwrap();
        (engine, handle)
    }

    #[tokio::test]
    async fn opening_a_section_renders_and_records_it() {
        let transport = MockTransport::new();
        transport.on_get(
            "/user/bob/followers/",
            None,
            &format!("{}{}", FILTERED_SECTION, article_html("/user/alice/", "alice")),
        );
        let (mut engine, _) = open_bob(transport).await;

        engine
            .load_section("/user/bob/", "followers")
            .await
            .unwrap();
        let article = engine.article("/user/bob/").unwrap();
        assert_eq!(article.current_section.as_deref(), Some("followers"));
        assert!(article.sections.get("followers").unwrap().open);
        let slot = Slot::Section {
            article: "/user/bob/".to_string(),
            kind: "followers".to_string(),
        };
        assert_eq!(engine.doc.in_slot(&slot).len(), 1);
        assert_eq!(engine.history.current().unwrap().url, "/user/bob/followers/");
        assert_eq!(engine.history.current().unwrap().steps.len(), 3);
    }

    #[tokio::test]
    async fn switching_tabs_replaces_the_current_section() {
        let transport = MockTransport::new();
        transport.on_get(
            "/user/bob/followers/",
            None,
            &article_html("/user/alice/", "alice"),
        );
        transport.on_get(
            "/user/bob/following/",
            None,
            &article_html("/user/carol/", "carol"),
        );
        let (mut engine, _) = open_bob(transport).await;

        engine
            .load_section("/user/bob/", "followers")
            .await
            .unwrap();
        engine
            .load_section("/user/bob/", "following")
            .await
            .unwrap();
        let article = engine.article("/user/bob/").unwrap();
        assert_eq!(article.current_section.as_deref(), Some("following"));
        assert!(!article.sections.get("followers").unwrap().open);
        let old_slot = Slot::Section {
            article: "/user/bob/".to_string(),
            kind: "followers".to_string(),
        };
        assert!(engine.doc.in_slot(&old_slot).is_empty());
    }

    #[tokio::test]
    async fn reclicking_the_current_tab_is_a_noop() {
        let transport = MockTransport::new();
        transport.on_get(
            "/user/bob/followers/",
            None,
            &article_html("/user/alice/", "alice"),
        );
        let (mut engine, handle) = open_bob(transport).await;
        engine
            .load_section("/user/bob/", "followers")
            .await
            .unwrap();
        let requests = handle.requests().len();
        engine
            .click_section("/user/bob/", "followers")
            .await
            .unwrap();
        assert_eq!(handle.requests().len(), requests);
    }

    #[tokio::test]
    async fn plain_load_aliases_the_default_filter_key() {
        let transport = MockTransport::new();
        transport.on_get(
            "/user/bob/followers/",
            None,
            &format!("{}{}", FILTERED_SECTION, article_html("/user/alice/", "alice")),
        );
        let (mut engine, handle) = open_bob(transport).await;
        engine
            .load_section("/user/bob/", "followers")
            .await
            .unwrap();
        // the default serialization is aliased to the plain response
        let key = engine.cache.key("/user/bob/followers/", Some("q=&order="));
        assert!(engine.cache.has(&key));

        // submitting the untouched filter form therefore needs no fetch
        let requests = handle.requests().len();
        engine
            .submit_section_filter("/user/bob/", "followers")
            .await
            .unwrap();
        assert_eq!(handle.requests().len(), requests);
    }

    #[tokio::test]
    async fn filter_submit_fetches_the_filtered_view() {
        let transport = MockTransport::new();
        transport.on_get(
            "/user/bob/followers/",
            None,
            &format!("{}{}", FILTERED_SECTION, article_html("/user/alice/", "alice")),
        );
        transport.on_get(
            "/user/bob/followers/",
            Some("q=ali&order="),
            &article_html("/user/alice/", "alice"),
        );
        let (mut engine, _) = open_bob(transport).await;
        engine
            .load_section("/user/bob/", "followers")
            .await
            .unwrap();

        {
            let form = engine
                .articles
                .get_mut("/user/bob/")
                .unwrap()
                .sections
                .get_mut("followers")
                .unwrap()
                .filter_form
                .as_mut()
                .unwrap();
            form.set_text("q", "ali");
        }
        engine
            .submit_section_filter("/user/bob/", "followers")
            .await
            .unwrap();
        let section = engine
            .article("/user/bob/")
            .unwrap()
            .sections
            .get("followers")
            .unwrap();
        assert_eq!(section.querystring, "q=ali&order=");
        assert!(section.open);
        assert!(engine
            .history
            .current()
            .unwrap()
            .url
            .ends_with("/user/bob/followers/?q=ali&order="));
    }

    #[tokio::test]
    async fn closing_the_article_detaches_nested_children() {
        let transport = MockTransport::new();
        transport.on_get(
            "/user/bob/followers/",
            None,
            &article_html("/user/alice/", "alice"),
        );
        transport.on_get(
            "/user/alice/",
            None,
            &detail_html(&[("followers", "/user/alice/followers/")]),
        );
        let (mut engine, _) = open_bob(transport).await;
        engine
            .load_section("/user/bob/", "followers")
            .await
            .unwrap();
        let slot = Slot::Section {
            article: "/user/bob/".to_string(),
            kind: "followers".to_string(),
        };
        let child = engine.doc.in_slot(&slot)[0];
        engine.click_article(child).await.unwrap();
        assert!(engine.article("/user/alice/").unwrap().open);
        assert!(engine.doc.node(child).unwrap().with_details);
        // the expanded child marks the whole chain
        let bob_node = engine.article("/user/bob/").unwrap().node.unwrap();
        assert!(engine.doc.node(bob_node).unwrap().with_opened);

        engine.close_article("/user/bob/", false);
        assert!(!engine.article("/user/alice/").unwrap().open);
        assert!(engine.doc.in_slot(&slot).is_empty());
        assert!(!engine.doc.node(bob_node).unwrap().with_opened);
    }

    #[tokio::test]
    async fn clicking_an_ancestor_folds_the_family_back() {
        let transport = MockTransport::new();
        transport.on_get(
            "/user/bob/followers/",
            None,
            &article_html("/user/alice/", "alice"),
        );
        transport.on_get(
            "/user/alice/",
            None,
            &detail_html(&[("followers", "/user/alice/followers/")]),
        );
        let (mut engine, _) = open_bob(transport).await;
        engine
            .load_section("/user/bob/", "followers")
            .await
            .unwrap();
        let slot = Slot::Section {
            article: "/user/bob/".to_string(),
            kind: "followers".to_string(),
        };
        let child = engine.doc.in_slot(&slot)[0];
        engine.click_article(child).await.unwrap();

        // bob carries with-opened, so the next click folds alice back in
        let bob_node = engine.article("/user/bob/").unwrap().node.unwrap();
        engine.click_article(bob_node).await.unwrap();
        assert!(engine.article("/user/bob/").unwrap().open);
        assert!(!engine.article("/user/alice/").unwrap().open);
        assert!(!engine.doc.node(bob_node).unwrap().with_opened);
        assert!(!engine.doc.node(child).unwrap().with_details);
        assert_eq!(engine.history.current().unwrap().url, "/user/bob/followers/");
    }
}
