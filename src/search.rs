//! The page-level search pane: form state, result loading, and the
//! human-readable titles derived from the current selection.

use crate::cache::Fetched;
use crate::engine::{opt_str, Engine, EntityKey};
use crate::error::Result;
use crate::forms::{Field, Form, UnserializeOptions};
use crate::markup;
use crate::page::Slot;
use crate::tags::TagKind;
use crate::types::{ArticleKind, Tag};

/// State of the main search form and its results pane. `active` is
/// false on pages rendered without a search form, where every search
/// operation is a no-op.
#[derive(Debug, Default)]
pub struct SearchPane {
    pub active: bool,
    pub url: String,
    pub form: Form,
    /// Serialized form of the last submitted search.
    pub querystring: String,
    pub last_page: u32,
    pub loading: bool,
}

/// The site's default search form: type switch, filter sidebar with
/// the special filters, query box, options and ordering.
pub fn default_form() -> Form {
    Form::new(vec![
        Field::radio("type", ArticleKind::Account.search_type(), "People"),
        Field::radio("type", ArticleKind::Repository.search_type(), "Repositories").checked(),
        Field::radio("filter", "", "None").hidden().checked(),
        Field::radio("filter", "tag:starred", "Starred").group("special-filters"),
        Field::radio("filter", "tag:check-later", "Check later").group("special-filters"),
        Field::radio("filter", "noted", "Noted").group("special-filters"),
        Field::text("q"),
        Field::checkbox("show_forks", "Show forks ?").group("search_options"),
        Field::radio("order", "", "None").hidden().checked(),
        Field::radio("order", "name", "name").group("search_order"),
    ])
}

impl SearchPane {
    pub fn new(url: &str, form: Form) -> Self {
        SearchPane {
            active: true,
            url: url.to_string(),
            form,
            querystring: String::new(),
            last_page: 1,
            loading: false,
        }
    }

    pub fn inactive() -> Self {
        SearchPane::default()
    }

    /// Populate the form from a querystring, then normalize: `q` always
    /// takes part, `type` defaults to repositories, and a filter or
    /// order whose control is not visible falls back to the none
    /// sentinel.
    pub fn unserialize(&mut self, querystring: &str) {
        let querystring = if querystring.contains("q=") {
            querystring.to_string()
        } else {
            format!("{querystring}&q=")
        };
        self.form.unserialize(
            &querystring,
            UnserializeOptions {
                override_values: true,
                ..Default::default()
            },
        );
        if self.form.checked_value("type").is_none() {
            self.form.check("type", "repositories");
        }
        for name in ["filter", "order"] {
            if !self.form.checked_field(name).is_some_and(|f| f.visible) {
                self.form.check(name, "");
            }
        }
    }

    /// Fall selections whose control is hidden back to the none
    /// sentinel before a submit.
    pub fn reset_invisible_choices(&mut self) {
        for name in ["filter", "order"] {
            if self.form.checked_field(name).is_some_and(|f| !f.visible) {
                self.form.check(name, "");
            }
        }
    }

    /// Derive the display title from the current form state.
    pub fn title(&self) -> String {
        let search_type = self
            .form
            .checked_value("type")
            .filter(|v| !v.is_empty())
            .unwrap_or("repositories")
            .to_string();
        let type_caps = capitalize(&search_type);

        let filter_title = self
            .form
            .checked_field("filter")
            .filter(|f| !f.value.is_empty())
            .map(|filter| {
                let label = filter.label.clone();
                if label.starts_with('#') {
                    format!("{type_caps} for project `{label}`")
                } else if label.starts_with('@') {
                    format!("{type_caps} for place `{label}`")
                } else if filter.value == "tag:starred" {
                    format!("Starred {search_type}")
                } else if filter.value == "tag:check-later" {
                    format!("{type_caps} to check later")
                } else if filter.value.starts_with("tag:") {
                    format!("{type_caps} with tag `{label}`")
                } else if filter.value == "noted" {
                    format!("Noted {search_type}")
                } else {
                    format!("{label} {search_type}")
                }
            });

        let query = self.form.text_value("q").unwrap_or("").trim();
        let mut title = if !query.is_empty() {
            match &filter_title {
                Some(filtered) => {
                    format!("Search for `{query}` in {}", lowercase_first(filtered))
                }
                None => format!("Search {search_type} for `{query}`"),
            }
        } else {
            match filter_title {
                Some(filtered) => filtered,
                None => return "Home".to_string(),
            }
        };

        let mut extras: Vec<String> = self
            .form
            .checked_in_group("search_options")
            .map(|f| f.label.replace(" ?", ""))
            .collect();
        if let Some(order) = self.form.checked_field("order") {
            if !order.value.is_empty() {
                extras.push(format!("Sort by {}", order.label));
            }
        }
        if !extras.is_empty() {
            title.push_str(&format!(" ({})", extras.join(", ")));
        }
        title
    }

    /// Offer a freshly created tag as a filter choice, keeping its kind
    /// group alphabetically sorted.
    pub fn add_tag(&mut self, tag: &Tag, kind: TagKind) {
        let value = format!("tag:{}", tag.slug);
        if self
            .form
            .fields()
            .iter()
            .any(|f| f.name == "filter" && f.value == value)
        {
            return;
        }
        let group = format!("tags-type-{}", kind.group_code());
        let field = Field::radio("filter", &value, &tag.name).group(&group);

        let fields = self.form.fields();
        let in_group: Vec<usize> = fields
            .iter()
            .enumerate()
            .filter(|(_, f)| f.group.as_deref() == Some(group.as_str()))
            .map(|(i, _)| i)
            .collect();
        let position = if let Some(&first) = in_group.first() {
            in_group
                .iter()
                .find(|&&i| fields[i].label.to_lowercase() > tag.name.to_lowercase())
                .copied()
                .unwrap_or(in_group.last().copied().unwrap_or(first) + 1)
        } else {
            // a new kind group goes in front of the special filters
            fields
                .iter()
                .position(|f| f.group.as_deref() == Some("special-filters"))
                .unwrap_or(fields.len())
        };
        self.form.insert(position, field);
    }
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn lowercase_first(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

impl Engine {
    /// Submit the search form. An empty query with no filter hides the
    /// results instead of hitting the server.
    pub async fn submit_search(&mut self) -> Result<()> {
        if !self.search.active {
            return Ok(());
        }
        let query = self
            .search
            .form
            .text_value("q")
            .unwrap_or("")
            .trim()
            .to_string();
        self.search.form.set_text("q", &query);
        self.search.reset_invisible_choices();

        let filter = self
            .search
            .form
            .checked_value("filter")
            .unwrap_or("")
            .to_string();
        if filter.is_empty() && query.is_empty() {
            self.doc.results_visible = false;
            return Ok(());
        }
        self.search.querystring = self.search.form.serialize();
        let querystring = self.search.querystring.clone();
        self.load_search(&querystring).await
    }

    /// Check a form choice and submit in one go (the sidebar filter
    /// links and the type switch work this way).
    pub async fn direct_search_choice(&mut self, name: &str, value: &str) -> Result<()> {
        if !self.search.active {
            return Ok(());
        }
        self.search.form.check(name, value);
        self.submit_search().await
    }

    pub(crate) async fn load_search(&mut self, querystring: &str) -> Result<()> {
        if !self.search.active {
            return Ok(());
        }
        self.remove_search_results();
        self.search.last_page = 1;
        self.search.loading = true;
        self.doc.results_visible = true;
        let url = self.search.url.clone();
        let fetched = match self.fetch(&url, opt_str(querystring)).await {
            Ok(fetched) => fetched,
            Err(err) => {
                self.search.loading = false;
                self.surface(&err);
                return Err(err);
            }
        };
        self.search.loading = false;
        self.on_search_results(fetched);
        Ok(())
    }

    fn on_search_results(&mut self, fetched: Fetched) {
        if fetched.body.is_empty() {
            self.doc.results_visible = false;
        } else {
            for parsed in markup::parse_articles(&fetched.body) {
                self.doc.insert(parsed, Slot::Results);
            }
            self.doc
                .set_more(Slot::Results, markup::parse_more(&fetched.body));
            self.doc.results_visible = true;
        }
        self.set_last_page(&Slot::Results, 1);
        self.add_to_history(EntityKey::Search, fetched.querystring.as_deref(), false);
    }

    /// Adopt server-rendered results on a direct page load: the markup
    /// seeds the cache and the render model without a fetch, and the
    /// current location replaces the history root. Skipped when the
    /// markup carries an open detail pane, which the article flow owns.
    pub fn prepare_search_existing(&mut self, results_html: &str, location_search: &str) {
        if !self.search.active {
            return;
        }
        let articles = markup::parse_articles(results_html);
        if articles.iter().any(|a| a.with_details) {
            return;
        }
        self.search.unserialize(location_search);
        self.search.querystring = self.search.form.serialize();
        let key = self
            .cache
            .key(&self.search.url, Some(&self.search.querystring));
        self.cache.set(&key, results_html);

        let any = !articles.is_empty();
        for parsed in articles {
            self.doc.insert(parsed, Slot::Results);
        }
        self.doc
            .set_more(Slot::Results, markup::parse_more(results_html));
        self.doc.results_visible = any;
        self.set_last_page(&Slot::Results, 1);
        let querystring = self.search.querystring.clone();
        self.add_to_history(EntityKey::Search, Some(&querystring), true);
        let title = self.search.title();
        self.set_doc_title(&title);
    }

    /// Rebuild a recorded search: restore the form from the recorded
    /// querystring and load (usually straight from the cache).
    pub(crate) async fn replay_search(&mut self, querystring: &str) -> Result<()> {
        self.search.unserialize(querystring);
        self.search.querystring = self.search.form.serialize();
        let querystring = self.search.querystring.clone();
        self.load_search(&querystring).await
    }

    /// Drop every rendered result, closing anything open inside first
    /// so no entity keeps state pointing at a gone node.
    pub(crate) fn remove_search_results(&mut self) {
        for id in self.doc.in_slot(&Slot::Results) {
            let Some(node) = self.doc.node(id) else {
                continue;
            };
            let url = node.url.clone();
            self.detach_article_node(&url, id);
        }
        self.doc.clear_slot(&Slot::Results);
        self.doc.results_with_opened = false;
    }
}
