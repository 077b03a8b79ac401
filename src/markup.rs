//! Extraction of the stable structural markers the server embeds in its
//! HTML fragments: article containers (identified by their owning link's
//! href), detail section tabs (identified by a `rel` type attribute),
//! embedded filter forms, and "endless more" pagination links.

use scraper::{ElementRef, Html, Selector};

use crate::forms::{Field, FieldKind, Form};

#[derive(Debug, Clone, Default)]
pub struct ParsedArticle {
    pub url: String,
    pub name: String,
    pub owner: Option<String>,
    pub backend: Option<String>,
    pub starred: bool,
    pub checked: bool,
    pub star_title: Option<String>,
    pub check_title: Option<String>,
    pub star_url: Option<String>,
    pub check_url: Option<String>,
    pub note_edit_url: Option<String>,
    pub note_save_url: Option<String>,
    pub note_html: Option<String>,
    /// The fragment came with a server-rendered detail pane inside.
    pub with_details: bool,
    pub tag_content_type: Option<String>,
    pub tag_object_id: Option<String>,
}

/// A "load more" pagination control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoreLink {
    pub href: String,
    pub page: u32,
    pub querystring_key: String,
}

/// One tab in a detail pane's header.
#[derive(Debug, Clone)]
pub struct SectionLink {
    pub kind: String,
    pub url: String,
    pub label: String,
    pub current: bool,
}

/// A section the server rendered inline inside a detail fragment.
#[derive(Debug, Clone)]
pub struct EmbeddedSection {
    pub kind: String,
    pub current: bool,
    pub html: String,
}

#[derive(Debug, Clone, Default)]
pub struct DetailMarkup {
    pub sections: Vec<SectionLink>,
    pub embedded: Vec<EmbeddedSection>,
}

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("invalid selector")
}

fn text_of(el: &ElementRef) -> String {
    el.text().collect::<String>().trim().to_string()
}

fn has_class(el: &ElementRef, class: &str) -> bool {
    el.value().classes().any(|c| c == class)
}

fn nested_in_article(el: &ElementRef) -> bool {
    el.ancestors().any(|node| {
        ElementRef::wrap(node)
            .is_some_and(|a| a.value().name() == "article" && has_class(&a, "content"))
    })
}

fn page_param(href: &str) -> Option<u32> {
    let idx = href.find("page=")?;
    let digits: String = href[idx + 5..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

fn parse_one_article(article: &ElementRef) -> Option<ParsedArticle> {
    let link_sel = selector("header h1 a[href]");
    let owner_sel = selector("header h2 a");
    let backend_sel = selector("header h3");

    let link = article.select(&link_sel).next()?;
    let url = link.value().attr("href")?.to_string();
    let name = text_of(&link);

    let owner = article
        .select(&owner_sel)
        .last()
        .map(|el| text_of(&el))
        .filter(|s| !s.is_empty());
    let backend = article
        .select(&backend_sel)
        .next()
        .map(|el| text_of(&el).replace(' ', ""))
        .filter(|s| !s.is_empty());

    let mut parsed = ParsedArticle {
        url,
        name,
        owner,
        backend,
        ..ParsedArticle::default()
    };

    for (flag, selected, title, action) in [
        (
            "li.action-star",
            &mut parsed.starred,
            &mut parsed.star_title,
            &mut parsed.star_url,
        ),
        (
            "li.action-check",
            &mut parsed.checked,
            &mut parsed.check_title,
            &mut parsed.check_url,
        ),
    ] {
        if let Some(li) = article.select(&selector(flag)).next() {
            *selected = has_class(&li, "selected");
            if let Some(button) = li.select(&selector("form button")).next() {
                *title = button.value().attr("title").map(str::to_string);
            }
            if let Some(form) = li.select(&selector("form")).next() {
                *action = form.value().attr("action").map(str::to_string);
            }
        }
    }

    if let Some(li) = article.select(&selector("li.action-note")).next() {
        parsed.note_edit_url = li
            .select(&selector("a[href]"))
            .next()
            .and_then(|a| a.value().attr("href"))
            .map(str::to_string);
        parsed.note_save_url = li
            .select(&selector("form"))
            .next()
            .and_then(|f| f.value().attr("action"))
            .map(str::to_string);
        parsed.note_html = li
            .select(&selector("blockquote div"))
            .next()
            .map(|div| div.inner_html().trim().to_string())
            .filter(|s| !s.is_empty());
    }

    if let Some(a) = article.select(&selector("a.more-tags")).next() {
        parsed.tag_content_type = a.value().attr("data-content-type").map(str::to_string);
        parsed.tag_object_id = a.value().attr("data-object-id").map(str::to_string);
    }

    parsed.with_details = article
        .select(&selector("section.details"))
        .next()
        .is_some();

    Some(parsed)
}

/// Top-level article containers of a results fragment.
pub fn parse_articles(html: &str) -> Vec<ParsedArticle> {
    let fragment = Html::parse_fragment(html);
    let article_sel = selector("article.content");
    fragment
        .select(&article_sel)
        .filter(|el| !nested_in_article(el))
        .filter_map(|el| parse_one_article(&el))
        .collect()
}

/// The pagination control of a results fragment, if any.
pub fn parse_more(html: &str) -> Option<MoreLink> {
    let fragment = Html::parse_fragment(html);
    let more_sel = selector("a.endless_more[href]");
    let link = fragment.select(&more_sel).next()?;
    let href = link.value().attr("href")?.to_string();
    let page = page_param(&href)?;
    let querystring_key = link
        .value()
        .attr("rel")?
        .split_whitespace()
        .next()?
        .to_string();
    Some(MoreLink {
        href,
        page,
        querystring_key,
    })
}

/// Section tabs (and any inline-rendered section) of a detail fragment.
pub fn parse_detail(html: &str) -> DetailMarkup {
    let fragment = Html::parse_fragment(html);
    let tab_sel = selector("header li[rel]");
    let embedded_sel = selector("section[rel]");

    let mut detail = DetailMarkup::default();
    for li in fragment.select(&tab_sel) {
        let Some(kind) = li.value().attr("rel") else {
            continue;
        };
        let Some(link) = li.select(&selector("a[href]")).next() else {
            continue;
        };
        let Some(url) = link.value().attr("href") else {
            continue;
        };
        let label = link
            .select(&selector("span"))
            .next()
            .map(|span| text_of(&span))
            .unwrap_or_else(|| text_of(&link));
        detail.sections.push(SectionLink {
            kind: kind.to_string(),
            url: url.to_string(),
            label,
            current: has_class(&li, "current"),
        });
    }

    for section in fragment.select(&embedded_sel) {
        let Some(kind) = section.value().attr("rel") else {
            continue;
        };
        detail.embedded.push(EmbeddedSection {
            kind: kind.to_string(),
            current: has_class(&section, "current"),
            html: section.html(),
        });
    }
    detail
}

/// The outer HTML of a pre-rendered detail pane inside a full article
/// fragment, used to seed the cache on direct page loads.
pub fn detail_html(html: &str) -> Option<String> {
    let fragment = Html::parse_fragment(html);
    let detail_sel = selector("section.details");
    fragment.select(&detail_sel).next().map(|el| el.html())
}

/// The submit target of the first form in a fragment (the note edit
/// form returned by the note endpoint).
pub fn parse_form_action(html: &str) -> Option<String> {
    let fragment = Html::parse_fragment(html);
    let form_sel = selector("form[action]");
    fragment
        .select(&form_sel)
        .next()
        .and_then(|f| f.value().attr("action"))
        .map(str::to_string)
}

fn following_label(input: &ElementRef) -> Option<String> {
    for sibling in input.next_siblings() {
        if let Some(el) = ElementRef::wrap(sibling) {
            if el.value().name() == "label" {
                return Some(text_of(&el));
            }
            return None;
        }
    }
    None
}

fn fieldset_class(input: &ElementRef) -> Option<String> {
    for node in input.ancestors() {
        if let Some(el) = ElementRef::wrap(node) {
            if el.value().name() == "fieldset" {
                return el.value().classes().next().map(str::to_string);
            }
        }
    }
    None
}

/// The embedded filter form of a section fragment, if any.
pub fn parse_filter_form(html: &str) -> Option<Form> {
    let fragment = Html::parse_fragment(html);
    let form_sel = selector("section.search form");
    let input_sel = selector("input[name]");

    let form_el = fragment.select(&form_sel).next()?;
    let mut form = Form::default();
    for input in form_el.select(&input_sel) {
        let value = input.value();
        let Some(name) = value.attr("name") else {
            continue;
        };
        let kind = match value.attr("type").unwrap_or("text") {
            "radio" => FieldKind::Radio,
            "checkbox" => FieldKind::Checkbox,
            "submit" | "button" => continue,
            _ => FieldKind::Text,
        };
        let mut field = match kind {
            FieldKind::Radio => Field::radio(
                name,
                value.attr("value").unwrap_or_default(),
                following_label(&input).unwrap_or_default().as_str(),
            ),
            FieldKind::Checkbox => {
                Field::checkbox(name, following_label(&input).unwrap_or_default().as_str())
            }
            FieldKind::Text => {
                let mut text = Field::text(name);
                text.value = value.attr("value").unwrap_or_default().to_string();
                text
            }
        };
        field.checked = value.attr("checked").is_some();
        field.group = fieldset_class(&input);
        form.push(field);
    }
    (!form.is_empty()).then_some(form)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARTICLE: &str = r#"
        <article class="content">
            <header>
                <h1><a href="/project/github.com:django/django/">django</a></h1>
                <h2>by <a href="/user/django/">django</a></h2>
                <h3>git hub</h3>
            </header>
            <footer>
                <section><ul class="actions">
                    <li class="action-star selected">
                        <form action="/private/star/"><button title="Unstar">star</button></form>
                    </li>
                    <li class="action-note">
                        <a href="/private/note/edit/">note</a>
                        <blockquote><div>my <em>note</em></div></blockquote>
                    </li>
                </ul></section>
            </footer>
        </article>
        <nav>
            <div class="endless_container">
                <a class="endless_more" rel="results_key other" href="/?page=2&amp;q=django">more</a>
            </div>
        </nav>
    "#;

    #[test]
    fn parses_article_markers() {
        let articles = parse_articles(ARTICLE);
        assert_eq!(articles.len(), 1);
        let a = &articles[0];
        assert_eq!(a.url, "/project/github.com:django/django/");
        assert_eq!(a.name, "django");
        assert_eq!(a.owner.as_deref(), Some("django"));
        assert_eq!(a.backend.as_deref(), Some("github"));
        assert!(a.starred);
        assert_eq!(a.star_title.as_deref(), Some("Unstar"));
        assert_eq!(a.star_url.as_deref(), Some("/private/star/"));
        assert_eq!(a.note_edit_url.as_deref(), Some("/private/note/edit/"));
        assert_eq!(a.note_html.as_deref(), Some("my <em>note</em>"));
    }

    #[test]
    fn parses_more_link() {
        let more = parse_more(ARTICLE).unwrap();
        assert_eq!(more.page, 2);
        assert_eq!(more.querystring_key, "results_key");
        assert_eq!(more.href, "/?page=2&q=django");
    }

    #[test]
    fn nested_articles_are_not_top_level() {
        let html = r#"
            <article class="content">
                <header><h1><a href="/user/bob/">bob</a></h1></header>
                <section class="details"><section class="results">
                    <article class="content">
                        <header><h1><a href="/user/alice/">alice</a></h1></header>
                    </article>
                </section></section>
            </article>
        "#;
        let articles = parse_articles(html);
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].url, "/user/bob/");
    }

    #[test]
    fn parses_detail_tabs_and_embedded_section() {
        let html = r#"
            <section class="details">
                <header><ul>
                    <li rel="followers" class="current"><a href="/user/bob/followers/"><span>Followers</span><sup>12</sup></a></li>
                    <li rel="following"><a href="/user/bob/following/"><span>Following</span></a></li>
                </ul></header>
                <section rel="followers" class="current">
                    <section class="results"></section>
                </section>
            </section>
        "#;
        let detail = parse_detail(html);
        assert_eq!(detail.sections.len(), 2);
        assert_eq!(detail.sections[0].kind, "followers");
        assert_eq!(detail.sections[0].label, "Followers");
        assert_eq!(detail.sections[0].url, "/user/bob/followers/");
        assert!(detail.sections[0].current);
        assert!(!detail.sections[1].current);
        assert_eq!(detail.embedded.len(), 1);
        assert!(detail.embedded[0].current);
    }

    #[test]
    fn parses_filter_form() {
        let html = r#"
            <section rel="followers">
                <section class="search"><form>
                    <fieldset class="search_main">
                        <input type="text" name="q" value="" />
                    </fieldset>
                    <fieldset class="search_order">
                        <input type="radio" name="order" value="" checked />
                        <label>None</label>
                        <input type="radio" name="order" value="name" />
                        <label>name</label>
                    </fieldset>
                </form></section>
            </section>
        "#;
        let form = parse_filter_form(html).unwrap();
        assert_eq!(form.checked_value("order"), Some(""));
        assert_eq!(form.text_value("q"), Some(""));
        assert_eq!(form.serialize(), "q=&order=");
        let order = form
            .fields()
            .iter()
            .find(|f| f.name == "order" && f.value == "name")
            .unwrap();
        assert_eq!(order.label, "name");
        assert_eq!(order.group.as_deref(), Some("search_order"));
    }
}
