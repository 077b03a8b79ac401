//! Client-side navigation engine for the Repos.io directory site: keeps
//! the rendered page, an AJAX response cache, and the browser history
//! mutually consistent while the user searches, opens account and
//! repository details, and pages through endless result lists.

pub mod article;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod forms;
pub mod history;
pub mod markup;
pub mod page;
pub mod search;
pub mod section;
pub mod tags;
pub mod transport;
pub mod types;

pub use article::{Article, ToggleKind};
pub use cache::{compute_url, Fetched, ResponseCache};
pub use config::Config;
pub use engine::{Engine, EntityKey, NavOutcome, Replay, ScrollMetrics, Session};
pub use error::{NavError, Result};
pub use forms::{Field, FieldKind, Form, UnserializeOptions};
pub use history::{BrowserHistory, HistoryEntry, HistoryStep};
pub use page::{ArticleNode, Document, NodeId, Slot};
pub use search::SearchPane;
pub use section::Section;
pub use tags::{TagAct, TagKind};
pub use transport::{Http, Transport};
pub use types::{ArticleKind, LoginData, Notice, Tag, UserTags};
