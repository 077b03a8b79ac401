use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use reposio::{
    Config, Engine, HistoryStep, Http, NavOutcome, Notice, ScrollMetrics, Slot, Transport,
};

#[derive(Parser)]
#[command(name = "reposio", about = "Browse the Repos.io directory from the terminal")]
struct Cli {
    /// Base URL of the site.
    #[arg(long)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Search accounts or repositories.
    Search {
        /// Search query.
        query: String,
        /// What to search: "people" or "repositories".
        #[arg(long, default_value = "repositories")]
        kind: String,
        /// Filter value (e.g. "tag:starred", "noted").
        #[arg(long)]
        filter: Option<String>,
        /// Result ordering.
        #[arg(long)]
        order: Option<String>,
        /// Open this result's detail pane after searching.
        #[arg(long)]
        open: Option<String>,
        /// With --open, also load this detail section.
        #[arg(long)]
        section: Option<String>,
        /// Load this many extra result pages.
        #[arg(long, default_value_t = 0)]
        pages: u32,
    },
    /// Open an account or repository detail page directly.
    Open {
        /// Site path of the entity, e.g. "/user/bob/" or "/bob/repo/".
        url: String,
        /// Also load this detail section.
        #[arg(long)]
        section: Option<String>,
    },
    /// Replay a recorded navigation state against a fresh page.
    Replay {
        /// Location to navigate to.
        url: String,
        /// JSON step chain, as recorded in a history entry.
        #[arg(long)]
        state: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let mut config = Config::load();
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url;
    }

    let transport = Arc::new(Http::new(config.base_url.clone())?);
    let mut engine = Engine::new(
        config,
        transport.clone(),
        "/",
        Some(reposio::search::default_form()),
    );

    match cli.command {
        Command::Search {
            query,
            kind,
            filter,
            order,
            open,
            section,
            pages,
        } => {
            engine.search.form.set_text("q", &query);
            engine.search.form.check("type", &kind);
            if let Some(filter) = filter {
                engine.search.form.check("filter", &filter);
            }
            if let Some(order) = order {
                engine.search.form.check("order", &order);
            }
            engine.submit_search().await?;
            print_results(&engine, &Slot::Results);

            for _ in 0..pages {
                // drive the endless scroll by pretending we reached the bottom
                let loaded = engine
                    .on_scroll(ScrollMetrics {
                        doc_height: 1,
                        win_height: 1,
                        scroll_top: 0,
                    })
                    .await?;
                if !loaded {
                    break;
                }
                print_results(&engine, &Slot::Results);
            }

            if let Some(url) = open {
                let Some(node_id) = engine.doc.find_in_slot(&Slot::Results, &url) else {
                    eprintln!("no such result: {url}");
                    std::process::exit(1);
                };
                engine.click_article(node_id).await?;
                print_detail(&engine, &url);

                if let Some(kind) = section {
                    engine.load_section(&url, &kind).await?;
                    print_results(
                        &engine,
                        &Slot::Section {
                            article: url.clone(),
                            kind,
                        },
                    );
                }
            }
        }
        Command::Open { url, section } => {
            let page = transport.get(&url, None).await?;
            engine.prepare_article_existing(&page);
            if engine.article(&url).is_none() {
                eprintln!("no article markup at {url}");
                std::process::exit(1);
            }
            print_detail(&engine, &url);
            if let Some(kind) = section {
                engine.load_section(&url, &kind).await?;
                print_results(
                    &engine,
                    &Slot::Section {
                        article: url.clone(),
                        kind,
                    },
                );
            }
        }
        Command::Replay { url, state } => {
            let state = match state {
                Some(json) => {
                    let steps: Vec<HistoryStep> = serde_json::from_str(&json)?;
                    Some((steps, url.clone()))
                }
                None => None,
            };
            match engine.on_state_change(&url, state).await {
                NavOutcome::Stay => print_results(&engine, &Slot::Results),
                NavOutcome::Reload => println!("state not replayable, full reload needed"),
            }
        }
    }

    println!();
    println!("{}", engine.doc.title);
    for Notice { text, is_error } in engine.take_notices() {
        if is_error {
            eprintln!("error: {text}");
        } else {
            eprintln!("{text}");
        }
    }
    Ok(())
}

fn print_results(engine: &Engine, slot: &Slot) {
    for id in engine.doc.in_slot(slot) {
        let Some(node) = engine.doc.node(id) else {
            continue;
        };
        let owner = node
            .owner
            .as_deref()
            .map(|o| format!("{o}/"))
            .unwrap_or_default();
        let backend = node.backend.as_deref().unwrap_or("");
        println!("{}{}  [{}]  {}", owner, node.name, backend, node.url);
    }
    if engine.doc.more_for(slot).is_some() {
        println!("...more available");
    }
}

fn print_detail(engine: &Engine, url: &str) {
    let Some(article) = engine.article(url) else {
        return;
    };
    let mut kinds: Vec<&String> = article.sections.keys().collect();
    kinds.sort();
    println!("sections of {url}:");
    for kind in kinds {
        println!("  {kind}");
    }
}
