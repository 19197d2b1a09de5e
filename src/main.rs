//! blotter - a file-backed blog engine.

use anyhow::{Result, bail};
use blotter::{
    cli::{Cli, Commands},
    config::{SiteConfig, cfg, init_config},
    content::Draft,
    dispatch::Dispatcher,
    log,
    serve::serve_blog,
};
use chrono::Local;
use clap::Parser;

fn main() -> Result<()> {
    let cli: &'static Cli = Box::leak(Box::new(Cli::parse()));
    init_config(SiteConfig::load(cli)?);

    match &cli.command {
        Commands::Serve { .. } => serve_blog(),
        Commands::Check => check(),
        Commands::New {
            title,
            category,
            kind,
        } => new_post(title, category.as_deref(), kind),
    }
}

/// Load every document once and report what the blog holds.
fn check() -> Result<()> {
    let c = cfg();
    let dispatcher = Dispatcher::from_config(&c)?;
    let store = dispatcher.store();
    let outcome = store.reload()?;

    let kinds = store
        .kinds()
        .iter()
        .map(|(kind, count)| format!("{count} {kind}"))
        .collect::<Vec<_>>()
        .join(", ");
    log!("check"; "{} documents ({kinds}) in {:?}", outcome.documents, outcome.elapsed);
    log!(
        "check";
        "{} posts, {} pages, {} categories, {} archive months",
        store.posts().len(),
        store.pages().len(),
        store.categories().len(),
        store.archives().len()
    );

    let layout = &c.templates.layout;
    if !dispatcher.templates().exists(layout) {
        bail!("layout template `{layout}` not found");
    }
    dispatcher.templates().handle(layout)?;
    log!("check"; "layout `{layout}` compiles");
    Ok(())
}

/// Write a new post dated today into the first content directory.
fn new_post(title: &str, category: Option<&str>, kind: &str) -> Result<()> {
    let c = cfg();
    let Some(dir) = c.content.dirs.first() else {
        bail!("[content.dirs] is empty");
    };

    let dispatcher = Dispatcher::from_config(&c)?;
    let store = dispatcher.store();
    store.reload()?;

    let doc = store.create(&Draft {
        dir: dir.clone(),
        title: title.to_owned(),
        date: Some(Local::now().date_naive()),
        category: category.map(str::to_owned),
        tags: Vec::new(),
        kind: kind.to_owned(),
        body: String::new(),
    })?;
    log!("new"; "{} -> /{}", doc.source().display(), doc.path());
    Ok(())
}
