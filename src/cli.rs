use clap::{ArgAction, Parser, Subcommand};
use exn::{Exn, OptionExt, ResultExt};
use quire_cache::ContentStore;
use quire_config::Config;
use quire_graph::{GraphCatalog, GraphClient, provider_from_env};
use quire_remote::{AuthProvider, Credential, NodeRef, RemoteCatalog};
use quire_sync::{SyncEvent, SyncReport, Syncer, display_name};
use std::path::{Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Mirror OneNote notebooks from SharePoint into a local Markdown tree.
#[derive(Parser, Debug)]
#[command(name = "quire", version, about)]
pub struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long, global = true, env = "QUIRE_CONFIG")]
    pub config: Option<PathBuf>,

    /// File holding the MICROSOFT_* credentials (overrides the configuration)
    #[arg(long, global = true)]
    pub env: Option<PathBuf>,

    /// Log more; repeat for even more
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Search SharePoint sites by name
    ListSites { search: String },
    /// List the notebooks of a site
    ListNotebooks {
        #[arg(long)]
        site_id: String,
    },
    /// List the sections of a notebook
    ListSections {
        #[arg(long)]
        site_id: String,
        #[arg(long)]
        notebook_id: String,
    },
    /// List the pages of a section, or of the whole site
    ListPages {
        #[arg(long)]
        site_id: String,
        #[arg(long)]
        section_id: Option<String>,
    },
    /// Print one page as Markdown
    Fetch {
        #[arg(long)]
        site_id: String,
        #[arg(long)]
        page_id: String,
        /// Ignore the cached copy
        #[arg(long)]
        refresh: bool,
    },
    /// Sync every notebook of the first site matching a search
    Sync {
        #[arg(long)]
        site_search: String,
        /// Only sync this notebook
        #[arg(long)]
        notebook_id: Option<String>,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Ignore cached copies
        #[arg(long)]
        refresh: bool,
    },
    /// Sync one section, flat into the output directory
    SyncSection {
        #[arg(long)]
        site_id: String,
        #[arg(long)]
        section_id: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Ignore cached copies
        #[arg(long)]
        refresh: bool,
    },
}

fn remote<T>(result: quire_remote::error::Result<T>) -> Result<T> {
    let fatal = result.as_ref().is_err_and(|e| e.is_fatal());
    result.or_raise(|| if fatal { ErrorKind::Auth } else { ErrorKind::Remote })
}

struct Context {
    config: Config,
    client: GraphClient,
    auth: Box<dyn AuthProvider>,
}

impl Context {
    fn load(config: Option<&Path>, env_file: Option<&Path>) -> Result<Self> {
        let mut config = Config::load(config).or_raise(|| ErrorKind::Config)?;
        if let Some(env_file) = env_file {
            config.auth.env_file = env_file.to_path_buf();
        }
        let graph = &config.graph;
        let client = GraphClient::new(&graph.base_url, graph.list_timeout(), graph.content_timeout())
            .or_raise(|| ErrorKind::Remote)?;
        let auth = provider_from_env(&config.auth.env_file, config.auth.scopes.clone()).or_raise(|| ErrorKind::Auth)?;
        Ok(Self { config, client, auth })
    }

    async fn credential(&self) -> Result<Credential> {
        self.auth.credential().await.or_raise(|| ErrorKind::Auth)
    }

    fn syncer(self, site_id: &str, output: Option<PathBuf>, refresh: bool) -> Syncer<GraphCatalog, Box<dyn AuthProvider>> {
        let store = ContentStore::new(&self.config.cache_dir);
        let output = output.unwrap_or(self.config.output_dir);
        Syncer::new(self.client.site(site_id), self.auth, store, output).with_refresh(refresh)
    }
}

/// The top-level message followed by the innermost cause, if there is one.
fn describe<E: std::error::Error + Send + Sync + 'static>(error: &Exn<E>) -> String {
    let mut frame = error.frame();
    while let Some(child) = frame.children().first() {
        frame = child;
    }
    if std::ptr::eq(frame, error.frame()) {
        (**error).to_string()
    } else {
        format!("{}: {}", **error, frame.error())
    }
}

fn print_progress(event: &SyncEvent<'_>) {
    match event {
        SyncEvent::Collection(node) => println!("Notebook: {}", node.display_name),
        SyncEvent::SubCollection(node) => println!("  Section: {}", node.display_name),
        SyncEvent::ItemStarted { item, index, total } => {
            println!("    [{}/{total}] {}", index + 1, display_name(item.title.as_deref(), &item.item_id));
        },
        SyncEvent::ItemSynced { path, from_cache, .. } => {
            let note = if *from_cache { " (cached)" } else { "" };
            println!("      -> {}{note}", path.display());
        },
        SyncEvent::ItemFailed { error, .. } => println!("      failed: {}", describe(*error)),
        SyncEvent::ListingFailed { node, error } => println!("  Skipped {}: {}", node.display_name, describe(*error)),
    }
}

fn print_summary(report: &SyncReport) {
    println!();
    println!(
        "{} page(s) written ({} from cache), {} failed",
        report.succeeded.len(),
        report.from_cache,
        report.failed.len()
    );
    for failure in &report.failed {
        let name = display_name(failure.item.title.as_deref(), &failure.item.item_id);
        println!("  page {name} ({}): {}", failure.item.item_id, describe(&failure.error));
    }
    for failure in &report.failed_listings {
        println!("  listing {} ({}): {}", failure.node.display_name, failure.node.id, describe(&failure.error));
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    let ctx = Context::load(cli.config.as_deref(), cli.env.as_deref())?;

    match cli.command {
        Command::ListSites { search } => {
            let credential = ctx.credential().await?;
            for site in remote(ctx.client.search_sites(&credential, &search).await)? {
                println!("{}\t{}\t{}", site.id, site.label(), site.web_url.as_deref().unwrap_or_default());
            }
        },
        Command::ListNotebooks { site_id } => {
            let credential = ctx.credential().await?;
            let catalog = ctx.client.site(&site_id);
            let root = NodeRef::new(&site_id, &site_id);
            for notebook in remote(catalog.list_collections(&credential, &root).await)? {
                println!("{}\t{}", notebook.id, notebook.display_name);
            }
        },
        Command::ListSections { site_id, notebook_id } => {
            let credential = ctx.credential().await?;
            let catalog = ctx.client.site(&site_id);
            let notebook = NodeRef::new(&notebook_id, &notebook_id);
            for section in remote(catalog.list_sub_collections(&credential, &notebook).await)? {
                println!("{}\t{}", section.id, section.display_name);
            }
        },
        Command::ListPages { site_id, section_id } => {
            let credential = ctx.credential().await?;
            let catalog = ctx.client.site(&site_id);
            let pages = match section_id {
                Some(id) => catalog.list_items(&credential, &NodeRef::new(&id, &id)).await,
                None => catalog.list_all_items(&credential).await,
            };
            for page in remote(pages)? {
                println!(
                    "{}\t{}\t{}",
                    page.item_id,
                    display_name(page.title.as_deref(), &page.item_id),
                    page.last_modified.as_deref().unwrap_or_default()
                );
            }
        },
        Command::Fetch {
            site_id,
            page_id,
            refresh,
        } => {
            let credential = ctx.credential().await?;
            let syncer = ctx.syncer(&site_id, None, refresh);
            let page = remote(syncer.catalog().get_item(&credential, &page_id).await)?;
            let document = syncer.fetch_rendered(&page).await.or_raise(|| ErrorKind::Sync)?;
            println!("{document}");
        },
        Command::Sync {
            site_search,
            notebook_id,
            output,
            refresh,
        } => {
            let credential = ctx.credential().await?;
            let sites = remote(ctx.client.search_sites(&credential, &site_search).await)?;
            let site = sites.first().ok_or_raise(|| ErrorKind::NoSite(site_search.clone()))?;
            println!("Site: {} ({})", site.label(), site.id);

            let root = site.to_node();
            let syncer = ctx.syncer(&site.id, output, refresh).with_observer(print_progress);
            let report = match notebook_id {
                Some(id) => {
                    let notebooks = remote(syncer.catalog().list_collections(&credential, &root).await)?;
                    let notebook = notebooks
                        .into_iter()
                        .find(|notebook| notebook.id == id)
                        .ok_or_raise(|| ErrorKind::NoNotebook(id.clone()))?;
                    syncer.sync_collection(&notebook).await
                },
                None => syncer.sync_root(&root).await,
            };
            print_summary(&report.or_raise(|| ErrorKind::Sync)?);
        },
        Command::SyncSection {
            site_id,
            section_id,
            output,
            refresh,
        } => {
            let syncer = ctx.syncer(&site_id, output, refresh).with_observer(print_progress);
            let section = NodeRef::new(&section_id, &section_id);
            let report = syncer.sync_sub_collection(&section).await.or_raise(|| ErrorKind::Sync)?;
            print_summary(&report);
        },
    }
    Ok(())
}
