//! content-sync - operator tool for cached page content
//!
//! Reads content blocks and change-markers from the document store through
//! the same cache the site uses.

use anyhow::{anyhow, Context, Result};
use std::env;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use content_sync::{
    collection_fetcher, document_fetcher, ChangeMarkerFeed, ContentBlock, ContentSynchronizer,
    DocumentStore, KeyValueStorage, Settings,
};

/// CLI command
#[derive(Debug, PartialEq)]
enum Command {
    /// Load one document through the cache
    Get {
        collection: String,
        document: String,
        content_key: String,
    },
    /// List every document in a collection
    List { collection: String },
    /// Show a page's change-markers
    Markers { page: String },
    /// Remove a cached entry
    Clear { content_key: String },
    /// Show help
    Help,
}

fn print_help() {
    eprintln!(
        r#"content-sync - Inspect cached page content

USAGE:
    content-sync get <collection> <document> [content_key]
    content-sync list <collection>
    content-sync markers <page>
    content-sync clear <content_key>
    content-sync help

COMMANDS:
    get      Load a document through the local cache and print it as JSON
    list     Print every document in a collection
    markers  Print the change-markers under <page>/meta/changes
    clear    Drop a cached entry so the next load refetches it
    help     Show this help message

EXAMPLES:
    content-sync get home hero heroContent
    content-sync list blog
    content-sync markers home

ENVIRONMENT:
    CONTENT_SYNC_CONFIG              Path to a TOML config file
    CONTENT_SYNC_STORE__PROJECT_ID   Document store project
    CONTENT_SYNC_STORE__API_KEY      Document store API key
    CONTENT_SYNC_CACHE__TTL_SECS     Cache time-to-live (default 1800)
    RUST_LOG                         Log filter (trace, debug, info, warn, error)
"#
    );
}

fn parse_args(args: &[String]) -> Result<Command> {
    let Some(command) = args.get(1) else {
        return Ok(Command::Help);
    };

    match command.as_str() {
        "get" => {
            if args.len() < 4 {
                return Err(anyhow!(
                    "Usage: content-sync get <collection> <document> [content_key]"
                ));
            }
            let collection = args[2].clone();
            let document = args[3].clone();
            let content_key = args
                .get(4)
                .cloned()
                .unwrap_or_else(|| format!("{}/{}", collection, document));
            Ok(Command::Get {
                collection,
                document,
                content_key,
            })
        }
        "list" => match args.get(2) {
            Some(collection) => Ok(Command::List {
                collection: collection.clone(),
            }),
            None => Err(anyhow!("Usage: content-sync list <collection>")),
        },
        "markers" => match args.get(2) {
            Some(page) => Ok(Command::Markers { page: page.clone() }),
            None => Err(anyhow!("Usage: content-sync markers <page>")),
        },
        "clear" => match args.get(2) {
            Some(key) => Ok(Command::Clear {
                content_key: key.clone(),
            }),
            None => Err(anyhow!("Usage: content-sync clear <content_key>")),
        },
        "help" | "--help" | "-h" => Ok(Command::Help),
        other => Err(anyhow!("Unknown command: {}", other)),
    }
}

/// Page owning a collection path: its first segment
fn page_of(collection: &str) -> &str {
    collection
        .split('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or(collection)
}

fn print_json(block: ContentBlock) -> Result<()> {
    let rendered = serde_json::to_string_pretty(&serde_json::Value::Object(block))
        .context("Failed to render content")?;
    println!("{}", rendered);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging; stdout is reserved for content
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    let command = match parse_args(&args) {
        Ok(cmd) => cmd,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            std::process::exit(1);
        }
    };

    if command == Command::Help {
        print_help();
        return Ok(());
    }

    let settings = Settings::load().context("Failed to load configuration")?;
    let storage: Arc<dyn KeyValueStorage> =
        Arc::new(settings.storage().context("Failed to open cache storage")?);

    if let Command::Clear { content_key } = &command {
        storage
            .remove(content_key)
            .with_context(|| format!("Failed to clear '{}'", content_key))?;
        info!(key = %content_key, "Cleared cached content");
        return Ok(());
    }

    let store: Arc<dyn DocumentStore> = Arc::new(
        settings
            .store_client()
            .context("Failed to create document store client")?,
    );

    match command {
        Command::Get {
            collection,
            document,
            content_key,
        } => {
            let feed = ChangeMarkerFeed::new(Arc::clone(&store), page_of(&collection));
            let sync = ContentSynchronizer::builder(feed, storage)
                .settings(settings.sync_settings())
                .build();

            let fetch = document_fetcher(Arc::clone(&store), collection, document);
            let content = sync.load_content(&content_key, fetch, &ContentBlock::new()).await;

            // Let a background refresh finish so the next run sees it
            sync.settle().await;
            sync.log_metrics();

            if content.is_empty() {
                return Err(anyhow!("No content available for '{}'", content_key));
            }
            print_json(content)?;
        }
        Command::List { collection } => {
            let fetch = collection_fetcher(store, collection.clone());
            let block = fetch()
                .await
                .with_context(|| format!("Failed to list '{}'", collection))?;
            print_json(block)?;
        }
        Command::Markers { page } => {
            let feed = ChangeMarkerFeed::new(store, page);
            let markers = feed
                .markers()
                .await
                .with_context(|| format!("Failed to read {}", feed.collection()))?;
            if markers.is_empty() {
                println!("No change-markers under {}.", feed.collection());
            } else {
                for marker in markers {
                    let when = chrono::DateTime::from_timestamp_millis(marker.timestamp_millis)
                        .map(|dt| dt.to_rfc3339())
                        .unwrap_or_else(|| marker.timestamp_millis.to_string());
                    println!("  {:<24} {}", marker.section, when);
                }
            }
        }
        Command::Clear { .. } | Command::Help => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("content-sync")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_parse_get_with_default_key() {
        assert_eq!(
            parse_args(&args(&["get", "home", "hero"])).unwrap(),
            Command::Get {
                collection: "home".to_string(),
                document: "hero".to_string(),
                content_key: "home/hero".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_get_with_explicit_key() {
        assert_eq!(
            parse_args(&args(&["get", "home", "hero", "heroContent"])).unwrap(),
            Command::Get {
                collection: "home".to_string(),
                document: "hero".to_string(),
                content_key: "heroContent".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_errors_and_help() {
        assert!(parse_args(&args(&["get", "home"])).is_err());
        assert!(parse_args(&args(&["markers"])).is_err());
        assert!(parse_args(&args(&["frobnicate"])).is_err());
        assert_eq!(parse_args(&args(&[])).unwrap(), Command::Help);
        assert_eq!(parse_args(&args(&["-h"])).unwrap(), Command::Help);
    }

    #[test]
    fn test_page_of_collection() {
        assert_eq!(page_of("home"), "home");
        assert_eq!(page_of("about/team/members"), "about");
        assert_eq!(page_of("/blog"), "blog");
    }
}
