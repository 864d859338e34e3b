//! Command line front end: hand-parsed flags, one subcommand per store operation.

pub mod outputformatter;

use std::io::Write;
use std::path::PathBuf;

use tracing::{error, info};

use crate::config::DocvaultConfig;
use crate::error::{DmsError, DmsResult};
use crate::store::{DocumentStore, StoreOptions, VersionRef};

pub fn print_usage(program: &str) {
    eprintln!(
        "Usage:\n  {program} [flags] <command> [argument]\n\nCommands:\n  upload <file>            store a local file as the next version of its file name\n  download <name>          write a version to --dir as v<N>.<name>\n  update <file>            overwrite a version (latest unless --version) with a local file\n  delete <name>            delete a version (latest unless --version)\n  meta <name>              show stored metadata of a version\n  content <name>           write content kept in the table to stdout\n  versions <name>          list stored versions\n  latest <name>            print the highest stored version number\n  list                     list every row key\n  delete-versions <name>   delete every version of a document\n  delete-all               delete every version of every document\n  search <text>            free-text search\n  help                     show this help\n\nFlags:\n  --config <path>          JSON config file (default: $DOCVAULT_CONFIG, else built-in defaults)\n  --debug                  report every operation; failures at warn level\n  --version <N>            target version for download/update/delete/meta/content\n  --dir <path>             download directory (default: current directory)\n  --json                   print results as JSON instead of tables\n  -h, --help               show this help"
    );
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Upload(PathBuf),
    Download(String),
    Update(PathBuf),
    Delete(String),
    Meta(String),
    Content(String),
    Versions(String),
    Latest(String),
    List,
    DeleteVersions(String),
    DeleteAll,
    Search(String),
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub config: Option<PathBuf>,
    pub debug: bool,
    pub version: Option<u64>,
    pub dir: PathBuf,
    pub json: bool,
    pub command: Command,
}

/// Parse everything after the program name.
pub fn parse_args(args: &[String]) -> Result<Invocation, String> {
    let mut config = None;
    let mut debug = false;
    let mut version = None;
    let mut dir = PathBuf::from(".");
    let mut json = false;
    let mut positional: Vec<String> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                if i + 1 >= args.len() { return Err("--config requires a path".into()); }
                config = Some(PathBuf::from(&args[i + 1]));
                i += 2;
            }
            "--version" => {
                if i + 1 >= args.len() { return Err("--version requires a number".into()); }
                let n: u64 = args[i + 1]
                    .parse()
                    .map_err(|_| format!("--version expects a positive integer, got '{}'", args[i + 1]))?;
                if n == 0 { return Err("--version must be at least 1".into()); }
                version = Some(n);
                i += 2;
            }
            "--dir" => {
                if i + 1 >= args.len() { return Err("--dir requires a path".into()); }
                dir = PathBuf::from(&args[i + 1]);
                i += 2;
            }
            "--debug" => { debug = true; i += 1; }
            "--json" => { json = true; i += 1; }
            "-h" | "--help" => { positional = vec!["help".into()]; break; }
            flag if flag.starts_with("--") => return Err(format!("unknown flag '{}'", flag)),
            other => { positional.push(other.to_string()); i += 1; }
        }
    }

    let mut pos = positional.into_iter();
    let cmd = pos.next().unwrap_or_else(|| "help".to_string());
    let arg = pos.next();
    if let Some(extra) = pos.next() {
        return Err(format!("unexpected argument '{}'", extra));
    }
    let need = |what: &str| arg.clone().ok_or_else(|| format!("'{}' requires {}", cmd, what));
    let command = match cmd.as_str() {
        "upload" => Command::Upload(PathBuf::from(need("a file path")?)),
        "download" => Command::Download(need("a document name")?),
        "update" => Command::Update(PathBuf::from(need("a file path")?)),
        "delete" => Command::Delete(need("a document name")?),
        "meta" => Command::Meta(need("a document name")?),
        "content" => Command::Content(need("a document name")?),
        "versions" => Command::Versions(need("a document name")?),
        "latest" => Command::Latest(need("a document name")?),
        "list" => Command::List,
        "delete-versions" => Command::DeleteVersions(need("a document name")?),
        "delete-all" => Command::DeleteAll,
        "search" => Command::Search(need("search text")?),
        "help" => Command::Help,
        other => return Err(format!("unknown command '{}'", other)),
    };
    if arg.is_some() && matches!(command, Command::List | Command::DeleteAll | Command::Help) {
        return Err(format!("'{}' takes no argument", cmd));
    }
    Ok(Invocation { config, debug, version, dir, json, command })
}

fn print_json<T: serde::Serialize>(v: &T) -> DmsResult<()> {
    println!("{}", serde_json::to_string_pretty(v)?);
    Ok(())
}

/// Run one parsed command against `store`.
pub async fn execute(store: &DocumentStore, inv: &Invocation) -> DmsResult<()> {
    use outputformatter::*;
    let vref = VersionRef::from(inv.version);
    match &inv.command {
        Command::Help => print_usage("docvault"),
        Command::Upload(path) => {
            let v = store.store_file(path).await?;
            if inv.json { print_json(&v)?; } else { print_stored("upload", &v); }
        }
        Command::Update(path) => {
            let v = store.replace_file(path, vref).await?;
            if inv.json { print_json(&v)?; } else { print_stored("update", &v); }
        }
        Command::Download(name) => {
            let written = store.retrieve_to(name, vref, &inv.dir).await?;
            if inv.json {
                print_json(&serde_json::json!({ "path": written.display().to_string() }))?;
            } else {
                println!("{}", written.display());
            }
        }
        Command::Delete(name) => {
            let key = store.remove(name, vref).await?;
            if inv.json { print_json(&serde_json::json!({ "removed": [key] }))?; } else { println!("removed {}", key); }
        }
        Command::Meta(name) => {
            let meta = store.describe(name, vref).await?;
            if inv.json {
                print_json(&meta)?;
            } else {
                let label = match inv.version {
                    Some(v) => format!("v{}.{}", v, name),
                    None => format!("latest {}", name),
                };
                print_metadata(&label, &meta);
            }
        }
        Command::Content(name) => {
            let bytes = store.content_from_table(name, vref).await?;
            let mut out = std::io::stdout().lock();
            out.write_all(&bytes)?;
            out.flush()?;
        }
        Command::Versions(name) => {
            let list = store.list_versions(name).await?;
            if inv.json { print_json(&list)?; } else { print_versions(&list); }
        }
        Command::Latest(name) => {
            let v = store.latest_version(name).await?;
            if inv.json { print_json(&serde_json::json!({ "name": name, "latest": v }))?; } else { println!("{}", v); }
        }
        Command::List => {
            let keys = store.list_all().await?;
            if inv.json { print_json(&keys)?; } else { print_keys(&keys); }
        }
        Command::DeleteVersions(name) => {
            let removed = store.remove_all_versions(name).await?;
            if inv.json {
                print_json(&serde_json::json!({ "name": name, "removed": removed }))?;
            } else {
                println!("removed {} version(s) of '{}'", removed.len(), name);
            }
        }
        Command::DeleteAll => {
            let removed = store.remove_all().await?;
            if inv.json { print_json(&serde_json::json!({ "removed": removed }))?; } else { println!("removed {} row(s)", removed.len()); }
        }
        Command::Search(text) => match store.search(text).await? {
            Some(resp) => {
                if inv.json { print_json(&resp)?; } else { print_search(&resp); }
            }
            None => {
                if inv.json { print_json(&serde_json::json!({ "count": 0, "docs": [] }))?; } else { println!("not found"); }
            }
        },
    }
    Ok(())
}

fn load_config(inv: &Invocation) -> anyhow::Result<DocvaultConfig> {
    let mut cfg = DocvaultConfig::load(inv.config.as_deref())?;
    if inv.debug { cfg.debug = true; }
    Ok(cfg)
}

/// Entry point for the binary. Returns the process exit code.
pub async fn run(args: Vec<String>) -> i32 {
    let program = args.first().cloned().unwrap_or_else(|| "docvault".to_string());
    let inv = match parse_args(args.get(1..).unwrap_or(&[])) {
        Ok(inv) => inv,
        Err(msg) => {
            eprintln!("{}", msg);
            print_usage(&program);
            return 2;
        }
    };
    if inv.command == Command::Help {
        print_usage(&program);
        return 0;
    }

    let cfg = match load_config(&inv) {
        Ok(c) => c,
        Err(e) => {
            error!(target: "docvault::cli", "configuration error: {:#}", e);
            return 2;
        }
    };
    info!(
        target: "docvault::cli",
        "docvault: table={} at {}, blob root={} at {}, search={}, placement={:?}",
        cfg.table.table,
        cfg.table.url,
        cfg.blob.root_path,
        cfg.blob.url,
        cfg.search.as_ref().map(|s| s.url.as_str()).unwrap_or("<none>"),
        cfg.content_placement
    );
    let backends = match cfg.connect() {
        Ok(b) => b,
        Err(e) => {
            error!(target: "docvault::cli", "cannot build clients: {:#}", e);
            return 2;
        }
    };
    let result = async {
        let store = DocumentStore::open(backends, StoreOptions::from(&cfg)).await?;
        execute(&store, &inv).await
    }
    .await;
    match result {
        Ok(()) => 0,
        Err(e) => report_failure(&e),
    }
}

fn report_failure(e: &DmsError) -> i32 {
    eprintln!("error: {}", e);
    if e.is_retryable() {
        eprintln!("(the backend may be temporarily unavailable; retrying can help)");
    }
    e.exit_code()
}
