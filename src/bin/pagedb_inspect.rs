use std::path::PathBuf;
use std::process;

use clap::{Parser, ValueEnum};
use pagedb::error::Result;
use pagedb::storage::mem_store::{FileHeader, MemPageStore};
use pagedb::{Node, PageId, PageStore};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

const EXIT_OK: i32 = 0;
const EXIT_FATAL_ERROR: i32 = 20;

#[derive(Clone, Debug, ValueEnum)]
enum OutputFormatArg {
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "pagedb-inspect", about = "Dump the nodes stored in a pagedb page file")]
struct Cli {
    /// Path to the page file
    path: PathBuf,

    /// Only dump this page number
    #[arg(long, value_name = "N")]
    page: Option<PageId>,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormatArg,
}

/// Printable ASCII as-is, anything else as hex.
fn render(bytes: &[u8]) -> String {
    if bytes.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
        String::from_utf8_lossy(bytes).into_owned()
    } else {
        let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
        format!("0x{}", hex)
    }
}

fn node_type_str(node: &Node) -> String {
    match node.node_type() {
        Ok(t) => format!("{:?}", t).to_lowercase(),
        Err(e) => format!("invalid ({})", e),
    }
}

fn node_json(page_id: PageId, node: &Node) -> Result<Value> {
    let mut entries = Vec::new();
    for entry in node.entries() {
        let entry = entry?;
        entries.push(json!({
            "pointer": entry.pointer,
            "key": render(entry.key),
            "value": render(entry.value),
        }));
    }
    Ok(json!({
        "page": page_id,
        "type": node_type_str(node),
        "nkeys": node.nkeys(),
        "size": node.total_size(),
        "entries": entries,
    }))
}

fn print_node_text(page_id: PageId, node: &Node) -> Result<()> {
    println!(
        "page {}: {} node, {} keys, {} bytes",
        page_id,
        node_type_str(node),
        node.nkeys(),
        node.total_size()
    );
    for (i, entry) in node.entries().enumerate() {
        let entry = entry?;
        if entry.pointer != 0 {
            println!(
                "  [{}] key={} -> page {}",
                i,
                render(entry.key),
                entry.pointer
            );
        } else {
            println!(
                "  [{}] key={} val={}",
                i,
                render(entry.key),
                render(entry.value)
            );
        }
    }
    Ok(())
}

fn run(cli: &Cli) -> Result<()> {
    let bytes = std::fs::read(&cli.path)?;
    let header = FileHeader::decode(&bytes)?;
    let (mut store, root) = MemPageStore::decode(&bytes)?;

    let page_ids = match cli.page {
        Some(id) => vec![id],
        None => store.page_ids(),
    };

    match cli.format {
        OutputFormatArg::Text => {
            println!(
                "{}: version {}, {} page slots, root {}, {} free",
                cli.path.display(),
                header.version,
                header.page_count,
                root,
                header.free_count
            );
            for id in page_ids {
                let node = store.get(id)?;
                print_node_text(id, &node)?;
            }
        }
        OutputFormatArg::Json => {
            let mut pages = Vec::new();
            for id in page_ids {
                let node = store.get(id)?;
                pages.push(node_json(id, &node)?);
            }
            let report = json!({
                "path": cli.path.display().to_string(),
                "version": header.version,
                "page_count": header.page_count,
                "root": root,
                "free_count": header.free_count,
                "pages": pages,
            });
            println!("{}", report);
        }
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => process::exit(EXIT_OK),
        Err(e) => {
            eprintln!("ERROR: {}", e);
            process::exit(EXIT_FATAL_ERROR);
        }
    }
}
