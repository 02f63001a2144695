use std::path::PathBuf;

use clap::{Parser, Subcommand};
use lightweave_core::{AppConfig, BlockId, ItemType, Result, Tree};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };

    match cli.command {
        Commands::Catalog { json } => run_catalog(json),
        Commands::Demo => run_demo(config),
    }
}

fn run_catalog(json: bool) -> Result<()> {
    let catalog = lightweave_core::Catalog::standard()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&catalog)?);
        return Ok(());
    }

    for entry in catalog.entries() {
        let max = entry
            .inner_max
            .map_or_else(|| "any".to_string(), |max| max.to_string());
        println!(
            "{} [{}] `{}` children: {} ({}..{})",
            entry.name, entry.item_type, entry.symbol, entry.inner_type, entry.inner_min, max
        );
        for field in &entry.fields {
            println!("    {}: {}", field.name(), field);
        }
    }
    Ok(())
}

/// Builds a small reference system and prints its command stream.
fn run_demo(config: AppConfig) -> Result<()> {
    let mut tree = Tree::new(config.tree, || tracing::trace!("tree changed"))?;
    let root = tree.root();

    let strip = add(&mut tree, root, ItemType::Object)?;
    set_int(&mut tree, strip, "length", 60)?;
    let pulse = add(&mut tree, strip, ItemType::Animation)?;
    set_int(&mut tree, pulse, "duration", 5)?;
    let ease = add(&mut tree, pulse, ItemType::Function)?;
    set_int(&mut tree, ease, "end", 10)?;

    let palette = add(&mut tree, root, ItemType::Object)?;
    if let Some(define_by) = tree.field_named(palette, "defineBy") {
        tree.select(define_by, "c")?;
    }
    if let Some(colors) = tree.field_named(palette, "colors") {
        for hex in ["#ff0000", "#00ff00", "#0000ff"] {
            let element = tree.repeat_add(colors)?;
            tree.set_color(element[0], hex)?;
        }
    }

    let wire = tree.serialize();
    tracing::info!(tokens = wire.split(' ').count(), "compiled demo system");
    println!("{wire}");
    Ok(())
}

fn add(tree: &mut Tree, parent: BlockId, item_type: ItemType) -> Result<BlockId> {
    if !tree.add_by_type(parent, item_type)?.is_applied() {
        return Err(format!("{item_type} could not be added to block {parent}").into());
    }
    tree.block(parent)
        .and_then(|block| block.children().last().copied())
        .ok_or_else(|| format!("block {parent} has no children").into())
}

fn set_int(tree: &mut Tree, block: BlockId, name: &str, value: i64) -> Result<()> {
    let field = tree
        .field_named(block, name)
        .ok_or_else(|| format!("block {block} has no field `{name}`"))?;
    tree.set_int(field, value)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Compose lighting systems into controller commands", long_about = None)]
struct Cli {
    /// JSON configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the node kinds and their field descriptors.
    Catalog {
        /// Print the catalog as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Build a reference lighting system and print its command stream.
    Demo,
}
