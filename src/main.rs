use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;
use vdi_tree::render::{self, TextStyle};

/// Reconstruct the disk/snapshot hierarchy of a virtual machine from its VDI files.
///
/// Use --detail to inspect the headers, or --xml to generate the MediaRegistry section of a lost
/// VirtualBox.xml.
#[derive(Parser, Debug)]
#[command(name = "vdi-tree", version, about)]
struct Cli {
    /// Print detailed VDI header info
    #[arg(long)]
    detail: bool,

    /// Print XML to use in the VirtualBox.xml file
    #[arg(long, conflicts_with = "detail")]
    xml: bool,

    /// More logging (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// VDI images to inspect
    files: Vec<PathBuf>,
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if cli.files.is_empty() {
        Cli::command().print_help()?;
        std::process::exit(1);
    }
    init_logging(cli.verbose);

    let entries = vdi_tree::scan(&cli.files);
    let images = vdi_tree::accepted(&entries);
    if images.is_empty() {
        tracing::error!("no usable VDI images among {} file(s)", entries.len());
        std::process::exit(1);
    }
    tracing::info!("{} of {} file(s) accepted", images.len(), entries.len());

    let forest = vdi_tree::build_forest(images).context("Failed to reconstruct the image tree")?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if cli.xml {
        render::write_xml(&mut out, &forest)?;
    } else {
        let style = if cli.detail {
            TextStyle::Detailed
        } else {
            TextStyle::Compact
        };
        render::write_text(&mut out, &forest, style)?;
    }
    out.flush()?;

    Ok(())
}
