use crate::builder::{FormBuilder, LoadOptions, NoopHooks};
use crate::config::load_config;
use crate::guard::FixedMeasure;
use crate::structure::PageData;
use anyhow::Result;
use clap::Parser;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(
    name = "formtree",
    version,
    about = "Normalize and validate saved form structures"
)]
pub struct Args {
    /// Input structure (.json) or '-' for stdin
    #[arg(short = 'i', long = "input")]
    pub input: Option<PathBuf>,

    /// Output file. Defaults to stdout if omitted.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Config JSON file (gap percentage, guard tolerances)
    #[arg(short = 'c', long = "configFile")]
    pub config: Option<PathBuf>,

    /// Validate and print a summary instead of emitting the structure
    #[arg(long = "check")]
    pub check: bool,

    /// Pretty-print the emitted JSON
    #[arg(long = "pretty")]
    pub pretty: bool,
}

pub fn run() -> Result<()> {
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    let input = read_input(args.input.as_deref())?;
    let pages: Vec<PageData> = match serde_json::from_str(&input) {
        Ok(pages) => pages,
        Err(_) => json5::from_str(&input)?,
    };

    let mut builder = FormBuilder::new(config, FixedMeasure::default(), NoopHooks);
    builder.load_saved_structure(pages, LoadOptions::default());
    let healed = builder.get_structure();

    if args.check {
        let tree = builder.tree();
        let sections = tree
            .walk()
            .into_iter()
            .filter(|&id| tree.is_section(id))
            .count();
        println!(
            "ok: {} page(s), {} section(s), {} field(s)",
            healed.len(),
            sections,
            tree.fields().len()
        );
        return Ok(());
    }

    let text = if args.pretty {
        serde_json::to_string_pretty(&healed)?
    } else {
        serde_json::to_string(&healed)?
    };
    write_output(&text, args.output.as_deref())
}

fn read_input(path: Option<&Path>) -> Result<String> {
    if let Some(path) = path {
        if path == Path::new("-") {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            return Ok(buf);
        }
        return Ok(std::fs::read_to_string(path)?);
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}

fn write_output(text: &str, path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, text)?;
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(text.as_bytes())?;
            stdout.write_all(b"\n")?;
        }
    }
    Ok(())
}
