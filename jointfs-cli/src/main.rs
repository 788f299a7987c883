//! jointfs CLI - explore composite paths from the command line.
//!
//! Accepts any path the library understands: local files, `ftp://`,
//! `sftp://` and `http(s)://` services, with `.iso` images nested to any
//! depth in between.

use std::io::{self, Write};
use std::process;
use std::time::Duration;

use chrono::{DateTime, Local};
use clap::{Parser, Subcommand};
use jointfs::{Config, FileKind, JointPool};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "jointfs")]
#[command(about = "Browse local, remote and ISO-nested files", long_about = None)]
struct Args {
    /// Connection dial timeout in seconds
    #[arg(long, default_value = "5")]
    dial_timeout: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List a directory
    Ls {
        /// Composite path of the directory (or ISO image) to list
        path: String,
    },
    /// Write a file's content to stdout
    Cat {
        /// Composite path of the file
        path: String,
    },
    /// Print metadata of a file or directory
    Stat {
        /// Composite path of the entry
        path: String,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    jointfs::config::set(
        Config::default().with_dial_timeout(Duration::from_secs(args.dial_timeout)),
    );

    let pool = JointPool::new();
    let result = match &args.command {
        Command::Ls { path } => run_ls(&pool, path),
        Command::Cat { path } => run_cat(&pool, path),
        Command::Stat { path } => run_stat(&pool, path),
    };
    let status = pool.close();

    if let Err(err) = result {
        eprintln!("Error: {}", err);
        process::exit(1);
    }
    if let Err(err) = status {
        eprintln!("Error while closing connections: {}", err);
        process::exit(1);
    }
}

fn run_ls(pool: &JointPool, path: &str) -> jointfs::Result<()> {
    let entries = pool.read_dir(path)?;
    for entry in entries {
        let kind = match entry.kind() {
            FileKind::Dir => "d",
            FileKind::Symlink => "l",
            FileKind::File => "-",
        };
        let when = entry
            .modified()
            .map(|t| {
                DateTime::<Local>::from(t)
                    .format("%Y-%m-%d %H:%M")
                    .to_string()
            })
            .unwrap_or_else(|| "-".to_string());
        println!("{} {:>12} {:>16} {}", kind, entry.size(), when, entry.name());
    }
    Ok(())
}

fn run_cat(pool: &JointPool, path: &str) -> jointfs::Result<()> {
    let mut file = pool.open(path)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    io::copy(&mut file, &mut out)?;
    out.flush()?;
    Ok(())
}

fn run_stat(pool: &JointPool, path: &str) -> jointfs::Result<()> {
    let info = pool.stat(path)?;
    println!("name:     {}", info.name());
    println!("size:     {}", info.size());
    println!(
        "kind:     {:?}{}",
        info.kind(),
        if info.is_dir() && !info.is_real_dir() {
            " (ISO image presented as directory)"
        } else {
            ""
        }
    );
    if let Some(t) = info.modified() {
        println!("modified: {}", DateTime::<Local>::from(t).format("%Y-%m-%d %H:%M:%S"));
    }
    Ok(())
}
