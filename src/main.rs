//! Storage engine smoke demo: open or create a database, write a
//! record through the buffer pool, and read it back.

use anyhow::{Context, Result};
use clap::Parser;
use pagedb::storage::buffer::lru::LruReplacer;
use pagedb::storage::{BufferPool, DiskManager, PageType};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Database file
    #[arg(short, long, default_value = "pagedb.db")]
    file: PathBuf,

    /// Create the database, truncating an existing file
    #[arg(short, long)]
    create: bool,

    /// Buffer pool size in frames
    #[arg(short, long, default_value = "64")]
    pool_size: usize,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let disk = if args.create {
        DiskManager::create(&args.file)
            .with_context(|| format!("failed to create database {:?}", args.file))?
    } else {
        DiskManager::open(&args.file)
            .with_context(|| format!("failed to open database {:?}", args.file))?
    };

    let pool = BufferPool::new(disk, Box::new(LruReplacer::new()), args.pool_size);

    let payload = b"hello, pagedb!";
    let page_id = {
        let mut guard = pool.create_page(PageType::Data, false, 0)?;
        let data_page = guard
            .as_data_mut()
            .context("freshly created page is not a data page")?;
        let slot = data_page
            .insert_record(1, payload, 1)
            .context("page unexpectedly full")?;
        log::info!("wrote {} bytes to page {} slot {}", payload.len(), guard.id(), slot);
        guard.id()
    };

    pool.flush_page(page_id)?;
    pool.sync()?;

    let guard = pool.fetch_page(page_id)?;
    let data_page = guard.as_data().context("page 0 is not a data page")?;
    let record = data_page
        .get_record(0)
        .context("record went missing after flush")?;
    println!(
        "page {}: {}",
        guard.id(),
        String::from_utf8_lossy(record)
    );

    Ok(())
}
