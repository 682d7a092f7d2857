//! heapdb - inspect and scan heap table files

use anyhow::{bail, Context, Result};
use clap::{Parser as ClapParser, Subcommand};
use heapdb::access::{DataType, Schema, Value};
use heapdb::config::StorageConfig;
use heapdb::storage::page::heap_page::slots_per_page;
use heapdb::storage::{BufferPool, HeapPage, TableFile};
use heapdb::transaction::TransactionIdGenerator;
use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// heapdb - page-oriented table files
#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Maximum pages read from a single table file
    #[arg(long, default_value_t = heapdb::config::DEFAULT_MAX_PAGES, global = true)]
    max_pages: u32,

    /// Pages kept resident in the buffer pool
    #[arg(long, default_value_t = heapdb::config::DEFAULT_POOL_PAGES, global = true)]
    pool_pages: usize,

    /// Milliseconds to wait for a page lock before aborting
    #[arg(long, default_value = "500", global = true)]
    lock_timeout_ms: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a table file of random Int32 tuples
    Generate {
        path: PathBuf,
        /// Number of pages to write
        #[arg(long)]
        pages: u32,
        /// Tuples stored on each page
        #[arg(long)]
        tuples_per_page: usize,
        /// Int32 columns per tuple
        #[arg(short, long, default_value = "2")]
        columns: usize,
        /// Seed for reproducible output
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Print every tuple of a table file
    Scan {
        path: PathBuf,
        /// Int32 columns per tuple
        #[arg(short, long, default_value = "2")]
        columns: usize,
    },
    /// Print table id and page geometry
    Info {
        path: PathBuf,
        /// Int32 columns per tuple
        #[arg(short, long, default_value = "2")]
        columns: usize,
    },
}

impl Args {
    fn storage_config(&self) -> StorageConfig {
        StorageConfig::default()
            .with_max_pages(self.max_pages)
            .with_buffer_pool_pages(self.pool_pages)
            .with_lock_timeout(Duration::from_millis(self.lock_timeout_ms))
    }
}

fn int_schema(columns: usize) -> Result<Arc<Schema>> {
    if columns == 0 {
        bail!("at least one column is required");
    }
    Ok(Arc::new(Schema::from_types(&vec![DataType::Int32; columns])?))
}

fn generate(
    path: &Path,
    pages: u32,
    tuples_per_page: usize,
    columns: usize,
    seed: Option<u64>,
) -> Result<()> {
    let schema = int_schema(columns)?;
    let capacity = slots_per_page(&schema);
    if tuples_per_page > capacity {
        bail!(
            "{} tuples per page requested but a page holds {}",
            tuples_per_page,
            capacity
        );
    }

    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let file = File::create(path).with_context(|| format!("Failed to create file: {:?}", path))?;
    let mut writer = BufWriter::new(file);
    for _ in 0..pages {
        let tuples: Vec<Vec<Value>> = (0..tuples_per_page)
            .map(|_| (0..columns).map(|_| Value::Int32(rng.gen())).collect())
            .collect();
        writer.write_all(&HeapPage::encode(&schema, &tuples)?[..])?;
    }
    writer.flush()?;

    info!(
        "Wrote {} pages of {} tuples to {}",
        pages,
        tuples_per_page,
        path.display()
    );
    Ok(())
}

fn scan(path: &Path, columns: usize, config: &StorageConfig) -> Result<()> {
    let table = Arc::new(
        TableFile::open(path, int_schema(columns)?, config)
            .with_context(|| format!("Failed to open table: {:?}", path))?,
    );
    let pool = BufferPool::new(config);
    let tid = TransactionIdGenerator::new().next();

    let mut scan = table.scan(pool.clone(), tid);
    scan.open();
    let mut count = 0usize;
    while scan.has_next()? {
        let tuple = scan.next()?;
        let row: Vec<String> = tuple.values.iter().map(Value::to_string).collect();
        println!(
            "{}:{}\t{}",
            tuple.tuple_id.page_id.page_no,
            tuple.tuple_id.slot_id,
            row.join("\t")
        );
        count += 1;
    }
    scan.close();
    pool.transaction_complete(tid);

    println!("{} tuples in {} pages", count, table.num_pages());
    Ok(())
}

fn info(path: &Path, columns: usize, config: &StorageConfig) -> Result<()> {
    let schema = int_schema(columns)?;
    let table = TableFile::open(path, Arc::clone(&schema), config)
        .with_context(|| format!("Failed to open table: {:?}", path))?;

    println!("path:           {}", table.path().display());
    println!("table id:       {}", table.id());
    println!("pages:          {}", table.num_pages());
    println!("tuple size:     {} bytes", schema.tuple_size());
    println!("slots per page: {}", slots_per_page(&schema));
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let config = args.storage_config();
    match &args.command {
        Command::Generate {
            path,
            pages,
            tuples_per_page,
            columns,
            seed,
        } => generate(path, *pages, *tuples_per_page, *columns, *seed),
        Command::Scan { path, columns } => scan(path, *columns, &config),
        Command::Info { path, columns } => info(path, *columns, &config),
    }
}
