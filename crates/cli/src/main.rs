use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::thread;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use log::{LevelFilter, Metadata, Record};
use stockroom_core::{Role, SystemClock};
use stockroom_engine::sync::RELEASE_GRACE;
use stockroom_engine::{EngineEvent, Workbench};
use stockroom_storage::{GridFileIo, OsFileSystem, SqliteSettings};

#[derive(Parser)]
#[command(name = "stockroom", about = "Merge purchase sheets into stock and sync through a shared folder.")]
struct Args {
    /// Settings database.
    #[arg(long, value_name = "PATH", default_value = "stockroom.db")]
    settings: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create an empty stock (or purchase) document.
    New {
        path: PathBuf,
        #[arg(long)]
        purchase: bool,
        #[arg(long, default_value_t = 100)]
        rows: usize,
    },
    /// Make `path` the canonical stock file.
    SetCanonical { path: PathBuf },
    /// Merge a purchase document into the canonical stock file.
    Merge { delta: PathBuf },
    /// Book received units into the canonical stock file.
    Receive {
        part_name: String,
        quantity: i64,
        #[arg(long, default_value = "")]
        department: String,
    },
    /// List rows whose name, part number or vendor contains `text`.
    Search { text: String },
    /// Upload the canonical file to the cloud folder.
    Push,
    /// Replace the canonical file with the cloud copy.
    Pull,
    /// Report whether the cloud copy is newer than the local one.
    Check,
    /// Show or change settings.
    Config {
        #[arg(long, value_name = "DIR")]
        cloud_folder: Option<PathBuf>,
        #[arg(long)]
        user: Option<String>,
        /// owner, editor or viewer.
        #[arg(long)]
        role: Option<String>,
        #[arg(long)]
        sync_enabled: Option<bool>,
    },
}

struct SimpleLogger;

impl log::Log for SimpleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

fn init_logging() {
    static LOGGER: SimpleLogger = SimpleLogger;
    let _ = log::set_logger(&LOGGER);
    let level = match std::env::var("STOCKROOM_LOG").as_deref() {
        Ok("error") => LevelFilter::Error,
        Ok("info") => LevelFilter::Info,
        Ok("debug") => LevelFilter::Debug,
        Ok("trace") => LevelFilter::Trace,
        Ok("off") => LevelFilter::Off,
        _ => LevelFilter::Warn,
    };
    log::set_max_level(level);
}

fn open_workbench(settings: &Path) -> Result<Workbench> {
    let store = SqliteSettings::open(settings)
        .with_context(|| format!("open settings {}", settings.display()))?;
    let mut workbench = Workbench::open(
        Box::new(store),
        Rc::new(GridFileIo),
        Rc::new(OsFileSystem),
        Rc::new(SystemClock),
    )?;
    workbench.subscribe(Box::new(|event: &EngineEvent| match event {
        EngineEvent::Warning(msg) => eprintln!("warning: {msg}"),
        EngineEvent::ConflictDetected(msg) => eprintln!("conflict: {msg}"),
        _ => {}
    }));
    Ok(workbench)
}

fn load_canonical(workbench: &mut Workbench) -> Result<()> {
    if workbench.canonical_file().is_none() {
        bail!("no canonical file configured; run `stockroom set-canonical <path>` first");
    }
    workbench.load_canonical()?;
    Ok(())
}

fn print_config(workbench: &Workbench) {
    let config = workbench.config();
    let show = |p: &Option<PathBuf>| {
        p.as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none)".to_string())
    };
    println!("canonical file: {}", show(&config.canonical_file));
    println!("cloud folder:   {}", show(&config.cloud_folder));
    println!("sync enabled:   {}", config.sync_enabled);
    println!("user:           {}", config.current_user);
    println!("role:           {}", config.role.as_str());
    println!("last sync:      {}", config.last_sync_time);
    println!("sync status:    {}", workbench.sync_state());
}

fn run(args: Args) -> Result<()> {
    let mut workbench = open_workbench(&args.settings)?;

    match args.command {
        Command::New { path, purchase, rows } => {
            if purchase {
                workbench.create_delta(rows);
            } else {
                workbench.create_canonical(rows);
            }
            let written = workbench.save(Some(&path))?;
            println!("created {}", written.display());
        }
        Command::SetCanonical { path } => {
            workbench.set_canonical_path(&path)?;
            println!("canonical file: {}", path.display());
        }
        Command::Merge { delta } => {
            load_canonical(&mut workbench)?;
            let report = workbench.merge(&delta)?;
            println!(
                "{}: {} rows updated, {} rows added",
                workbench.file_name(),
                report.rows_updated,
                report.rows_added
            );
        }
        Command::Receive {
            part_name,
            quantity,
            department,
        } => {
            load_canonical(&mut workbench)?;
            let row = workbench.receive_item(&part_name, &department, quantity);
            workbench.save_to_canonical()?;
            println!("row {row} updated");
        }
        Command::Search { text } => {
            load_canonical(&mut workbench)?;
            for hit in workbench.search_all(&text) {
                println!(
                    "{:>5}  {:<30} {:<12} {:>8}  {}",
                    hit.row,
                    hit.part_name.to_text(),
                    hit.part_no.to_text(),
                    hit.stock.to_text(),
                    hit.vendor
                );
            }
        }
        Command::Push => {
            load_canonical(&mut workbench)?;
            let outcome = workbench.push_to_cloud()?;
            println!("pushed: {outcome:?}");
            thread::sleep(RELEASE_GRACE);
            workbench.run_due_releases();
        }
        Command::Pull => {
            let outcome = workbench.pull_from_cloud()?;
            println!(
                "pulled {} into {}",
                outcome.cloud_path.display(),
                outcome.working_path.display()
            );
        }
        Command::Check => {
            load_canonical(&mut workbench)?;
            if workbench.check_for_updates() {
                println!("the cloud copy is newer; pull before editing");
            } else {
                println!("up to date");
            }
        }
        Command::Config {
            cloud_folder,
            user,
            role,
            sync_enabled,
        } => {
            if let Some(folder) = cloud_folder {
                workbench.set_cloud_folder(&folder)?;
            }
            if let Some(user) = user {
                workbench.set_current_user(&user)?;
            }
            if let Some(role) = role {
                workbench.set_user_role(Role::parse(&role)?)?;
            }
            if let Some(enabled) = sync_enabled {
                workbench.set_sync_enabled(enabled)?;
            }
            print_config(&workbench);
        }
    }

    // No process stays behind to run pending releases.
    workbench.flush_releases();
    Ok(())
}

fn main() -> Result<()> {
    init_logging();
    run(Args::parse())
}
