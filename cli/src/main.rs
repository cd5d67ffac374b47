use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::{error, info, LevelFilter};

use vclang_core::cache::CacheStore;
use vclang_core::{prelude, print_err, print_warn, Config, Driver, ModuleStatus};

const DEFAULT_CACHE_DIR: &str = ".vclang-cache";

#[derive(Parser)]
#[command(version)]
struct Args {
    /// Log progress (repeat for more detail)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check every module under a directory
    Check {
        #[arg(index = 1, default_value = ".")]
        path: PathBuf,
        /// Where compiled modules are cached
        #[arg(long)]
        cache_dir: Option<PathBuf>,
        /// Recheck everything without reading or writing the cache
        #[arg(long)]
        no_cache: bool,
        /// Worker threads, 0 for one per core
        #[arg(short, long, default_value_t = 0)]
        jobs: usize,
        /// Maximum nesting of instance search
        #[arg(long)]
        instance_depth: Option<usize>,
    },
    /// Check the prelude and write its cache entry
    Prelude {
        #[arg(index = 1, default_value = DEFAULT_CACHE_DIR)]
        out: PathBuf,
    },
    /// Remove a cache directory
    Clean {
        #[arg(index = 1, default_value = DEFAULT_CACHE_DIR)]
        cache_dir: PathBuf,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();
    let level = match args.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    match args.command {
        Command::Check {
            path,
            cache_dir,
            no_cache,
            jobs,
            instance_depth,
        } => {
            let mut config = Config::default().with_jobs(jobs);
            if !no_cache {
                config = config.with_cache_dir(cache_dir.unwrap_or_else(|| path.join(DEFAULT_CACHE_DIR)));
            }
            if let Some(d) = instance_depth {
                config.instance_depth = d;
            }
            check(path, config)
        }
        Command::Prelude { out } => {
            let config = Config {
                use_prelude_cache: false,
                ..Config::default().with_cache_dir(out)
            };
            let report = Driver::new(config).prelude();
            report.print();
            if report.is_ok() {
                info!("prelude written ({} definitions)", report.defs.len());
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Command::Clean { cache_dir } => match CacheStore::new(cache_dir).clean() {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!("{e}");
                ExitCode::FAILURE
            }
        },
    }
}

fn check(path: PathBuf, config: Config) -> ExitCode {
    let mut driver = Driver::new(config);
    let reports = match driver.check_dir(&path) {
        Ok(r) => r,
        Err(e) => {
            print_err(e, &path, "");
            return ExitCode::FAILURE;
        }
    };
    let prelude = prelude::source();
    for w in driver.prelude_warnings() {
        print_warn(w, &prelude.path, &prelude.text)
    }
    let mut ok = true;
    for r in &reports {
        r.print();
        match r.status {
            ModuleStatus::Checked | ModuleStatus::Cached => {
                info!("{}: {}", r.name(), r.status)
            }
            ModuleStatus::Failed | ModuleStatus::Unreachable => {
                ok = false;
                error!("{}: {}", r.name(), r.status)
            }
        }
    }
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
