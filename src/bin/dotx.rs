// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use dotx::{
    config::{Config, CONFIG_FILE_NAME},
    executor::Executor,
    matcher::{Builtins, RuleSources},
    package::{Package, PackageId},
    path::{absolutize, default_config_dir, home_dir},
    plan::{Plan, PlanBuilder, PlanError, PlanIndex, UninstallPlan},
    store::Store,
    sync::{clean_all_orphaned, record_missing, Discovery, ScanOptions},
};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Local, Utc};
use clap::{Args, Parser, Subcommand};
use std::{collections::BTreeSet, fs::File, path::PathBuf, process::exit, sync::Mutex};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "dotx [options] <dotx-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    #[command(flatten)]
    pub globals: GlobalOptions,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<()> {
        let context = Context::load(self.globals)?;
        match self.command {
            Command::Install(opts) => run_install(&context, opts),
            Command::Uninstall(opts) => run_uninstall(&context, opts),
            Command::List(opts) => run_list(opts),
            Command::Verify(opts) => run_verify(&context, opts),
            Command::Show(opts) => run_show(&context, opts),
            Command::Path(opts) => run_path(&context, opts),
            Command::Which(opts) => run_which(opts),
            Command::Sync(opts) => run_sync(&context, opts),
        }
    }
}

#[derive(Debug, Clone, Args)]
struct GlobalOptions {
    /// Directory to install packages into [default: home directory].
    #[arg(long, global = true, value_name = "dir")]
    pub target: Option<PathBuf>,

    /// Directory grouping source packages together.
    #[arg(long, global = true, value_name = "dir")]
    pub package_root: Option<PathBuf>,

    /// Print what would be done without touching anything.
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Report every step taken.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Report debugging information.
    #[arg(long, global = true)]
    pub debug: bool,

    /// Write log to file instead of the terminal.
    #[arg(long, global = true, value_name = "file")]
    pub log: Option<PathBuf>,

    /// Extra pattern of source paths to ignore.
    #[arg(short, long = "ignore", global = true, value_name = "pattern")]
    pub ignores: Vec<String>,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Install packages into target directory.
    #[command(override_usage = "dotx install [options] <source>...")]
    Install(InstallOptions),

    /// Uninstall packages from target directory.
    #[command(override_usage = "dotx uninstall [options] <source>...")]
    Uninstall(UninstallOptions),

    /// List installed packages.
    #[command(override_usage = "dotx list [options]")]
    List(ListOptions),

    /// Verify installations against the file system.
    #[command(override_usage = "dotx verify [options] [<source>]")]
    Verify(VerifyOptions),

    /// Show installations of a package.
    #[command(override_usage = "dotx show [options] <source>")]
    Show(ShowOptions),

    /// Print source path of an installed package.
    #[command(override_usage = "dotx path [options] <name>")]
    Path(PathOptions),

    /// Print name of the package that installed a target file.
    #[command(override_usage = "dotx which [options] <target>")]
    Which(WhichOptions),

    /// Rebuild installation records from existing symlinks.
    #[command(override_usage = "dotx sync [options]")]
    Sync(SyncOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct InstallOptions {
    /// Source packages to install.
    #[arg(required = true, value_name = "source")]
    pub sources: Vec<PathBuf>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct UninstallOptions {
    /// Source packages to uninstall.
    #[arg(required = true, value_name = "source")]
    pub sources: Vec<PathBuf>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ListOptions {
    /// Print reinstall commands instead of a table.
    #[arg(long)]
    pub as_commands: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct VerifyOptions {
    /// Source package to verify [default: every installed package].
    #[arg(value_name = "source")]
    pub source: Option<PathBuf>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ShowOptions {
    /// Source package to show.
    #[arg(required = true, value_name = "source")]
    pub source: PathBuf,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct PathOptions {
    /// Name of installed package.
    #[arg(required = true, value_name = "name")]
    pub name: String,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct WhichOptions {
    /// Installed target file.
    #[arg(required = true, value_name = "target")]
    pub target: PathBuf,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct SyncOptions {
    /// Scan depth overriding every default depth.
    #[arg(long, value_name = "depth")]
    pub max_depth: Option<usize>,

    /// Extra directory to scan for symlinks.
    #[arg(long = "scan-path", value_name = "path")]
    pub scan_paths: Vec<PathBuf>,

    /// Only scan the target directory itself.
    #[arg(long)]
    pub simple: bool,

    /// Drop records whose target no longer exists.
    #[arg(long)]
    pub clean: bool,
}

/// Global options merged with the configuration file.
struct Context {
    globals: GlobalOptions,
    config: Config,
    config_dir: PathBuf,
}

impl Context {
    fn load(globals: GlobalOptions) -> Result<Self> {
        let config_dir = default_config_dir()?;
        let config = Config::load(config_dir.join(CONFIG_FILE_NAME))?;

        Ok(Self {
            globals,
            config,
            config_dir,
        })
    }

    fn target(&self) -> Result<PathBuf> {
        let target = match (&self.globals.target, &self.config.settings.target) {
            (Some(target), _) | (None, Some(target)) => target.clone(),
            (None, None) => home_dir()?,
        };

        Ok(absolutize(target)?)
    }

    fn package_root(&self) -> Option<PathBuf> {
        self.globals
            .package_root
            .clone()
            .or_else(|| self.config.settings.package_root.clone())
    }

    fn rule_sources(&self) -> RuleSources {
        RuleSources::from_config_dir(&self.config_dir)
            .with_extra_ignores(self.config.settings.ignore.iter().flatten().cloned())
            .with_extra_ignores(self.globals.ignores.iter().cloned())
    }
}

fn main() {
    let cli = Cli::parse();
    if let Err(error) = init_logging(&cli.globals) {
        eprintln!("dotx: {error:?}");
        exit(1);
    }

    if let Err(error) = cli.run() {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

fn init_logging(globals: &GlobalOptions) -> Result<()> {
    let level = if globals.debug {
        "debug"
    } else if globals.verbose {
        "info"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    let layer = fmt::layer().compact().with_target(false).without_time();

    // INVARIANT: Keep standard output clean for command output.
    match &globals.log {
        Some(path) => {
            let file = File::create(path)?;
            tracing_subscriber::registry()
                .with(layer.with_ansi(false).with_writer(Mutex::new(file)))
                .with(filter)
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(layer.with_writer(std::io::stderr))
                .with(filter)
                .init();
        }
    }

    Ok(())
}

fn run_install(context: &Context, opts: InstallOptions) -> Result<()> {
    let target = context.target()?;
    let package_root = context.package_root();
    let builtins = Builtins::new();
    let sources = context.rule_sources();
    let mut store = Store::open_default()?;

    let mut index = PlanIndex::new();
    let mut plans: Vec<Plan> = Vec::new();
    let mut failures = 0;
    {
        let builder = PlanBuilder::new(&builtins, &sources).with_lookup(&store);
        for source in &opts.sources {
            let result = Package::new(source, package_root.as_deref())
                .map_err(PlanError::from)
                .and_then(|package| builder.build(&package, &target, &index));

            match result {
                Ok(plan) => {
                    index.absorb(&plan);
                    plans.push(plan);
                }
                Err(err) => {
                    failures += 1;
                    report_failure(source, &err);
                }
            }
        }
    }

    let (summary, applied) = Executor::new(&mut store)
        .dry_run(context.globals.dry_run)
        .verbose(context.globals.verbose)
        .apply_all(&plans);
    for (package, err) in &applied {
        failures += 1;
        error!("cannot install {package}: {err}");
    }

    // INVARIANT: Records of whatever did get applied must reach the disk.
    if !context.globals.dry_run {
        store.save()?;
    }
    info!("{summary}");

    if failures > 0 {
        return Err(anyhow!("{failures} package(s) failed to install"));
    }

    Ok(())
}

fn report_failure(source: &std::path::Path, err: &PlanError) {
    error!("cannot install {:?}: {err}", source.display());
    if let PlanError::Blocked { obstructions, .. } = err {
        for obstruction in obstructions {
            error!("  {obstruction}");
        }
    }
}

fn run_uninstall(context: &Context, opts: UninstallOptions) -> Result<()> {
    let package_root = context.package_root();
    let mut store = Store::open_default()?;

    let mut plans = Vec::new();
    for source in &opts.sources {
        let package = PackageId::resolve(source, package_root.as_deref())?;
        if !store.package_exists(&package) {
            warn!("package {package} is not installed");
            continue;
        }

        plans.push(UninstallPlan::build(&package, store.installations(&package))?);
    }

    let (summary, failures) = Executor::new(&mut store)
        .dry_run(context.globals.dry_run)
        .verbose(context.globals.verbose)
        .unapply_all(&plans);
    for (package, err) in &failures {
        error!("cannot uninstall {package}: {err}");
    }

    if !context.globals.dry_run {
        store.save()?;
    }
    info!("{summary}");

    if !failures.is_empty() {
        return Err(anyhow!("{} package(s) failed to uninstall", failures.len()));
    }

    Ok(())
}

fn run_list(opts: ListOptions) -> Result<()> {
    let store = Store::open_default()?;
    let packages = store.packages();
    if packages.is_empty() {
        println!("No packages installed.");
        return Ok(());
    }

    if opts.as_commands {
        for summary in &packages {
            println!("dotx install {}", summary.package.source_path().display());
        }
        return Ok(());
    }

    println!("{:<30} {:>6}  LAST INSTALL", "PACKAGE", "FILES");
    for summary in &packages {
        println!(
            "{:<30} {:>6}  {}",
            summary.package.package_name,
            summary.file_count,
            timestamp(summary.latest_install)
        );
    }
    println!("\nTotal: {} package(s)", packages.len());

    Ok(())
}

fn run_verify(context: &Context, opts: VerifyOptions) -> Result<()> {
    let store = Store::open_default()?;
    let packages = match opts.source {
        Some(source) => vec![PackageId::resolve(source, context.package_root().as_deref())?],
        None => store
            .packages()
            .into_iter()
            .map(|summary| summary.package)
            .collect(),
    };

    let mut total = 0;
    for package in &packages {
        let issues = store.verify(package);
        if issues.is_empty() {
            continue;
        }

        println!("{package}:");
        for issue in &issues {
            println!(
                "  {:?}: {} (expected {})",
                issue.target_path.display(),
                issue.problem,
                issue.link_type
            );
        }
        total += issues.len();
    }

    if total > 0 {
        return Err(anyhow!("found {total} issue(s)"));
    }
    println!("All installations verified.");

    Ok(())
}

fn run_show(context: &Context, opts: ShowOptions) -> Result<()> {
    let store = Store::open_default()?;
    let package = PackageId::resolve(&opts.source, context.package_root().as_deref())?;
    let installations = store.installations(&package);
    if installations.is_empty() {
        println!("No installations found for {package}");
        return Ok(());
    }

    println!("Package: {package}");
    println!("Source: {}", package.source_path().display());
    println!("Installed files: {}\n", installations.len());
    for record in installations {
        println!(
            "{:<12} {}  {}",
            record.link_type.to_string(),
            timestamp(record.installed_at),
            record.target_path.display()
        );
    }

    Ok(())
}

fn run_path(context: &Context, opts: PathOptions) -> Result<()> {
    let store = Store::open_default()?;
    let package_root = context.package_root().map(absolutize).transpose()?;

    let sources = store
        .all()
        .filter(|record| record.package_name == opts.name)
        .filter(|record| {
            package_root
                .as_ref()
                .is_none_or(|root| &record.package_root == root)
        })
        .map(|record| record.source_package_root.clone())
        .collect::<BTreeSet<_>>();

    if sources.is_empty() {
        return Err(anyhow!("package {:?} not found", opts.name));
    }

    for source in sources {
        println!("{}", source.display());
    }

    Ok(())
}

fn run_which(opts: WhichOptions) -> Result<()> {
    let store = Store::open_default()?;
    let target = absolutize(&opts.target)?;
    let record = store
        .find(&target)
        .ok_or_else(|| anyhow!("{:?} is not managed by any package", opts.target.display()))?;
    println!("{}", record.package_name);

    Ok(())
}

fn run_sync(context: &Context, opts: SyncOptions) -> Result<()> {
    let target = context.target()?;
    let package_roots = context.package_root().into_iter().collect::<Vec<_>>();
    let options = ScanOptions {
        max_depth: opts.max_depth,
        scan_paths: opts.scan_paths,
        simple: opts.simple,
    };

    let discovery = Discovery::scan(&target, &options, &package_roots)?;
    for link in &discovery.broken {
        warn!("skip broken symlink {:?}", link.display());
    }
    info!(
        "attributed {} symlink(s) to {} package(s), {} outside package roots",
        discovery.link_count(),
        discovery.packages.len(),
        discovery.filtered.len()
    );

    let mut store = Store::open_default()?;
    if context.globals.dry_run {
        for record in discovery.missing_records(&store) {
            println!(
                "record {:?} from {}",
                record.target_path.display(),
                record.package_name
            );
        }

        if opts.clean {
            for summary in store.packages() {
                for record in store.orphaned(&summary.package) {
                    println!("forget {:?}", record.target_path.display());
                }
            }
        }

        return Ok(());
    }

    let added = record_missing(&mut store, &discovery);
    let cleaned = if opts.clean {
        clean_all_orphaned(&mut store).len()
    } else {
        0
    };
    store.save()?;
    println!("Recorded {added} installation(s), dropped {cleaned} orphaned record(s).");

    Ok(())
}

fn timestamp(time: DateTime<Utc>) -> String {
    time.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}
