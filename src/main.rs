use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt};

mod commands;
mod config;
mod ui;
mod utils;

use commands::{device, engine, lv, pv, vg};
use config::{Config, Output};

pub struct AppCtx {
    pub debug: bool,
    pub output: Output,
    pub cfg: Config,
}

#[derive(Parser, Debug)]
#[command(
    name = "lvmkit",
    about = "Inspect and manage LVM volume groups, logical and physical volumes",
    arg_required_else_help = false,
    version = env!("CARGO_PKG_VERSION")
)]
struct Cli {
    #[arg(long, default_value = "/etc/lvmkit.toml", global = true)]
    config: PathBuf,

    #[arg(long, global = true)]
    debug: bool,

    /// Print results as JSON instead of tables.
    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true)]
    check_config: bool,

    #[arg(long, global = true)]
    print_config: bool,

    #[command(subcommand)]
    command: Option<Cmd>,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Print the engine library version.
    Version(engine::VersionArgs),
    /// Rescan devices for LVM metadata.
    Scan(engine::ScanArgs),
    Config(engine::ConfigArgs),
    Vg(vg::VgArgs),
    Lv(lv::LvArgs),
    Pv(pv::PvArgs),
    Device(device::DeviceArgs),
}

fn init_tracing(debug: bool) {
    let default = if debug { "trace" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_file(debug)
        .with_line_number(debug)
        .with_writer(std::io::stderr)
        .without_time()
        .try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    if cli.command.is_none() && !cli.check_config && !cli.print_config {
        let mut cmd = Cli::command();
        cmd.print_help()?;
        println!();
        return Ok(());
    }
    let cfg = Config::load(&cli.config)?;

    if cli.check_config {
        tracing::info!("config OK");
        return Ok(());
    }
    if cli.print_config {
        println!("{}", cfg.to_redacted_toml()?);
        return Ok(());
    }

    let Some(cmd) = cli.command else {
        let mut cmd = Cli::command();
        cmd.print_help()?;
        println!();
        return Ok(());
    };

    let ctx = AppCtx {
        debug: cli.debug,
        output: if cli.json { Output::Json } else { cfg.cli.output },
        cfg,
    };
    if ctx.debug {
        tracing::debug!("backend={} output={:?}", ctx.cfg.engine.backend, ctx.output);
    }

    match cmd {
        Cmd::Version(args) => args.run(&ctx),
        Cmd::Scan(args) => args.run(&ctx),
        Cmd::Config(args) => args.run(&ctx),
        Cmd::Vg(args) => args.run(&ctx),
        Cmd::Lv(args) => args.run(&ctx),
        Cmd::Pv(args) => args.run(&ctx),
        Cmd::Device(args) => args.run(&ctx),
    }
}
