use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;
use tracing as log;

use crate::{AppCtx, config::Output, ui};

#[derive(Args, Debug)]
pub struct VersionArgs {}

impl VersionArgs {
    pub fn run(&self, ctx: &AppCtx) -> Result<()> {
        let lvm = ctx.session()?;
        let library = lvm.version().context("query library version")?;

        #[derive(Serialize)]
        struct Out<'a> {
            lvmkit: &'a str,
            backend: String,
            library: &'a str,
        }
        let out = Out {
            lvmkit: env!("CARGO_PKG_VERSION"),
            backend: ctx.cfg.engine.backend.to_string(),
            library: &library,
        };
        match ctx.output {
            Output::Json => ui::print_json(&out),
            Output::Table => {
                println!("lvmkit {} ({} engine {})", out.lvmkit, out.backend, out.library);
                Ok(())
            }
        }
    }
}

#[derive(Args, Debug)]
pub struct ScanArgs {}

impl ScanArgs {
    pub fn run(&self, ctx: &AppCtx) -> Result<()> {
        let lvm = ctx.session()?;
        let rc = lvm.scan().context("scan devices")?;
        log::info!("[scan] done (rc={rc})");
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub cmd: ConfigCmd,
}

impl ConfigArgs {
    pub fn run(&self, ctx: &AppCtx) -> Result<()> {
        self.cmd.run(ctx)
    }
}

#[derive(Subcommand, Debug)]
pub enum ConfigCmd {
    /// Re-read the engine's configuration from disk.
    Reload,
    /// Apply an lvm.conf fragment to this session and check it parses.
    Override { text: String },
}

impl ConfigCmd {
    pub fn run(&self, ctx: &AppCtx) -> Result<()> {
        let lvm = ctx.session()?;
        match self {
            ConfigCmd::Reload => {
                let rc = lvm.config_reload().context("reload engine config")?;
                log::info!("[config] reloaded (rc={rc})");
            }
            ConfigCmd::Override { text } => {
                let rc = lvm
                    .config_override(text)
                    .with_context(|| format!("override engine config with {text:?}"))?;
                log::info!("[config] override accepted (rc={rc})");
            }
        }
        Ok(())
    }
}
