use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use lvmkit::OpenMode;
use tracing as log;

use crate::{
    AppCtx,
    commands::find_pv,
    config::Output,
    ui,
    utils::size::{format_size, parse_size},
};

#[derive(Args, Debug)]
pub struct PvArgs {
    #[command(subcommand)]
    pub cmd: PvCmd,
}

impl PvArgs {
    pub fn run(&self, ctx: &AppCtx) -> Result<()> {
        self.cmd.run(ctx)
    }
}

#[derive(Subcommand, Debug)]
pub enum PvCmd {
    List { vg: String },
    /// Change the usable size of a PV (at most its device size).
    Resize { vg: String, pv: String, size: String },
}

impl PvCmd {
    pub fn run(&self, ctx: &AppCtx) -> Result<()> {
        match self {
            PvCmd::List { vg } => {
                let lvm = ctx.session()?;
                let h = lvm
                    .vg_open(vg, OpenMode::Read)
                    .with_context(|| format!("open {vg}"))?;
                let mut infos = Vec::new();
                for pv in h.list_pvs().with_context(|| format!("list PVs of {vg}"))? {
                    infos.push(pv.info()?);
                }
                match ctx.output {
                    Output::Json => ui::print_json(&infos),
                    Output::Table => {
                        ui::print_pvs(&infos);
                        Ok(())
                    }
                }
            }
            PvCmd::Resize { vg, pv, size } => {
                let bytes = parse_size(size)?;
                let _lock = ctx.lock()?;
                let lvm = ctx.session()?;
                let mut h = lvm
                    .vg_open(vg, OpenMode::Write)
                    .with_context(|| format!("open {vg}"))?;
                let target = find_pv(&h, pv)?;
                target
                    .resize(bytes)
                    .with_context(|| format!("resize {pv} to {bytes}"))?;
                h.write().with_context(|| format!("write {vg}"))?;
                log::info!("[pv] {pv} is now {}", format_size(target.size()?));
                Ok(())
            }
        }
    }
}
