use anyhow::{Context, Result, bail};
use clap::{Args, Subcommand};
use lvmkit::OpenMode;
use tracing as log;

use crate::{
    AppCtx,
    commands::{empty_ok, find_lv},
    config::Output,
    ui::{self, LvRow},
    utils::size::{format_size, parse_size},
};

#[derive(Args, Debug)]
pub struct LvArgs {
    #[command(subcommand)]
    pub cmd: LvCmd,
}

impl LvArgs {
    pub fn run(&self, ctx: &AppCtx) -> Result<()> {
        self.cmd.run(ctx)
    }
}

#[derive(Subcommand, Debug)]
pub enum LvCmd {
    List {
        vg: String,
    },
    /// Create a linear LV; the size is rounded up to whole extents.
    Create {
        vg: String,
        name: String,
        size: String,
    },
    Remove {
        vg: String,
        lv: String,
    },
    Activate {
        vg: String,
        lv: String,
    },
    Deactivate {
        vg: String,
        lv: String,
    },
    Resize {
        vg: String,
        lv: String,
        size: String,
    },
    Tag {
        vg: String,
        lv: String,
        #[arg(long = "add")]
        add: Vec<String>,
        #[arg(long = "remove")]
        remove: Vec<String>,
    },
}

impl LvCmd {
    pub fn run(&self, ctx: &AppCtx) -> Result<()> {
        match self {
            LvCmd::List { vg } => list(ctx, vg),
            LvCmd::Create { vg, name, size } => {
                let bytes = parse_size(size)?;
                let _lock = ctx.lock()?;
                let lvm = ctx.session()?;
                let h = lvm
                    .vg_open(vg, OpenMode::Write)
                    .with_context(|| format!("open {vg}"))?;
                let lv = h
                    .create_lv_linear(name, bytes)
                    .with_context(|| format!("create {vg}/{name}"))?;
                log::info!(
                    "[lv] created {vg}/{name} ({}, uuid {})",
                    format_size(lv.size()?),
                    lv.uuid()?
                );
                Ok(())
            }
            LvCmd::Remove { vg, lv } => {
                let _lock = ctx.lock()?;
                let lvm = ctx.session()?;
                let h = lvm
                    .vg_open(vg, OpenMode::Write)
                    .with_context(|| format!("open {vg}"))?;
                find_lv(&h, lv)?
                    .remove()
                    .with_context(|| format!("remove {vg}/{lv}"))?;
                log::info!("[lv] removed {vg}/{lv}");
                Ok(())
            }
            LvCmd::Activate { vg, lv } => set_active(ctx, vg, lv, true),
            LvCmd::Deactivate { vg, lv } => set_active(ctx, vg, lv, false),
            LvCmd::Resize { vg, lv, size } => {
                let bytes = parse_size(size)?;
                let _lock = ctx.lock()?;
                let lvm = ctx.session()?;
                let mut h = lvm
                    .vg_open(vg, OpenMode::Write)
                    .with_context(|| format!("open {vg}"))?;
                let target = find_lv(&h, lv)?;
                target
                    .resize(bytes)
                    .with_context(|| format!("resize {vg}/{lv} to {bytes}"))?;
                h.write().with_context(|| format!("write {vg}"))?;
                log::info!("[lv] {vg}/{lv} is now {}", format_size(target.size()?));
                Ok(())
            }
            LvCmd::Tag { vg, lv, add, remove } => {
                if add.is_empty() && remove.is_empty() {
                    bail!("nothing to do: pass --add and/or --remove");
                }
                let _lock = ctx.lock()?;
                let lvm = ctx.session()?;
                let mut h = lvm
                    .vg_open(vg, OpenMode::Write)
                    .with_context(|| format!("open {vg}"))?;
                let target = find_lv(&h, lv)?;
                for tag in add {
                    target
                        .add_tag(tag)
                        .with_context(|| format!("tag {vg}/{lv} with {tag:?}"))?;
                }
                for tag in remove {
                    target
                        .remove_tag(tag)
                        .with_context(|| format!("untag {vg}/{lv} ({tag:?})"))?;
                }
                let tags = target.tags()?;
                h.write().with_context(|| format!("write {vg}"))?;
                log::info!("[lv] {vg}/{lv} tags: {}", tags.join(","));
                Ok(())
            }
        }
    }
}

fn list(ctx: &AppCtx, vg: &str) -> Result<()> {
    let lvm = ctx.session()?;
    let h = lvm
        .vg_open(vg, OpenMode::Read)
        .with_context(|| format!("open {vg}"))?;
    let mut rows = Vec::new();
    for lv in empty_ok(h.list_lvs()).with_context(|| format!("list LVs of {vg}"))? {
        rows.push(LvRow {
            info: lv.info()?,
            tags: lv.tags()?,
        });
    }
    match ctx.output {
        Output::Json => ui::print_json(&rows),
        Output::Table => {
            ui::print_lvs(&rows);
            Ok(())
        }
    }
}

fn set_active(ctx: &AppCtx, vg: &str, lv: &str, active: bool) -> Result<()> {
    let _lock = ctx.lock()?;
    let lvm = ctx.session()?;
    let h = lvm
        .vg_open(vg, OpenMode::Write)
        .with_context(|| format!("open {vg}"))?;
    let target = find_lv(&h, lv)?;
    if active {
        target
            .activate()
            .with_context(|| format!("activate {vg}/{lv}"))?;
        log::info!("[lv] activated {vg}/{lv}");
    } else {
        target
            .deactivate()
            .with_context(|| format!("deactivate {vg}/{lv}"))?;
        log::info!("[lv] deactivated {vg}/{lv}");
    }
    Ok(())
}
