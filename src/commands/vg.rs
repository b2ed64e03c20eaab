use anyhow::{Context, Result, bail};
use clap::{ArgGroup, Args, Subcommand};
use lvmkit::{OpenMode, VgInfo};
use serde::Serialize;
use tracing as log;

use crate::{
    AppCtx,
    commands::empty_ok,
    config::Output,
    ui::{self, LvRow},
    utils::size::parse_size,
};

#[derive(Args, Debug)]
pub struct VgArgs {
    #[command(subcommand)]
    pub cmd: VgCmd,
}

impl VgArgs {
    pub fn run(&self, ctx: &AppCtx) -> Result<()> {
        self.cmd.run(ctx)
    }
}

#[derive(Subcommand, Debug)]
pub enum VgCmd {
    /// List volume groups.
    List {
        /// Print UUIDs only.
        #[arg(long)]
        uuids: bool,
    },
    /// Show one volume group with its LVs and PVs.
    Show { vg: String },
    /// Create a volume group on one or more devices.
    Create {
        vg: String,
        #[arg(required = true, num_args = 1..)]
        devices: Vec<String>,
    },
    Remove { vg: String },
    Extend { vg: String, device: String },
    Reduce { vg: String, device: String },
    Tag(TagArgs),
    SetExtentSize { vg: String, size: String },
    /// Find the volume group owning a PV id or device.
    Lookup(LookupArgs),
}

#[derive(Args, Debug)]
pub struct TagArgs {
    pub vg: String,
    #[arg(long = "add")]
    pub add: Vec<String>,
    #[arg(long = "remove")]
    pub remove: Vec<String>,
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("by").required(true).args(["pvid", "device"])))]
pub struct LookupArgs {
    #[arg(long)]
    pub pvid: Option<String>,
    #[arg(long)]
    pub device: Option<String>,
}

impl VgCmd {
    pub fn run(&self, ctx: &AppCtx) -> Result<()> {
        match self {
            VgCmd::List { uuids } => list(ctx, *uuids),
            VgCmd::Show { vg } => show(ctx, vg),
            VgCmd::Create { vg, devices } => create(ctx, vg, devices),
            VgCmd::Remove { vg } => {
                let _lock = ctx.lock()?;
                let lvm = ctx.session()?;
                let mut h = lvm
                    .vg_open(vg, OpenMode::Write)
                    .with_context(|| format!("open {vg}"))?;
                h.remove().with_context(|| format!("remove {vg}"))?;
                log::info!("[vg] removed {vg}");
                Ok(())
            }
            VgCmd::Extend { vg, device } => {
                let _lock = ctx.lock()?;
                let lvm = ctx.session()?;
                let mut h = lvm
                    .vg_open(vg, OpenMode::Write)
                    .with_context(|| format!("open {vg}"))?;
                h.extend(device)
                    .with_context(|| format!("extend {vg} with {device}"))?;
                log::info!("[vg] {vg} += {device}");
                Ok(())
            }
            VgCmd::Reduce { vg, device } => {
                let _lock = ctx.lock()?;
                let lvm = ctx.session()?;
                let mut h = lvm
                    .vg_open(vg, OpenMode::Write)
                    .with_context(|| format!("open {vg}"))?;
                h.reduce(device)
                    .with_context(|| format!("reduce {vg} by {device}"))?;
                log::info!("[vg] {vg} -= {device}");
                Ok(())
            }
            VgCmd::Tag(args) => args.run(ctx),
            VgCmd::SetExtentSize { vg, size } => {
                let bytes = parse_size(size)?;
                let _lock = ctx.lock()?;
                let lvm = ctx.session()?;
                let mut h = lvm
                    .vg_open(vg, OpenMode::Write)
                    .with_context(|| format!("open {vg}"))?;
                h.set_extent_size(bytes)
                    .with_context(|| format!("set extent size of {vg} to {bytes}"))?;
                h.write().with_context(|| format!("write {vg}"))?;
                log::info!("[vg] {vg} extent size = {bytes}");
                Ok(())
            }
            VgCmd::Lookup(args) => args.run(ctx),
        }
    }
}

fn list(ctx: &AppCtx, uuids: bool) -> Result<()> {
    let lvm = ctx.session()?;
    if uuids {
        let ids = empty_ok(lvm.list_vg_uuids()).context("list VG uuids")?;
        return match ctx.output {
            Output::Json => ui::print_json(&ids),
            Output::Table => {
                ui::print_list("UUID", &ids);
                Ok(())
            }
        };
    }

    let names = empty_ok(lvm.list_vg_names()).context("list VG names")?;
    let mut infos: Vec<VgInfo> = Vec::with_capacity(names.len());
    for name in &names {
        let vg = lvm
            .vg_open(name, OpenMode::Read)
            .with_context(|| format!("open {name}"))?;
        infos.push(vg.info().with_context(|| format!("read {name}"))?);
    }
    match ctx.output {
        Output::Json => ui::print_json(&infos),
        Output::Table => {
            ui::print_vgs(&infos);
            Ok(())
        }
    }
}

fn show(ctx: &AppCtx, name: &str) -> Result<()> {
    let lvm = ctx.session()?;
    let vg = lvm
        .vg_open(name, OpenMode::Read)
        .with_context(|| format!("open {name}"))?;
    let info = vg.info().with_context(|| format!("read {name}"))?;
    let tags = vg.tags().with_context(|| format!("read tags of {name}"))?;

    let mut lvs = Vec::new();
    for lv in empty_ok(vg.list_lvs()).with_context(|| format!("list LVs of {name}"))? {
        lvs.push(LvRow {
            info: lv.info()?,
            tags: lv.tags()?,
        });
    }
    let mut pvs = Vec::new();
    for pv in vg.list_pvs().with_context(|| format!("list PVs of {name}"))? {
        pvs.push(pv.info()?);
    }

    match ctx.output {
        Output::Json => {
            #[derive(Serialize)]
            struct Out<'a> {
                #[serde(flatten)]
                info: &'a VgInfo,
                tags: &'a [String],
                lvs: &'a [LvRow],
                pvs: &'a [lvmkit::PvInfo],
            }
            ui::print_json(&Out {
                info: &info,
                tags: &tags,
                lvs: &lvs,
                pvs: &pvs,
            })
        }
        Output::Table => {
            ui::print_vg(&info, &tags);
            ui::print_lvs(&lvs);
            ui::print_pvs(&pvs);
            Ok(())
        }
    }
}

fn create(ctx: &AppCtx, name: &str, devices: &[String]) -> Result<()> {
    let _lock = ctx.lock()?;
    let lvm = ctx.session()?;
    let mut vg = lvm
        .vg_create(name)
        .with_context(|| format!("create {name}"))?;
    for dev in devices {
        vg.extend(dev)
            .with_context(|| format!("add {dev} to {name}"))?;
        log::info!("[vg] {name} += {dev}");
    }
    log::info!("[vg] created {name} on {} device(s)", devices.len());
    Ok(())
}

impl TagArgs {
    pub fn run(&self, ctx: &AppCtx) -> Result<()> {
        if self.add.is_empty() && self.remove.is_empty() {
            bail!("nothing to do: pass --add and/or --remove");
        }
        let _lock = ctx.lock()?;
        let lvm = ctx.session()?;
        let vg = &self.vg;
        let mut h = lvm
            .vg_open(vg, OpenMode::Write)
            .with_context(|| format!("open {vg}"))?;
        for tag in &self.add {
            h.add_tag(tag)
                .with_context(|| format!("tag {vg} with {tag:?}"))?;
        }
        for tag in &self.remove {
            h.remove_tag(tag)
                .with_context(|| format!("untag {vg} ({tag:?})"))?;
        }
        log::info!("[vg] {vg} tags: {}", h.tags()?.join(","));
        Ok(())
    }
}

impl LookupArgs {
    pub fn run(&self, ctx: &AppCtx) -> Result<()> {
        let lvm = ctx.session()?;
        let name = match (&self.pvid, &self.device) {
            (Some(pvid), _) => lvm
                .vg_name_from_pvid(pvid)
                .with_context(|| format!("look up PV id {pvid}"))?,
            (None, Some(dev)) => lvm
                .vg_name_from_device(dev)
                .with_context(|| format!("look up device {dev}"))?,
            (None, None) => bail!("pass --pvid or --device"),
        };
        match ctx.output {
            Output::Json => ui::print_json(&name),
            Output::Table => {
                println!("{name}");
                Ok(())
            }
        }
    }
}
