use anyhow::{Context, Result, bail};
use clap::{Args, Subcommand};
use lvmkit::{Engine, engine::MemoryEngine};
use serde::Serialize;
use tracing as log;

use crate::{
    AppCtx,
    config::Output,
    ui,
    utils::size::{format_size, parse_size},
};

#[derive(Args, Debug)]
pub struct DeviceArgs {
    #[command(subcommand)]
    pub cmd: DeviceCmd,
}

impl DeviceArgs {
    pub fn run(&self, ctx: &AppCtx) -> Result<()> {
        self.cmd.run(ctx)
    }
}

/// Fake block devices of the memory backend.
#[derive(Subcommand, Debug)]
pub enum DeviceCmd {
    Add { path: String, size: String },
    List,
}

impl DeviceCmd {
    pub fn run(&self, ctx: &AppCtx) -> Result<()> {
        let dir = ctx.cfg.memory_dir()?;
        match self {
            DeviceCmd::Add { path, size } => {
                let bytes = parse_size(size)?;
                let _lock = ctx.lock()?;
                let mut engine = open(dir)?;
                engine
                    .add_device(path, bytes)
                    .with_context(|| format!("add device {path}"))?;
                log::info!("[device] {path} ({})", format_size(bytes));
                Ok(())
            }
            DeviceCmd::List => {
                #[derive(Serialize)]
                struct Row {
                    path: String,
                    size: u64,
                }
                let engine = open(dir)?;
                let rows: Vec<Row> = engine
                    .devices()
                    .map(|(path, size)| Row {
                        path: path.to_string(),
                        size,
                    })
                    .collect();
                match ctx.output {
                    Output::Json => ui::print_json(&rows),
                    Output::Table => {
                        let lines: Vec<String> = rows
                            .iter()
                            .map(|r| format!("{}  {}", r.path, format_size(r.size)))
                            .collect();
                        ui::print_list("Device", &lines);
                        Ok(())
                    }
                }
            }
        }
    }
}

fn open(dir: &std::path::Path) -> Result<MemoryEngine> {
    let engine = MemoryEngine::init(Some(dir));
    if engine.errno() != 0 {
        bail!("load memory engine state: {}", engine.errmsg());
    }
    Ok(engine)
}
