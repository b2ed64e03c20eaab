use anyhow::{Context, Result, bail};
use lvmkit::{LogicalVolume, Lvm, PhysicalVolume, VolumeGroup};
use tracing as log;

use crate::{AppCtx, config::Backend, utils::lock::LockGuard};

pub mod device;
pub mod engine;
pub mod lv;
pub mod pv;
pub mod vg;

impl AppCtx {
    /// Starts an engine session for the configured backend and applies the
    /// configured overrides.
    pub fn session(&self) -> Result<Lvm> {
        let dir = self.cfg.engine.system_dir.as_deref();
        let lvm = match self.cfg.engine.backend {
            Backend::Memory => Lvm::in_memory(dir),
            #[cfg(feature = "lvm2app")]
            Backend::Lvm2App => Lvm::init(dir),
            #[cfg(not(feature = "lvm2app"))]
            Backend::Lvm2App => bail!("this build has no lvm2app support"),
        }
        .with_context(|| format!("start {} engine", self.cfg.engine.backend))?;
        log::debug!(
            "{} engine ready (system dir: {:?})",
            self.cfg.engine.backend,
            dir
        );

        for text in &self.cfg.engine.overrides {
            lvm.config_override(text)
                .with_context(|| format!("apply config override {text:?}"))?;
        }
        Ok(lvm)
    }

    /// Serializes mutating commands across processes.
    pub fn lock(&self) -> Result<LockGuard> {
        LockGuard::try_acquire(&self.cfg.cli.lock, self.cfg.cli.lock_dir.as_deref())
    }
}

/// List calls report "nothing there" as an error with code 0; the CLI shows
/// an empty result instead.
pub(crate) fn empty_ok<T>(res: lvmkit::Result<Vec<T>>) -> lvmkit::Result<Vec<T>> {
    match res {
        Err(lvmkit::Error::Lvm { code: 0, .. }) => Ok(Vec::new()),
        other => other,
    }
}

pub(crate) fn find_lv(vg: &VolumeGroup, name: &str) -> Result<LogicalVolume> {
    let vg_name = vg.name()?;
    for lv in empty_ok(vg.list_lvs()).with_context(|| format!("list LVs of {vg_name}"))? {
        if lv.name()? == name {
            return Ok(lv);
        }
    }
    bail!("logical volume '{}' not found in volume group '{}'", name, vg_name)
}

pub(crate) fn find_pv(vg: &VolumeGroup, name: &str) -> Result<PhysicalVolume> {
    let vg_name = vg.name()?;
    for pv in vg.list_pvs().with_context(|| format!("list PVs of {vg_name}"))? {
        if pv.name()? == name {
            return Ok(pv);
        }
    }
    bail!("physical volume '{}' not found in volume group '{}'", name, vg_name)
}

#[cfg(test)]
mod tests {
    use lvmkit::{Error, OpenMode};

    use super::*;

    #[test]
    fn empty_ok_only_masks_code_zero() {
        let empty: lvmkit::Result<Vec<u8>> = Err(Error::Lvm {
            code: 0,
            message: String::new(),
        });
        assert!(empty_ok(empty).unwrap().is_empty());

        let real: lvmkit::Result<Vec<u8>> = Err(Error::Lvm {
            code: 2,
            message: "gone".into(),
        });
        assert!(empty_ok(real).is_err());
    }

    #[test]
    fn find_by_name() {
        let mut engine = lvmkit::engine::MemoryEngine::new();
        engine.add_device("/dev/sdb", 64 << 20).unwrap();
        let lvm = Lvm::with_engine(Box::new(engine)).unwrap();
        let mut vg = lvm.vg_create("vg0").unwrap();
        vg.extend("/dev/sdb").unwrap();
        vg.create_lv_linear("data", 4 << 20).unwrap();
        vg.close();

        let vg = lvm.vg_open("vg0", OpenMode::Read).unwrap();
        assert_eq!(find_lv(&vg, "data").unwrap().name().unwrap(), "data");
        assert!(find_lv(&vg, "nope").is_err());
        assert_eq!(find_pv(&vg, "/dev/sdb").unwrap().size().unwrap(), 60 << 20);
        assert!(find_pv(&vg, "/dev/sdz").is_err());
    }
}
