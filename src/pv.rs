use std::rc::Weak;

use crate::{
    engine::{PvId, PvInfo},
    error::{Error, Result},
    lvm::{Session, attach},
    vg::VgSlot,
};

/// A physical volume of an open VG.
pub struct PhysicalVolume {
    session: Weak<Session>,
    vg: Weak<VgSlot>,
    id: PvId,
}

impl std::fmt::Debug for PhysicalVolume {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicalVolume").field("id", &self.id).finish()
    }
}

impl PhysicalVolume {
    pub(crate) fn new(session: Weak<Session>, vg: Weak<VgSlot>, id: PvId) -> Self {
        Self { session, vg, id }
    }

    fn ensure_open(&self) -> Result<()> {
        match self.vg.upgrade().and_then(|slot| slot.id()) {
            Some(_) => Ok(()),
            None => Err(Error::Closed("volume group")),
        }
    }

    pub fn info(&self) -> Result<PvInfo> {
        self.ensure_open()?;
        attach(&self.session)?.run(|e| e.pv_info(self.id))
    }

    pub fn name(&self) -> Result<String> {
        Ok(self.info()?.name)
    }
    pub fn uuid(&self) -> Result<String> {
        Ok(self.info()?.uuid)
    }
    pub fn mda_count(&self) -> Result<u64> {
        Ok(self.info()?.mda_count)
    }
    pub fn size(&self) -> Result<u64> {
        Ok(self.info()?.size)
    }
    pub fn dev_size(&self) -> Result<u64> {
        Ok(self.info()?.dev_size)
    }
    pub fn free(&self) -> Result<u64> {
        Ok(self.info()?.free)
    }

    /// Resizes the PV in the engine's view of the VG; nothing is written.
    pub fn resize(&self, size: u64) -> Result<()> {
        self.ensure_open()?;
        attach(&self.session)?.run(|e| e.pv_resize(self.id, size))
    }
}

#[cfg(test)]
mod tests {
    use crate::{Error, Lvm, OpenMode, engine::MemoryEngine};

    const MIB: u64 = 1 << 20;

    #[test]
    fn pv_properties_and_resize() {
        let mut engine = MemoryEngine::new();
        engine.add_device("/dev/sdb", 64 * MIB).unwrap();
        let lvm = Lvm::with_engine(Box::new(engine)).unwrap();
        let mut vg = lvm.vg_create("vg0").unwrap();
        vg.extend("/dev/sdb").unwrap();

        let pvs = vg.list_pvs().unwrap();
        let pv = &pvs[0];
        assert_eq!(pv.dev_size().unwrap(), 64 * MIB);
        assert_eq!(pv.mda_count().unwrap(), 1);
        assert_eq!(pv.size().unwrap(), 60 * MIB);
        assert_eq!(pv.free().unwrap(), 60 * MIB);
        assert_eq!(pv.uuid().unwrap().len(), 38);

        vg.create_lv_linear("a", 8 * MIB).unwrap();
        assert_eq!(pv.free().unwrap(), 52 * MIB);

        pv.resize(32 * MIB).unwrap();
        assert_eq!(pv.size().unwrap(), 28 * MIB);

        let err = pv.resize(128 * MIB).unwrap_err();
        assert!(matches!(err, Error::Lvm { .. }), "err was: {err:?}");
        assert!(pv.name().is_ok());
    }

    #[test]
    fn pv_handle_dies_with_vg() {
        let mut engine = MemoryEngine::new();
        engine.add_device("/dev/sdb", 64 * MIB).unwrap();
        let lvm = Lvm::with_engine(Box::new(engine)).unwrap();
        {
            let mut vg = lvm.vg_create("vg0").unwrap();
            vg.extend("/dev/sdb").unwrap();
        }
        let vg = lvm.vg_open("vg0", OpenMode::Read).unwrap();
        let pvs = vg.list_pvs().unwrap();
        drop(vg);
        assert!(pvs[0].info().unwrap_err().is_closed());
        assert!(pvs[0].resize(MIB).unwrap_err().is_closed());
    }
}
