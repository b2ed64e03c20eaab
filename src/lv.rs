use std::rc::{Rc, Weak};

use crate::{
    engine::{Engine, Failed, LvId, LvInfo, Outcome},
    error::{Error, Result},
    lvm::{Session, attach, c_arg},
    vg::VgSlot,
};

/// A logical volume of an open VG.
///
/// Mutators act on the engine's view of the VG without writing it, and a
/// failing mutator leaves the handle usable.
pub struct LogicalVolume {
    session: Weak<Session>,
    vg: Weak<VgSlot>,
    id: LvId,
}

impl std::fmt::Debug for LogicalVolume {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogicalVolume").field("id", &self.id).finish()
    }
}

impl LogicalVolume {
    pub(crate) fn new(session: Weak<Session>, vg: Weak<VgSlot>, id: LvId) -> Self {
        Self { session, vg, id }
    }

    fn call<T>(&self, f: impl FnOnce(&mut dyn Engine, LvId) -> Outcome<T>) -> Result<T> {
        let open = self.vg.upgrade().and_then(|slot| slot.id()).is_some();
        if !open {
            return Err(Error::Closed("volume group"));
        }
        let session: Rc<Session> = attach(&self.session)?;
        session.run(|e| f(e, self.id))
    }

    pub fn info(&self) -> Result<LvInfo> {
        self.call(|e, id| e.lv_info(id))
    }

    pub fn name(&self) -> Result<String> {
        Ok(self.info()?.name)
    }
    pub fn uuid(&self) -> Result<String> {
        Ok(self.info()?.uuid)
    }
    pub fn size(&self) -> Result<u64> {
        Ok(self.info()?.size)
    }
    pub fn is_active(&self) -> Result<bool> {
        Ok(self.info()?.active)
    }
    pub fn is_suspended(&self) -> Result<bool> {
        Ok(self.info()?.suspended)
    }

    /// Tags of the LV. A null tag list is an error, an empty one is not.
    /// This differs from the classic lvm2app bindings, which also fail on an
    /// empty list.
    pub fn tags(&self) -> Result<Vec<String>> {
        self.call(|e, id| e.lv_tags(id).ok_or(Failed))
    }

    pub fn activate(&self) -> Result<()> {
        self.call(|e, id| e.lv_activate(id))
    }

    pub fn deactivate(&self) -> Result<()> {
        self.call(|e, id| e.lv_deactivate(id))
    }

    /// Removes the LV from its VG. The VG handle stays open.
    pub fn remove(&self) -> Result<()> {
        self.call(|e, id| e.lv_remove(id))
    }

    pub fn add_tag(&self, tag: &str) -> Result<()> {
        let tag = c_arg("tag", tag)?;
        self.call(|e, id| e.lv_add_tag(id, tag))
    }

    pub fn remove_tag(&self, tag: &str) -> Result<()> {
        let tag = c_arg("tag", tag)?;
        self.call(|e, id| e.lv_remove_tag(id, tag))
    }

    pub fn resize(&self, size: u64) -> Result<()> {
        self.call(|e, id| e.lv_resize(id, size))
    }
}
