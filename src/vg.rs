use std::{
    cell::Cell,
    rc::{Rc, Weak},
};

use tracing as log;

use crate::{
    engine::{Engine, Outcome, VgId, VgInfo},
    error::{Error, Result},
    lv::LogicalVolume,
    lvm::{Session, attach, c_arg, non_empty},
    pv::PhysicalVolume,
};

/// Liveness of one VG handle, shared (weakly) with the LV/PV handles
/// enumerated from it.
#[derive(Debug)]
pub(crate) struct VgSlot {
    id: Cell<Option<VgId>>,
}

impl VgSlot {
    #[inline]
    pub(crate) fn id(&self) -> Option<VgId> {
        self.id.get()
    }
}

/// An open volume group.
///
/// `remove`, `extend`, `reduce`, `add_tag`, `remove_tag` and `write` persist
/// the VG as part of the call; when the mutation or the write fails the
/// handle is closed before the error is returned. `set_extent_size` neither
/// writes nor closes.
pub struct VolumeGroup {
    session: Weak<Session>,
    slot: Rc<VgSlot>,
}

impl std::fmt::Debug for VolumeGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VolumeGroup")
            .field("id", &self.slot.id())
            .finish()
    }
}

impl VolumeGroup {
    pub(crate) fn new(session: Weak<Session>, id: VgId) -> Self {
        Self {
            session,
            slot: Rc::new(VgSlot {
                id: Cell::new(Some(id)),
            }),
        }
    }

    fn live(&self) -> Result<(Rc<Session>, VgId)> {
        let id = self.slot.id().ok_or(Error::Closed("volume group"))?;
        Ok((attach(&self.session)?, id))
    }

    fn get<T>(&self, f: impl FnOnce(&mut dyn Engine, VgId) -> Outcome<T>) -> Result<T> {
        let (session, id) = self.live()?;
        session.run(|e| f(e, id))
    }

    /// Mutate, then write. Either failing closes the handle.
    fn commit(
        &mut self,
        op: &str,
        f: impl FnOnce(&mut dyn Engine, VgId) -> Outcome<()>,
    ) -> Result<()> {
        let (session, id) = self.live()?;
        let res = session.run(|e| {
            f(&mut *e, id)?;
            e.vg_write(id)
        });
        if let Err(err) = res {
            log::debug!("vg {op} failed, closing handle: {err}");
            self.close();
            return Err(err);
        }
        Ok(())
    }

    /// Releases the VG handle. Closing twice is a no-op.
    pub fn close(&mut self) {
        let Some(id) = self.slot.id.take() else {
            return;
        };
        if let Some(session) = self.session.upgrade() {
            let _ = session.run(|e| {
                e.vg_close(id);
                Ok(())
            });
        }
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.slot.id().is_none()
    }

    /// All properties in one engine round trip.
    pub fn info(&self) -> Result<VgInfo> {
        self.get(|e, id| e.vg_info(id))
    }

    pub fn name(&self) -> Result<String> {
        Ok(self.info()?.name)
    }
    pub fn uuid(&self) -> Result<String> {
        Ok(self.info()?.uuid)
    }
    pub fn seqno(&self) -> Result<u64> {
        Ok(self.info()?.seqno)
    }
    pub fn size(&self) -> Result<u64> {
        Ok(self.info()?.size)
    }
    pub fn free_size(&self) -> Result<u64> {
        Ok(self.info()?.free_size)
    }
    pub fn extent_size(&self) -> Result<u64> {
        Ok(self.info()?.extent_size)
    }
    pub fn extent_count(&self) -> Result<u64> {
        Ok(self.info()?.extent_count)
    }
    pub fn free_extent_count(&self) -> Result<u64> {
        Ok(self.info()?.free_extent_count)
    }
    pub fn pv_count(&self) -> Result<u64> {
        Ok(self.info()?.pv_count)
    }
    pub fn max_pv(&self) -> Result<u64> {
        Ok(self.info()?.max_pv)
    }
    pub fn max_lv(&self) -> Result<u64> {
        Ok(self.info()?.max_lv)
    }
    pub fn is_clustered(&self) -> Result<bool> {
        Ok(self.info()?.clustered)
    }
    pub fn is_exported(&self) -> Result<bool> {
        Ok(self.info()?.exported)
    }
    pub fn is_partial(&self) -> Result<bool> {
        Ok(self.info()?.partial)
    }

    /// Tags of the VG. A null tag list is an error, an empty one is not.
    /// This differs from the classic lvm2app bindings, which also fail on an
    /// empty list.
    pub fn tags(&self) -> Result<Vec<String>> {
        let (session, id) = self.live()?;
        let (tags, last) = session.run_list(|e| e.vg_tags(id))?;
        tags.ok_or_else(|| Error::from_last(last))
    }

    /// Marks the VG for removal and writes it.
    pub fn remove(&mut self) -> Result<()> {
        self.commit("remove", |e, id| e.vg_remove(id))
    }

    pub fn extend(&mut self, device: &str) -> Result<()> {
        let device = c_arg("device", device)?;
        self.commit("extend", |e, id| e.vg_extend(id, device))
    }

    pub fn reduce(&mut self, device: &str) -> Result<()> {
        let device = c_arg("device", device)?;
        self.commit("reduce", |e, id| e.vg_reduce(id, device))
    }

    pub fn add_tag(&mut self, tag: &str) -> Result<()> {
        let tag = c_arg("tag", tag)?;
        self.commit("add_tag", |e, id| e.vg_add_tag(id, tag))
    }

    pub fn remove_tag(&mut self, tag: &str) -> Result<()> {
        let tag = c_arg("tag", tag)?;
        self.commit("remove_tag", |e, id| e.vg_remove_tag(id, tag))
    }

    /// Changes the extent size in memory only; follow with [`VolumeGroup::write`].
    pub fn set_extent_size(&mut self, size: u64) -> Result<()> {
        let size = u32::try_from(size)
            .map_err(|_| Error::Usage(format!("extent size {size} does not fit in 32 bits")))?;
        self.get(|e, id| e.vg_set_extent_size(id, size))
    }

    /// Persists pending in-memory changes.
    pub fn write(&mut self) -> Result<()> {
        self.commit("write", |_, _| Ok(()))
    }

    /// Logical volumes of the VG. A VG without any is reported as an error.
    pub fn list_lvs(&self) -> Result<Vec<LogicalVolume>> {
        let (session, id) = self.live()?;
        let ids = non_empty(session.run_list(|e| e.vg_list_lvs(id))?)?;
        Ok(ids
            .into_iter()
            .map(|lv| LogicalVolume::new(self.session.clone(), Rc::downgrade(&self.slot), lv))
            .collect())
    }

    /// Physical volumes of the VG. A null list is a valid, empty result.
    pub fn list_pvs(&self) -> Result<Vec<PhysicalVolume>> {
        let (session, id) = self.live()?;
        let (ids, _) = session.run_list(|e| e.vg_list_pvs(id))?;
        Ok(ids
            .unwrap_or_default()
            .into_iter()
            .map(|pv| PhysicalVolume::new(self.session.clone(), Rc::downgrade(&self.slot), pv))
            .collect())
    }

    /// Allocates a linear LV of at least `size` bytes.
    pub fn create_lv_linear(&self, name: &str, size: u64) -> Result<LogicalVolume> {
        let name = c_arg("lv name", name)?;
        let lv = self.get(|e, id| e.vg_create_lv_linear(id, name, size))?;
        log::debug!("created lv {name} ({size} bytes)");
        Ok(LogicalVolume::new(
            self.session.clone(),
            Rc::downgrade(&self.slot),
            lv,
        ))
    }
}

impl Drop for VolumeGroup {
    fn drop(&mut self) {
        self.close();
    }
}
