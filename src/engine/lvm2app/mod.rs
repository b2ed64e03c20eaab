//! Engine backed by the native `liblvm2app`.
//!
//! The library hands out raw `vg_t`/`lv_t`/`pv_t` pointers; this module keeps
//! them in an id arena so nothing above it touches a pointer. LV and PV
//! pointers point into their VG's memory pool, so closing a VG drops every id
//! enumerated from it.

use std::{
    collections::HashMap,
    ffi::{CStr, CString, c_char, c_int},
    io,
    os::unix::ffi::OsStrExt,
    path::Path,
    ptr,
};

use libc::{EINVAL, ENOMEM};
use tracing as log;

use crate::{
    engine::{Engine, Failed, LvId, LvInfo, OpenMode, Outcome, PvId, PvInfo, VgId, VgInfo},
    error::{Error, Result},
};

mod ffi;

pub struct Lvm2App {
    libh: *mut ffi::Lvm,
    vgs: HashMap<VgId, *mut ffi::Vg>,
    lvs: HashMap<LvId, (VgId, *mut ffi::Lv)>,
    pvs: HashMap<PvId, (VgId, *mut ffi::Pv)>,
    next_id: u64,
    /// Failures detected on this side of the FFI boundary; they shadow the
    /// library's own error state until the next call.
    local: Option<(i32, String)>,
}

/// Copies a library-owned string; null maps to `None`.
///
/// # Safety
/// `p` must be null or point to a NUL-terminated string that stays valid for
/// the duration of the call.
unsafe fn owned(p: *const c_char) -> Option<String> {
    if p.is_null() {
        return None;
    }
    Some(unsafe { CStr::from_ptr(p) }.to_string_lossy().into_owned())
}

/// Walks a `dm_list` whose items start with the link, mapping each item.
///
/// # Safety
/// `head` must be a valid list head whose items are all of type `T`, with the
/// `DmList` link as the first field of `T`.
unsafe fn walk<T, U>(head: *mut ffi::DmList, mut f: impl FnMut(&T) -> U) -> Vec<U> {
    let mut out = Vec::new();
    let mut at = unsafe { (*head).n };
    while !at.is_null() && at != head {
        let item = unsafe { &*(at as *const T) };
        out.push(f(item));
        at = unsafe { (*at).n };
    }
    out
}

#[inline]
fn rc(r: c_int) -> Outcome<()> {
    if r == 0 { Ok(()) } else { Err(Failed) }
}

#[inline]
fn rc_value(r: c_int) -> Outcome<i32> {
    if r == -1 { Err(Failed) } else { Ok(r) }
}

impl Lvm2App {
    /// Starts a library session. A null handle is reported as `ENOMEM`;
    /// any other init failure is left in the session's error state.
    pub fn init(system_dir: Option<&Path>) -> Result<Self> {
        let dir = system_dir
            .map(|p| CString::new(p.as_os_str().as_bytes()))
            .transpose()
            .map_err(|_| Error::Usage("system dir contains a NUL byte".into()))?;
        let libh = unsafe { ffi::lvm_init(dir.as_ref().map_or(ptr::null(), |d| d.as_ptr())) };
        if libh.is_null() {
            return Err(Error::Init(io::Error::from_raw_os_error(ENOMEM)));
        }
        log::debug!("lvm2app session started (system dir: {:?})", system_dir);
        Ok(Self {
            libh,
            vgs: HashMap::new(),
            lvs: HashMap::new(),
            pvs: HashMap::new(),
            next_id: 1,
            local: None,
        })
    }

    fn alloc_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn fail(&mut self, code: i32, msg: impl Into<String>) -> Failed {
        self.local = Some((code, msg.into()));
        Failed
    }

    fn arg(&mut self, s: &str) -> Outcome<CString> {
        CString::new(s).map_err(|_| self.fail(EINVAL, "argument contains a NUL byte"))
    }

    fn vg(&mut self, vg: VgId) -> Outcome<*mut ffi::Vg> {
        self.local = None;
        match self.vgs.get(&vg) {
            Some(p) => Ok(*p),
            None => Err(self.fail(EINVAL, "Invalid volume group handle")),
        }
    }

    fn lv(&mut self, lv: LvId) -> Outcome<*mut ffi::Lv> {
        self.local = None;
        match self.lvs.get(&lv) {
            Some((_, p)) => Ok(*p),
            None => Err(self.fail(EINVAL, "Invalid logical volume handle")),
        }
    }

    fn pv(&mut self, pv: PvId) -> Outcome<*mut ffi::Pv> {
        self.local = None;
        match self.pvs.get(&pv) {
            Some((_, p)) => Ok(*p),
            None => Err(self.fail(EINVAL, "Invalid physical volume handle")),
        }
    }

    fn adopt_vg(&mut self, p: *mut ffi::Vg) -> Outcome<VgId> {
        if p.is_null() {
            return Err(Failed);
        }
        let id = VgId::new(self.alloc_id());
        self.vgs.insert(id, p);
        Ok(id)
    }

    fn lv_id(&mut self, vg: VgId, p: *mut ffi::Lv) -> LvId {
        if let Some((id, _)) = self.lvs.iter().find(|(_, (_, q))| *q == p) {
            return *id;
        }
        let id = LvId::new(self.alloc_id());
        self.lvs.insert(id, (vg, p));
        id
    }

    fn pv_id(&mut self, vg: VgId, p: *mut ffi::Pv) -> PvId {
        if let Some((id, _)) = self.pvs.iter().find(|(_, (_, q))| *q == p) {
            return *id;
        }
        let id = PvId::new(self.alloc_id());
        self.pvs.insert(id, (vg, p));
        id
    }

    fn strings(&mut self, head: *mut ffi::DmList) -> Option<Vec<String>> {
        if head.is_null() {
            return None;
        }
        Some(unsafe {
            walk::<ffi::LvmStrList, _>(head, |item| owned(item.str).unwrap_or_default())
        })
    }
}

impl Engine for Lvm2App {
    fn errno(&self) -> i32 {
        match &self.local {
            Some((code, _)) => *code,
            None => unsafe { ffi::lvm_errno(self.libh) },
        }
    }

    fn errmsg(&self) -> String {
        match &self.local {
            Some((_, msg)) => msg.clone(),
            None => unsafe { owned(ffi::lvm_errmsg(self.libh)) }.unwrap_or_default(),
        }
    }

    fn library_version(&self) -> String {
        unsafe { owned(ffi::lvm_library_get_version()) }.unwrap_or_default()
    }

    fn list_vg_names(&mut self) -> Option<Vec<String>> {
        self.local = None;
        let head = unsafe { ffi::lvm_list_vg_names(self.libh) };
        self.strings(head)
    }

    fn list_vg_uuids(&mut self) -> Option<Vec<String>> {
        self.local = None;
        let head = unsafe { ffi::lvm_list_vg_uuids(self.libh) };
        self.strings(head)
    }

    fn vgname_from_pvid(&mut self, pvid: &str) -> Outcome<String> {
        self.local = None;
        let pvid = self.arg(pvid)?;
        unsafe { owned(ffi::lvm_vgname_from_pvid(self.libh, pvid.as_ptr())) }.ok_or(Failed)
    }

    fn vgname_from_device(&mut self, device: &str) -> Outcome<String> {
        self.local = None;
        let device = self.arg(device)?;
        unsafe { owned(ffi::lvm_vgname_from_device(self.libh, device.as_ptr())) }.ok_or(Failed)
    }

    fn config_reload(&mut self) -> Outcome<i32> {
        self.local = None;
        rc_value(unsafe { ffi::lvm_config_reload(self.libh) })
    }

    fn config_override(&mut self, text: &str) -> Outcome<i32> {
        self.local = None;
        let text = self.arg(text)?;
        rc_value(unsafe { ffi::lvm_config_override(self.libh, text.as_ptr()) })
    }

    fn scan(&mut self) -> Outcome<i32> {
        self.local = None;
        rc_value(unsafe { ffi::lvm_scan(self.libh) })
    }

    fn vg_open(&mut self, name: &str, mode: OpenMode, flags: u32) -> Outcome<VgId> {
        self.local = None;
        let name = self.arg(name)?;
        let mode = self.arg(mode.as_str())?;
        let p = unsafe { ffi::lvm_vg_open(self.libh, name.as_ptr(), mode.as_ptr(), flags) };
        self.adopt_vg(p)
    }

    fn vg_create(&mut self, name: &str) -> Outcome<VgId> {
        self.local = None;
        let name = self.arg(name)?;
        let p = unsafe { ffi::lvm_vg_create(self.libh, name.as_ptr()) };
        self.adopt_vg(p)
    }

    fn vg_close(&mut self, vg: VgId) {
        self.local = None;
        self.lvs.retain(|_, (owner, _)| *owner != vg);
        self.pvs.retain(|_, (owner, _)| *owner != vg);
        if let Some(p) = self.vgs.remove(&vg)
            && unsafe { ffi::lvm_vg_close(p) } != 0
        {
            log::warn!("lvm_vg_close failed: {}", self.errmsg());
        }
    }

    fn vg_write(&mut self, vg: VgId) -> Outcome<()> {
        let vg = self.vg(vg)?;
        rc(unsafe { ffi::lvm_vg_write(vg) })
    }

    fn vg_remove(&mut self, vg: VgId) -> Outcome<()> {
        let vg = self.vg(vg)?;
        rc(unsafe { ffi::lvm_vg_remove(vg) })
    }

    fn vg_extend(&mut self, vg: VgId, device: &str) -> Outcome<()> {
        let vg = self.vg(vg)?;
        let device = self.arg(device)?;
        rc(unsafe { ffi::lvm_vg_extend(vg, device.as_ptr()) })
    }

    fn vg_reduce(&mut self, vg: VgId, device: &str) -> Outcome<()> {
        let vg = self.vg(vg)?;
        let device = self.arg(device)?;
        rc(unsafe { ffi::lvm_vg_reduce(vg, device.as_ptr()) })
    }

    fn vg_add_tag(&mut self, vg: VgId, tag: &str) -> Outcome<()> {
        let vg = self.vg(vg)?;
        let tag = self.arg(tag)?;
        rc(unsafe { ffi::lvm_vg_add_tag(vg, tag.as_ptr()) })
    }

    fn vg_remove_tag(&mut self, vg: VgId, tag: &str) -> Outcome<()> {
        let vg = self.vg(vg)?;
        let tag = self.arg(tag)?;
        rc(unsafe { ffi::lvm_vg_remove_tag(vg, tag.as_ptr()) })
    }

    fn vg_set_extent_size(&mut self, vg: VgId, size: u32) -> Outcome<()> {
        let vg = self.vg(vg)?;
        rc(unsafe { ffi::lvm_vg_set_extent_size(vg, size) })
    }

    fn vg_info(&mut self, vg: VgId) -> Outcome<VgInfo> {
        let vg = self.vg(vg)?;
        Ok(unsafe {
            VgInfo {
                name: owned(ffi::lvm_vg_get_name(vg)).unwrap_or_default(),
                uuid: owned(ffi::lvm_vg_get_uuid(vg)).unwrap_or_default(),
                seqno: ffi::lvm_vg_get_seqno(vg),
                size: ffi::lvm_vg_get_size(vg),
                free_size: ffi::lvm_vg_get_free_size(vg),
                extent_size: ffi::lvm_vg_get_extent_size(vg),
                extent_count: ffi::lvm_vg_get_extent_count(vg),
                free_extent_count: ffi::lvm_vg_get_free_extent_count(vg),
                pv_count: ffi::lvm_vg_get_pv_count(vg),
                max_pv: ffi::lvm_vg_get_max_pv(vg),
                max_lv: ffi::lvm_vg_get_max_lv(vg),
                clustered: ffi::lvm_vg_is_clustered(vg) != 0,
                exported: ffi::lvm_vg_is_exported(vg) != 0,
                partial: ffi::lvm_vg_is_partial(vg) != 0,
            }
        })
    }

    fn vg_tags(&mut self, vg: VgId) -> Option<Vec<String>> {
        let vg = self.vg(vg).ok()?;
        let head = unsafe { ffi::lvm_vg_get_tags(vg) };
        self.strings(head)
    }

    fn vg_list_lvs(&mut self, vg: VgId) -> Option<Vec<LvId>> {
        let p = self.vg(vg).ok()?;
        let head = unsafe { ffi::lvm_vg_list_lvs(p) };
        if head.is_null() {
            return None;
        }
        let raw = unsafe { walk::<ffi::LvmLvList, _>(head, |item| item.lv) };
        Some(raw.into_iter().map(|lv| self.lv_id(vg, lv)).collect())
    }

    fn vg_list_pvs(&mut self, vg: VgId) -> Option<Vec<PvId>> {
        let p = self.vg(vg).ok()?;
        let head = unsafe { ffi::lvm_vg_list_pvs(p) };
        if head.is_null() {
            return None;
        }
        let raw = unsafe { walk::<ffi::LvmPvList, _>(head, |item| item.pv) };
        Some(raw.into_iter().map(|pv| self.pv_id(vg, pv)).collect())
    }

    fn vg_create_lv_linear(&mut self, vg: VgId, name: &str, size: u64) -> Outcome<LvId> {
        let p = self.vg(vg)?;
        let name = self.arg(name)?;
        let lv = unsafe { ffi::lvm_vg_create_lv_linear(p, name.as_ptr(), size) };
        if lv.is_null() {
            return Err(Failed);
        }
        Ok(self.lv_id(vg, lv))
    }

    fn lv_info(&mut self, lv: LvId) -> Outcome<LvInfo> {
        let lv = self.lv(lv)?;
        Ok(unsafe {
            LvInfo {
                name: owned(ffi::lvm_lv_get_name(lv)).unwrap_or_default(),
                uuid: owned(ffi::lvm_lv_get_uuid(lv)).unwrap_or_default(),
                size: ffi::lvm_lv_get_size(lv),
                active: ffi::lvm_lv_is_active(lv) != 0,
                suspended: ffi::lvm_lv_is_suspended(lv) != 0,
            }
        })
    }

    fn lv_tags(&mut self, lv: LvId) -> Option<Vec<String>> {
        let lv = self.lv(lv).ok()?;
        let head = unsafe { ffi::lvm_lv_get_tags(lv) };
        self.strings(head)
    }

    fn lv_activate(&mut self, lv: LvId) -> Outcome<()> {
        let lv = self.lv(lv)?;
        rc(unsafe { ffi::lvm_lv_activate(lv) })
    }

    fn lv_deactivate(&mut self, lv: LvId) -> Outcome<()> {
        let lv = self.lv(lv)?;
        rc(unsafe { ffi::lvm_lv_deactivate(lv) })
    }

    fn lv_remove(&mut self, id: LvId) -> Outcome<()> {
        let lv = self.lv(id)?;
        rc(unsafe { ffi::lvm_vg_remove_lv(lv) })?;
        // The library frees the LV from the VG's pool on success.
        self.lvs.remove(&id);
        Ok(())
    }

    fn lv_add_tag(&mut self, lv: LvId, tag: &str) -> Outcome<()> {
        let lv = self.lv(lv)?;
        let tag = self.arg(tag)?;
        rc(unsafe { ffi::lvm_lv_add_tag(lv, tag.as_ptr()) })
    }

    fn lv_remove_tag(&mut self, lv: LvId, tag: &str) -> Outcome<()> {
        let lv = self.lv(lv)?;
        let tag = self.arg(tag)?;
        rc(unsafe { ffi::lvm_lv_remove_tag(lv, tag.as_ptr()) })
    }

    fn lv_resize(&mut self, lv: LvId, size: u64) -> Outcome<()> {
        let lv = self.lv(lv)?;
        rc(unsafe { ffi::lvm_lv_resize(lv, size) })
    }

    fn pv_info(&mut self, pv: PvId) -> Outcome<PvInfo> {
        let pv = self.pv(pv)?;
        Ok(unsafe {
            PvInfo {
                name: owned(ffi::lvm_pv_get_name(pv)).unwrap_or_default(),
                uuid: owned(ffi::lvm_pv_get_uuid(pv)).unwrap_or_default(),
                mda_count: ffi::lvm_pv_get_mda_count(pv),
                size: ffi::lvm_pv_get_size(pv),
                dev_size: ffi::lvm_pv_get_dev_size(pv),
                free: ffi::lvm_pv_get_free(pv),
            }
        })
    }

    fn pv_resize(&mut self, pv: PvId, size: u64) -> Outcome<()> {
        let pv = self.pv(pv)?;
        rc(unsafe { ffi::lvm_pv_resize(pv, size) })
    }
}

impl Drop for Lvm2App {
    fn drop(&mut self) {
        let open: Vec<VgId> = self.vgs.keys().copied().collect();
        for vg in open {
            self.vg_close(vg);
        }
        unsafe { ffi::lvm_quit(self.libh) };
        log::debug!("lvm2app session ended");
    }
}
