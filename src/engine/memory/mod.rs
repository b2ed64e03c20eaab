//! In-process engine.
//!
//! Keeps committed volume-group metadata in memory and, when started with a
//! system directory, in a JSON file inside it. Open VG handles work on a
//! private copy of the metadata that `vg_write` commits. It follows the
//! native library's calling conventions (errno-style codes, null lists,
//! read-only handles) closely enough to drive the handle layer without root
//! or real block devices.

use std::{
    collections::{BTreeSet, HashMap},
    io,
    path::{Path, PathBuf},
};

use libc::{EBUSY, EEXIST, EINVAL, EIO, ENOENT, ENOSPC, EPERM};
use tracing as log;

use crate::engine::{
    Engine, Failed, LvId, LvInfo, OpenMode, Outcome, PvId, PvInfo, VgId, VgInfo,
};

mod meta;
mod rules;

pub use meta::STATE_FILE;
use meta::{LvMeta, PvMeta, State, VgMeta, pe_count_for};

/// Error code and message, before they are recorded as the last error.
type Fault = (i32, String);

#[inline]
fn fault(code: i32, msg: impl Into<String>) -> Fault {
    (code, msg.into())
}

struct OpenVg {
    name: String,
    mode: OpenMode,
    meta: VgMeta,
    /// Committed seqno this copy was read at; `None` for a VG not on disk yet.
    base: Option<u64>,
    removed: bool,
}

/// LV/PV handle: owning VG handle plus the object's uuid.
#[derive(Clone)]
struct Member {
    vg: VgId,
    uuid: String,
}

pub struct MemoryEngine {
    dir: Option<PathBuf>,
    state: State,
    overrides: Vec<String>,
    vgs: HashMap<VgId, OpenVg>,
    lvs: HashMap<LvId, Member>,
    pvs: HashMap<PvId, Member>,
    next_id: u64,
    errno: i32,
    errmsg: String,
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEngine {
    /// An engine whose metadata lives only as long as the value.
    pub fn new() -> Self {
        Self {
            dir: None,
            state: State::default(),
            overrides: Vec::new(),
            vgs: HashMap::new(),
            lvs: HashMap::new(),
            pvs: HashMap::new(),
            next_id: 1,
            errno: 0,
            errmsg: String::new(),
        }
    }

    /// Loads metadata from `system_dir`. A load failure is left in the
    /// engine's error state, the way the native library reports init errors.
    pub fn init(system_dir: Option<&Path>) -> Self {
        let mut engine = Self::new();
        if let Some(dir) = system_dir {
            engine.dir = Some(dir.to_path_buf());
            match State::load(dir) {
                Ok(st) => engine.state = st,
                Err(e) => {
                    engine.errno = EIO;
                    engine.errmsg = format!("Failed to load {}: {e}", dir.join(STATE_FILE).display());
                }
            }
        }
        engine
    }

    #[inline]
    pub fn system_dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Config fragments accepted through `config_override`, in order.
    pub fn overrides(&self) -> &[String] {
        &self.overrides
    }

    /// Registers a block device the engine can put into a VG.
    pub fn add_device(&mut self, path: &str, size: u64) -> io::Result<()> {
        if !path.starts_with('/') || path.len() < 2 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("device path must be absolute: '{path}'"),
            ));
        }
        if size <= meta::PV_RESERVED {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("device {path} is too small ({size} bytes)"),
            ));
        }
        transact(self.dir.as_deref(), &mut self.state, |st| {
            st.devices.insert(path.to_string(), size);
            Ok(())
        })
        .map_err(|(_, msg)| io::Error::other(msg))?;
        log::debug!("memory engine: device {path} ({size} bytes)");
        Ok(())
    }

    pub fn devices(&self) -> impl Iterator<Item = (&str, u64)> {
        self.state.devices.iter().map(|(k, v)| (k.as_str(), *v))
    }

    fn reset(&mut self) {
        self.errno = 0;
        self.errmsg.clear();
    }

    fn settle<T>(&mut self, res: Result<T, Fault>) -> Outcome<T> {
        res.map_err(|(code, msg)| {
            log::debug!("memory engine: {msg} ({code})");
            self.errno = code;
            self.errmsg = msg;
            Failed
        })
    }

    fn alloc_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn reload(&mut self) -> Result<i32, Fault> {
        if let Some(dir) = &self.dir {
            self.state = State::load(dir).map_err(|e| fault(EIO, format!("Failed to reload metadata: {e}")))?;
        }
        Ok(0)
    }

    fn commit(&mut self, vg: VgId) -> Result<(), Fault> {
        let h = open_vg(&mut self.vgs, vg)?;
        if h.mode == OpenMode::Read {
            return Err(read_only(&h.name));
        }
        if !h.removed && h.meta.pvs.is_empty() {
            return Err(fault(
                EINVAL,
                format!("Volume group \"{}\" has no physical volumes", h.name),
            ));
        }

        transact(self.dir.as_deref(), &mut self.state, |st| {
            match (h.base, st.vgs.get(&h.name).map(|m| m.seqno)) {
                (None, Some(_)) => {
                    return Err(fault(
                        EEXIST,
                        format!("A volume group called {} already exists", h.name),
                    ));
                }
                (base, current) if base != current => {
                    return Err(fault(
                        EBUSY,
                        format!("Metadata for volume group \"{}\" changed since it was read", h.name),
                    ));
                }
                _ => {}
            }
            if h.removed {
                st.vgs.remove(&h.name);
                return Ok(());
            }
            for pv in &h.meta.pvs {
                if !st.devices.contains_key(&pv.device) {
                    return Err(fault(ENOENT, format!("Device {} not found", pv.device)));
                }
                if let Some(owner) = st.device_owner(&pv.device)
                    && owner != h.name
                {
                    return Err(fault(
                        EBUSY,
                        format!("Physical volume '{}' is already in volume group '{owner}'", pv.device),
                    ));
                }
            }
            let mut meta = h.meta.clone();
            meta.seqno += 1;
            st.vgs.insert(h.name.clone(), meta);
            Ok(())
        })?;

        if h.removed {
            h.base = None;
        } else {
            h.meta.seqno += 1;
            h.base = Some(h.meta.seqno);
        }
        log::debug!("memory engine: committed vg {} seqno {}", h.name, h.meta.seqno);
        Ok(())
    }

    fn extend(&mut self, vg: VgId, device: &str) -> Result<(), Fault> {
        let dev_size = *self
            .state
            .devices
            .get(device)
            .ok_or_else(|| fault(ENOENT, format!("Device {device} not found")))?;
        let owner = self.state.device_owner(device).map(str::to_owned);

        let h = writable(&mut self.vgs, vg)?;
        if h.meta.pvs.iter().any(|pv| pv.device == device) {
            return Err(fault(
                EEXIST,
                format!("Physical volume '{device}' is already in volume group '{}'", h.name),
            ));
        }
        if let Some(owner) = owner
            && owner != h.name
        {
            return Err(fault(
                EBUSY,
                format!("Physical volume '{device}' is already in volume group '{owner}'"),
            ));
        }
        if h.meta.max_pv != 0 && h.meta.pvs.len() as u64 >= h.meta.max_pv {
            return Err(fault(
                EINVAL,
                format!("Volume group \"{}\" already has maximum number of physical volumes", h.name),
            ));
        }
        let pe_count = pe_count_for(dev_size, h.meta.extent_size);
        if pe_count == 0 {
            return Err(fault(EINVAL, format!("Device {device} is too small for an extent")));
        }
        h.meta.pvs.push(PvMeta {
            device: device.to_string(),
            uuid: rules::new_uuid(),
            mda_count: 1,
            dev_size,
            pe_count,
        });
        Ok(())
    }

    fn reduce(&mut self, vg: VgId, device: &str) -> Result<(), Fault> {
        let h = writable(&mut self.vgs, vg)?;
        let idx = h
            .meta
            .pvs
            .iter()
            .position(|pv| pv.device == device)
            .ok_or_else(|| fault(ENOENT, format!("Physical volume \"{device}\" not found in volume group \"{}\"", h.name)))?;
        if h.meta.allocated_on(&h.meta.pvs[idx].uuid) > 0 {
            return Err(fault(EBUSY, format!("Physical volume \"{device}\" still in use")));
        }
        if h.meta.pvs.len() == 1 {
            return Err(fault(
                EINVAL,
                format!("Can't remove final physical volume \"{device}\" from volume group \"{}\"", h.name),
            ));
        }
        h.meta.pvs.remove(idx);
        self.pvs.retain(|_, m| m.vg != vg || h.meta.pv_index(&m.uuid).is_some());
        Ok(())
    }

    fn set_extent_size(&mut self, vg: VgId, size: u32) -> Result<(), Fault> {
        let size = u64::from(size);
        let h = writable(&mut self.vgs, vg)?;
        if size == 0 || !size.is_power_of_two() || size % 512 != 0 {
            return Err(fault(EINVAL, format!("Invalid extent size {size}: must be a power of 2 sectors")));
        }
        if !h.meta.lvs.is_empty() {
            return Err(fault(
                EINVAL,
                format!("Can't change extent size of volume group \"{}\" with logical volumes", h.name),
            ));
        }
        let counts: Vec<u64> = h.meta.pvs.iter().map(|pv| pe_count_for(pv.dev_size, size)).collect();
        if let Some(pv) = h.meta.pvs.iter().zip(&counts).find(|(_, n)| **n == 0).map(|(pv, _)| pv) {
            return Err(fault(EINVAL, format!("Extent size {size} is larger than physical volume {}", pv.device)));
        }
        for (pv, n) in h.meta.pvs.iter_mut().zip(counts) {
            pv.pe_count = n;
        }
        h.meta.extent_size = size;
        Ok(())
    }

    fn create_lv(&mut self, vg: VgId, name: &str, size: u64) -> Result<LvId, Fault> {
        let h = writable(&mut self.vgs, vg)?;
        rules::check_lv_name(name).map_err(|m| fault(EINVAL, m))?;
        if h.meta.lvs.iter().any(|lv| lv.name == name) {
            return Err(fault(
                EEXIST,
                format!("Logical volume \"{name}\" already exists in volume group \"{}\"", h.name),
            ));
        }
        if h.meta.max_lv != 0 && h.meta.lvs.len() as u64 >= h.meta.max_lv {
            return Err(fault(EINVAL, format!("Maximum number of logical volumes reached in \"{}\"", h.name)));
        }
        if size == 0 {
            return Err(fault(EINVAL, "Unable to create LV with zero size"));
        }
        let extents = h.meta.extents_for(size);
        let segments = h.meta.allocate(extents).ok_or_else(|| {
            fault(
                ENOSPC,
                format!(
                    "Insufficient free extents ({}) in volume group {}: {extents} required",
                    h.meta.free_extents(),
                    h.name
                ),
            )
        })?;
        let uuid = rules::new_uuid();
        h.meta.lvs.push(LvMeta {
            name: name.to_string(),
            uuid: uuid.clone(),
            segments,
            active: true,
            tags: BTreeSet::new(),
        });

        if let Err(f) = self.commit(vg) {
            if let Some(h) = self.vgs.get_mut(&vg) {
                h.meta.lvs.retain(|lv| lv.uuid != uuid);
            }
            return Err(f);
        }
        let id = LvId::new(self.alloc_id());
        self.lvs.insert(id, Member { vg, uuid });
        Ok(id)
    }

    fn remove_lv(&mut self, lv: LvId) -> Result<(), Fault> {
        let m = member(&self.lvs, lv, "logical volume")?;
        let h = writable(&mut self.vgs, m.vg)?;
        let idx = h.meta.lv_index(&m.uuid).ok_or_else(lv_gone)?;
        let removed = h.meta.lvs.remove(idx);
        if let Err(f) = self.commit(m.vg) {
            if let Some(h) = self.vgs.get_mut(&m.vg) {
                h.meta.lvs.insert(idx, removed);
            }
            return Err(f);
        }
        Ok(())
    }

    fn set_active(&mut self, lv: LvId, active: bool) -> Result<(), Fault> {
        let m = member(&self.lvs, lv, "logical volume")?;
        let h = open_vg(&mut self.vgs, m.vg)?;
        let idx = h.meta.lv_index(&m.uuid).ok_or_else(lv_gone)?;

        // Activation is device state, not VG metadata: it bypasses vg_write.
        transact(self.dir.as_deref(), &mut self.state, |st| {
            if let Some(committed) = st.vgs.get_mut(&h.name)
                && let Some(i) = committed.lv_index(&m.uuid)
            {
                committed.lvs[i].active = active;
            }
            Ok(())
        })?;
        h.meta.lvs[idx].active = active;
        Ok(())
    }

    fn lv_edit(&mut self, lv: LvId, f: impl FnOnce(&mut VgMeta, usize) -> Result<(), Fault>) -> Result<(), Fault> {
        let m = member(&self.lvs, lv, "logical volume")?;
        let h = writable(&mut self.vgs, m.vg)?;
        let idx = h.meta.lv_index(&m.uuid).ok_or_else(lv_gone)?;
        f(&mut h.meta, idx)
    }

    fn lv_view<T>(&mut self, lv: LvId, f: impl FnOnce(&VgMeta, &LvMeta) -> T) -> Result<T, Fault> {
        let m = member(&self.lvs, lv, "logical volume")?;
        let h = open_vg(&mut self.vgs, m.vg)?;
        let idx = h.meta.lv_index(&m.uuid).ok_or_else(lv_gone)?;
        Ok(f(&h.meta, &h.meta.lvs[idx]))
    }

    fn pv_view<T>(&mut self, pv: PvId, f: impl FnOnce(&VgMeta, &PvMeta) -> T) -> Result<T, Fault> {
        let m = member(&self.pvs, pv, "physical volume")?;
        let h = open_vg(&mut self.vgs, m.vg)?;
        let idx = h.meta.pv_index(&m.uuid).ok_or_else(|| fault(ENOENT, "Physical volume not found"))?;
        Ok(f(&h.meta, &h.meta.pvs[idx]))
    }

    fn resize_pv(&mut self, pv: PvId, size: u64) -> Result<(), Fault> {
        let m = member(&self.pvs, pv, "physical volume")?;
        let h = writable(&mut self.vgs, m.vg)?;
        let idx = h.meta.pv_index(&m.uuid).ok_or_else(|| fault(ENOENT, "Physical volume not found"))?;
        let target = &h.meta.pvs[idx];
        if size > target.dev_size {
            return Err(fault(
                EINVAL,
                format!("Size {size} exceeds device size {} of {}", target.dev_size, target.device),
            ));
        }
        let pe_count = pe_count_for(size, h.meta.extent_size);
        let used = h.meta.allocated_on(&m.uuid);
        if pe_count < used || pe_count == 0 {
            return Err(fault(
                EBUSY,
                format!("Cannot shrink {} below {used} allocated extents", target.device),
            ));
        }
        h.meta.pvs[idx].pe_count = pe_count;
        Ok(())
    }

    fn child_ids<I: Copy + Eq + std::hash::Hash>(
        map: &mut HashMap<I, Member>,
        next_id: &mut u64,
        make: fn(u64) -> I,
        vg: VgId,
        uuids: Vec<String>,
    ) -> Vec<I> {
        uuids
            .into_iter()
            .map(|uuid| {
                if let Some((id, _)) = map.iter().find(|(_, m)| m.vg == vg && m.uuid == uuid) {
                    return *id;
                }
                let id = make(*next_id);
                *next_id += 1;
                map.insert(id, Member { vg, uuid });
                id
            })
            .collect()
    }
}

/// Applies `edit` to the latest committed state and stores the result. With
/// a system dir the state is re-read from disk and saved while the dir's
/// metadata lock is held. `state` is left alone when `edit` fails.
fn transact<T>(
    dir: Option<&Path>,
    state: &mut State,
    edit: impl FnOnce(&mut State) -> Result<T, Fault>,
) -> Result<T, Fault> {
    let Some(dir) = dir else {
        let mut next = state.clone();
        let out = edit(&mut next)?;
        *state = next;
        return Ok(out);
    };
    let _lock = meta::lock(dir).map_err(|e| fault(EIO, format!("Failed to lock metadata: {e}")))?;
    let mut next = State::load(dir).map_err(|e| fault(EIO, format!("Failed to read metadata: {e}")))?;
    let out = edit(&mut next)?;
    next.save(dir)
        .map_err(|e| fault(EIO, format!("Failed to write metadata: {e}")))?;
    *state = next;
    Ok(out)
}

fn lv_gone() -> Fault {
    fault(ENOENT, "Logical volume not found")
}

fn read_only(name: &str) -> Fault {
    fault(EPERM, format!("Volume group \"{name}\" opened read-only"))
}

fn open_vg(vgs: &mut HashMap<VgId, OpenVg>, vg: VgId) -> Result<&mut OpenVg, Fault> {
    vgs.get_mut(&vg).ok_or_else(|| fault(EINVAL, "Invalid volume group handle"))
}

fn writable(vgs: &mut HashMap<VgId, OpenVg>, vg: VgId) -> Result<&mut OpenVg, Fault> {
    match vgs.get_mut(&vg) {
        None => Err(fault(EINVAL, "Invalid volume group handle")),
        Some(h) if h.mode == OpenMode::Read => Err(read_only(&h.name)),
        Some(h) if h.removed => Err(fault(
            EINVAL,
            format!("Volume group \"{}\" was removed", h.name),
        )),
        Some(h) => Ok(h),
    }
}

fn member<I: Eq + std::hash::Hash>(map: &HashMap<I, Member>, id: I, what: &str) -> Result<Member, Fault> {
    map.get(&id)
        .cloned()
        .ok_or_else(|| fault(EINVAL, format!("Invalid {what} handle")))
}

impl Engine for MemoryEngine {
    fn errno(&self) -> i32 {
        self.errno
    }

    fn errmsg(&self) -> String {
        self.errmsg.clone()
    }

    fn library_version(&self) -> String {
        format!("{} (memory)", env!("CARGO_PKG_VERSION"))
    }

    fn list_vg_names(&mut self) -> Option<Vec<String>> {
        self.reset();
        Some(self.state.vgs.keys().cloned().collect())
    }

    fn list_vg_uuids(&mut self) -> Option<Vec<String>> {
        self.reset();
        Some(self.state.vgs.values().map(|vg| vg.uuid.clone()).collect())
    }

    fn vgname_from_pvid(&mut self, pvid: &str) -> Outcome<String> {
        self.reset();
        let want = rules::bare_uuid(pvid);
        let found = self
            .state
            .vgs
            .iter()
            .find(|(_, vg)| vg.pvs.iter().any(|pv| rules::bare_uuid(&pv.uuid) == want))
            .map(|(name, _)| name.clone());
        let res = found.ok_or_else(|| fault(ENOENT, format!("No volume group found for PV id {pvid}")));
        self.settle(res)
    }

    fn vgname_from_device(&mut self, device: &str) -> Outcome<String> {
        self.reset();
        let res = self
            .state
            .device_owner(device)
            .map(str::to_owned)
            .ok_or_else(|| fault(ENOENT, format!("No volume group found for device {device}")));
        self.settle(res)
    }

    fn config_reload(&mut self) -> Outcome<i32> {
        self.reset();
        let res = self.reload();
        self.settle(res)
    }

    fn config_override(&mut self, text: &str) -> Outcome<i32> {
        self.reset();
        let res = if rules::config_text_balanced(text) {
            self.overrides.push(text.to_string());
            Ok(0)
        } else {
            Err(fault(EINVAL, "Failed to parse config override"))
        };
        self.settle(res)
    }

    fn scan(&mut self) -> Outcome<i32> {
        self.reset();
        let res = self.reload();
        self.settle(res)
    }

    fn vg_open(&mut self, name: &str, mode: OpenMode, _flags: u32) -> Outcome<VgId> {
        self.reset();
        let Some(meta) = self.state.vgs.get(name).cloned() else {
            return self.settle(Err(fault(ENOENT, format!("Volume group \"{name}\" not found"))));
        };
        let id = VgId::new(self.alloc_id());
        self.vgs.insert(
            id,
            OpenVg {
                name: name.to_string(),
                mode,
                base: Some(meta.seqno),
                meta,
                removed: false,
            },
        );
        Ok(id)
    }

    fn vg_create(&mut self, name: &str) -> Outcome<VgId> {
        self.reset();
        if let Err(m) = rules::check_vg_name(name) {
            return self.settle(Err(fault(EINVAL, m)));
        }
        if self.state.vgs.contains_key(name) {
            return self.settle(Err(fault(
                EEXIST,
                format!("A volume group called {name} already exists"),
            )));
        }
        let id = VgId::new(self.alloc_id());
        self.vgs.insert(
            id,
            OpenVg {
                name: name.to_string(),
                mode: OpenMode::Write,
                meta: VgMeta::new(rules::new_uuid()),
                base: None,
                removed: false,
            },
        );
        Ok(id)
    }

    fn vg_close(&mut self, vg: VgId) {
        self.reset();
        self.vgs.remove(&vg);
        self.lvs.retain(|_, m| m.vg != vg);
        self.pvs.retain(|_, m| m.vg != vg);
    }

    fn vg_write(&mut self, vg: VgId) -> Outcome<()> {
        self.reset();
        let res = self.commit(vg);
        self.settle(res)
    }

    fn vg_remove(&mut self, vg: VgId) -> Outcome<()> {
        self.reset();
        let res = writable(&mut self.vgs, vg).and_then(|h| {
            if h.meta.lvs.is_empty() {
                h.removed = true;
                Ok(())
            } else {
                Err(fault(
                    EBUSY,
                    format!(
                        "Volume group \"{}\" still contains {} logical volume(s)",
                        h.name,
                        h.meta.lvs.len()
                    ),
                ))
            }
        });
        self.settle(res)
    }

    fn vg_extend(&mut self, vg: VgId, device: &str) -> Outcome<()> {
        self.reset();
        let res = self.extend(vg, device);
        self.settle(res)
    }

    fn vg_reduce(&mut self, vg: VgId, device: &str) -> Outcome<()> {
        self.reset();
        let res = self.reduce(vg, device);
        self.settle(res)
    }

    fn vg_add_tag(&mut self, vg: VgId, tag: &str) -> Outcome<()> {
        self.reset();
        let res = writable(&mut self.vgs, vg).and_then(|h| {
            rules::check_tag(tag).map_err(|m| fault(EINVAL, m))?;
            h.meta.tags.insert(tag.to_string());
            Ok(())
        });
        self.settle(res)
    }

    fn vg_remove_tag(&mut self, vg: VgId, tag: &str) -> Outcome<()> {
        self.reset();
        let res = writable(&mut self.vgs, vg).and_then(|h| {
            rules::check_tag(tag).map_err(|m| fault(EINVAL, m))?;
            h.meta.tags.remove(tag);
            Ok(())
        });
        self.settle(res)
    }

    fn vg_set_extent_size(&mut self, vg: VgId, size: u32) -> Outcome<()> {
        self.reset();
        let res = self.set_extent_size(vg, size);
        self.settle(res)
    }

    fn vg_info(&mut self, vg: VgId) -> Outcome<VgInfo> {
        self.reset();
        let res = open_vg(&mut self.vgs, vg).map(|h| h.meta.info(&h.name));
        self.settle(res)
    }

    fn vg_tags(&mut self, vg: VgId) -> Option<Vec<String>> {
        self.reset();
        let res = open_vg(&mut self.vgs, vg).map(|h| h.meta.tags.iter().cloned().collect::<Vec<_>>());
        self.settle(res).ok()
    }

    fn vg_list_lvs(&mut self, vg: VgId) -> Option<Vec<LvId>> {
        self.reset();
        let res = open_vg(&mut self.vgs, vg).map(|h| h.meta.lvs.iter().map(|lv| lv.uuid.clone()).collect::<Vec<_>>());
        let uuids: Vec<String> = self.settle(res).ok()?;
        Some(Self::child_ids(&mut self.lvs, &mut self.next_id, LvId::new, vg, uuids))
    }

    fn vg_list_pvs(&mut self, vg: VgId) -> Option<Vec<PvId>> {
        self.reset();
        let res = open_vg(&mut self.vgs, vg).map(|h| h.meta.pvs.iter().map(|pv| pv.uuid.clone()).collect::<Vec<_>>());
        let uuids: Vec<String> = self.settle(res).ok()?;
        if uuids.is_empty() {
            return None;
        }
        Some(Self::child_ids(&mut self.pvs, &mut self.next_id, PvId::new, vg, uuids))
    }

    fn vg_create_lv_linear(&mut self, vg: VgId, name: &str, size: u64) -> Outcome<LvId> {
        self.reset();
        let res = self.create_lv(vg, name, size);
        self.settle(res)
    }

    fn lv_info(&mut self, lv: LvId) -> Outcome<LvInfo> {
        self.reset();
        let res = self.lv_view(lv, |vg, lv| vg.lv_info(lv));
        self.settle(res)
    }

    fn lv_tags(&mut self, lv: LvId) -> Option<Vec<String>> {
        self.reset();
        let res = self.lv_view(lv, |_, lv| lv.tags.iter().cloned().collect::<Vec<_>>());
        self.settle(res).ok()
    }

    fn lv_activate(&mut self, lv: LvId) -> Outcome<()> {
        self.reset();
        let res = self.set_active(lv, true);
        self.settle(res)
    }

    fn lv_deactivate(&mut self, lv: LvId) -> Outcome<()> {
        self.reset();
        let res = self.set_active(lv, false);
        self.settle(res)
    }

    fn lv_remove(&mut self, lv: LvId) -> Outcome<()> {
        self.reset();
        let res = self.remove_lv(lv);
        self.settle(res)
    }

    fn lv_add_tag(&mut self, lv: LvId, tag: &str) -> Outcome<()> {
        self.reset();
        let res = self.lv_edit(lv, |vg, idx| {
            rules::check_tag(tag).map_err(|m| fault(EINVAL, m))?;
            vg.lvs[idx].tags.insert(tag.to_string());
            Ok(())
        });
        self.settle(res)
    }

    fn lv_remove_tag(&mut self, lv: LvId, tag: &str) -> Outcome<()> {
        self.reset();
        let res = self.lv_edit(lv, |vg, idx| {
            rules::check_tag(tag).map_err(|m| fault(EINVAL, m))?;
            vg.lvs[idx].tags.remove(tag);
            Ok(())
        });
        self.settle(res)
    }

    fn lv_resize(&mut self, lv: LvId, size: u64) -> Outcome<()> {
        self.reset();
        let res = self.lv_edit(lv, |vg, idx| {
            if size == 0 {
                return Err(fault(EINVAL, "New size must be non-zero"));
            }
            let want = vg.extents_for(size);
            let have = vg.lvs[idx].extents();
            if want > have {
                let more = vg.allocate(want - have).ok_or_else(|| {
                    fault(
                        ENOSPC,
                        format!(
                            "Insufficient free extents ({}) to extend \"{}\" by {}",
                            vg.free_extents(),
                            vg.lvs[idx].name,
                            want - have
                        ),
                    )
                })?;
                vg.lvs[idx].grow(more);
            } else {
                vg.lvs[idx].shrink_to(want);
            }
            Ok(())
        });
        self.settle(res)
    }

    fn pv_info(&mut self, pv: PvId) -> Outcome<PvInfo> {
        self.reset();
        let res = self.pv_view(pv, |vg, pv| vg.pv_info(pv));
        self.settle(res)
    }

    fn pv_resize(&mut self, pv: PvId, size: u64) -> Outcome<()> {
        self.reset();
        let res = self.resize_pv(pv, size);
        self.settle(res)
    }
}

impl Drop for MemoryEngine {
    fn drop(&mut self) {
        if !self.vgs.is_empty() {
            log::debug!("memory engine: quitting with {} open vg(s)", self.vgs.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    const MIB: u64 = 1 << 20;

    fn engine_with(devs: &[(&str, u64)]) -> MemoryEngine {
        let mut e = MemoryEngine::new();
        for (d, s) in devs {
            e.add_device(d, *s).unwrap();
        }
        e
    }

    fn new_vg(e: &mut MemoryEngine, name: &str, dev: &str) -> VgId {
        let vg = e.vg_create(name).unwrap();
        e.vg_extend(vg, dev).unwrap();
        e.vg_write(vg).unwrap();
        vg
    }

    #[test]
    fn write_bumps_seqno_and_commits() {
        let mut e = engine_with(&[("/dev/sdb", 64 * MIB)]);
        let vg = new_vg(&mut e, "vg0", "/dev/sdb");
        assert_eq!(e.vg_info(vg).unwrap().seqno, 1);
        assert_eq!(e.list_vg_names().unwrap(), vec!["vg0".to_string()]);
    }

    #[test]
    fn write_without_pvs_fails() {
        let mut e = engine_with(&[]);
        let vg = e.vg_create("vg0").unwrap();
        assert_eq!(e.vg_write(vg), Err(Failed));
        assert_eq!(e.errno(), EINVAL);
        assert!(e.errmsg().contains("no physical volumes"));
    }

    #[test]
    fn stale_handle_write_is_rejected() {
        let mut e = engine_with(&[("/dev/sdb", 64 * MIB)]);
        let vg = new_vg(&mut e, "vg0", "/dev/sdb");
        let a = e.vg_open("vg0", OpenMode::Write, 0).unwrap();
        let b = e.vg_open("vg0", OpenMode::Write, 0).unwrap();
        e.vg_add_tag(a, "one").unwrap();
        e.vg_write(a).unwrap();
        e.vg_add_tag(b, "two").unwrap();
        assert_eq!(e.vg_write(b), Err(Failed));
        assert_eq!(e.errno(), EBUSY);
        e.vg_close(vg);
    }

    #[test]
    fn device_in_other_vg_is_busy() {
        let mut e = engine_with(&[("/dev/sdb", 64 * MIB)]);
        new_vg(&mut e, "vg0", "/dev/sdb");
        let vg1 = e.vg_create("vg1").unwrap();
        assert_eq!(e.vg_extend(vg1, "/dev/sdb"), Err(Failed));
        assert_eq!(e.errno(), EBUSY);
        assert_eq!(e.vg_extend(vg1, "/dev/nope"), Err(Failed));
        assert_eq!(e.errno(), ENOENT);
    }

    #[test]
    fn errno_resets_on_success() {
        let mut e = engine_with(&[]);
        assert!(e.vg_open("x", OpenMode::Read, 0).is_err());
        assert_eq!(e.errno(), ENOENT);
        e.list_vg_names();
        assert_eq!(e.errno(), 0);
        assert!(e.errmsg().is_empty());
    }

    #[test]
    fn reduce_rules() {
        let mut e = engine_with(&[("/dev/sdb", 64 * MIB), ("/dev/sdc", 64 * MIB)]);
        let vg = new_vg(&mut e, "vg0", "/dev/sdb");
        assert_eq!(e.vg_reduce(vg, "/dev/sdb"), Err(Failed));
        assert_eq!(e.errno(), EINVAL);

        e.vg_extend(vg, "/dev/sdc").unwrap();
        e.vg_create_lv_linear(vg, "lv", 8 * MIB).unwrap();
        assert_eq!(e.vg_reduce(vg, "/dev/sdb"), Err(Failed));
        assert_eq!(e.errno(), EBUSY);
        e.vg_reduce(vg, "/dev/sdc").unwrap();
        assert_eq!(e.vg_info(vg).unwrap().pv_count, 1);
    }

    #[test]
    fn create_lv_commits_and_insufficient_space_fails() {
        let mut e = engine_with(&[("/dev/sdb", 64 * MIB)]);
        let vg = new_vg(&mut e, "vg0", "/dev/sdb");
        e.vg_create_lv_linear(vg, "lv0", 8 * MIB).unwrap();
        assert_eq!(e.state.vgs["vg0"].lvs.len(), 1);
        assert_eq!(e.state.vgs["vg0"].seqno, 2);

        assert_eq!(e.vg_create_lv_linear(vg, "big", 1 << 30), Err(Failed));
        assert_eq!(e.errno(), ENOSPC);
        assert_eq!(e.vg_create_lv_linear(vg, "lv0", MIB), Err(Failed));
        assert_eq!(e.errno(), EEXIST);
    }

    #[test]
    fn vg_remove_refuses_with_lvs() {
        let mut e = engine_with(&[("/dev/sdb", 64 * MIB)]);
        let vg = new_vg(&mut e, "vg0", "/dev/sdb");
        let lv = e.vg_create_lv_linear(vg, "lv0", 8 * MIB).unwrap();
        assert_eq!(e.vg_remove(vg), Err(Failed));
        assert_eq!(e.errno(), EBUSY);
        e.lv_remove(lv).unwrap();
        e.vg_remove(vg).unwrap();
        e.vg_write(vg).unwrap();
        assert!(e.list_vg_names().unwrap().is_empty());
        assert_eq!(e.vgname_from_device("/dev/sdb"), Err(Failed));
    }

    #[test]
    fn lookups_by_pvid_and_device() {
        let mut e = engine_with(&[("/dev/sdb", 64 * MIB)]);
        let vg = new_vg(&mut e, "vg0", "/dev/sdb");
        let pv = e.vg_list_pvs(vg).unwrap()[0];
        let uuid = e.pv_info(pv).unwrap().uuid;
        assert_eq!(e.vgname_from_pvid(&rules::bare_uuid(&uuid)).unwrap(), "vg0");
        assert_eq!(e.vgname_from_pvid(&uuid).unwrap(), "vg0");
        assert_eq!(e.vgname_from_device("/dev/sdb").unwrap(), "vg0");
    }

    #[test]
    fn list_ids_are_stable_per_vg_handle() {
        let mut e = engine_with(&[("/dev/sdb", 64 * MIB)]);
        let vg = new_vg(&mut e, "vg0", "/dev/sdb");
        e.vg_create_lv_linear(vg, "lv0", 8 * MIB).unwrap();
        let first = e.vg_list_lvs(vg).unwrap();
        let second = e.vg_list_lvs(vg).unwrap();
        assert_eq!(first, second);
        e.vg_close(vg);
        assert!(e.vg_list_lvs(vg).is_none());
        assert_eq!(e.errno(), EINVAL);
        assert_eq!(e.lv_info(first[0]), Err(Failed));
    }

    #[test]
    fn persists_across_engines_and_scan_reloads() {
        let tmp = TempDir::new().unwrap();
        let mut a = MemoryEngine::init(Some(tmp.path()));
        assert_eq!(a.errno(), 0);
        a.add_device("/dev/sdb", 64 * MIB).unwrap();
        new_vg(&mut a, "vg0", "/dev/sdb");

        let mut b = MemoryEngine::init(Some(tmp.path()));
        assert_eq!(b.list_vg_names().unwrap(), vec!["vg0".to_string()]);

        a.add_device("/dev/sdc", 64 * MIB).unwrap();
        new_vg(&mut a, "vg1", "/dev/sdc");
        assert_eq!(b.list_vg_names().unwrap().len(), 1);
        assert_eq!(b.scan(), Ok(0));
        assert_eq!(b.list_vg_names().unwrap().len(), 2);
    }

    #[test]
    fn commits_merge_with_state_written_by_another_engine() {
        let tmp = TempDir::new().unwrap();
        let mut seed = MemoryEngine::init(Some(tmp.path()));
        seed.add_device("/dev/sdb", 64 * MIB).unwrap();
        seed.add_device("/dev/sdc", 64 * MIB).unwrap();

        let mut a = MemoryEngine::init(Some(tmp.path()));
        let mut b = MemoryEngine::init(Some(tmp.path()));
        new_vg(&mut b, "vg1", "/dev/sdc");
        new_vg(&mut a, "vg0", "/dev/sdb");

        let on_disk = State::load(tmp.path()).unwrap();
        assert_eq!(on_disk.vgs.keys().collect::<Vec<_>>(), vec!["vg0", "vg1"]);
        assert_eq!(on_disk.devices.len(), 2);
    }

    #[test]
    fn commit_checks_names_and_devices_against_disk() {
        let tmp = TempDir::new().unwrap();
        let mut seed = MemoryEngine::init(Some(tmp.path()));
        seed.add_device("/dev/sdb", 64 * MIB).unwrap();
        seed.add_device("/dev/sdc", 64 * MIB).unwrap();

        let mut a = MemoryEngine::init(Some(tmp.path()));
        let mut b = MemoryEngine::init(Some(tmp.path()));
        new_vg(&mut b, "vgx", "/dev/sdb");

        let vg = a.vg_create("vgy").unwrap();
        a.vg_extend(vg, "/dev/sdb").unwrap();
        assert_eq!(a.vg_write(vg), Err(Failed));
        assert_eq!(a.errno(), EBUSY);
        assert!(a.errmsg().contains("vgx"), "errmsg was: {}", a.errmsg());

        let dup = a.vg_create("vgx").unwrap();
        a.vg_extend(dup, "/dev/sdc").unwrap();
        assert_eq!(a.vg_write(dup), Err(Failed));
        assert_eq!(a.errno(), EEXIST);
    }

    #[test]
    fn activation_is_recorded_without_write() {
        let mut e = engine_with(&[("/dev/sdb", 64 * MIB)]);
        let vg = new_vg(&mut e, "vg0", "/dev/sdb");
        let lv = e.vg_create_lv_linear(vg, "lv0", 8 * MIB).unwrap();
        e.lv_deactivate(lv).unwrap();
        assert!(!e.lv_info(lv).unwrap().active);
        assert!(!e.state.vgs["vg0"].lvs[0].active);
    }

    #[test]
    fn add_device_validates() {
        let mut e = MemoryEngine::new();
        assert!(e.add_device("sdb", 64 * MIB).is_err());
        assert!(e.add_device("/dev/tiny", 4096).is_err());
        e.add_device("/dev/sdb", 64 * MIB).unwrap();
        assert_eq!(e.devices().collect::<Vec<_>>(), vec![("/dev/sdb", 64 * MIB)]);
    }
}
