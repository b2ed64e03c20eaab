use std::{
    collections::{BTreeMap, BTreeSet},
    fs, io,
    path::Path,
};

use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::engine::{LvInfo, PvInfo, VgInfo};

pub const STATE_FILE: &str = "lvmkit-state.json";
const LOCK_FILE: &str = "lvmkit-state.lock";

/// Space at the head of every PV kept for its metadata area.
pub(super) const PV_RESERVED: u64 = 1 << 20;
pub(super) const DEFAULT_EXTENT_SIZE: u64 = 4 << 20;

/// Everything the engine knows: fake block devices and committed VGs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(super) struct State {
    #[serde(default)]
    pub devices: BTreeMap<String, u64>,
    #[serde(default)]
    pub vgs: BTreeMap<String, VgMeta>,
}

impl State {
    /// Missing file means an empty system.
    pub fn load(dir: &Path) -> io::Result<Self> {
        let path = dir.join(STATE_FILE);
        match fs::read(&path) {
            Ok(raw) => serde_json::from_slice(&raw)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    pub fn save(&self, dir: &Path) -> io::Result<()> {
        fs::create_dir_all(dir)?;
        let path = dir.join(STATE_FILE);
        let tmp = dir.join(format!("{STATE_FILE}.tmp"));
        let raw = serde_json::to_vec_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(&tmp, raw)?;
        fs::rename(&tmp, &path)
    }

    pub fn device_owner(&self, device: &str) -> Option<&str> {
        self.vgs
            .iter()
            .find(|(_, vg)| vg.pvs.iter().any(|pv| pv.device == device))
            .map(|(name, _)| name.as_str())
    }
}

/// Blocks until this process holds the exclusive metadata lock of `dir`.
/// The lock is released when the returned file is dropped.
pub(super) fn lock(dir: &Path) -> io::Result<fs::File> {
    fs::create_dir_all(dir)?;
    let file = fs::OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(dir.join(LOCK_FILE))?;
    file.lock_exclusive()?;
    Ok(file)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(super) struct VgMeta {
    pub uuid: String,
    pub seqno: u64,
    pub extent_size: u64,
    #[serde(default)]
    pub max_pv: u64,
    #[serde(default)]
    pub max_lv: u64,
    #[serde(default)]
    pub clustered: bool,
    #[serde(default)]
    pub exported: bool,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub pvs: Vec<PvMeta>,
    #[serde(default)]
    pub lvs: Vec<LvMeta>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(super) struct PvMeta {
    pub device: String,
    pub uuid: String,
    pub mda_count: u64,
    pub dev_size: u64,
    pub pe_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(super) struct LvMeta {
    pub name: String,
    pub uuid: String,
    pub segments: Vec<Segment>,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

/// A run of extents on one PV (by PV uuid).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(super) struct Segment {
    pub pv: String,
    pub extents: u64,
}

/// Extents a device of `dev_size` bytes provides.
#[inline]
pub(super) fn pe_count_for(dev_size: u64, extent_size: u64) -> u64 {
    dev_size.saturating_sub(PV_RESERVED) / extent_size
}

impl VgMeta {
    pub fn new(uuid: String) -> Self {
        Self {
            uuid,
            seqno: 0,
            extent_size: DEFAULT_EXTENT_SIZE,
            max_pv: 0,
            max_lv: 0,
            clustered: false,
            exported: false,
            tags: BTreeSet::new(),
            pvs: Vec::new(),
            lvs: Vec::new(),
        }
    }

    pub fn extent_count(&self) -> u64 {
        self.pvs.iter().map(|pv| pv.pe_count).sum()
    }

    pub fn allocated_on(&self, pv_uuid: &str) -> u64 {
        self.lvs
            .iter()
            .flat_map(|lv| &lv.segments)
            .filter(|s| s.pv == pv_uuid)
            .map(|s| s.extents)
            .sum()
    }

    pub fn free_extents(&self) -> u64 {
        self.pvs
            .iter()
            .map(|pv| pv.pe_count.saturating_sub(self.allocated_on(&pv.uuid)))
            .sum()
    }

    /// First-fit, PV by PV in VG order. `None` if the VG is too small.
    pub fn allocate(&self, mut extents: u64) -> Option<Vec<Segment>> {
        let mut out = Vec::new();
        for pv in &self.pvs {
            if extents == 0 {
                break;
            }
            let free = pv.pe_count.saturating_sub(self.allocated_on(&pv.uuid));
            let take = free.min(extents);
            if take > 0 {
                out.push(Segment {
                    pv: pv.uuid.clone(),
                    extents: take,
                });
                extents -= take;
            }
        }
        (extents == 0).then_some(out)
    }

    /// Whole extents needed to hold `bytes`.
    #[inline]
    pub fn extents_for(&self, bytes: u64) -> u64 {
        bytes.div_ceil(self.extent_size)
    }

    pub fn lv_index(&self, uuid: &str) -> Option<usize> {
        self.lvs.iter().position(|lv| lv.uuid == uuid)
    }

    pub fn pv_index(&self, uuid: &str) -> Option<usize> {
        self.pvs.iter().position(|pv| pv.uuid == uuid)
    }

    pub fn info(&self, name: &str) -> VgInfo {
        let extent_count = self.extent_count();
        let free_extent_count = self.free_extents();
        VgInfo {
            name: name.to_string(),
            uuid: self.uuid.clone(),
            seqno: self.seqno,
            size: extent_count * self.extent_size,
            free_size: free_extent_count * self.extent_size,
            extent_size: self.extent_size,
            extent_count,
            free_extent_count,
            pv_count: self.pvs.len() as u64,
            max_pv: self.max_pv,
            max_lv: self.max_lv,
            clustered: self.clustered,
            exported: self.exported,
            partial: false,
        }
    }

    pub fn lv_info(&self, lv: &LvMeta) -> LvInfo {
        LvInfo {
            name: lv.name.clone(),
            uuid: lv.uuid.clone(),
            size: lv.extents() * self.extent_size,
            active: lv.active,
            suspended: false,
        }
    }

    pub fn pv_info(&self, pv: &PvMeta) -> PvInfo {
        let free = pv.pe_count.saturating_sub(self.allocated_on(&pv.uuid));
        PvInfo {
            name: pv.device.clone(),
            uuid: pv.uuid.clone(),
            mda_count: pv.mda_count,
            size: pv.pe_count * self.extent_size,
            dev_size: pv.dev_size,
            free: free * self.extent_size,
        }
    }
}

impl LvMeta {
    pub fn extents(&self) -> u64 {
        self.segments.iter().map(|s| s.extents).sum()
    }

    /// Appends segments, merging with the tail when it continues on the same PV.
    pub fn grow(&mut self, more: Vec<Segment>) {
        for seg in more {
            match self.segments.last_mut() {
                Some(last) if last.pv == seg.pv => last.extents += seg.extents,
                _ => self.segments.push(seg),
            }
        }
    }

    /// Drops extents from the end until `extents` remain.
    pub fn shrink_to(&mut self, extents: u64) {
        let mut keep = extents;
        let mut out = Vec::with_capacity(self.segments.len());
        for mut seg in self.segments.drain(..) {
            if keep == 0 {
                break;
            }
            seg.extents = seg.extents.min(keep);
            keep -= seg.extents;
            out.push(seg);
        }
        self.segments = out;
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    const MIB: u64 = 1 << 20;

    fn vg_with(pvs: &[(&str, u64)]) -> VgMeta {
        let mut vg = VgMeta::new("vg-uuid".into());
        for (uuid, pe) in pvs {
            vg.pvs.push(PvMeta {
                device: format!("/dev/{uuid}"),
                uuid: uuid.to_string(),
                mda_count: 1,
                dev_size: pe * DEFAULT_EXTENT_SIZE + PV_RESERVED,
                pe_count: *pe,
            });
        }
        vg
    }

    #[test]
    fn allocate_spans_pvs_first_fit() {
        let vg = vg_with(&[("a", 3), ("b", 5)]);
        let segs = vg.allocate(5).unwrap();
        assert_eq!(
            segs,
            vec![
                Segment {
                    pv: "a".into(),
                    extents: 3
                },
                Segment {
                    pv: "b".into(),
                    extents: 2
                },
            ]
        );
        assert!(vg.allocate(9).is_none());
    }

    #[test]
    fn grow_and_shrink_keep_accounting() {
        let mut vg = vg_with(&[("a", 4), ("b", 4)]);
        let mut lv = LvMeta {
            name: "lv".into(),
            uuid: "lv-uuid".into(),
            segments: vg.allocate(2).unwrap(),
            active: true,
            tags: BTreeSet::new(),
        };
        vg.lvs.push(lv.clone());
        let more = vg.allocate(4).unwrap();
        lv.grow(more);
        assert_eq!(lv.extents(), 6);
        assert_eq!(lv.segments.len(), 2);

        lv.shrink_to(3);
        assert_eq!(lv.extents(), 3);
        assert_eq!(lv.segments.len(), 1);
        vg.lvs[0] = lv;
        assert_eq!(vg.free_extents(), 5);
    }

    #[test]
    fn info_reports_bytes() {
        let vg = vg_with(&[("a", 10)]);
        let info = vg.info("vg0");
        assert_eq!(info.size, 40 * MIB);
        assert_eq!(info.extent_count, 10);
        assert_eq!(info.pv_count, 1);
        assert_eq!(pe_count_for(64 * MIB, DEFAULT_EXTENT_SIZE), 15);
    }

    #[test]
    fn state_roundtrips_through_dir() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(State::load(tmp.path()).unwrap(), State::default());

        let mut st = State::default();
        st.devices.insert("/dev/a".into(), 64 * MIB);
        st.vgs.insert("vg0".into(), vg_with(&[("a", 15)]));
        st.save(tmp.path()).unwrap();

        let back = State::load(tmp.path()).unwrap();
        assert_eq!(back, st);
        assert_eq!(back.device_owner("/dev/a"), Some("vg0"));
        assert_eq!(back.device_owner("/dev/zzz"), None);
    }

    #[test]
    fn metadata_lock_is_exclusive_until_dropped() {
        let tmp = TempDir::new().unwrap();
        let held = lock(tmp.path()).unwrap();

        let other = fs::OpenOptions::new()
            .write(true)
            .open(tmp.path().join(LOCK_FILE))
            .unwrap();
        assert!(other.try_lock_exclusive().is_err());

        drop(held);
        other.try_lock_exclusive().unwrap();
    }
}
