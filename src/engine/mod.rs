//! The engine contract the handles forward to.
//!
//! An engine is a session-scoped, handle-based API: calls return either a
//! value or the [`Failed`] sentinel, and the details of the most recent
//! failure are read back through [`Engine::errno`] / [`Engine::errmsg`].

use std::{fmt, str::FromStr};

use serde::Serialize;

use crate::error::Error;

#[cfg(feature = "lvm2app")]
pub mod lvm2app;
pub mod memory;

#[cfg(feature = "lvm2app")]
pub use lvm2app::Lvm2App;
pub use memory::MemoryEngine;

/// Failure sentinel. The reason lives in the engine's last-error state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Failed;

pub type Outcome<T> = Result<T, Failed>;

macro_rules! opaque_id {
    ($(#[$m:meta])* $name:ident) => {
        $(#[$m])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u64);

        impl $name {
            #[inline]
            pub fn new(raw: u64) -> Self {
                Self(raw)
            }
            #[inline]
            pub fn raw(self) -> u64 {
                self.0
            }
        }
    };
}

opaque_id!(
    /// Engine-side handle of an open volume group.
    VgId
);
opaque_id!(
    /// Engine-side handle of a logical volume, valid while its VG is open.
    LvId
);
opaque_id!(
    /// Engine-side handle of a physical volume, valid while its VG is open.
    PvId
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OpenMode {
    #[default]
    Read,
    Write,
}

impl OpenMode {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            OpenMode::Read => "r",
            OpenMode::Write => "w",
        }
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OpenMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "r" | "read" => Ok(OpenMode::Read),
            "w" | "write" => Ok(OpenMode::Write),
            other => Err(Error::Usage(format!(
                "bad open mode '{other}': use 'r' or 'w'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VgInfo {
    pub name: String,
    pub uuid: String,
    pub seqno: u64,
    pub size: u64,
    pub free_size: u64,
    pub extent_size: u64,
    pub extent_count: u64,
    pub free_extent_count: u64,
    pub pv_count: u64,
    pub max_pv: u64,
    pub max_lv: u64,
    pub clustered: bool,
    pub exported: bool,
    pub partial: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LvInfo {
    pub name: String,
    pub uuid: String,
    pub size: u64,
    pub active: bool,
    pub suspended: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PvInfo {
    pub name: String,
    pub uuid: String,
    pub mda_count: u64,
    pub size: u64,
    pub dev_size: u64,
    pub free: u64,
}

/// A session into a volume-management engine.
///
/// Dropping the engine ends the session (`lvm_quit` for the native library).
/// List calls return `None` where the engine hands back a null list.
pub trait Engine {
    fn errno(&self) -> i32;
    fn errmsg(&self) -> String;
    fn library_version(&self) -> String;

    fn list_vg_names(&mut self) -> Option<Vec<String>>;
    fn list_vg_uuids(&mut self) -> Option<Vec<String>>;
    fn vgname_from_pvid(&mut self, pvid: &str) -> Outcome<String>;
    fn vgname_from_device(&mut self, device: &str) -> Outcome<String>;
    fn config_reload(&mut self) -> Outcome<i32>;
    fn config_override(&mut self, text: &str) -> Outcome<i32>;
    fn scan(&mut self) -> Outcome<i32>;

    fn vg_open(&mut self, name: &str, mode: OpenMode, flags: u32) -> Outcome<VgId>;
    fn vg_create(&mut self, name: &str) -> Outcome<VgId>;
    fn vg_close(&mut self, vg: VgId);
    fn vg_write(&mut self, vg: VgId) -> Outcome<()>;
    fn vg_remove(&mut self, vg: VgId) -> Outcome<()>;
    fn vg_extend(&mut self, vg: VgId, device: &str) -> Outcome<()>;
    fn vg_reduce(&mut self, vg: VgId, device: &str) -> Outcome<()>;
    fn vg_add_tag(&mut self, vg: VgId, tag: &str) -> Outcome<()>;
    fn vg_remove_tag(&mut self, vg: VgId, tag: &str) -> Outcome<()>;
    fn vg_set_extent_size(&mut self, vg: VgId, size: u32) -> Outcome<()>;
    fn vg_info(&mut self, vg: VgId) -> Outcome<VgInfo>;
    fn vg_tags(&mut self, vg: VgId) -> Option<Vec<String>>;
    fn vg_list_lvs(&mut self, vg: VgId) -> Option<Vec<LvId>>;
    fn vg_list_pvs(&mut self, vg: VgId) -> Option<Vec<PvId>>;
    fn vg_create_lv_linear(&mut self, vg: VgId, name: &str, size: u64) -> Outcome<LvId>;

    fn lv_info(&mut self, lv: LvId) -> Outcome<LvInfo>;
    fn lv_tags(&mut self, lv: LvId) -> Option<Vec<String>>;
    fn lv_activate(&mut self, lv: LvId) -> Outcome<()>;
    fn lv_deactivate(&mut self, lv: LvId) -> Outcome<()>;
    fn lv_remove(&mut self, lv: LvId) -> Outcome<()>;
    fn lv_add_tag(&mut self, lv: LvId, tag: &str) -> Outcome<()>;
    fn lv_remove_tag(&mut self, lv: LvId, tag: &str) -> Outcome<()>;
    fn lv_resize(&mut self, lv: LvId, size: u64) -> Outcome<()>;

    fn pv_info(&mut self, pv: PvId) -> Outcome<PvInfo>;
    fn pv_resize(&mut self, pv: PvId, size: u64) -> Outcome<()>;
}
