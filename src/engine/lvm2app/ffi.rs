//! Declarations for the parts of `lvm2app.h` the binding uses.
//!
//! Handles are opaque pointers owned by the library. Strings returned by the
//! getters live in the VG's memory pool and stay valid until the VG is
//! closed; the engine copies them out immediately.

use std::ffi::{c_char, c_int};

#[repr(C)]
pub struct Lvm {
    _private: [u8; 0],
}

#[repr(C)]
pub struct Vg {
    _private: [u8; 0],
}

#[repr(C)]
pub struct Lv {
    _private: [u8; 0],
}

#[repr(C)]
pub struct Pv {
    _private: [u8; 0],
}

/// Intrusive doubly linked list head from libdevmapper.
#[repr(C)]
pub struct DmList {
    pub n: *mut DmList,
    pub p: *mut DmList,
}

/// Every list item embeds the `DmList` link as its first field.
#[repr(C)]
pub struct LvmStrList {
    pub list: DmList,
    pub str: *const c_char,
}

#[repr(C)]
pub struct LvmLvList {
    pub list: DmList,
    pub lv: *mut Lv,
}

#[repr(C)]
pub struct LvmPvList {
    pub list: DmList,
    pub pv: *mut Pv,
}

unsafe extern "C" {
    pub fn lvm_init(system_dir: *const c_char) -> *mut Lvm;
    pub fn lvm_quit(libh: *mut Lvm);
    pub fn lvm_errno(libh: *mut Lvm) -> c_int;
    pub fn lvm_errmsg(libh: *mut Lvm) -> *const c_char;
    pub fn lvm_library_get_version() -> *const c_char;

    pub fn lvm_config_reload(libh: *mut Lvm) -> c_int;
    pub fn lvm_config_override(libh: *mut Lvm, config_string: *const c_char) -> c_int;
    pub fn lvm_scan(libh: *mut Lvm) -> c_int;

    pub fn lvm_list_vg_names(libh: *mut Lvm) -> *mut DmList;
    pub fn lvm_list_vg_uuids(libh: *mut Lvm) -> *mut DmList;
    pub fn lvm_vgname_from_pvid(libh: *mut Lvm, pvid: *const c_char) -> *const c_char;
    pub fn lvm_vgname_from_device(libh: *mut Lvm, device: *const c_char) -> *const c_char;

    pub fn lvm_vg_open(
        libh: *mut Lvm,
        vgname: *const c_char,
        mode: *const c_char,
        flags: u32,
    ) -> *mut Vg;
    pub fn lvm_vg_create(libh: *mut Lvm, vg_name: *const c_char) -> *mut Vg;
    pub fn lvm_vg_close(vg: *mut Vg) -> c_int;
    pub fn lvm_vg_write(vg: *mut Vg) -> c_int;
    pub fn lvm_vg_remove(vg: *mut Vg) -> c_int;
    pub fn lvm_vg_extend(vg: *mut Vg, device: *const c_char) -> c_int;
    pub fn lvm_vg_reduce(vg: *mut Vg, device: *const c_char) -> c_int;
    pub fn lvm_vg_add_tag(vg: *mut Vg, tag: *const c_char) -> c_int;
    pub fn lvm_vg_remove_tag(vg: *mut Vg, tag: *const c_char) -> c_int;
    pub fn lvm_vg_set_extent_size(vg: *mut Vg, new_size: u32) -> c_int;

    pub fn lvm_vg_get_name(vg: *mut Vg) -> *const c_char;
    pub fn lvm_vg_get_uuid(vg: *mut Vg) -> *const c_char;
    pub fn lvm_vg_get_seqno(vg: *mut Vg) -> u64;
    pub fn lvm_vg_get_size(vg: *mut Vg) -> u64;
    pub fn lvm_vg_get_free_size(vg: *mut Vg) -> u64;
    pub fn lvm_vg_get_extent_size(vg: *mut Vg) -> u64;
    pub fn lvm_vg_get_extent_count(vg: *mut Vg) -> u64;
    pub fn lvm_vg_get_free_extent_count(vg: *mut Vg) -> u64;
    pub fn lvm_vg_get_pv_count(vg: *mut Vg) -> u64;
    pub fn lvm_vg_get_max_pv(vg: *mut Vg) -> u64;
    pub fn lvm_vg_get_max_lv(vg: *mut Vg) -> u64;
    pub fn lvm_vg_is_clustered(vg: *mut Vg) -> u64;
    pub fn lvm_vg_is_exported(vg: *mut Vg) -> u64;
    pub fn lvm_vg_is_partial(vg: *mut Vg) -> u64;
    pub fn lvm_vg_get_tags(vg: *mut Vg) -> *mut DmList;
    pub fn lvm_vg_list_lvs(vg: *mut Vg) -> *mut DmList;
    pub fn lvm_vg_list_pvs(vg: *mut Vg) -> *mut DmList;
    pub fn lvm_vg_create_lv_linear(vg: *mut Vg, name: *const c_char, size: u64) -> *mut Lv;

    pub fn lvm_vg_remove_lv(lv: *mut Lv) -> c_int;
    pub fn lvm_lv_activate(lv: *mut Lv) -> c_int;
    pub fn lvm_lv_deactivate(lv: *mut Lv) -> c_int;
    pub fn lvm_lv_get_name(lv: *mut Lv) -> *const c_char;
    pub fn lvm_lv_get_uuid(lv: *mut Lv) -> *const c_char;
    pub fn lvm_lv_get_size(lv: *mut Lv) -> u64;
    pub fn lvm_lv_is_active(lv: *mut Lv) -> u64;
    pub fn lvm_lv_is_suspended(lv: *mut Lv) -> u64;
    pub fn lvm_lv_add_tag(lv: *mut Lv, tag: *const c_char) -> c_int;
    pub fn lvm_lv_remove_tag(lv: *mut Lv, tag: *const c_char) -> c_int;
    pub fn lvm_lv_get_tags(lv: *mut Lv) -> *mut DmList;
    pub fn lvm_lv_resize(lv: *mut Lv, new_size: u64) -> c_int;

    pub fn lvm_pv_get_name(pv: *mut Pv) -> *const c_char;
    pub fn lvm_pv_get_uuid(pv: *mut Pv) -> *const c_char;
    pub fn lvm_pv_get_mda_count(pv: *mut Pv) -> u64;
    pub fn lvm_pv_get_dev_size(pv: *mut Pv) -> u64;
    pub fn lvm_pv_get_size(pv: *mut Pv) -> u64;
    pub fn lvm_pv_get_free(pv: *mut Pv) -> u64;
    pub fn lvm_pv_resize(pv: *mut Pv, new_size: u64) -> c_int;
}
