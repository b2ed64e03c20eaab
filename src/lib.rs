//! Safe handles over a handle-based LVM engine.
//!
//! [`Lvm`] is the engine session. Volume groups opened or created through it
//! hand out [`LogicalVolume`] and [`PhysicalVolume`] handles. Every failing
//! call is reported as [`Error::Lvm`] carrying the session's last error code
//! and message.
//!
//! ```no_run
//! use lvmkit::{Lvm, OpenMode};
//!
//! # fn main() -> lvmkit::Result<()> {
//! let lvm = Lvm::in_memory(Some("/var/lib/lvmkit".as_ref()))?;
//! let mut vg = lvm.vg_open("myvg", OpenMode::Write)?;
//! let lv = vg.create_lv_linear("lv_foobar", 100_000)?;
//! lv.add_tag("my_fancy_tag")?;
//! println!("{} {:?}", lv.uuid()?, lv.tags()?);
//! lv.remove()?;
//! vg.close();
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod error;

mod lv;
mod lvm;
mod pv;
mod vg;

pub use engine::{Engine, LvInfo, OpenMode, PvInfo, VgInfo};
pub use error::{Error, LastError, Result};
pub use lv::LogicalVolume;
pub use lvm::Lvm;
pub use pv::PhysicalVolume;
pub use vg::VolumeGroup;
