use std::{
    cell::RefCell,
    io,
    path::Path,
    rc::{Rc, Weak},
};

use tracing as log;

use crate::{
    engine::{Engine, MemoryEngine, OpenMode, Outcome},
    error::{Error, LastError, Result},
    vg::VolumeGroup,
};

/// Shared session state. Child handles only keep a `Weak` to it.
pub(crate) struct Session {
    engine: RefCell<Option<Box<dyn Engine>>>,
}

impl Session {
    /// Runs one engine interaction; a failure is turned into the session's
    /// last error before the engine is released.
    pub(crate) fn run<T>(&self, f: impl FnOnce(&mut dyn Engine) -> Outcome<T>) -> Result<T> {
        let mut slot = self.engine.borrow_mut();
        let engine = slot.as_deref_mut().ok_or(Error::Closed("lvm session"))?;
        f(&mut *engine).map_err(|_| Error::from_last(last_of(engine)))
    }

    /// Runs a list call: `None` stays `None`, last error is captured alongside.
    pub(crate) fn run_list<T>(
        &self,
        f: impl FnOnce(&mut dyn Engine) -> Option<Vec<T>>,
    ) -> Result<(Option<Vec<T>>, LastError)> {
        let mut slot = self.engine.borrow_mut();
        let engine = slot.as_deref_mut().ok_or(Error::Closed("lvm session"))?;
        let out = f(&mut *engine);
        Ok((out, last_of(engine)))
    }

    pub(crate) fn last_error(&self) -> Result<LastError> {
        let slot = self.engine.borrow();
        let engine = slot.as_deref().ok_or(Error::Closed("lvm session"))?;
        Ok(last_of(engine))
    }

    fn quit(&self) -> bool {
        self.engine.borrow_mut().take().is_some()
    }
}

fn last_of(engine: &dyn Engine) -> LastError {
    LastError {
        code: engine.errno(),
        message: engine.errmsg(),
    }
}

/// Upgrades a child's back-reference to its session.
pub(crate) fn attach(session: &Weak<Session>) -> Result<Rc<Session>> {
    session.upgrade().ok_or(Error::Closed("lvm session"))
}

/// Rejects strings the C engine could not receive intact.
pub(crate) fn c_arg<'a>(what: &str, s: &'a str) -> Result<&'a str> {
    if s.contains('\0') {
        return Err(Error::Usage(format!("{what} contains a NUL byte")));
    }
    Ok(s)
}

/// Strict-list contract: a null or empty list is reported as an error.
pub(crate) fn non_empty<T>((list, last): (Option<Vec<T>>, LastError)) -> Result<Vec<T>> {
    match list {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(Error::from_last(last)),
    }
}

/// An engine session. Closing it (or dropping it) ends the session; handles
/// obtained from it fail with [`Error::Closed`] afterwards.
pub struct Lvm {
    session: Rc<Session>,
}

impl std::fmt::Debug for Lvm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lvm")
            .field("open", &self.session.engine.borrow().is_some())
            .finish()
    }
}

impl Lvm {
    /// Starts a session on the native `liblvm2app`, optionally scoped to a
    /// system directory other than `/etc/lvm`.
    #[cfg(feature = "lvm2app")]
    pub fn init(system_dir: Option<&Path>) -> Result<Self> {
        let engine = crate::engine::Lvm2App::init(system_dir)?;
        Self::with_engine(Box::new(engine))
    }

    /// Starts a session on the in-process engine; metadata lives in
    /// `system_dir` when one is given.
    pub fn in_memory(system_dir: Option<&Path>) -> Result<Self> {
        Self::with_engine(Box::new(MemoryEngine::init(system_dir)))
    }

    /// Wraps an already started engine. A non-zero error code at this point
    /// means initialization failed.
    pub fn with_engine(engine: Box<dyn Engine>) -> Result<Self> {
        let code = engine.errno();
        if code != 0 {
            log::debug!("engine init failed: {} ({code})", engine.errmsg());
            return Err(Error::Init(io::Error::from_raw_os_error(code)));
        }
        Ok(Self {
            session: Rc::new(Session {
                engine: RefCell::new(Some(engine)),
            }),
        })
    }

    /// Ends the session. Closing twice is a no-op.
    pub fn close(&mut self) {
        if self.session.quit() {
            log::debug!("lvm session closed");
        }
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.session.engine.borrow().is_none()
    }

    pub fn last_error(&self) -> Result<LastError> {
        self.session.last_error()
    }

    pub fn version(&self) -> Result<String> {
        self.session.run(|e| Ok(e.library_version()))
    }

    /// Names of all volume groups. An engine with none reports an error.
    pub fn list_vg_names(&self) -> Result<Vec<String>> {
        non_empty(self.session.run_list(|e| e.list_vg_names())?)
    }

    /// UUIDs of all volume groups; same contract as [`Lvm::list_vg_names`].
    pub fn list_vg_uuids(&self) -> Result<Vec<String>> {
        non_empty(self.session.run_list(|e| e.list_vg_uuids())?)
    }

    pub fn vg_name_from_pvid(&self, pvid: &str) -> Result<String> {
        let pvid = c_arg("pvid", pvid)?;
        self.session.run(|e| e.vgname_from_pvid(pvid))
    }

    pub fn vg_name_from_device(&self, device: &str) -> Result<String> {
        let device = c_arg("device", device)?;
        self.session.run(|e| e.vgname_from_device(device))
    }

    pub fn config_reload(&self) -> Result<i32> {
        self.session.run(|e| e.config_reload())
    }

    pub fn config_override(&self, text: &str) -> Result<i32> {
        let text = c_arg("config override", text)?;
        self.session.run(|e| e.config_override(text))
    }

    pub fn scan(&self) -> Result<i32> {
        self.session.run(|e| e.scan())
    }

    pub fn vg_open(&self, name: &str, mode: OpenMode) -> Result<VolumeGroup> {
        let name = c_arg("vg name", name)?;
        let id = self.session.run(|e| e.vg_open(name, mode, 0))?;
        log::debug!("opened vg {name} ({mode})");
        Ok(VolumeGroup::new(Rc::downgrade(&self.session), id))
    }

    /// Creates a volume group in memory; it is persisted by the first write
    /// (e.g. [`VolumeGroup::extend`]).
    pub fn vg_create(&self, name: &str) -> Result<VolumeGroup> {
        let name = c_arg("vg name", name)?;
        let id = self.session.run(|e| e.vg_create(name))?;
        log::debug!("created vg {name}");
        Ok(VolumeGroup::new(Rc::downgrade(&self.session), id))
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn closed_session_fails_every_call() {
        let mut lvm = Lvm::in_memory(None).unwrap();
        lvm.close();
        assert!(lvm.is_closed());

        assert!(lvm.version().unwrap_err().is_closed());
        assert!(lvm.last_error().unwrap_err().is_closed());
        assert!(lvm.list_vg_names().unwrap_err().is_closed());
        assert!(lvm.list_vg_uuids().unwrap_err().is_closed());
        assert!(lvm.scan().unwrap_err().is_closed());
        assert!(lvm.config_reload().unwrap_err().is_closed());
        assert!(lvm.config_override("x { }").unwrap_err().is_closed());
        assert!(lvm.vg_name_from_pvid("abc").unwrap_err().is_closed());
        assert!(lvm.vg_name_from_device("/dev/x").unwrap_err().is_closed());
        assert!(lvm.vg_open("vg0", OpenMode::Read).unwrap_err().is_closed());
        assert!(lvm.vg_create("vg0").unwrap_err().is_closed());
    }

    #[test]
    fn close_twice_is_noop() {
        let mut lvm = Lvm::in_memory(None).unwrap();
        lvm.close();
        lvm.close();
        assert!(lvm.is_closed());
    }

    #[test]
    fn init_fails_on_corrupt_state() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(memory_state_file()), "{ not json").unwrap();
        let err = Lvm::in_memory(Some(tmp.path())).unwrap_err();
        assert!(matches!(err, Error::Init(_)), "err was: {err:?}");
    }

    #[test]
    fn empty_engine_lists_are_errors() {
        let lvm = Lvm::in_memory(None).unwrap();
        let err = lvm.list_vg_names().unwrap_err();
        assert!(matches!(err, Error::Lvm { .. }), "err was: {err:?}");
        assert!(lvm.list_vg_uuids().is_err());
    }

    #[test]
    fn missing_vg_surfaces_code_and_message() {
        let lvm = Lvm::in_memory(None).unwrap();
        match lvm.vg_open("nope", OpenMode::Read).unwrap_err() {
            Error::Lvm { code, message } => {
                assert_ne!(code, 0);
                assert!(message.contains("nope"), "message was: {message}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_ne!(lvm.last_error().unwrap().code, 0);
    }

    #[test]
    fn nul_in_argument_is_usage_error() {
        let lvm = Lvm::in_memory(None).unwrap();
        let err = lvm.vg_create("bad\0name").unwrap_err();
        assert!(matches!(err, Error::Usage(_)), "err was: {err:?}");
    }

    #[test]
    fn config_override_returns_engine_code() {
        let lvm = Lvm::in_memory(None).unwrap();
        assert_eq!(lvm.config_override("devices { filter = [ \"a|.*|\" ] }").unwrap(), 0);
        assert!(lvm.config_override("devices { filter").is_err());
    }

    fn memory_state_file() -> &'static str {
        crate::engine::memory::STATE_FILE
    }
}
