use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{Context, Result, anyhow, bail};
use config as cfg;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Directory (next to the config file) the memory backend keeps its state in
/// when `engine.system_dir` is not set.
const DEFAULT_STATE_DIR: &str = "/var/lib/lvmkit";
const DEFAULT_LOCK: &str = "lvmkit";

#[derive(Debug, Clone)]
pub struct Config {
    pub engine: Engine,
    pub cli: Cli,
}

#[derive(Debug, Clone)]
pub struct Engine {
    pub backend: Backend,
    pub system_dir: Option<PathBuf>,
    pub overrides: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Cli {
    pub lock: String,
    pub lock_dir: Option<PathBuf>,
    pub output: Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Memory,
    Lvm2App,
}

impl Default for Backend {
    fn default() -> Self {
        if cfg!(feature = "lvm2app") {
            Backend::Lvm2App
        } else {
            Backend::Memory
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Memory => f.write_str("memory"),
            Backend::Lvm2App => f.write_str("lvm2app"),
        }
    }
}

impl FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Backend::Memory),
            "lvm2app" => Ok(Backend::Lvm2App),
            other => bail!("unknown engine backend '{}': use memory|lvm2app", other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Output {
    #[default]
    Table,
    Json,
}

impl FromStr for Output {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "table" => Ok(Output::Table),
            "json" => Ok(Output::Json),
            other => bail!("unknown output format '{}': use table|json", other),
        }
    }
}

impl Config {
    /// Loads `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let raw: RawConfig = cfg::Config::builder()
            .add_source(cfg::File::from(path).required(false))
            .build()
            .with_context(|| format!("load {}", path.display()))?
            .try_deserialize()
            .with_context(|| format!("deserialize {}", path.display()))?;

        let n = config_helpers::Normalizer { base_dir };

        let backend = match n.trim_opt(raw.engine.backend) {
            Some(s) => s.parse::<Backend>()?,
            None => Backend::default(),
        };
        if backend == Backend::Lvm2App && !cfg!(feature = "lvm2app") {
            bail!("engine.backend = \"lvm2app\" needs a build with the `lvm2app` feature");
        }
        let system_dir = match (n.trim_opt(raw.engine.system_dir), backend) {
            (Some(s), _) => Some(n.resolve(&s)),
            (None, Backend::Memory) => Some(PathBuf::from(DEFAULT_STATE_DIR)),
            (None, Backend::Lvm2App) => None,
        };
        let overrides = n.dedup(raw.engine.overrides.unwrap_or_default());
        if let Some(bad) = overrides.iter().find(|o| o.contains('\0')) {
            bail!("engine.overrides entry contains a NUL byte: {:?}", bad);
        }

        let lock = n
            .trim_opt(raw.cli.lock)
            .unwrap_or_else(|| DEFAULT_LOCK.to_string());
        if !Self::valid_name(&lock) {
            bail!("bad cli.lock '{}': use [A-Za-z0-9_-], length 1..32", lock);
        }
        let lock_dir = n.trim_opt(raw.cli.lock_dir).map(|s| n.resolve(&s));
        let output = match n.trim_opt(raw.cli.output) {
            Some(s) => s.parse::<Output>()?,
            None => Output::default(),
        };

        Ok(Self {
            engine: Engine {
                backend,
                system_dir,
                overrides,
            },
            cli: Cli {
                lock,
                lock_dir,
                output,
            },
        })
    }

    /// State directory of the memory backend.
    pub fn memory_dir(&self) -> Result<&Path> {
        if self.engine.backend != Backend::Memory {
            bail!(
                "engine backend is '{}'; this command needs the memory backend",
                self.engine.backend
            );
        }
        self.engine
            .system_dir
            .as_deref()
            .ok_or_else(|| anyhow!("engine.system_dir is not set"))
    }

    #[inline]
    fn valid_name(name: &str) -> bool {
        static NAME: std::sync::LazyLock<Regex> =
            std::sync::LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,32}$").unwrap());
        NAME.is_match(name)
    }

    pub fn to_redacted_toml(&self) -> Result<String> {
        #[derive(Serialize)]
        struct EngineOut<'a> {
            backend: Backend,
            #[serde(skip_serializing_if = "Option::is_none")]
            system_dir: Option<String>,
            #[serde(skip_serializing_if = "is_empty_slice")]
            overrides: &'a [String],
        }
        #[derive(Serialize)]
        struct CliOut<'a> {
            lock: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            lock_dir: Option<String>,
            output: Output,
        }
        #[derive(Serialize)]
        struct Out<'a> {
            engine: EngineOut<'a>,
            cli: CliOut<'a>,
        }

        let out = Out {
            engine: EngineOut {
                backend: self.engine.backend,
                system_dir: self
                    .engine
                    .system_dir
                    .as_ref()
                    .map(|p| p.display().to_string()),
                overrides: &self.engine.overrides,
            },
            cli: CliOut {
                lock: &self.cli.lock,
                lock_dir: self.cli.lock_dir.as_ref().map(|p| p.display().to_string()),
                output: self.cli.output,
            },
        };
        Ok(toml::to_string_pretty(&out)?)
    }
}

#[derive(Debug, Deserialize, Default)]
struct RawConfig {
    #[serde(default)]
    engine: RawEngine,

    #[serde(default)]
    cli: RawCli,
}

#[derive(Debug, Deserialize, Default)]
struct RawEngine {
    backend: Option<String>,
    system_dir: Option<String>,
    overrides: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct RawCli {
    lock: Option<String>,
    lock_dir: Option<String>,
    output: Option<String>,
}

fn is_empty_slice<T>(s: &&[T]) -> bool {
    s.is_empty()
}

mod config_helpers {
    use std::{
        collections::HashSet,
        path::{Path, PathBuf},
    };

    pub(super) struct Normalizer<'a> {
        pub base_dir: &'a Path,
    }

    impl<'a> Normalizer<'a> {
        #[inline]
        pub fn trim_opt(&self, s: Option<String>) -> Option<String> {
            s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
        }

        #[inline]
        pub fn resolve(&self, p: &str) -> PathBuf {
            let pb = PathBuf::from(p.trim());
            if pb.is_absolute() {
                pb
            } else {
                self.base_dir.join(pb)
            }
        }

        pub fn dedup(&self, items: Vec<String>) -> Vec<String> {
            let mut seen = HashSet::new();
            let mut out = Vec::new();
            for s in items
                .into_iter()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
            {
                if seen.insert(s.clone()) {
                    out.push(s);
                }
            }
            out
        }
    }
}
