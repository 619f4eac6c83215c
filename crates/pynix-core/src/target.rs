//! The platform a resolution is computed for.

use std::fmt;
use std::str::FromStr;

use pynix_util::errors::{PynixError, PynixResult};
use serde::{Deserialize, Serialize};

use crate::marker::MarkerContext;
use crate::version::PythonVersion;

/// Supported operating systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum System {
    Linux,
    Darwin,
}

impl System {
    /// Value of the `sys_platform` marker variable.
    pub fn sys_platform(&self) -> &'static str {
        match self {
            System::Linux => "linux",
            System::Darwin => "darwin",
        }
    }

    /// Value of the `platform_system` marker variable.
    pub fn capitalized(&self) -> &'static str {
        match self {
            System::Linux => "Linux",
            System::Darwin => "Darwin",
        }
    }
}

impl FromStr for System {
    type Err = PynixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "linux" => Ok(System::Linux),
            "darwin" | "macos" => Ok(System::Darwin),
            _ => Err(PynixError::UnsupportedPlatform {
                system: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for System {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sys_platform())
    }
}

/// Runtime version, operating system and CPU architecture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub python: PythonVersion,
    pub system: System,
    pub arch: String,
}

impl Target {
    /// Build a target. The runtime version must include the bugfix
    /// component (`3.9.5`), since `python_full_version` markers need it.
    pub fn new(python: &str, system: &str, arch: &str) -> PynixResult<Self> {
        let python = PythonVersion::parse(python)?;
        if python.patch.is_none() {
            return Err(PynixError::Config {
                message: format!(
                    "python version `{python}` must include the bugfix version (like 3.7.5)"
                ),
            });
        }
        Ok(Self {
            python,
            system: system.parse()?,
            arch: arch.to_string(),
        })
    }

    /// Marker evaluation context for this target.
    pub fn marker_context(&self) -> MarkerContext {
        MarkerContext::new(&self.python, &self.arch, self.system)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "python {} on {}/{}", self.python, self.system, self.arch)
    }
}
