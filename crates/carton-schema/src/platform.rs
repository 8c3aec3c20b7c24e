//! Target platforms for platform-specific modules and runtimes.
//!
//! A [`Platform`] is an (operating system, CPU architecture) pair. The
//! lowercase names (`linux`, `mac`, `windows`, `x86_64`, `aarch64`) are the
//! ones written into declarations and used for unpacked directory names
//! (`lib/<arch>/<os>`).
//!
//! # Example
//!
//! ```
//! use carton_schema::Platform;
//!
//! let current = Platform::current();
//! println!("Running on: {current}");
//! ```

/// Operating system family.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Os {
    /// Linux (glibc).
    Linux,
    /// macOS.
    Mac,
    /// Windows.
    Windows,
}

impl Os {
    /// The operating system this binary was compiled for.
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Self::Mac
        } else if cfg!(target_os = "windows") {
            Self::Windows
        } else {
            Self::Linux
        }
    }

    /// Declaration / directory name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Mac => "mac",
            Self::Windows => "windows",
        }
    }
}

impl std::fmt::Display for Os {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Os {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "linux" => Ok(Self::Linux),
            "mac" | "macos" | "darwin" | "osx" => Ok(Self::Mac),
            "windows" | "win" => Ok(Self::Windows),
            _ => Err(format!("Unknown operating system: {s}")),
        }
    }
}

/// CPU architecture.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    /// `x86_64` / AMD64.
    #[serde(rename = "x86_64")]
    X86_64,
    /// ARM64 (Apple Silicon, Graviton, ...).
    Aarch64,
}

impl Arch {
    /// Get the current architecture
    pub fn current() -> Self {
        #[cfg(target_arch = "aarch64")]
        {
            Self::Aarch64
        }
        #[cfg(not(target_arch = "aarch64"))]
        {
            Self::X86_64
        }
    }

    /// Declaration / directory name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::X86_64 => "x86_64",
            Self::Aarch64 => "aarch64",
        }
    }
}

impl std::fmt::Display for Arch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Arch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "x86_64" | "amd64" | "x64" => Ok(Self::X86_64),
            "aarch64" | "arm64" => Ok(Self::Aarch64),
            _ => Err(format!("Unknown architecture: {s}")),
        }
    }
}

/// An (operating system, architecture) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Platform {
    /// Operating system.
    pub os: Os,
    /// CPU architecture.
    pub arch: Arch,
}

impl Platform {
    /// Create a platform.
    pub fn new(os: Os, arch: Arch) -> Self {
        Self { os, arch }
    }

    /// The platform this binary was compiled for.
    pub fn current() -> Self {
        Self::new(Os::current(), Arch::current())
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.os, self.arch)
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    /// Parses `os/arch` or `os-arch` (e.g. `linux/x86_64`, `macos-arm64`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (os, arch) = s
            .split_once('/')
            .or_else(|| s.split_once('-'))
            .ok_or_else(|| format!("Expected <os>/<arch>, got: {s}"))?;
        Ok(Self::new(os.parse()?, arch.parse()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_aliases() {
        assert_eq!(
            "macos/arm64".parse::<Platform>().unwrap(),
            Platform::new(Os::Mac, Arch::Aarch64)
        );
        assert_eq!(
            "linux-amd64".parse::<Platform>().unwrap(),
            Platform::new(Os::Linux, Arch::X86_64)
        );
        assert!("plan9/mips".parse::<Platform>().is_err());
    }

    #[test]
    fn display_round_trips() {
        let platform = Platform::new(Os::Windows, Arch::X86_64);
        assert_eq!(platform.to_string(), "windows/x86_64");
        assert_eq!(platform.to_string().parse::<Platform>().unwrap(), platform);
    }
}
