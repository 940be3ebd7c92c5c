//! Operating system, CPU architecture, and the combined [`PlatformProfile`].
//!
//! Every platform-conditional decision in a recipe (extra dependencies,
//! sub-packages to prune, whether launchers need `JAVA_HOME`) is answered by
//! a `PlatformProfile` value that the pipeline receives up front, instead of
//! `cfg!` checks scattered through the install steps.
//!
//! # Example
//!
//! ```
//! use kiln_schema::{Arch, Os, PlatformProfile};
//!
//! let profile: PlatformProfile = "linux-x86_64".parse().unwrap();
//! assert_eq!(profile.os(), Os::Linux);
//! assert_eq!(profile.arch(), Arch::X86_64);
//! ```

use serde::{Deserialize, Serialize};

/// CPU architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    /// ARM64 (Apple Silicon, Graviton, ...).
    #[serde(alias = "aarch64")]
    Arm64,
    /// `x86_64` / amd64.
    #[serde(alias = "amd64")]
    X86_64,
}

impl Arch {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Arm64 => "arm64",
            Self::X86_64 => "x86_64",
        }
    }
}

impl std::fmt::Display for Arch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Arch {
    type Err = PlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "arm64" | "aarch64" => Ok(Self::Arm64),
            "x86_64" | "amd64" => Ok(Self::X86_64),
            _ => Err(PlatformError::UnknownArch(s.to_string())),
        }
    }
}

/// Operating system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Os {
    /// macOS.
    #[serde(alias = "darwin")]
    Macos,
    /// Linux.
    Linux,
}

impl Os {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Macos => "macos",
            Self::Linux => "linux",
        }
    }
}

impl std::fmt::Display for Os {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Os {
    type Err = PlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "macos" | "darwin" => Ok(Self::Macos),
            "linux" => Ok(Self::Linux),
            _ => Err(PlatformError::UnknownOs(s.to_string())),
        }
    }
}

/// Errors produced when naming or detecting a platform.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    /// The architecture string is not one kiln knows about.
    #[error("Unknown architecture: {0}")]
    UnknownArch(String),

    /// The operating system string is not one kiln knows about.
    #[error("Unknown operating system: {0}")]
    UnknownOs(String),

    /// A profile string did not have the `<os>-<arch>` shape.
    #[error("Invalid platform profile '{0}', expected <os>-<arch>")]
    Malformed(String),
}

/// Supported OS/CPU combinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlatformProfile {
    /// macOS on Apple Silicon.
    #[serde(rename = "macos-arm64")]
    MacosArm64,
    /// macOS on Intel.
    #[serde(rename = "macos-x86_64")]
    MacosX86_64,
    /// Linux on `x86_64`.
    #[serde(rename = "linux-x86_64")]
    LinuxX86_64,
    /// Linux on ARM64.
    #[serde(rename = "linux-arm64")]
    LinuxArm64,
}

impl PlatformProfile {
    /// All supported profiles, in display order.
    pub const ALL: [Self; 4] = [
        Self::MacosArm64,
        Self::MacosX86_64,
        Self::LinuxX86_64,
        Self::LinuxArm64,
    ];

    /// Build a profile from its parts.
    pub fn new(os: Os, arch: Arch) -> Self {
        match (os, arch) {
            (Os::Macos, Arch::Arm64) => Self::MacosArm64,
            (Os::Macos, Arch::X86_64) => Self::MacosX86_64,
            (Os::Linux, Arch::X86_64) => Self::LinuxX86_64,
            (Os::Linux, Arch::Arm64) => Self::LinuxArm64,
        }
    }

    /// Detect the profile of the running host.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError`] when the host OS or CPU is not supported.
    pub fn detect() -> Result<Self, PlatformError> {
        let os: Os = std::env::consts::OS.parse()?;
        let arch: Arch = std::env::consts::ARCH.parse()?;
        Ok(Self::new(os, arch))
    }

    /// Operating system component.
    pub fn os(&self) -> Os {
        match self {
            Self::MacosArm64 | Self::MacosX86_64 => Os::Macos,
            Self::LinuxX86_64 | Self::LinuxArm64 => Os::Linux,
        }
    }

    /// Architecture component.
    pub fn arch(&self) -> Arch {
        match self {
            Self::MacosArm64 | Self::LinuxArm64 => Arch::Arm64,
            Self::MacosX86_64 | Self::LinuxX86_64 => Arch::X86_64,
        }
    }

    /// Canonical `<os>-<arch>` name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MacosArm64 => "macos-arm64",
            Self::MacosX86_64 => "macos-x86_64",
            Self::LinuxX86_64 => "linux-x86_64",
            Self::LinuxArm64 => "linux-arm64",
        }
    }

    /// Whether launchers must point tools at an external Java runtime.
    ///
    /// The native (GraalVM) image of the closure compiler only ships for
    /// Intel macOS; everywhere else the JVM fallback is used.
    pub fn needs_java_home(&self) -> bool {
        !matches!(self, Self::MacosX86_64)
    }

    /// Whether a bottle tag (e.g. `arm64_monterey`, `x86_64_linux`) was
    /// built for this profile.
    pub fn matches_bottle_tag(&self, tag: &str) -> bool {
        let linux = tag.ends_with("_linux");
        let arm = tag.starts_with("arm64_");
        match self {
            Self::MacosArm64 => arm && !linux,
            Self::MacosX86_64 => !arm && !linux,
            Self::LinuxX86_64 => linux && tag.starts_with("x86_64_"),
            Self::LinuxArm64 => linux && arm,
        }
    }
}

impl std::fmt::Display for PlatformProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PlatformProfile {
    type Err = PlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (os, arch) = s
            .split_once('-')
            .ok_or_else(|| PlatformError::Malformed(s.to_string()))?;
        Ok(Self::new(os.parse()?, arch.parse()?))
    }
}

/// Platform guard attached to recipe entries (`when = { os = "linux" }`).
///
/// Unset fields match anything, so an empty condition always holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    /// Required operating system.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<Os>,
    /// Required architecture.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<Arch>,
}

impl Condition {
    /// Evaluate the condition against a profile.
    pub fn matches(&self, profile: PlatformProfile) -> bool {
        self.os.is_none_or(|os| os == profile.os())
            && self.arch.is_none_or(|arch| arch == profile.arch())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_round_trips_through_its_name() {
        for profile in PlatformProfile::ALL {
            assert_eq!(profile.as_str().parse::<PlatformProfile>(), Ok(profile));
        }
    }

    #[test]
    fn profile_accepts_aliases() {
        assert_eq!(
            "darwin-aarch64".parse::<PlatformProfile>(),
            Ok(PlatformProfile::MacosArm64)
        );
        assert!(matches!(
            "solaris".parse::<PlatformProfile>(),
            Err(PlatformError::Malformed(_))
        ));
        assert!(matches!(
            "linux-riscv64".parse::<PlatformProfile>(),
            Err(PlatformError::UnknownArch(_))
        ));
    }

    #[test]
    fn java_home_needed_everywhere_but_intel_macos() {
        assert!(PlatformProfile::MacosArm64.needs_java_home());
        assert!(PlatformProfile::LinuxX86_64.needs_java_home());
        assert!(PlatformProfile::LinuxArm64.needs_java_home());
        assert!(!PlatformProfile::MacosX86_64.needs_java_home());
    }

    #[test]
    fn bottle_tags_map_to_profiles() {
        assert!(PlatformProfile::MacosArm64.matches_bottle_tag("arm64_monterey"));
        assert!(!PlatformProfile::MacosArm64.matches_bottle_tag("monterey"));
        assert!(PlatformProfile::MacosX86_64.matches_bottle_tag("big_sur"));
        assert!(PlatformProfile::LinuxX86_64.matches_bottle_tag("x86_64_linux"));
        assert!(!PlatformProfile::LinuxArm64.matches_bottle_tag("x86_64_linux"));
    }

    #[test]
    fn condition_matching() {
        let any = Condition::default();
        let linux = Condition {
            os: Some(Os::Linux),
            arch: None,
        };
        let mac_arm = Condition {
            os: Some(Os::Macos),
            arch: Some(Arch::Arm64),
        };

        for profile in PlatformProfile::ALL {
            assert!(any.matches(profile));
        }
        assert!(linux.matches(PlatformProfile::LinuxArm64));
        assert!(!linux.matches(PlatformProfile::MacosArm64));
        assert!(mac_arm.matches(PlatformProfile::MacosArm64));
        assert!(!mac_arm.matches(PlatformProfile::MacosX86_64));
        assert!(!mac_arm.matches(PlatformProfile::LinuxArm64));
    }
}
