//! Where unpacked entries land.
//!
//! ```text
//! <output>/META-INF/CARTON/PACKAGE.XML   declaration, byte for byte
//! <output>/meta/<basename>               resources
//! <output>/lib/<basename>                modules (and merged platform modules)
//! <output>/lib/<arch>/<os>/<basename>    included platform modules
//! ```

use std::path::PathBuf;

use carton_schema::{ManifestEntry, Platform, PlatformModuleEntry};

/// Directory for resources.
pub const META_DIR: &str = "meta";
/// Directory for modules.
pub const LIB_DIR: &str = "lib";

/// What to do with one platform module during unpack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Skip the entry.
    Ignore,
    /// Place it next to the portable modules in `lib/`.
    Merge,
    /// Place it under `lib/<arch>/<os>/`.
    Include,
}

/// Decides the [`Placement`] of platform modules.
///
/// Any `Fn(&PlatformModuleEntry) -> Placement` closure is a policy.
pub trait PlatformPolicy {
    /// Placement for `entry`.
    fn place(&self, entry: &PlatformModuleEntry) -> Placement;
}

impl<F> PlatformPolicy for F
where
    F: Fn(&PlatformModuleEntry) -> Placement,
{
    fn place(&self, entry: &PlatformModuleEntry) -> Placement {
        self(entry)
    }
}

/// Merges modules for one platform into `lib/` and ignores the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinglePlatform(pub Platform);

impl SinglePlatform {
    /// Policy for the platform this binary was compiled for.
    pub fn current() -> Self {
        Self(Platform::current())
    }
}

impl PlatformPolicy for SinglePlatform {
    fn place(&self, entry: &PlatformModuleEntry) -> Placement {
        if entry.platform() == self.0 {
            Placement::Merge
        } else {
            Placement::Ignore
        }
    }
}

/// Includes every platform module under its own `lib/<arch>/<os>/`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllPlatforms;

impl PlatformPolicy for AllPlatforms {
    fn place(&self, _entry: &PlatformModuleEntry) -> Placement {
        Placement::Include
    }
}

/// Output-relative directory for `entry`, or `None` when the policy ignores it.
pub(crate) fn target_dir(entry: &ManifestEntry, policy: &dyn PlatformPolicy) -> Option<PathBuf> {
    match entry {
        ManifestEntry::Resource(_) => Some(PathBuf::from(META_DIR)),
        ManifestEntry::Module(_) => Some(PathBuf::from(LIB_DIR)),
        ManifestEntry::PlatformModule(module) => match policy.place(module) {
            Placement::Ignore => None,
            Placement::Merge => Some(PathBuf::from(LIB_DIR)),
            Placement::Include => Some(
                [LIB_DIR, module.arch.as_str(), module.os.as_str()]
                    .iter()
                    .collect(),
            ),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carton_schema::{Arch, FileName, Hash, Os};

    fn native(os: Os, arch: Arch) -> ManifestEntry {
        ManifestEntry::platform_module(
            FileName::new("native/libx.so").unwrap(),
            Platform::new(os, arch),
            Hash::sha256("00"),
        )
    }

    #[test]
    fn single_platform_merges_only_its_own() {
        let policy = SinglePlatform(Platform::new(Os::Linux, Arch::X86_64));
        assert_eq!(
            target_dir(&native(Os::Linux, Arch::X86_64), &policy),
            Some(PathBuf::from("lib"))
        );
        assert_eq!(target_dir(&native(Os::Mac, Arch::Aarch64), &policy), None);
    }

    #[test]
    fn all_platforms_nests_by_arch_then_os() {
        assert_eq!(
            target_dir(&native(Os::Windows, Arch::Aarch64), &AllPlatforms),
            Some(PathBuf::from("lib").join("aarch64").join("windows"))
        );
    }

    #[test]
    fn closures_are_policies() {
        let ignore_all = |_: &PlatformModuleEntry| Placement::Ignore;
        assert_eq!(target_dir(&native(Os::Linux, Arch::X86_64), &ignore_all), None);

        let resource = ManifestEntry::resource(
            FileName::new("docs/LICENSE").unwrap(),
            carton_schema::ResourceRole::License,
            Hash::sha256("00"),
        );
        assert_eq!(target_dir(&resource, &ignore_all), Some(PathBuf::from("meta")));
    }
}
