//! Manifest model: the declared payload of a carton archive.
//!
//! Every payload entry is one of three kinds, modelled as the closed
//! [`ManifestEntry`] union. A [`Manifest`] is built once from an ordered list
//! of entries and rejects duplicate keys (compared case-insensitively) and the
//! reserved declaration path at construction time.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Arch, FileName, Hash, Os, Platform, DECLARATION_PATH};

/// Errors raised while building a [`Manifest`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ManifestError {
    /// Two entries share a key (case-insensitively).
    #[error("duplicate manifest entry '{name}' (conflicts with '{existing}')")]
    Duplicate {
        /// The rejected entry name.
        name: FileName,
        /// The name already present, in its original casing.
        existing: FileName,
    },

    /// An entry uses the reserved declaration path.
    #[error("manifest entry '{name}' uses the reserved declaration path")]
    Reserved {
        /// The offending name.
        name: FileName,
    },
}

/// A platform-independent module (typically a jar).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleEntry {
    /// Entry key.
    #[serde(rename = "@name")]
    pub name: FileName,
    /// Expected content hash.
    pub hash: Hash,
}

/// A module that only applies to one operating system and architecture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformModuleEntry {
    /// Entry key.
    #[serde(rename = "@name")]
    pub name: FileName,
    /// Operating system the module targets.
    #[serde(rename = "@os")]
    pub os: Os,
    /// Architecture the module targets.
    #[serde(rename = "@arch")]
    pub arch: Arch,
    /// Expected content hash.
    pub hash: Hash,
}

impl PlatformModuleEntry {
    /// The entry's target platform.
    pub fn platform(&self) -> Platform {
        Platform::new(self.os, self.arch)
    }
}

/// Semantic role of a resource entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceRole {
    /// License text.
    License,
    /// Application icon rendered at `size` x `size` pixels.
    Icon {
        /// Edge length in pixels.
        size: u32,
    },
    /// Bill of materials (SBOM).
    BillOfMaterials,
    /// Screenshot for store listings.
    Screenshot,
}

impl std::fmt::Display for ResourceRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::License => write!(f, "license"),
            Self::Icon { size } => write!(f, "icon {size}x{size}"),
            Self::BillOfMaterials => write!(f, "bill-of-materials"),
            Self::Screenshot => write!(f, "screenshot"),
        }
    }
}

/// A caption for a resource in one language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caption {
    /// BCP 47 language tag.
    #[serde(rename = "@lang")]
    pub language: String,
    /// Caption text.
    #[serde(rename = "$text")]
    pub text: String,
}

/// A tagged resource (license, icon, bill of materials, screenshot).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ResourceDocument", into = "ResourceDocument")]
pub struct ResourceEntry {
    /// Entry key.
    pub name: FileName,
    /// Expected content hash.
    pub hash: Hash,
    /// What the resource is for.
    pub role: ResourceRole,
    /// Optional captions, one per language.
    pub captions: Vec<Caption>,
}

impl ResourceEntry {
    /// Caption for `language`, if one was declared.
    pub fn caption(&self, language: &str) -> Option<&str> {
        self.captions
            .iter()
            .find(|c| c.language.eq_ignore_ascii_case(language))
            .map(|c| c.text.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum RoleName {
    License,
    Icon,
    BillOfMaterials,
    Screenshot,
}

#[derive(Serialize, Deserialize)]
struct ResourceDocument {
    #[serde(rename = "@name")]
    name: FileName,
    #[serde(rename = "@role")]
    role: RoleName,
    #[serde(rename = "@size", default, skip_serializing_if = "Option::is_none")]
    size: Option<u32>,
    hash: Hash,
    #[serde(rename = "caption", default)]
    captions: Vec<Caption>,
}

impl TryFrom<ResourceDocument> for ResourceEntry {
    type Error = String;

    fn try_from(doc: ResourceDocument) -> Result<Self, Self::Error> {
        let role = match doc.role {
            RoleName::License => ResourceRole::License,
            RoleName::Icon => ResourceRole::Icon {
                size: doc
                    .size
                    .ok_or_else(|| format!("icon resource '{}' has no size", doc.name))?,
            },
            RoleName::BillOfMaterials => ResourceRole::BillOfMaterials,
            RoleName::Screenshot => ResourceRole::Screenshot,
        };
        Ok(Self {
            name: doc.name,
            hash: doc.hash,
            role,
            captions: doc.captions,
        })
    }
}

impl From<ResourceEntry> for ResourceDocument {
    fn from(entry: ResourceEntry) -> Self {
        let (role, size) = match entry.role {
            ResourceRole::License => (RoleName::License, None),
            ResourceRole::Icon { size } => (RoleName::Icon, Some(size)),
            ResourceRole::BillOfMaterials => (RoleName::BillOfMaterials, None),
            ResourceRole::Screenshot => (RoleName::Screenshot, None),
        };
        Self {
            name: entry.name,
            role,
            size,
            hash: entry.hash,
            captions: entry.captions,
        }
    }
}

/// One declared payload entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ManifestEntry {
    /// Platform-independent module.
    #[serde(rename = "module")]
    Module(ModuleEntry),
    /// Module restricted to one platform.
    #[serde(rename = "platform-module")]
    PlatformModule(PlatformModuleEntry),
    /// Tagged resource.
    #[serde(rename = "resource")]
    Resource(ResourceEntry),
}

impl ManifestEntry {
    /// Shorthand for a [`ManifestEntry::Module`].
    pub fn module(name: FileName, hash: Hash) -> Self {
        Self::Module(ModuleEntry { name, hash })
    }

    /// Shorthand for a [`ManifestEntry::PlatformModule`].
    pub fn platform_module(name: FileName, platform: Platform, hash: Hash) -> Self {
        Self::PlatformModule(PlatformModuleEntry {
            name,
            os: platform.os,
            arch: platform.arch,
            hash,
        })
    }

    /// Shorthand for an uncaptioned [`ManifestEntry::Resource`].
    pub fn resource(name: FileName, role: ResourceRole, hash: Hash) -> Self {
        Self::Resource(ResourceEntry {
            name,
            hash,
            role,
            captions: Vec::new(),
        })
    }

    /// The entry key.
    pub fn name(&self) -> &FileName {
        match self {
            Self::Module(m) => &m.name,
            Self::PlatformModule(m) => &m.name,
            Self::Resource(r) => &r.name,
        }
    }

    /// The declared content hash.
    pub fn hash(&self) -> &Hash {
        match self {
            Self::Module(m) => &m.hash,
            Self::PlatformModule(m) => &m.hash,
            Self::Resource(r) => &r.hash,
        }
    }

    /// Short label for listings (`module`, `platform-module`, `resource`).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Module(_) => "module",
            Self::PlatformModule(_) => "platform-module",
            Self::Resource(_) => "resource",
        }
    }
}

/// Ordered, uniquely keyed set of manifest entries.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "ManifestDocument", into = "ManifestDocument")]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
    index: BTreeMap<FileName, usize>,
}

impl Manifest {
    /// Build a manifest, preserving entry order.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Duplicate`] when two names are equal ignoring
    /// case and [`ManifestError::Reserved`] when an entry uses
    /// [`DECLARATION_PATH`].
    pub fn new(entries: Vec<ManifestEntry>) -> Result<Self, ManifestError> {
        let mut index = BTreeMap::new();
        for (position, entry) in entries.iter().enumerate() {
            let name = entry.name();
            if name.matches(DECLARATION_PATH) {
                return Err(ManifestError::Reserved { name: name.clone() });
            }
            if let Some(&existing) = index.get(name) {
                let existing: &ManifestEntry = &entries[existing];
                return Err(ManifestError::Duplicate {
                    name: name.clone(),
                    existing: existing.name().clone(),
                });
            }
            index.insert(name.clone(), position);
        }
        Ok(Self { entries, index })
    }

    /// Look up an entry by name (case-insensitive).
    pub fn get(&self, name: &FileName) -> Option<&ManifestEntry> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    /// Whether `name` is declared.
    pub fn contains(&self, name: &FileName) -> bool {
        self.index.contains_key(name)
    }

    /// Entries in declaration order.
    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    /// Iterate entries in declaration order.
    pub fn iter(&self) -> std::slice::Iter<'_, ManifestEntry> {
        self.entries.iter()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the manifest declares no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Trim caption text the way the XML reader does. Names are untouched,
    /// so the index stays valid.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        for entry in &mut self.entries {
            if let ManifestEntry::Resource(resource) = entry {
                for caption in &mut resource.captions {
                    crate::declaration::trim_in_place(&mut caption.text);
                }
            }
        }
        self
    }
}

impl<'a> IntoIterator for &'a Manifest {
    type Item = &'a ManifestEntry;
    type IntoIter = std::slice::Iter<'a, ManifestEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[derive(Serialize, Deserialize)]
struct ManifestDocument {
    #[serde(rename = "$value", default)]
    entries: Vec<ManifestEntry>,
}

impl TryFrom<ManifestDocument> for Manifest {
    type Error = ManifestError;

    fn try_from(doc: ManifestDocument) -> Result<Self, Self::Error> {
        Self::new(doc.entries)
    }
}

impl From<Manifest> for ManifestDocument {
    fn from(manifest: Manifest) -> Self {
        Self {
            entries: manifest.entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> FileName {
        FileName::new(s).unwrap()
    }

    fn hash() -> Hash {
        Hash::sha256("00".repeat(32))
    }

    #[test]
    fn names_differing_only_by_case_are_rejected() {
        let err = Manifest::new(vec![
            ManifestEntry::module(name("lib/File.jar"), hash()),
            ManifestEntry::module(name("lib/FILE.jar"), hash()),
        ])
        .unwrap_err();

        assert_eq!(
            err,
            ManifestError::Duplicate {
                name: name("lib/FILE.jar"),
                existing: name("lib/File.jar"),
            }
        );
    }

    #[test]
    fn reserved_path_is_rejected() {
        let err = Manifest::new(vec![ManifestEntry::resource(
            name("meta-inf/carton/package.xml"),
            ResourceRole::License,
            hash(),
        )])
        .unwrap_err();
        assert!(matches!(err, ManifestError::Reserved { .. }));
    }

    #[test]
    fn lookup_is_case_insensitive_and_order_is_kept() {
        let manifest = Manifest::new(vec![
            ManifestEntry::module(name("lib/z.jar"), hash()),
            ManifestEntry::platform_module(
                name("lib/native.so"),
                Platform::new(Os::Linux, Arch::X86_64),
                hash(),
            ),
            ManifestEntry::resource(name("meta/LICENSE"), ResourceRole::License, hash()),
        ])
        .unwrap();

        assert_eq!(manifest.len(), 3);
        assert_eq!(manifest.get(&name("LIB/NATIVE.SO")).unwrap().kind(), "platform-module");
        let order: Vec<_> = manifest.iter().map(|e| e.name().as_str()).collect();
        assert_eq!(order, vec!["lib/z.jar", "lib/native.so", "meta/LICENSE"]);
    }

    #[test]
    fn captions_are_looked_up_by_language() {
        let entry = ResourceEntry {
            name: name("meta/shot.png"),
            hash: hash(),
            role: ResourceRole::Screenshot,
            captions: vec![Caption {
                language: "en".into(),
                text: "Main window".into(),
            }],
        };
        assert_eq!(entry.caption("EN"), Some("Main window"));
        assert_eq!(entry.caption("de"), None);
    }
}
