//! The package declaration embedded in every carton archive.
//!
//! A [`PackageDeclaration`] carries the package metadata, the runtime
//! requirements per platform and the [`Manifest`]. It is stored as one XML
//! document at [`DECLARATION_PATH`](crate::DECLARATION_PATH).

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Arch, Hash, Manifest, Os, Platform};

/// Highest declaration schema version this crate reads and the one it writes.
pub const SCHEMA_VERSION: u32 = 1;

/// Errors raised while reading or writing a declaration document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeclarationError {
    /// The document is not valid XML or does not match the model.
    #[error("cannot parse package declaration: {0}")]
    Parse(String),

    /// The declaration could not be serialized.
    #[error("cannot serialize package declaration: {0}")]
    Serialize(String),

    /// The document was written by a newer schema.
    #[error("unsupported declaration schema {found} (supported: {SCHEMA_VERSION})")]
    UnsupportedSchema {
        /// Schema version found in the document.
        found: u32,
    },
}

/// Archive format of a downloadable runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuntimeFormat {
    /// Zip archive (`.zip`).
    #[serde(rename = "zip")]
    Zip,
    /// Gzip-compressed tar archive (`.tar.gz` / `.tgz`).
    #[serde(rename = "tar.gz")]
    TarGz,
}

impl RuntimeFormat {
    /// Guess the format from a URL or file name.
    pub fn detect(path: &str) -> Option<Self> {
        let path = path.to_lowercase();
        if path.ends_with(".tar.gz") || path.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if path.ends_with(".zip") {
            Some(Self::Zip)
        } else {
            None
        }
    }

    /// Declaration name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::TarGz => "tar.gz",
        }
    }
}

impl std::fmt::Display for RuntimeFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RuntimeFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "zip" => Ok(Self::Zip),
            "tar.gz" | "tgz" | "targz" => Ok(Self::TarGz),
            _ => Err(format!("Unknown runtime format: {s}")),
        }
    }
}

/// The runtime distribution a package needs on one platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeRequirement {
    /// Operating system this runtime is built for.
    #[serde(rename = "@os")]
    pub os: Os,
    /// Architecture this runtime is built for.
    #[serde(rename = "@arch")]
    pub arch: Arch,
    /// Archive format of the download.
    #[serde(rename = "@format")]
    pub format: RuntimeFormat,
    /// Runtime version, informational.
    #[serde(rename = "@version", default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Download URL.
    pub url: String,
    /// Expected hash of the whole downloaded archive.
    pub hash: Hash,
}

impl RuntimeRequirement {
    /// The platform this requirement applies to.
    pub fn platform(&self) -> Platform {
        Platform::new(self.os, self.arch)
    }
}

/// A related URL (`homepage`, `issues`, `source`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Relation name.
    #[serde(rename = "@rel")]
    pub rel: String,
    /// Target URL.
    #[serde(rename = "$text")]
    pub href: String,
}

/// Package metadata plus its manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename = "package")]
pub struct PackageDeclaration {
    /// Schema version of the document.
    #[serde(rename = "@schema")]
    pub schema: u32,
    /// Machine name of the package.
    pub name: String,
    /// Human readable name.
    #[serde(rename = "display-name", default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Package version.
    pub version: String,
    /// Publisher.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    /// SPDX license identifiers.
    #[serde(rename = "license", default)]
    pub licenses: Vec<String>,
    /// Long description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Related URLs.
    #[serde(rename = "link", default)]
    pub links: Vec<Link>,
    /// Store / menu categories.
    #[serde(rename = "category", default)]
    pub categories: Vec<String>,
    /// Runtime distributions, one per supported platform.
    #[serde(rename = "runtime", default)]
    pub runtimes: Vec<RuntimeRequirement>,
    /// Declared payload.
    pub manifest: Manifest,
}

impl PackageDeclaration {
    /// A declaration with the required fields set and everything else empty.
    pub fn new(name: impl Into<String>, version: impl Into<String>, manifest: Manifest) -> Self {
        Self {
            schema: SCHEMA_VERSION,
            name: name.into(),
            display_name: None,
            version: version.into(),
            vendor: None,
            licenses: Vec::new(),
            description: None,
            links: Vec::new(),
            categories: Vec::new(),
            runtimes: Vec::new(),
            manifest,
        }
    }

    /// The form this declaration takes after an XML round trip.
    ///
    /// The XML reader trims text content, so element text (names, URLs,
    /// descriptions, captions) is trimmed here and blank optional fields are
    /// dropped. [`to_xml`](Self::to_xml) always writes the normalized form.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        trim_in_place(&mut self.name);
        trim_in_place(&mut self.version);
        self.display_name = trim_optional(self.display_name);
        self.vendor = trim_optional(self.vendor);
        self.description = trim_optional(self.description);
        self.licenses.iter_mut().for_each(trim_in_place);
        self.categories.iter_mut().for_each(trim_in_place);
        for link in &mut self.links {
            trim_in_place(&mut link.href);
        }
        for runtime in &mut self.runtimes {
            trim_in_place(&mut runtime.url);
        }
        self.manifest = self.manifest.normalized();
        self
    }

    /// The runtime requirement for `platform`, if declared.
    pub fn runtime_for(&self, platform: Platform) -> Option<&RuntimeRequirement> {
        self.runtimes.iter().find(|r| r.platform() == platform)
    }

    /// Serialize to an indented XML document.
    ///
    /// Output is deterministic: the same declaration always yields the same
    /// bytes.
    ///
    /// # Errors
    ///
    /// Returns [`DeclarationError::Serialize`] if the serializer rejects a value.
    pub fn to_xml(&self) -> Result<String, DeclarationError> {
        let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        let mut serializer = quick_xml::se::Serializer::new(&mut out);
        serializer.indent(' ', 2);
        self.clone()
            .normalized()
            .serialize(serializer)
            .map_err(|e| DeclarationError::Serialize(e.to_string()))?;
        out.push('\n');
        Ok(out)
    }

    /// Parse an XML document.
    ///
    /// # Errors
    ///
    /// Returns [`DeclarationError::Parse`] for malformed documents (including
    /// invalid manifests) and [`DeclarationError::UnsupportedSchema`] for
    /// documents newer than [`SCHEMA_VERSION`].
    pub fn from_xml(xml: &str) -> Result<Self, DeclarationError> {
        let declaration: Self =
            quick_xml::de::from_str(xml).map_err(|e| DeclarationError::Parse(e.to_string()))?;
        if declaration.schema > SCHEMA_VERSION {
            return Err(DeclarationError::UnsupportedSchema {
                found: declaration.schema,
            });
        }
        Ok(declaration)
    }

    /// Parse a UTF-8 encoded XML document.
    ///
    /// # Errors
    ///
    /// As [`from_xml`](Self::from_xml), plus [`DeclarationError::Parse`] for
    /// invalid UTF-8.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DeclarationError> {
        let xml = std::str::from_utf8(bytes).map_err(|e| DeclarationError::Parse(e.to_string()))?;
        Self::from_xml(xml)
    }
}

/// Trim XML whitespace only; other Unicode spaces survive a round trip.
fn trim_xml(text: &str) -> &str {
    text.trim_matches(|c| matches!(c, ' ' | '\t' | '\r' | '\n'))
}

pub(crate) fn trim_in_place(text: &mut String) {
    let trimmed = trim_xml(text);
    if trimmed.len() != text.len() {
        *text = trimmed.to_string();
    }
}

fn trim_optional(text: Option<String>) -> Option<String> {
    text.map(|t| trim_xml(&t).to_string())
        .filter(|t| !t.is_empty())
}
