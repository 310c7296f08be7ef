//! Snapshot `maven-metadata.xml` model and codec.

use crate::build::{BuildNumber, base_version, timestamp_of};
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use serde::{Deserialize, Deserializer, Serialize};
use std::io::BufRead;

/// Declaration written in front of every serialized document.
pub const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

/// Per-version snapshot metadata document.
///
/// Fields are serialized in declaration order; absent optional fields are
/// omitted. Elements this model does not know about are dropped when the
/// document is rewritten.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename = "metadata")]
pub struct SnapshotMetadata {
    #[serde(rename = "@modelVersion", default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
    #[serde(rename = "groupId", default, skip_serializing_if = "String::is_empty")]
    pub group_id: String,
    #[serde(rename = "artifactId", default)]
    pub artifact_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(default)]
    pub versioning: Versioning,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Versioning {
    #[serde(default)]
    pub snapshot: Snapshot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    #[serde(default, with = "wrapped", skip_serializing_if = "Vec::is_empty")]
    pub snapshot_versions: Vec<SnapshotVersion>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Highest build number listed in the document.
    ///
    /// A value that is not a valid build number is read as absent.
    #[serde(default, deserialize_with = "lenient_build_number", skip_serializing_if = "Option::is_none")]
    pub build_number: Option<BuildNumber>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_copy: Option<bool>,
}

/// One deployed file of one build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotVersion {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classifier: Option<String>,
    #[serde(default)]
    pub extension: String,
    #[serde(default)]
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
}

/// How a stored file relates to the entries of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileBuild {
    /// The file's classifier/extension pair is not listed in the document.
    Unlisted,
    /// Listed, but no build number can be derived from the name.
    Unparsed,
    Build(BuildNumber),
}

impl SnapshotVersion {
    /// `[-classifier][.extension]`, the part of a file name after the value.
    pub fn ending(&self) -> String {
        let mut ending = String::new();
        if let Some(classifier) = self.classifier.as_deref().filter(|c| !c.is_empty()) {
            ending.push('-');
            ending.push_str(classifier);
        }
        if !self.extension.is_empty() {
            ending.push('.');
            ending.push_str(&self.extension);
        }
        ending
    }

    /// Expected stored file name: `artifactId-value[-classifier].extension`.
    ///
    /// ```
    /// use keeper_metadata::SnapshotVersion;
    ///
    /// let entry = SnapshotVersion {
    ///     classifier: Some("sources".to_string()),
    ///     extension: "jar".to_string(),
    ///     value: "1.0-20240101.120000-5".to_string(),
    ///     updated: None,
    /// };
    /// assert_eq!(entry.file_name("artifact"), "artifact-1.0-20240101.120000-5-sources.jar");
    /// ```
    pub fn file_name(&self, artifact_id: &str) -> String {
        format!("{artifact_id}-{}{}", self.value, self.ending())
    }

    pub fn build_number(&self) -> Result<BuildNumber> {
        BuildNumber::from_value(&self.value)
    }
}

impl SnapshotMetadata {
    /// Parse a document, rejecting one without an `artifactId`.
    pub fn from_reader(reader: impl BufRead) -> Result<Self> {
        let document: Self = quick_xml::de::from_reader(reader).or_raise(|| ErrorKind::MalformedXml)?;
        document.validate()
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Self::from_reader(bytes)
    }

    fn validate(self) -> Result<Self> {
        if self.artifact_id.trim().is_empty() {
            exn::bail!(ErrorKind::MissingField("artifactId"));
        }
        Ok(self)
    }

    /// Serialize with the XML declaration and two-space indentation.
    ///
    /// Serializing a parsed document and parsing the result again yields the
    /// same bytes on the next serialization.
    pub fn to_xml(&self) -> Result<String> {
        let mut out = String::from(XML_DECLARATION);
        let mut serializer = quick_xml::se::Serializer::new(&mut out);
        serializer.indent(' ', 2);
        self.serialize(serializer).or_raise(|| ErrorKind::Serialize)?;
        Ok(out)
    }

    pub fn entries(&self) -> &[SnapshotVersion] {
        &self.versioning.snapshot_versions
    }

    /// Highest build number among the entries whose values parse.
    pub fn max_build_number(&self) -> Option<BuildNumber> {
        self.entries().iter().filter_map(|sv| sv.build_number().ok()).max()
    }

    /// Build number stated in the document, or scanned from the entries when
    /// the document does not state one.
    pub fn effective_build_number(&self) -> Option<BuildNumber> {
        self.versioning.snapshot.build_number.or_else(|| self.max_build_number())
    }

    /// Distinct endings of the listed entries, longest first so that
    /// `-sources.jar` is tried before `.jar`.
    pub fn endings(&self) -> Vec<String> {
        let mut endings: Vec<_> = self.entries().iter().map(SnapshotVersion::ending).filter(|e| !e.is_empty()).collect();
        endings.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        endings.dedup();
        endings
    }

    /// Derive the build number of a stored file from its name.
    ///
    /// The name has to end in one of the listed endings and start with
    /// `artifactId-`; for a `-SNAPSHOT` version the value also has to start
    /// with the base version.
    ///
    /// ```
    /// use keeper_metadata::{FileBuild, SnapshotMetadata};
    ///
    /// let xml = br#"<metadata>
    ///   <artifactId>app</artifactId>
    ///   <version>1.0-SNAPSHOT</version>
    ///   <versioning><snapshotVersions>
    ///     <snapshotVersion><extension>jar</extension><value>1.0-20240101.120000-3</value></snapshotVersion>
    ///   </snapshotVersions></versioning>
    /// </metadata>"#;
    /// let document = SnapshotMetadata::from_slice(xml).unwrap();
    /// let endings = document.endings();
    /// assert!(matches!(document.build_of("app-1.0-20240101.120000-2.jar", &endings), FileBuild::Build(b) if b.get() == 2));
    /// assert_eq!(document.build_of("app-1.0-20240101.120000-2.pom", &endings), FileBuild::Unlisted);
    /// assert_eq!(document.build_of("app-1.0-SNAPSHOT.jar", &endings), FileBuild::Unparsed);
    /// ```
    pub fn build_of(&self, file_name: &str, endings: &[String]) -> FileBuild {
        let Some(stem) = endings.iter().find_map(|ending| file_name.strip_suffix(ending.as_str())) else {
            return FileBuild::Unlisted;
        };
        let value = stem
            .strip_prefix(self.artifact_id.as_str())
            .and_then(|rest| rest.strip_prefix('-'));
        let Some(value) = value else {
            return FileBuild::Unlisted;
        };
        if let Some(base) = base_version(&self.version)
            && !value.strip_prefix(base).is_some_and(|rest| rest.starts_with('-'))
        {
            return FileBuild::Unparsed;
        }
        match BuildNumber::from_value(value) {
            Ok(build) => FileBuild::Build(build),
            Err(_) => FileBuild::Unparsed,
        }
    }

    /// Snapshot timestamp matching the newest entry with the given build.
    pub fn timestamp_for(&self, build: BuildNumber) -> Option<&str> {
        self.entries()
            .iter()
            .filter(|sv| sv.build_number().is_ok_and(|b| b == build))
            .find_map(|sv| timestamp_of(&sv.value))
    }
}

fn lenient_build_number<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<BuildNumber>, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|raw| {
        let parsed = raw.trim().parse().ok();
        if parsed.is_none() {
            tracing::debug!(build_number = raw, "Ignoring unparseable snapshot build number");
        }
        parsed
    }))
}

impl Serialize for BuildNumber {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.get())
    }
}

/// `<snapshotVersions><snapshotVersion/>...</snapshotVersions>`
mod wrapped {
    use super::SnapshotVersion;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize)]
    struct Out<'a> {
        #[serde(rename = "snapshotVersion")]
        items: &'a [SnapshotVersion],
    }

    #[derive(Deserialize)]
    struct In {
        #[serde(rename = "snapshotVersion", default)]
        items: Vec<SnapshotVersion>,
    }

    pub fn serialize<S: Serializer>(items: &[SnapshotVersion], serializer: S) -> Result<S::Ok, S::Error> {
        Out { items }.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<SnapshotVersion>, D::Error> {
        Ok(In::deserialize(deserializer)?.items)
    }
}
