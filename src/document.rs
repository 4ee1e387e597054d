//! Inventory documents: the XML contract between the extraction and report
//! pipelines.
//!
//! One [`InventoryDocument`] is built per image, sorted deterministically,
//! written as XML, and later re-loaded read-only by the report side. The
//! serialized layout must stay stable across versions since a report run
//! consumes files written by earlier extraction runs.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// An installed RPM package. Identity for diffing is `(name, arch)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpmPackage {
    pub name: String,
    pub epoch: Option<String>,
    pub version: String,
    pub release: String,
    pub arch: String,
}

impl RpmPackage {
    /// Effective version string: `epoch:version-release`, epoch omitted
    /// when absent.
    pub fn evr(&self) -> String {
        match &self.epoch {
            Some(epoch) => format!("{}:{}-{}", epoch, self.version, self.release),
            None => format!("{}-{}", self.version, self.release),
        }
    }
}

/// A name/version pair used for Python packages and collections.
/// Identity for diffing is the lowercased name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimplePackage {
    pub name: String,
    pub version: String,
}

/// Image metadata as reported by `podman image inspect`.
///
/// Podman emits capitalized keys (`Created`, `Digest`, ...); other runtimes
/// and older dumps use lowercase, so both spellings are accepted. Missing
/// fields stay `None`/empty instead of failing the image.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageMetadata {
    #[serde(rename = "Created", alias = "created", default)]
    pub created: Option<String>,
    #[serde(rename = "Digest", alias = "digest", default)]
    pub digest: Option<String>,
    #[serde(rename = "RepoDigests", alias = "repoDigests", default)]
    pub repo_digests: Vec<String>,
    #[serde(rename = "RepoTags", alias = "repoTags", default)]
    pub repo_tags: Vec<String>,
}

/// The full package inventory of one image.
///
/// Built once by [`InventoryDocument::build`], immutable afterwards. All
/// three package lists are sorted on construction so that identical input
/// always serializes to identical XML.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryDocument {
    pub reference: String,
    pub created: Option<String>,
    pub digest: Option<String>,
    pub repo_digests: Vec<String>,
    pub repo_tags: Vec<String>,
    pub rpms: Vec<RpmPackage>,
    pub python: Vec<SimplePackage>,
    pub collections: Vec<SimplePackage>,
}

impl InventoryDocument {
    /// Assemble a document from inspect metadata and the parsed package
    /// lists, sorting everything deterministically.
    pub fn build(
        reference: &str,
        meta: &ImageMetadata,
        mut rpms: Vec<RpmPackage>,
        mut python: Vec<SimplePackage>,
        mut collections: Vec<SimplePackage>,
    ) -> Self {
        rpms.sort_by(|a, b| {
            (&a.name, &a.arch, &a.version, &a.release).cmp(&(&b.name, &b.arch, &b.version, &b.release))
        });
        python.sort_by_key(|p| p.name.to_lowercase());
        collections.sort_by_key(|p| p.name.to_lowercase());

        Self {
            reference: reference.to_string(),
            created: meta.created.clone(),
            digest: meta.digest.clone(),
            repo_digests: meta.repo_digests.clone(),
            repo_tags: meta.repo_tags.clone(),
            rpms,
            python,
            collections,
        }
    }

    /// Render the document as XML.
    pub fn to_xml(&self) -> String {
        let mut xml = String::new();
        xml.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");

        xml.push_str(&format!("<image reference=\"{}\"", xml_escape(&self.reference)));
        if let Some(created) = &self.created {
            xml.push_str(&format!(" created=\"{}\"", xml_escape(created)));
        }
        if let Some(digest) = &self.digest {
            xml.push_str(&format!(" digest=\"{}\"", xml_escape(digest)));
        }
        xml.push_str(">\n");

        if !self.repo_digests.is_empty() {
            xml.push_str("  <repoDigests>\n");
            for digest in &self.repo_digests {
                xml.push_str(&format!("    <digest>{}</digest>\n", xml_escape(digest)));
            }
            xml.push_str("  </repoDigests>\n");
        }

        if !self.repo_tags.is_empty() {
            xml.push_str("  <repoTags>\n");
            for tag in &self.repo_tags {
                xml.push_str(&format!("    <tag>{}</tag>\n", xml_escape(tag)));
            }
            xml.push_str("  </repoTags>\n");
        }

        xml.push_str("  <rpms>\n");
        for rpm in &self.rpms {
            xml.push_str(&format!("    <rpm name=\"{}\"", xml_escape(&rpm.name)));
            if let Some(epoch) = &rpm.epoch {
                xml.push_str(&format!(" epoch=\"{}\"", xml_escape(epoch)));
            }
            xml.push_str(&format!(
                " version=\"{}\" release=\"{}\" arch=\"{}\"/>\n",
                xml_escape(&rpm.version),
                xml_escape(&rpm.release),
                xml_escape(&rpm.arch)
            ));
        }
        xml.push_str("  </rpms>\n");

        xml.push_str("  <python>\n");
        for pkg in &self.python {
            xml.push_str(&format!(
                "    <package name=\"{}\" version=\"{}\"/>\n",
                xml_escape(&pkg.name),
                xml_escape(&pkg.version)
            ));
        }
        xml.push_str("  </python>\n");

        xml.push_str("  <collections>\n");
        for col in &self.collections {
            xml.push_str(&format!(
                "    <collection name=\"{}\" version=\"{}\"/>\n",
                xml_escape(&col.name),
                xml_escape(&col.version)
            ));
        }
        xml.push_str("  </collections>\n");

        xml.push_str("</image>\n");
        xml
    }

    /// Parse a document back from its XML form.
    ///
    /// Malformed XML is a hard error: inventory documents are produced by
    /// this tool and are expected to be well-formed.
    pub fn from_xml(text: &str) -> Result<Self> {
        let doc = roxmltree::Document::parse(text).context("Failed to parse inventory XML")?;
        let root = doc.root_element();
        if root.tag_name().name() != "image" {
            return Err(anyhow!(
                "Unexpected root element <{}>, expected <image>",
                root.tag_name().name()
            ));
        }

        let reference = root.attribute("reference").unwrap_or("").to_string();
        let created = root.attribute("created").map(str::to_string);
        let digest = root.attribute("digest").map(str::to_string);

        let child_texts = |parent: &str, item: &str| -> Vec<String> {
            root.children()
                .find(|n| n.has_tag_name(parent))
                .map(|group| {
                    group
                        .children()
                        .filter(|n| n.has_tag_name(item))
                        .filter_map(|n| n.text())
                        .map(|t| t.trim().to_string())
                        .collect()
                })
                .unwrap_or_default()
        };

        let repo_digests = child_texts("repoDigests", "digest");
        let repo_tags = child_texts("repoTags", "tag");

        let rpms = root
            .children()
            .find(|n| n.has_tag_name("rpms"))
            .map(|group| {
                group
                    .children()
                    .filter(|n| n.has_tag_name("rpm"))
                    .map(|n| RpmPackage {
                        name: n.attribute("name").unwrap_or("").to_string(),
                        epoch: n
                            .attribute("epoch")
                            .filter(|e| !e.is_empty())
                            .map(str::to_string),
                        version: n.attribute("version").unwrap_or("").to_string(),
                        release: n.attribute("release").unwrap_or("").to_string(),
                        arch: n.attribute("arch").unwrap_or("").to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let simple_items = |parent: &str, item: &str| -> Vec<SimplePackage> {
            root.children()
                .find(|n| n.has_tag_name(parent))
                .map(|group| {
                    group
                        .children()
                        .filter(|n| n.has_tag_name(item))
                        .map(|n| SimplePackage {
                            name: n.attribute("name").unwrap_or("").to_string(),
                            version: n.attribute("version").unwrap_or("").to_string(),
                        })
                        .collect()
                })
                .unwrap_or_default()
        };

        let python = simple_items("python", "package");
        let collections = simple_items("collections", "collection");

        Ok(Self {
            reference,
            created,
            digest,
            repo_digests,
            repo_tags,
            rpms,
            python,
            collections,
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_xml())
            .with_context(|| format!("Failed to write inventory XML to {}", path.display()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read inventory XML from {}", path.display()))?;
        Self::from_xml(&text)
            .with_context(|| format!("Failed to parse inventory XML from {}", path.display()))
    }
}

/// Escape a string for use in XML attribute values and text content.
fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_rpm(name: &str, arch: &str, version: &str, release: &str) -> RpmPackage {
        RpmPackage {
            name: name.to_string(),
            epoch: None,
            version: version.to_string(),
            release: release.to_string(),
            arch: arch.to_string(),
        }
    }

    #[test]
    fn test_evr_with_and_without_epoch() {
        let mut rpm = sample_rpm("bash", "x86_64", "5.1.8", "6.el9");
        assert_eq!(rpm.evr(), "5.1.8-6.el9");
        rpm.epoch = Some("1".to_string());
        assert_eq!(rpm.evr(), "1:5.1.8-6.el9");
    }

    #[test]
    fn test_build_sorts_rpms_by_name_arch_version_release() {
        let rpms = vec![
            sample_rpm("zlib", "x86_64", "1.2", "1"),
            sample_rpm("bash", "x86_64", "5.2", "1"),
            sample_rpm("bash", "noarch", "5.1", "1"),
            sample_rpm("bash", "x86_64", "5.1", "2"),
            sample_rpm("bash", "x86_64", "5.1", "1"),
        ];
        let doc = InventoryDocument::build("img:1", &ImageMetadata::default(), rpms, vec![], vec![]);
        let order: Vec<(String, String, String, String)> = doc
            .rpms
            .iter()
            .map(|r| {
                (
                    r.name.clone(),
                    r.arch.clone(),
                    r.version.clone(),
                    r.release.clone(),
                )
            })
            .collect();
        assert_eq!(
            order,
            vec![
                ("bash".into(), "noarch".into(), "5.1".into(), "1".into()),
                ("bash".into(), "x86_64".into(), "5.1".into(), "1".into()),
                ("bash".into(), "x86_64".into(), "5.1".into(), "2".into()),
                ("bash".into(), "x86_64".into(), "5.2".into(), "1".into()),
                ("zlib".into(), "x86_64".into(), "1.2".into(), "1".into()),
            ]
        );
    }

    #[test]
    fn test_build_sorts_simple_packages_case_insensitively() {
        let python = vec![
            SimplePackage {
                name: "Zebra".to_string(),
                version: "1.0".to_string(),
            },
            SimplePackage {
                name: "ansible".to_string(),
                version: "2.0".to_string(),
            },
            SimplePackage {
                name: "Boto3".to_string(),
                version: "3.0".to_string(),
            },
        ];
        let doc =
            InventoryDocument::build("img:1", &ImageMetadata::default(), vec![], python, vec![]);
        let names: Vec<&str> = doc.python.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["ansible", "Boto3", "Zebra"]);
    }

    #[test]
    fn test_metadata_accepts_both_capitalizations() {
        let upper: ImageMetadata = serde_json::from_str(
            r#"{"Created": "2024-01-01T00:00:00Z", "Digest": "sha256:aa", "RepoTags": ["a:1"]}"#,
        )
        .unwrap();
        assert_eq!(upper.created.as_deref(), Some("2024-01-01T00:00:00Z"));
        assert_eq!(upper.digest.as_deref(), Some("sha256:aa"));
        assert_eq!(upper.repo_tags, vec!["a:1"]);

        let lower: ImageMetadata =
            serde_json::from_str(r#"{"created": "2024-02-02T00:00:00Z", "digest": "sha256:bb"}"#)
                .unwrap();
        assert_eq!(lower.created.as_deref(), Some("2024-02-02T00:00:00Z"));
        assert_eq!(lower.digest.as_deref(), Some("sha256:bb"));
        assert!(lower.repo_tags.is_empty());
    }

    #[test]
    fn test_metadata_missing_fields_default() {
        let meta: ImageMetadata = serde_json::from_str("{}").unwrap();
        assert!(meta.created.is_none());
        assert!(meta.digest.is_none());
        assert!(meta.repo_digests.is_empty());
        assert!(meta.repo_tags.is_empty());
    }

    #[test]
    fn test_xml_round_trip() {
        let meta = ImageMetadata {
            created: Some("2024-03-01T12:00:00Z".to_string()),
            digest: Some("sha256:deadbeef".to_string()),
            repo_digests: vec!["reg.example.com/app@sha256:deadbeef".to_string()],
            repo_tags: vec!["reg.example.com/app:1.0".to_string()],
        };
        let rpms = vec![
            RpmPackage {
                name: "bash".to_string(),
                epoch: None,
                version: "5.1.8".to_string(),
                release: "6.el9".to_string(),
                arch: "x86_64".to_string(),
            },
            RpmPackage {
                name: "dbus".to_string(),
                epoch: Some("1".to_string()),
                version: "1.12.20".to_string(),
                release: "8.el9".to_string(),
                arch: "x86_64".to_string(),
            },
        ];
        let python = vec![SimplePackage {
            name: "requests".to_string(),
            version: "2.31.0".to_string(),
        }];
        let collections = vec![SimplePackage {
            name: "ansible.posix".to_string(),
            version: "1.5.0".to_string(),
        }];

        let doc = InventoryDocument::build("reg.example.com/app:1.0", &meta, rpms, python, collections);
        let reloaded = InventoryDocument::from_xml(&doc.to_xml()).unwrap();
        assert_eq!(reloaded, doc);
    }

    #[test]
    fn test_xml_escapes_special_characters() {
        let meta = ImageMetadata {
            created: Some("2024<&>\"'".to_string()),
            ..Default::default()
        };
        let doc = InventoryDocument::build("img:1", &meta, vec![], vec![], vec![]);
        let xml = doc.to_xml();
        assert!(xml.contains("created=\"2024&lt;&amp;&gt;&quot;&apos;\""));
        let reloaded = InventoryDocument::from_xml(&xml).unwrap();
        assert_eq!(reloaded.created.as_deref(), Some("2024<&>\"'"));
    }

    #[test]
    fn test_from_xml_rejects_wrong_root() {
        let err = InventoryDocument::from_xml("<notimage/>").unwrap_err();
        assert!(err.to_string().contains("expected <image>"));
    }
}
