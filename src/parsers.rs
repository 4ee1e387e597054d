//! Parsers for the raw text captured inside a container.
//!
//! Captured output is noisy by nature (login banners, pip warnings), so both
//! parsers drop malformed input at line granularity instead of failing the
//! whole image. A partial inventory beats no inventory.

use serde::Deserialize;

use crate::document::{RpmPackage, SimplePackage};

/// Which input form the Python package parser ended up consuming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipListFormat {
    /// `pip list --format=json` output.
    Json,
    /// `pip freeze` style `name==version` lines.
    Freeze,
}

/// Parse `rpm -qa` output in `name|epoch|version|release|arch` form.
///
/// Lines that do not split into exactly five fields are skipped. The
/// no-epoch placeholders normalize to an absent epoch: `(none)` from
/// `%{EPOCH}` and `0` from `%{EPOCHNUM}`.
pub fn parse_rpm_lines(text: &str) -> Vec<RpmPackage> {
    let mut items = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || !line.contains('|') {
            continue;
        }
        let parts: Vec<&str> = line.split('|').map(str::trim).collect();
        if parts.len() != 5 {
            continue;
        }
        let epoch = match parts[1] {
            "" | "(none)" | "0" => None,
            epoch => Some(epoch.to_string()),
        };
        items.push(RpmPackage {
            name: parts[0].to_string(),
            epoch,
            version: parts[2].to_string(),
            release: parts[3].to_string(),
            arch: parts[4].to_string(),
        });
    }
    items
}

#[derive(Debug, Deserialize)]
struct PipJsonEntry {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    version: Option<String>,
}

/// Parse Python package listings.
///
/// Tries a JSON array of `{name, version}` objects first; when that fails,
/// falls back to `name==version` lines, skipping anything without `==`.
/// The returned [`PipListFormat`] records which path was taken.
pub fn parse_python_packages(text: &str) -> (Vec<SimplePackage>, PipListFormat) {
    if let Ok(entries) = serde_json::from_str::<Vec<PipJsonEntry>>(text) {
        let items = entries
            .into_iter()
            .filter_map(|e| match (e.name, e.version) {
                (Some(name), Some(version)) if !name.is_empty() && !version.is_empty() => {
                    Some(SimplePackage { name, version })
                }
                _ => None,
            })
            .collect();
        return (items, PipListFormat::Json);
    }

    let items = text
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            let (name, version) = line.split_once("==")?;
            Some(SimplePackage {
                name: name.trim().to_string(),
                version: version.trim().to_string(),
            })
        })
        .collect();
    (items, PipListFormat::Freeze)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rpm_lines_skips_malformed() {
        let parsed = parse_rpm_lines("bash|0|5.1.8|6.el9|x86_64\nmalformed-line\n");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].name, "bash");
        assert_eq!(parsed[0].epoch, None);
        assert_eq!(parsed[0].version, "5.1.8");
        assert_eq!(parsed[0].release, "6.el9");
        assert_eq!(parsed[0].arch, "x86_64");
    }

    #[test]
    fn test_parse_rpm_lines_normalizes_epoch_placeholders() {
        let parsed = parse_rpm_lines(
            "bash|(none)|5.1.8|6.el9|x86_64\nzlib||1.2.11|31.el9|x86_64\ndbus|1|1.12.20|8.el9|x86_64",
        );
        assert_eq!(parsed[0].epoch, None);
        assert_eq!(parsed[1].epoch, None);
        assert_eq!(parsed[0].evr(), "5.1.8-6.el9");
        // A real epoch survives.
        assert_eq!(parsed[2].epoch, Some("1".to_string()));
        assert_eq!(parsed[2].evr(), "1:1.12.20-8.el9");
    }

    #[test]
    fn test_parse_rpm_lines_rejects_wrong_field_count() {
        let parsed = parse_rpm_lines("a|b|c|d\na|b|c|d|e|f\nbash|1|5.2|1.el9|noarch");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].name, "bash");
    }

    #[test]
    fn test_parse_python_packages_json_path() {
        let (items, format) = parse_python_packages(
            r#"[{"name": "requests", "version": "2.31.0"}, {"name": "pip", "version": "23.0"}]"#,
        );
        assert_eq!(format, PipListFormat::Json);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].name, "requests");
        assert_eq!(items[0].version, "2.31.0");
    }

    #[test]
    fn test_parse_python_packages_json_skips_incomplete_entries() {
        let (items, format) =
            parse_python_packages(r#"[{"name": "requests"}, {"version": "1.0"}, {}]"#);
        assert_eq!(format, PipListFormat::Json);
        assert!(items.is_empty());
    }

    #[test]
    fn test_parse_python_packages_freeze_fallback() {
        let (items, format) =
            parse_python_packages("requests==2.31.0\nnot a package line\nurllib3==1.26.18\n");
        assert_eq!(format, PipListFormat::Freeze);
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].name, "urllib3");
        assert_eq!(items[1].version, "1.26.18");
    }

    #[test]
    fn test_parse_python_packages_empty_input() {
        let (items, format) = parse_python_packages("");
        assert_eq!(format, PipListFormat::Freeze);
        assert!(items.is_empty());
    }
}
