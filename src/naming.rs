//! Image reference handling and output file naming.

use std::path::Path;

/// Replace every run of characters outside `[A-Za-z0-9._-]` with a single
/// underscore.
pub fn sanitize_filename(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_run = false;
    for c in s.chars() {
        if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
            out.push(c);
            in_run = false;
        } else if !in_run {
            out.push('_');
            in_run = true;
        }
    }
    out
}

/// Derive the output file stem for an image reference.
///
/// `registry/ns/name:tag` becomes `name__tag`, `registry/ns/name@digest`
/// becomes `name__<sanitized digest>`, anything else falls back to the
/// sanitized full reference.
pub fn file_stem_for_image(image_ref: &str) -> String {
    let mut tag = None;
    let mut digest = None;
    let mut name = image_ref;

    if let Some((base, dig)) = image_ref.split_once('@') {
        name = base;
        digest = Some(dig);
    } else {
        let last_seg = image_ref.rsplit('/').next().unwrap_or(image_ref);
        if let Some((base, t)) = last_seg.split_once(':') {
            tag = Some(t);
            // Reference minus the last segment, plus the tagless base.
            name = &image_ref[..image_ref.len() - last_seg.len() + base.len()];
        }
    }

    let base = name.rsplit('/').next().unwrap_or(name);
    if let Some(tag) = tag {
        format!("{}__{}", base, tag)
    } else if let Some(digest) = digest {
        format!("{}__{}", base, sanitize_filename(digest))
    } else {
        sanitize_filename(image_ref)
    }
}

/// Extract the tag encoded in an inventory filename of the form
/// `<name>__<tag>.xml`. The tag portion must be free of `.` and `/`, which
/// keeps digest-stem and dotted-tag files falling through to the plain
/// file-stem fallback.
pub fn tag_from_filename(path: &Path) -> Option<String> {
    let file_name = path.file_name()?.to_str()?;
    let stem = file_name.strip_suffix(".xml")?;
    let (_, tag) = stem.split_once("__")?;
    if tag.is_empty() || tag.contains('.') || tag.contains('/') {
        return None;
    }
    Some(tag.to_string())
}

/// Expand a comma-separated tag list against a repository.
pub fn refs_from_tag_list(repo: &str, tags: &str) -> Vec<String> {
    tags.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| format!("{}:{}", repo, t))
        .collect()
}

/// Expand a tags file: one tag or full image reference per line. Blank
/// lines and `#` comments are skipped; entries containing `/`, `:` or `@`
/// are taken as full references, everything else as a tag on `repo`.
pub fn refs_from_tags_file(repo: &str, content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| {
            if line.contains('/') || line.contains(':') || line.contains('@') {
                line.to_string()
            } else {
                format!("{}:{}", repo, line)
            }
        })
        .collect()
}

/// De-duplicate references preserving first-seen order.
pub fn dedupe_refs(refs: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    refs.into_iter().filter(|r| seen.insert(r.clone())).collect()
}
