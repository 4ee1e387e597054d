//! The in-container inventory script and the marker-delimited capture format
//! it produces.
//!
//! The script is executed with `bash -lc` inside the image and prints three
//! sections, each wrapped by unique start/end markers. Section extraction
//! tolerates a missing section: one failed collector step must not abort the
//! whole image.

pub const RPM_START: &str = "===RPM START===\n";
pub const RPM_END: &str = "===RPM END===";
pub const PIP_START: &str = "===PIP START===\n";
pub const PIP_END: &str = "===PIP END===";
pub const COLL_START: &str = "===COLL START===\n";
pub const COLL_END: &str = "===COLL END===";

/// One-shot payload run inside the image. Emits the RPM list, the Python
/// package list, and three collection JSON blobs (galaxy listing, filesystem
/// scan, rpm-name mapping) separated by `===COLL SEP===`.
pub const INVENTORY_SCRIPT: &str = r#"
set -e
echo "===RPM START==="
rpm -qa --qf '%{NAME}|%{EPOCHNUM}|%{VERSION}|%{RELEASE}|%{ARCH}\n' | sort
echo "===RPM END==="

echo "===PIP START==="
( python3 -m pip list --format=json 2>/dev/null ) || ( python3 -m pip freeze 2>/dev/null || true )
echo "===PIP END==="

echo "===COLL START==="
( ansible-galaxy collection list --format json 2>/dev/null ) || echo "{}"
echo "===COLL SEP==="

python3 - <<'PY'
import json, os, glob
roots = [
  "/usr/share/ansible/collections/ansible_collections",
  "/usr/local/share/ansible/collections/ansible_collections",
]
out = {}
for root in roots:
  if not os.path.isdir(root): continue
  for ns in glob.glob(os.path.join(root, "*")):
    if not os.path.isdir(ns): continue
    for coll in glob.glob(os.path.join(ns, "*")):
      if not os.path.isdir(coll): continue
      name = f"{os.path.basename(ns)}.{os.path.basename(coll)}"
      ver = None
      mpath = os.path.join(coll, "MANIFEST.json")
      if os.path.exists(mpath):
        try:
          with open(mpath, "r", encoding="utf-8") as f:
            meta = json.load(f)
          ver = meta.get("collection_info", {}).get("version")
        except Exception:
          pass
      if not ver:
        ypath = os.path.join(coll, "galaxy.yml")
        if os.path.exists(ypath):
          try:
            import yaml
            with open(ypath, "r", encoding="utf-8") as f:
              y = yaml.safe_load(f)
            ver = (y or {}).get("version")
          except Exception:
            pass
      if ver:
        out[name] = {"version": str(ver)}
print(json.dumps({"collections": out}))
PY
echo "===COLL SEP==="

python3 - <<'PY'
import json, subprocess
out={}
try:
  q = subprocess.run(["rpm","-qa","--qf","%{NAME}|%{VERSION}\n"], text=True, capture_output=True, check=True)
  for line in q.stdout.splitlines():
    if not line or "|" not in line: continue
    n,v = line.split("|",1)
    if n.startswith("ansible-collection-"):
      parts = n.split("-", 3)
      if len(parts) >= 4:
        fqcn = f"{parts[2]}.{parts[3]}"
        out[fqcn] = {"version": str(v)}
except Exception:
  pass
print(json.dumps({"collections": out}))
PY
echo "===COLL END==="
"#;

/// Result of looking for one marker-delimited section in captured output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Section {
    /// The start marker was found; holds the trimmed section body.
    Found(String),
    /// The start marker was absent from the captured output.
    Missing,
}

impl Section {
    /// The section body, with a missing section reading as empty.
    pub fn text(&self) -> &str {
        match self {
            Section::Found(text) => text,
            Section::Missing => "",
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Section::Missing)
    }
}

/// The three sections of one captured inventory run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedSections {
    pub rpms: Section,
    pub python: Section,
    pub collections: Section,
}

/// Cut the text between a start marker and an end marker.
///
/// A missing end marker yields everything after the start marker; the
/// captured process may have died mid-section and partial data is still
/// usable.
pub fn extract_section(raw: &str, start: &str, end: &str) -> Section {
    match raw.split_once(start) {
        Some((_, rest)) => {
            let body = match rest.split_once(end) {
                Some((body, _)) => body,
                None => rest,
            };
            Section::Found(body.trim().to_string())
        }
        None => Section::Missing,
    }
}

/// Split one raw capture into its RPM, Python, and collection sections.
pub fn split_sections(raw: &str) -> CapturedSections {
    CapturedSections {
        rpms: extract_section(raw, RPM_START, RPM_END),
        python: extract_section(raw, PIP_START, PIP_END),
        collections: extract_section(raw, COLL_START, COLL_END),
    }
}
