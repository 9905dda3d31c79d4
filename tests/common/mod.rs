#![allow(dead_code)]

use std::path::{Path, PathBuf};

pub const FAKE_QUARTO_VERSION: &str = "1.5.57";

/// Document body the fake quarto prints for `--output -`.
pub const STREAMED_DOCUMENT: &str = "<html><body>streamed</body></html>";

/// Stand-in for the quarto CLI. Records its working directory and arguments
/// in `quarto-calls.log` next to itself, fails like quarto when the input is
/// missing, prints the document for `--output -`, and otherwise writes
/// `<stem>.<format>`.
const FAKE_QUARTO: &str = r#"#!/bin/sh
if [ "$1" = "--version" ]; then
  echo 1.5.57
  exit 0
fi
log="$(dirname "$0")/quarto-calls.log"
pwd > "$log"
for arg in "$@"; do
  echo "$arg" >> "$log"
done
if [ ! -f "$2" ]; then
  echo "ERROR: No valid input files passed to render" >&2
  exit 1
fi
if [ "$5" = "--output" ] && [ "$6" = "-" ]; then
  echo "<html><body>streamed</body></html>"
  exit 0
fi
out="${2%.*}.$4"
echo "<html><body>rendered</body></html>" > "$out"
echo "Output created: $out"
"#;

#[cfg(unix)]
pub fn install_fake_quarto(bin_dir: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = bin_dir.join("quarto");
    std::fs::write(&path, FAKE_QUARTO).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Working directory and arguments of the last fake quarto call, if any.
pub fn recorded_call(bin_dir: &Path) -> Option<(PathBuf, Vec<String>)> {
    let content = std::fs::read_to_string(bin_dir.join("quarto-calls.log")).ok()?;
    let mut lines = content.lines();
    let cwd = PathBuf::from(lines.next()?);
    Some((cwd, lines.map(str::to_string).collect()))
}

pub fn write_document(folder: &Path, name: &str) -> PathBuf {
    let path = folder.join(name);
    std::fs::write(
        &path,
        "---\ntitle: \"Linear equations\"\n---\n\n## Slope\n\n$y = mx + b$\n",
    )
    .unwrap();
    path
}
