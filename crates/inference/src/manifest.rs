use anyhow::Context;
use lifecycle::Rect;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

/// One frame to process: an image on disk and the regions to run on it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FrameEntry {
    pub image: PathBuf,
    #[serde(default)]
    pub rois: Vec<Rect>,
}

/// Streams frames from a JSON-lines file, one [`FrameEntry`] per line.
///
/// Relative image paths are resolved against the manifest's directory. Blank
/// lines are skipped; a malformed line yields an error for that line only.
pub struct FrameManifest {
    base_dir: PathBuf,
    lines: Lines<BufReader<File>>,
    line_number: usize,
}

impl FrameManifest {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open frame manifest {}", path.display()))?;
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        Ok(Self {
            base_dir,
            lines: BufReader::new(file).lines(),
            line_number: 0,
        })
    }

    fn parse(&self, line: &str) -> anyhow::Result<FrameEntry> {
        let mut entry: FrameEntry = serde_json::from_str(line)
            .with_context(|| format!("Invalid manifest entry on line {}", self.line_number))?;
        if entry.image.is_relative() {
            entry.image = self.base_dir.join(&entry.image);
        }
        Ok(entry)
    }
}

impl Iterator for FrameManifest {
    type Item = anyhow::Result<FrameEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e.into())),
            };
            self.line_number += 1;
            if line.trim().is_empty() {
                continue;
            }
            return Some(self.parse(&line));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn reads_entries_and_resolves_relative_paths() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("frames.jsonl");
        let mut file = File::create(&path).unwrap();
        writeln!(
            file,
            r#"{{"image": "a.png", "rois": [{{"x": 0, "y": 0, "width": 10, "height": 10}}]}}"#
        )
        .unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"image": "/abs/b.png"}}"#).unwrap();
        drop(file);

        let entries: Vec<FrameEntry> = FrameManifest::open(&path)
            .unwrap()
            .collect::<anyhow::Result<_>>()
            .unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].image, dir.path().join("a.png"));
        assert_eq!(entries[0].rois, vec![Rect::new(0, 0, 10, 10)]);
        assert_eq!(entries[1].image, PathBuf::from("/abs/b.png"));
        assert!(entries[1].rois.is_empty());
    }

    #[test]
    fn malformed_line_fails_alone() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("frames.jsonl");
        std::fs::write(&path, "not json\n{\"image\": \"ok.png\"}\n").unwrap();

        let results: Vec<_> = FrameManifest::open(&path).unwrap().collect();

        assert_eq!(results.len(), 2);
        let err = results[0].as_ref().unwrap_err();
        assert!(err.to_string().contains("line 1"));
        assert!(results[1].is_ok());
    }

    #[test]
    fn missing_manifest_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(FrameManifest::open(&dir.path().join("missing.jsonl")).is_err());
    }
}
