//! File enumeration behind a trait so pattern resolution can be tested
//! without a real tree.
use crate::registry::IgnoreFilter;
use anyhow::{anyhow, Context, Result};
use std::path::{Component, Path};
use walkdir::WalkDir;

/// Lists visible files as normalized project-relative posix paths.
pub trait FileLister: Sync {
    /// Every visible file at or beneath `dir` (`""` is the project root), sorted.
    fn files_under(&self, dir: &str) -> Result<Vec<String>>;
    /// True when `rel` names a visible file or directory.
    fn exists(&self, rel: &str) -> bool;
}

/// Real filesystem lister: walkdir filtered through the ignore rules.
pub struct FsLister<'a> {
    root: &'a Path,
    ignore: &'a IgnoreFilter,
}

impl<'a> FsLister<'a> {
    pub fn new(root: &'a Path, ignore: &'a IgnoreFilter) -> Self {
        Self { root, ignore }
    }
}

impl FileLister for FsLister<'_> {
    fn files_under(&self, dir: &str) -> Result<Vec<String>> {
        let start = if dir.is_empty() {
            self.root.to_path_buf()
        } else {
            self.root.join(dir)
        };
        if self.ignore.is_ignored(dir) || !start.exists() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in WalkDir::new(&start)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                rel_text(self.root, entry.path())
                    .map(|rel| !self.ignore.is_ignored(&rel))
                    .unwrap_or(false)
            })
        {
            let entry = entry.with_context(|| format!("walk {}", start.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            files.push(rel_text(self.root, entry.path())?);
        }
        files.sort();
        Ok(files)
    }

    fn exists(&self, rel: &str) -> bool {
        !self.ignore.is_ignored(rel) && self.root.join(rel).exists()
    }
}

fn rel_text(root: &Path, path: &Path) -> Result<String> {
    let rel = path
        .strip_prefix(root)
        .with_context(|| format!("strip prefix {} from {}", root.display(), path.display()))?;
    let mut parts: Vec<&str> = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(segment) => parts.push(
                segment
                    .to_str()
                    .ok_or_else(|| anyhow!("non UTF-8 path {}", path.display()))?,
            ),
            Component::CurDir => {}
            other => return Err(anyhow!("unsupported path component {other:?}")),
        }
    }
    Ok(parts.join("/"))
}
