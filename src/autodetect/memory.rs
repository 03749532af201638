//! In-memory [`FileLister`] over a fixed file set.
use super::FileLister;
use crate::util::{is_within, normalize_rel};
use anyhow::Result;
use std::collections::BTreeSet;

#[derive(Debug, Default, Clone)]
pub struct MemoryLister {
    files: BTreeSet<String>,
}

impl MemoryLister {
    pub fn new<I, S>(files: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let files: BTreeSet<String> = files
            .into_iter()
            .map(|file| normalize_rel(file.as_ref()))
            .collect::<Result<_>>()?;
        Ok(Self { files })
    }
}

impl FileLister for MemoryLister {
    fn files_under(&self, dir: &str) -> Result<Vec<String>> {
        Ok(self
            .files
            .iter()
            .filter(|file| is_within(file, dir))
            .cloned()
            .collect())
    }

    fn exists(&self, rel: &str) -> bool {
        self.files.iter().any(|file| is_within(file, rel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_lister_filters_by_directory() {
        let lister = MemoryLister::new(["a/b.md", "a/c/d.md", "ab/e.md"]).unwrap();
        assert_eq!(lister.files_under("a").unwrap().len(), 2);
        assert!(lister.exists("a/c"));
        assert!(!lister.exists("a/x"));
    }
}
