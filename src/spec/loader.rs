//! Finding specification files.
//!
//! A file reference is tried as given, then next to the driver that asked for it, then in
//! each shared specification directory. The first existing candidate wins.

use std::path::{Path, PathBuf};

use tracing::debug;

use super::Specification;
use crate::error::{Error, Result};

/// Specification directory shipped with the crate.
pub fn shared_spec_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("specs")
}

#[derive(Debug, Clone)]
pub struct SpecLoader {
    shared_dirs: Vec<PathBuf>,
}

impl Default for SpecLoader {
    fn default() -> Self {
        Self {
            shared_dirs: vec![shared_spec_dir()],
        }
    }
}

impl SpecLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds shared directories searched after the built-in one.
    pub fn with_shared_dirs<I: IntoIterator<Item = PathBuf>>(mut self, dirs: I) -> Self {
        self.shared_dirs.extend(dirs);
        self
    }

    pub fn candidates(&self, file: &str, driver_dir: Option<&Path>) -> Vec<PathBuf> {
        let given = PathBuf::from(file);
        let mut candidates = vec![given.clone()];
        if given.is_relative() {
            candidates.extend(driver_dir.map(|dir| dir.join(&given)));
            candidates.extend(self.shared_dirs.iter().map(|dir| dir.join(&given)));
        }
        candidates
    }

    pub fn resolve(&self, file: &str, driver_dir: Option<&Path>) -> Result<PathBuf> {
        let candidates = self.candidates(file, driver_dir);
        match candidates.iter().find(|path| path.is_file()) {
            Some(path) => Ok(path.clone()),
            None => Err(Error::SpecFileNotFound {
                file: file.to_string(),
                searched: candidates,
            }),
        }
    }

    pub fn load(&self, file: &str, driver_dir: Option<&Path>) -> Result<Specification> {
        let path = self.resolve(file, driver_dir)?;
        debug!("loading specification from {}", path.display());
        Specification::load(&path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn given_path_wins_over_driver_dir() {
        let here = tempfile::tempdir().unwrap();
        let driver = tempfile::tempdir().unwrap();
        let explicit = here.path().join("smu.yml");
        fs::write(&explicit, "methods:\n  a: [\"A\"]\n").unwrap();
        fs::write(driver.path().join("smu.yml"), "methods:\n  b: [\"B\"]\n").unwrap();

        let loader = SpecLoader::new();
        let spec = loader
            .load(explicit.to_str().unwrap(), Some(driver.path()))
            .unwrap();
        assert!(spec.contains("a"));
    }

    #[test]
    fn falls_back_to_driver_dir_then_shared_dirs() {
        let driver = tempfile::tempdir().unwrap();
        let shared = tempfile::tempdir().unwrap();
        fs::write(driver.path().join("only_driver.yml"), "methods: {}\n").unwrap();
        fs::write(shared.path().join("only_shared.yml"), "methods: {}\n").unwrap();

        let loader = SpecLoader::new().with_shared_dirs([shared.path().to_path_buf()]);
        assert_eq!(
            loader.resolve("only_driver.yml", Some(driver.path())).unwrap(),
            driver.path().join("only_driver.yml")
        );
        assert_eq!(
            loader.resolve("only_shared.yml", Some(driver.path())).unwrap(),
            shared.path().join("only_shared.yml")
        );
    }

    #[test]
    fn absent_everywhere_lists_the_search() {
        let driver = tempfile::tempdir().unwrap();
        match SpecLoader::new().resolve("nowhere_to_be_found.yml", Some(driver.path())) {
            Err(Error::SpecFileNotFound { file, searched }) => {
                assert_eq!(file, "nowhere_to_be_found.yml");
                assert_eq!(searched.len(), 3);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn shipped_specifications_parse() {
        let loader = SpecLoader::new();
        for file in ["keithley_2450.yml", "generic_smu.yml"] {
            let spec = loader.load(file, None).unwrap();
            assert!(!spec.is_empty(), "{} declares no methods", file);
        }
    }
}
