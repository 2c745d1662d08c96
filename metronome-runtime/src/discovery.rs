use std::path::{Path, PathBuf};

use config::{Config, File};
use tracing::{debug, warn};

use crate::descriptor::{JobDescriptor, RawDescriptor};
use crate::error::{Result, TaskError};
use crate::job::JobCatalog;

const DESCRIPTOR_EXTENSIONS: [&str; 4] = ["toml", "yaml", "yml", "json"];

/// Produces job descriptors for a directory.
pub trait DescriptorSource: Send + Sync {
    /// Descriptors found in `dir`. Fails only when the directory itself cannot be read.
    fn discover(&self, dir: &Path) -> Result<Vec<JobDescriptor>>;
}

/// Reads one descriptor per file from a directory.
///
/// Files are visited in name order, subdirectories are ignored. A file that
/// cannot be parsed or names an unknown job is logged and skipped.
#[derive(Debug, Clone, Default)]
pub struct DirectorySource {
    catalog: JobCatalog,
}

impl DirectorySource {
    pub fn new(catalog: JobCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &JobCatalog {
        &self.catalog
    }

    fn descriptor_files(dir: &Path) -> Result<Vec<PathBuf>> {
        let entries = std::fs::read_dir(dir).map_err(|source| TaskError::Discovery {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && is_descriptor_file(path))
            .collect();
        files.sort();
        Ok(files)
    }

    fn load(&self, path: &Path) -> Result<JobDescriptor> {
        let raw: RawDescriptor = Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize()?;
        raw.into_descriptor(&self.catalog)
    }
}

impl DescriptorSource for DirectorySource {
    fn discover(&self, dir: &Path) -> Result<Vec<JobDescriptor>> {
        let mut descriptors = Vec::new();
        for path in Self::descriptor_files(dir)? {
            match self.load(&path) {
                Ok(descriptor) => {
                    debug!(file = %path.display(), name = ?descriptor.name, "task descriptor loaded");
                    descriptors.push(descriptor);
                }
                Err(err) => {
                    warn!(file = %path.display(), error = %err, "skipping task descriptor");
                }
            }
        }
        Ok(descriptors)
    }
}

fn is_descriptor_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| DESCRIPTOR_EXTENSIONS.contains(&ext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::job;
    use crate::time_unit::PeriodSpec;
    use tempfile::TempDir;

    fn source() -> DirectorySource {
        DirectorySource::new(
            JobCatalog::new()
                .with("fetch", job(|_| async { Ok(()) }))
                .with("store", job(|_| async { Ok(()) })),
        )
    }

    fn write(dir: &TempDir, name: &str, contents: &str) {
        std::fs::write(dir.path().join(name), contents).unwrap();
    }

    #[test]
    fn loads_descriptor_files_in_name_order() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "b-sync.yaml",
            "name: sync\nperiod: 5m\nfunc:\n  - fetch\n  - store\n",
        );
        write(
            &dir,
            "a-report.toml",
            "name = \"report\"\ntime = \"03:30\"\njobs = \"fetch\"\nonce = true\n",
        );
        write(&dir, "notes.txt", "not a task");

        let descriptors = source().discover(dir.path()).unwrap();

        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[0].name.as_deref(), Some("report"));
        assert_eq!(descriptors[0].time.as_deref(), Some("03:30"));
        assert!(descriptors[0].once);
        assert_eq!(descriptors[1].name.as_deref(), Some("sync"));
        assert_eq!(descriptors[1].period, Some(PeriodSpec::Text("5m".into())));
        assert_eq!(descriptors[1].jobs.len(), 2);
    }

    #[test]
    fn skips_files_that_fail_to_load() {
        let dir = TempDir::new().unwrap();
        write(&dir, "good.json", r#"{"name": "good", "period": 10, "jobs": ["fetch"]}"#);
        write(&dir, "unknown-job.json", r#"{"period": 10, "jobs": ["launch"]}"#);
        write(&dir, "broken.toml", "name = ");

        let descriptors = source().discover(dir.path()).unwrap();

        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].name.as_deref(), Some("good"));
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing");

        let err = source().discover(&missing).err().unwrap();
        assert!(matches!(err, TaskError::Discovery { ref path, .. } if path == &missing));
    }
}
