//! Drift detection between creation-time inputs and their current content
//!
//! When a container is provisioned we record SHA-256 digests of the build
//! definition and of the launcher definition. On later attaches the digests
//! are recomputed and compared so the user can be told that the running
//! container no longer matches its inputs. Drift is advisory: nothing here
//! ever blocks an action or returns an error to the orchestrator.
//!
//! The record is a small text file keyed by line prefix:
//!
//! ```text
//! containerfile=<hex>
//! script=<hex>
//! ```

use crate::errors::Result;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

const CONTAINERFILE_KEY: &str = "containerfile=";
const SCRIPT_KEY: &str = "script=";

/// Digests of the inputs used to create a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumRecord {
    /// Build definition digest; `None` when the file did not exist
    pub containerfile: Option<String>,
    /// Launcher definition digest
    pub script: String,
}

impl ChecksumRecord {
    /// Serialize to the line-prefixed text form
    pub fn to_text(&self) -> String {
        let mut text = String::new();
        if let Some(ref digest) = self.containerfile {
            text.push_str(CONTAINERFILE_KEY);
            text.push_str(digest);
            text.push('\n');
        }
        text.push_str(SCRIPT_KEY);
        text.push_str(&self.script);
        text.push('\n');
        text
    }

    /// Parse the text form; a record without a `script=` line is unreadable
    pub fn parse(text: &str) -> Option<Self> {
        let mut containerfile = None;
        let mut script = None;
        for line in text.lines().map(str::trim) {
            if let Some(value) = line.strip_prefix(CONTAINERFILE_KEY) {
                containerfile = Some(value.to_string());
            } else if let Some(value) = line.strip_prefix(SCRIPT_KEY) {
                script = Some(value.to_string());
            }
        }
        Some(Self {
            containerfile,
            script: script?,
        })
    }
}

/// Which inputs changed since the container was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriftReport {
    pub containerfile_changed: bool,
    pub script_changed: bool,
}

/// Suggested follow-up for a drift report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriftRecommendation {
    /// The image is stale: rebuild it and recreate the container
    Rebuild,
    /// Only the container definition changed: recreate the container
    Force,
}

impl fmt::Display for DriftRecommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rebuild => write!(f, "run with --rebuild to rebuild the image and recreate the container"),
            Self::Force => write!(f, "run with --force to recreate the container"),
        }
    }
}

impl DriftReport {
    pub fn has_drift(&self) -> bool {
        self.containerfile_changed || self.script_changed
    }

    /// A changed build definition needs a rebuild, which also covers a
    /// changed launcher definition
    pub fn recommendation(&self) -> Option<DriftRecommendation> {
        if self.containerfile_changed {
            Some(DriftRecommendation::Rebuild)
        } else if self.script_changed {
            Some(DriftRecommendation::Force)
        } else {
            None
        }
    }

    /// Human-readable list of changed inputs
    pub fn changed_inputs(&self) -> Vec<&'static str> {
        let mut changed = Vec::new();
        if self.containerfile_changed {
            changed.push("build definition");
        }
        if self.script_changed {
            changed.push("launcher definition");
        }
        changed
    }
}

/// Computes, persists and compares checksum records for one project
#[derive(Debug, Clone)]
pub struct DriftDetector {
    build_file: PathBuf,
    launcher_inputs: Vec<PathBuf>,
    record_path: PathBuf,
}

impl DriftDetector {
    pub fn new(build_file: PathBuf, launcher_inputs: Vec<PathBuf>, record_path: PathBuf) -> Self {
        Self {
            build_file,
            launcher_inputs,
            record_path,
        }
    }

    pub fn record_path(&self) -> &Path {
        &self.record_path
    }

    /// Digest the current inputs
    #[instrument(skip(self))]
    pub fn snapshot(&self) -> Result<ChecksumRecord> {
        let containerfile = if self.build_file.is_file() {
            Some(digest_files(std::slice::from_ref(&self.build_file))?)
        } else {
            None
        };
        let script = digest_files(&self.launcher_inputs)?;
        Ok(ChecksumRecord {
            containerfile,
            script,
        })
    }

    /// Replace the persisted record with `record`
    #[instrument(skip(self, record))]
    pub fn persist(&self, record: &ChecksumRecord) -> Result<()> {
        if let Some(parent) = self.record_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let temp_path = self.record_path.with_extension("tmp");
        std::fs::write(&temp_path, record.to_text())?;
        std::fs::rename(&temp_path, &self.record_path)?;
        debug!("Persisted checksum record to {}", self.record_path.display());
        Ok(())
    }

    /// Read the persisted record, if any
    pub fn load(&self) -> Option<ChecksumRecord> {
        match std::fs::read_to_string(&self.record_path) {
            Ok(text) => {
                let record = ChecksumRecord::parse(&text);
                if record.is_none() {
                    debug!(
                        "Ignoring unreadable checksum record at {}",
                        self.record_path.display()
                    );
                }
                record
            }
            Err(e) => {
                debug!("No checksum record at {}: {}", self.record_path.display(), e);
                None
            }
        }
    }

    /// Compare the persisted record against current inputs
    ///
    /// Without a persisted record there is nothing to compare against, so no
    /// drift is reported. A field only counts as changed when it was recorded
    /// and now differs: a build definition that did not exist at creation
    /// time is never flagged, even if one exists now.
    #[instrument(skip(self))]
    pub fn detect_drift(&self) -> DriftReport {
        let Some(persisted) = self.load() else {
            return DriftReport::default();
        };
        let current = match self.snapshot() {
            Ok(record) => record,
            Err(e) => {
                debug!("Could not compute current checksums: {}", e);
                return DriftReport::default();
            }
        };

        let containerfile_changed = match persisted.containerfile {
            Some(ref recorded) => current.containerfile.as_ref() != Some(recorded),
            None => false,
        };
        let script_changed = persisted.script != current.script;

        DriftReport {
            containerfile_changed,
            script_changed,
        }
    }
}

/// SHA-256 over the concatenated contents of the files that exist
fn digest_files(paths: &[PathBuf]) -> Result<String> {
    let mut hasher = Sha256::new();
    for path in paths {
        if !path.is_file() {
            continue;
        }
        let mut file = File::open(path)?;
        std::io::copy(&mut file, &mut hasher)?;
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        build_file: PathBuf,
        launcher: PathBuf,
        detector: DriftDetector,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let build_file = dir.path().join("Containerfile");
        let launcher = dir.path().join("dockhand.toml");
        let detector = DriftDetector::new(
            build_file.clone(),
            vec![launcher.clone()],
            dir.path().join(".dockhand").join("checksums"),
        );
        Fixture {
            _dir: dir,
            build_file,
            launcher,
            detector,
        }
    }

    #[test]
    fn test_record_text_format() {
        let record = ChecksumRecord {
            containerfile: Some("abc".to_string()),
            script: "def".to_string(),
        };
        assert_eq!(record.to_text(), "containerfile=abc\nscript=def\n");

        let without_build = ChecksumRecord {
            containerfile: None,
            script: "def".to_string(),
        };
        assert_eq!(without_build.to_text(), "script=def\n");
    }

    #[test]
    fn test_parse_ignores_unknown_lines() {
        let record = ChecksumRecord::parse("# comment\nscript=1\nother=2\ncontainerfile=3\n").unwrap();
        assert_eq!(record.script, "1");
        assert_eq!(record.containerfile.as_deref(), Some("3"));
    }

    #[test]
    fn test_parse_requires_script() {
        assert!(ChecksumRecord::parse("containerfile=abc\n").is_none());
        assert!(ChecksumRecord::parse("").is_none());
    }

    #[test]
    fn test_snapshot_digests() {
        let fx = fixture();
        std::fs::write(&fx.build_file, "FROM fedora\n").unwrap();
        std::fs::write(&fx.launcher, "shell = \"/bin/zsh\"\n").unwrap();

        let record = fx.detector.snapshot().unwrap();
        let expected = format!("{:x}", Sha256::digest(b"FROM fedora\n"));
        assert_eq!(record.containerfile.as_deref(), Some(expected.as_str()));
        assert_eq!(record.script.len(), 64);
    }

    #[test]
    fn test_snapshot_without_build_file() {
        let fx = fixture();
        let record = fx.detector.snapshot().unwrap();
        assert!(record.containerfile.is_none());
        // Digest of no launcher inputs is the digest of the empty input
        assert_eq!(record.script, format!("{:x}", Sha256::digest(b"")));
    }

    #[test]
    fn test_persist_overwrites_wholesale() {
        let fx = fixture();
        fx.detector
            .persist(&ChecksumRecord {
                containerfile: Some("old".to_string()),
                script: "old".to_string(),
            })
            .unwrap();
        fx.detector
            .persist(&ChecksumRecord {
                containerfile: None,
                script: "new".to_string(),
            })
            .unwrap();

        let text = std::fs::read_to_string(fx.detector.record_path()).unwrap();
        assert_eq!(text, "script=new\n");
        assert!(!fx.detector.record_path().with_extension("tmp").exists());
    }

    #[test]
    fn test_no_record_means_no_drift() {
        let fx = fixture();
        std::fs::write(&fx.build_file, "FROM fedora\n").unwrap();
        assert_eq!(fx.detector.detect_drift(), DriftReport::default());
    }

    #[test]
    fn test_unchanged_inputs_report_no_drift() {
        let fx = fixture();
        std::fs::write(&fx.build_file, "FROM fedora\n").unwrap();
        std::fs::write(&fx.launcher, "").unwrap();
        fx.detector.persist(&fx.detector.snapshot().unwrap()).unwrap();

        let report = fx.detector.detect_drift();
        assert!(!report.has_drift());
        assert_eq!(report.recommendation(), None);
    }

    #[test]
    fn test_changed_containerfile_is_detected() {
        let fx = fixture();
        std::fs::write(&fx.build_file, "FROM fedora\n").unwrap();
        fx.detector.persist(&fx.detector.snapshot().unwrap()).unwrap();

        std::fs::write(&fx.build_file, "FROM fedora\nRUN dnf install -y git\n").unwrap();
        let report = fx.detector.detect_drift();
        assert!(report.containerfile_changed);
        assert!(!report.script_changed);
        assert_eq!(report.recommendation(), Some(DriftRecommendation::Rebuild));
    }

    #[test]
    fn test_deleted_containerfile_counts_as_changed() {
        let fx = fixture();
        std::fs::write(&fx.build_file, "FROM fedora\n").unwrap();
        fx.detector.persist(&fx.detector.snapshot().unwrap()).unwrap();

        std::fs::remove_file(&fx.build_file).unwrap();
        assert!(fx.detector.detect_drift().containerfile_changed);
    }

    #[test]
    fn test_containerfile_added_after_creation_is_not_flagged() {
        let fx = fixture();
        fx.detector.persist(&fx.detector.snapshot().unwrap()).unwrap();

        std::fs::write(&fx.build_file, "FROM fedora\n").unwrap();
        let report = fx.detector.detect_drift();
        assert!(!report.containerfile_changed);
    }

    #[test]
    fn test_changed_launcher_recommends_force() {
        let fx = fixture();
        std::fs::write(&fx.launcher, "shell = \"/bin/bash\"\n").unwrap();
        fx.detector.persist(&fx.detector.snapshot().unwrap()).unwrap();

        std::fs::write(&fx.launcher, "shell = \"/bin/zsh\"\n").unwrap();
        let report = fx.detector.detect_drift();
        assert!(report.script_changed);
        assert_eq!(report.recommendation(), Some(DriftRecommendation::Force));
        assert_eq!(report.changed_inputs(), vec!["launcher definition"]);
    }

    #[test]
    fn test_corrupt_record_means_no_drift() {
        let fx = fixture();
        std::fs::create_dir_all(fx.detector.record_path().parent().unwrap()).unwrap();
        std::fs::write(fx.detector.record_path(), "garbage").unwrap();
        std::fs::write(&fx.build_file, "FROM fedora\n").unwrap();
        assert!(!fx.detector.detect_drift().has_drift());
    }
}
