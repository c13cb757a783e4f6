#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::{TempDir, tempdir};

/// Patient register export in the shape the clinic's desktop system produces.
pub const REGISTER_CSV: &str = "\
Patient ID,First Name,Surname,Sex,Date of Birth,Mobile,Address,Reg Date,Referral Source
OMC-2024-0001,Felix,Omokaro,M,12/05/1984,08031234567,12 Sapele Road,2024-03-01,Referral
,Joy,Ekhator,Female,unknown,,,,
nan,,,F,,,,,
OMC-2024-0004,Osas,Omokaro,female,1990-07-21,08051112222,Ekpoma,01/02/2023,Walk-in
";

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    /// Intermediate directories are created as needed.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dirs");
        }
        fs::write(&path, contents).expect("write temp file contents");
        path
    }

    pub fn join(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    pub fn database(&self) -> PathBuf {
        self.join("erp.sqlite")
    }
}
