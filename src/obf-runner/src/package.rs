// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Build package loading.
//!
//! A package is either an unpacked package directory holding
//! `buildInfo.json` (plus an optional `manifest.json` and the `obp/` files)
//! or a path straight to a `buildInfo.json` document.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use obf_core::{BuildPlan, PlanError};

pub const BUILD_INFO_FILE: &str = "buildInfo.json";
pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Error)]
pub enum PackageError {
    #[error("Build package not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read {0}: {1}")]
    Io(PathBuf, std::io::Error),

    #[error("Invalid manifest {0}: {1}")]
    Manifest(PathBuf, serde_json::Error),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error("Build package is missing referenced files: {}", .0.join(", "))]
    MissingFiles(Vec<String>),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Manifest {
    pub format_version: String,
    pub project: ProjectInfo,
    pub author: String,
    pub reference: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProjectInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    pub revision: String,
}

/// A validated build plan together with where it came from.
#[derive(Debug, Clone)]
pub struct BuildPackage {
    /// Directory that file references resolve against.
    pub root: PathBuf,
    pub manifest: Option<Manifest>,
    pub plan: BuildPlan,
}

impl BuildPackage {
    /// Load a package directory or a bare `buildInfo.json`.
    pub fn load(path: &Path) -> Result<Self, PackageError> {
        if path.is_dir() {
            Self::load_dir(path)
        } else if path.is_file() {
            let root = path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."));
            let plan = read_plan(path)?;
            Self::checked(root, None, plan)
        } else {
            Err(PackageError::NotFound(path.to_path_buf()))
        }
    }

    fn load_dir(dir: &Path) -> Result<Self, PackageError> {
        let manifest_path = dir.join(MANIFEST_FILE);
        let manifest = if manifest_path.is_file() {
            let content = read(&manifest_path)?;
            let manifest = serde_json::from_str::<Manifest>(&content)
                .map_err(|e| PackageError::Manifest(manifest_path.clone(), e))?;
            Some(manifest)
        } else {
            None
        };

        let build_info = dir.join(BUILD_INFO_FILE);
        if !build_info.is_file() {
            return Err(PackageError::NotFound(build_info));
        }
        let plan = read_plan(&build_info)?;
        Self::checked(dir.to_path_buf(), manifest, plan)
    }

    fn checked(
        root: PathBuf,
        manifest: Option<Manifest>,
        plan: BuildPlan,
    ) -> Result<Self, PackageError> {
        let missing: Vec<String> = plan
            .referenced_files()
            .into_iter()
            .filter(|file| !root.join(file).is_file())
            .map(str::to_string)
            .collect();
        if !missing.is_empty() {
            return Err(PackageError::MissingFiles(missing));
        }
        Ok(Self {
            root,
            manifest,
            plan,
        })
    }

    /// Human-readable name for logs.
    pub fn display_name(&self) -> String {
        match &self.manifest {
            Some(m) if !m.project.name.is_empty() => {
                if m.project.revision.is_empty() {
                    m.project.name.clone()
                } else {
                    format!("{} (rev {})", m.project.name, m.project.revision)
                }
            }
            _ => self.root.display().to_string(),
        }
    }
}

fn read(path: &Path) -> Result<String, PackageError> {
    std::fs::read_to_string(path).map_err(|e| PackageError::Io(path.to_path_buf(), e))
}

fn read_plan(path: &Path) -> Result<BuildPlan, PackageError> {
    Ok(BuildPlan::from_json(&read(path)?)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUILD_INFO: &str = r#"{
        "startHeat": {
            "file": "obp/heat.obp",
            "temperatureSensor": "Sensor1",
            "targetTemperature": 800,
            "timeout": 60
        },
        "layers": [
            {
                "melt": [{"file": "obp/part.obp", "repetitions": 1}],
                "heatBalance": [{"file": "obp/post.obp", "repetitions": 2}]
            }
        ]
    }"#;

    fn write_package(dir: &Path, files: &[&str]) {
        std::fs::write(dir.join(BUILD_INFO_FILE), BUILD_INFO).unwrap();
        std::fs::create_dir_all(dir.join("obp")).unwrap();
        for file in files {
            std::fs::write(dir.join(file), b"").unwrap();
        }
    }

    #[test]
    fn test_load_directory_with_manifest() {
        let dir = tempfile::tempdir().unwrap();
        write_package(dir.path(), &["obp/heat.obp", "obp/part.obp", "obp/post.obp"]);
        std::fs::write(
            dir.path().join(MANIFEST_FILE),
            r#"{"formatVersion": "3.0", "project": {"name": "bracket", "revision": "2"}}"#,
        )
        .unwrap();

        let package = BuildPackage::load(dir.path()).unwrap();
        assert_eq!(package.plan.total_layers(), 1);
        let manifest = package.manifest.as_ref().unwrap();
        assert_eq!(manifest.format_version, "3.0");
        assert_eq!(package.display_name(), "bracket (rev 2)");
    }

    #[test]
    fn test_load_build_info_file() {
        let dir = tempfile::tempdir().unwrap();
        write_package(dir.path(), &["obp/heat.obp", "obp/part.obp", "obp/post.obp"]);

        let package = BuildPackage::load(&dir.path().join(BUILD_INFO_FILE)).unwrap();
        assert!(package.manifest.is_none());
        assert_eq!(package.root, dir.path());
    }

    #[test]
    fn test_missing_referenced_files() {
        let dir = tempfile::tempdir().unwrap();
        write_package(dir.path(), &["obp/heat.obp"]);

        match BuildPackage::load(dir.path()) {
            Err(PackageError::MissingFiles(files)) => {
                assert_eq!(files, vec!["obp/part.obp", "obp/post.obp"]);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_missing_build_info() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            BuildPackage::load(dir.path()),
            Err(PackageError::NotFound(_))
        ));
        assert!(matches!(
            BuildPackage::load(&dir.path().join("absent")),
            Err(PackageError::NotFound(_))
        ));
    }

    #[test]
    fn test_invalid_plan_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(BUILD_INFO_FILE), "{\"layers\": []}").unwrap();
        assert!(matches!(
            BuildPackage::load(dir.path()),
            Err(PackageError::Plan(PlanError::Parse(_)))
        ));
    }
}
