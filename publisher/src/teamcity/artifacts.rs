use super::{TeamCityClient, TeamCityError};
use crate::metrics_defs::ARTIFACTS_PUBLISHED;
use flate2::Compression;
use flate2::write::GzEncoder;
use shared::counter;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Escapes a value for a TeamCity service message.
pub fn escape_service_message_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '|' => escaped.push_str("||"),
            '\'' => escaped.push_str("|'"),
            '\n' => escaped.push_str("|n"),
            '\r' => escaped.push_str("|r"),
            '[' => escaped.push_str("|["),
            ']' => escaped.push_str("|]"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Service message asking TeamCity to publish `staged` under `artifact_path`.
pub fn publish_artifacts_message(staged: &Path, artifact_path: &str) -> String {
    format!(
        "##teamcity[publishArtifacts '{} => {}']",
        escape_service_message_value(&staged.display().to_string()),
        escape_service_message_value(artifact_path)
    )
}

impl TeamCityClient {
    /// Stages `source` (a file or directory) under
    /// `artifact_for_publishing_dir/artifact_path` and asks TeamCity to pick it
    /// up. With `zip` the content is packed into `<name>.tar.gz`.
    ///
    /// Returns the staged path, or `None` when `source` does not exist.
    pub fn publish_artifacts(
        &self,
        source: &Path,
        artifact_path: &str,
        artifact_name: Option<&str>,
        zip: bool,
    ) -> Result<Option<PathBuf>, TeamCityError> {
        if !source.exists() {
            tracing::warn!(source = %source.display(), "Artifact source does not exist, skipping");
            return Ok(None);
        }

        let name = artifact_name
            .map(String::from)
            .or_else(|| {
                source
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| "artifact".to_string());

        let target_dir = self.artifact_for_publishing_dir.join(artifact_path);
        fs::create_dir_all(&target_dir)?;

        let staged = if zip {
            let archive = target_dir.join(format!("{name}.tar.gz"));
            self.pack(source, &archive, &name)?;
            archive
        } else {
            let target = target_dir.join(&name);
            self.copy(source, &target)?;
            target
        };

        counter!(ARTIFACTS_PUBLISHED).increment(1);
        tracing::debug!(
            source = %source.display(),
            staged = %staged.display(),
            artifact_path,
            "Staged artifact"
        );

        if self.under_teamcity {
            println!("{}", publish_artifacts_message(&staged, artifact_path));
        }

        Ok(Some(staged))
    }

    /// Files under `source` as (absolute, relative) pairs. The staging dir is
    /// skipped so publishing a directory that contains it terminates.
    fn files_to_stage(&self, source: &Path) -> Result<Vec<(PathBuf, PathBuf)>, TeamCityError> {
        if source.is_file() {
            return Ok(vec![(source.to_path_buf(), PathBuf::new())]);
        }

        let mut files = Vec::new();
        let walker = walkdir::WalkDir::new(source)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !e.path().starts_with(&self.artifact_for_publishing_dir));
        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(source) else {
                continue;
            };
            files.push((entry.path().to_path_buf(), relative.to_path_buf()));
        }
        Ok(files)
    }

    fn copy(&self, source: &Path, target: &Path) -> Result<(), TeamCityError> {
        for (file, relative) in self.files_to_stage(source)? {
            let destination = if relative.as_os_str().is_empty() {
                target.to_path_buf()
            } else {
                target.join(relative)
            };
            if let Some(parent) = destination.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(&file, &destination)?;
        }
        Ok(())
    }

    fn pack(&self, source: &Path, archive: &Path, name: &str) -> Result<(), TeamCityError> {
        let files = self.files_to_stage(source)?;

        let writer = BufWriter::new(File::create(archive)?);
        let mut tar = tar::Builder::new(GzEncoder::new(writer, Compression::default()));
        for (file, relative) in files {
            let entry_name = if relative.as_os_str().is_empty() {
                PathBuf::from(name)
            } else {
                Path::new(name).join(relative)
            };
            tar.append_path_with_name(&file, &entry_name)?;
        }
        let mut writer = tar.into_inner()?.finish()?;
        writer.flush()?;
        Ok(())
    }
}
