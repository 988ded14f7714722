use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::{Task, TaskContext, TaskError, TaskResult};
use crate::evidence::Evidence;
use crate::processors::command::check_call;

/// Exports every file matching a forensic artifact definition out of the
/// evidence with `image_export` and registers each exported file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileArtifactExtractionTask {
    artifact_name: String,
}

impl FileArtifactExtractionTask {
    pub const NAME: &'static str = "FileArtifactExtractionTask";

    pub fn new(artifact_name: impl Into<String>) -> Self {
        Self {
            artifact_name: artifact_name.into(),
        }
    }

    pub fn artifact_name(&self) -> &str {
        &self.artifact_name
    }
}

impl Task for FileArtifactExtractionTask {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn run(&self, evidence: &Evidence, ctx: &TaskContext, result: &mut TaskResult) -> Result<String, TaskError> {
        let source = evidence
            .local_path
            .as_deref()
            .ok_or_else(|| TaskError::MissingLocalPath(evidence.to_string()))?;
        let export_dir = ctx.output_dir.join("export");
        let log_file = ctx.output_dir.join(format!("{}.log", result.task_id()));

        let spec = ctx
            .privileged(&ctx.tools.image_export)
            .arg("--no-hashes")
            .arg("--logfile")
            .path_arg(&log_file)
            .arg("-w")
            .path_arg(&export_dir)
            .args(["--partitions", "all"])
            .arg("--artifact_filters")
            .arg(self.artifact_name.as_str())
            .path_arg(source);
        result.log(format!("Running {}", spec.command_line()))?;
        check_call(ctx.runner.as_ref(), &spec)?;

        let exported = exported_files(&export_dir)?;
        for path in &exported {
            let artifact = Evidence::exported_file_artifact(self.artifact_name.as_str(), path);
            result.add_evidence(artifact, &evidence.config)?;
        }
        Ok(format!(
            "Extracted {} new {} artifacts",
            exported.len(),
            self.artifact_name
        ))
    }
}

/// Regular files below `export_dir`, in path order. A missing directory
/// means nothing was exported.
fn exported_files(export_dir: &Path) -> Result<Vec<PathBuf>, TaskError> {
    if !export_dir.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(export_dir).sort_by_file_name() {
        let entry = entry.map_err(|err| TaskError::Io {
            context: format!("walking {}", export_dir.display()),
            source: err.into(),
        })?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exported_files_are_sorted_and_recursive() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("export");
        std::fs::create_dir_all(root.join("opt/tomcat/logs")).expect("mkdir");
        std::fs::write(root.join("opt/tomcat/logs/catalina.out"), b"x").expect("write");
        std::fs::write(root.join("opt/tomcat/tomcat-users.xml"), b"y").expect("write");

        let files = exported_files(&root).expect("walk");
        assert_eq!(
            files,
            vec![
                root.join("opt/tomcat/logs/catalina.out"),
                root.join("opt/tomcat/tomcat-users.xml"),
            ]
        );
        assert!(exported_files(&dir.path().join("missing")).expect("missing").is_empty());
    }
}
