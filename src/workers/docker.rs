use std::path::Path;

use serde::Deserialize;
use tracing::info;

use super::{Task, TaskContext, TaskError, TaskResult, mount_root};
use crate::evidence::Evidence;
use crate::processors::command::check_output;

#[derive(Debug, Deserialize)]
struct ContainerInfo {
    container_id: String,
}

/// Lists every container in the docker root of a mounted disk and emits a
/// `DockerContainer` evidence per container.
#[derive(Debug, Default, Clone, Copy)]
pub struct DockerContainersEnumerationTask;

impl DockerContainersEnumerationTask {
    pub const NAME: &'static str = "DockerContainersEnumerationTask";

    pub fn get_containers(&self, ctx: &TaskContext, docker_root: &Path) -> Result<Vec<String>, TaskError> {
        let spec = ctx
            .privileged(&ctx.tools.docker_explorer)
            .arg("-r")
            .path_arg(docker_root)
            .args(["list", "all_containers"]);
        let stdout = check_output(ctx.runner.as_ref(), &spec)?;
        let containers: Vec<ContainerInfo> =
            serde_json::from_slice(&stdout).map_err(|err| TaskError::InvalidOutput {
                command: spec.command_line(),
                reason: err.to_string(),
            })?;
        Ok(containers.into_iter().map(|info| info.container_id).collect())
    }
}

impl Task for DockerContainersEnumerationTask {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn run(&self, evidence: &Evidence, ctx: &TaskContext, result: &mut TaskResult) -> Result<String, TaskError> {
        let docker_root = mount_root(evidence)?.join("var").join("lib").join("docker");
        let container_ids = self.get_containers(ctx, &docker_root)?;
        for container_id in &container_ids {
            info!("Found container_id {container_id}");
            let mut container = Evidence::docker_container(container_id.as_str());
            evidence.copy_context(&mut container);
            result.add_evidence(container, &evidence.config)?;
        }
        Ok(format!("Found {} containers", container_ids.len()))
    }
}
