use super::Job;
use crate::evidence::{Evidence, EvidenceType};
use crate::workers::Task;
use crate::workers::docker::DockerContainersEnumerationTask;

/// Enumerates docker containers on mounted disks.
#[derive(Debug, Default, Clone, Copy)]
pub struct DockerContainersEnumerationJob;

impl DockerContainersEnumerationJob {
    pub const NAME: &'static str = "DockerContainersEnumerationJob";
}

impl Job for DockerContainersEnumerationJob {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn evidence_input(&self) -> &[EvidenceType] {
        &[
            EvidenceType::GoogleCloudDisk,
            EvidenceType::GoogleCloudDiskRawEmbedded,
            EvidenceType::RawDisk,
        ]
    }

    fn evidence_output(&self) -> &[EvidenceType] {
        &[EvidenceType::DockerContainer]
    }

    fn create_tasks(&self, evidence: &[Evidence]) -> Vec<Box<dyn Task>> {
        evidence
            .iter()
            .map(|_| Box::new(DockerContainersEnumerationTask) as Box<dyn Task>)
            .collect()
    }
}
