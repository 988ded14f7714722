use super::Job;
use crate::evidence::{Evidence, EvidenceType};
use crate::workers::Task;
use crate::workers::artifact::FileArtifactExtractionTask;
use crate::workers::tomcat::TomcatAnalysisTask;

/// Artifact definition name shared by extraction and analysis.
pub const TOMCAT_ARTIFACT: &str = "TomcatFile";

/// Exports Apache Tomcat files for analysis.
#[derive(Debug, Default, Clone, Copy)]
pub struct TomcatExtractionJob;

impl TomcatExtractionJob {
    pub const NAME: &'static str = "TomcatExtractionJob";
}

impl Job for TomcatExtractionJob {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn evidence_input(&self) -> &[EvidenceType] {
        &[
            EvidenceType::Directory,
            EvidenceType::DockerContainer,
            EvidenceType::RawDisk,
            EvidenceType::GoogleCloudDisk,
            EvidenceType::GoogleCloudDiskRawEmbedded,
        ]
    }

    fn evidence_output(&self) -> &[EvidenceType] {
        &[EvidenceType::ExportedFileArtifact]
    }

    fn create_tasks(&self, evidence: &[Evidence]) -> Vec<Box<dyn Task>> {
        evidence
            .iter()
            .map(|_| Box::new(FileArtifactExtractionTask::new(TOMCAT_ARTIFACT)) as Box<dyn Task>)
            .collect()
    }
}

/// Analyses exported Tomcat files; other artifacts are ignored.
#[derive(Debug, Default, Clone, Copy)]
pub struct TomcatAnalysisJob;

impl TomcatAnalysisJob {
    pub const NAME: &'static str = "TomcatAnalysisJob";
}

impl Job for TomcatAnalysisJob {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn evidence_input(&self) -> &[EvidenceType] {
        &[EvidenceType::ExportedFileArtifact]
    }

    fn evidence_output(&self) -> &[EvidenceType] {
        &[EvidenceType::ReportText]
    }

    fn create_tasks(&self, evidence: &[Evidence]) -> Vec<Box<dyn Task>> {
        evidence
            .iter()
            .filter(|item| item.artifact_name() == Some(TOMCAT_ARTIFACT))
            .map(|_| Box::new(TomcatAnalysisTask) as Box<dyn Task>)
            .collect()
    }
}
