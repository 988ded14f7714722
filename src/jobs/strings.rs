use super::Job;
use crate::evidence::{Evidence, EvidenceType};
use crate::workers::Task;
use crate::workers::strings::StringsTask;

/// ASCII and UTF-16LE strings over raw disks.
#[derive(Debug, Default, Clone, Copy)]
pub struct StringsJob;

impl StringsJob {
    pub const NAME: &'static str = "StringsJob";
}

impl Job for StringsJob {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn evidence_input(&self) -> &[EvidenceType] {
        &[
            EvidenceType::RawDisk,
            EvidenceType::EncryptedDisk,
            EvidenceType::GoogleCloudDisk,
            EvidenceType::GoogleCloudDiskRawEmbedded,
        ]
    }

    fn evidence_output(&self) -> &[EvidenceType] {
        &[EvidenceType::TextFile]
    }

    fn create_tasks(&self, evidence: &[Evidence]) -> Vec<Box<dyn Task>> {
        let mut tasks: Vec<Box<dyn Task>> = Vec::with_capacity(evidence.len() * 2);
        tasks.extend(evidence.iter().map(|_| Box::new(StringsTask::ascii()) as Box<dyn Task>));
        tasks.extend(evidence.iter().map(|_| Box::new(StringsTask::unicode()) as Box<dyn Task>));
        tasks
    }
}
