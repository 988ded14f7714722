use once_cell::sync::Lazy;
use regex::Regex;

use super::{Task, TaskContext, TaskError, TaskResult};
use crate::evidence::Evidence;

static USER_PASSWORDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^.*password.*$").expect("valid regex"));
static WAR_DEPLOYS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^.*Deploying web application archive.*$").expect("valid regex"));
static MANAGER_UPLOADS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^.*POST /manager/html/upload.*$").expect("valid regex"));

const NOT_FOUND: &str = "No Tomcat found";

/// Scans an exported Tomcat file for credentials, WAR deployments and
/// manager uploads, and writes the findings as a `ReportText`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TomcatAnalysisTask;

impl TomcatAnalysisTask {
    pub const NAME: &'static str = "TomcatAnalysisTask";
}

/// Returns the report body and a one-line summary.
pub fn analyse_tomcat_file(content: &str) -> (String, String) {
    let patterns: [(&Regex, &str); 3] = [
        (&*USER_PASSWORDS, "Tomcat user: "),
        (&*WAR_DEPLOYS, "Tomcat App Deployed: "),
        (&*MANAGER_UPLOADS, "Tomcat Management: "),
    ];

    let mut findings = Vec::new();
    for (regex, label) in patterns {
        for found in regex.find_iter(content) {
            findings.push(format!("{label}{}", found.as_str().trim()));
        }
    }
    if findings.is_empty() {
        return (NOT_FOUND.to_string(), NOT_FOUND.to_string());
    }

    let summary = format!("Tomcat analysis found {} results", findings.len());
    let mut report = summary.clone();
    for finding in &findings {
        report.push('\n');
        report.push_str(finding);
    }
    (report, summary)
}

impl Task for TomcatAnalysisTask {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn run(&self, evidence: &Evidence, ctx: &TaskContext, result: &mut TaskResult) -> Result<String, TaskError> {
        let path = evidence
            .local_path
            .as_deref()
            .ok_or_else(|| TaskError::MissingLocalPath(evidence.to_string()))?;
        let bytes = std::fs::read(path).map_err(|source| TaskError::Io {
            context: format!("reading {}", path.display()),
            source,
        })?;
        let (report, summary) = analyse_tomcat_file(&String::from_utf8_lossy(&bytes));

        let output_path = ctx.output_dir.join("tomcat_analysis.txt");
        std::fs::write(&output_path, &report).map_err(|source| TaskError::Io {
            context: format!("writing {}", output_path.display()),
            source,
        })?;
        result.log(format!("Wrote report to {}", output_path.display()))?;
        result.add_evidence(Evidence::report_text(output_path, report), &evidence.config)?;
        Ok(summary)
    }
}
