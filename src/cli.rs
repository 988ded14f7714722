use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct CliOptions {
    /// Evidence to process: a JSON envelope or an array of envelopes
    #[arg(short, long)]
    pub evidence: PathBuf,

    /// Optional path to config file (YAML)
    #[arg(long)]
    pub config_path: Option<PathBuf>,

    /// Request id stamped on evidence that does not carry one
    #[arg(long)]
    pub request_id: Option<String>,

    /// Number of worker threads
    #[arg(long, default_value_t = num_cpus::get())]
    pub workers: usize,

    /// Print the job/task plan for the evidence without running anything
    #[arg(long)]
    pub plan_only: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,
}

pub fn parse() -> CliOptions {
    CliOptions::parse()
}

#[cfg(test)]
mod tests {
    use super::CliOptions;
    use clap::Parser;

    #[test]
    fn parses_required_evidence() {
        let opts = CliOptions::try_parse_from(["casefile", "--evidence", "disk.json"]).expect("parse");
        assert_eq!(opts.evidence.to_str(), Some("disk.json"));
        assert!(!opts.plan_only);
        assert!(opts.workers >= 1);
    }

    #[test]
    fn rejects_missing_evidence() {
        assert!(CliOptions::try_parse_from(["casefile"]).is_err());
    }

    #[test]
    fn parses_plan_only_and_request_id() {
        let opts = CliOptions::try_parse_from([
            "casefile",
            "-e",
            "disk.json",
            "--plan-only",
            "--request-id",
            "req-42",
            "--workers",
            "3",
        ])
        .expect("parse");
        assert!(opts.plan_only);
        assert_eq!(opts.request_id.as_deref(), Some("req-42"));
        assert_eq!(opts.workers, 3);
    }
}
