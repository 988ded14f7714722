use super::{Task, TaskContext, TaskError, TaskResult};
use crate::evidence::Evidence;

/// Runs `strings` over the raw device of a disk and registers the output
/// as a `TextFile`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StringsTask {
    name: &'static str,
    unicode: bool,
}

impl StringsTask {
    pub fn ascii() -> Self {
        Self {
            name: "StringsAsciiTask",
            unicode: false,
        }
    }

    /// 16-bit little-endian strings.
    pub fn unicode() -> Self {
        Self {
            name: "StringsUnicodeTask",
            unicode: true,
        }
    }

    fn extension(&self) -> &'static str {
        if self.unicode { "uni" } else { "ascii" }
    }
}

impl Task for StringsTask {
    fn name(&self) -> &str {
        self.name
    }

    fn run(&self, evidence: &Evidence, ctx: &TaskContext, result: &mut TaskResult) -> Result<String, TaskError> {
        let device = evidence
            .device_path()
            .ok_or_else(|| TaskError::MissingDevicePath(evidence.to_string()))?;
        let base_name = device
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "device".to_string());
        let output_path = ctx
            .output_dir
            .join(format!("{base_name}.{}", self.extension()));

        let mut spec = ctx.privileged(&ctx.tools.strings).args(["-a", "-t", "d"]);
        if self.unicode {
            spec = spec.args(["-e", "l"]);
        }
        let spec = spec.path_arg(device).stdout_to(&output_path);

        ctx.execute(
            &spec,
            result,
            vec![Evidence::text_file(output_path)],
            &evidence.config,
        )
    }
}
