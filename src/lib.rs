//! casefile: forensic evidence model, resource lifecycle and job/task
//! dispatch.

pub mod cli;
pub mod config;
pub mod evidence;
pub mod jobs;
pub mod logging;
pub mod pipeline;
pub mod processors;
pub mod util;
pub mod workers;
