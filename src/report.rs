//! Summary and binary output of a found collision.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use log::{info, warn};

use crate::collision::Collision;
use crate::error::CollisionResult;
use crate::search::SearchReport;

/// Run `operation` and measure how long it took.
pub fn timed<T>(operation: impl FnOnce() -> T) -> (T, Duration) {
    let start = Instant::now();
    let value = operation();
    (value, start.elapsed())
}

/// Render `bytes` as a C array declaration, 16 bytes per line.
pub fn format_c_array(name: &str, bytes: &[u8]) -> String {
    let mut out = format!("unsigned char {}[{}] = {{\n", name, bytes.len());
    for (index, byte) in bytes.iter().enumerate() {
        if index != 0 && index % 16 == 0 {
            out.push('\n');
        }
        out.push_str(&format!("0x{:02X}", byte));
        if index + 1 != bytes.len() {
            out.push(',');
        }
    }
    out.push_str("\n};\n");
    out
}

pub fn summary_path(dir: &Path, seed: u32) -> PathBuf {
    dir.join(format!("collision_md5_{:08X}.txt", seed))
}

pub fn message_paths(dir: &Path, seed: u32) -> (PathBuf, PathBuf) {
    (
        dir.join(format!("collision1_md5_{:08X}.bin", seed)),
        dir.join(format!("collision2_md5_{:08X}.bin", seed)),
    )
}

/// Summary text: both messages, block timings and the colliding hash.
pub fn format_summary(report: &SearchReport) -> String {
    let collision = &report.collision;
    let mut out = String::new();
    out.push('\n');
    out.push_str(&format_c_array("m0", &collision.message_1));
    out.push('\n');
    out.push_str(&format_c_array("m1", &collision.message_2));
    out.push('\n');
    out.push_str(&format!(
        "/* First collision block took  : {:.6} sec */\n",
        report.block1.elapsed.as_secs_f64()
    ));
    out.push_str(&format!(
        "/* Second collision block took : {:.6} sec */\n",
        report.block2.elapsed.as_secs_f64()
    ));
    out.push_str(&format!(
        "/* Colliding hash: {} */\n",
        collision.digest_hex()
    ));
    out
}

/// Append the summary to `collision_md5_<SEED>.txt` in `dir`.
pub fn write_summary(dir: &Path, report: &SearchReport) -> CollisionResult<PathBuf> {
    let path = summary_path(dir, report.collision.seed);
    let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
    file.write_all(format_summary(report).as_bytes())?;
    info!("Summary appended to {}", path.display());
    Ok(path)
}

/// Write both 128-byte messages as `collision1_md5_<SEED>.bin` and
/// `collision2_md5_<SEED>.bin` in `dir`.
pub fn write_messages(dir: &Path, collision: &Collision) -> CollisionResult<(PathBuf, PathBuf)> {
    let (first, second) = message_paths(dir, collision.seed);
    fs::write(&first, collision.message_1)?;
    fs::write(&second, collision.message_2)?;
    Ok((first, second))
}

/// Result of writing one output file.
#[derive(Debug)]
pub struct WriteOutcome {
    /// What was written, e.g. "Message 1"
    pub label: &'static str,
    pub path: PathBuf,
    pub result: CollisionResult<()>,
}

impl WriteOutcome {
    fn new(label: &'static str, path: PathBuf, result: CollisionResult<()>) -> Self {
        if let Err(err) = &result {
            warn!("Writing {} to {} failed: {}", label, path.display(), err);
        }
        Self {
            label,
            path,
            result,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    /// `OK`, or `FAILED (<error>)`.
    pub fn status(&self) -> String {
        match &self.result {
            Ok(()) => "OK".to_string(),
            Err(err) => format!("FAILED ({})", err),
        }
    }
}

/// Which output files to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputOptions {
    pub summary: bool,
    pub messages: bool,
}

/// Write every requested file independently. A failed file does not stop
/// the others; each outcome is returned in the order summary, message 1,
/// message 2.
pub fn write_outputs(dir: &Path, report: &SearchReport, options: OutputOptions) -> Vec<WriteOutcome> {
    let collision = &report.collision;
    let mut outcomes = Vec::new();

    if options.summary {
        let path = summary_path(dir, collision.seed);
        let result = write_summary(dir, report).map(|_| ());
        outcomes.push(WriteOutcome::new("Summary", path, result));
    }
    if options.messages {
        let (first, second) = message_paths(dir, collision.seed);
        let result: CollisionResult<()> = fs::write(&first, collision.message_1).map_err(Into::into);
        outcomes.push(WriteOutcome::new("Message 1", first, result));
        let result: CollisionResult<()> = fs::write(&second, collision.message_2).map_err(Into::into);
        outcomes.push(WriteOutcome::new("Message 2", second, result));
    }
    outcomes
}
