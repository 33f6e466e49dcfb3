use crate::error::Result;
use crate::{BatchResult, JobOutcome};
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

pub fn save_json<T: Serialize>(data: &T, path: &Path) -> Result<()> {
    let mut file = File::create(path)?;
    file.write_all(serde_json::to_string_pretty(data)?.as_bytes())?;
    tracing::debug!(path = %path.display(), "wrote json");
    Ok(())
}

pub fn save_text(content: &str, path: &Path) -> Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    tracing::debug!(path = %path.display(), "wrote text");
    Ok(())
}

/// `blog_post_{n}.txt`, numbered from 1.
pub fn blog_file_name(ordinal: usize) -> String {
    format!("blog_post_{}.txt", ordinal + 1)
}

/// Writes one text file per successful job into `dir`.
pub fn write_blog_files(result: &BatchResult, dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    let mut written = Vec::new();
    for outcome in result.iter() {
        if let JobOutcome::Success { job_ordinal, text, .. } = outcome {
            let path = dir.join(blog_file_name(*job_ordinal));
            save_text(text, &path)?;
            written.push(path);
        }
    }
    Ok(written)
}

/// Human-readable report: a titled block per job, errors inline.
pub fn render_report(result: &BatchResult) -> String {
    let mut out = String::new();
    for outcome in result.iter() {
        match outcome {
            JobOutcome::Success {
                job_ordinal,
                source,
                text,
            } => {
                out.push_str(&format!("## Blog {}\n", job_ordinal + 1));
                out.push_str(&format!("Source: {source}\n\n"));
                out.push_str(text.trim());
                out.push_str("\n\n");
            }
            JobOutcome::Failure {
                job_ordinal,
                source,
                stage,
                error_kind,
                message,
            } => {
                out.push_str(&format!("## Blog {} (failed)\n", job_ordinal + 1));
                out.push_str(&format!("Source: {source}\n"));
                out.push_str(&format!("Error [{error_kind} during {stage}]: {message}\n\n"));
            }
        }
    }
    out.push_str(&format!(
        "{} succeeded, {} failed{}\n",
        result.success_count(),
        result.failure_count(),
        if result.cancelled { " (batch cancelled)" } else { "" }
    ));
    out
}
