use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::error::PipelineError;

/// Inclusive 1-based page range, e.g. `3..=7` from the CLI's `3..7`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    pub start: usize,
    pub end: usize,
}

impl PageRange {
    pub fn parse(spec: &str) -> Result<Self> {
        let (start_raw, end_raw) = spec
            .split_once("..")
            .with_context(|| format!("page range must look like START..END, got '{spec}'"))?;

        let start = start_raw
            .trim()
            .parse::<usize>()
            .with_context(|| format!("invalid page range start in '{spec}'"))?;
        let end = end_raw
            .trim()
            .parse::<usize>()
            .with_context(|| format!("invalid page range end in '{spec}'"))?;

        if start == 0 || end < start {
            anyhow::bail!("page range '{spec}' must be 1-based with start <= end");
        }

        Ok(Self { start, end })
    }
}

/// Extract the text layer of a PDF, optionally restricted to a page subset.
///
/// The extracted text is an opaque producer input to the pipeline; layout
/// fidelity is not attempted beyond page concatenation.
pub fn extract_text(pdf_path: &Path, pages: Option<PageRange>) -> Result<String, PipelineError> {
    let page_texts = pdf_extract::extract_text_by_pages(pdf_path).map_err(|err| {
        warn!(path = %pdf_path.display(), error = %err, "pdf text extraction failed");
        PipelineError::TextSource(pdf_path.to_path_buf())
    })?;

    let selected: Vec<&String> = match pages {
        Some(range) => {
            let start_index = range.start.saturating_sub(1);
            if start_index >= page_texts.len() {
                return Err(PipelineError::TextSource(pdf_path.to_path_buf()));
            }
            let end_index = range.end.min(page_texts.len());
            page_texts[start_index..end_index].iter().collect()
        }
        None => page_texts.iter().collect(),
    };

    let text = selected
        .iter()
        .map(|page| page.as_str())
        .collect::<Vec<&str>>()
        .join("\n");

    if text.trim().is_empty() {
        return Err(PipelineError::TextSource(pdf_path.to_path_buf()));
    }

    info!(
        path = %pdf_path.display(),
        pages = page_texts.len(),
        chars = text.len(),
        "extracted pdf text layer"
    );

    Ok(text)
}
