use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use infer::MatcherType;

/// Bytes read from the front of a file for content sniffing.
const SNIFF_LEN: u64 = 8192;

fn sniff(path: &Path) -> Result<Option<infer::Type>> {
    let file = File::open(path).with_context(|| format!("Failed to open {:?} for sniffing", path))?;
    let mut header = Vec::with_capacity(SNIFF_LEN as usize);
    file.take(SNIFF_LEN)
        .read_to_end(&mut header)
        .with_context(|| format!("Failed to read header of {:?}", path))?;
    Ok(infer::get(&header))
}

/// MIME type from content, `application/octet-stream` when unrecognized.
pub fn detect_mimetype(path: &Path) -> Result<&'static str> {
    Ok(sniff(path)?.map_or("application/octet-stream", |kind| kind.mime_type()))
}

/// True when the content sniffs as an image, whatever the extension says.
pub fn is_image(path: &Path) -> Result<bool> {
    Ok(sniff(path)?.is_some_and(|kind| kind.matcher_type() == MatcherType::Image))
}
