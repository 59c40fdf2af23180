//! Per-page text extraction for uploaded PDF resources.

use thiserror::Error;

use crate::storage::models::PdfPage;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Unreadable PDF: {0}")]
    Parse(#[from] lopdf::Error),
    #[error("PDF has no pages")]
    Empty,
}

/// Extract the text of every page, in page order.
///
/// A page whose text cannot be decoded yields an empty entry rather than
/// failing the whole document.
pub fn extract_pages(data: &[u8]) -> Result<Vec<PdfPage>, ExtractError> {
    let document = lopdf::Document::load_mem(data)?;
    let page_numbers: Vec<u32> = document.get_pages().keys().copied().collect();
    if page_numbers.is_empty() {
        return Err(ExtractError::Empty);
    }

    let pages = page_numbers
        .into_iter()
        .map(|page_number| {
            let text = match document.extract_text(&[page_number]) {
                Ok(text) => text.trim().to_string(),
                Err(e) => {
                    tracing::debug!(page_number, error = %e, "Failed to extract page text");
                    String::new()
                }
            };
            PdfPage { page_number, text }
        })
        .collect();

    Ok(pages)
}
