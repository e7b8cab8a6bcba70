use crate::error::IngestError;
use lopdf::Document;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

pub trait ResumeExtractor: Send + Sync {
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<PageText>, IngestError>;
}

#[derive(Default)]
pub struct LopdfExtractor;

impl ResumeExtractor for LopdfExtractor {
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<PageText>, IngestError> {
        let document =
            Document::load_mem(bytes).map_err(|error| IngestError::PdfParse(error.to_string()))?;

        // A page with a corrupt text layer is skipped, never fatal; blank
        // pages keep their slot so page order survives the merge.
        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            match document.extract_text(&[page_no]) {
                Ok(text) => pages.push(PageText {
                    number: page_no,
                    text,
                }),
                Err(error) => {
                    debug!(page = page_no, %error, "skipping unreadable pdf page");
                    pages.push(PageText {
                        number: page_no,
                        text: String::new(),
                    });
                }
            }
        }

        Ok(pages)
    }
}

/// Joins page texts into one document string, separating non-empty pages
/// with a blank line. An all-blank document merges to an empty string.
pub fn merge_page_texts(pages: &[PageText]) -> String {
    pages
        .iter()
        .map(|page| page.text.trim())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}
