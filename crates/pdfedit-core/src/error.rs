use thiserror::Error;

#[derive(Error, Debug)]
pub enum PdfEditError {
    #[error("Failed to parse PDF: {0}")]
    Parse(String),

    #[error("Invalid page range: {0}")]
    InvalidRange(String),

    #[error("Page index {index} out of range (document has {page_count} pages)")]
    PageOutOfRange { index: usize, page_count: usize },

    #[error("PDF operation failed: {0}")]
    Operation(String),

    #[error("No document loaded")]
    NoDocument,

    #[error("Document is signed; editing would invalidate the signature")]
    DocumentSigned,

    #[error("Another operation is in progress")]
    Busy,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Signature agent failed ({code}): {message}")]
    SignatureAgent { code: String, message: String },
}

impl From<lopdf::Error> for PdfEditError {
    fn from(err: lopdf::Error) -> Self {
        PdfEditError::Operation(err.to_string())
    }
}
