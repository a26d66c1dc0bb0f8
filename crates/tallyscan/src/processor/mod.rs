pub mod ocr;
pub mod patterns;
pub mod pdf;

#[cfg(feature = "tesseract")]
pub mod tesseract;

#[cfg(not(feature = "tesseract"))]
pub mod tesseract_stub;

pub use ocr::{clean_text, OcrEngine, OcrExtractor, OcrWorker};
pub use patterns::{scan_line_items, PatternLine};
pub use pdf::{
    DocumentInfo, ExtractionMethod, LopdfParser, PageRenderer, ParsedPdf, PdfExtraction,
    PdfExtractor, PdfParser, PdftoppmRenderer, RenderedPage,
};

#[cfg(feature = "tesseract")]
pub use tesseract::TesseractEngine;

#[cfg(not(feature = "tesseract"))]
pub use tesseract_stub::TesseractEngine;
