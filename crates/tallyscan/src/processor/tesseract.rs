//! Tesseract OCR engine backed by `leptess`.
//!
//! Each worker owns one Tesseract instance on a dedicated thread, so the
//! engine handle never crosses threads and a hung recognition only ever
//! blocks its own worker.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::debug;

use crate::config::OcrConfig;
use crate::error::OcrError;
use crate::processor::ocr::{OcrEngine, OcrWorker};

pub struct TesseractEngine {
    language: String,
    tessdata_dir: Option<String>,
}

impl TesseractEngine {
    pub fn new(config: &OcrConfig) -> Self {
        Self {
            language: config.language.clone(),
            tessdata_dir: config.tessdata_dir.clone(),
        }
    }
}

struct RecognizeRequest {
    image_path: PathBuf,
    reply: oneshot::Sender<Result<String, OcrError>>,
}

#[async_trait]
impl OcrEngine for TesseractEngine {
    async fn create_worker(&self) -> Result<Box<dyn OcrWorker>, OcrError> {
        let (ready_tx, ready_rx) = oneshot::channel::<Result<(), OcrError>>();
        let (request_tx, request_rx) = mpsc::channel::<RecognizeRequest>();
        let language = self.language.clone();
        let tessdata_dir = self.tessdata_dir.clone();

        thread::Builder::new()
            .name("tesseract-worker".to_string())
            .spawn(move || {
                let mut tess = match leptess::LepTess::new(tessdata_dir.as_deref(), &language) {
                    Ok(tess) => {
                        let _ = ready_tx.send(Ok(()));
                        tess
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(OcrError::EngineInitialization(e.to_string())));
                        return;
                    }
                };

                // Runs until the worker is terminated and the sender dropped.
                while let Ok(request) = request_rx.recv() {
                    let result = recognize_blocking(&mut tess, &request.image_path);
                    let _ = request.reply.send(result);
                }
            })
            .map_err(|e| OcrError::EngineInitialization(e.to_string()))?;

        ready_rx.await.map_err(|_| {
            OcrError::EngineInitialization("Tesseract worker thread exited".to_string())
        })??;

        Ok(Box::new(TesseractWorker {
            requests: Some(request_tx),
        }))
    }
}

struct TesseractWorker {
    requests: Option<mpsc::Sender<RecognizeRequest>>,
}

#[async_trait]
impl OcrWorker for TesseractWorker {
    async fn recognize(&mut self, image_path: &Path) -> Result<String, OcrError> {
        let requests = self
            .requests
            .as_ref()
            .ok_or_else(|| OcrError::Configuration("worker already terminated".to_string()))?;

        let (reply_tx, reply_rx) = oneshot::channel();
        requests
            .send(RecognizeRequest {
                image_path: image_path.to_path_buf(),
                reply: reply_tx,
            })
            .map_err(|_| OcrError::Recognition("Tesseract worker stopped".to_string()))?;

        reply_rx
            .await
            .map_err(|_| OcrError::Recognition("Tesseract worker stopped".to_string()))?
    }

    async fn terminate(&mut self) {
        if self.requests.take().is_some() {
            debug!("tesseract worker terminated");
        }
    }
}

fn recognize_blocking(tess: &mut leptess::LepTess, image_path: &Path) -> Result<String, OcrError> {
    let bytes = std::fs::read(image_path)
        .map_err(|_| OcrError::FileNotFound(image_path.to_path_buf()))?;

    let img = image::load_from_memory(&bytes)
        .map_err(|e| OcrError::CorruptImage(format!("Failed to load image: {}", e)))?;

    // Tesseract reads PNG reliably regardless of the upload's format.
    let mut png_data = Vec::new();
    img.write_to(&mut Cursor::new(&mut png_data), image::ImageFormat::Png)
        .map_err(|e| OcrError::CorruptImage(format!("Failed to convert image: {}", e)))?;

    tess.set_image_from_mem(&png_data)
        .map_err(|e| OcrError::CorruptImage(format!("Failed to set image for OCR: {}", e)))?;

    tess.get_utf8_text()
        .map_err(|e| OcrError::Recognition(format!("OCR failed: {}", e)))
}
