use std::{future::Future, process::Stdio};

use tokio::{io::AsyncWriteExt, process::Command};

use crate::error::ImportError;

/// Anything that can turn an image into plain text.
pub trait TextRecognizer {
    fn recognize(&self, image: Vec<u8>) -> impl Future<Output = Result<String, ImportError>> + Send;
}

/// Shells out to the `tesseract` command line tool, piping the image over stdin.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    binary: String,
    languages: String,
}

impl TesseractCli {
    pub fn new(binary: impl Into<String>, languages: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            languages: languages.into(),
        }
    }
}

impl TextRecognizer for TesseractCli {
    async fn recognize(&self, image: Vec<u8>) -> Result<String, ImportError> {
        tracing::debug!(
            bytes = image.len(),
            languages = %self.languages,
            "running text recognition"
        );

        let mut child = Command::new(&self.binary)
            .args(["stdin", "stdout", "-l", self.languages.as_str()])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ImportError::Ocr(format!("failed to start {}: {}", self.binary, e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| ImportError::Ocr("stdin is not available".into()))?;
        stdin.write_all(&image).await?;
        drop(stdin);

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ImportError::Ocr(format!(
                "{} exited with {}: {}",
                self.binary,
                output.status,
                stderr.trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        tracing::debug!(chars = text.len(), "text recognition complete");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_binary_is_an_ocr_error() {
        let ocr = TesseractCli::new("definitely-not-a-real-tesseract-binary", "eng");
        let err = ocr.recognize(vec![0u8; 4]).await.unwrap_err();
        assert!(matches!(err, ImportError::Ocr(_)));
    }
}
