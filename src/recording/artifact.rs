use bytes::{Bytes, BytesMut};
use std::path::Path;

/// A finalized recording, ready to hand to the download boundary
#[derive(Debug, Clone)]
pub struct RecordingArtifact {
    file_name: String,
    mime_type: String,
    data: Bytes,
}

impl RecordingArtifact {
    /// Assemble an artifact from non-empty chunks, named
    /// `call-recording-<unixtime-ms>.<ext>`
    pub fn from_chunks(chunks: &[Bytes], mime_type: &str, extension: &str) -> Self {
        let total: usize = chunks.iter().map(|c| c.len()).sum();
        let mut data = BytesMut::with_capacity(total);
        for chunk in chunks {
            data.extend_from_slice(chunk);
        }

        let file_name = format!(
            "call-recording-{}.{}",
            chrono::Utc::now().timestamp_millis(),
            extension
        );

        Self {
            file_name,
            mime_type: mime_type.to_string(),
            data: data.freeze(),
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Write the artifact into a directory under its own file name,
    /// returning the full path
    pub fn save_to<P: AsRef<Path>>(&self, directory: P) -> std::io::Result<std::path::PathBuf> {
        let path = directory.as_ref().join(&self.file_name);
        std::fs::write(&path, &self.data)?;
        log::info!("Saved recording artifact to {:?} ({} bytes)", path, self.data.len());
        Ok(path)
    }
}
