//! Scan uploads and their client-side validation.

use std::path::Path;

use bytes::Bytes;

use crate::{Error, Result};

/// Maximum number of files in one upload.
pub const MAX_FILES_PER_UPLOAD: usize = 10;

/// Maximum size of a single uploaded file (500 MiB).
pub const MAX_FILE_SIZE: u64 = 524_288_000;

/// Accepted scan file extensions.
pub const ALLOWED_EXTENSIONS: [&str; 3] = [".nii", ".nii.gz", ".dcm"];

/// A scan file to upload.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    pub data: Bytes,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }

    /// Read a file from disk, named after its final path component.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::validation(format!("invalid file path: {}", path.display())))?
            .to_string();

        let metadata = tokio::fs::metadata(path).await?;
        if metadata.len() > MAX_FILE_SIZE {
            return Err(too_large(&name));
        }

        let data = tokio::fs::read(path).await?;
        Ok(Self::new(name, data))
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn has_allowed_extension(&self) -> bool {
        let name = self.name.to_ascii_lowercase();
        ALLOWED_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
    }
}

/// Check an upload before anything is sent.
pub fn validate_upload(files: &[UploadFile]) -> Result<()> {
    if files.is_empty() {
        return Err(Error::validation("No files selected"));
    }

    if files.len() > MAX_FILES_PER_UPLOAD {
        return Err(Error::validation(format!(
            "Maximum {MAX_FILES_PER_UPLOAD} files allowed"
        )));
    }

    for file in files {
        if file.size() > MAX_FILE_SIZE {
            return Err(too_large(&file.name));
        }

        if !file.has_allowed_extension() {
            return Err(Error::validation(format!(
                "File {} has invalid type. Allowed: {}",
                file.name,
                ALLOWED_EXTENSIONS.join(", ")
            )));
        }
    }

    Ok(())
}

fn too_large(name: &str) -> Error {
    Error::validation(format!(
        "File {name} exceeds maximum size of {}MB",
        MAX_FILE_SIZE / 1024 / 1024
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str) -> UploadFile {
        UploadFile::new(name, vec![0u8; 16])
    }

    #[test]
    fn test_accepts_scan_files() {
        let files = vec![file("brain.nii"), file("BRAIN_T1.NII.GZ"), file("slice.dcm")];
        assert!(validate_upload(&files).is_ok());
    }

    #[test]
    fn test_rejects_empty_upload() {
        assert_eq!(
            validate_upload(&[]),
            Err(Error::validation("No files selected"))
        );
    }

    #[test]
    fn test_rejects_too_many_files() {
        let files: Vec<_> = (0..11).map(|i| file(&format!("s{i}.nii"))).collect();
        assert!(matches!(validate_upload(&files), Err(Error::Validation(_))));
    }

    #[test]
    fn test_rejects_wrong_type() {
        let err = validate_upload(&[file("notes.txt")]).unwrap_err();
        assert!(err.to_string().contains("notes.txt"));
    }

    #[tokio::test]
    async fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan_lr.nii.gz");
        tokio::fs::write(&path, b"nifti").await.unwrap();

        let upload = UploadFile::from_path(&path).await.unwrap();
        assert_eq!(upload.name, "scan_lr.nii.gz");
        assert_eq!(upload.size(), 5);
    }
}
