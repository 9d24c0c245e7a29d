//! Input validation performed before any persistence attempt.

use keepsake_models::FolderDraft;

use crate::config::UploadConfig;
use crate::error::{Error, Result};

/// Check an upload against the size cap and the MIME allowlist.
pub fn validate_upload(limits: &UploadConfig, name: &str, mime_type: &str, size: u64) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::Validation("File name is required".to_string()));
    }

    if size > limits.max_file_size {
        return Err(Error::FileTooLarge {
            max_size: limits.max_file_size,
        });
    }

    if !limits
        .allowed_mime_types
        .iter()
        .any(|allowed| allowed.eq_ignore_ascii_case(mime_type))
    {
        return Err(Error::InvalidFileType(format!(
            "{} type not supported",
            if mime_type.is_empty() { name } else { mime_type }
        )));
    }

    Ok(())
}

/// Trim a folder draft and reject blank names.
pub fn normalize_folder(draft: FolderDraft) -> Result<FolderDraft> {
    let name = draft.name.trim().to_string();
    if name.is_empty() {
        return Err(Error::Validation("Please enter a folder name".to_string()));
    }

    let description = draft
        .description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty());

    Ok(FolderDraft { name, description })
}

/// Treat an empty or whitespace folder reference as "no folder".
pub fn normalize_folder_ref(folder_id: Option<&str>) -> Option<String> {
    folder_id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_valid_upload() {
        let limits = UploadConfig::default();
        assert!(validate_upload(&limits, "a.png", "image/png", 1024).is_ok());
    }

    #[test]
    fn test_oversized_upload() {
        let limits = UploadConfig {
            max_file_size: 100,
            ..UploadConfig::default()
        };
        let err = validate_upload(&limits, "a.png", "image/png", 101).unwrap_err();
        assert!(matches!(err, Error::FileTooLarge { max_size: 100 }));
        assert!(err.is_validation());
    }

    #[test]
    fn test_disallowed_mime_type() {
        let limits = UploadConfig::default();
        let err = validate_upload(&limits, "run.exe", "application/x-msdownload", 10).unwrap_err();
        assert!(matches!(err, Error::InvalidFileType(_)));
    }

    #[rstest]
    #[case("  ")]
    #[case("")]
    #[case("\t\n")]
    fn test_blank_folder_name_rejected(#[case] name: &str) {
        let err = normalize_folder(FolderDraft::new(name)).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_folder_name_trimmed() {
        let draft = normalize_folder(FolderDraft::new("  Trip ").with_description("   ")).unwrap();
        assert_eq!(draft.name, "Trip");
        assert_eq!(draft.description, None);
    }

    #[test]
    fn test_folder_ref_normalization() {
        assert_eq!(normalize_folder_ref(Some("")), None);
        assert_eq!(normalize_folder_ref(Some("  ")), None);
        assert_eq!(normalize_folder_ref(None), None);
        assert_eq!(normalize_folder_ref(Some("f1")), Some("f1".to_string()));
    }
}
