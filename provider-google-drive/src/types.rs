//! Google Drive API request and response types

use serde::{Deserialize, Serialize};

/// MIME type Drive uses for folders
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Google Drive API file resource, reduced to the fields requested
///
/// See: https://developers.google.com/drive/api/v3/reference/files#resource
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub mime_type: String,

    #[serde(default)]
    pub parents: Vec<String>,

    #[serde(default)]
    pub trashed: bool,
}

/// Google Drive API files.list response
///
/// See: https://developers.google.com/drive/api/v3/reference/files/list
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilesListResponse {
    #[serde(default)]
    pub files: Vec<DriveFile>,

    pub next_page_token: Option<String>,
}

/// Metadata part of a files.create request
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFileRequest<'a> {
    pub name: &'a str,
    pub mime_type: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<&'a str>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_files_list_response() {
        let json = r#"{
            "files": [
                {
                    "id": "file1",
                    "name": "vocabulary.json",
                    "mimeType": "application/json",
                    "parents": ["folder1"]
                }
            ]
        }"#;

        let response: FilesListResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.files.len(), 1);
        assert_eq!(response.files[0].parents, vec!["folder1".to_string()]);
        assert!(!response.files[0].trashed);
        assert!(response.next_page_token.is_none());
    }

    #[test]
    fn test_empty_list_response() {
        let response: FilesListResponse = serde_json::from_str("{}").unwrap();
        assert!(response.files.is_empty());
    }

    #[test]
    fn test_create_request_omits_empty_parents() {
        let folder = CreateFileRequest {
            name: "LexiconSync",
            mime_type: FOLDER_MIME_TYPE,
            parents: vec![],
        };
        let json = serde_json::to_value(&folder).unwrap();

        assert_eq!(json["mimeType"], FOLDER_MIME_TYPE);
        assert!(json.get("parents").is_none());
    }
}
