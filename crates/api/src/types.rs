use serde::{Deserialize, Serialize};

/// Short-lived object-storage credentials issued per project.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityToken {
    pub endpoint: String,
    #[serde(alias = "accessKeyId")]
    pub access_key_id: String,
    #[serde(alias = "accessKeySecret")]
    pub access_key_secret: String,
    #[serde(alias = "sessionToken")]
    pub session_token: String,
}

/// Server-side metadata of an already-uploaded file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    pub name: String,
    pub filename: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub sha256: String,
}

/// A file for which a pre-signed upload URL is requested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDescriptor {
    /// Full resource name under the parent.
    pub name: String,
    /// Remote relative path.
    pub filename: String,
    pub sha256: String,
    pub size: u64,
}
