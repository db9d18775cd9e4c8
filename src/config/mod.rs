use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:5001").
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// S3 bucket receiving intake documents
    pub aws_s3_bucket_name: String,

    /// S3 region (e.g., "ap-south-1")
    pub aws_s3_region: String,

    pub aws_access_key_id: String,

    pub aws_secret_access_key: String,

    /// Custom S3-compatible endpoint (MinIO, R2). Uses path-style addressing when set.
    #[serde(default)]
    pub aws_s3_endpoint: Option<String>,

    /// Frontend origin allowed by CORS
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,

    /// Maximum number of `medicalDocs` files per visit
    #[serde(default = "default_max_upload_files")]
    pub max_upload_files: usize,

    /// Maximum size of a single uploaded file in bytes
    #[serde(default = "default_max_upload_file_bytes")]
    pub max_upload_file_bytes: usize,
}

fn default_bind_addr() -> String {
    "0.0.0.0:5001".to_string()
}

fn default_cors_origin() -> String {
    "http://localhost:3000".to_string()
}

fn default_max_upload_files() -> usize {
    5
}

fn default_max_upload_file_bytes() -> usize {
    10 * 1024 * 1024
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Upload limits for the visit intake endpoint.
    pub fn upload_limits(&self) -> UploadLimits {
        UploadLimits {
            max_files: self.max_upload_files,
            max_file_bytes: self.max_upload_file_bytes,
        }
    }
}

/// Per-request limits applied while reading multipart uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadLimits {
    pub max_files: usize,
    pub max_file_bytes: usize,
}

impl UploadLimits {
    /// Whole-body limit: every file at its maximum plus 1 MiB for text fields and framing.
    pub fn body_limit(&self) -> usize {
        self.max_files
            .saturating_mul(self.max_file_bytes)
            .saturating_add(1024 * 1024)
    }
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_files: default_max_upload_files(),
            max_file_bytes: default_max_upload_file_bytes(),
        }
    }
}
