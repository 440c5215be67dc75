//! Upload stage: POST each page as multipart/form-data, then delete the
//! local copies.

use reqwest::multipart::{Form, Part};
use reqwest::Client;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::error::UploadError;

/// HTTP Basic credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Credentials are only used when both halves are present and non-empty.
    pub fn from_parts(username: Option<String>, password: Option<String>) -> Option<Self> {
        match (username, password) {
            (Some(username), Some(password)) if !username.is_empty() && !password.is_empty() => {
                Some(Self { username, password })
            }
            _ => None,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Where pages go and how to authenticate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    pub url: String,
    pub credentials: Option<Credentials>,
}

/// Outcome of the upload stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    pub url: String,
    pub authenticated: bool,
    pub attempted: usize,
    pub uploaded: usize,
}

/// POSTs a single file. A status of 400 or above is a failure.
pub async fn upload_file(
    client: &Client,
    file: &Path,
    target: &UploadTarget,
) -> Result<(), UploadError> {
    let data = tokio::fs::read(file)
        .await
        .map_err(|source| UploadError::Read {
            path: file.to_path_buf(),
            source,
        })?;

    let filename = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    let mime = mime_guess::from_path(file).first_or_octet_stream();
    debug!("Uploading {} as {} ({} bytes)", filename, mime, data.len());

    let part = Part::bytes(data)
        .file_name(filename)
        .mime_str(mime.as_ref())
        .map_err(|_| UploadError::Mime(mime.to_string()))?;
    let form = Form::new().part("file", part);

    let mut request = client.post(&target.url).multipart(form);
    if let Some(creds) = &target.credentials {
        request = request.basic_auth(&creds.username, Some(&creds.password));
    }

    let response = request.send().await?;
    let status = response.status();
    if status.as_u16() >= 400 {
        let body = response.text().await.unwrap_or_default();
        return Err(UploadError::Status {
            status: status.as_u16(),
            body,
        });
    }

    Ok(())
}

/// Uploads every file one at a time, then deletes all of them whether or
/// not their upload succeeded.
pub async fn upload_all(client: &Client, files: &[PathBuf], target: &UploadTarget) -> UploadReport {
    let mut uploaded = 0;

    for file in files {
        match upload_file(client, file, target).await {
            Ok(()) => {
                uploaded += 1;
                info!("Uploaded: {}", file.display());
            }
            Err(e) => warn!("Failed to upload {}: {}", file.display(), e),
        }
    }

    delete_local_files(files).await;

    let report = UploadReport {
        url: target.url.clone(),
        authenticated: target.credentials.is_some(),
        attempted: files.len(),
        uploaded,
    };
    info!(
        "Uploaded {} of {} file(s) to {}",
        report.uploaded, report.attempted, report.url
    );
    report
}

async fn delete_local_files(files: &[PathBuf]) {
    for file in files {
        if let Err(e) = tokio::fs::remove_file(file).await {
            warn!(
                "Warning: Failed to delete local file {}: {}",
                file.display(),
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn write_files(dir: &Path, n: usize) -> Vec<PathBuf> {
        (1..=n)
            .map(|i| {
                let p = dir.join(format!("page_{}.png", i));
                std::fs::write(&p, format!("png bytes {}", i)).unwrap();
                p
            })
            .collect()
    }

    fn target(server: &MockServer, credentials: Option<Credentials>) -> UploadTarget {
        UploadTarget {
            url: format!("{}/upload", server.uri()),
            credentials,
        }
    }

    #[test]
    fn credentials_need_both_parts() {
        assert!(Credentials::from_parts(Some("u".into()), Some("p".into())).is_some());
        assert!(Credentials::from_parts(Some("u".into()), None).is_none());
        assert!(Credentials::from_parts(None, Some("p".into())).is_none());
        assert!(Credentials::from_parts(Some("u".into()), Some(String::new())).is_none());
    }

    #[test]
    fn credentials_debug_hides_password() {
        let creds = Credentials::from_parts(Some("user".into()), Some("hunter2".into())).unwrap();
        let rendered = format!("{:?}", creds);
        assert!(rendered.contains("user"));
        assert!(!rendered.contains("hunter2"));
    }

    #[tokio::test]
    async fn posts_multipart_file_field() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload"))
            .and(body_string_contains("name=\"file\""))
            .and(body_string_contains("filename=\"page_1.png\""))
            .and(body_string_contains("image/png"))
            .and(body_string_contains("png bytes 1"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let files = write_files(temp.path(), 1);
        let client = Client::new();
        upload_file(&client, &files[0], &target(&server, None))
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let content_type = requests[0]
            .headers
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap();
        assert!(content_type.starts_with("multipart/form-data; boundary="));
    }

    #[tokio::test]
    async fn unknown_extension_falls_back_to_octet_stream() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("application/octet-stream"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let file = temp.path().join("blob.unknownext");
        std::fs::write(&file, b"data").unwrap();
        upload_file(&Client::new(), &file, &target(&server, None))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn basic_auth_header_only_with_credentials() {
        let server = MockServer::start().await;
        // base64("user:pass")
        Mock::given(method("POST"))
            .and(header("authorization", "Basic dXNlcjpwYXNz"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let files = write_files(temp.path(), 1);
        let client = Client::new();
        let creds = Credentials::from_parts(Some("user".into()), Some("pass".into()));
        upload_file(&client, &files[0], &target(&server, creds))
            .await
            .unwrap();

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        upload_file(&client, &files[0], &target(&server, None))
            .await
            .unwrap();
        let requests = server.received_requests().await.unwrap();
        assert!(requests[0].headers.get("authorization").is_none());
    }

    #[tokio::test]
    async fn error_status_is_a_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let files = write_files(temp.path(), 1);
        let err = upload_file(&Client::new(), &files[0], &target(&server, None))
            .await
            .unwrap_err();
        match err {
            UploadError::Status { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("expected Status, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn upload_all_counts_successes_and_deletes_everything() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("filename=\"page_2.png\""))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let files = write_files(temp.path(), 3);
        let report = upload_all(&Client::new(), &files, &target(&server, None)).await;

        assert_eq!(report.attempted, 3);
        assert_eq!(report.uploaded, 2);
        assert!(!report.authenticated);
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
        for file in &files {
            assert!(!file.exists(), "{} should be deleted", file.display());
        }
    }
}
