use reqwest::Client;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use super::error::PipelineError;
use super::render::{PageImage, Rasterizer};
use super::source;
use super::upload::{self, UploadReport, UploadTarget};
use super::writer;

/// Whether written pages are uploaded (and then deleted) or kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadStage {
    Skip,
    Upload(UploadTarget),
}

/// One conversion job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionRequest {
    pub source: String,
    pub destination: PathBuf,
    pub upload: UploadStage,
}

impl ConversionRequest {
    fn validate(&self) -> Result<(), PipelineError> {
        if self.source.trim().is_empty() {
            return Err(PipelineError::InvalidInput(
                "source path or URL is empty".to_string(),
            ));
        }
        if self.destination.as_os_str().is_empty() {
            return Err(PipelineError::InvalidInput(
                "destination directory is empty".to_string(),
            ));
        }
        if let UploadStage::Upload(target) = &self.upload {
            if target.url.trim().is_empty() {
                return Err(PipelineError::InvalidInput(
                    "upload URL is empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Outcome of a successful request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionResult {
    pub pages_produced: usize,
    pub pages_uploaded: usize,
    pub destination: PathBuf,
    pub upload: Option<UploadReport>,
}

impl ConversionResult {
    pub fn upload_summary(&self) -> Option<String> {
        self.upload.as_ref().map(|report| {
            let auth = if report.authenticated {
                " with Basic Auth"
            } else {
                " without authentication"
            };
            format!(
                "uploaded {} of them to {}{}",
                report.uploaded, report.url, auth
            )
        })
    }

    /// Text returned to the caller.
    pub fn message(&self) -> String {
        match self.upload_summary() {
            Some(summary) => format!(
                "Successfully converted PDF to {} PNG files, {}, and deleted local copies.",
                self.pages_produced, summary
            ),
            None => format!(
                "Successfully converted PDF to {} PNG files in {}",
                self.pages_produced,
                self.destination.display()
            ),
        }
    }
}

/// Runs conversion requests. Holds no per-request state, so one instance
/// serves any number of concurrent requests.
#[derive(Clone)]
pub struct Pipeline {
    client: Client,
    rasterizer: Arc<dyn Rasterizer>,
    temp_dir: Option<PathBuf>,
}

impl Pipeline {
    pub fn new(client: Client, rasterizer: Arc<dyn Rasterizer>, temp_dir: Option<PathBuf>) -> Self {
        Self {
            client,
            rasterizer,
            temp_dir,
        }
    }

    pub async fn run(&self, request: ConversionRequest) -> Result<ConversionResult, PipelineError> {
        request.validate()?;

        info!(
            source = %request.source,
            destination = %request.destination.display(),
            upload = matches!(request.upload, UploadStage::Upload(_)),
            "Starting conversion"
        );

        // A failed download has already removed its partial file.
        let resolved = source::resolve(&self.client, &request.source, self.temp_dir.as_deref()).await?;

        let outcome = self.process(resolved.path(), &request).await;

        if let Some(artifact) = resolved.into_artifact() {
            artifact.cleanup();
        }

        match &outcome {
            Ok(result) => info!(
                produced = result.pages_produced,
                uploaded = result.pages_uploaded,
                "{}",
                result.message()
            ),
            Err(e) => warn!(source = %request.source, "Conversion failed: {}", e),
        }
        outcome
    }

    async fn process(
        &self,
        pdf: &Path,
        request: &ConversionRequest,
    ) -> Result<ConversionResult, PipelineError> {
        let pages = self.rasterize(pdf).await?;
        if pages.is_empty() {
            return Err(PipelineError::NoPages {
                path: pdf.to_path_buf(),
            });
        }

        let files = writer::write_pages(&pages, &request.destination).await?;
        drop(pages);

        let report = match &request.upload {
            UploadStage::Skip => None,
            UploadStage::Upload(target) => {
                Some(upload::upload_all(&self.client, &files, target).await)
            }
        };

        Ok(ConversionResult {
            pages_produced: files.len(),
            pages_uploaded: report.as_ref().map_or(0, |r| r.uploaded),
            destination: request.destination.clone(),
            upload: report,
        })
    }

    async fn rasterize(&self, pdf: &Path) -> Result<Vec<PageImage>, PipelineError> {
        let rasterizer = Arc::clone(&self.rasterizer);
        let path = pdf.to_path_buf();

        tokio::task::spawn_blocking(move || rasterizer.render(&path))
            .await
            .map_err(|e| PipelineError::Internal(format!("Render task panicked: {}", e)))?
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::pipeline::error::ErrorCategory;
    use crate::pipeline::Credentials;
    use std::sync::Mutex;
    use tempfile::TempDir;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Stand-in for pdfium: yields `pages` fake PNGs or fails.
    pub(crate) struct FakeRasterizer {
        pages: usize,
        fail: bool,
        pub(crate) calls: Mutex<Vec<(PathBuf, bool)>>,
    }

    impl FakeRasterizer {
        pub(crate) fn pages(pages: usize) -> Arc<Self> {
            Arc::new(Self {
                pages,
                fail: false,
                calls: Mutex::new(Vec::new()),
            })
        }

        pub(crate) fn failing() -> Arc<Self> {
            Arc::new(Self {
                pages: 0,
                fail: true,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl Rasterizer for FakeRasterizer {
        fn render(&self, pdf_path: &Path) -> Result<Vec<PageImage>, PipelineError> {
            self.calls
                .lock()
                .unwrap()
                .push((pdf_path.to_path_buf(), pdf_path.exists()));
            if self.fail {
                return Err(PipelineError::Rasterization {
                    path: pdf_path.to_path_buf(),
                    detail: "corrupt xref table".to_string(),
                });
            }
            Ok((1..=self.pages)
                .map(|index| PageImage {
                    index,
                    png: format!("fake png {}", index).into_bytes(),
                })
                .collect())
        }
    }

    fn pipeline(rasterizer: Arc<FakeRasterizer>, temp_dir: &Path) -> Pipeline {
        Pipeline::new(Client::new(), rasterizer, Some(temp_dir.to_path_buf()))
    }

    fn request(source: &str, destination: &Path, upload: UploadStage) -> ConversionRequest {
        ConversionRequest {
            source: source.to_string(),
            destination: destination.to_path_buf(),
            upload,
        }
    }

    fn listing(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    async fn pdf_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.7 fake".to_vec()))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn local_source_produces_one_file_per_page() {
        let work = TempDir::new().unwrap();
        let out = work.path().join("out");
        let raster = FakeRasterizer::pages(3);

        let result = pipeline(raster.clone(), work.path())
            .run(request("/data/in.pdf", &out, UploadStage::Skip))
            .await
            .unwrap();

        assert_eq!(result.pages_produced, 3);
        assert_eq!(result.pages_uploaded, 0);
        assert_eq!(result.upload_summary(), None);
        assert_eq!(
            result.message(),
            format!("Successfully converted PDF to 3 PNG files in {}", out.display())
        );
        assert_eq!(listing(&out), vec!["page_1.png", "page_2.png", "page_3.png"]);
        assert_eq!(
            raster.calls.lock().unwrap()[0].0,
            PathBuf::from("/data/in.pdf")
        );
    }

    #[tokio::test]
    async fn url_source_temp_file_is_removed_after_success() {
        let server = pdf_server().await;
        let temp = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let raster = FakeRasterizer::pages(3);

        let url = format!("{}/a.pdf", server.uri());
        let result = pipeline(raster.clone(), temp.path())
            .run(request(&url, out.path(), UploadStage::Skip))
            .await
            .unwrap();

        assert_eq!(result.pages_produced, 3);
        let calls = raster.calls.lock().unwrap();
        let (rendered, existed) = &calls[0];
        assert!(rendered.starts_with(temp.path()));
        assert!(*existed, "temporary PDF must exist while rendering");
        assert!(listing(temp.path()).is_empty());
    }

    #[tokio::test]
    async fn url_source_temp_file_is_removed_after_conversion_failure() {
        let server = pdf_server().await;
        let temp = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();

        let url = format!("{}/a.pdf", server.uri());
        let err = pipeline(FakeRasterizer::failing(), temp.path())
            .run(request(&url, &out.path().join("pages"), UploadStage::Skip))
            .await
            .unwrap_err();

        assert_eq!(err.category(), ErrorCategory::Conversion);
        assert!(listing(temp.path()).is_empty());
        assert!(!out.path().join("pages").exists());
    }

    #[tokio::test]
    async fn url_source_temp_file_is_removed_after_write_failure() {
        let server = pdf_server().await;
        let temp = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let blocker = out.path().join("not_a_dir");
        std::fs::write(&blocker, b"occupied").unwrap();

        let url = format!("{}/a.pdf", server.uri());
        let err = pipeline(FakeRasterizer::pages(2), temp.path())
            .run(request(&url, &blocker, UploadStage::Skip))
            .await
            .unwrap_err();

        assert_eq!(err.category(), ErrorCategory::Persistence);
        assert!(listing(temp.path()).is_empty());
        assert!(blocker.is_file());
    }

    #[tokio::test]
    async fn url_source_upload_leaves_no_pdf_or_pages_behind() {
        let server = pdf_server().await;
        Mock::given(method("POST"))
            .and(path("/upload"))
            .respond_with(ResponseTemplate::new(200))
            .expect(3)
            .mount(&server)
            .await;
        let temp = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let raster = FakeRasterizer::pages(3);

        let target = UploadTarget {
            url: format!("{}/upload", server.uri()),
            credentials: None,
        };
        let url = format!("{}/a.pdf", server.uri());
        let result = pipeline(raster.clone(), temp.path())
            .run(request(&url, out.path(), UploadStage::Upload(target)))
            .await
            .unwrap();

        assert_eq!(result.pages_produced, 3);
        assert_eq!(result.pages_uploaded, 3);
        assert!(raster.calls.lock().unwrap()[0].0.starts_with(temp.path()));
        assert!(listing(temp.path()).is_empty());
        assert!(listing(out.path()).is_empty());
    }

    #[tokio::test]
    async fn download_failure_skips_conversion() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let temp = TempDir::new().unwrap();
        let raster = FakeRasterizer::pages(1);

        let url = format!("{}/a.pdf", server.uri());
        let err = pipeline(raster.clone(), temp.path())
            .run(request(&url, &temp.path().join("out"), UploadStage::Skip))
            .await
            .unwrap_err();

        assert_eq!(err.category(), ErrorCategory::Acquisition);
        assert_eq!(raster.call_count(), 0);
        assert!(listing(temp.path()).is_empty());
    }

    #[tokio::test]
    async fn blank_fields_fail_before_any_side_effect() {
        let temp = TempDir::new().unwrap();
        let raster = FakeRasterizer::pages(1);
        let p = pipeline(raster.clone(), temp.path());

        let err = p
            .run(request("  ", &temp.path().join("out"), UploadStage::Skip))
            .await
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::InputValidation);

        let err = p
            .run(request("/in.pdf", Path::new(""), UploadStage::Skip))
            .await
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::InputValidation);

        assert_eq!(raster.call_count(), 0);
        assert!(listing(temp.path()).is_empty());
    }

    #[tokio::test]
    async fn zero_pages_is_an_error_with_no_writes_or_uploads() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("out");

        let target = UploadTarget {
            url: format!("{}/upload", server.uri()),
            credentials: None,
        };
        let err = pipeline(FakeRasterizer::pages(0), temp.path())
            .run(request("/in.pdf", &out, UploadStage::Upload(target)))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::NoPages { .. }));
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn upload_variant_counts_successes_and_deletes_all_pages() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("filename=\"page_3.png\""))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/upload"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("out");

        let url = format!("{}/upload", server.uri());
        let target = UploadTarget {
            url: url.clone(),
            credentials: None,
        };
        let result = pipeline(FakeRasterizer::pages(4), temp.path())
            .run(request("/in.pdf", &out, UploadStage::Upload(target)))
            .await
            .unwrap();

        assert_eq!(result.pages_produced, 4);
        assert_eq!(result.pages_uploaded, 3);
        assert_eq!(server.received_requests().await.unwrap().len(), 4);
        assert!(listing(&out).is_empty());
        assert_eq!(
            result.message(),
            format!(
                "Successfully converted PDF to 4 PNG files, uploaded 3 of them to {} without authentication, and deleted local copies.",
                url
            )
        );
    }

    #[tokio::test]
    async fn upload_variant_with_credentials_authenticates_every_request() {
        let server = MockServer::start().await;
        // base64("alice:s3cret")
        Mock::given(method("POST"))
            .and(header("authorization", "Basic YWxpY2U6czNjcmV0"))
            .respond_with(ResponseTemplate::new(200))
            .expect(2)
            .mount(&server)
            .await;
        let temp = TempDir::new().unwrap();

        let target = UploadTarget {
            url: format!("{}/upload", server.uri()),
            credentials: Credentials::from_parts(Some("alice".into()), Some("s3cret".into())),
        };
        let result = pipeline(FakeRasterizer::pages(2), temp.path())
            .run(request("/in.pdf", &temp.path().join("out"), UploadStage::Upload(target)))
            .await
            .unwrap();

        assert_eq!(result.pages_uploaded, 2);
        assert!(result.message().contains(" with Basic Auth, and deleted local copies."));
    }

    #[tokio::test]
    async fn converting_twice_yields_the_same_files() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("out");
        let p = pipeline(FakeRasterizer::pages(2), temp.path());

        p.run(request("/in.pdf", &out, UploadStage::Skip)).await.unwrap();
        let first = listing(&out);
        p.run(request("/in.pdf", &out, UploadStage::Skip)).await.unwrap();

        assert_eq!(first, vec!["page_1.png", "page_2.png"]);
        assert_eq!(listing(&out), first);
    }
}
