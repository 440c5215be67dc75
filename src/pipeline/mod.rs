//! PDF → PNG conversion pipeline.
//!
//! ```text
//! resolve source ─► rasterize ─► write pages ─► [upload + delete] ─► cleanup
//! ```
//!
//! The temporary download (if any) is released in exactly one place, after
//! every stage has run or failed. See [`orchestrator::Pipeline::run`].

pub mod error;
pub mod orchestrator;
pub mod render;
pub mod source;
pub mod upload;
pub mod writer;

pub use error::PipelineError;
pub use orchestrator::{ConversionRequest, Pipeline, UploadStage};
pub use render::PdfiumRasterizer;
pub use upload::{Credentials, UploadTarget};
