use clap::{value_parser, Arg, ArgMatches, Command};
use std::path::PathBuf;
use std::time::Duration;

use crate::pipeline::render::DEFAULT_DPI;

/// Runtime configuration, from flags with environment fallbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub dpi: u32,
    pub pdfium_lib_path: Option<PathBuf>,
    pub temp_dir: Option<PathBuf>,
    /// `None` leaves HTTP calls without a client-side timeout.
    pub http_timeout: Option<Duration>,
    pub quiet: bool,
}

pub fn command() -> Command {
    Command::new("mcp-pdf2png")
        .version(env!("CARGO_PKG_VERSION"))
        .about("A Model Context Protocol server that converts PDFs to PNG images")
        .long_about(
            "This MCP server provides the following tools:\n\
            - convert: Convert a local or remote PDF into page_N.png files\n\
            - convert_and_upload: Convert, POST every page to an endpoint, then delete local copies",
        )
        .arg(
            Arg::new("pdfium-lib-path")
                .long("pdfium-lib-path")
                .value_name("PATH")
                .env("PDFIUM_LIB_PATH")
                .help("pdfium shared library, or the directory containing it")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("dpi")
                .long("dpi")
                .value_name("DPI")
                .env("PDF2PNG_DPI")
                .help("Render resolution in dots per inch")
                .default_value("200")
                .value_parser(value_parser!(u32).range(1..=1200)),
        )
        .arg(
            Arg::new("temp-dir")
                .long("temp-dir")
                .value_name("DIR")
                .env("PDF2PNG_TEMP_DIR")
                .help("Directory for downloaded PDFs (defaults to the system temp dir)")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("http-timeout")
                .long("http-timeout")
                .value_name("SECONDS")
                .env("PDF2PNG_HTTP_TIMEOUT")
                .help("Timeout for each download/upload request; unset means no timeout")
                .value_parser(value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new("quiet")
                .long("quiet")
                .short('q')
                .help("Suppress the startup banner and non-error logs (for MCP clients)")
                .action(clap::ArgAction::SetTrue),
        )
}

impl ServerConfig {
    pub fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            dpi: matches.get_one::<u32>("dpi").copied().unwrap_or(DEFAULT_DPI),
            pdfium_lib_path: matches.get_one::<PathBuf>("pdfium-lib-path").cloned(),
            temp_dir: matches.get_one::<PathBuf>("temp-dir").cloned(),
            http_timeout: matches
                .get_one::<u64>("http-timeout")
                .map(|secs| Duration::from_secs(*secs)),
            quiet: matches.get_flag("quiet"),
        }
    }

    pub fn http_client(&self) -> reqwest::Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder().user_agent(concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION")
        ));
        if let Some(timeout) = self.http_timeout {
            builder = builder.timeout(timeout);
        }
        builder.build()
    }
}
