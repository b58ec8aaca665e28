//! The static site: offer archive, page rendering and upload.

/// Every offer published so far.
pub mod history;

/// HTML pages, RSS feed and sitemap.
pub mod render;

/// Putting the rendered files on the web server.
pub mod upload;

pub use history::History;
pub use render::{build_artifacts, write_artifacts, Artifact, SiteInput};
pub use upload::{upload_all, upload_site, ArtifactSink, FtpsSite};
