use std::io::Cursor;

use suppaftp::{
    native_tls::TlsConnector, types::FileType, NativeTlsConnector, NativeTlsFtpStream,
};

use crate::{config::FtpConfig, error::Error, site::render::Artifact};

const FTP_PORT: u16 = 21;

/// Somewhere site files can be put.
pub trait ArtifactSink {
    fn put(&mut self, name: &str, bytes: &[u8]) -> Result<(), Error>;
}

/// A logged in FTPS session, over explicit TLS with a protected data channel.
pub struct FtpsSite {
    stream: NativeTlsFtpStream,
}

fn split_host(host: &str) -> (&str, u16) {
    match host.rsplit_once(':') {
        Some((name, port)) => match port.parse() {
            Ok(port) => (name, port),
            Err(_) => (host, FTP_PORT),
        },
        None => (host, FTP_PORT),
    }
}

impl FtpsSite {
    /// Connect, log in and change to the configured directory.
    ///
    /// Fails with [`Error::Auth`] if the login is refused. This blocks.
    pub fn connect(config: &FtpConfig) -> Result<Self, Error> {
        let (domain, port) = split_host(&config.host);

        let stream = NativeTlsFtpStream::connect((domain, port))?;
        let mut stream =
            stream.into_secure(NativeTlsConnector::from(TlsConnector::new()?), domain)?;

        stream.login(&config.user, &config.password).map_err(|e| match e {
            suppaftp::FtpError::UnexpectedResponse(response)
                if response.status == suppaftp::Status::NotLoggedIn =>
            {
                Error::Auth {
                    service: "ftp",
                    message: String::from_utf8_lossy(&response.body).trim().to_string(),
                    hint: "check FTP_USER and FTP_PASS",
                }
            }
            other => Error::Ftp(other),
        })?;

        if !config.path.is_empty() {
            stream.cwd(&config.path)?;
        }
        stream.transfer_type(FileType::Binary)?;

        log::debug!("Logged in to {domain}");
        Ok(Self { stream })
    }

    pub fn quit(mut self) {
        if let Err(e) = self.stream.quit() {
            log::debug!("FTP QUIT failed: {e}");
        }
    }
}

impl ArtifactSink for FtpsSite {
    fn put(&mut self, name: &str, bytes: &[u8]) -> Result<(), Error> {
        let written = self.stream.put_file(name, &mut Cursor::new(bytes))?;
        log::debug!("Uploaded {name} ({written} bytes)");
        Ok(())
    }
}

/// Upload the artifacts one by one, stopping at the first one that fails.
///
/// Returns how many were uploaded. Files uploaded before a failure stay uploaded.
pub fn upload_all(sink: &mut impl ArtifactSink, artifacts: &[Artifact]) -> Result<usize, Error> {
    for (uploaded, artifact) in artifacts.iter().enumerate() {
        if let Err(e) = sink.put(artifact.name, &artifact.bytes) {
            log::warn!(
                "Upload of {} failed after {uploaded} of {} files",
                artifact.name,
                artifacts.len()
            );
            return Err(e);
        }
    }

    log::info!("Uploaded {} site files", artifacts.len());
    Ok(artifacts.len())
}

/// Upload the site over FTPS on the blocking thread pool.
pub async fn upload_site(config: &FtpConfig, artifacts: Vec<Artifact>) -> Result<usize, Error> {
    let config = config.clone();
    tokio::task::spawn_blocking(move || {
        let mut site = FtpsSite::connect(&config)?;
        let result = upload_all(&mut site, &artifacts);
        site.quit();
        result
    })
    .await?
}
