use super::types::{BackgroundError, BackgroundFetcher, BackgroundImage};
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_MAX_BYTES: u64 = 32 * 1024 * 1024;

/// Where a background locator points
#[derive(Debug, Clone, PartialEq, Eq)]
enum Locator {
    File(PathBuf),
    Http(Url),
}

impl Locator {
    fn parse(source: &str) -> Result<Self, BackgroundError> {
        let invalid = |reason: String| BackgroundError::InvalidLocator {
            locator: source.to_string(),
            reason,
        };

        match Url::parse(source) {
            Ok(url) => match url.scheme() {
                "file" => url
                    .to_file_path()
                    .map(Locator::File)
                    .map_err(|_| invalid("not a local file path".to_string())),
                "http" | "https" => Ok(Locator::Http(url)),
                // Windows drive letters parse as a one-letter scheme
                scheme if scheme.len() == 1 => Ok(Locator::File(PathBuf::from(source))),
                scheme => Err(BackgroundError::UnsupportedScheme(scheme.to_string())),
            },
            Err(url::ParseError::RelativeUrlWithoutBase) => Ok(Locator::File(PathBuf::from(source))),
            Err(e) => Err(invalid(e.to_string())),
        }
    }
}

/// Fetches backgrounds from local paths, `file://` and `http(s)://` URIs
///
/// Any format the `image` crate can sniff is accepted.
#[derive(Debug, Clone)]
pub struct UriFetcher {
    timeout: Duration,
    max_bytes: u64,
}

impl Default for UriFetcher {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }
}

impl UriFetcher {
    fn read_file(&self, path: PathBuf) -> Result<Vec<u8>, BackgroundError> {
        std::fs::read(&path).map_err(|source| BackgroundError::Io { path, source })
    }

    fn download(&self, url: &Url) -> Result<Vec<u8>, BackgroundError> {
        let http_error = |reason: String| BackgroundError::Http {
            url: url.to_string(),
            reason,
        };

        let response = ureq::get(url.as_str())
            .timeout(self.timeout)
            .call()
            .map_err(|e| match e {
                ureq::Error::Status(code, _) => http_error(format!("server returned status {}", code)),
                ureq::Error::Transport(t) => http_error(t.to_string()),
            })?;

        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(self.max_bytes + 1)
            .read_to_end(&mut bytes)
            .map_err(|e| http_error(e.to_string()))?;

        if bytes.len() as u64 > self.max_bytes {
            return Err(BackgroundError::TooLarge {
                url: url.to_string(),
                limit: self.max_bytes,
            });
        }

        Ok(bytes)
    }
}

impl BackgroundFetcher for UriFetcher {
    fn fetch(&self, source: &str) -> Result<BackgroundImage, BackgroundError> {
        let _span = tracing::debug_span!("fetch_background", source).entered();

        let bytes = match Locator::parse(source)? {
            Locator::File(path) => self.read_file(path)?,
            Locator::Http(url) => self.download(&url)?,
        };
        tracing::debug!("Fetched {} bytes", bytes.len());

        let image = image::load_from_memory(&bytes)?.to_rgba8();
        tracing::debug!("Decoded background {}x{}", image.width(), image.height());

        Ok(BackgroundImage::new(source, image))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("backdrop-{}-{}", std::process::id(), name))
    }

    #[test]
    fn bare_path_and_file_uri_are_files() {
        assert_eq!(
            Locator::parse("/tmp/bg.png").unwrap(),
            Locator::File(PathBuf::from("/tmp/bg.png"))
        );
        assert_eq!(
            Locator::parse("backgrounds/beach.jpg").unwrap(),
            Locator::File(PathBuf::from("backgrounds/beach.jpg"))
        );
        assert_eq!(
            Locator::parse("file:///tmp/bg.png").unwrap(),
            Locator::File(PathBuf::from("/tmp/bg.png"))
        );
    }

    #[test]
    fn http_locators_are_downloads() {
        assert!(matches!(
            Locator::parse("https://example.com/bg.jpg").unwrap(),
            Locator::Http(_)
        ));
    }

    #[test]
    fn unknown_scheme_is_rejected() {
        assert!(matches!(
            Locator::parse("ftp://example.com/bg.jpg"),
            Err(BackgroundError::UnsupportedScheme(s)) if s == "ftp"
        ));
    }

    #[test]
    fn decodes_png_from_disk() {
        let path = temp_path("decode.png");
        RgbaImage::from_pixel(7, 3, Rgba([1, 2, 3, 255]))
            .save(&path)
            .unwrap();

        let background = UriFetcher::default().fetch(path.to_str().unwrap()).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(background.dimensions(), (7, 3));
        assert_eq!(background.image().get_pixel(6, 2).0, [1, 2, 3, 255]);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = UriFetcher::default()
            .fetch(temp_path("missing.png").to_str().unwrap())
            .unwrap_err();
        assert!(matches!(err, BackgroundError::Io { .. }));
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let path = temp_path("garbage.png");
        std::fs::write(&path, b"definitely not an image").unwrap();

        let err = UriFetcher::default().fetch(path.to_str().unwrap()).unwrap_err();
        std::fs::remove_file(&path).ok();

        assert!(matches!(err, BackgroundError::Decode(_)));
    }
}
