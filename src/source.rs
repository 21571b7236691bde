//! Retrieval of the image bytes behind a record's locator.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::debug;
use std::path::Path;
use std::time::Duration;

use crate::error::FetchError;
use crate::types::get_image_extensions_set;
use crate::utils::infer_image_format;

/// Image bytes plus the file extension they should be stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    pub extension: String,
}

/// Anything that can turn a locator into image bytes.
pub trait ImageSource: Sync {
    fn fetch(&self, reference: &str) -> Result<FetchedImage, FetchError>;
}

/// Resolves `http(s)://` URLs, `data:` URIs and local paths.
pub struct DefaultImageSource {
    client: reqwest::blocking::Client,
}

impl DefaultImageSource {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    fn fetch_http(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        debug!("Downloading {}", url);
        let response = self.client.get(url).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.bytes()?.to_vec())
    }
}

impl ImageSource for DefaultImageSource {
    fn fetch(&self, reference: &str) -> Result<FetchedImage, FetchError> {
        let bytes = if is_http(reference) {
            self.fetch_http(reference)?
        } else if reference.starts_with("data:") {
            decode_data_uri(reference)?
        } else {
            std::fs::read(reference)?
        };

        let extension = extension_for(reference, &bytes);
        Ok(FetchedImage { bytes, extension })
    }
}

pub fn is_http(reference: &str) -> bool {
    reference.starts_with("http://") || reference.starts_with("https://")
}

/// Decode a `data:[<mediatype>];base64,<payload>` URI.
pub fn decode_data_uri(reference: &str) -> Result<Vec<u8>, FetchError> {
    let (header, payload) = reference
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(','))
        .ok_or_else(|| FetchError::InvalidDataUri("missing ',' separator".to_string()))?;

    if !header.ends_with(";base64") {
        return Err(FetchError::InvalidDataUri(format!(
            "unsupported encoding in {:?}",
            header
        )));
    }

    Ok(STANDARD.decode(payload.trim())?)
}

/// Pick an output extension: the locator's own if it names an image format,
/// otherwise sniffed from the bytes, otherwise `jpg`.
pub fn extension_for(reference: &str, bytes: &[u8]) -> String {
    let path_part = if is_http(reference) {
        reference.split(['?', '#']).next().unwrap_or(reference)
    } else if reference.starts_with("data:") {
        ""
    } else {
        reference
    };

    Path::new(path_part)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
        .filter(|ext| get_image_extensions_set().contains(ext))
        .or_else(|| infer_image_format(bytes).map(str::to_string))
        .unwrap_or_else(|| "jpg".to_string())
}
