use std::path::Path;

use serde::{Serialize, de::DeserializeOwned};

use crate::error::{Error, Result};

/// Encoding of a persisted configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Pretty-printed JSON, the interchange format.
    #[default]
    Json,

    /// CBOR snapshot.
    Cbor,
}

impl Format {
    /// Pick the format from a file extension: `.cbor` is CBOR, anything
    /// else is JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("cbor") => Format::Cbor,
            _ => Format::Json,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Cbor => "cbor",
        }
    }
}

/// Encode a value to bytes using the specified format.
pub fn encode<T: Serialize>(value: &T, format: Format) -> Result<Vec<u8>> {
    match format {
        Format::Json => serde_json::to_vec_pretty(value).map_err(Error::from),
        Format::Cbor => {
            let mut buf = Vec::new();
            ciborium::into_writer(value, &mut buf)?;
            Ok(buf)
        }
    }
}

/// Decode bytes to a value using the specified format.
pub fn decode<T: DeserializeOwned>(data: &[u8], format: Format) -> Result<T> {
    match format {
        Format::Json => serde_json::from_slice(data).map_err(Error::from),
        Format::Cbor => ciborium::from_reader(data).map_err(Error::from),
    }
}

/// Guess the format from the first non-whitespace byte.
///
/// Returns `Json` if the data starts with `{` or `[`, otherwise `Cbor`.
pub fn detect_format(data: &[u8]) -> Format {
    match data.iter().find(|b| !b.is_ascii_whitespace()) {
        Some(b'{') | Some(b'[') => Format::Json,
        _ => Format::Cbor,
    }
}

/// Decode bytes, auto-detecting the format.
pub fn decode_auto<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    decode(data, detect_format(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;

    #[test]
    fn test_cbor_roundtrip_is_smaller() {
        let settings = Settings::default();

        let json = encode(&settings, Format::Json).unwrap();
        let cbor = encode(&settings, Format::Cbor).unwrap();
        assert!(cbor.len() < json.len());

        let decoded: Settings = decode(&cbor, Format::Cbor).unwrap();
        assert_eq!(decoded, settings);
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(detect_format(b"{\"a\": 1}"), Format::Json);
        assert_eq!(detect_format(b"\n  {}"), Format::Json);
        assert_eq!(detect_format(&[0xa3, 0x01]), Format::Cbor);
    }

    #[test]
    fn test_from_path() {
        assert_eq!(Format::from_path(Path::new("plant.cbor")), Format::Cbor);
        assert_eq!(Format::from_path(Path::new("PLANT.CBOR")), Format::Cbor);
        assert_eq!(Format::from_path(Path::new("plant.json")), Format::Json);
        assert_eq!(Format::from_path(Path::new("plant")), Format::Json);
    }

    #[test]
    fn test_decode_auto_reports_malformed() {
        let result: Result<Settings> = decode_auto(b"{not json");
        assert!(matches!(result, Err(Error::MalformedConfig(_))));
    }
}
