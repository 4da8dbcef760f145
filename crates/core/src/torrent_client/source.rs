//! Torrent sources and the info-hash derived from them.
//!
//! The info-hash is computed before anything is handed to the engine so that
//! duplicate submissions can be rejected without touching an existing transfer.

use std::fmt;

use librqbit_core::torrent_metainfo::{torrent_from_bytes, TorrentMetaV1Owned};
use serde::{Deserialize, Serialize};

use super::{AddTorrentRequest, TorrentClientError};

/// Stable identifier of a torrent: its lowercase hex info-hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TorrentRef(String);

impl TorrentRef {
    /// Parse a 40-character hex info-hash (any case).
    pub fn parse(s: &str) -> Result<Self, TorrentClientError> {
        let s = s.trim();
        if s.len() == 40 && s.chars().all(|c| c.is_ascii_hexdigit()) {
            Ok(Self(s.to_ascii_lowercase()))
        } else {
            Err(TorrentClientError::InvalidTorrent(format!(
                "not a hex info-hash: {}",
                s
            )))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix for log lines and display names.
    pub fn short(&self) -> &str {
        &self.0[..8]
    }
}

impl fmt::Display for TorrentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a torrent comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TorrentSource {
    /// Magnet URI.
    Magnet(String),
    /// Raw .torrent file contents.
    TorrentFile { data: Vec<u8> },
}

impl TorrentSource {
    /// Derive the torrent's stable identifier.
    pub fn torrent_ref(&self) -> Result<TorrentRef, TorrentClientError> {
        match self {
            TorrentSource::Magnet(uri) => torrent_ref_from_magnet(uri),
            TorrentSource::TorrentFile { data } => torrent_ref_from_bytes(data),
        }
    }

    /// Display name carried by the source, if any (`dn=` or the info dict name).
    pub fn display_name(&self) -> Option<String> {
        match self {
            TorrentSource::Magnet(uri) => magnet_param(uri, "dn")
                .and_then(|dn| urlencoding::decode(&dn.replace('+', " ")).ok().map(|s| s.into_owned()))
                .filter(|s| !s.is_empty()),
            TorrentSource::TorrentFile { data } => {
                let torrent: TorrentMetaV1Owned = torrent_from_bytes(data).ok()?;
                torrent
                    .info
                    .name
                    .as_ref()
                    .map(|b| String::from_utf8_lossy(b.as_ref()).into_owned())
            }
        }
    }

    /// Build the engine request for this source.
    pub fn to_request(&self, download_path: &str) -> AddTorrentRequest {
        match self {
            TorrentSource::Magnet(uri) => AddTorrentRequest::magnet(uri.clone()),
            TorrentSource::TorrentFile { data } => AddTorrentRequest::torrent_file(data.clone()),
        }
        .with_download_path(download_path)
    }
}

/// Extract the info-hash from a magnet URI (`xt=urn:btih:` in hex or base32).
pub fn torrent_ref_from_magnet(uri: &str) -> Result<TorrentRef, TorrentClientError> {
    if !uri.starts_with("magnet:?") {
        return Err(TorrentClientError::InvalidTorrent(
            "magnet URI must start with 'magnet:?'".to_string(),
        ));
    }

    let btih = uri
        .trim_start_matches("magnet:?")
        .split('&')
        .filter_map(|param| param.strip_prefix("xt="))
        .find_map(|xt| {
            let xt = urlencoding::decode(xt).ok()?;
            let lower = xt.to_ascii_lowercase();
            lower
                .strip_prefix("urn:btih:")
                .map(|_| xt["urn:btih:".len()..].to_string())
        })
        .ok_or_else(|| {
            TorrentClientError::InvalidTorrent("magnet URI has no urn:btih hash".to_string())
        })?;

    match btih.len() {
        40 => TorrentRef::parse(&btih),
        32 => {
            let bytes = decode_base32(&btih).ok_or_else(|| {
                TorrentClientError::InvalidTorrent(format!("invalid base32 info-hash: {}", btih))
            })?;
            Ok(TorrentRef(
                bytes.iter().map(|b| format!("{:02x}", b)).collect(),
            ))
        }
        _ => Err(TorrentClientError::InvalidTorrent(format!(
            "unexpected info-hash length {}",
            btih.len()
        ))),
    }
}

/// Extract the info-hash from .torrent bytes.
pub fn torrent_ref_from_bytes(bytes: &[u8]) -> Result<TorrentRef, TorrentClientError> {
    let torrent: TorrentMetaV1Owned = torrent_from_bytes(bytes)
        .map_err(|e| TorrentClientError::InvalidTorrent(e.to_string()))?;

    TorrentRef::parse(&torrent.info_hash.as_string())
}

fn magnet_param(uri: &str, key: &str) -> Option<String> {
    let prefix = format!("{}=", key);
    uri.trim_start_matches("magnet:?")
        .split('&')
        .find_map(|p| p.strip_prefix(prefix.as_str()).map(str::to_string))
}

/// RFC 4648 base32 without padding, as used by 32-character btih values.
fn decode_base32(input: &str) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(input.len() * 5 / 8);
    let mut buffer: u64 = 0;
    let mut bits = 0u32;

    for c in input.trim_end_matches('=').chars() {
        let value = match c.to_ascii_uppercase() {
            c @ 'A'..='Z' => c as u64 - 'A' as u64,
            c @ '2'..='7' => c as u64 - '2' as u64 + 26,
            _ => return None,
        };
        buffer = (buffer << 5) | value;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push((buffer >> bits) as u8);
            buffer &= (1 << bits) - 1;
        }
    }

    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEX: &str = "d70c3b9880ebcf05969462cd180f83f8b5350310";

    #[test]
    fn test_parse_hex_ref_lowercases() {
        let r = TorrentRef::parse(&HEX.to_uppercase()).unwrap();
        assert_eq!(r.as_str(), HEX);
        assert_eq!(r.short(), "d70c3b98");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(TorrentRef::parse("not-a-hash").is_err());
        assert!(TorrentRef::parse(&"g".repeat(40)).is_err());
    }

    #[test]
    fn test_magnet_hex_hash() {
        let uri = format!("magnet:?xt=urn:btih:{}&dn=Great.Movie.2021", HEX.to_uppercase());
        let r = torrent_ref_from_magnet(&uri).unwrap();
        assert_eq!(r.as_str(), HEX);
    }

    #[test]
    fn test_magnet_base32_hash() {
        // 20 zero bytes encode to 32 'A's.
        let uri = format!("magnet:?xt=urn:btih:{}", "A".repeat(32));
        let r = torrent_ref_from_magnet(&uri).unwrap();
        assert_eq!(r.as_str(), "0".repeat(40));
    }

    #[test]
    fn test_magnet_without_hash_fails() {
        assert!(torrent_ref_from_magnet("magnet:?dn=foo").is_err());
        assert!(torrent_ref_from_magnet("http://example.com/a.torrent").is_err());
    }

    #[test]
    fn test_magnet_display_name() {
        let source = TorrentSource::Magnet(format!(
            "magnet:?xt=urn:btih:{}&dn=The%20Show+S01E01",
            HEX
        ));
        assert_eq!(source.display_name().as_deref(), Some("The Show S01E01"));
    }

    #[test]
    fn test_invalid_torrent_bytes() {
        assert!(torrent_ref_from_bytes(b"not a valid torrent").is_err());
        assert!(torrent_ref_from_bytes(b"").is_err());
    }

    #[test]
    fn test_to_request_sets_download_path() {
        let source = TorrentSource::Magnet(format!("magnet:?xt=urn:btih:{}", HEX));
        let request = source.to_request("/staging");
        assert_eq!(request.download_path(), Some("/staging"));
    }
}
