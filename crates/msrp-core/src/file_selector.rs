//! The `file-selector` SDP attribute (RFC 5547)
//!
//! ```text
//! name:"report.pdf" type:application/pdf size:32349 hash:sha-1:72:24:5F:...:2E
//! ```

use std::fmt;
use std::str::FromStr;

use crate::error::MsrpError;

/// Length of a SHA-1 digest in bytes
pub const SHA1_LEN: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileSelector {
    pub name: Option<String>,
    pub content_type: Option<String>,
    pub size: Option<u64>,
    pub sha1: Option<[u8; SHA1_LEN]>,
}

impl FileSelector {
    pub fn new(
        name: impl Into<String>,
        content_type: impl Into<String>,
        size: u64,
        sha1: Option<[u8; SHA1_LEN]>,
    ) -> Self {
        Self {
            name: Some(name.into()),
            content_type: Some(content_type.into()),
            size: Some(size),
            sha1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.content_type.is_none() && self.size.is_none() && self.sha1.is_none()
    }

    /// Attribute value as it goes on the wire
    pub fn format_sdp(&self) -> String {
        let mut parts = Vec::with_capacity(4);
        if let Some(name) = &self.name {
            parts.push(format!("name:\"{}\"", name));
        }
        if let Some(content_type) = &self.content_type {
            parts.push(format!("type:{}", content_type));
        }
        if let Some(size) = self.size {
            parts.push(format!("size:{}", size));
        }
        if let Some(sha1) = &self.sha1 {
            let hex: Vec<String> = sha1.iter().map(|b| format!("{:02X}", b)).collect();
            parts.push(format!("hash:sha-1:{}", hex.join(":")));
        }
        parts.join(" ")
    }

    pub fn parse(value: &str) -> Result<Self, MsrpError> {
        let mut selector = FileSelector::default();
        let mut rest = value.trim();

        while !rest.is_empty() {
            let (key, after) = rest
                .split_once(':')
                .ok_or_else(|| MsrpError::file_selector(format!("expected selector in '{}'", rest)))?;

            let (raw, remaining) = if key == "name" {
                let quoted = after
                    .strip_prefix('"')
                    .ok_or_else(|| MsrpError::file_selector("name is not quoted"))?;
                let end = quoted
                    .find('"')
                    .ok_or_else(|| MsrpError::file_selector("unterminated name"))?;
                (&quoted[..end], &quoted[end + 1..])
            } else {
                after.split_once(' ').unwrap_or((after, ""))
            };

            match key {
                "name" => selector.name = Some(raw.to_string()),
                "type" => selector.content_type = Some(raw.to_string()),
                "size" => {
                    let size = raw
                        .parse::<u64>()
                        .map_err(|_| MsrpError::file_selector(format!("invalid size '{}'", raw)))?;
                    selector.size = Some(size);
                }
                "hash" => selector.sha1 = Some(parse_sha1(raw)?),
                other => {
                    return Err(MsrpError::file_selector(format!("unknown selector '{}'", other)))
                }
            }
            rest = remaining.trim_start();
        }

        if selector.is_empty() {
            return Err(MsrpError::file_selector("no selector present"));
        }
        Ok(selector)
    }
}

fn parse_sha1(raw: &str) -> Result<[u8; SHA1_LEN], MsrpError> {
    let hex = raw
        .strip_prefix("sha-1:")
        .ok_or_else(|| MsrpError::file_selector(format!("unsupported hash '{}'", raw)))?;

    let mut digest = [0u8; SHA1_LEN];
    let mut count = 0;
    for (i, pair) in hex.split(':').enumerate() {
        if i >= SHA1_LEN || pair.len() != 2 {
            return Err(MsrpError::file_selector("malformed sha-1 digest"));
        }
        digest[i] = u8::from_str_radix(pair, 16)
            .map_err(|_| MsrpError::file_selector("malformed sha-1 digest"))?;
        count += 1;
    }
    if count != SHA1_LEN {
        return Err(MsrpError::file_selector("malformed sha-1 digest"));
    }
    Ok(digest)
}

impl fmt::Display for FileSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format_sdp())
    }
}

impl FromStr for FileSelector {
    type Err = MsrpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIGEST: [u8; SHA1_LEN] = [
        0x72, 0x24, 0x5F, 0xE8, 0x65, 0x3D, 0xDA, 0xF3, 0x71, 0x36, 0x2F, 0x86, 0xD4, 0x71, 0x91,
        0x3E, 0xE4, 0xA2, 0xCE, 0x2E,
    ];
    const WIRE: &str = "name:\"My cool picture.jpg\" type:image/jpeg size:32349 \
                        hash:sha-1:72:24:5F:E8:65:3D:DA:F3:71:36:2F:86:D4:71:91:3E:E4:A2:CE:2E";

    #[test]
    fn test_format() {
        let selector = FileSelector::new("My cool picture.jpg", "image/jpeg", 32349, Some(DIGEST));
        assert_eq!(selector.format_sdp(), WIRE);
    }

    #[test]
    fn test_parse() {
        let selector: FileSelector = WIRE.parse().unwrap();
        assert_eq!(selector.name.as_deref(), Some("My cool picture.jpg"));
        assert_eq!(selector.content_type.as_deref(), Some("image/jpeg"));
        assert_eq!(selector.size, Some(32349));
        assert_eq!(selector.sha1, Some(DIGEST));
    }

    #[test]
    fn test_partial_selector() {
        let selector = FileSelector::parse("size:10 type:text/plain").unwrap();
        assert_eq!(selector.size, Some(10));
        assert_eq!(selector.name, None);
        assert_eq!(selector.format_sdp(), "type:text/plain size:10");
    }

    #[test]
    fn test_malformed() {
        for bad in [
            "",
            "name:unquoted",
            "name:\"open",
            "size:lots",
            "hash:md5:00",
            "hash:sha-1:72:24",
            "colour:blue",
        ] {
            assert!(FileSelector::parse(bad).is_err(), "{:?} should not parse", bad);
        }
    }
}
