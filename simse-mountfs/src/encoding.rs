// ---------------------------------------------------------------------------
// Text encodings for read_file_string / write_file_encoded
// ---------------------------------------------------------------------------

use std::fmt;
use std::str::FromStr;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;

use crate::error::VfsError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum Encoding {
	#[default]
	Utf8,
	/// One byte per code point; code points above U+00FF keep their low byte.
	Latin1,
	/// Seven-bit; the high bit of every byte is cleared.
	Ascii,
	Base64,
	Hex,
}

impl Encoding {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Utf8 => "utf8",
			Self::Latin1 => "latin1",
			Self::Ascii => "ascii",
			Self::Base64 => "base64",
			Self::Hex => "hex",
		}
	}

	/// Turn text into the bytes that get stored.
	pub fn encode(&self, text: &str) -> Result<Vec<u8>, VfsError> {
		match self {
			Self::Utf8 => Ok(text.as_bytes().to_vec()),
			Self::Latin1 => Ok(text.chars().map(|c| (c as u32 & 0xff) as u8).collect()),
			Self::Ascii => Ok(text.chars().map(|c| (c as u32 & 0x7f) as u8).collect()),
			Self::Base64 => BASE64
				.decode(text.trim())
				.map_err(|e| VfsError::InvalidEncoding(format!("Invalid base64: {}", e))),
			Self::Hex => {
				hex::decode(text.trim()).map_err(|e| VfsError::InvalidEncoding(format!("Invalid hex: {}", e)))
			}
		}
	}

	/// Render stored bytes as text. Invalid UTF-8 is replaced, never rejected.
	pub fn decode(&self, bytes: &[u8]) -> String {
		match self {
			Self::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
			Self::Latin1 => bytes.iter().map(|&b| b as char).collect(),
			Self::Ascii => bytes.iter().map(|&b| (b & 0x7f) as char).collect(),
			Self::Base64 => BASE64.encode(bytes),
			Self::Hex => hex::encode(bytes),
		}
	}
}

impl FromStr for Encoding {
	type Err = VfsError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"utf8" | "utf-8" => Ok(Self::Utf8),
			"latin1" | "binary" => Ok(Self::Latin1),
			"ascii" => Ok(Self::Ascii),
			"base64" => Ok(Self::Base64),
			"hex" => Ok(Self::Hex),
			other => Err(VfsError::InvalidEncoding(format!("Unknown encoding: {}", other))),
		}
	}
}

impl TryFrom<String> for Encoding {
	type Error = VfsError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		value.parse()
	}
}

impl fmt::Display for Encoding {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
