//! Text decoding for raw report bytes
//!
//! Reports arrive as CP950/Big5 from the exchanges, occasionally re-saved as
//! UTF-8 (with or without BOM) or as a GB encoding. Decoding is an ordered
//! list of attempts with a success predicate rather than trial and error:
//!
//! 1. A byte-order mark decides the encoding outright
//! 2. The first candidate that decodes without replacement AND yields text
//!    containing every expected header token wins
//! 3. Else the first candidate that decodes without replacement
//! 4. Else a lossy decode with the first candidate (`clean == false`)

use encoding_rs::{Encoding, BIG5, GB18030, GBK, UTF_8};
use tracing::{debug, warn};

use crate::{Error, Result};

/// Default decode order
pub const DEFAULT_ENCODINGS: [&str; 5] = ["cp950", "big5", "utf-8", "gbk", "gb18030"];

/// Decoded report text
#[derive(Debug, Clone)]
pub struct Decoded {
    pub text: String,
    pub encoding: &'static Encoding,
    /// False when malformed sequences were replaced
    pub clean: bool,
}

/// Resolve an encoding label, including the Windows code-page aliases
pub fn resolve_label(label: &str) -> Option<&'static Encoding> {
    match label.trim().to_ascii_lowercase().as_str() {
        "cp950" | "ms950" | "windows-950" => Some(BIG5),
        "utf-8-sig" | "utf8-sig" | "utf8" => Some(UTF_8),
        "gb2312" => Some(GBK),
        "gb18030" => Some(GB18030),
        other => Encoding::for_label(other.as_bytes()),
    }
}

/// Resolve an ordered label list, deduplicating repeated encodings
///
/// # Errors
/// `Error::Config` on an unknown label or an empty list.
pub fn resolve_labels<S: AsRef<str>>(labels: &[S]) -> Result<Vec<&'static Encoding>> {
    let mut out: Vec<&'static Encoding> = Vec::with_capacity(labels.len());
    for label in labels {
        let label = label.as_ref();
        let enc = resolve_label(label).ok_or_else(|| Error::Config(format!("unknown encoding label {:?}", label)))?;
        if !out.contains(&enc) {
            out.push(enc);
        }
    }
    if out.is_empty() {
        return Err(Error::Config("encoding list is empty".to_string()));
    }
    Ok(out)
}

/// The default candidate list
pub fn default_candidates() -> Vec<&'static Encoding> {
    vec![BIG5, UTF_8, GBK, GB18030]
}

/// Decode `bytes` using the ordered `candidates`
pub fn decode(bytes: &[u8], candidates: &[&'static Encoding], expect: &[&str]) -> Decoded {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        let (text, had_errors) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
        debug!(encoding = encoding.name(), "byte-order mark found");
        return Decoded {
            text: text.into_owned(),
            encoding,
            clean: !had_errors,
        };
    }

    let mut first_clean: Option<Decoded> = None;
    for &encoding in candidates {
        let Some(text) = encoding.decode_without_bom_handling_and_without_replacement(bytes) else {
            debug!(encoding = encoding.name(), "decode failed");
            continue;
        };
        if expect.iter().all(|needle| text.contains(needle)) {
            debug!(encoding = encoding.name(), "decoded with expected header tokens");
            return Decoded {
                text: text.into_owned(),
                encoding,
                clean: true,
            };
        }
        if first_clean.is_none() {
            first_clean = Some(Decoded {
                text: text.into_owned(),
                encoding,
                clean: true,
            });
        }
    }

    if let Some(decoded) = first_clean {
        debug!(encoding = decoded.encoding.name(), "decoded without expected header tokens");
        return decoded;
    }

    let encoding = candidates.first().copied().unwrap_or(BIG5);
    warn!(encoding = encoding.name(), "no candidate decoded cleanly, replacing malformed bytes");
    let (text, _) = encoding.decode_without_bom_handling(bytes);
    Decoded {
        text: text.into_owned(),
        encoding,
        clean: false,
    }
}
