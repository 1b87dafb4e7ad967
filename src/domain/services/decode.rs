//! Lossless-or-hex byte string decoding

type Decoder = fn(&[u8]) -> Option<String>;

/// Decoders tried in order; the first success wins
const DECODERS: [Decoder; 4] = [decode_utf8, decode_utf16, decode_ascii, decode_latin1];

/// Decodes bytes found in evidence into text
///
/// Tries UTF-8, UTF-16 (BOM-aware, little-endian without BOM), ASCII and
/// Latin-1, then falls back to a lowercase hex dump. Never fails.
pub fn safe_decode(bytes: &[u8]) -> String {
    DECODERS
        .iter()
        .find_map(|decode| decode(bytes))
        .unwrap_or_else(|| hex::encode(bytes))
}

fn decode_utf8(bytes: &[u8]) -> Option<String> {
    std::str::from_utf8(bytes).ok().map(str::to_owned)
}

fn decode_utf16(bytes: &[u8]) -> Option<String> {
    if bytes.len() % 2 != 0 {
        return None;
    }
    let (body, big_endian) = match bytes {
        [0xFF, 0xFE, rest @ ..] => (rest, false),
        [0xFE, 0xFF, rest @ ..] => (rest, true),
        _ => (bytes, false),
    };
    let units = body.chunks_exact(2).map(|pair| {
        if big_endian {
            u16::from_be_bytes([pair[0], pair[1]])
        } else {
            u16::from_le_bytes([pair[0], pair[1]])
        }
    });
    char::decode_utf16(units).collect::<Result<String, _>>().ok()
}

fn decode_ascii(bytes: &[u8]) -> Option<String> {
    bytes
        .is_ascii()
        .then(|| bytes.iter().map(|&b| b as char).collect())
}

fn decode_latin1(bytes: &[u8]) -> Option<String> {
    Some(bytes.iter().map(|&b| b as char).collect())
}

/// Decodes UTF-16LE registry string data, dropping trailing NULs
pub fn decode_utf16le_lossy(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    let text = String::from_utf16_lossy(&units);
    text.trim_end_matches('\0').to_string()
}
