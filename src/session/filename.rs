//! Output file names that are valid on Windows, the most restrictive target.

use unicode_normalization::UnicodeNormalization as _;

/// UTF-8 byte budget of a stem. Leaves room for the extension within the
/// 255-byte limit of ext4 and APFS; a stem this long is also at most 200
/// UTF-16 units, well inside the Windows limit.
pub const MAX_STEM_BYTES: usize = 200;

const INVALID_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Makes `name` usable as a file stem.
///
/// The result is NFC-normalized, has no reserved characters or control
/// characters, does not end in a dot or space, is not a reserved device name
/// and is never empty.
pub fn sanitize_file_stem(name: &str) -> String {
    let replaced: String = name
        .nfc()
        .map(|c| {
            if c.is_control() || INVALID_CHARS.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect();

    let mut stem = fit(replaced.trim_start_matches(' '), MAX_STEM_BYTES).to_owned();
    if stem.is_empty() {
        return "_".to_owned();
    }

    let device = stem.split('.').next().unwrap_or_default();
    let device_len = device.len();
    if RESERVED_NAMES
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(device))
    {
        stem.insert(device_len, '_');
        stem = fit(&stem, MAX_STEM_BYTES).to_owned();
    }
    stem
}

/// Appends `suffix` to an already sanitized `stem`, shortening the stem so
/// the result stays within [`MAX_STEM_BYTES`] and sanitizes to itself.
pub fn stem_with_suffix(stem: &str, suffix: &str) -> String {
    let budget = MAX_STEM_BYTES.saturating_sub(suffix.len());
    format!("{}{suffix}", truncate_at_char_boundary(stem, budget))
}

/// Longest prefix of `text` within `max_bytes`, without trailing dots or spaces.
fn fit(text: &str, max_bytes: usize) -> &str {
    truncate_at_char_boundary(text, max_bytes).trim_end_matches(['.', ' '])
}

fn truncate_at_char_boundary(text: &str, max_bytes: usize) -> &str {
    let end = text
        .char_indices()
        .map(|(idx, c)| idx + c.len_utf8())
        .take_while(|&end| end <= max_bytes)
        .last()
        .unwrap_or(0);
    text.get(..end).unwrap_or_default()
}
