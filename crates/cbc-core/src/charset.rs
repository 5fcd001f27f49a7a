//! Text to CBS page encoding.
//!
//! CBS user data is carried in pages of [`SMSCB_RAW_PAGE_LEN`] octets. GSM
//! 7-bit text (3GPP TS 23.038 6.2.1) fits 93 septets per page, UCS2 fits 41
//! characters. Short pages are padded with carriage returns, which handsets
//! strip.

use crate::message::{SMSCB_MAX_NUM_PAGES, SMSCB_RAW_PAGE_LEN};

/// Septets that fit into one packed page.
pub const GSM7_SEPTETS_PER_PAGE: usize = SMSCB_RAW_PAGE_LEN * 8 / 7;
pub const UCS2_CHARS_PER_PAGE: usize = SMSCB_RAW_PAGE_LEN / 2;

const GSM7_CR: u8 = 0x0d;
const GSM7_ESC: u8 = 0x1b;

/// GSM 03.38 default alphabet, indexed by septet. 0x1B is the escape to the
/// extension table and never matches a character.
const GSM7_DEFAULT: [char; 128] = [
    '@', '£', '$', '¥', 'è', 'é', 'ù', 'ì', 'ò', 'Ç', '\n', 'Ø', 'ø', '\r', 'Å', 'å', //
    'Δ', '_', 'Φ', 'Γ', 'Λ', 'Ω', 'Π', 'Ψ', 'Σ', 'Θ', 'Ξ', '\u{1b}', 'Æ', 'æ', 'ß', 'É', //
    ' ', '!', '"', '#', '¤', '%', '&', '\'', '(', ')', '*', '+', ',', '-', '.', '/', //
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', ':', ';', '<', '=', '>', '?', //
    '¡', 'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', //
    'P', 'Q', 'R', 'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z', 'Ä', 'Ö', 'Ñ', 'Ü', '§', //
    '¿', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o', //
    'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z', 'ä', 'ö', 'ñ', 'ü', 'à', //
];

/// Extension table entries reached through ESC.
const GSM7_EXTENSION: [(char, u8); 10] = [
    ('\u{0c}', 0x0a),
    ('^', 0x14),
    ('{', 0x28),
    ('}', 0x29),
    ('\\', 0x2f),
    ('[', 0x3c),
    ('~', 0x3d),
    (']', 0x3e),
    ('|', 0x40),
    ('€', 0x65),
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CharsetError {
    #[error("character {0:?} has no GSM 7-bit encoding")]
    NotInGsm7(char),
    #[error("character {0:?} is outside the basic multilingual plane")]
    NotInUcs2(char),
    #[error("text needs {0} pages, at most 15 allowed")]
    TooManyPages(usize),
}

/// One character in GSM 7-bit, either a single septet or an escape pair.
fn gsm7_units(c: char) -> Result<&'static [u8], CharsetError> {
    static SEPTETS: [u8; 128] = {
        let mut t = [0u8; 128];
        let mut i = 0;
        while i < 128 {
            t[i] = i as u8;
            i += 1;
        }
        t
    };
    static ESCAPED: [[u8; 2]; 10] = [
        [GSM7_ESC, 0x0a],
        [GSM7_ESC, 0x14],
        [GSM7_ESC, 0x28],
        [GSM7_ESC, 0x29],
        [GSM7_ESC, 0x2f],
        [GSM7_ESC, 0x3c],
        [GSM7_ESC, 0x3d],
        [GSM7_ESC, 0x3e],
        [GSM7_ESC, 0x40],
        [GSM7_ESC, 0x65],
    ];

    if let Some(idx) = GSM7_DEFAULT
        .iter()
        .enumerate()
        .position(|(i, &d)| i != GSM7_ESC as usize && d == c)
    {
        return Ok(&SEPTETS[idx..idx + 1]);
    }
    if let Some(idx) = GSM7_EXTENSION.iter().position(|&(e, _)| e == c) {
        return Ok(&ESCAPED[idx]);
    }
    Err(CharsetError::NotInGsm7(c))
}

/// Pack septets LSB-first into octets.
pub fn pack_septets(septets: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity((septets.len() * 7).div_ceil(8));
    let mut acc: u32 = 0;
    let mut bits = 0;
    for &s in septets {
        acc |= ((s & 0x7f) as u32) << bits;
        bits += 7;
        while bits >= 8 {
            out.push(acc as u8);
            acc >>= 8;
            bits -= 8;
        }
    }
    if bits > 0 {
        out.push(acc as u8);
    }
    out
}

/// Inverse of [`pack_septets`]; `count` septets are read.
#[cfg(test)]
fn unpack_septets(packed: &[u8], count: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(count);
    let mut acc: u32 = 0;
    let mut bits = 0;
    let mut bytes = packed.iter();
    while out.len() < count {
        if bits < 7 {
            match bytes.next() {
                Some(&b) => {
                    acc |= (b as u32) << bits;
                    bits += 8;
                }
                None => break,
            }
        }
        out.push((acc & 0x7f) as u8);
        acc >>= 7;
        bits -= 7;
    }
    out
}

/// Encode UTF-8 text as CR-padded GSM 7-bit pages. Escape pairs never
/// straddle a page boundary.
pub fn encode_gsm7_pages(text: &str) -> Result<Vec<Vec<u8>>, CharsetError> {
    let mut pages: Vec<Vec<u8>> = Vec::new();
    let mut current: Vec<u8> = Vec::with_capacity(GSM7_SEPTETS_PER_PAGE);
    for c in text.chars() {
        let units = gsm7_units(c)?;
        if current.len() + units.len() > GSM7_SEPTETS_PER_PAGE {
            pages.push(std::mem::take(&mut current));
        }
        current.extend_from_slice(units);
    }
    if !current.is_empty() || pages.is_empty() {
        pages.push(current);
    }
    if pages.len() > SMSCB_MAX_NUM_PAGES {
        return Err(CharsetError::TooManyPages(pages.len()));
    }
    Ok(pages
        .into_iter()
        .map(|mut septets| {
            septets.resize(GSM7_SEPTETS_PER_PAGE, GSM7_CR);
            pack_septets(&septets)
        })
        .collect())
}

/// Encode UTF-8 text as big-endian UCS2 pages, padded with U+000D.
pub fn encode_ucs2_pages(text: &str) -> Result<Vec<Vec<u8>>, CharsetError> {
    let mut units = Vec::new();
    for c in text.chars() {
        let cp = c as u32;
        if cp > 0xffff {
            return Err(CharsetError::NotInUcs2(c));
        }
        units.push(cp as u16);
    }
    let num_pages = units.len().div_ceil(UCS2_CHARS_PER_PAGE).max(1);
    if num_pages > SMSCB_MAX_NUM_PAGES {
        return Err(CharsetError::TooManyPages(num_pages));
    }
    units.resize(num_pages * UCS2_CHARS_PER_PAGE, 0x000d);
    Ok(units
        .chunks(UCS2_CHARS_PER_PAGE)
        .map(|chunk| chunk.iter().flat_map(|u| u.to_be_bytes()).collect())
        .collect())
}

/// Split raw 8-bit user data into pages. The last page is not padded.
pub fn split_8bit_pages(data: &[u8]) -> Result<Vec<Vec<u8>>, CharsetError> {
    if data.is_empty() {
        return Ok(vec![Vec::new()]);
    }
    let pages: Vec<Vec<u8>> = data.chunks(SMSCB_RAW_PAGE_LEN).map(<[u8]>::to_vec).collect();
    if pages.len() > SMSCB_MAX_NUM_PAGES {
        return Err(CharsetError::TooManyPages(pages.len()));
    }
    Ok(pages)
}
