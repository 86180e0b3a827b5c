//! Stream filters: FlateDecode with PNG predictor support.
//!
//! The tagger only ever decodes content streams, xref streams and object
//! streams, all of which are Flate-compressed in practice. Image filters
//! (DCTDecode and friends) never need decoding here because image streams
//! are carried through untouched.

use crate::error::{Result, TexuaError};
use crate::pdf::objects::{PdfDictionary, PdfObject};
use flate2::read::{DeflateDecoder, ZlibDecoder};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// Decode a stream's data according to its dictionary.
///
/// Unfiltered streams are returned as-is. Unknown filters are an error so
/// callers can decide whether to skip the stream or fail.
pub fn decode_stream(data: &[u8], dict: &PdfDictionary) -> Result<Vec<u8>> {
    let filters = filter_names(dict);
    if filters.is_empty() {
        return Ok(data.to_vec());
    }

    let mut current = data.to_vec();
    for (index, filter) in filters.iter().enumerate() {
        current = match filter.as_str() {
            "FlateDecode" | "Fl" => {
                let inflated = inflate(&current)?;
                match decode_parms(dict, index) {
                    Some(parms) => apply_predictor(inflated, parms)?,
                    None => inflated,
                }
            }
            other => {
                return Err(TexuaError::CompressionError(format!(
                    "unsupported filter /{other}"
                )))
            }
        };
    }
    Ok(current)
}

/// Flate-compress data for a new stream.
pub fn flate_encode(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .and_then(|_| encoder.finish())
        .map_err(|err| TexuaError::CompressionError(err.to_string()))
}

fn inflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    match ZlibDecoder::new(data).read_to_end(&mut out) {
        Ok(_) => Ok(out),
        Err(_) => {
            // Some generators write raw deflate without the zlib header.
            let mut out = Vec::new();
            DeflateDecoder::new(data)
                .read_to_end(&mut out)
                .map_err(|err| TexuaError::CompressionError(err.to_string()))?;
            Ok(out)
        }
    }
}

fn filter_names(dict: &PdfDictionary) -> Vec<String> {
    match dict.get("Filter") {
        Some(PdfObject::Name(name)) => vec![name.as_str().to_string()],
        Some(PdfObject::Array(array)) => array
            .iter()
            .filter_map(|o| o.as_name().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

struct PredictorParms {
    predictor: i64,
    colors: i64,
    bits_per_component: i64,
    columns: i64,
}

fn decode_parms(dict: &PdfDictionary, index: usize) -> Option<PredictorParms> {
    let parms = match dict.get("DecodeParms").or_else(|| dict.get("DP")) {
        Some(PdfObject::Dictionary(d)) => d,
        Some(PdfObject::Array(array)) => match array.get(index) {
            Some(PdfObject::Dictionary(d)) => d,
            _ => return None,
        },
        _ => return None,
    };
    let predictor = parms.get("Predictor").and_then(PdfObject::as_integer)?;
    if predictor <= 1 {
        return None;
    }
    Some(PredictorParms {
        predictor,
        colors: parms
            .get("Colors")
            .and_then(PdfObject::as_integer)
            .unwrap_or(1),
        bits_per_component: parms
            .get("BitsPerComponent")
            .and_then(PdfObject::as_integer)
            .unwrap_or(8),
        columns: parms
            .get("Columns")
            .and_then(PdfObject::as_integer)
            .unwrap_or(1),
    })
}

/// Reverse PNG row predictors (predictor values 10..15).
fn apply_predictor(data: Vec<u8>, parms: PredictorParms) -> Result<Vec<u8>> {
    if parms.predictor < 10 {
        // TIFF predictor 2: not produced by the PDF generators we target.
        return Err(TexuaError::CompressionError(format!(
            "unsupported predictor {}",
            parms.predictor
        )));
    }

    let sample_bytes =
        ((parms.colors * parms.bits_per_component + 7) / 8).max(1) as usize;
    let row_len = ((parms.columns * parms.colors * parms.bits_per_component + 7) / 8) as usize;
    let stride = row_len + 1;
    if row_len == 0 || data.len() % stride != 0 {
        return Err(TexuaError::CompressionError(
            "predictor row length mismatch".to_string(),
        ));
    }

    let mut out = Vec::with_capacity(data.len() / stride * row_len);
    let mut previous = vec![0u8; row_len];

    for row in data.chunks(stride) {
        let filter = row[0];
        let mut current = row[1..].to_vec();
        match filter {
            0 => {}
            1 => {
                for i in sample_bytes..row_len {
                    current[i] = current[i].wrapping_add(current[i - sample_bytes]);
                }
            }
            2 => {
                for i in 0..row_len {
                    current[i] = current[i].wrapping_add(previous[i]);
                }
            }
            3 => {
                for i in 0..row_len {
                    let left = if i >= sample_bytes {
                        current[i - sample_bytes] as u16
                    } else {
                        0
                    };
                    let up = previous[i] as u16;
                    current[i] = current[i].wrapping_add(((left + up) / 2) as u8);
                }
            }
            4 => {
                for i in 0..row_len {
                    let left = if i >= sample_bytes {
                        current[i - sample_bytes] as i16
                    } else {
                        0
                    };
                    let up = previous[i] as i16;
                    let up_left = if i >= sample_bytes {
                        previous[i - sample_bytes] as i16
                    } else {
                        0
                    };
                    let p = left + up - up_left;
                    let pa = (p - left).abs();
                    let pb = (p - up).abs();
                    let pc = (p - up_left).abs();
                    let predicted = if pa <= pb && pa <= pc {
                        left
                    } else if pb <= pc {
                        up
                    } else {
                        up_left
                    };
                    current[i] = current[i].wrapping_add(predicted as u8);
                }
            }
            other => {
                return Err(TexuaError::CompressionError(format!(
                    "unknown PNG filter {other}"
                )))
            }
        }
        out.extend_from_slice(&current);
        previous = current;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flate_round_trip() {
        let data = b"BT (Hello) Tj ET".repeat(20);
        let compressed = flate_encode(&data).unwrap();
        assert!(compressed.len() < data.len());

        let mut dict = PdfDictionary::new();
        dict.insert("Filter", PdfObject::name("FlateDecode"));
        let decoded = decode_stream(&compressed, &dict).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_unfiltered_passthrough() {
        let dict = PdfDictionary::new();
        assert_eq!(decode_stream(b"raw", &dict).unwrap(), b"raw");
    }

    #[test]
    fn test_unknown_filter_errors() {
        let mut dict = PdfDictionary::new();
        dict.insert("Filter", PdfObject::name("DCTDecode"));
        assert!(decode_stream(b"\xFF\xD8", &dict).is_err());
    }

    #[test]
    fn test_png_up_predictor() {
        // Two rows of three bytes, PNG "Up" filter (2).
        let rows = [
            [2u8, 10, 20, 30], // first row: up = 0 → 10 20 30
            [2u8, 1, 1, 1],    // second row: 11 21 31
        ];
        let mut raw = Vec::new();
        for row in rows {
            raw.extend_from_slice(&row);
        }
        let compressed = flate_encode(&raw).unwrap();

        let mut dict = PdfDictionary::new();
        dict.insert("Filter", PdfObject::name("FlateDecode"));
        let mut parms = PdfDictionary::new();
        parms.insert("Predictor", PdfObject::Integer(12));
        parms.insert("Columns", PdfObject::Integer(3));
        dict.insert("DecodeParms", PdfObject::Dictionary(parms));

        let decoded = decode_stream(&compressed, &dict).unwrap();
        assert_eq!(decoded, vec![10, 20, 30, 11, 21, 31]);
    }
}
