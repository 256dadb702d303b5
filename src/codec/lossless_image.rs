// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

// The `lossless-image` codec: treats each z-slice of a block as a 2-D
// image, for blocks whose dtype is 8- or 16-bit integer. Backed by the
// `png` crate, a real, widely-used crate already vendored in the pack
// (examples/vsrinivas-fuchsia/third_party/rust_crates/vendor/png).

use super::{BlockShape, Codec};
use crate::dtype::DType;
use png::{BitDepth, ColorType, Decoder, Encoder};
use std::io::Cursor;

/// Each of a block's `bz` z-slices is encoded as an independent greyscale
/// PNG (8- or 16-bit), and the per-slice PNG byte streams are concatenated
/// with a 4-byte little-endian length prefix so slices can be split apart
/// again on decode without re-parsing the whole block.
pub struct LosslessImageCodec;

impl Codec for LosslessImageCodec {
    fn name(&self) -> &'static str {
        "lossless-image"
    }

    fn encode(&self, raw: &[u8], shape: BlockShape, _params: &[u8]) -> crate::Result<Vec<u8>> {
        if !shape.dtype.is_image_compatible() {
            return Err(crate::Error::DtypeMismatch);
        }
        if raw.len() != shape.nominal_bytes() {
            return Err(crate::Error::ShapeMismatch {
                expected: shape.nominal_bytes(),
                got: raw.len(),
            });
        }

        let depth = match shape.dtype {
            DType::U8 => BitDepth::Eight,
            DType::U16 => BitDepth::Sixteen,
            _ => unreachable!("is_image_compatible guards this"),
        };
        let slice_voxels = usize::try_from(shape.by).unwrap() * usize::try_from(shape.bx).unwrap();
        let slice_bytes = slice_voxels * shape.dtype.byte_width();

        let mut out = Vec::new();
        for z in 0..usize::try_from(shape.bz).unwrap() {
            let slice = &raw[z * slice_bytes..(z + 1) * slice_bytes];
            let png_bytes = encode_slice_png(slice, shape.bx, shape.by, depth)?;

            #[allow(clippy::cast_possible_truncation)]
            let len = png_bytes.len() as u32;
            out.extend_from_slice(&len.to_le_bytes());
            out.extend_from_slice(&png_bytes);
        }

        Ok(out)
    }

    fn decode(&self, bytes: &[u8], shape: BlockShape, _params: &[u8]) -> crate::Result<Vec<u8>> {
        if !shape.dtype.is_image_compatible() {
            return Err(crate::Error::DtypeMismatch);
        }

        let mut raw = Vec::with_capacity(shape.nominal_bytes());
        let mut cursor = 0usize;

        for _ in 0..shape.bz {
            let len_bytes: [u8; 4] = bytes
                .get(cursor..cursor + 4)
                .ok_or_else(|| crate::Error::CodecFailure("truncated slice length".into()))?
                .try_into()
                .expect("slice is exactly 4 bytes");
            let len = u32::from_le_bytes(len_bytes) as usize;
            cursor += 4;

            let slice_png = bytes
                .get(cursor..cursor + len)
                .ok_or_else(|| crate::Error::CodecFailure("truncated slice payload".into()))?;
            cursor += len;

            raw.extend(decode_slice_png(slice_png, shape.dtype)?);
        }

        if raw.len() != shape.nominal_bytes() {
            return Err(crate::Error::ShapeMismatch {
                expected: shape.nominal_bytes(),
                got: raw.len(),
            });
        }

        Ok(raw)
    }
}

fn encode_slice_png(slice: &[u8], width: u32, height: u32, depth: BitDepth) -> crate::Result<Vec<u8>> {
    let mut out = Vec::new();
    {
        let mut encoder = Encoder::new(&mut out, width, height);
        encoder.set_color(ColorType::Grayscale);
        encoder.set_depth(depth);
        let mut writer = encoder
            .write_header()
            .map_err(|e| crate::Error::CodecFailure(e.to_string()))?;

        // PNG's 16-bit samples are big-endian; our on-disk raw layout is
        // little-endian, so 16-bit slices need a byte swap.
        let payload = if depth == BitDepth::Sixteen {
            swap_u16_endianness(slice)
        } else {
            slice.to_vec()
        };

        writer
            .write_image_data(&payload)
            .map_err(|e| crate::Error::CodecFailure(e.to_string()))?;
    }
    Ok(out)
}

fn decode_slice_png(png_bytes: &[u8], dtype: DType) -> crate::Result<Vec<u8>> {
    let decoder = Decoder::new(Cursor::new(png_bytes));
    let mut reader = decoder
        .read_info()
        .map_err(|e| crate::Error::CodecFailure(e.to_string()))?;
    let mut buf = vec![0u8; reader.output_buffer_size()];
    let info = reader
        .next_frame(&mut buf)
        .map_err(|e| crate::Error::CodecFailure(e.to_string()))?;
    buf.truncate(info.buffer_size());

    Ok(match dtype {
        DType::U16 => swap_u16_endianness(&buf),
        _ => buf,
    })
}

fn swap_u16_endianness(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    for pair in bytes.chunks(2) {
        out.push(pair[1]);
        out.push(pair[0]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape_u8() -> BlockShape {
        BlockShape {
            bz: 2,
            by: 4,
            bx: 4,
            dtype: DType::U8,
        }
    }

    fn shape_u16() -> BlockShape {
        BlockShape {
            bz: 2,
            by: 4,
            bx: 4,
            dtype: DType::U16,
        }
    }

    #[test]
    fn round_trips_u8_block() {
        let shape = shape_u8();
        let raw: Vec<u8> = (0..shape.nominal_bytes()).map(|i| (i % 256) as u8).collect();
        let encoded = LosslessImageCodec.encode(&raw, shape, &[]).unwrap();
        let decoded = LosslessImageCodec.decode(&encoded, shape, &[]).unwrap();
        assert_eq!(decoded, raw);
    }

    #[test]
    fn round_trips_u16_block_preserving_endianness() {
        let shape = shape_u16();
        let mut raw = Vec::with_capacity(shape.nominal_bytes());
        for v in 0..(shape.nominal_bytes() / 2) as u16 {
            raw.extend_from_slice(&v.to_le_bytes());
        }
        let encoded = LosslessImageCodec.encode(&raw, shape, &[]).unwrap();
        let decoded = LosslessImageCodec.decode(&encoded, shape, &[]).unwrap();
        assert_eq!(decoded, raw);
    }

    #[test]
    fn rejects_non_image_dtype() {
        let shape = BlockShape {
            bz: 1,
            by: 1,
            bx: 1,
            dtype: DType::F32,
        };
        let err = LosslessImageCodec.encode(&[0; 4], shape, &[]).unwrap_err();
        assert!(matches!(err, crate::Error::DtypeMismatch));
    }
}
