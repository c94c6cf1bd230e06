//! Decoder for the typed property tree inside an image sub-stream.
//!
//! A frame starts with an object-type name and dispatches on it; compound
//! values (flag `0x09`) carry a byte length that the nested frame must
//! consume exactly. All positions here are relative to the image, with
//! `image_offset` locating the sub-stream inside the file for payloads
//! that are read later (canvas pixels, sound bytes).

use std::sync::Arc;
use thiserror::Error;

use crate::property::{Vector2D, WzCanvas, WzSound, WzSubProperty, WzValue};
use crate::{reader, WzNode, WzNodeArc, WzNodeName, WzObjectType, WzReader, WzSliceReader};

#[derive(Debug, Error)]
pub enum Error {
    #[error("unsupported object type {0:?} at position {1}")]
    UnsupportedObjectType(String, usize),

    #[error("unknown value flag {0:#04x} at position {1}")]
    UnknownValueFlag(u8, usize),

    #[error("object frame ended at {actual}, expected {expected}")]
    FrameEndMismatch { expected: usize, actual: usize },

    #[error("sound frame shorter than its declared payload")]
    TruncatedSoundFrame,

    #[error(transparent)]
    Sound(#[from] crate::property::WzSoundError),

    #[error("binary reading error: {0}")]
    Reader(#[from] reader::Error),
}

/// Decode one object frame into `parent`: its type tag, its value, and any
/// child entries. `end_of_block` is where the enclosing frame ends, in
/// image coordinates.
pub fn extract_object(
    org_reader: &Arc<WzReader>,
    reader: &WzSliceReader,
    image_offset: usize,
    end_of_block: usize,
    parent: &WzNodeArc,
) -> Result<(), Error> {
    let type_name = reader.read_object_type_name()?;

    match type_name.as_str() {
        "Property" => {
            reader.skip(2)?;
            let entries = reader.read_wz_int()?;
            for _ in 0..entries {
                extract_value(org_reader, reader, image_offset, parent)?;
            }
            parent.write().unwrap().object_type =
                WzObjectType::Property(WzSubProperty::Property);
        }
        "Shape2D#Vector2D" => {
            let x = reader.read_wz_int()?;
            let y = reader.read_wz_int()?;
            parent.write().unwrap().object_type = Vector2D(x, y).into();
        }
        "Canvas" => {
            reader.skip(1)?;
            let has_children = reader.read_u8()?;
            if has_children == 0x01 {
                reader.skip(2)?;
                let entries = reader.read_wz_int()?;
                for _ in 0..entries {
                    extract_value(org_reader, reader, image_offset, parent)?;
                }
            }

            let width = reader.read_wz_int()?.max(0) as u32;
            let height = reader.read_wz_int()?.max(0) as u32;
            let mut form = reader.read_wz_int()?;
            form += reader.read_u8()? as i32;
            reader.skip(4)?;
            let data_length = reader.read_i32()?.max(0) as usize;

            let payload_offset = image_offset + reader.pos.get();
            let canvas = WzCanvas::new(
                org_reader,
                width,
                height,
                data_length,
                form,
                payload_offset,
            );
            parent.write().unwrap().object_type = canvas.into();

            reader.skip(data_length)?;
        }
        "Shape2D#Convex2D" => {
            let entries = reader.read_wz_int()?;
            let mut points = Vec::with_capacity(entries.max(0) as usize);
            for _ in 0..entries {
                let scratch = WzNode::from_str("", WzValue::Null, None).into_lock();
                extract_object(org_reader, reader, image_offset, end_of_block, &scratch)?;

                let read = scratch.read().unwrap();
                if let WzObjectType::Value(WzValue::Vector(point)) = read.object_type {
                    points.push(point);
                }
            }
            parent.write().unwrap().object_type = points.into();
        }
        "UOL" => {
            reader.skip(1)?;
            let path = reader.read_image_string()?;
            parent.write().unwrap().object_type = WzObjectType::Value(WzValue::Uol(path));
        }
        "Sound_DX8" => {
            reader.skip(1)?;
            let data_length = reader.read_wz_int()?.max(0) as usize;
            let duration = reader.read_wz_int()?.max(0) as u32;

            let header_offset = reader.pos.get();
            let data_offset = end_of_block
                .checked_sub(data_length)
                .filter(|&offset| offset >= header_offset)
                .ok_or(Error::TruncatedSoundFrame)?;

            let sound = WzSound::from_frame(
                org_reader,
                image_offset + data_offset,
                data_length,
                duration,
                image_offset + header_offset,
                data_offset - header_offset,
            )?;
            parent.write().unwrap().object_type = sound.into();

            reader.seek(end_of_block)?;
        }
        _ => {
            return Err(Error::UnsupportedObjectType(
                type_name,
                reader.pos.get(),
            ));
        }
    }

    Ok(())
}

/// Decode one named value entry of a property list and attach it to
/// `parent`.
pub fn extract_value(
    org_reader: &Arc<WzReader>,
    reader: &WzSliceReader,
    image_offset: usize,
    parent: &WzNodeArc,
) -> Result<(), Error> {
    let name: WzNodeName = reader.read_image_string()?.into();
    let flag = reader.read_u8()?;

    let child: WzNodeArc = match flag {
        0x00 => WzNode::new(&name, WzValue::Null, Some(parent)).into_lock(),
        0x02 | 0x0B => WzNode::new(&name, reader.read_i16()?, Some(parent)).into_lock(),
        0x03 | 0x13 => WzNode::new(&name, reader.read_wz_int()?, Some(parent)).into_lock(),
        0x14 => WzNode::new(&name, reader.read_wz_int64()?, Some(parent)).into_lock(),
        0x04 => WzNode::new(&name, reader.read_wz_single()?, Some(parent)).into_lock(),
        0x05 => WzNode::new(&name, reader.read_double()?, Some(parent)).into_lock(),
        0x08 => WzNode::new(&name, reader.read_image_string()?, Some(parent)).into_lock(),
        0x09 => {
            let block_len = reader.read_u32()? as usize;
            let end = reader.pos.get() + block_len;

            let child = WzNode::new(&name, WzValue::Null, Some(parent)).into_lock();
            extract_object(org_reader, reader, image_offset, end, &child)?;

            if reader.pos.get() != end {
                return Err(Error::FrameEndMismatch {
                    expected: end,
                    actual: reader.pos.get(),
                });
            }
            child
        }
        _ => return Err(Error::UnknownValueFlag(flag, reader.pos.get())),
    };

    parent.write().unwrap().children.insert(name, child);
    Ok(())
}
