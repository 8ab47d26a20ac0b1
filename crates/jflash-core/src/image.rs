//! Firmware image containers
//!
//! Two container formats are supported: Intel HEX (addresses embedded in
//! the records) and raw binary (flashed at an explicit base address,
//! defaulting to the STM32 flash base). Parsing happens entirely on the
//! host side, before any probe is opened, so a malformed image can never
//! leave a half-touched target behind.

use std::path::Path;

use crate::error::{Error, Result};

/// Flash base used for raw binary images when no base is given.
pub const DEFAULT_RAW_BASE: u32 = 0x0800_0000;

/// Supported firmware container formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    /// Intel HEX records.
    IntelHex,
    /// Raw binary at a fixed base address.
    Raw,
}

/// A contiguous run of bytes at a flash address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Flash address of the first byte.
    pub address: u32,
    /// The bytes to program.
    pub data: Vec<u8>,
}

/// An immutable firmware image, normalized to contiguous segments.
#[derive(Debug, Clone)]
pub struct FirmwareImage {
    format: ImageFormat,
    segments: Vec<Segment>,
}

impl FirmwareImage {
    /// Load an image from a file, picking the container format from the
    /// extension: `.hex`/`.ihex` are Intel HEX, `.bin` is raw binary at
    /// [`DEFAULT_RAW_BASE`]. Anything else is an [`Error::ImageFormat`].
    pub fn from_path(path: &Path) -> Result<Self> {
        let format = match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("hex") | Some("ihex") => ImageFormat::IntelHex,
            Some("bin") => ImageFormat::Raw,
            other => {
                return Err(Error::ImageFormat(format!(
                    "unsupported file extension {:?} (expected .hex, .ihex or .bin)",
                    other.unwrap_or("<none>")
                )))
            }
        };

        match format {
            ImageFormat::IntelHex => {
                let data = std::fs::read(path)?;
                Self::from_ihex_bytes(&data)
            }
            ImageFormat::Raw => {
                let data = std::fs::read(path)?;
                Ok(Self::from_raw(data, DEFAULT_RAW_BASE))
            }
        }
    }

    /// Parse raw file bytes as Intel HEX. A binary file misnamed `.hex`
    /// is a container error, not an I/O error.
    pub fn from_ihex_bytes(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|_| Error::ImageFormat("Intel HEX file is not UTF-8 text".into()))?;
        Self::from_ihex(text)
    }

    /// Parse Intel HEX text into an image.
    pub fn from_ihex(text: &str) -> Result<Self> {
        use ihex::Record;

        let mut segments: Vec<Segment> = Vec::new();
        // Upper 16 address bits from the last extended linear address
        // record, or the segment base from an extended segment address.
        let mut base: u32 = 0;

        for record in ihex::Reader::new(text) {
            let record =
                record.map_err(|e| Error::ImageFormat(format!("invalid Intel HEX: {e}")))?;
            match record {
                Record::Data { offset, value } => {
                    let address = base + offset as u32;
                    match segments.last_mut() {
                        // checked_add: a record ending at 0xFFFFFFFF must
                        // not wrap into a bogus merge (or a panic).
                        Some(last)
                            if last.address.checked_add(last.data.len() as u32)
                                == Some(address) =>
                        {
                            last.data.extend_from_slice(&value);
                        }
                        _ => segments.push(Segment {
                            address,
                            data: value,
                        }),
                    }
                }
                Record::ExtendedLinearAddress(upper) => {
                    base = (upper as u32) << 16;
                }
                Record::ExtendedSegmentAddress(segment) => {
                    base = (segment as u32) << 4;
                }
                Record::EndOfFile => break,
                // Entry point records carry no flash payload.
                Record::StartLinearAddress(_) | Record::StartSegmentAddress { .. } => {}
            }
        }

        if segments.is_empty() {
            return Err(Error::ImageFormat("Intel HEX file contains no data".into()));
        }

        Ok(FirmwareImage {
            format: ImageFormat::IntelHex,
            segments,
        })
    }

    /// Wrap raw bytes as a single segment at `base`.
    pub fn from_raw(data: Vec<u8>, base: u32) -> Self {
        FirmwareImage {
            format: ImageFormat::Raw,
            segments: vec![Segment {
                address: base,
                data,
            }],
        }
    }

    /// Container format of this image.
    pub fn format(&self) -> ImageFormat {
        self.format
    }

    /// The image content as contiguous, address-ordered segments.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Total payload size in bytes.
    pub fn total_len(&self) -> usize {
        self.segments.iter().map(|s| s.data.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Two data records at 0x0800_0000 (via an extended linear address),
    // back to back, then EOF.
    const SAMPLE_HEX: &str = "\
:020000040800F2
:0400000001020304F2
:0400040005060708DE
:00000001FF
";

    #[test]
    fn ihex_contiguous_records_merge() {
        let image = FirmwareImage::from_ihex(SAMPLE_HEX).unwrap();
        assert_eq!(image.format(), ImageFormat::IntelHex);
        assert_eq!(image.segments().len(), 1);
        assert_eq!(image.segments()[0].address, 0x0800_0000);
        assert_eq!(image.segments()[0].data, vec![1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(image.total_len(), 8);
    }

    #[test]
    fn ihex_split_segments() {
        let hex = "\
:020000040800F2
:0400000001020304F2
:020000040801F1
:02000000AABB99
:00000001FF
";
        let image = FirmwareImage::from_ihex(hex).unwrap();
        assert_eq!(image.segments().len(), 2);
        assert_eq!(image.segments()[0].address, 0x0800_0000);
        assert_eq!(image.segments()[1].address, 0x0801_0000);
        assert_eq!(image.segments()[1].data, vec![0xAA, 0xBB]);
    }

    #[test]
    fn ihex_record_at_address_space_end_does_not_wrap() {
        // One byte at 0xFFFFFFFF followed by a record at 0xFFFF0000: the
        // contiguity check must not wrap around instead of splitting.
        let hex = "\
:02000004FFFFFC
:01FFFF00AA57
:0100000011EE
:00000001FF
";
        let image = FirmwareImage::from_ihex(hex).unwrap();
        assert_eq!(image.segments().len(), 2);
        assert_eq!(image.segments()[0].address, 0xFFFF_FFFF);
        assert_eq!(image.segments()[0].data, vec![0xAA]);
        assert_eq!(image.segments()[1].address, 0xFFFF_0000);
        assert_eq!(image.segments()[1].data, vec![0x11]);
    }

    #[test]
    fn binary_content_in_hex_container_rejected() {
        let err = FirmwareImage::from_ihex_bytes(&[0x7F, b'E', b'L', b'F', 0xFF, 0xFE])
            .unwrap_err();
        assert!(matches!(err, Error::ImageFormat(_)));
    }

    #[test]
    fn ihex_bad_checksum_rejected() {
        let hex = ":0400000001020304FF\n:00000001FF\n";
        let err = FirmwareImage::from_ihex(hex).unwrap_err();
        assert!(matches!(err, Error::ImageFormat(_)));
    }

    #[test]
    fn ihex_empty_rejected() {
        let err = FirmwareImage::from_ihex(":00000001FF\n").unwrap_err();
        assert!(matches!(err, Error::ImageFormat(_)));
    }

    #[test]
    fn raw_uses_given_base() {
        let image = FirmwareImage::from_raw(vec![0xDE, 0xAD], 0x0800_4000);
        assert_eq!(image.format(), ImageFormat::Raw);
        assert_eq!(image.segments()[0].address, 0x0800_4000);
        assert_eq!(image.total_len(), 2);
    }

    #[test]
    fn unknown_extension_rejected() {
        let err = FirmwareImage::from_path(Path::new("firmware.elf")).unwrap_err();
        assert!(matches!(err, Error::ImageFormat(_)));
        let err = FirmwareImage::from_path(Path::new("firmware")).unwrap_err();
        assert!(matches!(err, Error::ImageFormat(_)));
    }
}
