//! Audio properties and embedded image descriptors.

use std::time::Duration;

use tagbridge_core::FixedStruct;

/// Number of leading scalar fields in the guest's properties struct.
pub(crate) const PROPERTY_FIELDS: usize = 4;

/// Picture type of the image most players show.
pub const FRONT_COVER: &str = "Front Cover";

/// Audio properties of a file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    /// Duration of the audio, millisecond precision.
    pub length: Duration,
    /// Number of audio channels.
    pub channels: u32,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Bitrate in kbit/s.
    pub bitrate: u32,
    /// Embedded images, in the order the guest indexes them.
    pub images: Vec<ImageDesc>,
}

impl Properties {
    /// Whether the file has at least one embedded image.
    pub fn has_image(&self) -> bool {
        !self.images.is_empty()
    }

    pub(crate) fn from_struct(raw: FixedStruct) -> Self {
        let field = |i: usize| raw.fields.get(i).copied().unwrap_or_default();
        Self {
            length: Duration::from_millis(u64::from(field(0))),
            channels: field(1),
            sample_rate: field(2),
            bitrate: field(3),
            images: raw.trailing.iter().map(|row| ImageDesc::from_row(row)).collect(),
        }
    }
}

/// Metadata of one embedded image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageDesc {
    /// Picture type, e.g. "Front Cover".
    pub picture_type: String,
    pub description: String,
    /// MIME type. Empty means "detect from the data" when writing.
    pub mime_type: String,
}

impl ImageDesc {
    /// A front cover with the MIME type left to detection.
    pub fn front_cover() -> Self {
        Self {
            picture_type: FRONT_COVER.to_string(),
            ..Self::default()
        }
    }

    /// Parse a `TYPE\tDESCRIPTION\tMIME` row. Missing columns are empty.
    pub(crate) fn from_row(row: &str) -> Self {
        let mut columns = row.splitn(3, '\t');
        let mut next = || columns.next().unwrap_or_default().to_string();
        Self {
            picture_type: next(),
            description: next(),
            mime_type: next(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_struct() {
        let props = Properties::from_struct(FixedStruct {
            fields: vec![1000, 2, 44100, 128],
            trailing: Vec::new(),
        });

        assert_eq!(props.length, Duration::from_secs(1));
        assert_eq!(props.channels, 2);
        assert_eq!(props.sample_rate, 44100);
        assert_eq!(props.bitrate, 128);
        assert!(!props.has_image());
    }

    #[test]
    fn test_image_rows() {
        let props = Properties::from_struct(FixedStruct {
            fields: vec![0, 0, 0, 0],
            trailing: vec![
                "Front Cover\tcover art\timage/jpeg".to_string(),
                "Back Cover".to_string(),
            ],
        });

        assert!(props.has_image());
        assert_eq!(
            props.images[0],
            ImageDesc {
                picture_type: "Front Cover".into(),
                description: "cover art".into(),
                mime_type: "image/jpeg".into(),
            }
        );
        assert_eq!(props.images[1].picture_type, "Back Cover");
        assert_eq!(props.images[1].mime_type, "");
    }

    #[test]
    fn test_front_cover_default() {
        let desc = ImageDesc::front_cover();
        assert_eq!(desc.picture_type, FRONT_COVER);
        assert!(desc.mime_type.is_empty());
    }
}
