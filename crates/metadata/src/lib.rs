use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;

use common::{AudioFormat, TrackMetadata};
use lofty::config::WriteOptions;
use lofty::error::LoftyError;
use lofty::picture::{MimeType, Picture, PictureType};
use lofty::prelude::{AudioFile, ItemKey, TagExt, TaggedFileExt};
use lofty::tag::{Tag, TagType};
use tracing::{debug, info, warn};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct TagInfo {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub genre: Option<String>,
    pub year: Option<i32>,
    pub track_no: Option<u32>,
    pub disc_no: Option<u32>,
    pub has_embedded_cover: bool,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AudioProperties {
    pub duration_secs: u32,
    pub bitrate: Option<u32>,
    pub sample_rate: Option<u32>,
}

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("tag error: {0}")]
    Lofty(#[from] LoftyError),
    #[error("no tag layout for {0} files")]
    UnsupportedFormat(AudioFormat),
    #[error("tag library panicked: {0}")]
    Panicked(String),
}

/// Logical fields written by [`embed`], in write order.
///
/// lofty translates each `ItemKey` into the container's native key
/// (`TIT2` for ID3v2, `©nam` for MP4, `TITLE` for Vorbis comments).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TagField {
    Title,
    Artist,
    Album,
    AlbumArtist,
    Year,
    TrackNumber,
    DiscNumber,
    Genre,
}

const TAG_FIELDS: [TagField; 8] = [
    TagField::Title,
    TagField::Artist,
    TagField::Album,
    TagField::AlbumArtist,
    TagField::Year,
    TagField::TrackNumber,
    TagField::DiscNumber,
    TagField::Genre,
];

impl TagField {
    fn item_key(self) -> ItemKey {
        match self {
            TagField::Title => ItemKey::TrackTitle,
            TagField::Artist => ItemKey::TrackArtist,
            TagField::Album => ItemKey::AlbumTitle,
            TagField::AlbumArtist => ItemKey::AlbumArtist,
            TagField::Year => ItemKey::RecordingDate,
            TagField::TrackNumber => ItemKey::TrackNumber,
            TagField::DiscNumber => ItemKey::DiscNumber,
            TagField::Genre => ItemKey::Genre,
        }
    }

    fn encode(self, metadata: &TrackMetadata) -> Option<String> {
        let value = match self {
            TagField::Title => metadata.title.clone(),
            TagField::Artist => metadata.artist.clone(),
            TagField::Album => metadata.album.clone(),
            TagField::AlbumArtist => metadata.album_artist.clone(),
            TagField::Year => metadata.year.map(|year| year.to_string()),
            TagField::TrackNumber => metadata.track_number.map(|n| n.to_string()),
            TagField::DiscNumber => metadata.disc_number.map(|n| n.to_string()),
            TagField::Genre => metadata.genre.clone(),
        }?;
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}

/// Tag container written for each format. WAV has none.
pub fn tag_type_for(format: AudioFormat) -> Option<TagType> {
    match format {
        AudioFormat::Mp3 => Some(TagType::Id3v2),
        AudioFormat::M4a => Some(TagType::Mp4Ilst),
        AudioFormat::Flac => Some(TagType::VorbisComments),
        AudioFormat::Wav => None,
    }
}

/// Overwrite the file's tags with `metadata`, then refresh the
/// container-derived fields (duration, bitrate, sample rate) from disk.
///
/// Never fails: a file that cannot be tagged is still a usable download.
pub fn embed(path: &Path, format: AudioFormat, metadata: &mut TrackMetadata) {
    metadata.format = format;
    match guarded(|| write_tags(path, format, metadata)) {
        Ok(()) => debug!("Embedded tags into {}", path.display()),
        Err(MetadataError::UnsupportedFormat(format)) => {
            info!("Skipping tag embedding for {} file {}", format, path.display());
        }
        Err(err) => warn!("Could not embed metadata into {}: {}", path.display(), err),
    }

    match guarded(|| read_properties(path, format)) {
        Ok(properties) => apply_properties(metadata, properties),
        Err(err) => warn!(
            "Could not read audio properties from {}: {}",
            path.display(),
            err
        ),
    }
}

/// lofty panics on some malformed containers (a FLAC whose STREAMINFO is the
/// last metadata block, for one) instead of returning an error.
fn guarded<T>(op: impl FnOnce() -> Result<T, MetadataError>) -> Result<T, MetadataError> {
    catch_unwind(AssertUnwindSafe(op))
        .unwrap_or_else(|payload| Err(MetadataError::Panicked(panic_message(payload.as_ref()))))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Clear every tag present in the file and write a fresh one built from
/// the field table.
pub fn write_tags(
    path: &Path,
    format: AudioFormat,
    metadata: &TrackMetadata,
) -> Result<(), MetadataError> {
    let tag_type = tag_type_for(format).ok_or(MetadataError::UnsupportedFormat(format))?;

    let tagged_file = lofty::read_from_path(path)?;
    for existing in tagged_file.tags() {
        existing.remove_from_path(path)?;
    }

    let tag = build_tag(tag_type, metadata);
    tag.save_to_path(path, WriteOptions::default())?;
    Ok(())
}

pub fn build_tag(tag_type: TagType, metadata: &TrackMetadata) -> Tag {
    let mut tag = Tag::new(tag_type);
    for field in TAG_FIELDS {
        if let Some(value) = field.encode(metadata) {
            tag.insert_text(field.item_key(), value);
        }
    }
    if let Some(bytes) = metadata.artwork_bytes.as_ref().filter(|b| !b.is_empty()) {
        tag.push_picture(Picture::new_unchecked(
            PictureType::CoverFront,
            Some(MimeType::Jpeg),
            Some("Cover".to_string()),
            bytes.clone(),
        ));
    }
    tag
}

pub fn read_properties(path: &Path, format: AudioFormat) -> Result<AudioProperties, MetadataError> {
    let tagged_file = lofty::read_from_path(path)?;
    let properties = tagged_file.properties();

    let duration_secs = properties.duration().as_secs().min(u64::from(u32::MAX)) as u32;
    let bitrate = if format.is_lossless() {
        None
    } else {
        properties
            .audio_bitrate()
            .or(properties.overall_bitrate())
            .filter(|kbps| *kbps > 0)
    };

    Ok(AudioProperties {
        duration_secs,
        bitrate,
        sample_rate: properties.sample_rate(),
    })
}

pub fn apply_properties(metadata: &mut TrackMetadata, properties: AudioProperties) {
    metadata.duration = properties.duration_secs;
    metadata.bitrate = properties.bitrate;
    metadata.sample_rate = properties.sample_rate;
}

pub fn read_tags(path: &Path) -> Result<TagInfo, MetadataError> {
    let tagged_file = lofty::read_from_path(path)?;
    Ok(tagged_file
        .primary_tag()
        .or_else(|| tagged_file.first_tag())
        .map(tag_info)
        .unwrap_or_default())
}

pub fn tag_info(tag: &Tag) -> TagInfo {
    TagInfo {
        title: text(tag, &ItemKey::TrackTitle),
        artist: text(tag, &ItemKey::TrackArtist),
        album: text(tag, &ItemKey::AlbumTitle),
        album_artist: text(tag, &ItemKey::AlbumArtist),
        genre: text(tag, &ItemKey::Genre),
        year: tag
            .get_string(&ItemKey::RecordingDate)
            .or_else(|| tag.get_string(&ItemKey::Year))
            .and_then(parse_year),
        track_no: tag.get_string(&ItemKey::TrackNumber).and_then(parse_number),
        disc_no: tag.get_string(&ItemKey::DiscNumber).and_then(parse_number),
        has_embedded_cover: !tag.pictures().is_empty(),
    }
}

/// Everything the file itself knows: tags plus container properties.
pub fn read_metadata(path: &Path, format: AudioFormat) -> Result<TrackMetadata, MetadataError> {
    let tags = read_tags(path)?;
    let mut metadata = TrackMetadata::new(format);
    metadata.title = tags.title;
    metadata.artist = tags.artist;
    metadata.album = tags.album;
    metadata.album_artist = tags.album_artist;
    metadata.genre = tags.genre;
    metadata.year = tags.year;
    metadata.track_number = tags.track_no;
    metadata.disc_number = tags.disc_no;
    apply_properties(&mut metadata, read_properties(path, format)?);
    Ok(metadata)
}

fn text(tag: &Tag, key: &ItemKey) -> Option<String> {
    let value = tag.get_string(key)?.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn parse_number(text: &str) -> Option<u32> {
    let head = text.split('/').next().unwrap_or(text).trim();
    head.parse().ok()
}

fn parse_year(text: &str) -> Option<i32> {
    let mut digits = String::new();
    for ch in text.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            if digits.len() == 4 {
                break;
            }
        } else if !digits.is_empty() {
            break;
        }
    }
    if digits.is_empty() {
        None
    } else {
        digits.parse().ok()
    }
}
