use serde::{Deserialize, Serialize};

pub const UNKNOWN_TITLE: &str = "Unknown Title";
pub const UNKNOWN_ARTIST: &str = "Unknown Artist";

const MAX_FILENAME_CHARS: usize = 200;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Mp3,
    M4a,
    Flac,
    Wav,
}

impl AudioFormat {
    pub fn extension(self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::M4a => "m4a",
            AudioFormat::Flac => "flac",
            AudioFormat::Wav => "wav",
        }
    }

    /// Lossless containers carry no meaningful bitrate.
    pub fn is_lossless(self) -> bool {
        matches!(self, AudioFormat::Flac | AudioFormat::Wav)
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
            "mp3" => Some(AudioFormat::Mp3),
            "m4a" | "mp4" => Some(AudioFormat::M4a),
            "flac" => Some(AudioFormat::Flac),
            "wav" => Some(AudioFormat::Wav),
            _ => None,
        }
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub genre: Option<String>,
    pub year: Option<i32>,
    /// Whole seconds.
    pub duration: u32,
    pub track_number: Option<u32>,
    pub disc_number: Option<u32>,
    /// kbps; always `None` for lossless formats.
    pub bitrate: Option<u32>,
    pub sample_rate: Option<u32>,
    pub format: AudioFormat,
    pub artwork_url: Option<String>,
    #[serde(skip)]
    pub artwork_bytes: Option<Vec<u8>>,
}

impl TrackMetadata {
    pub fn new(format: AudioFormat) -> Self {
        Self {
            title: None,
            artist: None,
            album: None,
            album_artist: None,
            genre: None,
            year: None,
            duration: 0,
            track_number: None,
            disc_number: None,
            bitrate: None,
            sample_rate: None,
            format,
            artwork_url: None,
            artwork_bytes: None,
        }
    }

    pub fn title_or_placeholder(&self) -> &str {
        non_empty(self.title.as_deref()).unwrap_or(UNKNOWN_TITLE)
    }

    pub fn artist_or_placeholder(&self) -> &str {
        non_empty(self.artist.as_deref()).unwrap_or(UNKNOWN_ARTIST)
    }

    /// `"{artist} - {title}.{ext}"`, made safe for a storage path.
    pub fn upload_filename(&self) -> String {
        let stem = format!(
            "{} - {}",
            self.artist_or_placeholder(),
            self.title_or_placeholder()
        );
        let stem = sanitize_filename(&stem);
        format!("{}.{}", stem, self.format.extension())
    }
}

/// Staged audio ready to be uploaded. Lives for one request only.
#[derive(Clone, Debug)]
pub struct DownloadResult {
    pub audio_bytes: Vec<u8>,
    pub filename: String,
    pub metadata: TrackMetadata,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UploadResult {
    pub item_id: String,
    pub path: String,
    pub thumbnail_url: Option<String>,
    /// Size reported by the storage provider, not the local buffer length.
    pub file_size: u64,
}

/// Payload sent to the registry backend, once per successful import.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackRecord {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub genre: Option<String>,
    pub year: Option<i32>,
    pub duration: u32,
    pub track_number: Option<u32>,
    pub disc_number: Option<u32>,
    pub file_size: u64,
    pub bitrate: Option<u32>,
    pub sample_rate: Option<u32>,
    pub format: AudioFormat,
    pub onedrive_item_id: String,
    pub onedrive_path: String,
    pub artwork_url: Option<String>,
}

impl TrackRecord {
    pub fn assemble(id: String, metadata: &TrackMetadata, upload: &UploadResult) -> Self {
        Self {
            id,
            title: metadata.title_or_placeholder().to_string(),
            artist: metadata.artist_or_placeholder().to_string(),
            album: metadata.album.clone(),
            album_artist: metadata.album_artist.clone(),
            genre: metadata.genre.clone(),
            year: metadata.year,
            duration: metadata.duration,
            track_number: metadata.track_number,
            disc_number: metadata.disc_number,
            file_size: upload.file_size,
            bitrate: metadata.bitrate,
            sample_rate: metadata.sample_rate,
            format: metadata.format,
            onedrive_item_id: upload.item_id.clone(),
            onedrive_path: upload.path.clone(),
            artwork_url: metadata
                .artwork_url
                .clone()
                .or_else(|| upload.thumbnail_url.clone()),
        }
    }
}

pub fn sanitize_filename(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_space = false;
    for ch in input.chars() {
        if matches!(ch, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*') {
            continue;
        }
        if ch.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        out.push(ch);
    }
    out.chars().take(MAX_FILENAME_CHARS).collect()
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_reserved_characters() {
        assert_eq!(sanitize_filename("AC/DC: Back?In*Black"), "ACDC BackInBlack");
        assert_eq!(sanitize_filename("  a \t  b  "), "a b");
    }

    #[test]
    fn sanitize_truncates_long_names() {
        let long = "x".repeat(500);
        assert_eq!(sanitize_filename(&long).chars().count(), 200);
    }

    #[test]
    fn upload_filename_uses_placeholders() {
        let mut metadata = TrackMetadata::new(AudioFormat::Flac);
        assert_eq!(metadata.upload_filename(), "Unknown Artist - Unknown Title.flac");
        metadata.title = Some("Song A".to_string());
        metadata.artist = Some("Artist B".to_string());
        assert_eq!(metadata.upload_filename(), "Artist B - Song A.flac");
    }

    #[test]
    fn record_replaces_missing_title_and_artist() {
        let mut metadata = TrackMetadata::new(AudioFormat::Mp3);
        metadata.title = Some("  ".to_string());
        metadata.album = Some("Album C".to_string());
        let upload = UploadResult {
            item_id: "item".to_string(),
            path: "/drive/root:/Music/x.mp3".to_string(),
            thumbnail_url: None,
            file_size: 42,
        };
        let record = TrackRecord::assemble("id-1".to_string(), &metadata, &upload);
        assert_eq!(record.title, UNKNOWN_TITLE);
        assert_eq!(record.artist, UNKNOWN_ARTIST);
        assert_eq!(record.album.as_deref(), Some("Album C"));
        assert_eq!(record.file_size, 42);
        assert_eq!(record.onedrive_item_id, "item");
        assert_eq!(record.artwork_url, None);
    }

    #[test]
    fn record_falls_back_to_storage_thumbnail() {
        let mut metadata = TrackMetadata::new(AudioFormat::Mp3);
        let upload = UploadResult {
            item_id: "item".to_string(),
            path: "/Music/x.mp3".to_string(),
            thumbnail_url: Some("https://thumbs/large".to_string()),
            file_size: 1,
        };
        let record = TrackRecord::assemble("a".to_string(), &metadata, &upload);
        assert_eq!(record.artwork_url.as_deref(), Some("https://thumbs/large"));

        metadata.artwork_url = Some("https://catalog/cover.jpg".to_string());
        let record = TrackRecord::assemble("b".to_string(), &metadata, &upload);
        assert_eq!(record.artwork_url.as_deref(), Some("https://catalog/cover.jpg"));
    }

    #[test]
    fn format_extensions() {
        assert_eq!(AudioFormat::M4a.to_string(), "m4a");
        assert_eq!(AudioFormat::from_extension(".FLAC"), Some(AudioFormat::Flac));
        assert_eq!(AudioFormat::from_extension("ogg"), None);
        assert!(AudioFormat::Wav.is_lossless());
        assert!(!AudioFormat::Mp3.is_lossless());
    }
}
