//! Artifact documents: master playlist, preview index and `meta.json`.

use serde::{Deserialize, Serialize};

use hlsq_models::{JobId, ProfileList};

/// Playlist each rendition is encoded into.
pub const RENDITION_PLAYLIST: &str = "index.m3u8";

/// Storage key of the master playlist.
pub fn master_key(id: &JobId) -> String {
    format!("{}/master.m3u8", id)
}

/// Storage key of the completion marker.
pub fn meta_key(id: &JobId) -> String {
    format!("{}/meta.json", id)
}

/// Storage key prefix of one rendition.
pub fn rendition_prefix(id: &JobId, label: &str) -> String {
    format!("{}/{}", id, label)
}

/// Storage key of an image artifact.
pub fn image_key(id: &JobId, name: &str) -> String {
    format!("{}/imgs/{}", id, name)
}

/// Master playlist referencing every rendition, in profile order.
pub fn master_playlist(profiles: &ProfileList) -> String {
    let mut playlist = String::from("#EXTM3U\n#EXT-X-VERSION:7\n#EXT-X-INDEPENDENT-SEGMENTS\n");
    for profile in profiles.iter() {
        playlist.push_str(&format!(
            "#EXT-X-STREAM-INF:BANDWIDTH={},RESOLUTION={}\n{}/{}\n",
            profile.bandwidth(),
            profile.resolution(),
            profile.label,
            RENDITION_PLAYLIST,
        ));
    }
    playlist
}

/// Width of one preview tile.
pub const PREVIEW_TILE_WIDTH: u32 = 160;
/// Height of one preview tile.
pub const PREVIEW_TILE_HEIGHT: u32 = 90;
/// Tiles per preview sheet.
pub const PREVIEW_TILES_PER_SHEET: u32 = 25;
/// Seconds of video between tiles.
pub const PREVIEW_TILE_INTERVAL_SECS: u32 = 5;

/// One preview sprite sheet (`imgs/prev-{id}.jpg`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PreviewSheet {
    pub id: u32,
    pub w: u32,
    pub h: u32,
    pub amount: u32,
    pub tile_interval: u32,
}

impl PreviewSheet {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            w: PREVIEW_TILE_WIDTH,
            h: PREVIEW_TILE_HEIGHT,
            amount: PREVIEW_TILES_PER_SHEET,
            tile_interval: PREVIEW_TILE_INTERVAL_SECS,
        }
    }

    /// Sheet index from a file name like `prev-3.jpg`.
    pub fn parse_file_name(name: &str) -> Option<u32> {
        name.strip_prefix("prev-")?.strip_suffix(".jpg")?.parse().ok()
    }

    pub fn file_name(&self) -> String {
        format!("prev-{}.jpg", self.id)
    }
}

/// Completion marker written after every other artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoMeta {
    pub id: String,
    pub sizes: Vec<String>,
    pub file: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_master_playlist() {
        let profiles = ProfileList::parse("720p,480p").unwrap();
        let playlist = master_playlist(&profiles);
        let lines: Vec<&str> = playlist.lines().collect();

        assert_eq!(lines[0], "#EXTM3U");
        assert_eq!(
            lines[3],
            "#EXT-X-STREAM-INF:BANDWIDTH=2628000,RESOLUTION=1280x720"
        );
        assert_eq!(lines[4], "720p/index.m3u8");
        assert_eq!(lines[5], "#EXT-X-STREAM-INF:BANDWIDTH=1296000,RESOLUTION=854x480");
        assert_eq!(lines[6], "480p/index.m3u8");
    }

    #[test]
    fn test_preview_sheet_wire_format() {
        let json = serde_json::to_value(PreviewSheet::new(2)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"Id": 2, "W": 160, "H": 90, "Amount": 25, "TileInterval": 5})
        );
    }

    #[test]
    fn test_parse_sheet_file_name() {
        assert_eq!(PreviewSheet::parse_file_name("prev-0.jpg"), Some(0));
        assert_eq!(PreviewSheet::parse_file_name("prev-12.jpg"), Some(12));
        assert_eq!(PreviewSheet::parse_file_name("thumbnail.jpg"), None);
        assert_eq!(PreviewSheet::parse_file_name("prev-x.jpg"), None);
    }
}
