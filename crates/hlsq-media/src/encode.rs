//! FFmpeg invocations for one rendition and the image artifacts.

use std::path::Path;

use hlsq_models::ResolutionProfile;

use crate::command::{FfmpegCommand, NULL_OUTPUT};
use crate::manifest::{
    PREVIEW_TILES_PER_SHEET, PREVIEW_TILE_HEIGHT, PREVIEW_TILE_INTERVAL_SECS, PREVIEW_TILE_WIDTH,
    RENDITION_PLAYLIST,
};

/// Segment length in seconds.
pub const HLS_SEGMENT_SECS: u32 = 4;

/// File name prefix of two-pass statistics files; never uploaded.
pub const PASS_LOG_PREFIX: &str = "logfile";

fn scale_filter(profile: &ResolutionProfile) -> String {
    format!(
        "scale=w={}:h={}:force_original_aspect_ratio=decrease:force_divisible_by=2",
        profile.width, profile.height
    )
}

fn base(input: &Path, output: impl AsRef<Path>, profile: &ResolutionProfile, hwaccel: Option<&str>) -> FfmpegCommand {
    FfmpegCommand::new(input, output)
        .hwaccel(hwaccel)
        .video_codec("libx264")
        .preset("slow")
        .video_bitrate(profile.video_bitrate_kbps, profile.bufsize_kbps)
        .video_filter(scale_filter(profile))
}

/// Analysis pass: video only, output discarded, statistics kept in `out_dir`.
pub fn first_pass(input: &Path, out_dir: &Path, profile: &ResolutionProfile, hwaccel: Option<&str>) -> FfmpegCommand {
    base(input, NULL_OUTPUT, profile, hwaccel)
        .no_audio()
        .pass(1, out_dir.join(PASS_LOG_PREFIX))
        .format("mp4")
}

/// Final pass: fMP4 HLS rendition written into `out_dir`.
pub fn second_pass(input: &Path, out_dir: &Path, profile: &ResolutionProfile, hwaccel: Option<&str>) -> FfmpegCommand {
    base(input, out_dir.join(RENDITION_PLAYLIST), profile, hwaccel)
        .audio_codec("aac")
        .audio_bitrate(profile.audio_bitrate_kbps)
        .output_args([
            "-hls_time".to_string(),
            HLS_SEGMENT_SECS.to_string(),
            "-hls_playlist_type".to_string(),
            "vod".to_string(),
            "-hls_segment_type".to_string(),
            "fmp4".to_string(),
            "-hls_fmp4_init_filename".to_string(),
            "init.mp4".to_string(),
            "-hls_segment_filename".to_string(),
            out_dir.join("seg_%03d.m4s").to_string_lossy().to_string(),
        ])
        .pass(2, out_dir.join(PASS_LOG_PREFIX))
}

/// Representative frame scaled to 720p.
pub fn thumbnail(input: &Path, output: &Path) -> FfmpegCommand {
    FfmpegCommand::new(input, output)
        .video_filter("thumbnail,scale=1280:720")
        .single_frame()
}

/// Horizontal sprite sheets, one tile every few seconds, written as
/// `prev-%d.jpg` in `out_dir`.
pub fn preview_sheets(input: &Path, out_dir: &Path) -> FfmpegCommand {
    FfmpegCommand::new(input, out_dir.join("prev-%d.jpg"))
        .video_filter(format!(
            "scale={}:{},fps=1/{},tile={}x1",
            PREVIEW_TILE_WIDTH, PREVIEW_TILE_HEIGHT, PREVIEW_TILE_INTERVAL_SECS, PREVIEW_TILES_PER_SHEET
        ))
        .output_arg("-start_number")
        .output_arg("0")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_pair(args: &[String], flag: &str, value: &str) -> bool {
        args.windows(2).any(|w| w[0] == flag && w[1] == value)
    }

    #[test]
    fn test_first_pass_discards_output() {
        let profile = ResolutionProfile::find("720p").unwrap();
        let args = first_pass(Path::new("in"), Path::new("/w/720p"), profile, None).build_args();

        assert!(args.contains(&"-an".to_string()));
        assert!(has_pair(&args, "-pass", "1"));
        assert!(has_pair(&args, "-passlogfile", "/w/720p/logfile"));
        assert!(has_pair(&args, "-f", "mp4"));
        assert_eq!(args.last().unwrap(), NULL_OUTPUT);
    }

    #[test]
    fn test_second_pass_writes_hls() {
        let profile = ResolutionProfile::find("480p").unwrap();
        let args = second_pass(Path::new("in"), Path::new("/w/480p"), profile, Some("cuda")).build_args();

        assert!(has_pair(&args, "-hwaccel", "cuda"));
        assert!(has_pair(&args, "-b:v", "1200k"));
        assert!(has_pair(&args, "-b:a", "96k"));
        assert!(has_pair(&args, "-hls_segment_type", "fmp4"));
        assert!(has_pair(&args, "-hls_segment_filename", "/w/480p/seg_%03d.m4s"));
        assert!(has_pair(&args, "-pass", "2"));
        assert!(has_pair(
            &args,
            "-vf",
            "scale=w=854:h=480:force_original_aspect_ratio=decrease:force_divisible_by=2"
        ));
        assert_eq!(args.last().unwrap(), "/w/480p/index.m3u8");
    }

    #[test]
    fn test_preview_filter() {
        let args = preview_sheets(Path::new("in"), Path::new("/w/imgs")).build_args();
        assert!(has_pair(&args, "-vf", "scale=160:90,fps=1/5,tile=25x1"));
        assert_eq!(args.last().unwrap(), "/w/imgs/prev-%d.jpg");
    }
}
