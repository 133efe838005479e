//! Resolution profile registry.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ValidationError, ValidationResult};

/// A target rendition for the HLS ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResolutionProfile {
    /// Label used by clients and in storage paths (e.g. "720p")
    pub label: &'static str,
    pub width: u32,
    pub height: u32,
    /// Target video bitrate in kbit/s
    pub video_bitrate_kbps: u32,
    /// Target audio bitrate in kbit/s
    pub audio_bitrate_kbps: u32,
    /// Rate-control buffer size in kbit
    pub bufsize_kbps: u32,
    pub crf: u8,
}

impl ResolutionProfile {
    /// Look up a profile by its label.
    pub fn find(label: &str) -> Option<&'static ResolutionProfile> {
        PROFILES.iter().find(|p| p.label == label)
    }

    /// Peak bandwidth advertised in the master playlist, in bit/s.
    pub fn bandwidth(&self) -> u64 {
        u64::from(self.video_bitrate_kbps + self.audio_bitrate_kbps) * 1000
    }

    /// Resolution as `WIDTHxHEIGHT`.
    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

impl fmt::Display for ResolutionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label)
    }
}

/// Known profiles, highest first.
pub static PROFILES: [ResolutionProfile; 8] = [
    ResolutionProfile {
        label: "2160p",
        width: 3840,
        height: 2160,
        video_bitrate_kbps: 12000,
        audio_bitrate_kbps: 192,
        bufsize_kbps: 18000,
        crf: 18,
    },
    ResolutionProfile {
        label: "1440p",
        width: 2560,
        height: 1440,
        video_bitrate_kbps: 8000,
        audio_bitrate_kbps: 160,
        bufsize_kbps: 12000,
        crf: 19,
    },
    ResolutionProfile {
        label: "1080p",
        width: 1920,
        height: 1080,
        video_bitrate_kbps: 5000,
        audio_bitrate_kbps: 160,
        bufsize_kbps: 8000,
        crf: 20,
    },
    ResolutionProfile {
        label: "720p",
        width: 1280,
        height: 720,
        video_bitrate_kbps: 2500,
        audio_bitrate_kbps: 128,
        bufsize_kbps: 4000,
        crf: 22,
    },
    ResolutionProfile {
        label: "480p",
        width: 854,
        height: 480,
        video_bitrate_kbps: 1200,
        audio_bitrate_kbps: 96,
        bufsize_kbps: 2000,
        crf: 23,
    },
    ResolutionProfile {
        label: "360p",
        width: 640,
        height: 360,
        video_bitrate_kbps: 800,
        audio_bitrate_kbps: 96,
        bufsize_kbps: 1500,
        crf: 24,
    },
    ResolutionProfile {
        label: "240p",
        width: 426,
        height: 240,
        video_bitrate_kbps: 500,
        audio_bitrate_kbps: 64,
        bufsize_kbps: 1000,
        crf: 25,
    },
    ResolutionProfile {
        label: "144p",
        width: 256,
        height: 144,
        video_bitrate_kbps: 300,
        audio_bitrate_kbps: 64,
        bufsize_kbps: 600,
        crf: 26,
    },
];

/// Ordered, non-empty, duplicate-free list of registered profiles.
///
/// Serialized as a list of labels; deserialization re-validates against the
/// registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct ProfileList(Vec<&'static ResolutionProfile>);

impl ProfileList {
    /// Validate a sequence of labels, preserving order.
    pub fn new<I, S>(labels: I) -> ValidationResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut profiles: Vec<&'static ResolutionProfile> = Vec::new();
        for label in labels {
            let label = label.as_ref().trim();
            let profile = ResolutionProfile::find(label)
                .ok_or_else(|| ValidationError::UnknownProfile(label.to_string()))?;
            if profiles.contains(&profile) {
                return Err(ValidationError::DuplicateProfile(label.to_string()));
            }
            profiles.push(profile);
        }

        if profiles.is_empty() {
            return Err(ValidationError::EmptyProfiles);
        }
        Ok(Self(profiles))
    }

    /// Parse a comma-separated list such as `"720p,480p"`.
    pub fn parse(csv: &str) -> ValidationResult<Self> {
        if csv.trim().is_empty() {
            return Err(ValidationError::EmptyProfiles);
        }
        Self::new(csv.split(','))
    }

    pub fn iter(&self) -> impl Iterator<Item = &'static ResolutionProfile> + '_ {
        self.0.iter().copied()
    }

    pub fn labels(&self) -> Vec<String> {
        self.0.iter().map(|p| p.label.to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<Vec<String>> for ProfileList {
    type Error = ValidationError;

    fn try_from(labels: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(labels)
    }
}

impl From<ProfileList> for Vec<String> {
    fn from(list: ProfileList) -> Self {
        list.labels()
    }
}

impl fmt::Display for ProfileList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.labels().join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_preserves_order() {
        let list = ProfileList::parse("720p, 480p,1080p").unwrap();
        assert_eq!(list.labels(), vec!["720p", "480p", "1080p"]);
        assert_eq!(list.to_string(), "720p,480p,1080p");
    }

    #[test]
    fn test_parse_rejects_unknown_and_empty() {
        assert_eq!(
            ProfileList::parse("720p,999p"),
            Err(ValidationError::UnknownProfile("999p".to_string()))
        );
        assert_eq!(ProfileList::parse(""), Err(ValidationError::EmptyProfiles));
        assert_eq!(ProfileList::parse("  "), Err(ValidationError::EmptyProfiles));
        assert_eq!(
            ProfileList::new(Vec::<String>::new()),
            Err(ValidationError::EmptyProfiles)
        );
    }

    #[test]
    fn test_parse_rejects_duplicates() {
        assert_eq!(
            ProfileList::parse("720p,720p"),
            Err(ValidationError::DuplicateProfile("720p".to_string()))
        );
    }

    #[test]
    fn test_serde_as_labels() {
        let list = ProfileList::parse("480p,360p").unwrap();
        let json = serde_json::to_string(&list).unwrap();
        assert_eq!(json, r#"["480p","360p"]"#);

        let err = serde_json::from_str::<ProfileList>(r#"["480p","4k"]"#);
        assert!(err.is_err());
    }

    #[test]
    fn test_bandwidth_includes_audio() {
        let p = ResolutionProfile::find("720p").unwrap();
        assert_eq!(p.bandwidth(), 2_628_000);
        assert_eq!(p.resolution(), "1280x720");
    }
}
