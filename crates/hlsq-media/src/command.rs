//! Building and running `ffmpeg` invocations.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

const STDERR_TAIL_LINES: usize = 20;

/// Sink for encoder passes that only produce a log file.
#[cfg(windows)]
pub const NULL_OUTPUT: &str = "NUL";
#[cfg(not(windows))]
pub const NULL_OUTPUT: &str = "/dev/null";

/// One `ffmpeg` invocation: a single input, a single output and the options
/// on either side of `-i`.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    source: PathBuf,
    target: PathBuf,
    decode_opts: Vec<String>,
    encode_opts: Vec<String>,
}

impl FfmpegCommand {
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            source: input.as_ref().to_path_buf(),
            target: output.as_ref().to_path_buf(),
            decode_opts: Vec::new(),
            encode_opts: Vec::new(),
        }
    }

    fn flag(mut self, name: &str, value: impl ToString) -> Self {
        self.encode_opts.push(name.to_string());
        self.encode_opts.push(value.to_string());
        self
    }

    /// Append a raw option placed after the input.
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.encode_opts.push(arg.into());
        self
    }

    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.encode_opts.extend(args.into_iter().map(Into::into));
        self
    }

    /// Decode with a hardware accelerator (`cuda`, `vaapi`, ...).
    pub fn hwaccel(mut self, accel: Option<&str>) -> Self {
        if let Some(accel) = accel {
            self.decode_opts.extend(["-hwaccel".to_string(), accel.to_string()]);
        }
        self
    }

    pub fn video_filter(self, graph: impl ToString) -> Self {
        self.flag("-vf", graph)
    }

    pub fn video_codec(self, codec: &str) -> Self {
        self.flag("-c:v", codec)
    }

    pub fn audio_codec(self, codec: &str) -> Self {
        self.flag("-c:a", codec)
    }

    pub fn preset(self, preset: &str) -> Self {
        self.flag("-preset", preset)
    }

    /// Average bitrate, capped at the same rate over a `bufsize_kbps` window.
    pub fn video_bitrate(self, kbps: u32, bufsize_kbps: u32) -> Self {
        self.flag("-b:v", format!("{kbps}k"))
            .flag("-maxrate", format!("{kbps}k"))
            .flag("-bufsize", format!("{bufsize_kbps}k"))
    }

    pub fn audio_bitrate(self, kbps: u32) -> Self {
        self.flag("-b:a", format!("{kbps}k"))
    }

    pub fn no_audio(self) -> Self {
        self.output_arg("-an")
    }

    /// Two-pass encoding: pass number and the shared statistics prefix.
    pub fn pass(self, pass: u8, log_file: impl AsRef<Path>) -> Self {
        let log_file = log_file.as_ref().display().to_string();
        self.flag("-pass", pass).flag("-passlogfile", log_file)
    }

    pub fn format(self, format: &str) -> Self {
        self.flag("-f", format)
    }

    pub fn single_frame(self) -> Self {
        self.flag("-frames:v", 1)
    }

    pub fn output(&self) -> &Path {
        &self.target
    }

    /// Full argument vector, without the program name.
    pub fn build_args(&self) -> Vec<String> {
        let mut args: Vec<String> = ["-y", "-hide_banner", "-v", "error"]
            .into_iter()
            .map(String::from)
            .collect();
        args.extend(self.decode_opts.iter().cloned());
        args.push("-i".into());
        args.push(self.source.display().to_string());
        args.extend(self.encode_opts.iter().cloned());
        args.push(self.target.display().to_string());
        args
    }
}

/// Runs commands to completion, optionally bounded in time.
#[derive(Debug, Clone, Default)]
pub struct FfmpegRunner {
    limit: Option<Duration>,
}

impl FfmpegRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill FFmpeg once it has run for `secs` seconds.
    pub fn with_timeout(self, secs: u64) -> Self {
        Self {
            limit: Some(Duration::from_secs(secs)),
        }
    }

    /// Run `cmd`. A non-zero exit becomes [`MediaError::FfmpegFailed`]
    /// carrying the last lines FFmpeg wrote to stderr.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        let binary = check_ffmpeg()?;
        let args = cmd.build_args();
        debug!(output = %cmd.output().display(), "ffmpeg {}", args.join(" "));

        let mut child = Command::new(binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::internal("FFmpeg stderr not captured"))?;
        let tail = tokio::spawn(stderr_tail(stderr));

        let status = self.wait(&mut child).await;
        let tail = tail.await.unwrap_or_default();
        let status = status?;
        if status.success() {
            return Ok(());
        }
        Err(MediaError::ffmpeg_failed(
            format!("{} while writing {}", status, cmd.output().display()),
            (!tail.is_empty()).then_some(tail),
            status.code(),
        ))
    }

    async fn wait(&self, child: &mut Child) -> MediaResult<ExitStatus> {
        let Some(limit) = self.limit else {
            return Ok(child.wait().await?);
        };
        match tokio::time::timeout(limit, child.wait()).await {
            Ok(status) => Ok(status?),
            Err(_) => {
                warn!(limit_secs = limit.as_secs(), "FFmpeg overran its time limit, killing it");
                if let Err(e) = child.kill().await {
                    warn!("Could not kill FFmpeg: {}", e);
                }
                Err(MediaError::Timeout(limit.as_secs()))
            }
        }
    }
}

/// Drain stderr, keeping only the last few lines.
async fn stderr_tail(stderr: ChildStderr) -> String {
    let mut lines = BufReader::new(stderr).lines();
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
    while let Ok(Some(line)) = lines.next_line().await {
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    Vec::from(tail).join("\n")
}

/// Locate the `ffmpeg` binary on `PATH`.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_pair(args: &[String], flag: &str, value: &str) -> bool {
        args.windows(2).any(|w| w[0] == flag && w[1] == value)
    }

    #[test]
    fn test_decode_options_precede_input() {
        let args = FfmpegCommand::new("input", "out/index.m3u8")
            .hwaccel(Some("cuda"))
            .video_codec("libx264")
            .video_bitrate(2500, 4000)
            .pass(2, "out/logfile")
            .build_args();

        let hw = args.iter().position(|a| a == "-hwaccel").unwrap();
        let input = args.iter().position(|a| a == "-i").unwrap();
        assert!(hw < input);
        assert_eq!(args[hw + 1], "cuda");

        assert!(has_pair(&args, "-b:v", "2500k"));
        assert!(has_pair(&args, "-maxrate", "2500k"));
        assert!(has_pair(&args, "-bufsize", "4000k"));
        assert!(has_pair(&args, "-pass", "2"));
        assert_eq!(args.last().unwrap(), "out/index.m3u8");
    }

    #[test]
    fn test_no_hwaccel_by_default() {
        let args = FfmpegCommand::new("in", "out").hwaccel(None).build_args();
        assert!(!args.iter().any(|a| a == "-hwaccel"));
        assert_eq!(args[0], "-y");
        assert!(has_pair(&args, "-i", "in"));
    }
}
