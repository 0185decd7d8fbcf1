use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use log::{debug, error, warn};
use tempfile::TempPath;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio_stream::{Stream, StreamExt};

#[cfg(feature = "opencv")]
use opencv::{core, imgcodecs, prelude::*, videoio};

use crate::context::SharedContext;
use crate::utilities::{file_len, format_timestamp, run_tool};

/// Quality variants tried in order when opening a stream.
pub const QUALITY_PREFERENCES: [&str; 7] =
    ["best", "720p60", "720p", "480p60", "480p", "360p", "worst"];

const CHUNK_SIZE: usize = 64 * 1024;
/// Bytes pulled from the stream per capture attempt.
const SEGMENT_BUDGET: u64 = 1024 * 1024;
/// Anything smaller is not a usable segment.
const MIN_SEGMENT_BYTES: u64 = 100 * 1024;
const MIN_AUDIO_BYTES: u64 = 100;
const RETRY_PAUSE: Duration = Duration::from_secs(2);

/// Produces the frame and audio artifacts one observation cycle works from.
///
/// Artifacts are temporary files; they are deleted when dropped.
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn capture_frame(&self, url: &str) -> Option<TempPath>;

    async fn capture_audio(&self, url: &str) -> Option<TempPath>;
}

#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub ffmpeg: String,
    pub streamlink: String,
    pub tool_timeout: Duration,
    pub frame_retries: u32,
    pub audio_clip: Duration,
    pub debug_frames_dir: Option<PathBuf>,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".into(),
            streamlink: "streamlink".into(),
            tool_timeout: Duration::from_secs(45),
            frame_retries: 3,
            audio_clip: Duration::from_secs(10),
            debug_frames_dir: None,
        }
    }
}

/// Frame and audio extraction from a live stream using ffmpeg and streamlink.
///
/// Frames go through a chain of strategies:
/// 1. ffmpeg grabs one frame straight from the URL.
/// 2. Otherwise streamlink opens the stream at the best available quality and
///    about 1 MiB is downloaded into a temporary container file.
/// 3. A frame is decoded from that file (OpenCV when built with the `opencv`
///    feature, then ffmpeg).
///
/// Discontinuity warnings from streamlink clear the shared `stream_healthy` flag.
pub struct MediaCapture {
    settings: CaptureSettings,
    context: Arc<SharedContext>,
}

impl MediaCapture {
    pub fn new(settings: CaptureSettings, context: Arc<SharedContext>) -> Self {
        Self { settings, context }
    }

    pub async fn capture_frame_with_retries(&self, url: &str, retries: u32) -> Option<TempPath> {
        debug!("Capturing a frame from {}", url);
        let frame = match temp_artifact(".jpg") {
            Ok(path) => path,
            Err(e) => {
                error!("Cannot create frame file: {:#}", e);
                return None;
            }
        };

        if self.frame_from_source(url, &frame).await {
            debug!("Frame saved via ffmpeg to {}", frame.display());
            self.keep_debug_copy(&frame).await;
            return Some(frame);
        }
        debug!("ffmpeg gave no frame, falling back to streamlink");

        let segment = self.download_segment(url, retries).await?;

        if decode_first_frame(&segment, &frame).await {
            debug!("Frame decoded with OpenCV into {}", frame.display());
        } else if self.frame_from_source(&segment.to_string_lossy(), &frame).await {
            debug!("Frame decoded with ffmpeg into {}", frame.display());
        } else {
            warn!("No frame could be decoded from the downloaded segment");
            return None;
        }
        self.keep_debug_copy(&frame).await;
        Some(frame)
    }

    pub async fn capture_audio_for(&self, url: &str, clip: Duration) -> Option<TempPath> {
        let audio = match temp_artifact(".wav") {
            Ok(path) => path,
            Err(e) => {
                error!("Cannot create audio file: {:#}", e);
                return None;
            }
        };

        let seconds = clip.as_secs().max(1).to_string();
        let target = audio.to_string_lossy().into_owned();
        let args = [
            "-y", "-nostdin", "-loglevel", "error", "-i", url, "-t", seconds.as_str(), "-vn",
            "-ac", "1", "-ar", "16000", "-c:a", "pcm_s16le", target.as_str(),
        ];
        if let Err(e) = run_tool(
            &self.settings.ffmpeg,
            &args,
            self.settings.tool_timeout + clip,
        )
        .await
        {
            warn!("Audio capture failed: {:#}", e);
            return None;
        }

        let size = file_len(&audio).await;
        if size <= MIN_AUDIO_BYTES {
            warn!("Audio capture produced only {} bytes", size);
            return None;
        }

        match clip_duration(&audio) {
            Ok(secs) if secs > 0.0 => {
                debug!("Captured audio clip of {}", format_timestamp(secs));
                Some(audio)
            }
            Ok(_) => {
                warn!("Audio capture produced an empty clip");
                None
            }
            Err(e) => {
                // Still worth sending; the transcription endpoint may cope.
                warn!("Could not read WAV header of {}: {:#}", audio.display(), e);
                Some(audio)
            }
        }
    }

    /// One frame via ffmpeg from a URL or a local file.
    async fn frame_from_source(&self, source: &str, frame: &Path) -> bool {
        let target = frame.to_string_lossy().into_owned();
        let args = [
            "-y", "-nostdin", "-loglevel", "error", "-fflags", "+igndts", "-i", source,
            "-frames:v", "1", "-q:v", "2", target.as_str(),
        ];
        match run_tool(&self.settings.ffmpeg, &args, self.settings.tool_timeout).await {
            Ok(output) if output.status.success() => file_len(frame).await > 0,
            Ok(output) => {
                debug!("ffmpeg exited with {}", output.status);
                false
            }
            Err(e) => {
                debug!("ffmpeg frame grab failed: {:#}", e);
                false
            }
        }
    }

    async fn download_segment(&self, url: &str, retries: u32) -> Option<TempPath> {
        let variants = match self.list_variants(url).await {
            Ok(variants) => variants,
            Err(e) => {
                error!("Could not list streams for {}: {:#}", url, e);
                return None;
            }
        };
        let Some(quality) = pick_quality(&variants) else {
            warn!("No streams found for {}", url);
            return None;
        };
        debug!("Selected stream quality {}", quality);

        let segment = match temp_artifact(".mp4") {
            Ok(path) => path,
            Err(e) => {
                error!("Cannot create segment file: {:#}", e);
                return None;
            }
        };

        let retries = retries.max(1);
        for attempt in 1..=retries {
            self.context.set_stream_healthy(true);
            match self.read_stream(url, quality, &segment).await {
                Ok(downloaded) if downloaded >= MIN_SEGMENT_BYTES => {
                    debug!("Read {} bytes from the stream", downloaded);
                    break;
                }
                Ok(downloaded) => {
                    warn!(
                        "Attempt {}/{}: too little stream data ({} bytes)",
                        attempt, retries, downloaded
                    );
                    tokio::time::sleep(RETRY_PAUSE).await;
                }
                Err(e) => {
                    warn!("Attempt {}/{}: stream read failed: {:#}", attempt, retries, e);
                    if attempt == retries {
                        return None;
                    }
                    tokio::time::sleep(RETRY_PAUSE).await;
                }
            }
        }

        if file_len(&segment).await < MIN_SEGMENT_BYTES {
            error!("Stream segment is empty or truncated");
            return None;
        }
        Some(segment)
    }

    async fn list_variants(&self, url: &str) -> Result<Vec<String>> {
        let output = run_tool(
            &self.settings.streamlink,
            &["--json", url],
            self.settings.tool_timeout,
        )
        .await?;
        parse_variants(&output.stdout)
    }

    /// Pipes up to [`SEGMENT_BUDGET`] bytes of the stream into `target`.
    async fn read_stream(&self, url: &str, quality: &str, target: &Path) -> Result<u64> {
        let mut child = Command::new(&self.settings.streamlink)
            .args([
                url,
                quality,
                "--stdout",
                "--twitch-disable-ads",
                "--stream-timeout",
                "30",
                "--hls-live-restart",
                "--loglevel",
                "warning",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .context("failed to start streamlink")?;

        let stdout = child.stdout.take().context("streamlink stdout missing")?;
        let stderr = child.stderr.take().context("streamlink stderr missing")?;
        let watcher = tokio::spawn(watch_discontinuities(stderr, self.context.clone()));

        let mut file = tokio::fs::File::create(target).await?;
        let mut downloaded = 0u64;
        let chunks = read_chunks(stdout, CHUNK_SIZE);
        tokio::pin!(chunks);

        let copy = async {
            while downloaded < SEGMENT_BUDGET {
                let Some(chunk) = chunks.next().await else {
                    break;
                };
                let chunk = chunk?;
                file.write_all(&chunk).await?;
                downloaded += chunk.len() as u64;
            }
            file.flush().await?;
            Ok::<_, anyhow::Error>(())
        };
        let copied = tokio::time::timeout(self.settings.tool_timeout, copy).await;

        let _ = child.kill().await;
        let _ = tokio::time::timeout(Duration::from_secs(1), watcher).await;

        match copied {
            Ok(result) => result?,
            Err(_) => debug!("Stream read hit the deadline after {} bytes", downloaded),
        }
        Ok(downloaded)
    }

    async fn keep_debug_copy(&self, frame: &Path) {
        let Some(dir) = &self.settings.debug_frames_dir else {
            return;
        };
        let name = format!("frame-{}.jpg", chrono::Local::now().format("%Y%m%d-%H%M%S%.3f"));
        let copy = dir.join(name);
        let result = async {
            tokio::fs::create_dir_all(dir).await?;
            tokio::fs::copy(frame, &copy).await
        }
        .await;
        match result {
            Ok(_) => debug!("Debug copy of frame at {}", copy.display()),
            Err(e) => warn!("Could not keep debug frame {}: {}", copy.display(), e),
        }
    }
}

#[async_trait]
impl MediaSource for MediaCapture {
    async fn capture_frame(&self, url: &str) -> Option<TempPath> {
        self.capture_frame_with_retries(url, self.settings.frame_retries)
            .await
    }

    async fn capture_audio(&self, url: &str) -> Option<TempPath> {
        self.capture_audio_for(url, self.settings.audio_clip).await
    }
}

fn temp_artifact(suffix: &str) -> Result<TempPath> {
    let file = tempfile::Builder::new()
        .prefix("stream-crowd-")
        .suffix(suffix)
        .tempfile()?;
    Ok(file.into_temp_path())
}

/// Variant names from `streamlink --json` output.
fn parse_variants(stdout: &[u8]) -> Result<Vec<String>> {
    let value: serde_json::Value =
        serde_json::from_slice(stdout).context("streamlink printed invalid JSON")?;
    if let Some(err) = value.get("error").and_then(|e| e.as_str()) {
        bail!("streamlink: {err}");
    }
    Ok(value
        .get("streams")
        .and_then(|s| s.as_object())
        .map(|streams| streams.keys().cloned().collect())
        .unwrap_or_default())
}

/// First preferred quality that is available, else any available one.
pub fn pick_quality(available: &[String]) -> Option<&str> {
    QUALITY_PREFERENCES
        .iter()
        .find(|q| available.iter().any(|a| a == *q))
        .copied()
        .or_else(|| available.first().map(String::as_str))
}

pub fn is_discontinuity(line: &str) -> bool {
    line.to_ascii_lowercase().contains("discontinuity")
}

async fn watch_discontinuities<R: AsyncRead + Unpin>(stderr: R, context: Arc<SharedContext>) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!("streamlink: {}", line);
        if is_discontinuity(&line) {
            warn!("Stream discontinuity reported, marking stream unhealthy");
            context.set_stream_healthy(false);
        }
    }
}

fn read_chunks<R: AsyncRead + Unpin>(
    mut reader: R,
    chunk_size: usize,
) -> impl Stream<Item = std::io::Result<Bytes>> {
    async_stream::try_stream! {
        loop {
            let mut buf = BytesMut::with_capacity(chunk_size);
            let n = reader.read_buf(&mut buf).await?;
            if n == 0 {
                break;
            }
            yield buf.freeze();
        }
    }
}

/// Length of a WAV clip in seconds.
fn clip_duration(path: &Path) -> Result<f64> {
    let reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    if spec.sample_rate == 0 {
        bail!("WAV header reports a zero sample rate");
    }
    Ok(reader.duration() as f64 / spec.sample_rate as f64)
}

#[cfg(feature = "opencv")]
async fn decode_first_frame(segment: &Path, frame: &Path) -> bool {
    let segment = segment.to_string_lossy().into_owned();
    let frame = frame.to_string_lossy().into_owned();
    let decoded = tokio::task::spawn_blocking(move || -> opencv::Result<bool> {
        let mut cap = videoio::VideoCapture::from_file(&segment, videoio::CAP_ANY)?;
        if !cap.is_opened()? {
            return Ok(false);
        }
        let mut mat = core::Mat::default();
        if !cap.read(&mut mat)? || mat.empty() {
            return Ok(false);
        }
        imgcodecs::imwrite(&frame, &mat, &core::Vector::<i32>::new())
    })
    .await;

    match decoded {
        Ok(Ok(written)) => written,
        Ok(Err(e)) => {
            warn!("OpenCV could not decode a frame: {}", e);
            false
        }
        Err(e) => {
            error!("Frame decode task failed: {}", e);
            false
        }
    }
}

#[cfg(not(feature = "opencv"))]
async fn decode_first_frame(_segment: &Path, _frame: &Path) -> bool {
    false
}

impl std::fmt::Debug for MediaCapture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaCapture")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn capture_with_missing_tools() -> (MediaCapture, Arc<SharedContext>) {
        let context = Arc::new(SharedContext::new());
        let settings = CaptureSettings {
            ffmpeg: "no-such-ffmpeg-binary".into(),
            streamlink: "no-such-streamlink-binary".into(),
            tool_timeout: Duration::from_secs(2),
            frame_retries: 1,
            audio_clip: Duration::from_secs(1),
            debug_frames_dir: None,
        };
        (MediaCapture::new(settings, context.clone()), context)
    }

    #[test]
    fn quality_follows_preference_order() {
        assert_eq!(pick_quality(&names(&["480p", "720p", "worst"])), Some("720p"));
        assert_eq!(pick_quality(&names(&["audio_only", "best"])), Some("best"));
        assert_eq!(pick_quality(&names(&["1080p60", "audio_only"])), Some("1080p60"));
        assert_eq!(pick_quality(&[]), None);
    }

    #[test]
    fn variants_come_from_streamlink_json() {
        let json = br#"{"plugin":"twitch","streams":{"720p":{"type":"hls"},"best":{"type":"hls"}}}"#;
        let mut variants = parse_variants(json).unwrap();
        variants.sort();
        assert_eq!(variants, names(&["720p", "best"]));

        assert!(parse_variants(br#"{"error":"No playable streams found"}"#).is_err());
        assert!(parse_variants(b"not json").is_err());
        assert!(parse_variants(br#"{"plugin":"twitch"}"#).unwrap().is_empty());
    }

    #[test]
    fn discontinuity_lines_are_detected_case_insensitively() {
        assert!(is_discontinuity(
            "[stream.hls][warning] Encountered a stream discontinuity. This is unsupported"
        ));
        assert!(is_discontinuity("DISCONTINUITY"));
        assert!(!is_discontinuity("[cli][info] Opening stream: 720p (hls)"));
    }

    #[tokio::test]
    async fn discontinuity_warning_marks_stream_unhealthy() {
        let context = Arc::new(SharedContext::new());
        let stderr: &[u8] = b"[cli][info] Opening stream\n[stream.hls][warning] Encountered a stream discontinuity\n";
        watch_discontinuities(stderr, context.clone()).await;
        assert!(!context.is_stream_healthy());

        let healthy = Arc::new(SharedContext::new());
        let quiet: &[u8] = b"[cli][info] Opening stream\n";
        watch_discontinuities(quiet, healthy.clone()).await;
        assert!(healthy.is_stream_healthy());
    }

    #[tokio::test]
    async fn chunks_never_exceed_the_chunk_size() {
        let data = vec![7u8; 10_000];
        let chunks: Vec<Bytes> = read_chunks(&data[..], 4096)
            .collect::<std::io::Result<Vec<_>>>()
            .await
            .unwrap();
        assert!(chunks.iter().all(|c| c.len() <= 4096));
        assert_eq!(chunks.iter().map(Bytes::len).sum::<usize>(), 10_000);
    }

    #[test]
    fn clip_duration_reads_the_wav_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..32_000 {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();

        assert!((clip_duration(&path).unwrap() - 2.0).abs() < 1e-9);
        assert!(clip_duration(&dir.path().join("missing.wav")).is_err());
    }

    #[tokio::test]
    async fn missing_tools_yield_no_artifacts() {
        let (capture, context) = capture_with_missing_tools();
        assert!(capture.capture_frame("https://example.invalid/live").await.is_none());
        assert!(capture.capture_audio("https://example.invalid/live").await.is_none());
        assert!(context.is_stream_healthy());
    }

    #[tokio::test]
    async fn debug_copy_lands_in_the_configured_dir() {
        let dir = tempfile::tempdir().unwrap();
        let context = Arc::new(SharedContext::new());
        let settings = CaptureSettings {
            debug_frames_dir: Some(dir.path().join("frames")),
            ..CaptureSettings::default()
        };
        let capture = MediaCapture::new(settings, context);
        let frame = temp_artifact(".jpg").unwrap();
        std::fs::write(&frame, b"jpeg").unwrap();

        capture.keep_debug_copy(&frame).await;

        let copies: Vec<_> = std::fs::read_dir(dir.path().join("frames"))
            .unwrap()
            .collect();
        assert_eq!(copies.len(), 1);
    }

    /// Writes an executable shell script standing in for ffmpeg or streamlink.
    #[cfg(unix)]
    fn fake_tool(dir: &Path, name: &str, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    /// ffmpeg that refuses URLs but writes a frame when given a local file.
    #[cfg(unix)]
    fn local_only_ffmpeg(dir: &Path) -> String {
        let log = dir.join("ffmpeg.log");
        fake_tool(
            dir,
            "ffmpeg",
            &format!(
                r#"for last; do :; done
prev=""
for arg; do
  if [ "$prev" = "-i" ]; then src="$arg"; fi
  prev="$arg"
done
echo "$src" >> "{log}"
case "$src" in
  http*) exit 1 ;;
esac
printf 'jpeg' > "$last""#,
                log = log.display()
            ),
        )
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn short_download_is_retried_then_decoded_with_ffmpeg() {
        let tools = tempfile::tempdir().unwrap();
        let dir = tools.path();
        let calls = dir.join("streamlink.log");
        let streamlink = fake_tool(
            dir,
            "streamlink",
            &format!(
                r#"if [ "$1" = "--json" ]; then
  echo '{{"plugin":"twitch","streams":{{"480p":{{}},"720p":{{}},"audio_only":{{}}}}}}'
  exit 0
fi
echo "$@" >> "{calls}"
n=$(wc -l < "{calls}" | tr -d ' ')
if [ "$n" -eq 1 ]; then
  echo "[stream.hls][warning] Encountered a stream discontinuity" >&2
  exec head -c 51200 /dev/zero
fi
exec head -c 307200 /dev/zero"#,
                calls = calls.display()
            ),
        );
        let ffmpeg = local_only_ffmpeg(dir);

        let context = Arc::new(SharedContext::new());
        let settings = CaptureSettings {
            ffmpeg,
            streamlink,
            tool_timeout: Duration::from_secs(10),
            ..CaptureSettings::default()
        };
        let capture = MediaCapture::new(settings, context.clone());
        let url = "https://www.twitch.tv/somebody";

        let frame = capture.capture_frame_with_retries(url, 3).await.unwrap();

        assert_eq!(std::fs::read(&frame).unwrap(), b"jpeg");
        let attempts = std::fs::read_to_string(&calls).unwrap();
        let attempts: Vec<&str> = attempts.lines().collect();
        assert_eq!(attempts.len(), 2);
        assert!(attempts
            .iter()
            .all(|a| a.starts_with(&format!("{url} 720p --stdout"))));

        // first source is the URL, second the downloaded segment
        let sources = std::fs::read_to_string(dir.join("ffmpeg.log")).unwrap();
        let sources: Vec<&str> = sources.lines().collect();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0], url);
        assert!(sources[1].ends_with(".mp4"), "{}", sources[1]);

        // the discontinuity came from the short attempt; the next one reset the flag
        assert!(context.is_stream_healthy());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn download_stops_at_budget_and_flags_discontinuity() {
        let tools = tempfile::tempdir().unwrap();
        let streamlink = fake_tool(
            tools.path(),
            "streamlink",
            r#"echo "[stream.hls][warning] Encountered a stream discontinuity" >&2
exec head -c 3000000 /dev/zero"#,
        );
        let context = Arc::new(SharedContext::new());
        let settings = CaptureSettings {
            streamlink,
            tool_timeout: Duration::from_secs(10),
            ..CaptureSettings::default()
        };
        let capture = MediaCapture::new(settings, context.clone());
        let target = temp_artifact(".mp4").unwrap();

        let downloaded = capture
            .read_stream("https://www.twitch.tv/somebody", "best", &target)
            .await
            .unwrap();

        assert!(downloaded >= SEGMENT_BUDGET, "{downloaded}");
        assert!(downloaded < SEGMENT_BUDGET + CHUNK_SIZE as u64, "{downloaded}");
        assert_eq!(file_len(&target).await, downloaded);
        assert!(!context.is_stream_healthy());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn every_short_attempt_fails_the_capture() {
        let tools = tempfile::tempdir().unwrap();
        let dir = tools.path();
        let calls = dir.join("streamlink.log");
        let streamlink = fake_tool(
            dir,
            "streamlink",
            &format!(
                r#"if [ "$1" = "--json" ]; then
  echo '{{"streams":{{"best":{{}}}}}}'
  exit 0
fi
echo "$@" >> "{calls}"
exec head -c 1000 /dev/zero"#,
                calls = calls.display()
            ),
        );
        let settings = CaptureSettings {
            ffmpeg: local_only_ffmpeg(dir),
            streamlink,
            tool_timeout: Duration::from_secs(10),
            ..CaptureSettings::default()
        };
        let capture = MediaCapture::new(settings, Arc::new(SharedContext::new()));

        assert!(capture
            .capture_frame_with_retries("https://www.twitch.tv/somebody", 2)
            .await
            .is_none());
        assert_eq!(std::fs::read_to_string(&calls).unwrap().lines().count(), 2);
        // only the URL attempt reached ffmpeg
        assert_eq!(
            std::fs::read_to_string(dir.join("ffmpeg.log")).unwrap().lines().count(),
            1
        );
    }

    #[test]
    fn temp_artifacts_are_removed_on_drop() {
        let artifact = temp_artifact(".wav").unwrap();
        let path = artifact.to_path_buf();
        assert!(path.exists());
        drop(artifact);
        assert!(!path.exists());
    }
}
