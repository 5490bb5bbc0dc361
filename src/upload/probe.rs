use std::process::Stdio;
use std::time::Duration;

use bytes::Bytes;
use serde::Deserialize;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ffprobe exited with {0}")]
    Failed(std::process::ExitStatus),
    #[error("Unreadable ffprobe output: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("ffprobe did not finish within {0:?}")]
    TimedOut(Duration),
}

/// Stream metadata recorded on a video row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoProbe {
    pub duration_secs: Option<f64>,
    pub fps: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    #[serde(default)]
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    #[serde(default)]
    codec_type: Option<String>,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    avg_frame_rate: Option<String>,
    #[serde(default)]
    r_frame_rate: Option<String>,
    #[serde(default)]
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    #[serde(default)]
    duration: Option<String>,
}

/// Parse ffprobe's `"num/den"` rate notation.
pub fn parse_frame_rate(rate: &str) -> Option<f64> {
    let (num, den) = rate.split_once('/')?;
    let num: f64 = num.trim().parse().ok()?;
    let den: f64 = den.trim().parse().ok()?;
    if den == 0.0 || num == 0.0 {
        return None;
    }
    Some(num / den)
}

/// Extract the first video stream's metadata from `ffprobe -print_format json`.
pub fn parse_ffprobe(json: &[u8]) -> Result<VideoProbe, serde_json::Error> {
    let output: FfprobeOutput = serde_json::from_slice(json)?;
    let stream = output
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));

    let duration_secs = output
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .or_else(|| stream.and_then(|s| s.duration.as_deref()))
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0);

    let fps = stream.and_then(|s| {
        s.avg_frame_rate
            .as_deref()
            .and_then(parse_frame_rate)
            .or_else(|| s.r_frame_rate.as_deref().and_then(parse_frame_rate))
    });

    Ok(VideoProbe {
        duration_secs,
        fps,
        width: stream.and_then(|s| s.width),
        height: stream.and_then(|s| s.height),
    })
}

/// Run ffprobe over the video bytes piped through stdin. The child is killed
/// when it outlives `timeout`.
pub async fn probe_video(
    ffprobe: &str,
    data: Bytes,
    timeout: Duration,
) -> Result<VideoProbe, ProbeError> {
    let mut child = Command::new(ffprobe)
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
            "-i",
            "pipe:0",
        ])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()?;

    // ffprobe may stop reading early; a broken pipe here is expected.
    if let Some(mut stdin) = child.stdin.take() {
        tokio::spawn(async move {
            let _ = stdin.write_all(&data).await;
            let _ = stdin.shutdown().await;
        });
    }

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| ProbeError::TimedOut(timeout))??;
    if !output.status.success() {
        return Err(ProbeError::Failed(output.status));
    }
    Ok(parse_ffprobe(&output.stdout)?)
}
