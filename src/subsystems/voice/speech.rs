//! Text-to-speech: spoken-text cleanup, Google Translate TTS, ffmpeg.

use std::process::Stdio;
use std::sync::LazyLock;

use regex::Regex;
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, error};

use super::VoiceError;

/// Longest text the TTS endpoint accepts per request.
pub const MAX_CHUNK_CHARS: usize = 200;

/// Devanagari share above which a reply is voiced in Hindi.
const HINDI_THRESHOLD: f64 = 0.15;

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko)";

/// TTS voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lang {
    English,
    Hindi,
}

impl Lang {
    pub fn code(self) -> &'static str {
        match self {
            Lang::English => "en",
            Lang::Hindi => "hi",
        }
    }
}

fn is_devanagari(c: char) -> bool {
    ('\u{0900}'..='\u{097F}').contains(&c)
}

/// Hindi when more than 15% of the non-whitespace characters are Devanagari.
/// Romanised Hinglish reads fine with the English voice.
pub fn detect_lang(text: &str) -> Lang {
    let (total, deva) = text
        .chars()
        .filter(|c| !c.is_whitespace())
        .fold((0usize, 0usize), |(t, d), c| (t + 1, d + usize::from(is_devanagari(c))));
    if total == 0 {
        return Lang::English;
    }
    if deva as f64 / total as f64 > HINDI_THRESHOLD { Lang::Hindi } else { Lang::English }
}

static BOLD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*([^*]+)\*").expect("static regex"));
static DIVIDER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"━+").expect("static regex"));
static PARAGRAPH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{2,}").expect("static regex"));
static BLANKS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]{2,}").expect("static regex"));

/// Turn a WhatsApp-formatted reply into text a TTS voice can read.
///
/// Drops bold markers, dividers and emoji; bullets become commas,
/// paragraph breaks become full stops and single newlines short pauses.
/// Printable ASCII and Devanagari survive.
pub fn spoken_text(text: &str) -> String {
    let text = BOLD.replace_all(text, "$1");
    let text = DIVIDER.replace_all(&text, " ");
    let text = text.replace('•', ",");
    let text: String = text
        .chars()
        .filter(|&c| c == '\n' || (' '..='~').contains(&c) || is_devanagari(c))
        .collect();
    let text = PARAGRAPH.replace_all(&text, ". ");
    let text = text.replace('\n', ", ");
    BLANKS.replace_all(&text, " ").trim().to_string()
}

/// Split `text` into pieces of at most `max_chars` characters on word
/// boundaries. A single word longer than the limit is cut hard.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        let needed = if current.is_empty() { word_len } else { current_len + 1 + word_len };
        if needed <= max_chars {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
            current_len = needed;
            continue;
        }
        if !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if word_len <= max_chars {
            current.push_str(word);
            current_len = word_len;
        } else {
            let chars: Vec<char> = word.chars().collect();
            for piece in chars.chunks(max_chars) {
                chunks.push(piece.iter().collect());
            }
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Fetch MP3 audio for `text`, one request per chunk, concatenated.
pub async fn fetch_tts(client: &Client, url: &str, text: &str, lang: Lang) -> Result<Vec<u8>, VoiceError> {
    let chunks = chunk_text(text, MAX_CHUNK_CHARS);
    let total = chunks.len().to_string();
    let mut audio = Vec::new();

    for (idx, chunk) in chunks.iter().enumerate() {
        let idx = idx.to_string();
        let textlen = chunk.chars().count().to_string();
        debug!(chunk = %idx, of = %total, lang = lang.code(), "tts request");
        let response = client
            .get(url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .query(&[
                ("ie", "UTF-8"),
                ("client", "tw-ob"),
                ("tl", lang.code()),
                ("q", chunk.as_str()),
                ("total", total.as_str()),
                ("idx", idx.as_str()),
                ("textlen", textlen.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, timeout = e.is_timeout(), "tts request failed (transport)");
                VoiceError::Synthesis(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(VoiceError::Synthesis(format!("TTS endpoint returned HTTP {}", status.as_u16())));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| VoiceError::Synthesis(format!("failed to read TTS audio: {e}")))?;
        audio.extend_from_slice(&bytes);
    }

    if audio.is_empty() {
        return Err(VoiceError::Synthesis("TTS returned no audio".into()));
    }
    Ok(audio)
}

/// ffmpeg arguments: MP3 on stdin, mono 48 kHz Opus at 32 kbps in OGG on stdout.
pub fn ffmpeg_args() -> [&'static str; 18] {
    [
        "-hide_banner", "-loglevel", "error",
        "-f", "mp3", "-i", "pipe:0",
        "-c:a", "libopus", "-b:a", "32k", "-ac", "1", "-ar", "48000",
        "-f", "ogg", "pipe:1",
    ]
}

/// Pipe `mp3` through ffmpeg and collect the OGG/Opus output.
pub async fn transcode_to_ogg(ffmpeg_path: &str, mp3: &[u8]) -> Result<Vec<u8>, VoiceError> {
    let mut child = Command::new(ffmpeg_path)
        .args(ffmpeg_args())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| VoiceError::Transcode(format!("cannot start {ffmpeg_path}: {e}")))?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| VoiceError::Transcode("ffmpeg stdin unavailable".into()))?;
    let input = mp3.to_vec();
    // Feed stdin concurrently so a full stdout pipe cannot deadlock us.
    let writer = tokio::spawn(async move {
        let result = stdin.write_all(&input).await;
        drop(stdin);
        result
    });

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| VoiceError::Transcode(format!("ffmpeg did not finish: {e}")))?;

    match writer.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(VoiceError::Transcode(format!("writing to ffmpeg failed: {e}"))),
        Err(e) => return Err(VoiceError::Transcode(format!("ffmpeg writer task failed: {e}"))),
    }

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(VoiceError::Transcode(format!("ffmpeg exited with {}: {}", output.status, stderr.trim())));
    }
    if output.stdout.is_empty() {
        return Err(VoiceError::Transcode("ffmpeg produced no output".into()));
    }
    Ok(output.stdout)
}
