//! Turning downloaded transcript artifacts into plain text.

use anyhow::Result;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::RetryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactFormat {
    Json,
    Txt,
    Vtt,
}

impl ArtifactFormat {
    /// Preference order when a recording offers several artifacts.
    const PREFERENCE: [ArtifactFormat; 3] = [Self::Json, Self::Txt, Self::Vtt];

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "txt" | "text" => Some(Self::Txt),
            "vtt" | "webvtt" => Some(Self::Vtt),
            _ => None,
        }
    }
}

/// One downloadable artifact as listed by the platform.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TranscriptArtifact {
    pub format: String,
    pub link: String,
}

impl TranscriptArtifact {
    pub fn format(&self) -> Option<ArtifactFormat> {
        ArtifactFormat::parse(&self.format)
    }
}

/// Usable artifacts, json first, then txt, then vtt. Artifacts without a
/// link or in an unknown format are skipped.
pub fn rank_artifacts(artifacts: &[TranscriptArtifact]) -> Vec<(ArtifactFormat, &TranscriptArtifact)> {
    ArtifactFormat::PREFERENCE
        .iter()
        .flat_map(|wanted| {
            artifacts
                .iter()
                .filter(move |a| a.format() == Some(*wanted) && !a.link.trim().is_empty())
                .map(move |a| (*wanted, a))
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTranscript {
    pub text: String,
    pub structured: Option<Value>,
}

pub struct ArtifactParser {
    timing_line: Regex,
    index_line: Regex,
    markup: Regex,
}

impl ArtifactParser {
    pub fn new() -> Result<Self> {
        // 00:01.000 --> 00:04.000 or 00:00:01.000 --> 00:00:04.000 plus cue settings
        let timing_line = Regex::new(r"^\s*(\d{2,}:)?\d{2}:\d{2}[.,]\d{3}\s+-->\s+")?;
        let index_line = Regex::new(r"^\s*\d+\s*$")?;
        let markup = Regex::new(r"<[^>]+>")?;

        Ok(Self {
            timing_line,
            index_line,
            markup,
        })
    }

    pub fn parse(&self, format: ArtifactFormat, body: &str) -> Result<ParsedTranscript, RetryError> {
        let parsed = match format {
            ArtifactFormat::Json => parse_json(body)?,
            ArtifactFormat::Txt => ParsedTranscript {
                text: body.trim().to_string(),
                structured: None,
            },
            ArtifactFormat::Vtt => ParsedTranscript {
                text: self.vtt_text(body),
                structured: None,
            },
        };

        debug!(
            "Parsed {:?} artifact: {} bytes to {} chars",
            format,
            body.len(),
            parsed.text.len()
        );
        Ok(parsed)
    }

    fn vtt_text(&self, body: &str) -> String {
        let mut lines = Vec::new();
        let mut in_note = false;

        for line in body.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                in_note = false;
                continue;
            }
            if trimmed.starts_with("WEBVTT") {
                continue;
            }
            if trimmed.starts_with("NOTE") || trimmed.starts_with("STYLE") {
                in_note = true;
                continue;
            }
            if in_note || self.timing_line.is_match(trimmed) || self.index_line.is_match(trimmed) {
                continue;
            }

            let cleaned = self.markup.replace_all(trimmed, "");
            let cleaned = cleaned.trim();
            if !cleaned.is_empty() {
                lines.push(cleaned.to_string());
            }
        }

        lines.join("\n")
    }
}

/// Explicit `text`, else utterance texts by line, else words by space.
fn parse_json(body: &str) -> Result<ParsedTranscript, RetryError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| RetryError::InvalidArtifact(format!("transcript JSON: {}", e)))?;

    let text = match &value {
        Value::Array(utterances) => join_field(utterances, &["text"], "\n"),
        Value::Object(obj) => {
            let explicit = obj
                .get("text")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from);

            explicit
                .or_else(|| {
                    obj.get("utterances")
                        .and_then(Value::as_array)
                        .map(|u| join_field(u, &["text"], "\n"))
                        .filter(|t| !t.is_empty())
                })
                .or_else(|| {
                    obj.get("words")
                        .and_then(Value::as_array)
                        .map(|w| join_field(w, &["word", "text"], " "))
                })
                .unwrap_or_default()
        }
        _ => String::new(),
    };

    Ok(ParsedTranscript {
        text,
        structured: Some(value),
    })
}

fn join_field(items: &[Value], keys: &[&str], separator: &str) -> String {
    items
        .iter()
        .filter_map(|item| keys.iter().find_map(|k| item.get(*k).and_then(Value::as_str)))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(separator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn artifact(format: &str, link: &str) -> TranscriptArtifact {
        TranscriptArtifact {
            format: format.into(),
            link: link.into(),
        }
    }

    #[test]
    fn test_rank_prefers_json_then_txt_then_vtt() {
        let all = vec![
            artifact("vtt", "https://x/t.vtt"),
            artifact("srt", "https://x/t.srt"),
            artifact("txt", "https://x/t.txt"),
            artifact("JSON", "https://x/t.json"),
        ];
        let ranked = rank_artifacts(&all);
        let formats: Vec<_> = ranked.iter().map(|(format, _)| *format).collect();
        assert_eq!(
            formats,
            vec![ArtifactFormat::Json, ArtifactFormat::Txt, ArtifactFormat::Vtt]
        );
        assert_eq!(ranked[0].1.link, "https://x/t.json");

        assert!(rank_artifacts(&[artifact("srt", "https://x/t.srt")]).is_empty());
        assert!(rank_artifacts(&[artifact("json", "")]).is_empty());
    }

    #[test]
    fn test_json_explicit_text() {
        let parser = ArtifactParser::new().unwrap();
        let parsed = parser
            .parse(
                ArtifactFormat::Json,
                r#"{"text": " full text ", "utterances": [{"text": "ignored"}]}"#,
            )
            .unwrap();
        assert_eq!(parsed.text, "full text");
        assert!(parsed.structured.is_some());
    }

    #[test]
    fn test_json_utterances_then_words() {
        let parser = ArtifactParser::new().unwrap();
        let body = json!({
            "utterances": [
                {"speaker": "A", "text": "Hi there.", "start": 0.0},
                {"speaker": "B", "text": "Hello.", "start": 1.2}
            ]
        })
        .to_string();
        assert_eq!(
            parser.parse(ArtifactFormat::Json, &body).unwrap().text,
            "Hi there.\nHello."
        );

        let body = json!({"words": [{"word": "one"}, {"text": "two"}, {"word": ""}]}).to_string();
        assert_eq!(
            parser.parse(ArtifactFormat::Json, &body).unwrap().text,
            "one two"
        );

        let body = json!([{"text": "a"}, {"text": "b"}]).to_string();
        assert_eq!(parser.parse(ArtifactFormat::Json, &body).unwrap().text, "a\nb");
    }

    #[test]
    fn test_invalid_json_artifact() {
        let parser = ArtifactParser::new().unwrap();
        assert!(matches!(
            parser.parse(ArtifactFormat::Json, "<html>"),
            Err(RetryError::InvalidArtifact(_))
        ));
    }

    #[test]
    fn test_vtt_strips_header_timing_and_indices() {
        let parser = ArtifactParser::new().unwrap();
        let vtt = "WEBVTT\n\nNOTE generated\nby the platform\n\n1\n00:00:00.000 --> 00:00:02.500\n<v Host>Welcome everyone.</v>\n\n2\n00:02.500 --> 00:04.000 align:start\nLet's begin.\n";
        assert_eq!(
            parser.parse(ArtifactFormat::Vtt, vtt).unwrap().text,
            "Welcome everyone.\nLet's begin."
        );
    }

    #[test]
    fn test_txt_is_trimmed() {
        let parser = ArtifactParser::new().unwrap();
        let parsed = parser.parse(ArtifactFormat::Txt, "\n  plain words \n").unwrap();
        assert_eq!(parsed.text, "plain words");
        assert!(parsed.structured.is_none());
    }
}
