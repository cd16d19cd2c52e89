//! Launch-style pipeline descriptions.
//!
//! ```text
//! filesrc location="song.mp3" ! decodebin ! audioconvert ! appsink name=relay_sink
//! ```
//!
//! Stages are separated by `!`. Each stage is an element name followed by
//! `key=value` properties; values containing spaces are double-quoted. A stage
//! whose first token contains `/` is a caps filter.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::{FormatDescriptor, RelayError};

const CAPS_FILTER: &str = "capsfilter";

/// One element of a pipeline description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    factory: String,
    properties: Vec<(String, String)>,
}

impl Stage {
    /// Creates a stage for the given element factory.
    pub fn new(factory: impl Into<String>) -> Self {
        Self {
            factory: factory.into(),
            properties: Vec::new(),
        }
    }

    /// Adds a property, replacing an earlier value for the same key.
    #[must_use]
    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.properties.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.properties.push((key, value)),
        }
        self
    }

    /// Element factory name, `capsfilter` for caps stages.
    pub fn factory(&self) -> &str {
        &self.factory
    }

    /// Value of the `name` property.
    pub fn name(&self) -> Option<&str> {
        self.get("name")
    }

    /// Value of a property.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// All properties in declaration order.
    pub fn properties(&self) -> impl Iterator<Item = (&str, &str)> {
        self.properties.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Parses a numeric property.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Construction`] if the value is present but not a
    /// number.
    pub fn get_number<T: FromStr>(&self, key: &str) -> Result<Option<T>, RelayError> {
        self.get(key)
            .map(|raw| {
                raw.parse().map_err(|_| {
                    RelayError::construction(format!(
                        "{}: property '{key}' expects a number, got '{raw}'",
                        self.factory
                    ))
                })
            })
            .transpose()
    }

    fn parse(text: &str) -> Result<Self, RelayError> {
        let text = text.trim();
        let tokens = tokenize(text);
        let Some(first) = tokens.first() else {
            return Err(RelayError::construction("empty stage"));
        };

        if first.contains('/') {
            return Ok(Self::new(CAPS_FILTER).property("caps", text));
        }

        let mut stage = Self::new(unquote(first));
        for token in &tokens[1..] {
            let (key, value) = token.split_once('=').ok_or_else(|| {
                RelayError::construction(format!(
                    "{}: expected key=value, got '{token}'",
                    stage.factory
                ))
            })?;
            if key.is_empty() {
                return Err(RelayError::construction(format!(
                    "{}: property without a name in '{token}'",
                    stage.factory
                )));
            }
            stage = stage.property(key, unquote(value));
        }
        Ok(stage)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.factory)?;
        for (key, value) in &self.properties {
            write!(f, " {key}={}", quote(value))?;
        }
        Ok(())
    }
}

/// A parsed pipeline description: a non-empty chain of stages.
///
/// # Example
///
/// ```
/// use stream_relay::PipelineDescription;
///
/// let description: PipelineDescription =
///     "appsrc name=feed ! audioconvert ! autoaudiosink".parse().unwrap();
/// assert_eq!(description.stages().len(), 3);
/// assert_eq!(description.require_stage("feed").unwrap().factory(), "appsrc");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineDescription {
    stages: Vec<Stage>,
}

impl PipelineDescription {
    /// Builds a description from stages.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Construction`] if `stages` is empty.
    pub fn from_stages(stages: Vec<Stage>) -> Result<Self, RelayError> {
        if stages.is_empty() {
            return Err(RelayError::construction("pipeline has no stages"));
        }
        Ok(Self { stages })
    }

    /// Parses launch-style text.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Construction`] for empty descriptions, empty
    /// stages, malformed properties, or an unterminated quote.
    pub fn parse(text: &str) -> Result<Self, RelayError> {
        if text.trim().is_empty() {
            return Err(RelayError::construction("empty pipeline description"));
        }

        let stages = split_stages(text)?
            .into_iter()
            .map(Stage::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_stages(stages)
    }

    /// Decodes a media file into raw audio and ends in a named appsink.
    ///
    /// ```text
    /// filesrc location="<path>" ! decodebin ! audioconvert ! audioresample ! appsink caps="<caps>" name=<stage>
    /// ```
    pub fn file_decoder(path: impl AsRef<Path>, format: &FormatDescriptor, stage: &str) -> Self {
        Self {
            stages: vec![
                Stage::new("filesrc").property("location", path.as_ref().display().to_string()),
                Stage::new("decodebin"),
                Stage::new("audioconvert"),
                Stage::new("audioresample"),
                Stage::new("appsink")
                    .property("caps", format.to_caps())
                    .property("name", stage),
            ],
        }
    }

    /// Starts at a named appsrc and plays through the default audio output.
    ///
    /// ```text
    /// appsrc name=<stage> caps="<caps>" ! autoaudiosink
    /// ```
    pub fn app_player(format: &FormatDescriptor, stage: &str) -> Self {
        Self {
            stages: vec![
                Stage::new("appsrc")
                    .property("name", stage)
                    .property("caps", format.to_caps()),
                Stage::new("autoaudiosink"),
            ],
        }
    }

    /// All stages, upstream first.
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// The most upstream stage.
    pub fn first(&self) -> &Stage {
        &self.stages[0]
    }

    /// The most downstream stage.
    pub fn last(&self) -> &Stage {
        &self.stages[self.stages.len() - 1]
    }

    /// Finds a stage by its `name` property.
    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name() == Some(name))
    }

    /// Finds a stage by name or fails with [`RelayError::MissingStage`].
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::MissingStage`] if no stage carries `name`.
    pub fn require_stage(&self, name: &str) -> Result<&Stage, RelayError> {
        self.stage(name).ok_or_else(|| RelayError::MissingStage {
            name: name.to_string(),
        })
    }
}

impl FromStr for PipelineDescription {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PipelineDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, stage) in self.stages.iter().enumerate() {
            if i > 0 {
                f.write_str(" ! ")?;
            }
            write!(f, "{stage}")?;
        }
        Ok(())
    }
}

/// Splits on `!` outside of double quotes.
fn split_stages(text: &str) -> Result<Vec<&str>, RelayError> {
    let mut stages = Vec::new();
    let mut in_quote = false;
    let mut escaped = false;
    let mut start = 0;

    for (i, c) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quote => escaped = true,
            '"' => in_quote = !in_quote,
            '!' if !in_quote => {
                stages.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }

    if in_quote {
        return Err(RelayError::construction("unterminated quote"));
    }
    stages.push(&text[start..]);

    if let Some(pos) = stages.iter().position(|s| s.trim().is_empty()) {
        return Err(RelayError::construction(format!(
            "empty stage at position {}",
            pos + 1
        )));
    }
    Ok(stages)
}

/// Splits a stage on whitespace outside of double quotes, keeping the quotes.
fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quote = false;
    let mut escaped = false;

    for c in text.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quote => {
                current.push(c);
                escaped = true;
            }
            '"' => {
                in_quote = !in_quote;
                current.push(c);
            }
            c if c.is_whitespace() && !in_quote => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn unquote(value: &str) -> String {
    let Some(inner) = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
    else {
        return value.to_string();
    };

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn quote(value: &str) -> String {
    let needs_quotes = value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '!' | ',' | '"' | '\\' | '='));
    if !needs_quotes {
        return value.to_string();
    }
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_original_source_pipeline() {
        let text = r#"filesrc location="/music/hey jude.mp3" ! decodebin ! audioconvert ! audioresample ! appsink caps="audio/x-raw,format=S16LE,channels=2,rate=44100, layout=interleaved" name=myAppSinkElement"#;
        let description = PipelineDescription::parse(text).unwrap();

        assert_eq!(description.stages().len(), 5);
        assert_eq!(description.first().get("location"), Some("/music/hey jude.mp3"));

        let sink = description.require_stage("myAppSinkElement").unwrap();
        assert_eq!(sink.factory(), "appsink");
        let caps: FormatDescriptor = sink.get("caps").unwrap().parse().unwrap();
        assert_eq!(caps, FormatDescriptor::s16le(2, 44100));
    }

    #[test]
    fn test_parse_caps_filter_stage() {
        let description =
            PipelineDescription::parse("audiotestsrc ! audio/x-raw,rate=8000 ! fakesink").unwrap();
        let filter = &description.stages()[1];
        assert_eq!(filter.factory(), "capsfilter");
        assert_eq!(filter.get("caps"), Some("audio/x-raw,rate=8000"));
    }

    #[test]
    fn test_exclamation_inside_quotes() {
        let description =
            PipelineDescription::parse(r#"filesrc location="wow!.wav" ! fakesink"#).unwrap();
        assert_eq!(description.stages().len(), 2);
        assert_eq!(description.first().get("location"), Some("wow!.wav"));
    }

    #[test]
    fn test_escaped_quote_in_value() {
        let description =
            PipelineDescription::parse(r#"filesrc location="say \"hi\".wav""#).unwrap();
        assert_eq!(description.first().get("location"), Some(r#"say "hi".wav"#));
    }

    #[test]
    fn test_parse_errors() {
        assert!(PipelineDescription::parse("").is_err());
        assert!(PipelineDescription::parse("   ").is_err());
        assert!(PipelineDescription::parse("a ! ! b").is_err());
        assert!(PipelineDescription::parse("a !").is_err());
        assert!(PipelineDescription::parse("appsink sync").is_err());
        assert!(PipelineDescription::parse("appsink =x").is_err());
        assert!(PipelineDescription::parse(r#"filesrc location="open"#).is_err());
    }

    #[test]
    fn test_parse_error_is_construction() {
        let err = PipelineDescription::parse("a ! ! b").unwrap_err();
        assert!(err.is_construction());
        assert!(err.to_string().contains("position 2"));
    }

    #[test]
    fn test_missing_stage() {
        let description = PipelineDescription::parse("appsrc name=feed ! fakesink").unwrap();
        assert_eq!(
            description.require_stage("other").unwrap_err(),
            RelayError::MissingStage {
                name: "other".to_string()
            }
        );
    }

    #[test]
    fn test_display_parses_back() {
        let format = FormatDescriptor::s16le(2, 44100);
        let description = PipelineDescription::file_decoder("/tmp/a b.mp3", &format, "relay_sink");
        let text = description.to_string();
        assert!(text.starts_with(r#"filesrc location="/tmp/a b.mp3" ! decodebin"#));
        assert_eq!(PipelineDescription::parse(&text).unwrap(), description);
    }

    #[test]
    fn test_app_player_template() {
        let format = FormatDescriptor::s16le(2, 44100);
        let description = PipelineDescription::app_player(&format, "feed");
        assert_eq!(
            description.to_string(),
            r#"appsrc name=feed caps="audio/x-raw,format=S16LE,channels=2,rate=44100,layout=interleaved" ! autoaudiosink"#
        );
    }

    #[test]
    fn test_get_number() {
        let stage = Stage::new("mocksrc")
            .property("num-buffers", "10")
            .property("bad", "ten");
        assert_eq!(stage.get_number::<u64>("num-buffers").unwrap(), Some(10));
        assert_eq!(stage.get_number::<u64>("missing").unwrap(), None);
        assert!(stage.get_number::<u64>("bad").is_err());
    }

    #[test]
    fn test_from_stages_rejects_empty() {
        assert!(PipelineDescription::from_stages(Vec::new()).is_err());
    }
}
