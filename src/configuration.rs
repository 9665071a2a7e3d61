use camino::Utf8PathBuf;
use color_eyre::Result;
use config::Config;
use serde::Deserialize;

use crate::format::FormatPolicy;
use crate::queue::SupersedePolicy;

pub const DEFAULT_PLACEHOLDER: &str = "Recognized text will appear here.";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// The directory where captured stills are written.
    pub capture_directory: Utf8PathBuf,
    /// Path to the `ocrs` text detection model.
    pub detection_model: Utf8PathBuf,
    /// Path to the `ocrs` text recognition model.
    pub recognition_model: Utf8PathBuf,
    /// Which display the screen camera captures.
    pub display_index: usize,
    /// Text shown before the first recognition finishes.
    pub placeholder_text: String,
    /// How recognized words, lines and blocks are joined for display.
    pub format: FormatPolicy,
    /// A vertical gap larger than this many line heights starts a new block.
    pub block_gap_ratio: f32,
    /// What happens to a recognition that is still running when another one is submitted.
    pub supersede: SupersedePolicy,
    /// Delete captured stills once they have been recognized.
    pub discard_captures: bool,
}

impl Default for Configuration {
    fn default() -> Self {
        let capture_directory = Utf8PathBuf::from_path_buf(std::env::temp_dir())
            .map(|tmp| tmp.join("snaptext"))
            .unwrap_or_else(|_| Utf8PathBuf::from("captures"));

        Self {
            capture_directory,
            detection_model: "models/text-detection.rten".into(),
            recognition_model: "models/text-recognition.rten".into(),
            display_index: 0,
            placeholder_text: DEFAULT_PLACEHOLDER.into(),
            format: FormatPolicy::default(),
            block_gap_ratio: 1.0,
            supersede: SupersedePolicy::default(),
            discard_captures: true,
        }
    }
}

pub fn load() -> Result<Configuration> {
    let settings = Config::builder()
        .add_source(config::File::with_name("snaptext").required(false))
        .add_source(
            config::Environment::with_prefix("SNAPTEXT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    settings.try_deserialize().map_err(From::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_flatten_lines_and_keep_captures_transient() {
        let configuration = Configuration::default();
        assert_eq!(configuration.placeholder_text, DEFAULT_PLACEHOLDER);
        assert_eq!(configuration.format, FormatPolicy::default());
        assert_eq!(configuration.supersede, SupersedePolicy::LastCompleted);
        assert!(configuration.discard_captures);
        assert!(configuration.capture_directory.as_str().ends_with("snaptext"));
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let settings = Config::builder()
            .add_source(config::File::from_str(
                r#"
                display_index = 2
                supersede = "cancel_superseded"

                [format]
                line_separator = "\n"
                "#,
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap();
        let configuration: Configuration = settings.try_deserialize().unwrap();

        assert_eq!(configuration.display_index, 2);
        assert_eq!(configuration.supersede, SupersedePolicy::CancelSuperseded);
        assert_eq!(configuration.format.line_separator, "\n");
        assert_eq!(configuration.format.word_separator, " ");
        assert_eq!(configuration.format.block_separator, "\n");
        assert_eq!(configuration.block_gap_ratio, 1.0);
    }
}
