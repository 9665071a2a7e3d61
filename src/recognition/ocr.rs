use std::sync::OnceLock;

use camino::Utf8PathBuf;
use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::Result;
use ocrs::{ImageSource, OcrEngine, OcrEngineParams, TextItem};
use tracing::{debug, info};

use super::{StructuredText, TextBlock, TextLine, TextRecognizer};
use crate::capture::ImageReference;

#[derive(Debug, Clone, Copy, PartialEq)]
struct LineBounds {
    top: f32,
    bottom: f32,
}

impl LineBounds {
    fn height(&self) -> f32 {
        self.bottom - self.top
    }
}

/// Splits reading-ordered lines into blocks. A block ends when the next line
/// moves back up the page (a new column) or sits further below than
/// `gap_ratio` line heights.
fn group_into_blocks(lines: Vec<(LineBounds, TextLine)>, gap_ratio: f32) -> Vec<TextBlock> {
    let mut blocks: Vec<TextBlock> = Vec::new();
    let mut previous: Option<LineBounds> = None;

    for (bounds, line) in lines {
        let starts_block = match previous {
            None => true,
            Some(prev) => {
                bounds.top < prev.top || bounds.top - prev.bottom > gap_ratio * prev.height()
            }
        };

        match blocks.last_mut() {
            Some(block) if !starts_block => block.lines.push(line),
            _ => blocks.push(TextBlock { lines: vec![line] }),
        }
        previous = Some(bounds);
    }

    blocks
}

/// Recognizer backed by the `ocrs` detection and recognition models.
pub struct OcrsRecognizer {
    detection_model: Utf8PathBuf,
    recognition_model: Utf8PathBuf,
    block_gap_ratio: f32,
    engine: OnceLock<std::result::Result<OcrEngine, String>>,
}

impl OcrsRecognizer {
    pub fn new(
        detection_model: Utf8PathBuf,
        recognition_model: Utf8PathBuf,
        block_gap_ratio: f32,
    ) -> Self {
        Self {
            detection_model,
            recognition_model,
            block_gap_ratio,
            engine: OnceLock::new(),
        }
    }

    fn load_engine(&self) -> Result<OcrEngine> {
        info!(
            "loading models {} and {}",
            self.detection_model, self.recognition_model
        );
        let mut params = OcrEngineParams::default();
        params.detection_model = Some(
            rten::Model::load_file(&self.detection_model)
                .map_err(|e| eyre!("unable to load {}: {e}", self.detection_model))?,
        );
        params.recognition_model = Some(
            rten::Model::load_file(&self.recognition_model)
                .map_err(|e| eyre!("unable to load {}: {e}", self.recognition_model))?,
        );
        OcrEngine::new(params).map_err(|e| eyre!("Failed to create engine: {}", e))
    }

    /// Loads the models on first use. A failed load is remembered, so every
    /// later call reports the same reason.
    fn engine(&self) -> Result<&OcrEngine> {
        self.engine
            .get_or_init(|| self.load_engine().map_err(|e| format!("{e:#}")))
            .as_ref()
            .map_err(|reason| eyre!("OCR model unavailable: {reason}"))
    }
}

impl TextRecognizer for OcrsRecognizer {
    fn name(&self) -> &'static str {
        "ocrs"
    }

    fn recognize(&self, reference: &ImageReference) -> Result<StructuredText> {
        let engine = self.engine()?;
        let image = image::open(reference.path())
            .wrap_err_with(|| format!("unable to decode {reference}"))?
            .into_rgb8();

        let img_source = ImageSource::from_bytes(image.as_raw(), image.dimensions())
            .map_err(|e| eyre!("Failed to read pixels: {}", e))?;
        let input = engine
            .prepare_input(img_source)
            .map_err(|e| eyre!("Failed to prepare input: {}", e))?;
        let word_rects = engine
            .detect_words(&input)
            .map_err(|e| eyre!("Failed to detect words: {}", e))?;
        let line_rects = engine.find_text_lines(&input, &word_rects);
        let recognized = engine
            .recognize_text(&input, &line_rects)
            .map_err(|e| eyre!("Failed to get text: {}", e))?;

        let lines: Vec<_> = recognized
            .iter()
            .flatten()
            .filter_map(|line| {
                let words: Vec<String> = line.words().map(|w| w.to_string()).collect();
                if words.is_empty() {
                    return None;
                }
                let rect = line.bounding_rect();
                let bounds = LineBounds {
                    top: rect.top() as f32,
                    bottom: rect.bottom() as f32,
                };
                Some((bounds, TextLine { words }))
            })
            .collect();
        debug!("{} lines in {reference}", lines.len());

        Ok(StructuredText {
            blocks: group_into_blocks(lines, self.block_gap_ratio),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::ImageOrigin;

    fn line(top: f32, bottom: f32, text: &str) -> (LineBounds, TextLine) {
        (
            LineBounds { top, bottom },
            TextLine {
                words: text.split(' ').map(String::from).collect(),
            },
        )
    }

    fn words(blocks: &[TextBlock]) -> Vec<Vec<String>> {
        blocks
            .iter()
            .map(|b| b.lines.iter().map(|l| l.words.join(" ")).collect())
            .collect()
    }

    #[test]
    fn nothing_in_nothing_out() {
        assert!(group_into_blocks(vec![], 1.0).is_empty());
    }

    #[test]
    fn tightly_spaced_lines_share_a_block() {
        let blocks = group_into_blocks(
            vec![
                line(0.0, 10.0, "Dear customer"),
                line(12.0, 22.0, "your invoice"),
                line(24.0, 34.0, "is attached"),
            ],
            1.0,
        );
        assert_eq!(
            words(&blocks),
            vec![vec!["Dear customer", "your invoice", "is attached"]]
        );
    }

    #[test]
    fn large_gaps_and_new_columns_start_blocks() {
        let blocks = group_into_blocks(
            vec![
                line(0.0, 10.0, "INVOICE 123"),
                line(40.0, 50.0, "Total 9.99"),
                line(52.0, 62.0, "Due today"),
                line(0.0, 10.0, "Page 1"),
            ],
            1.0,
        );
        assert_eq!(
            words(&blocks),
            vec![
                vec!["INVOICE 123"],
                vec!["Total 9.99", "Due today"],
                vec!["Page 1"],
            ]
        );
    }

    #[test]
    fn gap_ratio_controls_block_splitting() {
        let lines = || vec![line(0.0, 10.0, "a"), line(25.0, 35.0, "b")];
        assert_eq!(group_into_blocks(lines(), 1.0).len(), 2);
        assert_eq!(group_into_blocks(lines(), 2.0).len(), 1);
    }

    #[test]
    fn missing_models_are_reported_on_every_call() {
        let recognizer = OcrsRecognizer::new(
            "does/not/exist/detection.rten".into(),
            "does/not/exist/recognition.rten".into(),
            1.0,
        );
        let image = ImageReference::new("scan.png", ImageOrigin::Gallery);

        for _ in 0..2 {
            let err = recognizer.recognize(&image).unwrap_err();
            let message = format!("{err:#}");
            assert!(message.contains("OCR model unavailable"), "{message}");
            assert!(message.contains("detection.rten"), "{message}");
        }
    }
}
