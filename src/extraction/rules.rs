//! Rule-based extraction without any LLM
//!
//! Per-format handlers for digital PDF, plain text, markdown, and CSV. The
//! PDF handler estimates per-page text density and flags pages that look
//! scanned; the caller decides whether to escalate those to vision.

use crate::error::{ExtractionError, Result};
use crate::pdf::{open_document, page_size};
use pulldown_cmark::{Event, Parser, Tag, TagEnd};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

/// Supported document formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    Text,
    Markdown,
    Csv,
}

impl DocumentFormat {
    /// Detect the format from a file extension
    pub fn from_path(path: &str) -> Result<Self> {
        let ext = Path::new(path)
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_lowercase();

        match ext.as_str() {
            "pdf" => Ok(Self::Pdf),
            "txt" => Ok(Self::Text),
            "md" | "markdown" => Ok(Self::Markdown),
            "csv" => Ok(Self::Csv),
            other => Err(ExtractionError::InvalidFormat(other.to_string()).into()),
        }
    }
}

/// Per-page output from rule-based extraction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulePage {
    pub page_number: u32,
    pub text: String,
    pub word_count: usize,
    /// Words per square point
    pub text_density: f64,
    /// Density fell below the configured threshold
    pub probably_scanned: bool,
}

/// Structural information where the format has any
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentStructure {
    pub headings: Vec<Heading>,
    pub csv_headers: Vec<String>,
    pub csv_row_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heading {
    pub level: u32,
    pub text: String,
}

/// Output of a rule-based extraction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleExtraction {
    pub format: DocumentFormat,
    pub text: String,
    pub pages: Vec<RulePage>,
    pub metadata: BTreeMap<String, String>,
    pub structure: DocumentStructure,
    /// More than half of the pages look scanned
    pub is_scanned: bool,
}

/// Configuration for rule-based extraction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleExtractorConfig {
    /// Pages below this words-per-square-point density look scanned
    pub min_text_density: f64,
}

impl Default for RuleExtractorConfig {
    fn default() -> Self {
        Self {
            // Roughly 50 words on an A4 page
            min_text_density: 1.0e-4,
        }
    }
}

/// Rule-based extractor dispatching on document format
pub struct RuleBasedExtractor {
    config: RuleExtractorConfig,
}

impl Default for RuleBasedExtractor {
    fn default() -> Self {
        Self::new(RuleExtractorConfig::default())
    }
}

impl RuleBasedExtractor {
    pub fn new(config: RuleExtractorConfig) -> Self {
        Self { config }
    }

    /// Extract text and structure from a file based on its extension
    pub fn extract(&self, file_path: &str) -> Result<RuleExtraction> {
        if !Path::new(file_path).exists() {
            return Err(ExtractionError::InputNotFound(file_path.to_string()).into());
        }

        let format = DocumentFormat::from_path(file_path)?;
        info!("Rule-based extraction of {:?} file: {}", format, file_path);

        match format {
            DocumentFormat::Pdf => self.extract_pdf(file_path),
            DocumentFormat::Text => self.extract_text(file_path),
            DocumentFormat::Markdown => self.extract_markdown(file_path),
            DocumentFormat::Csv => self.extract_csv(file_path),
        }
    }

    fn extract_pdf(&self, file_path: &str) -> Result<RuleExtraction> {
        let doc = open_document(file_path)?;
        let page_ids: Vec<_> = doc.get_pages().into_iter().collect();

        // Whole-document text through pdf-extract; pages re-split below from
        // per-page extraction for density estimates
        let full_text = pdf_extract::extract_text(file_path)
            .map_err(|e| ExtractionError::Pdf(e.to_string()))?;

        let mut pages = Vec::new();
        let mut scanned_pages = 0usize;

        for (page_number, page_id) in &page_ids {
            let page_text = doc
                .extract_text(&[*page_number])
                .unwrap_or_default();
            let word_count = page_text.split_whitespace().count();
            let (width, height) = page_size(&doc, *page_id);
            let area = width * height;
            let text_density = if area > 0.0 {
                word_count as f64 / area
            } else {
                0.0
            };

            let probably_scanned = text_density < self.config.min_text_density;
            if probably_scanned {
                scanned_pages += 1;
            }

            pages.push(RulePage {
                page_number: *page_number,
                text: page_text,
                word_count,
                text_density,
                probably_scanned,
            });
        }

        let is_scanned = !pages.is_empty() && scanned_pages * 2 > pages.len();
        if is_scanned {
            warn!(
                "PDF appears to be scanned ({} of {} pages below density threshold)",
                scanned_pages,
                pages.len()
            );
        }

        let mut metadata = BTreeMap::new();
        metadata.insert("page_count".to_string(), pages.len().to_string());

        Ok(RuleExtraction {
            format: DocumentFormat::Pdf,
            text: full_text,
            pages,
            metadata,
            structure: DocumentStructure::default(),
            is_scanned,
        })
    }

    fn extract_text(&self, file_path: &str) -> Result<RuleExtraction> {
        let text = std::fs::read_to_string(file_path)?;
        let word_count = text.split_whitespace().count();

        Ok(RuleExtraction {
            format: DocumentFormat::Text,
            pages: vec![RulePage {
                page_number: 1,
                text: text.clone(),
                word_count,
                text_density: 0.0,
                probably_scanned: false,
            }],
            text,
            metadata: BTreeMap::new(),
            structure: DocumentStructure::default(),
            is_scanned: false,
        })
    }

    fn extract_markdown(&self, file_path: &str) -> Result<RuleExtraction> {
        let source = std::fs::read_to_string(file_path)?;

        let mut text = String::new();
        let mut headings = Vec::new();
        let mut heading_level: Option<u32> = None;
        let mut heading_text = String::new();

        for event in Parser::new(&source) {
            match event {
                Event::Start(Tag::Heading { level, .. }) => {
                    heading_level = Some(level as u32);
                    heading_text.clear();
                }
                Event::End(TagEnd::Heading(_)) => {
                    if let Some(level) = heading_level.take() {
                        headings.push(Heading {
                            level,
                            text: heading_text.trim().to_string(),
                        });
                    }
                    text.push('\n');
                }
                Event::Text(content) | Event::Code(content) => {
                    if heading_level.is_some() {
                        heading_text.push_str(&content);
                    }
                    text.push_str(&content);
                }
                Event::End(TagEnd::Paragraph) | Event::End(TagEnd::Item) => text.push('\n'),
                Event::SoftBreak | Event::HardBreak => text.push('\n'),
                _ => {}
            }
        }

        let word_count = text.split_whitespace().count();

        Ok(RuleExtraction {
            format: DocumentFormat::Markdown,
            pages: vec![RulePage {
                page_number: 1,
                text: text.clone(),
                word_count,
                text_density: 0.0,
                probably_scanned: false,
            }],
            text,
            metadata: BTreeMap::new(),
            structure: DocumentStructure {
                headings,
                ..Default::default()
            },
            is_scanned: false,
        })
    }

    fn extract_csv(&self, file_path: &str) -> Result<RuleExtraction> {
        let mut reader = csv::Reader::from_path(file_path)
            .map_err(|e| ExtractionError::InvalidFormat(e.to_string()))?;

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| ExtractionError::InvalidFormat(e.to_string()))?
            .iter()
            .map(|h| h.to_string())
            .collect();

        let mut lines = vec![headers.join(" | ")];
        let mut row_count = 0usize;

        for record in reader.records() {
            let record = record.map_err(|e| ExtractionError::InvalidFormat(e.to_string()))?;
            lines.push(record.iter().collect::<Vec<_>>().join(" | "));
            row_count += 1;
        }

        let text = lines.join("\n");
        let word_count = text.split_whitespace().count();

        Ok(RuleExtraction {
            format: DocumentFormat::Csv,
            pages: vec![RulePage {
                page_number: 1,
                text: text.clone(),
                word_count,
                text_density: 0.0,
                probably_scanned: false,
            }],
            text,
            metadata: BTreeMap::new(),
            structure: DocumentStructure {
                csv_headers: headers,
                csv_row_count: row_count,
                ..Default::default()
            },
            is_scanned: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_format_detection() {
        assert_eq!(
            DocumentFormat::from_path("a/drawing.PDF").unwrap(),
            DocumentFormat::Pdf
        );
        assert_eq!(
            DocumentFormat::from_path("notes.md").unwrap(),
            DocumentFormat::Markdown
        );
        assert!(DocumentFormat::from_path("slides.pptx").is_err());
    }

    #[test]
    fn test_missing_file() {
        let extractor = RuleBasedExtractor::default();
        let result = extractor.extract("/nonexistent/file.txt");
        assert!(result.is_err());
    }

    #[test]
    fn test_text_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.txt");
        std::fs::write(&path, "one two three").unwrap();

        let extractor = RuleBasedExtractor::default();
        let extraction = extractor.extract(path.to_str().unwrap()).unwrap();

        assert_eq!(extraction.format, DocumentFormat::Text);
        assert_eq!(extraction.pages.len(), 1);
        assert_eq!(extraction.pages[0].word_count, 3);
        assert!(!extraction.is_scanned);
    }

    #[test]
    fn test_markdown_structure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.md");
        std::fs::write(
            &path,
            "# Project\n\nSome intro text.\n\n## Schedule\n\nMore detail here.",
        )
        .unwrap();

        let extractor = RuleBasedExtractor::default();
        let extraction = extractor.extract(path.to_str().unwrap()).unwrap();

        assert_eq!(extraction.structure.headings.len(), 2);
        assert_eq!(extraction.structure.headings[0].text, "Project");
        assert_eq!(extraction.structure.headings[1].level, 2);
        assert!(extraction.text.contains("Some intro text."));
    }

    #[test]
    fn test_csv_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schedule.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "MARK,TYPE,QTY").unwrap();
        writeln!(file, "A,HEX BOLT,15").unwrap();
        writeln!(file, "B,RIVET,8").unwrap();

        let extractor = RuleBasedExtractor::default();
        let extraction = extractor.extract(path.to_str().unwrap()).unwrap();

        assert_eq!(
            extraction.structure.csv_headers,
            vec!["MARK", "TYPE", "QTY"]
        );
        assert_eq!(extraction.structure.csv_row_count, 2);
        assert!(extraction.text.contains("A | HEX BOLT | 15"));
    }
}
