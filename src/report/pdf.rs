//! A4 analysis report rendered with the PDF builtin Helvetica fonts.

use std::io::BufWriter;

use printpdf::*;

use super::json::RiskOverview;
use super::ReportError;
use crate::config::APP_NAME;
use crate::models::AnalysisRecord;

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const TOP: f32 = 280.0;
const BOTTOM: f32 = 20.0;
const LEFT: f32 = 20.0;
const INDENT: f32 = 25.0;

const DISCLAIMER: &str = "This report was generated automatically by an AI model and is provided \
for information only. It is not legal advice. Clauses may be missed or misclassified; \
review the original document with a qualified professional before relying on it.";

/// Cursor over a growing document that starts a new page when the
/// next line would cross the bottom margin.
struct PageWriter {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    font: IndirectFontRef,
    bold: IndirectFontRef,
    y: f32,
    pages: usize,
}

impl PageWriter {
    fn new(title: &str) -> Result<Self, ReportError> {
        let (doc, page1, layer1) =
            PdfDocument::new(title, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
        let layer = doc.get_page(page1).get_layer(layer1);
        let font = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| ReportError::Pdf(format!("font error: {e}")))?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| ReportError::Pdf(format!("font error: {e}")))?;
        Ok(Self {
            doc,
            layer,
            font,
            bold,
            y: TOP,
            pages: 1,
        })
    }

    fn ensure_room(&mut self, needed: f32) {
        if self.y - needed >= BOTTOM {
            return;
        }
        self.pages += 1;
        let (page, layer) = self.doc.add_page(
            Mm(PAGE_WIDTH),
            Mm(PAGE_HEIGHT),
            format!("Layer {}", self.pages),
        );
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.y = TOP;
    }

    fn text(&mut self, text: &str, size: f32, x: f32, leading: f32, bold: bool) {
        self.ensure_room(leading);
        let font = if bold { &self.bold } else { &self.font };
        self.layer.use_text(latin1(text), size, Mm(x), Mm(self.y), font);
        self.y -= leading;
    }

    fn wrapped(&mut self, text: &str, size: f32, x: f32, max_chars: usize, leading: f32) {
        for line in wrap_text(text, max_chars) {
            self.text(&line, size, x, leading, false);
        }
    }

    fn heading(&mut self, text: &str) {
        self.space(4.0);
        self.ensure_room(12.0);
        self.text(text, 11.0, LEFT, 6.0, true);
    }

    fn space(&mut self, mm: f32) {
        self.y -= mm;
    }

    fn finish(self) -> Result<Vec<u8>, ReportError> {
        let mut buf = BufWriter::new(Vec::new());
        self.doc
            .save(&mut buf)
            .map_err(|e| ReportError::Pdf(format!("save error: {e}")))?;
        buf.into_inner()
            .map_err(|e| ReportError::Pdf(format!("buffer error: {e}")))
    }
}

pub fn render_pdf(record: &AnalysisRecord) -> Result<Vec<u8>, ReportError> {
    let result = &record.result;
    let meta = &record.metadata;
    let title = format!("Legal Document Analysis: {}", meta.original_filename);

    let mut w = PageWriter::new(&title)?;
    w.text(&title, 14.0, LEFT, 7.0, true);
    w.text(&format!("Generated by {APP_NAME}"), 8.0, LEFT, 8.0, false);

    w.heading("DOCUMENT");
    for line in [
        format!("Document type: {}", result.document_type),
        format!("Confidence: {:.0}%", result.confidence * 100.0),
        format!(
            "Pages: {}   Words: {}   Size: {:.1} KB",
            meta.total_pages,
            meta.word_count,
            meta.size_bytes as f64 / 1024.0
        ),
        format!("Analyzed: {}", record.created_at.format("%Y-%m-%d %H:%M UTC")),
        format!("Analysis ID: {}", record.content_hash),
    ] {
        w.text(&line, 9.0, INDENT, 4.5, false);
    }
    if result.partial {
        w.text(
            "Note: only part of the document could be analyzed.",
            9.0,
            INDENT,
            4.5,
            true,
        );
    }
    for note in &meta.processing_notes {
        w.wrapped(&format!("- {note}"), 8.0, INDENT, 95, 4.0);
    }

    w.heading("SUMMARY");
    w.wrapped(&result.summary, 9.0, INDENT, 90, 4.5);

    let overview = RiskOverview::from_clauses(&result.key_clauses);
    w.heading("RISK OVERVIEW");
    w.text(
        &format!(
            "High: {}   Medium: {}   Low: {}   Average risk score: {:.1}/10",
            overview.high, overview.medium, overview.low, overview.average_risk_score
        ),
        9.0,
        INDENT,
        4.5,
        false,
    );

    w.heading("KEY CLAUSES");
    if result.key_clauses.is_empty() {
        w.text("No key clauses were identified.", 9.0, INDENT, 4.5, false);
    }
    for (i, clause) in result.key_clauses.iter().enumerate() {
        w.space(2.0);
        w.ensure_room(14.0);
        w.text(
            &format!("{}. {}", i + 1, clause.clause_type),
            10.0,
            INDENT,
            5.0,
            true,
        );
        let page = clause
            .page
            .map(|p| format!("   Page: {p}"))
            .unwrap_or_default();
        w.text(
            &format!(
                "Importance: {}   Risk: {:.1}/10   Classification: {}{page}",
                clause.importance.as_str().to_uppercase(),
                clause.risk_score,
                clause.classification
            ),
            8.0,
            INDENT + 5.0,
            4.5,
            false,
        );
        w.wrapped(&clause.content, 9.0, INDENT + 5.0, 85, 4.5);
    }

    w.space(6.0);
    w.ensure_room(20.0);
    w.wrapped(DISCLAIMER, 7.0, LEFT, 110, 3.5);

    tracing::debug!(pages = w.pages, clauses = result.key_clauses.len(), "PDF report rendered");
    w.finish()
}

/// Builtin PDF fonts only cover Latin-1; fold the common typographic
/// characters and replace the rest.
fn latin1(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' => '\'',
            '\u{201C}' | '\u{201D}' => '"',
            '\u{2013}' | '\u{2014}' => '-',
            '\u{2022}' => '*',
            c if (c as u32) < 0x100 && !c.is_control() => c,
            _ => '?',
        })
        .collect()
}

/// Greedy word wrap on character count.
fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let current_len = current.chars().count();
        if current_len + word.chars().count() + 1 > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}
