use std::fmt;
use std::path::{Path, PathBuf};

use genpdf::elements::{self, Paragraph};
use genpdf::{fonts, style, Alignment, Element, Margins};
use tracing::info;

use crate::compose::{CertificateDocument, Section, Span, TextAlign};

/// Font families probed in order inside each candidate directory.
const FONT_FAMILIES: [&str; 3] = ["Roboto", "LiberationSans", "DejaVuSans"];

/// System locations to fall back to when the workspace ships no fonts.
const SYSTEM_FONT_DIRS: [&str; 4] = [
    "/usr/share/fonts/truetype/liberation",
    "/usr/share/fonts/truetype/dejavu",
    "/usr/share/fonts/TTF",
    "/Library/Fonts",
];

/// Rendering failures split into the two cases operators care about: a
/// deployment missing its font resources versus the PDF backend rejecting a
/// document.
#[derive(Debug)]
pub enum RenderError {
    ResourceMissing(String),
    Backend(String),
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::ResourceMissing(msg) => write!(f, "rendering resource missing: {}", msg),
            RenderError::Backend(msg) => write!(f, "pdf backend error: {}", msg),
        }
    }
}

impl std::error::Error for RenderError {}

/// Load the certificate font family. Called once per process; the result is
/// cached on the app state so rendering itself stays I/O-free.
pub fn load_fonts(workspace: Option<&Path>) -> Result<fonts::FontFamily<fonts::FontData>, RenderError> {
    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Ok(dir) = std::env::var("SKLPORTAL_FONT_DIR") {
        candidates.push(PathBuf::from(dir));
    }
    if let Some(ws) = workspace {
        candidates.push(ws.join("assets").join("fonts"));
    }
    candidates.extend(SYSTEM_FONT_DIRS.iter().map(PathBuf::from));

    for dir in &candidates {
        if !dir.is_dir() {
            continue;
        }
        for family in FONT_FAMILIES {
            if let Ok(loaded) = fonts::from_files(dir, family, None) {
                info!(dir = %dir.display(), family, "certificate fonts loaded");
                return Ok(loaded);
            }
        }
    }

    Err(RenderError::ResourceMissing(format!(
        "no usable TTF family ({}) found under {}; set SKLPORTAL_FONT_DIR or add \
         assets/fonts to the workspace",
        FONT_FAMILIES.join(", "),
        candidates
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    )))
}

/// Turn a composed certificate into PDF bytes. Pure transformation: all
/// content decisions were made by the composer.
pub fn render(
    doc: &CertificateDocument,
    family: &fonts::FontFamily<fonts::FontData>,
) -> Result<Vec<u8>, RenderError> {
    let mut pdf = genpdf::Document::new(family.clone());
    pdf.set_title(doc.doc_title.as_str());
    pdf.set_paper_size(genpdf::PaperSize::A4);
    pdf.set_line_spacing(1.2);

    let mut decorator = genpdf::SimplePageDecorator::new();
    decorator.set_margins(Margins::trbl(10.0, 14.0, 10.0, 14.0));
    pdf.set_page_decorator(decorator);

    for section in &doc.sections {
        match section {
            Section::Letterhead {
                agency,
                school,
                address,
                npsn_line,
                contact_line,
            } => {
                pdf.push(centered(agency, style::Style::new().bold().with_font_size(14)));
                pdf.push(centered(school, style::Style::new().bold().with_font_size(18)));
                pdf.push(centered(address, style::Style::new().with_font_size(10)));
                pdf.push(centered(npsn_line, style::Style::new().with_font_size(9)));
                pdf.push(centered(contact_line, style::Style::new().with_font_size(9)));
                // Thin rule below the letterhead.
                pdf.push(centered(
                    &"_".repeat(80),
                    style::Style::new().with_font_size(6),
                ));
                pdf.push(elements::Break::new(1.0));
            }
            Section::Title { text, number } => {
                pdf.push(centered(text, style::Style::new().bold().with_font_size(14)));
                pdf.push(centered(number, style::Style::new().with_font_size(12)));
                pdf.push(elements::Break::new(1.0));
            }
            Section::Paragraph { spans, align } => {
                let mut p = Paragraph::default();
                for span in spans {
                    p.push_styled(span.text.as_str(), span_style(span));
                }
                pdf.push(p.aligned(map_align(*align)));
                pdf.push(elements::Break::new(0.5));
            }
            Section::Biodata {
                rows,
                photo_caption,
            } => {
                let mut fields = elements::TableLayout::new(vec![2, 4]);
                for row in rows {
                    let value_style = if row.bold_value {
                        style::Style::new().bold().with_font_size(11)
                    } else {
                        style::Style::new().with_font_size(11)
                    };
                    fields
                        .row()
                        .element(
                            Paragraph::new(row.label.as_str())
                                .styled(style::Style::new().with_font_size(11)),
                        )
                        .element(
                            Paragraph::new(format!(": {}", row.value)).styled(value_style),
                        )
                        .push()
                        .map_err(backend)?;
                }

                let mut photo = elements::LinearLayout::vertical();
                photo.push(elements::Break::new(2.0));
                for line in photo_caption {
                    photo.push(centered(
                        line,
                        style::Style::new()
                            .with_font_size(8)
                            .with_color(style::Color::Greyscale(110)),
                    ));
                }
                photo.push(elements::Break::new(2.0));

                let mut layout = elements::TableLayout::new(vec![5, 2]);
                layout
                    .row()
                    .element(fields)
                    .element(elements::FramedElement::new(photo).padded(1))
                    .push()
                    .map_err(backend)?;
                pdf.push(layout);
                pdf.push(elements::Break::new(0.5));
            }
            Section::StatusLine { text } => {
                pdf.push(centered(text, style::Style::new().bold().with_font_size(18)));
                pdf.push(elements::Break::new(0.5));
            }
            Section::GradeTable {
                title,
                view,
                average_label,
            } => {
                pdf.push(centered(title, style::Style::new().bold().with_font_size(12)));
                pdf.push(elements::Break::new(0.3));

                let header = style::Style::new().bold().with_font_size(10);
                let cell = style::Style::new().with_font_size(9);

                let mut table = elements::TableLayout::new(vec![1, 6, 1]);
                table.set_cell_decorator(elements::FrameCellDecorator::new(true, true, false));
                table
                    .row()
                    .element(Paragraph::new("NO.").aligned(Alignment::Center).styled(header).padded(1))
                    .element(Paragraph::new("MATA PELAJARAN").styled(header).padded(1))
                    .element(Paragraph::new("NILAI").aligned(Alignment::Center).styled(header).padded(1))
                    .push()
                    .map_err(backend)?;

                for group in &view.groups {
                    table
                        .row()
                        .element(Paragraph::new(""))
                        .element(
                            Paragraph::new(group.label.to_uppercase())
                                .styled(header)
                                .padded(1),
                        )
                        .element(Paragraph::new(""))
                        .push()
                        .map_err(backend)?;
                    for line in &group.lines {
                        table
                            .row()
                            .element(
                                Paragraph::new(line.seq.to_string())
                                    .aligned(Alignment::Center)
                                    .styled(cell)
                                    .padded(1),
                            )
                            .element(Paragraph::new(line.subject_name.as_str()).styled(cell).padded(1))
                            .element(
                                Paragraph::new(line.value_display.as_str())
                                    .aligned(Alignment::Center)
                                    .styled(cell)
                                    .padded(1),
                            )
                            .push()
                            .map_err(backend)?;
                    }
                }

                if let Some(avg) = &view.average_display {
                    table
                        .row()
                        .element(Paragraph::new(""))
                        .element(
                            Paragraph::new(average_label.as_str())
                                .aligned(Alignment::Right)
                                .styled(header)
                                .padded(1),
                        )
                        .element(
                            Paragraph::new(avg.as_str())
                                .aligned(Alignment::Center)
                                .styled(header)
                                .padded(1),
                        )
                        .push()
                        .map_err(backend)?;
                }

                pdf.push(table);
                pdf.push(elements::Break::new(1.0));
            }
            Section::Signature(sig) => {
                pdf.push(elements::Break::new(1.0));
                pdf.push(right(&sig.city_and_date, style::Style::new().with_font_size(11)));
                pdf.push(right(&sig.role_label, style::Style::new().with_font_size(11)));
                pdf.push(elements::Break::new(3.0));
                pdf.push(right(&sig.name, style::Style::new().bold().with_font_size(11)));
                pdf.push(right(&sig.id_line, style::Style::new().with_font_size(11)));
            }
        }
    }

    let mut out = Vec::new();
    pdf.render(&mut out).map_err(backend)?;
    Ok(out)
}

fn centered(text: &str, s: style::Style) -> impl Element {
    Paragraph::new(text).aligned(Alignment::Center).styled(s)
}

fn right(text: &str, s: style::Style) -> impl Element {
    Paragraph::new(text).aligned(Alignment::Right).styled(s)
}

fn span_style(span: &Span) -> style::Style {
    let mut s = style::Style::new().with_font_size(11);
    if span.bold {
        s = s.bold();
    }
    if span.italic {
        s = s.italic();
    }
    s
}

fn map_align(align: TextAlign) -> Alignment {
    match align {
        TextAlign::Left => Alignment::Left,
        TextAlign::Center => Alignment::Center,
        TextAlign::Right => Alignment::Right,
    }
}

fn backend(e: genpdf::error::Error) -> RenderError {
    RenderError::Backend(e.to_string())
}
