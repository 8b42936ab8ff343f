/// Text extraction for Office Open XML slide decks (.pptx).
///
/// A .pptx is a zip of XML parts. Slide order is the `p:sldIdLst` of `ppt/presentation.xml`,
/// resolved to slide parts through `ppt/_rels/presentation.xml.rels`. Each slide's notes
/// part is found through the slide's own relationships; the notes text is the body
/// placeholder of that part.
///
/// Per slide the output is the notes text (when present) followed by the text of every
/// shape that has any, separated by single spaces. Slides are joined with newlines.
use std::collections::HashMap;
use std::io::{Cursor, Read};

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::warn;
use zip::result::ZipError;
use zip::ZipArchive;

use crate::error::AppError;

const PRESENTATION_PART: &str = "ppt/presentation.xml";
const PRESENTATION_RELS_PART: &str = "ppt/_rels/presentation.xml.rels";
const NOTES_SLIDE_REL_SUFFIX: &str = "/notesSlide";

type Archive<'a> = ZipArchive<Cursor<&'a [u8]>>;

pub fn extract_slide_deck(bytes: &[u8]) -> Result<String, AppError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| AppError::Extraction(format!("not a pptx archive: {e}")))?;

    let presentation = read_part(&mut archive, PRESENTATION_PART)?
        .ok_or_else(|| AppError::Extraction(format!("missing {PRESENTATION_PART}")))?;
    let relationships = match read_part(&mut archive, PRESENTATION_RELS_PART)? {
        Some(xml) => parse_relationships(&xml)?,
        None => HashMap::new(),
    };

    let mut slides = Vec::new();
    for rel_id in parse_slide_order(&presentation)? {
        let Some(rel) = relationships.get(&rel_id) else {
            warn!(rel_id = %rel_id, "slide relationship missing, skipping slide");
            continue;
        };
        let slide_path = resolve_target("ppt", &rel.target);
        let Some(slide_xml) = read_part(&mut archive, &slide_path)? else {
            warn!(part = %slide_path, "slide part missing, skipping slide");
            continue;
        };

        let mut parts: Vec<String> = Vec::new();
        if let Some(notes) = slide_notes(&mut archive, &slide_path)? {
            parts.push(notes);
        }
        parts.extend(
            parse_shapes(&slide_xml)?
                .into_iter()
                .map(|s| s.text())
                .filter(|t| !t.trim().is_empty()),
        );
        slides.push(parts.join(" "));
    }

    Ok(slides.join("\n"))
}

/// Notes text for the slide stored at `slide_path`, if it has a non-empty notes part.
fn slide_notes(archive: &mut Archive<'_>, slide_path: &str) -> Result<Option<String>, AppError> {
    let (dir, file) = slide_path.rsplit_once('/').unwrap_or(("", slide_path));
    let rels_path = format!("{dir}/_rels/{file}.rels");
    let Some(rels_xml) = read_part(archive, &rels_path)? else {
        return Ok(None);
    };

    let notes_target = parse_relationships(&rels_xml)?
        .into_values()
        .find(|r| r.kind.ends_with(NOTES_SLIDE_REL_SUFFIX))
        .map(|r| resolve_target(dir, &r.target));
    let Some(notes_path) = notes_target else {
        return Ok(None);
    };
    let Some(notes_xml) = read_part(archive, &notes_path)? else {
        return Ok(None);
    };

    let notes = parse_shapes(&notes_xml)?
        .into_iter()
        .filter(|s| s.placeholder.as_deref() == Some("body"))
        .map(|s| s.text())
        .collect::<Vec<_>>()
        .join("\n");
    Ok((!notes.trim().is_empty()).then_some(notes))
}

fn read_part(archive: &mut Archive<'_>, name: &str) -> Result<Option<String>, AppError> {
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(AppError::Extraction(format!("read {name}: {e}"))),
    };
    let mut xml = String::new();
    file.read_to_string(&mut xml)
        .map_err(|e| AppError::Extraction(format!("read {name}: {e}")))?;
    Ok(Some(xml))
}

/// Resolve a relationship target against the directory of its source part.
fn resolve_target(base_dir: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut segments: Vec<&str> = base_dir.split('/').filter(|s| !s.is_empty()).collect();
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

#[derive(Debug, Clone, PartialEq)]
struct Relationship {
    kind: String,
    target: String,
}

fn parse_relationships(xml: &str) -> Result<HashMap<String, Relationship>, AppError> {
    let mut reader = Reader::from_str(xml);
    let mut relationships = HashMap::new();
    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                let (Some(id), Some(kind), Some(target)) = (
                    attr_value(&e, "Id")?,
                    attr_value(&e, "Type")?,
                    attr_value(&e, "Target")?,
                ) else {
                    continue;
                };
                relationships.insert(id, Relationship { kind, target });
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(relationships)
}

/// Relationship ids of the slides, in presentation order.
fn parse_slide_order(xml: &str) -> Result<Vec<String>, AppError> {
    let mut reader = Reader::from_str(xml);
    let mut ids = Vec::new();
    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"sldId" => {
                if let Some(id) = attr_value(&e, "r:id")? {
                    ids.push(id);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(ids)
}

#[derive(Debug, Default)]
struct Shape {
    placeholder: Option<String>,
    paragraphs: Vec<String>,
}

impl Shape {
    fn text(&self) -> String {
        self.paragraphs.join("\n")
    }
}

/// Collect every `p:sp` shape with its placeholder type and paragraph text.
///
/// Shapes inside group shapes are included.
fn parse_shapes(xml: &str) -> Result<Vec<Shape>, AppError> {
    let mut reader = Reader::from_str(xml);
    let mut shapes = Vec::new();
    let mut current: Option<Shape> = None;
    let mut in_text_body = false;
    let mut in_run_text = false;

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"sp" => current = Some(Shape::default()),
                b"txBody" => in_text_body = current.is_some(),
                b"p" if in_text_body => {
                    if let Some(shape) = current.as_mut() {
                        shape.paragraphs.push(String::new());
                    }
                }
                b"t" if in_text_body => in_run_text = true,
                b"ph" => set_placeholder(current.as_mut(), &e)?,
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"ph" => set_placeholder(current.as_mut(), &e)?,
                b"p" if in_text_body => {
                    if let Some(shape) = current.as_mut() {
                        shape.paragraphs.push(String::new());
                    }
                }
                b"br" if in_text_body => push_text(current.as_mut(), "\n"),
                _ => {}
            },
            Event::Text(t) if in_run_text => {
                let text = t.unescape().map_err(xml_error)?;
                push_text(current.as_mut(), &text);
            }
            Event::CData(t) if in_run_text => {
                push_text(current.as_mut(), &String::from_utf8_lossy(&t));
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_run_text = false,
                b"txBody" => in_text_body = false,
                b"sp" => {
                    if let Some(shape) = current.take() {
                        shapes.push(shape);
                    }
                    in_text_body = false;
                    in_run_text = false;
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(shapes)
}

fn set_placeholder(shape: Option<&mut Shape>, e: &BytesStart<'_>) -> Result<(), AppError> {
    if let Some(shape) = shape {
        // An untyped placeholder is a content ("obj") placeholder.
        shape.placeholder = Some(attr_value(e, "type")?.unwrap_or_else(|| "obj".to_string()));
    }
    Ok(())
}

fn push_text(shape: Option<&mut Shape>, text: &str) {
    let Some(shape) = shape else {
        return;
    };
    if shape.paragraphs.is_empty() {
        shape.paragraphs.push(String::new());
    }
    if let Some(last) = shape.paragraphs.last_mut() {
        last.push_str(text);
    }
}

fn attr_value(e: &BytesStart<'_>, name: &str) -> Result<Option<String>, AppError> {
    let Some(attr) = e.try_get_attribute(name).map_err(xml_error)? else {
        return Ok(None);
    };
    let value = attr.unescape_value().map_err(xml_error)?;
    Ok(Some(value.into_owned()))
}

fn xml_error(e: impl std::fmt::Display) -> AppError {
    AppError::Extraction(format!("malformed slide xml: {e}"))
}
