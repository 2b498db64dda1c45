//! SVG export of annotation overlays
//!
//! Renders every visible layer of a document as polygons in image pixel
//! space, sized to the source image so the output can be laid directly over
//! it:
//! - one `<g>` per layer, bottom layer first
//! - one `<polygon>` per shape, filled translucent in the shape's color
//! - labels as `<title>` so they show on hover

use std::fmt::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use regionmark_core::{AnnotationDocument, Layer, Shape};

/// Fill opacity for region interiors
const FILL_OPACITY: f64 = 0.25;
const STROKE_WIDTH: f64 = 2.0;

/// Export a document to an SVG string
pub fn export_svg(doc: &AnnotationDocument) -> String {
    let mut output = String::new();
    // writing into a String cannot fail
    let _ = render_document(&mut output, doc);
    output
}

/// Save SVG to a file
pub fn save_svg(doc: &AnnotationDocument, path: &Path) -> Result<()> {
    let svg = export_svg(doc);
    std::fs::write(path, svg).with_context(|| format!("Failed to save to {:?}", path))?;
    Ok(())
}

fn render_document(output: &mut String, doc: &AnnotationDocument) -> fmt::Result {
    let (w, h) = (doc.image_size.w, doc.image_size.h);
    writeln!(
        output,
        r#"<?xml version="1.0" encoding="UTF-8"?>
<svg xmlns="http://www.w3.org/2000/svg"
     width="{w}" height="{h}"
     viewBox="0 0 {w} {h}"
     data-image-id="{}">"#,
        escape_xml(&doc.image_id)
    )?;

    for layer in doc.layers.iter().filter(|l| l.visible) {
        render_layer(output, doc, layer)?;
    }

    writeln!(output, "</svg>")
}

fn render_layer(output: &mut String, doc: &AnnotationDocument, layer: &Layer) -> fmt::Result {
    writeln!(
        output,
        r#"  <g id="layer-{}" data-name="{}">"#,
        escape_xml(&layer.id.0),
        escape_xml(&layer.name)
    )?;
    for shape in &layer.shapes {
        render_shape(output, doc, shape)?;
    }
    writeln!(output, "  </g>")
}

fn render_shape(output: &mut String, doc: &AnnotationDocument, shape: &Shape) -> fmt::Result {
    let points = shape
        .image_vertices(doc.image_size)
        .iter()
        .map(|v| format!("{:.2},{:.2}", v.x, v.y))
        .collect::<Vec<_>>()
        .join(" ");
    let color = escape_xml(&shape.color);
    write!(
        output,
        r#"    <polygon id="shape-{}" points="{}" fill="{}" fill-opacity="{}" stroke="{}" stroke-width="{}" fill-rule="evenodd""#,
        escape_xml(&shape.id.0),
        points,
        color,
        FILL_OPACITY,
        color,
        STROKE_WIDTH
    )?;
    match &shape.label {
        Some(label) => writeln!(output, "><title>{}</title></polygon>", escape_xml(label)),
        None => writeln!(output, "/>"),
    }
}

/// Escape special XML characters
fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
