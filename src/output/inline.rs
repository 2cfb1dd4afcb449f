//! Inline markup for reflowable books.
//!
//! Annotations are written into the text itself, so each unit is rewritten in
//! one left-to-right pass over occurrences sorted by position. Entity and
//! lemma spans never overlap here: conflicts were discarded during scanning.

use std::iter;

use quick_xml::escape::escape;
use serde::Serialize;
use tracing::debug;

use crate::{
    nlp::senses::Lexicon,
    output::{Annotation, AnnotationSet, UnitAnnotations},
};

const XHTML_HEAD: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">"#;

const COMMONS_FILE_PATH: &str = "https://commons.wikimedia.org/wiki/Special:FilePath/";

/// Rewritten text of one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlineUnit {
    pub index: usize,
    pub start: usize,
    pub html: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InlineOutput {
    pub units: Vec<InlineUnit>,
    pub x_ray_page: String,
    pub word_wise_page: String,
}

/// Rewrite every unit and render the two notes pages.
pub fn finalize(set: &AnnotationSet, lexicon: &Lexicon) -> InlineOutput {
    let mut units: Vec<&UnitAnnotations> = set.units.iter().collect();
    units.sort_by_key(|unit| unit.start);
    InlineOutput {
        units: units
            .into_iter()
            .map(|unit| InlineUnit {
                index: unit.index,
                start: unit.start,
                html: rewrite_unit(set, unit, lexicon),
            })
            .collect(),
        x_ray_page: x_ray_page(set),
        word_wise_page: word_wise_page(set, lexicon),
    }
}

/// Escaped unit text with noteref markup around every kept occurrence.
pub fn rewrite_unit(set: &AnnotationSet, unit: &UnitAnnotations, lexicon: &Lexicon) -> String {
    let text = unit.text.as_str();
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(pos, _)| pos)
        .chain(iter::once(text.len()))
        .collect();

    let mut order: Vec<usize> = (0..unit.occurrences.len()).collect();
    order.sort_by_key(|&idx| (unit.occurrences[idx].start, unit.occurrences[idx].end));

    let mut html = String::with_capacity(text.len() * 2);
    let mut cursor = 0usize;
    for idx in order {
        let occurrence = &unit.occurrences[idx];
        let (Some(&from), Some(&to)) = (bounds.get(occurrence.start), bounds.get(occurrence.end))
        else {
            debug!(unit = unit.index, start = occurrence.start, "span outside unit text");
            continue;
        };
        if from < cursor || to <= from {
            debug!(unit = unit.index, start = occurrence.start, "skipped overlapping span");
            continue;
        }
        let Some(markup) = markup_for(set, unit.index, idx, &occurrence.annotation, &text[from..to], lexicon)
        else {
            continue;
        };
        html.push_str(&escape(&text[cursor..from]));
        html.push_str(&markup);
        cursor = to;
    }
    html.push_str(&escape(&text[cursor..]));
    html
}

fn markup_for(
    set: &AnnotationSet,
    unit: usize,
    occurrence: usize,
    annotation: &Annotation,
    word: &str,
    lexicon: &Lexicon,
) -> Option<String> {
    match annotation {
        Annotation::Entity(id) => {
            if set.removed.contains(id) {
                return None;
            }
            Some(format!(
                r##"<a epub:type="noteref" href="x_ray.xhtml#x{id}">{}</a>"##,
                escape(word)
            ))
        }
        Annotation::Senses { group, senses } => {
            let sense = set
                .chosen_sense(unit, occurrence, senses)
                .and_then(|id| lexicon.sense(id))?;
            Some(format!(
                r##"<a epub:type="noteref" href="word_wise.xhtml#w{group}"><ruby>{}<rt>{}</rt></ruby></a>"##,
                escape(word),
                escape(sense.hint())
            ))
        }
    }
}

/// Footnote page with one aside per retained entity.
pub fn x_ray_page(set: &AnnotationSet) -> String {
    let mut page = format!("{XHTML_HEAD}\n<head><title>X-Ray</title></head>\n<body>\n");
    for entity in &set.entities {
        page.push_str(&format!(
            "<aside id=\"x{}\" epub:type=\"footnote\">\n<p><b>{}</b></p>\n<p>{}</p>\n",
            entity.id,
            escape(entity.name.as_str()),
            escape(entity.description.as_str())
        ));
        if let Some(inception) = &entity.inception {
            page.push_str(&format!("<p>Inception: {}</p>\n", escape(inception.as_str())));
        }
        if let Some(map) = &entity.map_image {
            page.push_str(&format!(
                "<img src=\"{COMMONS_FILE_PATH}{}\" alt=\"{}\"/>\n",
                urlencoding::encode(map),
                escape(entity.name.as_str())
            ));
        }
        page.push_str(&format!(
            "<p>Source: {}</p>\n</aside>\n",
            entity.source.display_name()
        ));
    }
    page.push_str("</body>\n</html>\n");
    page
}

/// Footnote page with every gloss of each sense group.
pub fn word_wise_page(set: &AnnotationSet, lexicon: &Lexicon) -> String {
    let mut page = format!("{XHTML_HEAD}\n<head><title>Word Wise</title></head>\n<body>\n");
    for (group, senses) in set.sense_groups.iter().enumerate() {
        page.push_str(&format!("<aside id=\"w{group}\" epub:type=\"footnote\">\n<ol>\n"));
        for sense in senses.iter().filter_map(|id| lexicon.sense(*id)) {
            page.push_str(&format!("<li>{}</li>\n", escape(sense.gloss.as_str())));
        }
        page.push_str("</ol>\n</aside>\n");
    }
    page.push_str("</body>\n</html>\n");
    page
}
