//! Rows for positional sidecar databases of fixed-layout books.
//!
//! Every occurrence is addressed by absolute byte offset and length in the
//! book's codec, so the set must have been built with byte addressing.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::{
    nlp::senses::Lexicon,
    output::{Annotation, AnnotationSet, DescriptionSource},
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityRow {
    pub id: u32,
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: u8,
    pub count: u32,
    pub description: String,
    pub source: DescriptionSource,
    pub map_image: Option<String>,
    pub inception: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OccurrenceRow {
    pub entity_id: u32,
    pub start: usize,
    pub length: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GlossRow {
    pub start: usize,
    pub length: usize,
    pub sense_id: u32,
    pub difficulty: u8,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PositionalOutput {
    pub entities: Vec<EntityRow>,
    pub occurrences: Vec<OccurrenceRow>,
    pub glosses: Vec<GlossRow>,
}

/// Flatten the set into rows ordered by position.
pub fn finalize(set: &AnnotationSet, lexicon: &Lexicon) -> PositionalOutput {
    let entities = set
        .entities
        .iter()
        .map(|entity| EntityRow {
            id: entity.id,
            name: entity.name.clone(),
            entity_type: entity.kind.code(),
            count: entity.count,
            description: entity.description.clone(),
            source: entity.source,
            map_image: entity.map_image.clone(),
            inception: entity.inception.clone(),
        })
        .collect();

    let mut occurrences = Vec::new();
    let mut glosses = Vec::new();
    for unit in &set.units {
        for (idx, occurrence) in unit.occurrences.iter().enumerate() {
            match &occurrence.annotation {
                Annotation::Entity(id) => {
                    if set.removed.contains(id) {
                        continue;
                    }
                    occurrences.push(OccurrenceRow {
                        entity_id: *id,
                        start: occurrence.target_start,
                        length: occurrence.target_length,
                    });
                }
                Annotation::Senses { senses, .. } => {
                    let Some(sense) = set
                        .chosen_sense(unit.index, idx, senses)
                        .and_then(|id| lexicon.sense(id))
                    else {
                        continue;
                    };
                    glosses.push(GlossRow {
                        start: occurrence.target_start,
                        length: occurrence.target_length,
                        sense_id: sense.id,
                        difficulty: sense.difficulty,
                    });
                }
            }
        }
    }
    occurrences.sort_by_key(|row| (row.start, row.entity_id));
    glosses.sort_by_key(|row| row.start);

    PositionalOutput {
        entities,
        occurrences,
        glosses,
    }
}

/// Write the three row sets as CSV files under `dir`.
pub fn write_csv(output: &PositionalOutput, dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    let paths = vec![
        write_rows(&output.entities, dir.join("x_ray_entities.csv"))?,
        write_rows(&output.occurrences, dir.join("x_ray_occurrences.csv"))?,
        write_rows(&output.glosses, dir.join("word_wise.csv"))?,
    ];
    Ok(paths)
}

fn write_rows<T: Serialize>(rows: &[T], path: PathBuf) -> Result<PathBuf> {
    let mut writer =
        csv::Writer::from_path(&path).with_context(|| format!("create {}", path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    info!(path = %path.display(), rows = rows.len(), "wrote positional rows");
    Ok(path)
}
