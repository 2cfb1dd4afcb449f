//! One book's annotation run.
//!
//! Units are scanned in source order first. Remote lookups happen afterwards in
//! two batched passes (descriptions, then structured facts) followed by the
//! optional disambiguation pass, and `finish` prunes and assembles the set the
//! output adapters consume.

use std::{
    borrow::Cow,
    collections::HashMap,
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::{
    cancel::CancelFlag,
    config::Settings,
    data::{
        store::ItemFacts,
        wiki::{KnowledgeCache, WikiApi},
        wikidata::{SparqlApi, StructuredCache},
    },
    error::EngineError,
    nlp::{
        custom::CustomEntities,
        entities::EntityResolver,
        is_geo_label, is_person_label, is_xray_label,
        senses::{Lexicon, Sense, SenseGroups},
        wsd::{SenseDisambiguator, TokenEmbedder},
        TextUnit,
    },
    output::{
        Annotation, AnnotationSet, DescriptionSource, EntityKind, EntityRecord, Occurrence,
        SentenceContext, UnitAnnotations,
    },
    text::{escape_for_codec, Addressing, Interval, IntervalIndex, Located, UnitOffsets},
};

/// Per-run knobs.
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub addressing: Addressing,
    pub search_people: bool,
    pub min_count: u32,
    pub max_difficulty: u8,
}

impl RunOptions {
    pub fn from_settings(settings: &Settings, addressing: Addressing) -> Self {
        Self {
            addressing,
            search_people: settings.search_people,
            min_count: settings.min_entity_count,
            max_difficulty: settings.word_wise_difficulty,
        }
    }
}

#[derive(Debug, Clone)]
struct Known {
    description: String,
    item_id: Option<String>,
    source: DescriptionSource,
}

/// Accumulates occurrences and entity state for one book.
#[derive(Debug)]
pub struct Annotator<'a> {
    options: RunOptions,
    lexicon: &'a Lexicon,
    custom: &'a CustomEntities,
    resolver: EntityResolver,
    groups: SenseGroups,
    units: Vec<UnitAnnotations>,
    knowledge: HashMap<String, Known>,
    facts: HashMap<String, ItemFacts>,
    chosen: HashMap<(usize, usize), u32>,
    cancel: CancelFlag,
}

impl<'a> Annotator<'a> {
    pub fn new(options: RunOptions, lexicon: &'a Lexicon, custom: &'a CustomEntities) -> Self {
        Self {
            options,
            lexicon,
            custom,
            resolver: EntityResolver::with_overrides(custom.names().map(str::to_string)),
            groups: SenseGroups::new(),
            units: Vec::new(),
            knowledge: HashMap::new(),
            facts: HashMap::new(),
            chosen: HashMap::new(),
            cancel: CancelFlag::default(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn resolver(&self) -> &EntityResolver {
        &self.resolver
    }

    pub fn units(&self) -> &[UnitAnnotations] {
        &self.units
    }

    /// Scan units in order, checking for cancellation between them.
    pub fn process_units<'u, I>(&mut self, units: I) -> Result<(), EngineError>
    where
        I: IntoIterator<Item = &'u TextUnit>,
    {
        for unit in units {
            self.cancel.check()?;
            self.process_unit(unit)?;
        }
        info!(
            units = self.units.len(),
            entities = self.resolver.len(),
            sense_groups = self.groups.len(),
            "scanned text units"
        );
        Ok(())
    }

    /// Resolve one unit's mentions into located occurrences.
    pub fn process_unit(&mut self, unit: &TextUnit) -> Result<(), EngineError> {
        let index = self.units.len();
        let text = unit.text.as_str();
        let char_len = text.chars().count();
        let custom = self.custom;
        let lexicon = self.lexicon;

        let mut occurrences = Vec::new();
        let mut spans = Vec::new();
        for mention in &unit.entities {
            if mention.end <= mention.start || mention.end > char_len {
                debug!(unit = index, start = mention.start, end = mention.end, "entity span outside unit");
                continue;
            }
            let name = mention.text.trim();
            if name.is_empty() || custom.is_omitted(name) {
                continue;
            }
            let (name, label) = match custom.canonical(name) {
                Some(entry) => (entry.name.as_str(), entry.label.as_str()),
                None if is_xray_label(&mention.label) => (name, mention.label.as_str()),
                None => continue,
            };
            let id = self.resolver.resolve(name, label, &mention.sentence)?;
            spans.extend(Interval::from_span(mention.start, mention.end));
            occurrences.push(Occurrence {
                start: mention.start,
                end: mention.end,
                target_start: 0,
                target_length: 0,
                annotation: Annotation::Entity(id),
                context: None,
            });
        }

        let mut taken = IntervalIndex::new();
        taken.insert_all(spans);
        for lemma in &unit.lemmas {
            if lemma.end > char_len {
                debug!(unit = index, start = lemma.start, end = lemma.end, "lemma span outside unit");
                continue;
            }
            let Some(interval) = Interval::from_span(lemma.start, lemma.end) else {
                continue;
            };
            if taken.overlaps(&interval) {
                debug!(unit = index, word = %lemma.word, "lemma overlaps an entity");
                continue;
            }
            let ids: Vec<u32> = lexicon
                .senses(&lemma.lemma, &lemma.pos, self.options.max_difficulty)
                .iter()
                .map(|sense| sense.id)
                .collect();
            if ids.is_empty() {
                continue;
            }
            let group = self.groups.register(&lemma.lemma, &lemma.word, &lemma.pos, &ids)?;
            let context = (ids.len() > 1).then(|| SentenceContext {
                sentence: lemma.sentence.clone(),
                start: lemma.sentence_start,
                end: lemma.sentence_end,
            });
            occurrences.push(Occurrence {
                start: lemma.start,
                end: lemma.end,
                target_start: 0,
                target_length: 0,
                annotation: Annotation::Senses { group, senses: ids },
                context,
            });
        }

        occurrences.sort_by_key(|occurrence| (occurrence.start, occurrence.end));
        match self.options.addressing {
            Addressing::Chars => {
                for occurrence in &mut occurrences {
                    occurrence.target_start = unit.start + occurrence.start;
                    occurrence.target_length = occurrence.end - occurrence.start;
                }
            }
            Addressing::Bytes(encoding) => {
                let escaped = match &unit.escaped {
                    Some(escaped) => Cow::Borrowed(escaped.as_str()),
                    None => Cow::Owned(escape_for_codec(text, encoding)),
                };
                let mut mapper = UnitOffsets::new(text, &escaped, encoding, unit.start);
                occurrences.retain_mut(|occurrence| {
                    match mapper.locate(occurrence.start, occurrence.end) {
                        Located::Mapped { start, length } => {
                            occurrence.target_start = start;
                            occurrence.target_length = length;
                            true
                        }
                        Located::Unlocatable => {
                            debug!(unit = index, start = occurrence.start, "token not locatable, skipped");
                            false
                        }
                        Located::Duplicate => {
                            debug!(unit = index, start = occurrence.start, "offset already annotated, skipped");
                            false
                        }
                    }
                });
            }
        }

        self.units.push(UnitAnnotations {
            index,
            start: unit.start,
            text: unit.text.clone(),
            occurrences,
        });
        Ok(())
    }

    /// Populate descriptions for every non-custom entity.
    #[instrument(skip_all)]
    pub async fn lookup_knowledge<S: WikiApi>(
        &mut self,
        cache: &mut KnowledgeCache<S>,
    ) -> Result<(), EngineError> {
        self.cancel.check()?;
        let custom = self.custom;
        let search_people = self.options.search_people;
        let titles: Vec<(String, bool)> = self
            .resolver
            .entities()
            .filter(|(name, _)| custom.get(name).is_none())
            .map(|(name, entity)| (name.to_string(), is_person_label(&entity.label)))
            .filter(|(_, person)| search_people || !person)
            .collect();
        cache
            .query_batch(titles.iter().map(|(t, p)| (t.as_str(), *p)), search_people)
            .await?;

        let source = cache.description_source();
        for (title, _) in titles {
            if let Some((description, item_id)) = cache.description(&title)? {
                self.knowledge.insert(
                    title,
                    Known {
                        description,
                        item_id,
                        source,
                    },
                );
            }
        }
        info!(described = self.knowledge.len(), "knowledge lookup finished");
        Ok(())
    }

    /// Fetch map and inception facts for described geographic entities.
    #[instrument(skip_all)]
    pub async fn lookup_structured<S: SparqlApi>(
        &mut self,
        cache: &mut StructuredCache<S>,
    ) -> Result<(), EngineError> {
        self.cancel.check()?;
        let knowledge = &self.knowledge;
        let items: Vec<String> = self
            .resolver
            .entities()
            .filter(|(_, entity)| is_geo_label(&entity.label))
            .filter_map(|(name, _)| knowledge.get(name)?.item_id.clone())
            .collect();
        if items.is_empty() {
            return Ok(());
        }
        cache.query_batch(items.iter().map(String::as_str)).await?;
        for item in items {
            if let Some(facts) = cache.lookup(&item)? {
                self.facts.insert(item, facts);
            }
        }
        Ok(())
    }

    /// Pick a sense for every ambiguous lemma whose candidates carry embeddings.
    /// An embedder failure leaves the first sense in place.
    #[instrument(skip_all)]
    pub async fn disambiguate<E: TokenEmbedder>(
        &mut self,
        disambiguator: &mut SenseDisambiguator<E>,
    ) -> Result<(), EngineError> {
        let lexicon = self.lexicon;
        for unit in &self.units {
            self.cancel.check()?;
            for (idx, occurrence) in unit.occurrences.iter().enumerate() {
                let (Annotation::Senses { senses, .. }, Some(context)) =
                    (&occurrence.annotation, &occurrence.context)
                else {
                    continue;
                };
                let candidates: Option<Vec<&Sense>> =
                    senses.iter().map(|id| lexicon.sense(*id)).collect();
                let Some(embeddings) = candidates.and_then(|candidates| {
                    candidates
                        .iter()
                        .map(|sense| sense.embedding.as_deref())
                        .collect::<Option<Vec<&[f32]>>>()
                }) else {
                    continue;
                };
                match disambiguator
                    .pick_sense(&context.sentence, (context.start, context.end), &embeddings)
                    .await
                {
                    Ok(pick) => {
                        if let Some(&id) = senses.get(pick) {
                            self.chosen.insert((unit.index, idx), id);
                        }
                    }
                    Err(err) => {
                        warn!(%err, unit = unit.index, "sense disambiguation failed, keeping first sense");
                    }
                }
            }
        }
        info!(chosen = self.chosen.len(), "disambiguation finished");
        Ok(())
    }

    /// Prune entities and assemble the finalized set.
    pub fn finish(mut self) -> AnnotationSet {
        let custom = self.custom;
        let knowledge = &self.knowledge;
        let pruned = self.resolver.prune(self.options.min_count, |name| {
            knowledge.contains_key(name) || custom.get(name).is_some()
        });

        let facts = &self.facts;
        let mut entities: Vec<EntityRecord> = self
            .resolver
            .entities()
            .map(|(name, entity)| {
                let known = knowledge.get(name);
                let (description, source) = match (custom.description(name), known) {
                    (Some((text, source)), _) => (text.to_string(), source),
                    (None, Some(known)) => (known.description.clone(), known.source),
                    (None, None) => (entity.quote.clone(), DescriptionSource::Quote),
                };
                let item = known
                    .and_then(|known| known.item_id.as_ref())
                    .and_then(|item| facts.get(item));
                EntityRecord {
                    id: entity.id,
                    name: name.to_string(),
                    label: entity.label.clone(),
                    kind: EntityKind::from_label(&entity.label),
                    count: entity.count,
                    description,
                    source,
                    map_image: item.and_then(|facts| facts.map_filename.clone()),
                    inception: item.and_then(|facts| facts.inception.clone()),
                }
            })
            .collect();
        entities.sort_by_key(|entity| entity.id);
        info!(
            entities = entities.len(),
            pruned = pruned.len(),
            sense_groups = self.groups.len(),
            "annotation set ready"
        );

        AnnotationSet {
            addressing: self.options.addressing,
            entities,
            removed: self.resolver.removed().clone(),
            units: self.units,
            sense_groups: self.groups.sets().to_vec(),
            chosen: self.chosen,
        }
    }
}

/// Read text units from JSON lines, skipping blank lines.
pub fn load_units(path: &Path) -> Result<Vec<TextUnit>> {
    let file = File::open(path).with_context(|| format!("open units {}", path.display()))?;
    let mut units = Vec::new();
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("read {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let unit: TextUnit = serde_json::from_str(&line)
            .with_context(|| format!("parse unit at {}:{}", path.display(), line_no + 1))?;
        units.push(unit);
    }
    info!(path = %path.display(), units = units.len(), "loaded text units");
    Ok(units)
}
