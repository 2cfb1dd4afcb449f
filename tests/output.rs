use std::collections::{HashMap, HashSet};

use book_lens::{
    nlp::senses::{Lexicon, Sense},
    output::{
        inline, positional, Annotation, AnnotationSet, DescriptionSource, EntityKind,
        EntityRecord, Occurrence, UnitAnnotations,
    },
    text::Addressing,
};
use encoding_rs::UTF_8;

fn lexicon() -> Lexicon {
    let mut lexicon = Lexicon::default();
    lexicon.insert(
        "bank",
        "NOUN",
        vec![
            Sense {
                id: 10,
                gloss: "land beside a river".to_string(),
                short_gloss: "riverside".to_string(),
                difficulty: 3,
                embedding: None,
            },
            Sense {
                id: 11,
                gloss: "a place that keeps money".to_string(),
                short_gloss: String::new(),
                difficulty: 2,
                embedding: None,
            },
        ],
    );
    lexicon
}

fn occurrence(start: usize, end: usize, target_start: usize, annotation: Annotation) -> Occurrence {
    Occurrence {
        start,
        end,
        target_start,
        target_length: end - start,
        annotation,
        context: None,
    }
}

fn annotation_set() -> AnnotationSet {
    let text = "Harry sat by the bank & Malfoy slept.";
    AnnotationSet {
        addressing: Addressing::Bytes(UTF_8),
        entities: vec![EntityRecord {
            id: 0,
            name: "Harry Potter".to_string(),
            label: "PERSON".to_string(),
            kind: EntityKind::Person,
            count: 3,
            description: "A wizard.".to_string(),
            source: DescriptionSource::Wikipedia,
            map_image: None,
            inception: None,
        }],
        removed: HashSet::from([2]),
        units: vec![UnitAnnotations {
            index: 0,
            start: 1000,
            text: text.to_string(),
            occurrences: vec![
                occurrence(0, 5, 1000, Annotation::Entity(0)),
                occurrence(
                    17,
                    21,
                    1017,
                    Annotation::Senses {
                        group: 0,
                        senses: vec![10, 11],
                    },
                ),
                occurrence(24, 30, 1024, Annotation::Entity(2)),
            ],
        }],
        sense_groups: vec![vec![10, 11]],
        chosen: HashMap::from([((0, 1), 11)]),
    }
}

#[test]
fn inline_rewrite_wraps_kept_occurrences() {
    let set = annotation_set();
    let html = inline::rewrite_unit(&set, &set.units[0], &lexicon());
    insta::assert_snapshot!(
        html,
        @r#"<a epub:type="noteref" href="x_ray.xhtml#x0">Harry</a> sat by the <a epub:type="noteref" href="word_wise.xhtml#w0"><ruby>bank<rt>a place that keeps money</rt></ruby></a> &amp; Malfoy slept."#
    );
}

#[test]
fn inline_rewrite_uses_first_sense_without_a_choice() {
    let mut set = annotation_set();
    set.chosen.clear();
    let html = inline::rewrite_unit(&set, &set.units[0], &lexicon());
    assert!(html.contains("<ruby>bank<rt>riverside</rt></ruby>"));
}

#[test]
fn notes_pages_list_entities_and_glosses() {
    let set = annotation_set();
    let output = inline::finalize(&set, &lexicon());
    assert_eq!(output.units.len(), 1);
    assert_eq!(output.units[0].start, 1000);

    assert!(output.x_ray_page.contains(r#"<aside id="x0" epub:type="footnote">"#));
    assert!(output.x_ray_page.contains("<p><b>Harry Potter</b></p>"));
    assert!(output.x_ray_page.contains("<p>A wizard.</p>"));
    assert!(output.x_ray_page.contains("<p>Source: Wikipedia</p>"));
    assert!(!output.x_ray_page.contains("x2"));

    assert!(output.word_wise_page.contains(r#"<aside id="w0" epub:type="footnote">"#));
    assert!(output.word_wise_page.contains("<li>land beside a river</li>"));
    assert!(output.word_wise_page.contains("<li>a place that keeps money</li>"));
}

#[test]
fn positional_rows_skip_pruned_entities() {
    let set = annotation_set();
    let output = positional::finalize(&set, &lexicon());

    assert_eq!(output.entities.len(), 1);
    assert_eq!(output.entities[0].entity_type, 1);
    assert_eq!(output.occurrences.len(), 1);
    assert_eq!(output.occurrences[0].entity_id, 0);
    assert_eq!(output.occurrences[0].start, 1000);
    assert_eq!(output.occurrences[0].length, 5);
    assert_eq!(output.glosses.len(), 1);
    assert_eq!(output.glosses[0].start, 1017);
    assert_eq!(output.glosses[0].sense_id, 11);
    assert_eq!(output.glosses[0].difficulty, 2);
}

#[test]
fn positional_rows_are_written_as_csv() {
    let set = annotation_set();
    let output = positional::finalize(&set, &lexicon());
    let dir = tempfile::tempdir().unwrap();

    let paths = positional::write_csv(&output, dir.path()).unwrap();
    assert_eq!(paths.len(), 3);

    let entities = std::fs::read_to_string(dir.path().join("x_ray_entities.csv")).unwrap();
    let mut lines = entities.lines();
    assert_eq!(
        lines.next(),
        Some("id,name,type,count,description,source,map_image,inception")
    );
    assert_eq!(lines.next(), Some("0,Harry Potter,1,3,A wizard.,wikipedia,,"));

    let glosses = std::fs::read_to_string(dir.path().join("word_wise.csv")).unwrap();
    assert_eq!(glosses.lines().nth(1), Some("1017,4,11,2"));
}
