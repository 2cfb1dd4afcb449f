use book_lens::text::{escape_for_codec, map_offset, Addressing, Located, UnitOffsets};
use encoding_rs::{UTF_8, WINDOWS_1252};

const TEXT: &str = "Café — “naïve” ☃ snow & ice";

#[test]
fn legacy_codec_escapes_unmappable_characters() {
    let escaped = escape_for_codec(TEXT, WINDOWS_1252);
    assert_eq!(escaped, "Café — “naïve” &#9731; snow &amp; ice");
    assert_eq!(escape_for_codec("☃ & <b>", UTF_8), "☃ &amp; &lt;b&gt;");
}

#[test]
fn mapped_prefix_decodes_back_to_the_escaped_prefix() {
    let escaped = escape_for_codec(TEXT, WINDOWS_1252);
    let (encoded, _, _) = WINDOWS_1252.encode(&escaped);

    let (offset, matched) = map_offset(&escaped, "snow", 0, WINDOWS_1252).unwrap();
    assert_eq!(offset, 23);
    assert_eq!(matched, "snow");
    let (prefix, _) = WINDOWS_1252.decode_without_bom_handling(&encoded[..offset]);
    assert_eq!(prefix, "Café — “naïve” &#9731; ");
}

#[test]
fn token_is_retried_in_its_escaped_spelling() {
    let escaped = escape_for_codec(TEXT, WINDOWS_1252);
    let (offset, matched) = map_offset(&escaped, "☃", 0, WINDOWS_1252).unwrap();
    assert_eq!(offset, 15);
    assert_eq!(matched, "&#9731;");
    assert!(map_offset(&escaped, "sleet", 0, WINDOWS_1252).is_none());
}

#[test]
fn utf8_offsets_count_bytes() {
    let (offset, _) = map_offset("naïve café", "café", 0, UTF_8).unwrap();
    assert_eq!(offset, 7);
}

#[test]
fn unit_mapper_adds_base_and_drops_repeated_starts() {
    let text = "Snow ☃ and snow.";
    let escaped = escape_for_codec(text, WINDOWS_1252);
    let mut mapper = UnitOffsets::new(text, &escaped, WINDOWS_1252, 100);

    assert_eq!(mapper.locate(0, 4), Located::Mapped { start: 100, length: 4 });
    assert_eq!(mapper.locate(5, 6), Located::Mapped { start: 105, length: 7 });
    assert_eq!(mapper.locate(11, 15), Located::Mapped { start: 117, length: 4 });
    assert_eq!(mapper.locate(11, 15), Located::Duplicate);
}

#[test]
fn repeated_token_after_an_entity_maps_to_its_own_copy() {
    let text = "&ab ab";
    let escaped = escape_for_codec(text, UTF_8);
    assert_eq!(escaped, "&amp;ab ab");

    let mut mapper = UnitOffsets::new(text, &escaped, UTF_8, 0);
    assert_eq!(mapper.locate(4, 6), Located::Mapped { start: 8, length: 2 });

    let mut mapper = UnitOffsets::new(text, &escaped, UTF_8, 0);
    assert_eq!(mapper.locate(1, 3), Located::Mapped { start: 5, length: 2 });
    assert_eq!(mapper.locate(4, 6), Located::Mapped { start: 8, length: 2 });
}

#[test]
fn quoted_dialogue_keeps_scan_order() {
    let text = "\"Ron,\" said Harry & Ron.";
    let escaped = escape_for_codec(text, WINDOWS_1252);
    assert_eq!(escaped, "&quot;Ron,&quot; said Harry &amp; Ron.");

    let mut mapper = UnitOffsets::new(text, &escaped, WINDOWS_1252, 0);
    assert_eq!(mapper.locate(1, 4), Located::Mapped { start: 6, length: 3 });
    assert_eq!(mapper.locate(12, 17), Located::Mapped { start: 22, length: 5 });
    assert_eq!(mapper.locate(20, 23), Located::Mapped { start: 34, length: 3 });
}

#[test]
fn book_text_with_raw_quotes_still_maps_forward() {
    // The book kept its apostrophes unescaped; only the ampersand is an entity.
    let text = "'ab' & ab";
    let escaped = "'ab' &amp; ab";
    let mut mapper = UnitOffsets::new(text, escaped, UTF_8, 0);
    assert_eq!(mapper.locate(7, 9), Located::Mapped { start: 11, length: 2 });
}

#[test]
fn unit_mapper_reports_unlocatable_tokens() {
    let mut mapper = UnitOffsets::new("abc", "xyz", UTF_8, 0);
    assert_eq!(mapper.locate(0, 1), Located::Unlocatable);
    assert_eq!(mapper.locate(10, 12), Located::Unlocatable);
    assert_eq!(mapper.locate(2, 2), Located::Unlocatable);
}

#[test]
fn codec_labels_resolve_to_byte_addressing() {
    assert_eq!(
        Addressing::for_codec("cp1252"),
        Some(Addressing::Bytes(WINDOWS_1252))
    );
    assert_eq!(Addressing::for_codec("UTF-8"), Some(Addressing::Bytes(UTF_8)));
    assert_eq!(Addressing::for_codec("no-such-codec"), None);
}
