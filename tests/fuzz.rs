use book_lens::nlp::fuzz::{default_process, extract_one, token_set_ratio, FUZZ_THRESHOLD};

#[test]
fn processing_folds_case_and_punctuation() {
    assert_eq!(default_process("  Dr. WHO! "), "dr  who");
}

#[test]
fn token_subset_scores_full_marks() {
    assert_eq!(token_set_ratio("Washington", "George Washington"), 100.0);
    assert_eq!(token_set_ratio("george washington", "GEORGE, Washington"), 100.0);
}

#[test]
fn single_letter_variant_falls_below_threshold() {
    let score = token_set_ratio("Smith", "Smyth");
    assert!((score - 80.0).abs() < 1e-9, "score {score}");
    assert!(score < FUZZ_THRESHOLD);
}

#[test]
fn plural_tail_clears_threshold() {
    let score = token_set_ratio("Harry Potter", "Harry Potters");
    assert!(score > 95.0 && score < 100.0, "score {score}");
}

#[test]
fn shared_token_scores_on_the_differing_tails() {
    // "harry potter" vs "harry potters": one insertion over 25 chars.
    let score = token_set_ratio("Potter, Harry", "Harry Potters");
    assert!((score - 96.0).abs() < 1e-9, "score {score}");
    assert!(extract_one("Harry Potter", ["Harry Potters", "Harold"], FUZZ_THRESHOLD).is_some());
}

#[test]
fn unrelated_names_score_low() {
    assert!(token_set_ratio("Hermione", "Dumbledore") < 50.0);
    assert_eq!(token_set_ratio("", "Dumbledore"), 0.0);
}

#[test]
fn extract_one_prefers_first_of_equal_scores() {
    let candidates = ["John Smith", "Smith", "Jane Doe"];
    let (best, score) = extract_one("Smith", candidates, FUZZ_THRESHOLD).unwrap();
    assert_eq!(best, "John Smith");
    assert_eq!(score, 100.0);
}

#[test]
fn extract_one_respects_cutoff() {
    assert!(extract_one("Smyth", ["Smith"], FUZZ_THRESHOLD).is_none());
    assert!(extract_one("Smyth", Vec::<&str>::new(), 0.0).is_none());
}
