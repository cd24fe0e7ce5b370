use granuloma_scraper::domain::StainLabel;
use granuloma_scraper::filename::{FilenameGenerator, is_supported_extension, sanitize_filename};
use granuloma_scraper::taxonomy::Profile;

fn satisfies_contract(name: &str) -> bool {
    let allowed = name
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.'));
    let extension_ok = name
        .rsplit_once('.')
        .is_some_and(|(stem, ext)| !stem.is_empty() && is_supported_extension(ext));
    allowed && extension_ok && !name.starts_with('.')
}

#[test]
fn feature_tags_follow_rule_order() {
    let generator = FilenameGenerator::new(Profile::disease());
    let name = generator.generate(
        "tuberculosis",
        &StainLabel::new("AFB_Ziehl"),
        "Caseating necrosis with Langhans giant cells, AFB",
        2,
    );
    assert_eq!(
        name,
        "tuberculosis_caseating_necrosis_giant_cells_afb_positive_02.jpg"
    );
}

#[test]
fn no_feature_falls_back_to_category() {
    let generator = FilenameGenerator::new(Profile::disease());
    let name = generator.generate("tuberculosis", &StainLabel::unclassified(), "", 7);
    assert_eq!(name, "tuberculosis_tuberculosis_07.jpg");
}

#[test]
fn adversarial_titles_keep_the_contract() {
    let generator = FilenameGenerator::new(Profile::disease());
    let titles = [
        "",
        "../../etc/passwd",
        "肺结核 肉芽肿 😷",
        "C:\\Windows\\system32",
        "name with spaces.tiff",
        ".hidden",
        "\0\n\t",
    ];
    for (index, title) in titles.iter().enumerate() {
        let generated = generator.generate("sarcoidosis", &StainLabel::unclassified(), title, index);
        assert!(satisfies_contract(&generated), "{generated}");
        let sanitized = sanitize_filename(title);
        assert!(satisfies_contract(&sanitized), "{title:?} -> {sanitized}");
    }
}

#[test]
fn index_is_zero_padded() {
    let generator = FilenameGenerator::new(Profile::disease());
    let name = generator.generate("sarcoidosis", &StainLabel::unclassified(), "", 123);
    assert!(name.ends_with("_123.jpg"));
    let name = generator.generate("sarcoidosis", &StainLabel::unclassified(), "", 3);
    assert!(name.ends_with("_03.jpg"));
}
