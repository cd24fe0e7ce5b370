use granuloma_scraper::classify::StainClassifier;
use granuloma_scraper::domain::StainLabel;
use granuloma_scraper::taxonomy::{Profile, StainPatterns};

fn disease_classifier() -> StainClassifier {
    StainClassifier::new(&Profile::disease().stains).unwrap()
}

#[test]
fn he_stain_title_is_he() {
    let classifier = disease_classifier();
    let label = classifier.classify("https://upload.wikimedia.org/x.jpg", "Granuloma, H&E stain");
    assert_eq!(label, StainLabel::new("H&E"));
}

#[test]
fn text_without_stain_is_unclassified() {
    let classifier = disease_classifier();
    let label = classifier.classify("https://upload.wikimedia.org/img/42.jpg", "lung granuloma");
    assert!(label.is_unclassified());
}

#[test]
fn classification_is_deterministic() {
    let classifier = disease_classifier();
    let first = classifier.classify("https://x.org/a.jpg", "Grocott GMS silver fungal");
    for _ in 0..10 {
        assert_eq!(
            classifier.classify("https://x.org/a.jpg", "Grocott GMS silver fungal"),
            first
        );
    }
    assert_eq!(first, StainLabel::new("GMS"));
}

#[test]
fn earlier_label_wins_when_several_match() {
    let classifier = disease_classifier();
    let label = classifier.classify("https://x.org/a.jpg", "H&E and Ziehl-Neelsen AFB panels");
    assert_eq!(label, StainLabel::new("H&E"));

    let reversed = StainClassifier::new(&[
        StainPatterns {
            label: "AFB_Ziehl".to_string(),
            patterns: vec!["afb".to_string()],
        },
        StainPatterns {
            label: "H&E".to_string(),
            patterns: vec!["h&e".to_string()],
        },
    ])
    .unwrap();
    let label = reversed.classify("https://x.org/a.jpg", "H&E and Ziehl-Neelsen AFB panels");
    assert_eq!(label, StainLabel::new("AFB_Ziehl"));
}

#[test]
fn matching_ignores_case() {
    let classifier = disease_classifier();
    let label = classifier.classify("https://x.org/MUCICARMINE.jpg", "");
    assert_eq!(label, StainLabel::new("Mucicarmine"));
}

#[test]
fn granuloma_profile_knows_extra_stains() {
    let classifier = StainClassifier::new(&Profile::granuloma_type().stains).unwrap();
    let labels: Vec<&str> = classifier.labels().map(|label| label.as_str()).collect();
    assert!(labels.contains(&"Trichrome"));
    assert!(labels.contains(&"Von_Kossa"));
    assert!(labels.contains(&"Polarized"));
}
