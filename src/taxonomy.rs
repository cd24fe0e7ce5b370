//! Built-in category taxonomies, stain pattern tables and crawl settings.
//!
//! A [`Profile`] is an immutable value handed to the orchestrator; nothing in
//! here is process-global, so tests can build synthetic profiles freely.

use serde::{Deserialize, Serialize};

use crate::domain::{CategoryId, ProfileKind, StainLabel};
use crate::pacing::{DelayPlan, DelayRange};

/// Number of leading queries per category treated as core queries.
pub const CORE_QUERY_COUNT: usize = 4;

pub const DEFAULT_MIN_WIDTH: u32 = 400;
pub const DEFAULT_MIN_HEIGHT: u32 = 300;

/// Adds `tag` when the lowercased title contains any of `any` and all of `all`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureRule {
    pub any: Vec<String>,
    #[serde(default)]
    pub all: Vec<String>,
    pub tag: String,
}

impl FeatureRule {
    pub fn matches(&self, lowered_title: &str) -> bool {
        let any = self.any.is_empty()
            || self
                .any
                .iter()
                .any(|keyword| lowered_title.contains(keyword.as_str()));
        any && self
            .all
            .iter()
            .all(|keyword| lowered_title.contains(keyword.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub id: CategoryId,
    pub queries: Vec<String>,
    pub features: Vec<FeatureRule>,
}

impl Category {
    pub fn queries(&self, expand: bool) -> &[String] {
        if expand {
            &self.queries
        } else {
            let end = self.queries.len().min(CORE_QUERY_COUNT);
            &self.queries[..end]
        }
    }
}

/// Patterns for one stain label; a table of these is evaluated in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StainPatterns {
    pub label: String,
    pub patterns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistologyVocabulary {
    pub indicators: Vec<String>,
    pub exclusions: Vec<String>,
}

/// When the orchestrator asks the secondary provider for more candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackPolicy {
    /// Primary returned fewer than half of what was requested.
    BelowHalf,
    /// Primary returned fewer than `n` while the category is under its minimum.
    BelowCountWhileUnderMinimum(usize),
}

impl FallbackPolicy {
    pub fn should_fallback(
        &self,
        requested: usize,
        received: usize,
        collected_so_far: usize,
        min_images: usize,
    ) -> bool {
        if received >= requested {
            return false;
        }
        match self {
            FallbackPolicy::BelowHalf => received < requested / 2,
            FallbackPolicy::BelowCountWhileUnderMinimum(threshold) => {
                received < *threshold && collected_so_far < min_images
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    Paginated { max_pages: usize },
    SinglePage,
}

/// Tag used when no feature rule matches a title.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackTag {
    CategoryId,
    CompactCategoryId,
}

impl FallbackTag {
    pub fn tag_for(&self, category: &str) -> String {
        match self {
            FallbackTag::CategoryId => category.to_string(),
            FallbackTag::CompactCategoryId => category.replace('_', ""),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Profile {
    pub kind: ProfileKind,
    pub categories: Vec<Category>,
    pub stains: Vec<StainPatterns>,
    pub blocklist: Vec<String>,
    pub histology: Option<HistologyVocabulary>,
    pub fallback: FallbackPolicy,
    pub search_mode: SearchMode,
    pub fallback_tag: FallbackTag,
    pub delays: DelayPlan,
    pub default_max_images: usize,
    pub default_min_images: usize,
}

impl Profile {
    pub fn for_kind(kind: ProfileKind) -> Self {
        match kind {
            ProfileKind::Disease => Self::disease(),
            ProfileKind::GranulomaType => Self::granuloma_type(),
        }
    }

    pub fn disease() -> Self {
        Self {
            kind: ProfileKind::Disease,
            categories: disease_categories(),
            stains: base_stains(),
            blocklist: default_blocklist(),
            histology: None,
            fallback: FallbackPolicy::BelowHalf,
            search_mode: SearchMode::Paginated { max_pages: 10 },
            fallback_tag: FallbackTag::CategoryId,
            delays: DelayPlan {
                after_candidate: DelayRange::new(1.5, 3.0),
                between_queries: DelayRange::new(5.0, 8.0),
                between_categories: DelayRange::new(8.0, 12.0),
                after_search_page: DelayRange::new(3.0, 6.0),
                after_search_error: DelayRange::new(5.0, 8.0),
                retry_backoff: DelayRange::new(4.0, 7.0),
            },
            default_max_images: 100,
            default_min_images: 0,
        }
    }

    pub fn granuloma_type() -> Self {
        let mut stains = base_stains();
        stains.extend([
            stain("Trichrome", &["trichrome", "masson", "collagen"]),
            stain("Von_Kossa", &["von kossa", "calcium", "calcification"]),
            stain("Polarized", &["polarized", "polarizable", "birefringent"]),
        ]);
        Self {
            kind: ProfileKind::GranulomaType,
            categories: granuloma_type_categories(),
            stains,
            blocklist: default_blocklist(),
            histology: Some(default_histology_vocabulary()),
            fallback: FallbackPolicy::BelowCountWhileUnderMinimum(2),
            search_mode: SearchMode::SinglePage,
            fallback_tag: FallbackTag::CompactCategoryId,
            delays: DelayPlan {
                after_candidate: DelayRange::new(1.0, 2.0),
                between_queries: DelayRange::new(2.0, 4.0),
                between_categories: DelayRange::new(3.0, 5.0),
                after_search_page: DelayRange::new(2.0, 4.0),
                after_search_error: DelayRange::new(3.0, 5.0),
                retry_backoff: DelayRange::new(3.0, 5.0),
            },
            default_max_images: 5,
            default_min_images: 3,
        }
    }

    pub fn category(&self, id: &str) -> Option<&Category> {
        self.categories.iter().find(|cat| cat.id.as_str() == id)
    }

    pub fn category_ids(&self) -> Vec<String> {
        self.categories
            .iter()
            .map(|cat| cat.id.as_str().to_string())
            .collect()
    }

    /// Every label a file can be stored under, `Unclassified` last.
    pub fn stain_labels(&self) -> Vec<StainLabel> {
        self.stains
            .iter()
            .map(|entry| StainLabel::new(entry.label.clone()))
            .chain(std::iter::once(StainLabel::unclassified()))
            .collect()
    }

    /// Replaces a category with the same id, or appends a new one.
    pub fn upsert_category(&mut self, category: Category) {
        match self.categories.iter_mut().find(|cat| cat.id == category.id) {
            Some(existing) => *existing = category,
            None => self.categories.push(category),
        }
    }

    pub fn extend_blocklist<I: IntoIterator<Item = String>>(&mut self, domains: I) {
        for domain in domains {
            let domain = domain.trim().to_lowercase();
            if !domain.is_empty() && !self.blocklist.contains(&domain) {
                self.blocklist.push(domain);
            }
        }
    }
}

pub fn default_blocklist() -> Vec<String> {
    strings(&[
        "elsevier.com",
        "sciencedirect.com",
        "researchgate.net",
        "springer.com",
        "wiley.com",
        "nature.com",
        "cell.com",
        "jamanetwork.com",
        "nejm.org",
        "thelancet.com",
    ])
}

pub fn default_histology_vocabulary() -> HistologyVocabulary {
    HistologyVocabulary {
        indicators: strings(&[
            "histology",
            "histopathology",
            "biopsy",
            "microscopic",
            "microscope",
            "h&e",
            "hematoxylin",
            "eosin",
            "gms",
            "pas",
            "afb",
            "ziehl",
            "mucicarmine",
            "trichrome",
            "stain",
            "slide",
            "tissue section",
            "pathology",
            "cytology",
            "cell",
            "nucleus",
            "cytoplasm",
        ]),
        exclusions: strings(&[
            "x-ray",
            "ct",
            "mri",
            "radiology",
            "clinical",
            "patient",
            "gross",
            "macro",
            "autopsy",
            "surgical",
            "endoscopy",
        ]),
    }
}

fn base_stains() -> Vec<StainPatterns> {
    vec![
        stain(
            "H&E",
            &[r"h&e", r"hematoxylin.*eosin", r"h and e", r"he stain"],
        ),
        stain(
            "AFB_Ziehl",
            &[r"afb", r"ziehl.*neelsen", r"acid.*fast", r"mycobacteria"],
        ),
        stain(
            "GMS",
            &[r"gms", r"gomori.*methenamine", r"silver", r"fungal.*silver"],
        ),
        stain(
            "PAS",
            &[r"pas", r"periodic.*acid.*schiff", r"mucopolysaccharide"],
        ),
        stain("Mucicarmine", &[r"mucicarmine", r"mucin", r"capsule.*stain"]),
    ]
}

fn disease_categories() -> Vec<Category> {
    vec![
        category(
            "sarcoidosis",
            &[
                "sarcoidosis noncaseating granulomas lung biopsy H&E",
                "sarcoidosis lung histology",
                "sarcoidosis granulomatous inflammation biopsy",
                "pulmonary sarcoidosis pathology",
                "sarcoidosis nonnecrotizing granulomas lung",
                "sarcoidosis Schaumann bodies lung",
                "sarcoidosis asteroid bodies lung biopsy",
                "pulmonary sarcoidosis naked granulomas",
                "sarcoidosis peribronchiolar granulomas",
                "sarcoidosis hilar lymph nodes granulomas",
                "noncaseating granulomas lung H&E",
                "pulmonary nonnecrotizing granulomas",
            ],
            vec![
                rule(&["noncaseating", "nonnecrotizing"], "noncaseating"),
                rule(&["epithelioid"], "epithelioid"),
                rule(&["granulomas"], "granulomas"),
                rule(&["schaumann"], "schaumann_bodies"),
                rule(&["asteroid"], "asteroid_bodies"),
            ],
        ),
        category(
            "tuberculosis",
            &[
                "tuberculosis caseating necrosis granulomas lung H&E",
                "tb lung histology",
                "tuberculosis granulomas Ziehl-Neelsen",
                "pulmonary tuberculosis pathology",
                "tuberculosis caseating necrosis lung",
                "tuberculosis Langhans giant cells lung",
                "tuberculosis AFB granulomas lung",
                "pulmonary TB caseous necrosis",
                "tuberculosis Ghon focus lung",
                "tuberculosis granulomatous inflammation lung",
                "mycobacterial granulomas lung",
                "TB granulomas with caseation",
            ],
            vec![
                rule(&["caseating"], "caseating"),
                rule(&["necrosis"], "necrosis"),
                rule(&["langhans", "giant"], "giant_cells"),
                rule(&["afb"], "afb_positive"),
            ],
        ),
        category(
            "histoplasmosis",
            &[
                "histoplasma granulomas lung GMS",
                "histoplasmosis lung histology",
                "pulmonary histoplasmosis pathology",
                "histoplasma yeast forms in lung",
                "histoplasmosis intracellular yeasts lung",
                "histoplasmosis Ohio River Valley fungus lung",
                "histoplasma capsulatum granulomas lung",
                "pulmonary histoplasmosis yeast cells",
                "histoplasmosis granulomatous inflammation lung",
                "histoplasma macrophages lung",
                "histoplasmosis calcified granulomas lung",
            ],
            vec![
                rule(&["yeast"], "yeast_forms"),
                rule(&["intracellular"], "intracellular"),
            ],
        ),
        category(
            "blastomycosis",
            &[
                "blastomycosis broad-based budding granulomas",
                "blastomyces lung histology",
                "pulmonary blastomycosis pathology",
                "blastomycosis broad-based budding yeast lung",
                "blastomyces dermatitidis granulomas lung",
                "pulmonary blastomycosis yeast forms",
                "blastomycosis pyogranulomatous inflammation lung",
                "blastomycosis pseudoepitheliomatous hyperplasia lung",
            ],
            vec![rule(&["broad-based"], "broad_based_budding")],
        ),
        category(
            "coccidioidomycosis",
            &[
                "coccidioidomycosis spherules granulomatous inflammation",
                "coccidioides lung histology",
                "pulmonary coccidioidomycosis pathology",
                "coccidioidomycosis endospores spherules lung",
                "coccidioides immitis granulomas lung",
                "pulmonary coccidioidomycosis spherules",
                "coccidioidomycosis Valley Fever lung",
                "coccidioides fungal granulomas lung",
            ],
            vec![rule(&["spherules"], "spherules")],
        ),
        category(
            "cryptococcosis",
            &[
                "cryptococcus mucicarmine capsule granulomas",
                "cryptococcosis lung histology",
                "pulmonary cryptococcosis pathology",
                "cryptococcosis encapsulated yeasts lung",
                "cryptococcus neoformans granulomas lung",
                "pulmonary cryptococcosis yeast forms",
                "cryptococcosis soap bubble appearance lung",
                "cryptococcal granulomatous inflammation lung",
            ],
            vec![
                rule(&["capsule"], "capsule"),
                rule(&["soap"], "soap_bubble"),
            ],
        ),
        category(
            "gpa",
            &[
                "gpa necrotizing granulomas vasculitis",
                "granulomatosis with polyangiitis lung pathology",
                "wegener's granulomatosis lung histology",
                "gpa necrotizing vasculitis lung",
                "gpa geographic necrosis lung",
                "gpa lung capillaritis",
                "gpa PR3-ANCA granulomas lung",
                "granulomatosis with polyangiitis palisading granulomas",
                "gpa microabscesses lung",
                "wegener's granulomatosis giant cells lung",
            ],
            vec![
                rule(&["necrotizing"], "necrotizing"),
                rule(&["vasculitis"], "vasculitis"),
                rule(&["geographic"], "geographic_necrosis"),
                rule(&["capillaritis"], "capillaritis"),
            ],
        ),
        category(
            "hypersensitivity_pneumonitis",
            &[
                "hypersensitivity pneumonitis poorly formed granulomas",
                "hp bronchiolocentric granulomas",
                "hypersensitivity pneumonitis lung pathology",
                "hypersensitivity pneumonitis bronchiolocentric inflammation",
                "hp giant cells lung",
                "hypersensitivity pneumonitis lymphocytic infiltration",
                "hp bird fancier lung granulomas",
                "hypersensitivity pneumonitis farmer's lung",
                "hp organizing pneumonia lung",
                "hypersensitivity pneumonitis interstitial inflammation",
            ],
            vec![
                rule(&["bronchiolocentric"], "bronchiolocentric"),
                rule(&["giant"], "giant_cells"),
            ],
        ),
        category(
            "berylliosis",
            &[
                "berylliosis noncaseating granulomas lung",
                "chronic beryllium disease pathology",
                "beryllium lung granulomas",
                "berylliosis sarcoid-like granulomas lung",
                "chronic beryllium disease noncaseating granulomas",
                "beryllium sensitization lung pathology",
                "berylliosis hard metal lung",
                "beryllium-induced granulomatous disease lung",
            ],
            vec![
                rule(&["noncaseating"], "noncaseating"),
                rule(&["sarcoid"], "sarcoid_like"),
            ],
        ),
        category(
            "foreign_body",
            &[
                "foreign body giant cells granuloma lung",
                "foreign body reaction lung pathology",
                "pulmonary foreign body granulomatous reaction",
                "foreign body granulomatous inflammation lung",
                "pulmonary foreign body giant cells",
                "lung aspiration foreign body reaction",
                "foreign body granuloma with polarizable material",
                "pulmonary granulomatous reaction to inhaled material",
            ],
            vec![
                rule(&["giant"], "giant_cells"),
                rule(&["polarizable"], "polarizable_material"),
            ],
        ),
    ]
}

fn granuloma_type_categories() -> Vec<Category> {
    vec![
        category(
            "noncaseating_granulomas",
            &typed_queries(
                "noncaseating granulomas",
                &[
                    "epithelioid cells",
                    "giant cells",
                    "sarcoidosis",
                    "beryllium disease",
                    "H&E stain",
                    "histopathology",
                    "microscopic",
                    "tissue section",
                ],
            ),
            vec![
                rule(&["epithelioid"], "epithelioid"),
                rule(&["giant"], "giant_cells"),
                rule(&["sarcoid"], "sarcoid"),
                rule(&["beryllium"], "beryllium"),
            ],
        ),
        category(
            "caseating_granulomas",
            &typed_queries(
                "caseating granulomas",
                &[
                    "tuberculosis",
                    "necrosis",
                    "AFB stain",
                    "Ziehl-Neelsen",
                    "histopathology",
                    "tissue section",
                    "microscopic",
                    "central necrosis",
                ],
            ),
            vec![
                rule(&["necrosis"], "necrosis"),
                rule(&["tuberculosis", "tb"], "tb"),
                rule(&["afb"], "afb_positive"),
                rule(&["central"], "central_necrosis"),
            ],
        ),
        category(
            "necrotizing_granulomas",
            &typed_queries(
                "necrotizing granulomas",
                &[
                    "GPA",
                    "Wegener's",
                    "vasculitis",
                    "geographic necrosis",
                    "histopathology",
                    "tissue section",
                    "microscopic",
                    "palisading",
                ],
            ),
            vec![
                rule(&["vasculitis"], "vasculitis"),
                rule(&["gpa", "wegener"], "gpa"),
                rule(&["geographic"], "geographic_necrosis"),
                rule(&["palisading"], "palisading"),
            ],
        ),
        category(
            "foreign_body_granulomas",
            &typed_queries(
                "foreign body granulomas",
                &[
                    "giant cells",
                    "polarizable material",
                    "aspiration",
                    "inhaled material",
                    "histopathology",
                    "tissue section",
                    "microscopic",
                    "polarized light",
                ],
            ),
            vec![
                rule(&["giant"], "giant_cells"),
                rule(&["polarizable"], "polarizable"),
                rule(&["aspiration"], "aspiration"),
            ],
        ),
        category(
            "infectious_granulomas",
            &typed_queries(
                "infectious granulomas",
                &[
                    "fungal",
                    "mycobacterial",
                    "histoplasmosis",
                    "blastomycosis",
                    "coccidioidomycosis",
                    "cryptococcosis",
                    "special stains",
                    "GMS stain",
                ],
            ),
            vec![
                rule(&["fungal"], "fungal"),
                rule(&["mycobacterial"], "mycobacterial"),
                rule(&["histoplasma"], "histoplasma"),
                rule(&["blastomyces"], "blastomyces"),
                rule(&["coccidioides"], "coccidioides"),
                rule(&["cryptococcus"], "cryptococcus"),
            ],
        ),
        category(
            "immune_granulomas",
            &typed_queries(
                "immune granulomas",
                &[
                    "hypersensitivity",
                    "pneumonitis",
                    "sarcoidosis",
                    "berylliosis",
                    "chronic beryllium disease",
                    "histopathology",
                    "tissue section",
                    "microscopic",
                ],
            ),
            vec![
                rule(&["hypersensitivity"], "hypersensitivity"),
                rule(&["pneumonitis"], "pneumonitis"),
                rule(&["sarcoid"], "sarcoid"),
                rule(&["beryllium"], "beryllium"),
            ],
        ),
        category(
            "calcified_granulomas",
            &typed_queries(
                "calcified granulomas",
                &[
                    "healed TB",
                    "old histoplasmosis",
                    "dystrophic calcification",
                    "histopathology",
                    "tissue section",
                    "microscopic",
                    "calcium deposits",
                    "von Kossa stain",
                ],
            ),
            vec![
                rule(&["calcium"], "calcium"),
                rule(&["healed"], "healed"),
                rule(&["dystrophic"], "dystrophic"),
            ],
        ),
        category(
            "silicotic_granulomas",
            &typed_queries(
                "silicotic granulomas",
                &[
                    "silica exposure",
                    "hard metal",
                    "polarizable crystals",
                    "concentric fibrosis",
                    "histopathology",
                    "tissue section",
                    "microscopic",
                    "birefringent particles",
                ],
            ),
            vec![
                rule(&["silica"], "silica"),
                FeatureRule {
                    any: strings(&["hard"]),
                    all: strings(&["metal"]),
                    tag: "hard_metal".to_string(),
                },
                rule(&["concentric"], "concentric"),
                rule(&["birefringent"], "birefringent"),
            ],
        ),
    ]
}

/// Four core histology queries followed by type-specific lung queries.
fn typed_queries(subject: &str, specifics: &[&str]) -> Vec<String> {
    let mut queries = vec![
        format!("{subject} lung histology H&E"),
        format!("{subject} lung biopsy"),
        format!("{subject} lung pathology"),
        format!("{subject} pulmonary histology"),
    ];
    queries.extend(
        specifics
            .iter()
            .map(|specific| format!("{subject} lung {specific}")),
    );
    queries
}

fn category<S: AsRef<str>>(id: &str, queries: &[S], features: Vec<FeatureRule>) -> Category {
    Category {
        id: CategoryId::from_built_in(id),
        queries: queries
            .iter()
            .map(|query| query.as_ref().to_string())
            .collect(),
        features,
    }
}

fn rule(any: &[&str], tag: &str) -> FeatureRule {
    FeatureRule {
        any: strings(any),
        all: Vec::new(),
        tag: tag.to_string(),
    }
}

fn stain(label: &str, patterns: &[&str]) -> StainPatterns {
    StainPatterns {
        label: label.to_string(),
        patterns: strings(patterns),
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stain_labels_end_with_unclassified() {
        let labels = Profile::granuloma_type().stain_labels();
        assert_eq!(labels.len(), 9);
        assert_eq!(labels[0].as_str(), "H&E");
        assert!(labels.last().unwrap().is_unclassified());
    }

    #[test]
    fn core_queries_are_first_four() {
        let profile = Profile::disease();
        let tb = profile.category("tuberculosis").unwrap();
        assert_eq!(tb.queries(false).len(), CORE_QUERY_COUNT);
        assert_eq!(tb.queries(true).len(), 12);
        assert_eq!(tb.queries(false)[1], "tb lung histology");
    }

    #[test]
    fn typed_queries_expand_subject() {
        let profile = Profile::granuloma_type();
        let silicotic = profile.category("silicotic_granulomas").unwrap();
        assert_eq!(silicotic.queries[0], "silicotic granulomas lung histology H&E");
        assert_eq!(silicotic.queries[4], "silicotic granulomas lung silica exposure");
        assert_eq!(silicotic.queries.len(), 12);
    }

    #[test]
    fn fallback_thresholds() {
        let half = FallbackPolicy::BelowHalf;
        assert!(half.should_fallback(100, 49, 0, 0));
        assert!(!half.should_fallback(100, 50, 0, 0));

        let bounded = FallbackPolicy::BelowCountWhileUnderMinimum(2);
        assert!(bounded.should_fallback(5, 1, 0, 3));
        assert!(!bounded.should_fallback(5, 1, 3, 3));
        assert!(!bounded.should_fallback(5, 2, 0, 3));
    }

    #[test]
    fn rule_with_required_keywords() {
        let rule = FeatureRule {
            any: vec!["hard".to_string()],
            all: vec!["metal".to_string()],
            tag: "hard_metal".to_string(),
        };
        assert!(rule.matches("hard metal lung disease"));
        assert!(!rule.matches("hard to find"));
    }
}
