use granuloma_scraper::filter::CandidateFilter;
use granuloma_scraper::taxonomy::Profile;

#[test]
fn publisher_domains_are_blocked() {
    let filter = CandidateFilter::from_profile(&Profile::disease());
    assert!(filter.is_domain_blocked("https://www.sciencedirect.com/science/article"));
    assert!(filter.is_domain_blocked("https://onlinelibrary.WILEY.com/doi/figure.png"));
    assert!(!filter.is_domain_blocked("https://upload.wikimedia.org/image.jpg"));
}

#[test]
fn unparseable_urls_fail_closed() {
    let filter = CandidateFilter::from_profile(&Profile::disease());
    assert!(filter.is_domain_blocked("upload.wikimedia.org/image.jpg"));
    assert!(filter.is_domain_blocked(""));
    assert!(filter.is_domain_blocked("data:image/gif;base64,R0lGOD"));
}

#[test]
fn histology_filter_only_in_restrictive_profile() {
    let disease = CandidateFilter::from_profile(&Profile::disease());
    assert!(!disease.histology_enabled());
    assert!(disease.is_histology_relevant("https://x.org/a.jpg", "chest x-ray"));

    let restrictive = CandidateFilter::from_profile(&Profile::granuloma_type());
    assert!(restrictive.histology_enabled());
    assert!(restrictive.is_histology_relevant("https://x.org/a.jpg", "granuloma biopsy H&E"));
    assert!(!restrictive.is_histology_relevant("https://x.org/a.jpg", "granuloma biopsy x-ray"));
    assert!(!restrictive.is_histology_relevant("https://x.org/a.jpg", "lung granuloma"));
}
