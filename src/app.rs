use std::collections::HashSet;
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::classify::StainClassifier;
use crate::dedup;
use crate::domain::{Candidate, StainLabel};
use crate::download::{DownloadOutcome, Downloader, Transport};
use crate::error::ScraperError;
use crate::filename::FilenameGenerator;
use crate::filter::CandidateFilter;
use crate::ledger::{CitationRecord, Ledger};
use crate::pacing::{Pacer, ShutdownFlag};
use crate::providers::ImageSearchProvider;
use crate::store::Store;
use crate::taxonomy::{Category, DEFAULT_MIN_HEIGHT, DEFAULT_MIN_WIDTH, Profile};

/// Whether a URL whose download did not produce a file goes into the URL
/// cache, which stops it from being tried again in later runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Content rejections are cached; exhausted transient failures are not.
    #[default]
    RecordRejections,
    RecordAll,
    RecordNone,
}

impl FailurePolicy {
    pub fn should_record(&self, outcome: &DownloadOutcome) -> bool {
        match (self, outcome) {
            (_, DownloadOutcome::Saved { .. }) => true,
            (FailurePolicy::RecordAll, _) => true,
            (FailurePolicy::RecordRejections, DownloadOutcome::Rejected(_)) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunOptions {
    pub max_images: usize,
    pub min_images: usize,
    pub min_width: u32,
    pub min_height: u32,
    pub query_expansion: bool,
    pub failure_policy: FailurePolicy,
}

impl RunOptions {
    pub fn for_profile(profile: &Profile) -> Self {
        Self {
            max_images: profile.default_max_images,
            min_images: profile.default_min_images,
            min_width: DEFAULT_MIN_WIDTH,
            min_height: DEFAULT_MIN_HEIGHT,
            query_expansion: true,
            failure_policy: FailurePolicy::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ScraperError> {
        if self.max_images < self.min_images {
            return Err(ScraperError::InvalidImageBounds {
                min: self.min_images,
                max: self.max_images,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategoryStats {
    pub category: String,
    /// Candidates returned by the providers before filtering.
    pub found: usize,
    /// Candidates queued for download after filtering and URL dedup.
    pub queued: usize,
    pub downloaded: usize,
    pub skipped: usize,
    pub duplicates: usize,
    pub blocked: usize,
    pub non_histology: usize,
    pub cached: usize,
    pub reached_minimum: bool,
}

impl CategoryStats {
    fn new(category: &str) -> Self {
        Self {
            category: category.to_string(),
            ..Self::default()
        }
    }

    fn absorb(&mut self, other: &CategoryStats) {
        self.found += other.found;
        self.queued += other.queued;
        self.downloaded += other.downloaded;
        self.skipped += other.skipped;
        self.duplicates += other.duplicates;
        self.blocked += other.blocked;
        self.non_histology += other.non_histology;
        self.cached += other.cached;
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub profile: String,
    pub output_dir: String,
    pub categories: Vec<CategoryStats>,
    pub unknown_categories: Vec<String>,
    pub totals: CategoryStats,
    pub interrupted: bool,
    pub ledger_saved: bool,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Clone)]
struct QueuedCandidate {
    candidate: Candidate,
    query: String,
}

/// Where a classified candidate will be stored.
struct Target {
    stain: StainLabel,
    filename: String,
    key: String,
    path: Utf8PathBuf,
}

enum Flow {
    Finished,
    Interrupted,
}

/// Drives categories, queries and candidates in order through the
/// fetch, validate, dedup and persist steps.
pub struct App<P, S, T, Z> {
    profile: Profile,
    classifier: StainClassifier,
    namer: FilenameGenerator,
    filter: CandidateFilter,
    primary: P,
    secondary: S,
    downloader: Downloader<T, Z>,
    store: Store,
    ledger: Ledger,
    options: RunOptions,
    shutdown: ShutdownFlag,
}

impl<P, S, T, Z> App<P, S, T, Z>
where
    P: ImageSearchProvider,
    S: ImageSearchProvider,
    T: Transport,
    Z: Pacer,
{
    /// Loads the ledger from `store` and compiles the stain patterns.
    pub fn new(
        profile: Profile,
        store: Store,
        primary: P,
        secondary: S,
        downloader: Downloader<T, Z>,
        options: RunOptions,
    ) -> Result<Self, ScraperError> {
        options.validate()?;
        let classifier = StainClassifier::new(&profile.stains)?;
        let filter = CandidateFilter::from_profile(&profile);
        let namer = FilenameGenerator::new(profile.clone());
        let ledger = Ledger::load(store.clone());
        Ok(Self {
            profile,
            classifier,
            namer,
            filter,
            primary,
            secondary,
            downloader,
            store,
            ledger,
            options,
            shutdown: ShutdownFlag::new(),
        })
    }

    pub fn with_shutdown(mut self, shutdown: ShutdownFlag) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Runs every category in `categories`; an empty slice means all of the
    /// profile's categories.
    pub fn run(&mut self, categories: &[String], sink: &dyn ProgressSink) -> RunSummary {
        let started = Instant::now();
        let selected = if categories.is_empty() {
            self.profile.category_ids()
        } else {
            categories.to_vec()
        };

        let mut summary = RunSummary {
            profile: self.profile.kind.to_string(),
            output_dir: self.store.root().to_string(),
            categories: Vec::new(),
            unknown_categories: Vec::new(),
            totals: CategoryStats::new("total"),
            interrupted: false,
            ledger_saved: true,
        };

        if let Err(err) = self.store.ensure_root() {
            error!(error = %err, "cannot create output directory");
        }
        info!(
            profile = %self.profile.kind,
            categories = selected.len(),
            max_images = self.options.max_images,
            min_images = self.options.min_images,
            "starting scrape"
        );

        for (position, id) in selected.iter().enumerate() {
            if self.shutdown.is_requested() {
                summary.interrupted = true;
                break;
            }
            let Some(category) = self.profile.category(id).cloned() else {
                warn!(category = %id, "unknown category, skipping");
                summary.unknown_categories.push(id.clone());
                continue;
            };

            sink.event(ProgressEvent {
                message: format!("phase=Category; {} ({}/{})", id, position + 1, selected.len()),
                elapsed: Some(started.elapsed()),
            });
            let mut stats = CategoryStats::new(id);
            let flow = self.scrape_category(&category, &mut stats, sink);
            stats.reached_minimum = stats.downloaded >= self.options.min_images;
            info!(
                category = %id,
                downloaded = stats.downloaded,
                skipped = stats.skipped,
                duplicates = stats.duplicates,
                blocked = stats.blocked,
                non_histology = stats.non_histology,
                "category complete"
            );
            summary.totals.absorb(&stats);
            summary.categories.push(stats);
            summary.ledger_saved &= self.ledger.flush();

            if let Flow::Interrupted = flow {
                summary.interrupted = true;
                break;
            }
            if position + 1 < selected.len() {
                self.pacer()
                    .pause(self.profile.delays.between_categories, "between categories");
            }
        }

        summary.ledger_saved &= self.ledger.flush();
        if summary.interrupted {
            warn!("interrupted, ledger flushed");
        }
        info!(
            downloaded = summary.totals.downloaded,
            skipped = summary.totals.skipped,
            duplicates = summary.totals.duplicates,
            blocked = summary.totals.blocked,
            output = %self.store.root(),
            "scraping complete"
        );
        sink.event(ProgressEvent {
            message: "phase=Done".to_string(),
            elapsed: Some(started.elapsed()),
        });
        summary
    }

    fn pacer(&self) -> &Z {
        self.downloader.pacer()
    }

    fn scrape_category(
        &mut self,
        category: &Category,
        stats: &mut CategoryStats,
        sink: &dyn ProgressSink,
    ) -> Flow {
        let id = category.id.as_str();
        let stains = self.profile.stain_labels();
        if let Err(err) = self.store.ensure_category_layout(id, &stains) {
            error!(category = %id, error = %err, "cannot create category directories");
            return Flow::Finished;
        }

        let (queue, flow) = self.collect(category, stats, sink);
        stats.queued = queue.len();
        if let Flow::Interrupted = flow {
            return flow;
        }
        self.process(id, &queue, stats, sink)
    }

    fn collect(
        &self,
        category: &Category,
        stats: &mut CategoryStats,
        sink: &dyn ProgressSink,
    ) -> (Vec<QueuedCandidate>, Flow) {
        let max_images = self.options.max_images;
        let queries = category.queries(self.options.query_expansion);
        if !self.options.query_expansion {
            info!(category = %category.id, queries = queries.len(), "query expansion disabled");
        }

        let mut queue: Vec<QueuedCandidate> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        for query in queries {
            if self.shutdown.is_requested() {
                return (queue, Flow::Interrupted);
            }
            if queue.len() >= max_images {
                break;
            }

            sink.event(ProgressEvent {
                message: format!("phase=Search; {query}"),
                elapsed: None,
            });
            info!(query = %query, "searching");
            let requested = max_images - queue.len();
            let before = queue.len();
            let primary = self.primary.fetch(query, requested);
            stats.found += primary.len();
            // Fallback is judged on usable results only.
            let mut found = self.keep_relevant(primary, stats);
            let received = found.len();
            if self.profile.fallback.should_fallback(
                requested,
                received,
                queue.len(),
                self.options.min_images,
            ) {
                let deficit = requested.saturating_sub(received);
                info!(
                    primary = self.primary.name(),
                    secondary = self.secondary.name(),
                    received,
                    deficit,
                    "few results, trying fallback"
                );
                let secondary = self.secondary.fetch(query, deficit);
                stats.found += secondary.len();
                found.extend(self.keep_relevant(secondary, stats));
            }

            for candidate in found {
                if queue.len() >= max_images {
                    break;
                }
                if !seen.insert(candidate.image_url.clone()) {
                    continue;
                }
                queue.push(QueuedCandidate {
                    candidate,
                    query: query.clone(),
                });
            }
            info!(query = %query, queued = queue.len() - before, "candidates collected");
            self.pacer()
                .pause(self.profile.delays.between_queries, "between queries");
        }
        (queue, Flow::Finished)
    }

    /// Drops non-histology results when the profile filters on histology.
    fn keep_relevant(&self, candidates: Vec<Candidate>, stats: &mut CategoryStats) -> Vec<Candidate> {
        if !self.filter.histology_enabled() {
            return candidates;
        }
        candidates
            .into_iter()
            .filter(|candidate| {
                let relevant = self
                    .filter
                    .is_histology_relevant(&candidate.image_url, &candidate.title);
                if !relevant {
                    debug!(url = %candidate.image_url, "not a histology image");
                    stats.non_histology += 1;
                }
                relevant
            })
            .collect()
    }

    fn process(
        &mut self,
        category: &str,
        queue: &[QueuedCandidate],
        stats: &mut CategoryStats,
        sink: &dyn ProgressSink,
    ) -> Flow {
        let (min_width, min_height) = (self.options.min_width, self.options.min_height);
        for (position, queued) in queue.iter().enumerate() {
            if self.shutdown.is_requested() {
                return Flow::Interrupted;
            }
            if stats.downloaded >= self.options.max_images {
                break;
            }
            let index = position + 1;
            let url = queued.candidate.image_url.as_str();
            let title = queued.candidate.title.as_str();

            if self.ledger.contains_url(url) {
                debug!(url, "already scraped");
                stats.cached += 1;
                continue;
            }
            if self.filter.is_domain_blocked(url) {
                debug!(url, "blocked domain");
                stats.blocked += 1;
                continue;
            }

            let stain = self.classifier.classify(url, title);
            let filename = self.namer.generate(category, &stain, title, index);
            let key = self.store.image_key(category, &stain, &filename);
            let target = Target {
                path: self.store.resolve_key(&key),
                stain,
                filename,
                key,
            };
            if target.path.as_std_path().exists() {
                debug!(file = %target.filename, "file exists, skipping");
                self.ledger.record_url(url, &timestamp());
                stats.skipped += 1;
                continue;
            }

            sink.event(ProgressEvent {
                message: format!("phase=Download; {}", target.filename),
                elapsed: None,
            });
            let outcome = self
                .downloader
                .download(url, &target.path, min_width, min_height);
            match &outcome {
                DownloadOutcome::Saved { dimensions, .. } => {
                    debug!(
                        width = dimensions.width,
                        height = dimensions.height,
                        "image validated"
                    );
                    self.commit(category, &target, queued, stats);
                }
                DownloadOutcome::Rejected(reason) => {
                    debug!(url, %reason, "candidate rejected");
                    stats.skipped += 1;
                }
                DownloadOutcome::Failed { attempts, reason } => {
                    debug!(url, attempts, %reason, "candidate failed");
                    stats.skipped += 1;
                }
            }
            if !outcome.is_saved() && self.options.failure_policy.should_record(&outcome) {
                self.ledger.record_url(url, &timestamp());
            }

            self.pacer()
                .pause(self.profile.delays.after_candidate, "after candidate");
        }
        Flow::Finished
    }

    /// Keeps the downloaded file if its content is new, otherwise deletes it.
    fn commit(
        &mut self,
        category: &str,
        target: &Target,
        queued: &QueuedCandidate,
        stats: &mut CategoryStats,
    ) {
        let url = queued.candidate.image_url.as_str();
        let check = match dedup::check_file(target.path.as_std_path(), &target.key, self.ledger.hashes())
        {
            Ok(check) => check,
            Err(err) => {
                error!(file = %target.path, error = %err, "cannot hash downloaded file");
                discard(&target.path);
                stats.skipped += 1;
                return;
            }
        };
        if check.is_duplicate() {
            discard(&target.path);
            self.ledger.record_url(url, &timestamp());
            stats.duplicates += 1;
            return;
        }

        let record = CitationRecord {
            filename: target.filename.clone(),
            category: category.to_string(),
            stain: target.stain.to_string(),
            source_url: url.to_string(),
            title: queued.candidate.title.clone(),
            query: queued.query.clone(),
            download_date: timestamp(),
            file_hash: check.digest,
        };
        self.ledger.commit(&target.key, record);
        stats.downloaded += 1;
        info!(file = %target.filename, stain = %target.stain, "downloaded");
        if self.options.min_images > 0 && stats.downloaded == self.options.min_images {
            info!(category, min_images = self.options.min_images, "reached minimum");
        }
    }
}

fn discard(path: &Utf8Path) {
    if let Err(err) = Store::remove_file(path) {
        warn!(file = %path, error = %err, "could not remove discarded file");
    }
}

fn timestamp() -> String {
    Local::now().to_rfc3339()
}
