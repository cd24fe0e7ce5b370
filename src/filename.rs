use crate::domain::StainLabel;
use crate::taxonomy::{FallbackTag, Profile};

pub const SUPPORTED_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "gif", "bmp", "webp"];
pub const DEFAULT_EXTENSION: &str = "jpg";

#[derive(Debug, Clone)]
pub struct FilenameGenerator {
    profile: Profile,
}

impl FilenameGenerator {
    pub fn new(profile: Profile) -> Self {
        Self { profile }
    }

    /// Feature tags for `title`, in rule order, without repeats.
    pub fn feature_tags(&self, category: &str, title: &str) -> Vec<String> {
        let lowered = title.to_lowercase();
        let mut tags: Vec<String> = Vec::new();
        if let Some(cat) = self.profile.category(category) {
            for rule in &cat.features {
                if rule.matches(&lowered) && !tags.contains(&rule.tag) {
                    tags.push(rule.tag.clone());
                }
            }
        }
        if tags.is_empty() {
            tags.push(self.fallback_tag().tag_for(category));
        }
        tags
    }

    /// `{category}_{tags}_{index:02}.jpg`, sanitized. The stain is not part of
    /// the name; it only selects the directory.
    pub fn generate(&self, category: &str, _stain: &StainLabel, title: &str, index: usize) -> String {
        let tags = self.feature_tags(category, title).join("_");
        sanitize_filename(&format!("{category}_{tags}_{index:02}.{DEFAULT_EXTENSION}"))
    }

    fn fallback_tag(&self) -> FallbackTag {
        self.profile.fallback_tag
    }
}

/// Restricts `name` to `[A-Za-z0-9_.-]` and a supported image extension.
pub fn sanitize_filename(name: &str) -> String {
    let mut cleaned: String = name
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.') {
                ch
            } else {
                '_'
            }
        })
        .collect();

    let leading_dots = cleaned.chars().take_while(|ch| *ch == '.').count();
    if leading_dots > 0 {
        cleaned.replace_range(..leading_dots, &"_".repeat(leading_dots));
    }

    let split = cleaned
        .rsplit_once('.')
        .filter(|(stem, _)| !stem.is_empty())
        .map(|(stem, ext)| {
            (
                stem.len(),
                is_supported_extension(ext),
                looks_like_extension(ext),
            )
        });
    match split {
        Some((_, true, _)) => cleaned,
        Some((stem_len, false, true)) => {
            cleaned.truncate(stem_len);
            format!("{cleaned}.{DEFAULT_EXTENSION}")
        }
        _ if cleaned.is_empty() => format!("image.{DEFAULT_EXTENSION}"),
        _ => format!("{cleaned}.{DEFAULT_EXTENSION}"),
    }
}

fn looks_like_extension(ext: &str) -> bool {
    (1..=5).contains(&ext.len()) && ext.chars().all(|ch| ch.is_ascii_alphanumeric())
}

pub fn is_supported_extension(ext: &str) -> bool {
    let ext = ext.to_ascii_lowercase();
    SUPPORTED_EXTENSIONS.contains(&ext.as_str())
}
