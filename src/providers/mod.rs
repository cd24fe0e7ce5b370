//! Image search backends. Providers are best-effort: failures are logged and
//! show up as fewer candidates, never as errors.

pub mod bing;
pub mod google;

pub use bing::BingProvider;
pub use google::GoogleProvider;

use crate::domain::Candidate;

pub trait ImageSearchProvider {
    fn name(&self) -> &str;

    /// Up to `limit` candidates for `query`, in result order.
    fn fetch(&self, query: &str, limit: usize) -> Vec<Candidate>;
}

impl<P: ImageSearchProvider + ?Sized> ImageSearchProvider for &P {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn fetch(&self, query: &str, limit: usize) -> Vec<Candidate> {
        (**self).fetch(query, limit)
    }
}
