use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::Mutex;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use image::{ImageFormat, Rgb, RgbImage};

use granuloma_scraper::download::{
    DownloadOutcome, Downloader, Rejection, RetryPolicy, Transport, TransportResponse,
};
use granuloma_scraper::error::ScraperError;
use granuloma_scraper::pacing::{DelayRange, NoDelay};

enum Reply {
    Image(Vec<u8>),
    Html,
    Status(u16),
    Timeout,
}

#[derive(Default)]
struct ScriptedTransport {
    replies: Mutex<VecDeque<Reply>>,
    calls: Mutex<usize>,
}

impl ScriptedTransport {
    fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(0),
        }
    }

    fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl Transport for ScriptedTransport {
    fn get(&self, url: &str) -> Result<TransportResponse, ScraperError> {
        *self.calls.lock().unwrap() += 1;
        match self.replies.lock().unwrap().pop_front() {
            Some(Reply::Image(body)) => Ok(TransportResponse::from_bytes(200, Some("image/jpeg"), body)),
            Some(Reply::Html) => Ok(TransportResponse::from_bytes(
                200,
                Some("text/html; charset=utf-8"),
                b"<html></html>".to_vec(),
            )),
            Some(Reply::Status(status)) => Ok(TransportResponse::from_bytes(status, None, Vec::new())),
            Some(Reply::Timeout) | None => Err(ScraperError::HttpTimeout(url.to_string())),
        }
    }
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb([120, 40, 200]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

fn destination() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, root.join("sarcoidosis").join("H&E").join("sarcoidosis_01.jpg"))
}

fn downloader(transport: &ScriptedTransport) -> Downloader<&ScriptedTransport, NoDelay> {
    Downloader::new(transport, NoDelay, RetryPolicy::new(3, DelayRange::zero()))
}

#[test]
fn html_response_is_rejected_with_a_single_request() {
    let (_temp, path) = destination();
    let transport = ScriptedTransport::new(vec![Reply::Html, Reply::Image(png(500, 400))]);

    let outcome = downloader(&transport).download("https://example.org/page", &path, 400, 300);

    assert_matches!(outcome, DownloadOutcome::Rejected(Rejection::NotImage(_)));
    assert_eq!(transport.calls(), 1);
    assert!(!path.as_std_path().exists());
}

#[test]
fn undersized_image_is_rejected_without_retry() {
    let (_temp, path) = destination();
    let transport = ScriptedTransport::new(vec![Reply::Image(png(100, 100))]);

    let outcome = downloader(&transport).download("https://example.org/small.png", &path, 400, 300);

    assert_eq!(outcome, DownloadOutcome::Rejected(Rejection::InvalidImage));
    assert_eq!(transport.calls(), 1);
}

#[test]
fn client_error_status_is_not_retried() {
    let (_temp, path) = destination();
    let transport = ScriptedTransport::new(vec![Reply::Status(404)]);

    let outcome = downloader(&transport).download("https://example.org/gone.png", &path, 1, 1);

    assert_eq!(outcome, DownloadOutcome::Rejected(Rejection::Status(404)));
    assert_eq!(transport.calls(), 1);
}

#[test]
fn transient_faults_are_retried_until_success() {
    let (_temp, path) = destination();
    let transport = ScriptedTransport::new(vec![
        Reply::Timeout,
        Reply::Status(503),
        Reply::Image(png(500, 400)),
    ]);

    let outcome = downloader(&transport).download("https://example.org/slide.png", &path, 400, 300);

    assert_matches!(outcome, DownloadOutcome::Saved { dimensions, .. } if dimensions.width == 500);
    assert_eq!(transport.calls(), 3);
    assert_eq!(std::fs::read(path.as_std_path()).unwrap(), png(500, 400));
}

#[test]
fn retry_budget_is_bounded() {
    let (_temp, path) = destination();
    let transport = ScriptedTransport::new(vec![
        Reply::Timeout,
        Reply::Timeout,
        Reply::Timeout,
        Reply::Image(png(500, 400)),
    ]);

    let outcome = downloader(&transport).download("https://example.org/slow.png", &path, 1, 1);

    assert_matches!(outcome, DownloadOutcome::Failed { attempts: 3, .. });
    assert_eq!(transport.calls(), 3);
    assert!(!path.as_std_path().exists());
}
