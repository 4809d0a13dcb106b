//! Shared fakes for the machine integration tests.

#![allow(dead_code, reason = "Each test binary uses a different subset")]

use anyhow::{Result, anyhow};
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Notify;
use url::Url;
use webp_machine::{Decoder, Document, PolyfillConfig, Surface, WebpMachine};

pub const BASE: &str = "https://example.test/site/";

pub fn document() -> Document {
    Document::new(Url::parse(BASE).unwrap())
}

pub fn url(path: &str) -> String {
    format!("{BASE}{path}")
}

/// Fetch pause point: the fetch of `url` signals `reached` and waits for `release`.
pub struct Gate {
    pub url: String,
    pub reached: Arc<Notify>,
    pub release: Arc<Notify>,
}

/// Serves the URL's last path segment as the body. Paths containing
/// `missing` fail; paths containing `corrupt` serve a payload the decoder rejects.
#[derive(Clone, Default)]
pub struct FakeFetcher {
    pub calls: Arc<AtomicUsize>,
    pub log: Arc<Mutex<Vec<String>>>,
    gate: Option<Arc<Gate>>,
}

impl FakeFetcher {
    pub fn gated(path: &str) -> (Self, Arc<Notify>, Arc<Notify>) {
        let reached = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let fetcher = Self {
            gate: Some(Arc::new(Gate {
                url: url(path),
                reached: Arc::clone(&reached),
                release: Arc::clone(&release),
            })),
            ..Self::default()
        };
        (fetcher, reached, release)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn fetched(&self) -> Vec<String> {
        self.log.lock().clone()
    }
}

impl webp_machine::Fetcher for FakeFetcher {
    async fn fetch(&self, url: &Url) -> Result<Bytes> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.log.lock().push(url.to_string());
        if let Some(gate) = &self.gate
            && gate.url == url.as_str()
        {
            gate.reached.notify_one();
            gate.release.notified().await;
        }
        let path = url.path();
        if path.contains("missing") {
            return Err(anyhow!("404 Not Found"));
        }
        if path.contains("corrupt") {
            return Ok(Bytes::from_static(b"corrupt"));
        }
        let name = path.rsplit('/').next().unwrap_or_default().to_owned();
        Ok(Bytes::from(name))
    }
}

#[derive(Debug, Default)]
pub struct StubSurface(Option<String>);

impl Surface for StubSurface {
    fn to_data_url(&self) -> Result<String> {
        self.0
            .as_ref()
            .map(String::as_str)
            .map(expected)
            .ok_or_else(|| anyhow!("blank surface"))
    }
}

/// "Decodes" by copying the payload onto the surface; rejects `corrupt`.
#[derive(Debug, Default)]
pub struct StubDecoder {
    pub calls: Arc<AtomicUsize>,
}

impl StubDecoder {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Decoder for StubDecoder {
    type Surface = StubSurface;

    fn decode_into(&mut self, surface: &mut StubSurface, data: &[u8]) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if data == b"corrupt" {
            return Err(anyhow!("invalid VP8 header"));
        }
        surface.0 = Some(String::from_utf8_lossy(data).into_owned());
        Ok(())
    }
}

/// Data URL the stub pipeline produces for a served file name. Dots are
/// replaced the way a real base64 payload never contains them, so polyfilled
/// elements stop matching the extension check.
pub fn expected(name: &str) -> String {
    format!("data:image/png;base64,{}", name.replace('.', "_"))
}

pub type TestMachine = WebpMachine<FakeFetcher, StubDecoder>;

pub fn machine(fetcher: FakeFetcher, config: PolyfillConfig) -> TestMachine {
    let _ = env_logger::builder().is_test(true).try_init();
    WebpMachine::new(fetcher, StubDecoder::default(), config)
}

pub fn decode_calls(machine: &TestMachine) -> usize {
    machine.with_decoder(StubDecoder::calls)
}
