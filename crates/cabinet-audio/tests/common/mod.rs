#![allow(dead_code)]

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cabinet_audio::format::WAVE_FORMAT_PCM;
use cabinet_audio::{EventHandle, ManualResetEvent, RawEvent, WaveFormatEx};

/// Manual-reset event that counts how often it was raised.
#[derive(Default)]
pub struct CountingEvent {
    signals: AtomicUsize,
    inner: ManualResetEvent,
    on_set: Option<Box<dyn Fn() + Send + Sync>>,
}

impl CountingEvent {
    pub fn with_hook(hook: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            on_set: Some(Box::new(hook)),
            ..Self::default()
        }
    }

    pub fn signals(&self) -> usize {
        self.signals.load(Ordering::SeqCst)
    }
}

impl RawEvent for CountingEvent {
    fn set(&self) -> io::Result<()> {
        self.signals.fetch_add(1, Ordering::SeqCst);
        if let Some(hook) = &self.on_set {
            hook();
        }
        self.inner.set()
    }

    fn reset(&self) -> io::Result<()> {
        self.inner.reset()
    }

    fn wait(&self, timeout: Option<Duration>) -> io::Result<bool> {
        self.inner.wait(timeout)
    }
}

/// Event whose signal always fails.
pub struct BrokenEvent;

impl RawEvent for BrokenEvent {
    fn set(&self) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::Other, "event closed"))
    }

    fn reset(&self) -> io::Result<()> {
        Ok(())
    }

    fn wait(&self, _timeout: Option<Duration>) -> io::Result<bool> {
        Ok(false)
    }
}

pub fn counting_event() -> (EventHandle, Arc<CountingEvent>) {
    let raw = Arc::new(CountingEvent::default());
    (EventHandle::from_raw(raw.clone()), raw)
}

/// Makes fatal errors unwind instead of terminating the test process.
pub fn intercept_fatal() {
    cabinet_audio::set_fatal_hook(Box::new(|report| panic!("fatal: {report}")));
}

pub fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    payload
        .downcast_ref::<String>()
        .cloned()
        .or_else(|| payload.downcast_ref::<&str>().map(|s| s.to_string()))
        .unwrap_or_default()
}

pub fn pcm(channels: u16, rate: u32, bits: u16) -> WaveFormatEx {
    let block_align = channels * (bits / 8);
    WaveFormatEx {
        format_tag: WAVE_FORMAT_PCM,
        channels,
        samples_per_sec: rate,
        avg_bytes_per_sec: rate * u32::from(block_align),
        block_align,
        bits_per_sample: bits,
        cb_size: 0,
    }
}
