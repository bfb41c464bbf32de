mod common;

use std::cell::RefCell;
use std::ffi::{c_char, c_void, CStr};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use cabinet_audio::bridge::UpdateCallback;
use cabinet_audio::{
    create_backend, AudioBackend, BackendContext, BackendKind, BridgeBackend, BridgeEntryPoints,
    BridgeLibrary, BridgeOptions, BufferFlags, ClientError, DevicePeriod, DummyAudioClient,
    EventHandle, HResult, InitializeParams, ShareMode, StreamFlags, StreamFormat,
};
use proptest::prelude::*;

use common::{counting_event, intercept_fatal, panic_message, pcm, BrokenEvent, CountingEvent};

#[derive(Default)]
struct FakeState {
    config: Option<String>,
    period_hns: i64,
    period_frames: u32,
    null_client: bool,
    title: Option<String>,
    created: usize,
    destroyed: usize,
    started: usize,
    stopped: usize,
    released: Vec<u32>,
    payload: Vec<u8>,
    calls: Vec<&'static str>,
    update: Option<(UpdateCallback, usize)>,
}

thread_local! {
    static FAKE: RefCell<FakeState> = RefCell::new(FakeState {
        period_hns: 26_666,
        period_frames: 128,
        ..FakeState::default()
    });
}

fn fake<R>(f: impl FnOnce(&mut FakeState) -> R) -> R {
    FAKE.with(|state| f(&mut state.borrow_mut()))
}

struct FakeClient {
    buffer: Vec<u8>,
}

extern "C" fn config_init(path: *const c_char) {
    let path = unsafe { CStr::from_ptr(path) }.to_string_lossy().into_owned();
    fake(|s| s.config = Some(path));
}

extern "C" fn format_is_supported(channels: u16, rate: u32, bits: u16) -> i32 {
    if channels == 2 && rate == 48_000 && bits == 16 {
        0
    } else {
        0x8889_0008u32 as i32
    }
}

extern "C" fn get_period_frames() -> u32 {
    fake(|s| s.period_frames)
}

extern "C" fn get_period_hns() -> i64 {
    fake(|s| s.period_hns)
}

extern "C" fn client_create(title: *const c_char) -> *mut c_void {
    let title = unsafe { CStr::from_ptr(title) }.to_string_lossy().into_owned();
    let null = fake(|s| {
        s.title = Some(title);
        s.null_client
    });
    if null {
        return std::ptr::null_mut();
    }
    fake(|s| s.created += 1);
    Box::into_raw(Box::new(FakeClient { buffer: Vec::new() })) as *mut c_void
}

extern "C" fn client_start(_client: *mut c_void) {
    fake(|s| s.started += 1);
}

extern "C" fn client_stop(_client: *mut c_void) {
    fake(|s| s.stopped += 1);
}

extern "C" fn client_destroy(client: *mut c_void) {
    drop(unsafe { Box::from_raw(client as *mut FakeClient) });
    fake(|s| s.destroyed += 1);
}

extern "C" fn client_get_buffer(client: *mut c_void, frames: u32) -> *mut u8 {
    let client = unsafe { &mut *(client as *mut FakeClient) };
    client.buffer.resize(frames as usize * 4, 0);
    client.buffer.as_mut_ptr()
}

extern "C" fn client_release_buffer(client: *mut c_void, frames: u32) {
    let client = unsafe { &*(client as *const FakeClient) };
    let len = (frames as usize * 4).min(client.buffer.len());
    let payload = client.buffer[..len].to_vec();
    fake(|s| {
        s.released.push(frames);
        s.payload = payload;
        s.calls.push("release");
    });
}

extern "C" fn client_update_callback(
    _client: *mut c_void,
    callback: Option<UpdateCallback>,
    user: *mut c_void,
) {
    fake(|s| s.update = callback.map(|cb| (cb, user as usize)));
}

fn entries() -> BridgeEntryPoints {
    BridgeEntryPoints {
        config_init,
        format_is_supported,
        get_period_frames,
        get_period_hns,
        client_create,
        client_start,
        client_stop,
        client_destroy,
        client_get_buffer,
        client_release_buffer,
        client_update_callback,
    }
}

fn library() -> Arc<BridgeLibrary> {
    Arc::new(BridgeLibrary::from_entry_points(entries()))
}

fn backend() -> BridgeBackend {
    BridgeBackend::new(library(), Arc::new(StreamFormat::cd_quality()), "GAME TITLE")
}

fn initialized() -> BridgeBackend {
    let mut backend = backend();
    let format = pcm(2, 48_000, 16);
    backend
        .is_format_supported(ShareMode::Exclusive, &format)
        .unwrap();
    let mut params = InitializeParams::exclusive(100_000, 100_000);
    backend.initialize(&mut params, &format).unwrap();
    backend
}

#[test]
fn caches_library_timing_at_construction() {
    let backend = backend();
    assert_eq!(backend.device_period(), Ok(DevicePeriod::uniform(26_666)));
    assert_eq!(backend.buffer_size(), Ok(128));
    assert!(!backend.is_initialized());
    assert_eq!(fake(|s| s.created), 0);
}

#[test]
fn config_path_is_passed_to_library() {
    let library = BridgeLibrary::from_entry_points(entries());
    library.init_config(&PathBuf::from("prop/linux.json"));
    assert_eq!(fake(|s| s.config.clone()).as_deref(), Some("prop/linux.json"));
}

proptest! {
    #[test]
    fn format_support_follows_library_predicate(
        exclusive in any::<bool>(),
        channels in prop::sample::select(vec![1u16, 2, 6]),
        rate in prop::sample::select(vec![44_100u32, 48_000]),
        bits in prop::sample::select(vec![16u16, 24]),
    ) {
        let mut backend = backend();
        let share_mode = if exclusive { ShareMode::Exclusive } else { ShareMode::Shared };
        let format = pcm(channels, rate, bits);
        let expected = exclusive && channels == 2 && rate == 48_000 && bits == 16;
        for _ in 0..3 {
            let result = backend.is_format_supported(share_mode, &format);
            prop_assert_eq!(result.is_ok(), expected);
            if !expected {
                prop_assert_eq!(result, Err(ClientError::UnsupportedFormat));
            }
        }
    }
}

#[test]
fn negotiation_refreshes_period_before_initialize() {
    let mut backend = backend();
    fake(|s| {
        s.period_hns = 53_333;
        s.period_frames = 256;
    });
    backend
        .is_format_supported(ShareMode::Exclusive, &pcm(2, 48_000, 16))
        .unwrap();
    assert_eq!(backend.device_period(), Ok(DevicePeriod::uniform(53_333)));
    assert_eq!(backend.buffer_size(), Ok(256));
    assert!(backend.negotiated_format().is_some());
}

#[test]
fn initialize_applies_library_timing_and_title() {
    let mut backend = backend();
    let format = pcm(2, 48_000, 16);
    let mut params = InitializeParams::exclusive(100_000, 100_000);
    backend.initialize(&mut params, &format).unwrap();

    assert_eq!(params.buffer_duration, 26_666);
    assert_eq!(params.periodicity, 26_666);
    assert_eq!(params.share_mode, ShareMode::Shared);
    assert_eq!(fake(|s| s.title.clone()).as_deref(), Some("GAME TITLE"));
    assert_eq!(fake(|s| s.created), 1);
    assert!(fake(|s| s.update.is_some()));

    assert_eq!(
        backend.initialize(&mut params, &format),
        Err(ClientError::AlreadyInitialized)
    );
    assert_eq!(fake(|s| s.created), 1);
}

#[test]
fn buffer_size_is_stable_for_the_session() {
    let mut backend = initialized();
    fake(|s| s.period_frames = 512);
    backend
        .is_format_supported(ShareMode::Exclusive, &pcm(2, 48_000, 16))
        .unwrap();
    for _ in 0..100 {
        assert_eq!(backend.buffer_size(), Ok(128));
    }
}

#[test]
fn render_cycles_signal_once_per_release() {
    let mut backend = initialized();
    let (event, counter) = counting_event();
    let adopted = event.id();
    let replacement = backend.set_event_handle(event).unwrap();
    assert_ne!(replacement.id(), adopted);

    backend.start().unwrap();
    let frames = backend.buffer_size().unwrap();
    for cycle in 0..1_000u32 {
        let ptr = backend.buffer(frames).unwrap();
        let data = unsafe { std::slice::from_raw_parts_mut(ptr.as_ptr(), frames as usize * 4) };
        data.fill(cycle as u8);
        backend.release_buffer(frames, BufferFlags::empty()).unwrap();
    }
    backend.stop().unwrap();

    assert_eq!(counter.signals(), 1_000);
    assert_eq!(fake(|s| s.released.len()), 1_000);
    assert_eq!(fake(|s| (s.started, s.stopped)), (1, 1));
    assert!(!replacement.wait(Some(Duration::from_millis(1))).unwrap());
}

#[test]
fn zero_frame_release_still_signals() {
    let mut backend = initialized();
    let (event, counter) = counting_event();
    backend.set_event_handle(event).unwrap();
    backend.start().unwrap();
    backend.release_buffer(0, BufferFlags::SILENT).unwrap();
    assert_eq!(counter.signals(), 1);
    assert_eq!(fake(|s| s.released.clone()), vec![0]);
}

#[test]
fn silent_release_hands_zeroes_to_library() {
    let mut backend = initialized();
    backend.start().unwrap();

    let ptr = backend.buffer(128).unwrap();
    let data = unsafe { std::slice::from_raw_parts_mut(ptr.as_ptr(), 512) };
    data.fill(0x7F);
    backend.release_buffer(128, BufferFlags::SILENT).unwrap();
    let payload = fake(|s| s.payload.clone());
    assert_eq!(payload.len(), 512);
    assert!(payload.iter().all(|&b| b == 0), "{:?}", &payload[..8]);

    let ptr = backend.buffer(128).unwrap();
    let data = unsafe { std::slice::from_raw_parts_mut(ptr.as_ptr(), 512) };
    data.fill(0x7F);
    backend.release_buffer(128, BufferFlags::empty()).unwrap();
    assert!(fake(|s| s.payload.iter().all(|&b| b == 0x7F)));
}

#[test]
fn silent_release_only_clears_released_frames() {
    let mut backend = initialized();
    backend.start().unwrap();

    let ptr = backend.buffer(128).unwrap();
    let data = unsafe { std::slice::from_raw_parts_mut(ptr.as_ptr(), 512) };
    data.fill(0x11);
    backend.release_buffer(64, BufferFlags::SILENT).unwrap();

    let data = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), 512) };
    assert!(data[..256].iter().all(|&b| b == 0));
    assert!(data[256..].iter().all(|&b| b == 0x11));
}

#[test]
fn starting_a_running_client_does_not_restart_the_library() {
    let mut client = DummyAudioClient::new(Box::new(backend()));
    let format = pcm(2, 48_000, 16);
    unsafe {
        assert_eq!(
            client.is_format_supported(1, &format, std::ptr::null_mut()),
            HResult::S_OK
        );
        assert_eq!(
            client.initialize(
                1,
                StreamFlags::EVENTCALLBACK.bits(),
                0,
                0,
                &format,
                std::ptr::null()
            ),
            HResult::S_OK
        );
    }
    let (event, _) = counting_event();
    client.set_event_handle(event).unwrap();

    assert_eq!(client.start(), HResult::S_OK);
    assert_eq!(client.start(), HResult::AUDCLNT_E_NOT_STOPPED);
    assert_eq!(fake(|s| s.started), 1);

    assert_eq!(client.stop(), HResult::S_OK);
    assert_eq!(client.start(), HResult::S_OK);
    assert_eq!(fake(|s| s.started), 2);
}

#[test]
fn signal_follows_library_release() {
    let mut backend = initialized();
    let raw = Arc::new(CountingEvent::with_hook(|| fake(|s| s.calls.push("signal"))));
    backend
        .set_event_handle(EventHandle::from_raw(raw.clone()))
        .unwrap();
    backend.start().unwrap();
    for _ in 0..3 {
        backend.buffer(128).unwrap();
        backend.release_buffer(128, BufferFlags::empty()).unwrap();
    }
    assert_eq!(
        fake(|s| s.calls.clone()),
        vec!["release", "signal", "release", "signal", "release", "signal"]
    );
    assert_eq!(raw.signals(), 3);
}

#[test]
fn failed_signal_is_not_an_error() {
    let mut backend = initialized();
    backend
        .set_event_handle(EventHandle::from_raw(Arc::new(BrokenEvent)))
        .unwrap();
    backend.start().unwrap();
    assert_eq!(backend.release_buffer(128, BufferFlags::empty()), Ok(()));
}

#[test]
fn padding_tracks_library_consumption() {
    let mut backend = initialized();
    backend.start().unwrap();
    for _ in 0..4 {
        backend.buffer(128).unwrap();
        backend.release_buffer(128, BufferFlags::empty()).unwrap();
    }
    assert_eq!(backend.current_padding(), Ok(512));

    let (callback, user) = fake(|s| s.update).unwrap();
    unsafe { callback(user as *mut c_void, 384) };
    assert_eq!(backend.current_padding(), Ok(128));
    unsafe { callback(user as *mut c_void, 1_000) };
    assert_eq!(backend.current_padding(), Ok(0));
    assert_eq!(backend.stream_latency(), Ok(26_666));
}

#[test]
fn operations_before_initialize_report_not_initialized() {
    let mut backend = backend();
    assert_eq!(backend.start(), Err(ClientError::NotInitialized));
    assert_eq!(backend.stop(), Err(ClientError::NotInitialized));
    assert_eq!(backend.mix_format(), Err(ClientError::NotImplemented));
}

#[test]
fn client_is_destroyed_exactly_once() {
    let mut backend = initialized();
    backend.start().unwrap();
    backend.stop().unwrap();
    backend.start().unwrap();
    backend.stop().unwrap();
    drop(backend);
    assert_eq!(fake(|s| (s.created, s.destroyed)), (1, 1));
}

#[test]
fn dropping_an_uninitialized_backend_destroys_nothing() {
    drop(backend());
    assert_eq!(fake(|s| s.destroyed), 0);
}

#[test]
fn null_client_is_fatal() {
    intercept_fatal();
    fake(|s| s.null_client = true);
    let mut backend = backend();
    let format = pcm(2, 48_000, 16);
    let mut params = InitializeParams::exclusive(100_000, 100_000);

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let _ = backend.initialize(&mut params, &format);
    }));
    let message = panic_message(result.expect_err("null client must be fatal"));
    assert!(message.contains("audio::bridge"), "{message}");
    assert!(message.contains("GAME TITLE"), "{message}");

    drop(backend);
    assert_eq!(fake(|s| s.destroyed), 0);
}

#[test]
fn unresolvable_library_is_fatal() {
    intercept_fatal();
    let dir = tempfile::tempdir().unwrap();
    let options = BridgeOptions::default().with_library_dir(Some(dir.path().to_path_buf()));

    let result = panic::catch_unwind(|| {
        BridgeBackend::open(&options, Arc::new(StreamFormat::cd_quality()), "GAME TITLE")
    });
    let message = panic_message(result.err().expect("missing library must be fatal"));
    assert!(message.contains("not found"), "{message}");
}

#[test]
fn registry_bridge_with_missing_library_is_fatal() {
    intercept_fatal();
    let dir = tempfile::tempdir().unwrap();
    let options = BridgeOptions::default().with_library_dir(Some(dir.path().to_path_buf()));
    let title = String::from("GAME TITLE");
    let ctx = BackendContext {
        format: Arc::new(StreamFormat::cd_quality()),
        identity: &title,
        bridge: &options,
    };

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        create_backend(BackendKind::Bridge, &ctx);
    }));
    assert!(result.is_err());
}
