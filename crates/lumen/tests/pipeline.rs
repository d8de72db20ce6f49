use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use lumen::prelude::*;
use lumen::virtual_device::{BufferSink, VirtualDevice};
use lumen_filter::conversion::FormatConverter;
use smallvec::smallvec;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn tiny_format(code: FourCc) -> VideoFormat {
    VideoFormat::new(
        code,
        Resolution::new(64, 48).unwrap(),
        FrameRate::from_fps(30).unwrap(),
    )
}

fn tiny_device(codes_list: &[FourCc]) -> (VirtualDevice, lumen::virtual_device::VirtualHandle) {
    let descriptions = codes_list
        .iter()
        .map(|code| VideoFormatDescription {
            code: *code,
            spans: vec![ResolutionSpan::Fixed {
                resolution: Resolution::new(64, 48).unwrap(),
                rates: smallvec![FrameRate::from_fps(30).unwrap()],
            }],
        })
        .collect();
    VirtualDevice::new(descriptions)
}

fn wait_until(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    done()
}

#[test]
fn streams_frames_in_fifo_order_under_concurrent_load() {
    init_tracing();
    EngineConfig::new().queue_wait_ms(100).apply();

    let (device, handle) = tiny_device(&[codes::GRAY8]);
    let mut session = CaptureSession::open(Box::new(device)).unwrap();
    let (sink, probe) = BufferSink::new(tiny_format(codes::GRAY8));
    session.start_stream(Box::new(sink)).unwrap();

    const FRAMES: usize = 10_000;
    let producer = {
        let handle = handle.clone();
        thread::spawn(move || {
            for _ in 0..FRAMES {
                assert!(handle.deliver_frame());
            }
        })
    };
    producer.join().unwrap();

    assert!(
        wait_until(Duration::from_secs(10), || probe.count() == FRAMES),
        "only {} of {FRAMES} frames arrived",
        probe.count()
    );
    let sequences = probe.sequences();
    let expected: Vec<u64> = (0..FRAMES as u64).collect();
    assert_eq!(sequences, expected, "frames reordered, duplicated, or dropped");

    session.stop_stream().unwrap();
}

#[test]
fn negotiates_conversion_chain_through_session() {
    init_tracing();

    // Device is bayer-only; the sink wants RGB. One converter bridges.
    let (device, handle) = tiny_device(&[codes::BAYER_RGGB8]);
    let mut session = CaptureSession::open(Box::new(device)).unwrap();
    session
        .register_filter(Box::new(FormatConverter::new(
            "debayer",
            &[codes::BAYER_RGGB8],
            &[codes::RGB24],
        )))
        .unwrap();

    let (sink, probe) = BufferSink::new(tiny_format(codes::RGB24));
    session.start_stream(Box::new(sink)).unwrap();

    assert_eq!(session.status(), PipelineStatus::Playing);
    assert_eq!(
        session.manager().input_format(),
        Some(tiny_format(codes::BAYER_RGGB8))
    );
    assert_eq!(probe.negotiated_format(), Some(tiny_format(codes::RGB24)));
    assert_eq!(
        session.active_video_format(),
        Some(tiny_format(codes::BAYER_RGGB8))
    );

    handle.deliver_frame();
    assert!(wait_until(Duration::from_secs(2), || probe.count() == 1));
    session.stop_stream().unwrap();
}

#[test]
fn native_format_streams_without_filters() {
    init_tracing();

    let (device, handle) = tiny_device(&[codes::GRAY8, codes::BAYER_RGGB8]);
    let mut session = CaptureSession::open(Box::new(device)).unwrap();
    let (sink, probe) = BufferSink::new(tiny_format(codes::GRAY8));
    session.start_stream(Box::new(sink)).unwrap();

    assert_eq!(
        session.manager().input_format(),
        Some(tiny_format(codes::GRAY8))
    );
    handle.deliver_frames(3);
    assert!(wait_until(Duration::from_secs(2), || probe.count() == 3));
    session.stop_stream().unwrap();
}

#[test]
fn unreachable_output_moves_pipeline_to_error() {
    init_tracing();

    let (device, _handle) = tiny_device(&[codes::MJPEG]);
    let mut session = CaptureSession::open(Box::new(device)).unwrap();
    let (sink, _probe) = BufferSink::new(tiny_format(codes::RGB24));

    let err = session.start_stream(Box::new(sink)).unwrap_err();
    assert_eq!(err.code(), "negotiation");
    assert_eq!(session.status(), PipelineStatus::Error);
    // The manager stays usable: a stop returns it to Stopped.
    session.stop_stream().unwrap();
    assert_eq!(session.status(), PipelineStatus::Stopped);
}

#[test]
fn set_status_playing_twice_is_a_no_op() {
    init_tracing();

    let (device, handle) = tiny_device(&[codes::GRAY8]);
    let mut session = CaptureSession::open(Box::new(device)).unwrap();
    let (sink, probe) = BufferSink::new(tiny_format(codes::GRAY8));
    session.start_stream(Box::new(sink)).unwrap();

    // Second transition to the current status must not double-start.
    session
        .manager()
        .set_status(PipelineStatus::Playing)
        .unwrap();
    assert_eq!(session.status(), PipelineStatus::Playing);

    handle.deliver_frames(5);
    assert!(wait_until(Duration::from_secs(2), || probe.count() == 5));

    session.stop_stream().unwrap();
    session.stop_stream().unwrap();
    assert_eq!(session.status(), PipelineStatus::Stopped);
}

#[test]
fn stop_is_safe_against_in_flight_pushes() {
    init_tracing();
    EngineConfig::new().queue_wait_ms(100).apply();

    let (device, handle) = tiny_device(&[codes::GRAY8]);
    let mut session = CaptureSession::open(Box::new(device)).unwrap();
    let (sink, _probe) = BufferSink::new(tiny_format(codes::GRAY8));
    session.start_stream(Box::new(sink)).unwrap();

    let stop_flag = Arc::new(AtomicUsize::new(0));
    let producer = {
        let handle = handle.clone();
        let stop_flag = stop_flag.clone();
        thread::spawn(move || {
            while stop_flag.load(Ordering::Relaxed) == 0 {
                handle.deliver_frame();
            }
        })
    };

    thread::sleep(Duration::from_millis(50));
    let start = Instant::now();
    session.stop_stream().unwrap();
    let stop_duration = start.elapsed();

    stop_flag.store(1, Ordering::Relaxed);
    producer.join().unwrap();

    assert_eq!(session.status(), PipelineStatus::Stopped);
    // Join bound: the wait timeout plus scheduling slack.
    assert!(
        stop_duration < Duration::from_millis(100 + 900),
        "stop took {stop_duration:?}"
    );
}

#[test]
fn frames_pushed_while_stopped_are_dropped() {
    init_tracing();

    let (device, handle) = tiny_device(&[codes::GRAY8]);
    let mut session = CaptureSession::open(Box::new(device)).unwrap();
    let (sink, probe) = BufferSink::new(tiny_format(codes::GRAY8));
    session.start_stream(Box::new(sink)).unwrap();

    handle.deliver_frames(2);
    assert!(wait_until(Duration::from_secs(2), || probe.count() == 2));
    session.stop_stream().unwrap();

    // The device handle may still try to deliver; nothing must arrive.
    handle.deliver_frames(4);
    thread::sleep(Duration::from_millis(100));
    assert_eq!(probe.count(), 2);
}

#[test]
fn device_lost_emits_exactly_one_end_of_stream() {
    init_tracing();

    let (device, handle) = tiny_device(&[codes::GRAY8]);
    let mut session = CaptureSession::open(Box::new(device)).unwrap();

    let eos_count = Arc::new(AtomicUsize::new(0));
    let lost_count = Arc::new(AtomicUsize::new(0));
    {
        let eos_count = eos_count.clone();
        let lost_count = lost_count.clone();
        session.set_event_callback(move |event| match event {
            PipelineEvent::EndOfStream => {
                eos_count.fetch_add(1, Ordering::SeqCst);
            }
            PipelineEvent::DeviceLost => {
                lost_count.fetch_add(1, Ordering::SeqCst);
            }
        });
    }

    let (sink, _probe) = BufferSink::new(tiny_format(codes::GRAY8));
    session.start_stream(Box::new(sink)).unwrap();
    assert!(session.is_running());

    // The backend may fire the callback repeatedly; the latch allows one.
    handle.trip_device_lost();
    handle.trip_device_lost();
    handle.trip_device_lost();

    assert_eq!(eos_count.load(Ordering::SeqCst), 1);
    assert_eq!(lost_count.load(Ordering::SeqCst), 1);
    assert!(!session.is_running());

    session.stop_stream().unwrap();
}

#[test]
fn restarting_after_stop_spawns_a_fresh_worker() {
    init_tracing();

    let (device, handle) = tiny_device(&[codes::GRAY8]);
    let mut session = CaptureSession::open(Box::new(device)).unwrap();
    let (sink, probe) = BufferSink::new(tiny_format(codes::GRAY8));
    session.start_stream(Box::new(sink)).unwrap();

    handle.deliver_frames(2);
    assert!(wait_until(Duration::from_secs(2), || probe.count() == 2));
    session.stop_stream().unwrap();

    session
        .manager()
        .set_status(PipelineStatus::Playing)
        .unwrap();
    assert_eq!(session.status(), PipelineStatus::Playing);
    handle.deliver_frames(2);
    assert!(wait_until(Duration::from_secs(2), || probe.count() == 4));

    session.close();
}

#[test]
fn capability_table_defers_conversion_to_named_stage() {
    init_tracing();

    let (device, _handle) = tiny_device(&[codes::MJPEG]);
    let mut capabilities = CapabilityTable::new();
    capabilities.register("jpegdec", |code| code == codes::MJPEG);
    let mut session =
        CaptureSession::open_with_capabilities(Box::new(device), capabilities).unwrap();

    let (sink, _probe) = BufferSink::new(tiny_format(codes::RGB24));
    session.start_stream(Box::new(sink)).unwrap();

    assert_eq!(session.manager().required_stages(), ["jpegdec".to_string()]);
    assert_eq!(
        session.manager().input_format(),
        Some(tiny_format(codes::MJPEG))
    );
    session.stop_stream().unwrap();
}
