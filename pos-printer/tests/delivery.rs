//! Delivery transport tests against fake and file-backed printers

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use pos_printer::{
    DeliveryState, DeliveryTransport, DevicePrinter, JobCompiler, PrintError, PrintFailure,
    PrintResult, PrintService, PrintWarning, Printer, PrinterConfig, QrPresentation,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn staged_files(dir: &Path) -> usize {
    std::fs::read_dir(dir).unwrap().count()
}

/// Records what it was sent, after an optional delay
struct SlowPrinter {
    endpoint: String,
    delay: Duration,
    received: Mutex<Vec<Vec<u8>>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl SlowPrinter {
    fn new(endpoint: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            endpoint: endpoint.to_string(),
            delay,
            received: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }

    fn received(&self) -> Vec<Vec<u8>> {
        self.received.lock().unwrap().clone()
    }
}

#[async_trait]
impl Printer for SlowPrinter {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn transmit(&self, staged: &Path) -> PrintResult<()> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let data = std::fs::read(staged)?;
        tokio::time::sleep(self.delay).await;
        // the buffer must still be there for the whole transmission
        assert!(staged.exists());
        self.received.lock().unwrap().push(data);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    async fn is_online(&self) -> bool {
        true
    }
}

struct FailingPrinter;

#[async_trait]
impl Printer for FailingPrinter {
    fn endpoint(&self) -> &str {
        "broken"
    }

    async fn transmit(&self, _staged: &Path) -> PrintResult<()> {
        Err(PrintError::Transmission {
            endpoint: "broken".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "paper jam"),
        })
    }

    async fn is_online(&self) -> bool {
        false
    }
}

fn config_in(dir: &Path) -> PrinterConfig {
    PrinterConfig {
        staging_dir: Some(dir.to_path_buf()),
        ..PrinterConfig::default()
    }
}

#[tokio::test]
async fn completed_delivery_reaches_device_and_releases_buffer() {
    init_tracing();
    let staging = tempfile::tempdir().unwrap();
    let devices = tempfile::tempdir().unwrap();
    let device = devices.path().join("lp0");
    std::fs::write(&device, b"").unwrap();

    let config = config_in(staging.path());
    let job = JobCompiler::new(&config)
        .text_job("<center><b>HI</b></center>")
        .unwrap();
    let expected = job.bytes.clone();

    let transport = DeliveryTransport::from_config(&config);
    let printer = Arc::new(DevicePrinter::new(device.to_str().unwrap()).unwrap());
    let report = transport.deliver(printer, job).await.unwrap();

    assert_eq!(report.state, DeliveryState::Completed);
    assert_eq!(report.bytes, expected.len());
    assert_eq!(std::fs::read(&device).unwrap(), expected);

    let stats = transport.stats();
    assert_eq!((stats.staged, stats.released, stats.completed), (1, 1, 1));
    assert_eq!(staged_files(staging.path()), 0);
}

#[tokio::test]
async fn slow_transmission_times_out_at_deadline() {
    init_tracing();
    let staging = tempfile::tempdir().unwrap();
    let transport = DeliveryTransport::new(staging.path());
    let printer = SlowPrinter::new("slow", Duration::from_millis(600));

    let job = JobCompiler::new(&config_in(staging.path()))
        .text_job("late")
        .unwrap()
        .with_timeout(Duration::from_millis(50));

    let started = Instant::now();
    let err = transport
        .deliver(printer.clone(), job)
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    assert!(started.elapsed() < Duration::from_millis(400));
    assert_eq!(transport.stats().timed_out, 1);

    // the abandoned write finishes on its own, then cleans up exactly once
    transport.settle("slow").await;
    let stats = transport.stats();
    assert_eq!((stats.staged, stats.released), (1, 1));
    assert_eq!(stats.completed, 0);
    assert_eq!(staged_files(staging.path()), 0);
    assert_eq!(printer.received().len(), 1);
}

#[tokio::test]
async fn failed_transmission_releases_buffer() {
    init_tracing();
    let staging = tempfile::tempdir().unwrap();
    let transport = DeliveryTransport::new(staging.path());
    let job = JobCompiler::new(&config_in(staging.path()))
        .text_job("x")
        .unwrap();

    let err = transport
        .deliver(Arc::new(FailingPrinter), job)
        .await
        .unwrap_err();

    assert!(matches!(err, PrintError::Transmission { .. }));
    let stats = transport.stats();
    assert_eq!((stats.staged, stats.released, stats.failed), (1, 1, 1));
    assert_eq!(staged_files(staging.path()), 0);
}

#[tokio::test]
async fn same_endpoint_jobs_never_overlap() {
    init_tracing();
    let staging = tempfile::tempdir().unwrap();
    let transport = DeliveryTransport::new(staging.path());
    let printer = SlowPrinter::new("COM1", Duration::from_millis(20));
    let compiler = JobCompiler::new(&config_in(staging.path()));

    let mut handles = Vec::new();
    for i in 0..4 {
        let transport = transport.clone();
        let printer: Arc<dyn Printer> = printer.clone();
        let job = compiler.text_job(&format!("job {}", i)).unwrap();
        handles.push(tokio::spawn(async move { transport.deliver(printer, job).await }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(printer.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(printer.received().len(), 4);
    let stats = transport.stats();
    assert_eq!((stats.staged, stats.released, stats.completed), (4, 4, 4));
}

#[tokio::test]
async fn job_timing_out_in_queue_is_never_sent() {
    init_tracing();
    let staging = tempfile::tempdir().unwrap();
    let transport = DeliveryTransport::new(staging.path());
    let printer = SlowPrinter::new("COM1", Duration::from_millis(300));
    let compiler = JobCompiler::new(&config_in(staging.path()));

    let first = {
        let transport = transport.clone();
        let printer: Arc<dyn Printer> = printer.clone();
        let job = compiler.text_job("first").unwrap();
        tokio::spawn(async move { transport.deliver(printer, job).await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;

    let queued = compiler
        .text_job("second")
        .unwrap()
        .with_timeout(Duration::from_millis(50));
    let err = transport.deliver(printer.clone(), queued).await.unwrap_err();
    assert!(err.is_timeout());

    first.await.unwrap().unwrap();
    transport.settle("COM1").await;

    assert_eq!(printer.received().len(), 1);
    let stats = transport.stats();
    assert_eq!((stats.staged, stats.released), (1, 1));
    assert_eq!((stats.completed, stats.timed_out), (1, 1));
}

#[tokio::test]
async fn service_reports_warnings_and_survives_errors() {
    init_tracing();
    let staging = tempfile::tempdir().unwrap();
    let printer = SlowPrinter::new("COM1", Duration::ZERO);
    let service = PrintService::new(&config_in(staging.path()), printer.clone()).unwrap();

    assert!(matches!(
        service.print_text("   ").await,
        Err(PrintFailure {
            error: PrintError::Validation(_),
            ..
        })
    ));
    assert_eq!(service.stats().staged, 0);

    let outcome = service
        .print_qr(&"Z".repeat(320), &QrPresentation::Bare)
        .await
        .unwrap();
    assert_eq!(
        outcome.warnings,
        vec![PrintWarning::PayloadTooLarge {
            original: 320,
            max: 300
        }]
    );

    service.print_test_page().await.unwrap();
    service.print_qr_test().await.unwrap();

    assert_eq!(printer.received().len(), 3);
    assert!(service.is_online().await);
    assert_eq!(service.stats().released, 3);
}

#[tokio::test]
async fn failed_job_still_reports_compile_warnings() {
    init_tracing();
    let staging = tempfile::tempdir().unwrap();
    let service = PrintService::new(&config_in(staging.path()), Arc::new(FailingPrinter)).unwrap();

    let failure = service
        .print_qr(&"Z".repeat(320), &QrPresentation::Bare)
        .await
        .unwrap_err();

    assert!(matches!(failure.error, PrintError::Transmission { .. }));
    assert!(!failure.is_timeout());
    assert_eq!(
        failure.warnings,
        vec![PrintWarning::PayloadTooLarge {
            original: 320,
            max: 300
        }]
    );
    assert_eq!(service.stats().failed, 1);
    assert_eq!(staged_files(staging.path()), 0);
}

#[tokio::test]
async fn unbounded_timeout_delivers_normally() {
    init_tracing();
    let staging = tempfile::tempdir().unwrap();
    let transport = DeliveryTransport::new(staging.path());
    let printer = SlowPrinter::new("COM1", Duration::ZERO);

    let job = JobCompiler::new(&config_in(staging.path()))
        .text_job("forever")
        .unwrap()
        .with_timeout(Duration::MAX);
    let report = transport.deliver(printer.clone(), job).await.unwrap();

    assert_eq!(report.state, DeliveryState::Completed);
    assert_eq!(printer.received().len(), 1);
    assert_eq!(staged_files(staging.path()), 0);
}
