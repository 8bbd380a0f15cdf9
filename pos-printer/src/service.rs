//! Print service
//!
//! Glues compilation and delivery for one configured printer. Any single job
//! may fail; the service stays usable for the next one. A failed job still
//! reports the warnings its compilation produced.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::config::PrinterConfig;
use crate::error::{PrintFailure, PrintResult, PrintWarning};
use crate::job::{JobCompiler, PrintJob};
use crate::printer::{Printer, open_endpoint};
use crate::qr::QrPresentation;
use crate::transport::{DeliveryReport, DeliverySnapshot, DeliveryTransport};

/// Result of a delivered job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintOutcome {
    pub report: DeliveryReport,
    pub warnings: Vec<PrintWarning>,
}

/// Compiles and delivers jobs to one printer
pub struct PrintService {
    compiler: JobCompiler,
    transport: DeliveryTransport,
    printer: Arc<dyn Printer>,
}

impl PrintService {
    pub fn new(config: &PrinterConfig, printer: Arc<dyn Printer>) -> PrintResult<Self> {
        config.validate()?;
        Ok(Self {
            compiler: JobCompiler::new(config),
            transport: DeliveryTransport::from_config(config),
            printer,
        })
    }

    /// Service writing to the configured port or network address
    pub fn from_config(config: &PrinterConfig) -> PrintResult<Self> {
        let printer = open_endpoint(&config.port_name)?;
        Self::new(config, printer)
    }

    pub fn compiler(&self) -> &JobCompiler {
        &self.compiler
    }

    pub fn transport(&self) -> &DeliveryTransport {
        &self.transport
    }

    pub fn stats(&self) -> DeliverySnapshot {
        self.transport.stats()
    }

    /// Print a markup document
    #[instrument(skip(self, document), fields(endpoint = %self.printer.endpoint()))]
    pub async fn print_text(&self, document: &str) -> Result<PrintOutcome, PrintFailure> {
        let job = self.compiler.text_job(document)?;
        self.submit(job).await
    }

    /// Print a QR code
    #[instrument(skip(self, data, presentation), fields(endpoint = %self.printer.endpoint()))]
    pub async fn print_qr(
        &self,
        data: &str,
        presentation: &QrPresentation,
    ) -> Result<PrintOutcome, PrintFailure> {
        let job = self.compiler.qr_job(data, presentation)?;
        self.submit(job).await
    }

    pub async fn print_test_page(&self) -> Result<PrintOutcome, PrintFailure> {
        let job = self.compiler.test_page()?;
        self.submit(job).await
    }

    pub async fn print_qr_test(&self) -> Result<PrintOutcome, PrintFailure> {
        let job = self.compiler.qr_capability_test()?;
        self.submit(job).await
    }

    /// Deliver an already compiled job
    pub async fn submit(&self, mut job: PrintJob) -> Result<PrintOutcome, PrintFailure> {
        let warnings = std::mem::take(&mut job.warnings);
        for warning in &warnings {
            warn!(%warning, "Job compiled with warning");
        }

        match self.transport.deliver(Arc::clone(&self.printer), job).await {
            Ok(report) => {
                info!(bytes = report.bytes, "Print job completed");
                Ok(PrintOutcome { report, warnings })
            }
            Err(error) => Err(PrintFailure { error, warnings }),
        }
    }

    pub async fn is_online(&self) -> bool {
        self.printer.is_online().await
    }
}
