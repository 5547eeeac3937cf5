use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Context};
use backend_client::{BackendConfig, HttpBackend};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use domain::booking::BookingCoordinator;
use domain::capture::{CaptureSequencer, Frame, Services, SlotSpec};
use domain::clock::SystemClock;
use domain::config::{AnalyzerConfig, EnrollmentConfig, WorkflowConfig};
use domain::enrollment::{EnrollmentReceipt, EnrollmentSubmitter};
use domain::orders::{Assignment, OrderWorkflow, ServiceRequest};
use domain::ports::DateRange;

mod devices;

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Guest kiosk for reservations, identity enrollment and service orders"
)]
struct CmdArgs {
    /// Booking backend base URL
    #[arg(
        long,
        env = "BOOKING_API_URL",
        default_value = backend_client::config::DEFAULT_BASE_URL
    )]
    api_url: String,
    #[arg(long, env = "BOOKING_API_TOKEN", hide_env_values = true)]
    api_token: Option<String>,
    #[command(subcommand)]
    subcommand: CmdSubcommand,
}

#[derive(Subcommand, Debug)]
enum CmdSubcommand {
    /// Order a service for an existing booking and assign a staff handler.
    ///
    /// Not available when WORKFLOW_REQUIRE_ENROLLMENT is set; order through
    /// `enroll --service ..` instead.
    Order {
        #[arg(long)]
        booking: String,
        #[arg(long)]
        service: String,
        #[arg(long, default_value_t = 1)]
        quantity: u32,
        #[arg(long)]
        handler: String,
        /// RFC 3339 timestamp, e.g. 2026-05-04T15:00:00Z
        #[arg(long)]
        scheduled_at: DateTime<Utc>,
        #[arg(long)]
        note: Option<String>,
    },
    /// Reserve a room and enroll the guest from image files.
    ///
    /// Images are taken in slot order: face front, face left, face right,
    /// then the identity document. With `--service`, an order for the new
    /// reservation follows once enrollment succeeds.
    Enroll {
        #[arg(long)]
        room: String,
        #[arg(long)]
        check_in: NaiveDate,
        #[arg(long)]
        check_out: NaiveDate,
        #[arg(long, requires_all = ["handler", "scheduled_at"])]
        service: Option<String>,
        #[arg(long, default_value_t = 1)]
        quantity: u32,
        #[arg(long, requires = "service")]
        handler: Option<String>,
        #[arg(long, requires = "service")]
        scheduled_at: Option<DateTime<Utc>>,
        #[arg(long, requires = "service")]
        note: Option<String>,
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .without_time()
        .init();

    let args = CmdArgs::parse();
    let config = BackendConfig {
        base_url: args.api_url,
        token: args.api_token,
        ..BackendConfig::default()
    };
    let backend = Arc::new(HttpBackend::from_config(&config)?);

    match args.subcommand {
        CmdSubcommand::Order { booking, service, quantity, handler, scheduled_at, note } => {
            let workflow_config = WorkflowConfig::from_env();
            if workflow_config.require_enrollment {
                bail!("enrollment is required before ordering; use `enroll --service ..`");
            }
            let workflow = OrderWorkflow::new(backend, workflow_config, booking);
            let request = ServiceRequest::new(service, quantity);
            let assignment = Assignment::new(handler, scheduled_at, note);
            run_order(&workflow, &request, &assignment).await?;
        }
        CmdSubcommand::Enroll {
            room,
            check_in,
            check_out,
            service,
            quantity,
            handler,
            scheduled_at,
            note,
            images,
        } => {
            let dates = DateRange::new(check_in, check_out);
            let receipt = enroll(&backend, &room, dates, &images).await?;
            println!("{}", serde_json::to_string_pretty(&receipt)?);

            if let (Some(service), Some(handler), Some(scheduled_at)) =
                (service, handler, scheduled_at)
            {
                let workflow = OrderWorkflow::new(
                    backend,
                    WorkflowConfig::from_env(),
                    receipt.reservation_id.clone(),
                );
                workflow.record_enrollment(&receipt);
                let request = ServiceRequest::new(service, quantity);
                let assignment = Assignment::new(handler, scheduled_at, note);
                run_order(&workflow, &request, &assignment).await?;
            }
        }
    }
    Ok(())
}

async fn run_order(
    workflow: &OrderWorkflow,
    request: &ServiceRequest,
    assignment: &Assignment,
) -> anyhow::Result<()> {
    let outcome = tokio::select! {
        outcome = workflow.run(request, assignment) => outcome,
        _ = tokio::signal::ctrl_c() => {
            workflow.dismiss();
            bail!("order abandoned");
        }
    };
    let outcome = outcome.with_context(|| {
        let state = workflow.state();
        format!("order workflow stopped in phase {}", state.phase)
    })?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

/// Captures every slot from `images`, reserves the room and uploads the
/// enrollment.
async fn enroll(
    backend: &Arc<HttpBackend>,
    room: &str,
    dates: DateRange,
    images: &[PathBuf],
) -> anyhow::Result<EnrollmentReceipt> {
    let mut sequencer = CaptureSequencer::new(
        devices::NoDetector,
        devices::NoCamera,
        &AnalyzerConfig::from_env(),
        Services::default(),
    );
    let slots = SlotSpec::default_sequence();
    if images.len() != slots.len() {
        bail!("expected {} images, got {}", slots.len(), images.len());
    }
    sequencer.start(slots.clone()).await?;
    for (slot, path) in slots.iter().zip(images) {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        sequencer.capture(&slot.id, Frame::new(0, 0, bytes)).await?;
    }
    let session = sequencer.finish()?;

    let submitter = EnrollmentSubmitter::new(
        backend.clone(),
        EnrollmentConfig::from_env(),
        Arc::new(SystemClock),
    );
    let coordinator = BookingCoordinator::new(backend.clone(), submitter);
    coordinator
        .reserve_and_enroll(room, &dates, &session)
        .await
        .map_err(|failure| match failure.reservation_id {
            Some(id) => anyhow::Error::new(failure.error)
                .context(format!("enrollment failed; reservation {} was kept", id)),
            None => anyhow::Error::new(failure.error),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const IMAGES: [&str; 4] = ["front.jpg", "left.jpg", "right.jpg", "id.jpg"];

    fn parse(extra: &[&str]) -> Result<CmdArgs, clap::Error> {
        let base = [
            "kiosk",
            "enroll",
            "--room",
            "r-1",
            "--check-in",
            "2026-06-01",
            "--check-out",
            "2026-06-03",
        ];
        CmdArgs::try_parse_from(base.iter().chain(extra).chain(IMAGES.iter()))
    }

    #[test]
    fn enroll_can_chain_an_order() {
        let args = parse(&[
            "--service",
            "laundry",
            "--handler",
            "staff-7",
            "--scheduled-at",
            "2026-06-01T15:00:00Z",
        ])
        .unwrap();
        let CmdSubcommand::Enroll { service, handler, scheduled_at, quantity, images, .. } =
            args.subcommand
        else {
            panic!("expected enroll");
        };
        assert_eq!(service.as_deref(), Some("laundry"));
        assert_eq!(handler.as_deref(), Some("staff-7"));
        assert!(scheduled_at.is_some());
        assert_eq!(quantity, 1);
        assert_eq!(images.len(), 4);
    }

    #[test]
    fn chained_order_needs_handler_and_time() {
        assert!(parse(&["--service", "laundry"]).is_err());
        assert!(parse(&["--handler", "staff-7"]).is_err());
        assert!(parse(&[]).is_ok());
    }
}
