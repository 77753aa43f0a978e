use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use ride_client::config::ClientConfig;
use ride_client::dispatch::{AssignmentOutcome, DispatchCoordinator, HttpBookingApi, RespondOutcome};
use ride_client::driver::DriverSession;
use ride_client::location::{
    JsonFileLocationStore, LocationAcquisitionEngine, LocationStore, MemoryLocationStore,
    PositionRequest, SimulatedPositionSource, SimulationSettings,
};
use ride_client::logging::init_logging;
use ride_client::transport::{SocketConnector, TcpLineConnector, WebSocketConnector};
use ride_core::geo::{trip_distance_km, Coordinates};
use ride_core::message::{DriverStatus, InboundKind, InboundMessage};
use ride_core::position::PositionPurpose;
use ride_core::pricing::PricingEngine;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Average city speed used when no routing provider supplies a duration.
const FALLBACK_SPEED_KMH: f64 = 24.0;

#[derive(Parser)]
#[command(name = "ride_dispatch", about = "Ride dispatch client: quotes, bookings, driver simulator")]
struct Cli {
    /// JSON config file overlaid on the defaults
    #[arg(long, global = true, env = "RIDE_CONFIG")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the quote set for a trip
    Quote {
        #[arg(long)]
        distance_km: f64,
        #[arg(long, default_value_t = 0.0)]
        duration_min: f64,
        /// Only quote this tier
        #[arg(long)]
        tier: Option<String>,
    },
    /// Run the rider flow: quote, submit, wait for a driver, respond
    Book {
        #[arg(long)]
        rider: String,
        /// Pickup as "lat,lng"
        #[arg(long)]
        pickup: Coordinates,
        /// Destination as "lat,lng"
        #[arg(long)]
        destination: Coordinates,
        #[arg(long, default_value = "bike")]
        tier: String,
        /// Decline the first offered driver before accepting
        #[arg(long)]
        decline_first: bool,
    },
    /// Driver simulator: stream simulated locations until Ctrl-C
    Drive {
        #[arg(long)]
        driver: String,
        #[arg(long, default_value_t = 17.385)]
        lat: f64,
        #[arg(long, default_value_t = 78.4867)]
        lng: f64,
        #[arg(long, default_value_t = 5)]
        interval_secs: u64,
        #[arg(long, value_enum, default_value_t = Transport::Websocket)]
        transport: Transport,
    },
    /// Run one acquisition against the simulated position source
    Locate {
        #[arg(long, value_enum, default_value_t = Purpose::Rider)]
        purpose: Purpose,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Purpose {
    Rider,
    Driver,
}

#[derive(Clone, Copy, ValueEnum)]
enum Transport {
    /// `{websocket_url}/{driver}`
    Websocket,
    /// Newline-delimited JSON over TCP to `socket_addr`
    Tcp,
}

impl From<Purpose> for PositionPurpose {
    fn from(purpose: Purpose) -> Self {
        match purpose {
            Purpose::Rider => PositionPurpose::Rider,
            Purpose::Driver => PositionPurpose::Driver,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    let _ = init_logging();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ClientConfig::load(path)?,
        None => ClientConfig::default(),
    }
    .apply_env();
    config.validate()?;

    match cli.command {
        Commands::Quote {
            distance_km,
            duration_min,
            tier,
        } => quote(&config, distance_km, duration_min, tier.as_deref()),
        Commands::Book {
            rider,
            pickup,
            destination,
            tier,
            decline_first,
        } => book(&config, rider, pickup, destination, &tier, decline_first).await,
        Commands::Drive {
            driver,
            lat,
            lng,
            interval_secs,
            transport,
        } => {
            let start = Coordinates::new(lat, lng)?;
            match transport {
                Transport::Websocket => {
                    let connector = WebSocketConnector::for_driver(&config.websocket_url, &driver);
                    info!(url = connector.url(), "Using WebSocket transport");
                    drive(&config, driver, connector, start, interval_secs).await
                }
                Transport::Tcp => {
                    let connector = TcpLineConnector::new(config.socket_addr.clone());
                    drive(&config, driver, connector, start, interval_secs).await
                }
            }
        }
        Commands::Locate { purpose } => locate(&config, purpose.into()).await,
    }
}

fn quote(
    config: &ClientConfig,
    distance_km: f64,
    duration_min: f64,
    tier: Option<&str>,
) -> Result<(), Box<dyn Error>> {
    let engine = PricingEngine::new(config.tier_table());
    let quotes = match tier {
        Some(tier) => vec![engine.quote(distance_km, duration_min, tier)?],
        None => engine.quote_all(distance_km, duration_min)?,
    };
    println!("{:<8} {:>8} {:>8}  drop-off", "tier", "price", "eta");
    for quote in quotes {
        println!(
            "{:<8} {:>8} {:>6}m  {}{}",
            quote.tier_key,
            quote.price,
            quote.eta_minutes,
            quote.estimated_drop_time.format("%H:%M"),
            if quote.fastest { "  (fastest)" } else { "" }
        );
    }
    Ok(())
}

async fn book(
    config: &ClientConfig,
    rider: String,
    pickup: Coordinates,
    destination: Coordinates,
    tier: &str,
    decline_first: bool,
) -> Result<(), Box<dyn Error>> {
    let distance_km = trip_distance_km(&pickup, &destination);
    let duration_min = (distance_km / FALLBACK_SPEED_KMH * 60.0).round();
    quote(config, distance_km, duration_min, None)?;

    let api = HttpBookingApi::new(&config.backend_base_url, config.request_timeout)?;
    let cancel = CancellationToken::new();
    let mut coordinator = DispatchCoordinator::new(
        api,
        PricingEngine::new(config.tier_table()),
        config.polling.clone(),
        rider,
    )
    .with_cancellation(cancel.clone());
    spawn_ctrl_c(cancel);

    let id = coordinator
        .submit(pickup, destination, tier, distance_km, duration_min)
        .await?;
    println!("booking {id} submitted ({distance_km} km)");

    let budget = config.polling.budget();
    let mut outcome = coordinator.poll_until_assigned(&id, budget).await?;
    let mut declined_once = false;
    loop {
        match outcome {
            AssignmentOutcome::Assigned(booking) => {
                let driver = booking.driver_id().unwrap_or("?").to_string();
                let accept = !(decline_first && !declined_once);
                println!("driver {driver} offered, {}", if accept { "accepting" } else { "declining" });
                match coordinator.respond(&id, accept).await? {
                    RespondOutcome::Accepted { in_progress, .. } => {
                        println!("ride accepted{}", if in_progress { ", trip in progress" } else { "" });
                        return Ok(());
                    }
                    RespondOutcome::Declined(next) => {
                        declined_once = true;
                        outcome = next;
                    }
                    RespondOutcome::ReassignmentLimitReached { declines } => {
                        println!("gave up after {declines} declined drivers");
                        return Ok(());
                    }
                }
            }
            AssignmentOutcome::NoDriverAvailable { attempts } => {
                println!("no driver available after {attempts} checks; try again later");
                return Ok(());
            }
            AssignmentOutcome::Ended(status) => {
                println!("booking ended with status {status}");
                return Ok(());
            }
        }
    }
}

async fn drive<C: SocketConnector>(
    config: &ClientConfig,
    driver: String,
    connector: C,
    start: Coordinates,
    interval_secs: u64,
) -> Result<(), Box<dyn Error>> {
    let source = SimulatedPositionSource::new(start, SimulationSettings::default());
    let mut session = DriverSession::new(driver, connector, config.reconnect.clone());

    session.on_message(InboundKind::BookingNotification, |message| {
        if let Some(id) = message.booking_id() {
            info!(booking_id = %id, "Booking offered");
        }
    });
    session.on_message(InboundKind::AssignmentEvent, |message| {
        info!(booking_id = ?message.booking_id(), "Assignment update");
    });
    session.on_message(InboundKind::SystemMessage, |message| {
        if let InboundMessage::SystemMessage { message } = message {
            info!(%message, "System message");
        }
    });
    session.on_message(InboundKind::Error, |message| {
        if let InboundMessage::Error { message } = message {
            warn!(%message, "Matching service error");
        }
    });

    session.connect().await?;
    session.report_status(DriverStatus::Available).await?;

    let cancel = CancellationToken::new();
    spawn_ctrl_c(cancel.clone());
    let request = PositionRequest::high_accuracy(
        config.location.attempt_timeout,
        config.location.max_sample_age,
    );
    let streamed = session
        .stream_locations(&source, Duration::from_secs(interval_secs.max(1)), request, cancel)
        .await;

    if let Err(error) = session.report_status(DriverStatus::Offline).await {
        warn!(%error, "Could not report offline status");
    }
    session.close().await?;
    let report = streamed?;
    println!("sent {} location reports ({} skipped)", report.sent, report.skipped);
    Ok(())
}

async fn locate(config: &ClientConfig, purpose: PositionPurpose) -> Result<(), Box<dyn Error>> {
    let store: Arc<dyn LocationStore> = match &config.location_store {
        Some(path) => Arc::new(JsonFileLocationStore::new(path)),
        None => Arc::new(MemoryLocationStore::new()),
    };
    let start = Coordinates::new(17.385, 78.4867)?;
    let settings = SimulationSettings {
        step: Duration::from_secs(1),
        ..SimulationSettings::default()
    };
    let mut policy = config.location.clone();
    // The simulated source answers instantly; no need to wait for a fix to settle.
    policy.inter_attempt_delay = Duration::ZERO;
    let engine = LocationAcquisitionEngine::new(
        SimulatedPositionSource::new(start, settings),
        store,
        policy,
    );

    let acquired = engine.acquire_default(purpose).await?;
    println!(
        "{:.6},{:.6} accuracy {} ({}) after {} attempt(s), {:?}",
        acquired.sample.latitude,
        acquired.sample.longitude,
        acquired
            .sample
            .accuracy_m
            .map(|m| format!("{m:.0} m"))
            .unwrap_or_else(|| "unknown".to_string()),
        acquired.sample.band().label(),
        acquired.attempts,
        acquired.origin,
    );
    Ok(())
}

fn spawn_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, shutting down");
            cancel.cancel();
        }
    });
}
