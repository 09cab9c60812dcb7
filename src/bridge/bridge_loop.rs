//! The bridge state machine
//!
//! `Starting` connects, enumerates the fleet and publishes base attributes.
//! `Running` ticks every five seconds: drain queued commands, then let the
//! scheduler decide whether the whole fleet is polled. Anything that escapes
//! a tick moves the bridge to `ShuttingDown`.
//!
//! The loop is the only context that calls the vendor API, publishes or
//! sleeps. The broker delivery task only feeds the command channel.

use super::channel::CommandChannel;
use super::flatten::{FlattenEncoder, PublishSummary};
use super::scheduler::PollScheduler;
use crate::config::{BridgeConfig, TICK_INTERVAL};
use crate::error::{BridgeError, BridgeResult};
use crate::observability::metrics::metrics;
use crate::protocol::{
    find_by_vin, CommandAction, CommandParser, ParseError, RawCommand, VehicleRecord,
};
use crate::transport::Transport;
use crate::vehicle_api::VehicleApi;
use crate::{bridge_span, vehicle_span};
use std::fmt;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn, Instrument};

/// Lifecycle state of the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Starting,
    Running,
    ShuttingDown,
}

impl BridgeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BridgeState::Starting => "starting",
            BridgeState::Running => "running",
            BridgeState::ShuttingDown => "shutting_down",
        }
    }
}

impl fmt::Display for BridgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings the loop needs, derived once from the configuration
#[derive(Debug, Clone)]
pub struct BridgeOptions {
    pub base_topic: String,
    pub full_cycle_ticks: u64,
    pub settle_duration: Duration,
    pub tick_interval: Duration,
    pub max_depth: usize,
}

impl BridgeOptions {
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            base_topic: config.mqtt.topic.clone(),
            full_cycle_ticks: config.status.full_cycle_ticks(),
            settle_duration: config.status.settle_duration(),
            tick_interval: TICK_INTERVAL,
            max_depth: config.status.max_depth,
        }
    }
}

/// What happened to one queued command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Refresh, settle and publish all completed
    Refreshed { vin: String, published: usize },
    /// No fleet member has this VIN; no API call was made
    VehicleNotFound { vin: String },
    /// A well-formed command for an action the bridge does not support
    UnknownAction { vin: String, field: String },
    /// The topic could not be decoded
    Rejected(ParseError),
    /// The refresh sequence failed part-way
    Failed { vin: String, error: String },
}

/// Result of one Running iteration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub commands: Vec<CommandOutcome>,
    pub polled: bool,
}

/// Drives the bridge from startup to shutdown
pub struct BridgeLoop<T, A>
where
    T: Transport + 'static,
    A: VehicleApi,
{
    transport: T,
    api: A,
    options: BridgeOptions,
    encoder: FlattenEncoder,
    parser: CommandParser,
    channel: CommandChannel,
    scheduler: PollScheduler,
    fleet: Vec<VehicleRecord>,
    state: BridgeState,
}

impl<T, A> BridgeLoop<T, A>
where
    T: Transport + 'static,
    A: VehicleApi,
{
    /// Create the loop and hand the command sender to the transport
    pub fn new(transport: T, api: A, options: BridgeOptions) -> Self {
        let channel = CommandChannel::new();
        transport.set_command_sender(channel.sender());

        Self {
            encoder: FlattenEncoder::new(options.max_depth),
            parser: CommandParser::new(options.base_topic.clone()),
            scheduler: PollScheduler::new(options.full_cycle_ticks),
            transport,
            api,
            options,
            channel,
            fleet: Vec::new(),
            state: BridgeState::Starting,
        }
    }

    pub fn state(&self) -> BridgeState {
        self.state
    }

    pub fn fleet(&self) -> &[VehicleRecord] {
        &self.fleet
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    fn set_state(&mut self, state: BridgeState) {
        if self.state != state {
            info!(from = %self.state, to = %state, "Bridge state change");
        }
        self.state = state;
        metrics().set_bridge_state(state.as_str());
    }

    /// Start, run until shutdown or failure, then always shut down
    pub async fn execute(&mut self, shutdown: watch::Receiver<bool>) -> BridgeResult<()> {
        let result = match self.start().await {
            Ok(()) => self.run(shutdown).await,
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            error!(kind = ?e.kind(), error = %e.sanitized_message(), "Bridge stopped on error");
        }

        self.shutdown().await;
        result
    }

    /// The Starting state
    ///
    /// Broker, fleet and base attribute failures are fatal. Refresh requests
    /// are best-effort per vehicle. Ends with one settle wait.
    pub async fn start(&mut self) -> BridgeResult<()> {
        self.set_state(BridgeState::Starting);

        self.transport
            .connect()
            .await
            .map_err(BridgeError::broker_unavailable)?;
        metrics().mqtt_connection_changed(true);
        self.transport
            .subscribe_to_commands()
            .await
            .map_err(BridgeError::broker_unavailable)?;

        let fleet = self
            .api
            .list_vehicles()
            .await
            .map_err(BridgeError::FleetUnavailable)?;

        if fleet.is_empty() {
            warn!("Vehicle fleet is empty; nothing will be published");
        }
        info!(count = fleet.len(), "Vehicle fleet loaded");

        for vehicle in &fleet {
            self.encoder
                .publish(
                    &self.transport,
                    &vehicle.base_attributes(),
                    &vehicle.vin,
                    &self.options.base_topic,
                )
                .instrument(vehicle_span!(vin = %vehicle.vin))
                .await
                .map_err(BridgeError::startup)?;
        }

        for vehicle in &fleet {
            info!(vin = %vehicle.vin, "Requesting initial refresh");
            metrics().refresh_requested();
            if let Err(e) = self.api.refresh_status(&vehicle.id).await {
                metrics().refresh_failed();
                warn!(
                    vin = %vehicle.vin,
                    error = %BridgeError::from(e).sanitized_message(),
                    "Initial refresh failed"
                );
            }
        }

        self.fleet = fleet;

        info!(
            settle_secs = self.options.settle_duration.as_secs(),
            "Waiting for vendor data to settle"
        );
        tokio::time::sleep(self.options.settle_duration).await;

        self.set_state(BridgeState::Running);
        Ok(())
    }

    /// The Running state; returns Ok on a shutdown signal
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> BridgeResult<()> {
        loop {
            let report = self.tick().instrument(bridge_span!()).await?;
            if report.polled || !report.commands.is_empty() {
                info!(
                    commands = report.commands.len(),
                    polled = report.polled,
                    "Tick complete"
                );
            }

            if !self.transport.is_connected() {
                let state = self
                    .transport
                    .connection_state()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "never connected".to_string());
                metrics().mqtt_connection_changed(false);
                return Err(BridgeError::connection_lost(state));
            }

            tokio::select! {
                _ = tokio::time::sleep(self.options.tick_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Shutdown requested");
                        return Ok(());
                    }
                }
            }
        }
    }

    /// One Running iteration: commands first, then the scheduled poll
    pub async fn tick(&mut self) -> BridgeResult<TickReport> {
        let queued = self.channel.try_dequeue_all();
        let mut commands = Vec::with_capacity(queued.len());
        for raw in queued {
            commands.push(self.handle_command(raw).await);
        }

        let polled = self.scheduler.tick();
        if polled {
            self.poll_fleet().await?;
        }

        Ok(TickReport { commands, polled })
    }

    /// Process one queued command; never fails the loop
    async fn handle_command(&self, raw: RawCommand) -> CommandOutcome {
        metrics().command_received();

        let command = match self.parser.parse_raw(&raw) {
            Ok(command) => command,
            Err(e) => {
                metrics().command_rejected();
                warn!(topic = %raw.topic, error = %e, "Discarding malformed command");
                return CommandOutcome::Rejected(e);
            }
        };

        match command.action {
            CommandAction::Unknown => {
                metrics().command_rejected();
                error!(vin = %command.vin, field = %command.field, "Invalid command");
                CommandOutcome::UnknownAction {
                    vin: command.vin,
                    field: command.field,
                }
            }
            CommandAction::Refresh => {
                let Some(vehicle) = find_by_vin(&self.fleet, &command.vin) else {
                    let e = BridgeError::vehicle_not_found(&command.vin);
                    error!(vin = %command.vin, "{e}");
                    return CommandOutcome::VehicleNotFound { vin: command.vin };
                };

                match self
                    .refresh_and_publish(vehicle)
                    .instrument(vehicle_span!(vin = %vehicle.vin))
                    .await
                {
                    Ok(summary) => CommandOutcome::Refreshed {
                        vin: command.vin,
                        published: summary.published,
                    },
                    Err(e) => {
                        metrics().refresh_failed();
                        let message = e.sanitized_message();
                        error!(vin = %command.vin, error = %message, "Refresh command failed");
                        CommandOutcome::Failed {
                            vin: command.vin,
                            error: message,
                        }
                    }
                }
            }
        }
    }

    /// Refresh one vehicle, wait for the vendor to settle, then publish it
    async fn refresh_and_publish(&self, vehicle: &VehicleRecord) -> BridgeResult<PublishSummary> {
        metrics().refresh_requested();
        info!(
            vin = %vehicle.vin,
            settle_secs = self.options.settle_duration.as_secs(),
            "Refresh requested, waiting for vendor data"
        );

        self.api.refresh_status(&vehicle.id).await?;
        tokio::time::sleep(self.options.settle_duration).await;
        self.publish_vehicle_status(vehicle).await
    }

    /// Fetch and publish status, plus EV status for electric vehicles
    async fn publish_vehicle_status(
        &self,
        vehicle: &VehicleRecord,
    ) -> BridgeResult<PublishSummary> {
        info!(vin = %vehicle.vin, "Fetching and publishing vehicle status");

        let status = self.api.get_status(&vehicle.id).await?;
        let mut summary = self
            .encoder
            .publish(
                &self.transport,
                &status,
                &vehicle.vin,
                &self.options.base_topic,
            )
            .await?;

        if vehicle.is_electric {
            let ev_status = self.api.get_ev_status(&vehicle.id).await?;
            let ev_summary = self
                .encoder
                .publish(
                    &self.transport,
                    &ev_status,
                    &vehicle.vin,
                    &self.options.base_topic,
                )
                .await?;
            summary.published += ev_summary.published;
            summary.failed += ev_summary.failed;
        }

        metrics().vehicle_polled();
        Ok(summary)
    }

    /// Scheduled poll of every vehicle in fleet order; any failure escapes
    async fn poll_fleet(&self) -> BridgeResult<()> {
        metrics().scheduled_poll();
        info!(count = self.fleet.len(), "Scheduled poll of vehicle fleet");

        for vehicle in &self.fleet {
            if let Err(e) = self
                .publish_vehicle_status(vehicle)
                .instrument(vehicle_span!(vin = %vehicle.vin))
                .await
            {
                metrics().poll_failed();
                return Err(e);
            }
        }
        Ok(())
    }

    /// The ShuttingDown state: stop the delivery task and close the session
    pub async fn shutdown(&mut self) {
        self.set_state(BridgeState::ShuttingDown);

        if let Err(e) = self.transport.disconnect().await {
            warn!(error = %e, "Broker disconnect failed");
        }
        metrics().mqtt_connection_changed(false);

        if let Err(e) = self.api.close().await {
            warn!(
                error = %BridgeError::from(e).sanitized_message(),
                "Closing vehicle API session failed"
            );
        }

        let snapshot = metrics().get_metrics();
        info!(
            published = snapshot.mqtt.messages_published,
            publish_failures = snapshot.mqtt.publish_failures,
            scheduled_polls = snapshot.polling.scheduled_polls,
            commands = snapshot.commands.commands_received,
            "Bridge stopped"
        );
    }
}
