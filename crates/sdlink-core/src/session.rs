//! Host session - drives the command/response handshake with the device.
//!
//! One transaction at a time:
//!
//! ```text
//! Idle -> Issuing -> Polling -> Completed | Rejected -> Acknowledging -> Idle
//! ```
//!
//! Every step is a separate register read or write through the transport.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::clock::{Sleeper, ThreadSleeper};
use crate::error::ProtocolError;
use crate::events::{AccessDirection, SocEvent, SocObserver, TracingObserver, TransactionOutcome};
use crate::protocol::registers::{
    CONFIG_STATUS_BYTES, CONFIG_STATUS_OFFSET, MISO_BUFFER_BYTES, MOSI_BUFFER_BYTES,
    RegisterMap, SERIAL_NUMBER_BYTES, SERIAL_NUMBER_OFFSET, UUID_BYTES, UUID_OFFSET,
};
use crate::protocol::{Command, ConfigurationDescriptor, SocStatus};
use crate::state::machine::{HostPhase, PollAction, TransactionState};
use crate::transport::{BlockDeviceTransport, RegisterTransport, TransportError};

/// Configuration for a host session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Path to the device node.
    pub device_path: Option<String>,
    /// Sleep between status reads while the device is calculating.
    pub poll_interval_ms: u64,
    /// Sleep between no-op writes while acknowledging.
    pub ack_interval_ms: u64,
    /// `WaitingForCommand` reads tolerated right after issuing a command.
    pub idle_grace_polls: u32,
    /// Give up polling after this many status reads. `None` polls forever.
    pub max_polls: Option<u32>,
    /// Give up acknowledging after this many no-op writes. `None` retries forever.
    pub ack_max_polls: Option<u32>,
    /// Issue commands even if the configuration block does not validate.
    pub force_transactions: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            device_path: None,
            poll_interval_ms: 500,
            ack_interval_ms: 0,
            idle_grace_polls: 8,
            max_polls: None,
            ack_max_polls: None,
            force_transactions: false,
        }
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SessionConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    fn ack_interval(&self) -> Duration {
        Duration::from_millis(self.ack_interval_ms)
    }
}

/// Identification strings stored on the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub serial_number: String,
    pub uuid: String,
}

/// Host end of the register protocol.
pub struct SocSession<T: RegisterTransport, O: SocObserver> {
    config: SessionConfig,
    transport: T,
    observer: Arc<O>,
    sleeper: Arc<dyn Sleeper>,
    descriptor: Option<ConfigurationDescriptor>,
    ready: bool,
    /// Last transaction ended without seeing the device confirm it.
    resync: bool,
}

impl SocSession<BlockDeviceTransport, TracingObserver> {
    /// Open a session on the block device named in the configuration.
    pub fn open(config: SessionConfig) -> Result<Self> {
        let path = config
            .device_path
            .clone()
            .ok_or_else(|| anyhow!("No device path configured"))?;
        Ok(Self::with_transport(
            config,
            BlockDeviceTransport::new(path),
            Arc::new(TracingObserver),
        ))
    }
}

impl<T: RegisterTransport, O: SocObserver> SocSession<T, O> {
    /// Create a session over any transport with a custom observer.
    pub fn with_transport(config: SessionConfig, transport: T, observer: Arc<O>) -> Self {
        Self {
            config,
            transport,
            observer,
            sleeper: Arc::new(ThreadSleeper),
            descriptor: None,
            ready: false,
            resync: false,
        }
    }

    /// Replace the sleeper used between polls.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Descriptor decoded by the last `connect`.
    pub fn descriptor(&self) -> Option<&ConfigurationDescriptor> {
        self.descriptor.as_ref()
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    fn io(&self) -> ObservableTransport<'_, T, O> {
        ObservableTransport {
            inner: &self.transport,
            observer: &self.observer,
        }
    }

    fn emit(&self, event: SocEvent) {
        self.observer.on_event(&event);
    }

    fn transition(&self, tx: &mut TransactionState, to: HostPhase) {
        let from = tx.goto_phase(to);
        self.emit(SocEvent::PhaseChanged { from, to });
    }

    /// Read and decode the configuration status block without validating it.
    pub fn read_configuration(&self) -> Result<ConfigurationDescriptor, ProtocolError> {
        let block = self.io().read(CONFIG_STATUS_OFFSET, CONFIG_STATUS_BYTES)?;
        let descriptor = ConfigurationDescriptor::from_bytes(&block)?;
        self.emit(SocEvent::Configuration { descriptor });
        Ok(descriptor)
    }

    /// Read the configuration block and check the device accepts commands.
    ///
    /// Must succeed before any transaction is issued. With
    /// `force_transactions` set, a failed check is logged and ignored.
    #[instrument(skip(self))]
    pub fn connect(&mut self) -> Result<ConfigurationDescriptor, ProtocolError> {
        let descriptor = self.read_configuration()?;
        self.descriptor = Some(descriptor);
        self.ready = false;

        match descriptor.validate() {
            Ok(()) => {}
            Err(e) if self.config.force_transactions => {
                warn!(error = %e, "Configuration check failed, continuing (forced)");
            }
            Err(e) => return Err(e.into()),
        }

        self.ready = true;
        info!("{}", descriptor);
        Ok(descriptor)
    }

    fn ensure_ready(&self) -> Result<(), ProtocolError> {
        if self.ready {
            Ok(())
        } else {
            Err(ProtocolError::NotReady)
        }
    }

    /// Write `payload` to the start of the MOSI buffer. Bytes past the end
    /// of the payload keep whatever the buffer held before.
    pub fn stage_input(&self, payload: &[u8]) -> Result<(), ProtocolError> {
        if payload.len() > MOSI_BUFFER_BYTES {
            return Err(ProtocolError::PayloadTooLarge {
                len: payload.len(),
                max: MOSI_BUFFER_BYTES,
            });
        }
        if !payload.is_empty() {
            self.io().write(RegisterMap::HOST.mosi, payload)?;
        }
        Ok(())
    }

    /// Stage `input` and run one transaction. Returns the MISO buffer.
    pub fn execute(
        &mut self,
        command: impl Into<Command>,
        input: &[u8],
    ) -> Result<Vec<u8>, ProtocolError> {
        self.ensure_ready()?;
        self.stage_input(input)?;
        self.execute_staged(command)
    }

    /// Run one transaction on whatever is already in the MOSI buffer.
    ///
    /// On `Done` the whole MISO buffer is returned. On `InvalidCommand` the
    /// buffer is not read and `ProtocolError::Rejected` is returned. Either
    /// way the device is acknowledged back to `WaitingForCommand` before this
    /// returns. Transport errors and poll timeouts return immediately.
    ///
    /// After `UnexpectedStatus` or a timeout the idle status seen by the
    /// acknowledge loop may be stale: the device can latch the command just
    /// before the clearing write and still publish a result for it. The next
    /// call therefore reads the status first and acknowledges again if the
    /// device is not idle. A device that latched the command but has not yet
    /// published `Calculating` still reads as idle and is not caught.
    #[instrument(skip(self, command), fields(command = tracing::field::Empty))]
    pub fn execute_staged(&mut self, command: impl Into<Command>) -> Result<Vec<u8>, ProtocolError> {
        self.ensure_ready()?;
        let command = command.into();
        tracing::Span::current().record("command", command.value());
        self.resync_if_needed()?;

        let mut tx = TransactionState::new(command);

        self.transition(&mut tx, HostPhase::Issuing);
        self.io().write_u32(RegisterMap::HOST.command, command.value())?;
        self.emit(SocEvent::CommandIssued { command });

        self.transition(&mut tx, HostPhase::Polling);
        let result = match self.poll(&mut tx) {
            Err(e @ (ProtocolError::Transport(_) | ProtocolError::Timeout { .. })) => {
                self.resync = true;
                self.emit(SocEvent::TransactionFinished {
                    command,
                    outcome: TransactionOutcome::Failed,
                });
                return Err(e);
            }
            other => other,
        };

        self.transition(&mut tx, HostPhase::Acknowledging);
        self.acknowledge_transaction(&mut tx)?;
        self.transition(&mut tx, HostPhase::Idle);

        if matches!(result, Err(ProtocolError::UnexpectedStatus { .. })) {
            self.resync = true;
        }

        let outcome = match &result {
            Ok(_) => TransactionOutcome::Completed,
            Err(ProtocolError::Rejected { .. }) => TransactionOutcome::Rejected,
            Err(_) => TransactionOutcome::Failed,
        };
        self.emit(SocEvent::TransactionFinished { command, outcome });

        debug!(
            polls = tx.polls,
            ack_writes = tx.ack_writes,
            outcome = %outcome,
            "Transaction done"
        );
        result
    }

    fn resync_if_needed(&mut self) -> Result<(), ProtocolError> {
        if !self.resync {
            return Ok(());
        }
        let raw = self.io().read_u32(RegisterMap::HOST.status)?;
        if raw != SocStatus::WaitingForCommand.as_u32() {
            warn!(raw = raw, "Device not idle after the last transaction, acknowledging");
            self.acknowledge()?;
        }
        self.resync = false;
        Ok(())
    }

    fn poll(&self, tx: &mut TransactionState) -> Result<Vec<u8>, ProtocolError> {
        loop {
            if let Some(max) = self.config.max_polls
                && tx.polls >= max
            {
                warn!(polls = tx.polls, "Device still busy, giving up");
                return Err(ProtocolError::Timeout {
                    phase: HostPhase::Polling,
                    polls: tx.polls,
                });
            }

            let raw = self.io().read_u32(RegisterMap::HOST.status)?;
            let action = tx.on_status(raw, self.config.idle_grace_polls);
            self.emit(SocEvent::StatusPolled {
                raw,
                status: SocStatus::from_raw(raw),
                poll: tx.polls,
            });

            match action {
                PollAction::Wait => self.sleeper.sleep(self.config.poll_interval()),
                PollAction::Complete => {
                    self.transition(tx, HostPhase::Completed);
                    return Ok(self.io().read(RegisterMap::HOST.miso, MISO_BUFFER_BYTES)?);
                }
                PollAction::Reject => {
                    self.transition(tx, HostPhase::Rejected);
                    warn!(command = tx.command.value(), "Device returned invalid command");
                    return Err(ProtocolError::Rejected {
                        command: tx.command,
                    });
                }
                PollAction::Unexpected(raw) => {
                    warn!(raw = raw, "Unexpected status while polling");
                    return Err(ProtocolError::UnexpectedStatus {
                        command: tx.command,
                        raw,
                    });
                }
            }
        }
    }

    fn acknowledge_transaction(&self, tx: &mut TransactionState) -> Result<(), ProtocolError> {
        loop {
            self.io()
                .write_u32(RegisterMap::HOST.command, Command::NONE.value())?;
            tx.ack_writes += 1;

            let raw = self.io().read_u32(RegisterMap::HOST.status)?;
            if raw == SocStatus::WaitingForCommand.as_u32() {
                return Ok(());
            }

            if let Some(max) = self.config.ack_max_polls
                && tx.ack_writes >= max
            {
                return Err(ProtocolError::Timeout {
                    phase: HostPhase::Acknowledging,
                    polls: tx.ack_writes,
                });
            }
            self.sleeper.sleep(self.config.ack_interval());
        }
    }

    /// Clear the command register and wait for the device to go idle.
    ///
    /// Recovers a device left mid-transaction by an earlier run. Returns the
    /// number of no-op writes it took.
    #[instrument(skip(self))]
    pub fn acknowledge(&self) -> Result<u32, ProtocolError> {
        let mut tx = TransactionState::new(Command::NONE);
        tx.goto_phase(HostPhase::Acknowledging);
        self.acknowledge_transaction(&mut tx)?;
        Ok(tx.ack_writes)
    }

    /// Current value of the status register.
    pub fn read_status(&self) -> Result<Option<SocStatus>, ProtocolError> {
        let raw = self.io().read_u32(RegisterMap::HOST.status)?;
        Ok(SocStatus::from_raw(raw))
    }

    /// Current value of the SoC control register.
    pub fn read_soc_control(&self) -> Result<u32, ProtocolError> {
        Ok(self.io().read_u32(RegisterMap::HOST.soc_control)?)
    }

    /// Read the serial number and UUID strings.
    pub fn read_device_info(&self) -> Result<DeviceInfo, ProtocolError> {
        let serial = self.io().read(SERIAL_NUMBER_OFFSET, SERIAL_NUMBER_BYTES)?;
        let uuid = self.io().read(UUID_OFFSET, UUID_BYTES)?;
        Ok(DeviceInfo {
            serial_number: printable(&serial),
            uuid: printable(&uuid),
        })
    }
}

/// Render an erased-flash string region: trailing 0xFF dropped, anything
/// outside printable ASCII shown as '.'.
fn printable(bytes: &[u8]) -> String {
    let end = bytes.iter().rposition(|&b| b != 0xFF).map_or(0, |i| i + 1);
    bytes[..end]
        .iter()
        .map(|&b| if (32..=126).contains(&b) { b as char } else { '.' })
        .collect()
}

/// Transport wrapper that emits access events.
struct ObservableTransport<'a, T: RegisterTransport, O: SocObserver> {
    inner: &'a T,
    observer: &'a Arc<O>,
}

impl<'a, T: RegisterTransport, O: SocObserver> RegisterTransport for ObservableTransport<'a, T, O> {
    fn read(&self, offset: u64, len: usize) -> Result<Vec<u8>, TransportError> {
        let res = self.inner.read(offset, len);
        if res.is_ok() {
            self.observer.on_event(&SocEvent::Access {
                direction: AccessDirection::Read,
                offset,
                length: len,
            });
        }
        res
    }

    fn write(&self, offset: u64, data: &[u8]) -> Result<usize, TransportError> {
        let res = self.inner.write(offset, data);
        if res.is_ok() {
            self.observer.on_event(&SocEvent::Access {
                direction: AccessDirection::Write,
                offset,
                length: data.len(),
            });
        }
        res
    }
}
