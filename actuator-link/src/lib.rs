//! Line-framed serial transport adapter for the actuator microcontroller link (§4.9, §6.2).
//!
//! Owns the serial connection on its own task. After opening the port it waits for the
//! device's reset settle time before writing anything, then runs read and write duties
//! concurrently: forwarding recognized inbound lines to the kernel, and draining the
//! kernel's outbound actuator-command channel to the device. A missing or failed port
//! never aborts the process: outbound commands are logged and dropped, and the task
//! retries opening the port on an interval (§7, "port unavailable").

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use kernel_core::{dispatch_actuator_event, KernelHandle};
use kernel_messages::{ActuatorCommand, ActuatorEvent};
use tokio::sync::mpsc;
use tokio_serial::SerialPortBuilderExt;
use tokio_util::codec::{Framed, LinesCodec};
use tracing::{info, warn};

/// Device path and baud rate for the actuator serial link.
#[derive(Debug, Clone)]
pub struct ActuatorLinkConfig {
    pub device: String,
    pub baud_rate: u32,
}

impl Default for ActuatorLinkConfig {
    fn default() -> Self {
        Self { device: "/dev/ttyUSB0".to_string(), baud_rate: 115_200 }
    }
}

/// Time to wait after opening the port before writing, to let the device finish its reset.
const RESET_SETTLE: Duration = Duration::from_secs(2);
/// Interval between reconnection attempts when the port is unavailable.
const REOPEN_INTERVAL: Duration = Duration::from_secs(5);

/// Run the actuator link until `outbound_rx` is closed.
pub async fn run(handle: KernelHandle, config: ActuatorLinkConfig, mut outbound_rx: mpsc::Receiver<ActuatorCommand>) {
    loop {
        let port = match tokio_serial::new(&config.device, config.baud_rate).open_native_async() {
            Ok(port) => port,
            Err(err) => {
                warn!(%err, device = %config.device, "failed to open actuator serial port, retrying");
                tokio::time::sleep(REOPEN_INTERVAL).await;
                continue;
            }
        };

        info!(device = %config.device, baud = config.baud_rate, "opened actuator serial port, waiting for device reset");
        tokio::time::sleep(RESET_SETTLE).await;

        let mut framed = Framed::new(port, LinesCodec::new());

        loop {
            tokio::select! {
                line = framed.next() => {
                    match line {
                        Some(Ok(line)) => {
                            if let Some(event) = ActuatorEvent::parse(line.trim()) {
                                dispatch_actuator_event(&handle, event).await;
                            }
                        }
                        Some(Err(err)) => {
                            warn!(%err, "actuator link read error, reconnecting");
                            break;
                        }
                        None => {
                            warn!("actuator link closed, reconnecting");
                            break;
                        }
                    }
                }
                command = outbound_rx.recv() => {
                    match command {
                        Some(command) => {
                            if let Err(err) = framed.send(command.to_line()).await {
                                warn!(%err, "failed to write actuator command, dropping");
                            }
                        }
                        None => {
                            info!("actuator outbound channel closed, shutting down link");
                            return;
                        }
                    }
                }
            }
        }
    }
}
