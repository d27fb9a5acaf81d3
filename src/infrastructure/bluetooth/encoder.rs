//! Writes session commands to the lamp's control characteristic.

use super::connection::ConnectionManager;
use super::protocol;
use super::transport::BleTransport;
use crate::domain::session::SessionCommand;
use crate::error::BleError;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// No device connected; nothing was sent
    NotConnected,
}

pub struct SessionCommandEncoder<T: BleTransport> {
    transport: Arc<T>,
    connections: Arc<ConnectionManager<T>>,
    service_uuid: Uuid,
    characteristic_uuid: Uuid,
}

impl<T: BleTransport> SessionCommandEncoder<T> {
    pub fn new(
        transport: Arc<T>,
        connections: Arc<ConnectionManager<T>>,
        service_uuid: Uuid,
        characteristic_uuid: Uuid,
    ) -> Self {
        Self {
            transport,
            connections,
            service_uuid,
            characteristic_uuid,
        }
    }

    /// Write-with-response of the encoded command. The acknowledgement is the
    /// only confirmation; nothing is read back.
    pub async fn write(&self, command: &SessionCommand) -> Result<WriteOutcome, BleError> {
        let Some(connection) = self.connections.current().await else {
            warn!("No device connected, dropping {:?} command", command);
            return Ok(WriteOutcome::NotConnected);
        };

        debug!("Payload: {}", command.payload());
        let value = protocol::encode_command(command)?;

        if !connection.has_characteristic(self.service_uuid, self.characteristic_uuid) {
            warn!(
                "Control characteristic {} was not discovered on {}; writing anyway",
                self.characteristic_uuid,
                connection.peripheral_id()
            );
        }

        self.transport
            .write_with_response(
                connection.peripheral_id(),
                self.service_uuid,
                self.characteristic_uuid,
                &value,
            )
            .await
            .map_err(|e| {
                error!("Error sending data: {}", e);
                match e {
                    BleError::Write(_) => e,
                    other => BleError::Write(other.to_string()),
                }
            })?;

        info!("Data sent successfully");
        Ok(WriteOutcome::Written)
    }
}
