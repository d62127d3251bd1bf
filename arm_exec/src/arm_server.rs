//! # Arm Server Module
//!
//! This module abstracts over the networking side of the arm executable. The
//! server binds a REP socket; clients (the command line client, a web
//! surface) connect with REQ sockets, so concurrent clients queue at the
//! socket and commands never interleave at the hardware.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::{
    net::{zmq, MonitoredSocket, MonitoredSocketError, SocketOptions},
    tc::{ArmCmd, ArmResponse},
};
use log::warn;

use crate::params::ArmExecParams;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// An abstraction over the networking part of the arm executable.
pub struct ArmServer {
    /// REP socket which accepts commands from clients.
    cmd_socket: MonitoredSocket,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors which can occur in the [`ArmServer`].
#[derive(thiserror::Error, Debug)]
pub enum ArmServerError {
    #[error("Socket error: {0}")]
    SocketError(#[from] MonitoredSocketError),

    #[error("Could not send the response to the client: {0}")]
    SendError(zmq::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ArmServer {
    /// Create a new instance of the arm server.
    ///
    /// This function will not wait for a connection from a client before
    /// returning.
    pub fn new(params: &ArmExecParams) -> Result<Self, ArmServerError> {
        // Create the zmq context
        let ctx = zmq::Context::new();

        // Create the socket options
        let cmd_socket_options = SocketOptions {
            bind: true,
            block_on_first_connect: false,
            recv_timeout: 200,
            send_timeout: 10,
            ..Default::default()
        };

        // Create the socket
        let cmd_socket = MonitoredSocket::new(
            &ctx,
            zmq::REP,
            cmd_socket_options,
            &params.command_endpoint,
        )?;

        Ok(Self { cmd_socket })
    }

    /// Retrieve the next command from a client.
    ///
    /// Returns `None` when no message arrived within the receive timeout.
    /// When a message did arrive the user MUST answer it with
    /// [`ArmServer::send_response`] before the next receive, even if the
    /// message could not be parsed (the REP socket enforces strict
    /// request/reply alternation) - a parse failure is therefore returned as
    /// `Some(Err(_))` rather than swallowed.
    pub fn get_command(&mut self) -> Option<Result<ArmCmd, serde_json::Error>> {
        let msg = match self.cmd_socket.recv_msg(0) {
            Ok(m) => m,
            // No message arrived within the receive timeout
            Err(zmq::Error::EAGAIN) => return None,
            Err(e) => {
                warn!("Could not receive from the command socket: {}", e);
                return None;
            }
        };

        Some(serde_json::from_str(msg.as_str().unwrap_or("")))
    }

    /// Send a response to the client for the last received command.
    pub fn send_response(&mut self, response: &ArmResponse) -> Result<(), ArmServerError> {
        let resp_str = match serde_json::to_string(response) {
            Ok(s) => s,
            Err(e) => {
                // Serialization of our own response type failing is a bug,
                // but the REP socket still needs an answer on the wire
                warn!("Response serialization failed: {}", e);
                String::from("{\"CmdFailed\":{\"reason\":\"internal error\"}}")
            }
        };

        self.cmd_socket
            .send(&resp_str, 0)
            .map_err(ArmServerError::SendError)
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn params() -> ArmExecParams {
        ArmExecParams {
            // Wildcard port so parallel tests never collide
            command_endpoint: "tcp://127.0.0.1:*".into(),
            calib_file: "params/calibracion_servos.json".into(),
            i2c_address: 0x40,
            joints: Default::default(),
            stepper: Default::default(),
            track: Default::default(),
        }
    }

    #[test]
    fn test_no_message_within_timeout_yields_none() {
        let mut server = ArmServer::new(&params()).unwrap();

        // Nothing is connected, so the receive times out and the caller gets
        // no command (and owes no reply on the REP socket)
        assert!(server.get_command().is_none());
    }
}
