//! # Command Line Arm Client
//!
//! Interactive client for the arm executable. Commands are parsed with the
//! same grammar the arm validates against, sent as JSON over a REQ socket,
//! and the response printed. Because the arm executes motions to completion
//! before replying, a long move simply leaves the prompt waiting.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use color_eyre::{eyre::WrapErr, Result};
use rustyline::{error::ReadlineError, DefaultEditor};
use structopt::StructOpt;

use comms_if::{
    net::{zmq, MonitoredSocket, SocketOptions},
    tc::{ArmCmd, ArmResponse},
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

const PROMPT: &str = "arm $ ";
const HISTORY_PATH: &str = ".arm_history.txt";

/// How long to wait for the arm to answer. Longer than the longest possible
/// motion (the 5 s interface ceiling), since the arm replies only once the
/// motion completes.
const RESPONSE_TIMEOUT_MS: i32 = 10_000;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Command line options for the client itself.
#[derive(StructOpt)]
#[structopt(name = "command_line_arm")]
struct Opts {
    /// Endpoint of the arm executable's command socket.
    #[structopt(long, default_value = "tcp://localhost:5040")]
    endpoint: String,
}

// ------------------------------------------------------------------------------------------------
// MAIN
// ------------------------------------------------------------------------------------------------

fn main() -> Result<()> {
    color_eyre::install()?;

    let opts = Opts::from_args();

    // Connect to the arm
    let ctx = zmq::Context::new();
    let socket_options = SocketOptions {
        recv_timeout: RESPONSE_TIMEOUT_MS,
        send_timeout: 1000,
        req_correlate: true,
        req_relaxed: true,
        ..Default::default()
    };
    let socket = MonitoredSocket::new(&ctx, zmq::REQ, socket_options, &opts.endpoint)
        .wrap_err_with(|| format!("Could not connect to the arm at {}", opts.endpoint))?;

    println!("Connected to the arm at {}", opts.endpoint);
    println!("Commands: move, stop, stop-all, grasp, release, translate, reset-odometry, status");
    println!("Use `<command> --help` for arguments, Ctrl-D to exit");

    let mut rl = DefaultEditor::new()?;
    if rl.load_history(HISTORY_PATH).is_err() {
        println!("No history detected");
    }

    loop {
        let readline = rl.readline(PROMPT);
        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                rl.add_history_entry(line).ok();

                match parse(line) {
                    Some(cmd) => send(&socket, &cmd),
                    None => continue,
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(err) => {
                println!("Unhandled error: {:?}", err);
                break;
            }
        }
    }

    if rl.save_history(HISTORY_PATH).is_err() {
        println!("Could not save the command history");
    }

    Ok(())
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Parse and locally validate one line of input.
///
/// Validation also happens on the arm side; doing it here as well just gives
/// faster feedback for typos without a round trip.
fn parse(line: &str) -> Option<ArmCmd> {
    let words = std::iter::once("arm").chain(line.split_whitespace());

    let cmd = match ArmCmd::from_iter_safe(words) {
        Ok(c) => c,
        Err(e) => {
            println!("{}", e.message);
            return None;
        }
    };

    if let Err(e) = cmd.validate() {
        println!("Invalid command: {}", e);
        return None;
    }

    Some(cmd)
}

/// Send a command to the arm and print its response.
fn send(socket: &MonitoredSocket, cmd: &ArmCmd) {
    let cmd_str = match serde_json::to_string(cmd) {
        Ok(s) => s,
        Err(e) => {
            println!("Could not serialize the command: {}", e);
            return;
        }
    };

    if let Err(e) = socket.send(&cmd_str, 0) {
        println!("Could not send the command: {}", e);
        return;
    }

    let msg = match socket.recv_msg(0) {
        Ok(m) => m,
        Err(_) => {
            println!("No response from the arm, is arm_exec running?");
            return;
        }
    };

    match serde_json::from_str::<ArmResponse>(msg.as_str().unwrap_or("")) {
        Ok(ArmResponse::CmdOk { applied_s: Some(s) }) => println!("OK, applied {:.2}s", s),
        Ok(ArmResponse::CmdOk { applied_s: None }) => println!("OK"),
        Ok(ArmResponse::CmdRejected { reason }) => println!("Rejected: {}", reason),
        Ok(ArmResponse::CmdFailed { reason }) => println!("FAILED: {}", reason),
        Ok(ArmResponse::Positions { seconds }) => {
            let mut joints: Vec<_> = seconds.iter().collect();
            joints.sort_by(|a, b| a.0.cmp(b.0));
            for (joint, s) in joints {
                println!("{:10} {:+.2}s", joint, s);
            }
        }
        Err(e) => println!("Unparseable response: {}", e),
    }
}
