// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! JSON-over-TCP operator listener for obf-runner.
//!
//! Accepts operator connections speaking the `OperatorEnvelope` /
//! `OperatorResponse` protocol defined in `obf-protocol`.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{error, info};

use obf_core::{BuildStatus, ParameterChannel, RuntimeParameter};
use obf_protocol::{
    encode_response, parse_envelope, OperatorCommand, OperatorResponse, SimpleTokenValidator,
    TokenValidator,
};

/// Run the JSON TCP listener until `shutdown_rx` flips to `true`.
pub async fn run_listener(
    listener: TcpListener,
    params: Arc<ParameterChannel>,
    status_rx: watch::Receiver<BuildStatus>,
    auth_tokens: Vec<String>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> std::io::Result<()> {
    info!("Listening on {}", listener.local_addr()?);

    let validator: Arc<dyn TokenValidator> = Arc::new(SimpleTokenValidator::new(auth_tokens));

    loop {
        let (socket, peer) = tokio::select! {
            accepted = listener.accept() => accepted?,
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    info!("Listener shutting down");
                    return Ok(());
                }
                continue;
            }
        };
        info!("Operator connected: {}", peer);

        let params = Arc::clone(&params);
        let status_rx = status_rx.clone();
        let validator = Arc::clone(&validator);
        tokio::spawn(async move {
            if let Err(e) = handle_client(socket, peer, params, validator, status_rx).await {
                error!("Operator {} error: {:?}", peer, e);
            }
        });
    }
}

async fn handle_client(
    socket: TcpStream,
    addr: SocketAddr,
    params: Arc<ParameterChannel>,
    validator: Arc<dyn TokenValidator>,
    status_rx: watch::Receiver<BuildStatus>,
) -> std::io::Result<()> {
    let (reader, mut writer) = socket.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            info!("Operator {} disconnected", addr);
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let envelope = match parse_envelope(trimmed) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!("Invalid JSON from {}: {} / {:?}", addr, trimmed, e);
                let resp = OperatorResponse::error(format!("Invalid JSON: {}", e));
                write_response(&mut writer, &resp).await?;
                continue;
            }
        };

        if let Err(err) = validator.validate(envelope.token.as_deref()) {
            write_response(&mut writer, &OperatorResponse::error(err)).await?;
            continue;
        }

        let status = status_rx.borrow().clone();
        let resp = handle_command(envelope.cmd, &params, status);
        write_response(&mut writer, &resp).await?;
    }

    Ok(())
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    resp: &OperatorResponse,
) -> std::io::Result<()> {
    let resp_line = encode_response(resp)?;
    writer.write_all(resp_line.as_bytes()).await?;
    writer.flush().await
}

/// Execute one authorized operator command.
fn handle_command(
    cmd: OperatorCommand,
    params: &ParameterChannel,
    status: BuildStatus,
) -> OperatorResponse {
    match cmd {
        OperatorCommand::GetStatus => OperatorResponse::status(status),
        OperatorCommand::GetParameters => OperatorResponse::parameters(params.snapshot()),
        OperatorCommand::SetParameter { name, value } => {
            match RuntimeParameter::from_name(&name) {
                Some(param) => {
                    info!("Operator set {} = {}", param.name(), value);
                    params.set(param, value);
                    OperatorResponse::parameters(params.snapshot())
                }
                None => OperatorResponse::error(format!("Unknown parameter: {}", name)),
            }
        }
    }
}
