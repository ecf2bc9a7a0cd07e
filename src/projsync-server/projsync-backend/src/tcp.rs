// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Line protocol over TCP.
//!
//! Requests are `GET <name>` or `SET <name> <value>`, one per line. The
//! device answers `OK [value]` or `ERR <detail>`. The connection is opened
//! on first use and dropped after any failure so the next call reconnects.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

use projsync_core::{DeviceInfo, PropertyName, Transport, TransportError, TransportFuture, Value};

struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

pub struct TcpTransport {
    info: DeviceInfo,
    addr: String,
    timeout: Duration,
    conn: Option<Connection>,
}

impl TcpTransport {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        let addr = addr.into();
        Self {
            info: DeviceInfo {
                manufacturer: "Generic".to_string(),
                model: "tcp-line".to_string(),
                endpoint: addr.clone(),
            },
            addr,
            timeout,
            conn: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    async fn exchange_inner(&mut self, request: &str) -> io::Result<String> {
        if self.conn.is_none() {
            let stream = TcpStream::connect(&self.addr).await?;
            stream.set_nodelay(true)?;
            let (reader, writer) = stream.into_split();
            self.conn = Some(Connection {
                reader: BufReader::new(reader),
                writer,
            });
            debug!("Connected to {}", self.addr);
        }
        let Some(conn) = self.conn.as_mut() else {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "not connected"));
        };

        conn.writer.write_all(request.as_bytes()).await?;
        conn.writer.write_all(b"\n").await?;
        conn.writer.flush().await?;

        let mut line = String::new();
        if conn.reader.read_line(&mut line).await? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "device closed the connection",
            ));
        }
        Ok(line.trim_end().to_string())
    }

    /// Send one request and wait for its reply line, bounded by the timeout.
    async fn exchange(&mut self, request: String) -> Result<Option<String>, TransportError> {
        let limit = self.timeout;
        let result = timeout(limit, self.exchange_inner(&request)).await;
        let reply = match result {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                warn!("{}: {}", self.addr, e);
                self.conn = None;
                return Err(TransportError::other(e.to_string()));
            }
            Err(_) => {
                // A late reply would be mistaken for the next answer.
                self.conn = None;
                return Err(TransportError::Timeout);
            }
        };
        parse_reply(&reply)
    }
}

/// Refuse fields that would split one request into several lines.
fn single_line(field: &str, text: &str) -> Result<(), TransportError> {
    if text.contains(['\r', '\n']) {
        return Err(TransportError::other(format!(
            "{} contains a line break: {:?}",
            field, text
        )));
    }
    Ok(())
}

/// Decode `OK [value]` / `ERR <detail>`.
fn parse_reply(reply: &str) -> Result<Option<String>, TransportError> {
    if reply == "OK" {
        return Ok(None);
    }
    if let Some(value) = reply.strip_prefix("OK ") {
        return Ok(Some(value.to_string()));
    }
    if let Some(detail) = reply.strip_prefix("ERR") {
        return Err(TransportError::other(detail.trim()));
    }
    Err(TransportError::other(format!("unexpected reply: {}", reply)))
}

impl Transport for TcpTransport {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn read<'a>(&'a mut self, name: &'a PropertyName) -> TransportFuture<'a, Value> {
        Box::pin(async move {
            single_line("property name", name.as_str())?;
            match self.exchange(format!("GET {}", name)).await? {
                Some(raw) => Ok(Value::parse(&raw)),
                None => Err(TransportError::other(format!("empty reply for {}", name))),
            }
        })
    }

    fn write<'a>(&'a mut self, name: &'a PropertyName, value: Value) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            let value = value.to_string();
            single_line("property name", name.as_str())?;
            single_line("value", &value)?;
            self.exchange(format!("SET {} {}", name, value)).await?;
            Ok(())
        })
    }

    fn close<'a>(&'a mut self) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            if let Some(mut conn) = self.conn.take() {
                conn.writer
                    .shutdown()
                    .await
                    .map_err(|e| TransportError::other(e.to_string()))?;
            }
            Ok(())
        })
    }
}
