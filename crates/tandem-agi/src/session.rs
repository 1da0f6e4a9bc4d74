//! AGI session protocol
//!
//! One session per call-control event: read the header block, exchange
//! channel variables with the front-end, send a final status token.

use std::collections::HashMap;
use tandem_core::{AppError, AppResult};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Final status for a handled event
pub const AGI_SUCCESS: &str = "200 result=1";

/// Final status for an event the gateway could not dispatch
pub const AGI_FAILURE: &str = "200 result=0";

/// One AGI session over a connection's buffered reader/writer halves
pub struct AgiSession<R, W> {
    reader: R,
    writer: W,
    headers: HashMap<String, String>,
}

impl<R, W> AgiSession<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            headers: HashMap::new(),
        }
    }

    /// Read the `key: value` header block, terminated by a blank line
    pub async fn read_headers(&mut self) -> AppResult<()> {
        let mut line = String::new();
        loop {
            line.clear();
            let bytes = self
                .reader
                .read_line(&mut line)
                .await
                .map_err(|e| AppError::Protocol(format!("error reading header: {}", e)))?;
            if bytes == 0 {
                return Err(AppError::Protocol(
                    "connection closed before headers ended".to_string(),
                ));
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                break;
            }

            if let Some((key, value)) = trimmed.split_once(':') {
                self.headers
                    .insert(key.trim().to_string(), value.trim().to_string());
            }
        }
        Ok(())
    }

    /// Header value, empty when absent
    pub fn header(&self, key: &str) -> &str {
        self.headers.get(key).map(String::as_str).unwrap_or("")
    }

    /// Set a channel variable on the front-end and consume its status
    /// reply
    pub async fn set_variable(&mut self, name: &str, value: &str) -> AppResult<()> {
        self.send_line(&format!("SET VARIABLE {} \"{}\"", name, value))
            .await?;
        self.read_response_line().await?;
        Ok(())
    }

    /// Read a channel variable from the front-end; empty when unset
    pub async fn get_variable(&mut self, name: &str) -> AppResult<String> {
        self.send_line(&format!("GET VARIABLE {}", name)).await?;
        let response = self.read_response_line().await?;
        Ok(parse_variable_response(&response).unwrap_or_default())
    }

    /// Send the final status token
    pub async fn send_status(&mut self, status: &str) -> AppResult<()> {
        self.send_line(status).await
    }

    async fn send_line(&mut self, line: &str) -> AppResult<()> {
        self.writer
            .write_all(format!("{}\n", line).as_bytes())
            .await
            .map_err(|e| AppError::Protocol(format!("write failed: {}", e)))?;
        self.writer
            .flush()
            .await
            .map_err(|e| AppError::Protocol(format!("flush failed: {}", e)))
    }

    async fn read_response_line(&mut self) -> AppResult<String> {
        let mut line = String::new();
        let bytes = self
            .reader
            .read_line(&mut line)
            .await
            .map_err(|e| AppError::Protocol(format!("error reading response: {}", e)))?;
        if bytes == 0 {
            return Err(AppError::Protocol(
                "connection closed mid-command".to_string(),
            ));
        }
        Ok(line.trim().to_string())
    }
}

/// Pull the value out of a `200 result=1 (<value>)` reply
pub fn parse_variable_response(response: &str) -> Option<String> {
    if !response.contains("result=1") {
        return None;
    }
    let start = response.find('(')?;
    let end = response.rfind(')')?;
    if end <= start {
        return None;
    }
    Some(response[start + 1..end].to_string())
}

/// Extract the peer name embedded in a channel string.
///
/// Channels look like `PJSIP/endpoint-provider1-00000001`: technology,
/// a slash, then the endpoint token with the peer name between
/// `endpoint-` and the trailing suffix. Hyphenated peer names keep all
/// their middle tokens.
pub fn extract_peer_from_channel(channel: &str) -> String {
    if channel.is_empty() {
        return String::new();
    }

    let endpoint = match channel.split('/').nth(1) {
        Some(part) => part,
        None => return String::new(),
    };

    let parts: Vec<&str> = endpoint.split('-').collect();
    if parts.len() < 2 || parts[0] != "endpoint" {
        return String::new();
    }

    if parts.len() >= 3 {
        parts[1..parts.len() - 1].join("-")
    } else {
        parts[1].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, BufReader};

    #[test]
    fn test_extract_peer_from_channel() {
        assert_eq!(
            extract_peer_from_channel("PJSIP/endpoint-provider1-00000001"),
            "provider1"
        );
        assert_eq!(
            extract_peer_from_channel("SIP/endpoint-my-peer-00000002"),
            "my-peer"
        );
        assert_eq!(extract_peer_from_channel("PJSIP/endpoint-s3a"), "s3a");
        assert_eq!(extract_peer_from_channel("PJSIP/other-s3a-0001"), "");
        assert_eq!(extract_peer_from_channel("garbage"), "");
        assert_eq!(extract_peer_from_channel(""), "");
    }

    #[test]
    fn test_parse_variable_response() {
        assert_eq!(
            parse_variable_response("200 result=1 (10.0.0.20)").as_deref(),
            Some("10.0.0.20")
        );
        assert_eq!(parse_variable_response("200 result=0"), None);
        assert_eq!(parse_variable_response("200 result=1"), None);
    }

    #[tokio::test]
    async fn test_read_headers_stops_at_blank_line() {
        let input = "agi_request: processIncoming\nagi_uniqueid: C1\nagi_callerid: 15550000001\n\nleftover";
        let (client, server) = tokio::io::duplex(1024);
        let (_, mut client_write) = tokio::io::split(client);
        let (server_read, server_write) = tokio::io::split(server);

        tokio::io::AsyncWriteExt::write_all(&mut client_write, input.as_bytes())
            .await
            .unwrap();

        let mut session = AgiSession::new(BufReader::new(server_read), server_write);
        session.read_headers().await.unwrap();

        assert_eq!(session.header("agi_request"), "processIncoming");
        assert_eq!(session.header("agi_uniqueid"), "C1");
        assert_eq!(session.header("agi_callerid"), "15550000001");
        assert_eq!(session.header("agi_extension"), "");
    }

    #[tokio::test]
    async fn test_variable_exchange() {
        let (client, server) = tokio::io::duplex(1024);
        let (mut client_read, mut client_write) = tokio::io::split(client);
        let (server_read, server_write) = tokio::io::split(server);

        let driver = tokio::spawn(async move {
            // Reply to the SET, then answer the GET
            tokio::io::AsyncWriteExt::write_all(
                &mut client_write,
                b"200 result=1\n200 result=1 (10.0.0.20)\n",
            )
            .await
            .unwrap();

            let mut sent = Vec::new();
            client_read.read_to_end(&mut sent).await.unwrap();
            String::from_utf8(sent).unwrap()
        });

        let mut session = AgiSession::new(BufReader::new(server_read), server_write);
        session.set_variable("ROUTER_STATUS", "success").await.unwrap();
        let source_ip = session.get_variable("SOURCE_IP").await.unwrap();
        assert_eq!(source_ip, "10.0.0.20");
        drop(session);

        let sent = driver.await.unwrap();
        assert!(sent.contains("SET VARIABLE ROUTER_STATUS \"success\"\n"));
        assert!(sent.contains("GET VARIABLE SOURCE_IP\n"));
    }
}
