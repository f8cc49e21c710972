//! MySQL wire framing and the handful of packets the probe needs.
//!
//! Framing: every packet is `[payload_len: 3 bytes LE] [seq: 1 byte]`
//! followed by the payload. Payload parsing and building are pure
//! functions over byte slices; only the framed read/write touch the
//! socket.

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::{Error, Result};

/// Command byte for `COM_QUERY`.
pub const COM_QUERY: u8 = 0x03;
/// Command byte for `COM_QUIT`.
pub const COM_QUIT: u8 = 0x01;

/// First payload byte of an OK packet.
pub const OK_MARKER: u8 = 0x00;
/// First payload byte of an ERR packet.
pub const ERR_MARKER: u8 = 0xff;
/// First payload byte of an auth-switch request (also the EOF marker).
pub const AUTH_SWITCH_MARKER: u8 = 0xfe;
/// First payload byte of auth-more-data (caching_sha2 status).
pub const AUTH_MORE_DATA_MARKER: u8 = 0x01;

/// Capability flags the probe announces.
pub const CLIENT_CONNECT_WITH_DB: u32 = 0x0000_0008;
pub const CLIENT_PROTOCOL_41: u32 = 0x0000_0200;
pub const CLIENT_SECURE_CONNECTION: u32 = 0x0000_8000;
pub const CLIENT_PLUGIN_AUTH: u32 = 0x0008_0000;

/// utf8mb4_general_ci.
const CHARSET_UTF8MB4: u8 = 45;

/// Cap on a single payload; the probe never legitimately sees more.
const MAX_PAYLOAD: usize = 1 << 20;

// ── Framing ──────────────────────────────────────────────────────────

/// Read one framed packet, returning `(sequence, payload)`.
pub async fn read_packet<R>(stream: &mut R) -> Result<(u8, Vec<u8>)>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).await?;
    let len = u32::from_le_bytes([header[0], header[1], header[2], 0]) as usize;
    if len > MAX_PAYLOAD {
        return Err(Error::Protocol(format!("oversized packet ({len} bytes)")));
    }
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await?;
    Ok((header[3], payload))
}

/// Write one framed packet.
pub async fn write_packet<W>(stream: &mut W, seq: u8, payload: &[u8]) -> Result<()>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    let len = payload.len();
    if len > MAX_PAYLOAD {
        return Err(Error::Protocol(format!("oversized packet ({len} bytes)")));
    }
    let mut frame = Vec::with_capacity(4 + len);
    frame.extend_from_slice(&(len as u32).to_le_bytes()[..3]);
    frame.push(seq);
    frame.extend_from_slice(payload);
    stream.write_all(&frame).await?;
    Ok(())
}

// ── Server greeting ──────────────────────────────────────────────────

/// Parsed fields of the v10 initial handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Greeting {
    pub server_version: String,
    pub capabilities: u32,
    /// Full auth nonce (part 1 ++ part 2, trailing NUL stripped).
    pub nonce: Vec<u8>,
    pub auth_plugin: String,
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.bytes.len() {
            return Err(Error::Protocol("truncated packet".into()));
        }
        let out = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16_le(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32_le(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn nul_string(&mut self) -> Result<Vec<u8>> {
        let rest = &self.bytes[self.pos..];
        let end = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| Error::Protocol("missing NUL terminator".into()))?;
        let out = rest[..end].to_vec();
        self.pos += end + 1;
        Ok(out)
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }
}

/// Parse the server's initial handshake payload.
pub fn parse_greeting(payload: &[u8]) -> Result<Greeting> {
    let mut cur = Cursor {
        bytes: payload,
        pos: 0,
    };

    let protocol = cur.u8()?;
    if protocol == ERR_MARKER {
        let err = parse_err(payload)?;
        return Err(err);
    }
    if protocol != 10 {
        return Err(Error::Protocol(format!(
            "unsupported handshake protocol version {protocol}",
        )));
    }

    let server_version = String::from_utf8_lossy(&cur.nul_string()?).into_owned();
    let _thread_id = cur.u32_le()?;
    let mut nonce = cur.take(8)?.to_vec();
    let _filler = cur.u8()?;
    let cap_low = cur.u16_le()? as u32;
    let _charset = cur.u8()?;
    let _status = cur.u16_le()?;
    let cap_high = cur.u16_le()? as u32;
    let capabilities = cap_low | (cap_high << 16);
    let auth_data_len = cur.u8()? as usize;
    let _reserved = cur.take(10)?;

    // Part 2 of the nonce: max(13, len - 8) bytes, usually NUL-padded.
    if capabilities & CLIENT_SECURE_CONNECTION != 0 {
        let part2_len = std::cmp::max(13, auth_data_len.saturating_sub(8));
        let part2 = cur.take(std::cmp::min(part2_len, cur.remaining()))?;
        nonce.extend_from_slice(part2);
        while nonce.last() == Some(&0) {
            nonce.pop();
        }
    }

    let auth_plugin = if capabilities & CLIENT_PLUGIN_AUTH != 0 && cur.remaining() > 0 {
        String::from_utf8_lossy(&cur.nul_string().unwrap_or_default()).into_owned()
    } else {
        crate::auth::NATIVE_PASSWORD.to_string()
    };

    Ok(Greeting {
        server_version,
        capabilities,
        nonce,
        auth_plugin,
    })
}

// ── Client packets ───────────────────────────────────────────────────

/// Build a Protocol::41 handshake response payload.
pub fn build_handshake_response(
    user: &str,
    database: &str,
    auth_plugin: &str,
    auth_response: &[u8],
) -> Vec<u8> {
    let capabilities = CLIENT_PROTOCOL_41
        | CLIENT_SECURE_CONNECTION
        | CLIENT_PLUGIN_AUTH
        | CLIENT_CONNECT_WITH_DB;

    let mut out = Vec::with_capacity(64 + user.len() + database.len());
    out.extend_from_slice(&capabilities.to_le_bytes());
    out.extend_from_slice(&(MAX_PAYLOAD as u32).to_le_bytes());
    out.push(CHARSET_UTF8MB4);
    out.extend_from_slice(&[0u8; 23]);
    out.extend_from_slice(user.as_bytes());
    out.push(0);
    // Auth response fits in a single length byte for both plugins.
    out.push(auth_response.len() as u8);
    out.extend_from_slice(auth_response);
    out.extend_from_slice(database.as_bytes());
    out.push(0);
    out.extend_from_slice(auth_plugin.as_bytes());
    out.push(0);
    out
}

/// Build a `COM_QUERY` payload.
pub fn build_query(sql: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + sql.len());
    out.push(COM_QUERY);
    out.extend_from_slice(sql.as_bytes());
    out
}

// ── Server status packets ────────────────────────────────────────────

/// Parse an ERR payload into [`Error::Server`].
pub fn parse_err(payload: &[u8]) -> Result<Error> {
    let mut cur = Cursor {
        bytes: payload,
        pos: 0,
    };
    let marker = cur.u8()?;
    if marker != ERR_MARKER {
        return Err(Error::Protocol("not an ERR packet".into()));
    }
    let code = cur.u16_le()?;
    let mut rest = &payload[cur.pos..];
    // Protocol::41 prefixes a '#' + 5-byte SQL state.
    if rest.first() == Some(&b'#') && rest.len() >= 6 {
        rest = &rest[6..];
    }
    Ok(Error::Server {
        code,
        message: String::from_utf8_lossy(rest).into_owned(),
    })
}

/// Parsed auth-switch request: new plugin, new nonce.
pub fn parse_auth_switch(payload: &[u8]) -> Result<(String, Vec<u8>)> {
    let mut cur = Cursor {
        bytes: payload,
        pos: 0,
    };
    let marker = cur.u8()?;
    if marker != AUTH_SWITCH_MARKER {
        return Err(Error::Protocol("not an auth-switch packet".into()));
    }
    let plugin = String::from_utf8_lossy(&cur.nul_string()?).into_owned();
    let mut nonce = cur.take(cur.remaining())?.to_vec();
    while nonce.last() == Some(&0) {
        nonce.pop();
    }
    Ok((plugin, nonce))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Assemble a synthetic MariaDB-style greeting payload.
    fn greeting_payload(plugin: &str) -> Vec<u8> {
        let mut p = Vec::new();
        p.push(10u8);
        p.extend_from_slice(b"5.5.5-10.6.14-MariaDB\0");
        p.extend_from_slice(&42u32.to_le_bytes());
        p.extend_from_slice(b"abcdefgh"); // nonce part 1
        p.push(0);
        let caps = CLIENT_PROTOCOL_41 | CLIENT_SECURE_CONNECTION | CLIENT_PLUGIN_AUTH;
        p.extend_from_slice(&(caps as u16).to_le_bytes());
        p.push(45); // charset
        p.extend_from_slice(&2u16.to_le_bytes()); // status
        p.extend_from_slice(&((caps >> 16) as u16).to_le_bytes());
        p.push(21); // auth data length
        p.extend_from_slice(&[0u8; 10]);
        p.extend_from_slice(b"ijklmnopqrst\0"); // nonce part 2 + NUL pad
        p.extend_from_slice(plugin.as_bytes());
        p.push(0);
        p
    }

    #[test]
    fn greeting_parses() {
        let g = parse_greeting(&greeting_payload("mysql_native_password")).unwrap();
        assert_eq!(g.server_version, "5.5.5-10.6.14-MariaDB");
        assert_eq!(g.nonce, b"abcdefghijklmnopqrst");
        assert_eq!(g.auth_plugin, "mysql_native_password");
        assert_ne!(g.capabilities & CLIENT_PLUGIN_AUTH, 0);
    }

    #[test]
    fn greeting_err_packet_surfaces_server_error() {
        let mut p = vec![ERR_MARKER];
        p.extend_from_slice(&1040u16.to_le_bytes());
        p.extend_from_slice(b"Too many connections");

        match parse_greeting(&p) {
            Err(Error::Server { code, message }) => {
                assert_eq!(code, 1040);
                assert_eq!(message, "Too many connections");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn err_with_sql_state_strips_the_prefix() {
        let mut p = vec![ERR_MARKER];
        p.extend_from_slice(&1045u16.to_le_bytes());
        p.extend_from_slice(b"#28000Access denied");

        match parse_err(&p).unwrap() {
            Error::Server { code, message } => {
                assert_eq!(code, 1045);
                assert_eq!(message, "Access denied");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn handshake_response_layout() {
        let payload = build_handshake_response("bn_suitecrm", "crm", "mysql_native_password", &[7; 20]);

        // Capabilities, max packet, charset, 23 filler bytes.
        let fixed = 4 + 4 + 1 + 23;
        assert_eq!(&payload[fixed..fixed + 12], b"bn_suitecrm\0");
        let auth_len_at = fixed + 12;
        assert_eq!(payload[auth_len_at], 20);
        assert_eq!(&payload[auth_len_at + 1..auth_len_at + 21], &[7; 20]);
        assert!(payload.ends_with(b"mysql_native_password\0"));
    }

    #[test]
    fn auth_switch_parses() {
        let mut p = vec![AUTH_SWITCH_MARKER];
        p.extend_from_slice(b"mysql_native_password\0");
        p.extend_from_slice(b"12345678901234567890\0");

        let (plugin, nonce) = parse_auth_switch(&p).unwrap();
        assert_eq!(plugin, "mysql_native_password");
        assert_eq!(nonce, b"12345678901234567890");
    }

    #[tokio::test]
    async fn framing_round_trips() {
        let mut buf = Vec::new();
        write_packet(&mut buf, 1, b"hello").await.unwrap();
        assert_eq!(buf, [5, 0, 0, 1, b'h', b'e', b'l', b'l', b'o']);

        let (seq, payload) = read_packet(&mut buf.as_slice()).await.unwrap();
        assert_eq!(seq, 1);
        assert_eq!(payload, b"hello");
    }
}
