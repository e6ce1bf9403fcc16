//! SSH wire encoding of channel-open and channel-request payloads.
//!
//! `russh` hands the handler already decoded fields; the raw payload is rebuilt from them
//! so events carry the same `payload` bytes the client put on the wire.

/// Appends an SSH `string` (u32 big-endian length, then the bytes).
pub fn put_string(buf: &mut Vec<u8>, value: &[u8]) {
    put_u32(buf, value.len() as u32);
    buf.extend_from_slice(value);
}

pub fn put_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_be_bytes());
}

/// `direct-tcpip` and `forwarded-tcpip` open payload.
pub fn tcpip_channel(host: &str, port: u32, originator_host: &str, originator_port: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(16 + host.len() + originator_host.len());
    put_string(&mut buf, host.as_bytes());
    put_u32(&mut buf, port);
    put_string(&mut buf, originator_host.as_bytes());
    put_u32(&mut buf, originator_port);
    buf
}

/// `x11` open payload.
pub fn x11_channel(originator_host: &str, originator_port: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8 + originator_host.len());
    put_string(&mut buf, originator_host.as_bytes());
    put_u32(&mut buf, originator_port);
    buf
}

/// `direct-streamlocal@openssh.com` open payload: socket path, then the reserved string and u32.
pub fn streamlocal_channel(socket_path: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(12 + socket_path.len());
    put_string(&mut buf, socket_path.as_bytes());
    put_string(&mut buf, b"");
    put_u32(&mut buf, 0);
    buf
}

/// Payload made of consecutive strings, as sent by `env`, `exec` and `subsystem`.
pub fn strings(values: &[&[u8]]) -> Vec<u8> {
    let mut buf = Vec::new();
    for value in values {
        put_string(&mut buf, value);
    }
    buf
}

/// `pty-req` payload; `modes` are opcode/argument pairs terminated by TTY_OP_END.
pub fn pty_request(term: &str, columns: u32, rows: u32, width: u32, height: u32, modes: &[(u8, u32)]) -> Vec<u8> {
    let mut encoded_modes = Vec::with_capacity(modes.len() * 5 + 1);
    for (opcode, argument) in modes {
        encoded_modes.push(*opcode);
        put_u32(&mut encoded_modes, *argument);
    }
    encoded_modes.push(0);

    let mut buf = Vec::new();
    put_string(&mut buf, term.as_bytes());
    put_u32(&mut buf, columns);
    put_u32(&mut buf, rows);
    put_u32(&mut buf, width);
    put_u32(&mut buf, height);
    put_string(&mut buf, &encoded_modes);
    buf
}

/// `tcpip-forward` global request payload.
pub fn tcpip_forward(address: &str, port: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8 + address.len());
    put_string(&mut buf, address.as_bytes());
    put_u32(&mut buf, port);
    buf
}
