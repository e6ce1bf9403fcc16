use std::collections::VecDeque;
use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const IAC: u8 = 255;
pub const DONT: u8 = 254;
pub const DO: u8 = 253;
pub const WONT: u8 = 252;
pub const WILL: u8 = 251;
pub const SB: u8 = 250;
pub const SE: u8 = 240;
pub const ECHO: u8 = 1;

const READ_CHUNK: usize = 1024;
const MAX_LINE: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Iac {
    Data,
    Command,
    Option,
    Subnegotiation,
    SubnegotiationIac,
}

/// Line-oriented reader/writer over a raw Telnet stream.
///
/// Option negotiation is stripped from the input and never answered; lines end on CR,
/// LF, CR LF or CR NUL.
pub struct Terminal<S> {
    stream: S,
    state: Iac,
    line: Vec<u8>,
    after_cr: bool,
    ready: VecDeque<String>,
}

impl<S> Terminal<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            state: Iac::Data,
            line: Vec::new(),
            after_cr: false,
            ready: VecDeque::new(),
        }
    }

    pub async fn write_str(&mut self, text: &str) -> io::Result<()> {
        self.stream.write_all(text.as_bytes()).await?;
        self.stream.flush().await
    }

    /// Writes `prompt` and waits for a line. `None` once the client closed the stream.
    pub async fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>> {
        if !prompt.is_empty() {
            self.write_str(prompt).await?;
        }
        self.next_line().await
    }

    /// Like [`Terminal::read_line`] with the client's local echo suppressed.
    pub async fn read_password(&mut self, prompt: &str) -> io::Result<Option<String>> {
        self.stream.write_all(&[IAC, WILL, ECHO]).await?;
        let line = self.read_line(prompt).await;
        self.stream.write_all(&[IAC, WONT, ECHO]).await?;
        self.stream.write_all(b"\r\n").await?;
        self.stream.flush().await?;
        line
    }

    pub async fn shutdown(&mut self) -> io::Result<()> {
        self.stream.shutdown().await
    }

    async fn next_line(&mut self) -> io::Result<Option<String>> {
        let mut buf = [0u8; READ_CHUNK];
        loop {
            if let Some(line) = self.ready.pop_front() {
                return Ok(Some(line));
            }
            let n = self.stream.read(&mut buf).await?;
            if n == 0 {
                return Ok(None);
            }
            self.decode(&buf[..n]);
        }
    }

    fn decode(&mut self, input: &[u8]) {
        for &byte in input {
            match self.state {
                Iac::Data => self.data(byte),
                Iac::Command => {
                    self.state = match byte {
                        IAC => {
                            self.data(IAC);
                            Iac::Data
                        }
                        WILL | WONT | DO | DONT => Iac::Option,
                        SB => Iac::Subnegotiation,
                        _ => Iac::Data,
                    };
                }
                Iac::Option => self.state = Iac::Data,
                Iac::Subnegotiation => {
                    if byte == IAC {
                        self.state = Iac::SubnegotiationIac;
                    }
                }
                Iac::SubnegotiationIac => {
                    self.state = if byte == SE {
                        Iac::Data
                    } else {
                        Iac::Subnegotiation
                    };
                }
            }
        }
    }

    fn data(&mut self, byte: u8) {
        if self.state == Iac::Data && byte == IAC {
            self.state = Iac::Command;
            return;
        }
        let after_cr = std::mem::take(&mut self.after_cr);
        match byte {
            b'\n' | 0 if after_cr => {}
            b'\r' | b'\n' => {
                self.after_cr = byte == b'\r';
                let line = String::from_utf8_lossy(&self.line).into_owned();
                self.line.clear();
                self.ready.push_back(line);
            }
            0x7f | 0x08 => {
                self.line.pop();
            }
            _ => {
                if self.line.len() < MAX_LINE {
                    self.line.push(byte);
                }
            }
        }
    }
}
