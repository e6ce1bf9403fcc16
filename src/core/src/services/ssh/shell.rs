/// Bytes kept for one pending line; input past it is dropped without echo.
pub const MAX_LINE: usize = 4096;

/// What the shell loop has to do after a chunk of client input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellStep {
    /// Bytes to echo back to the terminal.
    Echo(Vec<u8>),
    /// A complete line was entered.
    Line(String),
    /// Ctrl-C: the current line was discarded.
    Interrupt,
    /// Ctrl-D on an empty line.
    Hangup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Escape {
    #[default]
    None,
    Started,
    Sequence,
}

/// Minimal line discipline for a remote terminal: echo, backspace, Ctrl-C/Ctrl-D and
/// CR/LF handling. Cursor movement sequences are swallowed.
#[derive(Debug, Default)]
pub struct LineEditor {
    buffer: Vec<u8>,
    after_cr: bool,
    escape: Escape,
}

impl LineEditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, input: &[u8]) -> Vec<ShellStep> {
        let mut steps = Vec::new();
        let mut echo = Vec::new();

        for &byte in input {
            let after_cr = std::mem::take(&mut self.after_cr);

            match self.escape {
                Escape::Started => {
                    self.escape = if byte == b'[' || byte == b'O' {
                        Escape::Sequence
                    } else {
                        Escape::None
                    };
                    continue;
                }
                Escape::Sequence => {
                    if (0x40..=0x7e).contains(&byte) {
                        self.escape = Escape::None;
                    }
                    continue;
                }
                Escape::None => {}
            }

            match byte {
                b'\r' | b'\n' => {
                    if byte == b'\n' && after_cr {
                        continue;
                    }
                    self.after_cr = byte == b'\r';
                    echo.extend_from_slice(b"\r\n");
                    flush(&mut steps, &mut echo);
                    let line = String::from_utf8_lossy(&self.buffer).into_owned();
                    self.buffer.clear();
                    steps.push(ShellStep::Line(line));
                }
                0x7f | 0x08 => {
                    if self.pop_char() {
                        echo.extend_from_slice(b"\x08 \x08");
                    }
                }
                0x03 => {
                    self.buffer.clear();
                    echo.extend_from_slice(b"^C\r\n");
                    flush(&mut steps, &mut echo);
                    steps.push(ShellStep::Interrupt);
                }
                0x04 => {
                    if self.buffer.is_empty() {
                        flush(&mut steps, &mut echo);
                        steps.push(ShellStep::Hangup);
                        return steps;
                    }
                }
                0x1b => self.escape = Escape::Started,
                byte if byte < 0x20 => {}
                byte => {
                    if self.buffer.len() < MAX_LINE {
                        self.buffer.push(byte);
                        echo.push(byte);
                    }
                }
            }
        }

        flush(&mut steps, &mut echo);
        steps
    }

    /// Removes the last UTF-8 character of the pending line.
    fn pop_char(&mut self) -> bool {
        if self.buffer.is_empty() {
            return false;
        }
        while let Some(byte) = self.buffer.pop() {
            if byte & 0xc0 != 0x80 {
                break;
            }
        }
        true
    }
}

fn flush(steps: &mut Vec<ShellStep>, echo: &mut Vec<u8>) {
    if !echo.is_empty() {
        steps.push(ShellStep::Echo(std::mem::take(echo)));
    }
}

/// Converts bare `\n` into `\r\n` for a terminal in raw mode.
pub fn to_terminal(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len() + 8);
    let mut previous = 0u8;
    for &byte in text.as_bytes() {
        if byte == b'\n' && previous != b'\r' {
            out.push(b'\r');
        }
        out.push(byte);
        previous = byte;
    }
    out
}
