//! Minimal RFB 3.8 server codec.
//!
//! ```text
//!   server                                client
//!   "RFB 003.008\n"          ──────►
//!                            ◄──────      "RFB 003.00x\n"
//!   [1, None]                ──────►
//!                            ◄──────      None
//!   SecurityResult(ok)       ──────►
//!                            ◄──────      ClientInit(shared)
//!   ServerInit(w, h, fmt)    ──────►
//!                            ◄──────      client messages ...
//!   FramebufferUpdate(raw)   ──────►      (only after a request and a fed frame)
//! ```
//!
//! Only security type None and the raw encoding are offered. Frames arrive through a
//! `watch` channel, so a slow client only ever sees the newest one.

use std::borrow::Cow;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, trace};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};

use crate::error_handling::types::{ServiceError, SessionError};

pub const PROTOCOL_VERSION: &[u8; 12] = b"RFB 003.008\n";
const SECURITY_NONE: u8 = 1;
const ENCODING_RAW: i32 = 0;
const MAX_CUT_TEXT: usize = 1024 * 1024;
const INBOUND_QUEUE: usize = 64;

/// What the feed hands to the codec; `None` until the first tick.
pub type Frame = Option<Arc<SharedImage>>;

/// Decoded image shared read-only by every session of a worker.
#[derive(Debug, Clone, PartialEq)]
pub struct SharedImage {
    width: u16,
    height: u16,
    rgba: Vec<u8>,
    /// Pixels pre-encoded in [`PixelFormat::DEFAULT`].
    native: Vec<u8>,
}

impl SharedImage {
    /// Decodes the image file at `path`.
    pub fn load(path: &Path) -> Result<Self, ServiceError> {
        let decoded = image::open(path)
            .map_err(|e| ServiceError::ImageLoad(format!("{}: {}", path.display(), e)))?
            .to_rgba8();
        let (width, height) = decoded.dimensions();
        let width = u16::try_from(width)
            .map_err(|_| ServiceError::ImageLoad(format!("{} is too wide", path.display())))?;
        let height = u16::try_from(height)
            .map_err(|_| ServiceError::ImageLoad(format!("{} is too tall", path.display())))?;
        Self::from_rgba(width, height, decoded.into_raw())
    }

    pub fn from_rgba(width: u16, height: u16, rgba: Vec<u8>) -> Result<Self, ServiceError> {
        let expected = usize::from(width) * usize::from(height) * 4;
        if rgba.len() != expected {
            return Err(ServiceError::ImageLoad(format!(
                "expected {} bytes of RGBA, got {}",
                expected,
                rgba.len()
            )));
        }
        let native = encode_pixels(&rgba, &PixelFormat::DEFAULT);
        Ok(Self {
            width,
            height,
            rgba,
            native,
        })
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    /// Pixels in `format`, row major.
    pub fn pixels(&self, format: &PixelFormat) -> Cow<'_, [u8]> {
        if *format == PixelFormat::DEFAULT {
            Cow::Borrowed(&self.native)
        } else {
            Cow::Owned(encode_pixels(&self.rgba, format))
        }
    }
}

fn encode_pixels(rgba: &[u8], format: &PixelFormat) -> Vec<u8> {
    let bytes_per_pixel = usize::from(format.bits_per_pixel / 8).max(1);
    let mut out = Vec::with_capacity(rgba.len() / 4 * bytes_per_pixel);
    for px in rgba.chunks_exact(4) {
        format.pack(px[0], px[1], px[2], &mut out);
    }
    out
}

/// RFB PIXEL_FORMAT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelFormat {
    pub bits_per_pixel: u8,
    pub depth: u8,
    pub big_endian: bool,
    pub true_color: bool,
    pub red_max: u16,
    pub green_max: u16,
    pub blue_max: u16,
    pub red_shift: u8,
    pub green_shift: u8,
    pub blue_shift: u8,
}

impl PixelFormat {
    /// 32bpp little-endian BGRX, announced in ServerInit.
    pub const DEFAULT: PixelFormat = PixelFormat {
        bits_per_pixel: 32,
        depth: 24,
        big_endian: false,
        true_color: true,
        red_max: 255,
        green_max: 255,
        blue_max: 255,
        red_shift: 16,
        green_shift: 8,
        blue_shift: 0,
    };

    pub fn to_bytes(&self) -> [u8; 16] {
        let mut b = [0u8; 16];
        b[0] = self.bits_per_pixel;
        b[1] = self.depth;
        b[2] = u8::from(self.big_endian);
        b[3] = u8::from(self.true_color);
        b[4..6].copy_from_slice(&self.red_max.to_be_bytes());
        b[6..8].copy_from_slice(&self.green_max.to_be_bytes());
        b[8..10].copy_from_slice(&self.blue_max.to_be_bytes());
        b[10] = self.red_shift;
        b[11] = self.green_shift;
        b[12] = self.blue_shift;
        b
    }

    pub fn from_bytes(b: &[u8; 16]) -> Self {
        Self {
            bits_per_pixel: b[0],
            depth: b[1],
            big_endian: b[2] != 0,
            true_color: b[3] != 0,
            red_max: u16::from_be_bytes([b[4], b[5]]),
            green_max: u16::from_be_bytes([b[6], b[7]]),
            blue_max: u16::from_be_bytes([b[8], b[9]]),
            red_shift: b[10],
            green_shift: b[11],
            blue_shift: b[12],
        }
    }

    /// True-colour formats of 8, 16 or 32 bits per pixel can be served, provided every
    /// channel fits inside the pixel once shifted.
    pub fn is_supported(&self) -> bool {
        let bits = u32::from(self.bits_per_pixel);
        let fits = |max: u16, shift: u8| {
            u32::from(shift) < bits && u64::from(max) << shift < 1u64 << bits
        };
        self.true_color
            && matches!(self.bits_per_pixel, 8 | 16 | 32)
            && fits(self.red_max, self.red_shift)
            && fits(self.green_max, self.green_shift)
            && fits(self.blue_max, self.blue_shift)
    }

    fn pack(&self, r: u8, g: u8, b: u8, out: &mut Vec<u8>) {
        let channel = |v: u8, max: u16, shift: u8| {
            (u32::from(v) * u32::from(max) / 255)
                .checked_shl(u32::from(shift))
                .unwrap_or(0)
        };
        let value = channel(r, self.red_max, self.red_shift)
            | channel(g, self.green_max, self.green_shift)
            | channel(b, self.blue_max, self.blue_shift);
        match (self.bits_per_pixel, self.big_endian) {
            (8, _) => out.push(value as u8),
            (16, false) => out.extend_from_slice(&(value as u16).to_le_bytes()),
            (16, true) => out.extend_from_slice(&(value as u16).to_be_bytes()),
            (_, false) => out.extend_from_slice(&value.to_le_bytes()),
            (_, true) => out.extend_from_slice(&value.to_be_bytes()),
        }
    }
}

/// Client-to-server message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    SetPixelFormat(PixelFormat),
    SetEncodings(Vec<i32>),
    FramebufferUpdateRequest {
        incremental: bool,
        x: u16,
        y: u16,
        width: u16,
        height: u16,
    },
    Key {
        down: bool,
        keysym: u32,
    },
    Pointer {
        buttons: u8,
        x: u16,
        y: u16,
    },
    CutText(String),
}

/// Wire codec driven by a VNC session: serves frames from `feed` and reports every
/// client message on `events` until the client goes away.
#[async_trait]
pub trait FramebufferCodec: Send {
    async fn serve(
        self: Box<Self>,
        feed: watch::Receiver<Frame>,
        events: mpsc::Sender<ClientEvent>,
    ) -> Result<(), SessionError>;
}

pub struct RfbCodec<S> {
    stream: S,
    name: String,
    width: u16,
    height: u16,
}

impl<S> RfbCodec<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(stream: S, name: impl Into<String>, width: u16, height: u16) -> Self {
        Self {
            stream,
            name: name.into(),
            width,
            height,
        }
    }

    async fn handshake(&mut self) -> Result<(), SessionError> {
        self.stream.write_all(PROTOCOL_VERSION).await?;
        self.stream.flush().await?;

        let mut version = [0u8; 12];
        self.stream.read_exact(&mut version).await?;
        let minor = parse_version(&version)?;
        trace!("rfb client version 3.{}", minor);

        if minor < 7 {
            self.stream.write_u32(u32::from(SECURITY_NONE)).await?;
        } else {
            self.stream.write_all(&[1, SECURITY_NONE]).await?;
            self.stream.flush().await?;
            let chosen = self.stream.read_u8().await?;
            if chosen != SECURITY_NONE {
                return Err(SessionError::Protocol(format!(
                    "unsupported security type {}",
                    chosen
                )));
            }
            if minor >= 8 {
                self.stream.write_u32(0).await?;
            }
        }
        self.stream.flush().await?;

        let _shared = self.stream.read_u8().await?;

        let mut init = Vec::with_capacity(24 + self.name.len());
        init.extend_from_slice(&self.width.to_be_bytes());
        init.extend_from_slice(&self.height.to_be_bytes());
        init.extend_from_slice(&PixelFormat::DEFAULT.to_bytes());
        init.extend_from_slice(&(self.name.len() as u32).to_be_bytes());
        init.extend_from_slice(self.name.as_bytes());
        self.stream.write_all(&init).await?;
        self.stream.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl<S> FramebufferCodec for RfbCodec<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn serve(
        self: Box<Self>,
        mut feed: watch::Receiver<Frame>,
        events: mpsc::Sender<ClientEvent>,
    ) -> Result<(), SessionError> {
        let mut codec = *self;
        codec.handshake().await?;

        let RfbCodec { stream, .. } = codec;
        let (reader, mut writer) = tokio::io::split(stream);
        let (inbound_tx, mut inbound) = mpsc::channel(INBOUND_QUEUE);
        let reader_task = tokio::spawn(read_client_messages(reader, inbound_tx));

        let mut format = PixelFormat::DEFAULT;
        let mut requested: Option<bool> = None;
        let mut latest: Frame = None;
        let mut fresh = false;
        let mut feed_open = true;

        loop {
            tokio::select! {
                message = inbound.recv() => {
                    let Some(message) = message else { break };
                    match &message {
                        ClientEvent::SetPixelFormat(requested_format) => {
                            if requested_format.is_supported() {
                                format = *requested_format;
                            } else {
                                debug!("ignoring unsupported pixel format {:?}", requested_format);
                            }
                        }
                        ClientEvent::SetEncodings(encodings) if !encodings.contains(&ENCODING_RAW) => {
                            trace!("client lists no raw encoding, raw is used anyway");
                        }
                        ClientEvent::FramebufferUpdateRequest { incremental, .. } => {
                            requested = Some(requested.map_or(*incremental, |i| i && *incremental));
                        }
                        _ => {}
                    }
                    // the session may stop listening before the client leaves
                    let _ = events.send(message).await;
                }
                changed = feed.changed(), if feed_open => {
                    if changed.is_err() {
                        feed_open = false;
                        continue;
                    }
                    latest = feed.borrow_and_update().clone();
                    fresh = latest.is_some();
                }
            }

            if let (Some(incremental), Some(frame)) = (requested, &latest) {
                if fresh || !incremental {
                    write_update(&mut writer, frame, &format).await?;
                    requested = None;
                    fresh = false;
                }
            }
        }

        match reader_task.await {
            Ok(result) => result,
            Err(e) => Err(SessionError::Protocol(format!("rfb reader failed: {}", e))),
        }
    }
}

fn parse_version(version: &[u8; 12]) -> Result<u8, SessionError> {
    let text = std::str::from_utf8(version)
        .map_err(|_| SessionError::Protocol("non-ascii protocol version".to_string()))?;
    let digits = text
        .strip_prefix("RFB 003.")
        .and_then(|rest| rest.strip_suffix('\n'))
        .ok_or_else(|| SessionError::Protocol(format!("bad protocol version {:?}", text)))?;
    let minor: u16 = digits
        .parse()
        .map_err(|_| SessionError::Protocol(format!("bad protocol version {:?}", text)))?;
    // 3.889 is an Apple variant of 3.8
    Ok(minor.min(8) as u8)
}

async fn write_update<W>(writer: &mut W, frame: &SharedImage, format: &PixelFormat) -> Result<(), SessionError>
where
    W: AsyncWrite + Unpin,
{
    let mut header = Vec::with_capacity(16);
    header.push(0);
    header.push(0);
    header.extend_from_slice(&1u16.to_be_bytes());
    header.extend_from_slice(&0u16.to_be_bytes());
    header.extend_from_slice(&0u16.to_be_bytes());
    header.extend_from_slice(&frame.width().to_be_bytes());
    header.extend_from_slice(&frame.height().to_be_bytes());
    header.extend_from_slice(&ENCODING_RAW.to_be_bytes());
    writer.write_all(&header).await?;
    writer.write_all(&frame.pixels(format)).await?;
    writer.flush().await?;
    Ok(())
}

async fn read_client_messages<R>(mut reader: R, inbound: mpsc::Sender<ClientEvent>) -> Result<(), SessionError>
where
    R: AsyncRead + Unpin,
{
    loop {
        let kind = match reader.read_u8().await {
            Ok(kind) => kind,
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let message = read_message(kind, &mut reader).await?;
        if inbound.send(message).await.is_err() {
            return Ok(());
        }
    }
}

async fn read_message<R>(kind: u8, reader: &mut R) -> Result<ClientEvent, SessionError>
where
    R: AsyncRead + Unpin,
{
    let message = match kind {
        0 => {
            let mut padding = [0u8; 3];
            reader.read_exact(&mut padding).await?;
            let mut format = [0u8; 16];
            reader.read_exact(&mut format).await?;
            ClientEvent::SetPixelFormat(PixelFormat::from_bytes(&format))
        }
        2 => {
            let _padding = reader.read_u8().await?;
            let count = reader.read_u16().await?;
            let mut encodings = Vec::with_capacity(usize::from(count));
            for _ in 0..count {
                encodings.push(reader.read_i32().await?);
            }
            ClientEvent::SetEncodings(encodings)
        }
        3 => ClientEvent::FramebufferUpdateRequest {
            incremental: reader.read_u8().await? != 0,
            x: reader.read_u16().await?,
            y: reader.read_u16().await?,
            width: reader.read_u16().await?,
            height: reader.read_u16().await?,
        },
        4 => {
            let down = reader.read_u8().await? != 0;
            let _padding = reader.read_u16().await?;
            ClientEvent::Key {
                down,
                keysym: reader.read_u32().await?,
            }
        }
        5 => ClientEvent::Pointer {
            buttons: reader.read_u8().await?,
            x: reader.read_u16().await?,
            y: reader.read_u16().await?,
        },
        6 => {
            let mut padding = [0u8; 3];
            reader.read_exact(&mut padding).await?;
            let length = reader.read_u32().await? as usize;
            if length > MAX_CUT_TEXT {
                return Err(SessionError::Protocol(format!("cut text of {} bytes", length)));
            }
            let mut text = vec![0u8; length];
            reader.read_exact(&mut text).await?;
            // ClientCutText is Latin-1
            ClientEvent::CutText(text.into_iter().map(char::from).collect())
        }
        other => {
            return Err(SessionError::Protocol(format!(
                "unknown client message type {}",
                other
            )))
        }
    };
    Ok(message)
}
