//! Protocol tables for the supported controller families
//!
//! Every family is described by an immutable [`ProtocolSpec`]: byte templates
//! for each command, checksum use, status frame lengths and a decoder for
//! status responses. Templates are sequences of [`Token`]s; placeholders are
//! filled from positional arguments by [`Template::resolve`].

use std::fmt;
use std::str::FromStr;

use crate::error::ProtocolError;
use crate::types::{DeviceState, TransportMode};

/// Status frame constants
pub mod status {
    /// Leading byte of a 14-byte LD382A/LD686/UFO status response
    pub const LD_HEADER: u8 = 0x81;
    /// Leading byte of an 11-byte LW12 status response
    pub const LW12_HEADER: u8 = 0x66;
    /// Second byte of an LW12 status response
    pub const LW12_MARKER: u8 = 0x01;
    /// Second byte of the 4-byte acknowledgement LD382A sends for power commands
    pub const LD_POWER_ACK: u8 = 0x71;
    /// Power byte value meaning "on"
    pub const POWER_ON: u8 = 0x23;
    /// Program-running byte value meaning "running"
    pub const PROGRAM_RUNNING: u8 = 0x21;

    pub const LD_FRAME_LEN: usize = 14;
    pub const LD_ACK_LEN: usize = 4;
    pub const LW12_FRAME_LEN: usize = 11;
}

/// Timing constants
pub mod timing {
    /// Default delay between two commands (ms)
    pub const DEFAULT_DELAY_MS: u64 = 10;
    /// Delay between commands for UDP dial controllers (ms)
    pub const DIAL_DELAY_MS: u64 = 100;
    /// Fixed delay before reconnecting after a retryable error (ms)
    pub const RECONNECT_DELAY_MS: u64 = 5000;
    /// TCP connect timeout (ms)
    pub const CONNECT_TIMEOUT_MS: u64 = 5000;
    /// Default status poll interval (s)
    pub const DEFAULT_POLL_INTERVAL_S: u64 = 30;
    /// Smallest non-zero poll interval (s)
    pub const MIN_POLL_INTERVAL_S: u64 = 5;
    /// Delay between repeated pairing frames (ms)
    pub const PAIR_DELAY_MS: u64 = 1000;
    /// Delay between repeated un-pairing frames (ms)
    pub const UNPAIR_DELAY_MS: u64 = 200;
}

/// Default TCP port of the Wi-Fi controllers
pub const DEFAULT_TCP_PORT: u16 = 5577;
/// Default UDP port of the MiLight bridge
pub const DEFAULT_UDP_PORT: u16 = 8899;
/// Number of addressable zones on a MiLight bridge (0 = all zones)
pub const MILIGHT_ZONES: u8 = 5;

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

/// Kind of value substituted into a placeholder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Red,
    Green,
    Blue,
    White,
    Program,
    Speed,
    Brightness,
    Hue,
}

/// Timing between two segments of a composite template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Gap {
    /// Wait the family's default command delay
    #[default]
    Timed,
    /// Send the next segment without delay
    Immediate,
}

/// One element of a byte template
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    Literal(u8),
    Placeholder(Slot),
    Separator(Gap),
}

/// Build a [`Template`] from literal bytes and placeholder names
///
/// ```
/// use wifilight_transport::template;
/// let t = template![0x56, RED, GREEN, BLUE, 0xaa];
/// assert_eq!(t.placeholders(), 3);
/// ```
#[macro_export]
macro_rules! template {
    (@tok RED) => { $crate::protocol::Token::Placeholder($crate::protocol::Slot::Red) };
    (@tok GREEN) => { $crate::protocol::Token::Placeholder($crate::protocol::Slot::Green) };
    (@tok BLUE) => { $crate::protocol::Token::Placeholder($crate::protocol::Slot::Blue) };
    (@tok WHITE) => { $crate::protocol::Token::Placeholder($crate::protocol::Slot::White) };
    (@tok PROG) => { $crate::protocol::Token::Placeholder($crate::protocol::Slot::Program) };
    (@tok SPEED) => { $crate::protocol::Token::Placeholder($crate::protocol::Slot::Speed) };
    (@tok BRIGHT) => { $crate::protocol::Token::Placeholder($crate::protocol::Slot::Brightness) };
    (@tok HUE) => { $crate::protocol::Token::Placeholder($crate::protocol::Slot::Hue) };
    (@tok $b:literal) => { $crate::protocol::Token::Literal($b) };
    ($($t:tt),* $(,)?) => {
        $crate::protocol::Template::new(vec![$($crate::template!(@tok $t)),*])
    };
}

/// A command byte pattern with typed substitution points
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    tokens: Vec<Token>,
}

/// One resolved frame of a (possibly composite) template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub bytes: Vec<u8>,
    /// Timing before the segment that follows this one
    pub gap: Gap,
}

impl Template {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens }
    }

    /// Template made only of literal bytes
    pub fn literal(bytes: &[u8]) -> Self {
        Self::new(bytes.iter().map(|b| Token::Literal(*b)).collect())
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Number of placeholders, i.e. arguments [`resolve`](Self::resolve) expects
    pub fn placeholders(&self) -> usize {
        self.tokens
            .iter()
            .filter(|t| matches!(t, Token::Placeholder(_)))
            .count()
    }

    /// Append `next`, waiting the default delay in between
    pub fn then(&self, next: &Template) -> Template {
        self.join(Gap::Timed, next)
    }

    /// Append `next`, sent straight after this one
    pub fn then_immediately(&self, next: &Template) -> Template {
        self.join(Gap::Immediate, next)
    }

    fn join(&self, gap: Gap, next: &Template) -> Template {
        let mut tokens = Vec::with_capacity(self.tokens.len() + next.tokens.len() + 1);
        tokens.extend_from_slice(&self.tokens);
        tokens.push(Token::Separator(gap));
        tokens.extend_from_slice(&next.tokens);
        Template::new(tokens)
    }

    /// Copy with the first byte replaced (zone addressing)
    pub fn with_opcode(&self, opcode: u8) -> Template {
        let mut tokens = self.tokens.clone();
        if let Some(first) = tokens.first_mut() {
            *first = Token::Literal(opcode);
        }
        Template::new(tokens)
    }

    /// Substitute `args` into the placeholders in order and split at separators
    pub fn resolve(&self, args: &[u8]) -> Result<Vec<Segment>, ProtocolError> {
        let expected = self.placeholders();
        if args.len() < expected {
            return Err(ProtocolError::MissingArgument {
                expected,
                got: args.len(),
            });
        }
        if args.len() > expected {
            return Err(ProtocolError::TooManyArguments {
                expected,
                got: args.len(),
            });
        }

        let mut args = args.iter().copied();
        let mut segments = Vec::new();
        let mut bytes = Vec::with_capacity(self.tokens.len());
        for token in &self.tokens {
            match *token {
                Token::Literal(b) => bytes.push(b),
                // Count was checked above
                Token::Placeholder(_) => bytes.extend(args.next()),
                Token::Separator(gap) => {
                    if !bytes.is_empty() {
                        segments.push(Segment {
                            bytes: std::mem::take(&mut bytes),
                            gap,
                        });
                    }
                }
            }
        }
        if !bytes.is_empty() {
            segments.push(Segment {
                bytes,
                gap: Gap::Timed,
            });
        }
        Ok(segments)
    }
}

/// Sum of all bytes modulo 256
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Space separated lowercase hex, for logs
pub fn hex_dump(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Result of one decode attempt on the head of the receive buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decoded {
    /// Bytes to drop from the front of the buffer
    pub consumed: usize,
    /// Present only for state-bearing frames
    pub state: Option<DeviceState>,
}

impl Decoded {
    /// Nothing consumed: either the frame is incomplete or the leading byte
    /// is not a recognised header
    pub const fn none() -> Self {
        Self {
            consumed: 0,
            state: None,
        }
    }

    /// Frame recognised but carries no state (acks, foreign notifications)
    pub const fn skip(consumed: usize) -> Self {
        Self {
            consumed,
            state: None,
        }
    }

    pub const fn state(consumed: usize, state: DeviceState) -> Self {
        Self {
            consumed,
            state: Some(state),
        }
    }
}

/// Status frame decoder of a family
pub type DecodeFn = fn(&[u8]) -> Decoded;

fn decode_lw12(data: &[u8]) -> Decoded {
    if data.first() != Some(&status::LW12_HEADER) {
        return Decoded::none();
    }
    if data.len() < status::LW12_FRAME_LEN {
        return Decoded::none();
    }
    if data[1] != status::LW12_MARKER {
        return Decoded::skip(status::LW12_FRAME_LEN);
    }
    Decoded::state(
        status::LW12_FRAME_LEN,
        DeviceState {
            power: data[2] == status::POWER_ON,
            program: data[3],
            program_running: data[4] == status::PROGRAM_RUNNING,
            program_speed: data[5],
            red: data[6],
            green: data[7],
            blue: data[8],
            white: None,
        },
    )
}

fn decode_ld_status(data: &[u8]) -> Decoded {
    if data.first() != Some(&status::LD_HEADER) || data.len() < status::LD_FRAME_LEN {
        return Decoded::none();
    }
    // [0x81, model, power, program, running, speed, r, g, b, w, version, ..., checksum]
    Decoded::state(
        status::LD_FRAME_LEN,
        DeviceState {
            power: data[2] == status::POWER_ON,
            program: data[3],
            program_running: data[4] == status::PROGRAM_RUNNING,
            program_speed: data[5],
            red: data[6],
            green: data[7],
            blue: data[8],
            white: Some(data[9]),
        },
    )
}

fn decode_ld382a(data: &[u8]) -> Decoded {
    // Power commands are answered with a 4-byte ack: [?, 0x71, power, checksum]
    if data.first() != Some(&status::LD_HEADER)
        && data.get(1) == Some(&status::LD_POWER_ACK)
        && data.len() >= status::LD_ACK_LEN
    {
        return Decoded::skip(status::LD_ACK_LEN);
    }
    decode_ld_status(data)
}

// ---------------------------------------------------------------------------
// Families
// ---------------------------------------------------------------------------

/// Supported controller families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    Lw12,
    Ld382a,
    Ld382,
    Ld686,
    Ufo,
    MiLight,
    MiLightRgb,
    MiLightW,
}

impl Family {
    pub const ALL: [Family; 8] = [
        Family::Lw12,
        Family::Ld382a,
        Family::Ld382,
        Family::Ld686,
        Family::Ufo,
        Family::MiLight,
        Family::MiLightRgb,
        Family::MiLightW,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Family::Lw12 => "LW12",
            Family::Ld382a => "LD382A",
            Family::Ld382 => "LD382",
            Family::Ld686 => "LD686",
            Family::Ufo => "UFO",
            Family::MiLight => "MiLight",
            Family::MiLightRgb => "MiLightRGB",
            Family::MiLightW => "MiLightW",
        }
    }

    /// Zones a single configured controller expands into
    pub fn zones(self) -> Option<std::ops::Range<u8>> {
        match self {
            Family::MiLight => Some(0..MILIGHT_ZONES),
            _ => None,
        }
    }

    /// Build the protocol table; `zone` only matters for zoned families
    pub fn spec(self, zone: Option<u8>) -> ProtocolSpec {
        match self {
            Family::Lw12 => lw12(),
            Family::Ld382a | Family::Ld382 => ld382a(self),
            Family::Ld686 => ld686(),
            Family::Ufo => ufo(),
            Family::MiLight => milight(self, zone.unwrap_or(0)),
            Family::MiLightRgb => milight_rgb(),
            Family::MiLightW => milight(self, zone.unwrap_or(0)),
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Family {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Family::ALL
            .iter()
            .copied()
            .find(|f| f.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ProtocolError::UnknownFamily(s.to_string()))
    }
}

/// Module names reported by discovery, mapped to their family
const KNOWN_DEVICE_NAMES: &[(&str, Family)] = &[
    ("HF-LPB100-ZJ200", Family::Ld382a),
    ("HF-LPB100-ZJ002", Family::Ld382),
    ("HF-A11-ZJ002", Family::Lw12),
    ("Mi-Light", Family::MiLight),
    ("AK001-ZJ100", Family::Ld382a),
    ("AK001-ZJ200", Family::Ld686),
];

/// Look up the family of a module name as reported by discovery
pub fn family_for_device_name(name: &str) -> Option<Family> {
    KNOWN_DEVICE_NAMES
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, f)| *f)
}

/// How colors are expressed to a family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorModel {
    /// Direct RGB(W) byte values
    Direct,
    /// Hue byte plus brightness level (MiLight)
    HueDial,
}

/// Extra templates of the hue-dial families
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialTemplates {
    pub white_mode: Template,
    pub brightness: Template,
    pub hue: Template,
    pub disco: Template,
    /// Families without absolute brightness step up from the lowest level
    pub brightness_up: Option<Template>,
    pub pair: Template,
    pub unpair: Template,
    /// Number of brightness levels above the minimum
    pub dim_steps: u8,
}

/// Immutable protocol description of one family (and zone)
#[derive(Clone)]
pub struct ProtocolSpec {
    pub family: Family,
    pub zone: Option<u8>,
    pub port: u16,
    pub mode: TransportMode,
    pub uses_checksum: bool,
    /// Default delay after each command (ms)
    pub delay_ms: u64,
    /// The two valid lengths of an incoming frame
    pub response_len: Option<(usize, usize)>,
    /// Leading byte of a status frame, used to resynchronise on noise
    pub status_header: Option<u8>,
    pub color_model: ColorModel,
    pub on: Template,
    pub off: Template,
    pub program_on: Option<Template>,
    pub program_off: Option<Template>,
    /// Program select: PROG, SPEED
    pub program: Option<Template>,
    pub status_request: Option<Template>,
    /// RED, GREEN, BLUE
    pub rgb: Option<Template>,
    /// RED, GREEN, BLUE, WHITE
    pub rgbw: Option<Template>,
    pub dial: Option<DialTemplates>,
    pub program_names: &'static [(u8, &'static str)],
    decode: Option<DecodeFn>,
}

impl fmt::Debug for ProtocolSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolSpec")
            .field("family", &self.family)
            .field("zone", &self.zone)
            .field("port", &self.port)
            .field("mode", &self.mode)
            .field("uses_checksum", &self.uses_checksum)
            .field("delay_ms", &self.delay_ms)
            .finish_non_exhaustive()
    }
}

impl ProtocolSpec {
    /// Decode the head of `data`, `None` when the family reports no status
    pub fn decode(&self, data: &[u8]) -> Option<Decoded> {
        self.decode.map(|f| f(data))
    }

    pub fn has_status(&self) -> bool {
        self.decode.is_some() && self.status_request.is_some()
    }

    /// Shortest frame the decoder has to wait for
    pub fn min_frame_len(&self) -> Option<usize> {
        self.response_len.map(|(a, b)| a.min(b))
    }

    pub fn has_white(&self) -> bool {
        self.rgbw.is_some()
    }

    /// Append the checksum byte when the family uses one
    pub fn frame(&self, payload: &[u8]) -> Vec<u8> {
        let mut frame = Vec::with_capacity(payload.len() + 1);
        frame.extend_from_slice(payload);
        if self.uses_checksum {
            frame.push(checksum(payload));
        }
        frame
    }

    /// Resolve a template and frame every resulting segment
    pub fn encode(&self, template: &Template, args: &[u8]) -> Result<Vec<Segment>, ProtocolError> {
        Ok(template
            .resolve(args)?
            .into_iter()
            .map(|s| Segment {
                bytes: self.frame(&s.bytes),
                gap: s.gap,
            })
            .collect())
    }

    /// Human readable program name
    pub fn program_name(&self, program: u8) -> Option<&'static str> {
        self.program_names
            .iter()
            .find(|(n, _)| *n == program)
            .map(|(_, name)| *name)
    }

    /// The template for `command`, or an `Unsupported` error
    pub fn require<'a>(
        &self,
        template: &'a Option<Template>,
        command: &'static str,
    ) -> Result<&'a Template, ProtocolError> {
        template.as_ref().ok_or(ProtocolError::Unsupported {
            family: self.family.name(),
            command,
        })
    }
}

/// Built-in programs of the Wi-Fi controllers
pub const PROGRAM_NAMES: &[(u8, &str)] = &[
    (97, "none"),
    (37, "Seven Colors Cross Fade"),
    (38, "Red Gradual Change"),
    (39, "Green Gradual Change"),
    (40, "Blue Gradual Change"),
    (41, "Yellow Gradual Change"),
    (42, "Cyan Gradual Change"),
    (43, "Purple Gradual Change"),
    (44, "White Gradual Change"),
    (45, "Red, Green Cross Fade"),
    (46, "Red, Blue Cross Fade"),
    (47, "Green, Blue Cross Fade"),
    (48, "Seven Colors Strobe Flash"),
    (49, "Red Strobe Flash"),
    (50, "Green Strobe Flash"),
    (51, "Blue Strobe Flash"),
    (52, "Yellow Strobe Flash"),
    (53, "Cyan Strobe Flash"),
    (54, "Purple Strobe Flash"),
    (55, "White Strobe Flash"),
    (56, "Seven Colors Jumping Change"),
];

/// Disco modes of the MiLight bridge
pub const DIAL_PROGRAM_NAMES: &[(u8, &str)] = &[
    (0, "[Off]"),
    (1, "Rainbow"),
    (2, "White Flash"),
    (3, "Color Gradient"),
    (4, "Color Change"),
    (5, "Flash (all colors)"),
    (6, "Fade Flash (red)"),
    (7, "Fade Flash (green)"),
    (8, "Fade Flash (blue)"),
    (9, "Disco"),
];

fn lw12() -> ProtocolSpec {
    ProtocolSpec {
        family: Family::Lw12,
        zone: None,
        port: DEFAULT_TCP_PORT,
        mode: TransportMode::Persistent,
        uses_checksum: false,
        delay_ms: timing::DEFAULT_DELAY_MS,
        response_len: Some((status::LW12_FRAME_LEN, status::LW12_FRAME_LEN)),
        status_header: Some(status::LW12_HEADER),
        color_model: ColorModel::Direct,
        on: template![0xcc, 0x23, 0x33],
        off: template![0xcc, 0x24, 0x33],
        program_on: Some(template![0xcc, 0x21, 0x33]),
        program_off: Some(template![0xcc, 0x20, 0x33]),
        program: Some(template![0xbb, PROG, SPEED, 0x44]),
        status_request: Some(template![0xef, 0x01, 0x77]),
        rgb: Some(template![0x56, RED, GREEN, BLUE, 0xaa]),
        rgbw: None,
        dial: None,
        program_names: PROGRAM_NAMES,
        decode: Some(decode_lw12),
    }
}

fn ld382a(family: Family) -> ProtocolSpec {
    ProtocolSpec {
        family,
        zone: None,
        port: DEFAULT_TCP_PORT,
        mode: TransportMode::Persistent,
        uses_checksum: true,
        delay_ms: timing::DEFAULT_DELAY_MS,
        response_len: Some((status::LD_FRAME_LEN, status::LD_ACK_LEN)),
        status_header: Some(status::LD_HEADER),
        color_model: ColorModel::Direct,
        on: template![0x71, 0x23, 0x0f],
        off: template![0x71, 0x24, 0x0f],
        program_on: Some(template![0x71, 0x21, 0x0f]),
        program_off: Some(template![0x71, 0x20, 0x0f]),
        program: Some(template![0x61, PROG, SPEED, 0x0f]),
        status_request: Some(template![0x81, 0x8a, 0x8b]),
        rgb: Some(template![0x31, RED, GREEN, BLUE, 0xff, 0x00, 0x0f]),
        rgbw: Some(template![0x31, RED, GREEN, BLUE, WHITE, 0x00, 0x0f]),
        dial: None,
        program_names: PROGRAM_NAMES,
        decode: Some(decode_ld382a),
    }
}

fn ld686() -> ProtocolSpec {
    ProtocolSpec {
        family: Family::Ld686,
        response_len: Some((status::LD_FRAME_LEN, status::LD_FRAME_LEN)),
        // Mask byte: 0xf0 = RGB only, 0x0f = white only, 0xff = RGBW
        rgb: Some(template![0x31, RED, GREEN, BLUE, 0x00, 0x00, 0xf0, 0x0f]),
        rgbw: Some(template![0x31, RED, GREEN, BLUE, WHITE, 0x00, 0xff, 0x0f]),
        decode: Some(decode_ld_status),
        ..ld382a(Family::Ld686)
    }
}

fn ufo() -> ProtocolSpec {
    ProtocolSpec {
        family: Family::Ufo,
        on: template![0x71, 0x23],
        off: template![0x71, 0x24],
        program_on: Some(template![0x71, 0x21]),
        program_off: Some(template![0x71, 0x20]),
        program: Some(template![0x61, PROG, SPEED]),
        rgb: Some(template![0x31, RED, GREEN, BLUE, 0x00, 0x00, 0x00]),
        rgbw: Some(template![0x31, RED, GREEN, BLUE, WHITE, 0x00]),
        ..ld382a(Family::Ufo)
    }
}

/// Zone opcodes of the MiLight bridge, index = zone
mod zone_opcodes {
    pub const ON: [u8; 5] = [0x42, 0x45, 0x47, 0x49, 0x4b];
    pub const OFF: [u8; 5] = [0x41, 0x46, 0x48, 0x4a, 0x4c];
    pub const WHITE_MODE: [u8; 5] = [0xc2, 0xc5, 0xc7, 0xc9, 0xcb];
}

fn milight(family: Family, zone: u8) -> ProtocolSpec {
    let zone = if zone >= MILIGHT_ZONES { 0 } else { zone };
    let z = zone as usize;
    let base_on = template![0x42, 0x00, 0x55];
    let base_off = template![0x41, 0x00, 0x55];
    let base_white = template![0xc2, 0x00, 0x55];

    ProtocolSpec {
        family,
        zone: Some(zone),
        port: DEFAULT_UDP_PORT,
        mode: TransportMode::Datagram,
        uses_checksum: false,
        delay_ms: timing::DIAL_DELAY_MS,
        response_len: None,
        status_header: None,
        color_model: ColorModel::HueDial,
        on: base_on.with_opcode(zone_opcodes::ON[z]),
        off: base_off.with_opcode(zone_opcodes::OFF[z]),
        program_on: None,
        program_off: None,
        program: None,
        status_request: None,
        rgb: None,
        rgbw: None,
        dial: Some(DialTemplates {
            white_mode: base_white.with_opcode(zone_opcodes::WHITE_MODE[z]),
            brightness: template![0x4e, BRIGHT, 0x55],
            hue: template![0x40, HUE, 0x55],
            disco: template![0x4d, 0x00, 0x55],
            brightness_up: None,
            pair: template![0x25, 0x00, 0x55],
            unpair: template![0x25, 0x00, 0x55],
            dim_steps: if family == Family::MiLightW { 11 } else { 25 },
        }),
        program_names: DIAL_PROGRAM_NAMES,
        decode: None,
    }
}

fn milight_rgb() -> ProtocolSpec {
    let base = milight(Family::MiLightRgb, 0);
    ProtocolSpec {
        zone: None,
        on: template![0x22, 0x00, 0x55],
        off: template![0x21, 0x00, 0x55],
        dial: base.dial.clone().map(|d| DialTemplates {
            disco: template![0x27, 0x00, 0x55],
            brightness_up: Some(template![0x23, 0x00, 0x55]),
            dim_steps: 9,
            ..d
        }),
        ..base
    }
}
